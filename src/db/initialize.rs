use crate::db::migrate::run_pending_migrations;
use crate::db::pool::DbPool;
use crate::errors::AppResult;

/// Initialize the database.
/// Delegates all schema creation / upgrades to the migration engine.
pub fn init_db(pool: &DbPool) -> AppResult<()> {
    pool.with_conn(run_pending_migrations)
}

/// Open the configured database and bring its schema up to date.
pub fn open(path: &str) -> AppResult<DbPool> {
    let pool = DbPool::new(path)?;
    init_db(&pool)?;
    Ok(pool)
}
