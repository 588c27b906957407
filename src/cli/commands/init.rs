use crate::cli::parser::Cli;
use crate::config::Config;
use crate::db::initialize::open;
use crate::db::log::oplog;
use crate::errors::AppResult;
use crate::ui::messages::{success, warning};

/// Handle the `init` command
///
/// This initializes:
///  - the config directory (if missing)
///  - the configuration file (skipped in test mode)
///  - the SQLite database and all pending migrations
pub fn handle(cli: &Cli) -> AppResult<()> {
    // 1) Configuration
    let db_path = Config::init_all(cli.db.clone(), cli.test)?;
    let db_path = db_path.to_string_lossy().to_string();

    println!("⚙️  Initializing rBioSync…");
    if !cli.test {
        println!("📄 Config file : {}", Config::config_file().display());
    }
    println!("🗄️  Database   : {}", &db_path);

    // 2) Database + migrations
    let pool = open(&db_path)?;

    // 3) Internal log (non blocking)
    if let Err(e) = pool.with_conn(|conn| oplog(conn, "init", &db_path, "Database initialized")) {
        warning(format!("Failed to write internal log: {e}"));
    }

    success(format!("Database initialized at {db_path}"));
    Ok(())
}
