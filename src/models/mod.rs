pub mod attendance;
pub mod direction;
pub mod gap;
pub mod health;
pub mod punch;
pub mod sync;
