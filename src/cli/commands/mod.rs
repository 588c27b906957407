pub mod config;
pub mod export;
pub mod finalize;
pub mod gaps;
pub mod init;
pub mod list;
pub mod log;
pub mod run;
pub mod shift;
pub mod status;
pub mod sync;
