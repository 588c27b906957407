pub mod continuity;
pub mod gaps;
pub mod puller;
pub mod stitcher;
pub mod throttle;
pub mod watchdog;
pub mod worker;
