pub mod monitor;
pub mod progress;

pub use monitor::LiveMonitor;
