pub mod log_observer;
pub mod metrics;
pub mod progress;

pub use log_observer::LogObserver;
pub use metrics::{BuildEvent, BuildObserver};
pub use progress::ProgressPoller;
