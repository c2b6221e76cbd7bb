pub mod changes;
pub mod config;
pub mod constants;
pub mod dashboard;
pub mod docker;
pub mod error;
pub mod executor;
pub mod graph;
pub mod logging;
pub mod propagate;
pub mod report;
pub mod roots;
pub mod runner;
pub mod scanner;
pub mod status;
pub mod version;

pub use error::{ChainError, Result};
