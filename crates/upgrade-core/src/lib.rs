pub mod config;
pub mod deployment;
pub mod environment;
pub mod error;
pub mod flags;
pub mod io;
pub mod memory;
pub mod orchestrator;
pub mod paths;
pub mod probe;
pub mod report;
pub mod state;
pub mod step;
pub mod version;

pub use error::{Result, UpgradeError};
