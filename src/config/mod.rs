//! Runtime configuration for the deployment core.
//!
//! Settings are read from the environment exactly once at process start
//! and threaded down as a value; no module reads the environment after
//! startup.

mod settings;

pub use settings::{DemoConfig, Settings};
