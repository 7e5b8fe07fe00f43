//! todoist-sync-daemon library: Exposes the native components for testing.
//!
//! This is a thin library layer over the daemon's native filesystem,
//! REST client and configuration, allowing integration tests to use them.

pub mod config;
pub mod native_fs;
pub mod todoist;

pub use config::{Config, ConfigError};
pub use native_fs::NativeFs;
pub use todoist::RestClient;
