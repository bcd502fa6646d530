//! Configuration management for hostrun
//!
//! Settings live in a single TOML file: the default controls applied to
//! every host plus a list of named host profiles.

mod manager;
pub mod settings;

pub use manager::{CONFIG_DIR_ENV, CONFIG_FILE_NAME, ConfigManager};
pub use settings::{HostProfile, Settings};
