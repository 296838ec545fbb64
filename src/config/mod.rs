pub mod pipeline;
pub mod schema;

pub use schema::Config;

use std::path::Path;

use crate::error::{ExportError, ExportResult};
use crate::traits::{FileSystem, LogLevel};

/// Default location of the subscriptions file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "config/subscriptions.yaml";

/// Load the YAML configuration
///
/// An empty file is a valid, empty configuration.
pub fn load(fs: &dyn FileSystem, path: &Path) -> ExportResult<Config> {
    if !fs.exists(path) {
        return Err(ExportError::ConfigNotFound(path.to_path_buf()));
    }

    let contents = fs.read_to_string(path).map_err(|e| ExportError::ConfigParse {
        path: path.to_path_buf(),
        message: format!("{:#}", e),
    })?;

    if contents.trim().is_empty() {
        return Ok(Config::default());
    }

    serde_yaml::from_str(&contents).map_err(|e| ExportError::ConfigParse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Effective log level: CLI/env value first, then `logging.level`, then info
pub fn resolve_log_level(cli_level: Option<&str>, config: Option<&Config>) -> LogLevel {
    cli_level
        .and_then(|level| level.parse().ok())
        .or_else(|| {
            config
                .and_then(|c| c.logging.level.as_deref())
                .and_then(|level| level.parse().ok())
        })
        .unwrap_or_default()
}
