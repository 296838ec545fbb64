use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::export::ErrorType;

/// Failure taxonomy for a backup run
///
/// Only configuration and discovery errors end a run.
/// Everything else is recorded against the resource group or subscription
/// it happened in and the run carries on.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Configuration file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("Failed to parse configuration {}: {message}", path.display())]
    ConfigParse { path: PathBuf, message: String },

    #[error("Discovery failed: {0}")]
    DiscoveryFailed(String),

    #[error("Unknown schedule: {0}")]
    UnknownSchedule(String),

    #[error("Export timed out after {}s", .0.as_secs())]
    ExportTimeout(Duration),

    #[error("aztfexport not found in PATH")]
    ExportToolMissing,

    #[error("Export failed ({kind}): {message}")]
    ExportFailed { kind: ErrorType, message: String },

    #[error("Push failed for subscription {0}")]
    PushFailed(String),

    #[error("Telemetry delivery failed: {0}")]
    TelemetryFailed(String),
}

impl ExportError {
    /// Operator hint shown next to the raw error
    pub fn remediation(&self) -> Option<&'static str> {
        match self {
            ExportError::ConfigNotFound(_) => {
                Some("Pass --config or set CONFIG_PATH to the subscriptions YAML file")
            }
            ExportError::DiscoveryFailed(_) => Some("Make sure you're logged in: az login"),
            ExportError::UnknownSchedule(_) => {
                Some("Add the schedule under `schedules:` in the configuration file")
            }
            ExportError::ExportTimeout(_) => {
                Some("Raise aztfexport.timeout_seconds or narrow the export with exclusions")
            }
            ExportError::ExportToolMissing => {
                Some("Install with: go install github.com/Azure/aztfexport@latest")
            }
            ExportError::ExportFailed {
                kind: ErrorType::Permission,
                ..
            } => Some("Check the RBAC role assignments of the identity running the export"),
            ExportError::PushFailed(_) => {
                Some("Check AZURE_DEVOPS_PAT and that the repository exists")
            }
            _ => None,
        }
    }
}

/// Result type for run-level operations
pub type ExportResult<T> = Result<T, ExportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_not_found_message() {
        let err = ExportError::ConfigNotFound(PathBuf::from("config/subscriptions.yaml"));
        assert_eq!(
            err.to_string(),
            "Configuration file not found: config/subscriptions.yaml"
        );
        assert!(err.remediation().is_some());
    }

    #[test]
    fn test_permission_failure_has_rbac_hint() {
        let err = ExportError::ExportFailed {
            kind: ErrorType::Permission,
            message: "AuthorizationFailed".to_string(),
        };
        assert!(err.remediation().unwrap().contains("RBAC"));
        assert!(err.to_string().contains("permission"));
    }

    #[test]
    fn test_timeout_message_uses_seconds() {
        let err = ExportError::ExportTimeout(Duration::from_secs(3600));
        assert_eq!(err.to_string(), "Export timed out after 3600s");
    }
}
