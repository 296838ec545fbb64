use serde::Serialize;
use std::fmt;
use std::time::Duration;

use crate::error::ExportError;

/// Why an export did not succeed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    #[default]
    None,
    Permission,
    Timeout,
    ToolNotFound,
    Other,
}

impl fmt::Display for ErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorType::None => "none",
            ErrorType::Permission => "permission",
            ErrorType::Timeout => "timeout",
            ErrorType::ToolNotFound => "tool_not_found",
            ErrorType::Other => "other",
        };
        write!(f, "{}", name)
    }
}

/// Result of one export tool run, built once by the executor
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExportOutcome {
    pub success: bool,
    pub total_resources: u64,
    pub exported_resources: u64,
    pub failed_resources: u64,
    pub skipped_resources: u64,
    pub error_type: ErrorType,
    /// Tail of the tool transcript for failed runs
    pub error_details: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    /// Terraform files found in the output directory
    pub artifact_files: u64,
}

impl ExportOutcome {
    pub fn failure(error_type: ErrorType, error_details: Vec<String>) -> Self {
        Self {
            success: false,
            error_type,
            error_details,
            ..Default::default()
        }
    }

    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = Some(code);
        self
    }

    /// Typed error for a failed outcome, used for logging and remediation hints
    pub fn to_error(&self, timeout: Duration) -> Option<ExportError> {
        if self.success {
            return None;
        }

        Some(match self.error_type {
            ErrorType::Timeout => ExportError::ExportTimeout(timeout),
            ErrorType::ToolNotFound => ExportError::ExportToolMissing,
            kind => ExportError::ExportFailed {
                kind,
                message: self.summary(),
            },
        })
    }

    /// One-line description of a failure
    pub fn summary(&self) -> String {
        match (self.exit_code, self.error_details.last()) {
            (Some(code), Some(last)) => format!("exit code {}: {}", code, last),
            (Some(code), None) => format!("exit code {}", code),
            (None, Some(last)) => last.clone(),
            (None, None) => self.error_type.to_string(),
        }
    }
}
