pub mod create_repos;
pub mod export;
pub mod pipeline;

pub use create_repos::CreateReposCommand;
pub use export::{ExportArgs, ExportCommand};
pub use pipeline::{DiscoverCommand, FindSpnCommand, GroupBySpnCommand, MatrixCommand};

use crate::config::pipeline::resolve_pipeline_variable;
use crate::error::ExportError;
use crate::traits::Output;

/// Azure DevOps token: explicit value first, then the pipeline's system token
pub fn devops_pat(explicit: Option<String>) -> Option<String> {
    explicit
        .or_else(|| std::env::var("SYSTEM_ACCESS_TOKEN").ok())
        .or_else(|| std::env::var("SYSTEM_ACCESSTOKEN").ok())
        .map(|pat| resolve_pipeline_variable(pat.trim()))
        .filter(|pat| !pat.is_empty() && !pat.starts_with("$("))
}

/// Log a run-level error with its remediation hint
pub fn report_error(output: &dyn Output, error: &ExportError) {
    output.error(&error.to_string());
    if let Some(hint) = error.remediation() {
        output.info(hint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_devops_pat_prefers_explicit_value() {
        temp_env::with_var("SYSTEM_ACCESS_TOKEN", Some("system"), || {
            assert_eq!(devops_pat(Some(" pat ".to_string())), Some("pat".to_string()));
            assert_eq!(devops_pat(None), Some("system".to_string()));
        });
    }

    #[test]
    fn test_devops_pat_unresolved_placeholder_is_missing() {
        temp_env::with_vars(
            [
                ("SYSTEM_ACCESS_TOKEN", None::<&str>),
                ("SYSTEM_ACCESSTOKEN", None),
                ("UNSET_PAT_VAR", None),
            ],
            || {
                assert_eq!(devops_pat(Some("$(UNSET_PAT_VAR)".to_string())), None);
                assert_eq!(devops_pat(None), None);
            },
        );
    }
}
