use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use super::command::ExportInvocation;
use super::outcome::{ErrorType, ExportOutcome};
use super::parser::OutputParser;
use super::pty::PtyWrapper;
use crate::traits::{CommandRunner, CommandSpec, FileSystem, Output, RunError};

pub const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Lines kept from the transcript of a failed run
const FAILURE_TAIL: usize = 20;
/// Lines kept when the tool exits 0 but produces nothing
const EMPTY_EXPORT_TAIL: usize = 5;
/// Shell status for "command not found" when running through the pty wrapper
const SHELL_NOT_FOUND: i32 = 127;

const PERMISSION_KEYWORDS: &[&str] = &[
    "permission",
    "unauthorized",
    "access denied",
    "forbidden",
    "rbac",
    "authorizationfailed",
    "does not have authorization",
    "insufficient privileges",
];

const INSTALL_HINT: &str = "Install with: go install github.com/Azure/aztfexport@latest";

/// Runs one export tool invocation and turns whatever happens into an
/// `ExportOutcome`. Nothing is ever propagated to the caller.
pub struct ExportExecutor<'a> {
    runner: &'a dyn CommandRunner,
    fs: &'a dyn FileSystem,
    output: &'a dyn Output,
    pty: PtyWrapper,
    timeout: Duration,
    parser: OutputParser,
}

impl<'a> ExportExecutor<'a> {
    pub fn new(runner: &'a dyn CommandRunner, fs: &'a dyn FileSystem, output: &'a dyn Output) -> Self {
        Self {
            runner,
            fs,
            output,
            pty: PtyWrapper::disabled(),
            timeout: DEFAULT_EXPORT_TIMEOUT,
            parser: OutputParser::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_pty(mut self, pty: PtyWrapper) -> Self {
        self.pty = pty;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Build the process spec: non-interactive environment, pty wrapper if any
    pub fn command_spec(&self, invocation: &ExportInvocation, working_dir: &Path) -> CommandSpec {
        let (program, args) = self.pty.wrap(&invocation.program, &invocation.args);

        CommandSpec::new(program, args)
            .with_env("AZTFEXPORT_NON_INTERACTIVE", "true")
            .with_env("TERM", "dumb")
            .with_env("NO_COLOR", "1")
            .with_working_dir(working_dir)
            .with_timeout(self.timeout)
    }

    pub fn execute(
        &self,
        invocation: &ExportInvocation,
        output_dir: &Path,
        working_dir: &Path,
    ) -> ExportOutcome {
        let spec = self.command_spec(invocation, working_dir);
        self.output.debug(&format!("Running command: {}", spec.display()));
        self.output.debug(&format!("Output directory: {}", output_dir.display()));

        let mut transcript: Vec<String> = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();

        let result = {
            let mut on_line = |line: &str| {
                let line = line.trim_end_matches(['\r', '\n']);
                self.output.raw(line);
                if seen.insert(line.to_string()) {
                    transcript.push(line.to_string());
                }
            };
            self.runner.run_streaming(&spec, &mut on_line)
        };

        match result {
            Ok(0) => self.classify_clean_exit(output_dir, &transcript),
            Ok(SHELL_NOT_FOUND) if self.pty.is_enabled() && mentions_missing_tool(&transcript) => {
                self.tool_not_found(&invocation.program)
                    .with_exit_code(SHELL_NOT_FOUND)
            }
            Ok(code) => self.classify_failure(code, &transcript),
            Err(RunError::NotFound { .. }) => self.tool_not_found(&invocation.program),
            Err(RunError::Timeout { timeout, .. }) => {
                self.output.error(&format!(
                    "Export timed out after {} seconds; the process was killed",
                    timeout.as_secs()
                ));
                let mut details = tail(&transcript, EMPTY_EXPORT_TAIL);
                details.push(format!("Export timed out after {}s", timeout.as_secs()));
                ExportOutcome::failure(ErrorType::Timeout, details)
            }
            Err(e) => {
                self.output.error(&format!("Error running export: {}", e));
                ExportOutcome::failure(ErrorType::Other, vec![e.to_string()])
            }
        }
    }

    fn classify_clean_exit(&self, output_dir: &Path, transcript: &[String]) -> ExportOutcome {
        let artifacts = self.fs.find_files_with_extension(output_dir, "tf").len() as u64;

        if artifacts == 0 {
            self.output.warning(&format!(
                "Export completed but no .tf files found in {}",
                output_dir.display()
            ));
            let mut details = tail(transcript, EMPTY_EXPORT_TAIL);
            details.push("Export tool exited 0 without producing Terraform files".to_string());
            return ExportOutcome::failure(ErrorType::Other, details).with_exit_code(0);
        }

        let counts = self.parser.parse(transcript);
        let mut outcome = ExportOutcome {
            success: true,
            exit_code: Some(0),
            artifact_files: artifacts,
            ..Default::default()
        };

        if counts.is_empty() {
            self.output
                .debug("No resource counts in tool output; using Terraform file count");
            outcome.exported_resources = artifacts;
            outcome.total_resources = artifacts;
        } else {
            outcome.exported_resources = counts.exported.unwrap_or(0);
            outcome.failed_resources = counts.failed.unwrap_or(0);
            outcome.skipped_resources = counts.skipped.unwrap_or(0);
            outcome.total_resources = counts.total.unwrap_or(
                outcome.exported_resources + outcome.failed_resources + outcome.skipped_resources,
            );
        }

        self.output
            .success(&format!("Created {} Terraform file(s)", artifacts));
        outcome
    }

    fn classify_failure(&self, code: i32, transcript: &[String]) -> ExportOutcome {
        let error_type = if is_permission_error(transcript) {
            ErrorType::Permission
        } else {
            ErrorType::Other
        };

        let details = tail(transcript, FAILURE_TAIL);
        self.output
            .error(&format!("Export failed (exit code: {})", code));
        if !details.is_empty() {
            self.output
                .error(&format!("Error output (last {} lines):", FAILURE_TAIL));
            for line in &details {
                self.output.error(&format!("  {}", line));
            }
        }

        ExportOutcome::failure(error_type, details).with_exit_code(code)
    }

    fn tool_not_found(&self, program: &str) -> ExportOutcome {
        self.output.error(&format!(
            "{} not found. Make sure it's installed and in PATH",
            program
        ));
        self.output.info(INSTALL_HINT);
        ExportOutcome::failure(
            ErrorType::ToolNotFound,
            vec![format!("{} not found", program)],
        )
    }
}

fn is_permission_error(transcript: &[String]) -> bool {
    transcript.iter().any(|line| {
        let lowered = line.to_lowercase();
        PERMISSION_KEYWORDS.iter().any(|k| lowered.contains(k))
    })
}

fn mentions_missing_tool(transcript: &[String]) -> bool {
    transcript.iter().any(|line| {
        let lowered = line.to_lowercase();
        lowered.contains("not found") || lowered.contains("no such file")
    })
}

/// Last `n` non-blank lines, oldest first
fn tail(transcript: &[String], n: usize) -> Vec<String> {
    let mut lines: Vec<String> = transcript
        .iter()
        .rev()
        .filter(|l| !l.trim().is_empty())
        .take(n)
        .cloned()
        .collect();
    lines.reverse();
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::command::ExportMode;
    use crate::traits::{MockCommandResult, MockCommandRunner, MockOutput, RealCommandRunner, RealFileSystem};
    use std::time::Instant;

    fn invocation(program: &str, args: &[&str]) -> ExportInvocation {
        ExportInvocation {
            program: program.to_string(),
            mode: ExportMode::ResourceGroup,
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    #[test]
    fn test_exit_zero_with_terraform_files_is_success() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("rg1");
        let runner = MockCommandRunner::with_results(vec![
            MockCommandResult::exit("aztfexport", 0, "")
                .with_lines(&["Exported 2 resources", "Exported 2 resources", "done"])
                .creating(out.join("main.tf"))
                .creating(out.join("nested/provider.tf")),
        ]);
        let output = MockOutput::new();
        let executor = ExportExecutor::new(&runner, &RealFileSystem, &output);

        let outcome = executor.execute(&invocation("aztfexport", &["rg1"]), &out, dir.path());

        assert!(outcome.success);
        assert_eq!(outcome.artifact_files, 2);
        assert_eq!(outcome.exported_resources, 2);
        assert_eq!(outcome.total_resources, 2);
        assert_eq!(outcome.error_type, ErrorType::None);
        // Every line is echoed live, duplicates included
        assert_eq!(output.get_raw().len(), 3);
    }

    #[test]
    fn test_exit_zero_without_files_is_failure() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockCommandRunner::with_results(vec![
            MockCommandResult::exit("aztfexport", 0, "").with_lines(&["nothing to do"]),
        ]);
        let output = MockOutput::new();
        let executor = ExportExecutor::new(&runner, &RealFileSystem, &output);

        let outcome = executor.execute(&invocation("aztfexport", &[]), dir.path(), dir.path());

        assert!(!outcome.success);
        assert_eq!(outcome.error_type, ErrorType::Other);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.error_details[0], "nothing to do");
    }

    #[test]
    fn test_falls_back_to_file_count_without_parsed_counts() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockCommandRunner::with_results(vec![
            MockCommandResult::exit("aztfexport", 0, "")
                .creating(dir.path().join("a.tf"))
                .creating(dir.path().join("b.tf"))
                .creating(dir.path().join("c.tf")),
        ]);
        let output = MockOutput::new();
        let executor = ExportExecutor::new(&runner, &RealFileSystem, &output);

        let outcome = executor.execute(&invocation("aztfexport", &[]), dir.path(), dir.path());
        assert!(outcome.success);
        assert_eq!(outcome.exported_resources, 3);
    }

    #[test]
    fn test_permission_failure_is_classified() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockCommandRunner::with_results(vec![
            MockCommandResult::failure(
                "aztfexport",
                1,
                "Error: AuthorizationFailed: the client does not have authorization",
            )
            .with_lines(&["listing resources", "", "listing resources"]),
        ]);
        let output = MockOutput::new();
        let executor = ExportExecutor::new(&runner, &RealFileSystem, &output);

        let outcome = executor.execute(&invocation("aztfexport", &[]), dir.path(), dir.path());

        assert!(!outcome.success);
        assert_eq!(outcome.error_type, ErrorType::Permission);
        assert_eq!(outcome.exit_code, Some(1));
        assert_eq!(
            outcome.error_details,
            vec![
                "listing resources".to_string(),
                "Error: AuthorizationFailed: the client does not have authorization".to_string(),
            ]
        );
    }

    #[test]
    fn test_failure_details_keep_last_twenty_lines() {
        let dir = tempfile::tempdir().unwrap();
        let lines: Vec<String> = (0..30).map(|i| format!("line {}", i)).collect();
        let line_refs: Vec<&str> = lines.iter().map(String::as_str).collect();
        let runner = MockCommandRunner::with_results(vec![
            MockCommandResult::exit("aztfexport", 2, "").with_lines(&line_refs),
        ]);
        let output = MockOutput::new();
        let executor = ExportExecutor::new(&runner, &RealFileSystem, &output);

        let outcome = executor.execute(&invocation("aztfexport", &[]), dir.path(), dir.path());
        assert_eq!(outcome.error_type, ErrorType::Other);
        assert_eq!(outcome.error_details.len(), 20);
        assert_eq!(outcome.error_details[0], "line 10");
        assert_eq!(outcome.error_details[19], "line 29");
    }

    #[test]
    fn test_missing_tool_is_tool_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockCommandRunner::with_results(vec![MockCommandResult::not_found("aztfexport")]);
        let output = MockOutput::new();
        let executor = ExportExecutor::new(&runner, &RealFileSystem, &output);

        let outcome = executor.execute(&invocation("aztfexport", &[]), dir.path(), dir.path());
        assert_eq!(outcome.error_type, ErrorType::ToolNotFound);
        assert!(output.to_text().contains("go install"));
        assert!(!outcome.error_details.iter().any(|d| d.contains("go install")));
    }

    #[test]
    fn test_missing_tool_behind_pty_wrapper() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockCommandRunner::with_results(vec![
            MockCommandResult::exit("/usr/bin/script", 127, "")
                .with_lines(&["sh: 1: aztfexport: not found"]),
        ]);
        let output = MockOutput::new();
        let executor = ExportExecutor::new(&runner, &RealFileSystem, &output)
            .with_pty(PtyWrapper::with_script("/usr/bin/script"));

        let outcome = executor.execute(&invocation("aztfexport", &["rg1"]), dir.path(), dir.path());
        assert_eq!(outcome.error_type, ErrorType::ToolNotFound);
        assert_eq!(runner.calls()[0].args[3], "aztfexport rg1");
    }

    #[test]
    fn test_timeout_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let runner = MockCommandRunner::with_results(vec![MockCommandResult::timeout("aztfexport")]);
        let output = MockOutput::new();
        let executor = ExportExecutor::new(&runner, &RealFileSystem, &output)
            .with_timeout(Duration::from_secs(1));

        let outcome = executor.execute(&invocation("aztfexport", &[]), dir.path(), dir.path());
        assert!(!outcome.success);
        assert_eq!(outcome.error_type, ErrorType::Timeout);
        assert_eq!(runner.calls()[0].timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_non_interactive_environment() {
        let runner = MockCommandRunner::new();
        let output = MockOutput::new();
        let executor = ExportExecutor::new(&runner, &RealFileSystem, &output);

        let spec = executor.command_spec(&invocation("aztfexport", &["rg1"]), Path::new("/exports"));
        assert_eq!(spec.env.get("AZTFEXPORT_NON_INTERACTIVE").map(String::as_str), Some("true"));
        assert_eq!(spec.env.get("TERM").map(String::as_str), Some("dumb"));
        assert_eq!(spec.env.get("NO_COLOR").map(String::as_str), Some("1"));
        assert_eq!(spec.working_dir.as_deref(), Some(Path::new("/exports")));
        assert_eq!(spec.timeout, DEFAULT_EXPORT_TIMEOUT);
    }

    #[cfg(unix)]
    #[test]
    fn test_hanging_tool_is_killed_after_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RealCommandRunner::new();
        let output = MockOutput::new();
        let executor = ExportExecutor::new(&runner, &RealFileSystem, &output)
            .with_timeout(Duration::from_secs(1));

        let started = Instant::now();
        let outcome = executor.execute(
            &invocation("sh", &["-c", "echo starting; exec sleep 60"]),
            dir.path(),
            dir.path(),
        );

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!outcome.success);
        assert_eq!(outcome.error_type, ErrorType::Timeout);
        assert_eq!(output.get_raw(), vec!["starting".to_string()]);
    }
}
