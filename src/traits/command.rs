use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// A fully resolved external command invocation
#[derive(Debug, Clone, PartialEq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    /// Variables layered on top of the inherited environment
    pub env: HashMap<String, String>,
    pub working_dir: Option<PathBuf>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: HashMap::new(),
            working_dir: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Render the invocation for logs, quoting arguments that contain spaces
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(|arg| {
                if arg.contains(' ') {
                    format!("\"{}\"", arg)
                } else {
                    arg.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Output of a command whose streams were captured separately
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapturedOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Why a command could not produce an exit code
#[derive(Debug, Error)]
pub enum RunError {
    #[error("executable not found: {program}")]
    NotFound { program: String },

    #[error("'{program}' did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("failed to run '{program}': {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl RunError {
    fn from_spawn(program: &str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            RunError::NotFound {
                program: program.to_string(),
            }
        } else {
            RunError::Io {
                program: program.to_string(),
                source: err,
            }
        }
    }
}

/// Trait for executing system commands, allowing for mocking in tests
pub trait CommandRunner: Send + Sync {
    /// Run to completion with stdout and stderr captured separately
    fn run_captured(&self, spec: &CommandSpec) -> Result<CapturedOutput, RunError>;

    /// Run with stdin closed, feeding every stdout/stderr line to `on_line`
    /// as it arrives. The child is killed when `spec.timeout` elapses.
    fn run_streaming(
        &self,
        spec: &CommandSpec,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<i32, RunError>;
}

/// One output line without its terminator, with invalid UTF-8 replaced
fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

/// Real command runner backed by tokio::process
pub struct RealCommandRunner;

impl RealCommandRunner {
    pub fn new() -> Self {
        Self
    }

    fn runtime(program: &str) -> Result<tokio::runtime::Runtime, RunError> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|source| RunError::Io {
                program: program.to_string(),
                source,
            })
    }

    fn command(spec: &CommandSpec) -> Command {
        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .envs(&spec.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &spec.working_dir {
            command.current_dir(dir);
        }

        command
    }
}

impl Default for RealCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRunner for RealCommandRunner {
    fn run_captured(&self, spec: &CommandSpec) -> Result<CapturedOutput, RunError> {
        let runtime = Self::runtime(&spec.program)?;

        runtime.block_on(async {
            let child = Self::command(spec)
                .spawn()
                .map_err(|e| RunError::from_spawn(&spec.program, e))?;

            // Dropping the future on timeout drops the child, and kill_on_drop reaps it.
            match tokio::time::timeout(spec.timeout, child.wait_with_output()).await {
                Ok(Ok(output)) => Ok(CapturedOutput {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                }),
                Ok(Err(source)) => Err(RunError::Io {
                    program: spec.program.clone(),
                    source,
                }),
                Err(_) => Err(RunError::Timeout {
                    program: spec.program.clone(),
                    timeout: spec.timeout,
                }),
            }
        })
    }

    fn run_streaming(
        &self,
        spec: &CommandSpec,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<i32, RunError> {
        let runtime = Self::runtime(&spec.program)?;

        runtime.block_on(async {
            let mut child = Self::command(spec)
                .spawn()
                .map_err(|e| RunError::from_spawn(&spec.program, e))?;

            let io_error = |source| RunError::Io {
                program: spec.program.clone(),
                source,
            };
            let missing_pipe =
                || io_error(std::io::Error::other("child output pipe was not captured"));

            // Raw segments so a line that is not UTF-8 does not end the drain
            let mut stdout = BufReader::new(child.stdout.take().ok_or_else(missing_pipe)?).split(b'\n');
            let mut stderr = BufReader::new(child.stderr.take().ok_or_else(missing_pipe)?).split(b'\n');

            let drain = async {
                let mut stdout_open = true;
                let mut stderr_open = true;

                while stdout_open || stderr_open {
                    tokio::select! {
                        segment = stdout.next_segment(), if stdout_open => match segment {
                            Ok(Some(bytes)) => on_line(&decode_line(&bytes)),
                            _ => stdout_open = false,
                        },
                        segment = stderr.next_segment(), if stderr_open => match segment {
                            Ok(Some(bytes)) => on_line(&decode_line(&bytes)),
                            _ => stderr_open = false,
                        },
                    }
                }

                child.wait().await
            };

            let waited = tokio::time::timeout(spec.timeout, drain).await;
            match waited {
                Ok(Ok(status)) => Ok(status.code().unwrap_or(-1)),
                Ok(Err(source)) => Err(io_error(source)),
                Err(_) => {
                    // Best effort: kill_on_drop covers the case where kill itself fails.
                    let _ = child.kill().await;
                    Err(RunError::Timeout {
                        program: spec.program.clone(),
                        timeout: spec.timeout,
                    })
                }
            }
        })
    }
}

/// Mock command runner for testing
#[cfg(test)]
pub struct MockCommandRunner {
    /// Pre-configured results, matched by program name and first argument
    results: std::sync::Mutex<Vec<MockCommandResult>>,
    /// Every spec the runner was asked to execute, in order
    calls: std::sync::Mutex<Vec<CommandSpec>>,
}

#[cfg(test)]
#[derive(Clone, Debug)]
pub enum MockOutcome {
    Exit { code: i32, stdout: String, stderr: String },
    NotFound,
    Timeout,
}

#[cfg(test)]
#[derive(Clone, Debug)]
pub struct MockCommandResult {
    pub program: String,
    /// When set, only specs whose args contain this value match
    pub arg_contains: Option<String>,
    pub outcome: MockOutcome,
    /// Lines delivered to the streaming callback before the outcome
    pub lines: Vec<String>,
    /// Files created before returning, to simulate tool side effects
    pub creates: Vec<PathBuf>,
}

#[cfg(test)]
impl MockCommandResult {
    pub fn exit(program: &str, code: i32, stdout: &str) -> Self {
        Self {
            program: program.to_string(),
            arg_contains: None,
            outcome: MockOutcome::Exit {
                code,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
            lines: Vec::new(),
            creates: Vec::new(),
        }
    }

    pub fn failure(program: &str, code: i32, stderr: &str) -> Self {
        Self {
            program: program.to_string(),
            arg_contains: None,
            outcome: MockOutcome::Exit {
                code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
            lines: Vec::new(),
            creates: Vec::new(),
        }
    }

    pub fn not_found(program: &str) -> Self {
        Self {
            outcome: MockOutcome::NotFound,
            ..Self::exit(program, 0, "")
        }
    }

    pub fn timeout(program: &str) -> Self {
        Self {
            outcome: MockOutcome::Timeout,
            ..Self::exit(program, 0, "")
        }
    }

    pub fn when_arg(mut self, arg: &str) -> Self {
        self.arg_contains = Some(arg.to_string());
        self
    }

    pub fn with_lines(mut self, lines: &[&str]) -> Self {
        self.lines = lines.iter().map(|l| l.to_string()).collect();
        self
    }

    pub fn creating(mut self, path: impl Into<PathBuf>) -> Self {
        self.creates.push(path.into());
        self
    }

    fn matches(&self, spec: &CommandSpec) -> bool {
        self.program == spec.program
            && self
                .arg_contains
                .as_ref()
                .is_none_or(|needle| spec.args.iter().any(|a| a.contains(needle.as_str())))
    }
}

#[cfg(test)]
impl MockCommandRunner {
    pub fn new() -> Self {
        Self {
            results: std::sync::Mutex::new(Vec::new()),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn with_results(results: Vec<MockCommandResult>) -> Self {
        Self {
            results: std::sync::Mutex::new(results),
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Take the first matching result; unmatched commands succeed silently
    fn next(&self, spec: &CommandSpec) -> MockCommandResult {
        self.calls.lock().unwrap().push(spec.clone());
        let mut results = self.results.lock().unwrap();

        match results.iter().position(|r| r.matches(spec)) {
            Some(index) => results.remove(index),
            None => MockCommandResult::exit(&spec.program, 0, ""),
        }
    }

    fn resolve(spec: &CommandSpec, result: &MockCommandResult) -> Result<(i32, String, String), RunError> {
        for path in &result.creates {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            std::fs::write(path, "# generated\n").ok();
        }

        match &result.outcome {
            MockOutcome::Exit { code, stdout, stderr } => Ok((*code, stdout.clone(), stderr.clone())),
            MockOutcome::NotFound => Err(RunError::NotFound {
                program: spec.program.clone(),
            }),
            MockOutcome::Timeout => Err(RunError::Timeout {
                program: spec.program.clone(),
                timeout: spec.timeout,
            }),
        }
    }
}

#[cfg(test)]
impl Default for MockCommandRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl CommandRunner for MockCommandRunner {
    fn run_captured(&self, spec: &CommandSpec) -> Result<CapturedOutput, RunError> {
        let result = self.next(spec);
        let (exit_code, stdout, stderr) = Self::resolve(spec, &result)?;
        Ok(CapturedOutput {
            exit_code,
            stdout,
            stderr,
        })
    }

    fn run_streaming(
        &self,
        spec: &CommandSpec,
        on_line: &mut dyn FnMut(&str),
    ) -> Result<i32, RunError> {
        let result = self.next(spec);
        for line in &result.lines {
            on_line(line);
        }
        let (exit_code, stdout, stderr) = Self::resolve(spec, &result)?;
        for line in stdout.lines().chain(stderr.lines()) {
            on_line(line);
        }
        Ok(exit_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_display_quotes_arguments_with_spaces() {
        let spec = CommandSpec::new(
            "aztfexport",
            vec!["resource-group".to_string(), "my rg".to_string()],
        );
        assert_eq!(spec.display(), "aztfexport resource-group \"my rg\"");
    }

    #[test]
    fn test_mock_runner_matches_on_argument() {
        let runner = MockCommandRunner::with_results(vec![
            MockCommandResult::exit("az", 0, "groups").when_arg("group"),
            MockCommandResult::exit("az", 0, "accounts").when_arg("account"),
        ]);

        let spec = CommandSpec::new("az", vec!["account".to_string(), "list".to_string()]);
        let output = runner.run_captured(&spec).unwrap();
        assert_eq!(output.stdout, "accounts");
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn test_mock_runner_default_success() {
        let runner = MockCommandRunner::new();
        let output = runner
            .run_captured(&CommandSpec::new("unknown", Vec::new()))
            .unwrap();
        assert!(output.success());
    }

    #[test]
    fn test_real_runner_missing_executable() {
        let runner = RealCommandRunner::new();
        let spec = CommandSpec::new("definitely-not-an-installed-tool-4f2a", Vec::new());

        let err = runner.run_captured(&spec).unwrap_err();
        assert!(matches!(err, RunError::NotFound { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_real_runner_captures_streams() {
        let runner = RealCommandRunner::new();
        let spec = CommandSpec::new(
            "sh",
            vec!["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()],
        );

        let output = runner.run_captured(&spec).unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[cfg(unix)]
    #[test]
    fn test_real_runner_streams_merged_lines() {
        let runner = RealCommandRunner::new();
        let spec = CommandSpec::new(
            "sh",
            vec!["-c".to_string(), "echo one; echo two >&2; echo three".to_string()],
        );

        let mut lines = Vec::new();
        let code = runner
            .run_streaming(&spec, &mut |line| lines.push(line.to_string()))
            .unwrap();

        assert_eq!(code, 0);
        lines.sort();
        assert_eq!(lines, vec!["one", "three", "two"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_real_runner_streams_past_invalid_utf8() {
        let runner = RealCommandRunner::new();
        let script = "printf 'before\\n\\377\\nafter\\n'; \
                      head -c 300000 /dev/zero | tr '\\0' a; echo; echo done";
        let spec = CommandSpec::new("sh", vec!["-c".to_string(), script.to_string()])
            .with_timeout(Duration::from_secs(10));

        let mut lines = Vec::new();
        let code = runner
            .run_streaming(&spec, &mut |line| lines.push(line.to_string()))
            .unwrap();

        assert_eq!(code, 0);
        assert_eq!(lines[0], "before");
        assert_eq!(lines[1], "\u{FFFD}");
        assert_eq!(lines[2], "after");
        assert_eq!(lines[3].len(), 300000);
        assert_eq!(lines.last().map(String::as_str), Some("done"));
    }

    #[test]
    fn test_decode_line_strips_carriage_return() {
        assert_eq!(decode_line(b"resource\r"), "resource");
        assert_eq!(decode_line(b"a\xffb"), "a\u{FFFD}b");
    }

    #[cfg(unix)]
    #[test]
    fn test_real_runner_streaming_timeout_kills_child() {
        let runner = RealCommandRunner::new();
        let spec = CommandSpec::new("sleep", vec!["30".to_string()])
            .with_timeout(Duration::from_secs(1));

        let started = Instant::now();
        let err = runner.run_streaming(&spec, &mut |_| {}).unwrap_err();

        assert!(matches!(err, RunError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_real_runner_applies_env_overrides() {
        let runner = RealCommandRunner::new();
        let spec = CommandSpec::new("sh", vec!["-c".to_string(), "echo $NO_COLOR".to_string()])
            .with_env("NO_COLOR", "1");

        let output = runner.run_captured(&spec).unwrap();
        assert_eq!(output.stdout.trim(), "1");
    }
}
