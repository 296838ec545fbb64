use std::path::PathBuf;

/// Runs the export tool under `script(1)` so it sees a terminal
///
/// aztfexport probes for an interactive terminal even in non-interactive
/// mode. When util-linux `script` is available the command is wrapped as
/// `script -q -e -c '<cmd>' /dev/null`; otherwise it runs on plain pipes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PtyWrapper {
    script: Option<PathBuf>,
}

impl PtyWrapper {
    /// Look for `script` on PATH (Linux only; the BSD variant takes other flags)
    pub fn detect() -> Self {
        if !cfg!(target_os = "linux") {
            return Self::disabled();
        }

        Self {
            script: which::which("script").ok(),
        }
    }

    pub fn disabled() -> Self {
        Self { script: None }
    }

    #[cfg(test)]
    pub fn with_script(path: impl Into<PathBuf>) -> Self {
        Self {
            script: Some(path.into()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.script.is_some()
    }

    /// Program and arguments to actually launch
    pub fn wrap(&self, program: &str, args: &[String]) -> (String, Vec<String>) {
        match &self.script {
            Some(script) => {
                let command_line = std::iter::once(program)
                    .chain(args.iter().map(String::as_str))
                    .map(shell_quote)
                    .collect::<Vec<_>>()
                    .join(" ");

                (
                    script.display().to_string(),
                    vec![
                        "-q".to_string(),
                        "-e".to_string(),
                        "-c".to_string(),
                        command_line,
                        "/dev/null".to_string(),
                    ],
                )
            }
            None => (program.to_string(), args.to_vec()),
        }
    }
}

/// POSIX single-quote an argument unless it is made of safe characters only
pub fn shell_quote(arg: &str) -> String {
    let safe = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,+%".contains(c));

    if safe {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}
