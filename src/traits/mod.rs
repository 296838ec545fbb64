pub mod command;
pub mod filesystem;
pub mod http;
pub mod output;

pub use command::{CapturedOutput, CommandRunner, CommandSpec, RealCommandRunner, RunError};
pub use filesystem::{FileSystem, RealFileSystem};
pub use http::{HttpClient, ReqwestClient};
pub use output::{LogLevel, Output, TerminalOutput};

#[cfg(test)]
pub use command::{MockCommandResult, MockCommandRunner};
#[cfg(test)]
pub use filesystem::MockFileSystem;
#[cfg(test)]
pub use http::{MockHttpClient, RecordedRequest};
#[cfg(test)]
pub use output::{MockOutput, OutputMessage};
