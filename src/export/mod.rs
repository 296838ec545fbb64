//! Export tool invocation: argument building, execution and classification

pub mod command;
pub mod executor;
pub mod manager;
pub mod outcome;
pub mod parser;
pub mod pty;

pub use manager::{ExportManager, RunOptions};
pub use outcome::{ErrorType, ExportOutcome};
pub use pty::PtyWrapper;
