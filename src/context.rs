use crate::traits::{
    CommandRunner, FileSystem, LogLevel, Output, RealCommandRunner, RealFileSystem, TerminalOutput,
};
#[cfg(test)]
use crate::traits::{MockCommandRunner, MockFileSystem, MockOutput};
use std::sync::Arc;

/// Application context that holds all dependencies for dependency injection
pub struct Context {
    pub fs: Arc<dyn FileSystem>,
    pub output: Arc<dyn Output>,
    pub runner: Arc<dyn CommandRunner>,
}

impl Context {
    /// Create a new context with real implementations (for production use)
    pub fn new(level: LogLevel) -> Self {
        Self {
            fs: Arc::new(RealFileSystem),
            output: Arc::new(TerminalOutput::new(level)),
            runner: Arc::new(RealCommandRunner::new()),
        }
    }

    /// Real implementations with every message on stderr
    pub fn diagnostics_only(level: LogLevel) -> Self {
        Self {
            output: Arc::new(TerminalOutput::diagnostics_only(level)),
            ..Self::new(level)
        }
    }

    /// Create a new context with mock implementations (for testing)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            fs: Arc::new(MockFileSystem::new()),
            output: Arc::new(MockOutput::new()),
            runner: Arc::new(MockCommandRunner::new()),
        }
    }

    /// Create a test context with specific mock implementations
    #[cfg(test)]
    pub fn test_with(
        fs: Arc<dyn FileSystem>,
        output: Arc<dyn Output>,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self { fs, output, runner }
    }
}

impl Clone for Context {
    fn clone(&self) -> Self {
        Self {
            fs: Arc::clone(&self.fs),
            output: Arc::clone(&self.output),
            runner: Arc::clone(&self.runner),
        }
    }
}
