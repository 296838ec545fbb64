//! Push gate and version-control publishing of exports

pub mod gate;
pub mod git;

pub use gate::{after_push, should_push};
pub use git::{GitPublisher, GitRepoPublisher, RepoSettings};

#[cfg(test)]
pub use git::MockGitPublisher;
