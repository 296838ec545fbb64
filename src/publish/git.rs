use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::discovery::Subscription;
use crate::traits::{CapturedOutput, CommandRunner, CommandSpec, FileSystem, Output};

const GIT_TIMEOUT: Duration = Duration::from_secs(60);
const PUSH_TIMEOUT: Duration = Duration::from_secs(600);

const GITIGNORE: &str = "# Terraform files
*.tfstate
*.tfstate.*
*.tfvars
.terraform/
.terraform.lock.hcl
crash.log
crash.*.log
*.tfplan
override.tf
override.tf.json
*_override.tf
*_override.tf.json

# IDE
.idea/
.vscode/
*.swp
*.swo
*~

# OS
.DS_Store
Thumbs.db
";

/// Publishes a subscription's export directory to version control
pub trait GitPublisher {
    /// Commit and push `export_path`; false on any failure
    fn push(&self, subscription: &Subscription, export_path: &Path) -> bool;
}

/// Azure DevOps target for `GitRepoPublisher`
#[derive(Debug, Clone, Default)]
pub struct RepoSettings {
    pub organization: Option<String>,
    pub project: Option<String>,
    pub base_branch: String,
    pub pat: Option<String>,
    /// Repository name per subscription id; the subscription name otherwise
    pub repo_names: BTreeMap<String, String>,
}

/// Pushes to `https://dev.azure.com/<org>/<project>/_git/<repo>` with the git CLI
pub struct GitRepoPublisher<'a> {
    runner: &'a dyn CommandRunner,
    fs: &'a dyn FileSystem,
    output: &'a dyn Output,
    settings: RepoSettings,
}

impl<'a> GitRepoPublisher<'a> {
    pub fn new(
        runner: &'a dyn CommandRunner,
        fs: &'a dyn FileSystem,
        output: &'a dyn Output,
        settings: RepoSettings,
    ) -> Self {
        Self {
            runner,
            fs,
            output,
            settings,
        }
    }

    pub fn repo_name(&self, subscription: &Subscription) -> String {
        self.settings
            .repo_names
            .get(&subscription.id)
            .cloned()
            .unwrap_or_else(|| subscription.name.clone())
    }

    /// Repository URL with every path segment percent-encoded
    pub fn repo_url(&self, subscription: &Subscription) -> Option<Url> {
        let organization = self.settings.organization.as_deref()?;
        let project = self.settings.project.as_deref()?;
        let repo = self.repo_name(subscription);
        if repo.trim().is_empty() {
            return None;
        }

        let mut url = Url::parse("https://dev.azure.com").ok()?;
        url.path_segments_mut()
            .ok()?
            .clear()
            .push(organization)
            .push(project)
            .push("_git")
            .push(&repo);
        Some(url)
    }

    pub fn branch_name(&self) -> String {
        branch_name_at(&self.settings.base_branch, Local::now())
    }

    fn git(&self, repo_path: &Path, args: &[&str]) -> Option<CapturedOutput> {
        let spec = CommandSpec::new("git", args.iter().map(|a| a.to_string()).collect())
            .with_working_dir(repo_path)
            .with_env("GIT_TERMINAL_PROMPT", "0")
            .with_timeout(GIT_TIMEOUT);

        match self.runner.run_captured(&spec) {
            Ok(output) => Some(output),
            Err(e) => {
                self.output.error(&format!("git {}: {}", args.first().unwrap_or(&""), e));
                None
            }
        }
    }

    fn init_repo(&self, repo_path: &Path) -> bool {
        if self.fs.exists(&repo_path.join(".git")) {
            self.output.debug("Git repository already initialized");
            return true;
        }

        match self.git(repo_path, &["init"]) {
            Some(out) if out.success() => {
                self.output.debug("Initialized git repository");
                true
            }
            Some(out) => {
                self.output.error(&format!(
                    "Failed to initialize git repository: {}",
                    out.stderr.trim()
                ));
                false
            }
            None => false,
        }
    }

    fn write_scaffolding(&self, repo_path: &Path, subscription: &Subscription) -> bool {
        let written = self
            .fs
            .write(&repo_path.join(".gitignore"), GITIGNORE)
            .and_then(|_| {
                self.fs
                    .write(&repo_path.join("README.md"), &readme(subscription))
            });

        match written {
            Ok(()) => true,
            Err(e) => {
                self.output
                    .error(&format!("Failed to write repository files: {:#}", e));
                false
            }
        }
    }

    fn configure_remote(&self, repo_path: &Path, repo_url: &str) -> bool {
        let existing = self.git(repo_path, &["remote", "get-url", "origin"]);

        let result = match existing {
            Some(out) if out.success() => {
                if out.stdout.trim() == repo_url {
                    return true;
                }
                self.git(repo_path, &["remote", "set-url", "origin", repo_url])
            }
            _ => self.git(repo_path, &["remote", "add", "origin", repo_url]),
        };

        match result {
            Some(out) if out.success() => true,
            Some(out) => {
                self.output
                    .error(&format!("Failed to configure git remote: {}", out.stderr.trim()));
                false
            }
            None => false,
        }
    }

    /// Check out `branch`, creating it if needed; the branch actually checked out
    fn checkout(&self, repo_path: &Path, branch: &str) -> Option<String> {
        let created = self.git(repo_path, &["checkout", "-b", branch])?;
        if created.success() {
            self.output.debug(&format!("Created and checked out branch: {}", branch));
            return Some(branch.to_string());
        }

        let stderr = created.stderr.to_lowercase();
        if (stderr.contains("already exists") || stderr.contains("already on"))
            && let Some(out) = self.git(repo_path, &["checkout", branch])
            && out.success()
        {
            return Some(branch.to_string());
        }

        self.output.warning(&format!(
            "Could not checkout branch {}: {}",
            branch,
            created.stderr.trim()
        ));
        self.output.warning("Continuing with current branch");

        self.git(repo_path, &["rev-parse", "--abbrev-ref", "HEAD"])
            .filter(|out| out.success())
            .map(|out| out.stdout.trim().to_string())
            .filter(|current| !current.is_empty())
    }

    fn commit(&self, repo_path: &Path, subscription: &Subscription) -> bool {
        match self.git(repo_path, &["add", "-A"]) {
            Some(out) if out.success() => {}
            Some(out) => {
                self.output
                    .error(&format!("Failed to stage changes: {}", out.stderr.trim()));
                return false;
            }
            None => return false,
        }

        let message = format!(
            "Export Terraform code for subscription: {}",
            subscription.name
        );
        let Some(out) = self.git(repo_path, &["commit", "-m", &message]) else {
            return false;
        };

        if out.success() {
            self.output.success(&format!("Committed changes: {}", message));
            return true;
        }

        let combined = format!("{}\n{}", out.stdout, out.stderr).to_lowercase();
        if combined.contains("nothing to commit") {
            self.output.info("No changes to commit");
            return true;
        }

        self.output
            .error(&format!("Failed to commit: {}", out.stderr.trim()));
        false
    }

    fn push_branch(&self, repo_path: &Path, branch: &str, repo_url: &Url) -> bool {
        let Some(pat) = self.settings.pat.as_deref() else {
            self.output.error("PAT token not available for push");
            return false;
        };

        let mut auth_url = repo_url.clone();
        if auth_url.set_username(pat).is_err() {
            self.output.error("Could not embed credentials in repository URL");
            return false;
        }

        if !self
            .git(repo_path, &["remote", "set-url", "origin", auth_url.as_str()])
            .is_some_and(|out| out.success())
        {
            self.output.error("Failed to set authenticated remote URL");
            return false;
        }

        let spec = CommandSpec::new(
            "git",
            vec![
                "push".to_string(),
                "-u".to_string(),
                "origin".to_string(),
                branch.to_string(),
                "--force".to_string(),
            ],
        )
        .with_working_dir(repo_path)
        .with_env("GIT_TERMINAL_PROMPT", "0")
        .with_env("GIT_ASKPASS", "echo")
        .with_timeout(PUSH_TIMEOUT);

        let pushed = self.runner.run_captured(&spec);

        // Do not leave the token in .git/config
        self.git(repo_path, &["remote", "set-url", "origin", repo_url.as_str()]);

        match pushed {
            Ok(out) if out.success() => {
                self.output.success(&format!("Pushed to {} branch", branch));
                true
            }
            Ok(out) => {
                let message = if out.stderr.trim().is_empty() {
                    out.stdout
                } else {
                    out.stderr
                };
                let message = message.replace(pat, "***");
                self.output
                    .error(&format!("Failed to push: {}", message.trim()));

                let lowered = message.to_lowercase();
                if lowered.contains("not found") || lowered.contains("does not exist") {
                    self.repository_missing_hint(repo_url);
                }
                false
            }
            Err(e) => {
                self.output.error(&format!("Error during git push: {}", e));
                false
            }
        }
    }

    fn repository_missing_hint(&self, repo_url: &Url) {
        let repo = repo_url
            .path_segments()
            .and_then(|segments| segments.last())
            .unwrap_or("N/A");

        self.output.error("Repository does not exist in Azure DevOps.");
        self.output.error("Please create the repository first:");
        self.output.error(&format!(
            "  Organization: {}",
            self.settings.organization.as_deref().unwrap_or("N/A")
        ));
        self.output.error(&format!(
            "  Project: {}",
            self.settings.project.as_deref().unwrap_or("N/A")
        ));
        self.output.error(&format!("  Repository: {}", repo));
        self.output
            .error("You can create it with: aztf-backup create-repos");
    }
}

impl GitPublisher for GitRepoPublisher<'_> {
    fn push(&self, subscription: &Subscription, export_path: &Path) -> bool {
        let Some(repo_url) = self.repo_url(subscription) else {
            self.output.warning(&format!(
                "No repository URL configured for subscription {} (set azure_devops.organization and project)",
                subscription.id
            ));
            return false;
        };

        if self.settings.pat.is_none() {
            self.output.error(
                "Azure DevOps PAT token not found. Set AZURE_DEVOPS_PAT or SYSTEM_ACCESS_TOKEN",
            );
            return false;
        }

        let branch = self.branch_name();
        self.output
            .info(&format!("Pushing to repository: {}", repo_url));
        self.output.key_value("Branch", &branch);

        if !self.init_repo(export_path) || !self.write_scaffolding(export_path, subscription) {
            return false;
        }

        if !self.configure_remote(export_path, repo_url.as_str()) {
            return false;
        }

        let Some(branch) = self.checkout(export_path, &branch) else {
            self.output.error("No branch to push");
            return false;
        };

        if !self.commit(export_path, subscription) {
            return false;
        }

        if !self.push_branch(export_path, &branch, &repo_url) {
            return false;
        }

        self.output
            .success(&format!("Successfully pushed to repository: {}", repo_url));
        true
    }
}

/// `<base>-YYYY-MM-DD-HHMM`
pub fn branch_name_at(base: &str, at: DateTime<Local>) -> String {
    format!("{}-{}", base, at.format("%Y-%m-%d-%H%M"))
}

fn readme(subscription: &Subscription) -> String {
    format!(
        r#"# Terraform Infrastructure as Code

This repository contains Terraform code for Azure resources exported from subscription: **{name}**

## Subscription Information

- **Subscription ID**: `{id}`
- **Subscription Name**: {name}

## Structure

Each resource group is organized in its own directory:

```
resource-group-name/
├── main.tf
├── providers.tf
└── ...
```

## Usage

```bash
cd resource-group-name
terraform init
terraform plan
```

## Notes

- Generated with `aztfexport`
- Review and test before applying to production
"#,
        name = subscription.name,
        id = subscription.id
    )
}

/// Test double recording every push request
#[cfg(test)]
pub struct MockGitPublisher {
    result: bool,
    calls: std::sync::Mutex<Vec<(String, std::path::PathBuf)>>,
}

#[cfg(test)]
impl MockGitPublisher {
    pub fn new(result: bool) -> Self {
        Self {
            result,
            calls: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(String, std::path::PathBuf)> {
        self.calls.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl GitPublisher for MockGitPublisher {
    fn push(&self, subscription: &Subscription, export_path: &Path) -> bool {
        self.calls
            .lock()
            .unwrap()
            .push((subscription.id.clone(), export_path.to_path_buf()));
        self.result
    }
}
