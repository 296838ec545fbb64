use std::path::{Path, PathBuf};
use std::time::Duration;

use super::command::ExportCommandBuilder;
use super::executor::ExportExecutor;
use super::pty::PtyWrapper;
use crate::config::Config;
use crate::discovery::{AzureCli, SelectionOptions, Subscription, select_subscriptions};
use crate::error::{ExportError, ExportResult};
use crate::publish::{GitPublisher, after_push, should_push};
use crate::results::{GitPushStatus, RunSummary, SubscriptionResult, summarize};
use crate::telemetry::{SubscriptionStatus, TelemetrySink};
use crate::traits::{CommandRunner, CommandSpec, FileSystem, Output};

/// Below this share of free space the output volume gets a warning
const LOW_DISK_PERCENT: f64 = 5.0;
const DF_TIMEOUT: Duration = Duration::from_secs(10);

/// Run-wide settings after CLI and environment overrides
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Export only this subscription
    pub subscription_id: Option<String>,
    pub base_dir: PathBuf,
    pub push: bool,
    pub create_rg_folders: bool,
    pub cleanup_after_push: bool,
    pub timeout: Duration,
}

impl RunOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            subscription_id: None,
            base_dir: PathBuf::from(&config.output.base_dir),
            push: config.git.push_to_repos,
            create_rg_folders: config.output.create_rg_folders,
            cleanup_after_push: config.output.cleanup_after_push,
            timeout: Duration::from_secs(config.aztfexport.timeout_seconds),
        }
    }
}

/// Drives discovery, export, push and telemetry for every subscription
/// of a run, strictly one at a time
pub struct ExportManager<'a> {
    config: &'a Config,
    runner: &'a dyn CommandRunner,
    fs: &'a dyn FileSystem,
    output: &'a dyn Output,
    publisher: &'a dyn GitPublisher,
    telemetry: &'a dyn TelemetrySink,
    pty: PtyWrapper,
}

impl<'a> ExportManager<'a> {
    pub fn new(
        config: &'a Config,
        runner: &'a dyn CommandRunner,
        fs: &'a dyn FileSystem,
        output: &'a dyn Output,
        publisher: &'a dyn GitPublisher,
        telemetry: &'a dyn TelemetrySink,
    ) -> Self {
        Self {
            config,
            runner,
            fs,
            output,
            publisher,
            telemetry,
            pty: PtyWrapper::disabled(),
        }
    }

    pub fn with_pty(mut self, pty: PtyWrapper) -> Self {
        self.pty = pty;
        self
    }

    /// Export every selected subscription
    ///
    /// Fails only when discovery comes back empty or the requested
    /// subscription is not available; everything else is recorded in the
    /// summary.
    pub fn run(&self, options: &RunOptions) -> ExportResult<RunSummary> {
        let azure = AzureCli::new(self.runner, self.output);

        self.output.section("Discovering subscriptions");
        let discovered = azure.list_subscriptions();
        if discovered.is_empty() {
            return Err(ExportError::DiscoveryFailed(
                "no enabled subscriptions found".to_string(),
            ));
        }

        let work_set = select_subscriptions(
            &discovered,
            self.config,
            &SelectionOptions {
                only: options.subscription_id.clone(),
                schedule: None,
                use_declared: true,
            },
        )?;

        for id in &work_set.unavailable {
            self.output.warning(&format!(
                "Subscription {} is configured but not enabled for this identity, skipping",
                id
            ));
        }
        for (subscription, pattern) in &work_set.excluded {
            self.output.info(&format!(
                "Excluding subscription {} ({}) - matched pattern: {}",
                subscription.name, subscription.id, pattern
            ));
        }
        self.output.info(&format!(
            "{} subscription(s) to export",
            work_set.selected.len()
        ));

        if let Err(e) = self.fs.create_dir_all(&options.base_dir) {
            self.output.warning(&format!(
                "Could not create output directory {}: {:#}",
                options.base_dir.display(),
                e
            ));
        }
        self.check_disk_space(&options.base_dir);

        let results = work_set
            .selected
            .iter()
            .map(|subscription| self.process_subscription(subscription, options))
            .collect();

        Ok(summarize(results))
    }

    /// Export, push and report one subscription
    pub fn process_subscription(
        &self,
        subscription: &Subscription,
        options: &RunOptions,
    ) -> SubscriptionResult {
        let sub_dir = options.base_dir.join(sanitize_name(&subscription.name));
        let mut result = self.export_subscription(subscription, &sub_dir, options);

        if should_push(&result, options.push) {
            self.output
                .subsection(&format!("Pushing {} to its repository", subscription.name));
            let pushed = self.publisher.push(subscription, &sub_dir);
            result.git_push_status = if pushed {
                GitPushStatus::Success
            } else {
                self.report(&ExportError::PushFailed(subscription.id.clone()));
                GitPushStatus::Failed
            };
            after_push(
                pushed,
                options.cleanup_after_push,
                &sub_dir,
                self.fs,
                self.output,
            );
        } else if options.push {
            self.output.info(&format!(
                "Skipping push for {}: no resource group exported successfully",
                subscription.name
            ));
        }

        result.finish();
        self.telemetry.send(&SubscriptionStatus::from(&result));
        result
    }

    /// Export every admitted resource group of one subscription
    pub fn export_subscription(
        &self,
        subscription: &Subscription,
        sub_dir: &Path,
        options: &RunOptions,
    ) -> SubscriptionResult {
        let mut result = SubscriptionResult::new(&subscription.id, &subscription.name);

        self.output
            .section(&format!("Exporting subscription: {}", subscription.name));
        self.output.key_value("Subscription ID", &subscription.id);

        if let Err(e) = self.fs.create_dir_all(sub_dir) {
            let message = format!("Could not create {}: {:#}", sub_dir.display(), e);
            self.output.error(&message);
            result.error = Some(message);
            return result;
        }

        let listing = AzureCli::new(self.runner, self.output).list_resource_groups(
            &subscription.id,
            Some(&subscription.name),
            &self.config.resource_group_excludes(),
        );
        if listing.included.is_empty() {
            self.output.info("No resource groups to export");
            return result;
        }

        let builder = ExportCommandBuilder::new(&self.config.aztfexport);
        let executor = ExportExecutor::new(self.runner, self.fs, self.output)
            .with_timeout(options.timeout)
            .with_pty(self.pty.clone());

        for resource_group in &listing.included {
            let rg_dir = if options.create_rg_folders {
                sub_dir.join(sanitize_name(resource_group))
            } else {
                sub_dir.to_path_buf()
            };

            self.output
                .subsection(&format!("Resource group: {}", resource_group));

            if let Err(e) = self.fs.create_dir_all(&rg_dir) {
                self.output.error(&format!(
                    "Could not create {}: {:#}",
                    rg_dir.display(),
                    e
                ));
            }

            let invocation = builder.build(&subscription.id, &rg_dir, resource_group);
            let outcome = executor.execute(&invocation, &rg_dir, sub_dir);
            if let Some(error) = outcome.to_error(executor.timeout()) {
                self.report(&error);
            }

            result.fold(resource_group, &rg_dir.display().to_string(), outcome);
        }

        if result.failed_rgs > 0 {
            result.error = Some(format!(
                "{} of {} resource group(s) failed to export",
                result.failed_rgs, result.total_rgs
            ));
        }

        self.output.success(&format!(
            "Export completed for {}",
            subscription.name
        ));
        self.output.key_value(
            "Successful",
            &format!("{}/{}", result.successful_rgs, result.total_rgs),
        );
        self.output.key_value(
            "Failed",
            &format!("{}/{}", result.failed_rgs, result.total_rgs),
        );

        result
    }

    fn report(&self, error: &ExportError) {
        self.output.error(&error.to_string());
        if let Some(hint) = error.remediation() {
            self.output.info(hint);
        }
    }

    /// Warn when the output volume is nearly full; silent when unknown
    fn check_disk_space(&self, path: &Path) {
        if !cfg!(unix) {
            return;
        }

        let spec = CommandSpec::new("df", vec!["-Pk".to_string(), path.display().to_string()])
            .with_timeout(DF_TIMEOUT);
        let Ok(out) = self.runner.run_captured(&spec) else {
            return;
        };
        if !out.success() {
            return;
        }

        if let Some(free) = free_percent(&out.stdout)
            && free < LOW_DISK_PERCENT
        {
            self.output.warning(&format!(
                "Low disk space: {:.1}% free on {}",
                free,
                path.display()
            ));
        }
    }
}

/// Directory-safe form of a subscription or resource group name
pub fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
        .to_lowercase()
}

/// Free space in percent from POSIX `df -Pk` output
fn free_percent(df_output: &str) -> Option<f64> {
    let line = df_output.lines().nth(1)?;
    let columns: Vec<&str> = line.split_whitespace().collect();
    let total: f64 = columns.get(1)?.parse().ok()?;
    let available: f64 = columns.get(3)?.parse().ok()?;
    if total <= 0.0 {
        return None;
    }
    Some(available / total * 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::ErrorType;
    use crate::publish::MockGitPublisher;
    use crate::telemetry::MockTelemetrySink;
    use crate::traits::{MockCommandResult, MockCommandRunner, MockOutput, RealFileSystem};
    use tempfile::TempDir;

    const ACCOUNTS: &str = r#"[
        {"id": "s1", "name": "Sub One", "state": "Enabled"},
        {"id": "s2", "name": "Sub Two", "state": "Enabled"}
    ]"#;

    fn config(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn options(base: &Path) -> RunOptions {
        RunOptions {
            base_dir: base.to_path_buf(),
            ..RunOptions::from_config(&Config::default())
        }
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Sub One (Prod)"), "sub_one__prod_");
        assert_eq!(sanitize_name("rg-app_01"), "rg-app_01");
    }

    #[test]
    fn test_free_percent() {
        let df = "Filesystem 1024-blocks Used Available Capacity Mounted on\n\
                  /dev/sda1 1000 970 30 97% /\n";
        assert_eq!(free_percent(df), Some(3.0));
        assert_eq!(free_percent("garbage"), None);
    }

    #[test]
    fn test_excluded_subscription_absent_from_summary() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("exports");
        let config = config(
            r#"
subscriptions:
  - {id: s1, name: "Sub One"}
  - {id: s2, name: "Sub Two"}
exclude_subscriptions: ["s2"]
"#,
        );

        let runner = MockCommandRunner::with_results(vec![
            MockCommandResult::exit("az", 0, ACCOUNTS).when_arg("account"),
            MockCommandResult::exit("az", 0, r#"[{"name": "rg1"}]"#).when_arg("s1"),
            MockCommandResult::exit("aztfexport", 0, "")
                .creating(base.join("sub_one").join("rg1").join("main.tf")),
        ]);
        let fs = RealFileSystem;
        let output = MockOutput::new();
        let publisher = MockGitPublisher::new(true);
        let telemetry = MockTelemetrySink::new(true);

        let manager = ExportManager::new(&config, &runner, &fs, &output, &publisher, &telemetry);
        let summary = manager.run(&options(&base)).unwrap();

        assert_eq!(summary.subscriptions.keys().collect::<Vec<_>>(), vec!["s1"]);
        assert!(!summary.subscriptions.contains_key("s2"));
        assert_eq!(summary.totals.subscriptions_processed, 1);
        assert_eq!(summary.totals.subscriptions_successful, 1);

        let s1 = &summary.subscriptions["s1"];
        assert_eq!(s1.successful_rgs + s1.failed_rgs, s1.total_rgs);
        assert_eq!(s1.resource_groups["rg1"].status, "success");

        assert!(
            !runner
                .calls()
                .iter()
                .any(|c| c.args.iter().any(|a| a == "s2"))
        );
        assert_eq!(telemetry.sent().len(), 1);
        assert!(publisher.calls().is_empty());
    }

    #[test]
    fn test_empty_discovery_is_fatal() {
        let temp = TempDir::new().unwrap();
        let config = Config::default();
        let runner = MockCommandRunner::with_results(vec![
            MockCommandResult::exit("az", 0, "[]").when_arg("account"),
        ]);
        let fs = RealFileSystem;
        let output = MockOutput::new();
        let publisher = MockGitPublisher::new(true);
        let telemetry = MockTelemetrySink::new(true);

        let manager = ExportManager::new(&config, &runner, &fs, &output, &publisher, &telemetry);
        let err = manager.run(&options(temp.path())).unwrap_err();
        assert!(matches!(err, ExportError::DiscoveryFailed(_)));
    }

    #[test]
    fn test_partial_failure_pushes_and_records_counts() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().to_path_buf();
        let config = config("aztfexport: {exclude_resource_types: ['Microsoft.Foo/bar']}");

        let runner = MockCommandRunner::with_results(vec![
            MockCommandResult::exit("az", 0, ACCOUNTS).when_arg("account"),
            MockCommandResult::exit("az", 0, r#"[{"name": "good"}, {"name": "bad"}]"#)
                .when_arg("s1"),
            MockCommandResult::exit("az", 0, "[]").when_arg("s2"),
            MockCommandResult::exit("aztfexport", 0, "")
                .when_arg("resourceGroup == 'good'")
                .with_lines(&["Exported 3 resources"])
                .creating(base.join("sub_one").join("good").join("main.tf")),
            MockCommandResult::failure("aztfexport", 1, "AuthorizationFailed: no access")
                .when_arg("resourceGroup == 'bad'"),
        ]);
        let fs = RealFileSystem;
        let output = MockOutput::new();
        let publisher = MockGitPublisher::new(true);
        let telemetry = MockTelemetrySink::new(true);

        let manager = ExportManager::new(&config, &runner, &fs, &output, &publisher, &telemetry);
        let mut options = options(&base);
        options.push = true;
        let summary = manager.run(&options).unwrap();

        let s1 = &summary.subscriptions["s1"];
        assert_eq!(s1.total_rgs, 2);
        assert_eq!(s1.successful_rgs, 1);
        assert_eq!(s1.failed_rgs, 1);
        assert_eq!(s1.resource_groups["bad"].outcome.error_type, ErrorType::Permission);
        assert_eq!(s1.git_push_status, GitPushStatus::Success);
        assert!(s1.error.is_some());

        let s2 = &summary.subscriptions["s2"];
        assert_eq!(s2.total_rgs, 0);
        assert_eq!(s2.git_push_status, GitPushStatus::Skipped);

        assert_eq!(publisher.calls().len(), 1);
        assert_eq!(summary.totals.pushed, 1);
        assert!(output.to_text().contains("RBAC"));

        let sent = telemetry.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].status, "success");
    }

    #[test]
    fn test_failed_push_and_cleanup() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().to_path_buf();
        let config = Config::default();
        let runner = MockCommandRunner::with_results(vec![
            MockCommandResult::exit("az", 0, r#"[{"name": "rg"}]"#).when_arg("group"),
            MockCommandResult::exit("aztfexport", 0, "")
                .creating(base.join("sub_one").join("rg").join("main.tf")),
        ]);
        let fs = RealFileSystem;
        let output = MockOutput::new();
        let publisher = MockGitPublisher::new(false);
        let telemetry = MockTelemetrySink::new(false);

        let manager = ExportManager::new(&config, &runner, &fs, &output, &publisher, &telemetry);
        let mut options = options(&base);
        options.push = true;
        options.cleanup_after_push = true;

        let result = manager.process_subscription(&Subscription::enabled("s1", "Sub One"), &options);
        assert_eq!(result.git_push_status, GitPushStatus::Failed);
        assert!(result.end_time.is_some());
        assert!(base.join("sub_one").exists());
        assert!(output.get_errors().iter().any(|e| e.contains("Push failed")));
    }

    #[test]
    fn test_shared_subscription_folder() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().to_path_buf();
        let config = Config::default();
        let runner = MockCommandRunner::with_results(vec![
            MockCommandResult::exit("az", 0, r#"[{"name": "RG-A"}]"#).when_arg("group"),
            MockCommandResult::exit("aztfexport", 0, "")
                .creating(base.join("sub_one").join("main.tf")),
        ]);
        let fs = RealFileSystem;
        let output = MockOutput::new();
        let publisher = MockGitPublisher::new(true);
        let telemetry = MockTelemetrySink::new(true);

        let manager = ExportManager::new(&config, &runner, &fs, &output, &publisher, &telemetry);
        let mut options = options(&base);
        options.create_rg_folders = false;

        let result = manager.process_subscription(&Subscription::enabled("s1", "Sub One"), &options);
        assert_eq!(result.successful_rgs, 1);

        let export = runner
            .calls()
            .into_iter()
            .find(|c| c.program == "aztfexport")
            .unwrap();
        let output_dir = export
            .args
            .iter()
            .position(|a| a == "--output-dir")
            .map(|i| export.args[i + 1].clone())
            .unwrap();
        assert_eq!(PathBuf::from(output_dir), base.join("sub_one"));
    }
}
