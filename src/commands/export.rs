use anyhow::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::report_error;
use crate::config::Config;
use crate::config::pipeline::resolve_pipeline_variable;
use crate::context::Context;
use crate::export::{ExportManager, PtyWrapper, RunOptions};
use crate::publish::{GitRepoPublisher, RepoSettings};
use crate::results::RunSummary;
use crate::telemetry::LogAnalyticsSink;
use crate::traits::Output;

pub const RESULTS_FILE: &str = "export_results.json";

/// Command-line and environment overrides for an export run
#[derive(Debug, Clone, Default)]
pub struct ExportArgs {
    pub config_path: PathBuf,
    pub subscription_id: Option<String>,
    pub output_dir: Option<String>,
    pub push: Option<bool>,
    pub branch: Option<String>,
    pub workspace_id: Option<String>,
    pub shared_key: Option<String>,
    pub pat: Option<String>,
}

impl ExportArgs {
    /// Fold overrides into the loaded configuration and resolve placeholders
    pub fn apply(&self, config: &mut Config) {
        if let Some(dir) = self.output_dir.as_deref().filter(|d| !d.trim().is_empty()) {
            config.output.base_dir = dir.to_string();
        }
        if let Some(push) = self.push {
            config.git.push_to_repos = push;
        }
        if let Some(branch) = self.branch.as_deref().filter(|b| !b.trim().is_empty()) {
            config.git.branch = branch.trim().to_string();
        }
        if self.workspace_id.is_some() {
            config.log_analytics.workspace_id = self.workspace_id.clone();
        }
        if self.shared_key.is_some() {
            config.log_analytics.shared_key = self.shared_key.clone();
        }

        let resolve = |value: &mut Option<String>| {
            if let Some(v) = value.as_mut() {
                *v = resolve_pipeline_variable(v.trim());
            }
        };
        resolve(&mut config.azure_devops.organization);
        resolve(&mut config.azure_devops.project);
        resolve(&mut config.log_analytics.workspace_id);
        resolve(&mut config.log_analytics.shared_key);
    }
}

/// Handles the 'export' command - the full backup run
pub struct ExportCommand;

impl ExportCommand {
    /// Run the export and return the process exit code
    pub fn execute(ctx: &Context, mut config: Config, args: &ExportArgs) -> Result<i32> {
        args.apply(&mut config);
        let output = ctx.output.as_ref();

        let mut options = RunOptions::from_config(&config);
        options.subscription_id = args.subscription_id.clone();

        output.section("Azure Terraform Backup");
        output.key_value("Configuration", &args.config_path.display().to_string());
        output.key_value("Output directory", &options.base_dir.display().to_string());
        if let Some(id) = &options.subscription_id {
            output.key_value("Subscription", id);
        }
        output.key_value(
            "Git push",
            if options.push { "enabled" } else { "disabled" },
        );

        if options.push {
            Self::check_push_settings(&config, args.pat.as_deref(), output);
        }

        let publisher = GitRepoPublisher::new(
            ctx.runner.as_ref(),
            ctx.fs.as_ref(),
            output,
            Self::repo_settings(&config, args.pat.clone()),
        );
        let telemetry = LogAnalyticsSink::new(
            config.log_analytics.workspace_id.clone(),
            config.log_analytics.shared_key.clone(),
            &config.log_analytics.log_type,
            output,
        );
        let pty = if config.aztfexport.use_pty_wrapper {
            PtyWrapper::detect()
        } else {
            PtyWrapper::disabled()
        };

        let manager = ExportManager::new(
            &config,
            ctx.runner.as_ref(),
            ctx.fs.as_ref(),
            output,
            &publisher,
            &telemetry,
        )
        .with_pty(pty);

        let summary = match manager.run(&options) {
            Ok(summary) => summary,
            Err(e) => {
                report_error(output, &e);
                return Ok(1);
            }
        };

        let results_path = options.base_dir.join(RESULTS_FILE);
        match serde_json::to_string_pretty(&summary) {
            Ok(json) => match ctx.fs.write(&results_path, &json) {
                Ok(()) => output.info(&format!("Results saved to: {}", results_path.display())),
                Err(e) => output.warning(&format!("Could not save results: {:#}", e)),
            },
            Err(e) => output.warning(&format!("Could not serialize results: {}", e)),
        }

        print_summary(output, &summary, options.push);

        if summary.is_empty() {
            output.error("No subscriptions were exported");
            return Ok(1);
        }
        Ok(0)
    }

    fn repo_settings(config: &Config, pat: Option<String>) -> RepoSettings {
        let repo_names: BTreeMap<String, String> = config
            .subscriptions
            .iter()
            .filter_map(|entry| {
                entry
                    .repo_name
                    .as_deref()
                    .map(str::trim)
                    .filter(|name| !name.is_empty())
                    .map(|name| (entry.id.clone(), name.to_string()))
            })
            .collect();

        RepoSettings {
            organization: config.azure_devops.organization.clone(),
            project: config.azure_devops.project.clone(),
            base_branch: config.git.branch.clone(),
            pat,
            repo_names,
        }
    }

    fn check_push_settings(config: &Config, pat: Option<&str>, output: &dyn Output) {
        output.warning("Git push is ENABLED - changes will be pushed to repositories");
        if config.azure_devops.organization.is_none() || config.azure_devops.project.is_none() {
            output.warning(
                "azure_devops.organization and azure_devops.project must be set for pushes to succeed",
            );
        }
        if pat.is_none() {
            output.warning("AZURE_DEVOPS_PAT is not set; pushes will fail");
        }
    }
}

/// Operator-facing summary of a finished run
pub fn print_summary(output: &dyn Output, summary: &RunSummary, push: bool) {
    let totals = &summary.totals;

    output.section("Export Summary");
    output.key_value(
        "Subscriptions processed",
        &totals.subscriptions_processed.to_string(),
    );
    output.key_value(
        "With successful export",
        &totals.subscriptions_successful.to_string(),
    );
    output.key_value(
        "Resource groups",
        &format!(
            "{} total, {} successful, {} failed",
            totals.total_rgs, totals.successful_rgs, totals.failed_rgs
        ),
    );
    output.key_value(
        "Resources",
        &format!(
            "{} total, {} exported, {} failed, {} skipped",
            totals.total_resources,
            totals.exported_resources,
            totals.failed_resources,
            totals.skipped_resources
        ),
    );

    if push {
        output.key_value(
            "Repositories pushed",
            &format!("{}/{}", totals.pushed, totals.pushed + totals.push_failed),
        );
        for result in summary.subscriptions.values() {
            output.dimmed(&format!(
                "  {} ({}): {}",
                result.subscription_name, result.subscription_id, result.git_push_status
            ));
        }
    } else {
        output.info("Git push is disabled - exported code is in the local directory only");
        output.dimmed("  Enable with git.push_to_repos: true, PUSH_TO_REPOS=true or --push");
    }
}
