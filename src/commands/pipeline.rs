use anyhow::{Context as _, Result};
use std::path::Path;

use super::report_error;
use crate::config::Config;
use crate::config::pipeline::{resolve_pipeline_variable, resolve_spn_for_subscription};
use crate::context::Context;
use crate::discovery::{AzureCli, SelectionOptions, select_subscriptions};
use crate::pipeline::{build_matrix, discovered_matrix, group_by_spn, parse_subscription_ids, parse_subscription_refs};

/// Handles 'find-spn' - which service connection a subscription uses
pub struct FindSpnCommand;

impl FindSpnCommand {
    pub fn execute(
        ctx: &Context,
        config: &Config,
        subscription_id: &str,
        default_spn: &str,
        output_path: &Path,
    ) -> Result<i32> {
        let spn = resolve_spn_for_subscription(subscription_id.trim(), config, default_spn);

        ctx.fs
            .write(output_path, &spn)
            .with_context(|| format!("Failed to write SPN to {}", output_path.display()))?;

        ctx.output.info(&format!(
            "Subscription {} uses service connection: {}",
            subscription_id.trim(),
            spn
        ));
        Ok(0)
    }
}

/// Handles 'matrix' - one pipeline job per requested subscription
pub struct MatrixCommand;

impl MatrixCommand {
    pub fn execute(
        ctx: &Context,
        config: &Config,
        subscription_ids: &str,
        default_spn: &str,
        output_path: &Path,
    ) -> Result<i32> {
        let ids = parse_subscription_ids(subscription_ids);
        if ids.is_empty() {
            ctx.output.error("No subscription IDs provided");
            return Ok(1);
        }

        let default_spn = resolve_pipeline_variable(default_spn);
        let matrix = build_matrix(&ids, config, &default_spn);
        if matrix.is_empty() {
            ctx.output.error("Failed to create matrix");
            return Ok(1);
        }

        let json = matrix.to_compact_json().context("Failed to serialize matrix")?;
        ctx.fs
            .write(output_path, &json)
            .with_context(|| format!("Failed to write matrix to {}", output_path.display()))?;

        ctx.output.success(&format!(
            "Created matrix with {} subscription(s):",
            matrix.len()
        ));
        for (key, job) in matrix.iter() {
            ctx.output.dimmed(&format!(
                "  {}: {} -> {}",
                key, job.subscription_id, job.service_connection
            ));
        }
        Ok(0)
    }
}

/// Handles 'group-by-spn' - one pipeline job per service connection
pub struct GroupBySpnCommand;

impl GroupBySpnCommand {
    pub fn execute(
        ctx: &Context,
        config: &Config,
        subscriptions_path: &Path,
        default_spn: &str,
        output_path: &Path,
    ) -> Result<i32> {
        let contents = ctx.fs.read_to_string(subscriptions_path)?;
        let ids = parse_subscription_refs(&contents).with_context(|| {
            format!(
                "Failed to parse subscriptions from {}",
                subscriptions_path.display()
            )
        })?;

        let default_spn = resolve_pipeline_variable(default_spn);
        let matrix = group_by_spn(&ids, config, &default_spn);
        if matrix.is_empty() {
            ctx.output.warning("No subscriptions to group");
            return Ok(1);
        }

        let json = matrix.to_compact_json().context("Failed to serialize matrix")?;
        ctx.fs
            .write(output_path, &json)
            .with_context(|| format!("Failed to write matrix to {}", output_path.display()))?;

        ctx.output.success(&format!(
            "Created matrix with {} SPN group(s):",
            matrix.len()
        ));
        for (key, job) in matrix.iter() {
            ctx.output.dimmed(&format!(
                "  {}: {} subscription(s)",
                key,
                job.subscriptions.len()
            ));
        }
        Ok(0)
    }
}

/// Handles 'discover' - the subscriptions a scheduled run should cover
///
/// The matrix is the only thing written to stdout.
pub struct DiscoverCommand;

impl DiscoverCommand {
    pub fn execute(ctx: &Context, config: &Config, schedule: Option<&str>) -> Result<i32> {
        let json = match Self::matrix_json(ctx, config, schedule)? {
            Some(json) => json,
            None => return Ok(1),
        };
        println!("{}", json);
        Ok(0)
    }

    /// Pretty matrix JSON, or None when there is nothing to process
    pub fn matrix_json(ctx: &Context, config: &Config, schedule: Option<&str>) -> Result<Option<String>> {
        let output = ctx.output.as_ref();

        let discovered = AzureCli::new(ctx.runner.as_ref(), output).list_subscriptions();
        if discovered.is_empty() {
            output.error("No subscriptions found");
            return Ok(None);
        }

        let options = SelectionOptions {
            schedule: schedule.map(str::to_string),
            ..Default::default()
        };
        let work_set = match select_subscriptions(&discovered, config, &options) {
            Ok(work_set) => work_set,
            Err(e) => {
                report_error(output, &e);
                return Ok(None);
            }
        };

        if !work_set.excluded.is_empty() {
            output.info(&format!(
                "Excluded {} subscription(s):",
                work_set.excluded.len()
            ));
            for (subscription, pattern) in &work_set.excluded {
                output.dimmed(&format!(
                    "  - {} ({}) matched {}",
                    subscription.name, subscription.id, pattern
                ));
            }
        }

        if work_set.selected.is_empty() {
            match schedule {
                Some(name) => output.error(&format!(
                    "No subscriptions to process for schedule '{}'",
                    name
                )),
                None => output.error("No subscriptions to process"),
            }
            return Ok(None);
        }

        let json = serde_json::to_string_pretty(&discovered_matrix(&work_set.selected))
            .context("Failed to serialize matrix")?;

        output.info(&format!(
            "Found {} subscription(s) to process",
            work_set.selected.len()
        ));
        for subscription in &work_set.selected {
            output.dimmed(&format!("  - {} ({})", subscription.name, subscription.id));
        }

        Ok(Some(json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::{
        FileSystem, MockCommandResult, MockCommandRunner, MockFileSystem, MockOutput,
    };
    use std::sync::Arc;

    const ACCOUNTS: &str = r#"[
        {"id": "s1", "name": "Prod", "state": "Enabled"},
        {"id": "s2", "name": "Sandbox", "state": "Enabled"},
        {"id": "s3", "name": "Old", "state": "Disabled"}
    ]"#;

    fn config(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn ctx_with(fs: Arc<MockFileSystem>, output: Arc<MockOutput>) -> Context {
        let runner = Arc::new(MockCommandRunner::with_results(vec![
            MockCommandResult::exit("az", 0, ACCOUNTS).when_arg("account"),
        ]));
        Context::test_with(fs, output, runner)
    }

    #[test]
    fn test_find_spn_writes_override() {
        let fs = Arc::new(MockFileSystem::new());
        let ctx = ctx_with(fs.clone(), Arc::new(MockOutput::new()));
        let config = config("pipeline: {subscription_spn_overrides: {s1: spn-prod}}");

        let code =
            FindSpnCommand::execute(&ctx, &config, " s1 ", "spn-default", Path::new("/out/spn.txt"))
                .unwrap();
        assert_eq!(code, 0);
        assert_eq!(
            fs.get_file_contents(Path::new("/out/spn.txt")).as_deref(),
            Some("spn-prod")
        );
    }

    #[test]
    fn test_matrix_requires_ids() {
        let output = Arc::new(MockOutput::new());
        let ctx = ctx_with(Arc::new(MockFileSystem::new()), output.clone());

        let code =
            MatrixCommand::execute(&ctx, &Config::default(), " , ", "spn", Path::new("/m.json")).unwrap();
        assert_eq!(code, 1);
        assert!(output.has_error());
    }

    #[test]
    fn test_matrix_writes_compact_json() {
        let fs = Arc::new(MockFileSystem::new());
        let ctx = ctx_with(fs.clone(), Arc::new(MockOutput::new()));

        let code =
            MatrixCommand::execute(&ctx, &Config::default(), "a-1,b-2", "spn", Path::new("/m.json")).unwrap();
        assert_eq!(code, 0);

        let json = fs.get_file_contents(Path::new("/m.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["Sub_a_1"]["serviceConnection"], "spn");
        assert_eq!(value["Sub_b_2"]["subscriptionId"], "b-2");
    }

    #[test]
    fn test_group_by_spn_from_file() {
        let fs = Arc::new(MockFileSystem::new());
        fs.write(Path::new("/subs.json"), r#"[{"id": "s1"}, {"id": "s2"}]"#)
            .unwrap();
        let ctx = ctx_with(fs.clone(), Arc::new(MockOutput::new()));
        let config = config("pipeline: {subscription_spn_overrides: {s2: other-spn}}");

        let code = GroupBySpnCommand::execute(
            &ctx,
            &config,
            Path::new("/subs.json"),
            "main-spn",
            Path::new("/groups.json"),
        )
        .unwrap();
        assert_eq!(code, 0);

        let value: serde_json::Value =
            serde_json::from_str(&fs.get_file_contents(Path::new("/groups.json")).unwrap()).unwrap();
        assert_eq!(value["main_spn"]["subscriptions"][0], "s1");
        assert_eq!(value["other_spn"]["serviceConnection"], "other-spn");
    }

    #[test]
    fn test_group_by_spn_empty_list_fails() {
        let fs = Arc::new(MockFileSystem::new());
        fs.write(Path::new("/subs.json"), "[]").unwrap();
        let ctx = ctx_with(fs, Arc::new(MockOutput::new()));

        let code = GroupBySpnCommand::execute(
            &ctx,
            &Config::default(),
            Path::new("/subs.json"),
            "spn",
            Path::new("/groups.json"),
        )
        .unwrap();
        assert_eq!(code, 1);
    }

    #[test]
    fn test_discover_applies_exclusions() {
        let ctx = ctx_with(Arc::new(MockFileSystem::new()), Arc::new(MockOutput::new()));
        let config = config("exclude_subscriptions: [Sandbox]");

        let json = DiscoverCommand::matrix_json(&ctx, &config, None).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["s1"]["subscription_name"], "Prod");
        assert!(value.get("s2").is_none());
        assert!(value.get("s3").is_none());
    }

    #[test]
    fn test_discover_unknown_schedule() {
        let output = Arc::new(MockOutput::new());
        let ctx = ctx_with(Arc::new(MockFileSystem::new()), output.clone());

        let json = DiscoverCommand::matrix_json(&ctx, &Config::default(), Some("nightly")).unwrap();
        assert!(json.is_none());
        assert!(output.get_errors()[0].contains("nightly"));
    }

    #[test]
    fn test_discover_nothing_left() {
        let output = Arc::new(MockOutput::new());
        let ctx = ctx_with(Arc::new(MockFileSystem::new()), output.clone());
        let config = config("exclude_subscriptions: ['*']");

        assert!(DiscoverCommand::matrix_json(&ctx, &config, None).unwrap().is_none());
        assert!(output.has_error());
    }
}
