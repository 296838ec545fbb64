use serde::Deserialize;
use std::time::Duration;

use super::matcher::ExclusionMatcher;
use super::{ResourceGroupListing, Subscription, SubscriptionState};
use crate::traits::{CommandRunner, CommandSpec, Output, RunError};

const AZ_TIMEOUT: Duration = Duration::from_secs(30);
const AZ_INSTALL_HINT: &str =
    "Azure CLI not found. Please install: https://docs.microsoft.com/cli/azure/install-azure-cli";
const AZ_LOGIN_HINT: &str = "Make sure you're logged in: az login";

#[derive(Debug, Deserialize)]
struct AccountEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GroupEntry {
    #[serde(default)]
    name: Option<String>,
}

/// Lists subscriptions and resource groups through the `az` CLI
///
/// Every failure is logged with its cause and degrades to an empty result.
pub struct AzureCli<'a> {
    runner: &'a dyn CommandRunner,
    output: &'a dyn Output,
    program: String,
}

impl<'a> AzureCli<'a> {
    pub fn new(runner: &'a dyn CommandRunner, output: &'a dyn Output) -> Self {
        Self {
            runner,
            output,
            program: "az".to_string(),
        }
    }

    /// Enabled subscriptions visible to the logged-in identity
    pub fn list_subscriptions(&self) -> Vec<Subscription> {
        let spec = CommandSpec::new(
            self.program.clone(),
            vec![
                "account".to_string(),
                "list".to_string(),
                "--query".to_string(),
                "[].{id:id, name:name, state:state}".to_string(),
                "--output".to_string(),
                "json".to_string(),
            ],
        )
        .with_timeout(AZ_TIMEOUT);

        let Some(stdout) = self.run_json_command(&spec, "listing subscriptions") else {
            return Vec::new();
        };

        let entries: Vec<AccountEntry> = match serde_json::from_str(&stdout) {
            Ok(entries) => entries,
            Err(e) => {
                self.output
                    .error(&format!("Failed to parse Azure CLI output: {}", e));
                return Vec::new();
            }
        };

        let subscriptions: Vec<Subscription> = entries
            .into_iter()
            .filter_map(|entry| {
                let id = entry.id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty())?;
                let name = entry
                    .name
                    .map(|n| n.trim().to_string())
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| id.clone());
                let state = SubscriptionState::parse(entry.state.as_deref().unwrap_or(""));
                Some(Subscription { id, name, state })
            })
            .filter(|s| s.state == SubscriptionState::Enabled)
            .collect();

        self.output.debug(&format!(
            "Discovered {} enabled subscription(s)",
            subscriptions.len()
        ));

        subscriptions
    }

    /// Resource groups of a subscription, split by the exclusion patterns
    pub fn list_resource_groups(
        &self,
        subscription_id: &str,
        subscription_name: Option<&str>,
        exclude_patterns: &[String],
    ) -> ResourceGroupListing {
        let sub_display = subscription_name
            .map(|n| format!(" ({})", n))
            .unwrap_or_default();

        let spec = CommandSpec::new(
            self.program.clone(),
            vec![
                "group".to_string(),
                "list".to_string(),
                "--subscription".to_string(),
                subscription_id.to_string(),
                "--output".to_string(),
                "json".to_string(),
            ],
        )
        .with_timeout(AZ_TIMEOUT);

        let Some(stdout) = self.run_json_command(&spec, "listing resource groups") else {
            return ResourceGroupListing::default();
        };

        let entries: Vec<GroupEntry> = match serde_json::from_str(&stdout) {
            Ok(entries) => entries,
            Err(e) => {
                self.output
                    .error(&format!("Failed to parse Azure CLI output: {}", e));
                return ResourceGroupListing::default();
            }
        };

        let matcher = ExclusionMatcher::new(exclude_patterns);
        let mut listing = ResourceGroupListing::default();

        for entry in entries {
            let name = entry.name.unwrap_or_default().trim().to_string();
            if name.is_empty() {
                self.output
                    .warning("Skipping resource group with an empty name");
                continue;
            }

            match matcher.matching_pattern(&name) {
                Some(pattern) => listing.excluded.push((name, pattern.to_string())),
                None => listing.included.push(name),
            }
        }

        self.log_listing(&listing, &sub_display);
        listing
    }

    fn log_listing(&self, listing: &ResourceGroupListing, sub_display: &str) {
        if !listing.excluded.is_empty() {
            self.output
                .info(&format!("Excluded resource groups{}:", sub_display));
            for (name, pattern) in &listing.excluded {
                self.output
                    .dimmed(&format!("  ✗ {} (matched pattern: {})", name, pattern));
            }
        }

        if !listing.included.is_empty() {
            self.output
                .info(&format!("Resource groups to process{}:", sub_display));
            for name in &listing.included {
                self.output.dimmed(&format!("  ✓ {}", name));
            }
        }

        if listing.excluded.is_empty() {
            self.output.success(&format!(
                "Found {} resource groups{} (none excluded)",
                listing.included.len(),
                sub_display
            ));
        } else {
            self.output.success(&format!(
                "Found {} total resource groups{}: {} to process, {} excluded",
                listing.total(),
                sub_display,
                listing.included.len(),
                listing.excluded.len()
            ));
        }
    }

    /// Run an `az` command and return its stdout, logging the cause of any failure
    fn run_json_command(&self, spec: &CommandSpec, action: &str) -> Option<String> {
        self.output.debug(&format!("Running: {}", spec.display()));

        match self.runner.run_captured(spec) {
            Ok(output) if output.success() => Some(output.stdout),
            Ok(output) => {
                self.output.error(&format!(
                    "Azure CLI command failed while {}: {}",
                    action,
                    output.stderr.trim()
                ));
                self.output.info(AZ_LOGIN_HINT);
                None
            }
            Err(RunError::NotFound { .. }) => {
                self.output.error(AZ_INSTALL_HINT);
                None
            }
            Err(RunError::Timeout { timeout, .. }) => {
                self.output.error(&format!(
                    "Timeout {} (exceeded {} seconds)",
                    action,
                    timeout.as_secs()
                ));
                None
            }
            Err(e) => {
                self.output.error(&format!("Error {}: {}", action, e));
                None
            }
        }
    }
}
