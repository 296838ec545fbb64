use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::telemetry::log_analytics::DEFAULT_LOG_TYPE;

/// Root of `config/subscriptions.yaml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Statically declared subscriptions; empty means "everything discovered"
    pub subscriptions: Vec<SubscriptionEntry>,

    /// Subscriptions to skip, by id or name (exact or glob)
    pub exclude_subscriptions: SubscriptionExcludes,

    /// Named subscription sets used by pipeline discovery
    pub schedules: BTreeMap<String, Schedule>,

    pub output: OutputConfig,
    pub global_excludes: GlobalExcludes,
    pub aztfexport: AztfexportConfig,
    pub git: GitConfig,
    pub azure_devops: AzureDevOpsConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
    pub log_analytics: LogAnalyticsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionEntry {
    pub id: String,

    #[serde(default)]
    pub name: Option<String>,

    #[serde(default = "default_true")]
    pub export_enabled: bool,

    /// Repository name for `create-repos` (defaults to the subscription name)
    #[serde(default)]
    pub repo_name: Option<String>,
}

/// `exclude_subscriptions` accepts a flat list or environment-grouped lists
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubscriptionExcludes {
    List(Vec<String>),
    Grouped(BTreeMap<String, Vec<String>>),
}

impl Default for SubscriptionExcludes {
    fn default() -> Self {
        SubscriptionExcludes::List(Vec::new())
    }
}

impl SubscriptionExcludes {
    /// Flatten to one pattern list (grouped form in key order)
    pub fn patterns(&self) -> Vec<String> {
        match self {
            SubscriptionExcludes::List(items) => items.clone(),
            SubscriptionExcludes::Grouped(groups) => groups.values().flatten().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Schedule {
    pub subscriptions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub base_dir: String,
    pub create_rg_folders: bool,
    pub cleanup_after_push: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_dir: "./exports".to_string(),
            create_rg_folders: true,
            cleanup_after_push: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalExcludes {
    pub resource_groups: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AztfexportConfig {
    pub exclude_resource_groups: Vec<String>,
    pub exclude_resource_types: Vec<String>,
    /// Resource IDs passed as `--exclude` in resource-group mode
    pub exclude_resources: Vec<String>,
    /// Resource types passed as `--resource-type` in resource-group mode
    pub resource_types: Vec<String>,
    /// Custom Resource Graph predicate; overrides `exclude_resource_types`
    pub query: Option<String>,
    pub additional_flags: Vec<String>,
    pub timeout_seconds: u64,
    pub plain_ui: bool,
    pub use_pty_wrapper: bool,
}

impl Default for AztfexportConfig {
    fn default() -> Self {
        Self {
            exclude_resource_groups: Vec::new(),
            exclude_resource_types: Vec::new(),
            exclude_resources: Vec::new(),
            resource_types: Vec::new(),
            query: None,
            additional_flags: Vec::new(),
            timeout_seconds: 3600,
            plain_ui: false,
            use_pty_wrapper: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    pub push_to_repos: bool,
    pub branch: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            push_to_repos: false,
            branch: "main".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureDevOpsConfig {
    pub organization: Option<String>,
    pub project: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Service connection per subscription id; values may be `$(VAR)` placeholders
    pub subscription_spn_overrides: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogAnalyticsConfig {
    pub workspace_id: Option<String>,
    pub shared_key: Option<String>,
    pub log_type: String,
}

impl Default for LogAnalyticsConfig {
    fn default() -> Self {
        Self {
            workspace_id: None,
            shared_key: None,
            log_type: DEFAULT_LOG_TYPE.to_string(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Global resource-group excludes followed by the aztfexport-specific ones,
    /// order preserved, duplicates dropped
    pub fn resource_group_excludes(&self) -> Vec<String> {
        let mut merged: Vec<String> = Vec::new();
        for pattern in self
            .global_excludes
            .resource_groups
            .iter()
            .chain(self.aztfexport.exclude_resource_groups.iter())
        {
            if !merged.contains(pattern) {
                merged.push(pattern.clone());
            }
        }
        merged
    }

    /// Declared subscription entry by id
    pub fn subscription_entry(&self, id: &str) -> Option<&SubscriptionEntry> {
        self.subscriptions
            .iter()
            .find(|entry| entry.id.eq_ignore_ascii_case(id))
    }
}
