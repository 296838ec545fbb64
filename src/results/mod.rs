//! Roll-up of export outcomes into per-subscription and per-run totals
//!
//! Pure accumulation. Nothing here performs I/O.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::export::ExportOutcome;

/// Whether a subscription's export was pushed to its repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GitPushStatus {
    Success,
    Failed,
    #[default]
    Skipped,
}

impl fmt::Display for GitPushStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GitPushStatus::Success => "success",
            GitPushStatus::Failed => "failed",
            GitPushStatus::Skipped => "skipped",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResourceGroupRecord {
    pub path: String,
    pub status: String,
    #[serde(flatten)]
    pub outcome: ExportOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionResult {
    pub subscription_id: String,
    pub subscription_name: String,
    pub resource_groups: BTreeMap<String, ResourceGroupRecord>,
    pub total_rgs: u64,
    pub successful_rgs: u64,
    pub failed_rgs: u64,
    pub total_resources: u64,
    pub exported_resources: u64,
    pub failed_resources: u64,
    pub skipped_resources: u64,
    pub error: Option<String>,
    pub git_push_status: GitPushStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl SubscriptionResult {
    pub fn new(subscription_id: &str, subscription_name: &str) -> Self {
        Self {
            subscription_id: subscription_id.to_string(),
            subscription_name: subscription_name.to_string(),
            resource_groups: BTreeMap::new(),
            total_rgs: 0,
            successful_rgs: 0,
            failed_rgs: 0,
            total_resources: 0,
            exported_resources: 0,
            failed_resources: 0,
            skipped_resources: 0,
            error: None,
            git_push_status: GitPushStatus::Skipped,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// Record one resource group's outcome
    ///
    /// Each name must be folded at most once.
    pub fn fold(&mut self, resource_group: &str, path: &str, outcome: ExportOutcome) {
        self.total_rgs += 1;
        if outcome.success {
            self.successful_rgs += 1;
        } else {
            self.failed_rgs += 1;
        }

        self.total_resources += outcome.total_resources;
        self.exported_resources += outcome.exported_resources;
        self.failed_resources += outcome.failed_resources;
        self.skipped_resources += outcome.skipped_resources;

        let status = if outcome.success { "success" } else { "failed" };
        self.resource_groups.insert(
            resource_group.to_string(),
            ResourceGroupRecord {
                path: path.to_string(),
                status: status.to_string(),
                outcome,
            },
        );
    }

    pub fn finish(&mut self) {
        self.end_time = Some(Utc::now());
    }

    /// Overall status as reported to telemetry: `success` or `failed`
    ///
    /// A subscription with at least one exported resource group is a
    /// success; the resource group counters carry partial failures.
    pub fn status(&self) -> &'static str {
        let nothing_to_export = self.total_rgs == 0 && self.error.is_none();
        if self.successful_rgs > 0 || nothing_to_export {
            "success"
        } else {
            "failed"
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunTotals {
    pub subscriptions_processed: u64,
    pub subscriptions_successful: u64,
    pub total_rgs: u64,
    pub successful_rgs: u64,
    pub failed_rgs: u64,
    pub total_resources: u64,
    pub exported_resources: u64,
    pub failed_resources: u64,
    pub skipped_resources: u64,
    pub pushed: u64,
    pub push_failed: u64,
}

/// Every processed subscription keyed by id, plus run-wide totals
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub subscriptions: BTreeMap<String, SubscriptionResult>,
    pub totals: RunTotals,
}

impl RunSummary {
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }
}

pub fn summarize(results: Vec<SubscriptionResult>) -> RunSummary {
    let mut totals = RunTotals::default();

    for result in &results {
        totals.subscriptions_processed += 1;
        if result.successful_rgs > 0 {
            totals.subscriptions_successful += 1;
        }
        totals.total_rgs += result.total_rgs;
        totals.successful_rgs += result.successful_rgs;
        totals.failed_rgs += result.failed_rgs;
        totals.total_resources += result.total_resources;
        totals.exported_resources += result.exported_resources;
        totals.failed_resources += result.failed_resources;
        totals.skipped_resources += result.skipped_resources;
        match result.git_push_status {
            GitPushStatus::Success => totals.pushed += 1,
            GitPushStatus::Failed => totals.push_failed += 1,
            GitPushStatus::Skipped => {}
        }
    }

    let subscriptions = results
        .into_iter()
        .map(|r| (r.subscription_id.clone(), r))
        .collect();

    RunSummary {
        subscriptions,
        totals,
    }
}
