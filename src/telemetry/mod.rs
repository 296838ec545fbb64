//! Per-subscription status reporting
//!
//! Delivery is fire-and-forget: sinks log their own failures and the
//! export result never depends on them.

pub mod log_analytics;

pub use log_analytics::LogAnalyticsSink;

use chrono::{DateTime, Utc};

use crate::results::{GitPushStatus, SubscriptionResult};

/// Status record sent once a subscription has been processed
#[derive(Debug, Clone, PartialEq)]
pub struct SubscriptionStatus {
    pub subscription_id: String,
    pub subscription_name: String,
    pub status: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub total_resource_groups: u64,
    pub successful_resource_groups: u64,
    pub failed_resource_groups: u64,
    pub total_resources: u64,
    pub exported_resources: u64,
    pub failed_resources: u64,
    pub skipped_resources: u64,
    pub git_push_status: GitPushStatus,
    pub error_message: Option<String>,
}

impl SubscriptionStatus {
    pub fn duration_seconds(&self) -> f64 {
        (self.end_time - self.start_time).num_milliseconds() as f64 / 1000.0
    }
}

impl From<&SubscriptionResult> for SubscriptionStatus {
    fn from(result: &SubscriptionResult) -> Self {
        Self {
            subscription_id: result.subscription_id.clone(),
            subscription_name: result.subscription_name.clone(),
            status: result.status().to_string(),
            start_time: result.start_time,
            end_time: result.end_time.unwrap_or_else(Utc::now),
            total_resource_groups: result.total_rgs,
            successful_resource_groups: result.successful_rgs,
            failed_resource_groups: result.failed_rgs,
            total_resources: result.total_resources,
            exported_resources: result.exported_resources,
            failed_resources: result.failed_resources,
            skipped_resources: result.skipped_resources,
            git_push_status: result.git_push_status,
            error_message: result.error.clone(),
        }
    }
}

/// Receives one status record per processed subscription
pub trait TelemetrySink {
    /// Deliver a record; false when it was not delivered
    fn send(&self, status: &SubscriptionStatus) -> bool;
}

/// Sink that records what it was given
#[cfg(test)]
pub struct MockTelemetrySink {
    result: bool,
    sent: std::sync::Mutex<Vec<SubscriptionStatus>>,
}

#[cfg(test)]
impl MockTelemetrySink {
    pub fn new(result: bool) -> Self {
        Self {
            result,
            sent: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<SubscriptionStatus> {
        self.sent.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl TelemetrySink for MockTelemetrySink {
    fn send(&self, status: &SubscriptionStatus) -> bool {
        self.sent.lock().unwrap().push(status.clone());
        self.result
    }
}
