use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;

use super::{SubscriptionStatus, TelemetrySink};
use crate::error::ExportError;
use crate::traits::{HttpClient, Output, ReqwestClient};

const API_VERSION: &str = "2016-04-01";
const CONTENT_TYPE: &str = "application/json";
pub const DEFAULT_LOG_TYPE: &str = "Infra_terraform_backup";

#[derive(Debug, Clone)]
struct Credentials {
    workspace_id: String,
    shared_key: String,
}

/// Azure Monitor HTTP Data Collector API sink
pub struct LogAnalyticsSink<'a, H: HttpClient> {
    credentials: Option<Credentials>,
    log_type: String,
    http_client: H,
    output: &'a dyn Output,
}

impl<'a> LogAnalyticsSink<'a, ReqwestClient> {
    pub fn new(
        workspace_id: Option<String>,
        shared_key: Option<String>,
        log_type: &str,
        output: &'a dyn Output,
    ) -> Self {
        Self::with_client(workspace_id, shared_key, log_type, output, ReqwestClient)
    }
}

impl<'a, H: HttpClient> LogAnalyticsSink<'a, H> {
    /// Create a sink with a custom HTTP client (for testing)
    pub fn with_client(
        workspace_id: Option<String>,
        shared_key: Option<String>,
        log_type: &str,
        output: &'a dyn Output,
        http_client: H,
    ) -> Self {
        let workspace_id = workspace_id.filter(|w| !w.trim().is_empty());
        let shared_key = shared_key.filter(|k| !k.trim().is_empty());

        let credentials = match (workspace_id, shared_key) {
            (Some(workspace_id), Some(shared_key)) => Some(Credentials {
                workspace_id,
                shared_key,
            }),
            _ => {
                output.warning(
                    "Log Analytics credentials not configured. Skipping Log Analytics integration.",
                );
                None
            }
        };

        Self {
            credentials,
            log_type: log_type.to_string(),
            http_client,
            output,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    fn deliver(&self, credentials: &Credentials, body: String) -> Result<(), ExportError> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let authorization = signature(
            &credentials.workspace_id,
            &credentials.shared_key,
            &date,
            body.len(),
        )
        .map_err(|e| ExportError::TelemetryFailed(format!("{:#}", e)))?;

        let headers = vec![
            ("Authorization".to_string(), authorization),
            ("Log-Type".to_string(), self.log_type.clone()),
            ("x-ms-date".to_string(), date),
            ("Content-Type".to_string(), CONTENT_TYPE.to_string()),
            ("time-generated-field".to_string(), "TimeGenerated".to_string()),
        ];

        let url = format!(
            "https://{}.ods.opinsights.azure.com/api/logs?api-version={}",
            credentials.workspace_id, API_VERSION
        );

        let (status, response) = self
            .http_client
            .post(&url, &headers, body)
            .map_err(|e| ExportError::TelemetryFailed(format!("{:#}", e)))?;

        if !(200..300).contains(&status) {
            self.output
                .debug(&format!("Error response: {}", response.trim()));
            return Err(ExportError::TelemetryFailed(format!(
                "HTTP status {}",
                status
            )));
        }

        Ok(())
    }
}

impl<H: HttpClient> TelemetrySink for LogAnalyticsSink<'_, H> {
    fn send(&self, status: &SubscriptionStatus) -> bool {
        let Some(credentials) = &self.credentials else {
            self.output.debug("Log Analytics not enabled, skipping send");
            return false;
        };

        let body = match serde_json::to_string(&[StatusRecord::from(status)]) {
            Ok(body) => body,
            Err(e) => {
                self.output
                    .error(&format!("Failed to serialize Log Analytics record: {}", e));
                return false;
            }
        };

        match self.deliver(credentials, body) {
            Ok(()) => {
                self.output
                    .success("Successfully sent 1 record(s) to Log Analytics workspace");
                true
            }
            Err(e) => {
                self.output.error(&e.to_string());
                false
            }
        }
    }
}

/// `SharedKey <workspace>:<base64 HMAC-SHA256 of the canonical string>`
pub fn signature(workspace_id: &str, shared_key: &str, date: &str, content_length: usize) -> Result<String> {
    let string_to_sign = format!(
        "POST\n{}\n{}\nx-ms-date:{}\n/api/logs",
        content_length, CONTENT_TYPE, date
    );

    let key = STANDARD
        .decode(shared_key.trim())
        .context("Log Analytics shared key is not valid base64")?;

    let mut mac = Hmac::<Sha256>::new_from_slice(&key)
        .map_err(|e| anyhow::anyhow!("Invalid HMAC key: {}", e))?;
    mac.update(string_to_sign.as_bytes());
    let digest = mac.finalize().into_bytes();

    Ok(format!("SharedKey {}:{}", workspace_id, STANDARD.encode(digest)))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct StatusRecord<'a> {
    time_generated: String,
    subscription_id: &'a str,
    subscription_name: &'a str,
    status: &'a str,
    start_time: String,
    end_time: String,
    duration_seconds: f64,
    total_resource_groups: u64,
    successful_resource_groups: u64,
    failed_resource_groups: u64,
    git_push_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_resources: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    exported_resources: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    failed_resources: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skipped_resources: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<&'a str>,
}

impl<'a> From<&'a SubscriptionStatus> for StatusRecord<'a> {
    fn from(status: &'a SubscriptionStatus) -> Self {
        let has_resource_counts = status.total_resources > 0
            || status.exported_resources > 0
            || status.failed_resources > 0
            || status.skipped_resources > 0;
        let counter = |value: u64| has_resource_counts.then_some(value);

        Self {
            time_generated: timestamp(status.start_time),
            subscription_id: &status.subscription_id,
            subscription_name: &status.subscription_name,
            status: &status.status,
            start_time: timestamp(status.start_time),
            end_time: timestamp(status.end_time),
            duration_seconds: status.duration_seconds(),
            total_resource_groups: status.total_resource_groups,
            successful_resource_groups: status.successful_resource_groups,
            failed_resource_groups: status.failed_resource_groups,
            git_push_status: status.git_push_status.to_string(),
            total_resources: counter(status.total_resources),
            exported_resources: counter(status.exported_resources),
            failed_resources: counter(status.failed_resources),
            skipped_resources: counter(status.skipped_resources),
            error_message: status.error_message.as_deref().filter(|m| !m.is_empty()),
        }
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::GitPushStatus;
    use crate::traits::{MockHttpClient, MockOutput};
    use chrono::TimeZone;

    fn status() -> SubscriptionStatus {
        SubscriptionStatus {
            subscription_id: "s1".to_string(),
            subscription_name: "Sub One".to_string(),
            status: "success".to_string(),
            start_time: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
            end_time: Utc.with_ymd_and_hms(2026, 1, 2, 3, 5, 35).unwrap(),
            total_resource_groups: 2,
            successful_resource_groups: 2,
            failed_resource_groups: 0,
            total_resources: 0,
            exported_resources: 0,
            failed_resources: 0,
            skipped_resources: 0,
            git_push_status: GitPushStatus::Skipped,
            error_message: None,
        }
    }

    // base64("secret-key-for-tests")
    const KEY: &str = "c2VjcmV0LWtleS1mb3ItdGVzdHM=";

    #[test]
    fn test_signature_matches_reference() {
        let sig = signature("ws", KEY, "Mon, 01 Jan 2024 00:00:00 GMT", 10).unwrap();

        let mut mac = Hmac::<Sha256>::new_from_slice(b"secret-key-for-tests").unwrap();
        mac.update(b"POST\n10\napplication/json\nx-ms-date:Mon, 01 Jan 2024 00:00:00 GMT\n/api/logs");
        let expected = STANDARD.encode(mac.finalize().into_bytes());

        assert_eq!(sig, format!("SharedKey ws:{}", expected));
    }

    #[test]
    fn test_invalid_key_is_an_error() {
        assert!(signature("ws", "not base64 !!", "date", 1).is_err());
    }

    #[test]
    fn test_missing_credentials_disable_sink() {
        let output = MockOutput::new();
        let client = MockHttpClient::with_status(200);
        let sink = LogAnalyticsSink::with_client(
            Some("ws".to_string()),
            None,
            DEFAULT_LOG_TYPE,
            &output,
            &client,
        );

        assert!(!sink.is_enabled());
        assert!(!sink.send(&status()));
        assert!(client.requests().is_empty());
        assert_eq!(output.get_warnings().len(), 1);
    }

    #[test]
    fn test_send_posts_signed_record() {
        let output = MockOutput::new();
        let client = MockHttpClient::with_status(200);
        let sink = LogAnalyticsSink::with_client(
            Some("ws-123".to_string()),
            Some(KEY.to_string()),
            DEFAULT_LOG_TYPE,
            &output,
            &client,
        );

        assert!(sink.send(&status()));

        let requests = client.requests();
        let request = &requests[0];
        assert_eq!(
            request.url,
            "https://ws-123.ods.opinsights.azure.com/api/logs?api-version=2016-04-01"
        );

        let header = |name: &str| request.header(name).unwrap().to_string();
        assert!(header("Authorization").starts_with("SharedKey ws-123:"));
        assert_eq!(header("Log-Type"), "Infra_terraform_backup");
        assert!(header("x-ms-date").ends_with(" GMT"));
        assert_eq!(header("time-generated-field"), "TimeGenerated");

        let expected =
            signature("ws-123", KEY, &header("x-ms-date"), request.body.len()).unwrap();
        assert_eq!(header("Authorization"), expected);

        let records: serde_json::Value = serde_json::from_str(&request.body).unwrap();
        let record = &records[0];
        assert_eq!(record["SubscriptionId"], "s1");
        assert_eq!(record["Status"], "success");
        assert_eq!(record["TimeGenerated"], "2026-01-02T03:04:05Z");
        assert_eq!(record["DurationSeconds"], 90.0);
        assert_eq!(record["GitPushStatus"], "skipped");
        assert!(record.get("TotalResources").is_none());
        assert!(record.get("ErrorMessage").is_none());
    }

    #[test]
    fn test_record_includes_counters_and_error_when_present() {
        let mut status = status();
        status.exported_resources = 3;
        status.error_message = Some("1 resource group failed".to_string());

        let record = serde_json::to_value(StatusRecord::from(&status)).unwrap();
        assert_eq!(record["ExportedResources"], 3);
        assert_eq!(record["TotalResources"], 0);
        assert_eq!(record["ErrorMessage"], "1 resource group failed");
    }

    #[test]
    fn test_http_error_is_swallowed() {
        let output = MockOutput::new();
        let sink = LogAnalyticsSink::with_client(
            Some("ws".to_string()),
            Some(KEY.to_string()),
            DEFAULT_LOG_TYPE,
            &output,
            MockHttpClient::with_status(403),
        );

        assert!(!sink.send(&status()));
        assert!(output.get_errors()[0].contains("403"));
    }
}
