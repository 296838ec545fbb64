//! Azure DevOps repository provisioning

use anyhow::{Context, Result};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::json;
use url::Url;

use crate::config::Config;
use crate::traits::{HttpClient, Output, ReqwestClient};

const API_VERSION: &str = "7.1";

/// Result of asking Azure DevOps for one repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoCreation {
    Created,
    AlreadyExists,
    Failed(String),
}

/// Repository to create, with the subscription it backs up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRequest {
    pub subscription_id: String,
    pub subscription_name: String,
    pub repo_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreationSummary {
    pub created: usize,
    pub existing: usize,
    pub failed: usize,
}

impl CreationSummary {
    pub fn record(&mut self, result: &RepoCreation) {
        match result {
            RepoCreation::Created => self.created += 1,
            RepoCreation::AlreadyExists => self.existing += 1,
            RepoCreation::Failed(_) => self.failed += 1,
        }
    }
}

/// Enabled declared subscriptions with the repository each should get
///
/// Entries with neither `repo_name` nor `name` are reported and skipped.
pub fn repo_requests(config: &Config, output: &dyn Output) -> Vec<RepoRequest> {
    let mut requests = Vec::new();

    for entry in config.subscriptions.iter().filter(|e| e.export_enabled) {
        let name = entry
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty());
        let repo_name = entry
            .repo_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .or(name);

        match repo_name {
            Some(repo_name) => requests.push(RepoRequest {
                subscription_id: entry.id.clone(),
                subscription_name: name.unwrap_or(&entry.id).to_string(),
                repo_name: repo_name.to_string(),
            }),
            None => output.warning(&format!(
                "No repo_name or name for subscription {}, skipping",
                entry.id
            )),
        }
    }

    requests
}

/// Client for the Azure DevOps Git repositories REST API
pub struct RepoCreator<H: HttpClient> {
    organization: String,
    project: String,
    authorization: String,
    http_client: H,
}

impl RepoCreator<ReqwestClient> {
    pub fn new(organization: &str, project: &str, pat: &str) -> Self {
        Self::with_client(organization, project, pat, ReqwestClient)
    }
}

impl<H: HttpClient> RepoCreator<H> {
    /// Create a repo creator with a custom HTTP client (for testing)
    pub fn with_client(organization: &str, project: &str, pat: &str, http_client: H) -> Self {
        Self {
            organization: organization.to_string(),
            project: project.to_string(),
            authorization: format!("Basic {}", STANDARD.encode(format!(":{}", pat))),
            http_client,
        }
    }

    pub fn endpoint(&self) -> Result<Url> {
        let mut url = Url::parse("https://dev.azure.com").context("Invalid Azure DevOps base URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Azure DevOps base URL cannot have a path"))?
            .clear()
            .push(&self.organization)
            .push(&self.project)
            .push("_apis")
            .push("git")
            .push("repositories");
        url.query_pairs_mut().append_pair("api-version", API_VERSION);
        Ok(url)
    }

    pub fn create(&self, repo_name: &str) -> RepoCreation {
        match self.try_create(repo_name) {
            Ok(result) => result,
            Err(e) => RepoCreation::Failed(format!("{:#}", e)),
        }
    }

    fn try_create(&self, repo_name: &str) -> Result<RepoCreation> {
        let url = self.endpoint()?;
        let body = json!({
            "name": repo_name,
            "project": { "id": self.project },
        })
        .to_string();
        let headers = vec![
            ("Authorization".to_string(), self.authorization.clone()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ];

        let (status, response) = self.http_client.post(url.as_str(), &headers, body)?;
        Ok(match status {
            201 => RepoCreation::Created,
            409 => RepoCreation::AlreadyExists,
            other => RepoCreation::Failed(format!("HTTP {}: {}", other, response.trim())),
        })
    }

    /// Create every requested repository, reporting each as it goes
    pub fn create_all(&self, requests: &[RepoRequest], output: &dyn Output) -> CreationSummary {
        let mut summary = CreationSummary::default();

        for request in requests {
            output.info(&format!(
                "Processing: {} -> {}",
                request.subscription_name, request.repo_name
            ));

            let result = self.create(&request.repo_name);
            match &result {
                RepoCreation::Created => {
                    output.success(&format!("Created repository: {}", request.repo_name))
                }
                RepoCreation::AlreadyExists => output.warning(&format!(
                    "Repository already exists: {}",
                    request.repo_name
                )),
                RepoCreation::Failed(reason) => output.error(&format!(
                    "Failed to create repository {}: {}",
                    request.repo_name, reason
                )),
            }
            summary.record(&result);
        }

        summary
    }
}
