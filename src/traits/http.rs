use anyhow::{Context, Result};
use std::time::Duration;

/// HTTP client trait for testing
pub trait HttpClient: Send + Sync {
    /// POST `body` and return the response status code and body
    fn post(&self, url: &str, headers: &[(String, String)], body: String) -> Result<(u16, String)>;
}

/// Real HTTP client using reqwest
pub struct ReqwestClient;

impl HttpClient for ReqwestClient {
    fn post(&self, url: &str, headers: &[(String, String)], body: String) -> Result<(u16, String)> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        let mut request = client.post(url).body(body);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .with_context(|| format!("Failed to POST to {}", url))?;
        let status = response.status().as_u16();
        let text = response.text().unwrap_or_default();

        Ok((status, text))
    }
}

/// A request recorded by `MockHttpClient`
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

#[cfg(test)]
impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// HTTP client answering from a queue of canned responses
///
/// Once the queue is drained every request gets the last response again.
#[cfg(test)]
pub struct MockHttpClient {
    responses: std::sync::Mutex<Vec<Result<(u16, String), String>>>,
    requests: std::sync::Mutex<Vec<RecordedRequest>>,
}

#[cfg(test)]
impl MockHttpClient {
    pub fn with_status(status: u16) -> Self {
        Self::with_responses(vec![Ok((status, String::new()))])
    }

    pub fn with_responses(responses: Vec<Result<(u16, String), String>>) -> Self {
        Self {
            responses: std::sync::Mutex::new(responses),
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl HttpClient for MockHttpClient {
    fn post(&self, url: &str, headers: &[(String, String)], body: String) -> Result<(u16, String)> {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            headers: headers.to_vec(),
            body,
        });

        let mut responses = self.responses.lock().unwrap();
        let response = if responses.len() > 1 {
            responses.remove(0)
        } else {
            responses
                .first()
                .cloned()
                .unwrap_or_else(|| Ok((200, String::new())))
        };

        response.map_err(|e| anyhow::anyhow!(e))
    }
}

impl<T: HttpClient + ?Sized> HttpClient for &T {
    fn post(&self, url: &str, headers: &[(String, String)], body: String) -> Result<(u16, String)> {
        (**self).post(url, headers, body)
    }
}
