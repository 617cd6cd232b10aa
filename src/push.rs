//! Pushgateway transport.
//!
//! Metrics are POSTed as Prometheus text to
//! `{gateway}/metrics/job/{job}/instance/{instance}`. The gateway answers
//! 200 or 202 on success.

use std::time::Duration;

use reqwest::{header, Client, StatusCode};
use tracing::{debug, instrument};

use crate::config::{DEFAULT_INSTANCE, DEFAULT_JOB};

const PUSH_TIMEOUT: Duration = Duration::from_secs(10);
const TEXT_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

#[derive(Debug, thiserror::Error)]
pub enum PushError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected status code {status}, PushGateway url = {url}, body = {body}")]
    UnexpectedStatus {
        status: StatusCode,
        url: String,
        body: String,
    },
}

/// Builds the push URL, inserting `/` after the gateway when it lacks one.
pub fn push_url(gateway: &str, job: &str, instance: &str) -> String {
    let separator = if gateway.ends_with('/') { "" } else { "/" };
    format!(
        "{}{}metrics/job/{}/instance/{}",
        gateway, separator, job, instance
    )
}

#[derive(Debug, Clone)]
pub struct PushClient {
    client: Client,
    gateway: String,
    job: String,
    instance: String,
}

impl PushClient {
    pub fn new(gateway: impl Into<String>) -> Result<Self, PushError> {
        let client = Client::builder().timeout(PUSH_TIMEOUT).build()?;
        Ok(Self {
            client,
            gateway: gateway.into(),
            job: DEFAULT_JOB.to_string(),
            instance: DEFAULT_INSTANCE.to_string(),
        })
    }

    pub fn set_job(&mut self, job: impl Into<String>) {
        self.job = job.into();
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn set_instance(&mut self, instance: impl Into<String>) {
        self.instance = instance.into();
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn url(&self) -> String {
        push_url(&self.gateway, &self.job, &self.instance)
    }

    /// POSTs one exposition body to the gateway.
    #[instrument(skip(self, body), fields(job = %self.job, instance = %self.instance))]
    pub async fn push(&self, body: String) -> Result<(), PushError> {
        let url = self.url();
        let bytes = body.len();

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, TEXT_CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::ACCEPTED {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::UnexpectedStatus { status, url, body });
        }

        debug!(%url, %status, bytes, "Pushed metrics");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_url_inserts_separator() {
        assert_eq!(
            push_url("http://127.0.0.1:9091", "node", "host-a"),
            "http://127.0.0.1:9091/metrics/job/node/instance/host-a"
        );
        assert_eq!(
            push_url("http://127.0.0.1:9091/", "node", "host-a"),
            "http://127.0.0.1:9091/metrics/job/node/instance/host-a"
        );
    }

    #[test]
    fn test_client_defaults_and_setters() {
        let mut client = PushClient::new("http://pushgw:9091").unwrap();
        assert_eq!(client.job(), "defaultJobName");
        assert_eq!(client.instance(), "defaultInstanceName");

        client.set_job("node");
        client.set_instance("host-a");
        assert_eq!(client.url(), "http://pushgw:9091/metrics/job/node/instance/host-a");
    }
}
