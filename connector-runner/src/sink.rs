//! Destination sink that posts normalized records over HTTP.

use anyhow::{Context, Result};
use async_trait::async_trait;
use graphline::{OutputRecord, RecordSink};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

/// Posts each batch as a JSON array to `{url}/records`.
///
/// The destination upserts by `(model_kind, uid)`, so re-sending a batch
/// after a failed run is harmless.
pub struct HttpSink {
    url: String,
    api_key: Option<String>,
    http_client: Client,
}

impl HttpSink {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build destination HTTP client")?;
        Ok(Self {
            url: url.into().trim_end_matches('/').to_string(),
            api_key,
            http_client,
        })
    }

    pub fn endpoint(&self) -> String {
        format!("{}/records", self.url)
    }
}

#[async_trait]
impl RecordSink for HttpSink {
    async fn write(&self, records: Vec<OutputRecord>) -> Result<()> {
        if records.is_empty() {
            debug!("No records to write");
            return Ok(());
        }

        let count = records.len();
        let mut request = self
            .http_client
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .json(&records);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .context("Failed to send records to destination")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<failed to read body>".to_string());
            anyhow::bail!("Destination returned error status {}: {}", status, body);
        }

        info!(record_count = count, "Wrote records to destination");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn record(uid: &str) -> OutputRecord {
        OutputRecord::new("qa_TestCase", json!({"uid": uid, "source": "CircleCI"}))
    }

    #[tokio::test]
    async fn test_posts_batch_as_json_array() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/records")
            .match_header("authorization", "Bearer dest-key")
            .match_body(Matcher::Json(json!([
                {"modelKind": "qa_TestCase", "payload": {"uid": "a", "source": "CircleCI"}},
                {"modelKind": "qa_TestCase", "payload": {"uid": "b", "source": "CircleCI"}},
            ])))
            .with_status(200)
            .create_async()
            .await;

        let sink = HttpSink::new(
            format!("{}/", server.url()),
            Some("dest-key".to_string()),
            Duration::from_secs(5),
        )
        .unwrap();
        sink.write(vec![record("a"), record("b")]).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_batch_is_not_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/records")
            .expect(0)
            .create_async()
            .await;

        let sink = HttpSink::new(server.url(), None, Duration::from_secs(5)).unwrap();
        sink.write(Vec::new()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_fails_write() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/records")
            .with_status(500)
            .with_body("database unavailable")
            .create_async()
            .await;

        let sink = HttpSink::new(server.url(), None, Duration::from_secs(5)).unwrap();
        let err = sink.write(vec![record("a")]).await.unwrap_err();

        let message = err.to_string();
        assert!(message.contains("500"));
        assert!(message.contains("database unavailable"));
    }
}
