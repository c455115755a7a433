//! Shared HTTP plumbing for upstream sources.
//!
//! Maps transport errors and response statuses onto the transient/fatal
//! split the retry layer depends on.

use anyhow::{Context, Result};
use graphline::fetch::{FetchError, StatusClassifier};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

const USER_AGENT: &str = "graphline-connector/0.1";
const MAX_ERROR_BODY: usize = 512;

/// reqwest client plus the connector's status classification table.
#[derive(Clone, Debug)]
pub struct SourceClient {
    http: Client,
    classifier: StatusClassifier,
}

impl SourceClient {
    pub fn new(classifier: StatusClassifier, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http, classifier })
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn classifier(&self) -> &StatusClassifier {
        &self.classifier
    }

    /// Sends a request and decodes a JSON body.
    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, FetchError> {
        let response = request.send().await.map_err(map_send_error)?;
        let response = check_response_status(response, &self.classifier).await?;
        response.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                FetchError::fatal(format!("malformed response body: {}", e))
            } else {
                map_send_error(e)
            }
        })
    }
}

/// Transport failures: timeouts and connection errors are worth retrying,
/// anything else (bad URL, redirect loop) is not.
pub fn map_send_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() || err.is_connect() || err.is_body() {
        FetchError::transient(format!("request failed: {}", err))
    } else {
        FetchError::fatal(format!("request failed: {}", err))
    }
}

/// Passes 2xx responses through and classifies everything else.
///
/// The error message carries the start of the response body and, when the
/// upstream sends one, the `Retry-After` hint.
pub async fn check_response_status(
    response: Response,
    classifier: &StatusClassifier,
) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read body>".to_string());
    let body: String = body.chars().take(MAX_ERROR_BODY).collect();

    let mut message = format!("{}: {}", status, body.trim());
    if let Some(retry_after) = retry_after {
        message.push_str(&format!(" (Retry-After: {})", retry_after));
    }
    Err(classifier.classify(status.as_u16(), message))
}
