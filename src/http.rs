use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("invalid service url {url}: {message}")]
    Url { url: String, message: String },
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },
    #[error("{url} answered with HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl ServiceError {
    // Transport failures and overloaded servers are worth another attempt;
    // a bad request or an unreadable body will not improve.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Url { .. } | Self::Decode { .. } => false,
        }
    }
}

pub fn endpoint(base: &str, path: &str) -> Result<Url, ServiceError> {
    let raw = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    Url::parse(&raw).map_err(|source| ServiceError::Url {
        url: raw,
        message: source.to_string(),
    })
}

#[derive(Debug, Clone)]
pub struct JsonClient {
    agent: ureq::Agent,
}

impl JsonClient {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
        }
    }

    /// `Ok(None)` when the server answers 204 No Content.
    pub fn get_json(&self, url: &Url) -> Result<Option<Value>, ServiceError> {
        let response = self
            .agent
            .get(url.as_str())
            .header("Accept", "application/json")
            .call();
        read_response(url, response)
    }

    pub fn post_json<T: Serialize>(&self, url: &Url, body: &T) -> Result<Value, ServiceError> {
        let response = self
            .agent
            .post(url.as_str())
            .header("Accept", "application/json")
            .send_json(body);
        read_response(url, response)?.ok_or_else(|| ServiceError::Decode {
            url: url.to_string(),
            message: "empty response body".to_string(),
        })
    }
}

fn read_response(
    url: &Url,
    response: Result<ureq::http::Response<ureq::Body>, ureq::Error>,
) -> Result<Option<Value>, ServiceError> {
    let mut response = response.map_err(|source| match source {
        ureq::Error::StatusCode(status) => ServiceError::Status {
            url: url.to_string(),
            status,
        },
        other => ServiceError::Transport {
            url: url.to_string(),
            message: other.to_string(),
        },
    })?;

    if response.status().as_u16() == 204 {
        return Ok(None);
    }

    response
        .body_mut()
        .read_json::<Value>()
        .map(Some)
        .map_err(|source| ServiceError::Decode {
            url: url.to_string(),
            message: source.to_string(),
        })
}
