use reqwest::Client;
use serde_json::Value;
use shared::utils::log_preview;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::FetchError;
use crate::models::{Credentials, EpochRange};
use crate::strategy::{AuthCarrier, ConnectionStrategy};

const LOG_BODY_BYTES: usize = 256;

pub struct JustCallClient {
    client: Client,
    api_url: String,
    transcript_flag: Option<String>,
}

impl JustCallClient {
    pub fn new(
        api_url: &str,
        request_timeout: Duration,
        transcript_flag: Option<String>,
    ) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("justcall-connector/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::InvalidRequest(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_url: api_url.to_string(),
            transcript_flag,
        })
    }

    /// Upstream list-calls URL for one page, with credentials embedded when the
    /// strategy carries them in the query string.
    pub fn calls_url(
        &self,
        strategy: &ConnectionStrategy,
        credentials: &Credentials,
        range: Option<EpochRange>,
        page: u32,
        per_page: u32,
    ) -> Result<Url, FetchError> {
        let mut params: Vec<(&str, String)> = Vec::with_capacity(7);
        if let Some(range) = range {
            params.push(("from", range.from.to_string()));
            params.push(("to", range.to.to_string()));
        }
        params.push(("page", page.to_string()));
        params.push(("per_page", per_page.to_string()));
        if let Some(flag) = &self.transcript_flag {
            params.push((flag.as_str(), "true".to_string()));
        }
        if strategy.auth == AuthCarrier::Query {
            params.push(("api_key", credentials.api_key.clone()));
            params.push(("api_secret", credentials.api_secret.clone()));
        }

        Url::parse_with_params(&self.api_url, &params).map_err(|e| {
            FetchError::InvalidRequest(format!("Invalid JustCall API URL '{}': {}", self.api_url, e))
        })
    }

    pub async fn query_calls(
        &self,
        strategy: &ConnectionStrategy,
        credentials: &Credentials,
        range: Option<EpochRange>,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<Value>, FetchError> {
        let target = self.calls_url(strategy, credentials, range, page, per_page)?;
        let url = strategy.request_url(&target);

        let mut request = self
            .client
            .get(&url)
            .header("Accept", "application/json");
        if strategy.auth == AuthCarrier::Header {
            request = request.header("Authorization", credentials.authorization_header());
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!(
                "JustCall request via {} failed with HTTP {}: {}",
                strategy.name,
                status,
                log_preview(&body, LOG_BODY_BYTES)
            );
            return Err(FetchError::from_status(status, &body));
        }

        let payload: Value = serde_json::from_str(&body).map_err(|e| {
            debug!(
                "Unparseable body via {}: {}",
                strategy.name,
                log_preview(&body, LOG_BODY_BYTES)
            );
            FetchError::TransportUnavailable(format!(
                "malformed response via {}: {}",
                strategy.name, e
            ))
        })?;

        Ok(extract_calls(payload))
    }
}

/// The call list is either the payload itself or its `data` array. Anything
/// else is an empty page.
pub fn extract_calls(payload: Value) -> Vec<Value> {
    match payload {
        Value::Array(calls) => calls,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(calls)) => calls,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}
