use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use super::GraphGateway;
use crate::error::{BridgeError, Result};

/// Request body for Logseq's `/api` endpoint
#[derive(Serialize)]
struct ApiRequest<'a> {
    method: &'a str,
    args: Vec<Value>,
}

/// reqwest-backed gateway to Logseq's HTTP API server.
///
/// Sends `POST {api_url}/api` with a bearer token. Connection pooling is
/// whatever reqwest's client provides; there is no retry.
pub struct HttpGateway {
    client: Client,
    endpoint: String,
    auth_token: String,
}

impl HttpGateway {
    /// Create a gateway for `api_url` (e.g. `http://127.0.0.1:12315`).
    pub fn new(api_url: &str, auth_token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BridgeError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/api", api_url.trim_end_matches('/')),
            auth_token: auth_token.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl GraphGateway for HttpGateway {
    async fn call(&self, method: &str, args: Vec<Value>) -> Result<Value> {
        log::debug!("Logseq call {} ({} args)", method, args.len());

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.auth_token)
            .json(&ApiRequest { method, args })
            .send()
            .await
            .map_err(|e| BridgeError::Unreachable {
                address: self.endpoint.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unable to read error response".to_string());
            return Err(BridgeError::Protocol {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.text().await.map_err(|e| BridgeError::Unreachable {
            address: self.endpoint.clone(),
            reason: format!("failed to read response body: {}", e),
        })?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }

        let value: Value = serde_json::from_str(&body)?;
        if let Some(error) = value.as_object().and_then(|o| o.get("error")) {
            if !error.is_null() {
                let message = match error {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                return Err(BridgeError::Remote(message));
            }
        }

        Ok(value)
    }
}
