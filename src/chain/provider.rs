//! LCD (REST gateway) client with multi-URL failover

use super::types::{gateway_error, json_u64};
use super::{
    BroadcastMode, ChainClient, ACCOUNTS_PATH, LATEST_BLOCK_PATH, SIMULATE_PATH, TXS_PATH,
};
use crate::error::{SubmitError, SubmitResult};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// gRPC status code the gateway uses for missing resources
const GRPC_NOT_FOUND: u32 = 5;

/// Status and decoded body of one gateway exchange
struct GatewayReply {
    status: StatusCode,
    body: Value,
}

impl GatewayReply {
    fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
            || matches!(gateway_error(&self.body), Some((GRPC_NOT_FOUND, _)))
    }
}

/// REST client over one or more LCD endpoints.
///
/// A transport failure or a 5xx reply moves the client to the next URL for
/// subsequent calls; the failed request itself is reported, never re-sent.
pub struct LcdClient {
    base_urls: Vec<String>,
    http: Client,
    current: AtomicUsize,
}

impl LcdClient {
    /// Create a new client
    pub fn new(base_urls: Vec<String>, request_timeout: Duration) -> SubmitResult<Self> {
        let base_urls: Vec<String> = base_urls
            .into_iter()
            .map(|url| url.trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .collect();

        if base_urls.is_empty() {
            return Err(SubmitError::Config("No LCD URLs configured".to_string()));
        }

        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SubmitError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_urls,
            http,
            current: AtomicUsize::new(0),
        })
    }

    /// Base URL currently in use
    pub fn active_url(&self) -> &str {
        let idx = self.current.load(Ordering::Relaxed);
        &self.base_urls[idx % self.base_urls.len()]
    }

    /// Switch to next available URL
    pub fn failover(&self) {
        if self.base_urls.len() < 2 {
            return;
        }
        let current = self.current.load(Ordering::Relaxed);
        let next = (current + 1) % self.base_urls.len();
        self.current.store(next, Ordering::Relaxed);
        warn!("LCD failover to {}", self.base_urls[next]);
    }

    /// Check that the active gateway answers
    pub async fn health_check(&self) -> bool {
        match self.latest_block_height().await {
            Ok(height) => {
                debug!("LCD {} healthy at height {}", self.active_url(), height);
                true
            }
            Err(e) => {
                warn!("Health check failed for {}: {}", self.active_url(), e);
                false
            }
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.active_url(), path)
    }

    async fn execute(&self, endpoint: &str, request: RequestBuilder) -> SubmitResult<GatewayReply> {
        let response = request.send().await.map_err(|e| {
            self.failover();
            SubmitError::TransportFailure {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| SubmitError::TransportFailure {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;

        // A failing upstream is skipped for the next call, like an unreachable one
        if status.is_server_error() {
            self.failover();
        }

        let body = match serde_json::from_str::<Value>(&text) {
            Ok(body) => body,
            Err(_) if status == StatusCode::NOT_FOUND => Value::String(text),
            Err(e) => {
                let message = if status.is_success() {
                    format!("malformed JSON response: {}", e)
                } else {
                    format!("HTTP {} with non-JSON body: {}", status, snippet(&text))
                };
                return Err(SubmitError::TransportFailure {
                    endpoint: endpoint.to_string(),
                    message,
                });
            }
        };

        debug!("{} answered HTTP {}", endpoint, status);
        Ok(GatewayReply { status, body })
    }

    fn unexpected(endpoint: &str, reply: &GatewayReply) -> SubmitError {
        let message = match gateway_error(&reply.body) {
            Some((code, message)) => format!("HTTP {} code {}: {}", reply.status, code, message),
            None => format!("HTTP {}: {}", reply.status, reply.body),
        };
        let endpoint = endpoint.to_string();

        if reply.status.is_server_error() {
            SubmitError::TransportFailure { endpoint, message }
        } else {
            SubmitError::InvalidResponse { endpoint, message }
        }
    }
}

/// First line of an error page, bounded for logs
fn snippet(text: &str) -> &str {
    let line = text.trim().lines().next().unwrap_or_default();
    match line.char_indices().nth(120) {
        Some((end, _)) => &line[..end],
        None => line,
    }
}

#[async_trait]
impl ChainClient for LcdClient {
    async fn account(&self, address: &str) -> SubmitResult<Option<Value>> {
        let path = format!("{}/{}", ACCOUNTS_PATH, address);
        let reply = self.execute(ACCOUNTS_PATH, self.http.get(self.url(&path))).await?;

        if reply.is_not_found() {
            debug!("Account {} not found on {}", address, self.active_url());
            return Ok(None);
        }
        if !reply.status.is_success() {
            return Err(Self::unexpected(ACCOUNTS_PATH, &reply));
        }

        Ok(Some(reply.body))
    }

    async fn broadcast(&self, tx_bytes: &[u8], mode: BroadcastMode) -> SubmitResult<Value> {
        let payload = json!({
            "tx_bytes": BASE64.encode(tx_bytes),
            "mode": mode.as_gateway_str(),
        });
        let reply = self
            .execute(TXS_PATH, self.http.post(self.url(TXS_PATH)).json(&payload))
            .await?;

        if reply.status.is_success() {
            return Ok(reply.body);
        }

        // The node decoded and refused the request before producing a tx_response
        match gateway_error(&reply.body) {
            Some((code, message)) => Err(SubmitError::BroadcastFailure {
                code,
                codespace: String::new(),
                log: message,
                txhash: None,
            }),
            None => Err(Self::unexpected(TXS_PATH, &reply)),
        }
    }

    async fn simulate(&self, tx_bytes: &[u8]) -> SubmitResult<Value> {
        let payload = json!({ "tx_bytes": BASE64.encode(tx_bytes) });
        let reply = self
            .execute(
                SIMULATE_PATH,
                self.http.post(self.url(SIMULATE_PATH)).json(&payload),
            )
            .await?;

        if reply.status.is_success() {
            return Ok(reply.body);
        }

        match gateway_error(&reply.body) {
            Some((_, message)) => Err(SubmitError::Simulation(message)),
            None => Err(Self::unexpected(SIMULATE_PATH, &reply)),
        }
    }

    async fn get_tx(&self, hash: &str) -> SubmitResult<Option<Value>> {
        let path = format!("{}/{}", TXS_PATH, hash);
        let reply = self.execute(TXS_PATH, self.http.get(self.url(&path))).await?;

        if reply.is_not_found() {
            return Ok(None);
        }
        if !reply.status.is_success() {
            return Err(Self::unexpected(TXS_PATH, &reply));
        }

        Ok(Some(reply.body))
    }

    async fn latest_block_height(&self) -> SubmitResult<u64> {
        let reply = self
            .execute(LATEST_BLOCK_PATH, self.http.get(self.url(LATEST_BLOCK_PATH)))
            .await?;

        if !reply.status.is_success() {
            return Err(Self::unexpected(LATEST_BLOCK_PATH, &reply));
        }

        // Newer gateways expose `sdk_block`, older ones only `block`
        ["sdk_block", "block"]
            .iter()
            .find_map(|key| {
                reply
                    .body
                    .get(key)
                    .and_then(|block| block.pointer("/header/height"))
                    .and_then(json_u64)
            })
            .ok_or_else(|| SubmitError::TransportFailure {
                endpoint: LATEST_BLOCK_PATH.to_string(),
                message: "missing block.header.height".to_string(),
            })
    }
}
