//! Typed views over gateway responses
//!
//! The raw JSON is always kept next to the extracted fields so callers can
//! pass the network's answer through unmodified.

use crate::error::{SubmitError, SubmitResult};

use serde::Serialize;
use serde_json::Value;

/// Read an integer that the gateway may encode as a decimal string or a number
pub fn json_u64(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

/// Extract the gRPC-gateway error `{ "code": .., "message": .. }`, if present
pub fn gateway_error(body: &Value) -> Option<(u32, String)> {
    let code = body.get("code").and_then(json_u64)?;
    let code = u32::try_from(code).ok()?;
    let message = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some((code, message))
}

/// An incomplete or garbled reply is treated like a failed request
fn incomplete(endpoint: &str, message: impl Into<String>) -> SubmitError {
    SubmitError::TransportFailure {
        endpoint: endpoint.to_string(),
        message: message.into(),
    }
}

/// Outcome of `POST /cosmos/tx/v1beta1/txs`
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastResult {
    pub txhash: String,
    pub code: u32,
    pub codespace: String,
    pub raw_log: String,
    pub height: u64,
    pub gas_wanted: u64,
    pub gas_used: u64,
    /// The gateway's response body, unmodified
    pub raw: Value,
}

impl BroadcastResult {
    /// Parse the `tx_response` object of a broadcast reply
    pub fn from_response(raw: Value) -> SubmitResult<Self> {
        let tx_response = raw
            .get("tx_response")
            .filter(|value| value.is_object())
            .ok_or_else(|| incomplete(super::TXS_PATH, "missing tx_response"))?;

        let code = tx_response
            .get("code")
            .and_then(json_u64)
            .ok_or_else(|| incomplete(super::TXS_PATH, "missing tx_response.code"))?;
        let code = u32::try_from(code).map_err(|_| {
            incomplete(super::TXS_PATH, format!("tx_response.code {} out of range", code))
        })?;

        let txhash = tx_response
            .get("txhash")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let field = |name: &str| tx_response.get(name).and_then(json_u64).unwrap_or(0);
        let text = |name: &str| {
            tx_response
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(Self {
            txhash,
            code,
            codespace: text("codespace"),
            raw_log: text("raw_log"),
            height: field("height"),
            gas_wanted: field("gas_wanted"),
            gas_used: field("gas_used"),
            raw,
        })
    }

    /// Whether the network accepted the transaction at this stage
    pub fn is_success(&self) -> bool {
        self.code == 0
    }

    /// Turn a non-zero result code into `BroadcastFailure`
    pub fn into_result(self) -> SubmitResult<Self> {
        if self.is_success() {
            return Ok(self);
        }

        Err(SubmitError::BroadcastFailure {
            code: self.code,
            codespace: self.codespace,
            log: self.raw_log,
            txhash: (!self.txhash.is_empty()).then_some(self.txhash),
        })
    }
}

/// Outcome of `POST /cosmos/tx/v1beta1/simulate`
#[derive(Debug, Clone, Serialize)]
pub struct SimulationResult {
    pub gas_wanted: u64,
    pub gas_used: u64,
    /// The gateway's response body, unmodified
    pub raw: Value,
}

impl SimulationResult {
    pub fn from_response(raw: Value) -> SubmitResult<Self> {
        let gas_info = raw
            .get("gas_info")
            .ok_or_else(|| incomplete(super::SIMULATE_PATH, "missing gas_info"))?;

        let gas_used = gas_info
            .get("gas_used")
            .and_then(json_u64)
            .ok_or_else(|| incomplete(super::SIMULATE_PATH, "missing gas_info.gas_used"))?;
        let gas_wanted = gas_info.get("gas_wanted").and_then(json_u64).unwrap_or(0);

        Ok(Self {
            gas_wanted,
            gas_used,
            raw,
        })
    }
}
