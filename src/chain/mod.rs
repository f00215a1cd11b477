//! Chain module - access to the network's REST gateway
//!
//! This module provides:
//! - The `ChainClient` seam used by the resolver and the submitter
//! - An LCD (REST) implementation with multi-URL failover
//! - Typed views over broadcast responses that keep the raw JSON

pub mod provider;
pub mod types;

pub use provider::LcdClient;
pub use types::{BroadcastResult, SimulationResult};

use crate::error::SubmitResult;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Gateway paths used by the submitter
pub const ACCOUNTS_PATH: &str = "/cosmos/auth/v1beta1/accounts";
pub const TXS_PATH: &str = "/cosmos/tx/v1beta1/txs";
pub const SIMULATE_PATH: &str = "/cosmos/tx/v1beta1/simulate";
pub const LATEST_BLOCK_PATH: &str = "/cosmos/base/tendermint/v1beta1/blocks/latest";

/// How long `broadcast` waits before answering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BroadcastMode {
    /// Returns once the node has checked the tx into its mempool
    #[default]
    Sync,
    /// Returns on receipt, without validation
    Async,
    /// Returns after inclusion in a block
    Block,
}

impl BroadcastMode {
    /// Value expected by the gateway's `mode` field
    pub fn as_gateway_str(&self) -> &'static str {
        match self {
            BroadcastMode::Sync => "BROADCAST_MODE_SYNC",
            BroadcastMode::Async => "BROADCAST_MODE_ASYNC",
            BroadcastMode::Block => "BROADCAST_MODE_BLOCK",
        }
    }
}

impl fmt::Display for BroadcastMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BroadcastMode::Sync => "sync",
            BroadcastMode::Async => "async",
            BroadcastMode::Block => "block",
        };
        f.write_str(name)
    }
}

/// Read access and broadcast against a chain's REST gateway.
///
/// Every method issues at most one request; retry policy belongs to callers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Raw account JSON, `None` when the network has no such account
    async fn account(&self, address: &str) -> SubmitResult<Option<Value>>;

    /// Submit encoded `TxRaw` bytes, returning the gateway's JSON verbatim
    async fn broadcast(&self, tx_bytes: &[u8], mode: BroadcastMode) -> SubmitResult<Value>;

    /// Dry-run encoded `TxRaw` bytes for gas estimation
    async fn simulate(&self, tx_bytes: &[u8]) -> SubmitResult<Value>;

    /// Look a transaction up by hash, `None` when not (yet) included
    async fn get_tx(&self, hash: &str) -> SubmitResult<Option<Value>>;

    /// Height of the latest committed block
    async fn latest_block_height(&self) -> SubmitResult<u64>;
}
