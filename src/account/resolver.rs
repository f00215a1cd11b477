//! Account resolver: public key to on-chain signing identity

use super::address::derive_address;
use crate::chain::types::json_u64;
use crate::chain::ChainClient;
use crate::error::{SubmitError, SubmitResult};
use crate::metrics;

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Signer identity as the network currently sees it.
///
/// Valid for exactly one transaction: the sequence moves by one with every
/// transaction the account gets included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountIdentity {
    pub address: String,
    pub account_number: u64,
    pub sequence: u64,
}

/// Resolves addresses and fetches account number / sequence
pub struct AccountResolver {
    client: Arc<dyn ChainClient>,
    prefix: String,
}

impl AccountResolver {
    /// Create a new resolver for addresses under `prefix`
    pub fn new(client: Arc<dyn ChainClient>, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    /// Bech32 prefix of this network's account addresses
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Address for a compressed secp256k1 public key
    pub fn derive_address(&self, public_key: &[u8]) -> SubmitResult<String> {
        derive_address(public_key, &self.prefix)
    }

    /// Fetch the account number and current sequence of `address`
    pub async fn fetch_account_identity(&self, address: &str) -> SubmitResult<AccountIdentity> {
        metrics::record_account_lookup();

        let body = self
            .client
            .account(address)
            .await?
            .ok_or_else(|| SubmitError::AccountNotFound {
                address: address.to_string(),
                message: "network reports no such account".to_string(),
            })?;

        let identity = parse_account(address, &body)?;
        debug!(
            "Resolved {}: account_number={} sequence={}",
            identity.address, identity.account_number, identity.sequence
        );
        Ok(identity)
    }
}

/// Extract the identity from `{"account": {...}}`.
///
/// Vesting and module accounts nest the fields under `base_vesting_account`
/// and/or `base_account`. A missing field means the account is not usable
/// yet; only an explicit value counts.
fn parse_account(address: &str, body: &Value) -> SubmitResult<AccountIdentity> {
    let missing = |field: &str| SubmitError::AccountNotFound {
        address: address.to_string(),
        message: format!("account response has no {}", field),
    };

    let mut account = body.get("account").ok_or_else(|| missing("account"))?;
    while let Some(inner) = account
        .get("base_vesting_account")
        .or_else(|| account.get("base_account"))
    {
        account = inner;
    }

    let account_number = account
        .get("account_number")
        .and_then(json_u64)
        .ok_or_else(|| missing("account_number"))?;
    let sequence = account
        .get("sequence")
        .and_then(json_u64)
        .ok_or_else(|| missing("sequence"))?;

    let reported = account.get("address").and_then(Value::as_str);
    if let Some(reported) = reported {
        if reported != address {
            return Err(SubmitError::InvalidResponse {
                endpoint: crate::chain::ACCOUNTS_PATH.to_string(),
                message: format!("asked for {}, network answered for {}", address, reported),
            });
        }
    }

    Ok(AccountIdentity {
        address: address.to_string(),
        account_number,
        sequence,
    })
}
