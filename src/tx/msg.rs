//! Typed transaction messages
//!
//! One variant per message kind, each with exactly the fields that kind
//! needs. The signer's address is not part of the variants: every message
//! in a transaction is sent by the single signer.

use super::proto::{
    Any, Coin, Height, MsgExecuteContract, MsgInstantiateContract, MsgSend, MsgTransfer,
    MSG_EXECUTE_CONTRACT_TYPE_URL, MSG_INSTANTIATE_CONTRACT_TYPE_URL, MSG_SEND_TYPE_URL,
    MSG_TRANSFER_TYPE_URL,
};
use crate::account::decode_address;
use crate::error::{SubmitError, SubmitResult};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Contract message payload.
///
/// Secret contracts expect the payload encrypted for the contract; this
/// crate does not encrypt, it forwards what the caller hands in.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractMsg {
    /// JSON document, serialized with sorted keys
    Json(Value),
    /// Pre-encoded bytes, base64
    Encrypted(String),
}

impl ContractMsg {
    fn to_bytes(&self) -> SubmitResult<Vec<u8>> {
        match self {
            ContractMsg::Json(value) => serde_json::to_vec(value)
                .map_err(|e| SubmitError::InvalidMessage(format!("contract msg: {}", e))),
            ContractMsg::Encrypted(encoded) => BASE64
                .decode(encoded)
                .map_err(|e| SubmitError::InvalidMessage(format!("contract msg base64: {}", e))),
        }
    }
}

/// Timeout of an IBC transfer. Height and timestamp are mutually exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct IbcTimeout {
    #[serde(default)]
    pub height: Option<Height>,
    #[serde(default)]
    pub timestamp_nanos: Option<u64>,
}

impl IbcTimeout {
    /// Resolve into the `(timeout_height, timeout_timestamp)` pair of `MsgTransfer`.
    ///
    /// Without a usable height the transfer times out at `now + default_window`.
    pub fn resolve(&self, now_nanos: u64, default_window: Duration) -> SubmitResult<(Height, u64)> {
        match (self.height, self.timestamp_nanos) {
            (Some(_), Some(_)) => Err(SubmitError::ConflictingTimeout),
            (Some(height), None) if height.revision_height != 0 => Ok((height, 0)),
            (None, Some(timestamp)) if timestamp != 0 => Ok((Height::default(), timestamp)),
            _ => {
                let window = u64::try_from(default_window.as_nanos()).unwrap_or(u64::MAX);
                Ok((Height::default(), now_nanos.saturating_add(window)))
            }
        }
    }
}

fn default_transfer_port() -> String {
    "transfer".to_string()
}

/// A message to include in a transaction
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Msg {
    /// Execute a Secret contract
    ExecuteContract {
        contract: String,
        code_hash: String,
        msg: ContractMsg,
        #[serde(default)]
        funds: Vec<Coin>,
    },
    /// Instantiate stored contract code
    InstantiateContract {
        code_id: u64,
        code_hash: String,
        label: String,
        init_msg: ContractMsg,
        #[serde(default)]
        funds: Vec<Coin>,
        #[serde(default)]
        admin: Option<String>,
    },
    /// Bank transfer
    Send { to_address: String, amount: Vec<Coin> },
    /// ICS-20 token transfer to another chain
    IbcTransfer {
        #[serde(default = "default_transfer_port")]
        source_port: String,
        source_channel: String,
        token: Coin,
        receiver: String,
        #[serde(default)]
        timeout: IbcTimeout,
        #[serde(default)]
        memo: String,
    },
}

/// What a message needs from its surroundings to be encoded
#[derive(Debug, Clone)]
pub struct MsgContext {
    /// Address of the signing account
    pub sender: String,
    /// Bech32 prefix of local addresses
    pub prefix: String,
    /// Wall clock at build time, nanoseconds since the Unix epoch
    pub now_nanos: u64,
    /// Timeout applied to IBC transfers that name none
    pub ibc_timeout_window: Duration,
}

impl Msg {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::ExecuteContract { .. } => "execute_contract",
            Msg::InstantiateContract { .. } => "instantiate_contract",
            Msg::Send { .. } => "send",
            Msg::IbcTransfer { .. } => "ibc_transfer",
        }
    }

    /// Encode into a protobuf `Any`
    pub fn to_any(&self, ctx: &MsgContext) -> SubmitResult<Any> {
        match self {
            Msg::ExecuteContract {
                contract,
                code_hash,
                msg,
                funds,
            } => {
                validate_coins(funds)?;
                let message = MsgExecuteContract {
                    sender: decode_address(&ctx.sender, &ctx.prefix)?.to_vec(),
                    contract: decode_address(contract, &ctx.prefix)?.to_vec(),
                    msg: msg.to_bytes()?,
                    callback_code_hash: code_hash.clone(),
                    sent_funds: funds.clone(),
                    callback_sig: Vec::new(),
                };
                Ok(Any::pack(MSG_EXECUTE_CONTRACT_TYPE_URL, &message))
            }
            Msg::InstantiateContract {
                code_id,
                code_hash,
                label,
                init_msg,
                funds,
                admin,
            } => {
                if label.is_empty() {
                    return Err(SubmitError::InvalidMessage(
                        "instantiate label must not be empty".to_string(),
                    ));
                }
                validate_coins(funds)?;
                if let Some(admin) = admin {
                    decode_address(admin, &ctx.prefix)?;
                }
                let message = MsgInstantiateContract {
                    sender: decode_address(&ctx.sender, &ctx.prefix)?.to_vec(),
                    callback_code_hash: code_hash.clone(),
                    code_id: *code_id,
                    label: label.clone(),
                    init_msg: init_msg.to_bytes()?,
                    init_funds: funds.clone(),
                    callback_sig: Vec::new(),
                    admin: admin.clone().unwrap_or_default(),
                };
                Ok(Any::pack(MSG_INSTANTIATE_CONTRACT_TYPE_URL, &message))
            }
            Msg::Send { to_address, amount } => {
                if amount.is_empty() {
                    return Err(SubmitError::InvalidMessage(
                        "send amount must not be empty".to_string(),
                    ));
                }
                validate_coins(amount)?;
                decode_address(to_address, &ctx.prefix)?;
                let message = MsgSend {
                    from_address: ctx.sender.clone(),
                    to_address: to_address.clone(),
                    amount: amount.clone(),
                };
                Ok(Any::pack(MSG_SEND_TYPE_URL, &message))
            }
            Msg::IbcTransfer {
                source_port,
                source_channel,
                token,
                receiver,
                timeout,
                memo,
            } => {
                if source_channel.is_empty() || receiver.is_empty() {
                    return Err(SubmitError::InvalidMessage(
                        "IBC transfer needs a source channel and a receiver".to_string(),
                    ));
                }
                validate_coins(std::slice::from_ref(token))?;
                let (timeout_height, timeout_timestamp) =
                    timeout.resolve(ctx.now_nanos, ctx.ibc_timeout_window)?;
                let message = MsgTransfer {
                    source_port: source_port.clone(),
                    source_channel: source_channel.clone(),
                    token: Some(token.clone()),
                    sender: ctx.sender.clone(),
                    receiver: receiver.clone(),
                    timeout_height: Some(timeout_height),
                    timeout_timestamp,
                    memo: memo.clone(),
                };
                Ok(Any::pack(MSG_TRANSFER_TYPE_URL, &message))
            }
        }
    }
}

fn validate_coins(coins: &[Coin]) -> SubmitResult<()> {
    for coin in coins {
        if coin.denom.is_empty() || coin.amount.parse::<u128>().is_err() {
            return Err(SubmitError::InvalidMessage(format!(
                "invalid coin {}{}",
                coin.amount, coin.denom
            )));
        }
    }
    Ok(())
}
