//! Transaction construction and signing states
//!
//! ```text
//! UnsignedTx --compute_sign_doc--> SignDocComputed --sign--> SignedTxEnvelope
//!  (Built)    chain id + identity   (SignDocComputed)         (Signed)
//! ```
//!
//! Each step consumes the previous state, so a SignDoc can only be produced
//! from a built transaction and an envelope only from a computed SignDoc.

use super::gas::FeeSpec;
use super::msg::{Msg, MsgContext};
use super::proto::{
    Any, AuthInfo, Fee, ModeInfo, ModeInfoSingle, PubKey, SignDoc, SignerInfo, TxBody, TxRaw,
    PUBKEY_TYPE_URL, SIGN_MODE_DIRECT,
};
use crate::account::{AccountIdentity, COMPRESSED_PUBKEY_LEN};
use crate::error::{SubmitError, SubmitResult};
use crate::signer::TxSigner;

use prost::Message;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

/// What the caller wants executed in one transaction
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TxRequest {
    /// Executed in this order
    pub messages: Vec<Msg>,
    pub fee: FeeSpec,
    #[serde(default)]
    pub memo: String,
    /// Block height after which the tx is invalid, 0 for none
    #[serde(default)]
    pub timeout_height: u64,
}

/// Transaction body and fee, before any signer is attached
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTx {
    body: TxBody,
    fee: Fee,
}

/// Build the unsigned body of a transaction. No network access.
pub fn build_unsigned_tx(request: &TxRequest, ctx: &MsgContext) -> SubmitResult<UnsignedTx> {
    if request.messages.is_empty() {
        return Err(SubmitError::InvalidMessage(
            "a transaction needs at least one message".to_string(),
        ));
    }

    let messages = request
        .messages
        .iter()
        .map(|msg| msg.to_any(ctx))
        .collect::<SubmitResult<Vec<Any>>>()?;

    debug!(
        "Built tx with {} message(s): {:?}",
        messages.len(),
        request.messages.iter().map(Msg::kind).collect::<Vec<_>>()
    );

    Ok(UnsignedTx {
        body: TxBody {
            messages,
            memo: request.memo.clone(),
            timeout_height: request.timeout_height,
            extension_options: Vec::new(),
            non_critical_extension_options: Vec::new(),
        },
        fee: request.fee.to_fee()?,
    })
}

/// AuthInfo for a single SIGN_MODE_DIRECT signer
pub fn auth_info_for(public_key: &[u8; COMPRESSED_PUBKEY_LEN], sequence: u64, fee: Fee) -> AuthInfo {
    let public_key = Any::pack(
        PUBKEY_TYPE_URL,
        &PubKey {
            key: public_key.to_vec(),
        },
    );

    AuthInfo {
        signer_infos: vec![SignerInfo {
            public_key: Some(public_key),
            mode_info: Some(ModeInfo {
                single: Some(ModeInfoSingle {
                    mode: SIGN_MODE_DIRECT,
                }),
            }),
            sequence,
        }],
        fee: Some(fee),
    }
}

/// The bytes a signer authorizes: protobuf `SignDoc`
pub fn compute_sign_doc(
    body: &TxBody,
    auth_info: &AuthInfo,
    chain_id: &str,
    account_number: u64,
) -> Vec<u8> {
    SignDoc {
        body_bytes: body.encode_to_vec(),
        auth_info_bytes: auth_info.encode_to_vec(),
        chain_id: chain_id.to_string(),
        account_number,
    }
    .encode_to_vec()
}

impl UnsignedTx {
    pub fn body(&self) -> &TxBody {
        &self.body
    }

    pub fn fee(&self) -> &Fee {
        &self.fee
    }

    /// Attach the signer and derive the SignDoc
    pub fn compute_sign_doc(
        self,
        chain_id: &str,
        identity: &AccountIdentity,
        public_key: &[u8; COMPRESSED_PUBKEY_LEN],
    ) -> SignDocComputed {
        let auth_info = auth_info_for(public_key, identity.sequence, self.fee);
        let sign_doc = compute_sign_doc(&self.body, &auth_info, chain_id, identity.account_number);

        SignDocComputed {
            body: self.body,
            auth_info,
            public_key: *public_key,
            sign_doc,
        }
    }

    /// Envelope with an empty signature, accepted by the simulate endpoint
    pub fn into_simulation_envelope(
        self,
        public_key: &[u8; COMPRESSED_PUBKEY_LEN],
        sequence: u64,
    ) -> SignedTxEnvelope {
        let auth_info = auth_info_for(public_key, sequence, self.fee);
        SignedTxEnvelope {
            body: self.body,
            auth_info,
            signatures: vec![Vec::new()],
        }
    }
}

/// A transaction whose SignDoc is fixed and ready to be signed
#[derive(Debug, Clone, PartialEq)]
pub struct SignDocComputed {
    body: TxBody,
    auth_info: AuthInfo,
    public_key: [u8; COMPRESSED_PUBKEY_LEN],
    sign_doc: Vec<u8>,
}

impl SignDocComputed {
    pub fn sign_doc(&self) -> &[u8] {
        &self.sign_doc
    }

    pub fn auth_info(&self) -> &AuthInfo {
        &self.auth_info
    }

    /// Have `signer` authorize the SignDoc and assemble the envelope
    pub async fn sign(self, signer: &dyn TxSigner) -> SubmitResult<SignedTxEnvelope> {
        if signer.public_key() != self.public_key {
            return Err(SubmitError::SigningFailure(
                "signer key differs from the key in AuthInfo".to_string(),
            ));
        }

        let signature = signer.sign(&self.sign_doc).await?;
        assemble_envelope(self.body, self.auth_info, signature, &self.public_key)
    }
}

/// Combine body, signer metadata and signature; exactly one signer
pub fn assemble_envelope(
    body: TxBody,
    auth_info: AuthInfo,
    signature: Vec<u8>,
    public_key: &[u8],
) -> SubmitResult<SignedTxEnvelope> {
    if signature.is_empty() {
        return Err(SubmitError::SigningFailure("signature is empty".to_string()));
    }

    let [signer_info] = auth_info.signer_infos.as_slice() else {
        return Err(SubmitError::SigningFailure(format!(
            "expected exactly one signer, found {}",
            auth_info.signer_infos.len()
        )));
    };

    let expected = Any::pack(
        PUBKEY_TYPE_URL,
        &PubKey {
            key: public_key.to_vec(),
        },
    );
    if signer_info.public_key.as_ref() != Some(&expected) {
        return Err(SubmitError::InvalidKeyMaterial(
            "public key does not match the signer info".to_string(),
        ));
    }

    let direct = signer_info
        .mode_info
        .as_ref()
        .and_then(|mode| mode.single.as_ref())
        .map(|single| single.mode == SIGN_MODE_DIRECT)
        .unwrap_or(false);
    if !direct {
        return Err(SubmitError::SigningFailure(
            "only SIGN_MODE_DIRECT is supported".to_string(),
        ));
    }

    Ok(SignedTxEnvelope {
        body,
        auth_info,
        signatures: vec![signature],
    })
}

/// Signed transaction, ready for broadcast. Single use: the network
/// rejects it once its sequence has been consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct SignedTxEnvelope {
    body: TxBody,
    auth_info: AuthInfo,
    signatures: Vec<Vec<u8>>,
}

impl SignedTxEnvelope {
    pub fn body(&self) -> &TxBody {
        &self.body
    }

    pub fn auth_info(&self) -> &AuthInfo {
        &self.auth_info
    }

    pub fn signatures(&self) -> &[Vec<u8>] {
        &self.signatures
    }

    /// Sequence the envelope was signed for
    pub fn sequence(&self) -> Option<u64> {
        self.auth_info.signer_infos.first().map(|info| info.sequence)
    }

    /// Encoded `TxRaw`, the payload of `tx_bytes`
    pub fn to_bytes(&self) -> Vec<u8> {
        TxRaw {
            body_bytes: self.body.encode_to_vec(),
            auth_info_bytes: self.auth_info.encode_to_vec(),
            signatures: self.signatures.clone(),
        }
        .encode_to_vec()
    }

    /// Hash the network will report for this transaction
    pub fn tx_hash(&self) -> String {
        hex::encode_upper(Sha256::digest(self.to_bytes()))
    }
}
