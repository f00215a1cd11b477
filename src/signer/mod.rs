//! Signer capability for transaction signing
//!
//! The pipeline only sees the `TxSigner` trait, so key custody stays outside
//! of it. `SoftwareSigner` keeps a secp256k1 key in memory; hardware wallets
//! or a remote KMS can be added by implementing the same trait.

use crate::account::COMPRESSED_PUBKEY_LEN;
use crate::error::{SubmitError, SubmitResult};

use async_trait::async_trait;
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};
use std::fmt;
use zeroize::Zeroizing;

/// Length of a raw secp256k1 secret scalar
pub const SECRET_KEY_LEN: usize = 32;

/// Length of an `r || s` signature
pub const SIGNATURE_LEN: usize = 64;

/// Something able to authorize transactions for one account
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TxSigner: Send + Sync {
    /// Compressed secp256k1 public key of the signing account
    fn public_key(&self) -> [u8; COMPRESSED_PUBKEY_LEN];

    /// Sign SignDoc bytes: ECDSA over `sha256(sign_doc)`, 64 byte `r || s`
    async fn sign(&self, sign_doc: &[u8]) -> SubmitResult<Vec<u8>>;
}

/// Signer backed by a private key held in process memory.
///
/// The key is wiped when the signer is dropped; build one per signing
/// operation and let it go right after.
pub struct SoftwareSigner {
    key: SigningKey,
    public_key: [u8; COMPRESSED_PUBKEY_LEN],
}

impl SoftwareSigner {
    /// Create a signer from the 32 byte secret scalar
    pub fn from_bytes(secret: &[u8]) -> SubmitResult<Self> {
        if secret.len() != SECRET_KEY_LEN {
            return Err(SubmitError::SigningFailure(format!(
                "private key must be {} bytes, got {}",
                SECRET_KEY_LEN,
                secret.len()
            )));
        }

        let key = SigningKey::from_slice(secret).map_err(|_| {
            SubmitError::SigningFailure("private key is not a valid secp256k1 scalar".to_string())
        })?;

        let encoded = key.verifying_key().to_encoded_point(true);
        let public_key: [u8; COMPRESSED_PUBKEY_LEN] =
            encoded.as_bytes().try_into().map_err(|_| {
                SubmitError::InvalidKeyMaterial("unexpected public key encoding".to_string())
            })?;

        Ok(Self { key, public_key })
    }

    /// Create a signer from a hex encoded key, `0x` prefix optional
    pub fn from_hex(secret_hex: &str) -> SubmitResult<Self> {
        let trimmed = secret_hex.trim();
        let trimmed = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let secret = Zeroizing::new(
            hex::decode(trimmed)
                .map_err(|_| SubmitError::SigningFailure("private key is not valid hex".to_string()))?,
        );
        Self::from_bytes(&secret)
    }

    fn sign_digest(&self, sign_doc: &[u8]) -> SubmitResult<Vec<u8>> {
        let digest = Sha256::digest(sign_doc);
        let signature: Signature = self
            .key
            .sign_prehash(&digest)
            .map_err(|e| SubmitError::SigningFailure(e.to_string()))?;

        // Cosmos SDK nodes reject high-S signatures
        let signature = signature.normalize_s().unwrap_or(signature);
        Ok(signature.to_bytes().to_vec())
    }
}

impl fmt::Debug for SoftwareSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SoftwareSigner")
            .field("public_key", &hex::encode(self.public_key))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TxSigner for SoftwareSigner {
    fn public_key(&self) -> [u8; COMPRESSED_PUBKEY_LEN] {
        self.public_key
    }

    async fn sign(&self, sign_doc: &[u8]) -> SubmitResult<Vec<u8>> {
        self.sign_digest(sign_doc)
    }
}

/// Verify a 64 byte signature over `sha256(sign_doc)`
pub fn verify_signature(public_key: &[u8], sign_doc: &[u8], signature: &[u8]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };

    let digest = Sha256::digest(sign_doc);
    verifying_key.verify_prehash(&digest, &signature).is_ok()
}
