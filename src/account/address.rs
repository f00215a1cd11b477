//! Bech32 account addresses
//!
//! `bech32(prefix, ripemd160(sha256(compressed_pubkey)))`, the encoding the
//! Cosmos SDK uses for secp256k1 accounts, checksum included.

use crate::error::{SubmitError, SubmitResult};

use bech32::{FromBase32, ToBase32, Variant};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Length of a SEC1 compressed secp256k1 point
pub const COMPRESSED_PUBKEY_LEN: usize = 33;

/// Length of the account id behind every address
pub const ACCOUNT_ID_LEN: usize = 20;

/// Derive the account address for a compressed public key
pub fn derive_address(public_key: &[u8], prefix: &str) -> SubmitResult<String> {
    if public_key.len() != COMPRESSED_PUBKEY_LEN {
        return Err(SubmitError::InvalidKeyMaterial(format!(
            "expected {} byte compressed public key, got {} bytes",
            COMPRESSED_PUBKEY_LEN,
            public_key.len()
        )));
    }
    if !matches!(public_key[0], 0x02 | 0x03) {
        return Err(SubmitError::InvalidKeyMaterial(format!(
            "public key prefix 0x{:02x} is not a compressed point",
            public_key[0]
        )));
    }
    k256::PublicKey::from_sec1_bytes(public_key).map_err(|_| {
        SubmitError::InvalidKeyMaterial("public key is not a point on secp256k1".to_string())
    })?;

    let account_id = Ripemd160::digest(Sha256::digest(public_key));

    bech32::encode(prefix, account_id.to_base32(), Variant::Bech32)
        .map_err(|e| SubmitError::Encoding(format!("bech32 encoding failed: {}", e)))
}

/// Decode an address into its 20 byte account id, checking prefix and checksum
pub fn decode_address(address: &str, expected_prefix: &str) -> SubmitResult<[u8; ACCOUNT_ID_LEN]> {
    let invalid = |message: String| SubmitError::InvalidAddress {
        address: address.to_string(),
        message,
    };

    let (prefix, data, variant) = bech32::decode(address).map_err(|e| invalid(e.to_string()))?;

    if prefix != expected_prefix {
        return Err(invalid(format!(
            "expected prefix {}, found {}",
            expected_prefix, prefix
        )));
    }
    if variant != Variant::Bech32 {
        return Err(invalid("bech32m addresses are not accounts".to_string()));
    }

    let bytes = Vec::<u8>::from_base32(&data).map_err(|e| invalid(e.to_string()))?;
    bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| invalid(format!("account id has {} bytes", bytes.len())))
}
