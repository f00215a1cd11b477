//! Account module - signer identity on chain
//!
//! Maps a secp256k1 public key to its bech32 account address and fetches
//! the account number and sequence the network expects in the next SignDoc.

pub mod address;
mod resolver;

pub use address::{decode_address, derive_address, COMPRESSED_PUBKEY_LEN};
pub use resolver::{AccountIdentity, AccountResolver};
