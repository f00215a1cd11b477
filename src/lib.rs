//! Secret Network transaction submitter
//!
//! Builds Cosmos SDK `SIGN_MODE_DIRECT` transactions, signs them with a
//! secp256k1 key and broadcasts them through an LCD REST gateway, keeping
//! submissions from one address strictly ordered.

pub mod account;
pub mod chain;
pub mod config;
pub mod error;
pub mod metrics;
pub mod signer;
pub mod tx;

pub use error::{SubmitError, SubmitResult};
