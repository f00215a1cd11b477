//! Error types for the Secret transaction submitter

use thiserror::Error;

/// Codespace and code the Cosmos SDK uses for `ErrWrongSequence`
const SDK_CODESPACE: &str = "sdk";
const WRONG_SEQUENCE_CODE: u32 = 32;

/// Main error type for the submission pipeline
#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    #[error("Account {address} not found: {message}")]
    AccountNotFound { address: String, message: String },

    #[error("Signing failed: {0}")]
    SigningFailure(String),

    #[error("Both a timeout height and a timeout timestamp were supplied")]
    ConflictingTimeout,

    #[error("Invalid fee: {0}")]
    InvalidFee(String),

    #[error("Invalid address {address}: {message}")]
    InvalidAddress { address: String, message: String },

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Broadcast rejected with code {code} ({codespace}): {log}")]
    BroadcastFailure {
        code: u32,
        codespace: String,
        log: String,
        txhash: Option<String>,
    },

    #[error("Simulation failed: {0}")]
    Simulation(String),

    #[error("Unexpected response from {endpoint}: {message}")]
    InvalidResponse { endpoint: String, message: String },

    #[error("Transport error for {endpoint}: {message}")]
    TransportFailure { endpoint: String, message: String },
}

impl SubmitError {
    /// Check if error is retryable by the caller
    pub fn is_retryable(&self) -> bool {
        match self {
            SubmitError::AccountNotFound { .. } | SubmitError::TransportFailure { .. } => true,
            SubmitError::BroadcastFailure { .. } => self.is_sequence_mismatch(),
            _ => false,
        }
    }

    /// Check if the network rejected the transaction for a stale sequence.
    ///
    /// Recovering requires re-fetching the account identity before signing again.
    pub fn is_sequence_mismatch(&self) -> bool {
        match self {
            SubmitError::BroadcastFailure {
                code,
                codespace,
                log,
                ..
            } => {
                (*code == WRONG_SEQUENCE_CODE && codespace == SDK_CODESPACE)
                    || log.contains("account sequence mismatch")
            }
            _ => false,
        }
    }

    /// Short, stable label used for metrics and batch reports
    pub fn kind(&self) -> &'static str {
        match self {
            SubmitError::Config(_) => "config",
            SubmitError::InvalidKeyMaterial(_) => "invalid_key_material",
            SubmitError::AccountNotFound { .. } => "account_not_found",
            SubmitError::SigningFailure(_) => "signing_failure",
            SubmitError::ConflictingTimeout => "conflicting_timeout",
            SubmitError::InvalidFee(_) => "invalid_fee",
            SubmitError::InvalidAddress { .. } => "invalid_address",
            SubmitError::InvalidMessage(_) => "invalid_message",
            SubmitError::Encoding(_) => "encoding",
            SubmitError::BroadcastFailure { .. } => "broadcast_failure",
            SubmitError::Simulation(_) => "simulation",
            SubmitError::InvalidResponse { .. } => "invalid_response",
            SubmitError::TransportFailure { .. } => "transport_failure",
        }
    }
}

/// Result type for submitter operations
pub type SubmitResult<T> = Result<T, SubmitError>;
