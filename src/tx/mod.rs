//! Transaction module - building, signing and broadcasting
//!
//! The pipeline moves a request through three states:
//! `UnsignedTx` -> `SignDocComputed` -> `SignedTxEnvelope`.
//! `TransactionSender` drives it end to end under a per-address lock.

mod batch;
mod builder;
mod gas;
mod msg;
pub mod proto;
mod sender;
mod sequence;

pub use batch::{
    BatchAborted, BatchItem, BatchItemError, BatchItemReport, BatchOutcome, FailureMode,
};
pub use builder::{
    assemble_envelope, auth_info_for, build_unsigned_tx, compute_sign_doc, SignDocComputed,
    SignedTxEnvelope, TxRequest, UnsignedTx,
};
pub use gas::{FeeSpec, GasEstimator, GasPrice};
pub use msg::{ContractMsg, IbcTimeout, Msg, MsgContext};
pub use sender::{SenderConfig, TransactionSender};
pub use sequence::{SequenceGuard, SequenceLocks};
