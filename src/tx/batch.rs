//! Batch submission over many signers
//!
//! Items run through the normal pipeline with bounded concurrency. Items
//! sharing a signer still queue on that signer's sequence lock, in input
//! order.

use super::builder::TxRequest;
use super::sender::TransactionSender;
use crate::chain::{BroadcastMode, BroadcastResult};
use crate::error::SubmitError;
use crate::signer::TxSigner;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{info, warn};

/// What a failed item does to the rest of the batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailureMode {
    /// First failure (in input order) stops the batch
    #[default]
    Abort,
    /// Failures are reported per item; the batch keeps going
    Continue,
}

/// One transaction of a batch and the key that authorizes it
pub struct BatchItem<'a> {
    pub request: TxRequest,
    pub signer: &'a dyn TxSigner,
}

/// Per-item outcome, in input order
#[derive(Debug)]
pub struct BatchOutcome {
    pub index: usize,
    pub result: Result<BroadcastResult, SubmitError>,
}

/// Serializable form of a failed item
#[derive(Debug, Clone, Serialize)]
pub struct BatchItemError {
    pub kind: &'static str,
    pub message: String,
    pub retryable: bool,
}

/// Serializable form of a batch outcome
#[derive(Debug, Clone, Serialize)]
pub struct BatchItemReport {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BatchItemError>,
}

impl From<&BatchOutcome> for BatchItemReport {
    fn from(outcome: &BatchOutcome) -> Self {
        match &outcome.result {
            Ok(result) => Self {
                index: outcome.index,
                response: Some(result.raw.clone()),
                error: None,
            },
            Err(e) => Self {
                index: outcome.index,
                response: None,
                error: Some(BatchItemError {
                    kind: e.kind(),
                    message: e.to_string(),
                    retryable: e.is_retryable(),
                }),
            },
        }
    }
}

/// A batch stopped by a failing item under `FailureMode::Abort`.
///
/// `completed` holds every other item that was started before the stop, in
/// input order. Acknowledged items among them are on the network.
#[derive(Debug, Error)]
#[error("Batch aborted at item {index}: {error}")]
pub struct BatchAborted {
    pub index: usize,
    #[source]
    pub error: SubmitError,
    pub completed: Vec<BatchOutcome>,
}

impl TransactionSender {
    /// Submit every item and return the outcomes in input order.
    ///
    /// With `FailureMode::Abort` a failure keeps items that have not started
    /// from starting. Items already in flight run to completion and come back
    /// in `BatchAborted::completed` next to the first failure in input order.
    pub async fn submit_batch(
        &self,
        items: Vec<BatchItem<'_>>,
        mode: BroadcastMode,
        failure_mode: FailureMode,
    ) -> Result<Vec<BatchOutcome>, BatchAborted> {
        let total = items.len();
        info!(
            "Submitting batch of {} transactions (concurrency {}, {:?})",
            total,
            self.max_concurrent_txs(),
            failure_mode
        );

        let stopped = AtomicBool::new(false);
        let stopped = &stopped;
        let mut pending = stream::iter(items.into_iter().enumerate())
            .map(|(index, item)| async move {
                if stopped.load(Ordering::SeqCst) {
                    return None;
                }
                let result = self.submit(&item.request, item.signer, mode).await;
                if result.is_err() && failure_mode == FailureMode::Abort {
                    stopped.store(true, Ordering::SeqCst);
                }
                Some(BatchOutcome { index, result })
            })
            .buffered(self.max_concurrent_txs());

        let mut outcomes = Vec::with_capacity(total);
        let mut first_failure = None;
        let mut not_started = 0;
        while let Some(outcome) = pending.next().await {
            let BatchOutcome { index, result } = match outcome {
                Some(outcome) => outcome,
                None => {
                    not_started += 1;
                    continue;
                }
            };
            if let Err(e) = &result {
                warn!("Batch item {} failed: {}", index, e);
            }
            match result {
                Err(e) if failure_mode == FailureMode::Abort && first_failure.is_none() => {
                    first_failure = Some((index, e));
                }
                result => outcomes.push(BatchOutcome { index, result }),
            }
        }

        if let Some((index, error)) = first_failure {
            warn!(
                "Batch aborted at item {}: {} completed, {} not started",
                index,
                outcomes.len(),
                not_started
            );
            return Err(BatchAborted {
                index,
                error,
                completed: outcomes,
            });
        }

        let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
        info!("Batch finished: {} ok, {} failed", total - failed, failed);

        Ok(outcomes)
    }
}
