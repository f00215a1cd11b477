//! Transaction sender: resolve, build, sign and broadcast
//!
//! Every submission runs the full pipeline with a freshly fetched account
//! identity while holding the signer address's sequence lock. Failures are
//! returned as they are; retrying is up to the caller.

use super::builder::{build_unsigned_tx, SignedTxEnvelope, TxRequest};
use super::gas::{FeeSpec, GasEstimator, GasPrice};
use super::msg::MsgContext;
use super::sequence::SequenceLocks;
use crate::account::AccountResolver;
use crate::chain::{BroadcastMode, BroadcastResult, ChainClient, SimulationResult};
use crate::config::Settings;
use crate::error::SubmitResult;
use crate::metrics;
use crate::signer::TxSigner;

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, field, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

/// Network and pipeline settings the sender needs
#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub chain_id: String,
    pub bech32_prefix: String,
    pub ibc_timeout_window: Duration,
    pub gas_adjustment_percent: u64,
    pub max_concurrent_txs: usize,
}

impl From<&Settings> for SenderConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            chain_id: settings.network.chain_id.clone(),
            bech32_prefix: settings.network.bech32_prefix.clone(),
            ibc_timeout_window: Duration::from_secs(settings.network.ibc_timeout_secs),
            gas_adjustment_percent: settings.submitter.gas_adjustment_percent,
            max_concurrent_txs: settings.submitter.max_concurrent_txs,
        }
    }
}

/// Builds, signs and broadcasts transactions against one chain
pub struct TransactionSender {
    /// Gateway access
    client: Arc<dyn ChainClient>,
    /// Address derivation and account lookups
    resolver: AccountResolver,
    /// Per-address critical sections
    sequence_locks: SequenceLocks,
    /// Gas estimator
    gas_estimator: GasEstimator,
    /// Configuration
    config: SenderConfig,
}

impl TransactionSender {
    /// Create a new transaction sender
    pub fn new(client: Arc<dyn ChainClient>, config: SenderConfig) -> Self {
        let resolver = AccountResolver::new(client.clone(), config.bech32_prefix.clone());

        Self {
            client,
            resolver,
            sequence_locks: SequenceLocks::new(),
            gas_estimator: GasEstimator::new(config.gas_adjustment_percent),
            config,
        }
    }

    pub fn resolver(&self) -> &AccountResolver {
        &self.resolver
    }

    pub fn config(&self) -> &SenderConfig {
        &self.config
    }

    fn msg_context(&self, sender: &str) -> MsgContext {
        let now_nanos = Utc::now()
            .timestamp_nanos_opt()
            .and_then(|nanos| u64::try_from(nanos).ok())
            .unwrap_or_default();

        MsgContext {
            sender: sender.to_string(),
            prefix: self.config.bech32_prefix.clone(),
            now_nanos,
            ibc_timeout_window: self.config.ibc_timeout_window,
        }
    }

    /// Run the whole pipeline for `request`, signed by `signer`
    pub async fn submit(
        &self,
        request: &TxRequest,
        signer: &dyn TxSigner,
        mode: BroadcastMode,
    ) -> SubmitResult<BroadcastResult> {
        let submission_id = Uuid::new_v4();
        let span = info_span!("submit", %submission_id, %mode, address = field::Empty);

        async {
            let started = Instant::now();
            let outcome = self.submit_inner(request, signer, mode).await;
            // The address guard is gone by now, whatever the outcome
            self.sequence_locks.prune_idle();

            match &outcome {
                Ok(result) => {
                    metrics::record_tx_latency(&mode.to_string(), started.elapsed().as_secs_f64());
                    info!("Transaction {} acknowledged ({} mode)", result.txhash, mode);
                }
                Err(e) => {
                    metrics::record_error(e);
                    warn!("Submission failed: {}", e);
                }
            }

            outcome
        }
        .instrument(span)
        .await
    }

    async fn submit_inner(
        &self,
        request: &TxRequest,
        signer: &dyn TxSigner,
        mode: BroadcastMode,
    ) -> SubmitResult<BroadcastResult> {
        let public_key = signer.public_key();
        let address = self.resolver.derive_address(&public_key)?;
        Span::current().record("address", address.as_str());

        let guard = self.sequence_locks.acquire(&address).await;

        let identity = self.resolver.fetch_account_identity(&address).await?;
        let envelope = build_unsigned_tx(request, &self.msg_context(&address))?
            .compute_sign_doc(&self.config.chain_id, &identity, &public_key)
            .sign(signer)
            .await?;

        debug!(
            "Signed {} for {} at sequence {}",
            envelope.tx_hash(),
            address,
            identity.sequence
        );

        let result = self.submit_envelope(&envelope, mode).await;
        drop(guard);

        result
    }

    /// Broadcast an already signed envelope
    pub async fn submit_envelope(
        &self,
        envelope: &SignedTxEnvelope,
        mode: BroadcastMode,
    ) -> SubmitResult<BroadcastResult> {
        let mode_label = mode.to_string();
        metrics::record_tx_submitted(&mode_label);

        let raw = self.client.broadcast(&envelope.to_bytes(), mode).await?;
        let result = BroadcastResult::from_response(raw)?.into_result()?;

        metrics::record_tx_accepted(&mode_label);
        if mode == BroadcastMode::Async {
            debug!("{} accepted without validation, inclusion must be polled", result.txhash);
        }

        Ok(result)
    }

    /// Dry-run `request` for gas usage. No signature is produced.
    pub async fn simulate(
        &self,
        request: &TxRequest,
        public_key: &[u8; crate::account::COMPRESSED_PUBKEY_LEN],
    ) -> SubmitResult<SimulationResult> {
        let address = self.resolver.derive_address(public_key)?;
        let identity = self.resolver.fetch_account_identity(&address).await?;

        let envelope = build_unsigned_tx(request, &self.msg_context(&address))?
            .into_simulation_envelope(public_key, identity.sequence);

        let raw = self.client.simulate(&envelope.to_bytes()).await?;
        let simulation = SimulationResult::from_response(raw)?;
        debug!(
            "Simulated tx for {}: gas_used={}",
            address, simulation.gas_used
        );
        Ok(simulation)
    }

    /// Fee covering the simulated gas usage plus the configured buffer
    pub async fn estimate_fee(
        &self,
        request: &TxRequest,
        public_key: &[u8; crate::account::COMPRESSED_PUBKEY_LEN],
        gas_price: GasPrice,
    ) -> SubmitResult<FeeSpec> {
        let simulation = self.simulate(request, public_key).await?;
        Ok(self.gas_estimator.fee_for(simulation.gas_used, gas_price))
    }

    /// Look a transaction up; `None` means not included (yet)
    pub async fn get_tx(&self, hash: &str) -> SubmitResult<Option<Value>> {
        self.client.get_tx(hash).await
    }

    pub(crate) fn max_concurrent_txs(&self) -> usize {
        self.config.max_concurrent_txs.max(1)
    }
}
