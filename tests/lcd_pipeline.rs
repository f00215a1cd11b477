//! End-to-end pipeline tests against an in-process LCD gateway.

use secret_submitter::account::AccountResolver;
use secret_submitter::chain::{BroadcastMode, ChainClient, LcdClient};
use secret_submitter::signer::{SoftwareSigner, TxSigner};
use secret_submitter::tx::proto::Coin;
use secret_submitter::tx::{
    build_unsigned_tx, BatchItem, FailureMode, FeeSpec, Msg, MsgContext, SenderConfig,
    TransactionSender, TxRequest,
};
use secret_submitter::SubmitError;
use std::sync::Arc;
use std::time::Duration;

mod common;

use common::{
    start_fake_lcd, ACCOUNT_NUMBER, CHAIN_ID, RECIPIENT, SENDER, SIMULATED_GAS, START_HEIGHT,
    TEST_KEY,
};

fn sender_for(client: Arc<LcdClient>) -> TransactionSender {
    TransactionSender::new(
        client,
        SenderConfig {
            chain_id: CHAIN_ID.to_string(),
            bech32_prefix: "secret".to_string(),
            ibc_timeout_window: Duration::from_secs(600),
            gas_adjustment_percent: 20,
            max_concurrent_txs: 4,
        },
    )
}

fn lcd(urls: Vec<String>) -> Arc<LcdClient> {
    Arc::new(LcdClient::new(urls, Duration::from_secs(5)).unwrap())
}

fn send_request(amount: u128) -> TxRequest {
    TxRequest {
        messages: vec![Msg::Send {
            to_address: RECIPIENT.to_string(),
            amount: vec![Coin::new(amount, "uscrt")],
        }],
        fee: FeeSpec::from_gas_price("0.1uscrt".parse().unwrap(), 200_000),
        memo: "integration".to_string(),
        timeout_height: 0,
    }
}

#[tokio::test]
async fn test_send_is_accepted_and_queryable() {
    let (url, ledger) = start_fake_lcd(3).await;
    let sender = sender_for(lcd(vec![url]));
    let signer = SoftwareSigner::from_hex(TEST_KEY).unwrap();

    let result = sender
        .submit(&send_request(1_000), &signer, BroadcastMode::Sync)
        .await
        .unwrap();

    assert_eq!(result.code, 0);
    assert_eq!(result.txhash.len(), 64);
    assert_eq!(ledger.lock().unwrap().accepted_sequences, vec![3]);

    // Accepted into the mempool, not in a block yet
    assert!(sender.get_tx(&result.txhash).await.unwrap().is_none());

    ledger.lock().unwrap().commit_block();
    let included = sender.get_tx(&result.txhash).await.unwrap().unwrap();
    assert_eq!(included["tx_response"]["txhash"], result.txhash.as_str());
    assert_eq!(
        included["tx_response"]["height"],
        (START_HEIGHT + 1).to_string().as_str()
    );
}

#[tokio::test]
async fn test_account_identity_comes_from_gateway() {
    let (url, _ledger) = start_fake_lcd(42).await;
    let resolver = AccountResolver::new(lcd(vec![url]), "secret");

    let signer = SoftwareSigner::from_hex(TEST_KEY).unwrap();
    let address = resolver.derive_address(&signer.public_key()).unwrap();
    assert_eq!(address, SENDER);

    let identity = resolver.fetch_account_identity(&address).await.unwrap();
    assert_eq!(identity.account_number, ACCOUNT_NUMBER);
    assert_eq!(identity.sequence, 42);

    let err = resolver
        .fetch_account_identity(RECIPIENT)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::AccountNotFound { .. }));
}

#[tokio::test]
async fn test_concurrent_block_submissions_are_serialized() {
    let (url, ledger) = start_fake_lcd(0).await;
    let sender = sender_for(lcd(vec![url]));
    let signer = SoftwareSigner::from_hex(TEST_KEY).unwrap();

    let requests: Vec<TxRequest> = (1..=5).map(send_request).collect();
    let results = futures::future::join_all(
        requests
            .iter()
            .map(|request| sender.submit(request, &signer, BroadcastMode::Block)),
    )
    .await;

    assert!(results.iter().all(|r| r.is_ok()));
    let ledger = ledger.lock().unwrap();
    assert_eq!(ledger.accepted_sequences, vec![0, 1, 2, 3, 4]);
    assert_eq!(ledger.broadcasts, 5);
}

#[tokio::test]
async fn test_concurrent_sync_submissions_before_commit_see_one_mismatch() {
    let (url, ledger) = start_fake_lcd(0).await;
    let sender = sender_for(lcd(vec![url]));
    let signer = SoftwareSigner::from_hex(TEST_KEY).unwrap();

    let requests: Vec<TxRequest> = (1..=2).map(send_request).collect();
    let results = futures::future::join_all(
        requests
            .iter()
            .map(|request| sender.submit(request, &signer, BroadcastMode::Sync)),
    )
    .await;

    // The second holder re-reads committed state, which still says 0
    let succeeded = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(succeeded, 1);
    let mismatch = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(mismatch.is_sequence_mismatch());
    assert!(mismatch.is_retryable());
    assert_eq!(ledger.lock().unwrap().accepted_sequences, vec![0]);

    // Once the first is committed, the caller's retry goes through
    ledger.lock().unwrap().commit_block();
    sender
        .submit(&requests[1], &signer, BroadcastMode::Sync)
        .await
        .unwrap();
    assert_eq!(ledger.lock().unwrap().accepted_sequences, vec![0, 1]);
}

#[tokio::test]
async fn test_reused_sequence_is_rejected() {
    let (url, _ledger) = start_fake_lcd(9).await;
    let client = lcd(vec![url]);
    let sender = sender_for(client.clone());
    let signer = SoftwareSigner::from_hex(TEST_KEY).unwrap();

    // Two envelopes signed against the same identity snapshot
    let identity = sender
        .resolver()
        .fetch_account_identity(SENDER)
        .await
        .unwrap();
    let ctx = MsgContext {
        sender: SENDER.to_string(),
        prefix: "secret".to_string(),
        now_nanos: 1_700_000_000_000_000_000,
        ibc_timeout_window: Duration::from_secs(600),
    };

    let mut envelopes = Vec::new();
    for amount in [10, 20] {
        let envelope = build_unsigned_tx(&send_request(amount), &ctx)
            .unwrap()
            .compute_sign_doc(CHAIN_ID, &identity, &signer.public_key())
            .sign(&signer)
            .await
            .unwrap();
        envelopes.push(envelope);
    }

    let first = sender
        .submit_envelope(&envelopes[0], BroadcastMode::Sync)
        .await;
    let second = sender
        .submit_envelope(&envelopes[1], BroadcastMode::Sync)
        .await;

    assert!(first.is_ok());
    let err = second.unwrap_err();
    assert!(err.is_sequence_mismatch());
    match err {
        SubmitError::BroadcastFailure {
            code, codespace, ..
        } => {
            assert_eq!(code, 32);
            assert_eq!(codespace, "sdk");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_async_broadcast_is_not_yet_included() {
    let (url, _ledger) = start_fake_lcd(0).await;
    let sender = sender_for(lcd(vec![url]));
    let signer = SoftwareSigner::from_hex(TEST_KEY).unwrap();

    let result = sender
        .submit(&send_request(5), &signer, BroadcastMode::Async)
        .await
        .unwrap();

    assert!(sender.get_tx(&result.txhash).await.unwrap().is_none());
}

#[tokio::test]
async fn test_wrong_chain_id_fails_signature_check() {
    let (url, _ledger) = start_fake_lcd(0).await;
    let client = lcd(vec![url]);
    let sender = TransactionSender::new(
        client,
        SenderConfig {
            chain_id: "pulsar-3".to_string(),
            bech32_prefix: "secret".to_string(),
            ibc_timeout_window: Duration::from_secs(600),
            gas_adjustment_percent: 20,
            max_concurrent_txs: 1,
        },
    );
    let signer = SoftwareSigner::from_hex(TEST_KEY).unwrap();

    let err = sender
        .submit(&send_request(5), &signer, BroadcastMode::Sync)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::BroadcastFailure { code: 4, .. }));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_simulation_drives_fee_estimate() {
    let (url, ledger) = start_fake_lcd(0).await;
    let sender = sender_for(lcd(vec![url]));
    let public_key = SoftwareSigner::from_hex(TEST_KEY).unwrap().public_key();

    let simulation = sender
        .simulate(&send_request(5), &public_key)
        .await
        .unwrap();
    assert_eq!(simulation.gas_used, SIMULATED_GAS);

    let fee = sender
        .estimate_fee(&send_request(5), &public_key, "0.25uscrt".parse().unwrap())
        .await
        .unwrap();
    // 85000 + 20% = 102000 gas at 0.25uscrt
    assert_eq!(fee.gas_limit(), 102_000);
    assert_eq!(fee.to_fee().unwrap().amount[0].amount, "25500");

    assert_eq!(ledger.lock().unwrap().broadcasts, 0);
}

#[tokio::test]
async fn test_failover_applies_to_the_next_call_only() {
    let (url, _ledger) = start_fake_lcd(0).await;
    let client = lcd(vec!["http://127.0.0.1:1".to_string(), url.clone()]);

    let err = client.latest_block_height().await.unwrap_err();
    assert!(matches!(err, SubmitError::TransportFailure { .. }));
    assert_eq!(client.active_url(), url);

    assert_eq!(client.latest_block_height().await.unwrap(), START_HEIGHT);
    assert!(client.health_check().await);
}

#[tokio::test]
async fn test_batch_continues_past_failures() {
    let (url, ledger) = start_fake_lcd(0).await;
    let sender = sender_for(lcd(vec![url]));
    let signer = SoftwareSigner::from_hex(TEST_KEY).unwrap();

    let mut bad = send_request(1);
    bad.fee = FeeSpec::from_gas_price("0.1uscrt".parse().unwrap(), 0);

    let items = vec![
        BatchItem {
            request: send_request(1),
            signer: &signer,
        },
        BatchItem {
            request: bad,
            signer: &signer,
        },
        BatchItem {
            request: send_request(3),
            signer: &signer,
        },
    ];

    let outcomes = sender
        .submit_batch(items, BroadcastMode::Block, FailureMode::Continue)
        .await
        .unwrap();

    assert!(outcomes[0].result.is_ok());
    assert!(matches!(outcomes[1].result, Err(SubmitError::InvalidFee(_))));
    assert!(outcomes[2].result.is_ok());
    assert_eq!(ledger.lock().unwrap().accepted_sequences, vec![0, 1]);
}

#[tokio::test]
async fn test_aborted_batch_still_reports_included_items() {
    let (url, ledger) = start_fake_lcd(0).await;
    let sender = sender_for(lcd(vec![url]));
    let signer = SoftwareSigner::from_hex(TEST_KEY).unwrap();

    let mut bad = send_request(2);
    bad.fee = FeeSpec::from_gas_price("0.1uscrt".parse().unwrap(), 0);
    let items = vec![
        BatchItem {
            request: send_request(1),
            signer: &signer,
        },
        BatchItem {
            request: bad,
            signer: &signer,
        },
    ];

    let aborted = sender
        .submit_batch(items, BroadcastMode::Block, FailureMode::Abort)
        .await
        .unwrap_err();

    assert_eq!(aborted.index, 1);
    assert!(matches!(aborted.error, SubmitError::InvalidFee(_)));
    let first = aborted.completed[0].result.as_ref().unwrap();
    assert!(ledger.lock().unwrap().included.contains_key(&first.txhash));
}
