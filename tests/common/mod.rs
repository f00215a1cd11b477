//! In-process LCD gateway backed by a tiny account/sequence ledger.
//!
//! Like a real node, account queries answer from committed state while
//! broadcasts are checked against the mempool's view. SYNC and ASYNC
//! broadcasts stay pending until `Ledger::commit_block`; BLOCK broadcasts
//! commit right away.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use prost::Message;
use secret_submitter::signer::verify_signature;
use secret_submitter::tx::proto::{AuthInfo, PubKey, SignDoc, TxRaw};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

pub const CHAIN_ID: &str = "secret-4";
pub const TEST_KEY: &str = "8f5b5d6c1b2a3e4f60718293a4b5c6d7e8f90112233445566778899aabbccdde";
pub const SENDER: &str = "secret19ngjr69t5k6x4q3y397fezkfpyal2hlkf7jkyr";
pub const RECIPIENT: &str = "secret1w508d6qejxtdg4y5r3zarvary0c5xw7kccrnjy";
pub const ACCOUNT_NUMBER: u64 = 7;
pub const SIMULATED_GAS: u64 = 85_000;
pub const START_HEIGHT: u64 = 12_345;

#[derive(Default)]
pub struct Ledger {
    /// Committed next sequence per known address, served by account queries
    pub sequences: HashMap<String, u64>,
    /// Next sequence the mempool accepts per address
    pub check_sequences: HashMap<String, u64>,
    /// Accepted but not yet included, by upper-hex hash
    pub pending: Vec<(String, Value)>,
    /// Included transactions by upper-hex hash
    pub included: HashMap<String, Value>,
    /// Sequences of every accepted transaction, in acceptance order
    pub accepted_sequences: Vec<u64>,
    pub broadcasts: usize,
    pub height: u64,
}

impl Ledger {
    /// Include every pending transaction in a new block
    pub fn commit_block(&mut self) {
        self.height += 1;
        for (txhash, mut tx) in std::mem::take(&mut self.pending) {
            tx["tx_response"]["height"] = json!(self.height.to_string());
            self.included.insert(txhash, tx);
        }
        self.sequences = self.check_sequences.clone();
    }
}

pub type SharedLedger = Arc<Mutex<Ledger>>;

/// Start a gateway on an ephemeral port; `SENDER` starts at `sequence`
pub async fn start_fake_lcd(sequence: u64) -> (String, SharedLedger) {
    let ledger = Arc::new(Mutex::new(Ledger {
        height: START_HEIGHT,
        ..Ledger::default()
    }));
    {
        let mut ledger = ledger.lock().unwrap();
        ledger.sequences.insert(SENDER.to_string(), sequence);
        ledger.check_sequences.insert(SENDER.to_string(), sequence);
    }

    let app = Router::new()
        .route("/cosmos/auth/v1beta1/accounts/:address", get(account))
        .route("/cosmos/tx/v1beta1/txs", post(broadcast))
        .route("/cosmos/tx/v1beta1/txs/:hash", get(get_tx))
        .route("/cosmos/tx/v1beta1/simulate", post(simulate))
        .route("/cosmos/base/tendermint/v1beta1/blocks/latest", get(latest_block))
        .with_state(ledger.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), ledger)
}

fn not_found(message: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"code": 5, "message": message, "details": []})),
    )
}

async fn account(
    State(ledger): State<SharedLedger>,
    Path(address): Path<String>,
) -> (StatusCode, Json<Value>) {
    let ledger = ledger.lock().unwrap();
    match ledger.sequences.get(&address) {
        Some(sequence) => (
            StatusCode::OK,
            Json(json!({"account": {
                "@type": "/cosmos.auth.v1beta1.BaseAccount",
                "address": address,
                "pub_key": null,
                "account_number": ACCOUNT_NUMBER.to_string(),
                "sequence": sequence.to_string(),
            }})),
        ),
        None => not_found(&format!("account {} not found", address)),
    }
}

fn tx_response(txhash: &str, code: u32, codespace: &str, raw_log: &str) -> Value {
    json!({"tx_response": {
        "height": "0",
        "txhash": txhash,
        "codespace": codespace,
        "code": code,
        "raw_log": raw_log,
        "gas_wanted": "0",
        "gas_used": "0",
    }})
}

/// Checks the sequence and signature the way the ante handler does
async fn broadcast(
    State(ledger): State<SharedLedger>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let Some(tx_bytes) = payload["tx_bytes"]
        .as_str()
        .and_then(|encoded| BASE64.decode(encoded).ok())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"code": 3, "message": "invalid tx_bytes", "details": []})),
        );
    };
    let mode = payload["mode"].as_str().unwrap_or_default().to_string();
    let txhash = hex::encode_upper(Sha256::digest(&tx_bytes));

    let raw = TxRaw::decode(tx_bytes.as_slice()).unwrap();
    let auth_info = AuthInfo::decode(raw.auth_info_bytes.as_slice()).unwrap();
    let signer_info = &auth_info.signer_infos[0];
    let public_key = PubKey::decode(signer_info.public_key.as_ref().unwrap().value.as_slice())
        .unwrap()
        .key;

    let mut ledger = ledger.lock().unwrap();
    ledger.broadcasts += 1;

    let expected = ledger.check_sequences.get(SENDER).copied().unwrap_or_default();
    if signer_info.sequence != expected {
        let log = format!(
            "account sequence mismatch, expected {}, got {}: incorrect account sequence",
            expected, signer_info.sequence
        );
        return (StatusCode::OK, Json(tx_response(&txhash, 32, "sdk", &log)));
    }

    let sign_doc = SignDoc {
        body_bytes: raw.body_bytes.clone(),
        auth_info_bytes: raw.auth_info_bytes.clone(),
        chain_id: CHAIN_ID.to_string(),
        account_number: ACCOUNT_NUMBER,
    }
    .encode_to_vec();
    if !verify_signature(&public_key, &sign_doc, &raw.signatures[0]) {
        return (
            StatusCode::OK,
            Json(tx_response(&txhash, 4, "sdk", "signature verification failed; please verify account number (7) and chain-id (secret-4): unauthorized")),
        );
    }

    ledger.check_sequences.insert(SENDER.to_string(), expected + 1);
    ledger.accepted_sequences.push(expected);

    let mut tx = tx_response(&txhash, 0, "", "[]");
    tx["tx"] = json!({"body": {"memo": ""}});
    ledger.pending.push((txhash.clone(), tx));

    let mut reply = tx_response(&txhash, 0, "", "[]");
    if mode == "BROADCAST_MODE_BLOCK" {
        ledger.commit_block();
        reply["tx_response"]["height"] = json!(ledger.height.to_string());
    }

    (StatusCode::OK, Json(reply))
}

async fn get_tx(
    State(ledger): State<SharedLedger>,
    Path(hash): Path<String>,
) -> (StatusCode, Json<Value>) {
    let ledger = ledger.lock().unwrap();
    match ledger.included.get(&hash) {
        Some(tx) => (StatusCode::OK, Json(tx.clone())),
        None => not_found(&format!("tx not found: {}", hash)),
    }
}

async fn simulate(Json(payload): Json<Value>) -> (StatusCode, Json<Value>) {
    if payload["tx_bytes"].as_str().is_none() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"code": 3, "message": "empty tx_bytes", "details": []})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({
            "gas_info": {"gas_wanted": "0", "gas_used": SIMULATED_GAS.to_string()},
            "result": {"data": "", "log": "", "events": []}
        })),
    )
}

async fn latest_block(State(ledger): State<SharedLedger>) -> Json<Value> {
    let height = ledger.lock().unwrap().height;
    Json(json!({"block": {"header": {"chain_id": CHAIN_ID, "height": height.to_string()}}}))
}
