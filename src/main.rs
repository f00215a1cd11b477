//! secret-submitter - command line front end for the submission pipeline
//!
//! Reads the network settings from the TOML file named by
//! `SECRET_SUBMITTER_CONFIG` and the signing key from the environment
//! variable named in `[wallet]`. Gateway responses are printed as JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use zeroize::Zeroizing;

use secret_submitter::account::derive_address;
use secret_submitter::chain::{BroadcastMode, ChainClient, LcdClient};
use secret_submitter::config::{LogFormat, Settings};
use secret_submitter::metrics;
use secret_submitter::signer::{SoftwareSigner, TxSigner};
use secret_submitter::tx::{
    BatchItem, BatchItemReport, BatchOutcome, FailureMode, FeeSpec, Msg, TransactionSender,
    TxRequest,
};

#[derive(Parser)]
#[command(name = "secret-submitter")]
#[command(about = "Build, sign and broadcast Secret Network transactions", long_about = None)]
struct Cli {
    /// Configuration file, overrides SECRET_SUBMITTER_CONFIG
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the address of the configured key, or of a given public key
    Address {
        /// Compressed secp256k1 public key, hex
        #[arg(long)]
        pubkey: Option<String>,
    },
    /// Show account number and sequence
    Account {
        /// Defaults to the configured key's address
        address: Option<String>,
    },
    /// Look up a transaction by hash
    Tx { hash: String },
    /// Check gateway reachability and the latest block height
    Status,
    /// Dry-run a transaction request and print the gas estimate
    Simulate {
        /// JSON request file
        #[arg(long)]
        file: PathBuf,
    },
    /// Sign and broadcast a transaction request
    Send {
        /// JSON request file
        #[arg(long)]
        file: PathBuf,
        /// Overrides submitter.broadcast_mode
        #[arg(long, value_enum)]
        mode: Option<BroadcastMode>,
        /// Overrides the memo of the request file
        #[arg(long)]
        memo: Option<String>,
        /// Simulate first and use the estimated fee
        #[arg(long)]
        estimate_fee: bool,
    },
    /// Sign and broadcast a list of requests from one JSON array
    Batch {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, value_enum)]
        mode: Option<BroadcastMode>,
        /// Report failures per item instead of stopping at the first one
        #[arg(long)]
        continue_on_error: bool,
    },
}

/// Request as written in a JSON file
#[derive(Debug, Deserialize)]
struct RequestFile {
    messages: Vec<Msg>,
    #[serde(default)]
    fee: Option<FeeSpec>,
    #[serde(default)]
    memo: String,
    #[serde(default)]
    timeout_height: u64,
}

impl RequestFile {
    /// `fallback` stands in for a missing fee; without one the request is refused
    fn into_request(self, fallback: Option<FeeSpec>) -> Result<TxRequest> {
        let fee = self.fee.or(fallback).context(
            "Request has no fee: set one in the request, pass --estimate-fee, \
             or configure network.gas_price and network.default_gas_limit",
        )?;

        Ok(TxRequest {
            messages: self.messages,
            fee,
            memo: self.memo,
            timeout_height: self.timeout_height,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    init_logging(&settings.logging.format);
    info!(
        "secret-submitter v{} on {} via {} gateway(s)",
        env!("CARGO_PKG_VERSION"),
        settings.network.chain_id,
        settings.network.lcd_urls.len()
    );

    let client = Arc::new(LcdClient::new(
        settings.network.lcd_urls.clone(),
        Duration::from_millis(settings.submitter.request_timeout_ms),
    )?);

    let outcome = run(cli.command, &settings, client).await;

    if let Some(path) = settings.metrics.textfile_path.as_deref() {
        if settings.metrics.enabled {
            if let Err(e) = metrics::write_textfile(path) {
                warn!("Failed to write metrics to {:?}: {}", path, e);
            }
        }
    }

    outcome
}

async fn run(command: Commands, settings: &Settings, client: Arc<LcdClient>) -> Result<()> {
    let sender = TransactionSender::new(client.clone(), settings.into());

    match command {
        Commands::Address { pubkey } => {
            let address = match pubkey {
                Some(pubkey) => {
                    let bytes = hex::decode(pubkey.trim()).context("Public key is not valid hex")?;
                    derive_address(&bytes, &settings.network.bech32_prefix)?
                }
                None => {
                    let signer = load_signer(settings)?;
                    sender.resolver().derive_address(&signer.public_key())?
                }
            };
            println!("{}", address);
        }
        Commands::Account { address } => {
            let address = match address {
                Some(address) => address,
                None => {
                    let signer = load_signer(settings)?;
                    sender.resolver().derive_address(&signer.public_key())?
                }
            };
            let identity = sender.resolver().fetch_account_identity(&address).await?;
            print_json(&serde_json::to_value(identity)?)?;
        }
        Commands::Tx { hash } => match sender.get_tx(&hash).await? {
            Some(tx) => print_json(&tx)?,
            None => println!("Transaction {} not found", hash),
        },
        Commands::Status => {
            let healthy = client.health_check().await;
            let height = client.latest_block_height().await?;
            print_json(&serde_json::json!({
                "chain_id": settings.network.chain_id,
                "gateway": client.active_url(),
                "healthy": healthy,
                "latest_block_height": height,
            }))?;
        }
        Commands::Simulate { file } => {
            let request = read_request(&file, Some(FeeSpec::for_simulation()))?;
            let public_key = load_signer(settings)?.public_key();
            let simulation = sender.simulate(&request, &public_key).await?;
            let fee = sender
                .estimate_fee(&request, &public_key, settings.gas_price()?)
                .await?;
            print_json(&serde_json::json!({
                "gas_used": simulation.gas_used,
                "gas_wanted": simulation.gas_wanted,
                "suggested_gas_limit": fee.gas_limit(),
                "suggested_fee": fee.to_fee()?.amount,
            }))?;
        }
        Commands::Send {
            file,
            mode,
            memo,
            estimate_fee,
        } => {
            let fallback = if estimate_fee {
                Some(FeeSpec::for_simulation())
            } else {
                settings.default_fee()?
            };
            let mut request = read_request(&file, fallback)?;
            if let Some(memo) = memo {
                request.memo = memo;
            }
            let signer = load_signer(settings)?;
            if estimate_fee {
                request.fee = sender
                    .estimate_fee(&request, &signer.public_key(), settings.gas_price()?)
                    .await?;
                info!("Using estimated gas limit {}", request.fee.gas_limit());
            }

            let mode = mode.unwrap_or(settings.submitter.broadcast_mode);
            let result = sender.submit(&request, &signer, mode).await;
            drop(signer);

            print_json(&result?.raw)?;
        }
        Commands::Batch {
            file,
            mode,
            continue_on_error,
        } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read batch file: {:?}", file))?;
            let files: Vec<RequestFile> =
                serde_json::from_str(&contents).context("Failed to parse batch file")?;
            let fallback = settings.default_fee()?;
            let requests = files
                .into_iter()
                .map(|f| f.into_request(fallback.clone()))
                .collect::<Result<Vec<_>>>()?;

            let signer = load_signer(settings)?;
            let items = requests
                .into_iter()
                .map(|request| BatchItem {
                    request,
                    signer: &signer,
                })
                .collect();
            let failure_mode = if continue_on_error {
                FailureMode::Continue
            } else {
                FailureMode::Abort
            };

            let outcome = sender
                .submit_batch(
                    items,
                    mode.unwrap_or(settings.submitter.broadcast_mode),
                    failure_mode,
                )
                .await;

            match outcome {
                Ok(outcomes) => print_reports(&outcomes)?,
                // Acknowledged items are still printed so their hashes are not lost
                Err(aborted) => {
                    print_reports(&aborted.completed)?;
                    return Err(aborted.into());
                }
            }
        }
    }

    Ok(())
}

/// Build the signer from the configured environment variable
fn load_signer(settings: &Settings) -> Result<SoftwareSigner> {
    let var = &settings.wallet.private_key_env;
    let secret = Zeroizing::new(
        std::env::var(var).with_context(|| format!("Private key variable {} is not set", var))?,
    );
    Ok(SoftwareSigner::from_hex(&secret)?)
}

fn read_request(path: &Path, fallback: Option<FeeSpec>) -> Result<TxRequest> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read request file: {:?}", path))?;
    let file: RequestFile =
        serde_json::from_str(&contents).context("Failed to parse request file")?;
    file.into_request(fallback)
}

fn print_reports(outcomes: &[BatchOutcome]) -> Result<()> {
    let reports: Vec<BatchItemReport> = outcomes.iter().map(BatchItemReport::from).collect();
    print_json(&serde_json::to_value(reports)?)
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging(format: &LogFormat) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,secret_submitter=debug,reqwest=warn,hyper=warn")
    });

    // Logs go to stderr so stdout stays machine readable
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}
