use botbazaar::application::market::Marketplace;
use botbazaar::config::MarketConfig;
use botbazaar::domain::ports::{Collaborators, MarketStoreRef};
use botbazaar::infrastructure::in_memory::InMemoryMarketStore;
use botbazaar::infrastructure::offline::{
    DigestKeyDeriver, OfflineResponder, UnsignedPaymentBuilder,
};
use botbazaar::interfaces::commands::{dispatch, envelope};
use botbazaar::interfaces::jsonl::request_reader::RequestReader;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input requests file, one JSON object per line
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// JSON config file overriding the marketplace defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// The platform's static key used for payout key derivation
    #[arg(long, env = "PLATFORM_KEY")]
    platform_key: Option<String>,
}

fn open_store(db_path: Option<PathBuf>) -> Result<MarketStoreRef> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = botbazaar::infrastructure::rocksdb::RocksDBStore::open(&path)
                .into_diagnostic()?;
            info!(path = %path.display(), "opened persistent store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            warn!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(Arc::new(InMemoryMarketStore::new()))
        }
        None => Ok(Arc::new(InMemoryMarketStore::new())),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => MarketConfig::from_path(path).into_diagnostic()?,
        None => MarketConfig::default(),
    };
    if let Some(key) = cli.platform_key {
        config = config.with_platform_key(key);
    }

    let store = open_store(cli.db_path)?;
    let collaborators = Collaborators {
        responder: Arc::new(OfflineResponder),
        key_deriver: Arc::new(DigestKeyDeriver),
        payment_builder: Arc::new(UnsignedPaymentBuilder),
    };
    let market = Marketplace::open(store, config, collaborators)
        .await
        .into_diagnostic()?;

    let file = File::open(cli.input).into_diagnostic()?;
    let reader = RequestReader::new(BufReader::new(file));
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut processed = 0usize;
    for request in reader.requests() {
        processed += 1;
        let outcome = match request {
            Ok(request) => {
                let operation = request.operation.clone();
                let outcome = dispatch(&market, request).await;
                if let Err(e) = &outcome {
                    warn!(operation = %operation, "Error processing request: {}", e);
                }
                outcome
            }
            Err(e) => {
                warn!("Error reading request: {}", e);
                Err(e)
            }
        };
        writeln!(out, "{}", envelope(outcome)).into_diagnostic()?;
    }
    out.flush().into_diagnostic()?;
    info!(processed, "finished replaying requests");

    Ok(())
}
