//! wallet-reconciler: replay wallet events through the reconciliation core
//!
//! Seeds an in-memory engine and phone book from a JSON fixture, feeds
//! newline-delimited JSON wallet events through the coordinator, and prints
//! the settled transaction view and contact directory as JSON.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use wallet_reconciler::config::Config;
use wallet_reconciler::engine::memory::EngineState;
use wallet_reconciler::engine::{MemoryEngine, WalletEngine, WalletEvent};
use wallet_reconciler::ledger::TxListView;
use wallet_reconciler::model::ContactIdentity;
use wallet_reconciler::phonebook::{
    ContactPermission, MemoryPhoneBook, PhoneBookEntry, PhoneBookProvider,
};
use wallet_reconciler::storage::ContactStore;
use wallet_reconciler::Coordinator;

#[derive(Parser)]
#[command(name = "wallet-reconciler")]
#[command(about = "Replay wallet events and print the reconciled view")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "wallet-reconciler.toml")]
    config: String,

    /// Data directory (overrides config file)
    #[arg(short, long, env = "WALLET_DATA_DIR")]
    data_dir: Option<String>,

    /// Session ID (overrides config file)
    #[arg(long, env = "WALLET_SESSION_ID")]
    session_id: Option<String>,

    /// JSON fixture seeding the engine and phone book
    #[arg(short, long)]
    fixture: Option<PathBuf>,

    /// Newline-delimited JSON wallet events to replay
    #[arg(short, long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct Fixture {
    #[serde(default)]
    engine: EngineState,
    #[serde(default)]
    phone_book: Vec<PhoneBookEntry>,
    #[serde(default)]
    contact_permission: bool,
}

#[derive(Serialize)]
struct Report<'a> {
    transactions: &'a TxListView,
    contacts: Vec<ContactIdentity>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries the report
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wallet_reconciler=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    info!("Config file: {}", cli.config);

    let mut config = Config::load(Path::new(&cli.config))?;
    if let Some(session_id) = cli.session_id {
        config.session.id = session_id;
    }
    if let Some(data_dir) = cli.data_dir {
        config.session.data_dir = PathBuf::from(data_dir);
    }
    info!("Session: {}", config.session.id);
    info!("Data dir: {}", config.session.data_dir.display());

    let fixture = match &cli.fixture {
        Some(path) => load_fixture(path)?,
        None => Fixture::default(),
    };

    let store = Arc::new(ContactStore::open(&config.session.data_dir)?);
    let engine = Arc::new(MemoryEngine::with_state(
        fixture.engine,
        config.coordinator.event_buffer,
    ));
    let phone_book = Arc::new(MemoryPhoneBook::new(fixture.phone_book));
    let permission =
        ContactPermission::new(config.contacts.phone_book_permission || fixture.contact_permission);

    let coordinator = Coordinator::new(
        Arc::clone(&engine) as Arc<dyn WalletEngine>,
        phone_book as Arc<dyn PhoneBookProvider>,
        store,
        permission,
        &config,
    );
    let handle = coordinator.start(engine.subscribe());

    if let Some(path) = &cli.events {
        let replayed = replay(&engine, path)?;
        info!(replayed, "Replayed wallet events");
    }

    // Let the last debounce window close and any contact pass finish
    let window = Duration::from_millis(config.coordinator.debounce_ms);
    loop {
        tokio::time::sleep(window + Duration::from_millis(50)).await;
        if !handle.is_refreshing_contacts() {
            break;
        }
        debug!("Waiting for contact pass");
    }
    tokio::time::sleep(window + Duration::from_millis(50)).await;

    let view = handle.latest_view();
    let report = Report {
        transactions: &view,
        contacts: handle.visible_contacts(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    handle.shutdown().await;
    Ok(())
}

fn load_fixture(path: &Path) -> anyhow::Result<Fixture> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading fixture {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing fixture {}", path.display()))
}

fn replay(engine: &MemoryEngine, path: &Path) -> anyhow::Result<usize> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening events {}", path.display()))?;
    let mut count = 0;
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("reading line {}", n + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        let event: WalletEvent = serde_json::from_str(&line)
            .with_context(|| format!("parsing event on line {}", n + 1))?;
        engine.emit(event);
        count += 1;
    }
    Ok(count)
}
