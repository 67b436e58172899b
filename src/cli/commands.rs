//! CLI command implementations
//!
//! - `init` creates an empty journal and writes no records
//! - `serve` replays the journal, then serves HTTP until Ctrl-C
//! - `history` and `verify` replay the journal without opening it for
//!   writing and print JSON

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use crate::actions::{order, ActionRegistry};
use crate::config::Config;
use crate::coordinator::{MemoryIdempotencyLedger, MutationCoordinator, RetryPolicy};
use crate::http::{HistoryEntry, HttpServer};
use crate::observability::{log_event_with_fields, Event, Logger, MetricsRegistry};
use crate::store::journal::{journal_path, JournalWriter};
use crate::store::{verify_chain, ChainHistory, IndexedVersionStore, VersionStore};
use crate::version::ChainId;

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::io::write_json;

/// Run the CLI with process arguments.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Init { config } => init(&config),
        Command::Serve { config, port } => serve(&config, port),
        Command::History { config, chain } => history(&config, &chain),
        Command::Verify { config } => verify(&config),
    }
}

fn load_config(config_path: &Path) -> CliResult<Config> {
    let config = Config::load(config_path)?;
    if let Some(severity) = config.severity() {
        Logger::set_min_severity(severity);
    }
    let path = config_path.display().to_string();
    log_event_with_fields(Event::ConfigLoaded, &[("path", path.as_str())]);
    Ok(config)
}

fn require_data_dir(config: &Config) -> CliResult<&Path> {
    config
        .data_path()
        .ok_or_else(|| CliError::config_error("data_dir is required for this command"))
}

fn initialized_data_dir(config: &Config) -> CliResult<&Path> {
    let data_dir = require_data_dir(config)?;
    if !journal_path(data_dir).exists() {
        return Err(CliError::not_initialized());
    }
    Ok(data_dir)
}

/// Opens the journaled store, failing if `init` was never run.
fn open_existing_store(config: &Config) -> CliResult<IndexedVersionStore> {
    let data_dir = initialized_data_dir(config)?;
    Ok(IndexedVersionStore::open(data_dir, config.journal_fsync)?)
}

/// Replays the journal without opening it for writing.
fn open_store_read_only(config: &Config) -> CliResult<IndexedVersionStore> {
    let data_dir = initialized_data_dir(config)?;
    Ok(IndexedVersionStore::open_read_only(data_dir)?)
}

/// Builds the registry of known resource types.
pub fn default_registry() -> CliResult<ActionRegistry> {
    ActionRegistry::new()
        .with(order::state_machine().map_err(|e| CliError::config_error(e.to_string()))?)
        .map_err(|e| CliError::config_error(e.to_string()))
}

/// Assembles a coordinator over `store` with the configured retry policy
/// and an in-memory idempotency ledger.
pub fn build_coordinator(config: &Config, store: Arc<dyn VersionStore>) -> CliResult<MutationCoordinator> {
    Ok(MutationCoordinator::new(store, Arc::new(default_registry()?))
        .with_retry(RetryPolicy::from_config(&config.retry))
        .with_ledger(Arc::new(MemoryIdempotencyLedger::new()))
        .with_metrics(Arc::new(MetricsRegistry::new())))
}

/// Creates `<data_dir>/journal/versions.log`.
pub fn init(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    let data_dir = require_data_dir(&config)?;
    if journal_path(data_dir).exists() {
        return Err(CliError::already_initialized());
    }

    let writer = JournalWriter::open(data_dir, config.journal_fsync)?;
    write_json(&json!({
        "status": "ok",
        "journal": writer.path().display().to_string(),
    }))
}

/// Serves the HTTP API. Without `data_dir` the store is in-memory.
pub fn serve(config_path: &Path, port: Option<u16>) -> CliResult<()> {
    let mut config = load_config(config_path)?;
    if let Some(port) = port {
        config.http.port = port;
    }

    let store: Arc<dyn VersionStore> = match config.data_path() {
        Some(_) => Arc::new(open_existing_store(&config)?),
        None => Arc::new(IndexedVersionStore::in_memory()),
    };
    let coordinator = Arc::new(build_coordinator(&config, store)?);
    let server = HttpServer::new(config.http.clone(), coordinator);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(server.start())?;
    Ok(())
}

/// Prints one JSON line per version of `chain`.
pub fn history(config_path: &Path, chain: &str) -> CliResult<()> {
    let config = load_config(config_path)?;
    let store = open_store_read_only(&config)?;

    let history = ChainHistory::open(&store, &ChainId::new(chain))?;
    for version in &history {
        write_json(&HistoryEntry::from(&version?))?;
    }
    Ok(())
}

/// Verifies every chain. Fails if any invariant is violated.
pub fn verify(config_path: &Path) -> CliResult<()> {
    let config = load_config(config_path)?;
    let store = open_store_read_only(&config)?;

    let chains = store.chain_ids()?;
    let mut total = 0;
    for chain_id in &chains {
        let violations = verify_chain(&store, chain_id)?;
        total += violations.len();
        write_json(&json!({
            "chain_id": chain_id,
            "ok": violations.is_empty(),
            "violations": violations.iter().map(|v| v.to_string()).collect::<Vec<_>>(),
        }))?;
    }

    write_json(&json!({
        "chains": chains.len(),
        "violations": total,
    }))?;
    if total > 0 {
        return Err(CliError::verification_failed(total));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::errors::CliErrorCode;
    use crate::coordinator::MutationRequest;
    use std::fs;
    use std::path::PathBuf;

    fn write_config(dir: &Path) -> PathBuf {
        let path = dir.join("revchain.json");
        let body = json!({
            "data_dir": dir.join("data"),
            "journal_fsync": false,
            "log_level": "error",
        });
        fs::write(&path, body.to_string()).unwrap();
        path
    }

    #[test]
    fn test_init_creates_journal_once() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path());

        init(&config).unwrap();
        assert!(journal_path(&dir.path().join("data")).exists());

        let err = init(&config).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::AlreadyInitialized);
    }

    #[test]
    fn test_verify_requires_init() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_config(dir.path());
        assert_eq!(verify(&config).unwrap_err().code(), &CliErrorCode::NotInitialized);
    }

    #[test]
    fn test_verify_and_history_after_mutations() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(dir.path());
        init(&config_path).unwrap();

        {
            let config = Config::load(&config_path).unwrap();
            let store: Arc<dyn VersionStore> = Arc::new(open_existing_store(&config).unwrap());
            let coordinator = build_coordinator(&config, store).unwrap();
            let v1 = coordinator
                .create_chain("order", ChainId::new("o1"), json!({"items": 1}))
                .unwrap();
            coordinator
                .apply(MutationRequest::new("order", "o1", "cancel", json!({}), v1.id(), "cli"))
                .unwrap();
        }

        verify(&config_path).unwrap();
        history(&config_path, "o1").unwrap();
        assert_eq!(
            history(&config_path, "missing").unwrap_err().code(),
            &CliErrorCode::StoreError
        );
    }

    #[test]
    fn test_read_commands_leave_journal_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = write_config(dir.path());
        assert_eq!(
            history(&config_path, "o1").unwrap_err().code(),
            &CliErrorCode::NotInitialized
        );
        assert!(!dir.path().join("data").exists());

        init(&config_path).unwrap();
        let journal = journal_path(&dir.path().join("data"));
        let before = fs::metadata(&journal).unwrap().len();
        verify(&config_path).unwrap();
        assert_eq!(fs::metadata(&journal).unwrap().len(), before);
    }

    #[test]
    fn test_in_memory_config_rejected_for_init() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("revchain.json");
        fs::write(&path, "{}").unwrap();
        assert_eq!(init(&path).unwrap_err().code(), &CliErrorCode::ConfigError);
    }
}
