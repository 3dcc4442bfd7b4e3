use anyhow::{anyhow, Context, Result};
use clap::{value_parser, Arg, ArgAction, Command};
use config::{Config, Environment, File as ConfigFile};
use dujyo_chain::{ChainConfig, Node};
use dujyo_primitives::{SystemClock, Transaction};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod version;

use version::{git_commit_hash, DUJYO_VERSION};

/// Looked up (without extension) when `--config` is not given.
const DEFAULT_CONFIG_FILE: &str = "config/dujyo";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct AppConfig {
    log_level: String,
    log_format: String,
    /// How often the block timer fires.
    tick_interval_ms: u64,
    chain: ChainConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            tick_interval_ms: 1_000,
            chain: ChainConfig::default(),
        }
    }
}

impl AppConfig {
    fn load(config_path_override: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path_override {
            let path = PathBuf::from(path);
            if !path.exists() {
                anyhow::bail!(
                    "Configuration file {} not found (specified via --config)",
                    path.display()
                );
            }
            builder = builder.add_source(ConfigFile::from(path.as_path()));
        } else {
            builder = builder.add_source(ConfigFile::with_name(DEFAULT_CONFIG_FILE).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("DUJYO")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()?
            .try_deserialize()
            .context("invalid node configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.tick_interval_ms == 0 {
            anyhow::bail!("tick_interval_ms must be greater than zero");
        }
        if self.log_format != "pretty" && self.log_format != "json" {
            anyhow::bail!(
                "Invalid log_format '{}'; expected 'pretty' or 'json'",
                self.log_format
            );
        }
        if self.chain.tokens.is_empty() {
            anyhow::bail!("chain.tokens must list at least one token");
        }
        if self.chain.block.max_txs_per_block == 0 {
            anyhow::bail!("chain.block.max_txs_per_block must be greater than zero");
        }
        Ok(())
    }
}

fn apply_overrides(matches: &clap::ArgMatches, config: &mut AppConfig) {
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.log_level = level.clone();
    }
    if let Some(format) = matches.get_one::<String>("log-format") {
        config.log_format = format.clone();
    }
    if let Some(interval) = matches.get_one::<u64>("tick-interval-ms") {
        config.tick_interval_ms = *interval;
    }
}

fn build_cli() -> Command {
    Command::new("dujyo-node")
        .version(DUJYO_VERSION)
        .about("Dujyo ledger and consensus node")
        .disable_version_flag(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .help("Override the log level"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .value_parser(["pretty", "json"])
                .help("Select log output format"),
        )
        .arg(
            Arg::new("tick-interval-ms")
                .long("tick-interval-ms")
                .value_name("MILLIS")
                .value_parser(value_parser!(u64))
                .help("Override the block timer interval"),
        )
        .arg(
            Arg::new("txs")
                .long("txs")
                .value_name("FILE")
                .help("JSON array of transactions to queue at startup"),
        )
        .arg(
            Arg::new("version_flag")
                .short('V')
                .long("version")
                .action(ArgAction::SetTrue)
                .help("Print version information and exit"),
        )
        .arg(
            Arg::new("check")
                .long("check")
                .action(ArgAction::SetTrue)
                .help("Validate the configuration and genesis, then exit"),
        )
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();

    if matches.get_flag("version_flag") {
        println!("Dujyo {} (commit {})", DUJYO_VERSION, git_commit_hash());
        return Ok(());
    }

    let mut config = AppConfig::load(matches.get_one::<String>("config").map(String::as_str))?;
    apply_overrides(&matches, &mut config);
    config.validate()?;

    if matches.get_flag("check") {
        return run_self_check(&config);
    }

    init_logging(&config)?;
    info!(
        version = DUJYO_VERSION,
        commit = git_commit_hash(),
        tick_interval_ms = config.tick_interval_ms,
        "Starting Dujyo node"
    );

    let node = Node::from_config(config.chain.clone(), Arc::new(SystemClock))
        .map_err(|err| anyhow!("genesis failed: {err}"))?;

    if let Some(path) = matches.get_one::<String>("txs") {
        queue_transactions(&node, Path::new(path))?;
    }

    run(&node, Duration::from_millis(config.tick_interval_ms)).await?;

    let latest = node.latest_block();
    info!(height = latest.height, hash = %latest.hash, "Node stopped");
    Ok(())
}

/// Drive block production until shutdown. A halted node is an error.
async fn run(node: &Node, tick_interval: Duration) -> Result<()> {
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                match node.tick() {
                    Ok(Some(block)) => debug!(height = block.height, pending = node.pending_len(), "Tick produced block"),
                    Ok(None) => {}
                    Err(err) => {
                        error!(error = %err, "Block production stopped");
                        return Err(anyhow!("node halted: {err}"));
                    }
                }
                if let Some(reason) = node.dispatcher().halt_reason() {
                    error!(reason = %reason, "Node halted on invariant violation");
                    return Err(anyhow!("node halted: {reason}"));
                }
            }
            result = tokio::signal::ctrl_c() => {
                result.context("failed to listen for shutdown signal")?;
                info!("Shutdown signal received");
                return Ok(());
            }
        }
    }
}

fn queue_transactions(node: &Node, path: &Path) -> Result<()> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read transactions from {}", path.display()))?;
    let txs: Vec<Transaction> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse transactions in {}", path.display()))?;

    let total = txs.len();
    let mut queued = 0usize;
    for tx in txs {
        match node.submit(tx) {
            Ok(_) => queued += 1,
            Err(err) => warn!(error = %err, "Transaction not queued"),
        }
    }
    info!(queued, total, file = %path.display(), "Queued startup transactions");
    Ok(())
}

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    Ok(())
}

fn run_self_check(config: &AppConfig) -> Result<()> {
    println!("Running Dujyo node self-check...");
    match Node::from_config(config.chain.clone(), Arc::new(SystemClock)) {
        Ok(node) => {
            let stats = node.get_consensus_stats();
            println!(
                "Genesis OK: {} tokens, {} validators, staking token {}",
                node.ledgers().symbols().len(),
                stats.total_validators,
                node.get_staking_stats().token
            );
            node.verify_invariants()
                .map_err(|err| anyhow!("genesis state is inconsistent: {err}"))?;
            println!("Self-check passed");
            Ok(())
        }
        Err(err) => {
            eprintln!("- {err}");
            anyhow::bail!("self-check failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dujyo_chain::Evidence;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn loads_file_and_keeps_chain_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"
tick_interval_ms = 250

[chain.block]
idle_window_secs = 5
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.tick_interval_ms, 250);
        assert_eq!(config.chain.block.idle_window_secs, 5);
        assert_eq!(config.chain.block.max_txs_per_block, 500);
        assert_eq!(config.chain.tokens.len(), 2);
    }

    #[test]
    fn shipped_config_loads_and_boots() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../config/dujyo.toml");
        let config = AppConfig::load(Some(path)).unwrap();
        let dyo = 10u128.pow(18);
        assert_eq!(config.chain.staking.min_stake, 100 * dyo);
        assert_eq!(config.chain.genesis.staking_reward_reserve, 1_000_000 * dyo);
        assert_eq!(config.chain.genesis.allocations[0].amount, 100_000_000 * dyo);
        assert_eq!(config.chain.genesis.allocations[1].amount, 1_000_000_000_000);
        assert_eq!(config.chain.genesis.validators.len(), 2);
        run_self_check(&config).unwrap();
    }

    #[test]
    fn large_amounts_load_through_config_sources() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[chain.staking]
max_stake = "50000000000000000000000000"

[[chain.genesis.validators]]
address = "whale"
category = "economic"
stake = "20000000000000000000000"

[[chain.genesis.validators]]
address = "small"
category = "economic"
stake = 5000
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.chain.staking.max_stake, Some(50_000_000 * 10u128.pow(18)));
        let stakes: Vec<_> = config
            .chain
            .genesis
            .validators
            .iter()
            .map(|v| v.evidence.clone())
            .collect();
        assert_eq!(
            stakes,
            vec![
                Evidence::Economic { stake: 20_000 * 10u128.pow(18) },
                Evidence::Economic { stake: 5_000 },
            ]
        );
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        assert!(AppConfig::load(Some("/definitely/not/here.toml")).is_err());
    }

    #[test]
    fn rejects_unknown_log_format() {
        let config = AppConfig {
            log_format: "xml".to_string(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn cli_overrides_apply() {
        let matches = build_cli()
            .try_get_matches_from(["dujyo-node", "--log-format", "json", "--tick-interval-ms", "50"])
            .unwrap();
        let mut config = AppConfig::default();
        apply_overrides(&matches, &mut config);
        assert_eq!(config.log_format, "json");
        assert_eq!(config.tick_interval_ms, 50);
    }
}
