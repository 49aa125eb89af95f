//! `kvctl` - command-line access to a kvlock store.
//!
//! Reads the store settings from `kvlock.toml` (or `--config`), then runs a
//! single store or lock operation. Values on the command line are parsed as
//! JSON when possible and stored as plain strings otherwise.

use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use kvlock::config::DEFAULT_CONFIG_FILE;
use kvlock::{Error, KvStore, StoreConfig, acquire_expiring_lock};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "kvctl", version, about = "Key/value store and expiring lock CLI")]
struct Cli {
    /// Path to the config file (defaults to ./kvlock.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Use an in-memory store instead of the configured backend
    #[arg(long, global = true)]
    memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the value stored under a key
    Get {
        key: String,
        /// Decode the value as this type
        #[arg(long = "as", value_enum, default_value_t = ValueKind::Json)]
        kind: ValueKind,
    },
    /// Store a value
    Set {
        key: String,
        value: String,
        /// Expire the value after this many seconds
        #[arg(long)]
        ttl: Option<u64>,
    },
    /// Store a value only if the current value equals EXPECTED
    SetIf {
        key: String,
        value: String,
        expected: String,
    },
    /// Store a value only if the key has no live record
    SetIfNotExists { key: String, value: String },
    /// Remove a key
    Delete { key: String },
    /// Acquire an expiring lock, optionally hold it, then release it
    Lock {
        key: String,
        /// Lock expiry in seconds (defaults to lock.ttl_secs)
        #[arg(long)]
        ttl: Option<u64>,
        /// Seconds to hold the lock before releasing
        #[arg(long, default_value_t = 0)]
        hold: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ValueKind {
    Json,
    String,
    Time,
    I32,
    I64,
}

fn main() -> ExitCode {
    init_logging();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            let code = e.downcast_ref::<Error>().map_or(1, Error::exit_code);
            ExitCode::from(u8::try_from(code).unwrap_or(1))
        },
    }
}

/// Initialize stderr logging, filtered by `RUST_LOG` (default `warn`).
fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<StoreConfig> {
    if cli.memory {
        return Ok(StoreConfig::memory());
    }
    match &cli.config {
        Some(path) => StoreConfig::load_from(path),
        None if PathBuf::from(DEFAULT_CONFIG_FILE).exists() => {
            StoreConfig::load_from(DEFAULT_CONFIG_FILE)
        },
        None => Ok(StoreConfig::default()),
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    for warning in config.validate()?.warnings {
        tracing::warn!("{warning}");
    }
    let store = KvStore::from_config(&config).context("Failed to open store")?;

    match cli.command {
        Command::Get { key, kind } => {
            let rendered = match kind {
                ValueKind::Json => serde_json::to_string_pretty(&store.get_raw(&key)?)?,
                ValueKind::String => store.get_string(&key)?,
                ValueKind::Time => store.get_time(&key)?.to_rfc3339(),
                ValueKind::I32 => store.get_i32(&key)?.to_string(),
                ValueKind::I64 => store.get_i64(&key)?.to_string(),
            };
            println!("{rendered}");
        },
        Command::Set { key, value, ttl } => {
            let value = parse_value(&value);
            match ttl {
                Some(secs) => store.set_x(&key, &value, Duration::from_secs(secs))?,
                None => store.set(&key, &value)?,
            }
        },
        Command::SetIf {
            key,
            value,
            expected,
        } => {
            store.set_if(&key, &parse_value(&value), Some(&parse_value(&expected)))?;
        },
        Command::SetIfNotExists { key, value } => {
            store.set_if_not_exists(&key, &parse_value(&value))?;
        },
        Command::Delete { key } => store.delete(&key)?,
        Command::Lock { key, ttl, hold } => {
            let ttl = ttl.map_or_else(|| config.lock.ttl(), Duration::from_secs);
            let lock = acquire_expiring_lock(&store, &key, ttl)?;
            println!("acquired {} at {}", lock.key(), lock.acquired_at().to_rfc3339());
            if hold > 0 {
                thread::sleep(Duration::from_secs(hold));
            }
            lock.release()?;
            println!("released {key}");
        },
    }
    Ok(())
}

fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
