//! securekv CLI
//!
//! Command-line interface for inspecting and editing a device's store file.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use securekv::{Config, DeviceId, Occurrence, SecureStore, StoreError, SyncStrategy};
use tracing_subscriber::{fmt, EnvFilter};

/// securekv CLI
#[derive(Parser, Debug)]
#[command(name = "securekv-cli")]
#[command(about = "CLI for the securekv per-device settings store")]
#[command(version)]
struct Args {
    /// Directory holding the store files
    #[arg(short, long, default_value = "./securekv_data")]
    data_dir: String,

    /// Device EUI-64 as 16 hex digits
    #[arg(short = 'i', long, default_value = "0000000000000000")]
    device_id: DeviceId,

    /// Port offset distinguishing simulated devices
    #[arg(short, long, env = "PORT_OFFSET", default_value = "0")]
    offset: String,

    /// Skip fsync on commit
    #[arg(long)]
    no_sync: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a value as hex
    Get {
        /// Key (decimal or 0x-prefixed hex)
        #[arg(value_parser = parse_key)]
        key: u16,

        /// Which value of the key, oldest first
        #[arg(short = 'n', long, default_value = "0")]
        index: usize,
    },

    /// Replace the store contents with one value
    Set {
        #[arg(value_parser = parse_key)]
        key: u16,

        /// Value as hex
        value: String,
    },

    /// Same as set
    Add {
        #[arg(value_parser = parse_key)]
        key: u16,

        value: String,
    },

    /// Append a value, keeping every existing record
    Append {
        #[arg(value_parser = parse_key)]
        key: u16,

        value: String,
    },

    /// Delete one value, or all values of a key
    Del {
        #[arg(value_parser = parse_key)]
        key: u16,

        #[arg(short = 'n', long, conflicts_with = "all")]
        index: Option<usize>,

        /// Delete every value of the key
        #[arg(long)]
        all: bool,
    },

    /// Remove the store file
    Wipe,

    /// Print every record
    List,

    /// Scan the store file and report its state
    Verify,
}

fn main() -> ExitCode {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,securekv=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let result = run(args);

    match &result {
        Ok(()) => {}
        Err(StoreError::NotFound) => tracing::info!("Not found"),
        Err(e) => tracing::error!("{}", e),
    }
    ExitCode::from(exit_status(&result))
}

/// 0 on success, 2 when the key or index does not exist, 1 for anything else
fn exit_status(result: &securekv::Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(StoreError::NotFound) => 2,
        Err(_) => 1,
    }
}

fn run(args: Args) -> securekv::Result<()> {
    let config = Config::builder()
        .data_dir(&args.data_dir)
        .device_id(args.device_id)
        .port_offset(args.offset)
        .sync_strategy(if args.no_sync {
            SyncStrategy::Never
        } else {
            SyncStrategy::EveryCommit
        })
        .build();

    if let Commands::Wipe = args.command {
        let store = SecureStore::new(config)?;
        store.wipe()?;
        tracing::info!(
            "Wiped store of device {} ({:?})",
            store.config().device_id,
            store.paths().data
        );
        return Ok(());
    }

    let mut store = SecureStore::open(config)?;

    let result = match args.command {
        Commands::Get { key, index } => {
            let value = store.get(key, index)?.ok_or(StoreError::NotFound)?;
            println!("{}", hex::encode(value));
            Ok(())
        }
        Commands::Set { key, value } => store.set(key, &decode_value(&value)?),
        Commands::Add { key, value } => store.add(key, &decode_value(&value)?),
        Commands::Append { key, value } => store.append(key, &decode_value(&value)?),
        Commands::Del { key, index, all } => {
            let occurrence = match (index, all) {
                (_, true) => Occurrence::All,
                (Some(n), false) => Occurrence::Nth(n),
                (None, false) => Occurrence::Nth(0),
            };
            store.delete(key, occurrence)
        }
        Commands::List => {
            for record in store.records()? {
                println!("{:#06x} {}", record.key, hex::encode(&record.value));
            }
            Ok(())
        }
        Commands::Verify => {
            let report = store.verify()?;
            println!(
                "records={} valid_bytes={} file_size={} truncated={}",
                report.records, report.valid_bytes, report.file_size, report.truncated
            );
            Ok(())
        }
        Commands::Wipe => Ok(()),
    };

    store.deinit();
    result
}

/// Accept `42` or `0x2a`
fn parse_key(s: &str) -> Result<u16, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex_digits) => u16::from_str_radix(hex_digits, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid key {:?}: {}", s, e))
}

fn decode_value(s: &str) -> securekv::Result<Vec<u8>> {
    hex::decode(s).map_err(|e| StoreError::Config(format!("Invalid hex value {:?}: {}", s, e)))
}
