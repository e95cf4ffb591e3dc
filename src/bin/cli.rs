//! blobheap CLI
//!
//! Command-line interface operating directly on a blob file.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use blobheap::{BlobStore, Config, FitPolicy, StoreResult, SyncStrategy};

/// blobheap CLI
#[derive(Parser, Debug)]
#[command(name = "blobheap-cli")]
#[command(about = "CLI for the blobheap single-file blob store")]
#[command(version)]
struct Args {
    /// Blob file
    #[arg(short, long, default_value = "./blobheap.dat")]
    file: PathBuf,

    /// fsync after every mutation
    #[arg(long)]
    fsync: bool,

    /// Use first-fit instead of best-fit allocation
    #[arg(long)]
    first_fit: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Store a new blob and print its key
    Put {
        /// Blob contents as text
        value: Option<String>,

        /// Read blob contents from a file instead
        #[arg(short, long, conflicts_with = "value")]
        input: Option<PathBuf>,
    },

    /// Print a blob
    Get {
        /// The key to read
        key: u32,

        /// Write the blob to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Replace a blob
    Update {
        /// The key to update
        key: u32,

        /// New contents as text
        value: Option<String>,

        /// Read new contents from a file instead
        #[arg(short, long, conflicts_with = "value")]
        input: Option<PathBuf>,
    },

    /// Delete a blob
    #[command(alias = "del")]
    Delete {
        /// The key to delete
        key: u32,
    },

    /// List all keys
    List,

    /// Show space accounting
    Stats,

    /// Check the file against every allocator invariant
    Verify,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,blobheap=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .path(&args.file)
        .sync_strategy(if args.fsync {
            SyncStrategy::EveryWrite
        } else {
            SyncStrategy::Flush
        })
        .fit_policy(if args.first_fit {
            FitPolicy::FirstFit
        } else {
            FitPolicy::BestFit
        })
        .build();

    let store = match BlobStore::open(config) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open {}: {}", args.file.display(), e);
            process::exit(1);
        }
    };

    let ok = match args.command {
        Commands::Put { value, input } => match payload(value, input) {
            Ok(bytes) => report(store.create(&bytes), |key| println!("{}", key)),
            Err(e) => fail(e),
        },
        Commands::Get { key, output } => report(store.read(key), |bytes| {
            let written = match &output {
                Some(path) => fs::write(path, &bytes),
                None => io::stdout().write_all(&bytes),
            };
            if let Err(e) = written {
                tracing::error!("Failed to write blob: {}", e);
            }
        }),
        Commands::Update { key, value, input } => match payload(value, input) {
            Ok(bytes) => report(store.update(key, &bytes), |_| ()),
            Err(e) => fail(e),
        },
        Commands::Delete { key } => report(store.delete(key), |_| ()),
        Commands::List => report(store.list_keys(), |keys| {
            for key in keys {
                println!("{}", key);
            }
        }),
        Commands::Stats => report(store.stats(), |stats| println!("{:#?}", stats)),
        Commands::Verify => report(store.verify(), |stats| {
            println!("OK: {} blobs, {} free records", stats.blob_count, stats.free_count)
        }),
    };

    if let Err(e) = store.close() {
        tracing::error!("Failed to close store: {}", e);
        process::exit(1);
    }
    if !ok {
        process::exit(1);
    }
}

/// Blob contents from the positional value or `--input`
fn payload(value: Option<String>, input: Option<PathBuf>) -> io::Result<Vec<u8>> {
    match (value, input) {
        (_, Some(path)) => fs::read(path),
        (Some(value), None) => Ok(value.into_bytes()),
        (None, None) => {
            let mut bytes = Vec::new();
            io::Read::read_to_end(&mut io::stdin(), &mut bytes)?;
            Ok(bytes)
        }
    }
}

/// Print a result; returns whether it succeeded
fn report<T>(result: StoreResult<T>, on_success: impl FnOnce(T)) -> bool {
    match result.value {
        Some(value) if result.success => {
            on_success(value);
            true
        }
        _ => {
            for message in &result.messages {
                eprintln!("error [{}]: {}", result.code.as_u16(), message);
            }
            false
        }
    }
}

fn fail(error: io::Error) -> bool {
    eprintln!("error: {}", error);
    false
}
