//! dump-trees - rebuilds a committee subsystem tree from record and batch
//! files and exports its state at a given batch as a dump artifact.

use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use log::info;
use serde::Deserialize;

use committee_trees::{BatchOp, Committee, Config, RecordStore};

#[derive(Parser, Debug)]
#[command(
    name = "dump-trees",
    about = "Rebuilds a committee commitment tree and dumps it for audit"
)]
struct Args {
    /// Path to the TOML configuration file with tree parameters
    #[arg(long, default_value = "config.toml")]
    config_file: PathBuf,

    /// CSV file of raw records (key, value columns); applied as batch 0
    #[arg(long)]
    records_file: PathBuf,

    /// JSON file with the ordered batches to replay after batch 0
    #[arg(long)]
    batches_file: Option<PathBuf>,

    /// Write the dump artifact here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// The batch to replay up to and dump
    batch_id: u64,

    /// The subsystem tree to dump (e.g. "vaults")
    subsystem: String,
}

/// One replayable batch as stored in the batches file.
#[derive(Debug, Deserialize)]
struct BatchEntry {
    batch_id: u64,
    ops: Vec<BatchOp>,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::load(&args.config_file)
        .with_context(|| format!("loading config from {}", args.config_file.display()))?;

    let log_level = if config.logging.console {
        config.logging.level.into()
    } else {
        log::LevelFilter::Off
    };
    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    let records = File::open(&args.records_file)
        .with_context(|| format!("opening records file {}", args.records_file.display()))?;
    let store = RecordStore::from_csv(
        BufReader::new(records),
        config.records.duplicate_policy,
        config.records.on_malformed,
    )?;

    let mut committee = Committee::new(config)?;
    committee.bootstrap(&args.subsystem, &store)?;

    if let Some(batches_path) = &args.batches_file {
        let file = File::open(batches_path)
            .with_context(|| format!("opening batches file {}", batches_path.display()))?;
        let batches: Vec<BatchEntry> = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing batches file {}", batches_path.display()))?;
        for batch in batches {
            if batch.batch_id > args.batch_id {
                break;
            }
            committee.apply_batch(&args.subsystem, batch.batch_id, &batch.ops)?;
        }
    } else if args.batch_id != 0 {
        bail!(
            "batch {} requested but no batches file supplied (records alone only cover batch 0)",
            args.batch_id
        );
    }

    let artifact = committee.dump(&args.subsystem, args.batch_id)?;
    info!(
        "{} merkle root at batch {}: {}",
        args.subsystem, args.batch_id, artifact.root
    );

    match &args.output {
        Some(path) => {
            artifact
                .write_file(path)
                .with_context(|| format!("writing dump to {}", path.display()))?;
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            artifact.write_to(&mut handle)?;
            writeln!(handle)?;
        }
    }

    Ok(())
}
