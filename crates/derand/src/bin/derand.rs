//! Command-line tool for derand trace files.
//!
//! # Usage
//!
//! ```bash
//! # Human-readable dump of a trace
//! derand print 0a000001:5001->0a000002:40312
//!
//! # Raw and estimated compressed sizes, per stream
//! derand sizes trace.bin
//!
//! # Canonicalize a trace in place, or into a new file
//! derand canonicalize raw.bin canonical.bin
//!
//! # Locate the first difference between two captures
//! derand diff run1.bin run2.bin
//! ```
//!
//! Trace files carry no schema tag: pass the same schema flags the
//! capture was taken with. Set `RUST_LOG=debug` for per-section progress.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use derand_records::{
    compare_traces, Trace, TraceConfig, TraceError, DEFAULT_EFFECT_BOOL_LOCATIONS,
};

#[derive(Parser)]
#[command(name = "derand")]
#[command(about = "Inspect, canonicalize, and size derand TCP replay traces")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    schema: SchemaArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Trace schema the files were written under.
#[derive(Args)]
struct SchemaArgs {
    /// Events carry a debug word.
    #[arg(long, global = true)]
    debug_events: bool,

    /// Trace has a tx_stamps section.
    #[arg(long, global = true)]
    tx_stamps: bool,

    /// Trace has an advanced_events section.
    #[arg(long, global = true)]
    advanced_events: bool,

    /// Number of effect-bool queues.
    #[arg(long, global = true, default_value_t = DEFAULT_EFFECT_BOOL_LOCATIONS)]
    effect_bool_locations: usize,
}

impl SchemaArgs {
    fn config(&self) -> TraceConfig {
        TraceConfig {
            debug_events: self.debug_events,
            tx_stamps: self.tx_stamps,
            advanced_events: self.advanced_events,
            effect_bool_locations: self.effect_bool_locations,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Print every stream of a trace.
    Print {
        /// Trace file.
        file: PathBuf,
    },

    /// Show raw and estimated compressed storage per stream.
    Sizes {
        /// Trace file.
        file: PathBuf,
    },

    /// Rewrite a trace in canonical form.
    Canonicalize {
        /// Trace file to read.
        input: PathBuf,

        /// Where to write; defaults to overwriting the input.
        output: Option<PathBuf>,
    },

    /// Compare two traces and report the first difference.
    Diff {
        /// First trace file.
        a: PathBuf,

        /// Second trace file.
        b: PathBuf,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    let config = cli.schema.config();
    log::debug!("trace schema: {config:?}");

    let result = match cli.command {
        Commands::Print { file } => cmd_print(&file, config),
        Commands::Sizes { file } => cmd_sizes(&file, config),
        Commands::Canonicalize { input, output } => cmd_canonicalize(&input, output, config),
        Commands::Diff { a, b } => cmd_diff(&a, &b, config),
    };
    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn cmd_print(file: &Path, config: TraceConfig) -> Result<ExitCode, TraceError> {
    let trace = Trace::load_path(file, config)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    trace.render(&mut out)?;
    out.flush()?;
    Ok(ExitCode::SUCCESS)
}

fn cmd_sizes(file: &Path, config: TraceConfig) -> Result<ExitCode, TraceError> {
    let trace = Trace::load_path(file, config)?;
    let raw = trace.raw_storage_report();
    let compressed = trace.compressed_storage_report();
    print!("{raw}");
    println!();
    print!("{compressed}");
    if raw.total() > 0 {
        println!(
            "ratio: {:.3}",
            compressed.total() as f64 / raw.total() as f64
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_canonicalize(
    input: &Path,
    output: Option<PathBuf>,
    config: TraceConfig,
) -> Result<ExitCode, TraceError> {
    let mut trace = Trace::load_path(input, config)?;
    let summary = trace.canonicalize()?;
    let target = output.unwrap_or_else(|| input.to_path_buf());
    let written = trace.persist_path(Some(target.as_path()))?;
    eprintln!(
        "{}: {} threads, {} sockcalls referenced, {} unreferenced",
        written.display(),
        summary.threads,
        summary.reorder.referenced,
        summary.reorder.unreferenced
    );
    Ok(ExitCode::SUCCESS)
}

fn cmd_diff(a: &Path, b: &Path, config: TraceConfig) -> Result<ExitCode, TraceError> {
    let left = Trace::load_path(a, config.clone())?;
    let right = Trace::load_path(b, config)?;
    match compare_traces(&left, &right)? {
        None => {
            println!("identical");
            Ok(ExitCode::SUCCESS)
        }
        Some(divergence) => {
            println!("{divergence}");
            Ok(ExitCode::FAILURE)
        }
    }
}
