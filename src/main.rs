//! parquet-to-sqlite - Memory-aware Parquet to SQLite converter
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use parquet_to_sqlite::config::{CliArgs, ConvertConfig};
use parquet_to_sqlite::convert::convert_parquet_to_sqlite;
use parquet_to_sqlite::progress::{print_header, print_summary, ProgressReporter};
use std::fs;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();

    setup_logging(args.verbose)?;

    let config = ConvertConfig::from_args(args).context("Invalid configuration")?;

    let progress = if config.show_progress {
        print_header(&config.input_path, &config.output_path, config.chunk_size);
        // Length is set from the first progress report.
        Some(ProgressReporter::new(0))
    } else {
        None
    };

    let result =
        convert_parquet_to_sqlite(config.to_options(), progress.as_ref().map(|p| p.callback()));

    if let Some(ref p) = progress {
        match result {
            Ok(_) => p.finish("Conversion completed"),
            Err(_) => p.finish_and_clear(),
        }
    }

    let stats = result.with_context(|| {
        format!(
            "Failed to convert {} to {}",
            config.input_path.display(),
            config.output_path.display()
        )
    })?;

    if config.show_progress {
        let db_size = fs::metadata(&config.output_path).ok().map(|m| m.len());
        print_summary(&stats, &config.output_path, db_size);
    }

    Ok(())
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("parquet_to_sqlite=debug,warn")
    } else {
        EnvFilter::new("parquet_to_sqlite=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
