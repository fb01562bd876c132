// SPDX-License-Identifier: MIT OR Apache-2.0
//! `invp` — command-line front end for the invoice pipeline.
//!
//! Exit codes: 0 ok, 2 bad input, 3 unsupported type, 4 internal
//! failure.

mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "invp", version, about = "Deterministic invoice extraction pipeline")]
struct Cli {
    /// Path to a TOML settings file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one file through the pipeline and print the result JSON.
    Process {
        /// The document to process.
        file: PathBuf,
    },
    /// Export a saved processing result to CSV or XLSX.
    Export {
        /// Path to a `ProcessingResult` JSON file.
        result: PathBuf,
        /// Output format.
        #[arg(long, value_enum, default_value_t = ExportFormat::Csv)]
        format: ExportFormat,
        /// Output file path.
        #[arg(long)]
        out: PathBuf,
    },
    /// Print processing statistics from the audit log.
    Stats {
        /// Range start (RFC 3339); defaults to midnight today.
        #[arg(long)]
        start_date: Option<chrono::DateTime<chrono::Utc>>,
        /// Range end (RFC 3339); defaults to now.
        #[arg(long)]
        end_date: Option<chrono::DateTime<chrono::Utc>>,
    },
    /// Run the HTTP ingress.
    Serve {},
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
    Xlsx,
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("inv={level},invp={level}")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match inv_config::load_settings(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(commands::EXIT_BAD_INPUT);
        }
    };
    init_tracing(&settings.log_level);

    let outcome = match cli.command {
        Command::Process { file } => commands::process(&settings, &file).await,
        Command::Export {
            result,
            format,
            out,
        } => commands::export(&result, matches!(format, ExportFormat::Xlsx), &out).await,
        Command::Stats {
            start_date,
            end_date,
        } => commands::stats(&settings, start_date, end_date).await,
        Command::Serve {} => commands::serve(&settings).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(e.exit_code())
        }
    }
}
