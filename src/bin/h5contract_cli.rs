//! h5contract CLI
//!
//! Commands: check, describe, checksum
//! Diagnostics and fixtures go to stdout, logs to stderr.
//! Returns 2 when a file breaks the contract, 1 on any other error.

use clap::{Parser, Subcommand, ValueEnum};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use h5contract_core::{
    lookup3,
    print::render_report,
    BatchPipeline, BatchPolicy, FileOutcome, Hdf5Container,
};

#[derive(Parser)]
#[command(name = "h5contract-cli", version)]
#[command(about = "Check HDF5 master files against the detector reader's contract")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ReportFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum FixtureFormat {
    Literal,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate one or more files, in order
    Check {
        #[arg(short, long, value_enum, default_value = "text")]
        format: ReportFormat,

        /// Stop at the first file that fails
        #[arg(long)]
        fail_fast: bool,

        #[arg(required = true, num_args = 1..)]
        files: Vec<PathBuf>,
    },

    /// Print the fixture literal for an already-valid file
    Describe {
        #[arg(short, long, value_enum, default_value = "literal")]
        format: FixtureFormat,

        file: PathBuf,
    },

    /// lookup3 digest of a file's raw bytes
    Checksum {
        #[arg(short, long, default_value = "0")]
        seed: u32,

        file: PathBuf,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check { format, fail_fast, files } => {
            let policy = if fail_fast {
                BatchPolicy::StopOnFailure
            } else {
                BatchPolicy::ContinueOnFailure
            };
            let mut pipeline = BatchPipeline::new(|path: &Path| Hdf5Container::open(path), policy);

            let summary = pipeline.run(&files, |outcome| {
                if let ReportFormat::Text = format {
                    match outcome {
                        FileOutcome::Checked(report) => print!("{}", render_report(report)),
                        FileOutcome::OpenFailed { source, error } => {
                            println!("\nopening file '{source}'\n\n[FAIL] {error}")
                        }
                    }
                }
            });

            if let ReportFormat::Json = format {
                match serde_json::to_string_pretty(&summary) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        eprintln!("failed to serialize report: {e}");
                        return ExitCode::FAILURE;
                    }
                }
            }

            if summary.all_valid() {
                ExitCode::SUCCESS
            } else if summary.had_open_errors() {
                ExitCode::FAILURE
            } else {
                ExitCode::from(2)
            }
        }

        Commands::Describe { format, file } => {
            let mut pipeline = BatchPipeline::new(
                |path: &Path| Hdf5Container::open(path),
                BatchPolicy::StopOnFailure,
            );
            let descriptor = match pipeline.describe_file(&file) {
                Ok(d) => d,
                Err(e) if e.is_contract_failure() => {
                    eprintln!("{e}");
                    return ExitCode::from(2);
                }
                Err(e) => {
                    eprintln!("{e}");
                    return ExitCode::FAILURE;
                }
            };
            match format {
                FixtureFormat::Literal => print!("{}", descriptor.render_literal()),
                FixtureFormat::Json => match serde_json::to_string_pretty(&descriptor) {
                    Ok(json) => println!("{json}"),
                    Err(e) => {
                        eprintln!("failed to serialize descriptor: {e}");
                        return ExitCode::FAILURE;
                    }
                },
            }
            ExitCode::SUCCESS
        }

        Commands::Checksum { seed, file } => match fs::read(&file) {
            Ok(bytes) => {
                println!("{}", lookup3(&bytes, seed));
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("cannot read '{}': {e}", file.display());
                ExitCode::FAILURE
            }
        },
    }
}
