//! Command-line front end for splitting invoice workbooks.
//!
//! # Usage
//!
//! Split an uploaded workbook into `output/Invoices_P1.xls` and
//! `output/Invoices_P2.xls`:
//! ```sh
//! xlsplit --input Invoices.xls
//! ```
//!
//! Use the configured fallback source and a different destination:
//! ```sh
//! xlsplit --config xlsplit.toml --output-dir /srv/exports -v
//! ```

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use xlsplit::config::SplitConfig;
use xlsplit::split::Splitter;

/// Split an invoice workbook into digits-only (P1) and other (P2) invoices
#[derive(Parser, Debug)]
#[command(name = "xlsplit", version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Source workbook; the configured fallback file is used when omitted
    #[arg(short, long, value_name = "FILE")]
    input: Option<PathBuf>,

    /// Directory the two outputs are written to
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Template workbook the outputs are rebuilt from
    #[arg(short, long, value_name = "FILE")]
    template: Option<PathBuf>,

    /// Log debug details
    #[arg(short, long)]
    verbose: bool,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(args: Args) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SplitConfig::from_file(path)?,
        None => SplitConfig::default(),
    };
    if let Some(template) = args.template {
        config.template = template;
    }

    let upload = args
        .input
        .as_ref()
        .map(|path| fs::read(path).with_context(|| format!("reading {}", path.display())))
        .transpose()?;

    let mut splitter = Splitter::new(config);
    let report = splitter.process(upload.as_deref(), args.output_dir.as_deref())?;

    for group in [&report.p1, &report.p2] {
        println!(
            "{} ({} invoices, {} detail rows)",
            group.path.display(),
            group.primary_rows,
            group.detail_rows
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.verbose);

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        },
    }
}
