//! Ingest command - check pre-extracted spreadsheet rows.

use std::fs;
use std::path::PathBuf;

use clap::Args;
use console::style;
use tracing::{info, warn};

use acta_core::tabular::{TallyRow, check_row};
use acta_core::{CapacityLookup, DocumentResult};

use super::process::{OutputFormat, format_csv, format_text, persist_one};
use super::{load_config, open_store};

/// Arguments for the ingest command.
#[derive(Args)]
pub struct IngestArgs {
    /// CSV file with one row per tally sheet
    #[arg(required = true)]
    input: PathBuf,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,

    /// SQLite database for capacities and records (overrides the config)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Store every checked row in the database
    #[arg(long)]
    persist: bool,
}

pub async fn run(args: IngestArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let mut store = open_store(&config, args.database.as_ref())?;
    if args.persist && store.is_none() {
        anyhow::bail!("--persist needs a database (--database or storage.database in the config)");
    }

    let byte_size = fs::metadata(&args.input)?.len();
    let file_name = args
        .input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| args.input.display().to_string());

    let mut reader = csv::Reader::from_path(&args.input)?;
    let mut results = Vec::new();
    let mut rejected = 0;

    for (index, row) in reader.deserialize::<TallyRow>().enumerate() {
        let source = format!("{}#{}", file_name, index + 1);
        let row = match row {
            Ok(row) => row,
            Err(e) => {
                warn!("{}: unreadable row: {}", source, e);
                rejected += 1;
                continue;
            }
        };

        let capacity = store.as_ref().map(|s| s as &dyn CapacityLookup);
        results.push(check_row(&source, &row, byte_size, capacity, config.validation.zero_fallback));
    }

    info!("{}: {} rows checked, {} rejected", file_name, results.len(), rejected);

    let output = format_rows(&results, args.format)?;
    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    if args.persist {
        if let Some(store) = store.as_mut() {
            for result in &results {
                persist_one(store, result);
            }
        }
    }

    if rejected > 0 {
        eprintln!("{} {} rows could not be read", style("⚠").yellow(), rejected);
    }

    Ok(())
}

fn format_rows(results: &[DocumentResult], format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(results)?),
        OutputFormat::Csv => format_csv(results),
        OutputFormat::Text => Ok(results.iter().map(format_text).collect::<Vec<_>>().join("\n")),
    }
}
