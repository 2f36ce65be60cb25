//! Process command - extract and check a single tally sheet.

use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use acta_core::{CapacityLookup, DocumentResult, Field, FieldSource, PersistenceAdapter, TallyPipeline, TesseractCli};

use super::{load_config, open_store};

/// Arguments for the process command.
#[derive(Args)]
pub struct ProcessArgs {
    /// Input PDF file
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

    /// Store the result in the database
    #[arg(long)]
    persist: bool,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text report
    Text,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

pub async fn run(args: ProcessArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let extension = args
        .input
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    if extension != "pdf" {
        anyhow::bail!("Unsupported file format: {}", extension);
    }

    let mut store = open_store(&config, args.database.as_ref())?;
    if args.persist && store.is_none() {
        anyhow::bail!("--persist needs a database (--database or storage.database in the config)");
    }

    info!("Processing file: {}", args.input.display());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.set_message("Reading tally sheet...");

    let pipeline = TallyPipeline::from_config(config.clone(), TesseractCli::new(&config.ocr))?;
    let capacity = store.as_ref().map(|s| s as &dyn CapacityLookup);
    let result = pipeline.process_file(&args.input, capacity);

    pb.finish_and_clear();

    let output = format_result(&result, args.format)?;

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
            persist_one(store, &result);
        }
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

/// Store one result, reporting failure without aborting.
pub fn persist_one(store: &mut dyn PersistenceAdapter, result: &DocumentResult) -> bool {
    match store.persist(result) {
        Ok(()) => {
            println!("{} Stored {}", style("✓").green(), result.source);
            true
        }
        Err(e) => {
            eprintln!("{} {}: {}", style("✗").red(), result.source, e);
            false
        }
    }
}

pub fn format_result(result: &DocumentResult, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
        OutputFormat::Csv => format_csv(std::slice::from_ref(result)),
        OutputFormat::Text => Ok(format_text(result)),
    }
}

/// One row per document: every field, then the findings.
pub fn format_csv(results: &[DocumentResult]) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    let mut header = vec!["source"];
    header.extend(Field::ALL.iter().map(|f| f.name()));
    header.extend(["consistent", "observations"]);
    wtr.write_record(&header)?;

    for result in results {
        let mut record = vec![result.source.clone()];
        record.extend(result.fields.iter().map(|(field, value)| {
            if field.is_identifier() {
                result.raw.text(field).unwrap_or_default().to_string()
            } else {
                value.value().map(|v| v.to_string()).unwrap_or_default()
            }
        }));
        record.push(result.is_consistent().to_string());
        record.push(result.messages().join("; "));
        wtr.write_record(&record)?;
    }

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

pub fn format_text(result: &DocumentResult) -> String {
    let mut output = String::new();

    output.push_str(&format!("Tally sheet: {}\n", result.source));
    if let Some(code) = result.table_code() {
        output.push_str(&format!("Table code: {}\n", code));
    }
    output.push('\n');

    output.push_str("Fields:\n");
    for (field, value) in result.fields.iter() {
        let origin = match result.raw.get(field).as_ref().map(|raw| raw.source) {
            Some(FieldSource::ImageOcr) => " (OCR)",
            _ => "",
        };
        output.push_str(&format!("  {:<18} {}{}\n", field.name(), value, origin));
    }

    if result.passes.ocr_used {
        output.push('\n');
        output.push_str(&format!(
            "Image OCR: {} fields recovered",
            result.passes.ocr_fields
        ));
        if let Some(rotation) = &result.passes.rotation {
            output.push_str(&format!(", rotation {}°", rotation.value()));
            if rotation.is_fallback() {
                output.push_str(" (fallback)");
            }
        }
        output.push('\n');
    }

    output.push('\n');
    if result.is_consistent() {
        output.push_str("Observations: none\n");
    } else {
        output.push_str("Observations:\n");
        for message in result.messages() {
            output.push_str(&format!("  - {}\n", message));
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use acta_core::models::config::ZeroFallbackPolicy;
    use acta_core::tabular::{TallyRow, check_row};

    fn result() -> DocumentResult {
        let row = TallyRow {
            party1: Some("100".to_string()),
            valid: Some("185".to_string()),
            table_code: Some("01234".to_string()),
            ..TallyRow::default()
        };
        check_row("rows.csv#1", &row, 10, None, ZeroFallbackPolicy::Skip)
    }

    #[test]
    fn test_text_lists_every_field() {
        let text = format_text(&result());
        for field in Field::ALL {
            assert!(text.contains(field.name()), "{} missing", field.name());
        }
        assert!(text.contains("Table code: 01234"));
        assert!(text.contains("Capacity unavailable for table code 01234"));
    }

    #[test]
    fn test_csv_has_header_and_row() {
        let csv = format_csv(&[result()]).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("source,ID_Mesa,ID_Recinto"));
        assert!(lines[1].starts_with("rows.csv#1,01234,,"));
        assert!(lines[1].contains(",false,"));
    }
}
