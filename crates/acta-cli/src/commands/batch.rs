//! Batch processing command for folders of tally sheets.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use clap::Args;
use console::style;
use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use acta_core::{CapacityLookup, DocumentResult, TallyPipeline, TesseractCli};

use super::process::{OutputFormat, format_result, format_text, persist_one};
use super::{load_config, open_store};

/// Arguments for the batch command.
#[derive(Args)]
pub struct BatchArgs {
    /// Folder, file, or glob pattern
    #[arg(required = true)]
    input: String,

    /// Output directory
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Output format for each file
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Also generate a summary CSV
    #[arg(long)]
    summary: bool,

    /// Number of parallel workers
    #[arg(short = 'j', long, default_value = "4")]
    jobs: usize,

    /// SQLite database for capacities and records (overrides the config)
    #[arg(long)]
    database: Option<PathBuf>,

    /// Store every result in the database
    #[arg(long)]
    persist: bool,
}

pub async fn run(args: BatchArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;

    let files = collect_inputs(&args.input)?;
    if files.is_empty() {
        anyhow::bail!("No PDF files found for: {}", args.input);
    }

    println!(
        "{} Found {} files to process",
        style("ℹ").blue(),
        files.len()
    );

    if let Some(ref output_dir) = args.output_dir {
        fs::create_dir_all(output_dir)?;
    }

    let mut store = open_store(&config, args.database.as_ref())?;
    if args.persist && store.is_none() {
        anyhow::bail!("--persist needs a database (--database or storage.database in the config)");
    }

    // Workers cannot share the connection, so capacities are read up front.
    let capacities: Option<Arc<HashMap<String, i64>>> = match &store {
        Some(store) => Some(Arc::new(store.capacities()?)),
        None => None,
    };

    let overall_pb = ProgressBar::new(files.len() as u64);
    overall_pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")?
            .progress_chars("=>-"),
    );

    let pipeline = Arc::new(TallyPipeline::from_config(
        config.clone(),
        TesseractCli::new(&config.ocr),
    )?);
    let semaphore = Arc::new(Semaphore::new(args.jobs.max(1)));

    let mut handles = Vec::with_capacity(files.len());
    for path in files {
        let permit = Arc::clone(&semaphore).acquire_owned().await?;
        let pipeline = Arc::clone(&pipeline);
        let capacities = capacities.clone();
        let pb = overall_pb.clone();
        let worker_path = path.clone();

        let handle = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let lookup = capacities.as_deref().map(|c| c as &dyn CapacityLookup);
            let result = pipeline.process_file(&worker_path, lookup);
            pb.inc(1);
            result
        });
        handles.push((path, handle));
    }

    let (results, failed) = join_workers(handles).await;

    overall_pb.finish_with_message("Complete");

    for (path, result) in &results {
        match &args.output_dir {
            Some(output_dir) => {
                let output_name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("sheet");
                let output_path = output_dir.join(format!("{}.{}", output_name, args.format.extension()));
                fs::write(&output_path, format_result(result, args.format)?)?;
                debug!("Wrote output to {}", output_path.display());
            }
            None => println!("{}", format_text(result)),
        }
    }

    let mut stored = 0;
    if args.persist {
        if let Some(store) = store.as_mut() {
            for (_, result) in &results {
                if persist_one(store, result) {
                    stored += 1;
                }
            }
        }
    }

    if args.summary {
        let summary_path = args
            .output_dir
            .as_ref()
            .map(|d| d.join("summary.csv"))
            .unwrap_or_else(|| PathBuf::from("summary.csv"));

        write_summary(&summary_path, &results)?;
        println!(
            "{} Summary written to {}",
            style("✓").green(),
            summary_path.display()
        );
    }

    let flagged: Vec<_> = results.iter().filter(|(_, r)| !r.is_consistent()).collect();

    println!();
    println!(
        "{} Processed {} files in {:?}",
        style("✓").green(),
        results.len(),
        start.elapsed()
    );
    println!(
        "   {} consistent, {} with observations",
        style(results.len() - flagged.len()).green(),
        style(flagged.len()).yellow()
    );
    if args.persist {
        println!("   {} stored", style(stored).green());
    }
    if !failed.is_empty() {
        println!("   {} failed", style(failed.len()).red());
        for path in &failed {
            println!("  - {}", path.display());
        }
    }

    if !flagged.is_empty() {
        println!();
        println!("{}", style("Sheets to review:").yellow());
        for (path, result) in &flagged {
            println!(
                "  - {}: {} observations",
                path.display(),
                result.discrepancies.len()
            );
        }
    }

    Ok(())
}

/// Wait for every worker. A worker that died is logged and skipped.
async fn join_workers(
    handles: Vec<(PathBuf, JoinHandle<DocumentResult>)>,
) -> (Vec<(PathBuf, DocumentResult)>, Vec<PathBuf>) {
    let mut results = Vec::with_capacity(handles.len());
    let mut failed = Vec::new();

    for (path, handle) in handles {
        match handle.await {
            Ok(result) => results.push((path, result)),
            Err(e) => {
                warn!("{}: worker failed, skipping: {}", path.display(), e);
                failed.push(path);
            }
        }
    }

    (results, failed)
}

/// Expand a folder, a single file, or a glob into PDF paths, sorted.
fn collect_inputs(input: &str) -> anyhow::Result<Vec<PathBuf>> {
    let path = Path::new(input);
    let pattern = if path.is_dir() {
        path.join("*").to_string_lossy().into_owned()
    } else {
        input.to_string()
    };

    let mut files: Vec<PathBuf> = glob(&pattern)?
        .filter_map(|r| match r {
            Ok(path) => Some(path),
            Err(e) => {
                warn!("Skipping unreadable path: {}", e);
                None
            }
        })
        .filter(|p| {
            let ext = p.extension().and_then(|e| e.to_str()).unwrap_or("");
            p.is_file() && ext.eq_ignore_ascii_case("pdf")
        })
        .collect();
    files.sort();
    Ok(files)
}

fn write_summary(path: &Path, results: &[(PathBuf, DocumentResult)]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;

    wtr.write_record([
        "filename",
        "status",
        "table_code",
        "text_fields",
        "ocr_fields",
        "rotation",
        "discrepancies",
        "size_kb",
        "processing_time_ms",
        "observations",
    ])?;

    for (path, result) in results {
        let filename = path.file_name().and_then(|s| s.to_str()).unwrap_or("");
        let status = if result.is_consistent() { "consistent" } else { "review" };
        let rotation = result
            .passes
            .rotation
            .as_ref()
            .map(|r| r.value().to_string())
            .unwrap_or_default();

        wtr.write_record([
            filename,
            status,
            result.table_code().unwrap_or(""),
            &result.passes.text_fields.to_string(),
            &result.passes.ocr_fields.to_string(),
            &rotation,
            &result.discrepancies.len().to_string(),
            &result.size_kb().to_string(),
            &result.processing_time_ms.to_string(),
            &result.messages().join("; "),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use acta_core::models::config::ZeroFallbackPolicy;
    use acta_core::tabular::{TallyRow, check_row};

    #[tokio::test]
    async fn test_failed_worker_does_not_drop_other_results() {
        let healthy = tokio::task::spawn_blocking(|| {
            check_row("a.pdf", &TallyRow::default(), 10, None, ZeroFallbackPolicy::Skip)
        });
        let broken: JoinHandle<DocumentResult> = tokio::task::spawn_blocking(|| panic!("worker blew up"));
        let after = tokio::task::spawn_blocking(|| {
            check_row("c.pdf", &TallyRow::default(), 10, None, ZeroFallbackPolicy::Skip)
        });

        let (results, failed) = join_workers(vec![
            (PathBuf::from("a.pdf"), healthy),
            (PathBuf::from("b.pdf"), broken),
            (PathBuf::from("c.pdf"), after),
        ])
        .await;

        let sources: Vec<_> = results.iter().map(|(_, r)| r.source.as_str()).collect();
        assert_eq!(sources, vec!["a.pdf", "c.pdf"]);
        assert_eq!(failed, vec![PathBuf::from("b.pdf")]);
    }

    #[test]
    fn test_collect_inputs_from_folder() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.pdf"), b"%PDF").unwrap();
        fs::write(dir.path().join("a.PDF"), b"%PDF").unwrap();
        fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        fs::create_dir(dir.path().join("nested.pdf")).unwrap();

        let files = collect_inputs(dir.path().to_str().unwrap()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.PDF", "b.pdf"]);
    }

    #[test]
    fn test_collect_inputs_from_glob() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("one.pdf"), b"%PDF").unwrap();
        fs::write(dir.path().join("two.pdf"), b"%PDF").unwrap();

        let pattern = format!("{}/one*", dir.path().display());
        assert_eq!(collect_inputs(&pattern).unwrap().len(), 1);
    }
}
