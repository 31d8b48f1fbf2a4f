use anyhow::{Context, Result, bail};
use clap::Parser;
use kbprep::{
    config::{self, ConfigBuilder},
    extract::discover_documents,
    logging,
    persist::{FsSink, PersistenceSink},
    processing::{ProcessingService, TiktokenTokenizer},
    report::{ProcessingReport, format_size, write_upload_script},
};
use std::path::PathBuf;
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Parser)]
#[command(
    name = "kbprep",
    version,
    about = "Prepare documents for knowledge base ingestion"
)]
struct Cli {
    /// Document or directory to process.
    path: PathBuf,
    /// Root of the output tree (overrides KBPREP_OUTPUT_DIR).
    #[arg(long)]
    output: Option<PathBuf>,
    /// Documents processed concurrently (overrides KBPREP_WORKERS).
    #[arg(long)]
    workers: Option<usize>,
    /// JSON rules file for classification labels and chunk sizes.
    #[arg(long)]
    rules: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Start logging before the configuration is read so rules-file and validation logs land in
    // the same file as the run.
    let log_root = cli.output.clone().unwrap_or_else(config::output_dir_from_env);
    logging::init_tracing(&log_root);

    let mut builder = ConfigBuilder::from_env().context("failed to read configuration")?;
    if let Some(output) = cli.output {
        builder = builder.output_dir(output);
    }
    if let Some(workers) = cli.workers {
        builder = builder.workers(workers);
    }
    if let Some(rules) = &cli.rules {
        builder = builder.rules_file(rules)?;
    }
    let config = Arc::new(builder.build().context("invalid configuration")?);

    if !cli.path.exists() {
        bail!("path not found: {}", cli.path.display());
    }

    let tokenizer = TiktokenTokenizer::load(&config.tokenizer)
        .with_context(|| format!("failed to load tokenizer {}", config.tokenizer))?;
    tracing::info!(
        tokenizer = tokenizer.name(),
        workers = config.workers,
        output = %config.output_dir.display(),
        "Configuration ready"
    );

    let mut domains = config.rules.domains.clone();
    domains.push(config.rules.default_domain.clone());
    let sink = FsSink::new(&config.output_dir, domains);
    sink.prepare()
        .await
        .with_context(|| format!("failed to prepare {}", config.output_dir.display()))?;

    let files = if cli.path.is_file() {
        vec![cli.path.clone()]
    } else {
        discover_documents(&cli.path)
    };
    if files.is_empty() {
        tracing::warn!(path = %cli.path.display(), "No supported documents found");
    }
    tracing::info!(documents = files.len(), output = %config.output_dir.display(), "Found documents");

    let service = ProcessingService::new(Arc::clone(&config), Arc::new(tokenizer), Arc::new(sink));
    let stop = service.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received; finishing in-flight documents");
            stop.stop();
        }
    });

    let summary = service.process_batch(files).await;

    let now = OffsetDateTime::now_utc();
    let report = ProcessingReport::new(&summary, &config.output_dir, now);
    let report_path = report.write().context("failed to write processing report")?;
    let script_path =
        write_upload_script(&config.output_dir, now).context("failed to write upload script")?;

    let stats = summary.stats;
    println!("Processed documents: {}", stats.processed);
    println!("Failed documents:    {}", stats.failed);
    if summary.skipped > 0 {
        println!("Skipped documents:   {}", summary.skipped);
    }
    println!("Total size:          {}", format_size(stats.total_bytes));
    println!("Chunks created:      {}", stats.total_chunks);
    if stats.persistence_failures > 0 {
        println!("Artifact failures:   {}", stats.persistence_failures);
    }
    println!("Output:              {}", config.output_dir.display());
    println!("Report:              {}", report_path.display());
    println!("Upload script:       {}", script_path.display());

    Ok(())
}
