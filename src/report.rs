//! End-of-run report and upload helper script.

use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use time::{OffsetDateTime, macros::format_description};
use uuid::Uuid;

use crate::metrics::StatsSnapshot;
use crate::persist::{Artifact, LOGS_DIR, METADATA_DIR, PROCESSED_DIR, UPLOAD_DIR};
use crate::processing::metadata::format_timestamp;
use crate::processing::service::BatchSummary;
use crate::processing::types::PipelineStage;

/// Name of the generated upload script.
pub const UPLOAD_SCRIPT: &str = "upload_to_s3.sh";

/// Errors raised while writing report files.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Filesystem write failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Report could not be serialized.
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Counters plus derived figures.
#[derive(Debug, Clone, Serialize)]
pub struct ReportStatistics {
    /// Raw counters.
    #[serde(flatten)]
    pub counts: StatsSnapshot,
    /// `total_bytes` in mebibytes.
    pub total_size_mb: f64,
    /// Percentage of attempted documents that succeeded.
    pub success_rate: f64,
    /// Documents never scheduled because the run was stopped.
    pub skipped: usize,
}

/// A document that ended in `Failed`.
#[derive(Debug, Clone, Serialize)]
pub struct FailureEntry {
    /// Source path.
    pub file: PathBuf,
    /// Stage at which processing stopped.
    pub stage: PipelineStage,
    /// Error message.
    pub error: String,
}

/// A processed document with at least one artifact that failed to write.
#[derive(Debug, Clone, Serialize)]
pub struct PartialPersistence {
    /// Source path.
    pub file: PathBuf,
    /// Artifacts that were not written.
    pub failed_artifacts: Vec<Artifact>,
}

/// Summary of a batch run, written as JSON under `logs/`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingReport {
    /// Unique identifier of this run.
    pub run_id: String,
    /// RFC3339 time the report was built.
    pub timestamp: String,
    /// Aggregate statistics.
    pub statistics: ReportStatistics,
    /// Root of the output tree.
    pub output_location: PathBuf,
    /// Failed documents, in input order.
    pub failures: Vec<FailureEntry>,
    /// Documents whose artifacts were only partly written.
    pub partial_persistence: Vec<PartialPersistence>,
    /// Suggested follow-up actions.
    pub next_steps: Vec<String>,
    #[serde(skip)]
    generated_at: OffsetDateTime,
}

impl ProcessingReport {
    /// Build a report for `summary` with outputs under `output_dir`.
    pub fn new(summary: &BatchSummary, output_dir: &Path, generated_at: OffsetDateTime) -> Self {
        let counts = summary.stats;
        let mut failures = Vec::new();
        let mut partial_persistence = Vec::new();
        for outcome in &summary.outcomes {
            match &outcome.result {
                Ok(document) if !document.persistence.is_complete() => {
                    partial_persistence.push(PartialPersistence {
                        file: outcome.path.clone(),
                        failed_artifacts: document
                            .persistence
                            .failures()
                            .map(|result| result.artifact)
                            .collect(),
                    });
                }
                Ok(_) => {}
                Err(failure) => failures.push(FailureEntry {
                    file: outcome.path.clone(),
                    stage: failure.stage,
                    error: failure.error.to_string(),
                }),
            }
        }

        Self {
            run_id: Uuid::new_v4().to_string(),
            timestamp: format_timestamp(generated_at),
            statistics: ReportStatistics {
                counts,
                total_size_mb: counts.total_bytes as f64 / (1024.0 * 1024.0),
                success_rate: counts.success_rate(),
                skipped: summary.skipped,
            },
            output_location: output_dir.to_path_buf(),
            failures,
            partial_persistence,
            next_steps: next_steps(output_dir),
            generated_at,
        }
    }

    /// File name derived from the generation time.
    pub fn file_name(&self) -> String {
        let stamp = self
            .generated_at
            .format(format_description!(
                "[year][month][day]_[hour][minute][second]"
            ))
            .unwrap_or_else(|_| self.generated_at.unix_timestamp().to_string());
        format!("processing_report_{stamp}.json")
    }

    /// Write the report as pretty JSON into `<output>/logs/` and return its path.
    pub fn write(&self) -> Result<PathBuf, ReportError> {
        let dir = self.output_location.join(LOGS_DIR);
        create_dir(&dir)?;
        let path = dir.join(self.file_name());
        let json = serde_json::to_vec_pretty(self)?;
        write_file(&path, &json)?;
        tracing::info!(path = %path.display(), "Processing report written");
        Ok(path)
    }
}

fn next_steps(output_dir: &Path) -> Vec<String> {
    vec![
        format!(
            "Review processed documents in {}",
            output_dir.join(PROCESSED_DIR).display()
        ),
        format!(
            "Check metadata in {}",
            output_dir.join(METADATA_DIR).display()
        ),
        format!(
            "Upload to S3 from {} (see {UPLOAD_SCRIPT})",
            output_dir.join(UPLOAD_DIR).display()
        ),
        "Point the Bedrock Knowledge Base data source at the uploaded prefix".to_string(),
    ]
}

/// Write `upload_to_s3.sh` into `output_dir` and make it executable.
///
/// The script syncs the upload directory to a placeholder bucket; nothing is uploaded here.
pub fn write_upload_script(
    output_dir: &Path,
    generated_at: OffsetDateTime,
) -> Result<PathBuf, ReportError> {
    create_dir(output_dir)?;
    let path = output_dir.join(UPLOAD_SCRIPT);
    let source_dir = output_dir.join(UPLOAD_DIR);
    let script = format!(
        r#"#!/bin/bash
# Upload processed documents to S3
# Generated: {generated}

BUCKET_NAME="your-knowledge-base-bucket"  # CHANGE ME
PREFIX="knowledge-base/documents"
SOURCE_DIR="{source}"

if ! command -v aws &> /dev/null; then
    echo "AWS CLI is not installed"
    exit 1
fi

if ! aws sts get-caller-identity &> /dev/null; then
    echo "AWS credentials are not configured (run: aws configure)"
    exit 1
fi

aws s3 mb "s3://$BUCKET_NAME" 2>/dev/null

aws s3 sync "$SOURCE_DIR" "s3://$BUCKET_NAME/$PREFIX" \
    --delete \
    --exclude "*.DS_Store" \
    --exclude ".*" \
    --metadata "ProcessedDate=$(date -u +%Y-%m-%dT%H:%M:%SZ)"

echo "Uploaded documents to s3://$BUCKET_NAME/$PREFIX"

# Optional: start a knowledge base ingestion job
# aws bedrock-agent start-ingestion-job \
#     --knowledge-base-id "your-kb-id" \
#     --data-source-id "your-ds-id"
"#,
        generated = format_timestamp(generated_at),
        source = source_dir.display(),
    );
    write_file(&path, script.as_bytes())?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).map_err(
            |source| ReportError::Io {
                path: path.clone(),
                source,
            },
        )?;
    }

    Ok(path)
}

/// Human-readable size with two decimals, e.g. `1.50 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    for unit in UNITS {
        if size < 1024.0 {
            return format!("{size:.2} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.2} TB")
}

fn create_dir(path: &Path) -> Result<(), ReportError> {
    std::fs::create_dir_all(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), ReportError> {
    std::fs::write(path, contents).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })
}
