//! Durable storage for processed documents.
//!
//! A [`PersistenceSink`] receives one document's normalized text, chunk records and metadata
//! record and reports success or failure for every artifact it writes. [`FsSink`] lays the
//! artifacts out as a numbered directory tree ready for upload to a knowledge base.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::processing::{metadata::MetadataRecord, types::ChunkRecord};

/// Normalized full text, one file per document.
pub const PROCESSED_DIR: &str = "01_processed";
/// Full text grouped by domain.
pub const STRUCTURED_DIR: &str = "02_structured";
/// Metadata records.
pub const METADATA_DIR: &str = "03_metadata";
/// One directory of chunk files per document.
pub const CHUNKS_DIR: &str = "04_chunks";
/// Upload bundles grouped by domain.
pub const UPLOAD_DIR: &str = "05_ready_to_upload";
/// Log files and processing reports.
pub const LOGS_DIR: &str = "logs";

/// Errors raised while writing a single artifact.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Filesystem write failed.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Target path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Artifact could not be serialized.
    #[error("failed to serialize artifact: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Everything the sink needs to store one document.
#[derive(Debug, Clone, Copy)]
pub struct PersistRequest<'a> {
    /// Logical document identifier, see [`document_id`].
    pub document_id: &'a str,
    /// Domain label used to group artifacts.
    pub domain: &'a str,
    /// Normalized document text.
    pub text: &'a str,
    /// Ordered chunk records.
    pub chunks: &'a [ChunkRecord],
    /// Assembled metadata record.
    pub metadata: &'a MetadataRecord,
}

/// Kinds of artifact written per document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Artifact {
    /// Full normalized text.
    ProcessedText,
    /// Full text filed under its domain.
    StructuredText,
    /// Metadata record as JSON.
    Metadata,
    /// Individual chunk files.
    Chunks,
    /// Combined upload bundle.
    UploadBundle,
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::ProcessedText => "processed_text",
            Self::StructuredText => "structured_text",
            Self::Metadata => "metadata",
            Self::Chunks => "chunks",
            Self::UploadBundle => "upload_bundle",
        };
        f.write_str(label)
    }
}

/// Outcome of writing one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactResult {
    /// Which artifact.
    pub artifact: Artifact,
    /// Where it was (or would have been) written.
    pub path: PathBuf,
    /// Error message when the write failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ArtifactResult {
    fn from_result(artifact: Artifact, path: PathBuf, result: Result<(), PersistenceError>) -> Self {
        let error = match result {
            Ok(()) => None,
            Err(err) => {
                tracing::warn!(%artifact, path = %path.display(), error = %err, "Artifact write failed");
                Some(err.to_string())
            }
        };
        Self {
            artifact,
            path,
            error,
        }
    }

    /// Whether the artifact was written.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-artifact results for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersistenceReport {
    /// One entry per attempted artifact.
    pub artifacts: Vec<ArtifactResult>,
}

impl PersistenceReport {
    /// Artifacts that failed to write.
    pub fn failures(&self) -> impl Iterator<Item = &ArtifactResult> {
        self.artifacts.iter().filter(|result| !result.succeeded())
    }

    /// Number of failed artifacts.
    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    /// True when every artifact was written.
    pub fn is_complete(&self) -> bool {
        self.failure_count() == 0
    }
}

/// Destination for processed documents.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    /// Create whatever structure the sink needs before documents arrive.
    async fn prepare(&self) -> Result<(), PersistenceError> {
        Ok(())
    }

    /// Store all artifacts of one document. Never aborts early: every artifact is attempted.
    async fn persist(&self, request: &PersistRequest<'_>) -> PersistenceReport;
}

/// Derive a filesystem-safe document identifier from a source path.
pub fn document_id(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    let id: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if id.is_empty() { "document".into() } else { id }
}

/// Identifiers for a batch of paths, one per path and pairwise distinct.
///
/// Paths whose [`document_id`] is unique keep it unchanged. Paths sharing a sanitized stem get
/// `_` plus the first eight hex digits of the SHA-256 of the full path appended, so concurrent
/// documents never write to the same artifact files.
pub fn unique_document_ids(paths: &[PathBuf]) -> Vec<String> {
    let bases: Vec<String> = paths.iter().map(|path| document_id(path)).collect();
    let mut seen: HashMap<&str, usize> = HashMap::new();
    for base in &bases {
        *seen.entry(base.as_str()).or_default() += 1;
    }

    let mut taken: HashMap<String, usize> = HashMap::new();
    paths
        .iter()
        .zip(&bases)
        .map(|(path, base)| {
            let mut id = if seen[base.as_str()] > 1 {
                let digest = Sha256::digest(path.to_string_lossy().as_bytes());
                format!("{base}_{}", &hex::encode(digest)[..8])
            } else {
                base.clone()
            };
            // The same path listed twice hashes the same; number the repeats.
            let count = taken.entry(id.clone()).or_default();
            *count += 1;
            if *count > 1 {
                id = format!("{id}_{count}");
            }
            id
        })
        .collect()
}

/// Writes artifacts into a numbered directory tree under `root`.
#[derive(Debug, Clone)]
pub struct FsSink {
    root: PathBuf,
    domains: Vec<String>,
}

impl FsSink {
    /// Sink rooted at `root`; `domains` get their structured and upload directories up front.
    pub fn new(root: impl Into<PathBuf>, domains: impl IntoIterator<Item = String>) -> Self {
        Self {
            root: root.into(),
            domains: domains.into_iter().collect(),
        }
    }

    /// Root of the output tree.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn processed_path(&self, id: &str) -> PathBuf {
        self.root.join(PROCESSED_DIR).join(format!("{id}_processed.txt"))
    }

    fn structured_path(&self, domain: &str, id: &str) -> PathBuf {
        self.root
            .join(STRUCTURED_DIR)
            .join(domain)
            .join(format!("{id}.txt"))
    }

    fn metadata_path(&self, id: &str) -> PathBuf {
        self.root.join(METADATA_DIR).join(format!("{id}_metadata.json"))
    }

    fn chunks_path(&self, id: &str) -> PathBuf {
        self.root.join(CHUNKS_DIR).join(id)
    }

    fn upload_path(&self, domain: &str, id: &str) -> PathBuf {
        self.root.join(UPLOAD_DIR).join(domain).join(format!("{id}.json"))
    }

    async fn write_chunks(&self, dir: &Path, chunks: &[ChunkRecord]) -> Result<(), PersistenceError> {
        // Clear chunk files left over from an earlier run of the same document.
        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(PersistenceError::Io {
                    path: dir.to_path_buf(),
                    source,
                });
            }
        }
        create_dir(dir).await?;
        for chunk in chunks {
            let path = dir.join(format!("chunk_{:04}.txt", chunk.chunk_index));
            write_file(&path, chunk.text.as_bytes()).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl PersistenceSink for FsSink {
    async fn prepare(&self) -> Result<(), PersistenceError> {
        for dir in [PROCESSED_DIR, METADATA_DIR, CHUNKS_DIR, LOGS_DIR] {
            create_dir(&self.root.join(dir)).await?;
        }
        for domain in &self.domains {
            create_dir(&self.root.join(STRUCTURED_DIR).join(domain)).await?;
            create_dir(&self.root.join(UPLOAD_DIR).join(domain)).await?;
        }
        tracing::debug!(root = %self.root.display(), "Output tree ready");
        Ok(())
    }

    async fn persist(&self, request: &PersistRequest<'_>) -> PersistenceReport {
        let id = request.document_id;
        let mut artifacts = Vec::with_capacity(5);

        let path = self.processed_path(id);
        let result = write_file(&path, request.text.as_bytes()).await;
        artifacts.push(ArtifactResult::from_result(Artifact::ProcessedText, path, result));

        let path = self.structured_path(request.domain, id);
        let result = write_file(&path, request.text.as_bytes()).await;
        artifacts.push(ArtifactResult::from_result(Artifact::StructuredText, path, result));

        let path = self.metadata_path(id);
        let result = match serde_json::to_vec_pretty(request.metadata) {
            Ok(bytes) => write_file(&path, &bytes).await,
            Err(err) => Err(err.into()),
        };
        artifacts.push(ArtifactResult::from_result(Artifact::Metadata, path, result));

        let path = self.chunks_path(id);
        let result = self.write_chunks(&path, request.chunks).await;
        artifacts.push(ArtifactResult::from_result(Artifact::Chunks, path, result));

        let path = self.upload_path(request.domain, id);
        let result = match serde_json::to_vec_pretty(&upload_bundle(request)) {
            Ok(bytes) => write_file(&path, &bytes).await,
            Err(err) => Err(err.into()),
        };
        artifacts.push(ArtifactResult::from_result(Artifact::UploadBundle, path, result));

        PersistenceReport { artifacts }
    }
}

fn upload_bundle(request: &PersistRequest<'_>) -> serde_json::Value {
    let chunks: Vec<_> = request
        .chunks
        .iter()
        .map(|chunk| json!({ "index": chunk.chunk_index, "text": chunk.text }))
        .collect();
    json!({
        "content": request.text,
        "metadata": request.metadata.document_info,
        "chunks": chunks,
    })
}

async fn create_dir(path: &Path) -> Result<(), PersistenceError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        create_dir(parent).await?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| PersistenceError::Io {
            path: path.to_path_buf(),
            source,
        })
}
