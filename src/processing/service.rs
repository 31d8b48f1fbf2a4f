//! Processing service driving documents through extraction, normalization, classification,
//! chunking and persistence.

use futures_util::{StreamExt, future, stream};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use time::OffsetDateTime;

use crate::{
    config::Config,
    extract::{ExtractorRegistry, FileKind, SNIFF_BYTES},
    metrics::{ProcessingStats, StatsSnapshot},
    persist::{PersistRequest, PersistenceReport, PersistenceSink, document_id, unique_document_ids},
    processing::{
        chunking::split_with_window,
        classify::{classify_domain, classify_type},
        metadata::{DocumentMetadata, MetadataRecord, assemble, format_timestamp},
        normalize::normalize,
        tokenizer::Tokenizer,
        types::{ChunkRecord, DocumentFailure, PipelineStage, ProcessingError},
    },
};

/// A document that reached `Done`.
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    /// Identifier used for persisted artifacts.
    pub document_id: String,
    /// Inferred domain.
    pub domain: String,
    /// Inferred document type.
    pub doc_type: String,
    /// Source file size in bytes.
    pub size_bytes: u64,
    /// Chunks produced.
    pub chunk_count: usize,
    /// Per-artifact persistence results.
    pub persistence: PersistenceReport,
}

/// Result of running one document through the pipeline.
#[derive(Debug)]
pub struct DocumentOutcome {
    /// Source path.
    pub path: PathBuf,
    /// Success details or the failing stage and error.
    pub result: Result<ProcessedDocument, DocumentFailure>,
}

impl DocumentOutcome {
    /// True when the document reached `Done`.
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// `Done` on success, otherwise the stage that failed.
    pub fn stage(&self) -> PipelineStage {
        match &self.result {
            Ok(_) => PipelineStage::Done,
            Err(failure) => failure.stage,
        }
    }
}

/// Outcomes of a batch run in input order plus the statistics at completion.
#[derive(Debug)]
pub struct BatchSummary {
    /// One outcome per scheduled document.
    pub outcomes: Vec<DocumentOutcome>,
    /// Counters after the batch finished.
    pub stats: StatsSnapshot,
    /// Documents never scheduled because a stop was requested.
    pub skipped: usize,
}

/// Cooperative stop flag. Once set, batches schedule no new documents; in-flight ones finish.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Request a stop.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Output of the CPU-bound stages, ready for persistence.
struct PreparedDocument {
    document_id: String,
    size_bytes: u64,
    text: String,
    chunks: Vec<ChunkRecord>,
    metadata: MetadataRecord,
}

/// Immutable state shared with blocking tasks.
struct Pipeline {
    config: Arc<Config>,
    registry: ExtractorRegistry,
    tokenizer: Arc<dyn Tokenizer>,
}

/// Coordinates the document pipeline and the persistence sink.
///
/// Construct once per run from a validated [`Config`]; all stages share the same immutable
/// configuration, tokenizer and statistics accumulator.
pub struct ProcessingService {
    pipeline: Arc<Pipeline>,
    sink: Arc<dyn PersistenceSink>,
    stats: Arc<ProcessingStats>,
    stop: StopHandle,
}

impl ProcessingService {
    /// Build a service with the default extractor registry.
    pub fn new(
        config: Arc<Config>,
        tokenizer: Arc<dyn Tokenizer>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Self {
        Self {
            pipeline: Arc::new(Pipeline {
                config,
                registry: ExtractorRegistry::default(),
                tokenizer,
            }),
            sink,
            stats: Arc::new(ProcessingStats::new()),
            stop: StopHandle::default(),
        }
    }

    /// Replace the extractor registry.
    pub fn with_registry(self, registry: ExtractorRegistry) -> Self {
        let pipeline = Arc::new(Pipeline {
            config: Arc::clone(&self.pipeline.config),
            registry,
            tokenizer: Arc::clone(&self.pipeline.tokenizer),
        });
        Self { pipeline, ..self }
    }

    /// Configuration in use.
    pub fn config(&self) -> &Config {
        &self.pipeline.config
    }

    /// Current statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Handle that stops scheduling new documents when triggered.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Run one document through every stage. Failures are returned, never propagated.
    pub async fn process_document(&self, path: &Path) -> DocumentOutcome {
        self.process_as(path, document_id(path)).await
    }

    async fn process_as(&self, path: &Path, document_id: String) -> DocumentOutcome {
        tracing::info!(path = %path.display(), %document_id, "Processing document");
        let result = self.run(path, document_id).await;
        match &result {
            Ok(document) => {
                self.stats
                    .record_success(document.size_bytes, document.chunk_count as u64);
                tracing::info!(
                    path = %path.display(),
                    document_id = %document.document_id,
                    domain = %document.domain,
                    doc_type = %document.doc_type,
                    chunks = document.chunk_count,
                    "Document processed"
                );
            }
            Err(failure) => {
                self.stats.record_failure();
                tracing::warn!(
                    path = %path.display(),
                    stage = %failure.stage,
                    error = %failure.error,
                    "Document failed"
                );
            }
        }
        DocumentOutcome {
            path: path.to_path_buf(),
            result,
        }
    }

    /// Process `paths` with at most `workers` documents in flight.
    ///
    /// Outcomes are returned in input order. One document failing never affects the others.
    /// Documents sharing a file stem get distinct identifiers, see [`unique_document_ids`].
    pub async fn process_batch(&self, paths: Vec<PathBuf>) -> BatchSummary {
        let total = paths.len();
        let ids = unique_document_ids(&paths);
        let workers = self.pipeline.config.workers.max(1);
        tracing::info!(documents = total, workers, "Starting batch");

        let stop = self.stop.clone();
        let mut indexed: Vec<(usize, DocumentOutcome)> =
            stream::iter(paths.into_iter().zip(ids).enumerate())
                .take_while(move |_| future::ready(!stop.is_stopped()))
                .map(|(index, (path, id))| async move {
                    (index, self.process_as(&path, id).await)
                })
                .buffer_unordered(workers)
                .collect()
                .await;
        indexed.sort_by_key(|(index, _)| *index);

        let outcomes: Vec<DocumentOutcome> =
            indexed.into_iter().map(|(_, outcome)| outcome).collect();
        let skipped = total - outcomes.len();
        if skipped > 0 {
            tracing::warn!(skipped, "Stop requested; remaining documents were not scheduled");
        }

        let stats = self.stats.snapshot();
        tracing::info!(
            processed = stats.processed,
            failed = stats.failed,
            chunks = stats.total_chunks,
            "Batch finished"
        );
        BatchSummary {
            outcomes,
            stats,
            skipped,
        }
    }

    async fn run(
        &self,
        path: &Path,
        document_id: String,
    ) -> Result<ProcessedDocument, DocumentFailure> {
        let pipeline = Arc::clone(&self.pipeline);
        let owned = path.to_path_buf();
        let prepared = tokio::task::spawn_blocking(move || pipeline.prepare(&owned, document_id))
            .await
            .map_err(|err| {
                // The stage is unknown once the blocking task is gone.
                DocumentFailure::new(
                    PipelineStage::Idle,
                    ProcessingError::TaskAborted(err.to_string()),
                )
            })??;

        transition(path, PipelineStage::Chunking, PipelineStage::Persisting);
        let domain = prepared.metadata.document_info.domain.clone();
        let doc_type = prepared.metadata.document_info.doc_type.clone();
        let persistence = self
            .sink
            .persist(&PersistRequest {
                document_id: &prepared.document_id,
                domain: &domain,
                text: &prepared.text,
                chunks: &prepared.chunks,
                metadata: &prepared.metadata,
            })
            .await;
        let failed_artifacts = persistence.failure_count();
        if failed_artifacts > 0 {
            self.stats
                .record_persistence_failures(failed_artifacts as u64);
            tracing::warn!(
                path = %path.display(),
                failed_artifacts,
                "Document persisted partially"
            );
        }
        transition(path, PipelineStage::Persisting, PipelineStage::Done);

        Ok(ProcessedDocument {
            document_id: prepared.document_id,
            domain,
            doc_type,
            size_bytes: prepared.size_bytes,
            chunk_count: prepared.chunks.len(),
            persistence,
        })
    }
}

impl Pipeline {
    /// Extraction through metadata assembly. Blocking.
    fn prepare(&self, path: &Path, document_id: String) -> Result<PreparedDocument, DocumentFailure> {
        let config = &self.config;
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        transition(path, PipelineStage::Idle, PipelineStage::Extracting);
        let extracting = |err: ProcessingError| DocumentFailure::new(PipelineStage::Extracting, err);
        let bytes = std::fs::read(path)
            .map_err(|err| extracting(ProcessingError::ExtractionFailure(err.to_string())))?;
        let size_bytes = bytes.len() as u64;
        let kind = FileKind::detect(path, &bytes[..bytes.len().min(SNIFF_BYTES)]);
        let extraction = self
            .registry
            .extract(kind, path)
            .map_err(|err| extracting(err.into()))?;
        if extraction.text.trim().is_empty() {
            return Err(extracting(ProcessingError::ExtractionFailure(
                "no text extracted".into(),
            )));
        }
        let extraction_date = format_timestamp(OffsetDateTime::now_utc());

        let size_advisory_exceeded = size_bytes > config.max_file_size_bytes;
        if size_advisory_exceeded {
            tracing::warn!(
                path = %path.display(),
                size_bytes,
                limit_bytes = config.max_file_size_bytes,
                "File exceeds size advisory; processing anyway"
            );
        }

        transition(path, PipelineStage::Extracting, PipelineStage::Normalizing);
        let text = normalize(&extraction.text);
        if text.is_empty() {
            return Err(DocumentFailure::new(
                PipelineStage::Normalizing,
                ProcessingError::ExtractionFailure("no text left after normalization".into()),
            ));
        }

        transition(path, PipelineStage::Normalizing, PipelineStage::Classifying);
        let domain = classify_domain(&config.rules, &text, &filename).to_string();
        let doc_type = classify_type(&config.rules, &text, &filename).to_string();

        transition(path, PipelineStage::Classifying, PipelineStage::Chunking);
        let window = config.chunking.window_for(&doc_type);
        let tokens = self.tokenizer.encode(&text);
        let chunks = split_with_window(&tokens, window, self.tokenizer.as_ref())
            .map_err(|err| DocumentFailure::new(PipelineStage::Chunking, err))?;
        tracing::debug!(
            path = %path.display(),
            tokens = tokens.len(),
            window = window.size(),
            overlap = window.overlap(),
            chunks = chunks.len(),
            "Chunked document"
        );

        let document = DocumentMetadata {
            filename,
            file_type: kind.label().to_string(),
            size_bytes,
            content_hash: hex::encode(Sha256::digest(&bytes)),
            extraction_date,
            text_length: text.chars().count(),
            token_count: tokens.len(),
            domain,
            doc_type,
            page_count: extraction.details.page_count,
            has_tables: extraction.details.has_tables,
            sheet_count: extraction.details.sheet_count,
            size_advisory_exceeded,
        };
        let metadata = assemble(
            document,
            &chunks,
            window,
            &config.embedding,
            OffsetDateTime::now_utc(),
        );

        Ok(PreparedDocument {
            document_id,
            size_bytes,
            text,
            chunks,
            metadata,
        })
    }
}

fn transition(path: &Path, from: PipelineStage, to: PipelineStage) {
    tracing::debug!(path = %path.display(), %from, %to, "Stage transition");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::{ExtractError, Extraction, Extractor};
    use crate::persist::{Artifact, ArtifactResult, PersistenceError};
    use crate::processing::chunking::tests::WordTokenizer;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemorySink {
        persisted: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl PersistenceSink for MemorySink {
        async fn persist(&self, request: &PersistRequest<'_>) -> PersistenceReport {
            self.persisted
                .lock()
                .unwrap()
                .push((request.document_id.to_string(), request.chunks.len()));
            PersistenceReport {
                artifacts: vec![ArtifactResult {
                    artifact: Artifact::ProcessedText,
                    path: PathBuf::from(request.document_id),
                    error: None,
                }],
            }
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl PersistenceSink for BrokenSink {
        async fn persist(&self, request: &PersistRequest<'_>) -> PersistenceReport {
            let error = PersistenceError::Io {
                path: PathBuf::from(request.document_id),
                source: std::io::Error::other("read-only"),
            };
            PersistenceReport {
                artifacts: vec![
                    ArtifactResult {
                        artifact: Artifact::Metadata,
                        path: PathBuf::from("meta"),
                        error: Some(error.to_string()),
                    },
                    ArtifactResult {
                        artifact: Artifact::Chunks,
                        path: PathBuf::from("chunks"),
                        error: None,
                    },
                ],
            }
        }
    }

    struct PanickingExtractor;

    impl Extractor for PanickingExtractor {
        fn extract(&self, _path: &Path) -> Result<Extraction, ExtractError> {
            panic!("extractor bug");
        }
    }

    fn config(workers: usize) -> Arc<Config> {
        Arc::new(
            Config::builder()
                .default_chunk_size(4)
                .overlap(1)
                .workers(workers)
                .build()
                .unwrap(),
        )
    }

    fn service_with(config: Arc<Config>, sink: Arc<dyn PersistenceSink>) -> ProcessingService {
        ProcessingService::new(config, Arc::new(WordTokenizer), sink)
    }

    fn words(count: u32) -> String {
        (0..count).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[tokio::test]
    async fn text_document_reaches_done() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes v1.txt");
        std::fs::write(&path, words(10)).unwrap();
        let sink = Arc::new(MemorySink::default());
        let service = service_with(config(1), sink.clone());

        let outcome = service.process_document(&path).await;
        assert_eq!(outcome.stage(), PipelineStage::Done);
        let document = outcome.result.unwrap();
        // 10 tokens, window 4, stride 3: [0,4) [3,7) [6,10) [9,10)
        assert_eq!(document.chunk_count, 4);
        assert_eq!(document.domain, "general");
        assert_eq!(document.document_id, "notes_v1");
        assert_eq!(
            sink.persisted.lock().unwrap().as_slice(),
            &[("notes_v1".to_string(), 4)]
        );

        let stats = service.stats();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.total_chunks, 4);
        assert_eq!(stats.total_bytes, words(10).len() as u64);
    }

    #[tokio::test]
    async fn empty_document_fails_at_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.txt");
        std::fs::write(&path, "   \n").unwrap();
        let service = service_with(config(1), Arc::new(MemorySink::default()));

        let outcome = service.process_document(&path).await;
        let failure = outcome.result.unwrap_err();
        assert_eq!(failure.stage, PipelineStage::Extracting);
        assert!(matches!(failure.error, ProcessingError::ExtractionFailure(_)));
        assert_eq!(service.stats().failed, 1);
    }

    #[tokio::test]
    async fn boilerplate_only_document_fails_at_normalization() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("footer.txt");
        std::fs::write(&path, "Page 3 of 10").unwrap();
        let service = service_with(config(1), Arc::new(MemorySink::default()));

        let outcome = service.process_document(&path).await;
        assert_eq!(outcome.stage(), PipelineStage::Normalizing);
    }

    #[tokio::test]
    async fn unknown_extension_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tool.bin");
        std::fs::write(&path, "w1 w2").unwrap();
        let service = service_with(config(1), Arc::new(MemorySink::default()));

        let failure = service.process_document(&path).await.result.unwrap_err();
        assert_eq!(failure.stage, PipelineStage::Extracting);
        assert!(matches!(failure.error, ProcessingError::UnsupportedFormat(ext) if ext == "bin"));
    }

    #[tokio::test]
    async fn missing_file_fails_without_panicking() {
        let service = service_with(config(1), Arc::new(MemorySink::default()));
        let outcome = service
            .process_document(Path::new("/nonexistent/kbprep/doc.txt"))
            .await;
        assert_eq!(outcome.stage(), PipelineStage::Extracting);
    }

    #[tokio::test]
    async fn extractor_panic_becomes_task_aborted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        std::fs::write(&path, "w1").unwrap();
        let mut registry = ExtractorRegistry::empty();
        registry.register(FileKind::PlainText, Arc::new(PanickingExtractor));
        let service =
            service_with(config(1), Arc::new(MemorySink::default())).with_registry(registry);

        let failure = service.process_document(&path).await.result.unwrap_err();
        assert!(matches!(failure.error, ProcessingError::TaskAborted(_)));
        assert_eq!(service.stats().failed, 1);
    }

    #[tokio::test]
    async fn oversized_file_is_flagged_but_processed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        std::fs::write(&path, words(3)).unwrap();
        let config = Arc::new(
            Config::builder()
                .default_chunk_size(4)
                .overlap(1)
                .max_file_size_mb(0)
                .build()
                .unwrap(),
        );
        let service = ProcessingService::new(
            config,
            Arc::new(WordTokenizer),
            Arc::new(MemorySink::default()),
        );

        let prepared = service.pipeline.prepare(&path, document_id(&path)).unwrap();
        assert!(prepared.metadata.document_info.size_advisory_exceeded);
        assert!(service.process_document(&path).await.is_success());
    }

    #[tokio::test]
    async fn persistence_failures_are_counted_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, words(5)).unwrap();
        let service = service_with(config(1), Arc::new(BrokenSink));

        let outcome = service.process_document(&path).await;
        let document = outcome.result.unwrap();
        assert_eq!(document.persistence.failure_count(), 1);
        let stats = service.stats();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.persistence_failures, 1);
    }

    #[tokio::test]
    async fn batch_keeps_input_order_and_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let paths: Vec<PathBuf> = (1..=5)
            .map(|i| {
                let path = dir.path().join(format!("doc{i}.txt"));
                let body = if i == 3 { String::new() } else { words(i * 3) };
                std::fs::write(&path, body).unwrap();
                path
            })
            .collect();
        let service = service_with(config(3), Arc::new(MemorySink::default()));

        let summary = service.process_batch(paths.clone()).await;
        assert_eq!(summary.stats.processed, 4);
        assert_eq!(summary.stats.failed, 1);
        assert_eq!(summary.skipped, 0);
        let order: Vec<_> = summary.outcomes.iter().map(|o| o.path.clone()).collect();
        assert_eq!(order, paths);
        assert!(!summary.outcomes[2].is_success());
    }

    #[tokio::test]
    async fn stopped_service_schedules_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.txt");
        std::fs::write(&path, words(5)).unwrap();
        let service = service_with(config(2), Arc::new(MemorySink::default()));
        service.stop_handle().stop();

        let summary = service.process_batch(vec![path.clone(), path]).await;
        assert!(summary.outcomes.is_empty());
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.stats.attempted(), 0);
    }
}
