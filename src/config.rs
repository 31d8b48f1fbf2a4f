use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::processing::{
    chunking::ChunkWindow,
    classify::{ClassifierRules, DocTypeRule},
    metadata::EmbeddingProfile,
};

const DEFAULT_CHUNK_SIZE: usize = 800;
const DEFAULT_OVERLAP: usize = 100;
const DEFAULT_MAX_FILE_SIZE_MB: u64 = 100;
const DEFAULT_WORKERS: usize = 4;
const DEFAULT_TOKENIZER: &str = "cl100k_base";

/// Errors encountered while assembling configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable or option contained a value that could not be parsed.
    #[error("Invalid value for {0}")]
    InvalidValue(String),
    /// A document type resolves to a window that never advances.
    #[error(
        "Invalid chunk configuration for '{doc_type}': window {window_size} must exceed overlap {overlap}"
    )]
    InvalidChunkConfiguration {
        /// Document-type label (or `default`).
        doc_type: String,
        /// Configured window size.
        window_size: usize,
        /// Configured overlap.
        overlap: usize,
    },
    /// Rules file could not be read or parsed.
    #[error("Failed to load rules file {path}: {message}")]
    RulesFile {
        /// Path of the rules file.
        path: PathBuf,
        /// Underlying failure.
        message: String,
    },
}

/// Per-document-type chunk windows, validated at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkingConfig {
    windows: BTreeMap<String, ChunkWindow>,
    default_window: ChunkWindow,
}

impl ChunkingConfig {
    /// Resolve the window for a document type, falling back to the default window.
    pub fn window_for(&self, doc_type: &str) -> ChunkWindow {
        self.windows
            .get(doc_type)
            .copied()
            .unwrap_or(self.default_window)
    }

    /// Window used for unmapped document types.
    pub fn default_window(&self) -> ChunkWindow {
        self.default_window
    }

    /// Global overlap in tokens.
    pub fn overlap(&self) -> usize {
        self.default_window.overlap()
    }
}

/// Immutable runtime configuration for a processing run.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the output tree.
    pub output_dir: PathBuf,
    /// Chunk windows keyed by document type.
    pub chunking: ChunkingConfig,
    /// Ordered classification labels.
    pub rules: ClassifierRules,
    /// Files above this size are flagged but still processed.
    pub max_file_size_bytes: u64,
    /// Documents processed concurrently in a batch.
    pub workers: usize,
    /// Tokenizer encoding or model name.
    pub tokenizer: String,
    /// Embedding expectations recorded in metadata.
    pub embedding: EmbeddingProfile,
}

impl Config {
    /// Start from the built-in defaults.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Load `.env`, apply environment overrides to the defaults, and validate.
    pub fn from_env() -> Result<Self, ConfigError> {
        ConfigBuilder::from_env()?.build()
    }
}

/// Collects configuration once before processing starts.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    output_dir: PathBuf,
    chunk_sizes: BTreeMap<String, usize>,
    default_chunk_size: usize,
    overlap: usize,
    rules: ClassifierRules,
    max_file_size_mb: u64,
    workers: usize,
    tokenizer: String,
    embedding: EmbeddingProfile,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        let chunk_sizes = [
            ("api_reference", 512),
            ("user_guide", 1024),
            ("tutorial", 1500),
            ("troubleshooting", 800),
        ]
        .into_iter()
        .map(|(label, size)| (label.to_string(), size))
        .collect();

        Self {
            output_dir: default_output_dir(),
            chunk_sizes,
            default_chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_OVERLAP,
            rules: ClassifierRules::default(),
            max_file_size_mb: DEFAULT_MAX_FILE_SIZE_MB,
            workers: DEFAULT_WORKERS,
            tokenizer: DEFAULT_TOKENIZER.to_string(),
            embedding: EmbeddingProfile::default(),
        }
    }
}

impl ConfigBuilder {
    /// Defaults overlaid with `.env` and process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`; blank values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let mut builder = Self::default().output_dir(output_dir_from_lookup(&lookup));

        if let Some(overlap) = get("KBPREP_CHUNK_OVERLAP") {
            builder = builder.overlap(parse_value("KBPREP_CHUNK_OVERLAP", &overlap)?);
        }
        if let Some(size) = get("KBPREP_MAX_FILE_SIZE_MB") {
            builder = builder.max_file_size_mb(parse_value("KBPREP_MAX_FILE_SIZE_MB", &size)?);
        }
        if let Some(workers) = get("KBPREP_WORKERS") {
            builder = builder.workers(parse_value("KBPREP_WORKERS", &workers)?);
        }
        if let Some(tokenizer) = get("KBPREP_TOKENIZER") {
            builder = builder.tokenizer(tokenizer.trim());
        }
        if let Some(model) = get("KBPREP_EMBEDDING_MODEL") {
            builder.embedding.model = model.trim().to_string();
        }
        if let Some(dimension) = get("KBPREP_EMBEDDING_DIMENSION") {
            builder.embedding.dimensions = parse_value("KBPREP_EMBEDDING_DIMENSION", &dimension)?;
        }
        if let Some(path) = get("KBPREP_RULES_FILE") {
            builder = builder.rules_file(Path::new(path.trim()))?;
        }
        Ok(builder)
    }

    /// Root of the output tree.
    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = dir.into();
        self
    }

    /// Set the window for a document-type label.
    pub fn chunk_size(mut self, doc_type: impl Into<String>, size: usize) -> Self {
        self.chunk_sizes.insert(doc_type.into(), size);
        self
    }

    /// Window for document types without an explicit size.
    pub fn default_chunk_size(mut self, size: usize) -> Self {
        self.default_chunk_size = size;
        self
    }

    /// Global overlap in tokens.
    pub fn overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    /// Replace the classification rules.
    pub fn rules(mut self, rules: ClassifierRules) -> Self {
        self.rules = rules;
        self
    }

    /// Append a domain label at the lowest priority.
    pub fn domain(mut self, label: impl Into<String>) -> Self {
        self.rules.domains.push(label.into());
        self
    }

    /// Append a document-type rule at the lowest priority.
    pub fn doc_type(mut self, rule: DocTypeRule) -> Self {
        self.rules.doc_types.push(rule);
        self
    }

    /// Size advisory threshold in MiB.
    pub fn max_file_size_mb(mut self, megabytes: u64) -> Self {
        self.max_file_size_mb = megabytes;
        self
    }

    /// Number of concurrent document workers.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Tokenizer encoding or model name.
    pub fn tokenizer(mut self, name: impl Into<String>) -> Self {
        self.tokenizer = name.into();
        self
    }

    /// Embedding expectations recorded in metadata.
    pub fn embedding(mut self, embedding: EmbeddingProfile) -> Self {
        self.embedding = embedding;
        self
    }

    /// Overlay a JSON rules file. Lists are replaced, chunk sizes are merged.
    pub fn rules_file(mut self, path: &Path) -> Result<Self, ConfigError> {
        let rules_error = |message: String| ConfigError::RulesFile {
            path: path.to_path_buf(),
            message,
        };
        let raw = std::fs::read_to_string(path).map_err(|err| rules_error(err.to_string()))?;
        let file: RulesFile =
            serde_json::from_str(&raw).map_err(|err| rules_error(err.to_string()))?;

        if let Some(domains) = file.domains {
            self.rules.domains = domains;
        }
        if let Some(label) = file.default_domain {
            self.rules.default_domain = label;
        }
        if let Some(doc_types) = file.doc_types {
            self.rules.doc_types = doc_types;
        }
        if let Some(label) = file.default_doc_type {
            self.rules.default_doc_type = label;
        }
        self.chunk_sizes.extend(file.chunk_sizes);
        if let Some(size) = file.default_chunk_size {
            self.default_chunk_size = size;
        }
        if let Some(overlap) = file.overlap {
            self.overlap = overlap;
        }
        tracing::debug!(path = %path.display(), "Applied rules file");
        Ok(self)
    }

    /// Validate and freeze the configuration.
    ///
    /// Every window must exceed the overlap; otherwise the run is rejected before any document is
    /// processed.
    pub fn build(self) -> Result<Config, ConfigError> {
        let overlap = self.overlap;
        let validate = |doc_type: &str, size: usize| {
            ChunkWindow::new(size, overlap).map_err(|_| ConfigError::InvalidChunkConfiguration {
                doc_type: doc_type.to_string(),
                window_size: size,
                overlap,
            })
        };

        let default_window = validate("default", self.default_chunk_size)?;
        let windows = self
            .chunk_sizes
            .iter()
            .map(|(label, size)| Ok((label.clone(), validate(label, *size)?)))
            .collect::<Result<BTreeMap<_, _>, ConfigError>>()?;

        if self.workers == 0 {
            return Err(ConfigError::InvalidValue("workers (must be >= 1)".into()));
        }
        if self.embedding.dimensions == 0 {
            return Err(ConfigError::InvalidValue(
                "embedding dimension (must be >= 1)".into(),
            ));
        }

        let config = Config {
            output_dir: self.output_dir,
            chunking: ChunkingConfig {
                windows,
                default_window,
            },
            rules: self.rules,
            max_file_size_bytes: self.max_file_size_mb.saturating_mul(1024 * 1024),
            workers: self.workers,
            tokenizer: self.tokenizer,
            embedding: self.embedding,
        };
        tracing::debug!(
            output_dir = %config.output_dir.display(),
            overlap,
            workers = config.workers,
            tokenizer = %config.tokenizer,
            domains = config.rules.domains.len(),
            doc_types = config.rules.doc_types.len(),
            "Loaded configuration"
        );
        Ok(config)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RulesFile {
    domains: Option<Vec<String>>,
    default_domain: Option<String>,
    doc_types: Option<Vec<DocTypeRule>>,
    default_doc_type: Option<String>,
    chunk_sizes: BTreeMap<String, usize>,
    default_chunk_size: Option<usize>,
    overlap: Option<usize>,
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue(key.to_string()))
}

/// Output root from `.env` and the environment, before the rest of the configuration is read.
///
/// Lets the binary start logging under the output tree before rules files and validation run.
pub fn output_dir_from_env() -> PathBuf {
    dotenvy::dotenv().ok();
    output_dir_from_lookup(|key| env::var(key).ok())
}

fn output_dir_from_lookup<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup("KBPREP_OUTPUT_DIR")
        .map(|dir| dir.trim().to_string())
        .filter(|dir| !dir.is_empty())
        .map_or_else(default_output_dir, PathBuf::from)
}

fn default_output_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("Documents"))
        .unwrap_or_default()
        .join("AWS_Knowledge_Base")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_built_in_tables() {
        let config = Config::builder().build().unwrap();
        assert_eq!(config.chunking.window_for("api_reference").size(), 512);
        assert_eq!(config.chunking.window_for("user_guide").size(), 1024);
        assert_eq!(config.chunking.window_for("tutorial").size(), 1500);
        assert_eq!(config.chunking.window_for("troubleshooting").size(), 800);
        assert_eq!(config.chunking.window_for("best_practices").size(), 800);
        assert_eq!(config.chunking.overlap(), 100);
        assert_eq!(config.max_file_size_bytes, 100 * 1024 * 1024);
        assert_eq!(config.rules.domains.first().map(String::as_str), Some("bedrock"));
    }

    #[test]
    fn rejects_window_not_exceeding_overlap() {
        let error = Config::builder()
            .chunk_size("api_reference", 100)
            .overlap(100)
            .build()
            .unwrap_err();
        assert!(matches!(
            error,
            ConfigError::InvalidChunkConfiguration { ref doc_type, window_size: 100, overlap: 100 }
                if doc_type == "api_reference"
        ));
    }

    #[test]
    fn rejects_zero_workers() {
        assert!(Config::builder().workers(0).build().is_err());
    }

    #[test]
    fn builder_customizations_apply_once() {
        let config = Config::builder()
            .chunk_size("custom", 600)
            .domain("custom-service")
            .doc_type(DocTypeRule::new("custom", &["bespoke"]))
            .build()
            .unwrap();
        assert_eq!(config.chunking.window_for("custom").size(), 600);
        assert_eq!(
            config.rules.domains.last().map(String::as_str),
            Some("custom-service")
        );
    }

    #[test]
    fn environment_overrides_defaults() {
        let builder = ConfigBuilder::from_lookup(lookup(&[
            ("KBPREP_OUTPUT_DIR", "/tmp/kb"),
            ("KBPREP_CHUNK_OVERLAP", "50"),
            ("KBPREP_WORKERS", "2"),
            ("KBPREP_MAX_FILE_SIZE_MB", "1"),
            ("KBPREP_EMBEDDING_DIMENSION", "256"),
            ("KBPREP_TOKENIZER", " "),
        ]))
        .unwrap();
        let config = builder.build().unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/tmp/kb"));
        assert_eq!(config.chunking.overlap(), 50);
        assert_eq!(config.workers, 2);
        assert_eq!(config.max_file_size_bytes, 1024 * 1024);
        assert_eq!(config.embedding.dimensions, 256);
        assert_eq!(config.tokenizer, "cl100k_base");
    }

    #[test]
    fn early_output_dir_matches_built_config() {
        let env = lookup(&[("KBPREP_OUTPUT_DIR", " /tmp/kb ")]);
        let early = output_dir_from_lookup(&env);
        assert_eq!(early, PathBuf::from("/tmp/kb"));
        let config = ConfigBuilder::from_lookup(&env).unwrap().build().unwrap();
        assert_eq!(config.output_dir, early);

        let blank = lookup(&[("KBPREP_OUTPUT_DIR", "  ")]);
        assert_eq!(output_dir_from_lookup(&blank), default_output_dir());
    }

    #[test]
    fn unparsable_environment_value_is_rejected() {
        let error = ConfigBuilder::from_lookup(lookup(&[("KBPREP_WORKERS", "many")])).unwrap_err();
        assert!(matches!(error, ConfigError::InvalidValue(key) if key == "KBPREP_WORKERS"));
    }

    #[test]
    fn rules_file_replaces_lists_and_merges_sizes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(
            &path,
            r#"{
                "domains": ["billing", "iam"],
                "doc_types": [{"label": "faq", "keywords": ["faq"]}],
                "chunk_sizes": {"faq": 300},
                "overlap": 50
            }"#,
        )
        .unwrap();

        let config = Config::builder().rules_file(&path).unwrap().build().unwrap();
        assert_eq!(config.rules.domains, vec!["billing".to_string(), "iam".to_string()]);
        assert_eq!(config.rules.doc_types.len(), 1);
        assert_eq!(config.chunking.window_for("faq").size(), 300);
        assert_eq!(config.chunking.window_for("api_reference").size(), 512);
        assert_eq!(config.chunking.overlap(), 50);
    }

    #[test]
    fn malformed_rules_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.json");
        std::fs::write(&path, "{ not json").unwrap();
        let error = Config::builder().rules_file(&path).unwrap_err();
        assert!(matches!(error, ConfigError::RulesFile { .. }));
    }
}
