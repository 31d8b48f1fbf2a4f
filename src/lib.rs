#![deny(missing_docs)]

//! Core library for preparing document collections for knowledge base ingestion.

/// Environment-driven configuration management.
pub mod config;
/// Format-specific text extraction.
pub mod extract;
/// Structured logging and tracing setup.
pub mod logging;
/// Processing statistics.
pub mod metrics;
/// Artifact storage.
pub mod persist;
/// Document processing pipeline.
pub mod processing;
/// End-of-run report and upload script.
pub mod report;
