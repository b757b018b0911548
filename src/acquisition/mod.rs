//! Raw snapshot acquisition
//!
//! Fetches the latest sensor export and stages it as `input_data.csv`.
//! Payloads are validated as a table before the atomic replace, so a bad
//! export never clobbers the previous snapshot.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::bus::{Stage, StagedBus, Table};
use crate::config::IngestionConfig;
use crate::error::PipelineError;

/// Where raw sensor snapshots come from.
#[async_trait]
pub trait Ingestor: Send + Sync {
    /// Stage a fresh snapshot, returning its data row count.
    async fn ingest(&self, bus: &StagedBus) -> Result<usize, PipelineError>;

    /// Human-readable name for logging (e.g. "http", "file").
    fn source_name(&self) -> &str;
}

/// Pick the configured source: a local file wins over a URL.
pub fn from_config(config: &IngestionConfig) -> Result<Arc<dyn Ingestor>, PipelineError> {
    if let Some(path) = &config.source_file {
        return Ok(Arc::new(FileIngestor::new(path.clone())));
    }
    if !config.source_url.trim().is_empty() {
        let ingestor = HttpIngestor::new(
            config.source_url.trim(),
            Duration::from_secs(config.timeout_secs),
        )?;
        return Ok(Arc::new(ingestor));
    }
    Err(PipelineError::Ingestion(
        "no source configured (set ingestion.source_url or ingestion.source_file)".to_string(),
    ))
}

fn stage_snapshot(bus: &StagedBus, text: &str, source: &str) -> Result<usize, PipelineError> {
    let rows = Table::parse(Stage::RawInput.file_name(), text)?.len();
    bus.write_text(Stage::RawInput, text)?;
    info!(source = source, rows = rows, "Raw snapshot staged");
    Ok(rows)
}

// ============================================================================
// HTTP export
// ============================================================================

/// GETs a CSV export URL.
#[derive(Debug, Clone)]
pub struct HttpIngestor {
    http: reqwest::Client,
    url: String,
}

impl HttpIngestor {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Ingestion(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Ingestor for HttpIngestor {
    async fn ingest(&self, bus: &StagedBus) -> Result<usize, PipelineError> {
        let resp = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| PipelineError::Ingestion(format!("GET {}: {e}", self.url)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(PipelineError::Ingestion(format!(
                "GET {} returned {status}",
                self.url
            )));
        }

        let text = resp
            .text()
            .await
            .map_err(|e| PipelineError::Ingestion(format!("reading body from {}: {e}", self.url)))?;
        stage_snapshot(bus, &text, self.source_name())
    }

    fn source_name(&self) -> &str {
        "http"
    }
}

// ============================================================================
// Local file (replay / offline)
// ============================================================================

#[derive(Debug, Clone)]
pub struct FileIngestor {
    path: PathBuf,
}

impl FileIngestor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Ingestor for FileIngestor {
    async fn ingest(&self, bus: &StagedBus) -> Result<usize, PipelineError> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| PipelineError::io(&self.path, e))?;
        stage_snapshot(bus, &text, self.source_name())
    }

    fn source_name(&self) -> &str {
        "file"
    }
}
