use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

pub mod chromium;
pub mod snapshot;
pub mod template;

pub use chromium::ChromiumEngine;
pub use snapshot::{NormalizedQuote, QuoteSnapshot};

pub const GENERATED_URL_PREFIX: &str = "/generated/";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to launch {binary}: {source}")]
    Launch {
        binary: String,
        #[source]
        source: std::io::Error,
    },
    #[error("browser exited with {status}: {stderr}")]
    Browser { status: String, stderr: String },
    #[error("rendering did not finish within {0:?}")]
    Timeout(Duration),
    #[error("browser produced an empty document")]
    EmptyOutput,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Turns an HTML document into a PDF written at `output`.
#[async_trait]
pub trait PdfEngine: Send + Sync + 'static {
    async fn render_pdf(&self, html: &str, output: &Path) -> Result<(), RenderError>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedDocument {
    pub file: String,
    pub url: String,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quote_number: Option<String>,
}

pub struct DocumentRenderer {
    engine: Arc<dyn PdfEngine>,
    output_dir: PathBuf,
    timeout: Duration,
}

impl DocumentRenderer {
    pub fn new(engine: Arc<dyn PdfEngine>, output_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            engine,
            output_dir: output_dir.into(),
            timeout,
        }
    }

    /// Renders into a hidden temp file and only exposes it under its final
    /// name once the engine produced a non-empty PDF.
    pub async fn render(&self, snapshot: &QuoteSnapshot) -> Result<GeneratedDocument, RenderError> {
        let quote = snapshot.normalize();
        let html = template::render_html(&template::quote_page(&quote));

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let pending = tempfile::Builder::new()
            .prefix(".devis-")
            .suffix(".pdf.part")
            .tempfile_in(&self.output_dir)?;

        // Dropping the engine future on timeout also kills the browser.
        match tokio::time::timeout(self.timeout, self.engine.render_pdf(&html, pending.path())).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(timeout = ?self.timeout, "pdf rendering timed out");
                return Err(RenderError::Timeout(self.timeout));
            }
        }

        let size = tokio::fs::metadata(pending.path()).await?.len();
        if size == 0 {
            return Err(RenderError::EmptyOutput);
        }

        let file = document_file_name(Utc::now());
        pending
            .persist_noclobber(self.output_dir.join(&file))
            .map_err(|err| RenderError::Io(err.error))?;

        info!(file = %file, size, "generated quote document");
        Ok(GeneratedDocument {
            url: format!("{GENERATED_URL_PREFIX}{file}"),
            file,
            generated_at: Utc::now(),
            quote_number: quote.quote_number,
        })
    }
}

fn document_file_name(now: DateTime<Utc>) -> String {
    let suffix: [u8; 2] = rand::random();
    format!("devis_{}_{}.pdf", now.timestamp_millis(), hex::encode(suffix))
}
