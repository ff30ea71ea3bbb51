use std::{io::ErrorKind, path::Path, process::Stdio};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;
use url::Url;

use super::{PdfEngine, RenderError};

/// Prints HTML to PDF with a headless Chromium child process.
///
/// The child is spawned with `kill_on_drop`, so a caller that stops polling
/// (timeout, cancelled request) never leaves a browser running.
#[derive(Debug, Clone)]
pub struct ChromiumEngine {
    binary: String,
}

impl ChromiumEngine {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl PdfEngine for ChromiumEngine {
    async fn render_pdf(&self, html: &str, output: &Path) -> Result<(), RenderError> {
        let page = tempfile::Builder::new()
            .prefix("quote-")
            .suffix(".html")
            .tempfile()?;
        tokio::fs::write(page.path(), html).await?;

        let page_url = Url::from_file_path(page.path()).map_err(|_| {
            RenderError::Io(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("{} is not an absolute path", page.path().display()),
            ))
        })?;

        debug!(binary = %self.binary, output = %output.display(), "launching headless browser");
        let result = Command::new(&self.binary)
            .arg("--headless")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--no-pdf-header-footer")
            .arg(format!("--print-to-pdf={}", output.display()))
            .arg(page_url.as_str())
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await;

        let out = result.map_err(|source| RenderError::Launch {
            binary: self.binary.clone(),
            source,
        })?;
        if !out.status.success() {
            return Err(RenderError::Browser {
                status: out.status.to_string(),
                stderr: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}
