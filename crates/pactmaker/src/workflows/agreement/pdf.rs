use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::renderer::RenderedAgreement;

const PDF_MAGIC: &[u8] = b"%PDF";

/// Page margins handed to the rasterizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLayout {
    pub margin_top: String,
    pub margin_right: String,
    pub margin_bottom: String,
    pub margin_left: String,
}

impl PageLayout {
    pub fn uniform(border: &str) -> Self {
        Self {
            margin_top: border.to_string(),
            margin_right: border.to_string(),
            margin_bottom: border.to_string(),
            margin_left: border.to_string(),
        }
    }

    /// One inch on every side.
    pub fn agreement() -> Self {
        Self::uniform("1in")
    }
}

impl Default for PageLayout {
    fn default() -> Self {
        Self::agreement()
    }
}

/// A finished PDF together with its base64 transport encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializedDocument {
    pdf: Vec<u8>,
    encoded: String,
}

impl MaterializedDocument {
    pub fn from_pdf(pdf: Vec<u8>) -> Self {
        let encoded = STANDARD.encode(&pdf);
        Self { pdf, encoded }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pdf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.pdf
    }

    pub fn base64(&self) -> &str {
        &self.encoded
    }
}

/// Converts rendered HTML into a PDF.
#[async_trait]
pub trait PdfMaterializer: Send + Sync {
    async fn materialize(
        &self,
        html: &RenderedAgreement,
        layout: &PageLayout,
    ) -> Result<MaterializedDocument, PdfError>;
}

#[derive(Debug, thiserror::Error)]
pub enum PdfError {
    #[error("unable to launch {}: {source}", .binary.display())]
    Spawn {
        binary: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("rasterizer i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("rasterizer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("rasterizer produced no PDF output")]
    EmptyOutput,
}

/// Runs `wkhtmltopdf`, streaming HTML over stdin and reading the PDF from stdout.
#[derive(Debug, Clone)]
pub struct WkhtmltopdfMaterializer {
    binary: PathBuf,
}

impl WkhtmltopdfMaterializer {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn arguments(layout: &PageLayout) -> Vec<String> {
        vec![
            "--quiet".to_string(),
            "--encoding".to_string(),
            "utf-8".to_string(),
            "--margin-top".to_string(),
            layout.margin_top.clone(),
            "--margin-right".to_string(),
            layout.margin_right.clone(),
            "--margin-bottom".to_string(),
            layout.margin_bottom.clone(),
            "--margin-left".to_string(),
            layout.margin_left.clone(),
            "-".to_string(),
            "-".to_string(),
        ]
    }
}

impl Default for WkhtmltopdfMaterializer {
    fn default() -> Self {
        Self::new("wkhtmltopdf")
    }
}

#[async_trait]
impl PdfMaterializer for WkhtmltopdfMaterializer {
    async fn materialize(
        &self,
        html: &RenderedAgreement,
        layout: &PageLayout,
    ) -> Result<MaterializedDocument, PdfError> {
        let mut child = Command::new(&self.binary)
            .args(Self::arguments(layout))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PdfError::Spawn {
                binary: self.binary.clone(),
                source,
            })?;

        // Feed stdin concurrently with draining stdout.
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| PdfError::Io(std::io::Error::other("stdin not captured")))?;
        let input = html.as_str().as_bytes().to_vec();
        let writer = tokio::spawn(async move {
            stdin.write_all(&input).await?;
            stdin.shutdown().await
        });

        let output = child.wait_with_output().await?;
        let written = writer
            .await
            .map_err(|err| PdfError::Io(std::io::Error::other(err)))?;

        if !output.status.success() {
            return Err(PdfError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        written?;
        if !output.stdout.starts_with(PDF_MAGIC) {
            return Err(PdfError::EmptyOutput);
        }

        debug!(bytes = output.stdout.len(), "materialized agreement pdf");
        Ok(MaterializedDocument::from_pdf(output.stdout))
    }
}
