//! The document-conversion seam.
//!
//! [`Converter`] is the one operation the handler needs from the outside
//! world: "turn the PDF at this path into Markdown". [`VlmConverter`] backs
//! it with the `edgequake-pdf2md` pipeline (pdfium rasterisation → vision
//! LLM → Markdown post-processing). Tests plug in their own implementations.

use crate::config::ConverterSettings;
use crate::error::{JobError, WorkerError};
use edgequake_pdf2md::ConversionConfig;
use futures::future::BoxFuture;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Converts a PDF on disk to Markdown.
///
/// Implementations are shared across concurrently running jobs, hence
/// `Send + Sync`. The returned future must be `Send` so the handler can run
/// it on its own task.
pub trait Converter: Send + Sync {
    fn convert<'a>(&'a self, pdf_path: &'a Path) -> BoxFuture<'a, Result<String, JobError>>;
}

/// [`Converter`] backed by the VLM pipeline.
#[derive(Debug, Clone)]
pub struct VlmConverter {
    config: ConversionConfig,
}

impl VlmConverter {
    /// Build the pipeline configuration once; every job reuses it.
    pub fn new(settings: &ConverterSettings) -> Result<Self, WorkerError> {
        let mut config = ConversionConfig::builder()
            .dpi(settings.dpi)
            .concurrency(settings.page_concurrency)
            .max_tokens(settings.max_tokens)
            .temperature(settings.temperature)
            .max_retries(settings.max_retries)
            .api_timeout_secs(settings.api_timeout_secs)
            .build()
            .map_err(|e| WorkerError::InvalidConfig(e.to_string()))?;

        config.model = settings.model.clone();
        config.provider_name = settings.provider.clone();
        config.system_prompt = settings.system_prompt.clone();

        info!(
            "Converter ready: provider={} model={} dpi={} page_concurrency={}",
            settings.provider.as_deref().unwrap_or("auto"),
            settings.model.as_deref().unwrap_or("default"),
            config.dpi,
            config.concurrency
        );
        Ok(Self { config })
    }

    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }
}

impl Converter for VlmConverter {
    fn convert<'a>(&'a self, pdf_path: &'a Path) -> BoxFuture<'a, Result<String, JobError>> {
        Box::pin(async move {
            let start = Instant::now();
            let input = pdf_path.to_string_lossy().into_owned();
            let output = edgequake_pdf2md::convert(&input, &self.config)
                .await
                .map_err(|e| JobError::Conversion(e.to_string()))?;

            debug!(
                "Converted {}/{} pages in {}ms ({} tokens in / {} out)",
                output.stats.processed_pages,
                output.stats.total_pages,
                start.elapsed().as_millis(),
                output.stats.total_input_tokens,
                output.stats.total_output_tokens
            );
            Ok(output.markdown)
        })
    }
}

/// Make sure the PDFium engine library is on disk before the first job.
///
/// Honours `PDFIUM_LIB_PATH`; otherwise downloads once and caches. The
/// download is blocking, so it runs on the blocking pool.
pub async fn ensure_engine() -> Result<PathBuf, WorkerError> {
    let path = tokio::task::spawn_blocking(|| pdfium_auto::ensure_pdfium_library(None))
        .await
        .map_err(|e| WorkerError::Internal(format!("Engine setup task panicked: {e}")))?
        .map_err(|e| WorkerError::EngineUnavailable(e.to_string()))?;
    info!("PDFium engine at {}", path.display());
    Ok(path)
}
