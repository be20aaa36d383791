//! PDF text extraction via pdfium.
//!
//! ## Why a trait?
//!
//! pdfium is a native library bound at runtime. Hiding it behind
//! [`TextExtractor`] lets the orchestrator and the HTTP layer be tested with
//! an in-memory extractor, and lets deployments without pdfium plug in a
//! different backend.
//!
//! ## Blocking
//!
//! `extract` is synchronous and CPU-bound. Async callers must run it under
//! `tokio::task::spawn_blocking`, as [`crate::analyze::InvoiceAnalyzer`] does.

use crate::error::ExtractionError;
use pdfium_render::prelude::*;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Turns PDF bytes into plain text.
pub trait TextExtractor: Send + Sync {
    /// Extract the text of every page, in page order.
    ///
    /// `filename` is used only for error messages.
    fn extract(&self, filename: &str, bytes: &[u8]) -> Result<String, ExtractionError>;
}

/// Join per-page texts with single newlines, skipping pages with no text.
///
/// Scanned pages have no text layer and yield an empty string; they are
/// dropped rather than leaving blank lines. A document where every page is
/// empty yields an empty string, which is not an error.
pub fn join_page_texts<I, S>(pages: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for page in pages {
        let text = page.as_ref();
        if text.is_empty() {
            continue;
        }
        if !out.is_empty() {
            out.push('\n');
        }
        out.push_str(text);
    }
    out
}

/// [`TextExtractor`] backed by `pdfium-render`.
#[derive(Debug, Clone, Default)]
pub struct PdfiumExtractor {
    library_dir: Option<PathBuf>,
}

impl PdfiumExtractor {
    /// Bind to the library in `library_dir`, or search the system path when
    /// `None`.
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self { library_dir }
    }

    fn bind(&self) -> Result<Pdfium, ExtractionError> {
        let bindings = match &self.library_dir {
            Some(dir) => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir))
                    .or_else(|_| Pdfium::bind_to_system_library())
            }
            None => Pdfium::bind_to_system_library(),
        }
        .map_err(|e| ExtractionError::EngineUnavailable {
            detail: format!("{:?}", e),
        })?;

        Ok(Pdfium::new(bindings))
    }

    /// Check that pdfium can be bound. Called once at startup so a missing
    /// library shows up in the logs before the first PDF arrives.
    pub fn probe(&self) -> Result<(), ExtractionError> {
        self.bind().map(|_| ())
    }
}

impl TextExtractor for PdfiumExtractor {
    fn extract(&self, filename: &str, bytes: &[u8]) -> Result<String, ExtractionError> {
        let pdfium = self.bind()?;

        let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
            ExtractionError::Unreadable {
                filename: filename.to_string(),
                detail: format!("{:?}", e),
            }
        })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF '{}' loaded: {} pages", filename, total_pages);

        let mut texts = Vec::with_capacity(total_pages);
        for (idx, page) in pages.iter().enumerate() {
            match page.text() {
                Ok(text) => {
                    let text = text.all();
                    debug!("Page {}: {} chars", idx + 1, text.len());
                    texts.push(text);
                }
                Err(e) => {
                    warn!("Page {}: no text layer ({:?}), skipping", idx + 1, e);
                }
            }
        }

        let joined = join_page_texts(&texts);
        if joined.is_empty() {
            warn!(
                "PDF '{}' has no extractable text (scanned document?)",
                filename
            );
        }
        Ok(joined)
    }
}
