//! PDF page-text extraction.
//!
//! [`PdfTextSource`] is a blocking seam: callers run it inside
//! `spawn_blocking`. The production implementation, [`PdfiumText`], binds
//! pdfium lazily on first use via `pdfium-auto` (downloading and caching
//! the library if needed) and keeps the binding for the process lifetime.

use crate::error::IntakeError;
use pdfium_render::prelude::*;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Extracts the text of every page of a PDF, in page order.
pub trait PdfTextSource: Send + Sync {
    fn page_texts(&self, bytes: &[u8]) -> Result<Vec<String>, IntakeError>;
}

/// pdfium-backed text extraction.
#[derive(Default)]
pub struct PdfiumText {
    pdfium: OnceLock<Pdfium>,
}

impl PdfiumText {
    pub fn new() -> Self {
        Self::default()
    }

    fn pdfium(&self) -> Result<&Pdfium, IntakeError> {
        if let Some(pdfium) = self.pdfium.get() {
            return Ok(pdfium);
        }
        let bound = pdfium_auto::bind_pdfium_silent().map_err(|e| {
            IntakeError::UnreadableDocument {
                reason: format!("PDF engine unavailable: {e}"),
            }
        })?;
        info!("PDF engine bound");
        // A concurrent first call may have won the race; either binding works.
        let _ = self.pdfium.set(bound);
        self.pdfium
            .get()
            .ok_or_else(|| IntakeError::Internal("PDF engine binding lost".into()))
    }
}

impl PdfTextSource for PdfiumText {
    fn page_texts(&self, bytes: &[u8]) -> Result<Vec<String>, IntakeError> {
        if !bytes.starts_with(b"%PDF") {
            let magic: Vec<u8> = bytes.iter().take(4).copied().collect();
            return Err(IntakeError::UnreadableDocument {
                reason: format!("not a PDF (first bytes {magic:?})"),
            });
        }

        let pdfium = self.pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| IntakeError::UnreadableDocument {
                reason: format!("{e:?}"),
            })?;

        let mut texts = Vec::with_capacity(document.pages().len() as usize);
        for (idx, page) in document.pages().iter().enumerate() {
            let text = page.text().map_err(|e| IntakeError::UnreadableDocument {
                reason: format!("page {}: {e:?}", idx + 1),
            })?;
            texts.push(text.all());
        }
        debug!("Extracted text from {} PDF pages", texts.len());
        Ok(texts)
    }
}
