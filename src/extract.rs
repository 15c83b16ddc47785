//! Extraction entry points: one attachment in, canonical fields out.
//!
//! [`Extractor`] chains the pipeline stages for a single document. It holds
//! no per-user state and no locks, so one instance is shared by every
//! concurrent dialog.

use crate::config::IntakeConfig;
use crate::error::IntakeError;
use crate::fields::{CanonicalFields, Role};
use crate::pipeline::document::{normalize, Attachment, Document};
use crate::pipeline::llm::{ExtractionClient, ExtractionModel, LlmModel};
use crate::pipeline::pdf_text::{PdfTextSource, PdfiumText};
use crate::pipeline::reconcile::reconcile;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// The result of a successful extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub fields: CanonicalFields,
    pub role: Role,
    /// Wall-clock time spent in the model call.
    pub model_ms: u64,
    pub total_ms: u64,
}

/// Runs normalise → model call → reconcile for one attachment.
#[derive(Clone)]
pub struct Extractor {
    client: ExtractionClient,
    pdf_text: Arc<dyn PdfTextSource>,
}

impl Extractor {
    pub fn new(client: ExtractionClient, pdf_text: Arc<dyn PdfTextSource>) -> Self {
        Self { client, pdf_text }
    }

    /// Build an extractor from explicit collaborators and the config's limits.
    pub fn with_model(
        model: Arc<dyn ExtractionModel>,
        pdf_text: Arc<dyn PdfTextSource>,
        config: &IntakeConfig,
    ) -> Self {
        Self::new(ExtractionClient::from_config(model, config), pdf_text)
    }

    /// Build the production extractor: provider resolved from `config`,
    /// PDF text via pdfium.
    pub fn from_config(config: &IntakeConfig) -> Result<Self, IntakeError> {
        let model = LlmModel::from_config(config)?;
        Ok(Self::with_model(
            Arc::new(model),
            Arc::new(PdfiumText::new()),
            config,
        ))
    }

    pub fn model_id(&self) -> &str {
        self.client.model_id()
    }

    pub async fn extract(
        &self,
        attachment: Attachment,
        role: Role,
    ) -> Result<Extraction, IntakeError> {
        let start = Instant::now();
        let document = Document::from_attachment(attachment)?;
        let request = normalize(document, role, &self.pdf_text).await?;
        let raw = self.client.extract(&request).await?;
        let fields = reconcile(&raw.text)?;

        let total_ms = start.elapsed().as_millis() as u64;
        info!(
            "Extracted {} {} fields in {}ms",
            fields.filled(),
            role,
            total_ms
        );
        Ok(Extraction {
            fields,
            role,
            model_ms: raw.duration_ms,
            total_ms,
        })
    }
}

/// Extract the fields of `role` from a file on disk.
pub async fn extract_file(
    path: impl AsRef<Path>,
    role: Role,
    config: &IntakeConfig,
) -> Result<Extraction, IntakeError> {
    let extractor = Extractor::from_config(config)?;
    let attachment = Attachment::from_path(path).await?;
    extractor.extract(attachment, role).await
}
