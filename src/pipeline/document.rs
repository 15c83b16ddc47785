//! Document normalisation: inbound attachment → model-ready request.
//!
//! Images are forwarded as-is (one image part + instruction). PDFs are
//! reduced to their page text, which is embedded into the instruction;
//! a PDF without any text is rejected here so no content-less request ever
//! reaches the model. Anything else is unsupported.

use crate::error::IntakeError;
use crate::fields::Role;
use crate::pipeline::pdf_text::PdfTextSource;
use crate::prompts::{image_instruction, text_instruction};
use image::ImageFormat;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Media types the vision providers accept for inline images.
const SUPPORTED_IMAGE_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/gif", "image/webp"];

const PDF_MEDIA_TYPE: &str = "application/pdf";

/// An inbound attachment as delivered by the chat transport.
#[derive(Debug, Clone)]
pub struct Attachment {
    /// Declared media type; `None` when the transport did not say.
    pub media_type: Option<String>,
    pub bytes: Vec<u8>,
    pub file_name: Option<String>,
}

impl Attachment {
    /// A chat "photo": transports re-encode these as JPEG.
    pub fn photo(bytes: Vec<u8>) -> Self {
        Self {
            media_type: Some("image/jpeg".to_string()),
            bytes,
            file_name: None,
        }
    }

    /// A file sent as a document with a declared media type.
    pub fn file(media_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            media_type: Some(media_type.into()),
            bytes,
            file_name: None,
        }
    }

    /// Read an attachment from disk, declaring its media type from the
    /// file extension.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, IntakeError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| IntakeError::UnreadableDocument {
                reason: format!("{}: {e}", path.display()),
            })?;
        let media_type = path
            .extension()
            .and_then(|e| e.to_str())
            .and_then(media_type_for_extension)
            .map(str::to_string);
        Ok(Self {
            media_type,
            bytes,
            file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
        })
    }
}

fn media_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "pdf" => Some(PDF_MEDIA_TYPE),
        _ => None,
    }
}

/// What kind of document an attachment turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentKind {
    Image { media_type: String },
    PdfText,
}

/// A classified attachment. Lives only until it is normalised.
#[derive(Debug, Clone)]
pub struct Document {
    pub kind: DocumentKind,
    pub bytes: Vec<u8>,
}

impl Document {
    /// Classify an attachment by its declared media type.
    pub fn from_attachment(attachment: Attachment) -> Result<Self, IntakeError> {
        let declared = attachment
            .media_type
            .as_deref()
            .map(canonical_media_type)
            .unwrap_or_default();

        if declared == PDF_MEDIA_TYPE {
            return Ok(Self {
                kind: DocumentKind::PdfText,
                bytes: attachment.bytes,
            });
        }

        if SUPPORTED_IMAGE_TYPES.contains(&declared.as_str()) {
            let media_type = match sniff_image_type(&attachment.bytes) {
                Some(sniffed) if sniffed != declared => {
                    warn!(
                        "Declared media type {} does not match image bytes ({}); using the latter",
                        declared, sniffed
                    );
                    sniffed.to_string()
                }
                _ => declared,
            };
            return Ok(Self {
                kind: DocumentKind::Image { media_type },
                bytes: attachment.bytes,
            });
        }

        Err(IntakeError::UnsupportedDocument {
            media_type: if declared.is_empty() {
                "unknown".to_string()
            } else {
                declared
            },
        })
    }
}

/// Lowercase, drop parameters, fold the common `image/jpg` misspelling.
fn canonical_media_type(raw: &str) -> String {
    let base = raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
    if base == "image/jpg" {
        "image/jpeg".to_string()
    } else {
        base
    }
}

/// Media type implied by the image's magic bytes, if recognisable.
fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}

/// One part of the single user message sent to the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Image { media_type: String, data: Vec<u8> },
    Text(String),
}

/// Ordered content parts for one model call: an optional image part
/// followed by exactly one instruction part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionRequest {
    parts: Vec<ContentPart>,
}

impl ExtractionRequest {
    pub fn with_image(media_type: impl Into<String>, data: Vec<u8>, instruction: String) -> Self {
        Self {
            parts: vec![
                ContentPart::Image {
                    media_type: media_type.into(),
                    data,
                },
                ContentPart::Text(instruction),
            ],
        }
    }

    pub fn text_only(instruction: String) -> Self {
        Self {
            parts: vec![ContentPart::Text(instruction)],
        }
    }

    pub fn parts(&self) -> &[ContentPart] {
        &self.parts
    }

    /// The instruction text (always the last part).
    pub fn instruction(&self) -> &str {
        match self.parts.last() {
            Some(ContentPart::Text(text)) => text,
            _ => "",
        }
    }

    /// The image part, if the request carries one.
    pub fn image(&self) -> Option<(&str, &[u8])> {
        self.parts.iter().find_map(|part| match part {
            ContentPart::Image { media_type, data } => Some((media_type.as_str(), data.as_slice())),
            ContentPart::Text(_) => None,
        })
    }
}

/// Turn a classified document into an extraction request for `role`.
///
/// PDF text extraction runs in `spawn_blocking`: pdfium is CPU-bound and not
/// async-safe.
pub async fn normalize(
    document: Document,
    role: Role,
    pdf_text: &Arc<dyn PdfTextSource>,
) -> Result<ExtractionRequest, IntakeError> {
    match document.kind {
        DocumentKind::Image { media_type } => {
            debug!("Image document: {} ({} bytes)", media_type, document.bytes.len());
            Ok(ExtractionRequest::with_image(
                media_type,
                document.bytes,
                image_instruction(role),
            ))
        }
        DocumentKind::PdfText => {
            let source = Arc::clone(pdf_text);
            let bytes = document.bytes;
            let pages = tokio::task::spawn_blocking(move || source.page_texts(&bytes))
                .await
                .map_err(|e| IntakeError::Internal(format!("PDF text task panicked: {e}")))??;

            let text = pages.join("\n");
            if text.trim().is_empty() {
                return Err(IntakeError::EmptyDocument);
            }
            debug!("PDF document: {} pages, {} chars", pages.len(), text.len());
            Ok(ExtractionRequest::text_only(text_instruction(role, &text)))
        }
    }
}
