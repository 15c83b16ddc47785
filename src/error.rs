//! Error types for the docintake library.
//!
//! Every failure the intake flow can hit is one variant of [`IntakeError`].
//! The dialog never swallows one: each is turned into a user-visible reply
//! carrying its [`FailureKind`], so the user always learns *which* condition
//! stopped the flow.
//!
//! Failures fall into three families that the dialog treats differently:
//!
//! * **Document step**: unsupported/unreadable/empty documents, model
//!   service failures and reconciliation failures. The session stays in
//!   `AwaitingDocument` and the user may resubmit.
//! * **Confirmation step**: the form callback could not be decoded, or the
//!   store rejected the write after the automatic resend. The session returns
//!   to `Idle`.
//! * **Setup**: bad configuration or no model provider. Returned from
//!   constructors, never produced mid-dialog.

use std::fmt;
use thiserror::Error;

/// All errors returned by the docintake library.
#[derive(Debug, Error)]
pub enum IntakeError {
    // ── Document errors ───────────────────────────────────────────────────
    /// The attachment is neither a supported image nor a PDF.
    #[error("Unsupported document type '{media_type}'. Send a photo (JPEG/PNG/WebP/GIF) or a PDF.")]
    UnsupportedDocument { media_type: String },

    /// The attachment claims to be a PDF but could not be opened.
    #[error("The PDF could not be read: {reason}")]
    UnreadableDocument { reason: String },

    /// PDF text extraction produced nothing but whitespace.
    #[error("The PDF contains no extractable text. Scanned PDFs must be sent as a photo.")]
    EmptyDocument,

    // ── Model errors ──────────────────────────────────────────────────────
    /// The external model call failed or exceeded the time ceiling.
    #[error("Extraction service error: {failure}")]
    ExtractionService { failure: ServiceFailure },

    // ── Reconciliation errors ─────────────────────────────────────────────
    /// The model reply contained no `{...}` span at all.
    #[error("The model reply contained no structured data")]
    NoStructuredData,

    /// A `{...}` span was found but is not valid JSON.
    #[error("The model reply contained malformed JSON: {detail}")]
    MalformedJson { detail: String },

    // ── Confirmation errors ───────────────────────────────────────────────
    /// The confirmation form returned a payload that is not a JSON object.
    #[error("Confirmed data could not be decoded: {detail}")]
    ConfirmationDecode { detail: String },

    /// The store rejected the commit on every attempt.
    #[error("Saving failed after {attempts} attempt(s): {detail}")]
    SinkWrite { attempts: u32, detail: String },

    // ── Setup errors ──────────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Why an extraction service call failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceFailure {
    /// The call did not complete within the configured ceiling.
    Timeout { secs: u64 },
    /// Transport or provider error, with the provider's status/message.
    Provider { message: String },
}

impl fmt::Display for ServiceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceFailure::Timeout { secs } => write!(f, "timeout after {secs}s"),
            ServiceFailure::Provider { message } => f.write_str(message),
        }
    }
}

/// Taxonomy name of a failure, as shown to users and written to logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum FailureKind {
    UnsupportedDocument,
    EmptyDocument,
    ExtractionService,
    NoStructuredData,
    MalformedJson,
    ConfirmationDecode,
    SinkWrite,
    /// Too many failed document attempts in one flow.
    AttemptsExhausted,
    Internal,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::UnsupportedDocument => "UnsupportedDocumentError",
            FailureKind::EmptyDocument => "EmptyDocumentError",
            FailureKind::ExtractionService => "ExtractionServiceError",
            FailureKind::NoStructuredData => "NoStructuredDataError",
            FailureKind::MalformedJson => "MalformedJsonError",
            FailureKind::ConfirmationDecode => "ConfirmationDecodeError",
            FailureKind::SinkWrite => "SinkWriteError",
            FailureKind::AttemptsExhausted => "AttemptsExhaustedError",
            FailureKind::Internal => "InternalError",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl IntakeError {
    /// Wrap a provider/transport error message.
    pub fn provider(message: impl Into<String>) -> Self {
        IntakeError::ExtractionService {
            failure: ServiceFailure::Provider {
                message: message.into(),
            },
        }
    }

    /// The model call exceeded its ceiling.
    pub fn timeout(secs: u64) -> Self {
        IntakeError::ExtractionService {
            failure: ServiceFailure::Timeout { secs },
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            IntakeError::UnsupportedDocument { .. } | IntakeError::UnreadableDocument { .. } => {
                FailureKind::UnsupportedDocument
            }
            IntakeError::EmptyDocument => FailureKind::EmptyDocument,
            IntakeError::ExtractionService { .. } => FailureKind::ExtractionService,
            IntakeError::NoStructuredData => FailureKind::NoStructuredData,
            IntakeError::MalformedJson { .. } => FailureKind::MalformedJson,
            IntakeError::ConfirmationDecode { .. } => FailureKind::ConfirmationDecode,
            IntakeError::SinkWrite { .. } => FailureKind::SinkWrite,
            IntakeError::ProviderNotConfigured { .. }
            | IntakeError::InvalidConfig(_)
            | IntakeError::Internal(_) => FailureKind::Internal,
        }
    }

    /// One-line message for the chat user, always naming the failure kind.
    pub fn user_message(&self) -> String {
        format!("❌ {}: {}", self.kind(), self)
    }
}
