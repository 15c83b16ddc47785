//! # docintake
//!
//! Turn a photo or PDF of a business document into the structured company
//! details of one party, let the user confirm them in a web form, and store
//! the result.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Attachment (photo / PDF)
//!  │
//!  ├─ 1. Normalise  classify media type; PDF → page text (pdfium, spawn_blocking)
//!  ├─ 2. Extract    one LLM call: image + instruction, or text + instruction
//!  ├─ 3. Reconcile  first {...} span → JSON object → alias map → 8 canonical fields
//!  ├─ 4. Handoff    fields → base64url token → confirmation-form link
//!  └─ 5. Commit     form callback → profile upsert / invoice insert
//! ```
//!
//! Steps 1–3 are available on their own through [`Extractor`] and
//! [`extract_file`]. The whole dialog, with per-user sessions, lives in
//! [`DialogEngine`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docintake::{extract_file, IntakeConfig, Role};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from ANTHROPIC_API_KEY / EDGEQUAKE_LLM_PROVIDER / …
//!     let config = IntakeConfig::default();
//!     let extraction = extract_file("invoice.jpg", Role::Sender, &config).await?;
//!     println!("{}", serde_json::to_string_pretty(&extraction.fields)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Dialog
//!
//! ```rust,no_run
//! use docintake::{DialogEngine, Event, IntakeConfig, MemorySink};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), docintake::IntakeError> {
//! let engine = DialogEngine::from_config(&IntakeConfig::default(), Arc::new(MemorySink::new()))?;
//! for reply in engine.handle(42, Event::from_text("/profile")).await {
//!     println!("{}", reply.text());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docintake` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod dialog;
pub mod error;
pub mod extract;
pub mod fields;
pub mod handoff;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod session;
pub mod sink;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IntakeConfig, IntakeConfigBuilder, DEFAULT_MODEL};
pub use dialog::DialogEngine;
pub use error::{FailureKind, IntakeError, ServiceFailure};
pub use extract::{extract_file, Extraction, Extractor};
pub use fields::{CanonicalFields, FieldKey, Role, FIELD_ALIASES};
pub use handoff::{decode_token, encode_token, HandoffEncoder, HandoffLink};
pub use pipeline::document::Attachment;
pub use pipeline::llm::{ExtractionClient, ExtractionModel, LlmModel};
pub use pipeline::pdf_text::{PdfTextSource, PdfiumText};
pub use pipeline::reconcile::reconcile;
pub use progress::{DialogProgressCallback, NoopProgressCallback, ProgressCallback};
pub use session::{Event, Flow, Intent, Reply, Session, SessionState};
pub use sink::{MemorySink, RecordSink, RestSink, SinkError, UserId};
