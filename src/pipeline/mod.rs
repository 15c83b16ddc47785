//! Pipeline stages for document intake.
//!
//! Each submodule implements exactly one transformation step, so each is
//! testable on its own and the model or PDF backend can be swapped without
//! touching the others.
//!
//! ## Data Flow
//!
//! ```text
//! attachment ──▶ document ──▶ llm ──▶ reconcile
//!                (normalise)  (VLM)   (JSON → canonical fields)
//! ```
//!
//! 1. [`document`] : classify the attachment and build the model request;
//!    PDFs go through [`pdf_text`] first
//! 2. [`llm`]      : one bounded model call; the only stage with network I/O
//! 3. [`reconcile`]: find the JSON object in the reply and map aliases onto
//!    the canonical schema

pub mod document;
pub mod llm;
pub mod pdf_text;
pub mod reconcile;
