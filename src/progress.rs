//! Progress-callback trait for dialog events.
//!
//! Inject an [`Arc<dyn DialogProgressCallback>`] via
//! [`crate::dialog::DialogEngine::with_progress`] to learn when an
//! extraction starts and ends for a user. Transports use it to show an
//! "analysing…" notice while the model runs; the final result still arrives
//! as the return value of [`crate::dialog::DialogEngine::handle`].
//!
//! # Example
//!
//! ```rust
//! use docintake::{DialogProgressCallback, Role, UserId};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     started: AtomicUsize,
//! }
//!
//! impl DialogProgressCallback for CountingCallback {
//!     fn on_extraction_start(&self, user_id: UserId, role: Role) {
//!         self.started.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("user {user_id}: reading {role} data…");
//!     }
//! }
//!
//! let cb: Arc<dyn DialogProgressCallback> = Arc::new(CountingCallback {
//!     started: AtomicUsize::new(0),
//! });
//! ```

use crate::error::FailureKind;
use crate::fields::Role;
use crate::sink::UserId;
use std::sync::Arc;

/// Called by the dialog engine around each extraction.
///
/// Callbacks for different users may run concurrently. All methods default
/// to no-ops.
pub trait DialogProgressCallback: Send + Sync {
    /// A document was accepted and the pipeline is starting.
    fn on_extraction_start(&self, user_id: UserId, role: Role) {
        let _ = (user_id, role);
    }

    /// The pipeline finished and its result was applied.
    ///
    /// * `filled`: number of canonical fields that received a value
    fn on_extraction_complete(&self, user_id: UserId, filled: usize) {
        let _ = (user_id, filled);
    }

    /// The pipeline failed and the failure was reported to the user.
    fn on_extraction_failed(&self, user_id: UserId, kind: FailureKind) {
        let _ = (user_id, kind);
    }

    /// The session moved on (e.g. cancel) while the pipeline ran; its
    /// result was dropped without a reply.
    fn on_stale_result(&self, user_id: UserId) {
        let _ = user_id;
    }
}

/// A no-op implementation used when no callback is configured.
pub struct NoopProgressCallback;

impl DialogProgressCallback for NoopProgressCallback {}

/// Convenience alias for a shared callback.
pub type ProgressCallback = Arc<dyn DialogProgressCallback>;
