//! Per-user dialog state machine.
//!
//! ```text
//!             start intent                 document
//!   Idle ───────────────────▶ AwaitingDocument ─────────▶ Extracting
//!    ▲  ▲                       ▲        │ failure            │
//!    │  │                       └────────┴────────────────────┤
//!    │  │  form callback (commit, success or not)             │ success
//!    │  └──────────────────── AwaitingConfirmation ◀──────────┘
//!    │                                                   (handoff link)
//!    └── cancel, from any state
//! ```
//!
//! ## Locking
//!
//! Each session sits behind its own async mutex; the map of sessions is
//! locked only long enough to fetch or create an entry. A transition holds
//! its user's lock from start to finish, so transitions of one user are
//! linearised while different users proceed independently.
//!
//! The model call is the exception: the document transition moves the
//! session to `Extracting`, records the session version and *releases* the
//! lock before running the pipeline. When the result arrives the lock is
//! taken again and the result is applied only if the version is unchanged.
//! A cancel (or any other transition) in between bumps the version, and the
//! late result is dropped without a reply.
//!
//! Idle sessions without a flow are removed from the map once no task
//! holds them, so the map only grows with users who are mid-flow.

use crate::config::IntakeConfig;
use crate::error::{FailureKind, IntakeError};
use crate::extract::{Extraction, Extractor};
use crate::fields::{CanonicalFields, Role};
use crate::handoff::{HandoffEncoder, HandoffLink};
use crate::pipeline::document::Attachment;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use crate::session::{Event, Flow, Intent, Reply, Session, SessionState};
use crate::sink::{RecordSink, SinkError, UserId};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, info_span, warn, Instrument};

const HELP_TEXT: &str = "🤖 Invoice assistant\n\n\
/profile  – set up your company profile from one of your invoices\n\
/create   – draft an invoice from a client document\n\
/settings – fill in your profile by hand\n\
/cancel   – abort the current step\n\n\
Send a photo or a PDF when asked; you will get a link to check the data before it is saved.";

type SessionHandle = Arc<Mutex<Session>>;

/// Drives every user's dialog. Share one instance (behind `Arc`) across
/// all transport tasks.
pub struct DialogEngine {
    extractor: Extractor,
    handoff: HandoffEncoder,
    sink: Arc<dyn RecordSink>,
    progress: ProgressCallback,
    max_document_attempts: Option<u32>,
    sink_attempts: u32,
    sink_retry_backoff: Duration,
    sessions: StdMutex<HashMap<UserId, SessionHandle>>,
}

impl DialogEngine {
    pub fn new(
        extractor: Extractor,
        handoff: HandoffEncoder,
        sink: Arc<dyn RecordSink>,
        config: &IntakeConfig,
    ) -> Self {
        Self {
            extractor,
            handoff,
            sink,
            progress: Arc::new(NoopProgressCallback),
            max_document_attempts: config.max_document_attempts,
            sink_attempts: config.sink_attempts.max(1),
            sink_retry_backoff: Duration::from_millis(config.sink_retry_backoff_ms),
            sessions: StdMutex::new(HashMap::new()),
        }
    }

    /// Production wiring: provider and form URLs from `config`.
    pub fn from_config(config: &IntakeConfig, sink: Arc<dyn RecordSink>) -> Result<Self, IntakeError> {
        Ok(Self::new(
            Extractor::from_config(config)?,
            HandoffEncoder::from_config(config)?,
            sink,
            config,
        ))
    }

    pub fn with_progress(mut self, progress: ProgressCallback) -> Self {
        self.progress = progress;
        self
    }

    /// A copy of the user's session, if one exists. Idle users have none.
    pub async fn session(&self, user_id: UserId) -> Option<Session> {
        let handle = self.sessions().get(&user_id).cloned()?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    /// Current state of the user's session (`Idle` when none exists).
    pub async fn state(&self, user_id: UserId) -> SessionState {
        self.session(user_id)
            .await
            .map(|s| s.state)
            .unwrap_or_default()
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions().len()
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, HashMap<UserId, SessionHandle>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn handle_for(&self, user_id: UserId) -> SessionHandle {
        Arc::clone(
            self.sessions()
                .entry(user_id)
                .or_insert_with(|| Arc::new(Mutex::new(Session::new(user_id)))),
        )
    }

    /// Apply one inbound event to the user's session and return the replies
    /// to deliver, in order. An empty vector means the event was ignored.
    pub async fn handle(&self, user_id: UserId, event: Event) -> Vec<Reply> {
        let span = info_span!("dialog", user = user_id, event = event.label());
        let handle = self.handle_for(user_id);
        let replies = self.dispatch(&handle, user_id, event).instrument(span).await;
        self.evict_if_idle(user_id, handle);
        replies
    }

    /// Drop the user's entry when it is idle and `handle` is the only
    /// reference outside the map. Both are checked under the map lock, so no
    /// other task can pick the entry up in between.
    fn evict_if_idle(&self, user_id: UserId, handle: SessionHandle) {
        let mut sessions = self.sessions();
        let Some(entry) = sessions.get(&user_id) else {
            return;
        };
        if !Arc::ptr_eq(entry, &handle) || Arc::strong_count(&handle) != 2 {
            return;
        }
        let idle = handle
            .try_lock()
            .map(|s| s.state == SessionState::Idle && s.flow.is_none())
            .unwrap_or(false);
        if idle {
            sessions.remove(&user_id);
            debug!("Evicted idle session of {}", user_id);
        }
    }

    async fn dispatch(
        &self,
        handle: &SessionHandle,
        user_id: UserId,
        event: Event,
    ) -> Vec<Reply> {
        let mut session = handle.lock().await;
        debug!("State {} receives {}", session.state, event.label());

        match (session.state, event) {
            (_, Event::Intent(Intent::Help)) => vec![Reply::Text(HELP_TEXT.to_string())],

            (state, Event::Intent(Intent::Cancel)) => {
                session.reset();
                if state == SessionState::Idle {
                    vec![Reply::Text("Nothing to cancel.".to_string())]
                } else {
                    info!("Cancelled from {}", state);
                    vec![Reply::Text("Cancelled.".to_string())]
                }
            }

            (SessionState::Extracting, _) => vec![Reply::Text(
                "⏳ Still analysing your document. Send /cancel to abort.".to_string(),
            )],

            // The flow is fixed until a document arrives or the user cancels.
            (SessionState::AwaitingDocument, Event::Intent(intent)) => {
                debug!("Ignored {:?} while awaiting a document", intent);
                vec![Reply::Text("📎 Please send a photo or PDF, or /cancel.".to_string())]
            }

            (_, Event::Intent(Intent::StartProfileSetup)) => {
                session.restart(Flow::Profile, SessionState::AwaitingDocument);
                vec![Reply::Text(
                    "📤 Send a photo or PDF of one of YOUR invoices. \
                     I will pick out your company details (sender) and prefill your profile."
                        .to_string(),
                )]
            }

            (_, Event::Intent(Intent::StartInvoice)) => {
                session.restart(Flow::Invoice, SessionState::AwaitingDocument);
                vec![Reply::Text(
                    "📤 Send a photo or PDF of a document from your client \
                     (an order, a letter, an earlier invoice). I will pick out their details."
                        .to_string(),
                )]
            }

            (_, Event::Intent(Intent::OpenProfileForm)) => {
                session.restart(Flow::Profile, SessionState::AwaitingConfirmation);
                let fields = CanonicalFields::default();
                match self.handoff.profile_link(&fields) {
                    Ok(link) => {
                        session.pending_fields = Some(fields);
                        vec![Reply::Link {
                            text: "⚙️ Open the form to fill in your profile.".to_string(),
                            url: link.url,
                        }]
                    }
                    Err(e) => {
                        session.reset();
                        vec![failure(&e)]
                    }
                }
            }

            (SessionState::AwaitingDocument, Event::Attachment(attachment)) => {
                self.run_extraction(user_id, handle, session, attachment)
                    .await
            }

            (SessionState::AwaitingConfirmation, Event::FormSubmitted(payload)) => {
                self.commit_confirmation(user_id, &mut session, &payload)
                    .await
            }

            (SessionState::AwaitingConfirmation, Event::Attachment(_)) => vec![Reply::Text(
                "Please confirm the data in the form first, or send /cancel.".to_string(),
            )],

            (SessionState::Idle, Event::Attachment(_)) => vec![Reply::Text(
                "Choose /profile or /create first, then send the document.".to_string(),
            )],

            (SessionState::Idle, Event::FormSubmitted(_)) => {
                warn!("Form submission without a pending confirmation");
                vec![Reply::Text(
                    "There is nothing waiting for confirmation. Start again with /profile or /create."
                        .to_string(),
                )]
            }

            // Free text, and form data outside the confirmation step, is ignored.
            (_, Event::Text(_)) | (SessionState::AwaitingDocument, Event::FormSubmitted(_)) => {
                debug!("Ignored in state {}", session.state);
                Vec::new()
            }
        }
    }

    async fn run_extraction(
        &self,
        user_id: UserId,
        handle: &SessionHandle,
        mut session: MutexGuard<'_, Session>,
        attachment: Attachment,
    ) -> Vec<Reply> {
        let flow = session.flow.unwrap_or(Flow::Profile);
        let role = flow.role();
        session.transition(SessionState::Extracting);
        let ticket = session.version;
        drop(session);

        self.progress.on_extraction_start(user_id, role);
        let result = self.extractor.extract(attachment, role).await;

        let mut session = handle.lock().await;
        if session.version != ticket || session.state != SessionState::Extracting {
            warn!(
                "Dropping stale extraction result (session now {} v{}, expected v{})",
                session.state, session.version, ticket
            );
            self.progress.on_stale_result(user_id);
            return Vec::new();
        }

        let outcome = result.and_then(|extraction| {
            let link = self.link_for(flow, &extraction.fields)?;
            Ok((extraction, link))
        });

        match outcome {
            Ok((extraction, link)) => {
                self.progress
                    .on_extraction_complete(user_id, extraction.fields.filled());
                let reply = Reply::Link {
                    text: summary(flow, &extraction),
                    url: link.url,
                };
                session.pending_fields = Some(extraction.fields);
                session.transition(SessionState::AwaitingConfirmation);
                info!("Extraction applied; awaiting confirmation");
                vec![reply]
            }
            Err(e) => {
                self.progress.on_extraction_failed(user_id, e.kind());
                session.failed_attempts += 1;
                let mut replies = vec![failure(&e)];

                match self.max_document_attempts {
                    Some(cap) if session.failed_attempts >= cap => {
                        warn!("Document attempts exhausted ({})", cap);
                        session.reset();
                        replies.push(Reply::Failure {
                            kind: FailureKind::AttemptsExhausted,
                            text: format!(
                                "❌ {}: {} documents could not be processed. Start again when ready.",
                                FailureKind::AttemptsExhausted,
                                cap
                            ),
                        });
                    }
                    _ => {
                        session.transition(SessionState::AwaitingDocument);
                        replies.push(Reply::Text(
                            "You can send another photo or PDF, or /cancel.".to_string(),
                        ));
                    }
                }
                replies
            }
        }
    }

    fn link_for(&self, flow: Flow, fields: &CanonicalFields) -> Result<HandoffLink, IntakeError> {
        match flow {
            Flow::Profile => self.handoff.profile_link(fields),
            Flow::Invoice => self.handoff.invoice_link(fields, Role::Client),
        }
    }

    async fn commit_confirmation(
        &self,
        user_id: UserId,
        session: &mut Session,
        payload: &str,
    ) -> Vec<Reply> {
        let flow = session.flow.unwrap_or(Flow::Profile);
        let object = match decode_confirmation(payload) {
            Ok(object) => object,
            Err(e) => {
                warn!("Confirmation rejected: {}", e);
                session.reset();
                return vec![failure(&e)];
            }
        };

        let result = match flow {
            Flow::Profile => {
                let fields = CanonicalFields::from_object(&object);
                self.commit_with_retry(|| self.sink.upsert_profile(user_id, &fields))
                    .await
            }
            Flow::Invoice => {
                self.commit_with_retry(|| self.sink.insert_invoice(user_id, &object))
                    .await
            }
        };
        session.reset();

        match (result, flow) {
            (Ok(()), Flow::Profile) => vec![Reply::Text("🎉 Profile saved.".to_string())],
            (Ok(()), Flow::Invoice) => vec![Reply::Text("🎉 Invoice draft saved.".to_string())],
            (Err(e), _) => vec![failure(&e)],
        }
    }

    /// Run `op` up to `sink_attempts` times.
    async fn commit_with_retry<F, Fut>(&self, mut op: F) -> Result<(), IntakeError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), SinkError>>,
    {
        let mut last_err: Option<SinkError> = None;
        for attempt in 1..=self.sink_attempts {
            if attempt > 1 {
                warn!(
                    "Commit retry {}/{} after {:?}",
                    attempt, self.sink_attempts, self.sink_retry_backoff
                );
                tokio::time::sleep(self.sink_retry_backoff).await;
            }
            match op().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!("Commit attempt {} failed: {}", attempt, e);
                    last_err = Some(e);
                }
            }
        }
        Err(IntakeError::SinkWrite {
            attempts: self.sink_attempts,
            detail: last_err
                .map(|e| e.message)
                .unwrap_or_else(|| "unknown error".to_string()),
        })
    }
}

/// Parse the form callback; it must be a JSON object.
pub fn decode_confirmation(payload: &str) -> Result<Map<String, Value>, IntakeError> {
    match serde_json::from_str::<Value>(payload) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(IntakeError::ConfirmationDecode {
            detail: "expected a JSON object".to_string(),
        }),
        Err(e) => Err(IntakeError::ConfirmationDecode {
            detail: e.to_string(),
        }),
    }
}

fn failure(e: &IntakeError) -> Reply {
    Reply::Failure {
        kind: e.kind(),
        text: e.user_message(),
    }
}

fn summary(flow: Flow, extraction: &Extraction) -> String {
    let name = extraction
        .fields
        .company_name
        .as_deref()
        .unwrap_or("unknown company");
    let missing = extraction.fields.missing();
    let mut text = match flow {
        Flow::Profile => format!("✅ Data extracted for: {name}"),
        Flow::Invoice => format!("✅ Client found: {name}"),
    };
    if !missing.is_empty() {
        let keys: Vec<&str> = missing.iter().map(|k| k.as_str()).collect();
        text.push_str(&format!("\nNot found: {}", keys.join(", ")));
    }
    text.push_str("\nPlease check the data in the form and confirm.");
    text
}
