//! Dialog integration tests.
//!
//! Every test drives a [`DialogEngine`] through its public `handle` entry
//! point with scripted models, PDF text sources and record stores, so no
//! network access or pdfium library is needed.

use async_trait::async_trait;
use docintake::handoff::{decode_token_value, token_from_url};
use docintake::pipeline::document::ExtractionRequest;
use docintake::{
    decode_token, Attachment, CanonicalFields, DialogEngine, DialogProgressCallback, Event,
    ExtractionModel, Extractor, FailureKind, Flow, HandoffEncoder, IntakeConfig, IntakeError,
    PdfTextSource, RecordSink, Reply, Role, SessionState, SinkError, UserId,
};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

const USER: UserId = 1;

const ACME_REPLY: &str = r#"Sure! Here is the data:
{"company_name": "Acme GmbH", "zip": "10115", "city": "Berlin", "iban": null}
Let me know if you need more."#;

// ── Test doubles ─────────────────────────────────────────────────────────────

/// Replies with the same text to every call.
struct Scripted {
    reply: String,
    calls: AtomicUsize,
}

impl Scripted {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ExtractionModel for Scripted {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _: &ExtractionRequest, _: usize) -> Result<String, IntakeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

/// Never answers within any sensible ceiling.
struct Stalled;

#[async_trait]
impl ExtractionModel for Stalled {
    fn model_id(&self) -> &str {
        "stalled"
    }

    async fn complete(&self, _: &ExtractionRequest, _: usize) -> Result<String, IntakeError> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(ACME_REPLY.to_string())
    }
}

/// Fails inside the pipeline with an unexpected error.
struct Broken;

#[async_trait]
impl ExtractionModel for Broken {
    fn model_id(&self) -> &str {
        "broken"
    }

    async fn complete(&self, _: &ExtractionRequest, _: usize) -> Result<String, IntakeError> {
        Err(IntakeError::Internal("worker panicked".into()))
    }
}

/// Signals `started`, then blocks until `release` is notified.
struct Gated {
    reply: String,
    started: Notify,
    release: Notify,
}

impl Gated {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            started: Notify::new(),
            release: Notify::new(),
        })
    }
}

#[async_trait]
impl ExtractionModel for Gated {
    fn model_id(&self) -> &str {
        "gated"
    }

    async fn complete(&self, _: &ExtractionRequest, _: usize) -> Result<String, IntakeError> {
        self.started.notify_one();
        self.release.notified().await;
        Ok(self.reply.clone())
    }
}

struct Pages(Vec<&'static str>);

impl PdfTextSource for Pages {
    fn page_texts(&self, _: &[u8]) -> Result<Vec<String>, IntakeError> {
        Ok(self.0.iter().map(|s| s.to_string()).collect())
    }
}

/// Records writes; the first `failures` calls fail.
#[derive(Default)]
struct RecordingSink {
    failures: AtomicU32,
    calls: AtomicUsize,
    profiles: Mutex<Vec<(UserId, CanonicalFields)>>,
    invoices: Mutex<Vec<(UserId, Map<String, Value>)>>,
}

impl RecordingSink {
    fn failing(times: u32) -> Arc<Self> {
        Arc::new(Self {
            failures: AtomicU32::new(times),
            ..Default::default()
        })
    }

    fn fail_now(&self) -> Result<(), SinkError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(SinkError::new("HTTP 503: unavailable"));
        }
        Ok(())
    }

    fn profiles(&self) -> Vec<(UserId, CanonicalFields)> {
        self.profiles.lock().unwrap().clone()
    }

    fn invoices(&self) -> Vec<(UserId, Map<String, Value>)> {
        self.invoices.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecordSink for RecordingSink {
    async fn upsert_profile(
        &self,
        user_id: UserId,
        fields: &CanonicalFields,
    ) -> Result<(), SinkError> {
        self.fail_now()?;
        self.profiles.lock().unwrap().push((user_id, fields.clone()));
        Ok(())
    }

    async fn insert_invoice(
        &self,
        user_id: UserId,
        invoice: &Map<String, Value>,
    ) -> Result<(), SinkError> {
        self.fail_now()?;
        self.invoices.lock().unwrap().push((user_id, invoice.clone()));
        Ok(())
    }
}

#[derive(Default)]
struct CountingProgress {
    started: AtomicUsize,
    stale: AtomicUsize,
}

impl DialogProgressCallback for CountingProgress {
    fn on_extraction_start(&self, _: UserId, _: Role) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_stale_result(&self, _: UserId) {
        self.stale.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn config() -> IntakeConfig {
    IntakeConfig::builder()
        .sink_retry_backoff_ms(0)
        .profile_form_url("https://forms.example.com/settings.html")
        .invoice_form_url("https://forms.example.com/create_invoice.html")
        .build()
        .unwrap()
}

fn engine_with(
    model: Arc<dyn ExtractionModel>,
    pages: Vec<&'static str>,
    sink: Arc<dyn RecordSink>,
    config: &IntakeConfig,
) -> DialogEngine {
    let extractor = Extractor::with_model(model, Arc::new(Pages(pages)), config);
    let handoff = HandoffEncoder::from_config(config).unwrap();
    DialogEngine::new(extractor, handoff, sink, config)
}

fn engine(model: Arc<dyn ExtractionModel>, sink: Arc<dyn RecordSink>) -> DialogEngine {
    engine_with(model, vec![], sink, &config())
}

fn photo() -> Event {
    Event::Attachment(Attachment::photo(b"camera bytes".to_vec()))
}

fn single_link(replies: &[Reply]) -> String {
    match replies {
        [Reply::Link { url, .. }] => url.clone(),
        other => panic!("expected one link reply, got {other:?}"),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn photo_yields_prefilled_profile_link() {
    let sink = Arc::new(RecordingSink::default());
    let engine = engine(Scripted::new(ACME_REPLY), sink.clone());

    let replies = engine.handle(USER, Event::from_text("/profile")).await;
    assert_eq!(replies.len(), 1);
    assert_eq!(engine.state(USER).await, SessionState::AwaitingDocument);

    let replies = engine.handle(USER, photo()).await;
    let url = single_link(&replies);
    assert!(url.starts_with("https://forms.example.com/settings.html?data="));
    assert!(replies[0].text().contains("Acme GmbH"));

    let fields = decode_token(&token_from_url(&url).unwrap()).unwrap();
    assert_eq!(fields.company_name.as_deref(), Some("Acme GmbH"));
    assert_eq!(fields.postal_code.as_deref(), Some("10115"));
    assert_eq!(fields.city.as_deref(), Some("Berlin"));
    assert_eq!(fields.filled(), 3);

    let session = engine.session(USER).await.unwrap();
    assert_eq!(session.state, SessionState::AwaitingConfirmation);
    assert_eq!(session.pending_fields, Some(fields));
    assert!(sink.profiles().is_empty());
}

#[tokio::test]
async fn whitespace_pdf_is_empty_document() {
    let model = Scripted::new(ACME_REPLY);
    let engine = engine_with(
        model.clone(),
        vec!["   ", "\n\t"],
        Arc::new(RecordingSink::default()),
        &config(),
    );

    engine.handle(USER, Event::from_text("/profile")).await;
    let replies = engine
        .handle(
            USER,
            Event::Attachment(Attachment::file("application/pdf", b"%PDF-1.7".to_vec())),
        )
        .await;

    assert_eq!(replies[0].failure_kind(), Some(FailureKind::EmptyDocument));
    assert!(replies[0].text().contains("EmptyDocumentError"));
    assert_eq!(engine.state(USER).await, SessionState::AwaitingDocument);
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn pdf_text_reaches_the_model() {
    let model = Scripted::new(r#"{"company": "Text AG"}"#);
    let engine = engine_with(
        model.clone(),
        vec!["Text AG", "Seite 2"],
        Arc::new(RecordingSink::default()),
        &config(),
    );

    engine.handle(USER, Event::from_text("/profile")).await;
    let replies = engine
        .handle(
            USER,
            Event::Attachment(Attachment::file("application/pdf", b"%PDF-1.7".to_vec())),
        )
        .await;

    let fields = decode_token(&token_from_url(&single_link(&replies)).unwrap()).unwrap();
    assert_eq!(fields.company_name.as_deref(), Some("Text AG"));
    assert_eq!(model.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unsupported_attachment_keeps_waiting() {
    let engine = engine(Scripted::new(ACME_REPLY), Arc::new(RecordingSink::default()));

    engine.handle(USER, Event::from_text("/profile")).await;
    let replies = engine
        .handle(
            USER,
            Event::Attachment(Attachment::file("application/zip", vec![0x50, 0x4b])),
        )
        .await;

    assert_eq!(
        replies[0].failure_kind(),
        Some(FailureKind::UnsupportedDocument)
    );
    assert_eq!(engine.state(USER).await, SessionState::AwaitingDocument);
}

#[tokio::test]
async fn free_text_while_awaiting_document_is_ignored() {
    let sink = Arc::new(RecordingSink::default());
    let model = Scripted::new(ACME_REPLY);
    let engine = engine(model.clone(), sink.clone());

    engine.handle(USER, Event::from_text("/profile")).await;
    let replies = engine.handle(USER, Event::from_text("hello?")).await;

    assert!(replies.is_empty());
    assert_eq!(engine.state(USER).await, SessionState::AwaitingDocument);
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancel_during_extraction_discards_result() {
    let model = Gated::new(ACME_REPLY);
    let progress = Arc::new(CountingProgress::default());
    let sink = Arc::new(RecordingSink::default());
    let engine = Arc::new(engine(model.clone(), sink.clone()).with_progress(progress.clone()));

    engine.handle(USER, Event::from_text("/profile")).await;
    let pending = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.handle(USER, photo()).await })
    };
    model.started.notified().await;
    assert_eq!(engine.state(USER).await, SessionState::Extracting);

    let replies = engine.handle(USER, Event::from_text("/cancel")).await;
    assert_eq!(replies, vec![Reply::Text("Cancelled.".to_string())]);
    assert_eq!(engine.state(USER).await, SessionState::Idle);

    model.release.notify_one();
    let late = pending.await.unwrap();
    assert!(late.is_empty(), "late result must not reply: {late:?}");

    assert_eq!(engine.state(USER).await, SessionState::Idle);
    assert!(engine.session(USER).await.is_none());
    assert_eq!(progress.started.load(Ordering::SeqCst), 1);
    assert_eq!(progress.stale.load(Ordering::SeqCst), 1);
    assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn messages_during_extraction_get_busy_notice() {
    let model = Gated::new(ACME_REPLY);
    let engine = Arc::new(engine(model.clone(), Arc::new(RecordingSink::default())));

    engine.handle(USER, Event::from_text("/profile")).await;
    let pending = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.handle(USER, photo()).await })
    };
    model.started.notified().await;

    let replies = engine.handle(USER, Event::from_text("/create")).await;
    assert!(replies[0].text().contains("Still analysing"));
    let replies = engine.handle(USER, photo()).await;
    assert!(replies[0].text().contains("Still analysing"));
    assert_eq!(engine.state(USER).await, SessionState::Extracting);

    model.release.notify_one();
    let replies = pending.await.unwrap();
    single_link(&replies);
    assert_eq!(engine.state(USER).await, SessionState::AwaitingConfirmation);
}

#[tokio::test]
async fn other_users_are_not_blocked_by_an_extraction() {
    let model = Gated::new(ACME_REPLY);
    let engine = Arc::new(engine(model.clone(), Arc::new(RecordingSink::default())));

    engine.handle(USER, Event::from_text("/profile")).await;
    let pending = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.handle(USER, photo()).await })
    };
    model.started.notified().await;

    let replies = tokio::time::timeout(
        Duration::from_secs(1),
        engine.handle(2, Event::from_text("/create")),
    )
    .await
    .expect("second user blocked");
    assert_eq!(replies.len(), 1);
    assert_eq!(engine.state(2).await, SessionState::AwaitingDocument);
    assert_eq!(engine.active_sessions(), 2);

    model.release.notify_one();
    single_link(&pending.await.unwrap());
}

#[tokio::test]
async fn confirmed_profile_is_upserted_once() {
    let sink = Arc::new(RecordingSink::default());
    let engine = engine(Scripted::new(ACME_REPLY), sink.clone());

    engine.handle(USER, Event::from_text("/profile")).await;
    engine.handle(USER, photo()).await;

    let form = json!({"company_name": "Acme GmbH", "city": "Berlin", "street": ""});
    let replies = engine
        .handle(USER, Event::FormSubmitted(form.to_string()))
        .await;
    assert_eq!(replies.len(), 1);
    assert!(replies[0].text().contains("saved"));

    let profiles = sink.profiles();
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0].0, USER);
    assert_eq!(profiles[0].1.filled(), 2);
    assert_eq!(sink.calls.load(Ordering::SeqCst), 1);

    assert_eq!(engine.state(USER).await, SessionState::Idle);
    assert!(engine.session(USER).await.is_none());
}

#[tokio::test]
async fn malformed_confirmation_returns_to_idle() {
    let sink = Arc::new(RecordingSink::default());
    let engine = engine(Scripted::new(ACME_REPLY), sink.clone());

    engine.handle(USER, Event::from_text("/profile")).await;
    engine.handle(USER, photo()).await;
    let replies = engine
        .handle(USER, Event::FormSubmitted("{not json".to_string()))
        .await;

    assert_eq!(
        replies[0].failure_kind(),
        Some(FailureKind::ConfirmationDecode)
    );
    assert_eq!(engine.state(USER).await, SessionState::Idle);
    assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn sink_failure_is_retried_once() {
    let sink = RecordingSink::failing(1);
    let engine = engine(Scripted::new(ACME_REPLY), sink.clone());

    engine.handle(USER, Event::from_text("/profile")).await;
    engine.handle(USER, photo()).await;
    let replies = engine
        .handle(USER, Event::FormSubmitted(r#"{"company_name": "Acme"}"#.into()))
        .await;

    assert!(replies[0].failure_kind().is_none(), "got {replies:?}");
    assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    assert_eq!(sink.profiles().len(), 1);
    assert_eq!(engine.state(USER).await, SessionState::Idle);
}

#[tokio::test]
async fn persistent_sink_failure_is_reported() {
    let sink = RecordingSink::failing(5);
    let engine = engine(Scripted::new(ACME_REPLY), sink.clone());

    engine.handle(USER, Event::from_text("/profile")).await;
    engine.handle(USER, photo()).await;
    let replies = engine
        .handle(USER, Event::FormSubmitted(r#"{"company_name": "Acme"}"#.into()))
        .await;

    assert_eq!(replies[0].failure_kind(), Some(FailureKind::SinkWrite));
    assert!(replies[0].text().contains("HTTP 503"));
    assert_eq!(sink.calls.load(Ordering::SeqCst), 2);
    assert!(sink.profiles().is_empty());
    assert_eq!(engine.state(USER).await, SessionState::Idle);
}

#[tokio::test]
async fn attempt_cap_ends_the_flow() {
    let config = IntakeConfig::builder()
        .max_document_attempts(2)
        .build()
        .unwrap();
    let engine = engine_with(
        Scripted::new("I could not read this document."),
        vec![],
        Arc::new(RecordingSink::default()),
        &config,
    );

    engine.handle(USER, Event::from_text("/profile")).await;

    let replies = engine.handle(USER, photo()).await;
    assert_eq!(replies[0].failure_kind(), Some(FailureKind::NoStructuredData));
    assert_eq!(replies.len(), 2);
    assert_eq!(engine.state(USER).await, SessionState::AwaitingDocument);

    let replies = engine.handle(USER, photo()).await;
    assert_eq!(replies[0].failure_kind(), Some(FailureKind::NoStructuredData));
    assert_eq!(
        replies.last().and_then(Reply::failure_kind),
        Some(FailureKind::AttemptsExhausted)
    );
    assert_eq!(engine.state(USER).await, SessionState::Idle);
}

#[tokio::test]
async fn unlimited_attempts_by_default() {
    let engine = engine(
        Scripted::new("[1, 2, 3] is all I found"),
        Arc::new(RecordingSink::default()),
    );

    engine.handle(USER, Event::from_text("/profile")).await;
    for _ in 0..5 {
        let replies = engine.handle(USER, photo()).await;
        assert!(replies[0].failure_kind().is_some());
        assert_eq!(engine.state(USER).await, SessionState::AwaitingDocument);
    }
}

#[tokio::test]
async fn invoice_flow_inserts_client_record() {
    let sink = Arc::new(RecordingSink::default());
    let reply = r#"{"company": "Beta AG", "address": "Ring 1", "plz": 20095, "city": "Hamburg"}"#;
    let engine = engine(Scripted::new(reply), sink.clone());

    engine.handle(USER, Event::from_text("📝 Rechnung erstellen")).await;
    let replies = engine.handle(USER, photo()).await;
    let url = single_link(&replies);
    assert!(url.starts_with("https://forms.example.com/create_invoice.html?data="));

    let view = decode_token_value(&token_from_url(&url).unwrap()).unwrap();
    assert_eq!(view["client_name"], "Beta AG");
    assert_eq!(view["client_address"], "Ring 1, 20095 Hamburg");
    assert_eq!(view["client_iban"], Value::Null);

    let form = json!({"client_name": "Beta AG", "amount": "120.00"});
    let replies = engine
        .handle(USER, Event::FormSubmitted(form.to_string()))
        .await;
    assert!(replies[0].failure_kind().is_none());

    let invoices = sink.invoices();
    assert_eq!(invoices.len(), 1);
    assert_eq!(invoices[0].1["amount"], "120.00");
    assert!(sink.profiles().is_empty());
    assert_eq!(engine.state(USER).await, SessionState::Idle);
}

#[tokio::test]
async fn settings_opens_empty_profile_form() {
    let sink = Arc::new(RecordingSink::default());
    let model = Scripted::new(ACME_REPLY);
    let engine = engine(model.clone(), sink.clone());

    let replies = engine.handle(USER, Event::from_text("/settings")).await;
    let fields = decode_token(&token_from_url(&single_link(&replies)).unwrap()).unwrap();
    assert!(fields.is_empty());
    assert_eq!(engine.state(USER).await, SessionState::AwaitingConfirmation);

    engine
        .handle(USER, Event::FormSubmitted(r#"{"iban": "DE89 3704"}"#.into()))
        .await;
    assert_eq!(sink.profiles()[0].1.iban.as_deref(), Some("DE89 3704"));
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn form_without_pending_confirmation_writes_nothing() {
    let sink = Arc::new(RecordingSink::default());
    let engine = engine(Scripted::new(ACME_REPLY), sink.clone());

    let replies = engine
        .handle(USER, Event::FormSubmitted(r#"{"company_name": "X"}"#.into()))
        .await;
    assert_eq!(replies.len(), 1);
    assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    assert_eq!(engine.state(USER).await, SessionState::Idle);
}

#[tokio::test]
async fn restart_replaces_pending_flow() {
    let engine = engine(Scripted::new(ACME_REPLY), Arc::new(RecordingSink::default()));

    engine.handle(USER, Event::from_text("/profile")).await;
    engine.handle(USER, photo()).await;
    engine.handle(USER, Event::from_text("/create")).await;

    let session = engine.session(USER).await.unwrap();
    assert_eq!(session.state, SessionState::AwaitingDocument);
    assert_eq!(session.flow, Some(Flow::Invoice));
    assert!(session.pending_fields.is_none());
}

#[tokio::test]
async fn help_and_cancel_work_everywhere() {
    let engine = engine(Scripted::new(ACME_REPLY), Arc::new(RecordingSink::default()));

    let replies = engine.handle(USER, Event::from_text("/help")).await;
    assert!(replies[0].text().contains("/profile"));
    let replies = engine.handle(USER, Event::from_text("/cancel")).await;
    assert_eq!(replies[0].text(), "Nothing to cancel.");

    engine.handle(USER, Event::from_text("/profile")).await;
    engine.handle(USER, photo()).await;
    let replies = engine.handle(USER, Event::from_text("🔙 Abbrechen")).await;
    assert_eq!(replies[0].text(), "Cancelled.");
    assert_eq!(engine.state(USER).await, SessionState::Idle);
}

#[tokio::test]
async fn start_intents_while_awaiting_document_keep_the_flow() {
    let sink = Arc::new(RecordingSink::default());
    let model = Scripted::new(ACME_REPLY);
    let engine = engine(model.clone(), sink.clone());

    engine.handle(USER, Event::from_text("/profile")).await;
    let version = engine.session(USER).await.unwrap().version;

    for command in ["/settings", "/create", "/profile", "📝 Rechnung erstellen"] {
        let replies = engine.handle(USER, Event::from_text(command)).await;
        assert!(
            replies.iter().all(|r| matches!(r, Reply::Text(_))),
            "{command}: {replies:?}"
        );
        let session = engine.session(USER).await.unwrap();
        assert_eq!(session.state, SessionState::AwaitingDocument, "{command}");
        assert_eq!(session.flow, Some(Flow::Profile), "{command}");
        assert_eq!(session.version, version, "{command}");
    }

    let replies = engine
        .handle(USER, Event::FormSubmitted(r#"{"company_name": "X"}"#.into()))
        .await;
    assert!(replies.is_empty());
    assert_eq!(sink.calls.load(Ordering::SeqCst), 0);
    assert_eq!(model.calls.load(Ordering::SeqCst), 0);

    // The flow still accepts its document afterwards.
    single_link(&engine.handle(USER, photo()).await);
}

#[tokio::test]
async fn model_timeout_returns_to_document_step() {
    let config = IntakeConfig::builder().api_timeout_secs(1).build().unwrap();
    let engine = engine_with(
        Arc::new(Stalled),
        vec![],
        Arc::new(RecordingSink::default()),
        &config,
    );

    engine.handle(USER, Event::from_text("/profile")).await;
    let replies = engine.handle(USER, photo()).await;

    assert_eq!(
        replies[0].failure_kind(),
        Some(FailureKind::ExtractionService)
    );
    assert!(replies[0].text().contains("timeout after 1s"), "{replies:?}");
    assert_eq!(engine.state(USER).await, SessionState::AwaitingDocument);
}

#[tokio::test]
async fn internal_pipeline_failure_keeps_awaiting_document() {
    let engine = engine(Arc::new(Broken), Arc::new(RecordingSink::default()));

    engine.handle(USER, Event::from_text("/create")).await;
    let replies = engine.handle(USER, photo()).await;

    assert_eq!(replies[0].failure_kind(), Some(FailureKind::Internal));
    let session = engine.session(USER).await.unwrap();
    assert_eq!(session.state, SessionState::AwaitingDocument);
    assert_eq!(session.flow, Some(Flow::Invoice));
    assert_eq!(session.failed_attempts, 1);
}

#[tokio::test]
async fn idle_sessions_are_evicted() {
    let engine = engine(Scripted::new(ACME_REPLY), Arc::new(RecordingSink::default()));

    engine.handle(USER, Event::from_text("/help")).await;
    engine.handle(2, Event::from_text("good morning")).await;
    assert_eq!(engine.active_sessions(), 0);

    engine.handle(USER, Event::from_text("/profile")).await;
    assert_eq!(engine.active_sessions(), 1);

    engine.handle(USER, Event::from_text("/cancel")).await;
    assert_eq!(engine.active_sessions(), 0);
    assert_eq!(engine.state(USER).await, SessionState::Idle);

    // A fresh session starts cleanly after eviction.
    engine.handle(USER, Event::from_text("/profile")).await;
    assert_eq!(engine.state(USER).await, SessionState::AwaitingDocument);
}
