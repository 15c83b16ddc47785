//! Per-user dialog state and the vocabulary of the dialog.
//!
//! The transport classifies every inbound message exactly once into an
//! [`Event`]; button and command texts map onto the closed [`Intent`] set in
//! [`Intent::classify`]. The state machine in [`crate::dialog`] only ever
//! sees these types, never display strings.

use crate::error::FailureKind;
use crate::fields::{CanonicalFields, Role};
use crate::pipeline::document::Attachment;
use crate::sink::UserId;
use std::fmt;
use std::time::SystemTime;

/// Dialog step of one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SessionState {
    #[default]
    Idle,
    AwaitingDocument,
    /// A document is in the pipeline. Not message-addressable except for
    /// cancel.
    Extracting,
    AwaitingConfirmation,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingDocument => "awaiting-document",
            SessionState::Extracting => "extracting",
            SessionState::AwaitingConfirmation => "awaiting-confirmation",
        };
        f.write_str(s)
    }
}

/// Which multi-step flow a session is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flow {
    /// Set up the user's own company profile.
    Profile,
    /// Draft an invoice for a client.
    Invoice,
}

impl Flow {
    /// The party extracted from the document in this flow.
    pub fn role(self) -> Role {
        match self {
            Flow::Profile => Role::Sender,
            Flow::Invoice => Role::Client,
        }
    }
}

/// Conversational context of one user. Replaced, not appended, whenever a
/// new flow starts.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: UserId,
    pub state: SessionState,
    pub flow: Option<Flow>,
    pub pending_fields: Option<CanonicalFields>,
    /// Failed document submissions in the current flow.
    pub failed_attempts: u32,
    /// Bumped on every transition; lets a finishing extraction detect that
    /// the session moved on while it ran.
    pub version: u64,
    pub created_at: SystemTime,
    pub last_activity: SystemTime,
}

impl Session {
    pub fn new(user_id: UserId) -> Self {
        let now = SystemTime::now();
        Self {
            user_id,
            state: SessionState::Idle,
            flow: None,
            pending_fields: None,
            failed_attempts: 0,
            version: 0,
            created_at: now,
            last_activity: now,
        }
    }

    /// Start `flow` from scratch.
    pub(crate) fn restart(&mut self, flow: Flow, state: SessionState) {
        let now = SystemTime::now();
        self.flow = Some(flow);
        self.pending_fields = None;
        self.failed_attempts = 0;
        self.created_at = now;
        self.transition(state);
    }

    pub(crate) fn transition(&mut self, state: SessionState) {
        self.state = state;
        self.version += 1;
        self.last_activity = SystemTime::now();
    }

    /// Back to idle, dropping all flow data.
    pub(crate) fn reset(&mut self) {
        self.flow = None;
        self.pending_fields = None;
        self.failed_attempts = 0;
        self.transition(SessionState::Idle);
    }
}

/// Closed set of user intents recognised at the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Intent {
    StartProfileSetup,
    StartInvoice,
    /// Open the profile form without a document.
    OpenProfileForm,
    Cancel,
    Help,
}

impl Intent {
    /// Map a command or button label onto an intent.
    ///
    /// Commands match exactly (case-insensitive, `@botname` suffix
    /// allowed); button labels match on their text with any leading emoji
    /// stripped.
    pub fn classify(text: &str) -> Option<Intent> {
        let text = text.trim();
        if let Some(command) = text.strip_prefix('/') {
            let name = command
                .split_whitespace()
                .next()
                .unwrap_or("")
                .split('@')
                .next()
                .unwrap_or("")
                .to_lowercase();
            return match name.as_str() {
                "profile" | "setup" => Some(Intent::StartProfileSetup),
                "create" | "invoice" => Some(Intent::StartInvoice),
                "settings" => Some(Intent::OpenProfileForm),
                "cancel" => Some(Intent::Cancel),
                "help" | "start" => Some(Intent::Help),
                _ => None,
            };
        }

        let label = text
            .trim_start_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if label.starts_with("profil-setup") || label.starts_with("profile setup") {
            Some(Intent::StartProfileSetup)
        } else if label.starts_with("rechnung erstellen") || label.starts_with("create invoice") {
            Some(Intent::StartInvoice)
        } else if label.starts_with("abbrechen") || label.starts_with("cancel") {
            Some(Intent::Cancel)
        } else {
            None
        }
    }
}

/// One inbound message, already classified.
#[derive(Debug, Clone)]
pub enum Event {
    Intent(Intent),
    /// Free text that matched no intent.
    Text(String),
    Attachment(Attachment),
    /// Raw callback payload from the confirmation form.
    FormSubmitted(String),
}

impl Event {
    /// Classify a plain-text or button message.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        match Intent::classify(&text) {
            Some(intent) => Event::Intent(intent),
            None => Event::Text(text),
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Event::Intent(_) => "intent",
            Event::Text(_) => "text",
            Event::Attachment(_) => "attachment",
            Event::FormSubmitted(_) => "form",
        }
    }
}

/// One outbound message for the transport to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Text(String),
    /// Text plus a button opening the confirmation form.
    Link { text: String, url: String },
    Failure { kind: FailureKind, text: String },
}

impl Reply {
    pub fn text(&self) -> &str {
        match self {
            Reply::Text(text) | Reply::Link { text, .. } | Reply::Failure { text, .. } => text,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Reply::Failure { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_commands() {
        assert_eq!(Intent::classify("/cancel"), Some(Intent::Cancel));
        assert_eq!(Intent::classify("/CREATE"), Some(Intent::StartInvoice));
        assert_eq!(
            Intent::classify("/profile@InvoiceBot"),
            Some(Intent::StartProfileSetup)
        );
        assert_eq!(Intent::classify("/settings"), Some(Intent::OpenProfileForm));
        assert_eq!(Intent::classify("/unknown"), None);
    }

    #[test]
    fn classifies_button_labels() {
        assert_eq!(
            Intent::classify("⚙️ Profil-Setup (AI)"),
            Some(Intent::StartProfileSetup)
        );
        assert_eq!(
            Intent::classify("📝 Rechnung erstellen"),
            Some(Intent::StartInvoice)
        );
        assert_eq!(Intent::classify("🔙 Abbrechen"), Some(Intent::Cancel));
        assert_eq!(Intent::classify("hello there"), None);
    }

    #[test]
    fn free_text_stays_text() {
        assert!(matches!(Event::from_text("what now?"), Event::Text(_)));
        assert!(matches!(
            Event::from_text(" /cancel "),
            Event::Intent(Intent::Cancel)
        ));
    }

    #[test]
    fn transitions_bump_version() {
        let mut s = Session::new(1);
        s.restart(Flow::Profile, SessionState::AwaitingDocument);
        assert_eq!(s.version, 1);
        s.failed_attempts = 3;
        s.reset();
        assert_eq!(s.state, SessionState::Idle);
        assert_eq!(s.failed_attempts, 0);
        assert_eq!(s.version, 2);
    }

    #[test]
    fn flow_roles() {
        assert_eq!(Flow::Profile.role(), Role::Sender);
        assert_eq!(Flow::Invoice.role(), Role::Client);
    }
}
