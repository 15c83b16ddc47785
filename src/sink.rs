//! Profile/invoice store.
//!
//! The dialog commits confirmed data through [`RecordSink`]; it never reads
//! from the store. Two implementations ship with the crate:
//!
//! * [`RestSink`]: a PostgREST endpoint (e.g. Supabase) with `profiles`
//!   and `invoices` tables.
//! * [`MemorySink`]: keeps records in memory, for dry runs and tests.

use crate::fields::CanonicalFields;
use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Chat user identifier.
pub type UserId = i64;

/// A failed store write.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SinkError {
    pub message: String,
}

impl SinkError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Write side of the profile/invoice store.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Insert or replace the profile keyed by `user_id`.
    async fn upsert_profile(
        &self,
        user_id: UserId,
        fields: &CanonicalFields,
    ) -> Result<(), SinkError>;

    /// Append an invoice draft for `user_id`. Callers may retry, so stores
    /// must accept at-least-once delivery.
    async fn insert_invoice(
        &self,
        user_id: UserId,
        invoice: &Map<String, Value>,
    ) -> Result<(), SinkError>;
}

// ── In-memory store ──────────────────────────────────────────────────────

/// Records kept in process memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    profiles: Mutex<HashMap<UserId, CanonicalFields>>,
    invoices: Mutex<Vec<(UserId, Map<String, Value>)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn profile(&self, user_id: UserId) -> Option<CanonicalFields> {
        self.profiles
            .lock()
            .ok()
            .and_then(|p| p.get(&user_id).cloned())
    }

    pub fn invoices(&self) -> Vec<(UserId, Map<String, Value>)> {
        self.invoices
            .lock()
            .map(|i| i.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn upsert_profile(
        &self,
        user_id: UserId,
        fields: &CanonicalFields,
    ) -> Result<(), SinkError> {
        self.profiles
            .lock()
            .map_err(|_| SinkError::new("profile store poisoned"))?
            .insert(user_id, fields.clone());
        debug!("Profile {} stored in memory", user_id);
        Ok(())
    }

    async fn insert_invoice(
        &self,
        user_id: UserId,
        invoice: &Map<String, Value>,
    ) -> Result<(), SinkError> {
        self.invoices
            .lock()
            .map_err(|_| SinkError::new("invoice store poisoned"))?
            .push((user_id, invoice.clone()));
        debug!("Invoice for {} stored in memory", user_id);
        Ok(())
    }
}

// ── PostgREST store ──────────────────────────────────────────────────────

/// Row layout of the `profiles` table. The store names the postal code
/// column `zip`.
#[derive(Debug, Serialize)]
struct ProfileRow<'a> {
    id: UserId,
    company_name: Option<&'a str>,
    street: Option<&'a str>,
    zip: Option<&'a str>,
    city: Option<&'a str>,
    email: Option<&'a str>,
    phone: Option<&'a str>,
    tax_id: Option<&'a str>,
    iban: Option<&'a str>,
}

impl<'a> ProfileRow<'a> {
    fn new(user_id: UserId, f: &'a CanonicalFields) -> Self {
        Self {
            id: user_id,
            company_name: f.company_name.as_deref(),
            street: f.street.as_deref(),
            zip: f.postal_code.as_deref(),
            city: f.city.as_deref(),
            email: f.email.as_deref(),
            phone: f.phone.as_deref(),
            tax_id: f.tax_id.as_deref(),
            iban: f.iban.as_deref(),
        }
    }
}

/// A PostgREST-compatible store (`POST /rest/v1/<table>`).
#[derive(Debug, Clone)]
pub struct RestSink {
    client: reqwest::Client,
    base_url: Url,
    api_key: String,
    profiles_table: String,
    invoices_table: String,
}

impl RestSink {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| SinkError::new(format!("invalid store URL '{base_url}': {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SinkError::new(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
            profiles_table: "profiles".to_string(),
            invoices_table: "invoices".to_string(),
        })
    }

    pub fn with_tables(mut self, profiles: impl Into<String>, invoices: impl Into<String>) -> Self {
        self.profiles_table = profiles.into();
        self.invoices_table = invoices.into();
        self
    }

    fn table_url(&self, table: &str) -> Result<Url, SinkError> {
        self.base_url
            .join(&format!("rest/v1/{table}"))
            .map_err(|e| SinkError::new(format!("invalid table URL: {e}")))
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        table: &str,
        body: &T,
        prefer: &str,
    ) -> Result<(), SinkError> {
        let url = self.table_url(table)?;
        let response = self
            .client
            .post(url)
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
            .header("Prefer", prefer)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SinkError::new(format!("{table}: request timed out"))
                } else {
                    SinkError::new(format!("{table}: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::new(format!("{table}: HTTP {status}: {body}")));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordSink for RestSink {
    async fn upsert_profile(
        &self,
        user_id: UserId,
        fields: &CanonicalFields,
    ) -> Result<(), SinkError> {
        let row = ProfileRow::new(user_id, fields);
        self.post(
            &self.profiles_table,
            &row,
            "resolution=merge-duplicates,return=minimal",
        )
        .await?;
        info!("Profile {} upserted", user_id);
        Ok(())
    }

    async fn insert_invoice(
        &self,
        user_id: UserId,
        invoice: &Map<String, Value>,
    ) -> Result<(), SinkError> {
        let mut row = invoice.clone();
        row.insert("user_id".to_string(), Value::from(user_id));
        self.post(&self.invoices_table, &row, "return=minimal").await?;
        info!("Invoice for {} inserted", user_id);
        Ok(())
    }
}
