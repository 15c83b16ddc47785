//! Handoff encoding: reconciled fields → confirmation-form link.
//!
//! The payload is compact JSON, base64url-encoded without padding, appended
//! to the form's base address as `?data=<token>`. This is obfuscation, not
//! protection: anyone holding the link can read and replay it. Tokens are
//! not invalidated after use.

use crate::config::IntakeConfig;
use crate::error::IntakeError;
use crate::fields::{CanonicalFields, Role};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use reqwest::Url;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// Query parameter carrying the token.
pub const DATA_PARAM: &str = "data";

/// A ready-to-send confirmation link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffLink {
    pub token: String,
    pub url: String,
}

/// Builds confirmation links for the profile and invoice forms.
#[derive(Debug, Clone)]
pub struct HandoffEncoder {
    profile_form: Url,
    invoice_form: Url,
}

impl HandoffEncoder {
    pub fn new(profile_form_url: &str, invoice_form_url: &str) -> Result<Self, IntakeError> {
        let parse = |raw: &str| {
            Url::parse(raw).map_err(|e| {
                IntakeError::InvalidConfig(format!("form URL '{raw}' is not absolute: {e}"))
            })
        };
        Ok(Self {
            profile_form: parse(profile_form_url)?,
            invoice_form: parse(invoice_form_url)?,
        })
    }

    pub fn from_config(config: &IntakeConfig) -> Result<Self, IntakeError> {
        Self::new(&config.profile_form_url, &config.invoice_form_url)
    }

    /// Link to the profile form, prefilled with every canonical key.
    pub fn profile_link(&self, fields: &CanonicalFields) -> Result<HandoffLink, IntakeError> {
        link(&self.profile_form, fields)
    }

    /// Link to the invoice form, prefilled with the role-remapped view.
    pub fn invoice_link(
        &self,
        fields: &CanonicalFields,
        role: Role,
    ) -> Result<HandoffLink, IntakeError> {
        link(&self.invoice_form, &invoice_view(fields, role))
    }
}

fn link<T: Serialize>(base: &Url, payload: &T) -> Result<HandoffLink, IntakeError> {
    let token = encode_token(payload)?;
    let mut url = base.clone();
    url.query_pairs_mut().append_pair(DATA_PARAM, &token);
    debug!("Handoff token: {} chars", token.len());
    Ok(HandoffLink {
        token,
        url: url.into(),
    })
}

/// Compact JSON → unpadded base64url.
pub fn encode_token<T: Serialize>(payload: &T) -> Result<String, IntakeError> {
    let json = serde_json::to_vec(payload)
        .map_err(|e| IntakeError::Internal(format!("handoff serialisation: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Reverse of [`encode_token`] for any JSON payload. Trailing padding is
/// tolerated.
pub fn decode_token_value(token: &str) -> Result<Value, IntakeError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token.trim().trim_end_matches('='))
        .map_err(|e| IntakeError::ConfirmationDecode {
            detail: format!("invalid base64url: {e}"),
        })?;
    serde_json::from_slice(&bytes).map_err(|e| IntakeError::ConfirmationDecode {
        detail: format!("invalid JSON: {e}"),
    })
}

/// Reverse of [`encode_token`] for a profile payload.
pub fn decode_token(token: &str) -> Result<CanonicalFields, IntakeError> {
    let value = decode_token_value(token)?;
    serde_json::from_value(value).map_err(|e| IntakeError::ConfirmationDecode {
        detail: e.to_string(),
    })
}

/// Pull the token out of a full handoff URL.
pub fn token_from_url(url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    url.query_pairs()
        .find(|(k, _)| k == DATA_PARAM)
        .map(|(_, v)| v.into_owned())
}

/// Invoice-oriented remap: `<role>_name`, `<role>_address`, contact, tax
/// and bank keys. The address joins street and locality as
/// `"street, postal_code city"`, skipping absent parts.
pub fn invoice_view(fields: &CanonicalFields, role: Role) -> Map<String, Value> {
    let p = role.prefix();
    let text = |v: &Option<String>| v.clone().map(Value::String).unwrap_or(Value::Null);

    let mut map = Map::new();
    map.insert(format!("{p}_name"), text(&fields.company_name));
    map.insert(format!("{p}_address"), text(&address_line(fields)));
    map.insert(format!("{p}_email"), text(&fields.email));
    map.insert(format!("{p}_phone"), text(&fields.phone));
    map.insert(format!("{p}_tax_id"), text(&fields.tax_id));
    map.insert(format!("{p}_iban"), text(&fields.iban));
    map
}

/// `"Hauptstr. 5, 10115 Berlin"`; `None` when no address part is known.
pub fn address_line(fields: &CanonicalFields) -> Option<String> {
    let locality = [fields.postal_code.as_deref(), fields.city.as_deref()]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    let parts: Vec<&str> = [fields.street.as_deref(), Some(locality.as_str())]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect();
    (!parts.is_empty()).then(|| parts.join(", "))
}
