//! The canonical business-entity schema and its alias table.
//!
//! Models name the same attribute in many ways (`zip`, `plz`, `postal_code`).
//! [`FIELD_ALIASES`] lists, per canonical key, the accepted source keys in
//! precedence order. The downstream form relies on this exact order, so it
//! is kept as data rather than spread across lookup code.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// One of the eight canonical fields, in schema order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    CompanyName,
    Street,
    PostalCode,
    City,
    Email,
    Phone,
    TaxId,
    Iban,
}

impl FieldKey {
    pub const ALL: [FieldKey; 8] = [
        FieldKey::CompanyName,
        FieldKey::Street,
        FieldKey::PostalCode,
        FieldKey::City,
        FieldKey::Email,
        FieldKey::Phone,
        FieldKey::TaxId,
        FieldKey::Iban,
    ];

    /// The canonical JSON key.
    pub fn as_str(self) -> &'static str {
        match self {
            FieldKey::CompanyName => "company_name",
            FieldKey::Street => "street",
            FieldKey::PostalCode => "postal_code",
            FieldKey::City => "city",
            FieldKey::Email => "email",
            FieldKey::Phone => "phone",
            FieldKey::TaxId => "tax_id",
            FieldKey::Iban => "iban",
        }
    }

    /// Accepted source keys, highest precedence first.
    pub fn aliases(self) -> &'static [&'static str] {
        FIELD_ALIASES
            .iter()
            .find(|(key, _)| *key == self)
            .map(|(_, aliases)| *aliases)
            .unwrap_or(&[])
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Alias precedence per canonical key. The first alias is always the
/// canonical key itself.
pub static FIELD_ALIASES: [(FieldKey, &[&str]); 8] = [
    (FieldKey::CompanyName, &["company_name", "sender_name", "company"]),
    (FieldKey::Street, &["street", "address"]),
    (FieldKey::PostalCode, &["postal_code", "zip", "plz"]),
    (FieldKey::City, &["city"]),
    (FieldKey::Email, &["email", "e-mail"]),
    (FieldKey::Phone, &["phone", "tel", "telefon"]),
    (FieldKey::TaxId, &["tax_id", "ust_id", "steuernummer", "vat_id"]),
    (FieldKey::Iban, &["iban"]),
];

/// Which party of an invoice the extracted fields describe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The user's own company (the invoice issuer / Absender).
    #[default]
    Sender,
    /// The counterparty being invoiced.
    Client,
}

impl Role {
    /// Key prefix used in the invoice-oriented handoff.
    pub fn prefix(self) -> &'static str {
        match self {
            Role::Sender => "sender",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// The fixed output schema. Serialises with every key present; absent
/// values become `null`, never a missing key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanonicalFields {
    pub company_name: Option<String>,
    pub street: Option<String>,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub tax_id: Option<String>,
    pub iban: Option<String>,
}

impl CanonicalFields {
    pub fn get(&self, key: FieldKey) -> Option<&str> {
        self.slot(key).as_deref()
    }

    pub fn set(&mut self, key: FieldKey, value: Option<String>) {
        *self.slot_mut(key) = value;
    }

    fn slot(&self, key: FieldKey) -> &Option<String> {
        match key {
            FieldKey::CompanyName => &self.company_name,
            FieldKey::Street => &self.street,
            FieldKey::PostalCode => &self.postal_code,
            FieldKey::City => &self.city,
            FieldKey::Email => &self.email,
            FieldKey::Phone => &self.phone,
            FieldKey::TaxId => &self.tax_id,
            FieldKey::Iban => &self.iban,
        }
    }

    fn slot_mut(&mut self, key: FieldKey) -> &mut Option<String> {
        match key {
            FieldKey::CompanyName => &mut self.company_name,
            FieldKey::Street => &mut self.street,
            FieldKey::PostalCode => &mut self.postal_code,
            FieldKey::City => &mut self.city,
            FieldKey::Email => &mut self.email,
            FieldKey::Phone => &mut self.phone,
            FieldKey::TaxId => &mut self.tax_id,
            FieldKey::Iban => &mut self.iban,
        }
    }

    /// Number of fields holding a value.
    pub fn filled(&self) -> usize {
        FieldKey::ALL.iter().filter(|k| self.get(**k).is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.filled() == 0
    }

    /// Keys whose value is absent, in schema order.
    pub fn missing(&self) -> Vec<FieldKey> {
        FieldKey::ALL
            .into_iter()
            .filter(|k| self.get(*k).is_none())
            .collect()
    }

    /// Read canonical keys only (no aliases) from a JSON object, e.g. the
    /// confirmation form's callback. Scalars are coerced to text.
    pub fn from_object(object: &Map<String, Value>) -> Self {
        let mut fields = CanonicalFields::default();
        for key in FieldKey::ALL {
            fields.set(key, object.get(key.as_str()).and_then(scalar_text));
        }
        fields
    }
}

/// Text form of a JSON scalar. `null`, blank strings, arrays and objects
/// have no text form.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn alias_table_starts_with_canonical_key() {
        for key in FieldKey::ALL {
            assert_eq!(key.aliases()[0], key.as_str());
        }
    }

    #[test]
    fn alias_precedence_is_fixed() {
        assert_eq!(
            FieldKey::CompanyName.aliases(),
            &["company_name", "sender_name", "company"]
        );
        assert_eq!(FieldKey::PostalCode.aliases(), &["postal_code", "zip", "plz"]);
        assert_eq!(
            FieldKey::TaxId.aliases(),
            &["tax_id", "ust_id", "steuernummer", "vat_id"]
        );
    }

    #[test]
    fn serialises_every_key_even_when_empty() {
        let v = serde_json::to_value(CanonicalFields::default()).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj.len(), 8);
        for key in FieldKey::ALL {
            assert_eq!(obj[key.as_str()], Value::Null, "{key}");
        }
    }

    #[test]
    fn from_object_ignores_aliases_and_coerces_numbers() {
        let obj = json!({"company_name": "Acme", "zip": "1", "postal_code": 10115, "iban": ""});
        let fields = CanonicalFields::from_object(obj.as_object().unwrap());
        assert_eq!(fields.company_name.as_deref(), Some("Acme"));
        assert_eq!(fields.postal_code.as_deref(), Some("10115"));
        assert_eq!(fields.iban, None);
        assert_eq!(fields.filled(), 2);
    }

    #[test]
    fn missing_lists_in_schema_order() {
        let fields = CanonicalFields {
            company_name: Some("Acme".into()),
            city: Some("Berlin".into()),
            ..Default::default()
        };
        assert_eq!(
            fields.missing(),
            vec![
                FieldKey::Street,
                FieldKey::PostalCode,
                FieldKey::Email,
                FieldKey::Phone,
                FieldKey::TaxId,
                FieldKey::Iban
            ]
        );
    }
}
