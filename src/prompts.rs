//! Instruction prompts sent alongside each document.
//!
//! Both prompts ask for exactly the canonical keys so the reconciler's alias
//! table is only a safety net. Keeping them here lets tests inspect them
//! without a model.

use crate::fields::{FieldKey, Role};

/// Who to look for on the document, per role.
fn party_description(role: Role) -> &'static str {
    match role {
        Role::Sender => "the SENDER (seller / issuer / Absender)",
        Role::Client => "the CLIENT (buyer / recipient / Rechnungsempfänger)",
    }
}

fn key_list() -> String {
    FieldKey::ALL
        .iter()
        .map(|k| k.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Instruction accompanying an image attachment.
pub fn image_instruction(role: Role) -> String {
    format!(
        "Extract the data of {} from this invoice image.\n\
         Reply with ONE JSON object with exactly these keys: {}.\n\
         Use null for any value that is not on the document.",
        party_description(role),
        key_list()
    )
}

/// Instruction wrapping text extracted from a PDF.
pub fn text_instruction(role: Role, document_text: &str) -> String {
    format!(
        "Extract the data of {} from the invoice text below.\n\
         Reply with ONE JSON object with exactly these keys: {}.\n\
         Use null for any value that is not in the text.\n\n\
         \"\"\"{}\"\"\"",
        party_description(role),
        key_list(),
        document_text
    )
}
