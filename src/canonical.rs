//! String-to-sign construction.
//!
//! Signing and verifying skip different keys. Alipay's protocol requires
//! both rule sets exactly as implemented here.

use crate::rocket::Collection;
use serde_json::Value;

/// Values starting with this byte reference an uploaded file and are never signed.
pub const ATTACHMENT_SENTINEL: char = '@';

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Canonical {
    Signing,
    Verifying,
}

/// Text form of a parameter value; `None` for null.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn keep(key: &str, text: Option<&str>, mode: Canonical) -> bool {
    match mode {
        Canonical::Verifying => key != "sign" && key != "sign_type",
        Canonical::Signing => match text {
            None | Some("") => false,
            Some(t) => key != "sign" && !t.starts_with(ATTACHMENT_SENTINEL),
        },
    }
}

pub fn canonicalize(params: &Collection, mode: Canonical) -> String {
    let mut entries: Vec<(&str, Option<String>)> = params
        .iter()
        .map(|(k, v)| (k.as_str(), value_text(v)))
        .collect();
    entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    entries
        .into_iter()
        .filter(|(k, v)| keep(k, v.as_deref(), mode))
        .map(|(k, v)| format!("{}={}", k, v.unwrap_or_default()))
        .collect::<Vec<_>>()
        .join("&")
}
