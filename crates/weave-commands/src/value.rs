//! Two-tier value contract: native values (same runtime only) and values
//! formatted as a string under a declared mime type (always available).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Native value exchanged between kernels that share a runtime.
pub type Value = serde_json::Value;

pub const TEXT_PLAIN: &str = "text/plain";
pub const APPLICATION_JSON: &str = "application/json";

/// Mime type used when a caller does not ask for one.
pub const DEFAULT_MIME_TYPE: &str = TEXT_PLAIN;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedValue {
    pub mime_type: String,
    pub value: String,
}

impl FormattedValue {
    pub fn new(mime_type: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            value: value.into(),
        }
    }

    pub fn plain_text(value: impl Into<String>) -> Self {
        Self::new(TEXT_PLAIN, value)
    }
}

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("unsupported mime type '{0}'")]
    UnsupportedMimeType(String),
    #[error("failed to encode value as json: {0}")]
    Json(#[from] serde_json::Error),
}

/// Render `value` under `mime_type`. Mime parameters (`; charset=...`) are ignored.
pub fn format_value(value: &Value, mime_type: &str) -> Result<FormattedValue, FormatError> {
    let essence = mime_essence(mime_type);
    let rendered = match essence.as_str() {
        TEXT_PLAIN => match value {
            Value::String(s) => s.clone(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Array(_) | Value::Object(_) => serde_json::to_string(value)?,
        },
        APPLICATION_JSON => serde_json::to_string(value)?,
        _ => return Err(FormatError::UnsupportedMimeType(mime_type.to_string())),
    };
    Ok(FormattedValue::new(mime_type, rendered))
}

/// Short type name reported in value listings.
pub fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn mime_essence(mime_type: &str) -> String {
    mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_text_renders_strings_raw() {
        let formatted = format_value(&json!("hello!"), TEXT_PLAIN).unwrap();
        assert_eq!(formatted.value, "hello!");
        assert_eq!(formatted.mime_type, TEXT_PLAIN);
    }

    #[test]
    fn plain_text_renders_numbers() {
        assert_eq!(format_value(&json!(456), TEXT_PLAIN).unwrap().value, "456");
        assert_eq!(format_value(&json!(1.5), TEXT_PLAIN).unwrap().value, "1.5");
    }

    #[test]
    fn json_quotes_strings() {
        let formatted = format_value(&json!("x"), APPLICATION_JSON).unwrap();
        assert_eq!(formatted.value, "\"x\"");
    }

    #[test]
    fn mime_parameters_are_ignored() {
        let formatted = format_value(&json!([1, 2]), "text/plain; charset=utf-8").unwrap();
        assert_eq!(formatted.value, "[1,2]");
        assert_eq!(formatted.mime_type, "text/plain; charset=utf-8");
    }

    #[test]
    fn unknown_mime_type_fails() {
        let err = format_value(&json!(1), "image/png").unwrap_err();
        assert!(matches!(err, FormatError::UnsupportedMimeType(m) if m == "image/png"));
    }

    #[test]
    fn type_names() {
        assert_eq!(type_name(&json!(4)), "integer");
        assert_eq!(type_name(&json!(4.5)), "float");
        assert_eq!(type_name(&json!("s")), "string");
    }
}
