use indexmap::IndexMap;
use weave_commands::value::{DEFAULT_MIME_TYPE, type_name};
use weave_commands::{FormatError, FormattedValue, Value, ValueInfo, ValueProduced, format_value};

/// A value bound in a kernel, optionally tagged with the mime type it was
/// formatted in when it arrived as a string.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredValue {
    pub value: Value,
    pub mime_type: Option<String>,
}

impl StoredValue {
    pub fn native(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            mime_type: None,
        }
    }

    pub fn formatted(formatted: FormattedValue) -> Self {
        Self {
            value: Value::String(formatted.value),
            mime_type: Some(formatted.mime_type),
        }
    }

    /// Render in `mime_type`. A formatted string already in that mime type is
    /// returned as is.
    pub fn format(&self, mime_type: &str) -> Result<FormattedValue, FormatError> {
        match (&self.mime_type, &self.value) {
            (Some(declared), Value::String(text)) if declared == mime_type => {
                Ok(FormattedValue::new(mime_type, text.clone()))
            }
            _ => format_value(&self.value, mime_type),
        }
    }

    pub fn default_formatted(&self) -> Result<FormattedValue, FormatError> {
        let mime_type = self.mime_type.as_deref().unwrap_or(DEFAULT_MIME_TYPE);
        self.format(mime_type)
    }
}

/// Named variables of one kernel, in binding order.
#[derive(Debug, Clone, Default)]
pub struct ValueStore {
    values: IndexMap<String, StoredValue>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&StoredValue> {
        self.values.get(name)
    }

    /// Bind `name`, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: StoredValue) {
        self.values.insert(name.into(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Build the `ValueProduced` answer for a request. With a mime type the
    /// value is only sent formatted; without one the native value is
    /// included alongside its default rendering.
    pub fn produce(
        &self,
        name: &str,
        mime_type: Option<&str>,
    ) -> Result<Option<ValueProduced>, FormatError> {
        let Some(stored) = self.values.get(name) else {
            return Ok(None);
        };
        let produced = match mime_type {
            Some(mime_type) => ValueProduced {
                name: name.to_string(),
                value: None,
                formatted: stored.format(mime_type)?,
            },
            None => ValueProduced {
                name: name.to_string(),
                value: Some(stored.value.clone()),
                formatted: stored.default_formatted()?,
            },
        };
        Ok(Some(produced))
    }

    pub fn infos(&self) -> Vec<ValueInfo> {
        self.values
            .iter()
            .map(|(name, stored)| ValueInfo {
                name: name.clone(),
                type_name: type_name(&stored.value).to_string(),
                mime_type: stored.mime_type.clone(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn native_request_carries_value_and_text() {
        let mut store = ValueStore::new();
        store.set("y", StoredValue::native(456));
        let produced = store.produce("y", None).unwrap().unwrap();
        assert_eq!(produced.value, Some(json!(456)));
        assert_eq!(produced.formatted, FormattedValue::plain_text("456"));
    }

    #[test]
    fn mime_request_omits_native_value() {
        let mut store = ValueStore::new();
        store.set("y", StoredValue::native(json!({ "a": 1 })));
        let produced = store.produce("y", Some("application/json")).unwrap().unwrap();
        assert_eq!(produced.value, None);
        assert_eq!(produced.formatted.value, r#"{"a":1}"#);
    }

    #[test]
    fn formatted_value_keeps_its_mime_type() {
        let mut store = ValueStore::new();
        store.set(
            "page",
            StoredValue::formatted(FormattedValue::new("text/html", "<b>hi</b>")),
        );
        let produced = store.produce("page", None).unwrap().unwrap();
        assert_eq!(produced.formatted, FormattedValue::new("text/html", "<b>hi</b>"));
        assert_eq!(store.infos()[0].mime_type.as_deref(), Some("text/html"));
    }

    #[test]
    fn missing_value_is_none() {
        assert!(ValueStore::new().produce("nope", None).unwrap().is_none());
    }

    #[test]
    fn rebinding_keeps_position() {
        let mut store = ValueStore::new();
        store.set("a", StoredValue::native(1));
        store.set("b", StoredValue::native(2));
        store.set("a", StoredValue::native(3));
        let names: Vec<_> = store.infos().into_iter().map(|i| i.name).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(store.get("a").unwrap().value, json!(3));
    }
}
