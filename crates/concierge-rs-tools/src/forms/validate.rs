//! Field-set validation into structured form records.

use super::RESERVED_KEYS;
use concierge_rs_protocol::ToolError;
use serde_json::{Map, Value};

/// Checks a key/value mapping against a declared field list.
///
/// Every declared field must be present with a non-blank string value and no
/// key outside the declared fields and `user_id`/`form_name` is accepted.
#[derive(Debug, Clone, Copy)]
pub struct FieldSetValidator<'a> {
    fields: &'a [String],
}

impl<'a> FieldSetValidator<'a> {
    pub fn new(fields: &'a [String]) -> Self {
        Self { fields }
    }

    /// Validated values in declaration order.
    pub fn validate(&self, values: &Map<String, Value>) -> Result<Vec<(String, String)>, ToolError> {
        if let Some(extra) = values.keys().find(|key| {
            !RESERVED_KEYS.iter().any(|reserved| *reserved == key.as_str())
                && !self.fields.iter().any(|field| field == *key)
        }) {
            return Err(ToolError::FormParse(format!("unexpected field `{extra}`")));
        }
        self.fields
            .iter()
            .map(|field| match values.get(field) {
                Some(Value::String(value)) if !value.trim().is_empty() => {
                    Ok((field.clone(), value.trim().to_string()))
                }
                Some(Value::String(_)) | Some(Value::Null) | None => {
                    Err(ToolError::FormParse(format!("missing value for `{field}`")))
                }
                Some(_) => Err(ToolError::FormParse(format!("`{field}` must be a string"))),
            })
            .collect()
    }
}

/// Values collected for one form submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructuredFormRecord {
    pub form_name: String,
    pub user_id: String,
    /// Declared fields in collection order.
    pub fields: Vec<(String, String)>,
}

impl StructuredFormRecord {
    pub fn get(&self, key: &str) -> Option<&str> {
        match key {
            "user_id" => Some(&self.user_id),
            "form_name" => Some(&self.form_name),
            _ => self
                .fields
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.as_str()),
        }
    }

    /// Declared field names followed by `user_id` and `form_name`.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys = self
            .fields
            .iter()
            .map(|(name, _)| name.as_str())
            .collect::<Vec<_>>();
        keys.extend_from_slice(&RESERVED_KEYS);
        keys
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (name, value) in &self.fields {
            map.insert(name.clone(), Value::String(value.clone()));
        }
        map.insert("user_id".to_string(), Value::String(self.user_id.clone()));
        map.insert(
            "form_name".to_string(),
            Value::String(self.form_name.clone()),
        );
        Value::Object(map)
    }
}
