//! Conversational forms: definitions, collection instructions, validation
//! and model-backed extraction of submitted data.

mod extract;
mod validate;

pub use extract::FormExtractor;
pub use validate::{FieldSetValidator, StructuredFormRecord};

use concierge_rs_config::FormConfig;
use concierge_rs_protocol::ToolError;
use serde::{Deserialize, Serialize};

/// Collection guidance prepended to every form description.
pub const FORM_INSTRUCTIONS: &str = "Request inputs for fields step-by-step; avoid asking for all fields at once.
Only use the form fields retrieved from the tools.
Confirm entry with user before proceeding to submit.

";

/// Keys every structured record carries besides the declared fields.
pub(crate) const RESERVED_KEYS: [&str; 2] = ["user_id", "form_name"];

/// A named form with its required fields in collection order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormDefinition {
    pub name: String,
    pub description: String,
    pub fields: Vec<String>,
}

/// Payload returned by a form's info tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FormInstructions {
    pub instructions: String,
    pub required_fields: Vec<String>,
}

impl FormDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            fields,
        }
    }

    /// Instructions listing every declared field.
    pub fn instructions(&self) -> FormInstructions {
        FormInstructions {
            instructions: format!("{FORM_INSTRUCTIONS}{}", self.description),
            required_fields: self.fields.clone(),
        }
    }

    /// Instructions serialized for the model.
    pub fn to_llm(&self) -> Result<String, ToolError> {
        serde_json::to_string(&self.instructions())
            .map_err(|err| ToolError::ExecutionFailed(err.to_string()))
    }

    pub fn validator(&self) -> FieldSetValidator<'_> {
        FieldSetValidator::new(&self.fields)
    }
}

impl From<&FormConfig> for FormDefinition {
    fn from(config: &FormConfig) -> Self {
        Self::new(
            config.name.clone(),
            config.description.clone(),
            config.fields.clone(),
        )
    }
}

/// Forms available to a session, in configuration order.
#[derive(Debug, Clone, Default)]
pub struct FormRegistry {
    forms: Vec<FormDefinition>,
}

impl FormRegistry {
    pub fn new(forms: Vec<FormDefinition>) -> Self {
        Self { forms }
    }

    pub fn from_config(forms: &[FormConfig]) -> Self {
        Self::new(forms.iter().map(FormDefinition::from).collect())
    }

    /// Look up a form; unknown names fail with `FormNotFound`.
    pub fn get(&self, name: &str) -> Result<&FormDefinition, ToolError> {
        self.forms
            .iter()
            .find(|form| form.name == name)
            .ok_or_else(|| ToolError::FormNotFound(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &FormDefinition> {
        self.forms.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.forms.iter().map(|form| form.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.forms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_rs_config::default_forms;
    use pretty_assertions::assert_eq;

    #[test]
    fn registry_loads_configured_forms_in_order() {
        let registry = FormRegistry::from_config(&default_forms());
        assert_eq!(
            registry.names(),
            vec!["address_change", "book_appointment", "open_account"]
        );
    }

    #[test]
    fn unknown_form_is_reported_by_name() {
        let registry = FormRegistry::from_config(&default_forms());
        let err = registry.get("cancel_order").unwrap_err();
        assert!(matches!(err, ToolError::FormNotFound(ref name) if name == "cancel_order"));
        assert_eq!(err.to_string(), "Form `cancel_order` not found.");
    }

    #[test]
    fn instructions_list_every_field_after_collection_rules() {
        let registry = FormRegistry::from_config(&default_forms());
        let form = registry.get("open_account").expect("form");
        let payload: FormInstructions =
            serde_json::from_str(&form.to_llm().expect("serialize")).expect("payload");
        assert_eq!(
            payload.required_fields,
            vec!["name", "phone_number", "email", "location"]
        );
        assert!(payload.instructions.starts_with(FORM_INSTRUCTIONS));
        assert!(payload.instructions.ends_with(&form.description));
        assert!(payload.instructions.contains("step-by-step"));
        assert!(payload.instructions.contains("Confirm entry"));
    }
}
