//! Form info and submission tools.

use crate::builtins::utils::{empty_schema, input_schema, parse_args, require_text};
use crate::forms::{FormDefinition, FormExtractor, FormRegistry};
use crate::{Tool, ToolContext};
use async_trait::async_trait;
use autoagents_core::tool::ToolInputT;
use autoagents_derive::ToolInput;
use concierge_rs_protocol::ToolError;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Confirmation returned once a form has been structured.
pub const FORM_SUBMITTED: &str =
    "Form successfully submitted. An agent will get back to you shortly.";

/// Returns the collection instructions of one form; named after the form.
#[derive(Debug)]
pub struct FormInfoTool {
    form: FormDefinition,
    description: String,
}

impl FormInfoTool {
    pub fn new(form: FormDefinition) -> Self {
        let description = format!("Provides form details for {}", form.name);
        Self { form, description }
    }
}

#[async_trait]
impl Tool for FormInfoTool {
    fn name(&self) -> &str {
        &self.form.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn args_schema(&self) -> Value {
        empty_schema()
    }

    async fn call(&self, _ctx: &ToolContext, _args: Value) -> Result<String, ToolError> {
        info!("retrieving form (name={})", self.form.name);
        self.form.to_llm()
    }
}

#[derive(Debug, Serialize, Deserialize, ToolInput)]
struct SubmitFormArgs {
    #[input(description = "Form name used to collect the information")]
    form_name: String,
    #[input(description = "The form data collected from the user")]
    form_data: String,
}

/// Structures collected form data through the turn's model.
#[derive(Debug)]
pub struct SubmitFormTool {
    forms: Arc<FormRegistry>,
    extractor: FormExtractor,
}

impl SubmitFormTool {
    pub fn new(forms: Arc<FormRegistry>) -> Self {
        Self {
            forms,
            extractor: FormExtractor,
        }
    }
}

#[async_trait]
impl Tool for SubmitFormTool {
    fn name(&self) -> &str {
        "submit_form"
    }

    fn description(&self) -> &str {
        "Submits the form data collected from the user."
    }

    fn args_schema(&self) -> Value {
        input_schema::<SubmitFormArgs>()
    }

    async fn call(&self, ctx: &ToolContext, args: Value) -> Result<String, ToolError> {
        let input: SubmitFormArgs = parse_args(args)?;
        let form = self.forms.get(&input.form_name)?;
        require_text("form_data", &input.form_data)?;
        let record = self.extractor.extract(ctx, form, &input.form_data).await?;
        info!(
            "form submitted (form={}, user_id={}, record={})",
            record.form_name,
            record.user_id,
            record.to_value()
        );
        Ok(FORM_SUBMITTED.to_string())
    }
}
