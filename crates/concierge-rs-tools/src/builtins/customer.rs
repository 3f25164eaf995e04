//! Customer lookup tool and its data source.

use crate::builtins::utils::{input_schema, parse_args, require_text};
use crate::{Tool, ToolContext};
use async_trait::async_trait;
use autoagents_core::tool::ToolInputT;
use autoagents_derive::ToolInput;
use concierge_rs_protocol::ToolError;
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Customer profile returned by the lookup tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomerRecord {
    pub name: String,
    pub email: String,
    pub orders: u32,
}

/// Source of customer records keyed by customer id.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn lookup(&self, customer_id: &str) -> Option<CustomerRecord>;
}

/// Fixed in-process customer table.
#[derive(Debug, Clone, Default)]
pub struct StaticCustomerDirectory {
    customers: HashMap<String, CustomerRecord>,
}

impl StaticCustomerDirectory {
    pub fn new(customers: HashMap<String, CustomerRecord>) -> Self {
        Self { customers }
    }

    /// Demo customers shipped with the runtime.
    pub fn sample() -> Self {
        let mut customers = HashMap::new();
        customers.insert(
            "123".to_string(),
            CustomerRecord {
                name: "Alice Smith".to_string(),
                email: "alice@example.com".to_string(),
                orders: 5,
            },
        );
        customers.insert(
            "456".to_string(),
            CustomerRecord {
                name: "Bob Johnson".to_string(),
                email: "bob@example.com".to_string(),
                orders: 2,
            },
        );
        Self::new(customers)
    }
}

#[async_trait]
impl CustomerDirectory for StaticCustomerDirectory {
    async fn lookup(&self, customer_id: &str) -> Option<CustomerRecord> {
        self.customers.get(customer_id).cloned()
    }
}

#[derive(Debug, Serialize, Deserialize, ToolInput)]
struct GetCustomerInfoArgs {
    #[input(description = "The customer ID.")]
    customer_id: String,
}

/// Looks up a customer profile by id.
pub struct GetCustomerInfoTool {
    directory: Arc<dyn CustomerDirectory>,
}

impl GetCustomerInfoTool {
    pub fn new(directory: Arc<dyn CustomerDirectory>) -> Self {
        Self { directory }
    }
}

impl fmt::Debug for GetCustomerInfoTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("GetCustomerInfoTool")
    }
}

#[async_trait]
impl Tool for GetCustomerInfoTool {
    fn name(&self) -> &str {
        "get_customer_info"
    }

    fn description(&self) -> &str {
        "Retrieves customer information (name, orders) based on ID. You must ask the user to provide the ID if it's not available."
    }

    fn args_schema(&self) -> Value {
        input_schema::<GetCustomerInfoArgs>()
    }

    async fn call(&self, _ctx: &ToolContext, args: Value) -> Result<String, ToolError> {
        let input: GetCustomerInfoArgs = parse_args(args)?;
        require_text("customer_id", &input.customer_id)?;
        info!(
            "retrieving customer information (customer_id={})",
            input.customer_id
        );
        let record = self
            .directory
            .lookup(input.customer_id.trim())
            .await
            .ok_or_else(|| ToolError::NotFound("Customer not found.".to_string()))?;
        serde_json::to_string(&record).map_err(|err| ToolError::ExecutionFailed(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tests::tool_context;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn tool() -> GetCustomerInfoTool {
        GetCustomerInfoTool::new(Arc::new(StaticCustomerDirectory::sample()))
    }

    #[tokio::test]
    async fn known_customer_is_returned_as_text() {
        let output = tool()
            .call(&tool_context(), json!({ "customer_id": "123" }))
            .await
            .expect("customer");
        assert!(output.contains("Alice Smith"));
        let record: CustomerRecord = serde_json::from_str(&output).expect("record");
        assert_eq!(record.orders, 5);
    }

    #[tokio::test]
    async fn unknown_customer_is_not_found() {
        let err = tool()
            .call(&tool_context(), json!({ "customer_id": "999" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
        assert_eq!(err.to_string(), "Customer not found.");
    }

    #[tokio::test]
    async fn missing_argument_is_invalid() {
        let err = tool().call(&tool_context(), json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn schema_names_customer_id() {
        let schema = tool().args_schema();
        assert!(schema["properties"].get("customer_id").is_some());
    }
}
