//! Registry of chat model providers selectable per request.

use crate::error::CoreError;
use autoagents_llm::LLMProvider;
use log::info;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A chat model provider registered under a `provider:model` id.
#[derive(Clone)]
pub struct LLMEntry {
    pub id: String,
    pub provider: Arc<dyn LLMProvider>,
}

impl LLMEntry {
    pub fn new(id: impl Into<String>, provider: Arc<dyn LLMProvider>) -> Self {
        Self {
            id: id.into(),
            provider,
        }
    }
}

impl fmt::Debug for LLMEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LLMEntry")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Default)]
pub(crate) struct LLMRegistry {
    providers: Arc<RwLock<HashMap<String, LLMEntry>>>,
}

impl LLMRegistry {
    pub(crate) fn insert_entry(&self, entry: LLMEntry) -> Result<(), CoreError> {
        let mut providers = self.providers.write();
        if providers.contains_key(&entry.id) {
            return Err(CoreError::DuplicateModel(entry.id));
        }
        info!("registering model (model={})", entry.id);
        providers.insert(entry.id.clone(), entry);
        Ok(())
    }

    /// Registered ids in lexical order.
    pub(crate) fn list_ids(&self) -> Vec<String> {
        let mut ids = self.providers.read().keys().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    pub(crate) fn get_entry(&self, model: &str) -> Result<LLMEntry, CoreError> {
        self.providers
            .read()
            .get(model)
            .cloned()
            .ok_or_else(|| CoreError::UnknownModel(model.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::{LLMEntry, LLMRegistry};
    use crate::error::CoreError;
    use concierge_rs_test_utils::{FailingLLM, ScriptedLLM};
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn registry_resolves_entries_by_id() {
        let registry = LLMRegistry::default();
        registry
            .insert_entry(LLMEntry::new(
                "openai:gpt-4o",
                Arc::new(ScriptedLLM::new(Vec::new())),
            ))
            .expect("insert");
        registry
            .insert_entry(LLMEntry::new(
                "openai:gpt-4o-mini",
                Arc::new(FailingLLM::new("down")),
            ))
            .expect("insert");

        assert_eq!(
            registry.list_ids(),
            vec!["openai:gpt-4o".to_string(), "openai:gpt-4o-mini".to_string()]
        );
        assert_eq!(
            registry.get_entry("openai:gpt-4o").expect("entry").id,
            "openai:gpt-4o"
        );
    }

    #[test]
    fn registry_rejects_unknown_and_duplicate_ids() {
        let registry = LLMRegistry::default();
        let entry = LLMEntry::new("openai:gpt-4o", Arc::new(FailingLLM::new("down")));
        registry.insert_entry(entry.clone()).expect("insert");

        match registry.insert_entry(entry) {
            Err(CoreError::DuplicateModel(id)) => assert_eq!(id, "openai:gpt-4o"),
            other => panic!("unexpected result: {other:?}"),
        }
        match registry.get_entry("anthropic:claude") {
            Err(CoreError::UnknownModel(id)) => assert_eq!(id, "anthropic:claude"),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
