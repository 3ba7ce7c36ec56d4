use std::collections::BTreeMap;
use std::sync::Arc;

use switchboard_types::ModelList;

use crate::application::persona::PersonaTag;
use crate::application::ports::provider::ProviderAdapter;

/// One public model id and the adapter that serves it.
#[derive(Clone)]
pub struct ModelEntry {
    pub id: String,
    /// Label reported as `owned_by` and in logs, e.g. "openai".
    pub provider: String,
    pub premium: bool,
    pub persona: PersonaTag,
    pub adapter: Arc<dyn ProviderAdapter>,
}

impl ModelEntry {
    pub fn supports_streaming(&self) -> bool {
        self.adapter.supports_streaming()
    }
}

impl std::fmt::Debug for ModelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelEntry")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("premium", &self.premium)
            .field("persona", &self.persona)
            .field("streaming", &self.supports_streaming())
            .finish()
    }
}

/// Static model table, built once at startup. Ordered by id.
#[derive(Clone, Default, Debug)]
pub struct ModelRegistry {
    entries: BTreeMap<String, ModelEntry>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entry: ModelEntry) {
        self.entries.insert(entry.id.clone(), entry);
    }

    pub fn with(mut self, entry: ModelEntry) -> Self {
        self.register(entry);
        self
    }

    pub fn get(&self, model_id: &str) -> Option<&ModelEntry> {
        self.entries.get(model_id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn premium_ids(&self) -> Vec<String> {
        self.entries
            .values()
            .filter(|e| e.premium)
            .map(|e| e.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_model_list(&self) -> ModelList {
        ModelList::new(
            self.entries
                .values()
                .map(|e| (e.id.clone(), e.provider.clone())),
        )
    }
}
