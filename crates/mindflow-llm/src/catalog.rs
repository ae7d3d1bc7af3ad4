use std::collections::BTreeMap;
use std::sync::Arc;

use secrecy::SecretString;
use tracing::{info, warn};

use mindflow_core::adapter::BackendAdapter;
use mindflow_core::errors::GatewayError;
use mindflow_settings::{BackendKind, BackendSettings, Settings};

use crate::chat_completions::ChatCompletionsAdapter;
use crate::message_blocks::MessageBlocksAdapter;
use crate::relay::RelayAdapter;
use crate::responses::StatefulResponsesAdapter;

/// Named adapters, one per configured backend.
pub struct BackendCatalog {
    adapters: BTreeMap<String, Arc<dyn BackendAdapter>>,
    default: String,
}

impl BackendCatalog {
    pub fn new(default: impl Into<String>) -> Self {
        Self {
            adapters: BTreeMap::new(),
            default: default.into(),
        }
    }

    /// Build every configured backend, reading API keys from the environment.
    pub fn from_settings(settings: &Settings) -> Result<Self, GatewayError> {
        Self::from_settings_with(settings, |name| std::env::var(name).ok())
    }

    pub fn from_settings_with(
        settings: &Settings,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, GatewayError> {
        let mut catalog = Self::new(settings.default_backend.clone());
        for (name, backend) in &settings.backends {
            let api_key = backend.api_key_env.as_deref().and_then(|var| {
                let key = lookup(var).filter(|v| !v.is_empty());
                if key.is_none() {
                    warn!(backend = %name, env = var, "API key not set, requests will be unauthenticated");
                }
                key.map(SecretString::from)
            });
            let adapter = build_adapter(name, backend, api_key)?;
            info!(backend = %name, kind = ?backend.kind, model = %backend.model, "backend registered");
            catalog.insert(name.clone(), adapter);
        }
        Ok(catalog)
    }

    pub fn insert(&mut self, name: impl Into<String>, adapter: Arc<dyn BackendAdapter>) {
        self.adapters.insert(name.into(), adapter);
    }

    /// Adapter for a requested provider. Absent or unknown names use the default.
    pub fn resolve(&self, requested: Option<&str>) -> Option<Arc<dyn BackendAdapter>> {
        if let Some(name) = requested {
            if let Some(adapter) = self.adapters.get(name) {
                return Some(Arc::clone(adapter));
            }
            warn!(requested = name, default = %self.default, "unknown provider, using default");
        }
        self.adapters.get(&self.default).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.adapters.keys().cloned().collect()
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

fn build_adapter(
    name: &str,
    settings: &BackendSettings,
    api_key: Option<SecretString>,
) -> Result<Arc<dyn BackendAdapter>, GatewayError> {
    Ok(match settings.kind {
        BackendKind::ChatCompletions => Arc::new(ChatCompletionsAdapter::new(name, settings, api_key)?),
        BackendKind::MessageBlocks => Arc::new(MessageBlocksAdapter::new(name, settings, api_key)?),
        BackendKind::Relay => Arc::new(RelayAdapter::new(name, settings)?),
        BackendKind::StatefulResponses => Arc::new(StatefulResponsesAdapter::new(name, settings)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAdapter;

    #[test]
    fn builds_every_default_backend() {
        let settings = Settings::default();
        let catalog = BackendCatalog::from_settings_with(&settings, |_| None).unwrap();
        assert_eq!(catalog.len(), settings.backends.len());
        assert_eq!(catalog.default_name(), "openai");
        assert!(catalog.names().contains(&"claude".to_string()));
        assert_eq!(catalog.resolve(Some("claude")).unwrap().model(), "claude-sonnet-4-20250514");
        assert_eq!(catalog.resolve(Some("ollama")).unwrap().name(), "ollama");
    }

    #[test]
    fn absent_and_unknown_names_fall_back_to_default() {
        let mut catalog = BackendCatalog::new("primary");
        catalog.insert("primary", Arc::new(MockAdapter::new(vec![]).named("primary")));
        catalog.insert("secondary", Arc::new(MockAdapter::new(vec![]).named("secondary")));

        assert_eq!(catalog.resolve(None).unwrap().name(), "primary");
        assert_eq!(catalog.resolve(Some("secondary")).unwrap().name(), "secondary");
        assert_eq!(catalog.resolve(Some("nonexistent")).unwrap().name(), "primary");
        assert_eq!(catalog.names(), vec!["primary", "secondary"]);
    }

    #[test]
    fn missing_default_resolves_to_none() {
        let catalog = BackendCatalog::new("ghost");
        assert!(catalog.is_empty());
        assert!(catalog.resolve(None).is_none());
    }
}
