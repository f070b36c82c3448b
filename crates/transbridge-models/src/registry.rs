//! Registry of configured backends with weighted and exact selection.
//!
//! The registry is built once from the ordered provider list and is read-only
//! afterwards. Every ordering decision (default backend, weighted walk,
//! listings) follows declaration order, never hash-map iteration order.

use crate::config::ProviderConfig;
use crate::factory::{BackendFactory, FactoryError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tracing::{debug, info};
use transbridge_abstraction::{BackendIdentity, Translator, TranslatorError};

/// Errors raised by registry construction and lookup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The provider list is unusable (empty, unknown kind, failed construction).
    #[error("Configuration error: {0}")]
    Config(String),

    /// No backend matches the requested provider/model pair.
    #[error("model {model} not found for provider {provider}")]
    NotFound {
        /// The requested provider.
        provider: String,
        /// The requested model.
        model: String,
    },
}

impl From<FactoryError> for RegistryError {
    fn from(e: FactoryError) -> Self {
        Self::Config(e.to_string())
    }
}

/// A backend together with its selection weight.
#[derive(Clone)]
pub struct WeightedBackend {
    /// The backend instance.
    pub backend: Arc<dyn Translator>,
    /// Relative selection weight; zero never gets picked by weighted selection.
    pub weight: u32,
    /// Whether the backend belongs to a provider flagged as default.
    pub is_default: bool,
}

impl WeightedBackend {
    /// Wraps a backend with a weight.
    #[must_use]
    pub fn new(backend: Arc<dyn Translator>, weight: u32) -> Self {
        Self { backend, weight, is_default: false }
    }

    /// Marks the backend as belonging to a default provider.
    #[must_use]
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }
}

impl fmt::Debug for WeightedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeightedBackend")
            .field("identity", self.backend.identity())
            .field("weight", &self.weight)
            .field("is_default", &self.is_default)
            .finish()
    }
}

/// Immutable set of configured backends.
pub struct ModelRegistry {
    /// Backends in declaration order.
    backends: Vec<WeightedBackend>,
    /// Index of the default backend in `backends`.
    default_index: usize,
    /// Sum of all weights.
    total_weight: u64,
    /// Random source owned by this registry.
    rng: Mutex<StdRng>,
}

impl fmt::Debug for ModelRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRegistry")
            .field("backends", &self.backends)
            .field("default_index", &self.default_index)
            .field("total_weight", &self.total_weight)
            .finish_non_exhaustive()
    }
}

impl ModelRegistry {
    /// Builds the registry from provider configurations with an entropy-seeded random source.
    ///
    /// # Errors
    /// Returns `RegistryError::Config` if the list is empty, a provider kind is
    /// unknown, or a backend cannot be constructed.
    pub fn build(
        providers: &[ProviderConfig],
        factory: &BackendFactory,
    ) -> Result<Self, RegistryError> {
        Self::build_with_rng(providers, factory, StdRng::from_entropy())
    }

    /// Builds the registry with an explicit random source (for deterministic selection).
    ///
    /// # Errors
    /// See [`ModelRegistry::build`].
    pub fn build_with_rng(
        providers: &[ProviderConfig],
        factory: &BackendFactory,
        rng: StdRng,
    ) -> Result<Self, RegistryError> {
        if providers.is_empty() {
            return Err(RegistryError::Config("no providers configured".to_string()));
        }

        let mut backends = Vec::new();
        for provider in providers {
            for model in &provider.models {
                let backend = factory.create(provider, model)?;
                let mut entry = WeightedBackend::new(backend, model.weight);
                entry.is_default = provider.is_default;
                backends.push(entry);
            }
        }

        Self::from_backends(backends, rng)
    }

    /// Builds the registry from already constructed backends, in the given order.
    ///
    /// The default is the first backend flagged `is_default`, or the first
    /// backend when none is flagged.
    ///
    /// # Errors
    /// Returns `RegistryError::Config` if `backends` is empty.
    pub fn from_backends(
        backends: Vec<WeightedBackend>,
        rng: StdRng,
    ) -> Result<Self, RegistryError> {
        if backends.is_empty() {
            return Err(RegistryError::Config("no models configured".to_string()));
        }

        let default_index = backends.iter().position(|b| b.is_default).unwrap_or(0);
        let total_weight = backends.iter().map(|b| u64::from(b.weight)).sum();

        info!(
            backends = backends.len(),
            total_weight,
            default = %backends[default_index].backend.identity(),
            "Model registry initialized"
        );

        Ok(Self { backends, default_index, total_weight, rng: Mutex::new(rng) })
    }

    /// Returns the first backend matching `provider` and `model`.
    ///
    /// # Errors
    /// Returns `RegistryError::NotFound` if no backend matches.
    pub fn get_exact(&self, provider: &str, model: &str) -> Result<Arc<dyn Translator>, RegistryError> {
        self.backends
            .iter()
            .map(|b| &b.backend)
            .find(|backend| {
                let id = backend.identity();
                id.provider == provider && id.model == model
            })
            .map(Arc::clone)
            .ok_or_else(|| RegistryError::NotFound {
                provider: provider.to_string(),
                model: model.to_string(),
            })
    }

    /// Returns the default backend.
    pub fn get_default(&self) -> Arc<dyn Translator> {
        Arc::clone(&self.backends[self.default_index].backend)
    }

    /// Picks a backend with probability proportional to its weight.
    ///
    /// Falls back to the default backend when the total weight is zero.
    pub fn get_weighted(&self) -> Arc<dyn Translator> {
        if self.total_weight == 0 {
            return self.get_default();
        }

        let mut remaining = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            rng.gen_range(0..self.total_weight)
        };

        for entry in &self.backends {
            let weight = u64::from(entry.weight);
            if remaining < weight {
                debug!(backend = %entry.backend.identity(), "Weighted selection");
                return Arc::clone(&entry.backend);
            }
            remaining -= weight;
        }

        self.get_default()
    }

    /// All backend identities in declaration order.
    pub fn list_all(&self) -> Vec<BackendIdentity> {
        self.backends.iter().map(|b| b.backend.identity().clone()).collect()
    }

    /// Model names of one provider in declaration order.
    pub fn list_by_provider(&self, provider: &str) -> Vec<String> {
        self.backends
            .iter()
            .map(|b| b.backend.identity())
            .filter(|id| id.provider == provider)
            .map(|id| id.model.clone())
            .collect()
    }

    /// Sum of all backend weights.
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Closes every backend, attempting all of them; the last error wins.
    ///
    /// # Errors
    /// Returns the last `TranslatorError` raised by any backend.
    pub async fn close(&self) -> Result<(), TranslatorError> {
        let mut last_error = None;
        for entry in &self.backends {
            if let Err(e) = entry.backend.close().await {
                last_error = Some(e);
            }
        }
        last_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelEntry;
    use crate::MockTranslator;

    fn mock(provider: &str, model: &str) -> Arc<dyn Translator> {
        Arc::new(MockTranslator::new(BackendIdentity::new(provider, model, "mock://")))
    }

    fn seeded() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn test_build_empty_providers() {
        let result = ModelRegistry::build(&[], &BackendFactory::default());
        assert!(matches!(result, Err(RegistryError::Config(_))));
    }

    #[test]
    fn test_build_unknown_kind() {
        let providers = vec![ProviderConfig::new("gemini", "http://x").with_model(ModelEntry::new("pro"))];
        let result = ModelRegistry::build(&providers, &BackendFactory::default());
        match result {
            Err(RegistryError::Config(msg)) => assert!(msg.contains("gemini")),
            other => panic!("Expected Config error, got {:?}", other),
        }
    }

    #[test]
    fn test_default_is_first_model_of_default_provider() {
        let providers = vec![
            ProviderConfig::new("mock", "mock://a").with_model(ModelEntry::new("a1")),
            ProviderConfig::new("mock", "mock://b")
                .as_default()
                .with_model(ModelEntry::new("b1"))
                .with_model(ModelEntry::new("b2")),
            ProviderConfig::new("mock", "mock://c").as_default().with_model(ModelEntry::new("c1")),
        ];
        let registry = ModelRegistry::build_with_rng(&providers, &BackendFactory::default(), seeded()).unwrap();
        assert_eq!(registry.get_default().identity().model, "b1");
    }

    #[test]
    fn test_default_without_flag_is_first_declared() {
        let registry = ModelRegistry::from_backends(
            vec![WeightedBackend::new(mock("p", "first"), 1), WeightedBackend::new(mock("p", "second"), 1)],
            seeded(),
        )
        .unwrap();
        for _ in 0..10 {
            assert_eq!(registry.get_default().identity().model, "first");
        }
    }

    #[test]
    fn test_get_exact_and_not_found() {
        let registry = ModelRegistry::from_backends(
            vec![WeightedBackend::new(mock("openai", "gpt-4o"), 1), WeightedBackend::new(mock("ollama", "qwen"), 1)],
            seeded(),
        )
        .unwrap();

        assert_eq!(registry.get_exact("ollama", "qwen").unwrap().identity().provider, "ollama");
        assert_eq!(
            registry.get_exact("ollama", "gpt-4o").err(),
            Some(RegistryError::NotFound { provider: "ollama".to_string(), model: "gpt-4o".to_string() })
        );
    }

    #[test]
    fn test_weighted_distribution() {
        let registry = ModelRegistry::from_backends(
            vec![WeightedBackend::new(mock("p", "A"), 1), WeightedBackend::new(mock("p", "B"), 3)],
            seeded(),
        )
        .unwrap();

        let mut a = 0u32;
        let mut b = 0u32;
        for _ in 0..10_000 {
            match registry.get_weighted().identity().model.as_str() {
                "A" => a += 1,
                "B" => b += 1,
                other => panic!("unexpected backend {}", other),
            }
        }

        let ratio = f64::from(b) / f64::from(a);
        assert!((2.7..=3.3).contains(&ratio), "ratio was {} (A={}, B={})", ratio, a, b);
    }

    #[test]
    fn test_zero_weight_never_selected() {
        let registry = ModelRegistry::from_backends(
            vec![WeightedBackend::new(mock("p", "off"), 0), WeightedBackend::new(mock("p", "on"), 2)],
            seeded(),
        )
        .unwrap();
        for _ in 0..500 {
            assert_eq!(registry.get_weighted().identity().model, "on");
        }
    }

    #[test]
    fn test_total_weight_zero_returns_default() {
        let registry = ModelRegistry::from_backends(
            vec![
                WeightedBackend::new(mock("p", "x"), 0),
                WeightedBackend::new(mock("p", "y"), 0).as_default(),
            ],
            seeded(),
        )
        .unwrap();
        assert_eq!(registry.total_weight(), 0);
        for _ in 0..100 {
            assert_eq!(registry.get_weighted().identity().model, "y");
        }
    }

    #[test]
    fn test_seeded_selection_is_reproducible() {
        let build = || {
            ModelRegistry::from_backends(
                vec![
                    WeightedBackend::new(mock("p", "a"), 1),
                    WeightedBackend::new(mock("p", "b"), 1),
                    WeightedBackend::new(mock("p", "c"), 1),
                ],
                StdRng::seed_from_u64(7),
            )
            .unwrap()
        };
        let first = build();
        let second = build();
        for _ in 0..50 {
            assert_eq!(first.get_weighted().identity(), second.get_weighted().identity());
        }
    }

    #[test]
    fn test_listing_follows_declaration_order() {
        let providers = vec![
            ProviderConfig::new("mock", "mock://1")
                .with_model(ModelEntry::new("z"))
                .with_model(ModelEntry::new("a")),
            ProviderConfig::new("other", "mock://2").with_kind("mock").with_model(ModelEntry::new("m")),
        ];
        let registry = ModelRegistry::build_with_rng(&providers, &BackendFactory::default(), seeded()).unwrap();

        let all: Vec<String> = registry.list_all().iter().map(ToString::to_string).collect();
        assert_eq!(all, vec!["mock/z", "mock/a", "other/m"]);
        assert_eq!(registry.list_by_provider("mock"), vec!["z", "a"]);
        assert!(registry.list_by_provider("missing").is_empty());
    }
}
