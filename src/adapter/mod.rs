use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use async_trait::async_trait;
use lazy_static::lazy_static;

use crate::{exporter::SeriesPoint, interval::Interval};

pub mod error;

use error::{RegistryError, Result};

/// Capability exposed by every protocol-specific source adapter.
///
/// An adapter either returns the complete set of raw points for the requested
/// range or fails; partial success within a single range is not possible at
/// this layer.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Registry key, e.g. `"moex"` or `"cbr"`.
    fn source_type(&self) -> &str;

    /// Human-readable description of the source.
    fn description(&self) -> &str;

    /// Fetches raw values for the instrument described by `instrument_params`
    /// between the bounds of `range`.
    async fn fetch(&self, instrument_params: &str, range: Interval) -> Result<Vec<SeriesPoint>>;

    /// Checks whether the source API is currently reachable and behaving.
    ///
    /// Default implementation reports the source as available; adapters with a
    /// cheap health endpoint should override it.
    async fn probe(&self) -> Result<()> {
        Ok(())
    }
}

/// Process-wide registry of available source adapters.
///
/// Adapters are registered explicitly at startup and looked up by source-type
/// key; there is no implicit discovery.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: RwLock<HashMap<String, Arc<dyn SourceAdapter>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, adapter: Arc<dyn SourceAdapter>) -> Result<(), RegistryError> {
        let source_type = adapter.source_type().to_string();

        let mut adapters = self
            .adapters
            .write()
            .expect("`AdapterRegistry` lock can't be poisoned");

        if adapters.contains_key(&source_type) {
            return Err(RegistryError::DuplicateSourceType(source_type));
        }

        adapters.insert(source_type, adapter);

        Ok(())
    }

    pub fn get(&self, source_type: &str) -> Result<Arc<dyn SourceAdapter>, RegistryError> {
        self.adapters
            .read()
            .expect("`AdapterRegistry` lock can't be poisoned")
            .get(source_type)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownSourceType(source_type.to_string()))
    }

    pub fn source_types(&self) -> Vec<String> {
        let mut source_types: Vec<String> = self
            .adapters
            .read()
            .expect("`AdapterRegistry` lock can't be poisoned")
            .keys()
            .cloned()
            .collect();
        source_types.sort();
        source_types
    }

    pub fn contains(&self, source_type: &str) -> bool {
        self.adapters
            .read()
            .expect("`AdapterRegistry` lock can't be poisoned")
            .contains_key(source_type)
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("source_types", &self.source_types())
            .finish()
    }
}

lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<AdapterRegistry> = Arc::new(AdapterRegistry::new());
}

/// The default process-wide registry.
pub fn global_registry() -> Arc<AdapterRegistry> {
    GLOBAL_REGISTRY.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubAdapter(&'static str);

    #[async_trait]
    impl SourceAdapter for StubAdapter {
        fn source_type(&self) -> &str {
            self.0
        }

        fn description(&self) -> &str {
            "stub"
        }

        async fn fetch(
            &self,
            _instrument_params: &str,
            _range: Interval,
        ) -> Result<Vec<SeriesPoint>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn register_and_lookup_by_source_type() {
        let registry = AdapterRegistry::new();
        registry.register(Arc::new(StubAdapter("moex"))).unwrap();
        registry.register(Arc::new(StubAdapter("cbr"))).unwrap();

        assert!(registry.contains("moex"));
        assert_eq!(registry.get("cbr").unwrap().source_type(), "cbr");
        assert_eq!(registry.source_types(), vec!["cbr", "moex"]);

        assert!(matches!(
            registry.get("lse"),
            Err(RegistryError::UnknownSourceType(_))
        ));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = AdapterRegistry::new();
        registry.register(Arc::new(StubAdapter("moex"))).unwrap();

        assert!(matches!(
            registry.register(Arc::new(StubAdapter("moex"))),
            Err(RegistryError::DuplicateSourceType(_))
        ));
    }
}
