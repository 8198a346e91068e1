use std::collections::HashMap;
use std::sync::Arc;

use crate::SourceAdapter;

/// Tagged registry keyed by service name (spec §9: "a tagged-variant
/// registry keyed by service name selects the adapter"). Built once at
/// process start by the downloader binary and shared read-only across its
/// scheduling loop.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: HashMap<&'static str, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) {
        self.adapters.insert(adapter.service_name(), adapter);
    }

    pub fn get(&self, service_name: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(service_name).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SourceAdapter>> {
        self.adapters.values()
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GlobalAdapter;

    #[test]
    fn register_and_get_round_trips() {
        let mut reg = SourceRegistry::new();
        reg.register(Arc::new(GlobalAdapter::new("https://example.invalid/gfs")));
        assert_eq!(reg.len(), 1);
        assert!(reg.get("global").is_some());
        assert!(reg.get("nonexistent").is_none());
    }
}
