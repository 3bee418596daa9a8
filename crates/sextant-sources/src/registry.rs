use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use sextant_cache::QueryCache;
use sextant_core::config::AppConfig;
use sextant_core::traits::SourceAdapter;

use crate::adapters::{GithubTrendsSource, HackerNewsSource, SerperKind, SerperSource, YoutubeSource};
use crate::cached::CachedSource;
use crate::throttle::Throttle;

/// Registry of available source adapters, keyed by adapter name.
pub struct SourceRegistry {
    sources: HashMap<String, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
        }
    }

    /// Register an adapter under its own name.
    pub fn register(&mut self, source: impl SourceAdapter) {
        self.register_arc(Arc::new(source));
    }

    pub fn register_arc(&mut self, source: Arc<dyn SourceAdapter>) {
        let name = source.name().to_string();
        self.sources.insert(name, source);
    }

    /// Get an adapter by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn SourceAdapter>> {
        self.sources.get(name).cloned()
    }

    /// All registered adapter names, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.sources.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Create a registry with every built-in adapter, each behind the query
    /// cache and a throttle shared by its source type.
    ///
    /// Adapters missing an API key are still registered; their calls fail
    /// with a config error, which aggregation reports as unavailable.
    pub fn with_builtins(config: &AppConfig, cache: QueryCache) -> Self {
        let sources = &config.sources;
        let timeout = sources.timeout();

        let mut adapters: Vec<Arc<dyn SourceAdapter>> = vec![
            Arc::new(SerperSource::new(SerperKind::Search, sources.serper.as_ref(), timeout)),
            Arc::new(SerperSource::new(SerperKind::News, sources.serper.as_ref(), timeout)),
            Arc::new(GithubTrendsSource::new(sources.github.as_ref(), timeout)),
            Arc::new(YoutubeSource::new(sources.youtube.as_ref(), timeout)),
        ];
        if sources.hackernews.enabled {
            adapters.push(Arc::new(HackerNewsSource::new(&sources.hackernews, timeout)));
        }

        let mut throttles: HashMap<String, Arc<Throttle>> = HashMap::new();
        let mut registry = Self::new();
        for adapter in adapters {
            let throttle = throttles
                .entry(adapter.source_type().to_string())
                .or_insert_with(|| Arc::new(Throttle::new(sources.min_interval())))
                .clone();
            let ttl = config.cache.ttl_for(adapter.name());
            debug!(source = adapter.name(), ttl_secs = ttl.as_secs(), "Registered source");
            registry.register(CachedSource::new(adapter, cache.clone(), throttle, ttl));
        }

        registry
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
