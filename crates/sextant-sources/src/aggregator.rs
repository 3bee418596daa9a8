use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{info, warn};

use sextant_core::error::SextantError;
use sextant_core::types::{QueryParams, ResearchBundle, SourceContribution};

use crate::registry::SourceRegistry;

/// Fans one topic out to several sources and fans the results back in.
///
/// A source that fails, times out, or is not registered contributes an
/// `Unavailable` placeholder; it never fails the bundle or its siblings.
pub struct ResearchAggregator {
    registry: Arc<SourceRegistry>,
    timeout: Duration,
}

impl ResearchAggregator {
    pub fn new(registry: Arc<SourceRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Query every named source concurrently and wait for all of them.
    ///
    /// The bundle has exactly one entry per key in `queries`, regardless of
    /// which calls succeeded or the order they finished in.
    pub async fn gather(
        &self,
        topic: &str,
        queries: BTreeMap<String, QueryParams>,
    ) -> ResearchBundle {
        let calls = queries.into_iter().map(|(name, params)| async move {
            let contribution = self.call(&name, &params).await;
            (name, contribution)
        });
        let results = join_all(calls).await;

        let mut bundle = ResearchBundle::new(topic);
        for (name, contribution) in results {
            bundle.insert(name, contribution);
        }

        info!(
            topic,
            sources = bundle.sources.len(),
            evidenced = bundle.evidenced_sources().len(),
            coverage = ?bundle.coverage(),
            "Research gathered"
        );
        bundle
    }

    async fn call(&self, name: &str, params: &QueryParams) -> SourceContribution {
        let Some(source) = self.registry.get(name) else {
            warn!(source = name, "No adapter registered");
            return SourceContribution::unavailable("no adapter registered");
        };

        match tokio::time::timeout(self.timeout, source.fetch(params)).await {
            Ok(Ok(payload)) => SourceContribution::Found(payload),
            Ok(Err(e)) => {
                warn!(source = name, error = %e, "Source failed, continuing without it");
                SourceContribution::unavailable(e.to_string())
            }
            Err(_) => {
                let e = SextantError::Timeout {
                    target: name.to_string(),
                    timeout_ms: self.timeout.as_millis() as u64,
                };
                warn!(source = name, error = %e, "Source timed out, continuing without it");
                SourceContribution::unavailable(e.to_string())
            }
        }
    }
}
