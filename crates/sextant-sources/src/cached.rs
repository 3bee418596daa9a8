use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use sextant_cache::QueryCache;
use sextant_core::error::Result;
use sextant_core::traits::SourceAdapter;
use sextant_core::types::{QueryParams, SourcePayload};

use crate::throttle::Throttle;

/// Wraps an adapter with the query cache and its source type's throttle.
///
/// The throttle only gates live calls; cache hits return immediately. A
/// failed live call is returned as-is and nothing is cached.
pub struct CachedSource {
    inner: Arc<dyn SourceAdapter>,
    cache: QueryCache,
    throttle: Arc<Throttle>,
    ttl: Duration,
}

impl CachedSource {
    pub fn new(
        inner: Arc<dyn SourceAdapter>,
        cache: QueryCache,
        throttle: Arc<Throttle>,
        ttl: Duration,
    ) -> Self {
        Self {
            inner,
            cache,
            throttle,
            ttl,
        }
    }
}

impl SourceAdapter for CachedSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn source_type(&self) -> &str {
        self.inner.source_type()
    }

    fn fetch(&self, params: &QueryParams) -> BoxFuture<'_, Result<SourcePayload>> {
        let params = params.clone();
        Box::pin(async move {
            self.cache
                .try_get_or_fetch(self.inner.name(), &params, self.ttl, || async {
                    self.throttle.acquire().await;
                    self.inner.fetch(&params).await
                })
                .await
        })
    }
}
