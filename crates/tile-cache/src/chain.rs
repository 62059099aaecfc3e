//! Ordered provider fallback with promotion.
//!
//! Pull providers are consulted in priority order, fastest first. The first
//! value visible to the caller wins. If it came from any provider other than
//! the first, it is handed back as a promotion so the caller can push it
//! into the faster layers once the response is on its way.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use metrics::counter;
use tile_common::{Grants, TileError, TileResult};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::provider::{CacheKey, Cacheable, Provider};

/// Result of a chain pull.
#[derive(Debug, Clone)]
pub struct Pulled<T> {
    pub item: T,
    /// Values the faster providers missed, to be pushed back later.
    pub promotions: Vec<T>,
}

/// Ordered pull providers plus the push fan-out set.
pub struct ProviderChain<T: Cacheable> {
    pull_providers: Vec<Arc<dyn Provider<T>>>,
    push_providers: Vec<Arc<dyn Provider<T>>>,
}

impl<T: Cacheable> ProviderChain<T> {
    pub fn builder() -> ProviderChainBuilder<T> {
        ProviderChainBuilder::default()
    }

    pub fn pull_providers(&self) -> &[Arc<dyn Provider<T>>] {
        &self.pull_providers
    }

    pub fn push_providers(&self) -> &[Arc<dyn Provider<T>>] {
        &self.push_providers
    }

    /// Pull from the providers in priority order.
    ///
    /// `NotFound` and unexpected provider errors fall through to the next
    /// provider. `NoData` ends the search and is returned as is, so it is
    /// never cached.
    pub async fn pull(&self, key: &T::Key, grants: &Grants) -> TileResult<Pulled<T>> {
        let hash = key.hash();
        let start = Instant::now();

        for (index, provider) in self.pull_providers.iter().enumerate() {
            match provider.pull(key, grants).await {
                Ok(item) => {
                    // Providers filter by grant themselves; this is the chain's own check.
                    if !grants.permits(item.grant()) {
                        counter!("tile_provider_misses_total", "provider" => provider.kind())
                            .increment(1);
                        continue;
                    }

                    counter!("tile_provider_hits_total", "provider" => provider.kind())
                        .increment(1);
                    debug!(
                        key = %hash,
                        provider = provider.kind(),
                        priority = index,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Provider hit"
                    );

                    let promotions = if index > 0 {
                        vec![item.clone()]
                    } else {
                        Vec::new()
                    };
                    return Ok(Pulled { item, promotions });
                }
                Err(e) if e.is_not_found() => {
                    counter!("tile_provider_misses_total", "provider" => provider.kind())
                        .increment(1);
                }
                Err(e) if e.is_no_data() || e.is_validation() => return Err(e),
                Err(e) => {
                    counter!("tile_provider_misses_total", "provider" => provider.kind())
                        .increment(1);
                    warn!(key = %hash, provider = provider.kind(), error = %e, "Provider failed, trying next");
                }
            }
        }

        Err(TileError::not_found(hash))
    }

    /// Fan a value out to every push provider.
    pub async fn push(&self, item: T) {
        join_all(
            self.push_providers
                .iter()
                .map(|provider| provider.push(item.clone())),
        )
        .await;
    }

    /// Push promotions on a background task.
    ///
    /// Each push replaces whole entries, so a task dropped midway leaves
    /// every cache either with or without the value, never with part of it.
    pub fn promote(self: &Arc<Self>, items: Vec<T>) -> Option<JoinHandle<()>> {
        if items.is_empty() || self.push_providers.is_empty() {
            return None;
        }

        let chain = Arc::clone(self);
        Some(tokio::spawn(async move {
            let count = items.len();
            for item in items {
                chain.push(item).await;
            }
            counter!("tile_promotions_total").increment(count as u64);
            debug!(count = count, "Promoted values into faster providers");
        }))
    }

    /// Pull a value and promote it in the background.
    pub async fn pull_and_promote(self: &Arc<Self>, key: &T::Key, grants: &Grants) -> TileResult<T> {
        let pulled = self.pull(key, grants).await?;
        self.promote(pulled.promotions);
        Ok(pulled.item)
    }
}

/// Builds a [`ProviderChain`] in priority order.
pub struct ProviderChainBuilder<T: Cacheable> {
    pull_providers: Vec<Arc<dyn Provider<T>>>,
    push_providers: Vec<Arc<dyn Provider<T>>>,
}

impl<T: Cacheable> Default for ProviderChainBuilder<T> {
    fn default() -> Self {
        Self {
            pull_providers: Vec::new(),
            push_providers: Vec::new(),
        }
    }
}

impl<T: Cacheable> ProviderChainBuilder<T> {
    /// Add a provider that is both read and written.
    pub fn with_cache(mut self, provider: Arc<dyn Provider<T>>) -> Self {
        self.pull_providers.push(provider.clone());
        self.push_providers.push(provider);
        self
    }

    /// Add a read-only provider at the next priority.
    pub fn with_pull(mut self, provider: Arc<dyn Provider<T>>) -> Self {
        self.pull_providers.push(provider);
        self
    }

    /// Add a write-only provider.
    pub fn with_push(mut self, provider: Arc<dyn Provider<T>>) -> Self {
        self.push_providers.push(provider);
        self
    }

    pub fn build(self) -> ProviderChain<T> {
        ProviderChain {
            pull_providers: self.pull_providers,
            push_providers: self.push_providers,
        }
    }
}
