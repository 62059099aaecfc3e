//! The pull/push capability shared by caches and generators.

use std::fmt::Debug;

use async_trait::async_trait;
use tile_common::{Grants, Tile, TileAddress, TileResult};

/// A key that can be reduced to a deterministic string.
pub trait CacheKey: Clone + Send + Sync + Debug + 'static {
    fn hash(&self) -> String;
}

/// A value that can move through a [`ProviderChain`](crate::ProviderChain).
pub trait Cacheable: Clone + Send + Sync + 'static {
    type Key: CacheKey;

    fn key(&self) -> Self::Key;

    /// Grant restricting visibility of this value.
    fn grant(&self) -> Option<&str>;

    /// Id of the provider that produced this value.
    fn provenance(&self) -> &str;

    fn with_provenance(self, provenance: &str) -> Self;
}

/// A source and/or sink of cacheable values.
///
/// `pull` fails with `NotFound` both when the value is absent and when its
/// grant is not held by the caller. `push` is an idempotent upsert that
/// never fails from the caller's point of view.
#[async_trait]
pub trait Provider<T: Cacheable>: Send + Sync {
    /// Unique id of this provider instance.
    fn id(&self) -> &str;

    /// Short label for logs and metrics.
    fn kind(&self) -> &'static str;

    async fn pull(&self, key: &T::Key, grants: &Grants) -> TileResult<T>;

    async fn push(&self, item: T);
}

/// A fresh random provider id.
pub fn new_provider_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

impl CacheKey for TileAddress {
    fn hash(&self) -> String {
        TileAddress::hash(self)
    }
}

impl CacheKey for String {
    fn hash(&self) -> String {
        self.clone()
    }
}

impl Cacheable for Tile {
    type Key = TileAddress;

    fn key(&self) -> TileAddress {
        self.address.clone()
    }

    fn grant(&self) -> Option<&str> {
        self.grant.as_deref()
    }

    fn provenance(&self) -> &str {
        &self.provenance
    }

    fn with_provenance(self, provenance: &str) -> Self {
        Tile::with_provenance(self, provenance)
    }
}
