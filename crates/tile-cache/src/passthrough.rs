//! A provider that never stores anything.

use std::marker::PhantomData;

use async_trait::async_trait;
use tile_common::{Grants, TileError, TileResult};

use crate::provider::{new_provider_id, CacheKey, Cacheable, Provider};

/// Disables a cache layer without changing the chain's shape.
pub struct PassThroughProvider<T> {
    id: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> PassThroughProvider<T> {
    pub fn new() -> Self {
        Self {
            id: new_provider_id(),
            _marker: PhantomData,
        }
    }
}

impl<T> Default for PassThroughProvider<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Cacheable> Provider<T> for PassThroughProvider<T> {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "passthrough"
    }

    async fn pull(&self, key: &T::Key, _grants: &Grants) -> TileResult<T> {
        Err(TileError::not_found(key.hash()))
    }

    async fn push(&self, _item: T) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use tile_common::{Tile, TileAddress};

    #[tokio::test]
    async fn test_push_then_pull_is_still_not_found() {
        let provider = PassThroughProvider::<Tile>::new();
        let address = TileAddress::new("sky", 0, 0, 0);
        provider
            .push(Tile::new(address.clone(), None, None))
            .await;
        assert!(provider
            .pull(&address, &Grants::public())
            .await
            .unwrap_err()
            .is_not_found());
    }
}
