//! Tiles round-tripped through a shared cache layer in front of a generator.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use test_utils::{full_sky_config, full_sky_metadata};
use tile_cache::{KvStore, Provider, ProviderChain, RemoteCache, TileCodec};
use tile_common::{
    ElementType, Grants, LayerCatalog, LayerMetadata, Raster, Tile, TileAddress, TileData,
    TileError, TileResult,
};
use tokio::sync::Mutex;

/// In-process stand-in for Redis.
#[derive(Default)]
struct MapStore {
    values: Mutex<HashMap<String, Vec<u8>>>,
}

impl MapStore {
    async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self.values.lock().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl KvStore for MapStore {
    async fn get(&self, key: &str) -> TileResult<Option<Bytes>> {
        Ok(self.values.lock().await.get(key).cloned().map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Vec<u8>, _ttl: Option<Duration>) -> TileResult<()> {
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// Generates full-size tiles in each layer's element type. Column 1 of the
/// "sky" layer has no payload.
struct Generator {
    catalog: Arc<LayerCatalog>,
    calls: AtomicUsize,
}

impl Generator {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider<Tile> for Generator {
    fn id(&self) -> &str {
        "generator"
    }

    fn kind(&self) -> &'static str {
        "generator"
    }

    async fn pull(&self, address: &TileAddress, grants: &Grants) -> TileResult<Tile> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let layer = self
            .catalog
            .visible(&address.layer_id, grants)
            .map_err(|_| TileError::not_found(address.hash()))?;

        let size = layer.tile_size() as usize;
        let payload = match (layer.element_type, address.x) {
            (ElementType::Float64, x) => {
                Some(TileData::Float64(Raster::filled(size, size, x as f64 + 0.25)))
            }
            (_, 1) => None,
            (_, x) => Some(TileData::Float32(Raster::filled(size, size, x as f32 - 3.5))),
        };
        Ok(Tile::new(address.clone(), payload, layer.grant.clone()).with_provenance("generator"))
    }

    async fn push(&self, _item: Tile) {}
}

struct Fixture {
    chain: Arc<ProviderChain<Tile>>,
    remote: Arc<RemoteCache<Tile>>,
    store: Arc<MapStore>,
    generator: Arc<Generator>,
}

fn fixture() -> Fixture {
    let deep = LayerMetadata::from_config(
        &full_sky_config("deep", "deep.zarr").with_grant("priv"),
        512,
        256,
        ElementType::Float64,
    )
    .unwrap();
    let catalog = Arc::new(LayerCatalog::new([full_sky_metadata("sky", 512, 256), deep]));

    let store = Arc::new(MapStore::default());
    let remote = Arc::new(RemoteCache::<Tile>::new(
        store.clone(),
        Arc::new(TileCodec::new(catalog.clone())),
        Duration::from_millis(100),
    ));
    let generator = Arc::new(Generator {
        catalog,
        calls: AtomicUsize::new(0),
    });
    let chain = Arc::new(
        ProviderChain::<Tile>::builder()
            .with_cache(remote.clone())
            .with_pull(generator.clone())
            .build(),
    );

    Fixture {
        chain,
        remote,
        store,
        generator,
    }
}

#[tokio::test]
async fn test_miss_is_promoted_into_shared_cache() {
    let fx = fixture();
    let address = TileAddress::new("sky", 0, 0, 0);
    let grants = Grants::public();

    let first = fx.chain.pull(&address, &grants).await.unwrap();
    assert_eq!(first.item.provenance, "generator");
    assert_eq!(first.promotions.len(), 1);
    assert!(fx.store.keys().await.is_empty());

    fx.chain.promote(first.promotions).unwrap().await.unwrap();
    assert_eq!(fx.store.keys().await, vec![address.hash()]);

    let second = fx.chain.pull(&address, &grants).await.unwrap();
    assert_eq!(second.item.provenance, fx.remote.id());
    assert!(second.promotions.is_empty());
    assert_eq!(fx.generator.calls(), 1);

    let payload = second.item.payload.as_ref().unwrap();
    assert_eq!(payload.element_type(), ElementType::Float32);
    assert_eq!((payload.width(), payload.height()), (256, 256));
    assert!(payload.bit_eq(first.item.payload.as_ref().unwrap()));
    assert_eq!(second.item.grant, None);
}

#[tokio::test]
async fn test_decoded_tile_keeps_grant_and_element_type() {
    let fx = fixture();
    let address = TileAddress::new("deep", 0, 1, 0);
    let grants = Grants::for_grant(Some("priv"));

    let first = fx.chain.pull(&address, &grants).await.unwrap();
    fx.chain.promote(first.promotions).unwrap().await.unwrap();

    let cached = fx.remote.pull(&address, &grants).await.unwrap();
    assert_eq!(cached.grant.as_deref(), Some("priv"));
    let payload = cached.payload.as_ref().unwrap();
    assert_eq!(payload.element_type(), ElementType::Float64);
    assert_eq!(payload.get_f64(17, 200), Some(1.25));
    assert!(payload.bit_eq(first.item.payload.as_ref().unwrap()));

    // The stored blob is visible only with the grant.
    let err = fx.chain.pull(&address, &Grants::public()).await.unwrap_err();
    assert!(err.is_not_found(), "{:?}", err);
    assert!(fx.remote.pull(&address, &Grants::public()).await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn test_tile_without_payload_survives_shared_cache() {
    let fx = fixture();
    let address = TileAddress::new("sky", 0, 1, 0);
    let grants = Grants::public();

    let first = fx.chain.pull(&address, &grants).await.unwrap();
    assert!(first.item.payload.is_none());
    fx.chain.promote(first.promotions).unwrap().await.unwrap();

    let second = fx.chain.pull(&address, &grants).await.unwrap();
    assert_eq!(second.item.provenance, fx.remote.id());
    assert!(second.item.payload.is_none());
    assert_eq!(second.item.address, address);
    assert_eq!(fx.generator.calls(), 1);
}
