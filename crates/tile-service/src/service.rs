//! Wires the published layers, caches and generators into one handle that
//! request handlers share.

use std::sync::Arc;

use futures::future::join_all;
use raster::{publish_pyramid, IngestedLayer, SourceTileProvider};
use tile_cache::{
    MemoryCache, PassThroughProvider, Provider, ProviderChain, ProviderChainBuilder, RedisStore,
    RemoteCache, TileCodec,
};
use tile_common::{BoundingBox, Grants, LayerCatalog, Tile, TileAddress, TileData, TileResult};
use tracing::{info, warn};

use crate::config::{CacheLayerKind, ServiceConfig};
use crate::extract::{Cutout, Extractor, DEFAULT_TILE_CONCURRENCY};
use crate::products::{DerivedProduct, ProductBuilder, ProductCodec, ProductKey};

const PRODUCT_KEY_PREFIX: &str = "skytiles:product:";

/// Tile reads, cutouts and derived products over the configured caches.
pub struct TileService {
    catalog: Arc<LayerCatalog>,
    tiles: Arc<ProviderChain<Tile>>,
    products: Arc<ProviderChain<DerivedProduct>>,
    extractor: Arc<Extractor>,
}

impl TileService {
    /// Build the provider chains described by `config`.
    ///
    /// Cache layers are consulted in the configured order; `source` is
    /// always the last tile provider and the product builder the last
    /// product provider.
    pub async fn new(
        config: &ServiceConfig,
        catalog: LayerCatalog,
        source: SourceTileProvider,
    ) -> TileResult<Self> {
        config.validate()?;
        let catalog = Arc::new(catalog);

        let mut tiles = ProviderChain::<Tile>::builder();
        let mut products = ProviderChain::<DerivedProduct>::builder();

        for kind in &config.cache_layers {
            let (tile_cache, product_cache): (
                Arc<dyn Provider<Tile>>,
                Arc<dyn Provider<DerivedProduct>>,
            ) = match kind {
                CacheLayerKind::Memory => (
                    Arc::new(MemoryCache::<Tile>::new(config.memory_cache_capacity)),
                    Arc::new(MemoryCache::<DerivedProduct>::new(config.product_cache_capacity)),
                ),
                CacheLayerKind::Redis => {
                    let tile_store = RedisStore::connect(&config.redis_url).await?;
                    let product_store = RedisStore::connect(&config.redis_url)
                        .await?
                        .with_prefix(PRODUCT_KEY_PREFIX);
                    (
                        Arc::new(
                            RemoteCache::<Tile>::new(
                                Arc::new(tile_store),
                                Arc::new(TileCodec::new(catalog.clone())),
                                config.redis_timeout(),
                            )
                            .with_ttl(config.redis_ttl()),
                        ),
                        Arc::new(
                            RemoteCache::<DerivedProduct>::new(
                                Arc::new(product_store),
                                Arc::new(ProductCodec),
                                config.redis_timeout(),
                            )
                            .with_ttl(config.redis_ttl()),
                        ),
                    )
                }
                CacheLayerKind::Passthrough => (
                    Arc::new(PassThroughProvider::<Tile>::new()),
                    Arc::new(PassThroughProvider::<DerivedProduct>::new()),
                ),
            };
            tiles = tiles.with_cache(tile_cache);
            products = products.with_cache(product_cache);
        }

        let tiles = Arc::new(
            tiles
                .with_pull(Arc::new(source.with_subsampling(config.subsample)))
                .build(),
        );

        let service = Self::assemble(catalog, tiles, products, config.tile_fetch_concurrency);

        info!(
            layers = service.catalog.len(),
            cache_layers = ?config.cache_layers,
            subsample = config.subsample,
            tile_fetch_concurrency = config.tile_fetch_concurrency,
            "Tile service ready"
        );

        if config.precache {
            service.precache().await;
        }
        Ok(service)
    }

    /// Assemble a service from a prepared tile chain. The product builder is
    /// appended to `products` as its last provider.
    pub fn from_chains(
        catalog: Arc<LayerCatalog>,
        tiles: Arc<ProviderChain<Tile>>,
        products: ProviderChainBuilder<DerivedProduct>,
    ) -> Self {
        Self::assemble(catalog, tiles, products, DEFAULT_TILE_CONCURRENCY)
    }

    fn assemble(
        catalog: Arc<LayerCatalog>,
        tiles: Arc<ProviderChain<Tile>>,
        products: ProviderChainBuilder<DerivedProduct>,
        tile_concurrency: usize,
    ) -> Self {
        let extractor = Arc::new(
            Extractor::new(catalog.clone(), tiles.clone()).with_concurrency(tile_concurrency),
        );
        let products = Arc::new(
            products
                .with_pull(Arc::new(ProductBuilder::new(extractor.clone())))
                .build(),
        );
        Self {
            catalog,
            tiles,
            products,
            extractor,
        }
    }

    pub fn catalog(&self) -> &Arc<LayerCatalog> {
        &self.catalog
    }

    pub fn tile_chain(&self) -> &Arc<ProviderChain<Tile>> {
        &self.tiles
    }

    pub fn product_chain(&self) -> &Arc<ProviderChain<DerivedProduct>> {
        &self.products
    }

    /// Read one tile, promoting it into faster caches in the background.
    pub async fn read_tile(&self, address: &TileAddress, grants: &Grants) -> TileResult<Tile> {
        let layer = self.catalog.visible(&address.layer_id, grants)?;
        layer.check_address(address)?;
        self.tiles.pull_and_promote(address, grants).await
    }

    /// Cutout at native resolution.
    pub async fn extract(&self, layer_id: &str, bbox: &BoundingBox, grants: &Grants) -> TileResult<TileData> {
        Ok(self.extract_cutout(layer_id, bbox, grants, None).await?.data)
    }

    /// Cutout with optional tile outlines; promotions are pushed in the
    /// background before returning.
    pub async fn extract_cutout(
        &self,
        layer_id: &str,
        bbox: &BoundingBox,
        grants: &Grants,
        grid_value: Option<f64>,
    ) -> TileResult<Cutout> {
        let mut cutout = self
            .extractor
            .extract_with_grid(layer_id, bbox, grants, grid_value)
            .await?;
        self.tiles.promote(std::mem::take(&mut cutout.promotions));
        Ok(cutout)
    }

    pub async fn histogram(&self, layer_id: &str, grants: &Grants) -> TileResult<DerivedProduct> {
        self.products
            .pull_and_promote(&ProductKey::histogram(layer_id), grants)
            .await
    }

    pub async fn aperture(
        &self,
        layer_id: &str,
        ra: f64,
        dec: f64,
        radius_arcmin: f64,
        grants: &Grants,
    ) -> TileResult<DerivedProduct> {
        let key = ProductKey::aperture(layer_id, ra, dec, radius_arcmin)?;
        self.products.pull_and_promote(&key, grants).await
    }

    /// Build the histogram of every layer. Returns how many were built.
    pub async fn precache(&self) -> usize {
        let results = join_all(self.catalog.iter().map(|layer| async move {
            let grants = Grants::for_grant(layer.grant.as_deref());
            (layer.layer_id.clone(), self.histogram(&layer.layer_id, &grants).await)
        }))
        .await;

        let mut built = 0;
        for (layer_id, result) in results {
            match result {
                Ok(_) => built += 1,
                Err(e) => warn!(layer_id = %layer_id, error = %e, "Precache failed"),
            }
        }
        info!(built = built, layers = self.catalog.len(), "Precached histograms");
        built
    }

    /// Push every tile of ingested pyramids into the caches.
    pub async fn publish(&self, layers: &[IngestedLayer]) -> TileResult<usize> {
        let mut pushed = 0;
        for layer in layers {
            pushed += publish_pyramid(layer, &self.tiles).await?;
        }
        Ok(pushed)
    }
}
