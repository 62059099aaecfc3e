//! Builds derived products on a cache miss.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::future::join_all;
use metrics::counter;
use tile_cache::{new_provider_id, CacheKey, Cacheable, Provider};
use tile_common::{Grants, TileAddress, TileError, TileResult};
use tracing::{debug, info};

use super::aperture::{aperture_box, ApertureStats};
use super::histogram::{colour_range, Histogram};
use super::{DerivedProduct, ProductKey, ProductPayload};
use crate::extract::Extractor;

/// Last provider of the product chain.
///
/// Reads the tiles it needs through the tile chain and promotes them there.
/// `NoData` results are returned as errors so the chain never caches them.
pub struct ProductBuilder {
    id: String,
    extractor: Arc<Extractor>,
}

impl ProductBuilder {
    pub fn new(extractor: Arc<Extractor>) -> Self {
        Self {
            id: new_provider_id(),
            extractor,
        }
    }

    async fn build_histogram(&self, layer_id: &str, grants: &Grants) -> TileResult<ProductPayload> {
        let layer = self.extractor.catalog().visible(layer_id, grants)?;
        let chain = self.extractor.chain();

        let roots = [
            TileAddress::new(layer_id, 0, 0, 0),
            TileAddress::new(layer_id, 0, 1, 0),
        ];
        let pulls = join_all(roots.iter().map(|a| chain.pull(a, grants))).await;

        let mut values = Vec::new();
        let mut promotions = Vec::new();
        for pulled in pulls {
            let pulled = pulled?;
            if let Some(payload) = &pulled.item.payload {
                values.extend(payload.values_f64());
            }
            promotions.extend(pulled.promotions);
        }
        chain.promote(promotions);

        let (vmin, vmax) = colour_range((layer.vmin, layer.vmax), &values)
            .map_err(|_| TileError::NoData(format!("layer {} has no finite pixels", layer_id)))?;
        Ok(ProductPayload::Histogram(Histogram::build(&values, vmin, vmax)))
    }

    async fn build_aperture(
        &self,
        layer_id: &str,
        ra: f64,
        dec: f64,
        radius_arcmin: f64,
        grants: &Grants,
    ) -> TileResult<ProductPayload> {
        let bbox = aperture_box(ra, dec, radius_arcmin);
        let cutout = match self.extractor.extract_valid(layer_id, &bbox, grants).await {
            Ok(cutout) => cutout,
            Err(TileError::InvalidBbox(_)) => {
                return Err(TileError::NoData(format!(
                    "aperture of {} arcmin covers no pixel of {}",
                    radius_arcmin, layer_id
                )))
            }
            Err(e) => return Err(e),
        };
        self.extractor.chain().promote(cutout.promotions);

        let stats = ApertureStats::measure(&cutout.data)?;
        Ok(ProductPayload::Aperture(stats))
    }
}

#[async_trait]
impl Provider<DerivedProduct> for ProductBuilder {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "builder"
    }

    async fn pull(&self, key: &ProductKey, grants: &Grants) -> TileResult<DerivedProduct> {
        let start = Instant::now();
        let payload = match key {
            ProductKey::Histogram { layer_id } => self.build_histogram(layer_id, grants).await,
            ProductKey::Aperture {
                layer_id,
                ra,
                dec,
                radius_arcmin,
            } => {
                self.build_aperture(layer_id, *ra, *dec, *radius_arcmin, grants)
                    .await
            }
        };

        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => {
                debug!(key = %key.hash(), error = %e, "Product not built");
                return Err(e);
            }
        };

        let grant = self
            .extractor
            .catalog()
            .get(key.layer_id())
            .and_then(|layer| layer.grant.clone());

        counter!("derived_products_built_total", "kind" => key.kind()).increment(1);
        info!(
            key = %key.hash(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Built derived product"
        );

        Ok(DerivedProduct::new(key.clone(), payload, grant).with_provenance(&self.id))
    }

    async fn push(&self, _item: DerivedProduct) {}
}
