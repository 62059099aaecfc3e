//! Layer ingestion: read the archive, validate it against the layer config,
//! build the pyramid and publish its tiles.
//!
//! A layer whose ingestion fails is never published.

use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use tile_cache::ProviderChain;
use tile_common::{LayerCatalog, LayerConfig, LayerMetadata, Tile, TileError, TileResult};
use tracing::{error, info};

use crate::archive::{RasterArchive, ZarrArchive};
use crate::error::RasterError;
use crate::pyramid::AnyPyramid;

/// A layer whose pyramid has been built but not necessarily published.
#[derive(Debug, Clone)]
pub struct IngestedLayer {
    pub metadata: Arc<LayerMetadata>,
    pub pyramid: AnyPyramid,
}

/// Outcome of ingesting several layers.
#[derive(Debug)]
pub struct IngestReport {
    /// Catalog of the layers that succeeded.
    pub catalog: LayerCatalog,
    pub layers: Vec<IngestedLayer>,
    /// Layers that were rejected, with the reason.
    pub failed: Vec<(String, TileError)>,
}

/// Build one layer from an already opened archive.
///
/// Single-threaded; meant to run on a blocking thread.
pub fn build_layer(config: &LayerConfig, archive: &dyn RasterArchive) -> TileResult<IngestedLayer> {
    let start = Instant::now();
    let (width, height) = archive.shape();
    let (width, height) = match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) => (w, h),
        _ => {
            return Err(RasterError::ShapeMismatch(format!(
                "{}x{} raster is too large",
                width, height
            ))
            .into())
        }
    };

    let metadata = LayerMetadata::from_config(config, width, height, archive.element_type())?;
    let data = archive.read_all()?;
    if data.width() != width as usize || data.height() != height as usize {
        return Err(RasterError::ShapeMismatch(format!(
            "archive reported {}x{} but returned {}x{}",
            width,
            height,
            data.width(),
            data.height()
        ))
        .into());
    }

    let pyramid = AnyPyramid::build(&data, metadata.geometry, metadata.raster_offset())?;

    info!(
        layer_id = %metadata.layer_id,
        width = width,
        height = height,
        tile_size = metadata.tile_size(),
        levels = metadata.number_of_levels(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Built layer pyramid"
    );

    Ok(IngestedLayer {
        metadata: Arc::new(metadata),
        pyramid,
    })
}

/// Open a layer's Zarr archive and build it on a blocking thread.
pub async fn ingest_layer(config: LayerConfig) -> TileResult<IngestedLayer> {
    config.validate()?;
    tokio::task::spawn_blocking(move || {
        let archive = ZarrArchive::open_path(&config.archive)?;
        build_layer(&config, &archive)
    })
    .await
    .map_err(|e| TileError::Ingestion(format!("ingestion task failed: {}", e)))?
}

/// Ingest independent layers concurrently.
///
/// Failures are logged and left out of the returned catalog.
pub async fn ingest_layers(configs: Vec<LayerConfig>) -> IngestReport {
    let ids: Vec<String> = configs.iter().map(|c| c.layer_id.clone()).collect();
    let results = join_all(configs.into_iter().map(ingest_layer)).await;

    let mut layers = Vec::new();
    let mut failed = Vec::new();
    for (layer_id, result) in ids.into_iter().zip(results) {
        match result {
            Ok(layer) => layers.push(layer),
            Err(e) => {
                error!(layer_id = %layer_id, error = %e, "Layer ingestion failed, not publishing");
                failed.push((layer_id, e));
            }
        }
    }

    let catalog = LayerCatalog::new(layers.iter().map(|l| l.metadata.as_ref().clone()));
    IngestReport {
        catalog,
        layers,
        failed,
    }
}

/// Push every tile of a built pyramid through a chain. Returns the number
/// of tiles pushed.
pub async fn publish_pyramid(layer: &IngestedLayer, chain: &ProviderChain<Tile>) -> TileResult<usize> {
    let tiles = layer.pyramid.tiles(&layer.metadata)?;
    let count = tiles.len();
    for tile in tiles {
        chain.push(tile).await;
    }
    info!(layer_id = %layer.metadata.layer_id, tiles = count, "Published pyramid");
    Ok(count)
}
