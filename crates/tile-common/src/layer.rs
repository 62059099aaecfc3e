//! Layer definitions and the published layer catalog.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bbox::BoundingBox;
use crate::error::{TileError, TileResult};
use crate::geometry::PyramidGeometry;
use crate::grants::Grants;
use crate::raster::ElementType;
use crate::tile::TileAddress;

/// Relative tolerance when comparing the pixel scale of the two axes.
const SCALE_TOLERANCE: f64 = 1e-6;

/// Largest distance, in pixels, from a whole-pixel grid position.
const PIXEL_TOLERANCE: f64 = 1e-3;

/// Per-layer configuration handed over by the configuration collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerConfig {
    pub layer_id: String,

    /// Grant restricting visibility, `None` for public layers.
    #[serde(default)]
    pub grant: Option<String>,

    /// Sky area covered by the archival raster.
    pub bbox: BoundingBox,

    /// Location of the archival raster.
    pub archive: String,

    /// Explicit tile size; derived from the world grid when absent.
    #[serde(default)]
    pub tile_size: Option<u32>,

    /// Explicit level count; derived from the world grid when absent.
    #[serde(default)]
    pub number_of_levels: Option<u32>,

    /// Fixed colour range. "auto" when either bound is absent.
    #[serde(default)]
    pub vmin: Option<f64>,
    #[serde(default)]
    pub vmax: Option<f64>,
}

impl LayerConfig {
    pub fn new(layer_id: impl Into<String>, bbox: BoundingBox, archive: impl Into<String>) -> Self {
        Self {
            layer_id: layer_id.into(),
            grant: None,
            bbox,
            archive: archive.into(),
            tile_size: None,
            number_of_levels: None,
            vmin: None,
            vmax: None,
        }
    }

    pub fn with_grant(mut self, grant: impl Into<String>) -> Self {
        self.grant = Some(grant.into());
        self
    }

    pub fn with_geometry(mut self, tile_size: u32, number_of_levels: u32) -> Self {
        self.tile_size = Some(tile_size);
        self.number_of_levels = Some(number_of_levels);
        self
    }

    pub fn with_range(mut self, vmin: f64, vmax: f64) -> Self {
        self.vmin = Some(vmin);
        self.vmax = Some(vmax);
        self
    }

    /// Boundary validation before anything is read from the archive.
    pub fn validate(&self) -> TileResult<()> {
        if self.layer_id.is_empty() || self.layer_id.chars().any(char::is_whitespace) {
            return Err(TileError::invalid_parameter(
                "layer_id",
                format!("'{}' must be non-empty without whitespace", self.layer_id),
            ));
        }
        if let Some(grant) = &self.grant {
            Grants::new([grant.as_str()])?;
        }
        if self.archive.is_empty() {
            return Err(TileError::invalid_parameter("archive", "must not be empty"));
        }

        self.bbox.validate()?;
        let bbox = self.bbox;
        if bbox.left > bbox.right || bbox.bottom > bbox.top {
            return Err(TileError::InvalidBbox(format!(
                "layer box {} has reversed edges",
                bbox.cache_key()
            )));
        }
        if bbox.left < -180.0 || bbox.right > 180.0 || bbox.bottom < -90.0 || bbox.top > 90.0 {
            return Err(TileError::InvalidBbox(format!(
                "layer box {} extends past the sky",
                bbox.cache_key()
            )));
        }

        if self.tile_size.is_some() != self.number_of_levels.is_some() {
            return Err(TileError::invalid_parameter(
                "tile_size",
                "tile_size and number_of_levels must be given together",
            ));
        }
        if let (Some(ts), Some(nl)) = (self.tile_size, self.number_of_levels) {
            PyramidGeometry::new(ts, nl)?;
        }

        if let (Some(vmin), Some(vmax)) = (self.vmin, self.vmax) {
            if !vmin.is_finite() || !vmax.is_finite() || vmin >= vmax {
                return Err(TileError::invalid_parameter(
                    "vmin",
                    format!("colour range [{}, {}] is not increasing", vmin, vmax),
                ));
            }
        }
        Ok(())
    }
}

/// Immutable description of a published layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerMetadata {
    pub layer_id: String,
    pub grant: Option<String>,
    pub geometry: PyramidGeometry,
    /// Sky area covered by the archival raster.
    pub bbox: BoundingBox,
    pub raster_width: u32,
    pub raster_height: u32,
    pub element_type: ElementType,
    pub archive: String,
    pub vmin: Option<f64>,
    pub vmax: Option<f64>,
}

impl LayerMetadata {
    /// Combine a validated config with the archive's actual shape.
    ///
    /// Fails when the raster does not sit on a whole-pixel world grid, e.g.
    /// when its two axes imply different pixel scales.
    pub fn from_config(
        config: &LayerConfig,
        raster_width: u32,
        raster_height: u32,
        element_type: ElementType,
    ) -> TileResult<Self> {
        config.validate()?;
        if raster_width == 0 || raster_height == 0 {
            return Err(TileError::Ingestion(format!(
                "layer {} has an empty raster",
                config.layer_id
            )));
        }

        let dpp_x = config.bbox.width() / raster_width as f64;
        let dpp_y = config.bbox.height() / raster_height as f64;
        if ((dpp_x - dpp_y) / dpp_x).abs() > SCALE_TOLERANCE {
            return Err(TileError::Ingestion(format!(
                "layer {}: {}x{} raster over {}x{} degrees has non-square pixels",
                config.layer_id,
                raster_width,
                raster_height,
                config.bbox.width(),
                config.bbox.height()
            )));
        }

        let world_width = whole_pixels(360.0 / dpp_x, &config.layer_id, "world width")?;
        let world_height = whole_pixels(180.0 / dpp_x, &config.layer_id, "world height")?;
        whole_pixels((config.bbox.left + 180.0) / dpp_x, &config.layer_id, "column offset")?;
        whole_pixels((config.bbox.bottom + 90.0) / dpp_x, &config.layer_id, "row offset")?;

        let geometry = match (config.tile_size, config.number_of_levels) {
            (Some(ts), Some(nl)) => {
                let geometry = PyramidGeometry::new(ts, nl)?;
                // An explicit geometry must tile the sky exactly at the finest level.
                if geometry.pixel_width() != world_width as u64
                    || geometry.pixel_height() != world_height as u64
                {
                    return Err(TileError::Ingestion(format!(
                        "layer {}: {} pixel tiles over {} levels cover {}x{} pixels, the sky is {}x{}",
                        config.layer_id,
                        ts,
                        nl,
                        geometry.pixel_width(),
                        geometry.pixel_height(),
                        world_width,
                        world_height
                    )));
                }
                geometry
            }
            _ => PyramidGeometry::for_world(world_width, world_height)?,
        };

        Ok(Self {
            layer_id: config.layer_id.clone(),
            grant: config.grant.clone(),
            geometry,
            bbox: config.bbox,
            raster_width,
            raster_height,
            element_type,
            archive: config.archive.clone(),
            vmin: config.vmin,
            vmax: config.vmax,
        })
    }

    pub fn tile_size(&self) -> u32 {
        self.geometry.tile_size
    }

    pub fn number_of_levels(&self) -> u32 {
        self.geometry.number_of_levels
    }

    /// Degrees spanned by one finest-level pixel.
    pub fn degrees_per_pixel(&self) -> f64 {
        self.bbox.width() / self.raster_width as f64
    }

    /// Whole-sky grid size in finest-level pixels.
    pub fn world_pixels(&self) -> (u64, u64) {
        let dpp = self.degrees_per_pixel();
        ((360.0 / dpp).round() as u64, (180.0 / dpp).round() as u64)
    }

    /// Position of the raster's first pixel in the world grid.
    pub fn raster_offset(&self) -> (i64, i64) {
        let dpp = self.degrees_per_pixel();
        (
            ((self.bbox.left + 180.0) / dpp).round() as i64,
            ((self.bbox.bottom + 90.0) / dpp).round() as i64,
        )
    }

    /// World-space footprint of a tile.
    pub fn tile_bbox(&self, level: u32, x: u32, y: u32) -> BoundingBox {
        let span = self.geometry.footprint_pixels(level) as f64 * self.degrees_per_pixel();
        let left = -180.0 + x as f64 * span;
        let bottom = -90.0 + y as f64 * span;
        BoundingBox::new(left, left + span, bottom + span, bottom)
    }

    /// Whether a caller holding `grants` may see this layer.
    pub fn visible_to(&self, grants: &Grants) -> bool {
        grants.permits(self.grant.as_deref())
    }

    /// Validate an address against this layer's pyramid.
    pub fn check_address(&self, address: &TileAddress) -> TileResult<()> {
        address.validate()?;
        if !self.geometry.contains_level(address.level) {
            return Err(TileError::not_found(format!("tile {}", address)));
        }
        Ok(())
    }
}

fn whole_pixels(value: f64, layer_id: &str, what: &str) -> TileResult<u32> {
    let rounded = value.round();
    if (value - rounded).abs() > PIXEL_TOLERANCE || rounded < 0.0 {
        return Err(TileError::Ingestion(format!(
            "layer {}: {} of {} pixels is not whole",
            layer_id, what, value
        )));
    }
    Ok(rounded as u32)
}

/// The set of published layers, shared read-only across requests.
#[derive(Debug, Clone, Default)]
pub struct LayerCatalog {
    layers: HashMap<String, Arc<LayerMetadata>>,
}

impl LayerCatalog {
    pub fn new(layers: impl IntoIterator<Item = LayerMetadata>) -> Self {
        Self {
            layers: layers
                .into_iter()
                .map(|layer| (layer.layer_id.clone(), Arc::new(layer)))
                .collect(),
        }
    }

    pub fn get(&self, layer_id: &str) -> Option<&Arc<LayerMetadata>> {
        self.layers.get(layer_id)
    }

    /// Resolve a layer for a caller.
    ///
    /// Missing and restricted layers both answer `NotFound`.
    pub fn visible(&self, layer_id: &str, grants: &Grants) -> TileResult<&Arc<LayerMetadata>> {
        match self.layers.get(layer_id) {
            Some(layer) if layer.visible_to(grants) => Ok(layer),
            _ => Err(TileError::not_found(format!("layer {}", layer_id))),
        }
    }

    /// Layer ids in sorted order.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.layers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<LayerMetadata>> {
        self.layers.values()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_sky(id: &str) -> LayerConfig {
        LayerConfig::new(id, BoundingBox::full_sky(), "/data/sky.zarr")
    }

    #[test]
    fn test_full_sky_metadata() {
        let meta = LayerMetadata::from_config(&full_sky("sky"), 512, 256, ElementType::Float32)
            .unwrap();
        assert_eq!(meta.tile_size(), 256);
        assert_eq!(meta.number_of_levels(), 1);
        assert_eq!(meta.world_pixels(), (512, 256));
        assert_eq!(meta.raster_offset(), (0, 0));
        let bbox = meta.tile_bbox(0, 1, 0);
        assert_eq!(bbox, BoundingBox::new(0.0, 180.0, 90.0, -90.0));
    }

    #[test]
    fn test_partial_sky_offset() {
        // 1 degree pixels, raster covers RA 0..90, Dec 0..45.
        let config = LayerConfig::new("patch", BoundingBox::new(0.0, 90.0, 45.0, 0.0), "p.zarr");
        let meta = LayerMetadata::from_config(&config, 90, 45, ElementType::Float64).unwrap();
        assert_eq!(meta.world_pixels(), (360, 180));
        assert_eq!(meta.raster_offset(), (180, 90));
        assert_eq!(meta.tile_size(), 180);
        assert_eq!(meta.number_of_levels(), 1);
    }

    #[test]
    fn test_rejects_non_square_pixels() {
        let config = LayerConfig::new("bad", BoundingBox::full_sky(), "b.zarr");
        assert!(matches!(
            LayerMetadata::from_config(&config, 512, 200, ElementType::Float32),
            Err(TileError::Ingestion(_))
        ));
    }

    #[test]
    fn test_explicit_geometry_must_tile_the_sky() {
        // 256 pixel tiles over two levels cover exactly 1024x512.
        let config = full_sky("sky").with_geometry(256, 2);
        let meta = LayerMetadata::from_config(&config, 1024, 512, ElementType::Float32).unwrap();
        assert_eq!((meta.tile_size(), meta.number_of_levels()), (256, 2));

        // Three levels would need a 2048x1024 grid over a 512x256 sky.
        let config = full_sky("g").with_geometry(256, 3);
        assert!(matches!(
            LayerMetadata::from_config(&config, 512, 256, ElementType::Float32),
            Err(TileError::Ingestion(_))
        ));

        // Tiles too small to reach the edge of the sky.
        let config = full_sky("g").with_geometry(128, 1);
        assert!(matches!(
            LayerMetadata::from_config(&config, 512, 256, ElementType::Float32),
            Err(TileError::Ingestion(_))
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(full_sky("ok").validate().is_ok());
        assert!(full_sky("").validate().is_err());
        assert!(full_sky("x").with_grant(" bad").validate().is_err());
        assert!(full_sky("x").with_range(2.0, 1.0).validate().is_err());
        let mut partial = full_sky("x");
        partial.tile_size = Some(256);
        assert!(partial.validate().is_err());
        let outside = LayerConfig::new("x", BoundingBox::new(-200.0, 0.0, 10.0, 0.0), "a");
        assert!(outside.validate().is_err());
    }

    #[test]
    fn test_catalog_hides_restricted_layers() {
        let public = LayerMetadata::from_config(&full_sky("pub"), 512, 256, ElementType::Float32)
            .unwrap();
        let private = LayerMetadata::from_config(
            &full_sky("priv").with_grant("team"),
            512,
            256,
            ElementType::Float32,
        )
        .unwrap();
        let catalog = LayerCatalog::new([public, private]);

        assert!(catalog.visible("pub", &Grants::public()).is_ok());
        assert!(catalog.visible("priv", &Grants::public()).unwrap_err().is_not_found());
        assert!(catalog.visible("missing", &Grants::public()).unwrap_err().is_not_found());
        let team = Grants::new(["team"]).unwrap();
        assert!(catalog.visible("priv", &team).is_ok());
        assert_eq!(catalog.ids(), vec!["priv".to_string(), "pub".to_string()]);
    }
}
