//! Tile interchange format for shared caches.
//!
//! ```text
//! +-------+-------------------+-------------+----------------------------+
//! | flags | grant length (LE) | grant bytes | payload (native byte order)|
//! | u8    | u32               | utf-8       | row-major                  |
//! +-------+-------------------+-------------+----------------------------+
//! ```
//!
//! Tile size and element type are not stored; they come from the layer's
//! metadata when the blob is read back.

use std::sync::Arc;

use tile_common::{LayerCatalog, Tile, TileAddress, TileData, TileError, TileResult};

use crate::remote::RemoteCodec;

const FLAG_GRANT: u8 = 0b01;
const FLAG_PAYLOAD: u8 = 0b10;
const HEADER_LEN: usize = 5;

/// Encodes tiles for a [`RemoteCache`](crate::RemoteCache).
pub struct TileCodec {
    catalog: Arc<LayerCatalog>,
}

impl TileCodec {
    pub fn new(catalog: Arc<LayerCatalog>) -> Self {
        Self { catalog }
    }
}

impl RemoteCodec<Tile> for TileCodec {
    fn encode(&self, tile: &Tile) -> TileResult<Vec<u8>> {
        let grant = tile.grant.as_deref().unwrap_or("");
        let payload = tile.payload.as_ref().map(TileData::to_ne_bytes);

        let mut flags = 0u8;
        if tile.grant.is_some() {
            flags |= FLAG_GRANT;
        }
        if payload.is_some() {
            flags |= FLAG_PAYLOAD;
        }

        let payload_len = payload.as_ref().map_or(0, Vec::len);
        let mut out = Vec::with_capacity(HEADER_LEN + grant.len() + payload_len);
        out.push(flags);
        out.extend_from_slice(&(grant.len() as u32).to_le_bytes());
        out.extend_from_slice(grant.as_bytes());
        if let Some(payload) = payload {
            out.extend_from_slice(&payload);
        }
        Ok(out)
    }

    fn decode(&self, address: &TileAddress, bytes: &[u8]) -> TileResult<Tile> {
        let layer = self.catalog.get(&address.layer_id).ok_or_else(|| {
            TileError::Decode(format!("no metadata for layer {}", address.layer_id))
        })?;

        if bytes.len() < HEADER_LEN {
            return Err(TileError::Decode(format!(
                "blob of {} bytes is shorter than its header",
                bytes.len()
            )));
        }
        let flags = bytes[0];
        let grant_len = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        let rest = &bytes[HEADER_LEN..];
        if rest.len() < grant_len {
            return Err(TileError::Decode("grant runs past end of blob".into()));
        }
        let (grant_bytes, payload_bytes) = rest.split_at(grant_len);

        let grant = if flags & FLAG_GRANT != 0 {
            let grant = std::str::from_utf8(grant_bytes)
                .map_err(|e| TileError::Decode(format!("grant is not utf-8: {}", e)))?;
            Some(grant.to_string())
        } else {
            None
        };

        let payload = if flags & FLAG_PAYLOAD != 0 {
            let size = layer.tile_size() as usize;
            Some(TileData::from_ne_bytes(
                layer.element_type,
                size,
                size,
                payload_bytes,
            )?)
        } else {
            if !payload_bytes.is_empty() {
                return Err(TileError::Decode("unexpected payload bytes".into()));
            }
            None
        };

        Ok(Tile::new(address.clone(), payload, grant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tile_common::{BoundingBox, ElementType, LayerConfig, LayerMetadata, Raster};

    fn codec() -> TileCodec {
        let config = LayerConfig::new("sky", BoundingBox::full_sky(), "sky.zarr");
        let meta = LayerMetadata::from_config(&config, 512, 256, ElementType::Float32).unwrap();
        TileCodec::new(Arc::new(LayerCatalog::new([meta])))
    }

    fn payload(value: f32) -> TileData {
        TileData::Float32(Raster::filled(256, 256, value))
    }

    #[test]
    fn test_payload_and_grant_survive() {
        let codec = codec();
        let address = TileAddress::new("sky", 0, 1, 0);
        let tile = Tile::new(address.clone(), Some(payload(3.25)), Some("priv".into()));

        let decoded = codec.decode(&address, &codec.encode(&tile).unwrap()).unwrap();
        assert_eq!(decoded.grant.as_deref(), Some("priv"));
        assert!(decoded.payload.unwrap().bit_eq(&payload(3.25)));
    }

    #[test]
    fn test_null_payload() {
        let codec = codec();
        let address = TileAddress::new("sky", 0, 0, 0);
        let bytes = codec.encode(&Tile::new(address.clone(), None, None)).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        let decoded = codec.decode(&address, &bytes).unwrap();
        assert!(decoded.payload.is_none());
        assert!(decoded.grant.is_none());
    }

    #[test]
    fn test_truncated_payload_is_rejected() {
        let codec = codec();
        let address = TileAddress::new("sky", 0, 0, 0);
        let mut bytes = codec
            .encode(&Tile::new(address.clone(), Some(payload(1.0)), None))
            .unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            codec.decode(&address, &bytes),
            Err(TileError::Decode(_))
        ));
    }

    #[test]
    fn test_unknown_layer_is_rejected() {
        let codec = codec();
        let address = TileAddress::new("other", 0, 0, 0);
        assert!(codec.decode(&address, &[0, 0, 0, 0, 0]).is_err());
    }
}
