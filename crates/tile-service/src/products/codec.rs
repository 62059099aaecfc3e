//! JSON interchange for derived products in shared caches.

use serde::{Deserialize, Serialize};
use tile_cache::RemoteCodec;
use tile_common::{TileError, TileResult};

use super::{DerivedProduct, ProductKey, ProductPayload};

#[derive(Serialize, Deserialize)]
struct Envelope {
    grant: Option<String>,
    payload: ProductPayload,
}

/// Stores `{grant, payload}`; the key is supplied by the reader.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProductCodec;

impl RemoteCodec<DerivedProduct> for ProductCodec {
    fn encode(&self, item: &DerivedProduct) -> TileResult<Vec<u8>> {
        let envelope = Envelope {
            grant: item.grant.clone(),
            payload: item.payload.clone(),
        };
        Ok(serde_json::to_vec(&envelope)?)
    }

    fn decode(&self, key: &ProductKey, bytes: &[u8]) -> TileResult<DerivedProduct> {
        let envelope: Envelope = serde_json::from_slice(bytes)
            .map_err(|e| TileError::Decode(format!("product blob: {}", e)))?;
        Ok(DerivedProduct::new(key.clone(), envelope.payload, envelope.grant))
    }
}
