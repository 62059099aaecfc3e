//! Service configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tile_common::{TileError, TileResult};

/// One cache layer in the provider chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheLayerKind {
    /// Bounded in-process LFU cache.
    Memory,
    /// Shared Redis cache.
    Redis,
    /// No-op layer.
    Passthrough,
}

impl CacheLayerKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" | "mem" => Some(CacheLayerKind::Memory),
            "redis" | "remote" => Some(CacheLayerKind::Redis),
            "passthrough" | "none" => Some(CacheLayerKind::Passthrough),
            _ => None,
        }
    }
}

/// Configuration for the tile service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Cache layers in priority order, fastest first. The archive generator
    /// is always consulted last. Empty means "generator only".
    pub cache_layers: Vec<CacheLayerKind>,

    /// Tile capacity of the in-process cache.
    pub memory_cache_capacity: usize,

    /// Capacity of the in-process derived product cache.
    pub product_cache_capacity: usize,

    pub redis_url: String,

    /// Upper bound on every Redis call.
    pub redis_timeout_ms: u64,

    /// Expiry of Redis entries; `None` keeps them until evicted by Redis.
    pub redis_ttl_secs: Option<u64>,

    /// Serve coarse levels by decimating the archive.
    pub subsample: bool,

    /// Build every layer's histogram at startup.
    pub precache: bool,

    /// Tiles pulled at once for a single cutout.
    pub tile_fetch_concurrency: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_layers: vec![CacheLayerKind::Memory],
            memory_cache_capacity: 4096,
            product_cache_capacity: 1024,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            redis_timeout_ms: 250,
            redis_ttl_secs: None,
            subsample: true,
            precache: false,
            tile_fetch_concurrency: 16,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from `SKYTILES_*` environment variables.
    pub fn from_env() -> TileResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> TileResult<Self> {
        let mut config = Self::default();

        if let Some(val) = lookup("SKYTILES_CACHE_LAYERS") {
            config.cache_layers = val
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|s| {
                    CacheLayerKind::parse(s).ok_or_else(|| {
                        TileError::invalid_parameter(
                            "SKYTILES_CACHE_LAYERS",
                            format!("unknown cache layer '{}'", s.trim()),
                        )
                    })
                })
                .collect::<TileResult<Vec<_>>>()?;
        }

        if let Some(val) = lookup("SKYTILES_MEMORY_CACHE_CAPACITY") {
            config.memory_cache_capacity = parse("SKYTILES_MEMORY_CACHE_CAPACITY", &val)?;
        }

        if let Some(val) = lookup("SKYTILES_PRODUCT_CACHE_CAPACITY") {
            config.product_cache_capacity = parse("SKYTILES_PRODUCT_CACHE_CAPACITY", &val)?;
        }

        if let Some(val) = lookup("SKYTILES_REDIS_URL") {
            config.redis_url = val;
        }

        if let Some(val) = lookup("SKYTILES_REDIS_TIMEOUT_MS") {
            config.redis_timeout_ms = parse("SKYTILES_REDIS_TIMEOUT_MS", &val)?;
        }

        if let Some(val) = lookup("SKYTILES_REDIS_TTL_SECS") {
            let secs: u64 = parse("SKYTILES_REDIS_TTL_SECS", &val)?;
            config.redis_ttl_secs = (secs > 0).then_some(secs);
        }

        if let Some(val) = lookup("SKYTILES_SUBSAMPLE") {
            config.subsample = parse_bool("SKYTILES_SUBSAMPLE", &val)?;
        }

        if let Some(val) = lookup("SKYTILES_PRECACHE") {
            config.precache = parse_bool("SKYTILES_PRECACHE", &val)?;
        }

        if let Some(val) = lookup("SKYTILES_TILE_FETCH_CONCURRENCY") {
            config.tile_fetch_concurrency = parse("SKYTILES_TILE_FETCH_CONCURRENCY", &val)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TileResult<()> {
        if self.cache_layers.contains(&CacheLayerKind::Memory) && self.memory_cache_capacity == 0 {
            return Err(TileError::invalid_parameter(
                "memory_cache_capacity",
                "must be positive when a memory layer is configured",
            ));
        }
        if self.product_cache_capacity == 0 {
            return Err(TileError::invalid_parameter(
                "product_cache_capacity",
                "must be positive",
            ));
        }
        if self.tile_fetch_concurrency == 0 {
            return Err(TileError::invalid_parameter(
                "tile_fetch_concurrency",
                "must be positive",
            ));
        }
        if self.cache_layers.contains(&CacheLayerKind::Redis) {
            if self.redis_timeout_ms == 0 {
                return Err(TileError::invalid_parameter("redis_timeout_ms", "must be positive"));
            }
            if self.redis_url.is_empty() {
                return Err(TileError::invalid_parameter("redis_url", "must not be empty"));
            }
        }
        Ok(())
    }

    pub fn redis_timeout(&self) -> Duration {
        Duration::from_millis(self.redis_timeout_ms)
    }

    pub fn redis_ttl(&self) -> Option<Duration> {
        self.redis_ttl_secs.map(Duration::from_secs)
    }
}

fn parse<T: std::str::FromStr>(name: &str, val: &str) -> TileResult<T> {
    val.trim()
        .parse()
        .map_err(|_| TileError::invalid_parameter(name, format!("cannot parse '{}'", val)))
}

fn parse_bool(name: &str, val: &str) -> TileResult<bool> {
    match val.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(TileError::invalid_parameter(
            name,
            format!("'{}' is not a boolean", val),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.cache_layers, vec![CacheLayerKind::Memory]);
        assert!(config.subsample);
        assert!(config.redis_ttl().is_none());
    }

    #[test]
    fn test_cache_layer_order_is_preserved() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("SKYTILES_CACHE_LAYERS", "redis, memory"),
            ("SKYTILES_REDIS_TTL_SECS", "60"),
            ("SKYTILES_SUBSAMPLE", "off"),
        ]))
        .unwrap();
        assert_eq!(
            config.cache_layers,
            vec![CacheLayerKind::Redis, CacheLayerKind::Memory]
        );
        assert_eq!(config.redis_ttl(), Some(Duration::from_secs(60)));
        assert!(!config.subsample);
    }

    #[test]
    fn test_empty_cache_list_means_generator_only() {
        let config =
            ServiceConfig::from_lookup(lookup(&[("SKYTILES_CACHE_LAYERS", "")])).unwrap();
        assert!(config.cache_layers.is_empty());
    }

    #[test]
    fn test_rejects_nonsense() {
        assert!(ServiceConfig::from_lookup(lookup(&[("SKYTILES_CACHE_LAYERS", "disk")])).is_err());
        assert!(
            ServiceConfig::from_lookup(lookup(&[("SKYTILES_MEMORY_CACHE_CAPACITY", "0")])).is_err()
        );
        assert!(ServiceConfig::from_lookup(lookup(&[
            ("SKYTILES_CACHE_LAYERS", "redis"),
            ("SKYTILES_REDIS_TIMEOUT_MS", "0"),
        ]))
        .is_err());
        assert!(ServiceConfig::from_lookup(lookup(&[("SKYTILES_PRECACHE", "maybe")])).is_err());
    }

    #[test]
    fn test_tile_fetch_concurrency() {
        assert_eq!(ServiceConfig::default().tile_fetch_concurrency, 16);
        let config =
            ServiceConfig::from_lookup(lookup(&[("SKYTILES_TILE_FETCH_CONCURRENCY", "4")])).unwrap();
        assert_eq!(config.tile_fetch_concurrency, 4);
        assert!(
            ServiceConfig::from_lookup(lookup(&[("SKYTILES_TILE_FETCH_CONCURRENCY", "0")])).is_err()
        );
    }
}
