//! Layered caching for sky tiles and derived products.
//!
//! Provides:
//! - The pull/push [`Provider`] capability and its cache variants
//! - [`ProviderChain`] for ordered fallback with background promotion
//! - The binary wire format used by shared caches

pub mod chain;
pub mod codec;
pub mod lfu;
pub mod memory;
pub mod passthrough;
pub mod provider;
pub mod remote;

pub use chain::{ProviderChain, ProviderChainBuilder, Pulled};
pub use codec::TileCodec;
pub use lfu::LfuCache;
pub use memory::{CacheStats, MemoryCache};
pub use passthrough::PassThroughProvider;
pub use provider::{new_provider_id, CacheKey, Cacheable, Provider};
pub use remote::{KvStore, RedisStore, RemoteCache, RemoteCodec};
