//! Shared cache over a network key-value store.
//!
//! Every call is bounded by a timeout. Transport failures, timeouts and
//! undecodable values all degrade to `NotFound` on pull and to a dropped
//! write on push; they are logged and counted but never reach the caller.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use tile_common::{Grants, TileError, TileResult};
use tracing::{debug, warn};

use crate::provider::{new_provider_id, CacheKey, Cacheable, Provider};

/// Minimal byte-oriented key-value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> TileResult<Option<Bytes>>;

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> TileResult<()>;
}

/// Converts values to and from the opaque blobs a [`KvStore`] holds.
pub trait RemoteCodec<T: Cacheable>: Send + Sync {
    fn encode(&self, item: &T) -> TileResult<Vec<u8>>;

    fn decode(&self, key: &T::Key, bytes: &[u8]) -> TileResult<T>;
}

/// Redis-backed [`KvStore`].
pub struct RedisStore {
    conn: MultiplexedConnection,
    prefix: String,
}

impl RedisStore {
    /// Connect to Redis.
    pub async fn connect(redis_url: &str) -> TileResult<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| TileError::CacheError(format!("Redis connection failed: {}", e)))?;

        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| TileError::CacheError(format!("Redis connection failed: {}", e)))?;

        Ok(Self {
            conn,
            prefix: "skytiles:".to_string(),
        })
    }

    /// Namespace all keys under `prefix`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

#[async_trait]
impl KvStore for RedisStore {
    async fn get(&self, key: &str) -> TileResult<Option<Bytes>> {
        let mut conn = self.conn.clone();
        let result: Option<Vec<u8>> = conn
            .get(self.full_key(key))
            .await
            .map_err(|e| TileError::CacheError(format!("Cache get failed: {}", e)))?;

        Ok(result.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> TileResult<()> {
        let mut conn = self.conn.clone();
        let key = self.full_key(key);
        match ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
                .await
                .map_err(|e| TileError::CacheError(format!("Cache set failed: {}", e)))?,
            None => conn
                .set::<_, _, ()>(key, value)
                .await
                .map_err(|e| TileError::CacheError(format!("Cache set failed: {}", e)))?,
        }
        Ok(())
    }
}

/// Cache provider over a shared [`KvStore`].
pub struct RemoteCache<T: Cacheable> {
    id: String,
    store: Arc<dyn KvStore>,
    codec: Arc<dyn RemoteCodec<T>>,
    timeout: Duration,
    ttl: Option<Duration>,
}

impl<T: Cacheable> RemoteCache<T> {
    pub fn new(store: Arc<dyn KvStore>, codec: Arc<dyn RemoteCodec<T>>, timeout: Duration) -> Self {
        Self {
            id: new_provider_id(),
            store,
            codec,
            timeout,
            ttl: None,
        }
    }

    /// Expire entries after `ttl`. Entries never expire by default.
    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.ttl = ttl;
        self
    }

    fn degrade(&self, op: &'static str, key: &str, reason: &str) -> TileError {
        counter!("remote_cache_failures_total", "op" => op).increment(1);
        warn!(cache = %self.id, op = op, key = %key, reason = %reason, "Remote cache call degraded to miss");
        TileError::not_found(key.to_string())
    }
}

#[async_trait]
impl<T: Cacheable> Provider<T> for RemoteCache<T> {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "remote"
    }

    async fn pull(&self, key: &T::Key, grants: &Grants) -> TileResult<T> {
        let hash = key.hash();
        let start = Instant::now();

        let bytes = match tokio::time::timeout(self.timeout, self.store.get(&hash)).await {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => return Err(TileError::not_found(hash)),
            Ok(Err(e)) => return Err(self.degrade("get", &hash, &e.to_string())),
            Err(_) => return Err(self.degrade("get", &hash, "timed out")),
        };

        let item = match self.codec.decode(key, &bytes) {
            Ok(item) => item,
            Err(e) => return Err(self.degrade("decode", &hash, &e.to_string())),
        };

        debug!(
            key = %hash,
            bytes = bytes.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Remote cache hit"
        );

        if !grants.permits(item.grant()) {
            return Err(TileError::not_found(hash));
        }
        Ok(item.with_provenance(&self.id))
    }

    async fn push(&self, item: T) {
        if item.provenance() == self.id {
            return;
        }

        let hash = item.key().hash();
        let bytes = match self.codec.encode(&item) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.degrade("encode", &hash, &e.to_string());
                return;
            }
        };

        match tokio::time::timeout(self.timeout, self.store.set(&hash, bytes, self.ttl)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                self.degrade("set", &hash, &e.to_string());
            }
            Err(_) => {
                self.degrade("set", &hash, "timed out");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::sync::Mutex;

    #[derive(Clone, Debug, PartialEq)]
    struct Note {
        key: String,
        body: String,
        grant: Option<String>,
        provenance: String,
    }

    impl Cacheable for Note {
        type Key = String;

        fn key(&self) -> String {
            self.key.clone()
        }

        fn grant(&self) -> Option<&str> {
            self.grant.as_deref()
        }

        fn provenance(&self) -> &str {
            &self.provenance
        }

        fn with_provenance(mut self, provenance: &str) -> Self {
            self.provenance = provenance.to_string();
            self
        }
    }

    struct NoteCodec;

    impl RemoteCodec<Note> for NoteCodec {
        fn encode(&self, item: &Note) -> TileResult<Vec<u8>> {
            let grant = item.grant.clone().unwrap_or_default();
            Ok(format!("{}\n{}", grant, item.body).into_bytes())
        }

        fn decode(&self, key: &String, bytes: &[u8]) -> TileResult<Note> {
            let text = std::str::from_utf8(bytes).map_err(|e| TileError::Decode(e.to_string()))?;
            let (grant, body) = text
                .split_once('\n')
                .ok_or_else(|| TileError::Decode("missing separator".into()))?;
            Ok(Note {
                key: key.clone(),
                body: body.to_string(),
                grant: (!grant.is_empty()).then(|| grant.to_string()),
                provenance: String::new(),
            })
        }
    }

    #[derive(Default)]
    struct FakeStore {
        values: Mutex<HashMap<String, Vec<u8>>>,
    }

    #[async_trait]
    impl KvStore for FakeStore {
        async fn get(&self, key: &str) -> TileResult<Option<Bytes>> {
            Ok(self.values.lock().await.get(key).cloned().map(Bytes::from))
        }

        async fn set(&self, key: &str, value: Vec<u8>, _ttl: Option<Duration>) -> TileResult<()> {
            self.values.lock().await.insert(key.to_string(), value);
            Ok(())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl KvStore for BrokenStore {
        async fn get(&self, _key: &str) -> TileResult<Option<Bytes>> {
            Err(TileError::CacheError("connection refused".into()))
        }

        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> TileResult<()> {
            Err(TileError::CacheError("connection refused".into()))
        }
    }

    struct SlowStore;

    #[async_trait]
    impl KvStore for SlowStore {
        async fn get(&self, _key: &str) -> TileResult<Option<Bytes>> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Option<Duration>) -> TileResult<()> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    fn note(key: &str, grant: Option<&str>) -> Note {
        Note {
            key: key.to_string(),
            body: format!("body of {}", key),
            grant: grant.map(str::to_string),
            provenance: String::new(),
        }
    }

    fn cache(store: Arc<dyn KvStore>) -> RemoteCache<Note> {
        RemoteCache::new(store, Arc::new(NoteCodec), Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_pull_after_push() {
        let cache = cache(Arc::new(FakeStore::default()));
        cache.push(note("a", None)).await;
        let pulled = cache.pull(&"a".to_string(), &Grants::public()).await.unwrap();
        assert_eq!(pulled.body, "body of a");
        assert_eq!(pulled.provenance, cache.id());
    }

    #[tokio::test]
    async fn test_grant_enforced_after_decode() {
        let cache = cache(Arc::new(FakeStore::default()));
        cache.push(note("a", Some("priv"))).await;
        let err = cache
            .pull(&"a".to_string(), &Grants::public())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_transport_errors_degrade_to_not_found() {
        let cache = cache(Arc::new(BrokenStore));
        cache.push(note("a", None)).await;
        let err = cache
            .pull(&"a".to_string(), &Grants::public())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_timeouts_degrade_to_not_found() {
        let cache = cache(Arc::new(SlowStore));
        let start = Instant::now();
        cache.push(note("a", None)).await;
        let err = cache
            .pull(&"a".to_string(), &Grants::public())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_undecodable_value_is_a_miss() {
        let store = Arc::new(FakeStore::default());
        store.set("a", b"no separator".to_vec(), None).await.unwrap();
        let cache = cache(store);
        let err = cache
            .pull(&"a".to_string(), &Grants::public())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
