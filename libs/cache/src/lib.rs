//! Two-tier key/value cache
//!
//! Every value lives in a bounded in-process map and, when configured, in
//! redis. The first redis failure switches the cache to memory-only
//! operation until [`Cache::try_reconnect`] succeeds, callers never observe
//! cache errors.

#[macro_use]
extern crate tracing;

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::RwLock;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

mod codec;
mod memory;

use memory::MemoryStore;

/// A redis cache connection
pub type RedisConn = MultiplexedConnection;

/// Generation bumped by every glob invalidation
const GLOB_GENERATION: &str = "glob";

/// Lifetime of a generation counter in redis
const GENERATION_TTL_SECONDS: i64 = 86_400;

#[derive(Clone, Debug)]
pub struct CacheConfig {
	/// Distributed tier, memory-only when absent
	pub redis_url:          Option<String>,
	pub key_prefix:         String,
	pub memory_capacity:    usize,
	/// Values whose JSON form exceeds this many bytes get compressed
	pub compress_threshold: usize,
	/// Upper bound for a single redis round trip
	pub operation_timeout:  Duration,
}

impl Default for CacheConfig {
	fn default() -> Self {
		Self {
			redis_url:          None,
			key_prefix:         "salon:".to_string(),
			memory_capacity:    1024,
			compress_threshold: 1024,
			operation_timeout:  Duration::from_millis(500),
		}
	}
}

#[derive(Clone, Debug, Default)]
pub struct SetOptions {
	/// `None` compresses only above the configured threshold
	pub compress: Option<bool>,
	pub tags:     Vec<String>,
}

impl SetOptions {
	#[must_use]
	pub fn tagged<I, S>(tags: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Self { compress: None, tags: tags.into_iter().map(Into::into).collect() }
	}
}

/// Shared handle to the cache, cheap to clone
#[derive(Clone)]
pub struct Cache {
	inner: Arc<Inner>,
}

struct Inner {
	config:      CacheConfig,
	memory:      MemoryStore,
	redis:       RwLock<Option<RedisConn>>,
	degraded:    AtomicBool,
	/// Invalidation counters per key, tag and glob
	generations: DashMap<String, u64>,
}

/// Snapshot of the invalidation counters a cached value depends on
#[derive(Debug, PartialEq)]
struct Generations {
	local:  Vec<u64>,
	remote: Option<Vec<Option<i64>>>,
}

fn generation_names(key: &str, tags: &[String]) -> Vec<String> {
	let mut names = vec![GLOB_GENERATION.to_string(), format!("key:{key}")];
	names.extend(tags.iter().map(|tag| format!("tag:{tag}")));

	names
}

impl Cache {
	/// A cache that never talks to redis
	#[must_use]
	pub fn memory_only(config: CacheConfig) -> Self {
		let memory = MemoryStore::new(config.memory_capacity);

		Self {
			inner: Arc::new(Inner {
				config,
				memory,
				redis: RwLock::new(None),
				degraded: AtomicBool::new(false),
				generations: DashMap::new(),
			}),
		}
	}

	/// Create a cache and try to reach the distributed tier
	///
	/// An unreachable redis is logged and leaves the cache memory-only
	pub async fn connect(config: CacheConfig) -> Self {
		let cache = Self::memory_only(config);

		if cache.inner.config.redis_url.is_some() && !cache.try_reconnect().await {
			cache.inner.degraded.store(true, Ordering::Release);
		}

		cache
	}

	/// (Re)open the redis connection, returns whether redis is usable
	pub async fn try_reconnect(&self) -> bool {
		let Some(url) = self.inner.config.redis_url.as_deref() else {
			return false;
		};

		let client = match redis::Client::open(url) {
			Ok(client) => client,
			Err(e) => {
				warn!("invalid redis url, caching in memory only -- {e}");
				return false;
			},
		};

		let connect = client.get_multiplexed_async_connection();

		match tokio::time::timeout(self.inner.config.operation_timeout, connect)
			.await
		{
			Ok(Ok(conn)) => {
				*self.inner.redis.write() = Some(conn);
				self.inner.degraded.store(false, Ordering::Release);

				info!("connected to distributed cache");

				true
			},
			Ok(Err(e)) => {
				warn!("could not reach redis, caching in memory only -- {e}");
				false
			},
			Err(_) => {
				warn!("timed out connecting to redis, caching in memory only");
				false
			},
		}
	}

	/// Whether a redis failure forced the cache into memory-only mode
	#[must_use]
	pub fn is_degraded(&self) -> bool {
		self.inner.degraded.load(Ordering::Acquire)
	}

	fn remote(&self) -> Option<RedisConn> {
		if self.is_degraded() {
			return None;
		}

		self.inner.redis.read().clone()
	}

	fn degrade(&self, reason: &str) {
		if !self.inner.degraded.swap(true, Ordering::AcqRel) {
			warn!(
				"distributed cache failed, falling back to memory only -- \
				 {reason}"
			);
		}
	}

	/// Run a redis operation under the configured timeout, degrading on any
	/// failure
	async fn remote_call<T, F>(&self, op: F) -> Option<T>
	where
		F: Future<Output = redis::RedisResult<T>>,
	{
		match tokio::time::timeout(self.inner.config.operation_timeout, op).await {
			Ok(Ok(value)) => Some(value),
			Ok(Err(e)) => {
				self.degrade(&e.to_string());
				None
			},
			Err(_) => {
				self.degrade("operation timed out");
				None
			},
		}
	}

	fn remote_key(&self, key: &str) -> String {
		format!("{}{key}", self.inner.config.key_prefix)
	}

	fn tag_key(&self, tag: &str) -> String {
		format!("{}tag:{tag}", self.inner.config.key_prefix)
	}

	fn generation_key(&self, name: &str) -> String {
		format!("{}gen:{name}", self.inner.config.key_prefix)
	}

	/// Mark everything depending on `name` as invalidated
	///
	/// Must run before the matching entries are removed, so a concurrent
	/// [`Cache::memoize`] either sees the bump or has its value removed
	async fn bump_generation(&self, name: &str) {
		*self.inner.generations.entry(name.to_string()).or_default() += 1;

		let Some(mut conn) = self.remote() else {
			return;
		};

		let remote_key = self.generation_key(name);

		let bump = async {
			let _: i64 = conn.incr(&remote_key, 1).await?;
			let _: () = conn.expire(&remote_key, GENERATION_TTL_SECONDS).await?;

			Ok::<(), redis::RedisError>(())
		};

		self.remote_call(bump).await;
	}

	async fn generations(&self, names: &[String]) -> Generations {
		let local = names
			.iter()
			.map(|name| self.inner.generations.get(name).map_or(0, |g| *g))
			.collect();

		let remote = match self.remote() {
			Some(mut conn) => {
				let keys: Vec<String> =
					names.iter().map(|name| self.generation_key(name)).collect();

				let mut mget = redis::cmd("MGET");
				mget.arg(&keys);

				let counters: Option<Vec<Option<i64>>> =
					self.remote_call(mget.query_async(&mut conn)).await;

				counters
			},
			None => None,
		};

		Generations { local, remote }
	}

	/// Remove a key from both tiers without touching its generation
	async fn evict(&self, key: &str) {
		self.inner.memory.remove(key);

		let Some(mut conn) = self.remote() else {
			return;
		};

		let remote_key = self.remote_key(key);
		let _: Option<()> = self.remote_call(conn.del(&remote_key)).await;
	}

	fn local_key<'a>(&self, remote_key: &'a str) -> &'a str {
		remote_key
			.strip_prefix(&self.inner.config.key_prefix)
			.unwrap_or(remote_key)
	}

	/// Get a value, `None` on a miss or when the stored value cannot be
	/// decoded as `T`
	pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
		if let Some(value) = self.inner.memory.get(key) {
			return serde_json::from_value(value).ok();
		}

		let mut conn = self.remote()?;
		let remote_key = self.remote_key(key);

		let record: Option<Vec<u8>> =
			self.remote_call(conn.get(&remote_key)).await?;
		let value = codec::decode(&record?)?;

		let remaining: Option<i64> =
			self.remote_call(conn.ttl(&remote_key)).await;

		if let Some(seconds) = remaining
			.and_then(|r| u64::try_from(r).ok())
			.filter(|s| *s > 0)
		{
			self.inner.memory.insert(
				key,
				value.clone(),
				Duration::from_secs(seconds),
				&[],
			);
		}

		serde_json::from_value(value).ok()
	}

	/// Store a value in both tiers
	pub async fn set<T: Serialize>(
		&self,
		key: &str,
		value: &T,
		ttl: Duration,
		options: SetOptions,
	) {
		let value = match serde_json::to_value(value) {
			Ok(value) => value,
			Err(e) => {
				warn!("refusing to cache unserializable value for {key} -- {e}");
				return;
			},
		};

		let record = codec::encode(
			&value,
			options.compress,
			self.inner.config.compress_threshold,
		);

		self.inner.memory.insert(key, value, ttl, &options.tags);

		let Some(mut conn) = self.remote() else {
			return;
		};

		let remote_key = self.remote_key(key);
		let seconds = ttl.as_secs().max(1);
		#[allow(clippy::cast_possible_wrap)]
		let seconds_signed = seconds as i64;

		let write = async {
			let _: () = conn.set_ex(&remote_key, record, seconds).await?;

			for tag in &options.tags {
				let tag_key = self.tag_key(tag);

				let _: () = conn.sadd(&tag_key, &remote_key).await?;

				// The index lives as long as its longest-lived member
				let remaining: i64 = conn.ttl(&tag_key).await?;
				if remaining < seconds_signed {
					let _: () = conn.expire(&tag_key, seconds_signed).await?;
				}
			}

			Ok::<(), redis::RedisError>(())
		};

		self.remote_call(write).await;
	}

	/// Remove a single key from both tiers
	pub async fn delete(&self, key: &str) {
		self.bump_generation(&format!("key:{key}")).await;
		self.evict(key).await;
	}

	/// Remove every key matching a glob pattern (`*` and `?`), returning the
	/// number of distinct keys removed
	pub async fn invalidate(&self, pattern: &str) -> usize {
		self.bump_generation(GLOB_GENERATION).await;

		let mut removed: BTreeSet<String> = match glob_regex(pattern) {
			Ok(regex) => {
				self.inner.memory.remove_matching(&regex).into_iter().collect()
			},
			Err(e) => {
				warn!("invalid cache invalidation pattern {pattern} -- {e}");
				BTreeSet::new()
			},
		};

		if let Some(mut conn) = self.remote() {
			let remote_pattern = self.remote_key(pattern);

			let keys: Option<Vec<String>> =
				self.remote_call(conn.keys(&remote_pattern)).await;

			if let Some(keys) = keys.filter(|k| !k.is_empty()) {
				let _: Option<()> = self.remote_call(conn.del(&keys)).await;

				removed.extend(keys.iter().map(|k| self.local_key(k).to_string()));
			}
		}

		debug!("invalidated {} cache keys matching {pattern}", removed.len());

		removed.len()
	}

	/// Remove every key stored with `tag`, returning the number of distinct
	/// keys removed
	pub async fn invalidate_by_tag(&self, tag: &str) -> usize {
		self.bump_generation(&format!("tag:{tag}")).await;

		let mut removed: BTreeSet<String> =
			self.inner.memory.remove_tag(tag).into_iter().collect();

		if let Some(mut conn) = self.remote() {
			let tag_key = self.tag_key(tag);

			let members: Option<Vec<String>> =
				self.remote_call(conn.smembers(&tag_key)).await;

			if let Some(mut members) = members {
				for member in &members {
					// Entries filled from redis carry no local tags
					let local = self.local_key(member).to_string();
					self.inner.memory.remove(&local);
					removed.insert(local);
				}

				members.push(tag_key);
				let _: Option<()> = self.remote_call(conn.del(&members)).await;
			}
		}

		debug!("invalidated {} cache keys tagged {tag}", removed.len());

		removed.len()
	}

	/// Return the cached value under `key` or compute, store and return it
	///
	/// Errors from `loader` are passed through and never cached. A value
	/// whose key or tags are invalidated while `loader` runs is returned but
	/// not kept
	///
	/// # Errors
	/// Fails if `loader` fails
	pub async fn memoize<T, E, F, Fut>(
		&self,
		key: &str,
		ttl: Duration,
		options: SetOptions,
		loader: F,
	) -> Result<T, E>
	where
		T: Serialize + DeserializeOwned,
		F: FnOnce() -> Fut,
		Fut: Future<Output = Result<T, E>>,
	{
		if let Some(hit) = self.get(key).await {
			return Ok(hit);
		}

		let names = generation_names(key, &options.tags);
		let before = self.generations(&names).await;

		let value = loader().await?;

		self.set(key, &value, ttl, options).await;

		if self.generations(&names).await != before {
			debug!("{key} was invalidated while loading, not caching it");
			self.evict(key).await;
		}

		Ok(value)
	}

	/// Periodically purge expired in-process entries
	///
	/// The task stops once every handle to the cache is dropped. A zero
	/// `period` sweeps once per second
	#[must_use]
	pub fn spawn_sweeper(&self, period: Duration) -> JoinHandle<()> {
		let inner = Arc::downgrade(&self.inner);
		let period = if period.is_zero() { Duration::from_secs(1) } else { period };

		tokio::spawn(async move {
			let mut interval = tokio::time::interval(period);
			interval.tick().await;

			loop {
				interval.tick().await;

				let Some(inner) = inner.upgrade() else {
					break;
				};

				let purged = inner.memory.purge_expired();
				if purged > 0 {
					debug!("swept {purged} expired cache entries");
				}
			}
		})
	}
}

/// Translate a redis style glob into an anchored regex
fn glob_regex(pattern: &str) -> Result<Regex, regex::Error> {
	let mut regex = String::from("^");

	for c in pattern.chars() {
		match c {
			'*' => regex.push_str(".*"),
			'?' => regex.push('.'),
			c => regex.push_str(&regex::escape(&c.to_string())),
		}
	}

	regex.push('$');

	Regex::new(&regex)
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicUsize;

	use serde::Deserialize;

	use super::*;

	const MINUTE: Duration = Duration::from_secs(60);

	#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
	struct Slot {
		time:      String,
		available: bool,
	}

	fn slot() -> Slot { Slot { time: "18:30".into(), available: true } }

	fn unreachable_config() -> CacheConfig {
		CacheConfig {
			// Nothing listens on the discard port
			redis_url: Some("redis://127.0.0.1:9/".to_string()),
			operation_timeout: Duration::from_millis(200),
			..CacheConfig::default()
		}
	}

	#[tokio::test]
	async fn set_then_get_survives_unreachable_redis() {
		let cache = Cache::connect(unreachable_config()).await;

		assert!(cache.is_degraded());

		cache.set("slots:2026-10-19", &slot(), MINUTE, SetOptions::default()).await;

		assert_eq!(cache.get::<Slot>("slots:2026-10-19").await, Some(slot()));
	}

	#[tokio::test]
	async fn memory_only_cache_is_not_degraded() {
		let cache = Cache::memory_only(CacheConfig::default());

		assert!(!cache.is_degraded());
		assert!(!cache.try_reconnect().await);
		assert_eq!(cache.get::<Slot>("missing").await, None);
	}

	#[tokio::test]
	async fn mismatched_types_read_as_miss() {
		let cache = Cache::memory_only(CacheConfig::default());

		cache.set("n", &42, MINUTE, SetOptions::default()).await;

		assert_eq!(cache.get::<Slot>("n").await, None);
		assert_eq!(cache.get::<i32>("n").await, Some(42));
	}

	#[tokio::test]
	async fn delete_removes_a_key() {
		let cache = Cache::memory_only(CacheConfig::default());

		cache.set("settings", &slot(), MINUTE, SetOptions::default()).await;
		cache.delete("settings").await;

		assert_eq!(cache.get::<Slot>("settings").await, None);
	}

	#[tokio::test]
	async fn glob_invalidation_only_hits_matching_keys() {
		let cache = Cache::memory_only(CacheConfig::default());

		for key in ["slots:2026-10-19", "slots:2026-10-20", "settings"] {
			cache.set(key, &slot(), MINUTE, SetOptions::default()).await;
		}

		assert_eq!(cache.invalidate("slots:*").await, 2);
		assert_eq!(cache.get::<Slot>("slots:2026-10-19").await, None);
		assert_eq!(cache.get::<Slot>("settings").await, Some(slot()));

		assert_eq!(cache.invalidate("settin?s").await, 1);
	}

	#[tokio::test]
	async fn tag_invalidation_removes_members() {
		let cache = Cache::memory_only(CacheConfig::default());

		let tagged = SetOptions::tagged(["slots", "slots:2026-10-19"]);
		cache.set("slots:2026-10-19", &slot(), MINUTE, tagged).await;
		cache.set("slots:2026-10-20", &slot(), MINUTE, SetOptions::tagged(["slots"])).await;

		assert_eq!(cache.invalidate_by_tag("slots:2026-10-19").await, 1);
		assert_eq!(cache.get::<Slot>("slots:2026-10-20").await, Some(slot()));

		assert_eq!(cache.invalidate_by_tag("slots").await, 1);
		assert_eq!(cache.get::<Slot>("slots:2026-10-20").await, None);
	}

	#[tokio::test]
	async fn memoize_only_loads_on_a_miss() {
		let cache = Cache::memory_only(CacheConfig::default());
		let calls = AtomicUsize::new(0);

		for _ in 0..3 {
			let value: Result<Slot, ()> = cache
				.memoize("slots:2026-10-19", MINUTE, SetOptions::default(), || async {
					calls.fetch_add(1, Ordering::SeqCst);
					Ok(slot())
				})
				.await;

			assert_eq!(value, Ok(slot()));
		}

		assert_eq!(calls.load(Ordering::SeqCst), 1);
	}

	#[tokio::test]
	async fn memoize_does_not_cache_errors() {
		let cache = Cache::memory_only(CacheConfig::default());

		let failed: Result<Slot, &str> = cache
			.memoize("k", MINUTE, SetOptions::default(), || async { Err("down") })
			.await;
		assert_eq!(failed, Err("down"));

		let loaded: Result<Slot, &str> = cache
			.memoize("k", MINUTE, SetOptions::default(), || async { Ok(slot()) })
			.await;
		assert_eq!(loaded, Ok(slot()));
	}

	#[tokio::test]
	async fn memoize_drops_values_invalidated_while_loading() {
		let cache = Cache::memory_only(CacheConfig::default());
		let tags = SetOptions::tagged(["slots", "slots:2026-10-19"]);

		let stale: Result<bool, ()> = cache
			.memoize("slots:2026-10-19", MINUTE, tags.clone(), || async {
				// A booking commits after the counts were read
				cache.invalidate_by_tag("slots:2026-10-19").await;
				Ok(true)
			})
			.await;

		assert_eq!(stale, Ok(true));
		assert_eq!(cache.get::<bool>("slots:2026-10-19").await, None);

		let fresh: Result<bool, ()> = cache
			.memoize("slots:2026-10-19", MINUTE, tags, || async { Ok(false) })
			.await;

		assert_eq!(fresh, Ok(false));
		assert_eq!(cache.get::<bool>("slots:2026-10-19").await, Some(false));
	}

	#[tokio::test]
	async fn memoize_drops_values_deleted_while_loading() {
		let cache = Cache::memory_only(CacheConfig::default());

		let stale: Result<i32, ()> = cache
			.memoize("settings", MINUTE, SetOptions::default(), || async {
				cache.delete("settings").await;
				Ok(1)
			})
			.await;

		assert_eq!(stale, Ok(1));
		assert_eq!(cache.get::<i32>("settings").await, None);

		cache.invalidate("slots:*").await;

		let unrelated: Result<i32, ()> = cache
			.memoize("settings", MINUTE, SetOptions::default(), || async {
				cache.invalidate_by_tag("other").await;
				Ok(2)
			})
			.await;

		assert_eq!(unrelated, Ok(2));
		assert_eq!(cache.get::<i32>("settings").await, Some(2));
	}

	#[tokio::test]
	async fn sweeper_purges_expired_entries() {
		let cache = Cache::memory_only(CacheConfig::default());

		cache.set("short", &slot(), Duration::from_millis(10), SetOptions::default()).await;
		cache.set("long", &slot(), MINUTE, SetOptions::default()).await;

		let sweeper = cache.spawn_sweeper(Duration::from_millis(20));
		tokio::time::sleep(Duration::from_millis(100)).await;

		assert_eq!(cache.inner.memory.len(), 1);

		sweeper.abort();
	}

	#[tokio::test]
	async fn sweeper_accepts_a_zero_period() {
		let cache = Cache::memory_only(CacheConfig::default());

		let sweeper = cache.spawn_sweeper(Duration::ZERO);
		tokio::time::sleep(Duration::from_millis(50)).await;

		assert!(!sweeper.is_finished());

		sweeper.abort();
	}

	#[test]
	fn globs_are_anchored_and_escaped() {
		let regex = glob_regex("slots:2026-10-1?.*").unwrap();

		assert!(regex.is_match("slots:2026-10-19.json"));
		assert!(!regex.is_match("xslots:2026-10-19.json"));
		assert!(!regex.is_match("slots:2026-10-19-json"));
	}
}
