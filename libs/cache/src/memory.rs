//! In-process tier, bounded and evicted in insertion order

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::Mutex;
use regex::Regex;
use serde_json::Value;

struct Entry {
	value:      Value,
	expires_at: Instant,
	seq:        u64,
}

pub(crate) struct MemoryStore {
	entries:  DashMap<String, Entry>,
	tags:     DashMap<String, HashSet<String>>,
	/// Insertion sequence of every write, stale positions are skipped
	order:    Mutex<VecDeque<(u64, String)>>,
	next_seq: AtomicU64,
	capacity: usize,
}

impl MemoryStore {
	pub(crate) fn new(capacity: usize) -> Self {
		Self {
			entries: DashMap::new(),
			tags: DashMap::new(),
			order: Mutex::new(VecDeque::new()),
			next_seq: AtomicU64::new(0),
			capacity: capacity.max(1),
		}
	}

	pub(crate) fn len(&self) -> usize { self.entries.len() }

	pub(crate) fn insert(
		&self,
		key: &str,
		value: Value,
		ttl: Duration,
		tags: &[String],
	) {
		let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
		let expires_at = Instant::now() + ttl;

		self.entries.insert(key.to_string(), Entry { value, expires_at, seq });

		for tag in tags {
			self.tags.entry(tag.clone()).or_default().insert(key.to_string());
		}

		let mut order = self.order.lock();
		order.push_back((seq, key.to_string()));

		while self.entries.len() > self.capacity {
			let Some((seq, key)) = order.pop_front() else {
				break;
			};

			self.entries.remove_if(&key, |_, e| e.seq == seq);
		}

		// Rewrites of the same key leave stale positions behind
		if order.len() > self.capacity * 2 {
			order.retain(|(seq, key)| {
				self.entries.get(key).is_some_and(|e| e.seq == *seq)
			});
		}
	}

	pub(crate) fn get(&self, key: &str) -> Option<Value> {
		let now = Instant::now();

		if let Some(entry) = self.entries.get(key)
			&& entry.expires_at > now
		{
			return Some(entry.value.clone());
		}

		self.entries.remove_if(key, |_, e| e.expires_at <= now);

		None
	}

	pub(crate) fn remove(&self, key: &str) -> bool {
		self.entries.remove(key).is_some()
	}

	pub(crate) fn remove_matching(&self, pattern: &Regex) -> Vec<String> {
		let keys: Vec<String> = self
			.entries
			.iter()
			.filter(|e| pattern.is_match(e.key()))
			.map(|e| e.key().clone())
			.collect();

		keys.into_iter().filter(|k| self.remove(k)).collect()
	}

	/// Drop every entry carrying `tag`, returning the removed keys
	pub(crate) fn remove_tag(&self, tag: &str) -> Vec<String> {
		let Some((_, keys)) = self.tags.remove(tag) else {
			return vec![];
		};

		keys.into_iter().filter(|k| self.remove(k)).collect()
	}

	/// Remove expired entries and tag memberships of keys that are gone
	pub(crate) fn purge_expired(&self) -> usize {
		let now = Instant::now();
		let before = self.entries.len();

		self.entries.retain(|_, e| e.expires_at > now);

		self.tags.retain(|_, keys| {
			keys.retain(|k| self.entries.contains_key(k));
			!keys.is_empty()
		});

		before.saturating_sub(self.entries.len())
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	const MINUTE: Duration = Duration::from_secs(60);

	#[test]
	fn evicts_oldest_insertion_first() {
		let store = MemoryStore::new(2);

		store.insert("a", json!(1), MINUTE, &[]);
		store.insert("b", json!(2), MINUTE, &[]);
		store.insert("c", json!(3), MINUTE, &[]);

		assert_eq!(store.get("a"), None);
		assert_eq!(store.get("b"), Some(json!(2)));
		assert_eq!(store.get("c"), Some(json!(3)));
	}

	#[test]
	fn rewriting_a_key_refreshes_its_position() {
		let store = MemoryStore::new(2);

		store.insert("a", json!(1), MINUTE, &[]);
		store.insert("b", json!(2), MINUTE, &[]);
		store.insert("a", json!(10), MINUTE, &[]);
		store.insert("c", json!(3), MINUTE, &[]);

		assert_eq!(store.get("a"), Some(json!(10)));
		assert_eq!(store.get("b"), None);
		assert_eq!(store.len(), 2);
	}

	#[test]
	fn expired_entries_are_not_returned() {
		let store = MemoryStore::new(8);

		store.insert("gone", json!(1), Duration::ZERO, &[]);

		assert_eq!(store.get("gone"), None);
		assert_eq!(store.len(), 0);
	}

	#[test]
	fn purge_drops_expired_entries_and_their_tags() {
		let store = MemoryStore::new(8);
		let tags = ["slots".to_string()];

		store.insert("old", json!(1), Duration::ZERO, &tags);
		store.insert("fresh", json!(2), MINUTE, &[]);

		assert_eq!(store.purge_expired(), 1);
		assert_eq!(store.len(), 1);
		assert!(store.remove_tag("slots").is_empty());
	}

	#[test]
	fn tags_remove_all_members() {
		let store = MemoryStore::new(8);
		let tags = ["slots".to_string()];

		store.insert("slots:2026-10-19", json!([]), MINUTE, &tags);
		store.insert("slots:2026-10-20", json!([]), MINUTE, &tags);
		store.insert("settings", json!({}), MINUTE, &[]);

		let mut removed = store.remove_tag("slots");
		removed.sort();

		assert_eq!(removed, ["slots:2026-10-19", "slots:2026-10-20"]);
		assert_eq!(store.get("settings"), Some(json!({})));
	}
}
