//! In-memory capability doubles and deterministic fixtures for engine
//! tests. Nothing here is wired into production paths.

use std::{
	collections::{HashMap, HashSet},
	sync::{
		Mutex,
		atomic::{AtomicBool, AtomicU32, Ordering},
	},
};

use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use palate_domain::{CandidateItem, NutritionFacts, Profile};
use palate_engine::{
	BoxFuture, CacheBackend, CandidateQuery, CandidateSource, CapabilityError, ProfileStore,
};

/// A fixed reference instant so fixtures age identically across test runs.
pub fn fixture_now() -> OffsetDateTime {
	OffsetDateTime::from_unix_timestamp(1_750_000_000).unwrap()
}

pub fn item_id(n: u128) -> Uuid {
	Uuid::from_u128(n)
}

pub fn subject_id(n: u128) -> Uuid {
	Uuid::from_u128(0xF000 + n)
}

/// A safe, fully-populated candidate; tests mutate the fields under test.
pub fn base_item(n: u128) -> CandidateItem {
	CandidateItem {
		item_id: item_id(n),
		name: format!("Fixture item {n}"),
		diet_tags: vec![],
		allergen_tags: Some(vec![]),
		ingredients: vec!["water".to_string(), "salt".to_string()],
		categories: vec!["dinner".to_string()],
		nutrition: Some(NutritionFacts {
			calories: 450.0,
			protein_g: 25.0,
			carbs_g: 40.0,
			fat_g: 15.0,
			sugar_g: 8.0,
			sodium_mg: 600.0,
		}),
		popularity: 100 + n as u64,
		updated_at: fixture_now() - time::Duration::days(n as i64 % 30),
	}
}

pub fn base_profile(n: u128) -> Profile {
	Profile {
		subject_id: subject_id(n),
		diets: vec![],
		excluded_diets: vec![],
		allergens: vec![],
		disliked_ingredients: vec![],
		conditions: vec![],
		preferred_categories: vec![],
		macro_targets: None,
		recent_items: vec![],
	}
}

/// Candidate source backed by a plain vector. Deliberately does no
/// filtering of its own, so every admission decision observed in a test
/// was made by the engine's re-verification.
pub struct MemoryCandidateSource {
	items: Mutex<Vec<CandidateItem>>,
	fail: AtomicBool,
	fetch_calls: AtomicU32,
	stall: AtomicBool,
}
impl MemoryCandidateSource {
	pub fn new(items: Vec<CandidateItem>) -> Self {
		Self {
			items: Mutex::new(items),
			fail: AtomicBool::new(false),
			fetch_calls: AtomicU32::new(0),
			stall: AtomicBool::new(false),
		}
	}

	pub fn set_items(&self, items: Vec<CandidateItem>) {
		*self.items.lock().unwrap() = items;
	}

	pub fn set_failing(&self, failing: bool) {
		self.fail.store(failing, Ordering::SeqCst);
	}

	/// When set, fetches hang until cancelled; used to exercise tier
	/// timeouts.
	pub fn set_stalling(&self, stalling: bool) {
		self.stall.store(stalling, Ordering::SeqCst);
	}

	pub fn fetch_calls(&self) -> u32 {
		self.fetch_calls.load(Ordering::SeqCst)
	}
}
impl CandidateSource for MemoryCandidateSource {
	fn fetch<'a>(
		&'a self,
		_query: &'a CandidateQuery,
		overfetch_limit: u32,
	) -> BoxFuture<'a, Result<Vec<CandidateItem>, CapabilityError>> {
		Box::pin(async move {
			self.fetch_calls.fetch_add(1, Ordering::SeqCst);

			if self.stall.load(Ordering::SeqCst) {
				std::future::pending::<()>().await;
			}
			if self.fail.load(Ordering::SeqCst) {
				return Err("candidate source down".into());
			}

			let items = self.items.lock().unwrap();

			Ok(items.iter().take(overfetch_limit as usize).cloned().collect())
		})
	}
}

pub struct MemoryProfileStore {
	profiles: Mutex<HashMap<(String, Uuid), Profile>>,
	failing_subjects: Mutex<HashSet<Uuid>>,
}
impl MemoryProfileStore {
	pub fn new() -> Self {
		Self { profiles: Mutex::new(HashMap::new()), failing_subjects: Mutex::new(HashSet::new()) }
	}

	pub fn insert(&self, tenant_id: &str, profile: Profile) {
		self.profiles
			.lock()
			.unwrap()
			.insert((tenant_id.to_string(), profile.subject_id), profile);
	}

	/// Marks one subject's lookups as failing, the model for a partially
	/// degraded profile store.
	pub fn fail_subject(&self, subject_id: Uuid) {
		self.failing_subjects.lock().unwrap().insert(subject_id);
	}
}
impl Default for MemoryProfileStore {
	fn default() -> Self {
		Self::new()
	}
}
impl ProfileStore for MemoryProfileStore {
	fn profile<'a>(
		&'a self,
		tenant_id: &'a str,
		subject_id: Uuid,
	) -> BoxFuture<'a, Result<Option<Profile>, CapabilityError>> {
		Box::pin(async move {
			if self.failing_subjects.lock().unwrap().contains(&subject_id) {
				return Err(format!("profile lookup failed for {subject_id}").into());
			}

			Ok(self.profiles.lock().unwrap().get(&(tenant_id.to_string(), subject_id)).cloned())
		})
	}
}

pub struct MemoryCacheBackend {
	entries: Mutex<HashMap<String, (Value, OffsetDateTime)>>,
	available: AtomicBool,
	puts: AtomicU32,
	gets: AtomicU32,
}
impl MemoryCacheBackend {
	pub fn new() -> Self {
		Self {
			entries: Mutex::new(HashMap::new()),
			available: AtomicBool::new(true),
			puts: AtomicU32::new(0),
			gets: AtomicU32::new(0),
		}
	}

	pub fn set_available(&self, available: bool) {
		self.available.store(available, Ordering::SeqCst);
	}

	pub fn len(&self) -> usize {
		self.entries.lock().unwrap().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn puts(&self) -> u32 {
		self.puts.load(Ordering::SeqCst)
	}

	pub fn gets(&self) -> u32 {
		self.gets.load(Ordering::SeqCst)
	}
}
impl Default for MemoryCacheBackend {
	fn default() -> Self {
		Self::new()
	}
}
impl CacheBackend for MemoryCacheBackend {
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>, CapabilityError>> {
		Box::pin(async move {
			self.gets.fetch_add(1, Ordering::SeqCst);

			if !self.available.load(Ordering::SeqCst) {
				return Err("cache backend down".into());
			}

			let mut entries = self.entries.lock().unwrap();
			let Some((value, expires_at)) = entries.get(key) else {
				return Ok(None);
			};

			if *expires_at <= OffsetDateTime::now_utc() {
				entries.remove(key);

				return Ok(None);
			}

			Ok(Some(value.clone()))
		})
	}

	fn put<'a>(
		&'a self,
		key: &'a str,
		value: Value,
		ttl_secs: i64,
	) -> BoxFuture<'a, Result<(), CapabilityError>> {
		Box::pin(async move {
			self.puts.fetch_add(1, Ordering::SeqCst);

			if !self.available.load(Ordering::SeqCst) {
				return Err("cache backend down".into());
			}

			let expires_at = OffsetDateTime::now_utc() + time::Duration::seconds(ttl_secs);

			self.entries.lock().unwrap().insert(key.to_string(), (value, expires_at));

			Ok(())
		})
	}

	fn delete_prefix<'a>(
		&'a self,
		prefix: &'a str,
	) -> BoxFuture<'a, Result<u64, CapabilityError>> {
		Box::pin(async move {
			if !self.available.load(Ordering::SeqCst) {
				return Err("cache backend down".into());
			}

			let mut entries = self.entries.lock().unwrap();
			let before = entries.len();

			entries.retain(|key, _| !key.starts_with(prefix));

			Ok((before - entries.len()) as u64)
		})
	}
}
