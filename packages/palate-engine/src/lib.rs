pub mod cache;
pub mod cascade;
pub mod scoring;

use std::{
	collections::{HashMap, HashSet},
	future::Future,
	pin::Pin,
	sync::{
		Arc,
		atomic::{AtomicI64, Ordering as AtomicOrdering},
	},
};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::{sync::Semaphore, task::JoinSet};
use uuid::Uuid;

use palate_config::Config;
use palate_domain::{CandidateItem, HardConstraints, Profile, Tier};

pub type EngineResult<T> = Result<T, Error>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Capability failures are opaque to the engine; it only decides whether a
/// failure is soft (logged, degraded around) or surfaced per subject.
pub type CapabilityError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug)]
pub enum Error {
	InvalidInput { message: String },
	Profile { message: String },
}
impl std::fmt::Display for Error {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Self::InvalidInput { message } => write!(f, "Invalid input: {message}"),
			Self::Profile { message } => write!(f, "Profile store error: {message}"),
		}
	}
}
impl std::error::Error for Error {}

/// The constraint slice a candidate source may push down for efficiency.
/// Pushdown is an optimization only; the scorer re-verifies every hard
/// constraint on whatever comes back.
#[derive(Clone, Debug)]
pub struct CandidateQuery {
	pub tenant_id: String,
	pub tier: Tier,
	pub hard: HardConstraints,
}

pub trait CandidateSource
where
	Self: Send + Sync,
{
	fn fetch<'a>(
		&'a self,
		query: &'a CandidateQuery,
		overfetch_limit: u32,
	) -> BoxFuture<'a, Result<Vec<CandidateItem>, CapabilityError>>;
}

pub trait ProfileStore
where
	Self: Send + Sync,
{
	fn profile<'a>(
		&'a self,
		tenant_id: &'a str,
		subject_id: Uuid,
	) -> BoxFuture<'a, Result<Option<Profile>, CapabilityError>>;
}

pub trait CacheBackend
where
	Self: Send + Sync,
{
	fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Value>, CapabilityError>>;

	fn put<'a>(
		&'a self,
		key: &'a str,
		value: Value,
		ttl_secs: i64,
	) -> BoxFuture<'a, Result<(), CapabilityError>>;

	fn delete_prefix<'a>(&'a self, prefix: &'a str)
	-> BoxFuture<'a, Result<u64, CapabilityError>>;
}

#[derive(Clone)]
pub struct Capabilities {
	pub candidates: Arc<dyn CandidateSource>,
	pub profiles: Arc<dyn ProfileStore>,
	pub cache: Arc<dyn CacheBackend>,
}
impl Capabilities {
	pub fn new(
		candidates: Arc<dyn CandidateSource>,
		profiles: Arc<dyn ProfileStore>,
		cache: Arc<dyn CacheBackend>,
	) -> Self {
		Self { candidates, profiles, cache }
	}
}

/// Derived safety flags carried on every result for downstream auditing.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SafetyFlags {
	pub allergen_safe: bool,
	pub diet_compliant: bool,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ScoredResult {
	pub item_id: Uuid,
	/// Fixed 0-100 scale.
	pub score: f32,
	/// Fixed priority order: safety, preference matches, nutrition
	/// highlights, popularity.
	pub reasons: Vec<String>,
	pub safety: SafetyFlags,
	pub tier: Tier,
	#[serde(with = "palate_domain::time_serde")]
	pub updated_at: OffsetDateTime,
}

/// One page of ranked output plus whether it was served from cache.
#[derive(Clone, Debug)]
pub struct RankedPage {
	pub results: Vec<ScoredResult>,
	pub cache_hit: bool,
}

/// The public entry point. Capabilities are injected at construction; there
/// is no module-level client state to swap out under test.
#[derive(Clone)]
pub struct MatchEngine {
	cfg: Config,
	capabilities: Capabilities,
	cache_warned_at: Arc<AtomicI64>,
}
impl MatchEngine {
	pub fn new(cfg: Config, capabilities: Capabilities) -> Self {
		Self { cfg, capabilities, cache_warned_at: Arc::new(AtomicI64::new(i64::MIN)) }
	}

	pub fn config(&self) -> &Config {
		&self.cfg
	}

	/// Returns one ranked page for a subject, read-through cached.
	///
	/// Cache trouble never fails the call; it degrades to direct
	/// computation. A missing profile is not an error either: it derives
	/// the widest-net constraint set.
	pub async fn ranked_results(
		&self,
		tenant_id: &str,
		subject_id: Uuid,
		quota: u32,
		offset: u32,
	) -> EngineResult<RankedPage> {
		let tenant_id = validate_tenant(tenant_id)?;

		self.validate_page(quota, offset)?;

		let profile = self
			.capabilities
			.profiles
			.profile(tenant_id, subject_id)
			.await
			.map_err(|err| Error::Profile { message: err.to_string() })?;

		if profile.is_none() {
			tracing::debug!(subject_id = %subject_id, "Profile unavailable. Using widest-net constraints.");
		}

		let bucket = cache::quota_bucket(offset.saturating_add(quota), self.cfg.cache.bucket_size);
		let key = cache::build_ranked_cache_key(tenant_id, subject_id, bucket, &self.cfg);

		if self.cfg.cache.enabled
			&& let Some(key) = key.as_deref()
		{
			match self.capabilities.cache.get(key).await {
				Ok(Some(value)) =>
					if let Some(results) = cache::decode_payload(value) {
						return Ok(RankedPage {
							results: cache::page_slice(results, offset, quota),
							cache_hit: true,
						});
					},
				Ok(None) => {},
				Err(err) => self.warn_cache_unavailable(&err),
			}
		}

		let results = cascade::run_cascade(
			&self.cfg,
			self.capabilities.candidates.as_ref(),
			profile.as_ref(),
			tenant_id,
			bucket,
			OffsetDateTime::now_utc(),
		)
		.await;

		if self.cfg.cache.enabled
			&& let Some(key) = key.as_deref()
			&& let Some(payload) = cache::encode_payload(&results)
			&& let Err(err) = self.capabilities.cache.put(key, payload, self.cfg.cache.ttl_secs).await
		{
			self.warn_cache_unavailable(&err);
		}

		Ok(RankedPage { results: cache::page_slice(results, offset, quota), cache_hit: false })
	}

	/// Fans one quota out across many subjects under a bounded concurrency
	/// limit. A failing subject becomes an error entry in the returned map;
	/// it never aborts its siblings or the batch call.
	pub async fn batch_ranked_results(
		&self,
		tenant_id: &str,
		subject_ids: &[Uuid],
		quota: u32,
	) -> EngineResult<HashMap<Uuid, EngineResult<Vec<ScoredResult>>>> {
		let tenant_id = validate_tenant(tenant_id)?.to_string();

		self.validate_page(quota, 0)?;

		let semaphore = Arc::new(Semaphore::new(self.cfg.batch.concurrency as usize));
		let mut join_set = JoinSet::new();
		let mut spawned = HashSet::new();

		for subject_id in subject_ids.iter().copied() {
			if !spawned.insert(subject_id) {
				continue;
			}

			let engine = self.clone();
			let tenant_id = tenant_id.clone();
			let semaphore = semaphore.clone();

			join_set.spawn(async move {
				let _permit = match semaphore.acquire_owned().await {
					Ok(permit) => permit,
					Err(_) =>
						return (
							subject_id,
							Err(Error::Profile { message: "Batch was cancelled.".to_string() }),
						),
				};
				let result = engine
					.ranked_results(&tenant_id, subject_id, quota, 0)
					.await
					.map(|page| page.results);

				(subject_id, result)
			});
		}

		let mut out = HashMap::new();

		while let Some(joined) = join_set.join_next().await {
			match joined {
				Ok((subject_id, result)) => {
					if let Err(err) = result.as_ref() {
						tracing::warn!(subject_id = %subject_id, error = %err, "Subject ranking failed within batch.");
					}

					out.insert(subject_id, result);
				},
				Err(err) => {
					tracing::error!(error = %err, "Batch ranking task panicked or was aborted.");
				},
			}
		}

		Ok(out)
	}

	/// Drops every cached page for a subject, e.g. after an upstream
	/// profile or catalog mutation event. Backend unavailability is soft:
	/// entries expire by TTL anyway.
	pub async fn invalidate(&self, tenant_id: &str, subject_id: Uuid) -> EngineResult<()> {
		let tenant_id = validate_tenant(tenant_id)?;
		let prefix = cache::subject_prefix(tenant_id, subject_id);

		match self.capabilities.cache.delete_prefix(&prefix).await {
			Ok(removed) => {
				tracing::debug!(subject_id = %subject_id, removed, "Invalidated ranked cache entries.");
			},
			Err(err) => self.warn_cache_unavailable(&err),
		}

		Ok(())
	}

	fn validate_page(&self, quota: u32, offset: u32) -> EngineResult<()> {
		if quota == 0 || quota > self.cfg.engine.max_quota {
			return Err(Error::InvalidInput {
				message: format!(
					"quota must be between 1 and {}. Got {quota}.",
					self.cfg.engine.max_quota
				),
			});
		}
		if offset > self.cfg.engine.max_offset {
			return Err(Error::InvalidInput {
				message: format!(
					"offset must not exceed {}. Got {offset}.",
					self.cfg.engine.max_offset
				),
			});
		}

		Ok(())
	}

	// Rate-limits the cache-unavailable warning so a dead backend does not
	// turn the log into a storm.
	fn warn_cache_unavailable(&self, err: &CapabilityError) {
		let now = OffsetDateTime::now_utc().unix_timestamp();
		let window = self.cfg.cache.unavailable_log_window_secs as i64;
		let last = self.cache_warned_at.load(AtomicOrdering::Relaxed);

		if now.saturating_sub(last) >= window
			&& self
				.cache_warned_at
				.compare_exchange(last, now, AtomicOrdering::Relaxed, AtomicOrdering::Relaxed)
				.is_ok()
		{
			tracing::warn!(error = %err, "Cache backend unavailable. Degrading to direct computation.");
		}
	}
}

fn validate_tenant(tenant_id: &str) -> EngineResult<&str> {
	let trimmed = tenant_id.trim();

	if trimmed.is_empty() {
		return Err(Error::InvalidInput { message: "tenant_id must be non-empty.".to_string() });
	}

	Ok(trimmed)
}
