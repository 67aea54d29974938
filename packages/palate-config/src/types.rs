use serde::Deserialize;

/// Nutrition fields a condition cap may target. Anything else is a
/// configuration error at load time, never a silent no-op at query time.
pub const NUTRIENT_FIELDS: [&str; 6] =
	["calories", "protein_g", "carbs_g", "fat_g", "sugar_g", "sodium_mg"];

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
	pub storage: Storage,
	#[serde(default)]
	pub engine: Engine,
	#[serde(default)]
	pub scoring: Scoring,
	#[serde(default)]
	pub caps: CapsPolicy,
	#[serde(default)]
	pub cache: Cache,
	#[serde(default)]
	pub batch: Batch,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Storage {
	pub postgres: Postgres,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Postgres {
	pub dsn: String,
	pub pool_max_conns: u32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Engine {
	pub max_quota: u32,
	pub max_offset: u32,
	pub overfetch_multiplier: u32,
	pub tier_timeout_ms: u64,
}
impl Default for Engine {
	fn default() -> Self {
		Self { max_quota: 100, max_offset: 10_000, overfetch_multiplier: 3, tier_timeout_ms: 2_000 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Scoring {
	pub recency_tau_days: f32,
	pub popularity_saturation: f32,
	pub exposure_tau_days: f32,
	pub exposure_stale_days: f32,
	pub weights: TierWeightTables,
}
impl Default for Scoring {
	fn default() -> Self {
		Self {
			recency_tau_days: 30.0,
			popularity_saturation: 10_000.0,
			exposure_tau_days: 3.0,
			exposure_stale_days: 14.0,
			weights: TierWeightTables::default(),
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TierWeightTables {
	pub strict: TierWeights,
	pub balanced: TierWeights,
	pub fallback: TierWeights,
}
impl Default for TierWeightTables {
	fn default() -> Self {
		Self {
			strict: TierWeights {
				category: 0.2,
				macro_fit: 0.25,
				recency: 0.2,
				popularity: 0.15,
				cap_fit: 0.2,
				exposure_penalty: 0.3,
			},
			balanced: TierWeights::default(),
			fallback: TierWeights::popularity_fallback(),
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct TierWeights {
	pub category: f32,
	pub macro_fit: f32,
	pub recency: f32,
	pub popularity: f32,
	pub cap_fit: f32,
	pub exposure_penalty: f32,
}
impl Default for TierWeights {
	fn default() -> Self {
		Self {
			category: 0.25,
			macro_fit: 0.2,
			recency: 0.2,
			popularity: 0.2,
			cap_fit: 0.15,
			exposure_penalty: 0.2,
		}
	}
}
impl TierWeights {
	/// The fallback tier ranks by popularity and recency only.
	pub fn popularity_fallback() -> Self {
		Self {
			category: 0.0,
			macro_fit: 0.0,
			recency: 0.4,
			popularity: 0.6,
			cap_fit: 0.0,
			exposure_penalty: 0.0,
		}
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CapsPolicy {
	pub version: String,
	pub rules: Vec<CapRule>,
}
impl Default for CapsPolicy {
	fn default() -> Self {
		Self { version: "v1".to_string(), rules: Vec::new() }
	}
}

/// One condition-driven nutrition ceiling. The same condition carries two
/// named thresholds on purpose: the strict cascade tier resolves
/// `strict_limit`, relaxed tiers resolve `relaxed_limit`.
#[derive(Clone, Debug, Deserialize)]
pub struct CapRule {
	pub condition: String,
	pub nutrient: String,
	pub strict_limit: f32,
	pub relaxed_limit: f32,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Cache {
	pub enabled: bool,
	pub ttl_secs: i64,
	pub bucket_size: u32,
	pub unavailable_log_window_secs: u64,
}
impl Default for Cache {
	fn default() -> Self {
		Self { enabled: true, ttl_secs: 300, bucket_size: 25, unavailable_log_window_secs: 60 }
	}
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Batch {
	pub concurrency: u32,
}
impl Default for Batch {
	fn default() -> Self {
		Self { concurrency: 5 }
	}
}
