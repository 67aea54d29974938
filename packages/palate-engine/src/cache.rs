use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::ScoredResult;
use palate_config::Config;

/// Bump when the cached payload layout changes; stale-schema entries decode
/// to a miss instead of deserializing garbage.
pub const RANKED_CACHE_SCHEMA_VERSION: i32 = 1;

#[derive(Debug, Deserialize, Serialize)]
struct RankedCachePayload {
	schema_version: i32,
	results: Vec<ScoredResult>,
}

/// Rounds a ranking depth up to its cache bucket so nearby pages of the
/// same subject share one cached computation. Saturates instead of wrapping
/// when configured paging limits push the depth near `u32::MAX`.
pub fn quota_bucket(depth: u32, bucket_size: u32) -> u32 {
	let bucket_size = bucket_size.max(1) as u64;
	let bucket = (depth.max(1) as u64).div_ceil(bucket_size) * bucket_size;

	bucket.min(u32::MAX as u64) as u32
}

/// Plaintext key prefix shared by every cached page of one subject;
/// invalidation deletes by this prefix.
pub fn subject_prefix(tenant_id: &str, subject_id: Uuid) -> String {
	format!("ranked:{tenant_id}:{subject_id}:")
}

/// Builds the cache key for one (tenant, subject, bucket) computation. The
/// hashed part covers every input that changes ranking output, so a config
/// rollout of weights or caps can never serve a stale page.
pub fn build_ranked_cache_key(
	tenant_id: &str,
	subject_id: Uuid,
	bucket: u32,
	cfg: &Config,
) -> Option<String> {
	let fingerprint = serde_json::json!({
		"kind": "ranked",
		"schema_version": RANKED_CACHE_SCHEMA_VERSION,
		"bucket": bucket,
		"caps_version": cfg.caps.version,
		"caps_rules": cfg.caps.rules.iter().map(|rule| {
			serde_json::json!({
				"condition": rule.condition,
				"nutrient": rule.nutrient,
				"strict_limit": rule.strict_limit,
				"relaxed_limit": rule.relaxed_limit,
			})
		}).collect::<Vec<_>>(),
		"recency_tau_days": cfg.scoring.recency_tau_days,
		"popularity_saturation": cfg.scoring.popularity_saturation,
		"exposure_tau_days": cfg.scoring.exposure_tau_days,
		"exposure_stale_days": cfg.scoring.exposure_stale_days,
		"weights": weight_fingerprint(cfg),
	});
	let encoded = match serde_json::to_vec(&fingerprint) {
		Ok(encoded) => encoded,
		Err(err) => {
			tracing::warn!(error = %err, "Failed to encode cache key fingerprint. Skipping cache.");

			return None;
		},
	};

	Some(format!("{}{}", subject_prefix(tenant_id, subject_id), blake3::hash(&encoded).to_hex()))
}

fn weight_fingerprint(cfg: &Config) -> Value {
	let table = |weights: &palate_config::TierWeights| {
		serde_json::json!([
			weights.category,
			weights.macro_fit,
			weights.recency,
			weights.popularity,
			weights.cap_fit,
			weights.exposure_penalty,
		])
	};

	serde_json::json!({
		"strict": table(&cfg.scoring.weights.strict),
		"balanced": table(&cfg.scoring.weights.balanced),
		"fallback": table(&cfg.scoring.weights.fallback),
	})
}

pub fn encode_payload(results: &[ScoredResult]) -> Option<Value> {
	let payload = RankedCachePayload {
		schema_version: RANKED_CACHE_SCHEMA_VERSION,
		results: results.to_vec(),
	};

	match serde_json::to_value(&payload) {
		Ok(value) => Some(value),
		Err(err) => {
			tracing::warn!(error = %err, "Failed to encode ranked cache payload. Skipping cache.");

			None
		},
	}
}

/// Decodes a cached payload; a schema mismatch or decode failure is a miss.
pub fn decode_payload(value: Value) -> Option<Vec<ScoredResult>> {
	let payload: RankedCachePayload = serde_json::from_value(value).ok()?;

	if payload.schema_version != RANKED_CACHE_SCHEMA_VERSION {
		return None;
	}

	Some(payload.results)
}

/// Cuts the requested page out of a bucket-length ranked prefix.
pub fn page_slice(results: Vec<ScoredResult>, offset: u32, quota: u32) -> Vec<ScoredResult> {
	results.into_iter().skip(offset as usize).take(quota as usize).collect()
}

#[cfg(test)]
mod tests {
	use time::OffsetDateTime;

	use super::*;
	use crate::SafetyFlags;
	use palate_domain::Tier;

	fn test_config() -> Config {
		let toml = r#"
			[storage.postgres]
			dsn = "postgres://localhost/palate"
			pool_max_conns = 4
		"#;

		toml::from_str(toml).unwrap()
	}

	fn test_result(id: u128, score: f32) -> ScoredResult {
		ScoredResult {
			item_id: uuid::Uuid::from_u128(id),
			score,
			reasons: vec!["diet-compliant: vegan".to_string()],
			safety: SafetyFlags { allergen_safe: true, diet_compliant: true },
			tier: Tier::Strict,
			updated_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
		}
	}

	#[test]
	fn bucket_rounds_up_to_multiples() {
		assert_eq!(quota_bucket(1, 25), 25);
		assert_eq!(quota_bucket(25, 25), 25);
		assert_eq!(quota_bucket(26, 25), 50);
		assert_eq!(quota_bucket(0, 25), 25);
		assert_eq!(quota_bucket(10, 0), 10);
	}

	#[test]
	fn bucket_saturates_instead_of_wrapping() {
		assert_eq!(quota_bucket(u32::MAX, 25), u32::MAX);
		assert_eq!(quota_bucket(u32::MAX - 10, 25), u32::MAX);
		assert_eq!(quota_bucket(u32::MAX, 1), u32::MAX);
	}

	#[test]
	fn key_is_stable_for_equal_inputs() {
		let cfg = test_config();
		let subject = uuid::Uuid::from_u128(7);
		let first = build_ranked_cache_key("acme", subject, 25, &cfg).unwrap();
		let second = build_ranked_cache_key("acme", subject, 25, &cfg).unwrap();

		assert_eq!(first, second);
		assert!(first.starts_with(&subject_prefix("acme", subject)));
	}

	#[test]
	fn key_changes_when_ranking_inputs_change() {
		let cfg = test_config();
		let subject = uuid::Uuid::from_u128(7);
		let base = build_ranked_cache_key("acme", subject, 25, &cfg).unwrap();

		assert_ne!(base, build_ranked_cache_key("acme", subject, 50, &cfg).unwrap());
		assert_ne!(base, build_ranked_cache_key("other", subject, 25, &cfg).unwrap());

		let mut reweighted = test_config();

		reweighted.scoring.weights.balanced.popularity = 0.9;

		assert_ne!(base, build_ranked_cache_key("acme", subject, 25, &reweighted).unwrap());

		let mut recapped = test_config();

		recapped.caps.version = "v2".to_string();

		assert_ne!(base, build_ranked_cache_key("acme", subject, 25, &recapped).unwrap());
	}

	#[test]
	fn payload_round_trips_and_rejects_foreign_schema() {
		let results = vec![test_result(1, 80.0), test_result(2, 60.0)];
		let value = encode_payload(&results).unwrap();
		let decoded = decode_payload(value.clone()).unwrap();

		assert_eq!(decoded.len(), 2);
		assert_eq!(decoded[0].item_id, results[0].item_id);
		assert_eq!(decoded[0].reasons, results[0].reasons);

		let mut stale = value;

		stale["schema_version"] = serde_json::json!(RANKED_CACHE_SCHEMA_VERSION + 1);

		assert!(decode_payload(stale).is_none());
	}

	#[test]
	fn page_slice_cuts_offset_and_quota() {
		let results = (0..10).map(|n| test_result(n, 100.0 - n as f32)).collect::<Vec<_>>();
		let page = page_slice(results.clone(), 4, 3);

		assert_eq!(page.len(), 3);
		assert_eq!(page[0].item_id, uuid::Uuid::from_u128(4));
		assert_eq!(page[2].item_id, uuid::Uuid::from_u128(6));
		assert!(page_slice(results, 20, 5).is_empty());
	}
}
