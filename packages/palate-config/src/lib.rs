mod error;
mod types;

pub use error::{Error, Result};
pub use types::{
	Batch, Cache, CapRule, CapsPolicy, Config, Engine, NUTRIENT_FIELDS, Postgres, Scoring, Storage,
	TierWeightTables, TierWeights,
};

use std::{fs, path::Path};

pub fn load(path: &Path) -> Result<Config> {
	let raw = fs::read_to_string(path)
		.map_err(|err| Error::ReadConfig { path: path.to_path_buf(), source: err })?;

	let mut cfg: Config = toml::from_str(&raw)
		.map_err(|err| Error::ParseConfig { path: path.to_path_buf(), source: err })?;

	normalize(&mut cfg);

	validate(&cfg)?;

	Ok(cfg)
}

pub fn validate(cfg: &Config) -> Result<()> {
	if cfg.storage.postgres.dsn.trim().is_empty() {
		return Err(Error::Validation {
			message: "storage.postgres.dsn must be non-empty.".to_string(),
		});
	}
	if cfg.storage.postgres.pool_max_conns == 0 {
		return Err(Error::Validation {
			message: "storage.postgres.pool_max_conns must be greater than zero.".to_string(),
		});
	}
	if cfg.engine.max_quota == 0 {
		return Err(Error::Validation {
			message: "engine.max_quota must be greater than zero.".to_string(),
		});
	}
	if cfg.engine.overfetch_multiplier == 0 {
		return Err(Error::Validation {
			message: "engine.overfetch_multiplier must be greater than zero.".to_string(),
		});
	}
	if cfg.engine.tier_timeout_ms == 0 {
		return Err(Error::Validation {
			message: "engine.tier_timeout_ms must be greater than zero.".to_string(),
		});
	}

	for (path, value) in [
		("scoring.recency_tau_days", cfg.scoring.recency_tau_days),
		("scoring.exposure_tau_days", cfg.scoring.exposure_tau_days),
		("scoring.exposure_stale_days", cfg.scoring.exposure_stale_days),
	] {
		if !value.is_finite() || value <= 0.0 {
			return Err(Error::Validation {
				message: format!("{path} must be a positive finite number."),
			});
		}
	}

	if !cfg.scoring.popularity_saturation.is_finite() || cfg.scoring.popularity_saturation <= 1.0 {
		return Err(Error::Validation {
			message: "scoring.popularity_saturation must be a finite number greater than one."
				.to_string(),
		});
	}

	for (tier, weights) in [
		("strict", &cfg.scoring.weights.strict),
		("balanced", &cfg.scoring.weights.balanced),
		("fallback", &cfg.scoring.weights.fallback),
	] {
		validate_tier_weights(tier, weights)?;
	}

	validate_caps(&cfg.caps)?;

	if cfg.cache.ttl_secs <= 0 {
		return Err(Error::Validation {
			message: "cache.ttl_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.cache.bucket_size == 0 {
		return Err(Error::Validation {
			message: "cache.bucket_size must be greater than zero.".to_string(),
		});
	}
	if cfg.cache.unavailable_log_window_secs == 0 {
		return Err(Error::Validation {
			message: "cache.unavailable_log_window_secs must be greater than zero.".to_string(),
		});
	}
	if cfg.batch.concurrency == 0 {
		return Err(Error::Validation {
			message: "batch.concurrency must be greater than zero.".to_string(),
		});
	}

	Ok(())
}

fn validate_tier_weights(tier: &str, weights: &TierWeights) -> Result<()> {
	for (label, value) in [
		("category", weights.category),
		("macro_fit", weights.macro_fit),
		("recency", weights.recency),
		("popularity", weights.popularity),
		("cap_fit", weights.cap_fit),
		("exposure_penalty", weights.exposure_penalty),
	] {
		if !value.is_finite() || value < 0.0 {
			return Err(Error::Validation {
				message: format!(
					"scoring.weights.{tier}.{label} must be a finite number of zero or greater."
				),
			});
		}
	}

	let positive = weights.category
		+ weights.macro_fit
		+ weights.recency
		+ weights.popularity
		+ weights.cap_fit;

	if positive <= 0.0 {
		return Err(Error::Validation {
			message: format!(
				"scoring.weights.{tier} must carry at least one positive ranking weight."
			),
		});
	}

	Ok(())
}

fn validate_caps(caps: &CapsPolicy) -> Result<()> {
	if caps.version.trim().is_empty() {
		return Err(Error::Validation { message: "caps.version must be non-empty.".to_string() });
	}

	for rule in &caps.rules {
		if rule.condition.is_empty() {
			return Err(Error::Validation {
				message: "caps.rules.condition must be non-empty.".to_string(),
			});
		}
		if !NUTRIENT_FIELDS.contains(&rule.nutrient.as_str()) {
			return Err(Error::Validation {
				message: format!(
					"caps.rules.nutrient must be one of {}. Got {}.",
					NUTRIENT_FIELDS.join(", "),
					rule.nutrient
				),
			});
		}

		for (label, value) in
			[("strict_limit", rule.strict_limit), ("relaxed_limit", rule.relaxed_limit)]
		{
			if !value.is_finite() || value <= 0.0 {
				return Err(Error::Validation {
					message: format!("caps.rules.{label} must be a positive finite number."),
				});
			}
		}

		if rule.strict_limit > rule.relaxed_limit {
			return Err(Error::Validation {
				message: format!(
					"caps.rules.strict_limit must not exceed relaxed_limit for condition {}.",
					rule.condition
				),
			});
		}
	}

	Ok(())
}

fn normalize(cfg: &mut Config) {
	cfg.caps.version = cfg.caps.version.trim().to_string();

	for rule in &mut cfg.caps.rules {
		rule.condition = rule.condition.trim().to_lowercase();
		rule.nutrient = rule.nutrient.trim().to_lowercase();
	}
}
