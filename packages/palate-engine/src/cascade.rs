use std::{collections::HashSet, time::Duration};

use time::OffsetDateTime;
use uuid::Uuid;

use crate::{CandidateQuery, CandidateSource, ScoredResult, scoring};
use palate_config::{Config, TierWeights};
use palate_domain::{Profile, Tier, derive_constraints};

/// Resolves the weight table configured for a tier.
pub fn weights_for(cfg: &Config, tier: Tier) -> &TierWeights {
	match tier {
		Tier::Strict => &cfg.scoring.weights.strict,
		Tier::Balanced => &cfg.scoring.weights.balanced,
		Tier::PopularityFallback => &cfg.scoring.weights.fallback,
	}
}

/// Runs the relaxation cascade until `target` results are selected or every
/// tier is exhausted. Tiers only relax preference pressure; the hard
/// constraint set is identical in all of them, and each candidate is
/// re-verified here regardless of what the source filtered.
///
/// An item admitted by an earlier tier is never re-admitted by a later one,
/// so relaxation strictly appends. Returning fewer than `target` results is
/// the correct outcome when the safe pool is small.
pub async fn run_cascade(
	cfg: &Config,
	candidates: &dyn CandidateSource,
	profile: Option<&Profile>,
	tenant_id: &str,
	target: u32,
	now: OffsetDateTime,
) -> Vec<ScoredResult> {
	let mut selected: Vec<ScoredResult> = Vec::new();
	let mut seen: HashSet<Uuid> = HashSet::new();
	let tier_timeout = Duration::from_millis(cfg.engine.tier_timeout_ms);

	for tier in Tier::ALL {
		let remaining = target as usize - selected.len();

		if remaining == 0 {
			break;
		}

		let constraints = derive_constraints(profile, &cfg.caps, tier);
		// Overfetch compensates for re-verification and dedup attrition.
		let overfetch = (remaining.min(u32::MAX as usize) as u32)
			.saturating_mul(cfg.engine.overfetch_multiplier.max(1))
			.saturating_add(seen.len() as u32);
		let query = CandidateQuery {
			tenant_id: tenant_id.to_string(),
			tier,
			hard: constraints.hard.clone(),
		};
		let fetched =
			match tokio::time::timeout(tier_timeout, candidates.fetch(&query, overfetch)).await {
				Ok(Ok(items)) => items,
				Ok(Err(err)) => {
					tracing::warn!(
						tier = tier.as_str(),
						error = %err,
						"Candidate fetch failed. Continuing cascade with next tier."
					);

					continue;
				},
				Err(_) => {
					tracing::warn!(
						tier = tier.as_str(),
						timeout_ms = cfg.engine.tier_timeout_ms,
						"Candidate fetch timed out. Continuing cascade with next tier."
					);

					continue;
				},
			};
		let weights = weights_for(cfg, tier);
		let mut tier_seen: HashSet<Uuid> = HashSet::new();
		let mut scored: Vec<ScoredResult> = Vec::new();

		for item in &fetched {
			if seen.contains(&item.item_id) || !tier_seen.insert(item.item_id) {
				continue;
			}
			// The strict tier alone treats nutrient caps as a gate; relaxed
			// tiers fold cap fit back into the score.
			if tier.gates_caps() && scoring::violates_caps(item, &constraints.soft.nutrient_caps) {
				continue;
			}

			let Some(result) = scoring::score_candidate(item, &constraints, weights, &cfg.scoring, now)
			else {
				continue;
			};

			scored.push(result);
		}

		scored.sort_by(scoring::cmp_results);

		for result in scored.into_iter().take(remaining) {
			seen.insert(result.item_id);
			selected.push(result);
		}
	}

	selected
}
