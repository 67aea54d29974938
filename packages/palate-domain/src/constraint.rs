use serde::{Deserialize, Serialize};

use crate::catalog::{MacroTargets, Profile, RecentExposure};
use palate_config::CapsPolicy;

/// One ranking attempt at a given constraint-strictness level. Order here is
/// the cascade order; relaxation only ever moves rightward.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
	Strict,
	Balanced,
	PopularityFallback,
}
impl Tier {
	pub const ALL: [Self; 3] = [Self::Strict, Self::Balanced, Self::PopularityFallback];

	pub fn as_str(self) -> &'static str {
		match self {
			Self::Strict => "strict",
			Self::Balanced => "balanced",
			Self::PopularityFallback => "popularity_fallback",
		}
	}

	/// Whether this tier enforces nutrient caps as a gate rather than a
	/// scoring input.
	pub fn gates_caps(self) -> bool {
		matches!(self, Self::Strict)
	}
}

/// Eligibility conditions that hold in every tier, no exception. Relaxation
/// passes never touch these.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct HardConstraints {
	pub excluded_allergens: Vec<String>,
	pub disliked_substrings: Vec<String>,
	pub required_diets: Vec<String>,
	pub excluded_diets: Vec<String>,
}
impl HardConstraints {
	pub fn is_empty(&self) -> bool {
		self.excluded_allergens.is_empty()
			&& self.disliked_substrings.is_empty()
			&& self.required_diets.is_empty()
			&& self.excluded_diets.is_empty()
	}
}

/// A condition-driven nutrition ceiling resolved for one tier, with enough
/// provenance to explain which policy produced it.
#[derive(Clone, Debug, PartialEq)]
pub struct NutrientCap {
	pub condition: String,
	pub nutrient: String,
	pub limit: f32,
	pub policy_version: String,
}

/// Inputs to scoring that influence rank but never eligibility.
#[derive(Clone, Debug, Default)]
pub struct SoftPreferences {
	pub preferred_categories: Vec<String>,
	pub macro_targets: Option<MacroTargets>,
	pub nutrient_caps: Vec<NutrientCap>,
	pub recent_exposures: Vec<RecentExposure>,
}

/// The canonical constraint set. Produced exclusively by
/// [`derive_constraints`]; downstream components never accept a raw or
/// partial profile shape.
#[derive(Clone, Debug)]
pub struct ConstraintSet {
	pub tier: Tier,
	pub hard: HardConstraints,
	pub soft: SoftPreferences,
}

/// Normalizes a raw, possibly partial profile into the canonical constraint
/// set for one cascade tier.
///
/// A missing profile yields the widest-net set: no hard exclusions, no soft
/// preferences. Absence of data is never treated as an implicit exclusion.
pub fn derive_constraints(
	profile: Option<&Profile>,
	caps: &CapsPolicy,
	tier: Tier,
) -> ConstraintSet {
	let Some(profile) = profile else {
		return ConstraintSet {
			tier,
			hard: HardConstraints::default(),
			soft: SoftPreferences::default(),
		};
	};
	let hard = HardConstraints {
		excluded_allergens: normalize_tags(&profile.allergens),
		disliked_substrings: normalize_tags(&profile.disliked_ingredients),
		required_diets: normalize_tags(&profile.diets),
		excluded_diets: normalize_tags(&profile.excluded_diets),
	};
	let macro_targets = profile.macro_targets.filter(|targets| !targets.is_empty());
	let soft = SoftPreferences {
		preferred_categories: normalize_tags(&profile.preferred_categories),
		macro_targets,
		nutrient_caps: resolve_caps(&normalize_tags(&profile.conditions), caps, tier),
		recent_exposures: profile.recent_items.clone(),
	};

	ConstraintSet { tier, hard, soft }
}

/// Lower-cases, trims, deduplicates, and sorts a tag list. Sorting makes
/// equal inputs produce byte-equal derived sets, which cache keys and reason
/// strings rely on.
pub fn normalize_tags(raw: &[String]) -> Vec<String> {
	let mut tags: Vec<String> = raw
		.iter()
		.map(|tag| tag.trim().to_lowercase())
		.filter(|tag| !tag.is_empty())
		.collect();

	tags.sort();
	tags.dedup();

	tags
}

fn resolve_caps(conditions: &[String], caps: &CapsPolicy, tier: Tier) -> Vec<NutrientCap> {
	let mut out = Vec::new();

	for condition in conditions {
		for rule in &caps.rules {
			if rule.condition != *condition {
				continue;
			}

			let limit = if tier.gates_caps() { rule.strict_limit } else { rule.relaxed_limit };

			out.push(NutrientCap {
				condition: condition.clone(),
				nutrient: rule.nutrient.clone(),
				limit,
				policy_version: caps.version.clone(),
			});
		}
	}

	// Deterministic order, tightest cap wins when policy rules overlap.
	out.sort_by(|left, right| {
		left.condition
			.cmp(&right.condition)
			.then_with(|| left.nutrient.cmp(&right.nutrient))
			.then_with(|| left.limit.total_cmp(&right.limit))
	});
	out.dedup_by(|next, kept| kept.condition == next.condition && kept.nutrient == next.nutrient);

	out
}

#[cfg(test)]
mod tests {
	use uuid::Uuid;

	use super::*;
	use palate_config::CapRule;

	fn test_caps() -> CapsPolicy {
		CapsPolicy {
			version: "v1".to_string(),
			rules: vec![
				CapRule {
					condition: "diabetes".to_string(),
					nutrient: "sugar_g".to_string(),
					strict_limit: 25.0,
					relaxed_limit: 40.0,
				},
				CapRule {
					condition: "hypertension".to_string(),
					nutrient: "sodium_mg".to_string(),
					strict_limit: 1_500.0,
					relaxed_limit: 2_300.0,
				},
			],
		}
	}

	fn test_profile() -> Profile {
		Profile {
			subject_id: Uuid::from_u128(1),
			diets: vec!["Vegan".to_string(), " vegan ".to_string()],
			excluded_diets: vec![],
			allergens: vec!["Peanut".to_string()],
			disliked_ingredients: vec!["  Cilantro".to_string(), String::new()],
			conditions: vec!["Diabetes".to_string()],
			preferred_categories: vec!["Breakfast".to_string()],
			macro_targets: None,
			recent_items: vec![],
		}
	}

	#[test]
	fn missing_profile_derives_widest_net() {
		let set = derive_constraints(None, &test_caps(), Tier::PopularityFallback);

		assert!(set.hard.is_empty());
		assert!(set.soft.preferred_categories.is_empty());
		assert!(set.soft.nutrient_caps.is_empty());
		assert!(set.soft.macro_targets.is_none());
	}

	#[test]
	fn tags_are_lowercased_deduplicated_and_sorted() {
		let set = derive_constraints(Some(&test_profile()), &test_caps(), Tier::Strict);

		assert_eq!(set.hard.required_diets, vec!["vegan".to_string()]);
		assert_eq!(set.hard.excluded_allergens, vec!["peanut".to_string()]);
		assert_eq!(set.hard.disliked_substrings, vec!["cilantro".to_string()]);
		assert_eq!(set.soft.preferred_categories, vec!["breakfast".to_string()]);
	}

	#[test]
	fn strict_tier_resolves_tighter_cap_than_relaxed_tier() {
		let profile = test_profile();
		let strict = derive_constraints(Some(&profile), &test_caps(), Tier::Strict);
		let balanced = derive_constraints(Some(&profile), &test_caps(), Tier::Balanced);

		assert_eq!(strict.soft.nutrient_caps.len(), 1);
		assert_eq!(strict.soft.nutrient_caps[0].limit, 25.0);
		assert_eq!(balanced.soft.nutrient_caps[0].limit, 40.0);
		assert_eq!(strict.soft.nutrient_caps[0].policy_version, "v1");
	}

	#[test]
	fn unknown_condition_resolves_no_caps() {
		let mut profile = test_profile();

		profile.conditions = vec!["gluten_sensitivity".to_string()];

		let set = derive_constraints(Some(&profile), &test_caps(), Tier::Strict);

		assert!(set.soft.nutrient_caps.is_empty());
	}

	#[test]
	fn overlapping_rules_keep_the_tightest_cap() {
		let mut caps = test_caps();

		caps.rules.push(CapRule {
			condition: "diabetes".to_string(),
			nutrient: "sugar_g".to_string(),
			strict_limit: 20.0,
			relaxed_limit: 35.0,
		});

		let set = derive_constraints(Some(&test_profile()), &test_caps(), Tier::Strict);
		let overlapped = derive_constraints(Some(&test_profile()), &caps, Tier::Strict);

		assert_eq!(set.soft.nutrient_caps[0].limit, 25.0);
		assert_eq!(overlapped.soft.nutrient_caps.len(), 1);
		assert_eq!(overlapped.soft.nutrient_caps[0].limit, 20.0);
	}

	#[test]
	fn empty_macro_targets_collapse_to_none() {
		let mut profile = test_profile();

		profile.macro_targets = Some(MacroTargets::default());

		let set = derive_constraints(Some(&profile), &test_caps(), Tier::Balanced);

		assert!(set.soft.macro_targets.is_none());
	}
}
