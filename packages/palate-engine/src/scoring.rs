use std::cmp::Ordering;

use time::OffsetDateTime;

use crate::{SafetyFlags, ScoredResult};
use palate_config::{Scoring, TierWeights};
use palate_domain::{CandidateItem, ConstraintSet, HardConstraints, NutrientCap, RecentExposure};

/// Final scores live on a fixed 0-100 scale.
const SCORE_SCALE: f32 = 100.0;
const SECONDS_PER_DAY: f32 = 86_400.0;
/// Macro fit above this threshold is worth a reason string.
const MACRO_HIGHLIGHT_THRESHOLD: f32 = 0.75;
/// Popularity above this normalized level is worth a reason string.
const POPULARITY_HIGHLIGHT_THRESHOLD: f32 = 0.5;

#[derive(Default)]
struct WeightedSum {
	total: f32,
	sum: f32,
}
impl WeightedSum {
	// Sub-scores with no backing data are skipped entirely rather than
	// counted as zero, so partial data degrades rank gracefully instead of
	// sinking it.
	fn add(&mut self, weight: f32, sub: f32) {
		if weight > 0.0 {
			self.total += weight;
			self.sum += weight * sub.clamp(0.0, 1.0);
		}
	}

	fn normalized(&self) -> f32 {
		if self.total <= 0.0 {
			return 0.0;
		}

		(self.sum / self.total).clamp(0.0, 1.0)
	}
}

/// Scores one candidate against one constraint tier. Returns `None` when the
/// item violates a hard constraint, including unreadable allergen data,
/// which fails closed.
///
/// Pure in (item, constraint set, weights, now): no hidden state, so equal
/// inputs always produce the same score and the same reason strings.
pub fn score_candidate(
	item: &CandidateItem,
	constraints: &ConstraintSet,
	weights: &TierWeights,
	scoring: &Scoring,
	now: OffsetDateTime,
) -> Option<ScoredResult> {
	// Defense in depth: re-verify even when the source claims pre-filtering.
	if !passes_hard_constraints(item, &constraints.hard) {
		return None;
	}

	let category_sub = category_score(item, &constraints.soft.preferred_categories);
	let macro_sub = macro_fit_score(item, constraints.soft.macro_targets.as_ref());
	let recency_sub = recency_score(item.updated_at, now, scoring.recency_tau_days);
	let popularity_sub = popularity_score(item.popularity, scoring.popularity_saturation);
	let cap_sub = cap_fit_score(item, &constraints.soft.nutrient_caps);
	let mut acc = WeightedSum::default();

	if let Some(sub) = category_sub {
		acc.add(weights.category, sub);
	}
	if let Some(sub) = macro_sub {
		acc.add(weights.macro_fit, sub);
	}

	acc.add(weights.recency, recency_sub);
	acc.add(weights.popularity, popularity_sub);

	if let Some(sub) = cap_sub {
		acc.add(weights.cap_fit, sub);
	}

	let penalty = weights.exposure_penalty
		* exposure_factor(item.item_id, &constraints.soft.recent_exposures, now, scoring);
	let score = SCORE_SCALE * (acc.normalized() - penalty).clamp(0.0, 1.0);
	let safety = SafetyFlags {
		allergen_safe: true,
		diet_compliant: diet_compliant(item, &constraints.hard),
	};
	let reasons = build_reasons(item, constraints, macro_sub, popularity_sub);

	Some(ScoredResult {
		item_id: item.item_id,
		score,
		reasons,
		safety,
		tier: constraints.tier,
		updated_at: item.updated_at,
	})
}

/// Re-verifies the non-negotiable exclusions. Holds in every cascade tier.
pub fn passes_hard_constraints(item: &CandidateItem, hard: &HardConstraints) -> bool {
	let Some(allergen_tags) = item.allergen_tags.as_ref() else {
		// Unreadable allergen data: fail closed, never default to inclusion.
		tracing::warn!(item_id = %item.item_id, "Candidate allergen data unreadable. Excluding item.");

		return false;
	};

	if overlaps_any(allergen_tags, &hard.excluded_allergens) {
		return false;
	}
	if hard.disliked_substrings.iter().any(|substring| {
		item.ingredients
			.iter()
			.any(|ingredient| ingredient.to_lowercase().contains(substring.as_str()))
	}) {
		return false;
	}
	if !hard.required_diets.iter().all(|diet| contains_tag(&item.diet_tags, diet)) {
		return false;
	}
	if overlaps_any(&item.diet_tags, &hard.excluded_diets) {
		return false;
	}

	true
}

/// Whether the item breaks any resolved nutrient cap. Unknown nutrition
/// cannot prove compliance, so it counts as a violation; the strict tier
/// uses this as a gate.
pub fn violates_caps(item: &CandidateItem, caps: &[NutrientCap]) -> bool {
	if caps.is_empty() {
		return false;
	}

	let Some(nutrition) = item.nutrition.as_ref() else {
		return true;
	};

	caps.iter().any(|cap| {
		nutrition.nutrient(&cap.nutrient).map(|value| value > cap.limit).unwrap_or(true)
	})
}

/// The total ordering law: score desc, then recency desc, then id asc.
/// Stable pagination across repeated calls depends on exactly this chain.
pub fn cmp_results(left: &ScoredResult, right: &ScoredResult) -> Ordering {
	cmp_f32_desc(left.score, right.score)
		.then_with(|| right.updated_at.cmp(&left.updated_at))
		.then_with(|| left.item_id.cmp(&right.item_id))
}

pub fn cmp_f32_desc(a: f32, b: f32) -> Ordering {
	match (a.is_nan(), b.is_nan()) {
		(true, true) => Ordering::Equal,
		(true, false) => Ordering::Greater,
		(false, true) => Ordering::Less,
		(false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
	}
}

fn category_score(item: &CandidateItem, preferred: &[String]) -> Option<f32> {
	if preferred.is_empty() {
		return None;
	}

	let matched =
		preferred.iter().filter(|category| contains_tag(&item.categories, category)).count();

	Some(matched as f32 / preferred.len() as f32)
}

// Symmetric closeness: over- and undershooting a target by the same ratio
// costs the same.
fn macro_fit_score(
	item: &CandidateItem,
	targets: Option<&palate_domain::MacroTargets>,
) -> Option<f32> {
	let targets = targets?;
	let nutrition = item.nutrition.as_ref()?;
	let pairs = [
		(targets.calories, nutrition.calories),
		(targets.protein_g, nutrition.protein_g),
		(targets.carbs_g, nutrition.carbs_g),
		(targets.fat_g, nutrition.fat_g),
	];
	let mut fit_sum = 0.0_f32;
	let mut count = 0_u32;

	for (target, actual) in pairs {
		let Some(target) = target.filter(|value| *value > 0.0) else {
			continue;
		};

		fit_sum += 1.0 - ((actual - target).abs() / target).min(1.0);
		count += 1;
	}

	if count == 0 {
		return None;
	}

	Some(fit_sum / count as f32)
}

fn recency_score(updated_at: OffsetDateTime, now: OffsetDateTime, tau_days: f32) -> f32 {
	let age_days = ((now - updated_at).whole_seconds() as f32 / SECONDS_PER_DAY).max(0.0);

	(-age_days / tau_days).exp().clamp(0.0, 1.0)
}

// Log-scaled so viral items cannot run away with the ranking.
fn popularity_score(popularity: u64, saturation: f32) -> f32 {
	((1.0 + popularity as f32).ln() / (1.0 + saturation).ln()).clamp(0.0, 1.0)
}

fn cap_fit_score(item: &CandidateItem, caps: &[NutrientCap]) -> Option<f32> {
	if caps.is_empty() {
		return None;
	}

	let Some(nutrition) = item.nutrition.as_ref() else {
		// Caps exist but the item cannot prove compliance: worst fit, not
		// exclusion. The strict tier already gated; here it only ranks.
		return Some(0.0);
	};
	let mut fit_sum = 0.0_f32;

	for cap in caps {
		let fit = match nutrition.nutrient(&cap.nutrient) {
			Some(value) if value <= cap.limit => 1.0,
			Some(value) if value > 0.0 => (cap.limit / value).clamp(0.0, 1.0),
			_ => 0.0,
		};

		fit_sum += fit;
	}

	Some(fit_sum / caps.len() as f32)
}

// Time-decayed penalty for items recently shown to this subject; exactly
// zero once the exposure is older than the stale window.
fn exposure_factor(
	item_id: uuid::Uuid,
	exposures: &[RecentExposure],
	now: OffsetDateTime,
	scoring: &Scoring,
) -> f32 {
	let mut factor = 0.0_f32;

	for exposure in exposures {
		if exposure.item_id != item_id {
			continue;
		}

		let age_days = ((now - exposure.shown_at).whole_seconds() as f32 / SECONDS_PER_DAY).max(0.0);

		if age_days >= scoring.exposure_stale_days {
			continue;
		}

		factor = factor.max((-age_days / scoring.exposure_tau_days).exp().clamp(0.0, 1.0));
	}

	factor
}

fn diet_compliant(item: &CandidateItem, hard: &HardConstraints) -> bool {
	hard.required_diets.iter().all(|diet| contains_tag(&item.diet_tags, diet))
		&& !overlaps_any(&item.diet_tags, &hard.excluded_diets)
}

// Reasons append in a fixed priority order (safety, preference, nutrition,
// popularity) so equal-score items produce stable strings.
fn build_reasons(
	item: &CandidateItem,
	constraints: &ConstraintSet,
	macro_sub: Option<f32>,
	popularity_sub: f32,
) -> Vec<String> {
	let mut reasons = Vec::new();

	if !constraints.hard.excluded_allergens.is_empty() {
		reasons.push(format!(
			"allergen-safe: free of {}",
			constraints.hard.excluded_allergens.join(", ")
		));
	}
	if !constraints.hard.required_diets.is_empty() {
		reasons.push(format!("diet-compliant: {}", constraints.hard.required_diets.join(", ")));
	}

	let matched: Vec<&str> = constraints
		.soft
		.preferred_categories
		.iter()
		.filter(|category| contains_tag(&item.categories, category))
		.map(String::as_str)
		.collect();

	if !matched.is_empty() {
		reasons.push(format!("matches preferred categories: {}", matched.join(", ")));
	}

	if let Some(nutrition) = item.nutrition.as_ref() {
		for cap in &constraints.soft.nutrient_caps {
			if nutrition.nutrient(&cap.nutrient).map(|value| value <= cap.limit).unwrap_or(false) {
				reasons.push(format!(
					"within {} cap for {} ({})",
					cap.nutrient, cap.condition, cap.policy_version
				));
			}
		}
	}
	if macro_sub.map(|sub| sub >= MACRO_HIGHLIGHT_THRESHOLD).unwrap_or(false) {
		reasons.push("close to macro targets".to_string());
	}
	if popularity_sub >= POPULARITY_HIGHLIGHT_THRESHOLD {
		reasons.push(format!("popular: {} saves", item.popularity));
	}

	reasons
}

fn contains_tag(tags: &[String], wanted: &str) -> bool {
	tags.iter().any(|tag| tag.trim().eq_ignore_ascii_case(wanted))
}

fn overlaps_any(tags: &[String], excluded: &[String]) -> bool {
	excluded.iter().any(|tag| contains_tag(tags, tag))
}

#[cfg(test)]
mod tests {
	use uuid::Uuid;

	use super::*;
	use palate_domain::{NutritionFacts, SoftPreferences, Tier};

	fn test_item(id: u128) -> CandidateItem {
		CandidateItem {
			item_id: Uuid::from_u128(id),
			name: "Chickpea curry".to_string(),
			diet_tags: vec!["vegan".to_string()],
			allergen_tags: Some(vec![]),
			ingredients: vec!["chickpeas".to_string(), "coconut milk".to_string()],
			categories: vec!["dinner".to_string()],
			nutrition: Some(NutritionFacts {
				calories: 500.0,
				protein_g: 20.0,
				carbs_g: 60.0,
				fat_g: 18.0,
				sugar_g: 9.0,
				sodium_mg: 700.0,
			}),
			popularity: 100,
			updated_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
		}
	}

	fn test_constraints(tier: Tier) -> ConstraintSet {
		ConstraintSet {
			tier,
			hard: HardConstraints {
				excluded_allergens: vec!["peanut".to_string()],
				disliked_substrings: vec!["cilantro".to_string()],
				required_diets: vec!["vegan".to_string()],
				excluded_diets: vec![],
			},
			soft: SoftPreferences::default(),
		}
	}

	fn now() -> OffsetDateTime {
		OffsetDateTime::from_unix_timestamp(1_700_100_000).unwrap()
	}

	#[test]
	fn excludes_matching_allergen() {
		let mut item = test_item(1);

		item.allergen_tags = Some(vec!["Peanut".to_string()]);

		assert!(!passes_hard_constraints(&item, &test_constraints(Tier::Strict).hard));
	}

	#[test]
	fn excludes_disliked_ingredient_substring() {
		let mut item = test_item(1);

		item.ingredients.push("fresh Cilantro leaves".to_string());

		assert!(!passes_hard_constraints(&item, &test_constraints(Tier::Balanced).hard));
	}

	#[test]
	fn unreadable_allergen_data_fails_closed() {
		let mut item = test_item(1);

		item.allergen_tags = None;

		let constraints = test_constraints(Tier::PopularityFallback);

		assert!(!passes_hard_constraints(&item, &constraints.hard));
		assert!(
			score_candidate(&item, &constraints, &TierWeights::default(), &Scoring::default(), now())
				.is_none()
		);
	}

	#[test]
	fn missing_required_diet_is_excluded_in_every_tier() {
		let mut item = test_item(1);

		item.diet_tags = vec!["vegetarian".to_string()];

		for tier in Tier::ALL {
			assert!(!passes_hard_constraints(&item, &test_constraints(tier).hard));
		}
	}

	#[test]
	fn empty_exclusions_admit_everything_readable() {
		let item = test_item(1);

		assert!(passes_hard_constraints(&item, &HardConstraints::default()));
	}

	#[test]
	fn caps_violation_includes_unknown_nutrition() {
		let mut item = test_item(1);
		let caps = vec![NutrientCap {
			condition: "diabetes".to_string(),
			nutrient: "sugar_g".to_string(),
			limit: 25.0,
			policy_version: "v1".to_string(),
		}];

		assert!(!violates_caps(&item, &caps));

		item.nutrition = None;

		assert!(violates_caps(&item, &caps));
	}

	#[test]
	fn popularity_score_is_sublinear_and_bounded() {
		let low = popularity_score(10, 10_000.0);
		let mid = popularity_score(1_000, 10_000.0);
		let high = popularity_score(1_000_000, 10_000.0);

		assert!(low < mid);
		assert!(mid < high);
		assert!(high <= 1.0);
		assert!(mid - low > high - mid, "growth must slow as counts explode");
	}

	#[test]
	fn recency_decays_monotonically() {
		let fresh = recency_score(now(), now(), 30.0);
		let day_old = recency_score(now() - time::Duration::days(1), now(), 30.0);
		let month_old = recency_score(now() - time::Duration::days(30), now(), 30.0);

		assert!(fresh > day_old);
		assert!(day_old > month_old);
		assert!((fresh - 1.0).abs() < f32::EPSILON);
	}

	#[test]
	fn exposure_penalty_is_zero_past_the_stale_window() {
		let scoring = Scoring::default();
		let item_id = Uuid::from_u128(1);
		let recent = vec![RecentExposure { item_id, shown_at: now() - time::Duration::days(1) }];
		let stale = vec![RecentExposure { item_id, shown_at: now() - time::Duration::days(20) }];

		assert!(exposure_factor(item_id, &recent, now(), &scoring) > 0.0);
		assert_eq!(exposure_factor(item_id, &stale, now(), &scoring), 0.0);
		assert_eq!(exposure_factor(Uuid::from_u128(2), &recent, now(), &scoring), 0.0);
	}

	#[test]
	fn score_is_deterministic_with_stable_reasons() {
		let item = test_item(7);
		let mut constraints = test_constraints(Tier::Balanced);

		constraints.soft.preferred_categories = vec!["dinner".to_string()];

		let weights = TierWeights::default();
		let scoring = Scoring::default();
		let first = score_candidate(&item, &constraints, &weights, &scoring, now()).unwrap();
		let second = score_candidate(&item, &constraints, &weights, &scoring, now()).unwrap();

		assert_eq!(first.score, second.score);
		assert_eq!(first.reasons, second.reasons);
		assert_eq!(first.reasons[0], "allergen-safe: free of peanut");
		assert_eq!(first.reasons[1], "diet-compliant: vegan");
		assert_eq!(first.reasons[2], "matches preferred categories: dinner");
		assert!(first.safety.allergen_safe);
		assert!(first.safety.diet_compliant);
	}

	#[test]
	fn tie_break_orders_recency_desc_then_id_asc() {
		let base = test_item(1);
		let mut newer = test_item(2);

		newer.updated_at = base.updated_at + time::Duration::days(1);

		let make = |item: &CandidateItem, score: f32| ScoredResult {
			item_id: item.item_id,
			score,
			reasons: vec![],
			safety: SafetyFlags { allergen_safe: true, diet_compliant: true },
			tier: Tier::Strict,
			updated_at: item.updated_at,
		};
		let older_low_id = make(&base, 50.0);
		let newer_high_id = make(&newer, 50.0);

		assert_eq!(cmp_results(&newer_high_id, &older_low_id), Ordering::Less);

		let twin_a = make(&base, 50.0);
		let mut twin_b = make(&base, 50.0);

		twin_b.item_id = Uuid::from_u128(9);

		assert_eq!(cmp_results(&twin_a, &twin_b), Ordering::Less);
		assert_eq!(cmp_results(&make(&base, 80.0), &make(&newer, 50.0)), Ordering::Less);
	}

	#[test]
	fn nan_scores_sort_last() {
		assert_eq!(cmp_f32_desc(f32::NAN, 1.0), Ordering::Greater);
		assert_eq!(cmp_f32_desc(1.0, f32::NAN), Ordering::Less);
		assert_eq!(cmp_f32_desc(f32::NAN, f32::NAN), Ordering::Equal);
	}

	#[test]
	fn scores_stay_on_the_fixed_scale() {
		let mut constraints = test_constraints(Tier::Balanced);

		constraints.soft.preferred_categories = vec!["dinner".to_string()];

		let mut item = test_item(3);

		item.popularity = u64::MAX;

		let result = score_candidate(
			&item,
			&constraints,
			&TierWeights::default(),
			&Scoring::default(),
			now(),
		)
		.unwrap();

		assert!(result.score >= 0.0);
		assert!(result.score <= 100.0);
	}
}
