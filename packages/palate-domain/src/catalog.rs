use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use palate_config::NUTRIENT_FIELDS;

/// A subject's safety and preference profile. Owned by an external profile
/// store; this engine only ever reads a snapshot of it. Any field may be
/// missing upstream; absence widens constraints, it never narrows them.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Profile {
	pub subject_id: Uuid,
	#[serde(default)]
	pub diets: Vec<String>,
	#[serde(default)]
	pub excluded_diets: Vec<String>,
	#[serde(default)]
	pub allergens: Vec<String>,
	#[serde(default)]
	pub disliked_ingredients: Vec<String>,
	#[serde(default)]
	pub conditions: Vec<String>,
	#[serde(default)]
	pub preferred_categories: Vec<String>,
	#[serde(default)]
	pub macro_targets: Option<MacroTargets>,
	#[serde(default)]
	pub recent_items: Vec<RecentExposure>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct MacroTargets {
	pub calories: Option<f32>,
	pub protein_g: Option<f32>,
	pub carbs_g: Option<f32>,
	pub fat_g: Option<f32>,
}
impl MacroTargets {
	pub fn is_empty(&self) -> bool {
		self.calories.is_none()
			&& self.protein_g.is_none()
			&& self.carbs_g.is_none()
			&& self.fat_g.is_none()
	}
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct RecentExposure {
	pub item_id: Uuid,
	#[serde(with = "crate::time_serde")]
	pub shown_at: OffsetDateTime,
}

/// One catalog item as snapshotted at query time.
///
/// `allergen_tags` is `None` when the source could not read the field. That
/// is not the same as an empty list: unknown allergen data fails closed and
/// the item is excluded from every tier.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CandidateItem {
	pub item_id: Uuid,
	pub name: String,
	#[serde(default)]
	pub diet_tags: Vec<String>,
	pub allergen_tags: Option<Vec<String>>,
	#[serde(default)]
	pub ingredients: Vec<String>,
	#[serde(default)]
	pub categories: Vec<String>,
	#[serde(default)]
	pub nutrition: Option<NutritionFacts>,
	pub popularity: u64,
	#[serde(with = "crate::time_serde")]
	pub updated_at: OffsetDateTime,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct NutritionFacts {
	pub calories: f32,
	pub protein_g: f32,
	pub carbs_g: f32,
	pub fat_g: f32,
	pub sugar_g: f32,
	pub sodium_mg: f32,
}
impl NutritionFacts {
	/// Looks up a nutrient by its config-level field name. Returns `None`
	/// for names outside [`NUTRIENT_FIELDS`]; config validation rejects
	/// those before they can reach a query.
	pub fn nutrient(&self, name: &str) -> Option<f32> {
		debug_assert!(NUTRIENT_FIELDS.contains(&name) || name.is_empty());

		match name {
			"calories" => Some(self.calories),
			"protein_g" => Some(self.protein_g),
			"carbs_g" => Some(self.carbs_g),
			"fat_g" => Some(self.fat_g),
			"sugar_g" => Some(self.sugar_g),
			"sodium_mg" => Some(self.sodium_mg),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn nutrient_lookup_covers_every_config_field() {
		let facts = NutritionFacts {
			calories: 420.0,
			protein_g: 30.0,
			carbs_g: 45.0,
			fat_g: 12.0,
			sugar_g: 8.0,
			sodium_mg: 600.0,
		};

		for name in NUTRIENT_FIELDS {
			assert!(facts.nutrient(name).is_some(), "missing nutrient mapping for {name}");
		}
	}

	#[test]
	fn recent_exposure_round_trips_rfc3339() {
		let exposure = RecentExposure {
			item_id: Uuid::from_u128(7),
			shown_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
		};
		let raw = serde_json::to_string(&exposure).unwrap();
		let back: RecentExposure = serde_json::from_str(&raw).unwrap();

		assert_eq!(back, exposure);
	}
}
