use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use palate_domain::{CandidateItem, MacroTargets, NutritionFacts, Profile, RecentExposure};

#[derive(Debug, FromRow)]
pub struct ItemRow {
	pub item_id: Uuid,
	pub name: String,
	pub diet_tags: Vec<String>,
	pub allergen_tags: Option<Vec<String>>,
	pub ingredients: Vec<String>,
	pub categories: Vec<String>,
	pub nutrition: Option<serde_json::Value>,
	pub popularity: i64,
	pub updated_at: OffsetDateTime,
}
impl From<ItemRow> for CandidateItem {
	fn from(row: ItemRow) -> Self {
		// Malformed nutrition degrades to unknown; the scoring layer already
		// treats unknown nutrition conservatively.
		let nutrition = row.nutrition.and_then(|value| {
			match serde_json::from_value::<NutritionFacts>(value) {
				Ok(facts) => Some(facts),
				Err(err) => {
					tracing::warn!(item_id = %row.item_id, error = %err, "Malformed nutrition payload. Treating as unknown.");

					None
				},
			}
		});

		Self {
			item_id: row.item_id,
			name: row.name,
			diet_tags: row.diet_tags,
			// NULL stays None; candidates with unreadable allergen data are
			// surfaced to the engine, which excludes them with a warning.
			allergen_tags: row.allergen_tags,
			ingredients: row.ingredients,
			categories: row.categories,
			nutrition,
			popularity: row.popularity.max(0) as u64,
			updated_at: row.updated_at,
		}
	}
}

#[derive(Debug, FromRow)]
pub struct ProfileRow {
	pub subject_id: Uuid,
	pub diets: Vec<String>,
	pub excluded_diets: Vec<String>,
	pub allergens: Vec<String>,
	pub disliked_ingredients: Vec<String>,
	pub conditions: Vec<String>,
	pub preferred_categories: Vec<String>,
	pub macro_targets: Option<serde_json::Value>,
	pub recent_items: Option<serde_json::Value>,
}
impl From<ProfileRow> for Profile {
	fn from(row: ProfileRow) -> Self {
		let macro_targets = row.macro_targets.and_then(|value| {
			match serde_json::from_value::<MacroTargets>(value) {
				Ok(targets) => Some(targets),
				Err(err) => {
					tracing::warn!(subject_id = %row.subject_id, error = %err, "Malformed macro targets. Ignoring.");

					None
				},
			}
		});
		let recent_items = row
			.recent_items
			.and_then(|value| match serde_json::from_value::<Vec<RecentExposure>>(value) {
				Ok(exposures) => Some(exposures),
				Err(err) => {
					tracing::warn!(subject_id = %row.subject_id, error = %err, "Malformed exposure history. Ignoring.");

					None
				},
			})
			.unwrap_or_default();

		Self {
			subject_id: row.subject_id,
			diets: row.diets,
			excluded_diets: row.excluded_diets,
			allergens: row.allergens,
			disliked_ingredients: row.disliked_ingredients,
			conditions: row.conditions,
			preferred_categories: row.preferred_categories,
			macro_targets,
			recent_items,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_row() -> ItemRow {
		ItemRow {
			item_id: Uuid::from_u128(1),
			name: "Lentil soup".to_string(),
			diet_tags: vec!["vegan".to_string()],
			allergen_tags: None,
			ingredients: vec!["lentils".to_string()],
			categories: vec!["lunch".to_string()],
			nutrition: None,
			popularity: -5,
			updated_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
		}
	}

	#[test]
	fn null_allergen_tags_stay_unreadable() {
		let item = CandidateItem::from(base_row());

		assert!(item.allergen_tags.is_none());
		assert_eq!(item.popularity, 0);
	}

	#[test]
	fn malformed_nutrition_becomes_unknown() {
		let mut row = base_row();

		row.nutrition = Some(serde_json::json!({"calories": "lots"}));

		assert!(CandidateItem::from(row).nutrition.is_none());
	}

	#[test]
	fn malformed_exposure_history_is_dropped() {
		let row = ProfileRow {
			subject_id: Uuid::from_u128(2),
			diets: vec![],
			excluded_diets: vec![],
			allergens: vec![],
			disliked_ingredients: vec![],
			conditions: vec![],
			preferred_categories: vec![],
			macro_targets: Some(serde_json::json!({"calories": 2000.0})),
			recent_items: Some(serde_json::json!("not a list")),
		};
		let profile = Profile::from(row);

		assert!(profile.recent_items.is_empty());
		assert_eq!(profile.macro_targets.unwrap().calories, Some(2000.0));
	}
}
