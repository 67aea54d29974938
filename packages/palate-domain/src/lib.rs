pub mod catalog;
pub mod constraint;
pub mod time_serde;

pub use catalog::{CandidateItem, MacroTargets, NutritionFacts, Profile, RecentExposure};
pub use constraint::{
	ConstraintSet, HardConstraints, NutrientCap, SoftPreferences, Tier, derive_constraints,
	normalize_tags,
};
