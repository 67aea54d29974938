use sqlx::PgPool;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
	Result,
	models::{ItemRow, ProfileRow},
};
use palate_domain::HardConstraints;

/// Fetches up to `limit` candidates with the hard exclusions pushed down as
/// array-operator prefilters. Rows with NULL allergen data deliberately
/// survive the prefilter: the ranking layer excludes them itself and logs
/// the data problem.
pub async fn fetch_candidates(
	pool: &PgPool,
	tenant_id: &str,
	hard: &HardConstraints,
	limit: u32,
) -> Result<Vec<ItemRow>> {
	let rows = sqlx::query_as::<_, ItemRow>(
		r#"
		SELECT item_id, name, diet_tags, allergen_tags, ingredients, categories,
		       nutrition, popularity, updated_at
		FROM catalog_items
		WHERE tenant_id = $1
		  AND (allergen_tags IS NULL OR NOT (allergen_tags && $2))
		  AND diet_tags @> $3
		  AND NOT (diet_tags && $4)
		ORDER BY updated_at DESC, item_id ASC
		LIMIT $5
		"#,
	)
	.bind(tenant_id)
	.bind(&hard.excluded_allergens)
	.bind(&hard.required_diets)
	.bind(&hard.excluded_diets)
	.bind(limit as i64)
	.fetch_all(pool)
	.await?;

	Ok(rows)
}

pub async fn fetch_profile(
	pool: &PgPool,
	tenant_id: &str,
	subject_id: Uuid,
) -> Result<Option<ProfileRow>> {
	let row = sqlx::query_as::<_, ProfileRow>(
		r#"
		SELECT subject_id, diets, excluded_diets, allergens, disliked_ingredients,
		       conditions, preferred_categories, macro_targets, recent_items
		FROM subject_profiles
		WHERE tenant_id = $1 AND subject_id = $2
		"#,
	)
	.bind(tenant_id)
	.bind(subject_id)
	.fetch_optional(pool)
	.await?;

	Ok(row)
}

pub async fn cache_get(pool: &PgPool, key: &str) -> Result<Option<serde_json::Value>> {
	let payload: Option<(serde_json::Value,)> = sqlx::query_as(
		"SELECT payload FROM ranked_cache WHERE cache_key = $1 AND expires_at > now()",
	)
	.bind(key)
	.fetch_optional(pool)
	.await?;

	Ok(payload.map(|(value,)| value))
}

pub async fn cache_put(
	pool: &PgPool,
	key: &str,
	payload: &serde_json::Value,
	ttl_secs: i64,
) -> Result<()> {
	let expires_at = OffsetDateTime::now_utc() + time::Duration::seconds(ttl_secs);

	sqlx::query(
		r#"
		INSERT INTO ranked_cache (cache_key, payload, expires_at)
		VALUES ($1, $2, $3)
		ON CONFLICT (cache_key) DO UPDATE
			SET payload = EXCLUDED.payload, expires_at = EXCLUDED.expires_at
		"#,
	)
	.bind(key)
	.bind(payload)
	.bind(expires_at)
	.execute(pool)
	.await?;

	Ok(())
}

// Prefix match via left() instead of LIKE, so key material never needs
// pattern-escaping.
pub async fn cache_delete_prefix(pool: &PgPool, prefix: &str) -> Result<u64> {
	let done =
		sqlx::query("DELETE FROM ranked_cache WHERE left(cache_key, char_length($1)) = $1")
			.bind(prefix)
			.execute(pool)
			.await?;

	Ok(done.rows_affected())
}
