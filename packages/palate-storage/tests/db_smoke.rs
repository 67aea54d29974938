//! End-to-end smoke test against a live Postgres. Run with:
//!
//! ```sh
//! PALATE_PG_DSN=postgres://localhost/palate_test cargo test -p palate-storage -- --ignored
//! ```

use uuid::Uuid;

use palate_domain::{HardConstraints, Tier};
use palate_engine::{CacheBackend, CandidateQuery, CandidateSource, ProfileStore};
use palate_storage::Db;

async fn connect() -> Db {
	let dsn = std::env::var("PALATE_PG_DSN").expect("PALATE_PG_DSN must point at a test database");
	let cfg = palate_config::Postgres { dsn, pool_max_conns: 2 };
	let db = Db::connect(&cfg).await.expect("connect");

	db.ensure_schema().await.expect("ensure_schema");
	db
}

#[tokio::test]
#[ignore]
async fn catalog_profile_and_cache_round_trip() {
	let db = connect().await;
	let tenant = format!("smoke-{}", Uuid::new_v4());
	let item_id = Uuid::new_v4();
	let subject_id = Uuid::new_v4();

	sqlx::query(
		r#"
		INSERT INTO catalog_items
			(tenant_id, item_id, name, diet_tags, allergen_tags, ingredients, categories,
			 nutrition, popularity)
		VALUES ($1, $2, 'Tofu bowl', '{"vegan"}', '{}', '{"tofu","rice"}', '{"dinner"}',
			'{"calories": 500.0, "protein_g": 28.0, "carbs_g": 55.0, "fat_g": 14.0,
			  "sugar_g": 6.0, "sodium_mg": 650.0}', 42)
		"#,
	)
	.bind(&tenant)
	.bind(item_id)
	.execute(db.pool())
	.await
	.expect("insert item");

	sqlx::query(
		r#"
		INSERT INTO subject_profiles (tenant_id, subject_id, diets, allergens)
		VALUES ($1, $2, '{"vegan"}', '{"peanut"}')
		"#,
	)
	.bind(&tenant)
	.bind(subject_id)
	.execute(db.pool())
	.await
	.expect("insert profile");

	let profile = db.profile(&tenant, subject_id).await.expect("profile").expect("present");

	assert_eq!(profile.diets, vec!["vegan".to_string()]);

	let query = CandidateQuery {
		tenant_id: tenant.clone(),
		tier: Tier::Strict,
		hard: HardConstraints {
			excluded_allergens: vec!["peanut".to_string()],
			disliked_substrings: vec![],
			required_diets: vec!["vegan".to_string()],
			excluded_diets: vec![],
		},
	};
	let items = db.fetch(&query, 10).await.expect("fetch");

	assert_eq!(items.len(), 1);
	assert_eq!(items[0].item_id, item_id);
	assert_eq!(items[0].nutrition.as_ref().expect("nutrition").calories, 500.0);

	let key = format!("ranked:{tenant}:{subject_id}:deadbeef");
	let payload = serde_json::json!({"schema_version": 1, "results": []});

	db.put(&key, payload.clone(), 60).await.expect("cache put");

	assert_eq!(db.get(&key).await.expect("cache get"), Some(payload));

	let removed = db
		.delete_prefix(&format!("ranked:{tenant}:{subject_id}:"))
		.await
		.expect("delete prefix");

	assert_eq!(removed, 1);
	assert_eq!(db.get(&key).await.expect("cache get after delete"), None);
}

#[tokio::test]
#[ignore]
async fn expired_cache_entries_read_as_misses() {
	let db = connect().await;
	let key = format!("ranked:smoke:{}:aa", Uuid::new_v4());

	db.put(&key, serde_json::json!({"schema_version": 1, "results": []}), -1)
		.await
		.expect("cache put");

	assert_eq!(db.get(&key).await.expect("cache get"), None);
}
