//! Bootstrap DDL. Tag arrays are stored normalized (trimmed, lowercase) at
//! ingest so the array-operator prefilters in queries.rs stay exact.

pub const SQL: &str = r#"
CREATE TABLE IF NOT EXISTS catalog_items (
	tenant_id     TEXT        NOT NULL,
	item_id       UUID        NOT NULL,
	name          TEXT        NOT NULL,
	diet_tags     TEXT[]      NOT NULL DEFAULT '{}',
	allergen_tags TEXT[],
	ingredients   TEXT[]      NOT NULL DEFAULT '{}',
	categories    TEXT[]      NOT NULL DEFAULT '{}',
	nutrition     JSONB,
	popularity    BIGINT      NOT NULL DEFAULT 0,
	updated_at    TIMESTAMPTZ NOT NULL DEFAULT now(),
	PRIMARY KEY (tenant_id, item_id)
);

CREATE INDEX IF NOT EXISTS idx_catalog_items_tenant_updated
	ON catalog_items (tenant_id, updated_at DESC, item_id ASC);

CREATE TABLE IF NOT EXISTS subject_profiles (
	tenant_id            TEXT        NOT NULL,
	subject_id           UUID        NOT NULL,
	diets                TEXT[]      NOT NULL DEFAULT '{}',
	excluded_diets       TEXT[]      NOT NULL DEFAULT '{}',
	allergens            TEXT[]      NOT NULL DEFAULT '{}',
	disliked_ingredients TEXT[]      NOT NULL DEFAULT '{}',
	conditions           TEXT[]      NOT NULL DEFAULT '{}',
	preferred_categories TEXT[]      NOT NULL DEFAULT '{}',
	macro_targets        JSONB,
	recent_items         JSONB,
	updated_at           TIMESTAMPTZ NOT NULL DEFAULT now(),
	PRIMARY KEY (tenant_id, subject_id)
);

CREATE TABLE IF NOT EXISTS ranked_cache (
	cache_key  TEXT        PRIMARY KEY,
	payload    JSONB       NOT NULL,
	expires_at TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_ranked_cache_expiry
	ON ranked_cache (expires_at)
"#;
