use sqlx::{PgPool, postgres::PgPoolOptions};
use uuid::Uuid;

use crate::{Result, queries, schema};
use palate_domain::{CandidateItem, Profile};
use palate_engine::{
	BoxFuture, CacheBackend, CandidateQuery, CandidateSource, CapabilityError, ProfileStore,
};

/// Postgres-backed implementation of every engine capability.
#[derive(Clone)]
pub struct Db {
	pool: PgPool,
}
impl Db {
	pub async fn connect(cfg: &palate_config::Postgres) -> Result<Self> {
		let pool =
			PgPoolOptions::new().max_connections(cfg.pool_max_conns).connect(&cfg.dsn).await?;

		Ok(Self { pool })
	}

	pub fn pool(&self) -> &PgPool {
		&self.pool
	}

	/// Applies the bootstrap DDL. Serialized under an advisory lock so
	/// concurrently starting instances do not race the same statements.
	pub async fn ensure_schema(&self) -> Result<()> {
		let mut tx = self.pool.begin().await?;

		sqlx::query("SELECT pg_advisory_xact_lock(hashtext('palate_schema'))")
			.execute(&mut *tx)
			.await?;

		for statement in schema::SQL.split(';').map(str::trim).filter(|s| !s.is_empty()) {
			sqlx::query(statement).execute(&mut *tx).await?;
		}

		tx.commit().await?;

		Ok(())
	}
}
impl CandidateSource for Db {
	fn fetch<'a>(
		&'a self,
		query: &'a CandidateQuery,
		overfetch_limit: u32,
	) -> BoxFuture<'a, std::result::Result<Vec<CandidateItem>, CapabilityError>> {
		Box::pin(async move {
			let rows =
				queries::fetch_candidates(&self.pool, &query.tenant_id, &query.hard, overfetch_limit)
					.await?;

			Ok(rows.into_iter().map(CandidateItem::from).collect())
		})
	}
}
impl ProfileStore for Db {
	fn profile<'a>(
		&'a self,
		tenant_id: &'a str,
		subject_id: Uuid,
	) -> BoxFuture<'a, std::result::Result<Option<Profile>, CapabilityError>> {
		Box::pin(async move {
			let row = queries::fetch_profile(&self.pool, tenant_id, subject_id).await?;

			Ok(row.map(Profile::from))
		})
	}
}
impl CacheBackend for Db {
	fn get<'a>(
		&'a self,
		key: &'a str,
	) -> BoxFuture<'a, std::result::Result<Option<serde_json::Value>, CapabilityError>> {
		Box::pin(async move { Ok(queries::cache_get(&self.pool, key).await?) })
	}

	fn put<'a>(
		&'a self,
		key: &'a str,
		value: serde_json::Value,
		ttl_secs: i64,
	) -> BoxFuture<'a, std::result::Result<(), CapabilityError>> {
		Box::pin(async move { Ok(queries::cache_put(&self.pool, key, &value, ttl_secs).await?) })
	}

	fn delete_prefix<'a>(
		&'a self,
		prefix: &'a str,
	) -> BoxFuture<'a, std::result::Result<u64, CapabilityError>> {
		Box::pin(async move { Ok(queries::cache_delete_prefix(&self.pool, prefix).await?) })
	}
}
