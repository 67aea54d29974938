//! Postgres persistence for the ranking engine: the candidate catalog,
//! subject profiles, and the ranked-result cache.

pub mod db;
pub mod error;
pub mod models;
pub mod queries;
pub mod schema;

pub use self::{
	db::Db,
	error::{Error, Result},
};
