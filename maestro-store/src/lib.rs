//! Maestro Store
//!
//! Persistence for execution records. The engine depends only on the
//! [`Store`] operation contract (insert / update / query / exists over a
//! fixed table set); the backend behind it is interchangeable:
//!
//! - [`FileStore`]: the whole schema serialized as one JSON document. Chosen
//!   automatically when no database is configured; single-process use only.
//! - [`PgStore`]: PostgreSQL via sqlx, for durable multi-reader deployments.
//!
//! Engine behavior is identical across backends; only connection error
//! handling differs.

mod contract;
mod error;
mod file;
mod postgres;
pub mod repository;
mod schema;

pub use contract::{Filter, Row, Store, Table};
pub use error::StoreError;
pub use file::FileStore;
pub use postgres::PgStore;
pub use schema::{ColumnKind, TableSchema};
