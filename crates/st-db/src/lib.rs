//! st-db - Database abstraction layer for Stratum
//!
//! This crate provides the `Database` capability the migration engine is
//! written against (statement execution with bound parameters, row queries,
//! explicit transaction control) and its DuckDB implementation.

pub mod duckdb;
pub mod error;
pub mod traits;
pub mod value;

pub use duckdb::DuckDbBackend;
pub use error::{DbError, DbResult, ErrorCode};
pub use traits::Database;
pub use value::{Row, SqlValue};
