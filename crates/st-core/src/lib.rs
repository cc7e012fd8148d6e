//! st-core - Core library for Stratum
//!
//! This crate provides the types shared by the migration engine and the CLI:
//! validated unit names, content checksums, the run direction, configuration
//! parsing, and discovery of SQL migration files on disk.

pub mod checksum;
pub mod config;
pub mod direction;
pub mod error;
pub mod source;
pub mod unit_name;

pub use checksum::digest;
pub use config::{Config, DatabaseConfig};
pub use direction::Direction;
pub use error::{CoreError, CoreResult};
pub use source::{discover_units, UnitSource};
pub use unit_name::UnitName;
