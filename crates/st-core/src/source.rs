//! SQL migration files and their discovery on disk.
//!
//! A migration file is named `<timestamp>_<label>.sql` and contains two
//! sections introduced by marker lines:
//!
//! ```sql
//! -- migrate:up
//! CREATE TABLE foo (id INTEGER);
//!
//! -- migrate:down
//! DROP TABLE foo;
//! ```
//!
//! The `down` section is optional; a unit without one reverts as a no-op.
//! Anything above the `up` marker is treated as a header and ignored. The
//! checksum of a unit always covers the whole file text.

use crate::checksum::digest;
use crate::error::{CoreError, CoreResult};
use crate::unit_name::UnitName;
use std::path::{Path, PathBuf};

/// Marker line that opens the apply section
pub const UP_MARKER: &str = "-- migrate:up";

/// Marker line that opens the revert section
pub const DOWN_MARKER: &str = "-- migrate:down";

/// File extension of migration files
pub const UNIT_EXTENSION: &str = "sql";

/// A parsed migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSource {
    /// Unit identity
    pub name: UnitName,
    /// File the unit was loaded from, if any
    pub path: Option<PathBuf>,
    /// Raw file text, used for checksumming
    pub text: String,
    /// SQL executed when applying
    pub up_sql: String,
    /// SQL executed when reverting (may be empty)
    pub down_sql: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Header,
    Up,
    Down,
}

impl UnitSource {
    /// Parse the text of a migration file.
    pub fn parse(name: UnitName, text: impl Into<String>) -> CoreResult<Self> {
        let text = text.into();
        let mut section = Section::Header;
        let mut up = Vec::new();
        let mut down = Vec::new();

        for line in text.lines() {
            let trimmed = line.trim();
            if trimmed.eq_ignore_ascii_case(UP_MARKER) {
                if section != Section::Header {
                    return Err(CoreError::MalformedUnit {
                        name: name.to_string(),
                        reason: format!("'{UP_MARKER}' must appear exactly once, before '{DOWN_MARKER}'"),
                    });
                }
                section = Section::Up;
                continue;
            }
            if trimmed.eq_ignore_ascii_case(DOWN_MARKER) {
                match section {
                    Section::Header => {
                        return Err(CoreError::MissingSection {
                            name: name.to_string(),
                            marker: UP_MARKER,
                        })
                    }
                    Section::Down => {
                        return Err(CoreError::MalformedUnit {
                            name: name.to_string(),
                            reason: format!("'{DOWN_MARKER}' appears more than once"),
                        })
                    }
                    Section::Up => {}
                }
                section = Section::Down;
                continue;
            }
            match section {
                Section::Header => {}
                Section::Up => up.push(line),
                Section::Down => down.push(line),
            }
        }

        if section == Section::Header {
            return Err(CoreError::MissingSection {
                name: name.to_string(),
                marker: UP_MARKER,
            });
        }

        let up_sql = up.join("\n").trim().to_string();
        if up_sql.is_empty() {
            return Err(CoreError::MalformedUnit {
                name: name.to_string(),
                reason: "the up section is empty".to_string(),
            });
        }

        Ok(Self {
            name,
            path: None,
            up_sql,
            down_sql: down.join("\n").trim().to_string(),
            text,
        })
    }

    /// Build a unit from its two SQL bodies, rendering the canonical file text.
    pub fn from_parts(name: UnitName, up_sql: &str, down_sql: &str) -> CoreResult<Self> {
        let text = format!("{UP_MARKER}\n{up_sql}\n\n{DOWN_MARKER}\n{down_sql}\n");
        Self::parse(name, text)
    }

    /// Load a single migration file; the unit name is the file stem.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| CoreError::NonUtf8Unit {
                path: path.display().to_string(),
            })?;
        let name = UnitName::parse(stem)?;
        let bytes = std::fs::read(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        let text = String::from_utf8(bytes).map_err(|_| CoreError::NonUtf8Unit {
            path: path.display().to_string(),
        })?;
        let mut unit = Self::parse(name, text)?;
        unit.path = Some(path.to_path_buf());
        Ok(unit)
    }

    /// Digest of the raw file text
    pub fn checksum(&self) -> String {
        digest(&self.text)
    }
}

/// Discover all migration files in `dir`, ordered by unit name.
///
/// Only regular files with a `.sql` extension are considered; other entries
/// are skipped. Fails before touching the database when the directory does
/// not exist or any file is malformed.
pub fn discover_units(dir: &Path) -> CoreResult<Vec<UnitSource>> {
    if !dir.is_dir() {
        return Err(CoreError::MigrationsDirNotFound {
            path: dir.display().to_string(),
        });
    }

    let entries = std::fs::read_dir(dir).map_err(|e| CoreError::IoWithPath {
        path: dir.display().to_string(),
        source: e,
    })?;

    let mut units = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CoreError::IoWithPath {
            path: dir.display().to_string(),
            source: e,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(UNIT_EXTENSION) {
            log::debug!("Skipping non-migration file {}", path.display());
            continue;
        }
        units.push(UnitSource::load(&path)?);
    }

    units.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(units)
}

#[cfg(test)]
#[path = "source_test.rs"]
mod tests;
