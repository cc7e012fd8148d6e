//! Strongly-typed migration unit name.
//!
//! A unit name is a sortable numeric timestamp prefix, an underscore, and a
//! descriptive label: `20241216082159686_create_user`. Because every prefix
//! is a zero-padded timestamp, lexicographic order equals chronological order.

use crate::error::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

/// Validated migration unit name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnitName(String);

impl UnitName {
    /// Parse and validate a unit name.
    pub fn parse(name: impl Into<String>) -> CoreResult<Self> {
        let name = name.into();
        validate(&name)?;
        Ok(Self(name))
    }

    /// Return the underlying name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric timestamp prefix (everything before the first `_`).
    pub fn timestamp_prefix(&self) -> &str {
        self.split_parts().0
    }

    /// Descriptive label (everything after the first `_`).
    pub fn label(&self) -> &str {
        self.split_parts().1
    }

    /// Consume the wrapper and return the inner `String`.
    pub fn into_inner(self) -> String {
        self.0
    }

    fn split_parts(&self) -> (&str, &str) {
        // validated on construction
        self.0.split_once('_').unwrap_or((&self.0, ""))
    }
}

fn validate(name: &str) -> CoreResult<()> {
    let invalid = |reason: &str| CoreError::InvalidUnitName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let Some((prefix, label)) = name.split_once('_') else {
        return Err(invalid("expected <timestamp>_<label>"));
    };
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid("timestamp prefix must be digits"));
    }
    if label.is_empty() {
        return Err(invalid("label must not be empty"));
    }
    if !label
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(invalid(
            "label may only contain ASCII letters, digits, '_' and '-'",
        ));
    }
    Ok(())
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UnitName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for UnitName {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for UnitName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UnitName {
    type Error = CoreError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for UnitName {
    type Error = CoreError;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<UnitName> for String {
    fn from(name: UnitName) -> Self {
        name.0
    }
}

impl PartialEq<str> for UnitName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for UnitName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

#[cfg(test)]
#[path = "unit_name_test.rs"]
mod tests;
