//! Backend-neutral parameter and column values.

use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};

/// A value bound as a statement parameter or read back from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl SqlValue {
    /// Short type label used in conversion errors
    pub fn type_name(&self) -> &'static str {
        match self {
            SqlValue::Null => "NULL",
            SqlValue::Bool(_) => "BOOLEAN",
            SqlValue::Int(_) => "INTEGER",
            SqlValue::Float(_) => "DOUBLE",
            SqlValue::Text(_) => "VARCHAR",
            SqlValue::Timestamp(_) => "TIMESTAMP",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::Int(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::Int(i64::from(v))
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::Float(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(SqlValue::Null, Into::into)
    }
}

/// One result row, addressed by column index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value at `index`
    pub fn get(&self, index: usize) -> DbResult<&SqlValue> {
        self.values.get(index).ok_or(DbError::ColumnOutOfRange {
            index,
            len: self.values.len(),
        })
    }

    pub fn get_i64(&self, index: usize) -> DbResult<i64> {
        self.get_opt_i64(index)?
            .ok_or_else(|| mismatch(index, "INTEGER", &SqlValue::Null))
    }

    pub fn get_opt_i64(&self, index: usize) -> DbResult<Option<i64>> {
        match self.get(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Int(v) => Ok(Some(*v)),
            other => Err(mismatch(index, "INTEGER", other)),
        }
    }

    /// Read a floating point column; integer columns are widened.
    pub fn get_opt_f64(&self, index: usize) -> DbResult<Option<f64>> {
        match self.get(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Float(v) => Ok(Some(*v)),
            SqlValue::Int(v) => Ok(Some(*v as f64)),
            other => Err(mismatch(index, "DOUBLE", other)),
        }
    }

    pub fn get_bool(&self, index: usize) -> DbResult<bool> {
        match self.get(index)? {
            SqlValue::Bool(v) => Ok(*v),
            other => Err(mismatch(index, "BOOLEAN", other)),
        }
    }

    pub fn get_string(&self, index: usize) -> DbResult<String> {
        self.get_opt_string(index)?
            .ok_or_else(|| mismatch(index, "VARCHAR", &SqlValue::Null))
    }

    pub fn get_opt_string(&self, index: usize) -> DbResult<Option<String>> {
        match self.get(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(v) => Ok(Some(v.clone())),
            other => Err(mismatch(index, "VARCHAR", other)),
        }
    }

    pub fn get_timestamp(&self, index: usize) -> DbResult<DateTime<Utc>> {
        self.get_opt_timestamp(index)?
            .ok_or_else(|| mismatch(index, "TIMESTAMP", &SqlValue::Null))
    }

    pub fn get_opt_timestamp(&self, index: usize) -> DbResult<Option<DateTime<Utc>>> {
        match self.get(index)? {
            SqlValue::Null => Ok(None),
            SqlValue::Timestamp(v) => Ok(Some(*v)),
            other => Err(mismatch(index, "TIMESTAMP", other)),
        }
    }
}

fn mismatch(index: usize, expected: &'static str, found: &SqlValue) -> DbError {
    DbError::TypeMismatch {
        index,
        expected,
        found: found.type_name().to_string(),
    }
}
