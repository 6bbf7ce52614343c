//! SQL values, result rows and a placeholder-aware statement builder.

use crate::error::CatalogError;
use serde::{Deserialize, Serialize};

/// A backend-neutral SQL value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl SqlValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::Integer(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            SqlValue::Real(value) => Some(*value),
            SqlValue::Integer(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Integer(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// One fetched row with its column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn text(&self, table: &str, column: &str) -> Result<String, CatalogError> {
        self.get(column)
            .and_then(SqlValue::as_str)
            .map(str::to_string)
            .ok_or_else(|| missing(table, column))
    }

    pub fn optional_text(&self, column: &str) -> Option<String> {
        self.get(column).and_then(SqlValue::as_str).map(str::to_string)
    }

    pub fn integer(&self, table: &str, column: &str) -> Result<i64, CatalogError> {
        self.get(column)
            .and_then(SqlValue::as_i64)
            .ok_or_else(|| missing(table, column))
    }

    pub fn optional_real(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(SqlValue::as_f64)
    }
}

fn missing(table: &str, column: &str) -> CatalogError {
    CatalogError::InvalidRow {
        table: table.to_string(),
        message: format!("column `{column}` is missing or has the wrong type"),
    }
}

/// Placeholder syntax of the underlying driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamStyle {
    /// `?`
    #[default]
    Qmark,
    /// `%s`
    Format,
    /// `$1`, `$2`, ...
    Numeric,
    /// `:column`
    Named,
}

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Builds the narrow set of statements the catalog needs.
#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder {
    style: ParamStyle,
}

impl QueryBuilder {
    pub fn new(style: ParamStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> ParamStyle {
        self.style
    }

    fn placeholder(&self, index: usize, column: &str) -> String {
        match self.style {
            ParamStyle::Qmark => "?".to_string(),
            ParamStyle::Format => "%s".to_string(),
            ParamStyle::Numeric => format!("${}", index + 1),
            ParamStyle::Named => format!(":{column}"),
        }
    }

    /// `SELECT <columns> FROM <table> [WHERE <key> = ?]`
    pub fn select(&self, table: &str, columns: &[&str], key: Option<(&str, SqlValue)>) -> Statement {
        let projection = if columns.is_empty() {
            "*".to_string()
        } else {
            columns.join(", ")
        };
        let mut sql = format!("SELECT {projection} FROM {table}");
        let mut params = Vec::new();
        if let Some((column, value)) = key {
            sql.push_str(&format!(" WHERE {column} = {}", self.placeholder(0, column)));
            params.push(value);
        }
        sql.push(';');
        Statement { sql, params }
    }

    /// `INSERT INTO <table> (<columns>) VALUES (<placeholders>)`
    pub fn insert(&self, table: &str, values: Vec<(&str, SqlValue)>) -> Statement {
        let columns: Vec<&str> = values.iter().map(|(c, _)| *c).collect();
        let placeholders: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| self.placeholder(i, c))
            .collect();
        Statement {
            sql: format!(
                "INSERT INTO {table} ({}) VALUES ({});",
                columns.join(", "),
                placeholders.join(", ")
            ),
            params: values.into_iter().map(|(_, v)| v).collect(),
        }
    }

    /// `UPDATE <table> SET c = ?, ... WHERE <key> = ?`
    ///
    /// Null values are skipped unless `include_nulls` is set.
    pub fn update(
        &self,
        table: &str,
        values: Vec<(&str, SqlValue)>,
        key: (&str, SqlValue),
        include_nulls: bool,
    ) -> Statement {
        let mut assignments = Vec::new();
        let mut params = Vec::new();
        for (column, value) in values {
            if column == key.0 || (value.is_null() && !include_nulls) {
                continue;
            }
            assignments.push(format!("{column} = {}", self.placeholder(params.len(), column)));
            params.push(value);
        }
        let (key_column, key_value) = key;
        let sql = format!(
            "UPDATE {table} SET {} WHERE {key_column} = {};",
            assignments.join(", "),
            self.placeholder(params.len(), key_column)
        );
        params.push(key_value);
        Statement { sql, params }
    }

    /// `DELETE FROM <table> WHERE <key> = ?`
    pub fn delete(&self, table: &str, key: (&str, SqlValue)) -> Statement {
        let (column, value) = key;
        Statement {
            sql: format!(
                "DELETE FROM {table} WHERE {column} = {};",
                self.placeholder(0, column)
            ),
            params: vec![value],
        }
    }
}
