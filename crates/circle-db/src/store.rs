//! Table-agnostic CRUD over one SQLite connection.
//!
//! Entity code never writes SQL: it names a table, passes column/value
//! pairs, and gets back [`Row`]s that [`rows_to_typed`] turns into records.

use rusqlite::{Connection, params_from_iter};
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value as Json};
use tracing::{error, trace};

use crate::error::StoreError;
use crate::schema::{self, Table};

/// SQLite's dynamic value: Null, Integer, Real, Text or Blob.
pub use rusqlite::types::Value;

/// Conjunctive equality filter: every `(column, value)` pair must match.
/// An empty slice matches every row.
pub type Criteria<'a> = [(&'a str, Value)];

/// One result row, columns in schema order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    table: &'static str,
    columns: Vec<(&'static str, Value)>,
}

impl Row {
    pub fn table(&self) -> &'static str {
        self.table
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.columns.iter().map(|(name, value)| (*name, value))
    }

    /// JSON object of the non-NULL columns. NULLs are left out so they read
    /// as missing fields on the typed side.
    pub fn into_json(self) -> Map<String, Json> {
        self.columns
            .into_iter()
            .filter_map(|(name, value)| value_to_json(value).map(|v| (name.to_string(), v)))
            .collect()
    }
}

/// The CRUD primitives, borrowed over a connection or an open transaction.
pub struct Store<'c> {
    conn: &'c Connection,
}

impl<'c> Store<'c> {
    pub fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// Insert a full row. `values` are positional, in the table's column order.
    pub fn insert(&self, table: &str, values: &[Value]) -> Result<(), StoreError> {
        let table = schema::table(table)?;
        if values.len() != table.columns.len() {
            return Err(StoreError::Query(format!(
                "{} expects {} values, got {}",
                table.name,
                table.columns.len(),
                values.len()
            )));
        }

        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(table.name),
            column_list(table),
            placeholders.join(", ")
        );
        trace!("{}", sql);

        self.conn.execute(&sql, params_from_iter(values.iter()))?;
        Ok(())
    }

    /// Every row matching `criteria`. Empty (never an error) when nothing matches.
    pub fn select(&self, table: &str, criteria: &Criteria<'_>) -> Result<Vec<Row>, StoreError> {
        let table = schema::table(table)?;
        let filter = where_clause(table, criteria, 0)?;
        let sql = format!(
            "SELECT {} FROM {}{}",
            column_list(table),
            quote(table.name),
            filter
        );
        trace!("{}", sql);

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(criteria.iter().map(|(_, v)| v)), |row| {
                let mut columns = Vec::with_capacity(table.columns.len());
                for (i, name) in table.columns.iter().enumerate() {
                    columns.push((*name, row.get::<_, Value>(i)?));
                }
                Ok(Row {
                    table: table.name,
                    columns,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Apply `set` to every row matching `criteria`. Returns the number of
    /// rows changed; zero matches is a successful no-op.
    pub fn update(
        &self,
        table: &str,
        set: &Criteria<'_>,
        criteria: &Criteria<'_>,
    ) -> Result<usize, StoreError> {
        let table = schema::table(table)?;
        if set.is_empty() {
            return Err(StoreError::Query(format!(
                "update of {} sets no columns",
                table.name
            )));
        }

        let mut assignments = Vec::with_capacity(set.len());
        for (i, (column, _)) in set.iter().enumerate() {
            table.check_column(column)?;
            assignments.push(format!("{} = ?{}", quote(column), i + 1));
        }
        let filter = where_clause(table, criteria, set.len())?;
        let sql = format!(
            "UPDATE {} SET {}{}",
            quote(table.name),
            assignments.join(", "),
            filter
        );
        trace!("{}", sql);

        let params = set.iter().chain(criteria.iter()).map(|(_, v)| v);
        Ok(self.conn.execute(&sql, params_from_iter(params))?)
    }

    /// Remove every row matching `criteria`. Cascades are the schema's business.
    pub fn delete(&self, table: &str, criteria: &Criteria<'_>) -> Result<usize, StoreError> {
        let table = schema::table(table)?;
        let filter = where_clause(table, criteria, 0)?;
        let sql = format!("DELETE FROM {}{}", quote(table.name), filter);
        trace!("{}", sql);

        Ok(self
            .conn
            .execute(&sql, params_from_iter(criteria.iter().map(|(_, v)| v)))?)
    }

    pub fn count(&self, table: &str, criteria: &Criteria<'_>) -> Result<usize, StoreError> {
        let table = schema::table(table)?;
        let filter = where_clause(table, criteria, 0)?;
        let sql = format!("SELECT COUNT(*) FROM {}{}", quote(table.name), filter);

        let count: i64 = self.conn.query_row(
            &sql,
            params_from_iter(criteria.iter().map(|(_, v)| v)),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

/// Convert rows into records of type `T`.
///
/// Missing or NULL columns leave the field at its serde default; columns the
/// record does not declare are ignored. A column whose kind cannot fill its
/// field fails the whole batch.
pub fn rows_to_typed<T: DeserializeOwned>(rows: Vec<Row>) -> Result<Vec<T>, StoreError> {
    rows.into_iter()
        .map(|row| {
            let table = row.table;
            serde_json::from_value(Json::Object(row.into_json())).map_err(|e| {
                let target = std::any::type_name::<T>();
                error!("Row shape drift: {} row does not fit {}: {}", table, target, e);
                StoreError::Conversion {
                    table: table.to_string(),
                    target,
                    reason: e.to_string(),
                }
            })
        })
        .collect()
}

/// Owned text value, for building criteria from borrowed ids.
pub fn text(s: impl Into<String>) -> Value {
    Value::Text(s.into())
}

pub(crate) fn json_to_value(json: Json) -> Value {
    match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Integer(b as i64),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => Value::Real(n.as_f64().unwrap_or_default()),
        },
        Json::String(s) => Value::Text(s),
        other => Value::Text(other.to_string()),
    }
}

fn value_to_json(value: Value) -> Option<Json> {
    match value {
        Value::Null => None,
        Value::Integer(i) => Some(Json::from(i)),
        Value::Real(f) => Some(Number::from_f64(f).map_or(Json::Null, Json::Number)),
        Value::Text(s) => Some(Json::String(s)),
        Value::Blob(b) => Some(Json::from(b)),
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier)
}

fn column_list(table: &Table) -> String {
    table
        .columns
        .iter()
        .map(|c| quote(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// ` WHERE a IS ?n AND ...` with placeholders numbered after `offset`.
/// `IS` keeps NULL criteria meaningful.
fn where_clause(table: &Table, criteria: &Criteria<'_>, offset: usize) -> Result<String, StoreError> {
    if criteria.is_empty() {
        return Ok(String::new());
    }

    let mut terms = Vec::with_capacity(criteria.len());
    for (i, (column, _)) in criteria.iter().enumerate() {
        table.check_column(column)?;
        terms.push(format!("{} IS ?{}", quote(column), offset + i + 1));
    }
    Ok(format!(" WHERE {}", terms.join(" AND ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Database;
    use crate::schema::{FOLLOWERS, USERS};
    use circle_types::models::{Follower, User};

    fn user_values(id: &str, email: &str) -> Vec<Value> {
        vec![
            text(id),
            text(email),
            text("hash"),
            text("Ada"),
            text("Lovelace"),
            Value::Null,
            Value::Null,
            Value::Null,
            Value::Null,
            text("public"),
            Value::Integer(0),
            text("2026-01-01T00:00:00+00:00"),
        ]
    }

    fn seeded() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.with_store(|s| {
            for id in ["A", "B", "C"] {
                s.insert("users", &user_values(id, &format!("{id}@example.com")))?;
            }
            Ok::<_, StoreError>(())
        })
        .unwrap();
        db
    }

    #[test]
    fn select_without_criteria_returns_every_row() {
        let db = seeded();
        let rows = db.with_store(|s| s.select("users", &[])).unwrap();
        assert_eq!(rows.len(), 3);
        let columns: Vec<&str> = rows[0].columns().map(|(c, _)| c).collect();
        assert_eq!(columns, USERS.columns);
    }

    #[test]
    fn select_with_no_match_is_empty() {
        let db = seeded();
        let rows = db
            .with_store(|s| s.select("users", &[("id", text("nobody"))]))
            .unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn followers_of_b() {
        let db = seeded();
        db.with_store(|s| {
            for (follower, followed) in [("A", "B"), ("C", "B"), ("A", "C")] {
                s.insert(
                    FOLLOWERS.name,
                    &[text(follower), text(followed), text("2026-01-01")],
                )?;
            }
            Ok::<_, StoreError>(())
        })
        .unwrap();

        let rows = db
            .with_store(|s| s.select("followers", &[("followed_id", text("B"))]))
            .unwrap();
        assert_eq!(rows.len(), 2);

        let followers: Vec<Follower> = rows_to_typed(rows).unwrap();
        let mut ids: Vec<&str> = followers.iter().map(|f| f.follower_id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, ["A", "C"]);
    }

    #[test]
    fn typed_roundtrip_keeps_inserted_values() {
        let db = seeded();
        let users: Vec<User> = db
            .with_store(|s| rows_to_typed(s.select("users", &[("id", text("A"))])?))
            .unwrap();

        assert_eq!(
            users,
            vec![User {
                id: "A".into(),
                email: "A@example.com".into(),
                password: "hash".into(),
                first_name: "Ada".into(),
                last_name: "Lovelace".into(),
                nickname: None,
                date_of_birth: None,
                about: None,
                avatar: None,
                privacy: "public".into(),
                failed_logins: 0,
                created_at: "2026-01-01T00:00:00+00:00".into(),
            }]
        );
    }

    #[test]
    fn duplicate_unique_value_is_a_constraint_violation() {
        let db = seeded();
        let err = db
            .with_store(|s| s.insert("users", &user_values("D", "A@example.com")))
            .unwrap_err();
        assert!(matches!(err, StoreError::ConstraintViolation(_)), "{err:?}");

        let count = db.with_store(|s| s.count("users", &[])).unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn unknown_names_never_reach_sql() {
        let db = seeded();
        let err = db.with_store(|s| s.select("users; DROP TABLE users", &[])).unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));

        let err = db
            .with_store(|s| s.select("users", &[("id = id OR 1", text("x"))]))
            .unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));

        let err = db
            .with_store(|s| s.update("users", &[("is_admin", Value::Integer(1))], &[]))
            .unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));
    }

    #[test]
    fn values_are_bound_not_interpolated() {
        let db = seeded();
        let rows = db
            .with_store(|s| s.select("users", &[("id", text("A' OR '1'='1"))]))
            .unwrap();
        assert!(rows.is_empty());

        db.with_store(|s| s.insert("users", &user_values("O'Brien", "ob@example.com")))
            .unwrap();
        let rows = db
            .with_store(|s| s.select("users", &[("id", text("O'Brien"))]))
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn insert_arity_is_checked() {
        let db = seeded();
        let err = db
            .with_store(|s| s.insert("followers", &[text("A"), text("B")]))
            .unwrap_err();
        assert!(matches!(err, StoreError::Query(_)));
    }

    #[test]
    fn update_applies_to_matching_rows_only() {
        let db = seeded();
        let changed = db
            .with_store(|s| {
                s.update(
                    "users",
                    &[("nickname", text("countess"))],
                    &[("id", text("A"))],
                )
            })
            .unwrap();
        assert_eq!(changed, 1);

        let nobody = db
            .with_store(|s| {
                s.update(
                    "users",
                    &[("nickname", text("ghost"))],
                    &[("id", text("Z"))],
                )
            })
            .unwrap();
        assert_eq!(nobody, 0);

        let row = db
            .with_store(|s| s.select("users", &[("nickname", text("countess"))]))
            .unwrap();
        assert_eq!(row.len(), 1);
        assert_eq!(row[0].get("id"), Some(&text("A")));
    }

    #[test]
    fn null_criteria_match_null_columns() {
        let db = seeded();
        let rows = db
            .with_store(|s| s.select("users", &[("nickname", Value::Null)]))
            .unwrap();
        assert_eq!(rows.len(), 3);
    }

    #[test]
    fn delete_cascades_through_schema() {
        let db = seeded();
        db.with_store(|s| s.insert("followers", &[text("A"), text("B"), text("t")]))
            .unwrap();

        let removed = db.with_store(|s| s.delete("users", &[("id", text("B"))])).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(db.with_store(|s| s.count("followers", &[])).unwrap(), 0);
    }

    #[test]
    fn wrong_column_kind_is_a_conversion_error() {
        #[derive(Debug, serde::Deserialize)]
        #[allow(dead_code)]
        struct Strict {
            id: String,
            failed_logins: String,
        }

        let db = seeded();
        let rows = db.with_store(|s| s.select("users", &[])).unwrap();
        let err = rows_to_typed::<Strict>(rows).unwrap_err();
        assert!(matches!(err, StoreError::Conversion { .. }), "{err:?}");
    }
}
