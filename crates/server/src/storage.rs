use anyhow::{Context, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

use teamdock_api::db::migrations::MIGRATIONS;
use teamdock_api::{ProfileResponse, TeamResponse};

/// Shared database state
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    pub fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }
}

/// Initialize the database: open connection, enable WAL, run migrations
pub fn init_db(data_dir: &Path) -> Result<Db> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join("teamdock.db");
    let conn = Connection::open(&db_path).context("opening SQLite database")?;

    // WAL for concurrent read performance
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;
    conn.execute_batch("PRAGMA foreign_keys=ON;")?;

    run_migrations(&conn)?;

    Ok(Db {
        conn: Arc::new(Mutex::new(conn)),
    })
}

pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _migrations WHERE name = ?1",
                [name],
                |row| row.get(0),
            )
            .unwrap_or(false);

        if !already_applied {
            conn.execute_batch(sql)
                .with_context(|| format!("running migration {name}"))?;
            conn.execute("INSERT INTO _migrations (name) VALUES (?1)", [name])?;
            tracing::info!("Applied migration: {name}");
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// sea-query → rusqlite bridge
// ---------------------------------------------------------------------------

/// A built sea-query statement: SQL plus bound values.
pub type Built = (String, sea_query::Values);

fn sq_params(values: &sea_query::Values) -> Vec<rusqlite::types::Value> {
    use rusqlite::types::Value as Sql;
    use sea_query::Value;

    values
        .0
        .iter()
        .map(|v| match v {
            Value::Bool(Some(b)) => Sql::Integer(i64::from(*b)),
            Value::TinyInt(Some(n)) => Sql::Integer(i64::from(*n)),
            Value::SmallInt(Some(n)) => Sql::Integer(i64::from(*n)),
            Value::Int(Some(n)) => Sql::Integer(i64::from(*n)),
            Value::BigInt(Some(n)) => Sql::Integer(*n),
            Value::TinyUnsigned(Some(n)) => Sql::Integer(i64::from(*n)),
            Value::SmallUnsigned(Some(n)) => Sql::Integer(i64::from(*n)),
            Value::Unsigned(Some(n)) => Sql::Integer(i64::from(*n)),
            Value::BigUnsigned(Some(n)) => Sql::Integer(*n as i64),
            Value::Float(Some(f)) => Sql::Real(f64::from(*f)),
            Value::Double(Some(f)) => Sql::Real(*f),
            Value::Char(Some(c)) => Sql::Text(c.to_string()),
            Value::String(Some(s)) => Sql::Text(s.as_str().to_owned()),
            Value::Bytes(Some(b)) => Sql::Blob((**b).clone()),
            _ => Sql::Null,
        })
        .collect()
}

/// Execute a built statement, returning the affected row count.
pub fn sq_execute(conn: &Connection, built: Built) -> rusqlite::Result<usize> {
    let (sql, values) = built;
    conn.execute(&sql, rusqlite::params_from_iter(sq_params(&values)))
}

/// Run a built SELECT expected to yield a single row.
pub fn sq_query_row<T, F>(conn: &Connection, built: Built, f: F) -> rusqlite::Result<T>
where
    F: FnOnce(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
{
    let (sql, values) = built;
    conn.query_row(&sql, rusqlite::params_from_iter(sq_params(&values)), f)
}

/// Run a built SELECT, collecting all rows.
pub fn sq_query_map<T, F>(conn: &Connection, built: Built, f: F) -> rusqlite::Result<Vec<T>>
where
    F: FnMut(&rusqlite::Row<'_>) -> rusqlite::Result<T>,
{
    let (sql, values) = built;
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(sq_params(&values)), f)?;
    rows.collect()
}

// ---------------------------------------------------------------------------
// Row mappers (column order fixed by the builders in teamdock-api)
// ---------------------------------------------------------------------------

/// Map a `profile_columns` row into a [`ProfileResponse`].
pub fn profile_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProfileResponse> {
    let discord_id: Option<String> = row.get(3)?;
    Ok(ProfileResponse {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        discord_linked: discord_id.is_some(),
        avatar_url: row.get(4)?,
        created_at: row.get(5)?,
        last_active_at: row.get(6)?,
    })
}

/// Map a `team_columns` row into a [`TeamResponse`].
pub fn team_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TeamResponse> {
    Ok(TeamResponse {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        max_members: row.get(3)?,
        created_by: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use teamdock_api::db as dbq;

    #[test]
    fn init_db_applies_migrations_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = init_db(dir.path()).expect("init");
        // Re-running against the same file must be a no-op.
        run_migrations(&db.conn()).expect("re-run migrations");

        let count: i64 = sq_query_row(&db.conn(), dbq::profiles::count(), |row| row.get(0))
            .expect("profiles table exists");
        assert_eq!(count, 0);
    }

    #[test]
    fn sq_params_maps_option_and_scalar_values() {
        let (_, values) = dbq::profiles::insert("p1", "nova", None, "999", "http://a", "td_x");
        let params = sq_params(&values);
        assert_eq!(params.len(), 6);
        assert!(matches!(params[0], rusqlite::types::Value::Text(_)));
        // email was None
        assert!(matches!(params[2], rusqlite::types::Value::Null));
    }

    #[test]
    fn profile_roundtrip_through_mappers() {
        let conn = rusqlite::Connection::open_in_memory().expect("conn");
        run_migrations(&conn).expect("migrations");
        sq_execute(
            &conn,
            dbq::profiles::insert("p1", "nova", Some("a@x.com"), "999", "http://a", "td_x"),
        )
        .expect("insert");

        let profile = sq_query_row(&conn, dbq::profiles::get_by_id("p1"), profile_from_row)
            .expect("profile");
        assert_eq!(profile.username, "nova");
        assert!(profile.discord_linked);
        assert!(!profile.created_at.is_empty());
    }
}
