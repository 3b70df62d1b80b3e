use anyhow::{Context, Result};
use directories::ProjectDirs;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::PathBuf;

/// Environment variable that supplies a token without touching the store.
pub const TOKEN_ENV: &str = "ENGDASH_TOKEN";

const TOKEN_KEY: &str = "auth_token";

/// Returns the path to the session database.
/// Location: `~/.local/share/engdash/session.db` (XDG-compliant)
pub fn db_path() -> Result<PathBuf> {
    let dirs =
        ProjectDirs::from("", "", "engdash").context("Could not determine data directory")?;
    let data_dir = dirs.data_dir();
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    Ok(data_dir.join("session.db"))
}

/// Opens (or creates) the session database with its schema in place.
pub fn open_db() -> Result<Connection> {
    let path = db_path()?;
    let conn = Connection::open(&path)
        .with_context(|| format!("Failed to open database at {}", path.display()))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    init(&conn)?;
    Ok(conn)
}

/// Open an in-memory database for testing.
pub fn open_memory_db() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init(&conn)?;
    Ok(conn)
}

pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS session (
            key        TEXT PRIMARY KEY,
            value      TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );",
    )?;
    Ok(())
}

/// The stored bearer token, if logged in.
pub fn token(conn: &Connection) -> Result<Option<String>> {
    let token = conn
        .query_row(
            "SELECT value FROM session WHERE key = ?1",
            params![TOKEN_KEY],
            |row| row.get(0),
        )
        .optional()?;
    Ok(token)
}

pub fn set_token(conn: &Connection, token: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO session (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
        params![TOKEN_KEY, token],
    )?;
    tracing::info!("stored session token");
    Ok(())
}

/// Forget the token. Returns whether one was stored.
pub fn clear_token(conn: &Connection) -> Result<bool> {
    let removed = conn.execute("DELETE FROM session WHERE key = ?1", params![TOKEN_KEY])?;
    Ok(removed > 0)
}

/// Token to use for requests: the env override if set, else the store.
pub fn resolve_token(conn: &Connection, env_token: Option<String>) -> Result<Option<String>> {
    match env_token.filter(|t| !t.trim().is_empty()) {
        Some(t) => Ok(Some(t)),
        None => token(conn),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_lifecycle() {
        let conn = open_memory_db().unwrap();
        assert_eq!(token(&conn).unwrap(), None);
        assert!(!clear_token(&conn).unwrap());

        set_token(&conn, "abc").unwrap();
        assert_eq!(token(&conn).unwrap().as_deref(), Some("abc"));

        set_token(&conn, "def").unwrap();
        assert_eq!(token(&conn).unwrap().as_deref(), Some("def"));

        assert!(clear_token(&conn).unwrap());
        assert_eq!(token(&conn).unwrap(), None);
    }

    #[test]
    fn test_env_token_wins() {
        let conn = open_memory_db().unwrap();
        set_token(&conn, "stored").unwrap();
        assert_eq!(
            resolve_token(&conn, Some("from-env".into())).unwrap().as_deref(),
            Some("from-env")
        );
        assert_eq!(
            resolve_token(&conn, Some("".into())).unwrap().as_deref(),
            Some("stored")
        );
        assert_eq!(resolve_token(&conn, None).unwrap().as_deref(), Some("stored"));
    }

    #[test]
    fn test_init_is_idempotent() {
        let conn = open_memory_db().unwrap();
        init(&conn).unwrap();
        set_token(&conn, "x").unwrap();
        init(&conn).unwrap();
        assert_eq!(token(&conn).unwrap().as_deref(), Some("x"));
    }
}
