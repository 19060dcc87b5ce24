use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const KEY_ACCESS_TOKEN: &str = "token";
pub const KEY_REFRESH_TOKEN: &str = "refresh_token";
pub const KEY_COMMUNITY_QUESTIONS: &str = "community_questions";
pub const KEY_COMMUNITY_USERS: &str = "community_users";
pub const KEY_COMMUNITY_PROFILES: &str = "community_profiles";

/// Durable key/value state shared by the session and the community board.
#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthTokens {
    pub access: String,
    #[serde(default)]
    pub refresh: String,
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
}

impl Store {
    pub fn open(opts: Options) -> Result<Self> {
        let path = if let Some(path) = opts.path {
            path
        } else {
            default_path().context("storage: resolve default path")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("storage: create directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("storage: open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("storage: set WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .context("storage: set busy timeout")?;
        migrate(&conn)?;
        tracing::debug!(path = %path.display(), "opened local state");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("storage: open in-memory database")?;
        migrate(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn close(self) -> Result<()> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| anyhow!("storage: connection still in use"))?
            .into_inner();
        conn.close()
            .map_err(|(_, err)| err)
            .context("storage: close connection")
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM local_state WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("storage: read {key}"))
    }

    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        if key.is_empty() {
            bail!("storage: key required");
        }
        let conn = self.conn.lock();
        conn.execute(
            r#"
INSERT INTO local_state (key, value, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET
  value = excluded.value,
  updated_at = excluded.updated_at
"#,
            params![key, value, Utc::now().timestamp()],
        )
        .with_context(|| format!("storage: write {key}"))?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM local_state WHERE key = ?1", params![key])
            .with_context(|| format!("storage: remove {key}"))?;
        Ok(())
    }

    /// Reads a JSON document, treating a missing or unreadable value as empty.
    pub fn load_json<T>(&self, key: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let Some(raw) = self.get(key)? else {
            return Ok(T::default());
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(value),
            Err(err) => {
                tracing::warn!(key, error = %err, "discarding unreadable local state");
                Ok(T::default())
            }
        }
    }

    pub fn save_json<T>(&self, key: &str, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let raw = serde_json::to_string(value)
            .with_context(|| format!("storage: serialize {key}"))?;
        self.put(key, &raw)
    }

    pub fn load_tokens(&self) -> Result<Option<AuthTokens>> {
        let Some(access) = self.get(KEY_ACCESS_TOKEN)? else {
            return Ok(None);
        };
        if access.is_empty() {
            return Ok(None);
        }
        let refresh = self.get(KEY_REFRESH_TOKEN)?.unwrap_or_default();
        Ok(Some(AuthTokens { access, refresh }))
    }

    pub fn save_tokens(&self, tokens: &AuthTokens) -> Result<()> {
        if tokens.access.is_empty() {
            bail!("storage: access token required");
        }
        self.put(KEY_ACCESS_TOKEN, &tokens.access)?;
        self.put(KEY_REFRESH_TOKEN, &tokens.refresh)
    }

    pub fn clear_tokens(&self) -> Result<()> {
        self.remove(KEY_ACCESS_TOKEN)?;
        self.remove(KEY_REFRESH_TOKEN)
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
)
"#,
        [],
    )?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for (idx, sql) in migrations().iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)
            .with_context(|| format!("storage: apply migration {version}"))?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, Utc::now().timestamp()],
        )?;
    }
    Ok(())
}

fn migrations() -> Vec<&'static str> {
    vec![
        r#"
CREATE TABLE IF NOT EXISTS local_state (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);
"#,
    ]
}

pub fn default_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("devguide").join("state.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    #[test]
    fn open_creates_database_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("state.db");
        let store = Store::open(Options {
            path: Some(path.clone()),
        })
        .unwrap();
        assert!(path.exists());
        store.close().unwrap();
    }

    #[test]
    fn values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.db");
        {
            let store = Store::open(Options {
                path: Some(path.clone()),
            })
            .unwrap();
            let mut points = BTreeMap::new();
            points.insert("ada@example.com".to_string(), 15u64);
            store.save_json(KEY_COMMUNITY_USERS, &points).unwrap();
            store.close().unwrap();
        }
        let store = Store::open(Options { path: Some(path) }).unwrap();
        let points: BTreeMap<String, u64> = store.load_json(KEY_COMMUNITY_USERS).unwrap();
        assert_eq!(points.get("ada@example.com"), Some(&15));
    }

    #[test]
    fn unreadable_documents_load_as_default() {
        let store = Store::open_in_memory().unwrap();
        store.put(KEY_COMMUNITY_QUESTIONS, "{not json").unwrap();
        let loaded: Vec<String> = store.load_json(KEY_COMMUNITY_QUESTIONS).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn tokens_round_trip_and_clear() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.load_tokens().unwrap(), None);
        let tokens = AuthTokens {
            access: "access".into(),
            refresh: "refresh".into(),
        };
        store.save_tokens(&tokens).unwrap();
        assert_eq!(store.load_tokens().unwrap(), Some(tokens));
        store.clear_tokens().unwrap();
        assert_eq!(store.load_tokens().unwrap(), None);
    }

    #[test]
    fn empty_access_token_is_rejected() {
        let store = Store::open_in_memory().unwrap();
        let err = store
            .save_tokens(&AuthTokens {
                access: String::new(),
                refresh: "r".into(),
            })
            .unwrap_err();
        assert!(err.to_string().contains("access token"));
    }
}
