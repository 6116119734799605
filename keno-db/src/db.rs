use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;

use crate::kv::KvStore;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key    TEXT PRIMARY KEY,
    value  TEXT NOT NULL
);
";

pub fn db_path() -> std::path::PathBuf {
    let mut path = std::env::current_dir().unwrap_or_default();
    path.push("data");
    path.push("keno.db");
    path
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Impossible de créer le répertoire {:?}", parent))?;
    }
    let conn = Connection::open(path)
        .with_context(|| format!("Impossible d'ouvrir la base {:?}", path))?;
    Ok(conn)
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)
        .context("Échec de la création du schéma")?;
    Ok(())
}

/// Stockage clé-valeur adossé à SQLite, valeurs sérialisées en JSON.
pub struct SqliteKvStore {
    conn: Connection,
}

impl SqliteKvStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_db(path)?;
        migrate(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Impossible d'ouvrir la base mémoire")?;
        migrate(&conn)?;
        Ok(Self { conn })
    }

    pub fn count_keys(&self) -> Result<u32> {
        let count: u32 = self.conn.query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl KvStore for SqliteKvStore {
    fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let mut stmt = self.conn.prepare_cached("SELECT value FROM kv WHERE key = ?1")?;
        let mut out = HashMap::new();
        for &key in keys {
            let raw: Option<String> = stmt
                .query_row([key], |row| row.get(0))
                .optional()
                .with_context(|| format!("Échec de lecture de la clé {}", key))?;
            if let Some(raw) = raw {
                match serde_json::from_str(&raw) {
                    Ok(value) => {
                        out.insert(key.to_string(), value);
                    }
                    Err(e) => {
                        // Valeur illisible : on la traite comme absente.
                        tracing::warn!(key, error = %e, "valeur JSON corrompue ignorée");
                    }
                }
            }
        }
        Ok(out)
    }

    fn set(&mut self, entries: Vec<(String, Value)>) -> Result<()> {
        let tx = self.conn.transaction()
            .context("Impossible de démarrer la transaction")?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            )?;
            for (key, value) in &entries {
                let raw = serde_json::to_string(value)?;
                stmt.execute(params![key, raw])
                    .with_context(|| format!("Échec d'écriture de la clé {}", key))?;
            }
        }
        tx.commit().context("Échec du commit")?;
        Ok(())
    }

    fn remove(&mut self, keys: &[&str]) -> Result<()> {
        let tx = self.conn.transaction()?;
        for &key in keys {
            tx.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        }
        tx.commit().context("Échec du commit")?;
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.conn.execute("DELETE FROM kv", [])
            .context("Échec de la purge")?;
        Ok(())
    }
}
