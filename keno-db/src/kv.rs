use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use anyhow::{bail, Result};
use serde_json::Value;

/// Stockage clé-valeur persistant sur lequel repose l'historique.
///
/// Supposé éventuellement cohérent : un `set` réussi n'est pas garanti
/// durable avant l'écriture suivante.
pub trait KvStore {
    /// Retourne les valeurs présentes pour les clés demandées (les absentes sont omises).
    fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>>;
    fn set(&mut self, entries: Vec<(String, Value)>) -> Result<()>;
    fn remove(&mut self, keys: &[&str]) -> Result<()>;
    fn clear(&mut self) -> Result<()>;
}

#[derive(Debug, Default)]
struct MemoryInner {
    values: HashMap<String, Value>,
    writes: usize,
    fail_writes: bool,
}

/// Stockage en mémoire. Les clones partagent les mêmes données, ce qui
/// permet de relire l'état persisté depuis une « nouvelle vue ».
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nombre d'appels `set` réussis.
    pub fn write_count(&self) -> usize {
        self.inner.borrow().writes
    }

    /// Fait échouer les écritures suivantes (simule un stockage indisponible).
    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.borrow_mut().fail_writes = fail;
    }

    pub fn raw(&self, key: &str) -> Option<Value> {
        self.inner.borrow().values.get(key).cloned()
    }

    pub fn insert_raw(&self, key: &str, value: Value) {
        self.inner.borrow_mut().values.insert(key.to_string(), value);
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.borrow().values.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl KvStore for MemoryKvStore {
    fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let inner = self.inner.borrow();
        Ok(keys
            .iter()
            .filter_map(|k| inner.values.get(*k).map(|v| (k.to_string(), v.clone())))
            .collect())
    }

    fn set(&mut self, entries: Vec<(String, Value)>) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_writes {
            bail!("Écriture refusée par le stockage");
        }
        inner.values.extend(entries);
        inner.writes += 1;
        Ok(())
    }

    fn remove(&mut self, keys: &[&str]) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.fail_writes {
            bail!("Suppression refusée par le stockage");
        }
        for k in keys {
            inner.values.remove(*k);
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.inner.borrow_mut().values.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_clones_share_state() {
        let mut a = MemoryKvStore::new();
        let b = a.clone();
        a.set(vec![("k".to_string(), json!(1))]).unwrap();
        assert_eq!(b.get(&["k"]).unwrap().get("k"), Some(&json!(1)));
        assert_eq!(b.write_count(), 1);
    }

    #[test]
    fn test_missing_keys_omitted() {
        let store = MemoryKvStore::new();
        store.insert_raw("a", json!("x"));
        let got = store.get(&["a", "b"]).unwrap();
        assert_eq!(got.len(), 1);
        assert!(got.contains_key("a"));
    }

    #[test]
    fn test_fail_writes() {
        let mut store = MemoryKvStore::new();
        store.set_fail_writes(true);
        assert!(store.set(vec![("k".to_string(), json!(1))]).is_err());
        assert_eq!(store.write_count(), 0);
        store.set_fail_writes(false);
        assert!(store.set(vec![("k".to_string(), json!(1))]).is_ok());
    }

    #[test]
    fn test_remove_and_clear() {
        let mut store = MemoryKvStore::new();
        store.insert_raw("a", json!(1));
        store.insert_raw("b", json!(2));
        store.remove(&["a"]).unwrap();
        assert_eq!(store.keys(), vec!["b".to_string()]);
        store.clear().unwrap();
        assert!(store.keys().is_empty());
    }
}
