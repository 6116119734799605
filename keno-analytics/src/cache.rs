use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use keno_db::store::{HistoryEvent, HistoryListener};

use crate::patterns::{PatternRecord, PatternStats};

pub const DEFAULT_MAX_AGE_MS: i64 = 5 * 60 * 1000;

/// Identité d'un résultat de minage. La longueur d'historique change à chaque
/// ajout, les anciennes clés deviennent donc inatteignables d'elles-mêmes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub pattern_size: usize,
    pub history_len: usize,
    pub sample_size: usize,
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub patterns: Rc<Vec<PatternRecord>>,
    pub stats: PatternStats,
    pub computed_at: i64,
}

/// Cache des résultats complets (non tronqués) du mineur de patterns.
///
/// On n'y fait qu'ajouter des entrées ou tout vider.
#[derive(Debug)]
pub struct PatternCache {
    entries: RefCell<HashMap<CacheKey, CacheEntry>>,
    max_age_ms: i64,
}

impl PatternCache {
    pub fn new(max_age_ms: i64) -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
            max_age_ms,
        }
    }

    pub fn get(&self, key: &CacheKey, now_ms: i64) -> Option<CacheEntry> {
        let entries = self.entries.borrow();
        let entry = entries.get(key)?;
        if now_ms - entry.computed_at < self.max_age_ms {
            Some(entry.clone())
        } else {
            None
        }
    }

    pub fn set(&self, key: CacheKey, entry: CacheEntry) {
        self.entries.borrow_mut().insert(key, entry);
    }

    pub fn clear(&self) {
        self.entries.replace(HashMap::new());
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl Default for PatternCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_AGE_MS)
    }
}

impl HistoryListener for PatternCache {
    fn on_history_event(&self, event: &HistoryEvent) {
        tracing::debug!(?event, entries = self.len(), "purge du cache de patterns");
        self.clear();
    }
}
