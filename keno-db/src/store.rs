use std::rc::Rc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::clock::Clock;
use crate::kv::KvStore;
use crate::models::{DrawRound, LegacyRound, NewRound};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_DEBOUNCE_MS: i64 = 100;

pub const META_KEY: &str = "history_meta";
/// Ancien format : tous les tours dans une seule valeur.
pub const LEGACY_KEY: &str = "history";

const META_VERSION: u32 = 1;

pub fn chunk_key(chunk_index: usize) -> String {
    format!("history_chunk_{}", chunk_index)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub chunk_size: usize,
    pub debounce_ms: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            debounce_ms: DEFAULT_DEBOUNCE_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HistoryMeta {
    version: u32,
    chunk_size: usize,
    total_rounds: u64,
    chunk_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEvent {
    Appended { index: u64, total: usize },
    Cleared,
    Reloaded { total: usize },
}

/// Abonné aux changements de l'historique (invalidation de cache, rafraîchissement UI).
/// Purement indicatif : le store ne dépend pas de ce que font les abonnés.
pub trait HistoryListener {
    fn on_history_event(&self, event: &HistoryEvent);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    NoLegacyData,
    /// Des chunks existent déjà : l'ancien blob est laissé tel quel.
    AlreadyChunked,
    Migrated { rounds: usize },
}

#[derive(Debug, Clone, Copy)]
struct PendingWrite {
    chunk_index: usize,
    due_at: i64,
}

/// Journal des tours, append-only, persisté par chunks de taille fixe.
///
/// La séquence en mémoire fait foi : une écriture ratée est journalisée
/// et la prochaine écriture réussie réécrit tous les chunks depuis le
/// plus ancien non persisté.
pub struct HistoryStore<S: KvStore> {
    kv: S,
    config: StoreConfig,
    clock: Rc<dyn Clock>,
    rounds: Vec<DrawRound>,
    next_index: u64,
    pending: Option<PendingWrite>,
    /// Mémoire lue depuis l'ancien blob, aucun chunk encore écrit.
    legacy_backed: bool,
    /// Plus ancien chunk dont la dernière écriture a échoué (ou jamais écrit).
    dirty_from: Option<usize>,
    listeners: Vec<Rc<dyn HistoryListener>>,
    write_failures: usize,
}

impl<S: KvStore> HistoryStore<S> {
    pub fn open(kv: S, config: StoreConfig, clock: Rc<dyn Clock>) -> Result<Self> {
        let mut config = config;
        config.chunk_size = config.chunk_size.max(1);
        let mut store = Self {
            kv,
            config,
            clock,
            rounds: Vec::new(),
            next_index: 0,
            pending: None,
            legacy_backed: false,
            dirty_from: None,
            listeners: Vec::new(),
            write_failures: 0,
        };
        store.load_all()?;
        Ok(store)
    }

    pub fn subscribe(&mut self, listener: Rc<dyn HistoryListener>) {
        self.listeners.push(listener);
    }

    pub fn rounds(&self) -> &[DrawRound] {
        &self.rounds
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    pub fn chunk_size(&self) -> usize {
        self.config.chunk_size
    }

    pub fn write_failures(&self) -> usize {
        self.write_failures
    }

    pub fn has_pending_write(&self) -> bool {
        self.pending.is_some()
    }

    pub fn kv(&self) -> &S {
        &self.kv
    }

    /// Plus ancien chunk à réécrire à la prochaine écriture, s'il y en a un.
    pub fn dirty_from(&self) -> Option<usize> {
        self.dirty_from
    }

    pub fn chunk_count(&self) -> usize {
        if self.next_index == 0 {
            0
        } else {
            self.chunk_of(self.next_index - 1) + 1
        }
    }

    /// Tours en mémoire appartenant au chunk `chunk_index`.
    pub fn chunk(&self, chunk_index: usize) -> &[DrawRound] {
        let start = (chunk_index * self.config.chunk_size) as u64;
        let end = start + self.config.chunk_size as u64;
        let lo = self.rounds.partition_point(|r| r.index < start);
        let hi = self.rounds.partition_point(|r| r.index < end);
        &self.rounds[lo..hi]
    }

    fn chunk_of(&self, index: u64) -> usize {
        (index / self.config.chunk_size as u64) as usize
    }

    /// Ajoute un tour. Visible immédiatement en mémoire ; l'écriture du chunk
    /// est différée (debounce) et regroupée avec les ajouts suivants.
    pub fn append(&mut self, round: NewRound) -> u64 {
        let index = self.next_index;
        self.next_index += 1;
        self.rounds.push(round.into_round(index));
        self.schedule_write(self.chunk_of(index));
        self.notify(&HistoryEvent::Appended {
            index,
            total: self.rounds.len(),
        });
        index
    }

    fn schedule_write(&mut self, chunk_index: usize) {
        if let Some(pending) = self.pending {
            if pending.chunk_index != chunk_index {
                // Le chunk précédent part avant : les écritures ne se croisent jamais.
                let _ = self.write_pending();
            }
        }
        self.pending = Some(PendingWrite {
            chunk_index,
            due_at: self.clock.now_ms() + self.config.debounce_ms,
        });
    }

    /// Tâche planifiée : écrit le chunk en attente si son délai est écoulé.
    pub fn poll(&mut self) -> bool {
        match self.pending {
            Some(pending) if self.clock.now_ms() >= pending.due_at => {
                let _ = self.write_pending();
                true
            }
            _ => false,
        }
    }

    /// Écrit immédiatement le chunk en attente, s'il y en a un.
    pub fn flush(&mut self) -> Result<()> {
        self.write_pending()
    }

    fn write_pending(&mut self) -> Result<()> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let result = self.write_chunks(pending.chunk_index);
        if let Err(e) = &result {
            self.write_failures += 1;
            let lowest = self.dirty_from.map_or(pending.chunk_index, |d| d.min(pending.chunk_index));
            self.dirty_from = Some(lowest);
            tracing::warn!(chunk = pending.chunk_index, error = %e, "échec d'écriture du chunk, pas de nouvelle tentative");
        }
        result
    }

    fn write_chunks(&mut self, chunk_index: usize) -> Result<()> {
        let first = self.dirty_from.map_or(chunk_index, |d| d.min(chunk_index));
        let mut entries = Vec::with_capacity(chunk_index - first + 2);
        for i in first..=chunk_index {
            let value = serde_json::to_value(self.chunk(i))
                .context("Sérialisation du chunk impossible")?;
            entries.push((chunk_key(i), value));
        }
        entries.push((META_KEY.to_string(), self.meta_value()?));
        self.kv.set(entries)
            .with_context(|| format!("Échec de persistance du chunk {}", chunk_index))?;
        self.legacy_backed = false;
        self.dirty_from = None;
        tracing::debug!(first, chunk = chunk_index, total = self.next_index, "chunk persisté");
        Ok(())
    }

    fn meta_value(&self) -> Result<Value> {
        let meta = HistoryMeta {
            version: META_VERSION,
            chunk_size: self.config.chunk_size,
            total_rounds: self.next_index,
            chunk_count: self.chunk_count(),
        };
        Ok(serde_json::to_value(meta)?)
    }

    /// Reconstruit la séquence en mémoire depuis les chunks 0..N.
    ///
    /// Un chunk absent ou corrompu est lu comme vide. Sans chunks, l'ancien
    /// blob est lu tel quel (sans migration).
    pub fn load_all(&mut self) -> Result<&[DrawRound]> {
        if self.pending.is_some() {
            let _ = self.write_pending();
        }

        let meta = self.read_meta()?;
        let mut rounds = match &meta {
            Some(meta) => {
                if meta.chunk_size != self.config.chunk_size {
                    tracing::warn!(
                        persisted = meta.chunk_size,
                        configured = self.config.chunk_size,
                        "taille de chunk persistée différente, elle est conservée"
                    );
                    self.config.chunk_size = meta.chunk_size.max(1);
                }
                self.read_chunks(meta.chunk_count)?
            }
            None => self.scan_chunks()?,
        };

        self.legacy_backed = false;
        self.dirty_from = None;
        if meta.is_none() && rounds.is_empty() {
            rounds = self.read_legacy()?;
            self.legacy_backed = !rounds.is_empty();
            if self.legacy_backed {
                self.dirty_from = Some(0);
            }
        }

        let after_last = rounds.last().map(|r| r.index + 1).unwrap_or(0);
        self.next_index = meta.map(|m| m.total_rounds).unwrap_or(0).max(after_last);
        self.rounds = rounds;

        tracing::info!(rounds = self.rounds.len(), next_index = self.next_index, "historique chargé");
        self.notify(&HistoryEvent::Reloaded { total: self.rounds.len() });
        Ok(&self.rounds)
    }

    fn read_meta(&self) -> Result<Option<HistoryMeta>> {
        let got = self.kv.get(&[META_KEY]).context("Lecture des métadonnées impossible")?;
        Ok(got.get(META_KEY).and_then(|v| match serde_json::from_value(v.clone()) {
            Ok(meta) => Some(meta),
            Err(e) => {
                tracing::warn!(error = %e, "métadonnées illisibles, recherche des chunks");
                None
            }
        }))
    }

    fn read_chunks(&self, chunk_count: usize) -> Result<Vec<DrawRound>> {
        let keys: Vec<String> = (0..chunk_count).map(chunk_key).collect();
        let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let mut got = self.kv.get(&key_refs).context("Lecture des chunks impossible")?;

        let mut rounds = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            match got.remove(key) {
                Some(value) => rounds.extend(parse_chunk(i, value)),
                None => tracing::warn!(chunk = i, "chunk manquant, considéré vide"),
            }
        }
        Ok(rounds)
    }

    fn scan_chunks(&self) -> Result<Vec<DrawRound>> {
        let mut rounds = Vec::new();
        for i in 0.. {
            let key = chunk_key(i);
            let mut got = self.kv.get(&[key.as_str()]).context("Lecture des chunks impossible")?;
            match got.remove(&key) {
                Some(value) => rounds.extend(parse_chunk(i, value)),
                None => break,
            }
        }
        Ok(rounds)
    }

    fn read_legacy(&self) -> Result<Vec<DrawRound>> {
        let got = self.kv.get(&[LEGACY_KEY]).context("Lecture de l'historique hérité impossible")?;
        let Some(value) = got.get(LEGACY_KEY) else {
            return Ok(Vec::new());
        };
        match parse_legacy(value.clone()) {
            Ok(rounds) => Ok(rounds),
            Err(e) => {
                tracing::warn!(error = %e, "historique hérité illisible, ignoré");
                Ok(Vec::new())
            }
        }
    }

    /// Convertit l'ancien blob unique en chunks. À appeler une fois au démarrage.
    ///
    /// En cas d'échec l'ancien blob n'est pas touché.
    pub fn migrate(&mut self) -> Result<MigrationOutcome> {
        let first_chunk = chunk_key(0);
        let got = self.kv.get(&[LEGACY_KEY, META_KEY, first_chunk.as_str()])
            .context("Lecture avant migration impossible")?;
        let Some(legacy) = got.get(LEGACY_KEY) else {
            return Ok(MigrationOutcome::NoLegacyData);
        };
        if got.contains_key(META_KEY) || got.contains_key(&first_chunk) {
            tracing::warn!("historique hérité présent mais des chunks existent déjà, migration ignorée");
            return Ok(MigrationOutcome::AlreadyChunked);
        }

        let parsed = parse_legacy(legacy.clone())?;
        // Mémoire lue depuis ce blob : elle contient aussi les ajouts pas encore écrits.
        let rounds = if self.legacy_backed { self.rounds.clone() } else { parsed };
        let next_index = if self.legacy_backed {
            self.next_index
        } else {
            rounds.last().map(|r| r.index + 1).unwrap_or(0)
        };
        let chunk_size = self.config.chunk_size;
        let mut entries = Vec::new();
        for (i, chunk) in rounds.chunks(chunk_size).enumerate() {
            entries.push((chunk_key(i), serde_json::to_value(chunk)?));
        }
        let meta = HistoryMeta {
            version: META_VERSION,
            chunk_size,
            total_rounds: next_index,
            chunk_count: (next_index as usize).div_ceil(chunk_size),
        };
        entries.push((META_KEY.to_string(), serde_json::to_value(meta)?));
        self.kv.set(entries).context("Échec d'écriture des chunks migrés")?;

        if let Err(e) = self.kv.remove(&[LEGACY_KEY]) {
            // Les chunks font désormais foi ; le blob restant sera ignoré.
            tracing::warn!(error = %e, "suppression de l'historique hérité impossible");
        }

        let count = rounds.len();
        self.pending = None;
        self.legacy_backed = false;
        self.dirty_from = None;
        self.next_index = next_index;
        self.rounds = rounds;
        tracing::info!(rounds = count, "historique hérité migré en chunks");
        self.notify(&HistoryEvent::Reloaded { total: count });
        Ok(MigrationOutcome::Migrated { rounds: count })
    }

    /// Efface tout l'historique, persisté et en mémoire.
    pub fn clear(&mut self) -> Result<()> {
        self.kv.clear().context("Échec de l'effacement de l'historique")?;
        self.rounds.clear();
        self.next_index = 0;
        self.pending = None;
        self.legacy_backed = false;
        self.dirty_from = None;
        tracing::info!("historique effacé");
        self.notify(&HistoryEvent::Cleared);
        Ok(())
    }

    fn notify(&self, event: &HistoryEvent) {
        for listener in &self.listeners {
            listener.on_history_event(event);
        }
    }
}

fn parse_chunk(chunk_index: usize, value: Value) -> Vec<DrawRound> {
    match serde_json::from_value::<Vec<DrawRound>>(value) {
        Ok(rounds) => rounds,
        Err(e) => {
            tracing::warn!(chunk = chunk_index, error = %e, "chunk corrompu, considéré vide");
            Vec::new()
        }
    }
}

fn parse_legacy(value: Value) -> Result<Vec<DrawRound>> {
    let legacy: Vec<LegacyRound> = serde_json::from_value(value)
        .context("Historique hérité illisible")?;
    Ok(legacy
        .into_iter()
        .enumerate()
        .map(|(i, r)| r.into_new_round().into_round(i as u64))
        .collect())
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;

    use super::*;
    use crate::clock::ManualClock;
    use crate::kv::MemoryKvStore;

    fn new_round(i: u64) -> NewRound {
        let base = (i % 30) as u8;
        let drawn: Vec<u8> = (1..=10).map(|k| base + k).collect();
        NewRound::new(1_000 + i as i64, &drawn, &[1, 2, 3])
    }

    fn open_with(kv: &MemoryKvStore, chunk_size: usize) -> (HistoryStore<MemoryKvStore>, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::new(0));
        let config = StoreConfig { chunk_size, debounce_ms: 100 };
        let store = HistoryStore::open(kv.clone(), config, clock.clone()).unwrap();
        (store, clock)
    }

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<HistoryEvent>>,
    }

    impl HistoryListener for Recorder {
        fn on_history_event(&self, event: &HistoryEvent) {
            self.events.borrow_mut().push(event.clone());
        }
    }

    #[test]
    fn test_append_order_across_chunks() {
        let kv = MemoryKvStore::new();
        let (mut store, _) = open_with(&kv, DEFAULT_CHUNK_SIZE);
        let n = 2 * DEFAULT_CHUNK_SIZE + 17;
        for i in 0..n as u64 {
            assert_eq!(store.append(new_round(i)), i);
        }
        store.flush().unwrap();

        let (reloaded, _) = open_with(&kv, DEFAULT_CHUNK_SIZE);
        assert_eq!(reloaded.len(), n);
        for (pos, r) in reloaded.rounds().iter().enumerate() {
            assert_eq!(r.index, pos as u64);
        }
        assert_eq!(reloaded.chunk_count(), 3);
        assert_eq!(reloaded.chunk(2).len(), 17);
        assert_eq!(reloaded.next_index(), n as u64);
    }

    #[test]
    fn test_reload_is_identical() {
        let kv = MemoryKvStore::new();
        let (mut store, _) = open_with(&kv, 7);
        for i in 0..30 {
            store.append(new_round(i));
        }
        store.flush().unwrap();
        let original = store.rounds().to_vec();

        let (reloaded, _) = open_with(&kv, 7);
        assert_eq!(reloaded.rounds(), original.as_slice());
    }

    #[test]
    fn test_append_visible_immediately() {
        let kv = MemoryKvStore::new();
        let (mut store, _) = open_with(&kv, 10);
        store.append(new_round(0));
        assert_eq!(store.len(), 1);
        assert_eq!(kv.write_count(), 0);
        assert!(store.has_pending_write());
    }

    #[test]
    fn test_debounce_coalesces_writes() {
        let kv = MemoryKvStore::new();
        let (mut store, clock) = open_with(&kv, 100);
        for i in 0..5 {
            store.append(new_round(i));
        }
        assert!(!store.poll());
        assert_eq!(kv.write_count(), 0);

        clock.advance(100);
        assert!(store.poll());
        assert_eq!(kv.write_count(), 1);
        assert!(!store.poll());

        let chunk = kv.raw(&chunk_key(0)).unwrap();
        assert_eq!(chunk.as_array().unwrap().len(), 5);
    }

    #[test]
    fn test_new_append_restarts_debounce() {
        let kv = MemoryKvStore::new();
        let (mut store, clock) = open_with(&kv, 100);
        store.append(new_round(0));
        clock.advance(60);
        store.append(new_round(1));
        clock.advance(60);
        assert!(!store.poll());
        clock.advance(40);
        assert!(store.poll());
        assert_eq!(kv.write_count(), 1);
    }

    #[test]
    fn test_chunk_boundary_flushes_previous_chunk_first() {
        let kv = MemoryKvStore::new();
        let (mut store, _) = open_with(&kv, 3);
        for i in 0..4 {
            store.append(new_round(i));
        }
        assert_eq!(kv.write_count(), 1);
        assert_eq!(kv.raw(&chunk_key(0)).unwrap().as_array().unwrap().len(), 3);
        assert!(kv.raw(&chunk_key(1)).is_none());

        store.flush().unwrap();
        assert_eq!(kv.raw(&chunk_key(1)).unwrap().as_array().unwrap().len(), 1);
        let meta = kv.raw(META_KEY).unwrap();
        assert_eq!(meta["total_rounds"], json!(4));
        assert_eq!(meta["chunk_count"], json!(2));
    }

    #[test]
    fn test_write_failure_keeps_memory() {
        let kv = MemoryKvStore::new();
        let (mut store, _) = open_with(&kv, 10);
        kv.set_fail_writes(true);
        store.append(new_round(0));
        assert!(store.flush().is_err());
        assert_eq!(store.write_failures(), 1);
        assert_eq!(store.len(), 1);
        assert!(!store.has_pending_write());

        kv.set_fail_writes(false);
        store.append(new_round(1));
        store.flush().unwrap();

        let (reloaded, _) = open_with(&kv, 10);
        assert_eq!(reloaded.len(), 2);
    }

    #[test]
    fn test_failure_at_chunk_boundary_is_rewritten_later() {
        let kv = MemoryKvStore::new();
        let (mut store, _) = open_with(&kv, 3);
        for i in 0..3 {
            store.append(new_round(i));
        }
        kv.set_fail_writes(true);
        // Passage au chunk 1 : l'écriture du chunk 0 échoue.
        store.append(new_round(3));
        assert_eq!(store.write_failures(), 1);
        assert_eq!(store.dirty_from(), Some(0));

        kv.set_fail_writes(false);
        store.append(new_round(4));
        store.append(new_round(5));
        store.flush().unwrap();
        assert_eq!(store.dirty_from(), None);

        let (reloaded, _) = open_with(&kv, 3);
        assert_eq!(reloaded.len(), 6);
        assert_eq!(reloaded.rounds(), store.rounds());
    }

    #[test]
    fn test_corrupt_chunk_is_empty() {
        let kv = MemoryKvStore::new();
        let (mut store, _) = open_with(&kv, 5);
        for i in 0..15 {
            store.append(new_round(i));
        }
        store.flush().unwrap();
        kv.insert_raw(&chunk_key(1), json!("garbage"));

        let (mut reloaded, _) = open_with(&kv, 5);
        assert_eq!(reloaded.len(), 10);
        assert_eq!(reloaded.next_index(), 15);
        assert!(reloaded.chunk(1).is_empty());
        assert_eq!(reloaded.append(new_round(15)), 15);
    }

    #[test]
    fn test_missing_meta_scans_chunks() {
        let kv = MemoryKvStore::new();
        let (mut store, _) = open_with(&kv, 5);
        for i in 0..12 {
            store.append(new_round(i));
        }
        store.flush().unwrap();
        kv.insert_raw(META_KEY, json!(null));

        let (reloaded, _) = open_with(&kv, 5);
        assert_eq!(reloaded.len(), 12);
        assert_eq!(reloaded.next_index(), 12);
    }

    fn legacy_blob(n: usize) -> Value {
        let rounds: Vec<Value> = (0..n)
            .map(|i| json!({"hits": [1, 2], "misses": [10 + (i % 20) as u8, 35], "time": i as i64}))
            .collect();
        Value::Array(rounds)
    }

    #[test]
    fn test_legacy_blob_read_without_migration() {
        let kv = MemoryKvStore::new();
        kv.insert_raw(LEGACY_KEY, legacy_blob(8));
        let (store, _) = open_with(&kv, 3);
        assert_eq!(store.len(), 8);
        assert_eq!(store.rounds()[0].drawn, vec![1, 2, 10, 35]);
        assert_eq!(kv.keys(), vec![LEGACY_KEY.to_string()]);
    }

    #[test]
    fn test_migrate_legacy_blob() {
        let kv = MemoryKvStore::new();
        kv.insert_raw(LEGACY_KEY, legacy_blob(8));
        let (mut store, _) = open_with(&kv, 3);
        let before = store.rounds().to_vec();

        assert_eq!(store.migrate().unwrap(), MigrationOutcome::Migrated { rounds: 8 });
        assert!(kv.raw(LEGACY_KEY).is_none());
        assert!(kv.raw(&chunk_key(2)).is_some());

        let (reloaded, _) = open_with(&kv, 3);
        assert_eq!(reloaded.rounds(), before.as_slice());
        assert_eq!(reloaded.next_index(), 8);
    }

    #[test]
    fn test_migrate_keeps_appends_made_on_legacy_history() {
        let kv = MemoryKvStore::new();
        kv.insert_raw(LEGACY_KEY, legacy_blob(4));
        let (mut store, _) = open_with(&kv, 3);
        assert_eq!(store.append(new_round(4)), 4);
        assert!(store.has_pending_write());

        assert_eq!(store.migrate().unwrap(), MigrationOutcome::Migrated { rounds: 5 });
        assert_eq!(store.len(), 5);
        assert_eq!(store.next_index(), 5);
        assert!(!store.has_pending_write());

        let (reloaded, _) = open_with(&kv, 3);
        assert_eq!(reloaded.len(), 5);
        assert_eq!(reloaded.rounds()[4].timestamp, 1_004);
        assert_eq!(kv.raw(META_KEY).unwrap()["total_rounds"], json!(5));
    }

    #[test]
    fn test_migrate_unreadable_legacy_left_untouched() {
        let kv = MemoryKvStore::new();
        kv.insert_raw(LEGACY_KEY, json!({"not": "a list"}));
        let (mut store, _) = open_with(&kv, 3);
        assert!(store.is_empty());
        assert!(store.migrate().is_err());
        assert_eq!(kv.raw(LEGACY_KEY), Some(json!({"not": "a list"})));
        assert_eq!(kv.keys().len(), 1);
    }

    #[test]
    fn test_migrate_without_legacy_or_with_chunks() {
        let kv = MemoryKvStore::new();
        let (mut store, _) = open_with(&kv, 3);
        assert_eq!(store.migrate().unwrap(), MigrationOutcome::NoLegacyData);

        store.append(new_round(0));
        store.flush().unwrap();
        kv.insert_raw(LEGACY_KEY, legacy_blob(2));
        assert_eq!(store.migrate().unwrap(), MigrationOutcome::AlreadyChunked);
        assert!(kv.raw(LEGACY_KEY).is_some());
    }

    #[test]
    fn test_append_on_legacy_history_writes_every_chunk() {
        let kv = MemoryKvStore::new();
        kv.insert_raw(LEGACY_KEY, legacy_blob(7));
        let (mut store, _) = open_with(&kv, 3);
        assert_eq!(store.append(new_round(7)), 7);
        store.flush().unwrap();

        let (reloaded, _) = open_with(&kv, 3);
        assert_eq!(reloaded.len(), 8);
        assert_eq!(reloaded.chunk_count(), 3);
    }

    #[test]
    fn test_clear_erases_everything() {
        let kv = MemoryKvStore::new();
        let (mut store, _) = open_with(&kv, 3);
        for i in 0..5 {
            store.append(new_round(i));
        }
        store.flush().unwrap();
        store.append(new_round(5));
        store.clear().unwrap();

        assert!(store.is_empty());
        assert_eq!(store.next_index(), 0);
        assert!(!store.has_pending_write());
        assert!(kv.keys().is_empty());
        assert_eq!(store.append(new_round(0)), 0);
    }

    #[test]
    fn test_listeners_notified() {
        let kv = MemoryKvStore::new();
        let (mut store, _) = open_with(&kv, 3);
        let recorder = Rc::new(Recorder::default());
        store.subscribe(recorder.clone());

        store.append(new_round(0));
        store.clear().unwrap();

        let events = recorder.events.borrow();
        assert_eq!(
            *events,
            vec![HistoryEvent::Appended { index: 0, total: 1 }, HistoryEvent::Cleared]
        );
    }
}
