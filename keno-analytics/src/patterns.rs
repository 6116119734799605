use std::cell::Cell;
use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use keno_db::clock::Clock;
use keno_db::models::{mask_to_numbers, numbers_to_mask, DrawRound};

use crate::cache::{CacheEntry, CacheKey, PatternCache, DEFAULT_MAX_AGE_MS};
use crate::combinations::{binomial, for_each_combination};

pub const MIN_PATTERN_SIZE: usize = 3;
pub const MAX_PATTERN_SIZE: usize = 10;
pub const DEFAULT_DECAY_FACTOR: f64 = 0.98;
/// Au-delà, l'énumération est signalée comme coûteuse.
const ENUMERATION_WARN_COMBINATIONS: u64 = 50_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    pub round_index: u64,
    pub timestamp: i64,
}

/// Un sous-ensemble de k numéros et ses apparitions dans la fenêtre.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternRecord {
    pub numbers: Vec<u8>,
    pub occurrences: Vec<Occurrence>,
    pub count: usize,
    /// Écart moyen entre apparitions ; vaut la taille de la fenêtre sous 2 apparitions.
    pub avg_gap: f64,
    /// Plus bas = plus groupé. Clé de classement, pas une probabilité.
    pub hotness: f64,
    pub last_occurrence_index: u64,
    /// Somme de decay^(tours écoulés) sur les apparitions.
    pub recency_score: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PatternStats {
    pub total_combinations: usize,
    pub avg_appearance: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PatternSort {
    #[default]
    Frequency,
    Recency,
    Hotness,
    Weighted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    pub cache_max_age_ms: i64,
    pub decay_factor: f64,
    /// Fenêtre par défaut de la découverte (0 = tout l'historique).
    pub sample_size: usize,
    pub top_n: usize,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            cache_max_age_ms: DEFAULT_MAX_AGE_MS,
            decay_factor: DEFAULT_DECAY_FACTOR,
            sample_size: 300,
            top_n: 10,
        }
    }
}

/// Taille réelle de la fenêtre : 0 veut dire tout l'historique.
pub fn effective_sample_size(history_len: usize, sample_size: usize) -> usize {
    if sample_size == 0 {
        history_len
    } else {
        sample_size.min(history_len)
    }
}

/// Nombre de k-sous-ensembles visités pour miner `window`.
pub fn enumeration_cost(window: &[DrawRound], k: usize) -> u64 {
    window
        .iter()
        .fold(0u64, |total, round| total.saturating_add(binomial(round.drawn.len(), k)))
}

/// Énumère tous les k-sous-ensembles tirés dans `window` et les classe par fréquence.
///
/// Coût : C(numéros tirés, k) × taille de la fenêtre. C'est à l'appelant de
/// borner la fenêtre.
pub fn mine_patterns(window: &[DrawRound], k: usize, decay_factor: f64) -> (Vec<PatternRecord>, PatternStats) {
    let mut found: HashMap<u64, Vec<Occurrence>> = HashMap::new();

    for round in window {
        let occurrence = Occurrence {
            round_index: round.index,
            timestamp: round.timestamp,
        };
        for_each_combination(&round.drawn, k, |combo| {
            found.entry(numbers_to_mask(combo)).or_default().push(occurrence);
        });
    }

    let window_len = window.len() as f64;
    let newest = window.last().map(|r| r.index).unwrap_or(0);

    let mut records: Vec<PatternRecord> = found
        .into_iter()
        .map(|(mask, occurrences)| {
            let count = occurrences.len();
            let avg_gap = if count < 2 {
                window_len
            } else {
                let span: u64 = occurrences
                    .windows(2)
                    .map(|w| w[1].round_index - w[0].round_index)
                    .sum();
                span as f64 / (count - 1) as f64
            };
            let recency_score = occurrences
                .iter()
                .map(|o| {
                    let ago = (newest - o.round_index).min(i32::MAX as u64) as i32;
                    decay_factor.powi(ago)
                })
                .sum();
            let last_occurrence_index = occurrences.last().map(|o| o.round_index).unwrap_or(0);
            PatternRecord {
                numbers: mask_to_numbers(mask),
                occurrences,
                count,
                avg_gap,
                hotness: avg_gap,
                last_occurrence_index,
                recency_score,
            }
        })
        .collect();

    records.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then(b.last_occurrence_index.cmp(&a.last_occurrence_index))
            .then_with(|| a.numbers.cmp(&b.numbers))
    });

    let stats = PatternStats {
        total_combinations: records.len(),
        avg_appearance: if records.is_empty() {
            0.0
        } else {
            records.iter().map(|r| r.count).sum::<usize>() as f64 / records.len() as f64
        },
    };

    (records, stats)
}

/// Retrie une tranche déjà renvoyée. Ne touche pas au cache.
pub fn sort_patterns(patterns: &mut [PatternRecord], sort: PatternSort) {
    match sort {
        PatternSort::Frequency => patterns.sort_by(|a, b| b.count.cmp(&a.count)),
        PatternSort::Recency => {
            patterns.sort_by(|a, b| b.last_occurrence_index.cmp(&a.last_occurrence_index))
        }
        PatternSort::Hotness => patterns.sort_by(|a, b| a.hotness.total_cmp(&b.hotness)),
        PatternSort::Weighted => patterns.sort_by(|a, b| b.recency_score.total_cmp(&a.recency_score)),
    }
}

pub struct PatternMiner {
    cache: Rc<PatternCache>,
    clock: Rc<dyn Clock>,
    decay_factor: f64,
    enumerations: Cell<u64>,
}

impl PatternMiner {
    pub fn new(config: &PatternConfig, clock: Rc<dyn Clock>) -> Self {
        Self {
            cache: Rc::new(PatternCache::new(config.cache_max_age_ms)),
            clock,
            decay_factor: config.decay_factor,
            enumerations: Cell::new(0),
        }
    }

    /// Le cache partagé, à abonner au store pour qu'il se vide à chaque changement.
    pub fn cache(&self) -> Rc<PatternCache> {
        Rc::clone(&self.cache)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Nombre de minages effectifs (défauts de cache compris).
    pub fn enumeration_count(&self) -> u64 {
        self.enumerations.get()
    }

    pub fn find_patterns(
        &self,
        history: &[DrawRound],
        k: usize,
        top_n: usize,
        sample_size: usize,
        use_cache: bool,
    ) -> Vec<PatternRecord> {
        self.find_patterns_with_stats(history, k, top_n, sample_size, use_cache).0
    }

    pub fn find_patterns_with_stats(
        &self,
        history: &[DrawRound],
        k: usize,
        top_n: usize,
        sample_size: usize,
        use_cache: bool,
    ) -> (Vec<PatternRecord>, PatternStats) {
        if !(MIN_PATTERN_SIZE..=MAX_PATTERN_SIZE).contains(&k) {
            tracing::warn!(k, "taille de pattern invalide (3-10), résultat vide");
            return (Vec::new(), PatternStats::default());
        }

        let effective = effective_sample_size(history.len(), sample_size);
        let key = CacheKey {
            pattern_size: k,
            history_len: history.len(),
            sample_size: effective,
        };
        let now = self.clock.now_ms();

        if use_cache {
            if let Some(entry) = self.cache.get(&key, now) {
                tracing::debug!(?key, "patterns servis depuis le cache");
                return (entry.patterns.iter().take(top_n).cloned().collect(), entry.stats);
            }
        }

        let window = &history[history.len() - effective..];
        let cost = enumeration_cost(window, k);
        if cost > ENUMERATION_WARN_COMBINATIONS {
            tracing::warn!(k, window = effective, cost, "énumération coûteuse, réduire la fenêtre");
        }
        self.enumerations.set(self.enumerations.get() + 1);
        let (patterns, stats) = mine_patterns(window, k, self.decay_factor);
        tracing::debug!(
            k,
            window = effective,
            visited = cost,
            combinations = stats.total_combinations,
            "patterns recalculés"
        );

        let top = patterns.iter().take(top_n).cloned().collect();
        self.cache.set(
            key,
            CacheEntry {
                patterns: Rc::new(patterns),
                stats,
                computed_at: now,
            },
        );
        (top, stats)
    }
}
