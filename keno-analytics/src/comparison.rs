use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use keno_db::models::DrawRound;

use crate::frequency::{cold_numbers, hot_numbers};
use crate::momentum::{MomentumConfig, MomentumDetector};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Frequency,
    Cold,
    Momentum,
}

impl Method {
    pub const ALL: [Method; 3] = [Method::Frequency, Method::Cold, Method::Momentum];
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Frequency => write!(f, "Fréquence"),
            Method::Cold => write!(f, "Froids"),
            Method::Momentum => write!(f, "Momentum"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodResult {
    pub predicted: Vec<u8>,
    pub hits: usize,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonEntry {
    pub round: u64,
    pub results: BTreeMap<Method, MethodResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MethodSummary {
    pub method: Method,
    pub rounds: usize,
    pub total_hits: usize,
    pub avg_hits: f64,
    pub best: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComparisonConfig {
    /// Nombre maximal d'entrées conservées (les plus anciennes sortent).
    pub lookback: usize,
    pub prediction_count: usize,
    /// Fenêtre des méthodes fréquence/froids.
    pub sample_window: usize,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            lookback: 100,
            prediction_count: 10,
            sample_window: 50,
        }
    }
}

fn count_hits(predicted: &[u8], round: &DrawRound) -> usize {
    predicted.iter().filter(|&&n| round.contains(n)).count()
}

/// Compare tour après tour les sorties des différentes méthodes au tirage réel.
pub struct ComparisonTracker {
    config: ComparisonConfig,
    momentum: MomentumDetector,
    active: bool,
    entries: VecDeque<ComparisonEntry>,
}

impl ComparisonTracker {
    pub fn new(config: ComparisonConfig, momentum: MomentumConfig) -> Self {
        let momentum = MomentumDetector::new(MomentumConfig {
            pattern_size: config.prediction_count,
            ..momentum
        });
        Self {
            config,
            momentum,
            active: false,
            entries: VecDeque::new(),
        }
    }

    pub fn start(&mut self) {
        self.active = true;
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn entries(&self) -> &VecDeque<ComparisonEntry> {
        &self.entries
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }

    /// Prédit depuis `history_before` puis compte les numéros trouvés dans `round`.
    pub fn record_round(&mut self, history_before: &[DrawRound], round: &DrawRound) -> Option<&ComparisonEntry> {
        if !self.active {
            return None;
        }

        let count = self.config.prediction_count;
        let window = self.config.sample_window;
        let predictions = [
            (Method::Frequency, hot_numbers(history_before, window, count)),
            (Method::Cold, cold_numbers(history_before, window, count)),
            (Method::Momentum, self.momentum.get_pattern(history_before, round.index)),
        ];

        let results = predictions
            .into_iter()
            .map(|(method, predicted)| {
                let hits = count_hits(&predicted, round);
                let count = predicted.len();
                (method, MethodResult { predicted, hits, count })
            })
            .collect();

        if self.config.lookback == 0 {
            return None;
        }
        while self.entries.len() >= self.config.lookback {
            self.entries.pop_front();
        }
        self.entries.push_back(ComparisonEntry {
            round: round.index,
            results,
        });
        self.entries.back()
    }

    pub fn summary(&self) -> Vec<MethodSummary> {
        Method::ALL
            .iter()
            .map(|&method| {
                let hits: Vec<usize> = self
                    .entries
                    .iter()
                    .filter_map(|e| e.results.get(&method).map(|r| r.hits))
                    .collect();
                let total_hits: usize = hits.iter().sum();
                MethodSummary {
                    method,
                    rounds: hits.len(),
                    total_hits,
                    avg_hits: if hits.is_empty() { 0.0 } else { total_hits as f64 / hits.len() as f64 },
                    best: hits.iter().copied().max().unwrap_or(0),
                }
            })
            .collect()
    }
}
