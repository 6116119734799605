use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use keno_db::models::{DrawRound, MAX_NUMBER};

/// Momentum d'un numéro absent de la fenêtre de référence mais vu récemment.
pub const MOMENTUM_SENTINEL: f64 = 999.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumConfig {
    pub pattern_size: usize,
    pub detection_window: usize,
    pub baseline_window: usize,
    pub momentum_threshold: f64,
    pub refresh_frequency: u64,
    pub top_n_pool: usize,
    /// Graine du tirage aléatoire de secours (historique vide).
    pub seed: Option<u64>,
}

impl Default for MomentumConfig {
    fn default() -> Self {
        Self {
            pattern_size: 10,
            detection_window: 5,
            baseline_window: 50,
            momentum_threshold: 1.5,
            refresh_frequency: 5,
            top_n_pool: 15,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HotNumber {
    pub number: u8,
    pub momentum: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NumberMomentum {
    pub number: u8,
    /// `None` quand l'historique est plus court que la fenêtre de référence.
    pub momentum: Option<f64>,
    pub is_hot: bool,
}

/// Occurrences de chaque numéro dans les `window` derniers tours (indice = numéro).
fn tail_counts(history: &[DrawRound], window: usize) -> [u32; MAX_NUMBER as usize + 1] {
    let mut counts = [0u32; MAX_NUMBER as usize + 1];
    let start = history.len().saturating_sub(window);
    for round in &history[start..] {
        for &n in &round.drawn {
            if n <= MAX_NUMBER {
                counts[n as usize] += 1;
            }
        }
    }
    counts
}

fn momentum_from_counts(recent: u32, baseline: u32, detection_window: usize, baseline_window: usize) -> f64 {
    let recent_freq = recent as f64 / detection_window as f64;
    let baseline_freq = baseline as f64 / baseline_window as f64;
    if baseline_freq == 0.0 {
        if recent > 0 { MOMENTUM_SENTINEL } else { 0.0 }
    } else {
        recent_freq / baseline_freq
    }
}

/// Détecteur de numéros dont la fréquence récente accélère par rapport à
/// leur propre référence.
///
/// Le pattern courant n'est recalculé qu'aux tours de rafraîchissement ;
/// entre deux, la même grille est renvoyée volontairement.
pub struct MomentumDetector {
    config: MomentumConfig,
    current_pattern: Vec<u8>,
    last_refresh_round: Option<u64>,
    force: bool,
    refreshes: u64,
    rng: StdRng,
}

impl MomentumDetector {
    pub fn new(config: MomentumConfig) -> Self {
        let mut config = config;
        config.detection_window = config.detection_window.max(1);
        config.baseline_window = config.baseline_window.max(1);
        config.pattern_size = config.pattern_size.min(MAX_NUMBER as usize);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            config,
            current_pattern: Vec::new(),
            last_refresh_round: None,
            force: false,
            refreshes: 0,
            rng,
        }
    }

    pub fn config(&self) -> &MomentumConfig {
        &self.config
    }

    pub fn current_pattern(&self) -> &[u8] {
        &self.current_pattern
    }

    pub fn last_refresh_round(&self) -> Option<u64> {
        self.last_refresh_round
    }

    pub fn refresh_count(&self) -> u64 {
        self.refreshes
    }

    /// Le prochain `get_pattern` recalculera quel que soit le tour.
    pub fn force_refresh(&mut self) {
        self.force = true;
    }

    pub fn get_pattern(&mut self, history: &[DrawRound], current_round: u64) -> Vec<u8> {
        let frequency = self.config.refresh_frequency;
        let should_refresh = self.current_pattern.is_empty()
            || self.force
            || frequency == 0
            || current_round % frequency == 0;

        if should_refresh {
            if history.len() < self.config.baseline_window {
                return self.fallback_pattern(history);
            }
            self.current_pattern = self.generate_pattern(history);
            self.last_refresh_round = Some(current_round);
            self.force = false;
            self.refreshes += 1;
            tracing::debug!(round = current_round, pattern = ?self.current_pattern, "pattern momentum rafraîchi");
        }

        self.current_pattern.clone()
    }

    /// Numéros chauds en tête, complétés par les plus fréquents, triés par valeur.
    pub fn generate_pattern(&self, history: &[DrawRound]) -> Vec<u8> {
        let size = self.config.pattern_size;
        let mut pattern: Vec<u8> = self
            .identify_hot_numbers(history)
            .into_iter()
            .take(self.config.top_n_pool)
            .take(size)
            .map(|h| h.number)
            .collect();

        if pattern.len() < size {
            let fill = self.most_frequent_numbers(history, size - pattern.len(), &pattern);
            pattern.extend(fill);
        }

        pattern.sort_unstable();
        pattern
    }

    pub fn calculate_momentum(&self, number: u8, history: &[DrawRound]) -> Option<f64> {
        if history.len() < self.config.baseline_window || number == 0 || number > MAX_NUMBER {
            return None;
        }
        let recent = tail_counts(history, self.config.detection_window)[number as usize];
        let baseline = tail_counts(history, self.config.baseline_window)[number as usize];
        Some(momentum_from_counts(
            recent,
            baseline,
            self.config.detection_window,
            self.config.baseline_window,
        ))
    }

    fn momentum_table(&self, history: &[DrawRound]) -> Option<Vec<f64>> {
        if history.len() < self.config.baseline_window {
            return None;
        }
        let recent = tail_counts(history, self.config.detection_window);
        let baseline = tail_counts(history, self.config.baseline_window);
        Some(
            (1..=MAX_NUMBER as usize)
                .map(|n| {
                    momentum_from_counts(
                        recent[n],
                        baseline[n],
                        self.config.detection_window,
                        self.config.baseline_window,
                    )
                })
                .collect(),
        )
    }

    /// Numéros au-dessus du seuil, momentum décroissant (à égalité, numéro croissant).
    pub fn identify_hot_numbers(&self, history: &[DrawRound]) -> Vec<HotNumber> {
        let Some(table) = self.momentum_table(history) else {
            return Vec::new();
        };
        let mut hot: Vec<HotNumber> = table
            .iter()
            .enumerate()
            .filter(|(_, &m)| m >= self.config.momentum_threshold)
            .map(|(i, &momentum)| HotNumber {
                number: (i + 1) as u8,
                momentum,
            })
            .collect();
        hot.sort_by(|a, b| b.momentum.total_cmp(&a.momentum));
        hot
    }

    /// Momentum des 40 numéros, décroissant.
    pub fn all_momentum_values(&self, history: &[DrawRound]) -> Vec<NumberMomentum> {
        let table = self.momentum_table(history);
        let mut values: Vec<NumberMomentum> = (1..=MAX_NUMBER)
            .map(|number| {
                let momentum = table.as_ref().map(|t| t[(number - 1) as usize]);
                NumberMomentum {
                    number,
                    momentum,
                    is_hot: momentum.is_some_and(|m| m >= self.config.momentum_threshold),
                }
            })
            .collect();
        values.sort_by(|a, b| b.momentum.unwrap_or(0.0).total_cmp(&a.momentum.unwrap_or(0.0)));
        values
    }

    /// Les `count` numéros les plus fréquents de la fenêtre de référence, hors `exclude`.
    pub fn most_frequent_numbers(&self, history: &[DrawRound], count: usize, exclude: &[u8]) -> Vec<u8> {
        let counts = tail_counts(history, self.config.baseline_window);
        let mut candidates: Vec<u8> = (1..=MAX_NUMBER).filter(|n| !exclude.contains(n)).collect();
        candidates.sort_by(|a, b| counts[*b as usize].cmp(&counts[*a as usize]));
        candidates.truncate(count);
        candidates
    }

    fn fallback_pattern(&mut self, history: &[DrawRound]) -> Vec<u8> {
        let mut pattern = if history.is_empty() {
            let mut numbers: Vec<u8> = (1..=MAX_NUMBER).collect();
            numbers.shuffle(&mut self.rng);
            numbers.truncate(self.config.pattern_size);
            numbers
        } else {
            self.most_frequent_numbers(history, self.config.pattern_size, &[])
        };
        tracing::debug!(
            rounds = history.len(),
            needed = self.config.baseline_window,
            "historique insuffisant, pattern de secours"
        );
        pattern.sort_unstable();
        pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keno_db::models::make_test_rounds;

    fn round(index: u64, drawn: &[u8]) -> DrawRound {
        DrawRound {
            index,
            timestamp: 0,
            drawn: drawn.to_vec(),
            selected: Vec::new(),
        }
    }

    fn history(rounds: &[(usize, &[u8])]) -> Vec<DrawRound> {
        let mut out = Vec::new();
        for (count, drawn) in rounds {
            for _ in 0..*count {
                let i = out.len() as u64;
                out.push(round(i, drawn));
            }
        }
        out
    }

    const LOW: &[u8] = &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
    const MID: &[u8] = &[11, 12, 13, 14, 15, 16, 17, 18, 19, 20];

    #[test]
    fn test_sentinel_zero_baseline() {
        // Fenêtre récente plus large que la référence pour isoler le cas.
        let detector = MomentumDetector::new(MomentumConfig {
            detection_window: 10,
            baseline_window: 5,
            ..MomentumConfig::default()
        });
        let h = history(&[(5, MID), (5, LOW)]);
        assert_eq!(detector.calculate_momentum(11, &h), Some(MOMENTUM_SENTINEL));
        assert_eq!(detector.calculate_momentum(30, &h), Some(0.0));
    }

    #[test]
    fn test_insufficient_history_has_no_momentum() {
        let detector = MomentumDetector::new(MomentumConfig::default());
        let h = history(&[(10, LOW)]);
        assert_eq!(detector.calculate_momentum(1, &h), None);
        assert!(detector.identify_hot_numbers(&h).is_empty());
        assert!(detector.all_momentum_values(&h).iter().all(|m| m.momentum.is_none()));
    }

    #[test]
    fn test_steady_history_has_no_hot_numbers() {
        let mut detector = MomentumDetector::new(MomentumConfig::default());
        let h = history(&[(60, LOW)]);
        for n in 1..=10 {
            assert_eq!(detector.calculate_momentum(n, &h), Some(1.0));
        }
        assert!(detector.identify_hot_numbers(&h).is_empty());
        assert_eq!(detector.get_pattern(&h, 60), LOW.to_vec());
    }

    #[test]
    fn test_recent_burst_is_hot() {
        let mut detector = MomentumDetector::new(MomentumConfig::default());
        let h = history(&[(45, LOW), (5, MID)]);
        let hot = detector.identify_hot_numbers(&h);
        assert_eq!(hot.len(), 10);
        assert!(hot.iter().all(|x| (x.momentum - 10.0).abs() < 1e-12));
        assert_eq!(detector.get_pattern(&h, 50), MID.to_vec());
    }

    #[test]
    fn test_gap_fill_with_frequent_numbers() {
        let mut detector = MomentumDetector::new(MomentumConfig::default());
        let h = history(&[(45, LOW), (5, &[1, 2, 3, 4, 5, 6, 7, 11, 12, 13])]);
        let pattern = detector.get_pattern(&h, 0);
        assert_eq!(pattern, vec![1, 2, 3, 4, 5, 6, 7, 11, 12, 13]);
    }

    #[test]
    fn test_top_n_pool_limits_hot_numbers() {
        let mut detector = MomentumDetector::new(MomentumConfig {
            top_n_pool: 3,
            ..MomentumConfig::default()
        });
        let h = history(&[(45, LOW), (5, MID)]);
        let pattern = detector.get_pattern(&h, 0);
        assert_eq!(pattern.len(), 10);
        // 3 chauds (11, 12, 13) puis les 7 plus fréquents de la référence
        assert_eq!(pattern, vec![1, 2, 3, 4, 5, 6, 7, 11, 12, 13]);
    }

    #[test]
    fn test_refresh_gating() {
        let mut detector = MomentumDetector::new(MomentumConfig::default());
        let steady = history(&[(60, LOW)]);
        let initial = detector.get_pattern(&steady, 0);
        assert_eq!(detector.last_refresh_round(), Some(0));

        let burst = history(&[(55, LOW), (5, MID)]);
        for round in 1..=4 {
            assert_eq!(detector.get_pattern(&burst, round), initial);
        }
        assert_eq!(detector.refresh_count(), 1);

        let refreshed = detector.get_pattern(&burst, 5);
        assert_eq!(detector.last_refresh_round(), Some(5));
        assert_eq!(detector.refresh_count(), 2);
        assert_eq!(refreshed, MID.to_vec());
    }

    #[test]
    fn test_force_refresh() {
        let mut detector = MomentumDetector::new(MomentumConfig::default());
        detector.get_pattern(&history(&[(60, LOW)]), 0);
        detector.force_refresh();
        let refreshed = detector.get_pattern(&history(&[(55, LOW), (5, MID)]), 3);
        assert_eq!(refreshed, MID.to_vec());
        assert_eq!(detector.last_refresh_round(), Some(3));
    }

    #[test]
    fn test_fallback_uses_frequency() {
        let mut detector = MomentumDetector::new(MomentumConfig::default());
        let h = history(&[(10, LOW), (2, MID)]);
        assert_eq!(detector.get_pattern(&h, 12), LOW.to_vec());
        assert!(detector.current_pattern().is_empty());
        assert_eq!(detector.refresh_count(), 0);
    }

    #[test]
    fn test_fallback_random_when_empty() {
        let config = MomentumConfig { seed: Some(7), ..MomentumConfig::default() };
        let a = MomentumDetector::new(config.clone()).get_pattern(&[], 0);
        let b = MomentumDetector::new(config).get_pattern(&[], 0);
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
        assert!(a.windows(2).all(|w| w[0] < w[1]));
        assert!(a.iter().all(|&n| (1..=MAX_NUMBER).contains(&n)));
    }

    #[test]
    fn test_all_momentum_values_sorted() {
        let detector = MomentumDetector::new(MomentumConfig::default());
        let values = detector.all_momentum_values(&history(&[(45, LOW), (5, MID)]));
        assert_eq!(values.len(), 40);
        assert!(values[0].is_hot);
        assert!(values
            .windows(2)
            .all(|w| w[0].momentum.unwrap_or(0.0) >= w[1].momentum.unwrap_or(0.0)));
        assert_eq!(values.iter().filter(|v| v.is_hot).count(), 10);
    }

    #[test]
    fn test_output_always_sorted_and_sized() {
        let mut detector = MomentumDetector::new(MomentumConfig::default());
        let h = make_test_rounds(120);
        let pattern = detector.get_pattern(&h, 0);
        assert_eq!(pattern.len(), 10);
        assert!(pattern.windows(2).all(|w| w[0] < w[1]));
    }
}
