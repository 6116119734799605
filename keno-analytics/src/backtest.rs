use serde::{Deserialize, Serialize};

use keno_db::models::DrawRound;

use crate::momentum::{MomentumConfig, MomentumDetector};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestOptions {
    /// Tours suivants dans lesquels la grille doit sortir en entier.
    pub lookahead: usize,
    /// Tours ajoutés à la fenêtre de référence avant la première évaluation.
    pub warmup: usize,
}

impl Default for BacktestOptions {
    fn default() -> Self {
        Self {
            lookahead: 30,
            warmup: 100,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PatternOutcome {
    pub completed: bool,
    /// Tours avant la sortie complète (1 = tour suivant), 0 sinon.
    pub rounds_to_hit: usize,
    pub best_hits: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub config: MomentumConfig,
    pub start_index: usize,
    pub total_predictions: usize,
    pub total_completions: usize,
    pub success_rate: f64,
    pub avg_rounds_to_hit: f64,
    pub avg_best_hits: f64,
    pub pattern_changes: usize,
}

/// Cherche la première sortie complète de `pattern` dans `future`.
pub fn evaluate_pattern(future: &[DrawRound], pattern: &[u8]) -> PatternOutcome {
    let mut best_hits = 0;
    for (ahead, round) in future.iter().enumerate() {
        let hits = pattern.iter().filter(|&&n| round.contains(n)).count();
        best_hits = best_hits.max(hits);
        if !pattern.is_empty() && hits == pattern.len() {
            return PatternOutcome {
                completed: true,
                rounds_to_hit: ahead + 1,
                best_hits,
            };
        }
    }
    PatternOutcome {
        completed: false,
        rounds_to_hit: 0,
        best_hits,
    }
}

/// Rejoue le détecteur momentum sur l'historique, un point d'évaluation tous
/// les `refresh_frequency` tours. `progress(fait, total)` est appelé à chaque point.
pub fn run_backtest<F>(
    history: &[DrawRound],
    config: &MomentumConfig,
    options: &BacktestOptions,
    mut progress: F,
) -> BacktestReport
where
    F: FnMut(usize, usize),
{
    let mut detector = MomentumDetector::new(config.clone());
    let start = config.baseline_window + options.warmup;
    let end = history.len().saturating_sub(options.lookahead);
    let step = config.refresh_frequency.max(1) as usize;
    let points: Vec<usize> = if start < end { (start..end).step_by(step).collect() } else { Vec::new() };

    let mut completions = 0usize;
    let mut rounds_to_hit = Vec::new();
    let mut best_hits_total = 0usize;
    let mut pattern_changes = 0usize;
    let mut last_pattern: Vec<u8> = Vec::new();

    for (done, &idx) in points.iter().enumerate() {
        let pattern = detector.get_pattern(&history[..idx], idx as u64);
        if pattern != last_pattern {
            pattern_changes += 1;
            last_pattern = pattern.clone();
        }

        let future = &history[idx..(idx + options.lookahead).min(history.len())];
        let outcome = evaluate_pattern(future, &pattern);
        if outcome.completed {
            completions += 1;
            rounds_to_hit.push(outcome.rounds_to_hit);
        }
        best_hits_total += outcome.best_hits;
        progress(done + 1, points.len());
    }

    let total = points.len();
    tracing::info!(evaluations = total, completions, "backtest momentum terminé");

    BacktestReport {
        config: config.clone(),
        start_index: start,
        total_predictions: total,
        total_completions: completions,
        success_rate: if total > 0 { completions as f64 / total as f64 * 100.0 } else { 0.0 },
        avg_rounds_to_hit: if rounds_to_hit.is_empty() {
            0.0
        } else {
            rounds_to_hit.iter().sum::<usize>() as f64 / rounds_to_hit.len() as f64
        },
        avg_best_hits: if total > 0 { best_hits_total as f64 / total as f64 } else { 0.0 },
        pattern_changes,
    }
}

/// Grille de paramètres testée par `optimize_momentum` :
/// 4 détections × 4 références × 4 seuils × 3 rafraîchissements = 192 configurations.
/// Taille de grille, pool et graine viennent de `base`.
pub fn momentum_grid(base: &MomentumConfig) -> Vec<MomentumConfig> {
    let detection_windows = [3, 5, 7, 10];
    let baseline_windows = [25, 50, 75, 100];
    let thresholds = [1.2, 1.5, 2.0, 2.5];
    let refresh_frequencies = [5, 10, 20];

    let mut configs = Vec::with_capacity(192);
    for &detection_window in &detection_windows {
        for &baseline_window in &baseline_windows {
            for &momentum_threshold in &thresholds {
                for &refresh_frequency in &refresh_frequencies {
                    configs.push(MomentumConfig {
                        detection_window,
                        baseline_window,
                        momentum_threshold,
                        refresh_frequency,
                        ..base.clone()
                    });
                }
            }
        }
    }
    configs
}

/// Backtest de chaque configuration, classées par taux de réussite décroissant
/// (à égalité, la sortie la plus rapide d'abord).
pub fn optimize_momentum<F>(
    history: &[DrawRound],
    configs: &[MomentumConfig],
    options: &BacktestOptions,
    mut progress: F,
) -> Vec<BacktestReport>
where
    F: FnMut(usize, usize),
{
    let mut reports: Vec<BacktestReport> = configs
        .iter()
        .enumerate()
        .map(|(i, config)| {
            let report = run_backtest(history, config, options, |_, _| {});
            progress(i + 1, configs.len());
            report
        })
        .collect();

    reports.sort_by(|a, b| {
        b.success_rate
            .total_cmp(&a.success_rate)
            .then_with(|| a.avg_rounds_to_hit.total_cmp(&b.avg_rounds_to_hit))
    });
    tracing::info!(configs = configs.len(), "optimisation momentum terminée");
    reports
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

    #[test]
    fn test_evaluate_pattern_completion() {
        let future = vec![
            round(0, &[1, 2, 9]),
            round(1, &[1, 2, 3, 7]),
            round(2, &[1, 2, 3]),
        ];
        let outcome = evaluate_pattern(&future, &[1, 2, 3]);
        assert!(outcome.completed);
        assert_eq!(outcome.rounds_to_hit, 2);
        assert_eq!(outcome.best_hits, 3);
    }

    #[test]
    fn test_evaluate_pattern_partial() {
        let future = vec![round(0, &[1, 9]), round(1, &[1, 2, 8])];
        let outcome = evaluate_pattern(&future, &[1, 2, 3]);
        assert!(!outcome.completed);
        assert_eq!(outcome.rounds_to_hit, 0);
        assert_eq!(outcome.best_hits, 2);
    }

    #[test]
    fn test_backtest_steady_history_always_completes() {
        let history: Vec<DrawRound> = (0..200).map(|i| round(i, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10])).collect();
        let config = MomentumConfig::default();
        let options = BacktestOptions { lookahead: 10, warmup: 20 };
        let mut calls = 0;
        let report = run_backtest(&history, &config, &options, |_, _| calls += 1);

        // points : 70, 75, ..., 185
        assert_eq!(report.start_index, 70);
        assert_eq!(report.total_predictions, 24);
        assert_eq!(calls, 24);
        assert_eq!(report.total_completions, 24);
        assert!((report.success_rate - 100.0).abs() < 1e-12);
        assert!((report.avg_rounds_to_hit - 1.0).abs() < 1e-12);
        assert_eq!(report.pattern_changes, 1);
    }

    #[test]
    fn test_backtest_too_short() {
        let history = make_test_rounds(100);
        let report = run_backtest(&history, &MomentumConfig::default(), &BacktestOptions::default(), |_, _| {});
        assert_eq!(report.total_predictions, 0);
        assert_eq!(report.success_rate, 0.0);
    }

    #[test]
    fn test_momentum_grid() {
        let base = MomentumConfig { pattern_size: 6, seed: Some(3), ..MomentumConfig::default() };
        let grid = momentum_grid(&base);
        assert_eq!(grid.len(), 192);
        assert!(grid.iter().all(|c| c.pattern_size == 6 && c.seed == Some(3) && c.top_n_pool == 15));
        assert_eq!(grid[0].detection_window, 3);
        assert_eq!(grid[0].baseline_window, 25);
        assert_eq!(grid[191].refresh_frequency, 20);
    }

    #[test]
    fn test_optimize_momentum_ranks_by_success_rate() {
        // Les 10 mêmes numéros jusqu'au tour 120, puis 10 autres.
        let history: Vec<DrawRound> = (0..200)
            .map(|i| {
                if i < 120 {
                    round(i, &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10])
                } else {
                    round(i, &[21, 22, 23, 24, 25, 26, 27, 28, 29, 30])
                }
            })
            .collect();
        let options = BacktestOptions { lookahead: 5, warmup: 0 };
        let short = MomentumConfig { baseline_window: 20, detection_window: 3, ..MomentumConfig::default() };
        let long = MomentumConfig { baseline_window: 100, detection_window: 3, ..MomentumConfig::default() };

        let mut calls = Vec::new();
        let reports = optimize_momentum(&history, &[long.clone(), short.clone()], &options, |done, total| {
            calls.push((done, total))
        });
        assert_eq!(calls, vec![(1, 2), (2, 2)]);
        assert_eq!(reports.len(), 2);
        assert!(reports[0].success_rate >= reports[1].success_rate);
        assert_eq!(reports[0].config, short);
    }
}
