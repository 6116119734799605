use serde::{Deserialize, Serialize};

use keno_db::models::DrawRound;

use crate::backtest::evaluate_pattern;
use crate::patterns::{sort_patterns, PatternMiner, PatternSort};

/// Filtres appliqués aux patterns candidats avant de les jouer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternFilter {
    /// Tours récents dans lesquels on cherche des sorties partielles.
    pub sample_size: usize,
    pub min_hits: usize,
    pub max_hits: usize,
    /// Écarte les patterns sortis en entier il y a moins de N tours (0 = pas de filtre).
    pub not_hit_in: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternBacktestOptions {
    pub pattern_size: usize,
    /// Tours analysés pour trouver les patterns candidats.
    pub discovery_window: usize,
    pub candidates: usize,
    /// Classer les candidats par score de récence plutôt que par fréquence.
    pub use_recency: bool,
    pub lookahead: usize,
    /// Tours entre deux points d'évaluation.
    pub step: usize,
    /// Tours ajoutés après la fenêtre de découverte avant le premier point.
    pub warmup: usize,
    /// Tours parcourus pour retrouver la dernière sortie complète.
    pub tracking_window: usize,
    /// Pourcentage minimal de tours de l'échantillon avec une sortie partielle.
    pub min_hit_rate: f64,
}

impl Default for PatternBacktestOptions {
    fn default() -> Self {
        Self {
            pattern_size: 5,
            discovery_window: 500,
            candidates: 100,
            use_recency: false,
            lookahead: 30,
            step: 50,
            warmup: 200,
            tracking_window: 1000,
            min_hit_rate: 10.0,
        }
    }
}

/// Patterns candidats découverts juste avant le tour `index`.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationPoint {
    pub index: usize,
    pub candidates: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatternBacktestReport {
    pub filter: PatternFilter,
    pub pattern_size: usize,
    /// Points où au moins un pattern a passé les filtres.
    pub evaluation_points: usize,
    pub total_predictions: usize,
    pub total_successes: usize,
    pub success_rate: f64,
    pub avg_rounds_to_hit: f64,
    pub avg_predictions_per_point: f64,
}

fn matches(pattern: &[u8], round: &DrawRound) -> usize {
    pattern.iter().filter(|&&n| round.contains(n)).count()
}

/// Tours de `sample` où le pattern sort partiellement, entre `min_hits` et `max_hits` numéros.
pub fn buildup_count(pattern: &[u8], sample: &[DrawRound], min_hits: usize, max_hits: usize) -> usize {
    sample
        .iter()
        .filter(|round| (min_hits..=max_hits).contains(&matches(pattern, round)))
        .count()
}

/// Tours écoulés depuis la dernière sortie complète dans `tracking` (0 = dernier tour).
pub fn rounds_since_full_hit(pattern: &[u8], tracking: &[DrawRound]) -> Option<usize> {
    tracking
        .iter()
        .rev()
        .position(|round| !pattern.is_empty() && matches(pattern, round) == pattern.len())
}

/// Découvre les candidats à chaque point d'évaluation. Le cache du mineur est
/// vidé après chaque point : les fenêtres ne se recoupent jamais en clé.
pub fn discover_candidates<F>(
    history: &[DrawRound],
    miner: &PatternMiner,
    options: &PatternBacktestOptions,
    mut progress: F,
) -> Vec<EvaluationPoint>
where
    F: FnMut(usize, usize),
{
    let start = options.discovery_window + options.warmup;
    let end = history.len().saturating_sub(options.lookahead);
    let indices: Vec<usize> = if start < end {
        (start..end).step_by(options.step.max(1)).collect()
    } else {
        Vec::new()
    };

    let k = options.pattern_size;
    let mut points = Vec::with_capacity(indices.len());
    for (done, &index) in indices.iter().enumerate() {
        let before = &history[..index];
        let patterns = if options.use_recency {
            let mut all = miner.find_patterns(before, k, usize::MAX, options.discovery_window, false);
            sort_patterns(&mut all, PatternSort::Weighted);
            all.truncate(options.candidates);
            all
        } else {
            miner.find_patterns(before, k, options.candidates, options.discovery_window, false)
        };
        miner.clear_cache();

        points.push(EvaluationPoint {
            index,
            candidates: patterns.into_iter().map(|p| p.numbers).collect(),
        });
        progress(done + 1, indices.len());
    }
    points
}

/// Joue, à chaque point, les candidats qui passent `filter` et mesure leur sortie complète.
pub fn evaluate_filter(
    history: &[DrawRound],
    points: &[EvaluationPoint],
    filter: &PatternFilter,
    options: &PatternBacktestOptions,
) -> PatternBacktestReport {
    let mut evaluation_points = 0usize;
    let mut predictions = 0usize;
    let mut successes = 0usize;
    let mut rounds_to_hit_total = 0usize;

    for point in points {
        let idx = point.index;
        let sample = &history[idx.saturating_sub(filter.sample_size)..idx];
        let tracking = &history[idx.saturating_sub(options.tracking_window)..idx];
        let future = &history[idx..(idx + options.lookahead).min(history.len())];
        if sample.is_empty() {
            continue;
        }

        let selected: Vec<&Vec<u8>> = point
            .candidates
            .iter()
            .filter(|pattern| {
                let buildups = buildup_count(pattern, sample, filter.min_hits, filter.max_hits);
                let hit_rate = buildups as f64 / sample.len() as f64 * 100.0;
                if buildups == 0 || hit_rate < options.min_hit_rate {
                    return false;
                }
                match rounds_since_full_hit(pattern, tracking) {
                    Some(ago) if filter.not_hit_in > 0 => ago >= filter.not_hit_in,
                    _ => true,
                }
            })
            .collect();

        if selected.is_empty() {
            continue;
        }
        evaluation_points += 1;
        for pattern in selected {
            predictions += 1;
            let outcome = evaluate_pattern(future, pattern);
            if outcome.completed {
                successes += 1;
                rounds_to_hit_total += outcome.rounds_to_hit;
            }
        }
    }

    PatternBacktestReport {
        filter: *filter,
        pattern_size: options.pattern_size,
        evaluation_points,
        total_predictions: predictions,
        total_successes: successes,
        success_rate: if predictions > 0 { successes as f64 / predictions as f64 * 100.0 } else { 0.0 },
        avg_rounds_to_hit: if successes > 0 { rounds_to_hit_total as f64 / successes as f64 } else { 0.0 },
        avg_predictions_per_point: if evaluation_points > 0 {
            predictions as f64 / evaluation_points as f64
        } else {
            0.0
        },
    }
}

/// Découverte puis évaluation d'un seul filtre. `progress` suit la découverte.
pub fn run_pattern_backtest<F>(
    history: &[DrawRound],
    miner: &PatternMiner,
    filter: &PatternFilter,
    options: &PatternBacktestOptions,
    progress: F,
) -> PatternBacktestReport
where
    F: FnMut(usize, usize),
{
    let points = discover_candidates(history, miner, options, progress);
    evaluate_filter(history, &points, filter, options)
}

/// Bornes de sorties partielles testées pour une taille de pattern donnée.
/// Une sortie partielle reste strictement sous la taille du pattern.
fn hit_ranges(pattern_size: usize) -> (Vec<usize>, Vec<usize>) {
    let (min_hits, max_hits): (Vec<usize>, Vec<usize>) = match pattern_size {
        3 => (vec![1, 2], vec![2]),
        4 => (vec![1, 3], vec![3]),
        5 => (vec![1, 4], vec![3, 4]),
        k => (
            vec![k.saturating_sub(3), k.saturating_sub(2), k.saturating_sub(1)],
            vec![k.saturating_sub(2), k.saturating_sub(1)],
        ),
    };
    let cap = pattern_size.saturating_sub(1).max(1);
    let clamp = |v: Vec<usize>| {
        let mut v: Vec<usize> = v.into_iter().map(|h| h.clamp(1, cap)).collect();
        v.dedup();
        v
    };
    (clamp(min_hits), clamp(max_hits))
}

/// Grille de filtres : tailles d'échantillon × bornes de sorties partielles × exclusion récente.
pub fn filter_grid(pattern_size: usize) -> Vec<PatternFilter> {
    let sample_sizes = [5, 10, 25, 50, 75, 100, 150, 200];
    let not_hit_in = [0, 50, 100, 1000];
    let (min_range, max_range) = hit_ranges(pattern_size);

    let mut grid = Vec::new();
    for &sample_size in &sample_sizes {
        for &min_hits in &min_range {
            for &max_hits in &max_range {
                if min_hits > max_hits {
                    continue;
                }
                for &not_hit_in in &not_hit_in {
                    grid.push(PatternFilter {
                        sample_size,
                        min_hits,
                        max_hits,
                        not_hit_in,
                    });
                }
            }
        }
    }
    grid
}

/// Teste tous les filtres de la grille sur les mêmes candidats, classés par
/// taux de réussite décroissant. `progress(fait, total)` suit les filtres.
pub fn optimize_patterns<F>(
    history: &[DrawRound],
    points: &[EvaluationPoint],
    grid: &[PatternFilter],
    options: &PatternBacktestOptions,
    mut progress: F,
) -> Vec<PatternBacktestReport>
where
    F: FnMut(usize, usize),
{
    let mut reports: Vec<PatternBacktestReport> = grid
        .iter()
        .enumerate()
        .map(|(i, filter)| {
            let report = evaluate_filter(history, points, filter, options);
            progress(i + 1, grid.len());
            report
        })
        .collect();

    reports.sort_by(|a, b| {
        b.success_rate
            .total_cmp(&a.success_rate)
            .then_with(|| b.total_predictions.cmp(&a.total_predictions))
    });
    tracing::info!(
        filters = grid.len(),
        points = points.len(),
        k = options.pattern_size,
        "optimisation des patterns terminée"
    );
    reports
}
