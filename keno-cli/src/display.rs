use chrono::DateTime;
use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use crate::import::ImportResult;
use keno_analytics::backtest::BacktestReport;
use keno_analytics::comparison::{ComparisonEntry, MethodSummary};
use keno_analytics::momentum::{NumberMomentum, MOMENTUM_SENTINEL};
use keno_analytics::pattern_backtest::{PatternBacktestOptions, PatternBacktestReport};
use keno_analytics::patterns::{PatternRecord, PatternStats};
use keno_db::models::{DrawRound, NumberStats};

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

pub fn format_numbers(numbers: &[u8]) -> String {
    numbers
        .iter()
        .map(|n| format!("{:2}", n))
        .collect::<Vec<_>>()
        .join(" - ")
}

pub fn format_timestamp(ms: i64) -> String {
    match DateTime::from_timestamp_millis(ms) {
        Some(dt) if ms > 0 => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => "—".to_string(),
    }
}

pub fn display_rounds(rounds: &[DrawRound]) {
    if rounds.is_empty() {
        println!("Aucun tour à afficher.");
        return;
    }

    let mut table = new_table(vec!["#", "Date", "Tirés", "Sélection", "Trouvés"]);
    for round in rounds {
        let hits = round.hits();
        let found = if round.selected.is_empty() {
            "—".to_string()
        } else {
            format!("{}/{}", hits.len(), round.selected.len())
        };
        table.add_row(vec![
            round.index.to_string(),
            format_timestamp(round.timestamp),
            format_numbers(&round.drawn),
            format_numbers(&round.selected),
            found,
        ]);
    }
    println!("{table}");
}

pub fn display_import_summary(result: &ImportResult) {
    println!("Import terminé :");
    println!("  Total enregistrements lus : {}", result.total_records);
    println!("  Insérés                   : {}", result.inserted);
    if result.errors > 0 {
        println!("  Erreurs                   : {}", result.errors);
    }
}

pub fn display_stats(stats: &[NumberStats], window: usize) {
    println!("\n📊 Statistiques sur les {} derniers tours\n", window);

    let mut sorted = stats.to_vec();
    sorted.sort_by(|a, b| b.frequency.cmp(&a.frequency).then(a.number.cmp(&b.number)));

    let mut table = new_table(vec!["Numéro", "Fréquence", "Retard"]);
    for stat in &sorted {
        table.add_row(vec![
            format!("{:2}", stat.number),
            stat.frequency.to_string(),
            stat.gap.to_string(),
        ]);
    }
    println!("{table}");
}

pub fn display_patterns(patterns: &[PatternRecord], stats: &PatternStats, k: usize, sample: usize) {
    println!(
        "\n🔎 Patterns de {} numéros sur {} tours ({} combinaisons distinctes, {:.2} apparitions en moyenne)\n",
        k, sample, stats.total_combinations, stats.avg_appearance
    );

    if patterns.is_empty() {
        println!("Aucun pattern trouvé.");
        return;
    }

    let mut table = new_table(vec!["#", "Numéros", "Sorties", "Écart moyen", "Dernier tour", "Récence"]);
    for (i, p) in patterns.iter().enumerate() {
        table.add_row(vec![
            (i + 1).to_string(),
            format_numbers(&p.numbers),
            p.count.to_string(),
            format!("{:.1}", p.avg_gap),
            p.last_occurrence_index.to_string(),
            format!("{:.3}", p.recency_score),
        ]);
    }
    println!("{table}");
}

pub fn display_momentum(pattern: &[u8], values: &[NumberMomentum], threshold: f64) {
    println!("\n🚀 Grille momentum : {}\n", format_numbers(pattern));

    let mut table = new_table(vec!["Numéro", "Momentum", "Tag"]);
    for value in values {
        let momentum = match value.momentum {
            Some(m) if m >= MOMENTUM_SENTINEL => "nouveau".to_string(),
            Some(m) => format!("{:.2}", m),
            None => "—".to_string(),
        };
        let (tag, color) = if value.is_hot {
            ("Chaud", Color::Green)
        } else if pattern.contains(&value.number) {
            ("Complément", Color::Yellow)
        } else {
            ("", Color::White)
        };
        table.add_row(vec![
            Cell::new(format!("{:2}", value.number)),
            Cell::new(momentum),
            Cell::new(tag).fg(color),
        ]);
    }
    println!("{table}");
    println!("Seuil : {:.2}", threshold);
}

pub fn display_comparison(summary: &[MethodSummary], last: Option<&ComparisonEntry>) {
    println!("\n⚖️  Comparaison des méthodes\n");

    let mut table = new_table(vec!["Méthode", "Tours", "Trouvés", "Moyenne", "Meilleur"]);
    for s in summary {
        table.add_row(vec![
            s.method.to_string(),
            s.rounds.to_string(),
            s.total_hits.to_string(),
            format!("{:.2}", s.avg_hits),
            s.best.to_string(),
        ]);
    }
    println!("{table}");

    if let Some(entry) = last {
        println!("\nDernier tour comparé : {}", entry.round);
        let mut table = new_table(vec!["Méthode", "Prédiction", "Trouvés"]);
        for (method, result) in &entry.results {
            table.add_row(vec![
                method.to_string(),
                format_numbers(&result.predicted),
                format!("{}/{}", result.hits, result.count),
            ]);
        }
        println!("{table}");
    }
}

pub fn display_backtest(report: &BacktestReport) {
    println!("\n🧪 Backtest momentum\n");

    let config = &report.config;
    let mut table = new_table(vec!["Mesure", "Valeur"]);
    table.add_row(vec![
        "Paramètres".to_string(),
        format!(
            "taille {} · détection {} · référence {} · seuil {:.2} · rafraîchissement {}",
            config.pattern_size,
            config.detection_window,
            config.baseline_window,
            config.momentum_threshold,
            config.refresh_frequency
        ),
    ]);
    table.add_row(vec!["Premier tour évalué".to_string(), report.start_index.to_string()]);
    table.add_row(vec!["Prédictions".to_string(), report.total_predictions.to_string()]);
    table.add_row(vec!["Grilles complètes".to_string(), report.total_completions.to_string()]);
    table.add_row(vec!["Taux de réussite".to_string(), format!("{:.2} %", report.success_rate)]);
    table.add_row(vec!["Tours avant sortie (moy.)".to_string(), format!("{:.1}", report.avg_rounds_to_hit)]);
    table.add_row(vec!["Meilleur partiel (moy.)".to_string(), format!("{:.2}", report.avg_best_hits)]);
    table.add_row(vec!["Changements de grille".to_string(), report.pattern_changes.to_string()]);
    println!("{table}");
}

pub fn display_momentum_ranking(reports: &[BacktestReport], top: usize) {
    println!("\n🏆 Meilleures configurations momentum (par taux de réussite)\n");

    let mut table = new_table(vec!["#", "Détection", "Référence", "Seuil", "Rafraîch.", "Réussite", "Tours moy.", "Prédictions"]);
    for (i, r) in reports.iter().take(top).enumerate() {
        let c = &r.config;
        table.add_row(vec![
            (i + 1).to_string(),
            c.detection_window.to_string(),
            c.baseline_window.to_string(),
            format!("{:.1}", c.momentum_threshold),
            c.refresh_frequency.to_string(),
            format!("{:.2} %", r.success_rate),
            format!("{:.1}", r.avg_rounds_to_hit),
            r.total_predictions.to_string(),
        ]);
    }
    println!("{table}");
}

pub fn display_pattern_backtest(report: &PatternBacktestReport, options: &PatternBacktestOptions) {
    println!(
        "\n🧪 Backtest patterns de {} numéros (découverte {} tours, {} candidats, classement {})\n",
        report.pattern_size,
        options.discovery_window,
        options.candidates,
        if options.use_recency { "récence" } else { "fréquence" }
    );

    let f = &report.filter;
    let mut table = new_table(vec!["Mesure", "Valeur"]);
    table.add_row(vec![
        "Filtre".to_string(),
        format!(
            "échantillon {} · partiels {}-{} · exclusion {}",
            f.sample_size, f.min_hits, f.max_hits, f.not_hit_in
        ),
    ]);
    table.add_row(vec!["Points évalués".to_string(), report.evaluation_points.to_string()]);
    table.add_row(vec!["Prédictions".to_string(), report.total_predictions.to_string()]);
    table.add_row(vec!["Patterns complets".to_string(), report.total_successes.to_string()]);
    table.add_row(vec!["Taux de réussite".to_string(), format!("{:.2} %", report.success_rate)]);
    table.add_row(vec!["Tours avant sortie (moy.)".to_string(), format!("{:.1}", report.avg_rounds_to_hit)]);
    table.add_row(vec!["Prédictions par point".to_string(), format!("{:.1}", report.avg_predictions_per_point)]);
    println!("{table}");
}

pub fn display_pattern_ranking(reports: &[PatternBacktestReport], top: usize) {
    println!("\n🏆 Meilleurs filtres (par taux de réussite)\n");

    let mut table = new_table(vec!["#", "Échantillon", "Partiels", "Exclusion", "Réussite", "Tours moy.", "Prédictions"]);
    for (i, r) in reports.iter().filter(|r| r.total_predictions > 0).take(top).enumerate() {
        let f = &r.filter;
        table.add_row(vec![
            (i + 1).to_string(),
            f.sample_size.to_string(),
            format!("{}-{}", f.min_hits, f.max_hits),
            f.not_hit_in.to_string(),
            format!("{:.2} %", r.success_rate),
            format!("{:.1}", r.avg_rounds_to_hit),
            r.total_predictions.to_string(),
        ]);
    }
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_numbers() {
        assert_eq!(format_numbers(&[3, 12, 40]), " 3 - 12 - 40");
        assert_eq!(format_numbers(&[]), "");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "—");
        assert_eq!(format_timestamp(86_400_000), "1970-01-02 00:00:00");
    }
}
