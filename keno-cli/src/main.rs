mod display;
mod import;
mod logging;

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use crate::display::{
    display_backtest, display_comparison, display_import_summary, display_momentum,
    display_momentum_ranking, display_pattern_backtest, display_pattern_ranking, display_patterns,
    display_rounds, display_stats,
};
use keno_analytics::backtest::{momentum_grid, optimize_momentum, run_backtest};
use keno_analytics::comparison::ComparisonTracker;
use keno_analytics::config::{load_or_default, save_config, AnalyticsConfig, DEFAULT_CONFIG_FILE};
use keno_analytics::frequency::number_stats;
use keno_analytics::momentum::MomentumDetector;
use keno_analytics::pattern_backtest::{
    discover_candidates, filter_grid, optimize_patterns, run_pattern_backtest, PatternBacktestOptions,
    PatternFilter,
};
use keno_analytics::patterns::{
    effective_sample_size, sort_patterns, PatternMiner, PatternSort, MAX_PATTERN_SIZE, MIN_PATTERN_SIZE,
};
use keno_db::clock::{Clock, SystemClock};
use keno_db::db::{db_path, SqliteKvStore};
use keno_db::models::{validate_round, NewRound, DRAW_SIZE, MAX_NUMBER};
use keno_db::store::{HistoryStore, MigrationOutcome};

type Store = HistoryStore<SqliteKvStore>;

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum SortArg {
    #[default]
    Frequency,
    Recency,
    Hotness,
    Weighted,
}

impl From<SortArg> for PatternSort {
    fn from(arg: SortArg) -> Self {
        match arg {
            SortArg::Frequency => PatternSort::Frequency,
            SortArg::Recency => PatternSort::Recency,
            SortArg::Hotness => PatternSort::Hotness,
            SortArg::Weighted => PatternSort::Weighted,
        }
    }
}

#[derive(Parser)]
#[command(name = "keno", about = "Analyse de l'historique des tirages Keno")]
struct Cli {
    /// Fichier de configuration JSON
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Verbosité des journaux (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Importer des tours depuis un export JSON
    Import {
        /// Chemin vers le fichier JSON
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Afficher le chemin de la base de données
    DbPath,

    /// Lister les derniers tours
    List {
        /// Nombre de tours à afficher
        #[arg(short, long, default_value = "10")]
        last: usize,
    },

    /// Afficher les fréquences et retards par numéro
    Stats {
        /// Fenêtre d'analyse (0 = tout l'historique)
        #[arg(short, long, default_value = "100")]
        window: usize,
    },

    /// Chercher les combinaisons qui sortent le plus souvent ensemble
    Patterns {
        /// Taille des combinaisons (3-10)
        #[arg(short, long, default_value = "3")]
        size: usize,

        /// Nombre de patterns à afficher
        #[arg(short, long)]
        top: Option<usize>,

        /// Nombre de tours analysés (0 = tout l'historique)
        #[arg(long)]
        sample: Option<usize>,

        /// Ordre d'affichage
        #[arg(long, default_value = "frequency")]
        sort: SortArg,

        /// Ignorer le cache
        #[arg(long)]
        no_cache: bool,
    },

    /// Calculer la grille momentum
    Momentum {
        /// Numéro du tour à prédire (par défaut : le prochain)
        #[arg(short, long)]
        round: Option<u64>,
    },

    /// Comparer fréquence, froids et momentum sur les derniers tours
    Compare {
        /// Nombre de tours rejoués
        #[arg(short, long)]
        rounds: Option<usize>,
    },

    /// Rejouer le détecteur momentum sur tout l'historique
    Backtest {
        /// Tours suivants dans lesquels la grille doit sortir
        #[arg(long)]
        lookahead: Option<usize>,

        /// Tours de chauffe avant la première évaluation
        #[arg(long)]
        warmup: Option<usize>,
    },

    /// Chercher les meilleurs paramètres momentum (192 configurations)
    OptimizeMomentum {
        /// Nombre de configurations affichées
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Fichier JSON où écrire le classement complet
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Rejouer la stratégie des patterns fréquents avec un jeu de filtres
    PatternBacktest {
        /// Taille des patterns (3-10)
        #[arg(short, long)]
        size: Option<usize>,

        /// Tours récents où chercher des sorties partielles
        #[arg(long, default_value = "50")]
        sample: usize,

        /// Sorties partielles minimales
        #[arg(long, default_value = "1")]
        min_hits: usize,

        /// Sorties partielles maximales
        #[arg(long, default_value = "4")]
        max_hits: usize,

        /// Écarter les patterns sortis en entier depuis moins de N tours
        #[arg(long, default_value = "0")]
        not_hit_in: usize,

        /// Classer les candidats par récence
        #[arg(long)]
        recency: bool,
    },

    /// Chercher les meilleurs filtres de la stratégie des patterns
    OptimizePatterns {
        /// Taille des patterns (3-10)
        #[arg(short, long)]
        size: Option<usize>,

        /// Classer les candidats par récence
        #[arg(long)]
        recency: bool,

        /// Nombre de filtres affichés
        #[arg(short, long, default_value = "20")]
        top: usize,

        /// Fichier JSON où écrire le classement complet
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Migrer l'ancien historique en bloc vers le format par chunks
    Migrate,

    /// Effacer tout l'historique
    Clear {
        /// Ne pas demander de confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Écrire une configuration par défaut
    InitConfig {
        /// Fichier de sortie
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,
    },

    /// Ajouter un tour manuellement
    Add,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    if let Command::InitConfig { output } = &cli.command {
        return cmd_init_config(output);
    }

    let config = load_or_default(&cli.config)?;
    let path = db_path();
    let kv = SqliteKvStore::open(&path)?;
    let clock: Rc<dyn Clock> = Rc::new(SystemClock);
    let mut store = HistoryStore::open(kv, config.store.clone(), clock.clone())?;

    let migration = match store.migrate() {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            tracing::warn!(error = %e, "migration de l'ancien historique impossible, lecture seule du bloc");
            None
        }
    };

    let result = match cli.command {
        Command::Import { file } => cmd_import(&mut store, &file),
        Command::DbPath => cmd_db_path(&store, &path),
        Command::List { last } => cmd_list(&store, last),
        Command::Stats { window } => cmd_stats(&store, window),
        Command::Patterns {
            size,
            top,
            sample,
            sort,
            no_cache,
        } => cmd_patterns(&store, &config, clock, size, top, sample, sort, no_cache),
        Command::Momentum { round } => cmd_momentum(&store, &config, round),
        Command::Compare { rounds } => cmd_compare(&store, &config, rounds),
        Command::Backtest { lookahead, warmup } => cmd_backtest(&store, &config, lookahead, warmup),
        Command::OptimizeMomentum { top, output } => cmd_optimize_momentum(&store, &config, top, output.as_deref()),
        Command::PatternBacktest {
            size,
            sample,
            min_hits,
            max_hits,
            not_hit_in,
            recency,
        } => {
            let filter = PatternFilter {
                sample_size: sample,
                min_hits,
                max_hits,
                not_hit_in,
            };
            cmd_pattern_backtest(&store, &config, clock, size, filter, recency)
        }
        Command::OptimizePatterns {
            size,
            recency,
            top,
            output,
        } => cmd_optimize_patterns(&store, &config, clock, size, recency, top, output.as_deref()),
        Command::Migrate => cmd_migrate(&mut store, migration),
        Command::Clear { yes } => cmd_clear(&mut store, yes),
        Command::InitConfig { .. } => Ok(()),
        Command::Add => cmd_add(&mut store),
    };

    let flushed = store.flush();
    if let Err(e) = &flushed {
        eprintln!("Échec de l'écriture finale de l'historique : {e:#}");
    }
    if store.write_failures() > 0 {
        eprintln!(
            "Attention : {} écriture(s) en échec, l'historique en base peut être incomplet.",
            store.write_failures()
        );
    }
    // L'erreur de la commande passe avant celle de l'écriture finale.
    result.and(flushed)
}

fn progress_bar(message: &'static str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    pb.set_message(message);
    Ok(pb)
}

fn save_json<T: serde::Serialize>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Impossible d'écrire {:?}", path))?;
    println!("Classement complet écrit dans {}", path.display());
    Ok(())
}

fn ensure_history(store: &Store) -> bool {
    if store.is_empty() {
        println!("Historique vide. Lancez d'abord : keno import --file <export.json>");
        return false;
    }
    true
}

fn cmd_db_path(store: &Store, path: &Path) -> Result<()> {
    println!("{}", path.display());
    println!("{} clé(s), {} tours", store.kv().count_keys()?, store.len());
    Ok(())
}

fn cmd_init_config(output: &Path) -> Result<()> {
    save_config(&AnalyticsConfig::default(), output)?;
    println!("Configuration écrite dans {}", output.display());
    Ok(())
}

fn cmd_import(store: &mut Store, file: &Path) -> Result<()> {
    let result = import::import_json(store, file)?;
    display_import_summary(&result);
    Ok(())
}

fn cmd_list(store: &Store, last: usize) -> Result<()> {
    if !ensure_history(store) {
        return Ok(());
    }
    let rounds = store.rounds();
    let start = rounds.len().saturating_sub(last);
    let mut recent = rounds[start..].to_vec();
    recent.reverse();
    display_rounds(&recent);
    Ok(())
}

fn cmd_stats(store: &Store, window: usize) -> Result<()> {
    if !ensure_history(store) {
        return Ok(());
    }
    let effective = effective_sample_size(store.len(), window);
    let stats = number_stats(store.rounds(), effective);
    display_stats(&stats, effective);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_patterns(
    store: &Store,
    config: &AnalyticsConfig,
    clock: Rc<dyn Clock>,
    size: usize,
    top: Option<usize>,
    sample: Option<usize>,
    sort: SortArg,
    no_cache: bool,
) -> Result<()> {
    if !ensure_history(store) {
        return Ok(());
    }
    let top = top.unwrap_or(config.patterns.top_n);
    let sample = sample.unwrap_or(config.patterns.sample_size);

    let miner = PatternMiner::new(&config.patterns, clock);
    let (mut patterns, stats) = miner.find_patterns_with_stats(store.rounds(), size, top, sample, !no_cache);
    sort_patterns(&mut patterns, sort.into());

    display_patterns(&patterns, &stats, size, effective_sample_size(store.len(), sample));
    Ok(())
}

fn cmd_momentum(store: &Store, config: &AnalyticsConfig, round: Option<u64>) -> Result<()> {
    let mut detector = MomentumDetector::new(config.momentum.clone());
    let round = round.unwrap_or_else(|| store.next_index());
    let history = store.rounds();

    if history.len() < config.momentum.baseline_window {
        println!(
            "Historique court ({} tours < {}) : grille des numéros les plus fréquents.",
            history.len(),
            config.momentum.baseline_window
        );
    }

    let pattern = detector.get_pattern(history, round);
    let values = detector.all_momentum_values(history);
    display_momentum(&pattern, &values, config.momentum.momentum_threshold);
    Ok(())
}

fn cmd_compare(store: &Store, config: &AnalyticsConfig, rounds: Option<usize>) -> Result<()> {
    if !ensure_history(store) {
        return Ok(());
    }
    let history = store.rounds();
    let replay = rounds.unwrap_or(config.comparison.lookback);
    let start = history.len().saturating_sub(replay);

    let mut tracker = ComparisonTracker::new(config.comparison.clone(), config.momentum.clone());
    tracker.start();
    for i in start..history.len() {
        tracker.record_round(&history[..i], &history[i]);
    }
    tracker.stop();

    display_comparison(&tracker.summary(), tracker.entries().back());
    Ok(())
}

fn cmd_backtest(
    store: &Store,
    config: &AnalyticsConfig,
    lookahead: Option<usize>,
    warmup: Option<usize>,
) -> Result<()> {
    if !ensure_history(store) {
        return Ok(());
    }
    let mut options = config.backtest.clone();
    if let Some(lookahead) = lookahead {
        options.lookahead = lookahead;
    }
    if let Some(warmup) = warmup {
        options.warmup = warmup;
    }

    let pb = progress_bar("backtest momentum")?;

    let report = run_backtest(store.rounds(), &config.momentum, &options, |done, total| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    });
    pb.finish_and_clear();

    if report.total_predictions == 0 {
        println!(
            "Historique trop court pour un backtest : il faut plus de {} tours.",
            report.start_index + options.lookahead
        );
        return Ok(());
    }
    display_backtest(&report);
    Ok(())
}

fn cmd_optimize_momentum(store: &Store, config: &AnalyticsConfig, top: usize, output: Option<&Path>) -> Result<()> {
    if !ensure_history(store) {
        return Ok(());
    }
    let grid = momentum_grid(&config.momentum);
    println!("Test de {} configurations momentum...", grid.len());

    let pb = progress_bar("optimisation momentum")?;
    let reports = optimize_momentum(store.rounds(), &grid, &config.backtest, |done, total| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    });
    pb.finish_and_clear();

    if reports.iter().all(|r| r.total_predictions == 0) {
        println!("Historique trop court pour évaluer les configurations.");
        return Ok(());
    }
    display_momentum_ranking(&reports, top);
    if let Some(path) = output {
        save_json(&reports, path)?;
    }
    Ok(())
}

fn pattern_options(config: &AnalyticsConfig, size: Option<usize>, recency: bool) -> Result<PatternBacktestOptions> {
    let mut options = config.pattern_backtest.clone();
    if let Some(size) = size {
        options.pattern_size = size;
    }
    if !(MIN_PATTERN_SIZE..=MAX_PATTERN_SIZE).contains(&options.pattern_size) {
        bail!(
            "Taille de pattern {} invalide ({}-{})",
            options.pattern_size,
            MIN_PATTERN_SIZE,
            MAX_PATTERN_SIZE
        );
    }
    options.use_recency |= recency;
    Ok(options)
}

fn cmd_pattern_backtest(
    store: &Store,
    config: &AnalyticsConfig,
    clock: Rc<dyn Clock>,
    size: Option<usize>,
    filter: PatternFilter,
    recency: bool,
) -> Result<()> {
    if !ensure_history(store) {
        return Ok(());
    }
    let options = pattern_options(config, size, recency)?;
    if filter.min_hits > filter.max_hits {
        bail!("--min-hits ({}) doit être inférieur ou égal à --max-hits ({})", filter.min_hits, filter.max_hits);
    }

    let miner = PatternMiner::new(&config.patterns, clock);
    let pb = progress_bar("découverte des patterns")?;
    let report = run_pattern_backtest(store.rounds(), &miner, &filter, &options, |done, total| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    });
    pb.finish_and_clear();

    display_pattern_backtest(&report, &options);
    Ok(())
}

fn cmd_optimize_patterns(
    store: &Store,
    config: &AnalyticsConfig,
    clock: Rc<dyn Clock>,
    size: Option<usize>,
    recency: bool,
    top: usize,
    output: Option<&Path>,
) -> Result<()> {
    if !ensure_history(store) {
        return Ok(());
    }
    let options = pattern_options(config, size, recency)?;
    let miner = PatternMiner::new(&config.patterns, clock);

    let pb = progress_bar("découverte des patterns")?;
    let points = discover_candidates(store.rounds(), &miner, &options, |done, total| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    });
    pb.finish_and_clear();
    if points.is_empty() {
        println!(
            "Historique trop court : il faut plus de {} tours.",
            options.discovery_window + options.warmup + options.lookahead
        );
        return Ok(());
    }

    let grid = filter_grid(options.pattern_size);
    println!("Test de {} filtres sur {} points d'évaluation...", grid.len(), points.len());
    let pb = progress_bar("optimisation des filtres")?;
    let reports = optimize_patterns(store.rounds(), &points, &grid, &options, |done, total| {
        pb.set_length(total as u64);
        pb.set_position(done as u64);
    });
    pb.finish_and_clear();

    display_pattern_ranking(&reports, top);
    if let Some(path) = output {
        save_json(&reports, path)?;
    }
    Ok(())
}

fn cmd_migrate(store: &mut Store, startup: Option<MigrationOutcome>) -> Result<()> {
    let outcome = match startup {
        Some(outcome) => outcome,
        None => store.migrate()?,
    };
    match outcome {
        MigrationOutcome::NoLegacyData => println!("Aucun ancien historique à migrer."),
        MigrationOutcome::AlreadyChunked => {
            println!("Historique déjà au format par chunks, ancien bloc ignoré.")
        }
        MigrationOutcome::Migrated { rounds } => println!("{} tours migrés.", rounds),
    }
    println!("{} tours en {} chunk(s).", store.len(), store.chunk_count());
    Ok(())
}

fn cmd_clear(store: &mut Store, yes: bool) -> Result<()> {
    if !yes {
        let confirm = prompt(&format!("Effacer les {} tours enregistrés ? (o/n) : ", store.len()))?;
        if confirm.to_lowercase() != "o" {
            println!("Effacement annulé.");
            return Ok(());
        }
    }
    store.clear()?;
    println!("Historique effacé.");
    Ok(())
}

fn cmd_add(store: &mut Store) -> Result<()> {
    println!("Ajout d'un tour manuellement\n");

    let drawn = prompt_numbers(
        &format!("{} numéros tirés (séparés par des espaces, 1-{}) : ", DRAW_SIZE, MAX_NUMBER),
        false,
    )?;
    let selected = loop {
        let selected = prompt_numbers("Numéros joués (vide si aucun) : ", true)?;
        match validate_round(&drawn, &selected) {
            Ok(()) => break selected,
            Err(e) => println!("{e}. Réessayez."),
        }
    };

    let round = NewRound::new(chrono::Utc::now().timestamp_millis(), &drawn, &selected);
    println!("\nTour à insérer :");
    display_rounds(&[round.clone().into_round(store.next_index())]);

    let confirm = prompt("\nConfirmer l'insertion ? (o/n) : ")?;
    if confirm.to_lowercase() == "o" {
        let index = store.append(round);
        println!("Tour {} inséré avec succès.", index);
    } else {
        println!("Insertion annulée.");
    }

    Ok(())
}

fn prompt(msg: &str) -> Result<String> {
    print!("{}", msg);
    io::stdout().flush()?;
    read_answer(&mut io::stdin().lock())
}

/// Lit une ligne de réponse. Fin d'entrée = saisie annulée.
fn read_answer<R: BufRead>(reader: &mut R) -> Result<String> {
    let mut input = String::new();
    let read = reader.read_line(&mut input).context("Erreur de lecture")?;
    if read == 0 {
        bail!("Saisie annulée (fin de l'entrée standard)");
    }
    Ok(input.trim().to_string())
}

fn prompt_numbers(msg: &str, allow_empty: bool) -> Result<Vec<u8>> {
    loop {
        let input = prompt(msg)?;
        let nums: Result<Vec<u8>, _> = input.split_whitespace().map(|s| s.parse::<u8>()).collect();
        match nums {
            Ok(v) if v.is_empty() && allow_empty => return Ok(v),
            Ok(v) if !v.is_empty() => {
                if allow_empty || validate_round(&v, &[]).is_ok() {
                    return Ok(v);
                }
                println!("Numéros invalides (1-{}, pas de doublons). Réessayez.", MAX_NUMBER);
            }
            _ => println!("Entrez des numéros entre 1 et {}. Réessayez.", MAX_NUMBER),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_read_answer_trims_line() {
        let mut input = Cursor::new("  3 7 12 \nsuite\n");
        assert_eq!(read_answer(&mut input).unwrap(), "3 7 12");
        assert_eq!(read_answer(&mut input).unwrap(), "suite");
    }

    #[test]
    fn test_read_answer_end_of_input_cancels() {
        let mut input = Cursor::new("");
        assert!(read_answer(&mut input).is_err());

        let mut input = Cursor::new("\n");
        assert_eq!(read_answer(&mut input).unwrap(), "");
        assert!(read_answer(&mut input).is_err());
    }

    #[test]
    fn test_pattern_options_overrides() {
        let config = AnalyticsConfig::default();
        let options = pattern_options(&config, Some(4), true).unwrap();
        assert_eq!(options.pattern_size, 4);
        assert!(options.use_recency);

        let options = pattern_options(&config, None, false).unwrap();
        assert_eq!(options, config.pattern_backtest);

        assert!(pattern_options(&config, Some(2), false).is_err());
        assert!(pattern_options(&config, Some(11), false).is_err());
    }
}
