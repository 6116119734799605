use keno_db::models::{DrawRound, NumberStats, MAX_NUMBER};

/// Fréquence et retard de chaque numéro sur les `window` derniers tours
/// (0 = tout l'historique). Le retard compte les tours depuis la dernière sortie.
pub fn number_stats(history: &[DrawRound], window: usize) -> Vec<NumberStats> {
    let window = if window == 0 { history.len() } else { window.min(history.len()) };
    let recent = &history[history.len() - window..];

    let mut stats: Vec<NumberStats> = (1..=MAX_NUMBER)
        .map(|n| NumberStats {
            number: n,
            frequency: 0,
            gap: window as u32,
        })
        .collect();

    // Du plus récent au plus ancien : le premier passage fixe le retard.
    for (age, round) in recent.iter().rev().enumerate() {
        for &n in &round.drawn {
            let idx = (n as usize).wrapping_sub(1);
            if idx < stats.len() {
                if stats[idx].frequency == 0 {
                    stats[idx].gap = age as u32;
                }
                stats[idx].frequency += 1;
            }
        }
    }

    stats
}

/// Les `count` numéros les plus sortis (à égalité, le plus petit numéro).
pub fn hot_numbers(history: &[DrawRound], window: usize, count: usize) -> Vec<u8> {
    let mut stats = number_stats(history, window);
    stats.sort_by(|a, b| b.frequency.cmp(&a.frequency));
    let mut numbers: Vec<u8> = stats.iter().take(count).map(|s| s.number).collect();
    numbers.sort_unstable();
    numbers
}

/// Les `count` numéros les moins sortis ; à égalité, le plus gros retard.
pub fn cold_numbers(history: &[DrawRound], window: usize, count: usize) -> Vec<u8> {
    let mut stats = number_stats(history, window);
    stats.sort_by(|a, b| a.frequency.cmp(&b.frequency).then(b.gap.cmp(&a.gap)));
    let mut numbers: Vec<u8> = stats.iter().take(count).map(|s| s.number).collect();
    numbers.sort_unstable();
    numbers
}
