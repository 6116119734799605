use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Plus grand numéro de la grille (1..=40).
pub const MAX_NUMBER: u8 = 40;

/// Nombre de numéros tirés par partie dans les règles usuelles.
pub const DRAW_SIZE: usize = 10;

/// Un tour de jeu terminé, tel qu'il est stocké dans l'historique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawRound {
    pub index: u64,
    pub timestamp: i64,
    pub drawn: Vec<u8>,
    #[serde(default)]
    pub selected: Vec<u8>,
}

impl DrawRound {
    /// Numéros joués qui sont sortis.
    pub fn hits(&self) -> Vec<u8> {
        self.selected
            .iter()
            .copied()
            .filter(|n| self.drawn.binary_search(n).is_ok())
            .collect()
    }

    /// Numéros sortis qui n'étaient pas joués.
    pub fn misses(&self) -> Vec<u8> {
        self.drawn
            .iter()
            .copied()
            .filter(|n| self.selected.binary_search(n).is_err())
            .collect()
    }

    pub fn contains(&self, number: u8) -> bool {
        self.drawn.binary_search(&number).is_ok()
    }

    /// Masque 40 bits des numéros tirés (bit n-1 pour le numéro n).
    pub fn drawn_mask(&self) -> u64 {
        numbers_to_mask(&self.drawn)
    }
}

/// Tour reçu de la source de tirages, avant attribution de l'index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRound {
    pub timestamp: i64,
    pub drawn: Vec<u8>,
    #[serde(default)]
    pub selected: Vec<u8>,
}

impl NewRound {
    pub fn new(timestamp: i64, drawn: &[u8], selected: &[u8]) -> Self {
        Self {
            timestamp,
            drawn: drawn.to_vec(),
            selected: selected.to_vec(),
        }
    }

    pub fn into_round(self, index: u64) -> DrawRound {
        DrawRound {
            index,
            timestamp: self.timestamp,
            drawn: normalize_numbers(&self.drawn),
            selected: normalize_numbers(&self.selected),
        }
    }
}

/// Ancien format d'un tour : pas toujours de `drawn`, mais `hits` + `misses`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LegacyRound {
    #[serde(default)]
    pub drawn: Option<Vec<u8>>,
    #[serde(default)]
    pub selected: Option<Vec<u8>>,
    #[serde(default)]
    pub hits: Vec<u8>,
    #[serde(default)]
    pub misses: Vec<u8>,
    #[serde(default, alias = "timestamp")]
    pub time: Option<i64>,
}

impl LegacyRound {
    pub fn into_new_round(self) -> NewRound {
        let drawn = match self.drawn {
            Some(drawn) => drawn,
            None => {
                let mut all = self.hits.clone();
                all.extend_from_slice(&self.misses);
                all
            }
        };
        let selected = self.selected.unwrap_or(self.hits);
        NewRound {
            timestamp: self.time.unwrap_or(0),
            drawn,
            selected,
        }
    }
}

/// Trie, dédoublonne et écarte les valeurs hors de 1..=40.
pub fn normalize_numbers(numbers: &[u8]) -> Vec<u8> {
    let mut out: Vec<u8> = numbers
        .iter()
        .copied()
        .filter(|&n| {
            let ok = (1..=MAX_NUMBER).contains(&n);
            if !ok {
                tracing::warn!(number = n, "numéro hors limites ignoré");
            }
            ok
        })
        .collect();
    out.sort_unstable();
    out.dedup();
    out
}

pub fn numbers_to_mask(numbers: &[u8]) -> u64 {
    numbers
        .iter()
        .filter(|&&n| (1..=MAX_NUMBER).contains(&n))
        .fold(0u64, |mask, &n| mask | (1u64 << (n - 1)))
}

pub fn mask_to_numbers(mask: u64) -> Vec<u8> {
    (1..=MAX_NUMBER)
        .filter(|&n| mask & (1u64 << (n - 1)) != 0)
        .collect()
}

#[derive(Debug, Clone)]
pub struct NumberStats {
    pub number: u8,
    pub frequency: u32,
    pub gap: u32,
}

/// Validation stricte d'une saisie utilisateur (la normalisation, elle, est tolérante).
pub fn validate_round(drawn: &[u8], selected: &[u8]) -> Result<()> {
    if drawn.is_empty() {
        bail!("Aucun numéro tiré");
    }
    for &n in drawn.iter().chain(selected) {
        if n < 1 || n > MAX_NUMBER {
            bail!("Numéro {} hors limites (1-{})", n, MAX_NUMBER);
        }
    }
    for list in [drawn, selected] {
        for i in 0..list.len() {
            for j in (i + 1)..list.len() {
                if list[i] == list[j] {
                    bail!("Numéro en double : {}", list[i]);
                }
            }
        }
    }
    Ok(())
}

/// Historique synthétique : le tour i tire 10 numéros consécutifs décalés de i.
pub fn make_test_rounds(n: usize) -> Vec<DrawRound> {
    (0..n)
        .map(|i| {
            let base = (i % 31) as u8;
            let drawn: Vec<u8> = (1..=DRAW_SIZE as u8).map(|k| base + k).collect();
            DrawRound {
                index: i as u64,
                timestamp: 1_700_000_000_000 + i as i64 * 60_000,
                drawn,
                selected: vec![1, 2, 3, 4, 5],
            }
        })
        .collect()
}
