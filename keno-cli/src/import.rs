use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::Value;

use keno_db::kv::KvStore;
use keno_db::models::{LegacyRound, NewRound};
use keno_db::store::HistoryStore;

pub struct ImportResult {
    pub total_records: u32,
    pub inserted: u32,
    pub errors: u32,
}

/// Lit un enregistrement d'export : format courant (`drawn`/`selected`/`timestamp`)
/// ou ancien format (`hits`/`misses`/`time`).
pub fn parse_record(value: Value) -> Result<NewRound> {
    let legacy: LegacyRound = serde_json::from_value(value).context("Enregistrement illisible")?;
    let round = legacy.into_new_round();
    if round.drawn.is_empty() {
        bail!("Aucun numéro tiré");
    }
    Ok(round)
}

/// Importe un export JSON (tableau de tours, du plus ancien au plus récent).
pub fn import_json<S: KvStore>(store: &mut HistoryStore<S>, path: &Path) -> Result<ImportResult> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Impossible d'ouvrir {:?}", path))?;
    let value: Value = serde_json::from_str(&json)
        .with_context(|| format!("JSON invalide dans {:?}", path))?;
    let Value::Array(records) = value else {
        bail!("{:?} doit contenir un tableau de tours", path);
    };

    let mut result = ImportResult {
        total_records: 0,
        inserted: 0,
        errors: 0,
    };

    for record in records {
        result.total_records += 1;
        match parse_record(record) {
            Ok(round) => {
                store.append(round);
                result.inserted += 1;
            }
            Err(e) => {
                tracing::warn!(record = result.total_records, error = %e, "enregistrement ignoré");
                result.errors += 1;
            }
        }
    }

    store.flush()?;
    Ok(result)
}
