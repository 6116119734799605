use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use keno_db::store::StoreConfig;

use crate::backtest::BacktestOptions;
use crate::comparison::ComparisonConfig;
use crate::momentum::MomentumConfig;
use crate::pattern_backtest::PatternBacktestOptions;
use crate::patterns::PatternConfig;

pub const DEFAULT_CONFIG_FILE: &str = "keno.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub store: StoreConfig,
    pub patterns: PatternConfig,
    pub momentum: MomentumConfig,
    pub comparison: ComparisonConfig,
    pub backtest: BacktestOptions,
    pub pattern_backtest: PatternBacktestOptions,
}

pub fn save_config(config: &AnalyticsConfig, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)
        .with_context(|| format!("Impossible d'écrire {:?}", path))?;
    Ok(())
}

pub fn load_config(path: &Path) -> Result<AnalyticsConfig> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Impossible de lire {:?}", path))?;
    let config: AnalyticsConfig = serde_json::from_str(&json)
        .with_context(|| format!("Configuration invalide dans {:?}", path))?;
    Ok(config)
}

/// Charge la configuration si le fichier existe, sinon les valeurs par défaut.
pub fn load_or_default(path: &Path) -> Result<AnalyticsConfig> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "pas de fichier de configuration, valeurs par défaut");
        Ok(AnalyticsConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serde_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keno.json");
        let mut config = AnalyticsConfig::default();
        config.momentum.momentum_threshold = 2.0;
        config.store.chunk_size = 500;
        save_config(&config, &path).unwrap();
        assert_eq!(load_config(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AnalyticsConfig =
            serde_json::from_str(r#"{"momentum": {"baseline_window": 80}}"#).unwrap();
        assert_eq!(config.momentum.baseline_window, 80);
        assert_eq!(config.momentum.detection_window, 5);
        assert_eq!(config.patterns, PatternConfig::default());
        assert_eq!(config.pattern_backtest.discovery_window, 500);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_or_default(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, AnalyticsConfig::default());
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keno.json");
        std::fs::write(&path, "{ pas du json").unwrap();
        assert!(load_or_default(&path).is_err());
    }
}
