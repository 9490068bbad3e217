//! Pipeline configuration loaded from TOML. Every section is optional.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::data::IngestOptions;
use crate::defaults::{
    DEFAULT_CAUSALITY_LAG, DEFAULT_FORECAST_STEPS, DEFAULT_LAG_ORDER, DEFAULT_MAX_LAG,
    DEFAULT_VALUE_COLUMN,
};
use crate::types::{LagOrder, VarError};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub backtest: BacktestConfig,
    #[serde(default)]
    pub what_if: WhatIfConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_value_column")]
    pub value_column: String,
}

fn default_value_column() -> String {
    DEFAULT_VALUE_COLUMN.to_string()
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: None,
            value_column: default_value_column(),
        }
    }
}

impl DataConfig {
    pub fn ingest_options(&self) -> IngestOptions {
        IngestOptions {
            value_column: self.value_column.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    #[serde(default = "default_lag_order")]
    pub lag_order: LagOrder,
    #[serde(default = "default_max_lag")]
    pub max_lag: LagOrder,
    #[serde(default = "default_causality_lag")]
    pub causality_lag: LagOrder,
    #[serde(default = "default_forecast_steps")]
    pub forecast_steps: usize,
}

fn default_lag_order() -> LagOrder {
    DEFAULT_LAG_ORDER
}

fn default_max_lag() -> LagOrder {
    DEFAULT_MAX_LAG
}

fn default_causality_lag() -> LagOrder {
    DEFAULT_CAUSALITY_LAG
}

fn default_forecast_steps() -> usize {
    DEFAULT_FORECAST_STEPS
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            lag_order: default_lag_order(),
            max_lag: default_max_lag(),
            causality_lag: default_causality_lag(),
            forecast_steps: default_forecast_steps(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BacktestConfig {
    /// Last training year; the backtest is skipped when unset.
    #[serde(default)]
    pub cutoff: Option<i32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhatIfConfig {
    /// Horizon of the scenario; falls back to `model.forecast_steps`.
    #[serde(default)]
    pub steps: Option<usize>,
    /// Replacement values for the last observed year, by variable.
    #[serde(default)]
    pub overrides: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, VarError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| {
            VarError::InvalidConfig(format!("failed to read '{}': {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, VarError> {
        let config: Config =
            toml::from_str(contents).map_err(|e| VarError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), VarError> {
        let m = &self.model;
        if m.lag_order == 0 {
            return Err(VarError::InvalidConfig(
                "model.lag_order must be at least 1".to_string(),
            ));
        }
        if m.max_lag == 0 {
            return Err(VarError::InvalidConfig(
                "model.max_lag must be at least 1".to_string(),
            ));
        }
        if m.causality_lag == 0 {
            return Err(VarError::InvalidConfig(
                "model.causality_lag must be at least 1".to_string(),
            ));
        }
        if m.forecast_steps == 0 || self.what_if.steps == Some(0) {
            return Err(VarError::InvalidSteps(0));
        }
        if let Some((name, _)) = self.what_if.overrides.iter().find(|(_, v)| !v.is_finite()) {
            return Err(VarError::InvalidConfig(format!(
                "what_if override for '{name}' must be finite"
            )));
        }
        Ok(())
    }

    pub fn what_if_steps(&self) -> usize {
        self.what_if.steps.unwrap_or(self.model.forecast_steps)
    }
}
