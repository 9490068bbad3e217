use std::collections::BTreeMap;

use ndarray::ArrayView1;
use serde::Serialize;

use crate::defaults::SIGNIFICANCE_LEVEL;
use crate::panel::TimeSeriesPanel;

/// Number of lagged observations used as predictors.
pub type LagOrder = usize;

/// Ordered (cause, effect) variable pair.
pub type VariablePair = (String, String);

/// Information-criterion variants reported by lag selection.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize)]
pub enum IcKind {
    Aic,
    Bic,
    Fpe,
    Hqic,
}

impl IcKind {
    pub const ALL: [IcKind; 4] = [IcKind::Aic, IcKind::Bic, IcKind::Fpe, IcKind::Hqic];

    pub fn label(self) -> &'static str {
        match self {
            IcKind::Aic => "AIC",
            IcKind::Bic => "BIC",
            IcKind::Fpe => "FPE",
            IcKind::Hqic => "HQIC",
        }
    }
}

/// Information criteria for one candidate lag order.
#[derive(Clone, Debug, Serialize)]
pub struct LagCriteria {
    pub lag: LagOrder,
    pub aic: f64,
    pub bic: f64,
    pub fpe: f64,
    pub hqic: f64,
}

impl LagCriteria {
    pub fn value(&self, kind: IcKind) -> f64 {
        match kind {
            IcKind::Aic => self.aic,
            IcKind::Bic => self.bic,
            IcKind::Fpe => self.fpe,
            IcKind::Hqic => self.hqic,
        }
    }
}

/// Output of lag-order selection: the full score table plus the
/// minimising lag per criterion. Advisory only.
#[derive(Clone, Debug, Serialize)]
pub struct LagOrderSelection {
    pub max_lag: LagOrder,
    pub n_obs: usize,
    pub table: Vec<LagCriteria>,
    pub aic: LagOrder,
    pub bic: LagOrder,
    pub fpe: LagOrder,
    pub hqic: LagOrder,
}

impl LagOrderSelection {
    pub fn selected(&self, kind: IcKind) -> LagOrder {
        match kind {
            IcKind::Aic => self.aic,
            IcKind::Bic => self.bic,
            IcKind::Fpe => self.fpe,
            IcKind::Hqic => self.hqic,
        }
    }
}

/// Augmented Dickey-Fuller test outcome (constant-only regression).
#[derive(Clone, Debug, Serialize)]
pub struct AdfTest {
    pub statistic: f64,
    pub p_value: f64,
    /// Number of lagged differences chosen by AIC.
    pub used_lag: usize,
    /// Observations in the final regression.
    pub n_obs: usize,
}

impl AdfTest {
    pub fn is_stationary(&self) -> bool {
        self.p_value < SIGNIFICANCE_LEVEL
    }
}

/// Unit-root results for one variable, on levels and on first differences.
#[derive(Clone, Debug, Serialize)]
pub struct SeriesStationarity {
    pub variable: String,
    pub level: AdfTest,
    pub differenced: AdfTest,
}

#[derive(Clone, Debug, Serialize)]
pub struct StationarityReport {
    pub series: Vec<SeriesStationarity>,
}

impl StationarityReport {
    /// True when at least one level series fails the unit-root test.
    pub fn differencing_required(&self) -> bool {
        self.series.iter().any(|s| !s.level.is_stationary())
    }

    /// True when every differenced series passes the unit-root test.
    pub fn differenced_all_stationary(&self) -> bool {
        self.series.iter().all(|s| s.differenced.is_stationary())
    }
}

/// Dated forecast rows produced by a fitted model.
///
/// The wrapped panel has the training variable set, and its years continue
/// the training panel's last year at annual frequency.
#[derive(Clone, Debug)]
pub struct ForecastResult {
    pub lag_order: LagOrder,
    pub panel: TimeSeriesPanel,
}

impl ForecastResult {
    pub fn len(&self) -> usize {
        self.panel.len()
    }

    pub fn is_empty(&self) -> bool {
        self.panel.is_empty()
    }

    pub fn years(&self) -> &[i32] {
        self.panel.years()
    }

    pub fn variables(&self) -> &[String] {
        self.panel.variables()
    }

    /// Convert a forecast of first differences back into levels, seeding the
    /// cumulative sum with the last observed level row.
    pub fn integrate(&self, last_level: ArrayView1<f64>) -> Result<ForecastResult, VarError> {
        let panel = self.panel.accumulate_from(last_level)?;
        Ok(ForecastResult {
            lag_order: self.lag_order,
            panel,
        })
    }
}

/// Result of a single Granger F-test.
#[derive(Clone, Debug, Serialize)]
pub struct GrangerTest {
    pub f_statistic: f64,
    pub p_value: f64,
    pub df_num: usize,
    pub df_den: usize,
    pub n_obs: usize,
}

/// Pairwise Granger-causality p-values keyed by (cause, effect).
///
/// Pairs that could not be tested are kept in `failures` and do not
/// abort the batch.
#[derive(Clone, Debug, Default)]
pub struct CausalityResult {
    pub max_lag: LagOrder,
    pub p_values: BTreeMap<VariablePair, f64>,
    pub failures: BTreeMap<VariablePair, VarError>,
}

impl CausalityResult {
    pub fn p_value(&self, cause: &str, effect: &str) -> Option<f64> {
        self.p_values
            .get(&(cause.to_string(), effect.to_string()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.p_values.len() + self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-variable out-of-sample accuracy of a backtest.
#[derive(Clone, Debug, Serialize)]
pub struct ForecastAccuracy {
    pub variable: String,
    pub rmse: f64,
    pub mae: f64,
}

#[derive(Clone, Debug)]
pub struct BacktestResult {
    pub cutoff: i32,
    pub forecast: ForecastResult,
    pub actuals: TimeSeriesPanel,
    pub accuracy: Vec<ForecastAccuracy>,
}

#[derive(Clone, Debug)]
pub struct WhatIfResult {
    pub scenario: ForecastResult,
    pub baseline: ForecastResult,
    pub modified_panel: TimeSeriesPanel,
}

/// Library error type.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum VarError {
    #[error("data source error: {0}")]
    DataSource(String),
    #[error("insufficient data: need at least {required} {what}, got {available}")]
    InsufficientData {
        what: &'static str,
        required: usize,
        available: usize,
    },
    #[error("forecast horizon must be at least 1 step, got {0}")]
    InvalidSteps(usize),
    #[error("granger test {cause} -> {effect} failed: {reason}")]
    CausalityTest {
        cause: String,
        effect: String,
        reason: String,
    },
    #[error("unknown variable: {0}")]
    UnknownVariable(String),
    #[error("degenerate series: {0}")]
    DegenerateSeries(String),
    #[error("input lengths mismatch")]
    LengthMismatch,
    #[error("empty input")]
    EmptyInput,
    #[error("linear algebra failure: {0}")]
    Linalg(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
