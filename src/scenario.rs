//! Backtest and what-if runs built on fit + forecast. Both are stateless.

use std::collections::BTreeMap;

use tracing::info;

use crate::defaults::DEFAULT_LAG_ORDER;
use crate::forecast::forecast;
use crate::ols::compute_metrics;
use crate::panel::TimeSeriesPanel;
use crate::types::{BacktestResult, ForecastAccuracy, LagOrder, VarError, WhatIfResult};
use crate::var::fit_var;

/// [`backtest_with_lag`] at the default lag order.
pub fn backtest(panel: &TimeSeriesPanel, cutoff: i32) -> Result<BacktestResult, VarError> {
    backtest_with_lag(panel, cutoff, DEFAULT_LAG_ORDER)
}

/// Fit on years `<= cutoff`, forecast the remaining years and score the
/// forecast against them. Rows are compared in order.
///
/// # Errors
/// `VarError::InsufficientData` if either side of the cutoff is empty, plus
/// anything [`fit_var`] returns for the training side.
pub fn backtest_with_lag(
    panel: &TimeSeriesPanel,
    cutoff: i32,
    lag_order: LagOrder,
) -> Result<BacktestResult, VarError> {
    let (train, test) = panel.split_at_year(cutoff);
    if train.is_empty() {
        return Err(VarError::InsufficientData {
            what: "training observations before the cutoff",
            required: 1,
            available: 0,
        });
    }
    if test.is_empty() {
        return Err(VarError::InsufficientData {
            what: "held-out observations after the cutoff",
            required: 1,
            available: 0,
        });
    }

    let model = fit_var(&train, lag_order)?;
    let fc = forecast(&model, test.len())?;

    let accuracy: Vec<ForecastAccuracy> = test
        .variables()
        .iter()
        .enumerate()
        .map(|(j, variable)| {
            let (rmse, mae) = compute_metrics(test.values().column(j), fc.panel.values().column(j));
            ForecastAccuracy {
                variable: variable.clone(),
                rmse,
                mae,
            }
        })
        .collect();

    info!(
        cutoff,
        train = train.len(),
        held_out = test.len(),
        "backtest complete"
    );

    Ok(BacktestResult {
        cutoff,
        forecast: fc,
        actuals: test,
        accuracy,
    })
}

/// [`what_if_with_lag`] at the default lag order.
pub fn what_if(
    panel: &TimeSeriesPanel,
    overrides: &BTreeMap<String, f64>,
    steps: usize,
) -> Result<WhatIfResult, VarError> {
    what_if_with_lag(panel, overrides, steps, DEFAULT_LAG_ORDER)
}

/// Compare a baseline forecast with one from a panel whose last observation
/// has been overridden. The model is refit on the modified panel.
///
/// # Errors
/// - `VarError::UnknownVariable` for an override naming no panel variable,
/// - `VarError::InvalidConfig` for a non-finite override,
/// - `VarError::InsufficientData` for an empty panel,
/// - `VarError::InvalidSteps` if `steps` is 0.
pub fn what_if_with_lag(
    panel: &TimeSeriesPanel,
    overrides: &BTreeMap<String, f64>,
    steps: usize,
    lag_order: LagOrder,
) -> Result<WhatIfResult, VarError> {
    if steps == 0 {
        return Err(VarError::InvalidSteps(steps));
    }
    let modified_panel = panel.with_last_row(overrides)?;

    let baseline = forecast(&fit_var(panel, lag_order)?, steps)?;
    let scenario = forecast(&fit_var(&modified_panel, lag_order)?, steps)?;

    info!(overrides = overrides.len(), steps, "what-if complete");

    Ok(WhatIfResult {
        scenario,
        baseline,
        modified_panel,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{simulate_var1, spiral_panel};
    use ndarray::array;

    fn overrides(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_backtest_exact_dynamics() {
        let (panel, _, _) = spiral_panel(40);
        let cutoff = panel.years()[34];
        let res = backtest(&panel, cutoff).unwrap();

        assert_eq!(res.cutoff, cutoff);
        assert_eq!(res.forecast.len(), 5);
        assert_eq!(res.actuals.len(), 5);
        assert_eq!(res.forecast.years(), res.actuals.years());
        assert_eq!(res.accuracy.len(), 2);
        for acc in &res.accuracy {
            assert!(acc.rmse < 1e-4);
            assert!(acc.mae <= acc.rmse + 1e-12);
        }
    }

    #[test]
    fn test_backtest_at_last_year_has_nothing_to_score() {
        let (panel, _, _) = spiral_panel(20);
        let last = panel.last_year().unwrap();
        assert!(matches!(
            backtest(&panel, last),
            Err(VarError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_backtest_before_first_year() {
        let (panel, _, _) = spiral_panel(20);
        let first = panel.first_year().unwrap();
        assert!(matches!(
            backtest(&panel, first - 1),
            Err(VarError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_backtest_training_split_shorter_than_lag() {
        let (panel, _, _) = spiral_panel(20);
        let first = panel.first_year().unwrap();
        assert!(matches!(
            backtest(&panel, first),
            Err(VarError::InsufficientData {
                required: 2,
                available: 1,
                ..
            })
        ));
        assert!(matches!(
            backtest_with_lag(&panel, first + 1, 2),
            Err(VarError::InsufficientData {
                required: 3,
                available: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_what_if_identity_matches_baseline() {
        let a = array![[0.5, 0.2], [0.1, 0.4]];
        let panel = simulate_var1(&a, &[1.0, 2.0], 40, 17);
        let last = panel.last_row().unwrap();
        let same = overrides(&[("x", last[0])]);
        let res = what_if(&panel, &same, 3).unwrap();

        assert_eq!(res.modified_panel, panel);
        assert_eq!(res.scenario.panel, res.baseline.panel);
    }

    #[test]
    fn test_what_if_override_changes_forecast() {
        let a = array![[0.5, 0.2], [0.1, 0.4]];
        let panel = simulate_var1(&a, &[1.0, 2.0], 40, 17);
        let last = panel.last_row().unwrap().to_owned();
        let res = what_if_with_lag(&panel, &overrides(&[("y", last[1] + 5.0)]), 2, 1).unwrap();

        assert_eq!(res.modified_panel.values()[[39, 1]], last[1] + 5.0);
        assert_eq!(res.modified_panel.values()[[38, 1]], panel.values()[[38, 1]]);
        assert_ne!(res.scenario.panel, res.baseline.panel);
        assert_eq!(res.scenario.years(), res.baseline.years());
    }

    #[test]
    fn test_what_if_rejects_bad_overrides() {
        let (panel, _, _) = spiral_panel(20);
        assert!(matches!(
            what_if(&panel, &overrides(&[("nope", 1.0)]), 2),
            Err(VarError::UnknownVariable(_))
        ));
        assert!(matches!(
            what_if(&panel, &overrides(&[("x", f64::NAN)]), 2),
            Err(VarError::InvalidConfig(_))
        ));
        assert!(matches!(
            what_if(&panel, &BTreeMap::new(), 0),
            Err(VarError::InvalidSteps(0))
        ));
    }
}
