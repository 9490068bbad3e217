use ndarray::{s, ArrayView1};
use tracing::{debug, warn};

use crate::defaults::VARIANCE_EPS;
use crate::design::lag_columns;
use crate::dist::f_sf;
use crate::ols::fit_with_intercept;
use crate::panel::TimeSeriesPanel;
use crate::types::{CausalityResult, GrangerTest, LagOrder, VarError};

fn is_constant(series: ArrayView1<f64>) -> bool {
    let mean = series.mean().unwrap_or(0.0);
    series.iter().all(|v| (v - mean).abs() <= VARIANCE_EPS.sqrt())
}

/// SSR-based F-test of whether `lag` lags of `cause` improve the
/// prediction of `effect` beyond `lag` lags of `effect` alone.
///
/// Both regressions include an intercept and use the `n - lag` observations
/// that have a full lag history.
pub fn granger_test(
    cause: ArrayView1<f64>,
    effect: ArrayView1<f64>,
    lag: LagOrder,
) -> Result<GrangerTest, VarError> {
    if lag == 0 {
        return Err(VarError::InvalidConfig(
            "granger lag must be at least 1".to_string(),
        ));
    }
    let n = effect.len();
    if cause.len() != n {
        return Err(VarError::LengthMismatch);
    }
    let required = 3 * lag + 2;
    if n < required {
        return Err(VarError::InsufficientData {
            what: "observations for the granger test",
            required,
            available: n,
        });
    }
    if is_constant(cause) || is_constant(effect) {
        return Err(VarError::DegenerateSeries(
            "constant series cannot be tested".to_string(),
        ));
    }

    let y = effect.slice(s![lag..]).to_owned();
    let x_restricted = lag_columns(&[effect], lag)?;
    let x_full = lag_columns(&[effect.view(), cause.view()], lag)?;

    let rss_r = fit_with_intercept(&x_restricted, &y)?.rss();
    let rss_u = fit_with_intercept(&x_full, &y)?.rss();

    let n_obs = y.len();
    let df_den = n_obs - 2 * lag - 1;
    let tss = {
        let m = y.mean().unwrap_or(0.0);
        y.iter().map(|v| (v - m).powi(2)).sum::<f64>()
    };
    if rss_u <= VARIANCE_EPS * tss.max(1.0) {
        return Err(VarError::DegenerateSeries(
            "unrestricted regression fits exactly".to_string(),
        ));
    }

    let f_statistic = ((rss_r - rss_u).max(0.0) / lag as f64) / (rss_u / df_den as f64);
    let p_value = f_sf(f_statistic, lag as f64, df_den as f64)?.clamp(0.0, 1.0);

    Ok(GrangerTest {
        f_statistic,
        p_value,
        df_num: lag,
        df_den,
        n_obs,
    })
}

/// Pairwise Granger tests over every ordered pair of distinct variables.
///
/// The key `(a, b)` holds the p-value of "a Granger-causes b" at exactly
/// `max_lag` lags. Pairs that cannot be tested are recorded as
/// `VarError::CausalityTest` failures and the batch continues.
///
/// # Errors
/// Unknown variable names and a zero `max_lag` fail the whole call.
pub fn granger_causality<S: AsRef<str>>(
    panel: &TimeSeriesPanel,
    variables: &[S],
    max_lag: LagOrder,
) -> Result<CausalityResult, VarError> {
    if max_lag == 0 {
        return Err(VarError::InvalidConfig(
            "max_lag must be at least 1".to_string(),
        ));
    }
    let columns = variables
        .iter()
        .map(|v| panel.column(v.as_ref()).map(|c| (v.as_ref(), c)))
        .collect::<Result<Vec<_>, _>>()?;

    let mut result = CausalityResult {
        max_lag,
        ..Default::default()
    };
    for &(cause, cause_col) in &columns {
        for &(effect, effect_col) in &columns {
            if cause == effect {
                continue;
            }
            let key = (cause.to_string(), effect.to_string());
            match granger_test(cause_col, effect_col, max_lag) {
                Ok(test) => {
                    debug!(cause, effect, f = test.f_statistic, p = test.p_value, "granger");
                    result.p_values.insert(key, test.p_value);
                }
                Err(e) => {
                    warn!(cause, effect, error = %e, "granger test failed");
                    result.failures.insert(
                        key,
                        VarError::CausalityTest {
                            cause: cause.to_string(),
                            effect: effect.to_string(),
                            reason: e.to_string(),
                        },
                    );
                }
            }
        }
    }
    Ok(result)
}
