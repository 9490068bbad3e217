//! Augmented Dickey-Fuller unit-root testing.

use ndarray::{s, Array1, Array2, ArrayView1};
use tracing::{debug, info};

use crate::defaults::VARIANCE_EPS;
use crate::dist::normal_cdf;
use crate::ols::{aic_from_rss, fit_with_intercept, partial_t_stat};
use crate::panel::TimeSeriesPanel;
use crate::types::{AdfTest, SeriesStationarity, StationarityReport, VarError};

// MacKinnon (1994) response-surface coefficients, one series, constant only.
const TAU_MAX: f64 = 2.74;
const TAU_MIN: f64 = -18.83;
const TAU_STAR: f64 = -1.61;
const TAU_SMALL_P: [f64; 3] = [2.1659, 1.4412, 0.038269];
const TAU_LARGE_P: [f64; 4] = [1.7339, 0.93202, -0.12745, -0.010368];

/// Approximate asymptotic p-value of an ADF statistic.
pub fn mackinnon_p(stat: f64) -> f64 {
    if stat > TAU_MAX {
        return 1.0;
    }
    if stat < TAU_MIN {
        return 0.0;
    }
    let coefs: &[f64] = if stat <= TAU_STAR {
        &TAU_SMALL_P
    } else {
        &TAU_LARGE_P
    };
    // Horner, highest power first
    let z = coefs.iter().rev().fold(0.0, |acc, c| acc * stat + c);
    normal_cdf(z)
}

/// Default upper bound on augmentation lags: `ceil(12 (n/100)^{1/4})`,
/// capped so the regression keeps enough degrees of freedom.
fn max_adf_lag(n: usize) -> Result<usize, VarError> {
    let cap = (n / 2).checked_sub(2).ok_or(VarError::InsufficientData {
        what: "observations for the ADF test",
        required: 4,
        available: n,
    })?;
    let schwert = (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize;
    Ok(schwert.min(cap))
}

/// Regression of `Δx_t` on `x_{t-1}` and `lags` lagged differences.
///
/// Rows start at difference index `start` (`start >= lags`), so every
/// candidate lag can share the sample of the largest one.
fn adf_design(x: ArrayView1<f64>, dx: &Array1<f64>, lags: usize, start: usize) -> (Array2<f64>, Array1<f64>) {
    let m = dx.len();
    let rows = m - start;
    let mut design = Array2::<f64>::zeros((rows, lags + 1));
    design.column_mut(0).assign(&x.slice(s![start..m]));
    for lag in 1..=lags {
        design
            .column_mut(lag)
            .assign(&dx.slice(s![start - lag..m - lag]));
    }
    (design, dx.slice(s![start..]).to_owned())
}

/// ADF test with a constant; augmentation lag chosen by AIC.
///
/// # Errors
/// - `VarError::InsufficientData` for fewer than 4 observations,
/// - `VarError::DegenerateSeries` for a constant series or an exact fit.
pub fn adf_test(series: ArrayView1<f64>) -> Result<AdfTest, VarError> {
    let n = series.len();
    let max_lag = max_adf_lag(n)?;

    let mean = series.mean().unwrap_or(0.0);
    let var = series.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    if var <= VARIANCE_EPS {
        return Err(VarError::DegenerateSeries(
            "series is constant; unit-root test undefined".to_string(),
        ));
    }

    let dx: Array1<f64> = series
        .windows(2)
        .into_iter()
        .map(|w| w[1] - w[0])
        .collect();

    let mut best: Option<(f64, usize)> = None;
    for lags in 0..=max_lag {
        let (x, y) = adf_design(series, &dx, lags, max_lag);
        let rows = x.nrows();
        let rss = fit_with_intercept(&x, &y)?.rss();
        let ic = aic_from_rss(rss, lags + 2, rows);
        if best.map_or(true, |(b, _)| ic < b) {
            best = Some((ic, lags));
        }
    }
    let used_lag = best.map(|(_, lag)| lag).unwrap_or(0);

    let (x, y) = adf_design(series, &dx, used_lag, used_lag);
    let (_, statistic) = partial_t_stat(&x, &y, 0)?;
    let p_value = mackinnon_p(statistic);

    debug!(n, max_lag, used_lag, statistic, p_value, "ADF test");

    Ok(AdfTest {
        statistic,
        p_value,
        used_lag,
        n_obs: x.nrows(),
    })
}

/// Test every variable on levels, difference the panel once and test again.
///
/// Returns the differenced panel (one row shorter) and the report. The input
/// panel is left untouched.
pub fn analyze_stationarity(
    panel: &TimeSeriesPanel,
) -> Result<(TimeSeriesPanel, StationarityReport), VarError> {
    let differenced = panel.difference();
    let mut series = Vec::with_capacity(panel.n_vars());

    for (j, variable) in panel.variables().iter().enumerate() {
        let level = adf_test(panel.values().column(j))?;
        let diff = adf_test(differenced.values().column(j))?;
        info!(
            variable = variable.as_str(),
            level_p = level.p_value,
            diff_p = diff.p_value,
            "stationarity"
        );
        series.push(SeriesStationarity {
            variable: variable.clone(),
            level,
            differenced: diff,
        });
    }

    Ok((differenced, StationarityReport { series }))
}
