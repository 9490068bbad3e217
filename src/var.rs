use std::collections::VecDeque;
use std::fmt;

use ndarray::{s, Array1, Array2, ArrayView2};
use tracing::debug;

use crate::design::lagged_design;
use crate::ols::fit_with_intercept;
use crate::panel::TimeSeriesPanel;
use crate::types::{LagCriteria, LagOrder, VarError};

/// Fitted VAR(p) model with intercept.
///
/// `coefficients()[l - 1][[i, j]]` is the effect of variable `j` at lag `l`
/// on variable `i`. The model keeps the last `p` training observations as the
/// seed for forecasting and is never mutated after fitting; refitting yields a
/// new instance.
#[derive(Clone, Debug)]
pub struct FittedVarModel {
    lag_order: LagOrder,
    variables: Vec<String>,
    intercept: Array1<f64>,
    coefficients: Vec<Array2<f64>>,
    sigma_u: Array2<f64>,
    sigma_u_mle: Array2<f64>,
    residuals: Array2<f64>,
    trailing: Array2<f64>,
    trailing_years: Vec<i32>,
}

/// Raw estimation output shared by the estimator and the lag selector.
pub(crate) struct Estimate {
    pub intercept: Array1<f64>,
    pub coefficients: Vec<Array2<f64>>,
    pub residuals: Array2<f64>,
}

/// Equation-by-equation least squares on the lagged design.
pub(crate) fn estimate(
    values: ArrayView2<f64>,
    lags: LagOrder,
    offset: usize,
) -> Result<Estimate, VarError> {
    let k = values.ncols();
    let (x, y) = lagged_design(values, lags, offset)?;
    let rows = x.nrows();

    let mut intercept = Array1::<f64>::zeros(k);
    let mut coefficients = vec![Array2::<f64>::zeros((k, k)); lags];
    let mut residuals = Array2::<f64>::zeros((rows, k));

    for i in 0..k {
        let fit = fit_with_intercept(&x, &y.column(i).to_owned())?;
        intercept[i] = fit.intercept;
        for (lag, coef) in coefficients.iter_mut().enumerate() {
            coef.row_mut(i)
                .assign(&fit.params.slice(s![lag * k..(lag + 1) * k]));
        }
        residuals.column_mut(i).assign(&fit.residuals);
    }

    Ok(Estimate {
        intercept,
        coefficients,
        residuals,
    })
}

/// `ln|A|` of a symmetric positive-definite matrix via Cholesky.
/// Returns `None` when the matrix is not positive definite.
pub(crate) fn log_det_spd(a: &Array2<f64>) -> Option<f64> {
    let n = a.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    let mut log_det = 0.0;
    for j in 0..n {
        let mut diag = a[[j, j]];
        for m in 0..j {
            diag -= l[[j, m]] * l[[j, m]];
        }
        if diag <= 0.0 || !diag.is_finite() {
            return None;
        }
        let d = diag.sqrt();
        l[[j, j]] = d;
        log_det += 2.0 * d.ln();
        for i in (j + 1)..n {
            let mut v = a[[i, j]];
            for m in 0..j {
                v -= l[[i, m]] * l[[j, m]];
            }
            l[[i, j]] = v / d;
        }
    }
    Some(log_det)
}

/// `U'U / denom`.
fn cross_product(residuals: &Array2<f64>, denom: f64) -> Array2<f64> {
    residuals.t().dot(residuals) / denom
}

/// Information criteria for a VAR(`lags`) with intercept, from its residuals
/// (ML covariance `U'U / nobs`).
///
/// - AIC  = ln|Σ| + 2 m / T
/// - BIC  = ln|Σ| + ln(T) m / T
/// - HQIC = ln|Σ| + 2 ln(ln T) m / T
/// - FPE  = ((T + d) / (T - d))^k |Σ|
///
/// where `m = lags k² + k` free parameters and `d = k lags + 1` regressors per
/// equation.
pub(crate) fn information_criteria(residuals: &Array2<f64>, lags: LagOrder) -> LagCriteria {
    let (nobs, k) = residuals.dim();
    let t = nobs as f64;
    let sigma = cross_product(residuals, t.max(1.0));
    let ld = log_det_spd(&sigma).unwrap_or(f64::NEG_INFINITY);

    let free_params = (lags * k * k + k) as f64;
    let df_model = (k * lags + 1) as f64;
    let df_resid = t - df_model;

    let fpe = if df_resid > 0.0 {
        ((t + df_model) / df_resid).powi(k as i32) * ld.exp()
    } else {
        f64::INFINITY
    };

    LagCriteria {
        lag: lags,
        aic: ld + 2.0 * free_params / t,
        bic: ld + t.ln() * free_params / t,
        hqic: ld + 2.0 * t.ln().ln() * free_params / t,
        fpe,
    }
}

/// Fit a VAR model of exactly `lag_order` lags on `panel`.
///
/// # Errors
/// - `VarError::InvalidConfig` if `lag_order` is 0,
/// - `VarError::InsufficientData` if the panel has fewer than 2 variables or
///   fewer than `lag_order + 1` observations.
pub fn fit_var(panel: &TimeSeriesPanel, lag_order: LagOrder) -> Result<FittedVarModel, VarError> {
    if lag_order == 0 {
        return Err(VarError::InvalidConfig(
            "VAR lag order must be at least 1".to_string(),
        ));
    }
    let k = panel.n_vars();
    if k < 2 {
        return Err(VarError::InsufficientData {
            what: "variables",
            required: 2,
            available: k,
        });
    }
    let n = panel.len();
    if n < lag_order + 1 {
        return Err(VarError::InsufficientData {
            what: "observations",
            required: lag_order + 1,
            available: n,
        });
    }

    let est = estimate(panel.values(), lag_order, 0)?;
    let nobs = est.residuals.nrows();
    let df_resid = nobs.saturating_sub(k * lag_order + 1).max(1);
    let sigma_u = cross_product(&est.residuals, df_resid as f64);
    let sigma_u_mle = cross_product(&est.residuals, nobs as f64);

    let trailing = panel.values().slice(s![n - lag_order.., ..]).to_owned();
    let trailing_years = panel.years()[n - lag_order..].to_vec();

    debug!(
        lag_order,
        variables = k,
        nobs,
        last_year = trailing_years.last().copied().unwrap_or_default(),
        "fitted VAR model"
    );

    Ok(FittedVarModel {
        lag_order,
        variables: panel.variables().to_vec(),
        intercept: est.intercept,
        coefficients: est.coefficients,
        sigma_u,
        sigma_u_mle,
        residuals: est.residuals,
        trailing,
        trailing_years,
    })
}

impl FittedVarModel {
    pub fn lag_order(&self) -> LagOrder {
        self.lag_order
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn n_vars(&self) -> usize {
        self.variables.len()
    }

    /// Observations used in estimation (training rows minus the lag burn-in).
    pub fn n_obs(&self) -> usize {
        self.residuals.nrows()
    }

    pub fn intercept(&self) -> &Array1<f64> {
        &self.intercept
    }

    pub fn coefficients(&self) -> &[Array2<f64>] {
        &self.coefficients
    }

    /// Degrees-of-freedom adjusted residual covariance.
    pub fn sigma_u(&self) -> &Array2<f64> {
        &self.sigma_u
    }

    /// Maximum-likelihood residual covariance (`U'U / nobs`).
    pub fn sigma_u_mle(&self) -> &Array2<f64> {
        &self.sigma_u_mle
    }

    pub fn residuals(&self) -> &Array2<f64> {
        &self.residuals
    }

    /// Last `lag_order` training observations, oldest first.
    pub fn trailing_window(&self) -> &Array2<f64> {
        &self.trailing
    }

    pub fn trailing_years(&self) -> &[i32] {
        &self.trailing_years
    }

    pub fn last_year(&self) -> i32 {
        // at least one trailing row exists since lag_order >= 1
        self.trailing_years[self.trailing_years.len() - 1]
    }

    pub fn information_criteria(&self) -> LagCriteria {
        information_criteria(&self.residuals, self.lag_order)
    }

    /// One-step prediction from `history`, whose last element is the most
    /// recent observation. Only the last `lag_order` entries are used.
    pub(crate) fn predict_next(&self, history: &VecDeque<Array1<f64>>) -> Array1<f64> {
        let mut next = self.intercept.clone();
        let len = history.len();
        for (l, coef) in self.coefficients.iter().enumerate() {
            next += &coef.dot(&history[len - 1 - l]);
        }
        next
    }

    /// Moving-average coefficient matrices `Φ_0 .. Φ_horizon` (impulse
    /// responses to a unit shock, not orthogonalised).
    pub fn impulse_responses(&self, horizon: usize) -> Vec<Array2<f64>> {
        let k = self.n_vars();
        let mut phis: Vec<Array2<f64>> = Vec::with_capacity(horizon + 1);
        phis.push(Array2::eye(k));
        for h in 1..=horizon {
            let mut phi = Array2::<f64>::zeros((k, k));
            for l in 1..=h.min(self.lag_order) {
                phi += &phis[h - l].dot(&self.coefficients[l - 1]);
            }
            phis.push(phi);
        }
        phis
    }
}

impl fmt::Display for FittedVarModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ic = self.information_criteria();
        writeln!(
            f,
            "VAR({}) with intercept: {} variables, {} observations",
            self.lag_order,
            self.n_vars(),
            self.n_obs()
        )?;
        writeln!(
            f,
            "AIC {:.4}  BIC {:.4}  HQIC {:.4}  FPE {:.4e}",
            ic.aic, ic.bic, ic.hqic, ic.fpe
        )?;
        for (i, name) in self.variables.iter().enumerate() {
            writeln!(f)?;
            writeln!(f, "Equation {name}")?;
            writeln!(f, "  {:<16} {:>12.6}", "const", self.intercept[i])?;
            for (l, coef) in self.coefficients.iter().enumerate() {
                for (j, regressor) in self.variables.iter().enumerate() {
                    let label = format!("L{}.{}", l + 1, regressor);
                    writeln!(f, "  {:<16} {:>12.6}", label, coef[[i, j]])?;
                }
            }
        }
        writeln!(f)?;
        writeln!(f, "Residual covariance")?;
        for (i, name) in self.variables.iter().enumerate() {
            write!(f, "  {:<10}", name)?;
            for j in 0..self.n_vars() {
                write!(f, " {:>12.6}", self.sigma_u[[i, j]])?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{simulate_var1, spiral_panel};
    use ndarray::array;

    #[test]
    fn test_fit_recovers_exact_dynamics() {
        let (panel, a, c) = spiral_panel(30);
        let model = fit_var(&panel, 1).unwrap();
        let coef = &model.coefficients()[0];
        for i in 0..2 {
            assert!((model.intercept()[i] - c[i]).abs() < 1e-5);
            for j in 0..2 {
                assert!((coef[[i, j]] - a[[i, j]]).abs() < 1e-5);
            }
        }
        assert!(model.residuals().iter().all(|r| r.abs() < 1e-5));
    }

    #[test]
    fn test_fit_recovers_noisy_dynamics() {
        let a = array![[0.5, 0.0], [0.6, 0.3]];
        let panel = simulate_var1(&a, &[1.0, -0.5], 300, 11);
        let model = fit_var(&panel, 1).unwrap();
        let coef = &model.coefficients()[0];
        for i in 0..2 {
            for j in 0..2 {
                assert!(
                    (coef[[i, j]] - a[[i, j]]).abs() < 0.2,
                    "coef[{i},{j}] = {}",
                    coef[[i, j]]
                );
            }
        }
        assert_eq!(model.n_obs(), 299);
        assert_eq!(model.sigma_u().shape(), &[2, 2]);
    }

    #[test]
    fn test_trailing_window_is_last_observations() {
        let (panel, _, _) = spiral_panel(12);
        let model = fit_var(&panel, 2).unwrap();
        assert_eq!(model.trailing_window().nrows(), 2);
        assert_eq!(model.trailing_years(), &panel.years()[10..]);
        assert_eq!(model.trailing_window().row(1), panel.last_row().unwrap());
        assert_eq!(model.last_year(), *panel.years().last().unwrap());
    }

    #[test]
    fn test_insufficient_rows() {
        let panel = TimeSeriesPanel::from_columns(
            vec![2000, 2001],
            &[("wine", vec![1.0, 2.0]), ("beer", vec![3.0, 4.0])],
        )
        .unwrap();
        let err = fit_var(&panel, 2).unwrap_err();
        assert!(matches!(
            err,
            VarError::InsufficientData {
                required: 3,
                available: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_single_variable_rejected() {
        let panel =
            TimeSeriesPanel::from_columns(vec![2000, 2001, 2002], &[("wine", vec![1.0, 2.0, 4.0])])
                .unwrap();
        assert!(matches!(
            fit_var(&panel, 1),
            Err(VarError::InsufficientData { what: "variables", .. })
        ));
    }

    #[test]
    fn test_zero_lag_rejected() {
        let (panel, _, _) = spiral_panel(10);
        assert!(matches!(fit_var(&panel, 0), Err(VarError::InvalidConfig(_))));
    }

    #[test]
    fn test_log_det_spd() {
        let a = array![[4.0, 2.0], [2.0, 3.0]];
        let ld = log_det_spd(&a).unwrap();
        assert!((ld - 8.0f64.ln()).abs() < 1e-12);
        assert!(log_det_spd(&array![[1.0, 2.0], [2.0, 1.0]]).is_none());
    }

    #[test]
    fn test_impulse_responses_var1_are_powers() {
        let (panel, _, _) = spiral_panel(30);
        let model = fit_var(&panel, 1).unwrap();
        let irf = model.impulse_responses(3);
        assert_eq!(irf.len(), 4);
        assert_eq!(irf[0], Array2::<f64>::eye(2));
        let a = &model.coefficients()[0];
        let a3 = a.dot(a).dot(a);
        for (x, y) in irf[3].iter().zip(a3.iter()) {
            assert!((x - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_summary_mentions_every_equation() {
        let (panel, _, _) = spiral_panel(20);
        let model = fit_var(&panel, 1).unwrap();
        let text = model.to_string();
        assert!(text.contains("VAR(1)"));
        assert!(text.contains("Equation x"));
        assert!(text.contains("Equation y"));
        assert!(text.contains("L1.y"));
    }
}
