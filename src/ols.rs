use crate::defaults::{DEFAULT_RIDGE_JITTER, VARIANCE_EPS};
use crate::types::VarError;
use linfa::dataset::Dataset;
use linfa::traits::Fit;
use linfa_linear::LinearRegression;
use ndarray::{Array1, Array2, ArrayView1, Axis};

/// Least-squares fit of one equation with an intercept.
#[derive(Clone, Debug)]
pub(crate) struct LinearFit {
    pub params: Array1<f64>,
    pub intercept: f64,
    pub residuals: Array1<f64>,
}

impl LinearFit {
    pub fn rss(&self) -> f64 {
        self.residuals.dot(&self.residuals)
    }
}

/// Augment design matrix and target for ridge regression via Tikhonov method.
///
/// Implements ridge regression as: min ||[X; sqrt(λ)I]β - [y; 0]||²
/// This is equivalent to: min ||Xβ - y||² + λ||β||²
fn augment_for_ridge(
    x_raw: &Array2<f64>,
    y: &Array1<f64>,
    lambda: f64,
) -> (Array2<f64>, Array1<f64>) {
    if lambda <= 0.0 {
        return (x_raw.clone(), y.clone());
    }

    let (n, p) = x_raw.dim();
    let sqrt_l = lambda.sqrt();

    let mut x_aug = Array2::<f64>::zeros((n + p, p));
    x_aug.slice_mut(ndarray::s![0..n, ..]).assign(x_raw);
    for j in 0..p {
        x_aug[[n + j, j]] = sqrt_l;
    }

    let mut y_aug = Array1::<f64>::zeros(n + p);
    y_aug.slice_mut(ndarray::s![0..n]).assign(y);

    (x_aug, y_aug)
}

/// Ridge strength relative to the average column energy of the centred design.
fn jitter_for(x_centred: &Array2<f64>) -> f64 {
    let p = x_centred.ncols().max(1) as f64;
    let energy: f64 = x_centred.iter().map(|v| v * v).sum();
    DEFAULT_RIDGE_JITTER * (energy / p).max(1.0)
}

/// Fit `y = intercept + X β` by least squares using Linfa.
///
/// The design is centred (so the intercept is never penalised) and solved with
/// a vanishing ridge term; rank-deficient designs, e.g. perfectly collinear
/// trends, still get a stable minimum-norm-like solution. For full-rank data
/// the result matches plain OLS to ~1e-10 relative.
pub(crate) fn fit_with_intercept(x: &Array2<f64>, y: &Array1<f64>) -> Result<LinearFit, VarError> {
    let (n, p) = x.dim();
    if n == 0 {
        return Err(VarError::EmptyInput);
    }
    if y.len() != n {
        return Err(VarError::LengthMismatch);
    }

    let y_mean = y.mean().unwrap_or(0.0);
    if p == 0 {
        return Ok(LinearFit {
            params: Array1::zeros(0),
            intercept: y_mean,
            residuals: y - y_mean,
        });
    }

    let x_mean = x.mean_axis(Axis(0)).ok_or(VarError::EmptyInput)?;
    let x_c = x - &x_mean;
    let y_c = y - y_mean;

    let (x_used, y_used) = augment_for_ridge(&x_c, &y_c, jitter_for(&x_c));
    let dataset = Dataset::new(x_used, y_used);
    let fitted = LinearRegression::new()
        .with_intercept(false)
        .fit(&dataset)
        .map_err(|e| VarError::Linalg(format!("{:?}", e)))?;

    let params = fitted.params().to_owned();
    if params.iter().any(|v| !v.is_finite()) {
        return Err(VarError::Linalg(
            "least squares produced non-finite coefficients".to_string(),
        ));
    }
    let intercept = y_mean - x_mean.dot(&params);
    let residuals = y - &(x.dot(&params) + intercept);

    Ok(LinearFit {
        params,
        intercept,
        residuals,
    })
}

/// Coefficient and t-statistic of column `col` in `y = c + X β`.
///
/// Uses Frisch-Waugh-Lovell partialling: both `y` and `X[:, col]` are
/// residualised on the remaining columns, and the slope between the two
/// residual series equals the full-model coefficient.
pub(crate) fn partial_t_stat(
    x: &Array2<f64>,
    y: &Array1<f64>,
    col: usize,
) -> Result<(f64, f64), VarError> {
    let (n, p) = x.dim();
    if col >= p {
        return Err(VarError::InvalidConfig(format!(
            "column {col} out of range for {p} regressors"
        )));
    }
    let df = n
        .checked_sub(p + 1)
        .filter(|&d| d > 0)
        .ok_or(VarError::InsufficientData {
            what: "observations for the regression",
            required: p + 2,
            available: n,
        })?;

    let others: Vec<usize> = (0..p).filter(|&j| j != col).collect();
    let x_others = x.select(Axis(1), &others);
    let e_y = fit_with_intercept(&x_others, y)?.residuals;
    let e_x = fit_with_intercept(&x_others, &x.column(col).to_owned())?.residuals;

    let sxx = e_x.dot(&e_x);
    if sxx <= VARIANCE_EPS {
        return Err(VarError::DegenerateSeries(
            "regressor has no variation after partialling".to_string(),
        ));
    }
    let beta = e_x.dot(&e_y) / sxx;
    let resid = &e_y - &(&e_x * beta);
    let s2 = resid.dot(&resid) / df as f64;
    let se = (s2 / sxx).sqrt();
    if !se.is_finite() || se <= 0.0 {
        return Err(VarError::DegenerateSeries(
            "regression fits exactly; t-statistic undefined".to_string(),
        ));
    }
    Ok((beta, beta / se))
}

/// Compute RMSE and MAE between actual and predicted values.
pub(crate) fn compute_metrics(y_actual: ArrayView1<f64>, y_pred: ArrayView1<f64>) -> (f64, f64) {
    let n = y_actual.len().max(1) as f64;
    let (sq, abs) = y_actual
        .iter()
        .zip(y_pred.iter())
        .fold((0.0, 0.0), |(sq, abs), (a, b)| {
            let d = a - b;
            (sq + d * d, abs + d.abs())
        });
    ((sq / n).sqrt(), abs / n)
}

/// Information criterion from residual sum of squares for a single equation:
/// `n * ln(RSS/n) + penalty * k`.
pub(crate) fn aic_from_rss(rss: f64, k: usize, n: usize) -> f64 {
    let n_f = n as f64;
    let ll_term = n_f * (rss / n_f).max(1e-300).ln();
    ll_term + 2.0 * (k as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_ols_simple() {
        // y = 1 + 2x
        let x = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y = array![3.0, 5.0, 7.0, 9.0, 11.0];
        let fit = fit_with_intercept(&x, &y).unwrap();
        assert!((fit.params[0] - 2.0).abs() < 1e-6);
        assert!((fit.intercept - 1.0).abs() < 1e-6);
        assert!(fit.rss() < 1e-10);
    }

    #[test]
    fn test_ols_two_regressors() {
        let x = array![
            [1.0, 0.5],
            [2.0, -1.0],
            [3.0, 2.0],
            [4.0, 0.0],
            [5.0, 1.5],
            [6.0, -0.5]
        ];
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .map(|r| 4.0 + 0.7 * r[0] - 1.3 * r[1])
            .collect();
        let fit = fit_with_intercept(&x, &y).unwrap();
        assert!((fit.params[0] - 0.7).abs() < 1e-6);
        assert!((fit.params[1] + 1.3).abs() < 1e-6);
        assert!((fit.intercept - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_collinear_design_still_fits() {
        // Second column is an exact multiple of the first.
        let x = array![[1.0, 2.0], [2.0, 4.0], [3.0, 6.0], [4.0, 8.0]];
        let y = array![2.0, 3.0, 4.0, 5.0];
        let fit = fit_with_intercept(&x, &y).unwrap();
        assert!(fit.rss() < 1e-8);
    }

    #[test]
    fn test_intercept_only() {
        let x = Array2::<f64>::zeros((4, 0));
        let y = array![1.0, 2.0, 3.0, 4.0];
        let fit = fit_with_intercept(&x, &y).unwrap();
        assert_eq!(fit.intercept, 2.5);
        assert!((fit.rss() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_ridge_augmentation() {
        let x = Array2::from_shape_vec((3, 2), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let y = Array1::from_vec(vec![1.0, 2.0, 3.0]);
        let lambda = 0.5;

        let (x_aug, y_aug) = augment_for_ridge(&x, &y, lambda);

        assert_eq!(x_aug.shape(), &[5, 2]);
        assert_eq!(y_aug.len(), 5);
        assert_eq!(x_aug[[0, 0]], 1.0);
        let sqrt_lambda = lambda.sqrt();
        assert!((x_aug[[3, 0]] - sqrt_lambda).abs() < 1e-10);
        assert!((x_aug[[4, 1]] - sqrt_lambda).abs() < 1e-10);
        assert!((x_aug[[3, 1]]).abs() < 1e-10);
        assert_eq!(y_aug[4], 0.0);
    }

    #[test]
    fn test_partial_t_stat_matches_slope() {
        let x = array![
            [1.0, 3.0],
            [2.0, 1.0],
            [3.0, 4.0],
            [4.0, 1.0],
            [5.0, 5.0],
            [6.0, 9.0],
            [7.0, 2.0]
        ];
        let noise = [0.1, -0.2, 0.05, 0.15, -0.1, 0.0, -0.05];
        let y: Array1<f64> = x
            .rows()
            .into_iter()
            .zip(noise.iter())
            .map(|(r, e)| 1.0 + 2.0 * r[0] + 0.5 * r[1] + e)
            .collect();
        let full = fit_with_intercept(&x, &y).unwrap();
        let (beta, t) = partial_t_stat(&x, &y, 0).unwrap();
        assert!((beta - full.params[0]).abs() < 1e-6);
        assert!(t > 10.0);
    }

    #[test]
    fn test_partial_t_stat_needs_degrees_of_freedom() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0, 2.0];
        let err = partial_t_stat(&x, &y, 0).unwrap_err();
        assert!(matches!(err, VarError::InsufficientData { .. }));
    }

    #[test]
    fn test_compute_metrics() {
        let a = array![1.0, 2.0, 3.0];
        let p = array![1.0, 3.0, 1.0];
        let (rmse, mae) = compute_metrics(a.view(), p.view());
        assert!((rmse - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((mae - 1.0).abs() < 1e-12);
    }
}
