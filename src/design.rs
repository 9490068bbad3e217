use crate::types::{LagOrder, VarError};
use ndarray::{s, Array2, ArrayView1, ArrayView2};

/// Validate that `n` observations leave at least one row after burn-in.
///
/// Returns the number of usable rows.
pub(crate) fn rows_after_burn_in(n: usize, burn_in: usize) -> Result<usize, VarError> {
    if n <= burn_in {
        return Err(VarError::InsufficientData {
            what: "observations",
            required: burn_in + 1,
            available: n,
        });
    }
    Ok(n - burn_in)
}

/// Build the VAR regression design for `lags` lags.
///
/// Columns are lag-major blocks: `[y1_{t-1}, .., yk_{t-1}, y1_{t-2}, ..]`.
/// Rows start at `lags + offset`, so several lag orders can be compared on a
/// common sample by raising `offset` for the shorter ones.
///
/// Returns `(X, Y)` where `Y` holds the contemporaneous observations.
pub(crate) fn lagged_design(
    values: ArrayView2<f64>,
    lags: LagOrder,
    offset: usize,
) -> Result<(Array2<f64>, Array2<f64>), VarError> {
    let (n, k) = values.dim();
    let burn_in = lags + offset;
    let rows = rows_after_burn_in(n, burn_in)?;

    let mut x = Array2::<f64>::zeros((rows, k * lags));
    for lag in 1..=lags {
        let block = values.slice(s![burn_in - lag..n - lag, ..]);
        x.slice_mut(s![.., (lag - 1) * k..lag * k]).assign(&block);
    }
    let y = values.slice(s![burn_in.., ..]).to_owned();
    Ok((x, y))
}

/// Lagged copies of the given series, `lags` columns per series.
///
/// Column order is series-major: `[a_{t-1}, .., a_{t-L}, b_{t-1}, ..]`.
pub(crate) fn lag_columns(
    series: &[ArrayView1<f64>],
    lags: LagOrder,
) -> Result<Array2<f64>, VarError> {
    let n = series.first().map(|s| s.len()).ok_or(VarError::EmptyInput)?;
    if series.iter().any(|s| s.len() != n) {
        return Err(VarError::LengthMismatch);
    }
    let rows = rows_after_burn_in(n, lags)?;

    let mut x = Array2::<f64>::zeros((rows, series.len() * lags));
    let mut col = 0;
    for column in series {
        for lag in 1..=lags {
            x.column_mut(col).assign(&column.slice(s![lags - lag..n - lag]));
            col += 1;
        }
    }
    Ok(x)
}
