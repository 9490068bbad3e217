use std::cmp::Ordering;

use tracing::debug;

use crate::panel::TimeSeriesPanel;
use crate::types::{IcKind, LagCriteria, LagOrder, LagOrderSelection, VarError};
use crate::var::{estimate, information_criteria};

/// Score VAR(0..=max_lag) by AIC, BIC, FPE and HQIC.
///
/// Every candidate is estimated on the same sample: the first `max_lag`
/// observations are held back as presample regardless of the candidate's own
/// lag order. The result is advisory; nothing downstream consumes it
/// automatically.
///
/// # Errors
/// - `VarError::InvalidConfig` if `max_lag` is 0,
/// - `VarError::InsufficientData` if the panel cannot support VAR(`max_lag`).
pub fn select_lag_order(
    panel: &TimeSeriesPanel,
    max_lag: LagOrder,
) -> Result<LagOrderSelection, VarError> {
    if max_lag == 0 {
        return Err(VarError::InvalidConfig(
            "max_lag must be at least 1".to_string(),
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
    // the largest model needs more observations than regressors per equation
    let required = max_lag + k * max_lag + 2;
    if panel.len() < required {
        return Err(VarError::InsufficientData {
            what: "observations for lag selection",
            required,
            available: panel.len(),
        });
    }

    let mut table = Vec::with_capacity(max_lag + 1);
    for p in 0..=max_lag {
        let est = estimate(panel.values(), p, max_lag - p)?;
        let criteria = information_criteria(&est.residuals, p);
        debug!(
            lag = p,
            aic = criteria.aic,
            bic = criteria.bic,
            fpe = criteria.fpe,
            hqic = criteria.hqic,
            "lag candidate"
        );
        table.push(criteria);
    }

    let n_obs = panel.len() - max_lag;
    Ok(LagOrderSelection {
        max_lag,
        n_obs,
        aic: argmin(&table, IcKind::Aic),
        bic: argmin(&table, IcKind::Bic),
        fpe: argmin(&table, IcKind::Fpe),
        hqic: argmin(&table, IcKind::Hqic),
        table,
    })
}

/// Lag with the smallest criterion value; ties go to the smaller lag.
fn argmin(table: &[LagCriteria], kind: IcKind) -> LagOrder {
    table
        .iter()
        .min_by(|a, b| {
            a.value(kind)
                .partial_cmp(&b.value(kind))
                .unwrap_or(Ordering::Equal)
                .then(a.lag.cmp(&b.lag))
        })
        .map(|c| c.lag)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::simulate_var1;
    use ndarray::array;

    #[test]
    fn test_bic_recovers_var1() {
        let a = array![[0.6, 0.2], [-0.3, 0.5]];
        let panel = simulate_var1(&a, &[0.5, 1.0], 200, 42);
        let sel = select_lag_order(&panel, 4).unwrap();
        assert_eq!(sel.bic, 1);
        assert_eq!(sel.selected(IcKind::Bic), 1);
    }

    #[test]
    fn test_table_shape_and_common_sample() {
        let a = array![[0.5, 0.1], [0.0, 0.4]];
        let panel = simulate_var1(&a, &[0.0, 0.0], 60, 5);
        let sel = select_lag_order(&panel, 3).unwrap();
        assert_eq!(sel.table.len(), 4);
        assert_eq!(sel.n_obs, 57);
        for (i, row) in sel.table.iter().enumerate() {
            assert_eq!(row.lag, i);
            assert!(row.aic.is_finite());
            assert!(row.fpe > 0.0);
        }
        // penalties grow faster for BIC than AIC once T > e^2
        let gap = |row: &LagCriteria| row.bic - row.aic;
        assert!(gap(&sel.table[3]) > gap(&sel.table[0]));
        for kind in IcKind::ALL {
            assert!(sel.selected(kind) <= 3);
        }
    }

    #[test]
    fn test_var0_criteria_match_closed_form() {
        // after the presample row, demeaned residuals give U'U/T = diag(0.5, 2)
        let panel = TimeSeriesPanel::from_columns(
            vec![2000, 2001, 2002, 2003, 2004],
            &[
                ("a", vec![9.0, 4.0, 2.0, 3.0, 3.0]),
                ("b", vec![9.0, 5.0, 5.0, 7.0, 3.0]),
            ],
        )
        .unwrap();
        let sel = select_lag_order(&panel, 1).unwrap();
        let row = &sel.table[0];
        let t = 4.0f64;

        // |Σ̃| = 1, two intercepts, one regressor per equation
        assert_eq!(row.lag, 0);
        assert!((row.aic - 2.0 * 2.0 / t).abs() < 1e-9);
        assert!((row.bic - t.ln() * 2.0 / t).abs() < 1e-9);
        assert!((row.hqic - 2.0 * t.ln().ln() * 2.0 / t).abs() < 1e-9);
        assert!((row.fpe - ((t + 1.0) / (t - 1.0)).powi(2)).abs() < 1e-9);
    }

    #[test]
    fn test_zero_max_lag() {
        let a = array![[0.5, 0.0], [0.0, 0.5]];
        let panel = simulate_var1(&a, &[0.0, 0.0], 30, 1);
        assert!(matches!(
            select_lag_order(&panel, 0),
            Err(VarError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_too_short_for_max_lag() {
        let a = array![[0.5, 0.0], [0.0, 0.5]];
        let panel = simulate_var1(&a, &[0.0, 0.0], 10, 1);
        assert!(matches!(
            select_lag_order(&panel, 4),
            Err(VarError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_argmin_prefers_smaller_lag_on_ties() {
        let row = |lag| LagCriteria {
            lag,
            aic: 1.0,
            bic: 1.0,
            fpe: 1.0,
            hqic: 1.0,
        };
        assert_eq!(argmin(&[row(0), row(1), row(2)], IcKind::Aic), 0);
    }
}
