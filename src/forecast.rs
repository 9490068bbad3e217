use std::collections::VecDeque;

use ndarray::{Array1, Array2};
use tracing::debug;

use crate::panel::TimeSeriesPanel;
use crate::types::{ForecastResult, VarError};
use crate::var::FittedVarModel;

/// Recursive multi-step forecast.
///
/// `ŷ_{T+h} = c + Σ_l A_l ŷ_{T+h-l}`, seeded with the model's trailing window;
/// each prediction is fed back as an observation for the next step. Rows are
/// dated `last_year + 1 ..= last_year + steps`.
///
/// # Errors
/// `VarError::InvalidSteps` if `steps` is 0.
pub fn forecast(model: &FittedVarModel, steps: usize) -> Result<ForecastResult, VarError> {
    if steps == 0 {
        return Err(VarError::InvalidSteps(steps));
    }
    let p = model.lag_order();
    let k = model.n_vars();

    let mut window: VecDeque<Array1<f64>> = model
        .trailing_window()
        .rows()
        .into_iter()
        .map(|r| r.to_owned())
        .collect();

    let mut values = Array2::<f64>::zeros((steps, k));
    for h in 0..steps {
        let next = model.predict_next(&window);
        values.row_mut(h).assign(&next);
        window.push_back(next);
        if window.len() > p {
            window.pop_front();
        }
    }

    let last = model.last_year();
    let years: Vec<i32> = (1..=steps as i32).map(|h| last + h).collect();
    debug!(steps, first_year = last + 1, "forecast");

    let panel = TimeSeriesPanel::new(years, model.variables().to_vec(), values)?;
    Ok(ForecastResult {
        lag_order: p,
        panel,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{simulate_var1, spiral_panel};
    use crate::var::fit_var;
    use ndarray::{array, s};

    #[test]
    fn test_forecast_years_and_shape() {
        let (panel, _, _) = spiral_panel(20);
        let model = fit_var(&panel, 1).unwrap();
        let fc = forecast(&model, 4).unwrap();
        assert_eq!(fc.len(), 4);
        assert_eq!(fc.variables(), panel.variables());
        let last = panel.last_year().unwrap();
        assert_eq!(fc.years(), &[last + 1, last + 2, last + 3, last + 4]);
        assert_eq!(fc.lag_order, 1);
    }

    #[test]
    fn test_zero_steps_rejected() {
        let (panel, _, _) = spiral_panel(20);
        let model = fit_var(&panel, 1).unwrap();
        assert!(matches!(forecast(&model, 0), Err(VarError::InvalidSteps(0))));
    }

    #[test]
    fn test_continues_exact_dynamics() {
        let (panel, a, c) = spiral_panel(40);
        let (train, test) = panel.split_at_year(panel.years()[29]);
        let model = fit_var(&train, 1).unwrap();
        let fc = forecast(&model, test.len()).unwrap();

        // the generating recursion continues the training sample
        let mut state = train.last_row().unwrap().to_owned();
        for h in 0..test.len() {
            state = &c + &a.dot(&state);
            for j in 0..2 {
                assert!((fc.panel.values()[[h, j]] - state[j]).abs() < 1e-4);
                assert!((fc.panel.values()[[h, j]] - test.values()[[h, j]]).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn test_matches_manual_recursion_var2() {
        let a = array![[0.4, 0.1], [0.2, 0.3]];
        let panel = simulate_var1(&a, &[1.0, 0.5], 80, 9);
        let model = fit_var(&panel, 2).unwrap();
        let fc = forecast(&model, 3).unwrap();

        let coefs = model.coefficients();
        let mut hist: Vec<Array1<f64>> = panel
            .values()
            .slice(s![78.., ..])
            .rows()
            .into_iter()
            .map(|r| r.to_owned())
            .collect();
        for h in 0..3 {
            let n = hist.len();
            let next = model.intercept() + &coefs[0].dot(&hist[n - 1]) + &coefs[1].dot(&hist[n - 2]);
            for j in 0..2 {
                assert!((fc.panel.values()[[h, j]] - next[j]).abs() < 1e-10);
            }
            hist.push(next);
        }
    }

    #[test]
    fn test_integrate_differenced_forecast() {
        let (panel, _, _) = spiral_panel(30);
        let diff = panel.difference();
        let model = fit_var(&diff, 1).unwrap();
        let fc = forecast(&model, 3).unwrap();
        let last = panel.last_row().unwrap();
        let levels = fc.integrate(last).unwrap();

        assert_eq!(levels.years(), fc.years());
        for j in 0..2 {
            let expected = last[j] + fc.panel.values()[[0, j]] + fc.panel.values()[[1, j]];
            assert!((levels.panel.values()[[1, j]] - expected).abs() < 1e-12);
        }
    }
}
