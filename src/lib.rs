//! # alco_var
//!
//! Vector autoregression (VAR) forecasting and Granger-causality analysis for
//! a small annual panel of per-capita alcohol consumption.
//!
//! The pipeline is a handful of pure functions over an immutable
//! [`TimeSeriesPanel`]:
//!
//! * **Stationarity**: ADF tests on levels and first differences
//! * **Lag selection**: AIC / BIC / FPE / HQIC table over candidate lag orders
//! * **Estimation**: equation-by-equation least squares for VAR(p)
//! * **Forecasting**: recursive multi-step prediction
//! * **Causality**: pairwise Granger F-tests
//! * **Scenarios**: backtests against held-out years and what-if overrides
//!
//! ## Example
//!
//! ```
//! use alco_var::{fit_var, forecast, TimeSeriesPanel};
//!
//! let years: Vec<i32> = (2000..2026).collect();
//! let wine: Vec<f64> = (0..26).map(|i| 1.0 + 0.5 * i as f64).collect();
//! let beer: Vec<f64> = (0..26).map(|i| 20.0 + 2.0 * i as f64).collect();
//! let panel = TimeSeriesPanel::from_columns(years, &[("wine", wine), ("beer", beer)]).unwrap();
//!
//! let model = fit_var(&panel, 1).unwrap();
//! let fc = forecast(&model, 3).unwrap();
//! assert_eq!(fc.years(), &[2026, 2027, 2028]);
//! println!("{model}");
//! ```

// Module declarations
pub mod cache;
mod causality;
pub mod config;
pub mod data;
mod defaults;
mod design;
mod dist;
mod forecast;
mod ols;
mod panel;
mod scenario;
mod select;
mod stationarity;
mod types;
mod var;

// Re-export public types
pub use panel::{PanelRecord, TimeSeriesPanel};
pub use types::{
    AdfTest, BacktestResult, CausalityResult, ForecastAccuracy, ForecastResult, GrangerTest,
    IcKind, LagCriteria, LagOrder, LagOrderSelection, SeriesStationarity, StationarityReport,
    VarError, VariablePair, WhatIfResult,
};
pub use var::FittedVarModel;

// Re-export main public functions
pub use causality::{granger_causality, granger_test};
pub use data::{load_panel, prepare_panel, IngestOptions};
pub use defaults::{
    DEFAULT_CAUSALITY_LAG, DEFAULT_FORECAST_STEPS, DEFAULT_LAG_ORDER, DEFAULT_MAX_LAG,
    SIGNIFICANCE_LEVEL,
};
pub use forecast::forecast;
pub use scenario::{backtest, backtest_with_lag, what_if, what_if_with_lag};
pub use select::select_lag_order;
pub use stationarity::{adf_test, analyze_stationarity, mackinnon_p};
pub use var::fit_var;


#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::collections::BTreeMap;

    fn trend_panel() -> TimeSeriesPanel {
        let years: Vec<i32> = (2000..2026).collect();
        let wine = (0..26).map(|i| 1.0 + 0.5 * i as f64).collect();
        let beer = (0..26).map(|i| 20.0 + 2.0 * i as f64).collect();
        TimeSeriesPanel::from_columns(years, &[("wine", wine), ("beer", beer)]).unwrap()
    }

    fn consumption_csv() -> String {
        let mut s = "Year,Type,Consumption of alcoholic beverages (in liters per capita)\n".to_string();
        let wine = testutil::ar1(0.4, 30, 21);
        let beer = testutil::random_walk(30, 22);
        let vodka = testutil::ar1(0.2, 30, 23);
        let brandy = testutil::ar1(0.6, 30, 24);
        for i in 0..30 {
            let year = 1994 + i;
            s.push_str(&format!("{year},Wine,{}\n", 5.0 + wine[i]));
            s.push_str(&format!("{year},Beer and Cider,{}\n", 50.0 + beer[i]));
            s.push_str(&format!("{year},Vodka and Liqueurs,{}\n", 12.0 + vodka[i]));
            s.push_str(&format!("{year},Brandy,{}\n", 0.5 + 0.1 * brandy[i]));
            s.push_str(&format!("{year},Champagne,0.3\n"));
        }
        s
    }

    #[test]
    fn test_linear_trend_forecast_stays_on_trend() {
        let panel = trend_panel();
        let model = fit_var(&panel, 1).unwrap();
        let fc = forecast(&model, 3).unwrap();

        assert_eq!(fc.years(), &[2026, 2027, 2028]);
        for (h, row) in fc.panel.values().rows().into_iter().enumerate() {
            let i = (26 + h) as f64;
            assert!((row[0] - (1.0 + 0.5 * i)).abs() < 1e-4, "wine {}", row[0]);
            assert!((row[1] - (20.0 + 2.0 * i)).abs() < 1e-4, "beer {}", row[1]);
        }
    }

    #[test]
    fn test_difference_then_cumulate_round_trips() {
        let panel = trend_panel();
        let diff = panel.difference();
        let seed = panel.row(0).unwrap();
        let back = diff.cumulate(panel.years()[0], seed).unwrap();
        assert_eq!(back.years(), panel.years());
        for (a, b) in back.values().iter().zip(panel.values().iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_trend_backtest_and_what_if() {
        let panel = trend_panel();
        let bt = backtest(&panel, 2020).unwrap();
        assert_eq!(bt.forecast.len(), 5);
        assert!(bt.accuracy.iter().all(|a| a.rmse < 1e-4));

        let res = what_if(&panel, &BTreeMap::new(), 2).unwrap();
        assert_eq!(res.scenario.panel, res.baseline.panel);
    }

    #[test]
    fn test_full_pipeline_from_csv() {
        let panel = prepare_panel(consumption_csv().as_bytes(), &IngestOptions::default()).unwrap();
        assert_eq!(panel.len(), 30);
        assert_eq!(panel.variables(), &["wine", "beer", "vodka", "brandy"]);

        let (diff, report) = analyze_stationarity(&panel).unwrap();
        assert_eq!(report.series.len(), 4);
        assert_eq!(diff.len(), 29);

        let sel = select_lag_order(&diff, DEFAULT_MAX_LAG).unwrap();
        assert_eq!(sel.table.len(), DEFAULT_MAX_LAG + 1);

        let model = fit_var(&panel, DEFAULT_LAG_ORDER).unwrap();
        let fc = forecast(&model, DEFAULT_FORECAST_STEPS).unwrap();
        assert_eq!(fc.len(), 5);
        assert_eq!(fc.years()[0], 2024);

        let vars = panel.variables().to_vec();
        let causality = granger_causality(&diff, &vars, DEFAULT_CAUSALITY_LAG).unwrap();
        assert_eq!(causality.len(), 12);
        assert!(causality
            .p_values
            .values()
            .all(|p| (0.0..=1.0).contains(p)));
    }
}
