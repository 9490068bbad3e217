//! Default constants for estimation, testing and scenario runs.

pub const DEFAULT_LAG_ORDER: usize = 1;
pub const DEFAULT_MAX_LAG: usize = 3;
pub const DEFAULT_CAUSALITY_LAG: usize = 1;
pub const DEFAULT_FORECAST_STEPS: usize = 5;
pub const SIGNIFICANCE_LEVEL: f64 = 0.05;
pub const DEFAULT_RIDGE_JITTER: f64 = 1e-10;
pub const DEFAULT_VALUE_COLUMN: &str = "Consumption of alcoholic beverages (in liters per capita)";
pub const VARIANCE_EPS: f64 = 1e-12;
