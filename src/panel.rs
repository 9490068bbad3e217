use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, HashSet};
use std::hash::{Hash, Hasher};

use ndarray::{concatenate, s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::Serialize;

use crate::defaults::VARIANCE_EPS;
use crate::types::VarError;

/// Year-indexed multivariate panel.
///
/// Invariants, checked at construction:
/// - years are strictly increasing,
/// - variable names are unique and there is at least one,
/// - `values` has one row per year and one column per variable,
/// - every value is finite.
///
/// A panel is never modified in place; every transformation returns a new one.
///
/// # Example
/// ```
/// use alco_var::TimeSeriesPanel;
/// use ndarray::array;
///
/// let panel = TimeSeriesPanel::new(
///     vec![2000, 2001, 2002],
///     vec!["wine".to_string(), "beer".to_string()],
///     array![[1.0, 10.0], [1.5, 11.0], [2.0, 12.5]],
/// )
/// .unwrap();
/// let diff = panel.difference();
/// assert_eq!(diff.years(), &[2001, 2002]);
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct TimeSeriesPanel {
    years: Vec<i32>,
    variables: Vec<String>,
    values: Array2<f64>,
}

/// One serialisable row of a panel.
#[derive(Clone, Debug, Serialize)]
pub struct PanelRecord {
    pub year: i32,
    pub values: BTreeMap<String, f64>,
}

impl TimeSeriesPanel {
    pub fn new(
        years: Vec<i32>,
        variables: Vec<String>,
        values: Array2<f64>,
    ) -> Result<Self, VarError> {
        if variables.is_empty() {
            return Err(VarError::EmptyInput);
        }
        if values.nrows() != years.len() || values.ncols() != variables.len() {
            return Err(VarError::LengthMismatch);
        }
        let mut seen = HashSet::with_capacity(variables.len());
        for name in &variables {
            if name.is_empty() {
                return Err(VarError::InvalidConfig(
                    "variable names must not be empty".to_string(),
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(VarError::InvalidConfig(format!(
                    "duplicate variable name '{name}'"
                )));
            }
        }
        if let Some(w) = years.windows(2).find(|w| w[1] <= w[0]) {
            return Err(VarError::InvalidConfig(format!(
                "years must be strictly increasing ({} followed by {})",
                w[0], w[1]
            )));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(VarError::InvalidConfig(
                "panel values must be finite".to_string(),
            ));
        }
        Ok(Self {
            years,
            variables,
            values,
        })
    }

    /// Build a panel from named columns of equal length.
    pub fn from_columns(years: Vec<i32>, columns: &[(&str, Vec<f64>)]) -> Result<Self, VarError> {
        if columns.is_empty() {
            return Err(VarError::EmptyInput);
        }
        let rows = years.len();
        let mut values = Array2::<f64>::zeros((rows, columns.len()));
        for (j, (_, col)) in columns.iter().enumerate() {
            if col.len() != rows {
                return Err(VarError::LengthMismatch);
            }
            values.column_mut(j).assign(&ArrayView1::from(col.as_slice()));
        }
        let variables = columns.iter().map(|(n, _)| n.to_string()).collect();
        Self::new(years, variables, values)
    }

    pub fn years(&self) -> &[i32] {
        &self.years
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn len(&self) -> usize {
        self.years.len()
    }

    pub fn is_empty(&self) -> bool {
        self.years.is_empty()
    }

    pub fn n_vars(&self) -> usize {
        self.variables.len()
    }

    pub fn first_year(&self) -> Option<i32> {
        self.years.first().copied()
    }

    pub fn last_year(&self) -> Option<i32> {
        self.years.last().copied()
    }

    pub fn index_of(&self, name: &str) -> Result<usize, VarError> {
        self.variables
            .iter()
            .position(|v| v == name)
            .ok_or_else(|| VarError::UnknownVariable(name.to_string()))
    }

    pub fn column(&self, name: &str) -> Result<ArrayView1<'_, f64>, VarError> {
        let idx = self.index_of(name)?;
        Ok(self.values.column(idx))
    }

    pub fn row(&self, idx: usize) -> Option<ArrayView1<'_, f64>> {
        (idx < self.len()).then(|| self.values.row(idx))
    }

    pub fn last_row(&self) -> Option<ArrayView1<'_, f64>> {
        self.len().checked_sub(1).map(|i| self.values.row(i))
    }

    /// Restrict the panel to a subset of variables, in the order given.
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Self, VarError> {
        if names.is_empty() {
            return Err(VarError::EmptyInput);
        }
        let idx = names
            .iter()
            .map(|n| self.index_of(n.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        let values = self.values.select(Axis(1), &idx);
        let variables = idx.iter().map(|&i| self.variables[i].clone()).collect();
        Self::new(self.years.clone(), variables, values)
    }

    /// Rows whose year lies in `start..=end`.
    pub fn between(&self, start: i32, end: i32) -> Self {
        let idx: Vec<usize> = self
            .years
            .iter()
            .enumerate()
            .filter(|(_, &y)| y >= start && y <= end)
            .map(|(i, _)| i)
            .collect();
        self.take_rows(&idx)
    }

    /// Split into (years <= cutoff, years > cutoff). Either side may be empty.
    pub fn split_at_year(&self, cutoff: i32) -> (Self, Self) {
        let split = self.years.partition_point(|&y| y <= cutoff);
        let head: Vec<usize> = (0..split).collect();
        let tail: Vec<usize> = (split..self.len()).collect();
        (self.take_rows(&head), self.take_rows(&tail))
    }

    fn take_rows(&self, idx: &[usize]) -> Self {
        Self {
            years: idx.iter().map(|&i| self.years[i]).collect(),
            variables: self.variables.clone(),
            values: self.values.select(Axis(0), idx),
        }
    }

    /// First-order difference: `row[i] - row[i-1]`, dated at year `i`.
    /// The first row has no predecessor and is dropped.
    pub fn difference(&self) -> Self {
        if self.len() < 2 {
            return self.take_rows(&[]);
        }
        let values = &self.values.slice(s![1.., ..]) - &self.values.slice(s![..-1, ..]);
        Self {
            years: self.years[1..].to_vec(),
            variables: self.variables.clone(),
            values,
        }
    }

    /// Cumulative sum of the rows added to `base`, keeping the same years.
    pub fn accumulate_from(&self, base: ArrayView1<f64>) -> Result<Self, VarError> {
        if base.len() != self.n_vars() {
            return Err(VarError::LengthMismatch);
        }
        let mut values = self.values.clone();
        let mut running = base.to_owned();
        for mut row in values.rows_mut() {
            running += &row;
            row.assign(&running);
        }
        Self::new(self.years.clone(), self.variables.clone(), values)
    }

    /// Undo [`difference`](Self::difference): prepend the seed row at
    /// `seed_year` and cumulatively sum the differences onto it.
    pub fn cumulate(&self, seed_year: i32, seed: ArrayView1<f64>) -> Result<Self, VarError> {
        let levels = self.accumulate_from(seed)?;
        let mut years = Vec::with_capacity(self.len() + 1);
        years.push(seed_year);
        years.extend_from_slice(&levels.years);
        let seed_row = seed.to_owned().insert_axis(Axis(0));
        let values = concatenate(Axis(0), &[seed_row.view(), levels.values.view()])
            .map_err(|e| VarError::Linalg(e.to_string()))?;
        Self::new(years, self.variables.clone(), values)
    }

    /// Copy of the panel whose last row has the given variables replaced.
    pub fn with_last_row(&self, overrides: &BTreeMap<String, f64>) -> Result<Self, VarError> {
        let last = self
            .len()
            .checked_sub(1)
            .ok_or(VarError::InsufficientData {
                what: "observations",
                required: 1,
                available: 0,
            })?;
        let mut values = self.values.clone();
        for (name, &value) in overrides {
            let j = self.index_of(name)?;
            if !value.is_finite() {
                return Err(VarError::InvalidConfig(format!(
                    "override for '{name}' must be finite"
                )));
            }
            values[[last, j]] = value;
        }
        Self::new(self.years.clone(), self.variables.clone(), values)
    }

    /// Pearson correlation matrix between variables. Constant columns
    /// correlate as 0 with everything except themselves.
    pub fn correlation(&self) -> Array2<f64> {
        let k = self.n_vars();
        let mut corr = Array2::<f64>::eye(k);
        if self.len() < 2 {
            return corr;
        }
        let means = self
            .values
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(k));
        let centred = &self.values - &means;
        for a in 0..k {
            for b in (a + 1)..k {
                let ca = centred.column(a);
                let cb = centred.column(b);
                let denom = (ca.dot(&ca) * cb.dot(&cb)).sqrt();
                let r = if denom <= VARIANCE_EPS {
                    0.0
                } else {
                    ca.dot(&cb) / denom
                };
                corr[[a, b]] = r;
                corr[[b, a]] = r;
            }
        }
        corr
    }

    pub fn records(&self) -> Vec<PanelRecord> {
        self.years
            .iter()
            .zip(self.values.rows())
            .map(|(&year, row)| PanelRecord {
                year,
                values: self
                    .variables
                    .iter()
                    .cloned()
                    .zip(row.iter().copied())
                    .collect(),
            })
            .collect()
    }

    /// Stable hash of years, names and value bits, used for cache keys.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.years.hash(&mut hasher);
        self.variables.hash(&mut hasher);
        for v in self.values.iter() {
            v.to_bits().hash(&mut hasher);
        }
        hasher.finish()
    }
}
