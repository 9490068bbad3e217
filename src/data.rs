//! CSV ingestion into a [`TimeSeriesPanel`].
//!
//! The raw source is long-format (`Year`, `Type`, value). Types are mapped
//! through an explicit table; anything unmapped is dropped, never guessed.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use ndarray::Array2;
use tracing::{debug, info, warn};

use crate::defaults::DEFAULT_VALUE_COLUMN;
use crate::panel::TimeSeriesPanel;
use crate::types::VarError;

pub const YEAR_COLUMN: &str = "Year";
pub const TYPE_COLUMN: &str = "Type";

/// Raw beverage labels and the canonical variable each one maps to.
/// Column order of the produced panel follows this table.
pub const TYPE_MAPPING: [(&str, &str); 4] = [
    ("Wine", "wine"),
    ("Beer and Cider", "beer"),
    ("Vodka and Liqueurs", "vodka"),
    ("Brandy", "brandy"),
];

/// Options for reading the raw consumption table.
#[derive(Clone, Debug)]
pub struct IngestOptions {
    /// Header of the numeric consumption column.
    pub value_column: String,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            value_column: DEFAULT_VALUE_COLUMN.to_string(),
        }
    }
}

pub fn canonical_variables() -> Vec<String> {
    TYPE_MAPPING.iter().map(|(_, v)| v.to_string()).collect()
}

fn canonical_index(raw_type: &str) -> Option<usize> {
    TYPE_MAPPING.iter().position(|(raw, _)| *raw == raw_type)
}

#[derive(Clone, Copy, Debug)]
enum Cell {
    Missing,
    Sum { total: f64, count: usize },
    Invalid,
}

impl Cell {
    fn push(&mut self, value: Option<f64>) {
        *self = match (*self, value) {
            (Cell::Invalid, _) | (_, None) => Cell::Invalid,
            (Cell::Missing, Some(v)) => Cell::Sum { total: v, count: 1 },
            (Cell::Sum { total, count }, Some(v)) => Cell::Sum {
                total: total + v,
                count: count + 1,
            },
        };
    }

    fn mean(self) -> Option<f64> {
        match self {
            Cell::Sum { total, count } if count > 0 => Some(total / count as f64),
            _ => None,
        }
    }
}

fn column_position(headers: &csv::StringRecord, name: &str) -> Result<usize, VarError> {
    headers.iter().position(|h| h == name).ok_or_else(|| {
        VarError::DataSource(format!(
            "missing required column '{name}' (available: {:?})",
            headers.iter().collect::<Vec<_>>()
        ))
    })
}

fn parse_value(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Pivot a long-format consumption table into one row per year and one
/// column per canonical beverage.
///
/// Duplicate (year, type) cells are averaged. A year with any missing or
/// non-numeric cell is dropped entirely.
///
/// # Errors
/// `VarError::DataSource` if the source is unreadable, lacks a required
/// column, or no complete year survives.
pub fn prepare_panel<R: Read>(reader: R, opts: &IngestOptions) -> Result<TimeSeriesPanel, VarError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| VarError::DataSource(format!("failed to read CSV headers: {e}")))?
        .clone();
    let year_idx = column_position(&headers, YEAR_COLUMN)?;
    let type_idx = column_position(&headers, TYPE_COLUMN)?;
    let value_idx = column_position(&headers, &opts.value_column)?;

    let n_vars = TYPE_MAPPING.len();
    let mut cells: BTreeMap<i32, Vec<Cell>> = BTreeMap::new();
    let mut rows_read = 0usize;
    let mut unmapped = 0usize;

    for (idx, record) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;
        let record = record
            .map_err(|e| VarError::DataSource(format!("CSV parse error at line {line}: {e}")))?;

        let raw_type = record.get(type_idx).unwrap_or_default();
        let Some(var_idx) = canonical_index(raw_type) else {
            debug!(line, raw_type, "dropping unmapped beverage type");
            unmapped += 1;
            continue;
        };

        let raw_year = record.get(year_idx).unwrap_or_default();
        let Ok(year) = raw_year.parse::<i32>() else {
            warn!(line, raw_year, "skipping row with unparseable year");
            continue;
        };

        let value = record.get(value_idx).and_then(parse_value);
        cells
            .entry(year)
            .or_insert_with(|| vec![Cell::Missing; n_vars])[var_idx]
            .push(value);
    }

    let mut years = Vec::with_capacity(cells.len());
    let mut rows = Vec::with_capacity(cells.len() * n_vars);
    for (year, row) in &cells {
        let means: Option<Vec<f64>> = row.iter().map(|c| c.mean()).collect();
        match means {
            Some(values) => {
                years.push(*year);
                rows.extend(values);
            }
            None => warn!(year, "dropping year with missing or non-numeric values"),
        }
    }

    if years.is_empty() {
        return Err(VarError::DataSource(
            "no complete years after cleaning".to_string(),
        ));
    }

    info!(
        rows_read,
        unmapped,
        years_kept = years.len(),
        years_dropped = cells.len() - years.len(),
        "prepared consumption panel"
    );

    let values = Array2::from_shape_vec((years.len(), n_vars), rows)
        .map_err(|e| VarError::DataSource(e.to_string()))?;
    TimeSeriesPanel::new(years, canonical_variables(), values)
}

/// Open `path` and run [`prepare_panel`] on it.
pub fn load_panel<P: AsRef<Path>>(path: P, opts: &IngestOptions) -> Result<TimeSeriesPanel, VarError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        VarError::DataSource(format!("failed to open '{}': {e}", path.display()))
    })?;
    prepare_panel(file, opts)
}
