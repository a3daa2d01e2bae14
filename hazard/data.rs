//! Observation-table loading and saving.
//!
//! Tables travel as CSV (or TSV, by extension) with two reserved columns,
//! matched case-insensitively: `duration` (float) and `event` (boolean or
//! 0/1 integer; `true`/1 means the lapse was observed). Every other column
//! that casts to float is a covariate, in file order. Both reserved columns
//! are optional on load — a missing `duration` defaults to 0.0 and a missing
//! `event` to censored — so covariate-only evaluation tables load cleanly.

use crate::predict::LifetimeTable;
use crate::types::{ObservationTable, ValidationError};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DataError {
    #[error("Error from the underlying Polars library: {0}")]
    Polars(#[from] PolarsError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("The column '{0}' was not found in the input file.")]
    ColumnNotFound(String),
    #[error(
        "Column '{column_name}' could not be converted to the expected type '{expected_type}'. (Found type: {found_type})"
    )]
    ColumnWrongType {
        column_name: String,
        expected_type: &'static str,
        found_type: String,
    },
    #[error("Missing or null values were found in the column '{0}'.")]
    MissingValues(String),
    #[error("Column '{column}' holds event flags and must contain only 0 and 1, found {value}.")]
    EventNotBinary { column: String, value: i64 },
    #[error("The input file has no covariate columns besides 'duration' and 'event'.")]
    NoCovariates,
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Load an observation table from a CSV/TSV file.
pub fn load_table(path: &str) -> Result<ObservationTable, DataError> {
    let df = read_tabular(path)?;
    let name_map = build_case_insensitive_map(
        df.get_column_names()
            .into_iter()
            .map(|name| name.as_str().to_string()),
    );
    let mut used_columns = HashSet::new();

    let n = df.height();
    let durations = if let Some(actual) = name_map.get("duration") {
        used_columns.insert(actual.clone());
        extract_f64_column(&df, &name_map, "duration")?
    } else {
        Array1::zeros(n)
    };
    let events = if let Some(actual) = name_map.get("event") {
        used_columns.insert(actual.clone());
        extract_event_column(&df, &name_map, "event")?
    } else {
        Array1::from_elem(n, false)
    };

    let mut names = Vec::new();
    let mut columns = Vec::new();
    for original in df.get_column_names() {
        let original_str = original.as_str();
        if used_columns.contains(original_str) {
            continue;
        }
        let series = df
            .column(original_str)
            .map_err(|_| DataError::ColumnNotFound(original_str.to_string()))?;
        let casted = match series.cast(&DataType::Float64) {
            Ok(values) => values,
            Err(_) => {
                log::debug!("skipping non-numeric column '{}'", original_str);
                continue;
            }
        };
        let values = casted.f64().expect("casted to f64");
        if values.null_count() > 0 {
            return Err(DataError::MissingValues(original_str.to_string()));
        }
        names.push(original_str.to_string());
        columns.push(Array1::from_iter(values.into_no_null_iter()));
    }
    if names.is_empty() {
        return Err(DataError::NoCovariates);
    }

    let mut covariates = Array2::<f64>::zeros((n, columns.len()));
    for (idx, column) in columns.into_iter().enumerate() {
        covariates.column_mut(idx).assign(&column);
    }

    log::info!(
        "loaded {} observations with {} covariates from {}",
        n,
        names.len(),
        path
    );
    Ok(ObservationTable::new(names, covariates, durations, events)?)
}

/// Save an observation table as CSV/TSV (separator chosen by extension).
pub fn save_table(table: &ObservationTable, path: &str) -> Result<(), DataError> {
    let mut df = build_dataframe(table, None)?;
    write_tabular(&mut df, path)
}

/// Save a prediction output: the evaluation table's columns followed by
/// `mean_lifetime` and `median_lifetime`.
pub fn save_predictions(predictions: &LifetimeTable, path: &str) -> Result<(), DataError> {
    let extra = [
        ("mean_lifetime", &predictions.mean),
        ("median_lifetime", &predictions.median),
    ];
    let mut df = build_dataframe(&predictions.table, Some(&extra))?;
    write_tabular(&mut df, path)
}

fn build_dataframe(
    table: &ObservationTable,
    extra: Option<&[(&str, &Array1<f64>)]>,
) -> Result<DataFrame, DataError> {
    let mut columns: Vec<Column> = Vec::with_capacity(table.n_covariates() + 4);
    columns.push(Series::new("duration".into(), table.durations().to_vec()).into());
    let events: Vec<bool> = table.events().iter().copied().collect();
    columns.push(Series::new("event".into(), events).into());
    for (idx, name) in table.covariate_names().iter().enumerate() {
        columns.push(
            Series::new(name.as_str().into(), table.covariates().column(idx).to_vec()).into(),
        );
    }
    if let Some(extra) = extra {
        for (name, values) in extra {
            columns.push(Series::new((*name).into(), values.to_vec()).into());
        }
    }
    Ok(DataFrame::new(columns)?)
}

fn separator_for(path: &str) -> u8 {
    match Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .as_deref()
    {
        Some("tsv") => b'\t',
        _ => b',',
    }
}

fn read_tabular(path: &str) -> Result<DataFrame, DataError> {
    let separator = separator_for(path);
    let file = File::open(path)?;
    CsvReadOptions::default()
        .with_has_header(true)
        .map_parse_options(|options| options.with_separator(separator))
        .into_reader_with_file_handle(file)
        .finish()
        .map_err(DataError::from)
}

fn write_tabular(df: &mut DataFrame, path: &str) -> Result<(), DataError> {
    let separator = separator_for(path);
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file)
        .with_separator(separator)
        .finish(df)?;
    Ok(())
}

fn build_case_insensitive_map<I, S>(names: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut map = HashMap::new();
    for name in names {
        let original = name.as_ref().to_string();
        map.insert(original.to_ascii_lowercase(), original);
    }
    map
}

fn extract_f64_column(
    df: &DataFrame,
    map: &HashMap<String, String>,
    key: &str,
) -> Result<Array1<f64>, DataError> {
    let actual = map
        .get(&key.to_ascii_lowercase())
        .ok_or_else(|| DataError::ColumnNotFound(key.to_string()))?;
    let series = df
        .column(actual)
        .map_err(|_| DataError::ColumnNotFound(actual.clone()))?;
    let dtype = series.dtype().clone();
    let series = if dtype != DataType::Float64 {
        series
            .cast(&DataType::Float64)
            .map_err(|_| DataError::ColumnWrongType {
                column_name: actual.clone(),
                expected_type: "float",
                found_type: dtype.to_string(),
            })?
    } else {
        series.clone()
    };
    let values = series.f64().expect("casted to f64");
    if values.null_count() > 0 {
        return Err(DataError::MissingValues(actual.clone()));
    }
    Ok(Array1::from_iter(values.into_no_null_iter()))
}

fn extract_event_column(
    df: &DataFrame,
    map: &HashMap<String, String>,
    key: &str,
) -> Result<Array1<bool>, DataError> {
    let actual = map
        .get(&key.to_ascii_lowercase())
        .ok_or_else(|| DataError::ColumnNotFound(key.to_string()))?;
    let series = df
        .column(actual)
        .map_err(|_| DataError::ColumnNotFound(actual.clone()))?;
    let dtype = series.dtype().clone();
    if dtype == DataType::Boolean {
        let values = series.bool().expect("boolean dtype");
        if values.null_count() > 0 {
            return Err(DataError::MissingValues(actual.clone()));
        }
        return Ok(Array1::from_iter(values.into_no_null_iter()));
    }
    let casted = series
        .cast(&DataType::Int64)
        .map_err(|_| DataError::ColumnWrongType {
            column_name: actual.clone(),
            expected_type: "boolean or 0/1 integer",
            found_type: dtype.to_string(),
        })?;
    let values = casted.i64().expect("casted to i64");
    if values.null_count() > 0 {
        return Err(DataError::MissingValues(actual.clone()));
    }
    let mut flags = Vec::with_capacity(values.len());
    for value in values.into_no_null_iter() {
        match value {
            0 => flags.push(false),
            1 => flags.push(true),
            other => {
                return Err(DataError::EventNotBinary {
                    column: actual.clone(),
                    value: other,
                });
            }
        }
    }
    Ok(Array1::from_vec(flags))
}
