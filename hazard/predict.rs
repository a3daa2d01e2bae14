//! Lifetime prediction: apply an ensemble to an evaluation table and
//! aggregate per-individual expected lifetimes across models.

use crate::types::{Ensemble, ObservationTable, SchemaError};
use ndarray::{Array1, Array2, Axis};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("prediction requires a non-empty ensemble")]
    EmptyEnsemble,
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// The evaluation table augmented with across-model lifetime summaries. The
/// original table is untouched; `mean` and `median` are parallel to its rows.
#[derive(Debug, Clone, PartialEq)]
pub struct LifetimeTable {
    pub table: ObservationTable,
    pub mean: Array1<f64>,
    pub median: Array1<f64>,
}

/// For each model and each evaluation row, compute the expected lifetime as
/// the area under the survival function implied by that row's cumulative
/// hazard; then summarize per row with the across-model mean and median.
///
/// Row count and order of the evaluation table are preserved. Duration and
/// event columns of the evaluation table play no part in the computation.
pub fn predict_lifetimes(
    ensemble: &Ensemble,
    table: &ObservationTable,
) -> Result<LifetimeTable, PredictionError> {
    if ensemble.is_empty() {
        return Err(PredictionError::EmptyEnsemble);
    }
    ensemble.check_schema(table.covariate_names())?;

    let m = ensemble.len();
    let n = table.n_rows();
    log::info!("predicting lifetimes for {} rows across {} models", n, m);

    let mut predictions = Array2::<f64>::zeros((m, n));
    for (model_idx, model) in ensemble.models().iter().enumerate() {
        for row in 0..n {
            predictions[[model_idx, row]] =
                model.expected_lifetime(table.covariates().row(row));
        }
    }

    let mean = predictions
        .mean_axis(Axis(0))
        .expect("ensemble is non-empty");
    let median = Array1::from_iter((0..n).map(|row| {
        let mut column: Vec<f64> = predictions.column(row).to_vec();
        median_of(&mut column)
    }));

    Ok(LifetimeTable {
        table: table.clone(),
        mean,
        median,
    })
}

fn median_of(values: &mut [f64]) -> f64 {
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        values[mid]
    } else {
        0.5 * (values[mid - 1] + values[mid])
    }
}
