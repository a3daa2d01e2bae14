//! Per-model cumulative hazard collection.
//!
//! Bootstrap samples see different event-time sets, so every model carries
//! its own time grid. Nothing here averages across models or aligns grids:
//! the caller (the visualization boundary) decides how to interpolate before
//! drawing variance bands.

use crate::types::{Ensemble, ObservationTable, SchemaError, StepFunction};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("aggregation requires a non-empty ensemble")]
    EmptyEnsemble,
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Population-level view: for each model, the cumulative coefficient
/// function of every covariate. A pure read; calling it twice returns
/// identical step functions.
pub fn population_hazards(
    ensemble: &Ensemble,
) -> Result<Vec<BTreeMap<String, StepFunction>>, AggregationError> {
    if ensemble.is_empty() {
        return Err(AggregationError::EmptyEnsemble);
    }
    Ok(ensemble
        .models()
        .iter()
        .map(|model| model.coefficient_functions())
        .collect())
}

/// Individual-level view: for each model, one cumulative hazard step
/// function per evaluation row (the covariate-weighted sum of that model's
/// coefficient functions), in row order.
pub fn individual_hazards(
    ensemble: &Ensemble,
    table: &ObservationTable,
) -> Result<Vec<Vec<StepFunction>>, AggregationError> {
    if ensemble.is_empty() {
        return Err(AggregationError::EmptyEnsemble);
    }
    ensemble.check_schema(table.covariate_names())?;
    Ok(ensemble
        .models()
        .iter()
        .map(|model| {
            (0..table.n_rows())
                .map(|row| model.cumulative_hazard(table.covariates().row(row)))
                .collect()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensemble::build_ensemble;
    use crate::types::PenaltyConfig;
    use ndarray::{arr1, arr2};

    fn fitted_ensemble() -> (Ensemble, ObservationTable) {
        let table = ObservationTable::new(
            vec!["baseline".to_string(), "monthly".to_string()],
            arr2(&[
                [1.0, 0.1],
                [1.0, 0.9],
                [1.0, 0.3],
                [1.0, 0.6],
                [1.0, 0.5],
            ]),
            arr1(&[0.5, 1.5, 2.0, 3.5, 4.0]),
            arr1(&[true, true, true, false, true]),
        )
        .expect("valid table");
        let ensemble =
            build_ensemble(&table, 4, &PenaltyConfig::default(), Some(13)).expect("build");
        (ensemble, table)
    }

    #[test]
    fn empty_ensemble_is_rejected() {
        let empty = Ensemble::new(Vec::new()).expect("empty ensemble");
        assert!(matches!(
            population_hazards(&empty),
            Err(AggregationError::EmptyEnsemble)
        ));
    }

    #[test]
    fn population_mode_returns_one_map_per_model() {
        let (ensemble, _) = fitted_ensemble();
        let hazards = population_hazards(&ensemble).expect("aggregate");
        assert_eq!(hazards.len(), ensemble.len());
        for per_model in &hazards {
            assert_eq!(per_model.len(), 2);
            assert!(per_model.contains_key("baseline"));
            assert!(per_model.contains_key("monthly"));
        }
    }

    #[test]
    fn population_mode_is_idempotent() {
        let (ensemble, _) = fitted_ensemble();
        let first = population_hazards(&ensemble).expect("aggregate");
        let second = population_hazards(&ensemble).expect("aggregate");
        assert_eq!(first, second);
    }

    #[test]
    fn individual_mode_returns_row_order_per_model() {
        let (ensemble, table) = fitted_ensemble();
        let hazards = individual_hazards(&ensemble, &table).expect("aggregate");
        assert_eq!(hazards.len(), ensemble.len());
        for (model, per_row) in ensemble.models().iter().zip(&hazards) {
            assert_eq!(per_row.len(), table.n_rows());
            for (row, function) in per_row.iter().enumerate() {
                let direct = model.cumulative_hazard(table.covariates().row(row));
                assert_eq!(function, &direct);
            }
        }
    }

    #[test]
    fn individual_mode_rejects_schema_mismatch() {
        let (ensemble, _) = fitted_ensemble();
        let mismatched = ObservationTable::new(
            vec!["baseline".to_string()],
            arr2(&[[1.0]]),
            arr1(&[1.0]),
            arr1(&[false]),
        )
        .expect("valid table");
        assert!(matches!(
            individual_hazards(&ensemble, &mismatched),
            Err(AggregationError::Schema(_))
        ));
    }

    #[test]
    fn diverging_time_grids_are_returned_verbatim() {
        // Two "samples" with different event-time sets: the aggregator must
        // hand back each model's own grid, never a common axis.
        let (_, table) = fitted_ensemble();
        let first = crate::fit::fit(
            &table.select_rows(&[0, 1, 2, 0, 1]),
            &PenaltyConfig::default(),
        )
        .expect("fit");
        let second = crate::fit::fit(
            &table.select_rows(&[2, 4, 4, 2, 4]),
            &PenaltyConfig::default(),
        )
        .expect("fit");
        assert_ne!(first.event_times(), second.event_times());

        let ensemble = Ensemble::new(vec![first.clone(), second.clone()]).expect("ensemble");
        let hazards = population_hazards(&ensemble).expect("aggregate");
        assert_eq!(
            hazards[0]["baseline"].times(),
            first.event_times()
        );
        assert_eq!(
            hazards[1]["baseline"].times(),
            second.event_times()
        );
    }
}
