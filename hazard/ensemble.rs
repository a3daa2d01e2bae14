//! Bootstrap ensemble construction: M independent resample-and-fit
//! iterations over one immutable observation table.

use crate::fit::{FitError, fit};
use crate::resample::{ResampleError, bootstrap_sample};
use crate::types::{Ensemble, ObservationTable, PenaltyConfig, SchemaError};
use rand::SeedableRng;
use rand::rngs::StdRng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnsembleError {
    #[error(transparent)]
    Resample(#[from] ResampleError),
    /// A bootstrap sample with no event rows cannot be fit. Surfaced with the
    /// iteration index instead of silently redrawn: a silent retry would bias
    /// the sampling distribution.
    #[error("bootstrap iteration {iteration} drew a sample with no event rows")]
    DegenerateResample { iteration: usize },
    #[error("fit failed at bootstrap iteration {iteration}: {source}")]
    Fit {
        iteration: usize,
        #[source]
        source: FitError,
    },
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Build an ensemble of `size` models, each fit to an independent bootstrap
/// sample with identical penalty hyperparameters. Models are returned in
/// iteration order. Any failure aborts the whole build; no partial ensemble
/// is ever returned.
///
/// `seed` makes the build reproducible; `None` draws from ambient entropy.
/// `size == 0` yields an empty ensemble — querying it fails, building it
/// does not.
pub fn build_ensemble(
    table: &ObservationTable,
    size: usize,
    penalties: &PenaltyConfig,
    seed: Option<u64>,
) -> Result<Ensemble, EnsembleError> {
    build_ensemble_with_progress(table, size, penalties, seed, |_| {})
}

/// As [`build_ensemble`], reporting each completed iteration (1-based) to an
/// observer instead of interleaving console output with the fit loop.
pub fn build_ensemble_with_progress<F>(
    table: &ObservationTable,
    size: usize,
    penalties: &PenaltyConfig,
    seed: Option<u64>,
    mut progress: F,
) -> Result<Ensemble, EnsembleError>
where
    F: FnMut(usize),
{
    let mut rng = match seed {
        Some(value) => StdRng::seed_from_u64(value),
        None => StdRng::from_entropy(),
    };
    log::info!(
        "building bootstrap ensemble: {} models over {} observations",
        size,
        table.n_rows()
    );
    let mut models = Vec::with_capacity(size);
    for iteration in 0..size {
        let sample = bootstrap_sample(table, &mut rng)?;
        if sample.event_count() == 0 {
            return Err(EnsembleError::DegenerateResample { iteration });
        }
        let model = fit(&sample, penalties)
            .map_err(|source| EnsembleError::Fit { iteration, source })?;
        models.push(model);
        progress(iteration + 1);
    }
    let ensemble = Ensemble::new(models)?;
    log::info!("ensemble build complete: {} models", ensemble.len());
    Ok(ensemble)
}
