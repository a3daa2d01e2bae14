//! Ensemble persistence. The trained ensemble is written as TOML: covariate
//! schema, event-time grids, cumulative coefficients, and the penalty
//! hyperparameters round-trip losslessly.

use crate::types::{Ensemble, FittedModel, SchemaError};
use serde::Deserialize;
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse ensemble file: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Failed to serialize ensemble: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error(transparent)]
    MixedSchemas(#[from] SchemaError),
}

#[derive(Deserialize)]
struct EnsembleFile {
    models: Vec<FittedModel>,
}

pub fn save_ensemble(ensemble: &Ensemble, path: &str) -> Result<(), StoreError> {
    let toml_string = toml::to_string_pretty(ensemble)?;
    let mut file = BufWriter::new(fs::File::create(path)?);
    file.write_all(toml_string.as_bytes())?;
    log::info!("saved ensemble of {} models to {}", ensemble.len(), path);
    Ok(())
}

/// Load an ensemble, re-validating the shared-schema invariant the rest of
/// the crate relies on.
pub fn load_ensemble(path: &str) -> Result<Ensemble, StoreError> {
    let toml_string = fs::read_to_string(path)?;
    let parsed: EnsembleFile = toml::from_str(&toml_string)?;
    let ensemble = Ensemble::new(parsed.models)?;
    log::info!("loaded ensemble of {} models from {}", ensemble.len(), path);
    Ok(ensemble)
}
