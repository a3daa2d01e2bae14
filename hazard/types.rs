//! Core data model: observation tables, fitted models, ensembles, and the
//! step functions they exchange.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Errors surfaced while constructing or validating core data structures.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error(
        "table columns disagree on row count: {rows} covariate rows, {durations} durations, {events} event flags"
    )]
    RowMismatch {
        rows: usize,
        durations: usize,
        events: usize,
    },
    #[error("covariate matrix has {columns} columns but {expected} covariate names were provided")]
    ColumnMismatch { columns: usize, expected: usize },
    #[error("duplicate covariate name '{0}'")]
    DuplicateCovariate(String),
    #[error("duration at row {row} is {value}; durations must be finite and non-negative")]
    InvalidDuration { row: usize, value: f64 },
    #[error("non-finite value {value} at row {row} of covariate '{column}'")]
    NonFiniteCovariate {
        row: usize,
        column: String,
        value: f64,
    },
    #[error("penalty '{name}' is {value}; penalties must be finite and non-negative")]
    InvalidPenalty { name: &'static str, value: f64 },
    #[error("step function has {times} times but {values} values")]
    StepLengthMismatch { times: usize, values: usize },
    #[error("step function times must be strictly increasing")]
    UnsortedTimes,
}

/// The evaluation table's covariate schema does not match the schema the
/// model was trained on. Always fatal; columns are never reindexed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("covariate schema mismatch: model was trained on {expected:?} but the table provides {found:?}")]
pub struct SchemaError {
    pub expected: Vec<String>,
    pub found: Vec<String>,
}

/// A right-continuous step function over time. The value is 0.0 before the
/// first time, and the last value is held flat beyond the last time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepFunction {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl StepFunction {
    pub fn new(times: Vec<f64>, values: Vec<f64>) -> Result<Self, ValidationError> {
        if times.len() != values.len() {
            return Err(ValidationError::StepLengthMismatch {
                times: times.len(),
                values: values.len(),
            });
        }
        if times.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ValidationError::UnsortedTimes);
        }
        Ok(Self { times, values })
    }

    /// Internal constructor for grids already known to be valid.
    pub(crate) fn from_parts(times: Vec<f64>, values: Vec<f64>) -> Self {
        debug_assert_eq!(times.len(), values.len());
        debug_assert!(times.windows(2).all(|pair| pair[0] < pair[1]));
        Self { times, values }
    }

    #[inline]
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Value at time `t`: the cumulative value at the last jump at or before
    /// `t`, or 0.0 if `t` precedes every jump.
    pub fn value_at(&self, t: f64) -> f64 {
        match self.times.partition_point(|&time| time <= t) {
            0 => 0.0,
            idx => self.values[idx - 1],
        }
    }
}

/// Clamp a cumulative sequence so it never goes negative: a negative
/// excursion is floored to the last non-negative cumulative value. Kept as a
/// standalone post-processing step so its bias is independently verifiable.
pub fn clamp_cumulative<'a, I>(values: I)
where
    I: IntoIterator<Item = &'a mut f64>,
{
    let mut floor = 0.0;
    for value in values {
        if *value < 0.0 {
            *value = floor;
        } else {
            floor = *value;
        }
    }
}

/// An ordered table of right-censored observations: one duration, one event
/// flag, and a fixed covariate schema per individual.
///
/// `events[i] == true` means the event (the lapse) was observed at
/// `durations[i]`; `false` means observation was cut off and the duration is
/// only a lower bound.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationTable {
    covariate_names: Vec<String>,
    covariates: Array2<f64>,
    durations: Array1<f64>,
    events: Array1<bool>,
}

impl ObservationTable {
    pub fn new(
        covariate_names: Vec<String>,
        covariates: Array2<f64>,
        durations: Array1<f64>,
        events: Array1<bool>,
    ) -> Result<Self, ValidationError> {
        let n = covariates.nrows();
        if durations.len() != n || events.len() != n {
            return Err(ValidationError::RowMismatch {
                rows: n,
                durations: durations.len(),
                events: events.len(),
            });
        }
        if covariates.ncols() != covariate_names.len() {
            return Err(ValidationError::ColumnMismatch {
                columns: covariates.ncols(),
                expected: covariate_names.len(),
            });
        }
        let mut seen = HashSet::new();
        for name in &covariate_names {
            if !seen.insert(name.as_str()) {
                return Err(ValidationError::DuplicateCovariate(name.clone()));
            }
        }
        for (row, &duration) in durations.iter().enumerate() {
            if !duration.is_finite() || duration < 0.0 {
                return Err(ValidationError::InvalidDuration {
                    row,
                    value: duration,
                });
            }
        }
        for ((row, col), &value) in covariates.indexed_iter() {
            if !value.is_finite() {
                return Err(ValidationError::NonFiniteCovariate {
                    row,
                    column: covariate_names[col].clone(),
                    value,
                });
            }
        }
        Ok(Self {
            covariate_names,
            covariates,
            durations,
            events,
        })
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.covariates.nrows()
    }

    #[inline]
    pub fn n_covariates(&self) -> usize {
        self.covariates.ncols()
    }

    #[inline]
    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }

    #[inline]
    pub fn covariates(&self) -> ArrayView2<'_, f64> {
        self.covariates.view()
    }

    #[inline]
    pub fn durations(&self) -> &Array1<f64> {
        &self.durations
    }

    #[inline]
    pub fn events(&self) -> &Array1<bool> {
        &self.events
    }

    /// Number of rows whose event was observed (non-censored).
    pub fn event_count(&self) -> usize {
        self.events.iter().filter(|&&event| event).count()
    }

    /// A new table containing the given rows, in the given order. Indices may
    /// repeat; this is the primitive the bootstrap resampler builds on.
    pub fn select_rows(&self, indices: &[usize]) -> ObservationTable {
        ObservationTable {
            covariate_names: self.covariate_names.clone(),
            covariates: self.covariates.select(Axis(0), indices),
            durations: self.durations.select(Axis(0), indices),
            events: self.events.select(Axis(0), indices),
        }
    }

    /// The still-under-observation rows (`event == false`), in order. These
    /// are the individuals whose lifetimes are worth predicting.
    pub fn censored_only(&self) -> ObservationTable {
        let indices: Vec<usize> = self
            .events
            .iter()
            .enumerate()
            .filter(|(_, &event)| !event)
            .map(|(idx, _)| idx)
            .collect();
        self.select_rows(&indices)
    }
}

/// Penalty hyperparameters for one fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PenaltyConfig {
    /// L2 penalty on the magnitude of each per-step coefficient increment.
    pub coefficient: f64,
    /// L2 penalty on the difference between adjacent (over time) increments.
    /// Trades fit fidelity for smoother, more stable hazard curves.
    pub smoothing: f64,
    /// Clamp cumulative hazards so they never go negative.
    pub non_negative_cumulative: bool,
}

impl Default for PenaltyConfig {
    fn default() -> Self {
        Self {
            coefficient: 0.1,
            smoothing: 0.1,
            non_negative_cumulative: true,
        }
    }
}

impl PenaltyConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in [
            ("coefficient", self.coefficient),
            ("smoothing", self.smoothing),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::InvalidPenalty { name, value });
            }
        }
        Ok(())
    }
}

/// One fitted additive hazard model: per-covariate cumulative regression
/// coefficients indexed by the training sample's event times. Immutable once
/// fitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    covariate_names: Vec<String>,
    event_times: Vec<f64>,
    penalties: PenaltyConfig,
    /// Cumulative coefficient values, `event_times.len()` x `covariate_names.len()`.
    cumulative: Array2<f64>,
}

impl FittedModel {
    pub(crate) fn from_fit(
        covariate_names: Vec<String>,
        event_times: Vec<f64>,
        cumulative: Array2<f64>,
        penalties: PenaltyConfig,
    ) -> Self {
        debug_assert_eq!(cumulative.nrows(), event_times.len());
        debug_assert_eq!(cumulative.ncols(), covariate_names.len());
        Self {
            covariate_names,
            event_times,
            penalties,
            cumulative,
        }
    }

    #[inline]
    pub fn covariate_names(&self) -> &[String] {
        &self.covariate_names
    }

    #[inline]
    pub fn event_times(&self) -> &[f64] {
        &self.event_times
    }

    #[inline]
    pub fn penalties(&self) -> &PenaltyConfig {
        &self.penalties
    }

    /// Last observed event time of the training sample. Hazard increments
    /// are extrapolated as zero beyond this point.
    pub fn max_time(&self) -> f64 {
        self.event_times.last().copied().unwrap_or(0.0)
    }

    fn coefficient_function_at(&self, idx: usize) -> StepFunction {
        StepFunction::from_parts(self.event_times.clone(), self.cumulative.column(idx).to_vec())
    }

    /// Cumulative coefficient function of one covariate, by name.
    pub fn coefficient_function(&self, name: &str) -> Option<StepFunction> {
        self.covariate_names
            .iter()
            .position(|candidate| candidate == name)
            .map(|idx| self.coefficient_function_at(idx))
    }

    /// All cumulative coefficient functions, keyed by covariate name.
    pub fn coefficient_functions(&self) -> BTreeMap<String, StepFunction> {
        self.covariate_names
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), self.coefficient_function_at(idx)))
            .collect()
    }

    /// The individualized cumulative hazard: the covariate-weighted sum of
    /// the coefficient functions, clamped when the non-negativity flag was
    /// set at fit time.
    pub fn cumulative_hazard(&self, covariates: ArrayView1<'_, f64>) -> StepFunction {
        let mut values = self.cumulative.dot(&covariates).to_vec();
        if self.penalties.non_negative_cumulative {
            clamp_cumulative(values.iter_mut());
        }
        StepFunction::from_parts(self.event_times.clone(), values)
    }

    /// Expected lifetime: the exact area under the survival function
    /// S(t) = exp(-H(t)) over [0, max_time]. H is a step function, so S is
    /// too, and the integral is a finite sum; S = 1 before the first event
    /// time.
    pub fn expected_lifetime(&self, covariates: ArrayView1<'_, f64>) -> f64 {
        let hazard = self.cumulative_hazard(covariates);
        let mut area = 0.0;
        let mut survival = 1.0;
        let mut previous_time = 0.0;
        for (&time, &h) in hazard.times().iter().zip(hazard.values()) {
            area += survival * (time - previous_time);
            survival = (-h).exp();
            previous_time = time;
        }
        area
    }

    /// Reject an evaluation schema that differs from the training schema.
    pub fn check_schema(&self, names: &[String]) -> Result<(), SchemaError> {
        if self.covariate_names != names {
            return Err(SchemaError {
                expected: self.covariate_names.clone(),
                found: names.to_vec(),
            });
        }
        Ok(())
    }
}

/// An ordered collection of independently fitted models sharing one
/// covariate schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ensemble {
    models: Vec<FittedModel>,
}

impl Ensemble {
    /// Build an ensemble, enforcing the shared-schema invariant that makes
    /// cross-model aggregation dimensionally valid.
    pub fn new(models: Vec<FittedModel>) -> Result<Self, SchemaError> {
        if let Some((first, rest)) = models.split_first() {
            for model in rest {
                model.check_schema(first.covariate_names())?;
            }
        }
        Ok(Self { models })
    }

    #[inline]
    pub fn models(&self) -> &[FittedModel] {
        &self.models
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// The shared covariate schema, or `None` for an empty ensemble.
    pub fn schema(&self) -> Option<&[String]> {
        self.models.first().map(|model| model.covariate_names())
    }

    /// Reject an evaluation schema that differs from the ensemble's training
    /// schema. An empty ensemble has no schema to conflict with.
    pub fn check_schema(&self, names: &[String]) -> Result<(), SchemaError> {
        match self.models.first() {
            Some(first) => first.check_schema(names),
            None => Ok(()),
        }
    }
}
