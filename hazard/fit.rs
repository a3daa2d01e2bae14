//! The additive hazard regression fitter.
//!
//! Fits `hazard(t) = b_1(t)*x_1 + ... + b_K(t)*x_K` to a table of durations,
//! event flags, and covariates. There is no implicit intercept; callers model
//! a baseline hazard by supplying a constant covariate column.
//!
//! At each distinct observed event time the fitter regresses the event
//! indicator of the at-risk rows on their covariates, producing one increment
//! per covariate; the coefficient functions are the running cumulative sums
//! of those increments. The per-step problem is the penalized least squares
//!
//! ```text
//! min ||X v - y||^2 + lc*||v||^2 + ls*||v - v_prev||^2
//! ```
//!
//! solved in closed form as `(X'X + (lc+ls)I) v = X'y + ls*v_prev`. With both
//! penalties zero the step falls back to a minimum-norm least-squares solve,
//! which is the classical Aalen pseudo-inverse estimator and stays defined
//! when the risk set no longer spans the covariates.

use crate::types::{
    FittedModel, ObservationTable, PenaltyConfig, ValidationError, clamp_cumulative,
};
use itertools::Itertools;
use ndarray::{Array1, Array2, Axis};
use ndarray_linalg::{LeastSquaresSvd, Solve};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FitError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    /// No event (non-censored) rows: there are no event times to regress at.
    #[error("no event rows in the table; at least one observed event is required")]
    EmptySchedule,
    /// The regression is under-determined at the first event time.
    #[error(
        "under-determined regression at first event time {at_time}: {observations} at-risk rows for {covariates} covariates"
    )]
    InsufficientData {
        at_time: f64,
        observations: usize,
        covariates: usize,
    },
    #[error("linear solve failed at event time {time}: {source}")]
    Solve {
        time: f64,
        #[source]
        source: ndarray_linalg::error::LinalgError,
    },
}

/// Fit one additive hazard model to a table.
pub fn fit(table: &ObservationTable, penalties: &PenaltyConfig) -> Result<FittedModel, FitError> {
    penalties.validate()?;
    let schedule = event_schedule(table);
    let Some(&first_time) = schedule.first() else {
        return Err(FitError::EmptySchedule);
    };
    let k = table.n_covariates();
    let first_risk = table
        .durations()
        .iter()
        .filter(|&&duration| duration >= first_time)
        .count();
    if first_risk < k {
        return Err(FitError::InsufficientData {
            at_time: first_time,
            observations: first_risk,
            covariates: k,
        });
    }

    log::debug!(
        "fitting additive hazard model: {} rows ({} events), {} covariates, {} event times",
        table.n_rows(),
        table.event_count(),
        k,
        schedule.len()
    );

    let mut cumulative = Array2::<f64>::zeros((schedule.len(), k));
    let mut running = Array1::<f64>::zeros(k);
    let mut previous = Array1::<f64>::zeros(k);
    for (step, &time) in schedule.iter().enumerate() {
        let at_risk: Vec<usize> = (0..table.n_rows())
            .filter(|&row| table.durations()[row] >= time)
            .collect();
        let design = table.covariates().select(Axis(0), &at_risk);
        // Tied events collapse into a single step: the response marks every
        // at-risk row whose event occurred exactly at this time.
        let response: Array1<f64> = at_risk
            .iter()
            .map(|&row| {
                if table.events()[row] && table.durations()[row] == time {
                    1.0
                } else {
                    0.0
                }
            })
            .collect();
        let increment = solve_step(&design, &response, &previous, penalties, time)?;
        running += &increment;
        cumulative.row_mut(step).assign(&running);
        previous = increment;
    }

    if penalties.non_negative_cumulative {
        for mut column in cumulative.axis_iter_mut(Axis(1)) {
            clamp_cumulative(column.iter_mut());
        }
    }

    Ok(FittedModel::from_fit(
        table.covariate_names().to_vec(),
        schedule,
        cumulative,
        penalties.clone(),
    ))
}

/// Distinct observed event times, ascending. Censored rows contribute to the
/// risk set but never to the schedule.
fn event_schedule(table: &ObservationTable) -> Vec<f64> {
    table
        .durations()
        .iter()
        .zip(table.events().iter())
        .filter(|&(_, &event)| event)
        .map(|(&duration, _)| duration)
        .sorted_by(f64::total_cmp)
        .dedup()
        .collect()
}

fn solve_step(
    design: &Array2<f64>,
    response: &Array1<f64>,
    previous: &Array1<f64>,
    penalties: &PenaltyConfig,
    time: f64,
) -> Result<Array1<f64>, FitError> {
    let ridge = penalties.coefficient + penalties.smoothing;
    if ridge > 0.0 {
        // X'X + (lc+ls)I is positive definite for any positive ridge.
        let mut gram = design.t().dot(design);
        for diagonal in gram.diag_mut() {
            *diagonal += ridge;
        }
        let mut rhs = design.t().dot(response);
        rhs.scaled_add(penalties.smoothing, previous);
        gram.solve_into(rhs)
            .map_err(|source| FitError::Solve { time, source })
    } else {
        design
            .least_squares(response)
            .map(|result| result.solution)
            .map_err(|source| FitError::Solve { time, source })
    }
}
