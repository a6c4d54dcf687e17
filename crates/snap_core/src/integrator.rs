//! Fixed-step trajectory propagation.
//!
//! The integrator advances a lifted state from `span.start` in increments of
//! `dt`, recording every sample including the initial one. It never inspects
//! the values it records: overflow and NaN are kept as-is and stepping
//! continues to the end of the span.

use crate::cancel::CancelToken;
use crate::error::{ensure_config, Result, SnapError};
use crate::traits::{is_finite_state, StateVector, Stepper, STATE_DIM};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Relative slack for treating `duration / dt` as a whole number of steps.
const WHOLE_STEP_TOLERANCE: f64 = 1e-9;

/// Upper bound on up-front sample allocation; longer runs grow on demand.
const MAX_PREALLOCATED_SAMPLES: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSpan {
    pub start: f64,
    pub end: f64,
}

impl TimeSpan {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn validate(&self) -> Result<()> {
        ensure_config!(
            self.start.is_finite() && self.end.is_finite(),
            "time span bounds must be finite, got ({}, {}).",
            self.start,
            self.end
        );
        ensure_config!(
            self.end > self.start,
            "time span end must exceed start, got ({}, {}).",
            self.start,
            self.end
        );
        Ok(())
    }
}

impl From<(f64, f64)> for TimeSpan {
    fn from((start, end): (f64, f64)) -> Self {
        Self::new(start, end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub t: f64,
    pub state: StateVector,
}

/// Time-ordered samples produced by one integration call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    samples: Vec<Sample>,
}

impl Trajectory {
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn first(&self) -> Option<&Sample> {
        self.samples.first()
    }

    pub fn last(&self) -> Option<&Sample> {
        self.samples.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.t).collect()
    }

    /// Values of state component `index` across the trajectory.
    pub fn component(&self, index: usize) -> Result<Vec<f64>> {
        check_component(index)?;
        Ok(self.samples.iter().map(|s| s.state[index]).collect())
    }

    /// Selects three of the four components of every sample, e.g. `[0, 2, 3]`
    /// for position, acceleration and jerk.
    pub fn project(&self, axes: [usize; 3]) -> Result<Vec<[f64; 3]>> {
        for &axis in &axes {
            check_component(axis)?;
        }
        Ok(self
            .samples
            .iter()
            .map(|s| [s.state[axes[0]], s.state[axes[1]], s.state[axes[2]]])
            .collect())
    }
}

impl From<Vec<Sample>> for Trajectory {
    fn from(samples: Vec<Sample>) -> Self {
        Self { samples }
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a Sample;
    type IntoIter = std::slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

pub(crate) fn check_component(index: usize) -> Result<()> {
    if index >= STATE_DIM {
        return Err(SnapError::ComponentOutOfRange(index));
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Aborted,
}

/// Result of a cancellable integration. An aborted run keeps every sample
/// recorded before the abort.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub trajectory: Trajectory,
    pub status: RunStatus,
}

pub(crate) fn initial_state(y0: &[f64]) -> Result<StateVector> {
    ensure_config!(
        y0.len() == STATE_DIM,
        "initial state must have exactly {} components, got {}.",
        STATE_DIM,
        y0.len()
    );
    Ok(StateVector::from_column_slice(y0))
}

pub(crate) fn validate_step(dt: f64) -> Result<()> {
    ensure_config!(
        dt.is_finite() && dt > 0.0,
        "step size dt must be positive and finite, got {}.",
        dt
    );
    Ok(())
}

/// `floor(duration / dt)`, snapping quotients within rounding distance of an
/// integer onto it.
pub(crate) fn whole_steps(duration: f64, dt: f64) -> usize {
    let ratio = duration / dt;
    let nearest = ratio.round();
    let steps = if (ratio - nearest).abs() <= WHOLE_STEP_TOLERANCE * nearest.max(1.0) {
        nearest
    } else {
        ratio.floor()
    };
    steps as usize
}

/// Number of samples `integrate` records for the given span and step size.
pub fn sample_count(span: TimeSpan, dt: f64) -> Result<usize> {
    span.validate()?;
    validate_step(dt)?;
    Ok(whole_steps(span.duration(), dt).saturating_add(1))
}

pub fn integrate<S>(y0: &[f64], span: TimeSpan, dt: f64, stepper: &S) -> Result<Trajectory>
where
    S: Stepper + ?Sized,
{
    integrate_with_cancel(y0, span, dt, stepper, &CancelToken::new()).map(|run| run.trajectory)
}

pub fn integrate_with_cancel<S>(
    y0: &[f64],
    span: TimeSpan,
    dt: f64,
    stepper: &S,
    cancel: &CancelToken,
) -> Result<Integration>
where
    S: Stepper + ?Sized,
{
    let mut state = initial_state(y0)?;
    let samples = sample_count(span, dt)?;
    let steps = samples - 1;

    debug!(steps, dt, start = span.start, end = span.end, "integrating trajectory");

    let mut recorded = Vec::with_capacity(samples.min(MAX_PREALLOCATED_SAMPLES));
    recorded.push(Sample {
        t: span.start,
        state,
    });
    let mut diverged = !is_finite_state(&state);

    for i in 0..steps {
        if cancel.should_stop(i) {
            info!(completed = i, requested = steps, "integration aborted");
            return Ok(Integration {
                trajectory: Trajectory { samples: recorded },
                status: RunStatus::Aborted,
            });
        }

        let t = span.start + i as f64 * dt;
        state = stepper.step(&state, t, dt);

        if !diverged && !is_finite_state(&state) {
            diverged = true;
            warn!(step = i + 1, t = t + dt, "trajectory became non-finite; continuing");
        }

        recorded.push(Sample {
            t: span.start + (i + 1) as f64 * dt,
            state,
        });
    }

    debug!(samples = recorded.len(), "integration complete");
    Ok(Integration {
        trajectory: Trajectory { samples: recorded },
        status: RunStatus::Completed,
    })
}
