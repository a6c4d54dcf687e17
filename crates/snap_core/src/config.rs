//! Configuration surface and config-driven entry points.
//!
//! Each entry point takes a configuration value, validates it, binds the
//! requested stepper to the supplied dynamics, and returns a result value.
//! Nothing is kept between calls.

use crate::analysis::{
    largest_lyapunov_exponent, largest_lyapunov_exponent_with_cancel, LyapunovEstimate, LyapunovRun,
};
use crate::cancel::CancelToken;
use crate::error::{ensure_config, Result};
use crate::integrator::{
    initial_state, integrate, integrate_with_cancel, validate_step, Integration, TimeSpan, Trajectory,
};
use crate::solvers::StepperKind;
use crate::traits::Dynamics;
use serde::{Deserialize, Serialize};

/// Smallest relative perturbation that still spans thousands of ulps of the
/// reference it is added to.
pub const MIN_DELTA0: f64 = 1e-12;

/// Settings for a single trajectory integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub dt: f64,
    pub t_span: TimeSpan,
    pub y0: Vec<f64>,
    pub stepper: StepperKind,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            dt: 0.01,
            t_span: TimeSpan::new(0.0, 500.0),
            y0: vec![0.1, 0.0, 0.0, 0.0],
            stepper: StepperKind::Rk4,
        }
    }
}

impl IntegrationConfig {
    pub fn validate(&self) -> Result<()> {
        validate_step(self.dt)?;
        self.t_span.validate()?;
        initial_state(&self.y0)?;
        Ok(())
    }
}

/// Settings for the twin-trajectory Lyapunov estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LyapunovConfig {
    /// Initial and post-renormalization separation magnitude.
    pub delta0: f64,
    /// Time between renormalizations.
    pub tau: f64,
    /// Total observation horizon `T`.
    pub horizon: f64,
    pub dt: f64,
    #[serde(default)]
    pub start_time: f64,
}

impl Default for LyapunovConfig {
    fn default() -> Self {
        Self {
            delta0: 1e-8,
            tau: 1.0,
            horizon: 1000.0,
            dt: 0.01,
            start_time: 0.0,
        }
    }
}

impl LyapunovConfig {
    pub fn validate(&self) -> Result<()> {
        ensure_config!(
            self.delta0.is_finite() && self.delta0 > 0.0,
            "delta0 must be positive and finite, got {}.",
            self.delta0
        );
        ensure_config!(
            (MIN_DELTA0..1.0).contains(&self.delta0),
            "delta0 must lie in [{:e}, 1) to stay above rounding, got {:e}.",
            MIN_DELTA0,
            self.delta0
        );
        ensure_config!(
            self.tau.is_finite() && self.tau > 0.0,
            "tau must be positive and finite, got {}.",
            self.tau
        );
        ensure_config!(
            self.horizon.is_finite() && self.tau < self.horizon,
            "tau must be smaller than the horizon T, got tau = {} and T = {}.",
            self.tau,
            self.horizon
        );
        validate_step(self.dt)?;
        ensure_config!(
            self.tau >= self.dt,
            "tau must span at least one step, got tau = {} and dt = {}.",
            self.tau,
            self.dt
        );
        ensure_config!(
            self.start_time.is_finite(),
            "start_time must be finite, got {}.",
            self.start_time
        );
        Ok(())
    }
}

pub fn run_integration(dynamics: &Dynamics, config: &IntegrationConfig) -> Result<Trajectory> {
    config.validate()?;
    let stepper = config.stepper.bind(dynamics)?;
    integrate(&config.y0, config.t_span, config.dt, &stepper)
}

pub fn run_integration_with_cancel(
    dynamics: &Dynamics,
    config: &IntegrationConfig,
    cancel: &CancelToken,
) -> Result<Integration> {
    config.validate()?;
    let stepper = config.stepper.bind(dynamics)?;
    integrate_with_cancel(&config.y0, config.t_span, config.dt, &stepper, cancel)
}

pub fn run_lyapunov(
    dynamics: &Dynamics,
    y0: &[f64],
    stepper: StepperKind,
    config: &LyapunovConfig,
) -> Result<LyapunovEstimate> {
    config.validate()?;
    let stepper = stepper.bind(dynamics)?;
    largest_lyapunov_exponent(y0, &stepper, config)
}

pub fn run_lyapunov_with_cancel(
    dynamics: &Dynamics,
    y0: &[f64],
    stepper: StepperKind,
    config: &LyapunovConfig,
    cancel: &CancelToken,
) -> Result<LyapunovRun> {
    config.validate()?;
    let stepper = stepper.bind(dynamics)?;
    largest_lyapunov_exponent_with_cancel(y0, &stepper, config, cancel)
}
