use crate::error::{Result, SnapError};
use crate::traits::{Dynamics, SeparableFlow, SnapFunction, StateVector, Stepper};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One classical Runge-Kutta 4th order step on the lifted system.
pub fn rk4_step<F>(state: &StateVector, t: f64, dt: f64, f: &F) -> StateVector
where
    F: SnapFunction + ?Sized,
{
    let half = dt * 0.5;

    // k1 = F(t, y)
    let k1 = f.lift(state, t);
    // k2 = F(t + dt/2, y + dt/2 * k1)
    let k2 = f.lift(&(state + k1 * half), t + half);
    // k3 = F(t + dt/2, y + dt/2 * k2)
    let k3 = f.lift(&(state + k2 * half), t + half);
    // k4 = F(t + dt, y + dt * k3)
    let k4 = f.lift(&(state + k3 * dt), t + dt);

    // y_next = y + dt/6 * (k1 + 2k2 + 2k3 + k4)
    state + (k1 + k2 * 2.0 + k3 * 2.0 + k4) * (dt / 6.0)
}

/// Forest-Ruth coefficient `θ = 1 / (2 − 2^{1/3})`.
pub fn forest_ruth_theta() -> f64 {
    1.0 / (2.0 - 2.0_f64.cbrt())
}

/// One step of the 4th order Forest-Ruth composition
/// `D(θh/2) K(θh) D((1−θ)h/2) K((1−2θ)h) D((1−θ)h/2) K(θh) D(θh/2)`.
///
/// Only `drift` and `kick` are ever evaluated.
pub fn forest_ruth_step<S>(state: &StateVector, dt: f64, flow: &S) -> StateVector
where
    S: SeparableFlow + ?Sized,
{
    let theta = forest_ruth_theta();
    let outer_drift = theta * dt * 0.5;
    let inner_drift = (1.0 - theta) * dt * 0.5;
    let outer_kick = theta * dt;
    let inner_kick = (1.0 - 2.0 * theta) * dt;

    let y = flow.drift(state, outer_drift);
    let y = flow.kick(&y, outer_kick);
    let y = flow.drift(&y, inner_drift);
    let y = flow.kick(&y, inner_kick);
    let y = flow.drift(&y, inner_drift);
    let y = flow.kick(&y, outer_kick);
    flow.drift(&y, outer_drift)
}

/// Classic Runge-Kutta 4th order solver bound to a snap function.
pub struct Rk4<'a, F: ?Sized> {
    f: &'a F,
}

impl<'a, F: SnapFunction + ?Sized> Rk4<'a, F> {
    pub fn new(f: &'a F) -> Self {
        Self { f }
    }
}

impl<F: SnapFunction + ?Sized> Stepper for Rk4<'_, F> {
    fn step(&self, state: &StateVector, t: f64, dt: f64) -> StateVector {
        rk4_step(state, t, dt, self.f)
    }
}

/// Forest-Ruth symplectic solver bound to a drift/kick split.
/// The split is autonomous, so the step time is ignored.
pub struct ForestRuth<'a, S: ?Sized> {
    flow: &'a S,
}

impl<'a, S: SeparableFlow + ?Sized> ForestRuth<'a, S> {
    pub fn new(flow: &'a S) -> Self {
        Self { flow }
    }
}

impl<S: SeparableFlow + ?Sized> Stepper for ForestRuth<'_, S> {
    fn step(&self, state: &StateVector, _t: f64, dt: f64) -> StateVector {
        forest_ruth_step(state, dt, self.flow)
    }
}

/// Stepping algorithm selectable from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepperKind {
    Rk4,
    Symplectic,
}

impl StepperKind {
    pub fn name(self) -> &'static str {
        match self {
            StepperKind::Rk4 => "rk4",
            StepperKind::Symplectic => "symplectic",
        }
    }

    /// Binds this stepper to `dynamics`, rejecting an incompatible variant.
    pub fn bind(self, dynamics: &Dynamics) -> Result<BoundStepper<'_>> {
        match (self, dynamics) {
            (StepperKind::Rk4, Dynamics::General(f)) => Ok(BoundStepper::Rk4(Rk4::new(f.as_ref()))),
            (StepperKind::Symplectic, Dynamics::Separable(flow)) => {
                Ok(BoundStepper::ForestRuth(ForestRuth::new(flow.as_ref())))
            }
            (kind, other) => Err(SnapError::WrongDynamicsVariant {
                stepper: kind,
                expected: match kind {
                    StepperKind::Rk4 => "general",
                    StepperKind::Symplectic => "separable",
                },
                supplied: other.variant_name(),
            }),
        }
    }
}

impl fmt::Display for StepperKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub enum BoundStepper<'a> {
    Rk4(Rk4<'a, dyn SnapFunction + Send + Sync>),
    ForestRuth(ForestRuth<'a, dyn SeparableFlow + Send + Sync>),
}

impl BoundStepper<'_> {
    pub fn kind(&self) -> StepperKind {
        match self {
            BoundStepper::Rk4(_) => StepperKind::Rk4,
            BoundStepper::ForestRuth(_) => StepperKind::Symplectic,
        }
    }
}

impl Stepper for BoundStepper<'_> {
    fn step(&self, state: &StateVector, t: f64, dt: f64) -> StateVector {
        match self {
            BoundStepper::Rk4(s) => s.step(state, t, dt),
            BoundStepper::ForestRuth(s) => s.step(state, t, dt),
        }
    }
}
