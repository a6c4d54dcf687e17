//! The `snap_core` crate integrates fourth-order ("snap") ODEs of the form
//! `x'''' = f(x, v, a, j, t)` and estimates their largest Lyapunov exponent.
//!
//! Key components:
//! - **Traits**: `SnapFunction` (general dynamics), `SeparableFlow` (drift/kick splits), `Stepper`.
//! - **Solvers**: classic RK4 and the fourth-order Forest-Ruth symplectic composition.
//! - **Integrator**: fixed-step trajectory propagation with cooperative cancellation.
//! - **Analysis**: twin-trajectory Lyapunov estimation with periodic renormalization.
//! - **Equation Engine**: a small bytecode VM for user-supplied snap expressions.
//! - **Hamiltonian**: Ostrogradsky splits for conservative snap equations.
pub mod analysis;
pub mod cancel;
pub mod config;
pub mod equation_engine;
pub mod error;
pub mod hamiltonian;
pub mod integrator;
pub mod section;
pub mod solvers;
pub mod systems;
pub mod traits;

pub use analysis::{
    largest_lyapunov_exponent, largest_lyapunov_exponent_with_cancel, Checkpoint, Classification,
    LyapunovEstimate, LyapunovRun,
};
pub use cancel::CancelToken;
pub use config::{
    run_integration, run_integration_with_cancel, run_lyapunov, run_lyapunov_with_cancel,
    IntegrationConfig, LyapunovConfig,
};
pub use equation_engine::SnapExpression;
pub use error::{Result, SnapError};
pub use hamiltonian::{max_energy_drift, OstrogradskySplit, Potential, QuadraticPotential};
pub use integrator::{
    integrate, integrate_with_cancel, sample_count, Integration, RunStatus, Sample, TimeSpan,
    Trajectory,
};
pub use section::{poincare_section, Crossing, SectionPoint};
pub use solvers::{BoundStepper, ForestRuth, Rk4, StepperKind};
pub use traits::{Dynamics, SeparableDynamics, SeparableFlow, SnapFunction, StateVector, Stepper};
