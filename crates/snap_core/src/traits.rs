use nalgebra::Vector4;

/// Lifted state `[x, v, a, j]` (position, velocity, acceleration, jerk).
pub type StateVector = Vector4<f64>;

/// Number of components in a lifted state.
pub const STATE_DIM: usize = 4;

/// General snap dynamics: `x'''' = f(x, v, a, j, t)`.
///
/// Implementations must be pure; the steppers revisit points freely and
/// assume identical inputs give identical outputs.
pub trait SnapFunction {
    fn snap(&self, state: &StateVector, t: f64) -> f64;

    /// Right-hand side of the first-order system `[v, a, j, f(x, v, a, j, t)]`.
    fn lift(&self, state: &StateVector, t: f64) -> StateVector {
        StateVector::new(state[1], state[2], state[3], self.snap(state, t))
    }
}

impl<F> SnapFunction for F
where
    F: Fn(f64, f64, f64, f64, f64) -> f64,
{
    fn snap(&self, state: &StateVector, t: f64) -> f64 {
        self(state[0], state[1], state[2], state[3], t)
    }
}

/// Separable dynamics given as two exactly solvable sub-flows.
///
/// `drift` advances the position-like components for duration `h` with the
/// momentum-like components frozen; `kick` does the converse. Nothing checks
/// that the pair is measure-preserving.
pub trait SeparableFlow {
    fn drift(&self, state: &StateVector, h: f64) -> StateVector;
    fn kick(&self, state: &StateVector, h: f64) -> StateVector;
}

/// A [`SeparableFlow`] assembled from two closures.
#[derive(Clone, Copy)]
pub struct SeparableDynamics<D, K> {
    drift: D,
    kick: K,
}

impl<D, K> SeparableDynamics<D, K>
where
    D: Fn(&StateVector, f64) -> StateVector,
    K: Fn(&StateVector, f64) -> StateVector,
{
    pub fn new(drift: D, kick: K) -> Self {
        Self { drift, kick }
    }
}

impl<D, K> SeparableFlow for SeparableDynamics<D, K>
where
    D: Fn(&StateVector, f64) -> StateVector,
    K: Fn(&StateVector, f64) -> StateVector,
{
    fn drift(&self, state: &StateVector, h: f64) -> StateVector {
        (self.drift)(state, h)
    }

    fn kick(&self, state: &StateVector, h: f64) -> StateVector {
        (self.kick)(state, h)
    }
}

/// Capability-typed dynamics. A stepper accepts exactly one of the variants.
pub enum Dynamics {
    General(Box<dyn SnapFunction + Send + Sync>),
    Separable(Box<dyn SeparableFlow + Send + Sync>),
}

impl Dynamics {
    pub fn general(f: impl SnapFunction + Send + Sync + 'static) -> Self {
        Dynamics::General(Box::new(f))
    }

    pub fn separable(flow: impl SeparableFlow + Send + Sync + 'static) -> Self {
        Dynamics::Separable(Box::new(flow))
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            Dynamics::General(_) => "general",
            Dynamics::Separable(_) => "separable",
        }
    }
}

impl std::fmt::Debug for Dynamics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Dynamics::{}", self.variant_name())
    }
}

/// A solver that advances a lifted state by one step of size `dt`.
pub trait Stepper {
    fn step(&self, state: &StateVector, t: f64, dt: f64) -> StateVector;
}

pub fn is_finite_state(state: &StateVector) -> bool {
    state.iter().all(|c| c.is_finite())
}

/// Euclidean norm that does not overflow for large finite components.
pub fn state_norm(v: &StateVector) -> f64 {
    if v.iter().any(|c| c.is_nan()) {
        return f64::NAN;
    }
    let scale = v.iter().fold(0.0_f64, |m, c| m.max(c.abs()));
    if scale == 0.0 || scale.is_infinite() {
        return scale;
    }
    scale * (v / scale).norm()
}
