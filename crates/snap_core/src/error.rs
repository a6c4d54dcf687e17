use crate::solvers::StepperKind;
use thiserror::Error;

/// Failures surfaced by the engine. All of them are raised before any
/// stepping happens; numerical blow-up is never reported through this type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SnapError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Stepper `{stepper}` requires {expected} dynamics, got {supplied} dynamics.")]
    WrongDynamicsVariant {
        stepper: StepperKind,
        expected: &'static str,
        supplied: &'static str,
    },

    #[error("State component index {0} is out of range (expected 0..4).")]
    ComponentOutOfRange(usize),

    #[error("Expression error: {0}")]
    Expression(String),
}

pub type Result<T, E = SnapError> = std::result::Result<T, E>;

/// Returns early with [`SnapError::InvalidConfiguration`] unless `cond` holds.
macro_rules! ensure_config {
    ($cond:expr, $($arg:tt)+) => {
        if !($cond) {
            return Err($crate::error::SnapError::InvalidConfiguration(format!($($arg)+)));
        }
    };
}

pub(crate) use ensure_config;
