//! Reference snap systems.

use crate::equation_engine::SnapExpression;
use crate::error::Result;

/// Textual form of [`quartic_snap_oscillator`].
pub const QUARTIC_SNAP_SOURCE: &str = "-A*j - B*a - C*v - D*x + E*tanh(x)";

/// Coefficients `A..E` of the damped oscillator with a `tanh` restoring term.
pub const QUARTIC_SNAP_PARAMS: [(&str, f64); 5] =
    [("A", 0.6), ("B", 1.5), ("C", 1.5), ("D", 0.5), ("E", 4.0)];

/// `x'''' = −0.6·j − 1.5·a − 1.5·v − 0.5·x + 4·tanh(x)`.
pub fn quartic_snap(x: f64, v: f64, a: f64, j: f64, _t: f64) -> f64 {
    -0.6 * j - 1.5 * a - 1.5 * v - 0.5 * x + 4.0 * x.tanh()
}

/// [`quartic_snap`] compiled from [`QUARTIC_SNAP_SOURCE`], for callers that
/// want to tweak coefficients at runtime.
pub fn quartic_snap_oscillator() -> Result<SnapExpression> {
    SnapExpression::compile(QUARTIC_SNAP_SOURCE, &QUARTIC_SNAP_PARAMS)
}
