use crate::error::{ensure_config, Result};
use crate::integrator::{check_component, Trajectory};
use crate::traits::StateVector;
use serde::{Deserialize, Serialize};

/// Direction in which a component must cross the section threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Crossing {
    Rising,
    Falling,
}

/// A trajectory point linearly interpolated onto the section.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SectionPoint {
    pub t: f64,
    pub state: StateVector,
}

/// Poincaré section of a trajectory on the hyperplane `state[component] = threshold`.
///
/// A crossing is registered between consecutive samples whose offsets from
/// the threshold have strictly opposite signs, so samples landing exactly on
/// the plane (or non-finite ones) never count. Time and state are both
/// interpolated linearly between the bracketing samples.
pub fn poincare_section(
    trajectory: &Trajectory,
    component: usize,
    threshold: f64,
    direction: Crossing,
) -> Result<Vec<SectionPoint>> {
    check_component(component)?;
    ensure_config!(
        threshold.is_finite(),
        "section threshold must be finite, got {}.",
        threshold
    );

    let points = trajectory
        .samples()
        .windows(2)
        .filter_map(|pair| {
            let (prev, next) = (&pair[0], &pair[1]);
            let before = prev.state[component] - threshold;
            let after = next.state[component] - threshold;
            if !(before * after < 0.0) {
                return None;
            }
            let rising = after > before;
            match direction {
                Crossing::Rising if !rising => return None,
                Crossing::Falling if rising => return None,
                _ => {}
            }
            let fraction = before / (before - after);
            Some(SectionPoint {
                t: prev.t + fraction * (next.t - prev.t),
                state: prev.state + (next.state - prev.state) * fraction,
            })
        })
        .collect();
    Ok(points)
}
