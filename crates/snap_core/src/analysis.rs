use crate::cancel::CancelToken;
use crate::config::LyapunovConfig;
use crate::error::Result;
use crate::integrator::{initial_state, whole_steps, RunStatus};
use crate::traits::{is_finite_state, state_norm, StateVector, Stepper};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

/// Upper bound on up-front checkpoint allocation.
const MAX_PREALLOCATED_CHECKPOINTS: usize = 1 << 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    /// `λ ≤ 0` (or undefined). Callers typically discard these runs.
    Stagnant,
    /// `λ > 0`.
    Chaotic,
}

impl Classification {
    pub fn from_exponent(exponent: f64) -> Self {
        if exponent > 0.0 {
            Classification::Chaotic
        } else {
            Classification::Stagnant
        }
    }
}

/// State of the twin pair at one renormalization boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub t: f64,
    /// `‖p − r‖` at the end of the interval.
    pub separation: f64,
    /// `ln(separation / injected)`, where `injected` is the separation the
    /// interval started from.
    pub log_growth: f64,
    /// `‖(r + δ) − r‖` as stored after renormalization, i.e. the separation
    /// the next interval starts from.
    pub renormalized_separation: f64,
    /// `max(1, ‖r‖)` at the boundary. The perturbation is sized
    /// `δ₀ · reference_scale` so it survives rounding against a large
    /// reference.
    pub reference_scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyapunovEstimate {
    pub exponent: f64,
    pub classification: Classification,
    /// Number of completed renormalization intervals.
    pub intervals: usize,
    /// Time covered by the completed intervals.
    pub elapsed: f64,
    pub checkpoints: Vec<Checkpoint>,
    /// Boundary time at which the pair first became non-finite. Stepping
    /// stops there and the exponent covers the intervals before it.
    pub diverged_at: Option<f64>,
}

/// Outcome of a cancellable estimate. An aborted run still reports the
/// exponent over the intervals it completed, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LyapunovRun {
    pub estimate: Option<LyapunovEstimate>,
    pub status: RunStatus,
}

/// Perturbed twin of a reference state.
struct Twin {
    state: StateVector,
    /// Separation actually representable after rounding.
    injected: f64,
    scale: f64,
}

impl Twin {
    fn around(reference: &StateVector, direction: &StateVector, delta0: f64) -> Self {
        let scale = state_norm(reference).max(1.0);
        let state = reference + direction * (delta0 * scale);
        Self {
            state,
            injected: state_norm(&(state - reference)),
            scale,
        }
    }
}

/// Largest Lyapunov exponent by the renormalized twin-trajectory method.
///
/// The twin starts at `y0 + δ₀·max(1, ‖y0‖)·e₁` and both trajectories advance
/// in lockstep. Every `τ` the separation `d` is measured against the
/// separation the interval started from, the log ratio is accumulated, and
/// the twin is pulled back along the current direction of divergence. The
/// estimate is the accumulated log growth divided by the total time.
///
/// If the pair turns non-finite, estimation stops at that boundary. When that
/// happens before any interval completes the exponent is `+∞`.
pub fn largest_lyapunov_exponent<S>(
    y0: &[f64],
    stepper: &S,
    config: &LyapunovConfig,
) -> Result<LyapunovEstimate>
where
    S: Stepper + ?Sized,
{
    let run = largest_lyapunov_exponent_with_cancel(y0, stepper, config, &CancelToken::new())?;
    Ok(run
        .estimate
        .unwrap_or_else(|| summarize(0.0, 0, 0.0, Vec::new(), None)))
}

pub fn largest_lyapunov_exponent_with_cancel<S>(
    y0: &[f64],
    stepper: &S,
    config: &LyapunovConfig,
    cancel: &CancelToken,
) -> Result<LyapunovRun>
where
    S: Stepper + ?Sized,
{
    config.validate()?;
    let mut reference = initial_state(y0)?;

    let dt = config.dt;
    let delta0 = config.delta0;
    let steps_per_interval = whole_steps(config.tau, dt);
    let intervals = whole_steps(config.horizon, config.tau);
    let tau_eff = steps_per_interval as f64 * dt;

    debug!(
        intervals,
        steps_per_interval,
        delta0,
        dt,
        "estimating largest lyapunov exponent"
    );

    let seed = StateVector::new(1.0, 0.0, 0.0, 0.0);
    let mut twin = Twin::around(&reference, &seed, delta0);
    let mut log_sum = 0.0;
    let mut checkpoints = Vec::with_capacity(intervals.min(MAX_PREALLOCATED_CHECKPOINTS));
    let mut step_index = 0usize;
    let mut diverged_at = None;

    for interval in 0..intervals {
        let mut perturbed = twin.state;

        for _ in 0..steps_per_interval {
            if cancel.should_stop(step_index) {
                info!(completed = interval, requested = intervals, "lyapunov estimate aborted");
                let estimate = (interval > 0).then(|| {
                    summarize(log_sum, interval, interval as f64 * tau_eff, checkpoints, None)
                });
                return Ok(LyapunovRun {
                    estimate,
                    status: RunStatus::Aborted,
                });
            }

            let t = config.start_time + step_index as f64 * dt;
            reference = stepper.step(&reference, t, dt);
            perturbed = stepper.step(&perturbed, t, dt);
            step_index += 1;
        }

        let t = config.start_time + step_index as f64 * dt;
        let raw = perturbed - reference;
        let separation = state_norm(&raw);
        if !separation.is_finite() || !is_finite_state(&reference) {
            warn!(t, completed = interval, "twin trajectories became non-finite; stopping estimate");
            diverged_at = Some(t);
            break;
        }

        let log_growth = (separation / twin.injected).ln();
        log_sum += log_growth;

        // Twins merged by the dynamics have no direction left; restart along e1.
        let direction = if separation > 0.0 { raw / separation } else { seed };
        twin = Twin::around(&reference, &direction, delta0);

        let checkpoint = Checkpoint {
            t,
            separation,
            log_growth,
            renormalized_separation: twin.injected,
            reference_scale: twin.scale,
        };
        trace!(
            interval,
            t,
            separation,
            log_growth,
            scale = twin.scale,
            "renormalized twin trajectory"
        );
        checkpoints.push(checkpoint);
    }

    let completed = checkpoints.len();
    let estimate = summarize(log_sum, completed, completed as f64 * tau_eff, checkpoints, diverged_at);
    debug!(
        exponent = estimate.exponent,
        classification = ?estimate.classification,
        "lyapunov estimate complete"
    );
    Ok(LyapunovRun {
        estimate: Some(estimate),
        status: RunStatus::Completed,
    })
}

fn summarize(
    log_sum: f64,
    intervals: usize,
    elapsed: f64,
    checkpoints: Vec<Checkpoint>,
    diverged_at: Option<f64>,
) -> LyapunovEstimate {
    let exponent = if elapsed > 0.0 {
        log_sum / elapsed
    } else if diverged_at.is_some() {
        f64::INFINITY
    } else {
        0.0
    };
    LyapunovEstimate {
        exponent,
        classification: Classification::from_exponent(exponent),
        intervals,
        elapsed,
        checkpoints,
        diverged_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SnapError;
    use crate::solvers::Rk4;

    // x'''' = x: eigenvalues ±1, ±i, so the largest exponent is 1.
    fn divergent(x: f64, _v: f64, _a: f64, _j: f64, _t: f64) -> f64 {
        x
    }

    // (s + 1)(s + 2)(s + 3)(s + 4): the slowest mode decays at rate 1.
    fn contracting(x: f64, v: f64, a: f64, j: f64, _t: f64) -> f64 {
        -10.0 * j - 35.0 * a - 50.0 * v - 24.0 * x
    }

    fn config(tau: f64, horizon: f64) -> LyapunovConfig {
        LyapunovConfig {
            delta0: 1e-8,
            tau,
            horizon,
            dt: 0.01,
            start_time: 0.0,
        }
    }

    fn assert_err_contains<T: std::fmt::Debug>(result: Result<T>, needle: &str) {
        let err = result.expect_err("expected error");
        assert!(matches!(err, SnapError::InvalidConfiguration(_)), "unexpected error kind: {err:?}");
        let message = format!("{err}");
        assert!(
            message.contains(needle),
            "expected error to contain \"{needle}\", got \"{message}\""
        );
    }

    #[test]
    fn rejects_invalid_inputs() {
        let stepper = Rk4::new(&divergent);
        let y0 = [0.0; 4];
        assert_err_contains(
            largest_lyapunov_exponent(&y0, &stepper, &config(10.0, 10.0)),
            "smaller than the horizon",
        );
        assert_err_contains(
            largest_lyapunov_exponent(
                &y0,
                &stepper,
                &LyapunovConfig {
                    delta0: 0.0,
                    ..config(1.0, 10.0)
                },
            ),
            "delta0",
        );
        assert_err_contains(
            largest_lyapunov_exponent(&[0.0; 3], &stepper, &config(1.0, 10.0)),
            "exactly 4 components",
        );
    }

    #[test]
    fn divergent_linear_system_is_chaotic() {
        let stepper = Rk4::new(&divergent);
        let estimate = largest_lyapunov_exponent(&[0.0; 4], &stepper, &config(1.0, 100.0)).unwrap();
        assert_eq!(estimate.intervals, 100);
        assert_eq!(estimate.classification, Classification::Chaotic);
        assert!((estimate.exponent - 1.0).abs() < 0.05, "got {}", estimate.exponent);
    }

    #[test]
    fn contracting_linear_system_is_stagnant() {
        let stepper = Rk4::new(&contracting);
        let estimate = largest_lyapunov_exponent(&[0.0; 4], &stepper, &config(1.0, 100.0)).unwrap();
        assert_eq!(estimate.classification, Classification::Stagnant);
        assert!((estimate.exponent + 1.0).abs() < 0.05, "got {}", estimate.exponent);
    }

    #[test]
    fn renormalization_resets_separation_to_delta0() {
        let stepper = Rk4::new(&divergent);
        let estimate = largest_lyapunov_exponent(&[0.0; 4], &stepper, &config(0.5, 20.0))
            .unwrap();
        assert_eq!(estimate.checkpoints.len(), 40);
        for checkpoint in &estimate.checkpoints {
            assert!(((checkpoint.renormalized_separation - 1e-8) / 1e-8).abs() < 1e-12);
            assert!(checkpoint.separation > 1e-8);
        }
    }

    #[test]
    fn divergent_system_away_from_equilibrium_stays_chaotic() {
        // The reference grows like e^t to ~1e43, far past the point where an
        // absolute 1e-8 offset would round away.
        let stepper = Rk4::new(&divergent);
        let estimate =
            largest_lyapunov_exponent(&[1.0, 0.0, 0.0, 0.0], &stepper, &config(1.0, 100.0)).unwrap();
        assert_eq!(estimate.intervals, 100);
        assert_eq!(estimate.diverged_at, None);
        assert_eq!(estimate.classification, Classification::Chaotic);
        assert!((estimate.exponent - 1.0).abs() < 0.05, "got {}", estimate.exponent);

        let last = estimate.checkpoints.last().unwrap();
        assert!(last.reference_scale > 1e40, "scale {}", last.reference_scale);
        for checkpoint in &estimate.checkpoints {
            assert!(checkpoint.log_growth.is_finite());
            assert!(checkpoint.separation > 0.0);
            let relative = checkpoint.renormalized_separation / checkpoint.reference_scale;
            assert!(((relative - 1e-8) / 1e-8).abs() < 1e-6, "t = {}: {relative}", checkpoint.t);
        }
    }

    #[test]
    fn log_growth_is_measured_against_the_injected_separation() {
        // Identity dynamics: whatever separation was injected comes back unchanged.
        struct Identity;
        impl Stepper for Identity {
            fn step(&self, state: &StateVector, _t: f64, _dt: f64) -> StateVector {
                *state
            }
        }
        let estimate =
            largest_lyapunov_exponent(&[3.0e9, -1.0e9, 7.0, 0.1], &Identity, &config(1.0, 10.0)).unwrap();
        assert_eq!(estimate.checkpoints.len(), 10);
        for checkpoint in &estimate.checkpoints {
            assert_eq!(checkpoint.log_growth, 0.0);
        }
        assert_eq!(estimate.exponent, 0.0);
    }

    #[test]
    fn estimate_stops_at_the_first_non_finite_boundary() {
        // x'''' = x^3 blows up in finite time from x = 1.
        let cubic = |x: f64, _v: f64, _a: f64, _j: f64, _t: f64| x * x * x;
        let stepper = Rk4::new(&cubic);
        let estimate =
            largest_lyapunov_exponent(&[1.0, 0.0, 0.0, 0.0], &stepper, &config(0.5, 50.0)).unwrap();

        let stopped = estimate.diverged_at.expect("reference should overflow");
        assert!(stopped < 50.0);
        assert_eq!(estimate.intervals, estimate.checkpoints.len());
        assert!(estimate.intervals > 0);
        assert!(estimate.exponent.is_finite() && estimate.exponent > 0.0);
        assert_eq!(estimate.classification, Classification::Chaotic);
        for checkpoint in &estimate.checkpoints {
            assert!(checkpoint.t < stopped);
            assert!(checkpoint.renormalized_separation.is_finite());
        }
    }

    #[test]
    fn divergence_before_first_boundary_is_infinite() {
        struct Overflow;
        impl Stepper for Overflow {
            fn step(&self, state: &StateVector, _t: f64, _dt: f64) -> StateVector {
                state * f64::MAX * 2.0
            }
        }
        let estimate =
            largest_lyapunov_exponent(&[1.0, 0.0, 0.0, 0.0], &Overflow, &config(1.0, 5.0)).unwrap();
        assert_eq!(estimate.intervals, 0);
        assert!((estimate.diverged_at.unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(estimate.exponent, f64::INFINITY);
        assert_eq!(estimate.classification, Classification::Chaotic);
    }

    #[test]
    fn exponent_is_mean_log_growth_over_elapsed_time() {
        let stepper = Rk4::new(&contracting);
        let estimate = largest_lyapunov_exponent(&[0.0; 4], &stepper, &config(0.5, 5.0)).unwrap();
        let total: f64 = estimate.checkpoints.iter().map(|c| c.log_growth).sum();
        assert!((estimate.elapsed - 5.0).abs() < 1e-12);
        assert!((estimate.exponent - total / estimate.elapsed).abs() < 1e-12);
    }

    #[test]
    fn checkpoint_times_follow_start_time() {
        let stepper = Rk4::new(&contracting);
        let estimate = largest_lyapunov_exponent(
            &[0.0; 4],
            &stepper,
            &LyapunovConfig {
                start_time: 3.0,
                ..config(1.0, 3.0)
            },
        )
        .unwrap();
        let times: Vec<f64> = estimate.checkpoints.iter().map(|c| c.t).collect();
        assert_eq!(times.len(), 3);
        for (t, expected) in times.iter().zip([4.0, 5.0, 6.0]) {
            assert!((t - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn identical_twins_accumulate_negative_infinity() {
        // A stepper that collapses every state onto the origin.
        struct Collapse;
        impl Stepper for Collapse {
            fn step(&self, _state: &StateVector, _t: f64, _dt: f64) -> StateVector {
                StateVector::zeros()
            }
        }
        let estimate = largest_lyapunov_exponent(&[1.0, 0.0, 0.0, 0.0], &Collapse, &config(1.0, 5.0))
            .unwrap();
        assert_eq!(estimate.exponent, f64::NEG_INFINITY);
        assert_eq!(estimate.classification, Classification::Stagnant);
        for checkpoint in &estimate.checkpoints {
            assert_eq!(checkpoint.renormalized_separation, 1e-8);
        }
    }

    #[test]
    fn classification_boundary() {
        assert_eq!(Classification::from_exponent(0.0), Classification::Stagnant);
        assert_eq!(Classification::from_exponent(-0.1), Classification::Stagnant);
        assert_eq!(Classification::from_exponent(f64::NAN), Classification::Stagnant);
        assert_eq!(Classification::from_exponent(1e-12), Classification::Chaotic);
    }
}
