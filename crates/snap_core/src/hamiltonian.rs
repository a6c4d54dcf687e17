//! Ostrogradsky drift/kick splits for conservative snap equations.
//!
//! For `x'''' = −c·x'' − U'(x)` the Ostrogradsky construction gives canonical
//! coordinates `q1 = x`, `q2 = v`, `p1 = −c·v − j`, `p2 = a` and the
//! Hamiltonian
//!
//! ```text
//! H = p1·q2 + p2²/2 + c·q2²/2 − U(q1)
//! ```
//!
//! which splits into `A = p1·q2 + p2²/2` (drift) and `B = c·q2²/2 − U(q1)`
//! (kick). Both sub-flows have closed forms, so composing them with
//! [`forest_ruth_step`](crate::solvers::forest_ruth_step) is symplectic.
//! Choosing this split is the caller's modeling decision; nothing in the
//! engine derives it from a general snap function.

use crate::integrator::Trajectory;
use crate::traits::{SeparableFlow, SnapFunction, StateVector};
use serde::{Deserialize, Serialize};

/// A scalar potential `U(x)` together with its derivative.
pub trait Potential {
    fn value(&self, x: f64) -> f64;
    fn gradient(&self, x: f64) -> f64;
}

/// `U(x) = k·x²/2`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QuadraticPotential {
    pub stiffness: f64,
}

impl Potential for QuadraticPotential {
    fn value(&self, x: f64) -> f64 {
        0.5 * self.stiffness * x * x
    }

    fn gradient(&self, x: f64) -> f64 {
        self.stiffness * x
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OstrogradskySplit<U> {
    /// Coefficient `c` of the `x''` term.
    pub coupling: f64,
    pub potential: U,
}

impl<U: Potential> OstrogradskySplit<U> {
    pub fn new(coupling: f64, potential: U) -> Self {
        Self {
            coupling,
            potential,
        }
    }

    /// Conserved energy `−c·v²/2 − j·v + a²/2 − U(x)`.
    pub fn hamiltonian(&self, state: &StateVector) -> f64 {
        let (x, v, a, j) = (state[0], state[1], state[2], state[3]);
        -0.5 * self.coupling * v * v - j * v + 0.5 * a * a - self.potential.value(x)
    }

    fn to_canonical(&self, state: &StateVector) -> [f64; 4] {
        [state[0], state[1], -self.coupling * state[1] - state[3], state[2]]
    }

    fn from_canonical(&self, [q1, q2, p1, p2]: [f64; 4]) -> StateVector {
        StateVector::new(q1, q2, p2, -p1 - self.coupling * q2)
    }
}

impl OstrogradskySplit<QuadraticPotential> {
    /// Pais-Uhlenbeck oscillator `x'''' + (ω1² + ω2²)·x'' + ω1²·ω2²·x = 0`.
    /// Bounded for real, distinct frequencies.
    pub fn pais_uhlenbeck(omega1: f64, omega2: f64) -> Self {
        let (w1, w2) = (omega1 * omega1, omega2 * omega2);
        Self::new(w1 + w2, QuadraticPotential { stiffness: w1 * w2 })
    }
}

impl<U: Potential> SeparableFlow for OstrogradskySplit<U> {
    fn drift(&self, state: &StateVector, h: f64) -> StateVector {
        // p1 is constant under A, so the flow is a cubic in h.
        let [q1, q2, p1, p2] = self.to_canonical(state);
        let h2 = h * h;
        self.from_canonical([
            q1 + q2 * h + p2 * h2 / 2.0 - p1 * h2 * h / 6.0,
            q2 + p2 * h - p1 * h2 / 2.0,
            p1,
            p2 - p1 * h,
        ])
    }

    fn kick(&self, state: &StateVector, h: f64) -> StateVector {
        let [q1, q2, p1, p2] = self.to_canonical(state);
        self.from_canonical([
            q1,
            q2,
            p1 + self.potential.gradient(q1) * h,
            p2 - self.coupling * q2 * h,
        ])
    }
}

/// The same system in general form, for integration with RK4.
impl<U: Potential> SnapFunction for OstrogradskySplit<U> {
    fn snap(&self, state: &StateVector, _t: f64) -> f64 {
        -self.coupling * state[2] - self.potential.gradient(state[0])
    }
}

/// Largest `|H(s) − H(s₀)|` along a trajectory.
pub fn max_energy_drift<U: Potential>(trajectory: &Trajectory, split: &OstrogradskySplit<U>) -> f64 {
    let Some(first) = trajectory.first() else {
        return 0.0;
    };
    let e0 = split.hamiltonian(&first.state);
    trajectory
        .iter()
        .map(|s| (split.hamiltonian(&s.state) - e0).abs())
        .fold(0.0_f64, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrator::integrate;
    use crate::solvers::{forest_ruth_step, ForestRuth, Rk4};
    use crate::traits::Stepper;

    /// Quartic well `U(x) = x⁴/4`.
    struct Quartic;

    impl Potential for Quartic {
        fn value(&self, x: f64) -> f64 {
            0.25 * x.powi(4)
        }

        fn gradient(&self, x: f64) -> f64 {
            x.powi(3)
        }
    }

    fn assert_close(a: &StateVector, b: &StateVector, tol: f64) {
        assert!((a - b).amax() < tol, "{a:?} vs {b:?}");
    }

    #[test]
    fn canonical_round_trip_is_identity() {
        let split = OstrogradskySplit::pais_uhlenbeck(1.0, 2.0);
        let s = StateVector::new(0.3, -1.2, 0.7, 2.5);
        assert_close(&split.from_canonical(split.to_canonical(&s)), &s, 1e-14);
    }

    #[test]
    fn drift_and_kick_are_exact_flows() {
        let split = OstrogradskySplit::new(1.5, Quartic);
        let s = StateVector::new(0.4, -0.3, 0.2, 0.9);

        let drifted_twice = split.drift(&split.drift(&s, 0.13), 0.29);
        assert_close(&drifted_twice, &split.drift(&s, 0.42), 1e-14);

        let kicked_twice = split.kick(&split.kick(&s, 0.13), 0.29);
        assert_close(&kicked_twice, &split.kick(&s, 0.42), 1e-14);
    }

    #[test]
    fn sub_flows_differentiate_to_the_full_snap() {
        // dA/dt + dB/dt reproduces [v, a, j, snap] at h -> 0.
        let split = OstrogradskySplit::new(1.5, Quartic);
        let s = StateVector::new(0.4, -0.3, 0.2, 0.9);
        let h = 1e-6;
        let rate = (split.drift(&s, h) - s + split.kick(&s, h) - s) / h;
        assert_close(&rate, &split.lift(&s, 0.0), 1e-5);
    }

    #[test]
    fn hamiltonian_is_invariant_of_the_exact_solution() {
        // x = A1·cos(t) + A2·cos(2t) from x(0) = 1, v(0) = a(0) = j(0) = 0.
        let split = OstrogradskySplit::pais_uhlenbeck(1.0, 2.0);
        let (a1, a2) = (4.0 / 3.0, -1.0 / 3.0);
        let exact = |t: f64| {
            StateVector::new(
                a1 * t.cos() + a2 * (2.0 * t).cos(),
                -a1 * t.sin() - 2.0 * a2 * (2.0 * t).sin(),
                -a1 * t.cos() - 4.0 * a2 * (2.0 * t).cos(),
                a1 * t.sin() + 8.0 * a2 * (2.0 * t).sin(),
            )
        };
        let e0 = split.hamiltonian(&exact(0.0));
        assert!((e0 + 2.0).abs() < 1e-12);
        for t in [0.3, 1.7, 5.0, 12.4] {
            assert!((split.hamiltonian(&exact(t)) - e0).abs() < 1e-12);
        }
    }

    #[test]
    fn forest_ruth_with_split_is_fourth_order() {
        let split = OstrogradskySplit::pais_uhlenbeck(1.0, 2.0);
        let (a1, a2) = (4.0 / 3.0, -1.0 / 3.0);
        let exact = |t: f64| {
            StateVector::new(
                a1 * t.cos() + a2 * (2.0 * t).cos(),
                -a1 * t.sin() - 2.0 * a2 * (2.0 * t).sin(),
                -a1 * t.cos() - 4.0 * a2 * (2.0 * t).cos(),
                a1 * t.sin() + 8.0 * a2 * (2.0 * t).sin(),
            )
        };
        let error_at = |dt: f64| {
            let trajectory = integrate(&[1.0, 0.0, 0.0, 0.0], (0.0, 2.0).into(), dt, &ForestRuth::new(&split))
                .unwrap();
            let last = trajectory.last().unwrap();
            (last.state - exact(last.t)).norm()
        };
        let ratio = error_at(0.05) / error_at(0.025);
        assert!(ratio > 12.0 && ratio < 20.0, "ratio = {ratio}");
    }

    #[test]
    fn max_energy_drift_is_zero_for_constant_energy() {
        let split = OstrogradskySplit::pais_uhlenbeck(1.0, 2.0);
        let trajectory = integrate(&[0.0; 4], (0.0, 1.0).into(), 0.1, &Rk4::new(&split)).unwrap();
        assert_eq!(max_energy_drift(&trajectory, &split), 0.0);
        assert_eq!(max_energy_drift(&Trajectory::default(), &split), 0.0);
    }

    #[test]
    fn step_uses_only_the_split() {
        let split = OstrogradskySplit::pais_uhlenbeck(1.0, 2.0);
        let s = StateVector::new(1.0, 0.0, 0.0, 0.0);
        let a = forest_ruth_step(&s, 0.01, &split);
        let b = ForestRuth::new(&split).step(&s, 0.0, 0.01);
        assert_eq!(a, b);
    }
}
