//! Time stepping schemes for systems of ordinary differential equations.
//!
//! A scheme advances a state vector `y` of an ODE `y' = f(t, y)` by one
//! time step. Schemes are stateless; the right-hand side is handed over
//! on every call, since it usually borrows the thing being simulated.

use crate::error::{SimError, SimResult};
use log::{trace, warn};
use nalgebra::{DMatrix, DVector};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The state vector of an ODE system.
pub type State = DVector<f64>;

/// A system of ordinary differential equations `y' = f(t, y)`.
pub trait OdeSystem {
    /// Evaluates the right-hand side `f(t, y)`.
    fn rhs(&self, t: f64, y: &State) -> State;

    /// Evaluates the Jacobian `df/dy` at `(t, y)`.
    ///
    /// Defaults to a forward finite-difference approximation.
    fn jacobian(&self, t: f64, y: &State) -> DMatrix<f64> {
        finite_difference_jacobian(self, t, y)
    }
}

/// Adapts a closure into an [OdeSystem].
pub struct FnSystem<F>(pub F);

impl<F: Fn(f64, &State) -> State> OdeSystem for FnSystem<F> {
    fn rhs(&self, t: f64, y: &State) -> State {
        (self.0)(t, y)
    }
}

/// A numerical scheme which advances an ODE system by one time step.
pub trait SteppingScheme {
    /// Performs a single time step of size `dt` from `(t, y_old)` and returns the new state.
    fn apply(&self, system: &dyn OdeSystem, t: f64, dt: f64, y_old: &State) -> SimResult<State>;
}

/// The explicit (forward) Euler scheme, `y_new = y_old + dt * f(t, y_old)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExplicitEuler;

impl SteppingScheme for ExplicitEuler {
    fn apply(&self, system: &dyn OdeSystem, t: f64, dt: f64, y_old: &State) -> SimResult<State> {
        Ok(y_old + system.rhs(t, y_old) * dt)
    }
}

/// Heun's method, the explicit trapezoidal rule.
#[derive(Clone, Copy, Debug, Default)]
pub struct Heun;

impl SteppingScheme for Heun {
    fn apply(&self, system: &dyn OdeSystem, t: f64, dt: f64, y_old: &State) -> SimResult<State> {
        let k1 = system.rhs(t, y_old);
        let predictor = y_old + &k1 * dt;
        let k2 = system.rhs(t + dt, &predictor);
        Ok(y_old + (k1 + k2) * (0.5 * dt))
    }
}

/// The implicit (backward) Euler scheme.
///
/// Solves `x - dt * f(t + dt, x) - y_old = 0` for `x` with Newton's method,
/// using the system's Jacobian.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ImplicitEuler {
    /// Convergence threshold on the largest residual component,
    /// relative to `1 + max |y_old|`.
    pub tolerance: f64,
    /// The maximum number of Newton iterations.
    pub max_iterations: usize,
}

impl Default for ImplicitEuler {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 50,
        }
    }
}

impl SteppingScheme for ImplicitEuler {
    fn apply(&self, system: &dyn OdeSystem, t: f64, dt: f64, y_old: &State) -> SimResult<State> {
        let n = y_old.len();
        let t_new = t + dt;
        let threshold = self.tolerance * (1.0 + max_abs(y_old));
        let mut x = y_old.clone();

        for iteration in 0..self.max_iterations {
            let residual = newton_residual(system, t_new, dt, &x, y_old);
            let norm = max_abs(&residual);
            trace!("newton iteration {}: residual {:e}", iteration, norm);
            if norm <= threshold {
                return Ok(x);
            }
            if !norm.is_finite() {
                return Err(convergence_failure(t, iteration, norm));
            }

            let jacobian = DMatrix::identity(n, n) - system.jacobian(t_new, &x) * dt;
            match jacobian.lu().solve(&residual) {
                Some(step) => x -= step,
                None => {
                    warn!("singular Newton system at t = {}", t);
                    return Err(convergence_failure(t, iteration, norm));
                }
            }
        }

        let norm = max_abs(&newton_residual(system, t_new, dt, &x, y_old));
        if norm <= threshold {
            Ok(x)
        } else {
            Err(convergence_failure(t, self.max_iterations, norm))
        }
    }
}

/// `x - dt * f(t, x) - y_old`
fn newton_residual(system: &dyn OdeSystem, t: f64, dt: f64, x: &State, y_old: &State) -> State {
    x - system.rhs(t, x) * dt - y_old
}

fn convergence_failure(t: f64, iterations: usize, residual: f64) -> SimError {
    let failure = SimError::NumericalConvergenceFailure { iterations, residual };
    warn!("implicit Euler failed at t = {}: {}", t, failure);
    failure
}

/// Approximates the Jacobian of a system by forward differences.
pub fn finite_difference_jacobian<S: OdeSystem + ?Sized>(system: &S, t: f64, y: &State) -> DMatrix<f64> {
    let n = y.len();
    let f0 = system.rhs(t, y);
    let mut jacobian = DMatrix::zeros(f0.len(), n);
    let mut shifted = y.clone();
    for k in 0..n {
        let h = f64::EPSILON.sqrt() * f64::max(1.0, y[k].abs());
        shifted[k] = y[k] + h;
        let column = (system.rhs(t, &shifted) - &f0) / h;
        jacobian.set_column(k, &column);
        shifted[k] = y[k];
    }
    jacobian
}

/// The largest absolute component of a vector, propagating NaN.
fn max_abs(v: &State) -> f64 {
    v.iter().fold(0.0, |max, x| {
        let x = x.abs();
        if x > max || x.is_nan() {
            x
        } else {
            max
        }
    })
}
