//! Fixed-step solvers for first-order ODE systems.
//!
//! Solvers only see an OdeSystem, i.e., a function that maps a state to its
//! derivatives. Models never depend on a particular solver and can be run
//! with any of them.
mod euler;
mod runge_kutta;

pub use euler::*;
pub use runge_kutta::*;

use crate::prelude::{Real, Time};
use serde::{Deserialize, Serialize};

/// A system of first-order ODEs dy/dt = f(t, y).
pub trait OdeSystem {
    /// Number of state variables.
    fn dimension(&self) -> usize;

    /// Write f(t, y) into dy.
    fn derivatives(&self, t: Time, y: &[Real], dy: &mut [Real]);
}

/// A fixed-step explicit solver.
///
/// Solvers may keep internal buffers between steps, hence the mutable
/// receiver.
pub trait Solver {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Advance state y from time t to t + dt in place.
    fn step<S: OdeSystem + ?Sized>(&mut self, system: &S, t: Time, y: &mut [Real], dt: Time);
}

/// Selects a solver at run time, e.g. from a configuration file.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverKind {
    #[serde(rename = "euler")]
    Euler,
    #[serde(rename = "rk4")]
    RungeKutta4,
}

impl Default for SolverKind {
    fn default() -> Self {
        SolverKind::RungeKutta4
    }
}

impl SolverKind {
    /// Create a fresh solver of this kind.
    pub fn solver(self) -> AnySolver {
        match self {
            SolverKind::Euler => Euler::new().into(),
            SolverKind::RungeKutta4 => RungeKutta4::new().into(),
        }
    }
}

/// Any of the solvers implemented in this crate.
#[derive(Debug, Clone)]
pub enum AnySolver {
    Euler(Euler),
    RungeKutta4(RungeKutta4),
}

impl Solver for AnySolver {
    fn name(&self) -> &'static str {
        match self {
            AnySolver::Euler(s) => s.name(),
            AnySolver::RungeKutta4(s) => s.name(),
        }
    }

    fn step<S: OdeSystem + ?Sized>(&mut self, system: &S, t: Time, y: &mut [Real], dt: Time) {
        match self {
            AnySolver::Euler(s) => s.step(system, t, y, dt),
            AnySolver::RungeKutta4(s) => s.step(system, t, y, dt),
        }
    }
}

impl From<Euler> for AnySolver {
    fn from(solver: Euler) -> AnySolver {
        AnySolver::Euler(solver)
    }
}

impl From<RungeKutta4> for AnySolver {
    fn from(solver: RungeKutta4) -> AnySolver {
        AnySolver::RungeKutta4(solver)
    }
}
