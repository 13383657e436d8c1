//! Small compartmental models of infectious disease.
//!
//! A model is a set of named compartments and a list of flows between them.
//! Flows carry rate expressions that may depend on parameters, time and the
//! current compartment sizes. Models are integrated forward in time by one of
//! the fixed-step solvers in [`solver`] and produce a table of compartment
//! sizes indexed by time.
pub mod analysis;
pub mod calibration;
pub mod config;
pub mod error;
pub mod model;
pub mod params;
pub mod prelude;
pub mod sim;
pub mod solver;
pub mod trackers;
pub mod utils;

pub use crate::error::{ModelError, Result};
pub use crate::model::{CompartmentalModel, Flow, FlowKind, Rate, Stratification, Transmission};
pub use crate::params::Parameters;
pub use crate::sim::Outputs;
pub use crate::solver::{Euler, RungeKutta4, Solver, SolverKind};

/// Base Real type used by this crate. Uses an alias to easily change precision
/// if necessary.
pub type Real = f64;

/// Basic representation of time. Models are continuous in time and this crate
/// usually assumes it is measured in days.
pub type Time = Real;

pub(crate) const INF: Real = Real::INFINITY;
pub(crate) const NAN: Real = Real::NAN;
