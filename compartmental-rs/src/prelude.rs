pub use crate::{
    analysis::*,
    calibration::{Chain, Likelihood, Metropolis, Prior, Target},
    config::ModelConfig,
    error::{ModelError, Result},
    model::*,
    params::{conversions::*, Parameters},
    sim::{run_sweep, NegativeSize, Outputs},
    solver::{Euler, RungeKutta4, Solver, SolverKind},
    trackers::{TableTracker, Tracker},
    utils::*,
    Real, Time,
};
pub(crate) use crate::{INF, NAN};
