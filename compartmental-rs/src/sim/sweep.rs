use super::Outputs;
use crate::{error::Result, model::CompartmentalModel, params::Parameters, solver::SolverKind};
use rayon::prelude::*;

/// Run model once for each parameter set, in parallel.
///
/// Runs are independent: each one owns a fresh solver and state, while the
/// model is shared. Results are returned in the same order as params.
pub fn run_sweep(
    model: &CompartmentalModel,
    params: &[Parameters],
    kind: SolverKind,
) -> Vec<Result<Outputs>> {
    params
        .par_iter()
        .map(|p| model.run_with(p, kind))
        .collect()
}
