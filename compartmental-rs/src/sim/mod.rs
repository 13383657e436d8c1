//! Integration loop and storage of results.
//!
//! The run loop advances the state of a model with a solver and reports a
//! Snapshot of each output time to a Tracker. The default tracker records
//! everything into an Outputs table.
mod outputs;
mod sweep;

pub use outputs::*;
pub use sweep::*;

use crate::{
    error::Result,
    model::{CompartmentalModel, ModelRuntime},
    params::Parameters,
    prelude::{Real, Time},
    solver::{OdeSystem, Solver},
    trackers::Tracker,
};
use log::*;

/// State of a running simulation at one output time.
#[derive(Debug, Clone, Copy)]
pub struct Snapshot<'a> {
    pub step: usize,
    pub time: Time,
    pub state: &'a [Real],
    pub flow_rates: &'a [Real],
    pub derived: &'a [Real],
}

/// First compartment found below zero during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct NegativeSize {
    pub compartment: String,
    pub time: Time,
    pub value: Real,
}

/// Integrate model and collect results into an Outputs table.
pub fn run<S>(model: &CompartmentalModel, params: &Parameters, solver: &mut S) -> Result<Outputs>
where
    S: Solver,
{
    let mut recorder = Recorder::new(model);
    let negative = run_with_tracker(model, params, solver, &mut recorder)?;
    return Ok(recorder.finish(negative));
}

/// Integrate model and pass a snapshot of each output time (including the
/// initial state) to the given tracker.
///
/// Negative compartment sizes are not corrected. The first one is logged as
/// a warning and returned, and the run carries on.
pub fn run_with_tracker<S, T>(
    model: &CompartmentalModel,
    params: &Parameters,
    solver: &mut S,
    tracker: &mut T,
) -> Result<Option<NegativeSize>>
where
    S: Solver,
    T: for<'a> Tracker<Snapshot<'a>>,
{
    let runtime = ModelRuntime::new(model, params)?;
    let times = model.times();
    info!(
        "running model with {} compartments and {} flows: {} steps of {} ({})",
        runtime.dimension(),
        runtime.n_flows(),
        model.n_steps(),
        model.step(),
        solver.name()
    );

    let mut state = model.initial_population().clone();
    let mut flow_rates = Vec::with_capacity(runtime.n_flows());
    let mut derived = Vec::with_capacity(runtime.n_outputs());
    let mut negative: Option<NegativeSize> = None;

    for (n, &time) in times.iter().enumerate() {
        if n > 0 {
            let prev = times[n - 1];
            solver.step(&runtime, prev, &mut state, time - prev);
            if negative.is_none() {
                if let Some(i) = state.iter().position(|&x| x < 0.0) {
                    let name = model.compartments()[i].name();
                    warn!(
                        "compartment {} became negative ({}) at t = {}; consider a smaller step",
                        name, state[i], time
                    );
                    negative = Some(NegativeSize {
                        compartment: name.clone(),
                        time,
                        value: state[i],
                    });
                }
            }
        }
        runtime.flow_rates(time, &state, &mut flow_rates);
        runtime.derived_outputs(&state, &flow_rates, &mut derived);
        debug!("step [{}]: t = {}, state = {:?}", n, time, state);

        tracker.track(&Snapshot {
            step: n,
            time,
            state: &state,
            flow_rates: &flow_rates,
            derived: &derived,
        });
    }
    return Ok(negative);
}
