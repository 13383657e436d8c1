use compartmental::prelude::*;
use std::{env, process};

const TRUE_CONTACT_RATE: Real = 0.35;
const RECOVERY_RATE: Real = 0.1;

fn model() -> Result<CompartmentalModel> {
    let mut model = CompartmentalModel::new(&["S", "I", "R"], 0.0, 60.0, 0.5, &["I"])?;
    model
        .set_initial_population(&[("S", 9_990.0), ("I", 10.0)])?
        .add_infection_frequency_flow("infection", "contact_rate", "S", "I")?
        .add_transition_flow("recovery", "recovery_rate", "I", "R")?
        .request_output("incidence", DerivedOutput::flow_rate("infection"))?;
    return Ok(model);
}

/// Synthetic observations: weekly incidence of the "true" model
fn synthetic_target(model: &CompartmentalModel) -> Result<Target> {
    let truth = Parameters::new()
        .with("contact_rate", TRUE_CONTACT_RATE)
        .with("recovery_rate", RECOVERY_RATE);
    let out = model.run_with(&truth, SolverKind::RungeKutta4)?;
    let times: Vec<Time> = (1..=8).map(|w| 7.0 * w as Real).collect();
    let mut values = vec![];
    for &t in times.iter() {
        values.push(out.value_at("incidence", t)?.unwrap_or(0.0).round());
    }
    Target::new("incidence", &times, &values, Likelihood::Poisson)
}

/// Usage: calibrate [observations.csv]
///
/// The file needs a `time` column and an `incidence` (or `value`) column.
fn run() -> Result<()> {
    let model = model()?;
    let target = match env::args().nth(1) {
        Some(path) => Target::from_csv("incidence", path, Likelihood::Poisson)?,
        None => synthetic_target(&model)?,
    };

    let base = Parameters::new()
        .with("contact_rate", 0.2)
        .with("recovery_rate", RECOVERY_RATE);
    let mut sampler = Metropolis::new(&model, base)
        .with_parameter("contact_rate", Prior::uniform(0.05, 1.0), 0.01)
        .with_parameter("recovery_rate", Prior::normal(0.1, 0.02), 0.005)
        .with_target(target)
        .seed(42);
    let chain = sampler.run(5_000)?;

    println!("acceptance rate: {:.3}", chain.acceptance_rate());
    if let Some(map) = chain.map_estimate() {
        for (name, x) in map.iter() {
            println!("MAP {}: {:.4}", name, x);
        }
    }
    for (name, stats) in chain.summary(1_000) {
        println!(
            "{}: mean = {:.4}, sd = {:.4}, median = {:.4}, range = [{:.4}, {:.4}]",
            name,
            stats.mean(),
            stats.std(),
            stats.median(),
            stats.min(),
            stats.max()
        );
    }
    return Ok(());
}

pub fn main() {
    use simple_logger::SimpleLogger;
    SimpleLogger::new().init().unwrap();

    if let Err(e) = run() {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}
