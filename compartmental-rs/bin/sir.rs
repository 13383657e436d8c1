use compartmental::prelude::*;
use std::process;

const CONTACT_RATE: Real = 0.3;
const RECOVERY_RATE: Real = 0.1;

fn sir(step: Time) -> Result<CompartmentalModel> {
    let mut model = CompartmentalModel::new(&["S", "I", "R"], 0.0, 120.0, step, &["I"])?;
    model
        .set_initial_population_with_total(&[("S", 999.0), ("I", 1.0)], 1000.0)?
        .add_infection_frequency_flow("infection", "contact_rate", "S", "I")?
        .add_transition_flow("recovery", "recovery_rate", "I", "R")?
        .request_output("incidence", DerivedOutput::flow_rate("infection"))?
        .request_output("prevalence", DerivedOutput::prevalence(&["I"]))?;
    return Ok(model);
}

fn attack_rate(out: &Outputs) -> Real {
    let r = out.compartment("R").unwrap_or_default();
    r.last().copied().unwrap_or(0.0) / 1000.0
}

fn run() -> Result<()> {
    let params = Parameters::new()
        .with("contact_rate", CONTACT_RATE)
        .with("recovery_rate", RECOVERY_RATE);

    // Closed-form quantities
    let duration = sojourn_time(&[RECOVERY_RATE])?;
    let r0 = basic_reproduction_number(CONTACT_RATE, duration)?;
    println!("mean infectious period: {:.2} days", duration);
    println!("median time to recovery: {:.2} days", median_exit_time(&[RECOVERY_RATE])?);
    println!("risk of recovery within 7 days: {:.3}", risk_from_rate(RECOVERY_RATE, 7.0)?);
    println!("R0 = {:.2}, herd immunity threshold = {:.3}", r0, herd_immunity_threshold(r0));
    println!("expected final size: {:.4}", final_size(r0)?);

    // Euler with decreasing steps vs. RK4
    for &step in [1.0, 0.1, 0.01].iter() {
        let out = sir(step)?.run(&params, &mut Euler::new())?;
        println!("euler (step = {}): final size = {:.4}", step, attack_rate(&out));
    }
    let model = sir(1.0)?;
    let out = model.run(&params, &mut RungeKutta4::new())?;
    println!("rk4 (step = 1): final size = {:.4}", attack_rate(&out));

    println!();
    println!("{}", out.render_csv(','));
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
