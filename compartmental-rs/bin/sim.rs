use compartmental::prelude::*;
use std::{env, process};

fn run(path: &str) -> Result<()> {
    let cfg = ModelConfig::from_path(path)?;
    if cfg.verbose {
        println!("{:#?}", cfg);
    }
    let out = cfg.run()?;
    out.write_csv("outputs.csv")?;

    if let Some(state) = out.final_state() {
        for (name, x) in out.compartments().iter().zip(state) {
            println!("{}: {:.3}", name, x);
        }
    }
    println!("Results written to outputs.csv");
    return Ok(());
}

pub fn main() {
    use simple_logger::SimpleLogger;
    SimpleLogger::new().init().unwrap();

    let path = env::args().nth(1).unwrap_or_else(|| "conf.toml".to_string());
    if let Err(e) = run(&path) {
        eprintln!("error reading {}: {}", path, e);
        process::exit(1);
    }
}
