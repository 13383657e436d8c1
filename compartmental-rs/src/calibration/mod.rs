//! Bayesian calibration of model parameters with a Metropolis sampler.
mod metropolis;

pub use metropolis::*;

use crate::{
    error::{ModelError, Result},
    prelude::{Real, Time, INF},
    sim::Outputs,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

const LN_SQRT_2PI: Real = 0.918_938_533_204_672_8;

/// Prior distribution of a calibrated parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Prior {
    Uniform { lower: Real, upper: Real },
    Normal { mean: Real, sd: Real },
}

impl Prior {
    pub fn uniform(lower: Real, upper: Real) -> Self {
        Prior::Uniform { lower, upper }
    }

    pub fn normal(mean: Real, sd: Real) -> Self {
        Prior::Normal { mean, sd }
    }

    /// Log of the probability density at x. Returns -inf outside the support.
    pub fn log_density(&self, x: Real) -> Real {
        match *self {
            Prior::Uniform { lower, upper } => {
                if x >= lower && x <= upper {
                    -(upper - lower).ln()
                } else {
                    -INF
                }
            }
            Prior::Normal { mean, sd } => {
                let z = (x - mean) / sd;
                -0.5 * z * z - sd.ln() - LN_SQRT_2PI
            }
        }
    }

    /// A reasonable starting point for a chain.
    pub fn center(&self) -> Real {
        match *self {
            Prior::Uniform { lower, upper } => 0.5 * (lower + upper),
            Prior::Normal { mean, .. } => mean,
        }
    }

    pub(crate) fn validate(&self) -> std::result::Result<(), String> {
        match *self {
            Prior::Uniform { lower, upper } if !(lower < upper) => {
                Err(format!("uniform prior requires lower < upper, got [{}, {}]", lower, upper))
            }
            Prior::Normal { sd, .. } if !(sd > 0.0) => {
                Err(format!("normal prior requires a positive sd, got {}", sd))
            }
            _ => Ok(()),
        }
    }
}

/// Distribution of observations around model predictions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Likelihood {
    Normal { sd: Real },
    Poisson,
}

impl Likelihood {
    /// Log-likelihood of one observation given the model prediction.
    ///
    /// The Poisson likelihood omits the ln(k!) term, which does not depend
    /// on the parameters.
    pub fn log_likelihood(&self, observed: Real, predicted: Real) -> Real {
        match *self {
            Likelihood::Normal { sd } => {
                let z = (observed - predicted) / sd;
                -0.5 * z * z - sd.ln() - LN_SQRT_2PI
            }
            Likelihood::Poisson => {
                if predicted > 0.0 {
                    observed * predicted.ln() - predicted
                } else if observed == 0.0 {
                    0.0
                } else {
                    -INF
                }
            }
        }
    }
}

/// Observed data for one model output.
///
/// The output can be a compartment (full or base name), a derived output or
/// a flow. Model values between output times are interpolated linearly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub output: String,
    pub times: Vec<Time>,
    pub values: Vec<Real>,
    pub likelihood: Likelihood,
}

impl Target {
    pub fn new(output: &str, times: &[Time], values: &[Real], likelihood: Likelihood) -> Result<Self> {
        if times.len() != values.len() {
            return Err(ModelError::Calibration(format!(
                "target {} has {} times and {} values",
                output,
                times.len(),
                values.len()
            )));
        }
        if let Likelihood::Normal { sd } = likelihood {
            if !(sd > 0.0) {
                return Err(ModelError::Calibration(format!(
                    "target {}: sd must be positive, got {}",
                    output, sd
                )));
            }
        }
        Ok(Target {
            output: output.to_string(),
            times: times.to_vec(),
            values: values.to_vec(),
            likelihood,
        })
    }

    /// Read observations from a CSV file with a `time` column and a column
    /// named after the output (or, failing that, a `value` column).
    ///
    /// Tables written by Outputs::write_csv() can be read back directly.
    pub fn from_csv(output: &str, path: impl AsRef<Path>, likelihood: Likelihood) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        let column = |name: &str| headers.iter().position(|h| h.trim() == name);
        let missing = |name: &str| {
            ModelError::Calibration(format!("{}: no column named {}", path.display(), name))
        };
        let time_col = column("time").ok_or_else(|| missing("time"))?;
        let value_col = column(output)
            .or_else(|| column("value"))
            .ok_or_else(|| missing(output))?;

        let (mut times, mut values) = (vec![], vec![]);
        for (i, record) in reader.records().enumerate() {
            let record = record?;
            times.push(parse_field(&record, time_col, i)?);
            values.push(parse_field(&record, value_col, i)?);
        }
        Self::new(output, &times, &values, likelihood)
    }

    /// Log-likelihood of observations given the outputs of a run.
    pub fn log_likelihood(&self, outputs: &Outputs) -> Result<Real> {
        let mut total = 0.0;
        for (&t, &obs) in self.times.iter().zip(self.values.iter()) {
            let predicted = outputs.value_at(&self.output, t)?.ok_or_else(|| {
                ModelError::Calibration(format!(
                    "observation of {} at t = {} is outside the simulated interval",
                    self.output, t
                ))
            })?;
            total += self.likelihood.log_likelihood(obs, predicted);
        }
        return Ok(total);
    }
}

fn parse_field(record: &csv::StringRecord, j: usize, row: usize) -> Result<Real> {
    let field = record.get(j).unwrap_or("");
    field.trim().parse::<Real>().map_err(|_| {
        ModelError::Calibration(format!("row {}: invalid number {:?}", row + 1, field))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::{CompartmentalModel, Parameters, SolverKind};
    use assert_approx_eq::assert_approx_eq;
    use std::fs;

    fn sir_outputs() -> Outputs {
        let mut model = CompartmentalModel::new(&["S", "I", "R"], 0.0, 10.0, 0.5, &["I"]).unwrap();
        model
            .set_initial_population(&[("S", 990.0), ("I", 10.0)])
            .unwrap()
            .add_infection_frequency_flow("infection", 0.4, "S", "I")
            .unwrap()
            .add_transition_flow("recovery", 0.1, "I", "R")
            .unwrap();
        model.run_with(&Parameters::new(), SolverKind::RungeKutta4).unwrap()
    }

    #[test]
    fn prior_densities() {
        let prior = Prior::uniform(0.0, 4.0);
        assert_approx_eq!(prior.log_density(1.0), -(4.0 as Real).ln(), 1e-12);
        assert_eq!(prior.log_density(4.5), -INF);
        assert_eq!(prior.center(), 2.0);

        let prior = Prior::normal(1.0, 2.0);
        let expected = -(2.0 * (2.0 * std::f64::consts::PI).sqrt()).ln() - 0.125;
        assert_approx_eq!(prior.log_density(2.0), expected, 1e-12);

        assert!(Prior::uniform(1.0, 1.0).validate().is_err());
        assert!(Prior::normal(0.0, -1.0).validate().is_err());
    }

    #[test]
    fn likelihoods() {
        let normal = Likelihood::Normal { sd: 1.0 };
        assert!(normal.log_likelihood(3.0, 3.0) > normal.log_likelihood(3.0, 4.0));

        let poisson = Likelihood::Poisson;
        assert_approx_eq!(poisson.log_likelihood(2.0, 2.0), 2.0 * (2.0 as Real).ln() - 2.0, 1e-12);
        assert_eq!(poisson.log_likelihood(0.0, 0.0), 0.0);
        assert_eq!(poisson.log_likelihood(1.0, 0.0), -INF);
    }

    #[test]
    fn targets_are_validated() {
        assert!(Target::new("I", &[1.0, 2.0], &[3.0], Likelihood::Poisson).is_err());
        assert!(Target::new("I", &[1.0], &[3.0], Likelihood::Normal { sd: 0.0 }).is_err());
        assert!(Target::new("I", &[1.0], &[3.0], Likelihood::Normal { sd: 1.0 }).is_ok());
    }

    #[test]
    fn targets_read_tables_written_by_outputs() {
        let out = sir_outputs();
        let path = std::env::temp_dir().join(format!("compartmental-target-{}.csv", std::process::id()));
        out.write_csv(&path).unwrap();

        let target = Target::from_csv("I", &path, Likelihood::Normal { sd: 1.0 });
        let missing = Target::from_csv("E", &path, Likelihood::Poisson);
        fs::remove_file(&path).unwrap();

        let target = target.unwrap();
        let expected = out.compartment("I").unwrap();
        assert_eq!(&target.times, out.times());
        assert_eq!(target.values.len(), expected.len());
        for (x, y) in target.values.iter().zip(expected.iter()) {
            assert_approx_eq!(*x, *y, 1e-9);
        }
        let ll = target.log_likelihood(&out).unwrap();
        assert_approx_eq!(ll, -(target.times.len() as Real) * LN_SQRT_2PI, 1e-6);
        assert!(missing.is_err());
    }

    #[test]
    fn targets_read_plain_observation_files() {
        let path = std::env::temp_dir().join(format!("compartmental-obs-{}.csv", std::process::id()));
        fs::write(&path, "time,value\n1,12\n2.5,30\n").unwrap();
        let target = Target::from_csv("incidence", &path, Likelihood::Poisson);
        fs::write(&path, "time,value\n1,twelve\n").unwrap();
        let invalid = Target::from_csv("incidence", &path, Likelihood::Poisson);
        fs::remove_file(&path).unwrap();

        let target = target.unwrap();
        assert_eq!(target.output, "incidence");
        assert_eq!(target.times, vec![1.0, 2.5]);
        assert_eq!(target.values, vec![12.0, 30.0]);
        assert!(invalid.is_err());
    }
}
