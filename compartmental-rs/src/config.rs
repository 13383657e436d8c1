//! Model declarations read from TOML files.
//!
//! A configuration file declares compartments, flows, parameters, solver
//! and requested outputs. Every field has a default, so files only need to
//! list what they use.
//!
//! ```toml
//! compartments = ["S", "I", "R"]
//! infectious = ["I"]
//! solver = "rk4"
//!
//! [time]
//! end = 100.0
//! step = 0.1
//!
//! [initial_population]
//! S = 990.0
//! I = 10.0
//!
//! [parameters]
//! contact_rate = 0.3
//!
//! [[flows]]
//! name = "infection"
//! kind = "infection_frequency"
//! source = "S"
//! dest = "I"
//! rate = "contact_rate"
//!
//! [[flows]]
//! name = "recovery"
//! kind = "transition"
//! source = "I"
//! dest = "R"
//! rate = 0.1
//! ```
use crate::{
    error::{ModelError, Result},
    model::{CompartmentalModel, DerivedOutput, Flow, FlowKind, Rate, Stratification},
    params::Parameters,
    prelude::{Real, Time},
    sim::Outputs,
    solver::SolverKind,
};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs, path::Path};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TimeConfig {
    pub start: Time,
    pub end: Time,
    pub step: Time,
}

impl Default for TimeConfig {
    fn default() -> Self {
        TimeConfig {
            start: 0.0,
            end: 100.0,
            step: 1.0,
        }
    }
}

/// Rates in config files are either numbers or parameter names.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum RateConfig {
    Value(Real),
    Param(String),
}

impl From<&RateConfig> for Rate {
    fn from(rate: &RateConfig) -> Rate {
        match rate {
            RateConfig::Value(x) => Rate::Constant(*x),
            RateConfig::Param(name) => Rate::param(name),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct FlowConfig {
    pub name: String,
    pub kind: FlowKind,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub dest: Option<String>,
    pub rate: RateConfig,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct OutputConfig {
    pub name: String,
    #[serde(flatten)]
    pub output: DerivedOutput,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct StratificationConfig {
    pub name: String,
    pub strata: Vec<String>,
    /// Base names of stratified compartments. Empty means all.
    pub compartments: Vec<String>,
    pub population_split: Option<Vec<Real>>,
    pub flow_adjustments: BTreeMap<String, Vec<Real>>,
    pub infectiousness_adjustments: BTreeMap<String, Vec<Real>>,
    pub mixing_matrix: Option<Vec<Vec<Real>>>,
}

impl StratificationConfig {
    pub fn build(&self) -> Result<Stratification> {
        let strata: Vec<&str> = self.strata.iter().map(|s| s.as_str()).collect();
        let comps: Vec<&str> = self.compartments.iter().map(|s| s.as_str()).collect();
        let mut strat = Stratification::new(&self.name, &strata, &comps);
        if let Some(split) = &self.population_split {
            strat = strat.with_population_split(split);
        }
        for (flow, factors) in self.flow_adjustments.iter() {
            strat = strat.with_flow_adjustments(flow, factors);
        }
        for (comp, factors) in self.infectiousness_adjustments.iter() {
            strat = strat.with_infectiousness_adjustments(comp, factors);
        }
        if let Some(rows) = &self.mixing_matrix {
            strat = strat.with_mixing_matrix(self.matrix(rows)?);
        }
        return Ok(strat);
    }

    fn matrix(&self, rows: &[Vec<Real>]) -> Result<Array2<Real>> {
        let n = rows.len();
        let m = rows.first().map(|r| r.len()).unwrap_or(0);
        let data: Vec<Real> = rows.iter().flatten().copied().collect();
        Array2::from_shape_vec((n, m), data).map_err(|e| ModelError::InvalidStratification {
            name: self.name.clone(),
            reason: format!("invalid mixing matrix: {}", e),
        })
    }
}

/// A complete model declaration.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub compartments: Vec<String>,
    pub infectious: Vec<String>,
    pub time: TimeConfig,
    pub initial_population: BTreeMap<String, Real>,
    pub flows: Vec<FlowConfig>,
    pub parameters: Parameters,
    pub solver: SolverKind,
    pub outputs: Vec<OutputConfig>,
    pub stratification: Option<StratificationConfig>,
    pub verbose: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig {
            compartments: vec![],
            infectious: vec![],
            time: TimeConfig::default(),
            initial_population: BTreeMap::new(),
            flows: vec![],
            parameters: Parameters::new(),
            solver: SolverKind::default(),
            outputs: vec![],
            stratification: None,
            verbose: false,
        }
    }
}

impl ModelConfig {
    pub fn from_toml_str(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        Self::from_toml_str(&data)
    }

    /// Declare the model described by this configuration.
    ///
    /// Flows and the initial population refer to unstratified compartment
    /// names. The stratification, if any, is applied after all flows are
    /// added.
    pub fn build(&self) -> Result<CompartmentalModel> {
        let comps: Vec<&str> = self.compartments.iter().map(|s| s.as_str()).collect();
        let infectious: Vec<&str> = self.infectious.iter().map(|s| s.as_str()).collect();
        let mut model = CompartmentalModel::new(
            &comps,
            self.time.start,
            self.time.end,
            self.time.step,
            &infectious,
        )?;

        let population: Vec<(&str, Real)> = self
            .initial_population
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        model.set_initial_population(&population)?;

        for f in self.flows.iter() {
            model.add_flow(Flow::new(
                &f.name,
                f.kind,
                f.source.as_deref(),
                f.dest.as_deref(),
                &f.rate,
            ))?;
        }
        if let Some(strat) = &self.stratification {
            model.stratify_with(&strat.build()?)?;
        }
        for out in self.outputs.iter() {
            model.request_output(&out.name, out.output.clone())?;
        }
        return Ok(model);
    }

    /// Build and run model with the configured parameters and solver.
    pub fn run(&self) -> Result<Outputs> {
        self.build()?.run_with(&self.parameters, self.solver)
    }
}
