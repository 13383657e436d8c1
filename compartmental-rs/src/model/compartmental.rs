use crate::{
    error::{ModelError, Result},
    model::{DerivedOutput, Flow, FlowKind, Rate, Transmission},
    params::Parameters,
    prelude::{Real, Time},
    sim::{self, Outputs},
    solver::{Solver, SolverKind},
};
use getset::{CopyGetters, Getters};
use ndarray::Array2;
use std::collections::BTreeMap;

/// Relative tolerance used when checking population totals.
const TOTAL_TOLERANCE: Real = 1e-9;

/// Relative tolerance, in units of step, used to align the time grid to end.
const GRID_TOLERANCE: Real = 1e-9;

/// A named population bucket.
///
/// Stratified compartments keep the name of the compartment they were split
/// from as `base` and record the stratum they belong to for each
/// stratification applied to them.
#[derive(Debug, Clone, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct Compartment {
    name: String,
    base: String,
    strata: BTreeMap<String, String>,
}

impl Compartment {
    pub fn new(name: &str) -> Self {
        Compartment {
            name: name.to_string(),
            base: name.to_string(),
            strata: BTreeMap::new(),
        }
    }

    /// Stratum of this compartment in the given stratification.
    pub fn stratum(&self, stratification: &str) -> Option<&str> {
        self.strata.get(stratification).map(|s| s.as_str())
    }

    pub(crate) fn stratified(&self, stratification: &str, stratum: &str) -> Self {
        let mut strata = self.strata.clone();
        strata.insert(stratification.to_string(), stratum.to_string());
        Compartment {
            name: format!("{}_{}", self.name, stratum),
            base: self.base.clone(),
            strata,
        }
    }
}

/// A mixing matrix bound to the strata of a stratification.
///
/// Entry (i, j) scales the contact rate of individuals in stratum i with
/// individuals in stratum j.
#[derive(Debug, Clone, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct Mixing {
    pub(crate) stratification: String,
    pub(crate) strata: Vec<String>,
    pub(crate) matrix: Array2<Real>,
}

/// A compartmental model: compartments, flows between them and the time grid
/// in which the model is integrated.
///
/// Models are declared once and can be executed many times with different
/// Parameters and solvers.
///
/// # Example
///
/// ```
/// use compartmental::prelude::*;
///
/// let mut model = CompartmentalModel::new(&["S", "I", "R"], 0.0, 100.0, 0.1, &["I"]).unwrap();
/// model
///     .set_initial_population(&[("S", 990.0), ("I", 10.0)]).unwrap()
///     .add_infection_frequency_flow("infection", "contact_rate", "S", "I").unwrap()
///     .add_transition_flow("recovery", "recovery_rate", "I", "R").unwrap();
///
/// let params = Parameters::new()
///     .with("contact_rate", 0.3)
///     .with("recovery_rate", 0.1);
/// let outputs = model.run_with(&params, SolverKind::RungeKutta4).unwrap();
/// assert!(outputs.compartment("R").unwrap().last().unwrap() > &500.0);
/// ```
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct CompartmentalModel {
    #[getset(get = "pub")]
    pub(crate) compartments: Vec<Compartment>,
    #[getset(get = "pub")]
    pub(crate) infectious: Vec<String>,
    #[getset(get = "pub")]
    pub(crate) flows: Vec<Flow>,
    #[getset(get = "pub")]
    pub(crate) initial_population: Vec<Real>,
    #[getset(get_copy = "pub")]
    start: Time,
    #[getset(get_copy = "pub")]
    end: Time,
    #[getset(get_copy = "pub")]
    step: Time,
    #[getset(get = "pub")]
    pub(crate) outputs: Vec<(String, DerivedOutput)>,
    #[getset(get = "pub")]
    pub(crate) stratifications: Vec<String>,
    #[getset(get = "pub")]
    pub(crate) mixing: Option<Mixing>,
    /// Relative contribution of each compartment to the force of infection.
    pub(crate) infectiousness: Vec<Real>,
}

impl CompartmentalModel {
    /// Create a new model with the given compartments, integrated from start
    /// to end with a fixed step. Infectious compartments contribute to the
    /// force of infection of infection flows.
    ///
    /// If (end - start) is not a multiple of step, the time grid is rounded
    /// up and the last output time lies after end.
    pub fn new(
        compartments: &[&str],
        start: Time,
        end: Time,
        step: Time,
        infectious: &[&str],
    ) -> Result<Self> {
        if !(step > 0.0 && step.is_finite()) {
            return Err(ModelError::InvalidTimeSpan(format!(
                "step must be positive, got {}",
                step
            )));
        }
        if !(start.is_finite() && end.is_finite()) || end < start {
            return Err(ModelError::InvalidTimeSpan(format!(
                "cannot integrate from {} to {}",
                start, end
            )));
        }

        let mut comps: Vec<Compartment> = Vec::with_capacity(compartments.len());
        for &name in compartments {
            if name.is_empty() {
                return Err(ModelError::InvalidArgument(
                    "compartment names cannot be empty".into(),
                ));
            }
            if comps.iter().any(|c| c.name() == name) {
                return Err(ModelError::DuplicateCompartment(name.to_string()));
            }
            comps.push(Compartment::new(name));
        }
        for &name in infectious {
            if !comps.iter().any(|c| c.name() == name) {
                return Err(ModelError::UnknownCompartment(name.to_string()));
            }
        }

        let n = comps.len();
        Ok(CompartmentalModel {
            compartments: comps,
            infectious: infectious.iter().map(|s| s.to_string()).collect(),
            flows: vec![],
            initial_population: vec![0.0; n],
            start,
            end,
            step,
            outputs: vec![],
            stratifications: vec![],
            mixing: None,
            infectiousness: vec![1.0; n],
        })
    }

    ///////////////////////////////////////////////////////////////////////////
    // Compartments and time
    ///////////////////////////////////////////////////////////////////////////

    /// Full names of compartments, in declaration order.
    pub fn compartment_names(&self) -> Vec<&str> {
        self.compartments.iter().map(|c| c.name().as_str()).collect()
    }

    /// Index of the compartment with the given full name.
    pub fn index_of(&self, name: &str) -> Result<usize> {
        self.compartments
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| ModelError::UnknownCompartment(name.to_string()))
    }

    /// Indexes of all compartments derived from the given base name.
    pub fn indices_of_base(&self, base: &str) -> Vec<usize> {
        self.compartments
            .iter()
            .enumerate()
            .filter(|(_, c)| c.base() == base)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn has_base(&self, base: &str) -> bool {
        self.compartments.iter().any(|c| c.base() == base)
    }

    /// True if compartment at index i is infectious.
    pub fn is_infectious(&self, i: usize) -> bool {
        self.compartments
            .get(i)
            .map(|c| self.infectious.iter().any(|name| name == c.base()))
            .unwrap_or(false)
    }

    /// Relative infectiousness of each compartment. Non-infectious compartments
    /// keep their factor, but it is ignored.
    pub fn infectiousness(&self) -> &[Real] {
        &self.infectiousness
    }

    /// Number of integration steps.
    pub fn n_steps(&self) -> usize {
        let ratio = (self.end - self.start) / self.step;
        (ratio - GRID_TOLERANCE).ceil().max(0.0) as usize
    }

    /// Output times from start to (at least) end.
    ///
    /// A last grid point that misses end only by rounding error is set to
    /// end exactly.
    pub fn times(&self) -> Vec<Time> {
        let n = self.n_steps();
        let mut times: Vec<Time> = (0..=n)
            .map(|k| self.start + k as Real * self.step)
            .collect();
        if let Some(last) = times.last_mut() {
            if (*last - self.end).abs() <= GRID_TOLERANCE * self.step {
                *last = self.end;
            }
        }
        return times;
    }

    ///////////////////////////////////////////////////////////////////////////
    // Initial conditions
    ///////////////////////////////////////////////////////////////////////////

    /// Set initial population from (compartment, size) pairs. Compartments
    /// not listed start empty.
    pub fn set_initial_population(&mut self, values: &[(&str, Real)]) -> Result<&mut Self> {
        let mut population = vec![0.0; self.compartments.len()];
        for &(name, value) in values {
            let i = self.index_of(name)?;
            if !(value >= 0.0 && value.is_finite()) {
                return Err(ModelError::InvalidPopulation(format!(
                    "{} has invalid size {}",
                    name, value
                )));
            }
            population[i] = value;
        }
        self.initial_population = population;
        return Ok(self);
    }

    /// Like set_initial_population(), but also checks that sizes add up to
    /// the given total.
    pub fn set_initial_population_with_total(
        &mut self,
        values: &[(&str, Real)],
        total: Real,
    ) -> Result<&mut Self> {
        let sum: Real = values.iter().map(|(_, x)| x).sum();
        if (sum - total).abs() > TOTAL_TOLERANCE * total.abs().max(1.0) {
            return Err(ModelError::InvalidPopulation(format!(
                "sizes add up to {}, expected {}",
                sum, total
            )));
        }
        self.set_initial_population(values)
    }

    /// Set initial population from a vector aligned with compartments.
    pub fn set_initial_vector(&mut self, values: &[Real]) -> Result<&mut Self> {
        if values.len() != self.compartments.len() {
            return Err(ModelError::InvalidPopulation(format!(
                "expected {} values, got {}",
                self.compartments.len(),
                values.len()
            )));
        }
        if let Some(x) = values.iter().find(|x| !(**x >= 0.0 && x.is_finite())) {
            return Err(ModelError::InvalidPopulation(format!(
                "invalid compartment size {}",
                x
            )));
        }
        self.initial_population = values.to_vec();
        return Ok(self);
    }

    /// Total initial population.
    pub fn initial_total(&self) -> Real {
        self.initial_population.iter().sum()
    }

    ///////////////////////////////////////////////////////////////////////////
    // Flows
    ///////////////////////////////////////////////////////////////////////////

    /// Add a flow to the model. End points are full compartment names and
    /// flow names must be unique.
    pub fn add_flow(&mut self, flow: Flow) -> Result<&mut Self> {
        if let Some(reason) = flow.endpoint_error() {
            return Err(ModelError::InvalidFlow {
                flow: flow.name().clone(),
                reason,
            });
        }
        for end in flow.source().iter().chain(flow.dest().iter()) {
            self.index_of(end)?;
        }
        if self.flows.iter().any(|f| f.name() == flow.name()) {
            return Err(ModelError::DuplicateFlow(flow.name().clone()));
        }
        self.flows.push(flow);
        return Ok(self);
    }

    pub fn add_transition_flow(
        &mut self,
        name: &str,
        rate: impl Into<Rate>,
        source: &str,
        dest: &str,
    ) -> Result<&mut Self> {
        self.add_flow(Flow::transition(name, source, dest, rate))
    }

    pub fn add_infection_frequency_flow(
        &mut self,
        name: &str,
        contact_rate: impl Into<Rate>,
        source: &str,
        dest: &str,
    ) -> Result<&mut Self> {
        self.add_flow(Flow::infection(
            name,
            source,
            dest,
            contact_rate,
            Transmission::Frequency,
        ))
    }

    pub fn add_infection_density_flow(
        &mut self,
        name: &str,
        contact_rate: impl Into<Rate>,
        source: &str,
        dest: &str,
    ) -> Result<&mut Self> {
        self.add_flow(Flow::infection(
            name,
            source,
            dest,
            contact_rate,
            Transmission::Density,
        ))
    }

    pub fn add_death_flow(
        &mut self,
        name: &str,
        rate: impl Into<Rate>,
        source: &str,
    ) -> Result<&mut Self> {
        self.add_flow(Flow::death(name, source, rate))
    }

    /// Births proportional to the total population.
    pub fn add_crude_birth_flow(
        &mut self,
        name: &str,
        rate: impl Into<Rate>,
        dest: &str,
    ) -> Result<&mut Self> {
        self.add_flow(Flow::crude_birth(name, dest, rate))
    }

    /// Absolute number of arrivals per unit of time.
    pub fn add_importation_flow(
        &mut self,
        name: &str,
        rate: impl Into<Rate>,
        dest: &str,
    ) -> Result<&mut Self> {
        self.add_flow(Flow::importation(name, dest, rate))
    }

    /// Distinct flow names, in declaration order.
    pub fn flow_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = vec![];
        for f in self.flows.iter() {
            if !names.contains(&f.name().as_str()) {
                names.push(f.name());
            }
        }
        return names;
    }

    /// True if model has flows that create or destroy population.
    pub fn is_open(&self) -> bool {
        self.flows
            .iter()
            .any(|f| matches!(f.kind(), FlowKind::Death | FlowKind::CrudeBirth | FlowKind::Importation))
    }

    /// Names of all parameters referenced by flow rates.
    pub fn required_parameters(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.flows.iter().filter_map(|f| f.rate().param_name()).collect();
        names.sort_unstable();
        names.dedup();
        return names;
    }

    ///////////////////////////////////////////////////////////////////////////
    // Outputs
    ///////////////////////////////////////////////////////////////////////////

    /// Request a derived output computed at each output time.
    pub fn request_output(&mut self, name: &str, output: DerivedOutput) -> Result<&mut Self> {
        if self.outputs.iter().any(|(n, _)| n == name) || self.has_base(name) {
            return Err(ModelError::InvalidArgument(format!(
                "output name {} is already in use",
                name
            )));
        }
        if let DerivedOutput::FlowRate { flow } = &output {
            if !self.flows.iter().any(|f| f.name() == flow) {
                return Err(ModelError::UnknownFlow(flow.clone()));
            }
        }
        for comp in output.compartments() {
            if !self.has_base(comp) {
                return Err(ModelError::UnknownCompartment(comp.to_string()));
            }
        }
        self.outputs.push((name.to_string(), output));
        return Ok(self);
    }

    ///////////////////////////////////////////////////////////////////////////
    // Execution
    ///////////////////////////////////////////////////////////////////////////

    /// Run model with the given parameters and solver.
    pub fn run<S: Solver>(&self, params: &Parameters, solver: &mut S) -> Result<Outputs> {
        sim::run(self, params, solver)
    }

    /// Run model with a fresh solver of the given kind.
    pub fn run_with(&self, params: &Parameters, kind: SolverKind) -> Result<Outputs> {
        let mut solver = kind.solver();
        sim::run(self, params, &mut solver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sir() -> CompartmentalModel {
        let mut model = CompartmentalModel::new(&["S", "I", "R"], 0.0, 10.0, 1.0, &["I"]).unwrap();
        model
            .set_initial_population(&[("S", 99.0), ("I", 1.0)])
            .unwrap()
            .add_infection_frequency_flow("infection", "beta", "S", "I")
            .unwrap()
            .add_transition_flow("recovery", 0.1, "I", "R")
            .unwrap();
        return model;
    }

    #[test]
    fn invalid_declarations() {
        assert!(matches!(
            CompartmentalModel::new(&["S", "S"], 0.0, 1.0, 0.1, &[]),
            Err(ModelError::DuplicateCompartment(_))
        ));
        assert!(matches!(
            CompartmentalModel::new(&["S"], 0.0, 1.0, 0.1, &["I"]),
            Err(ModelError::UnknownCompartment(_))
        ));
        assert!(matches!(
            CompartmentalModel::new(&["S"], 0.0, 1.0, 0.0, &[]),
            Err(ModelError::InvalidTimeSpan(_))
        ));
        assert!(matches!(
            CompartmentalModel::new(&["S"], 5.0, 1.0, 0.1, &[]),
            Err(ModelError::InvalidTimeSpan(_))
        ));
    }

    #[test]
    fn time_grid_is_rounded_up() {
        let model = CompartmentalModel::new(&["S"], 0.0, 10.0, 3.0, &[]).unwrap();
        assert_eq!(model.times(), vec![0.0, 3.0, 6.0, 9.0, 12.0]);

        let model = CompartmentalModel::new(&["S"], 0.0, 10.0, 0.1, &[]).unwrap();
        assert_eq!(model.n_steps(), 100);
        assert_eq!(model.times().len(), 101);
    }

    #[test]
    fn time_grid_reaches_end_despite_rounding() {
        for &end in [0.9, 1.8, 2.7].iter() {
            let model = CompartmentalModel::new(&["S"], 0.0, end, 0.3, &[]).unwrap();
            let times = model.times();
            assert_eq!(*times.last().unwrap(), end);
            assert!(times.windows(2).all(|w| w[1] > w[0]));
        }
    }

    #[test]
    fn initial_population_checks_total() {
        let mut model = sir();
        assert!(model
            .set_initial_population_with_total(&[("S", 90.0), ("I", 10.0)], 100.0)
            .is_ok());
        assert_eq!(model.initial_population(), &vec![90.0, 10.0, 0.0]);
        assert!(matches!(
            model.set_initial_population_with_total(&[("S", 90.0)], 100.0),
            Err(ModelError::InvalidPopulation(_))
        ));
        assert!(model.set_initial_population(&[("S", -1.0)]).is_err());
        assert!(model.set_initial_population(&[("X", 1.0)]).is_err());
        assert!(model.set_initial_vector(&[1.0, 2.0]).is_err());
    }

    #[test]
    fn flows_are_validated() {
        let mut model = sir();
        assert!(matches!(
            model.add_transition_flow("recovery", 0.2, "I", "R"),
            Err(ModelError::DuplicateFlow(_))
        ));
        assert!(matches!(
            model.add_transition_flow("waning", 0.2, "R", "X"),
            Err(ModelError::UnknownCompartment(_))
        ));
        assert!(matches!(
            model.add_flow(Flow::new("bad", FlowKind::Death, None, Some("S"), 0.1)),
            Err(ModelError::InvalidFlow { .. })
        ));
        assert!(!model.is_open());
        model.add_death_flow("mortality", 0.01, "I").unwrap();
        assert!(model.is_open());
        assert_eq!(model.required_parameters(), vec!["beta"]);
        assert_eq!(model.flow_names(), vec!["infection", "recovery", "mortality"]);
    }

    #[test]
    fn outputs_are_validated() {
        let mut model = sir();
        assert!(model
            .request_output("incidence", DerivedOutput::flow_rate("infection"))
            .is_ok());
        assert!(model
            .request_output("incidence", DerivedOutput::flow_rate("recovery"))
            .is_err());
        assert!(matches!(
            model.request_output("x", DerivedOutput::flow_rate("waning")),
            Err(ModelError::UnknownFlow(_))
        ));
        assert!(matches!(
            model.request_output("y", DerivedOutput::prevalence(&["E"])),
            Err(ModelError::UnknownCompartment(_))
        ));
        assert!(model.request_output("S", DerivedOutput::sum(&["S"])).is_err());
    }

    #[test]
    fn infectious_compartments() {
        let model = sir();
        assert!(!model.is_infectious(0));
        assert!(model.is_infectious(1));
        assert!(!model.is_infectious(7));
    }
}
