use crate::{
    error::{ModelError, Result},
    model::{Compartment, CompartmentalModel, Flow, Mixing},
    prelude::Real,
};
use getset::Getters;
use ndarray::Array2;
use std::collections::BTreeMap;

/// Subdivide compartments of a model into named strata (e.g., age groups).
///
/// Stratified compartments are named `{compartment}_{stratum}`. Flows are
/// replicated for each stratum and can have their rates adjusted per stratum.
/// An optional mixing matrix controls how strata contact each other in
/// infection flows; without it, mixing is homogeneous.
#[derive(Debug, Clone, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct Stratification {
    name: String,
    strata: Vec<String>,
    compartments: Vec<String>,
    population_split: Vec<Real>,
    flow_adjustments: BTreeMap<String, Vec<Real>>,
    infectiousness_adjustments: BTreeMap<String, Vec<Real>>,
    mixing_matrix: Option<Array2<Real>>,
}

impl Stratification {
    /// Create a stratification of the given compartments (base names). An
    /// empty list stratifies every compartment. Population is split evenly
    /// across strata unless set otherwise.
    pub fn new(name: &str, strata: &[&str], compartments: &[&str]) -> Self {
        let n = strata.len();
        Stratification {
            name: name.to_string(),
            strata: strata.iter().map(|s| s.to_string()).collect(),
            compartments: compartments.iter().map(|s| s.to_string()).collect(),
            population_split: vec![1.0 / n.max(1) as Real; n],
            flow_adjustments: BTreeMap::new(),
            infectiousness_adjustments: BTreeMap::new(),
            mixing_matrix: None,
        }
    }

    /// Proportion of the population of each stratified compartment allocated
    /// to each stratum. Entries must be non-negative and sum to one.
    pub fn with_population_split(mut self, split: &[Real]) -> Self {
        self.population_split = split.to_vec();
        return self;
    }

    /// Multiply the rate of each stratum copy of a flow by the given factors.
    pub fn with_flow_adjustments(mut self, flow: &str, factors: &[Real]) -> Self {
        self.flow_adjustments
            .insert(flow.to_string(), factors.to_vec());
        return self;
    }

    /// Scale the contribution of each stratum of an infectious compartment to
    /// the force of infection.
    pub fn with_infectiousness_adjustments(mut self, compartment: &str, factors: &[Real]) -> Self {
        self.infectiousness_adjustments
            .insert(compartment.to_string(), factors.to_vec());
        return self;
    }

    /// Square matrix with one row/column per stratum.
    pub fn with_mixing_matrix(mut self, matrix: Array2<Real>) -> Self {
        self.mixing_matrix = Some(matrix);
        return self;
    }

    /// True if compartment with the given base name is affected.
    pub fn applies_to(&self, base: &str) -> bool {
        self.compartments.is_empty() || self.compartments.iter().any(|c| c == base)
    }

    fn error(&self, reason: impl Into<String>) -> ModelError {
        ModelError::InvalidStratification {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn validate(&self, model: &CompartmentalModel) -> Result<()> {
        let n = self.strata.len();
        if n == 0 {
            return Err(self.error("at least one stratum is required"));
        }
        for (i, s) in self.strata.iter().enumerate() {
            if s.is_empty() || self.strata[..i].contains(s) {
                return Err(self.error(format!("invalid or repeated stratum {:?}", s)));
            }
        }
        if model.stratifications.contains(&self.name) {
            return Err(self.error("already applied to model"));
        }
        for c in self.compartments.iter() {
            if !model.has_base(c) {
                return Err(ModelError::UnknownCompartment(c.clone()));
            }
        }

        // Stratified names must not clash with each other or with compartments
        // left untouched.
        let mut names: Vec<String> = Vec::with_capacity(model.compartments.len() * n);
        for comp in model.compartments.iter() {
            if self.applies_to(comp.base()) {
                names.extend(
                    self.strata
                        .iter()
                        .map(|s| comp.stratified(&self.name, s).name().clone()),
                );
            } else {
                names.push(comp.name().clone());
            }
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(ModelError::DuplicateCompartment(name.clone()));
            }
        }

        let split = &self.population_split;
        if split.len() != n {
            return Err(self.error(format!("expected {} population proportions", n)));
        }
        if split.iter().any(|x| !(*x >= 0.0)) {
            return Err(self.error("population proportions must be non-negative"));
        }
        if (split.iter().sum::<Real>() - 1.0).abs() > 1e-6 {
            return Err(self.error("population proportions must sum to one"));
        }

        for (flow, factors) in self.flow_adjustments.iter() {
            if !model.flows.iter().any(|f| f.name() == flow) {
                return Err(ModelError::UnknownFlow(flow.clone()));
            }
            if factors.len() != n {
                return Err(self.error(format!("flow {} needs {} adjustments", flow, n)));
            }
        }
        for (comp, factors) in self.infectiousness_adjustments.iter() {
            if !self.applies_to(comp) || !model.infectious.contains(comp) {
                return Err(self.error(format!(
                    "{} is not a stratified infectious compartment",
                    comp
                )));
            }
            if factors.len() != n {
                return Err(self.error(format!("compartment {} needs {} adjustments", comp, n)));
            }
        }

        if let Some(matrix) = &self.mixing_matrix {
            if matrix.nrows() != n || matrix.ncols() != n {
                return Err(self.error(format!("mixing matrix must be {}x{}", n, n)));
            }
            if matrix.iter().any(|x| !(*x >= 0.0)) {
                return Err(self.error("mixing matrix entries must be non-negative"));
            }
            if model.mixing.is_some() {
                return Err(self.error("model already has a mixing matrix"));
            }
            if !self.compartments.is_empty()
                && model.compartments.iter().any(|c| !self.applies_to(c.base()))
            {
                return Err(self.error("a mixing matrix requires stratifying all compartments"));
            }
        }
        return Ok(());
    }
}

impl CompartmentalModel {
    /// Apply stratification to model. Flows and initial conditions declared
    /// so far are replicated for each stratum.
    pub fn stratify_with(&mut self, strat: &Stratification) -> Result<&mut Self> {
        strat.validate(self)?;
        let n = strat.strata.len();

        // Compartments, initial population and infectiousness
        let mut compartments = Vec::with_capacity(self.compartments.len() * n);
        let mut population = vec![];
        let mut infectiousness = vec![];
        let mut mapping: Vec<Option<Vec<String>>> = vec![];

        for (i, comp) in self.compartments.iter().enumerate() {
            if strat.applies_to(comp.base()) {
                let factors = strat.infectiousness_adjustments.get(comp.base());
                let mut names = Vec::with_capacity(n);
                for (k, stratum) in strat.strata.iter().enumerate() {
                    let new: Compartment = comp.stratified(&strat.name, stratum);
                    names.push(new.name().clone());
                    compartments.push(new);
                    population.push(self.initial_population[i] * strat.population_split[k]);
                    infectiousness.push(self.infectiousness[i] * factors.map(|f| f[k]).unwrap_or(1.0));
                }
                mapping.push(Some(names));
            } else {
                compartments.push(comp.clone());
                population.push(self.initial_population[i]);
                infectiousness.push(self.infectiousness[i]);
                mapping.push(None);
            }
        }

        // Flows
        let mut flows: Vec<Flow> = Vec::with_capacity(self.flows.len() * n);
        for flow in self.flows.iter() {
            let adjust = strat.flow_adjustments.get(flow.name());
            let factor = |k: usize| adjust.map(|f| f[k]).unwrap_or(1.0);
            match (
                stratum_names(&self.compartments, &mapping, flow.source()),
                stratum_names(&self.compartments, &mapping, flow.dest()),
            ) {
                (None, None) => flows.push(flow.clone()),
                (Some(src), Some(dst)) => {
                    for k in 0..n {
                        flows.push(flow.stratified_copy(
                            Some(src[k].clone()),
                            Some(dst[k].clone()),
                            factor(k),
                        ));
                    }
                }
                (None, Some(dst)) => {
                    for k in 0..n {
                        flows.push(flow.stratified_copy(
                            flow.source().clone(),
                            Some(dst[k].clone()),
                            strat.population_split[k] * factor(k),
                        ));
                    }
                }
                (Some(src), None) => {
                    for k in 0..n {
                        flows.push(flow.stratified_copy(
                            Some(src[k].clone()),
                            flow.dest().clone(),
                            factor(k),
                        ));
                    }
                }
            }
        }

        if let Some(matrix) = &strat.mixing_matrix {
            self.mixing = Some(Mixing {
                stratification: strat.name.clone(),
                strata: strat.strata.clone(),
                matrix: matrix.clone(),
            });
        }
        self.compartments = compartments;
        self.initial_population = population;
        self.infectiousness = infectiousness;
        self.flows = flows;
        self.stratifications.push(strat.name.clone());
        return Ok(self);
    }
}

/// Names of the strata copies of a compartment, if it was stratified.
fn stratum_names<'m>(
    compartments: &[Compartment],
    mapping: &'m [Option<Vec<String>>],
    name: &Option<String>,
) -> Option<&'m Vec<String>> {
    let name = name.as_ref()?;
    let i = compartments.iter().position(|c| c.name() == name)?;
    mapping[i].as_ref()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{params::Parameters, solver::SolverKind};
    use assert_approx_eq::assert_approx_eq;
    use ndarray::array;

    fn sir() -> CompartmentalModel {
        let mut model =
            CompartmentalModel::new(&["S", "I", "R"], 0.0, 50.0, 0.5, &["I"]).unwrap();
        model
            .set_initial_population(&[("S", 990.0), ("I", 10.0)])
            .unwrap()
            .add_infection_frequency_flow("infection", 0.3, "S", "I")
            .unwrap()
            .add_transition_flow("recovery", 0.1, "I", "R")
            .unwrap();
        return model;
    }

    #[test]
    fn stratification_splits_compartments_and_population() {
        let mut model = sir();
        let strat = Stratification::new("age", &["young", "old"], &[])
            .with_population_split(&[0.75, 0.25]);
        model.stratify_with(&strat).unwrap();

        assert_eq!(
            model.compartment_names(),
            vec!["S_young", "S_old", "I_young", "I_old", "R_young", "R_old"]
        );
        assert_eq!(model.initial_population()[0], 742.5);
        assert_eq!(model.initial_population()[3], 2.5);
        assert_eq!(model.flows().len(), 4);
        assert_eq!(model.flows()[1].source().as_deref(), Some("S_old"));
        assert_eq!(model.flows()[1].dest().as_deref(), Some("I_old"));
        assert_eq!(model.compartments()[1].stratum("age"), Some("old"));
    }

    #[test]
    fn homogeneous_stratification_reproduces_unstratified_model() {
        let params = Parameters::new();
        let base = sir().run_with(&params, SolverKind::RungeKutta4).unwrap();

        let mut model = sir();
        model
            .stratify_with(
                &Stratification::new("age", &["young", "old"], &[])
                    .with_population_split(&[0.6, 0.4]),
            )
            .unwrap();
        let stratified = model.run_with(&params, SolverKind::RungeKutta4).unwrap();

        let a = base.compartment("I").unwrap();
        let b = stratified.compartment("I").unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert_approx_eq!(*x, *y, 1e-8);
        }
    }

    #[test]
    fn partial_stratification_of_entry_flows() {
        let mut model = CompartmentalModel::new(&["S", "I"], 0.0, 1.0, 1.0, &["I"]).unwrap();
        model
            .add_importation_flow("imports", 10.0, "I")
            .unwrap()
            .add_death_flow("deaths", 0.1, "I")
            .unwrap();
        let strat = Stratification::new("location", &["urban", "rural"], &["I"])
            .with_population_split(&[0.8, 0.2])
            .with_flow_adjustments("deaths", &[1.0, 2.0]);
        model.stratify_with(&strat).unwrap();

        assert_eq!(model.compartment_names(), vec!["S", "I_urban", "I_rural"]);
        let flows = model.flows();
        assert_approx_eq!(flows[0].multiplier(), 0.8, 1e-12);
        assert_approx_eq!(flows[1].multiplier(), 0.2, 1e-12);
        assert_eq!(flows[3].source().as_deref(), Some("I_rural"));
        assert_approx_eq!(flows[3].multiplier(), 2.0, 1e-12);
        assert!(flows[3].dest().is_none());
    }

    #[test]
    fn mixing_matrix_separates_groups() {
        // Two groups that never meet: only the seeded one gets infected
        let mut model = CompartmentalModel::new(&["S", "I", "R"], 0.0, 30.0, 0.1, &["I"]).unwrap();
        model
            .add_infection_frequency_flow("infection", 0.5, "S", "I")
            .unwrap()
            .add_transition_flow("recovery", 0.1, "I", "R")
            .unwrap();
        model
            .stratify_with(
                &Stratification::new("group", &["a", "b"], &[])
                    .with_mixing_matrix(array![[1.0, 0.0], [0.0, 1.0]]),
            )
            .unwrap();
        model
            .set_initial_population(&[("S_a", 490.0), ("I_a", 10.0), ("S_b", 500.0)])
            .unwrap();

        let outputs = model.run_with(&Parameters::new(), SolverKind::RungeKutta4).unwrap();
        let s_a = outputs.compartment("S_a").unwrap();
        let s_b = outputs.compartment("S_b").unwrap();
        assert!(s_a.last().unwrap() < &400.0);
        assert_approx_eq!(*s_b.last().unwrap(), 500.0, 1e-9);
    }

    #[test]
    fn infectiousness_adjustments_scale_force_of_infection() {
        let mut model = CompartmentalModel::new(&["S", "I"], 0.0, 1.0, 1.0, &["I"]).unwrap();
        model
            .add_infection_density_flow("infection", 1.0, "S", "I")
            .unwrap();
        model
            .stratify_with(
                &Stratification::new("symptoms", &["yes", "no"], &["I"])
                    .with_infectiousness_adjustments("I", &[1.0, 0.5]),
            )
            .unwrap();
        assert_eq!(model.infectiousness(), &[1.0, 1.0, 0.5]);
    }

    #[test]
    fn invalid_stratifications() {
        let mut model = sir();
        let bad = [
            Stratification::new("age", &[], &[]),
            Stratification::new("age", &["a", "a"], &[]),
            Stratification::new("age", &["a", "b"], &["X"]),
            Stratification::new("age", &["a", "b"], &[]).with_population_split(&[0.5, 0.6]),
            Stratification::new("age", &["a", "b"], &[]).with_flow_adjustments("waning", &[1.0, 1.0]),
            Stratification::new("age", &["a", "b"], &[]).with_flow_adjustments("recovery", &[1.0]),
            Stratification::new("age", &["a", "b"], &[]).with_mixing_matrix(Array2::ones((3, 3))),
            Stratification::new("age", &["a", "b"], &["S"]).with_mixing_matrix(Array2::ones((2, 2))),
            Stratification::new("age", &["a", "b"], &["S"]).with_infectiousness_adjustments("S", &[1.0, 1.0]),
        ];
        for strat in bad.iter() {
            assert!(model.stratify_with(strat).is_err(), "{:?}", strat);
        }

        let ok = Stratification::new("age", &["a", "b"], &[]);
        model.stratify_with(&ok).unwrap();
        assert!(model.stratify_with(&ok).is_err());
    }

    #[test]
    fn stratified_names_must_be_unique() {
        let mut model = CompartmentalModel::new(&["S", "S_a", "I"], 0.0, 1.0, 1.0, &["I"]).unwrap();
        let strat = Stratification::new("group", &["a", "b"], &["S"]);
        match model.stratify_with(&strat) {
            Err(ModelError::DuplicateCompartment(name)) => assert_eq!(name, "S_a"),
            other => panic!("unexpected result: {:?}", other.map(|m| m.compartment_names())),
        }
        assert_eq!(model.compartment_names(), vec!["S", "S_a", "I"]);

        // Two stratifications can also collide: "x_1" + "2" and "x" + "1_2"
        let mut model = CompartmentalModel::new(&["x", "x_1"], 0.0, 1.0, 1.0, &[]).unwrap();
        model
            .stratify_with(&Stratification::new("a", &["2"], &["x_1"]))
            .unwrap();
        let strat = Stratification::new("b", &["1_2"], &["x"]);
        assert!(matches!(
            model.stratify_with(&strat),
            Err(ModelError::DuplicateCompartment(_))
        ));
    }
}
