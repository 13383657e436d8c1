use crate::{
    error::Result,
    model::{CompartmentalModel, DerivedOutput, FlowKind, Rate, RateContext},
    params::Parameters,
    prelude::{Real, Time, NAN},
    solver::OdeSystem,
};
use ndarray::Array2;
use std::cell::RefCell;

/// A flow with end points resolved to indexes and parameters substituted.
#[derive(Debug, Clone)]
struct ResolvedFlow {
    source: Option<usize>,
    dest: Option<usize>,
    kind: FlowKind,
    rate: Rate,
    multiplier: Real,
    group: usize,
}

#[derive(Debug, Clone)]
enum ResolvedOutput {
    Flows(Vec<usize>),
    Sum(Vec<usize>),
    Proportion(Vec<usize>, Option<Vec<usize>>),
}

/// Per-group work buffers for the force of infection.
#[derive(Debug, Clone, Default)]
struct Scratch {
    infectious: Vec<Real>,
    population: Vec<Real>,
    frequency: Vec<Real>,
    density: Vec<Real>,
}

fn reset(buf: &mut Vec<Real>, n: usize) {
    buf.clear();
    buf.resize(n, 0.0);
}

/// A model bound to a parameter set, ready to be integrated.
///
/// The runtime implements OdeSystem and is what solvers actually see. It is
/// created once per run and only its work buffers change afterwards, so
/// evaluating derivatives does not allocate.
#[derive(Debug, Clone)]
pub struct ModelRuntime<'a> {
    model: &'a CompartmentalModel,
    params: &'a Parameters,
    flows: Vec<ResolvedFlow>,
    outputs: Vec<ResolvedOutput>,
    /// (compartment, mixing group, infectiousness) for infectious compartments
    infectious: Vec<(usize, usize, Real)>,
    /// mixing group of each compartment
    groups: Vec<usize>,
    matrix: Array2<Real>,
    scratch: RefCell<Scratch>,
    rates: RefCell<Vec<Real>>,
}

impl<'a> ModelRuntime<'a> {
    /// Bind model to parameters. Fails if some named parameter is missing.
    pub fn new(model: &'a CompartmentalModel, params: &'a Parameters) -> Result<Self> {
        let groups: Vec<usize> = match &model.mixing {
            None => vec![0; model.compartments.len()],
            Some(mixing) => model
                .compartments
                .iter()
                .map(|c| {
                    c.stratum(&mixing.stratification)
                        .and_then(|s| mixing.strata.iter().position(|x| x == s))
                        .unwrap_or(0)
                })
                .collect(),
        };
        let matrix = match &model.mixing {
            None => Array2::ones((1, 1)),
            Some(mixing) => mixing.matrix.clone(),
        };

        let mut flows = Vec::with_capacity(model.flows.len());
        for flow in model.flows.iter() {
            let source = match flow.source() {
                Some(name) => Some(model.index_of(name)?),
                None => None,
            };
            let dest = match flow.dest() {
                Some(name) => Some(model.index_of(name)?),
                None => None,
            };
            flows.push(ResolvedFlow {
                source,
                dest,
                kind: flow.kind(),
                rate: flow.rate().resolve(params)?,
                multiplier: flow.multiplier(),
                group: source.map(|i| groups[i]).unwrap_or(0),
            });
        }

        let infectious = (0..model.compartments.len())
            .filter(|&i| model.is_infectious(i))
            .map(|i| (i, groups[i], model.infectiousness[i]))
            .collect();

        let bases = |names: &[String]| -> Vec<usize> {
            names
                .iter()
                .flat_map(|name| model.indices_of_base(name))
                .collect()
        };
        let outputs = model
            .outputs
            .iter()
            .map(|(_, output)| match output {
                DerivedOutput::FlowRate { flow } => ResolvedOutput::Flows(
                    model
                        .flows
                        .iter()
                        .enumerate()
                        .filter(|(_, f)| f.name() == flow)
                        .map(|(i, _)| i)
                        .collect(),
                ),
                DerivedOutput::Sum { compartments } => ResolvedOutput::Sum(bases(&compartments[..])),
                DerivedOutput::Proportion {
                    numerator,
                    denominator,
                } => ResolvedOutput::Proportion(
                    bases(&numerator[..]),
                    if denominator.is_empty() {
                        None
                    } else {
                        Some(bases(&denominator[..]))
                    },
                ),
            })
            .collect();

        Ok(ModelRuntime {
            model,
            params,
            flows,
            outputs,
            infectious,
            groups,
            matrix,
            scratch: RefCell::new(Scratch::default()),
            rates: RefCell::new(Vec::with_capacity(model.flows.len())),
        })
    }

    pub fn model(&self) -> &CompartmentalModel {
        self.model
    }

    pub fn n_flows(&self) -> usize {
        self.flows.len()
    }

    pub fn n_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// Force of infection in each mixing group, as a (frequency, density)
    /// pair of vectors. Frequency-dependent values are normalized by the
    /// population of the contacted group.
    pub fn force_of_infection(&self, y: &[Real]) -> (Vec<Real>, Vec<Real>) {
        let mut scratch = self.scratch.borrow_mut();
        self.update_force_of_infection(y, &mut scratch);
        return (scratch.frequency.clone(), scratch.density.clone());
    }

    fn update_force_of_infection(&self, y: &[Real], s: &mut Scratch) {
        let n = self.matrix.nrows();
        reset(&mut s.infectious, n);
        reset(&mut s.population, n);
        reset(&mut s.frequency, n);
        reset(&mut s.density, n);
        for (i, &x) in y.iter().enumerate() {
            s.population[self.groups[i]] += x;
        }
        for &(i, group, weight) in self.infectious.iter() {
            s.infectious[group] += weight * y[i];
        }

        for i in 0..n {
            for j in 0..n {
                let m = self.matrix[(i, j)];
                s.density[i] += m * s.infectious[j];
                if s.population[j] > 0.0 {
                    s.frequency[i] += m * s.infectious[j] / s.population[j];
                }
            }
        }
    }

    /// Compute the instantaneous magnitude of each flow.
    pub fn flow_rates(&self, t: Time, y: &[Real], out: &mut Vec<Real>) {
        let ctx = RateContext {
            time: t,
            sizes: y,
            compartments: &self.model.compartments,
            params: self.params,
        };
        let mut scratch = self.scratch.borrow_mut();
        if !self.infectious.is_empty() {
            self.update_force_of_infection(y, &mut scratch);
        }
        let (frequency, density) = (&scratch.frequency, &scratch.density);
        let total: Real = y.iter().sum();

        out.clear();
        for flow in self.flows.iter() {
            let rate = flow.rate.value(&ctx) * flow.multiplier;
            let source = flow.source.map(|i| y[i]).unwrap_or(0.0);
            let value = match flow.kind {
                FlowKind::Transition | FlowKind::Death => rate * source,
                FlowKind::InfectionFrequency => {
                    rate * source * frequency.get(flow.group).copied().unwrap_or(0.0)
                }
                FlowKind::InfectionDensity => {
                    rate * source * density.get(flow.group).copied().unwrap_or(0.0)
                }
                FlowKind::CrudeBirth => rate * total,
                FlowKind::Importation => rate,
            };
            out.push(value);
        }
    }

    /// Evaluate derived outputs from state and pre-computed flow rates.
    pub fn derived_outputs(&self, y: &[Real], flow_rates: &[Real], out: &mut Vec<Real>) {
        let sum = |idx: &[usize]| -> Real { idx.iter().map(|&i| y[i]).sum() };
        out.clear();
        for output in self.outputs.iter() {
            let value: Real = match output {
                ResolvedOutput::Flows(idx) => idx.iter().map(|&i| flow_rates[i]).sum(),
                ResolvedOutput::Sum(idx) => sum(&idx[..]),
                ResolvedOutput::Proportion(num, den) => {
                    let den = match den {
                        Some(idx) => sum(&idx[..]),
                        None => y.iter().sum(),
                    };
                    if den == 0.0 {
                        NAN
                    } else {
                        sum(&num[..]) / den
                    }
                }
            };
            out.push(value);
        }
    }
}

impl<'a> OdeSystem for ModelRuntime<'a> {
    fn dimension(&self) -> usize {
        self.model.compartments.len()
    }

    fn derivatives(&self, t: Time, y: &[Real], dy: &mut [Real]) {
        let mut rates = self.rates.borrow_mut();
        self.flow_rates(t, y, &mut rates);
        for x in dy.iter_mut() {
            *x = 0.0;
        }
        for (flow, &value) in self.flows.iter().zip(rates.iter()) {
            if let Some(i) = flow.source {
                dy[i] -= value;
            }
            if let Some(j) = flow.dest {
                dy[j] += value;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn derivatives_of_sir() {
        let mut model = CompartmentalModel::new(&["S", "I", "R"], 0.0, 1.0, 1.0, &["I"]).unwrap();
        model
            .add_infection_frequency_flow("infection", "beta", "S", "I")
            .unwrap()
            .add_transition_flow("recovery", "gamma", "I", "R")
            .unwrap();
        let params = Parameters::new().with("beta", 0.4).with("gamma", 0.1);
        let runtime = ModelRuntime::new(&model, &params).unwrap();

        let y = [90.0, 10.0, 0.0];
        let mut dy = [0.0; 3];
        runtime.derivatives(0.0, &y, &mut dy);

        let infection = 0.4 * 90.0 * 10.0 / 100.0;
        assert_approx_eq!(dy[0], -infection, 1e-12);
        assert_approx_eq!(dy[1], infection - 1.0, 1e-12);
        assert_approx_eq!(dy[2], 1.0, 1e-12);
    }

    #[test]
    fn repeated_evaluations_reuse_buffers_without_stale_values() {
        let mut model = CompartmentalModel::new(&["S", "I", "R"], 0.0, 1.0, 1.0, &["I"]).unwrap();
        model
            .add_infection_frequency_flow("infection", 0.4, "S", "I")
            .unwrap()
            .add_transition_flow("recovery", 0.1, "I", "R")
            .unwrap();
        let params = Parameters::new();
        let runtime = ModelRuntime::new(&model, &params).unwrap();

        let mut dy = [0.0; 3];
        runtime.derivatives(0.0, &[50.0, 50.0, 0.0], &mut dy);
        runtime.derivatives(0.0, &[90.0, 10.0, 0.0], &mut dy);
        let mut again = [0.0; 3];
        runtime.derivatives(0.0, &[90.0, 10.0, 0.0], &mut again);

        let fresh = ModelRuntime::new(&model, &params).unwrap();
        let mut expected = [0.0; 3];
        fresh.derivatives(0.0, &[90.0, 10.0, 0.0], &mut expected);
        assert_eq!(dy, expected);
        assert_eq!(again, expected);
        assert_approx_eq!(dy[0], -0.4 * 90.0 * 0.1, 1e-12);

        let (frequency, density) = runtime.force_of_infection(&[80.0, 20.0, 0.0]);
        assert_approx_eq!(frequency[0], 0.2, 1e-12);
        assert_approx_eq!(density[0], 20.0, 1e-12);
    }

    #[test]
    fn density_dependent_infection_ignores_population_size() {
        let mut model = CompartmentalModel::new(&["S", "I"], 0.0, 1.0, 1.0, &["I"]).unwrap();
        model
            .add_infection_density_flow("infection", 0.001, "S", "I")
            .unwrap();
        let params = Parameters::new();
        let runtime = ModelRuntime::new(&model, &params).unwrap();

        let mut rates = vec![];
        runtime.flow_rates(0.0, &[900.0, 100.0], &mut rates);
        assert_approx_eq!(rates[0], 0.001 * 900.0 * 100.0, 1e-9);
    }

    #[test]
    fn entry_flows_do_not_depend_on_source() {
        let mut model = CompartmentalModel::new(&["S", "I"], 0.0, 1.0, 1.0, &[]).unwrap();
        model
            .add_crude_birth_flow("births", 0.02, "S")
            .unwrap()
            .add_importation_flow("imports", 5.0, "I")
            .unwrap()
            .add_death_flow("deaths", 0.5, "I")
            .unwrap();
        let params = Parameters::new();
        let runtime = ModelRuntime::new(&model, &params).unwrap();

        let mut dy = [0.0; 2];
        runtime.derivatives(0.0, &[80.0, 20.0], &mut dy);
        assert_approx_eq!(dy[0], 2.0, 1e-12);
        assert_approx_eq!(dy[1], 5.0 - 10.0, 1e-12);
    }

    #[test]
    fn missing_parameters_fail_on_bind() {
        let mut model = CompartmentalModel::new(&["S", "I"], 0.0, 1.0, 1.0, &["I"]).unwrap();
        model.add_transition_flow("progression", "sigma", "S", "I").unwrap();
        let params = Parameters::new();
        assert!(ModelRuntime::new(&model, &params).is_err());
    }

    #[test]
    fn derived_outputs_sum_flows_and_compartments() {
        let mut model = CompartmentalModel::new(&["S", "I", "R"], 0.0, 1.0, 1.0, &["I"]).unwrap();
        model
            .add_infection_frequency_flow("infection", 0.5, "S", "I")
            .unwrap()
            .request_output("incidence", DerivedOutput::flow_rate("infection"))
            .unwrap()
            .request_output("prevalence", DerivedOutput::prevalence(&["I"]))
            .unwrap()
            .request_output("ever_infected", DerivedOutput::sum(&["I", "R"]))
            .unwrap();
        let params = Parameters::new();
        let runtime = ModelRuntime::new(&model, &params).unwrap();

        let y = [50.0, 25.0, 25.0];
        let mut rates = vec![];
        let mut derived = vec![];
        runtime.flow_rates(0.0, &y, &mut rates);
        runtime.derived_outputs(&y, &rates, &mut derived);
        assert_approx_eq!(derived[0], 0.5 * 50.0 * 0.25, 1e-12);
        assert_approx_eq!(derived[1], 0.25, 1e-12);
        assert_approx_eq!(derived[2], 50.0, 1e-12);
    }
}
