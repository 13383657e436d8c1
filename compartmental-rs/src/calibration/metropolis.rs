use super::{Prior, Target};
use crate::{
    error::{ModelError, Result},
    model::CompartmentalModel,
    params::Parameters,
    prelude::{Real, INF},
    solver::SolverKind,
    utils::{PointStats, Stats, StatsVec},
};
use getset::{CopyGetters, Getters};
use log::*;
use rand::{rngs::SmallRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// A parameter explored by the sampler.
#[derive(Debug, Clone, PartialEq, Getters, CopyGetters)]
pub struct Calibrated {
    #[getset(get = "pub")]
    name: String,
    #[getset(get_copy = "pub")]
    prior: Prior,
    /// Standard deviation of the random walk proposal.
    #[getset(get_copy = "pub")]
    proposal_sd: Real,
}

/// Random walk Metropolis sampler over a subset of model parameters.
///
/// Each iteration perturbs every calibrated parameter with an independent
/// normal step, runs the model and accepts the proposal with probability
/// min(1, exp(lp' - lp)), where lp is the log-posterior. Parameters not
/// calibrated are taken from a fixed base set.
///
/// A single sequential chain is produced. There is no adaptation of the
/// proposal distribution.
#[derive(Debug, Clone)]
pub struct Metropolis<'m> {
    model: &'m CompartmentalModel,
    base: Parameters,
    parameters: Vec<Calibrated>,
    targets: Vec<Target>,
    solver: SolverKind,
    rng: SmallRng,
}

impl<'m> Metropolis<'m> {
    pub fn new(model: &'m CompartmentalModel, base: Parameters) -> Self {
        Metropolis {
            model,
            base,
            parameters: vec![],
            targets: vec![],
            solver: SolverKind::default(),
            rng: SmallRng::from_entropy(),
        }
    }

    /// Calibrate parameter with the given prior and proposal step.
    pub fn with_parameter(mut self, name: &str, prior: Prior, proposal_sd: Real) -> Self {
        self.parameters.push(Calibrated {
            name: name.to_string(),
            prior,
            proposal_sd,
        });
        return self;
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.targets.push(target);
        return self;
    }

    pub fn with_solver(mut self, solver: SolverKind) -> Self {
        self.solver = solver;
        return self;
    }

    /// Set seed for random number generator
    pub fn seed(mut self, seed: u64) -> Self {
        self.rng = SmallRng::seed_from_u64(seed);
        return self;
    }

    pub fn parameters(&self) -> &[Calibrated] {
        &self.parameters
    }

    /// Full parameter set with calibrated values replaced by theta.
    fn bind(&self, theta: &[Real]) -> Parameters {
        let mut params = self.base.clone();
        for (p, &x) in self.parameters.iter().zip(theta) {
            params.set(&p.name, x);
        }
        return params;
    }

    pub fn log_prior(&self, theta: &[Real]) -> Real {
        self.parameters
            .iter()
            .zip(theta)
            .map(|(p, &x)| p.prior.log_density(x))
            .sum()
    }

    /// Log-likelihood of all targets. Runs the model once.
    pub fn log_likelihood(&self, theta: &[Real]) -> Result<Real> {
        let outputs = self.model.run_with(&self.bind(theta), self.solver)?;
        let mut total = 0.0;
        for target in self.targets.iter() {
            total += target.log_likelihood(&outputs)?;
        }
        return Ok(total);
    }

    /// Unnormalized log-posterior. The model is not run when the prior
    /// density is zero.
    pub fn log_posterior(&self, theta: &[Real]) -> Result<Real> {
        let lp = self.log_prior(theta);
        if lp == -INF {
            return Ok(-INF);
        }
        return Ok(lp + self.log_likelihood(theta)?);
    }

    fn validate(&self) -> Result<()> {
        if self.parameters.is_empty() {
            return Err(ModelError::Calibration("no parameters to calibrate".into()));
        }
        if self.targets.is_empty() {
            return Err(ModelError::Calibration("no calibration targets".into()));
        }
        for p in self.parameters.iter() {
            p.prior
                .validate()
                .map_err(|reason| ModelError::Calibration(format!("{}: {}", p.name, reason)))?;
            if !(p.proposal_sd > 0.0 && p.proposal_sd.is_finite()) {
                return Err(ModelError::Calibration(format!(
                    "{}: proposal sd must be positive, got {}",
                    p.name, p.proposal_sd
                )));
            }
        }
        return Ok(());
    }

    /// Run chain for n_iter iterations.
    ///
    /// The chain starts at the base value of each parameter, or at the center
    /// of its prior if the base set does not define it. The starting point
    /// must have a finite log-posterior.
    pub fn run(&mut self, n_iter: usize) -> Result<Chain> {
        self.validate()?;
        let steps = self
            .parameters
            .iter()
            .map(|p| {
                Normal::new(0.0, p.proposal_sd)
                    .map_err(|e| ModelError::Calibration(format!("{}: {}", p.name, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut theta: Vec<Real> = self
            .parameters
            .iter()
            .map(|p| self.base.get(&p.name).unwrap_or_else(|| p.prior.center()))
            .collect();
        let mut lp = self.log_posterior(&theta)?;
        if !lp.is_finite() {
            return Err(ModelError::Calibration(format!(
                "initial point {:?} has log-posterior {}",
                theta, lp
            )));
        }

        let mut chain = Chain::new(self.parameters.iter().map(|p| p.name.clone()).collect());
        let mut proposal = theta.clone();
        for n in 0..n_iter {
            for (i, step) in steps.iter().enumerate() {
                proposal[i] = theta[i] + step.sample(&mut self.rng);
            }
            let lp_new = self.log_posterior(&proposal)?;
            let u: Real = self.rng.gen();
            let accepted = u.ln() < lp_new - lp;
            if accepted {
                theta.copy_from_slice(&proposal);
                lp = lp_new;
            }
            debug!(
                "iter [{}]: proposal = {:?}, lp' = {:.3}, accepted = {}",
                n, proposal, lp_new, accepted
            );
            chain.push(&theta, lp, accepted);
        }

        info!(
            "metropolis: {} iterations, acceptance rate = {:.3}",
            n_iter,
            chain.acceptance_rate()
        );
        return Ok(chain);
    }
}

/// Samples of a Metropolis run. Iteration i stores the state of the chain
/// after the i-th proposal was accepted or rejected.
#[derive(Debug, Clone, Default, PartialEq, Getters)]
pub struct Chain {
    #[getset(get = "pub")]
    names: Vec<String>,
    #[getset(get = "pub")]
    samples: Vec<Vec<Real>>,
    #[getset(get = "pub")]
    log_posterior: Vec<Real>,
    #[getset(get = "pub")]
    accepted: Vec<bool>,
}

impl Chain {
    pub fn new(names: Vec<String>) -> Self {
        Chain {
            names,
            ..Self::default()
        }
    }

    pub fn push(&mut self, theta: &[Real], log_posterior: Real, accepted: bool) {
        self.samples.push(theta.to_vec());
        self.log_posterior.push(log_posterior);
        self.accepted.push(accepted);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Fraction of accepted proposals.
    pub fn acceptance_rate(&self) -> Real {
        if self.accepted.is_empty() {
            return 0.0;
        }
        self.accepted.iter().filter(|&&x| x).count() as Real / self.accepted.len() as Real
    }

    /// Trace of a single parameter.
    pub fn trace(&self, name: &str) -> Option<Vec<Real>> {
        let j = self.names.iter().position(|n| n == name)?;
        Some(self.samples.iter().map(|s| s[j]).collect())
    }

    /// Sample with the largest log-posterior (maximum a posteriori).
    pub fn map_estimate(&self) -> Option<Parameters> {
        let (i, _) = self
            .log_posterior
            .iter()
            .enumerate()
            .filter(|(_, lp)| !lp.is_nan())
            .fold(None, |best: Option<(usize, Real)>, (i, &lp)| match best {
                Some((_, b)) if b >= lp => best,
                _ => Some((i, lp)),
            })?;
        Some(
            self.names
                .iter()
                .map(|n| n.as_str())
                .zip(self.samples[i].iter().copied())
                .collect(),
        )
    }

    /// Summary statistics of each parameter, discarding the first burn_in
    /// samples.
    pub fn summary(&self, burn_in: usize) -> Vec<(String, PointStats)> {
        self.names
            .iter()
            .enumerate()
            .map(|(j, name)| {
                let mut stats = StatsVec::new();
                stats.add_many(self.samples.iter().skip(burn_in).map(|s| s[j]));
                (name.clone(), stats.stats())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Likelihood;
    use assert_approx_eq::assert_approx_eq;

    fn sir() -> CompartmentalModel {
        let mut model = CompartmentalModel::new(&["S", "I", "R"], 0.0, 40.0, 0.25, &["I"]).unwrap();
        model
            .set_initial_population(&[("S", 990.0), ("I", 10.0)])
            .unwrap()
            .add_infection_frequency_flow("infection", "beta", "S", "I")
            .unwrap()
            .add_transition_flow("recovery", "gamma", "I", "R")
            .unwrap();
        return model;
    }

    fn synthetic_target(model: &CompartmentalModel, beta: Real) -> Target {
        let params = Parameters::new().with("beta", beta).with("gamma", 0.1);
        let out = model.run_with(&params, SolverKind::RungeKutta4).unwrap();
        let times: Vec<Real> = (1..=8).map(|k| 5.0 * k as Real).collect();
        let values: Vec<Real> = times
            .iter()
            .map(|&t| out.value_at("I", t).unwrap().unwrap())
            .collect();
        Target::new("I", &times, &values, Likelihood::Normal { sd: 5.0 }).unwrap()
    }

    #[test]
    fn chain_concentrates_near_true_value() {
        let model = sir();
        let target = synthetic_target(&model, 0.3);
        let base = Parameters::new().with("beta", 0.25).with("gamma", 0.1);
        let mut sampler = Metropolis::new(&model, base)
            .with_parameter("beta", Prior::uniform(0.05, 1.0), 0.01)
            .with_target(target)
            .seed(42);
        let chain = sampler.run(1500).unwrap();

        assert_eq!(chain.len(), 1500);
        assert!(chain.acceptance_rate() > 0.0);
        let (name, stats) = &chain.summary(500)[0];
        assert_eq!(name, "beta");
        assert_approx_eq!(stats.mean(), 0.3, 0.01);
        let map = chain.map_estimate().unwrap();
        assert_approx_eq!(map.get("beta").unwrap(), 0.3, 0.01);
    }

    #[test]
    fn proposals_outside_prior_are_rejected() {
        let model = sir();
        let target = synthetic_target(&model, 0.3);
        let base = Parameters::new().with("gamma", 0.1);
        let mut sampler = Metropolis::new(&model, base)
            .with_parameter("beta", Prior::uniform(0.28, 0.32), 0.05)
            .with_target(target)
            .seed(7);
        let chain = sampler.run(200).unwrap();
        let trace = chain.trace("beta").unwrap();
        assert!(trace.iter().all(|&x| x >= 0.28 && x <= 0.32));
        assert!(sampler.log_posterior(&[0.5]).unwrap() == -INF);
    }

    #[test]
    fn invalid_samplers() {
        let model = sir();
        let base = Parameters::new().with("gamma", 0.1);
        let mut sampler = Metropolis::new(&model, base.clone())
            .with_parameter("beta", Prior::uniform(0.0, 1.0), 0.1);
        assert!(sampler.run(10).is_err());

        let target = synthetic_target(&model, 0.3);
        let mut sampler = Metropolis::new(&model, base)
            .with_parameter("beta", Prior::uniform(0.0, 1.0), 0.0)
            .with_target(target);
        assert!(matches!(sampler.run(10), Err(ModelError::Calibration(_))));
    }

    #[test]
    fn chain_statistics() {
        let mut chain = Chain::new(vec!["a".into(), "b".into()]);
        chain.push(&[1.0, 10.0], -3.0, true);
        chain.push(&[2.0, 20.0], -1.0, true);
        chain.push(&[2.0, 20.0], -1.0, false);
        chain.push(&[3.0, 30.0], -2.0, true);
        assert_approx_eq!(chain.acceptance_rate(), 0.75, 1e-12);
        assert_eq!(chain.map_estimate().unwrap().get("b"), Some(20.0));
        assert_eq!(chain.trace("a").unwrap(), vec![1.0, 2.0, 2.0, 3.0]);
        assert!(chain.trace("c").is_none());
        let summary = chain.summary(1);
        assert_approx_eq!(summary[1].1.mean(), 70.0 / 3.0, 1e-12);
    }
}
