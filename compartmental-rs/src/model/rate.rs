use crate::{
    error::Result,
    model::Compartment,
    params::Parameters,
    prelude::{Real, Time, NAN},
};
use std::{fmt, sync::Arc};

/// Signature of rates that depend on the full model state.
pub type RateFn = Arc<dyn Fn(&RateContext) -> Real + Send + Sync>;

/// Signature of rates that depend only on time.
pub type TimeFn = Arc<dyn Fn(Time) -> Real + Send + Sync>;

/// A rate expression attached to a flow.
///
/// Rates are per-capita for flows that have a source compartment. The flow
/// magnitude is obtained multiplying the rate by the size of the source (and
/// by the force of infection, for infection flows).
#[derive(Clone)]
pub enum Rate {
    /// A fixed scalar.
    Constant(Real),
    /// A named value looked up in the run's Parameters.
    Param(String),
    /// A function of time, e.g. a seasonal contact rate.
    TimeVarying(TimeFn),
    /// A function of time, compartment sizes and parameters.
    Function(RateFn),
}

impl Rate {
    pub fn constant(value: Real) -> Self {
        Rate::Constant(value)
    }

    pub fn param(name: &str) -> Self {
        Rate::Param(name.to_string())
    }

    pub fn time_varying(f: impl Fn(Time) -> Real + Send + Sync + 'static) -> Self {
        Rate::TimeVarying(Arc::new(f))
    }

    pub fn function(f: impl Fn(&RateContext) -> Real + Send + Sync + 'static) -> Self {
        Rate::Function(Arc::new(f))
    }

    /// Name of the parameter this rate refers to, if any.
    pub fn param_name(&self) -> Option<&str> {
        match self {
            Rate::Param(name) => Some(name),
            _ => None,
        }
    }

    /// Substitute named parameters by their values. Other variants are
    /// returned unchanged.
    pub fn resolve(&self, params: &Parameters) -> Result<Rate> {
        match self {
            Rate::Param(name) => Ok(Rate::Constant(params.require(name)?)),
            other => Ok(other.clone()),
        }
    }

    /// Evaluate rate in the given context.
    pub fn value(&self, ctx: &RateContext) -> Real {
        match self {
            &Rate::Constant(v) => v,
            Rate::Param(name) => ctx.params.get(name).unwrap_or(NAN),
            Rate::TimeVarying(f) => f(ctx.time),
            Rate::Function(f) => f(ctx),
        }
    }
}

impl fmt::Debug for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rate::Constant(v) => write!(f, "Constant({})", v),
            Rate::Param(name) => write!(f, "Param({:?})", name),
            Rate::TimeVarying(_) => write!(f, "TimeVarying(<fn>)"),
            Rate::Function(_) => write!(f, "Function(<fn>)"),
        }
    }
}

impl From<Real> for Rate {
    fn from(value: Real) -> Self {
        Rate::Constant(value)
    }
}

impl From<&str> for Rate {
    fn from(name: &str) -> Self {
        Rate::param(name)
    }
}

/// A read-only view on the model state passed to rate functions.
pub struct RateContext<'a> {
    pub time: Time,
    pub(crate) sizes: &'a [Real],
    pub(crate) compartments: &'a [Compartment],
    pub(crate) params: &'a Parameters,
}

impl<'a> RateContext<'a> {
    /// Size of the compartment with the given full name.
    pub fn get(&self, name: &str) -> Option<Real> {
        self.compartments
            .iter()
            .position(|c| c.name() == name)
            .map(|i| self.sizes[i])
    }

    /// Sum of all compartments derived from the given base name. In an
    /// unstratified model this is the same as get().
    pub fn sum(&self, base: &str) -> Real {
        self.compartments
            .iter()
            .zip(self.sizes)
            .filter(|(c, _)| c.base() == base)
            .map(|(_, x)| *x)
            .sum()
    }

    /// Total population.
    pub fn total(&self) -> Real {
        self.sizes.iter().sum()
    }

    /// Value of a run parameter.
    pub fn param(&self, name: &str) -> Option<Real> {
        self.params.get(name)
    }

    pub fn sizes(&self) -> &[Real] {
        self.sizes
    }
}
