//! Runtime parameters and closed-form rate conversions.
//!
//! Parameters are bound to a model only when it runs. Flows refer to them by
//! name and the same model can be executed many times with different values,
//! which is what parameter sweeps and calibration do.
pub mod conversions;

use crate::{
    error::{ModelError, Result},
    prelude::Real,
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, iter::FromIterator};

/// A mapping from parameter names to scalar values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Parameters {
    values: BTreeMap<String, Real>,
}

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insertion.
    pub fn with(mut self, name: &str, value: Real) -> Self {
        self.set(name, value);
        return self;
    }

    /// Set parameter to value, overriding any previous value.
    pub fn set(&mut self, name: &str, value: Real) -> &mut Self {
        self.values.insert(name.to_string(), value);
        return self;
    }

    /// Return the value of parameter, if it exists.
    pub fn get(&self, name: &str) -> Option<Real> {
        self.values.get(name).copied()
    }

    /// Like get(), but fails with MissingParameter if name is not defined.
    pub fn require(&self, name: &str) -> Result<Real> {
        self.get(name)
            .ok_or_else(|| ModelError::MissingParameter(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over (name, value) pairs in alphabetical order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Real)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Return a copy with all values of other inserted on top of self.
    pub fn merged(&self, other: &Parameters) -> Parameters {
        let mut new = self.clone();
        for (k, v) in other.iter() {
            new.set(k, v);
        }
        return new;
    }
}

impl<S: Into<String>> FromIterator<(S, Real)> for Parameters {
    fn from_iter<I: IntoIterator<Item = (S, Real)>>(iter: I) -> Self {
        Parameters {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}
