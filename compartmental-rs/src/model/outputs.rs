use serde::{Deserialize, Serialize};

/// Quantities computed from the model state at every output time, in addition
/// to the raw compartment sizes.
///
/// Compartments are referred to by base name, so requests made before a
/// stratification keep summing over all strata afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DerivedOutput {
    /// Instantaneous magnitude of all flows sharing the given name.
    FlowRate { flow: String },
    /// Sum of the given compartments.
    Sum { compartments: Vec<String> },
    /// Ratio between two sums of compartments. An empty denominator stands
    /// for the total population.
    Proportion {
        numerator: Vec<String>,
        #[serde(default)]
        denominator: Vec<String>,
    },
}

impl DerivedOutput {
    pub fn flow_rate(flow: &str) -> Self {
        DerivedOutput::FlowRate {
            flow: flow.to_string(),
        }
    }

    pub fn sum(compartments: &[&str]) -> Self {
        DerivedOutput::Sum {
            compartments: compartments.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Proportion of the total population in the given compartments
    /// (e.g., prevalence).
    pub fn prevalence(compartments: &[&str]) -> Self {
        Self::proportion(compartments, &[])
    }

    pub fn proportion(numerator: &[&str], denominator: &[&str]) -> Self {
        DerivedOutput::Proportion {
            numerator: numerator.iter().map(|s| s.to_string()).collect(),
            denominator: denominator.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Names of compartments referenced by this output.
    pub(crate) fn compartments(&self) -> Vec<&str> {
        match self {
            DerivedOutput::FlowRate { .. } => vec![],
            DerivedOutput::Sum { compartments } => {
                compartments.iter().map(|s| s.as_str()).collect()
            }
            DerivedOutput::Proportion {
                numerator,
                denominator,
            } => numerator
                .iter()
                .chain(denominator.iter())
                .map(|s| s.as_str())
                .collect(),
        }
    }
}
