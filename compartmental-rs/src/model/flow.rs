use crate::{model::Rate, prelude::Real};
use getset::{CopyGetters, Getters};
use paste::paste;
use serde::{Deserialize, Serialize};

/// How infectious individuals contribute to the force of infection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transmission {
    /// Force of infection proportional to infectious prevalence (I / N).
    Frequency,
    /// Force of infection proportional to the infectious count (I).
    Density,
}

/// The kind of a flow determines which end points it requires and how its
/// rate is converted into a magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    /// rate * source
    Transition,
    /// rate * source * I / N
    InfectionFrequency,
    /// rate * source * I
    InfectionDensity,
    /// rate * source, leaving the system
    Death,
    /// rate * N, entering the system
    CrudeBirth,
    /// rate, entering the system
    Importation,
}

macro_rules! is_kind {
    ($($name:ident => $($variant:ident)|+),* $(,)?) => {
        paste! {
            $(
                #[doc = "Return true if flow is of the `" $name "` kind."]
                pub fn [<is_ $name>](&self) -> bool {
                    matches!(self, $(FlowKind::$variant)|+)
                }
            )*
        }
    };
}

impl FlowKind {
    is_kind!(
        transition => Transition,
        infection => InfectionFrequency | InfectionDensity,
        death => Death,
        entry => CrudeBirth | Importation,
    );

    /// Transmission mode of infection flows.
    pub fn transmission(&self) -> Option<Transmission> {
        match self {
            FlowKind::InfectionFrequency => Some(Transmission::Frequency),
            FlowKind::InfectionDensity => Some(Transmission::Density),
            _ => None,
        }
    }

    /// True if flows of this kind must have a source compartment. Kinds that
    /// do not require a source also forbid it.
    pub fn has_source(&self) -> bool {
        !self.is_entry()
    }

    /// True if flows of this kind must have a destination compartment. Kinds
    /// that do not require a destination also forbid it.
    pub fn has_dest(&self) -> bool {
        !self.is_death()
    }
}

/// A directed, rate-governed transfer between compartments.
///
/// The source and destination are full compartment names. A missing source
/// means mass enters from outside the system and a missing destination means
/// it leaves the system.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct Flow {
    #[getset(get = "pub")]
    name: String,
    #[getset(get_copy = "pub")]
    kind: FlowKind,
    #[getset(get = "pub")]
    source: Option<String>,
    #[getset(get = "pub")]
    dest: Option<String>,
    #[getset(get = "pub")]
    rate: Rate,
    #[getset(get_copy = "pub")]
    multiplier: Real,
}

impl Flow {
    pub fn new(
        name: &str,
        kind: FlowKind,
        source: Option<&str>,
        dest: Option<&str>,
        rate: impl Into<Rate>,
    ) -> Self {
        Flow {
            name: name.to_string(),
            kind,
            source: source.map(String::from),
            dest: dest.map(String::from),
            rate: rate.into(),
            multiplier: 1.0,
        }
    }

    pub fn transition(name: &str, source: &str, dest: &str, rate: impl Into<Rate>) -> Self {
        Self::new(name, FlowKind::Transition, Some(source), Some(dest), rate)
    }

    pub fn infection(
        name: &str,
        source: &str,
        dest: &str,
        rate: impl Into<Rate>,
        transmission: Transmission,
    ) -> Self {
        let kind = match transmission {
            Transmission::Frequency => FlowKind::InfectionFrequency,
            Transmission::Density => FlowKind::InfectionDensity,
        };
        Self::new(name, kind, Some(source), Some(dest), rate)
    }

    pub fn death(name: &str, source: &str, rate: impl Into<Rate>) -> Self {
        Self::new(name, FlowKind::Death, Some(source), None, rate)
    }

    pub fn crude_birth(name: &str, dest: &str, rate: impl Into<Rate>) -> Self {
        Self::new(name, FlowKind::CrudeBirth, None, Some(dest), rate)
    }

    pub fn importation(name: &str, dest: &str, rate: impl Into<Rate>) -> Self {
        Self::new(name, FlowKind::Importation, None, Some(dest), rate)
    }

    /// Return a copy with the given end points and a multiplier scaled by
    /// factor. Used to replicate flows across strata.
    pub(crate) fn stratified_copy(
        &self,
        source: Option<String>,
        dest: Option<String>,
        factor: Real,
    ) -> Self {
        Flow {
            name: self.name.clone(),
            kind: self.kind,
            source,
            dest,
            rate: self.rate.clone(),
            multiplier: self.multiplier * factor,
        }
    }

    /// Check that end points agree with the flow kind. Return the reason of
    /// failure, if any.
    pub(crate) fn endpoint_error(&self) -> Option<String> {
        match (self.kind.has_source(), self.source.is_some()) {
            (true, false) => return Some(format!("{:?} flows require a source", self.kind)),
            (false, true) => return Some(format!("{:?} flows cannot have a source", self.kind)),
            _ => {}
        }
        match (self.kind.has_dest(), self.dest.is_some()) {
            (true, false) => return Some(format!("{:?} flows require a destination", self.kind)),
            (false, true) => {
                return Some(format!("{:?} flows cannot have a destination", self.kind))
            }
            _ => {}
        }
        if self.source.is_some() && self.source == self.dest {
            return Some("source and destination must differ".into());
        }
        return None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_define_end_points() {
        assert!(FlowKind::Transition.has_source() && FlowKind::Transition.has_dest());
        assert!(FlowKind::Death.has_source() && !FlowKind::Death.has_dest());
        assert!(!FlowKind::CrudeBirth.has_source() && FlowKind::CrudeBirth.has_dest());
        assert!(FlowKind::InfectionDensity.is_infection());
        assert_eq!(
            FlowKind::InfectionFrequency.transmission(),
            Some(Transmission::Frequency)
        );
        assert_eq!(FlowKind::Importation.transmission(), None);
    }

    #[test]
    fn endpoint_validation() {
        assert!(Flow::transition("progression", "E", "I", 0.2)
            .endpoint_error()
            .is_none());
        assert!(Flow::death("mortality", "I", 0.01).endpoint_error().is_none());
        assert!(Flow::new("bad", FlowKind::Death, Some("I"), Some("R"), 0.1)
            .endpoint_error()
            .is_some());
        assert!(Flow::new("bad", FlowKind::Importation, Some("S"), Some("I"), 0.1)
            .endpoint_error()
            .is_some());
        assert!(Flow::transition("loop", "S", "S", 0.1)
            .endpoint_error()
            .is_some());
    }

    #[test]
    fn flow_kinds_parse_from_snake_case() {
        #[derive(Deserialize)]
        struct Row {
            kind: FlowKind,
        }
        let row: Row = toml::from_str("kind = \"infection_density\"").unwrap();
        assert_eq!(row.kind, FlowKind::InfectionDensity);
    }
}
