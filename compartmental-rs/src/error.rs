use thiserror::Error;

/// Errors raised while declaring, configuring or running a model.
///
/// Numerical misbehavior of a solver (e.g., negative compartments due to a
/// large Euler step) is *not* an error. Those runs complete normally and it is
/// up to the user to inspect the results.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("duplicate compartment: {0}")]
    DuplicateCompartment(String),

    #[error("unknown compartment: {0}")]
    UnknownCompartment(String),

    #[error("duplicate flow: {0}")]
    DuplicateFlow(String),

    #[error("unknown flow: {0}")]
    UnknownFlow(String),

    #[error("flow {flow}: {reason}")]
    InvalidFlow { flow: String, reason: String },

    #[error("missing parameter: {0}")]
    MissingParameter(String),

    #[error("unknown output: {0}")]
    UnknownOutput(String),

    #[error("initial population: {0}")]
    InvalidPopulation(String),

    #[error("invalid time span: {0}")]
    InvalidTimeSpan(String),

    #[error("stratification {name}: {reason}")]
    InvalidStratification { name: String, reason: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("calibration: {0}")]
    Calibration(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Toml(#[from] toml::de::Error),
}

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, ModelError>;
