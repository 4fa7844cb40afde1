use thiserror::Error;

use crate::law::LawError;
use crate::rng::RngError;

/// Parameter-domain and sampling failures of the tableau generators.
///
/// Parameter errors are raised before any draw, so a failed generation never
/// yields a partial tableau.
#[derive(Debug, Error, PartialEq)]
pub enum GeneratorError {
    #[error("at least {min} actions are required, got {got}")]
    TooFewActions { min: usize, got: usize },
    #[error("unknown weight distribution {0:?}")]
    UnknownWeightDistribution(String),
    #[error("repartition {0} is outside [0, 1]")]
    InvalidRepartition(f64),
    #[error("mode {mode} lies outside the scale [{min}, {max}]")]
    ModeOutsideScale { mode: f64, min: f64, max: f64 },
    #[error("{name} must be a probability, got {value}")]
    InvalidProbability { name: &'static str, value: f64 },
    #[error("invalid weight scale ({low}, {high})")]
    InvalidWeightScale { low: i64, high: i64 },
    #[error("invalid scale [{min}, {max}]")]
    InvalidScale { min: f64, max: f64 },
    #[error("thresholds are not ordered (indifference <= preference <= weak veto <= veto)")]
    UnorderedThresholds,
    #[error("at least one coalition bin is required")]
    NoCoalitionBins,
    #[error(transparent)]
    Law(LawError),
    #[error(transparent)]
    Rng(#[from] RngError),
}

impl From<LawError> for GeneratorError {
    fn from(err: LawError) -> Self {
        match err {
            LawError::ModeOutsideScale { mode, min, max } => {
                GeneratorError::ModeOutsideScale { mode, min, max }
            }
            LawError::InvalidRepartition(r) => GeneratorError::InvalidRepartition(r),
            LawError::DegenerateScale { min, max } => GeneratorError::InvalidScale { min, max },
            other => GeneratorError::Law(other),
        }
    }
}
