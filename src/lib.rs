#![forbid(unsafe_code)]

//! # perftab
//!
//! Random performance tableaux for multiple-criteria decision aiding, and
//! incremental performance quantiles over them.
//!
//! Generators draw actions, criteria (weights, scales, thresholds) and an
//! evaluation matrix from seeded probability laws. A
//! [`PerformanceQuantilesStore`] summarizes each criterion by its limiting
//! quantiles and absorbs new batches, typically drawn by an
//! [`IncrementalGenerator`] that replays the laws of the seed tableau.
//! The [`IncrementalQuantileEstimator`] is the standalone 251-knot quantile
//! tracker for unbounded streams.
//!
//! Everything is deterministic for a given seed.

pub mod generators;
pub mod incremental;
pub mod iq_agent;
pub mod law;
pub mod quantiles;
pub mod rng;
pub mod tableau;

pub use generators::{
    AcademicParams, CoalitionsParams, CostBenefitParams, GeneratorError, RankParams,
    StandardParams, TableauGenerator, ThreeObjectivesParams, WeightDistribution, WeightScale,
};
pub use incremental::{IncrementalGenerator, RandomAction};
pub use iq_agent::{IncrementalQuantileEstimator, IqAgentError};
pub use law::{Law, LawError, LawSpec};
pub use quantiles::{PerformanceQuantilesStore, QuantileBins, StoreError};
pub use rng::{monty_hall, MontyHallOutcome, NumericRng, Pmf, RngError, RngStream};
pub use tableau::{
    Action, ActionBatch, ActionType, Criterion, Objective, PreferenceDirection, TableauError,
    TableauKind, TableauModel, TableauRecord, WeightConvention, DEFAULT_NA,
};
