//! Random performance tableau generators.
//!
//! Every variant is a parameter struct with a `Default` impl that implements
//! [`TableauGenerator`]. Parameters are validated before the first draw.
//!
//! Draws are split over named [`RngStream`](crate::rng::RngStream)s derived from the single `seed`:
//! action tags come from `ActionTypes`, criterion directions and objectives
//! from `Criteria`, coalition bins from `Coalitions`, weights from `Weights`.
//! Evaluations are drawn action-major from `Evaluations`, and the
//! missing-data pass follows on that same stream, criterion-major.

mod error;

pub mod academic;
pub mod coalitions;
pub mod cost_benefit;
pub mod rank;
pub mod standard;
pub mod three_objectives;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use academic::AcademicParams;
pub use coalitions::CoalitionsParams;
pub use cost_benefit::CostBenefitParams;
pub use error::GeneratorError;
pub use rank::RankParams;
pub use standard::StandardParams;
pub use three_objectives::ThreeObjectivesParams;

use crate::law::{Law, LawSpec};
use crate::rng::{NumericRng, RngError};
use crate::tableau::{
    digits, padded_id, round_to, Action, ActionType, Criterion, Objective, Scale, ScaleType,
    TableauKind, TableauModel, ThresholdPercents, WeightConvention,
};

pub trait TableauGenerator {
    fn kind(&self) -> TableauKind;
    fn generate(&self) -> Result<TableauModel, GeneratorError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightDistribution {
    /// Uniform integer in the weight scale.
    Random,
    /// Last criterion heavy (`high`), all others `low`.
    Fixed,
    #[default]
    Equisignificant,
    /// Equal weight sum per objective.
    Equiobjectives,
    /// Equal weight sum per criterion coalition.
    Equicoalitions,
}

impl FromStr for WeightDistribution {
    type Err = GeneratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "random" => Ok(Self::Random),
            "fixed" => Ok(Self::Fixed),
            "equisignificant" => Ok(Self::Equisignificant),
            "equiobjectives" => Ok(Self::Equiobjectives),
            "equicoalitions" => Ok(Self::Equicoalitions),
            other => Err(GeneratorError::UnknownWeightDistribution(other.to_string())),
        }
    }
}

impl fmt::Display for WeightDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Random => "random",
            Self::Fixed => "fixed",
            Self::Equisignificant => "equisignificant",
            Self::Equiobjectives => "equiobjectives",
            Self::Equicoalitions => "equicoalitions",
        };
        f.write_str(name)
    }
}

/// Inclusive integer range for `random` and `fixed` weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightScale {
    pub low: i64,
    pub high: i64,
}

impl Default for WeightScale {
    fn default() -> Self {
        Self { low: 1, high: 10 }
    }
}

impl WeightScale {
    pub fn new(low: i64, high: i64) -> Self {
        Self { low, high }
    }
}

/// Triangular modes (fractions of the span) of the low, middle and high tier.
pub const TIER_MODES: [f64; 3] = [0.3, 0.5, 0.7];

/// Beta parameters of the low, middle and high tier.
pub const TIER_BETAS: [(f64, f64); 3] = [(2.62203, 5.8661), (5.05556, 5.05556), (5.8661, 2.62203)];

/// Tier (0 low, 1 middle, 2 high) of a supporting type.
pub fn tier(ty: ActionType) -> usize {
    match ty {
        ActionType::Weak | ActionType::Cheap | ActionType::Opposing => 0,
        ActionType::Fair | ActionType::Neutral | ActionType::Indifferent => 1,
        ActionType::Good
        | ActionType::Excellent
        | ActionType::Advantageous
        | ActionType::Supporting => 2,
    }
}

/// Law of an evaluation biased by the supporting type `ty`.
///
/// The common law family is kept; its mode moves to the tier's fraction of
/// the span, and beta laws switch to the tier's preset parameters.
pub fn typed_law(common: &LawSpec, ty: ActionType, scale: Scale) -> Result<Law, GeneratorError> {
    let t = tier(ty);
    let mode = scale.at(TIER_MODES[t]);
    let spec = match common {
        LawSpec::Uniform => LawSpec::Uniform,
        LawSpec::Triangular { repartition, .. } => LawSpec::Triangular {
            mode: Some(mode),
            repartition: *repartition,
        },
        LawSpec::Normal { sigma, .. } => LawSpec::Normal {
            mu: Some(mode),
            sigma: *sigma,
        },
        LawSpec::Beta { .. } => {
            let (alpha, beta) = TIER_BETAS[t];
            LawSpec::beta(alpha, beta)
        }
    };
    Ok(spec.resolve(scale.min, scale.max)?)
}

pub(crate) fn check_actions(got: usize, min: usize) -> Result<(), GeneratorError> {
    if got < min {
        return Err(GeneratorError::TooFewActions { min, got });
    }
    Ok(())
}

pub(crate) fn check_probability(name: &'static str, value: f64) -> Result<(), GeneratorError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(GeneratorError::InvalidProbability { name, value });
    }
    Ok(())
}

pub(crate) fn check_scale(scale: Scale) -> Result<(), GeneratorError> {
    if !(scale.min.is_finite() && scale.max.is_finite() && scale.min < scale.max) {
        return Err(GeneratorError::InvalidScale {
            min: scale.min,
            max: scale.max,
        });
    }
    Ok(())
}

pub(crate) fn check_weight_scale(
    distribution: WeightDistribution,
    scale: WeightScale,
) -> Result<(), GeneratorError> {
    let used = matches!(
        distribution,
        WeightDistribution::Random | WeightDistribution::Fixed
    );
    if used && (scale.low < 0 || scale.low > scale.high) {
        return Err(GeneratorError::InvalidWeightScale {
            low: scale.low,
            high: scale.high,
        });
    }
    Ok(())
}

pub(crate) fn check_thresholds(percents: &ThresholdPercents) -> Result<(), GeneratorError> {
    if !percents.is_ordered() {
        return Err(GeneratorError::UnorderedThresholds);
    }
    Ok(())
}

pub(crate) fn check_law(spec: &LawSpec, scale: Scale) -> Result<(), GeneratorError> {
    spec.resolve(scale.min, scale.max)?;
    Ok(())
}

/// Weights per criterion; `groups[g]` is the objective or coalition index of
/// criterion `g`, used by the equi-group distributions.
pub(crate) fn draw_weights(
    distribution: WeightDistribution,
    scale: WeightScale,
    groups: &[usize],
    rng: &mut NumericRng,
) -> Vec<f64> {
    let k = groups.len();
    match distribution {
        WeightDistribution::Random => (0..k)
            .map(|_| rng.uniform_int(scale.low, scale.high) as f64)
            .collect(),
        WeightDistribution::Fixed => {
            let mut weights = vec![scale.low as f64; k];
            if let Some(first) = weights.first_mut() {
                *first = scale.high as f64;
            }
            weights.reverse();
            weights
        }
        WeightDistribution::Equisignificant => vec![1.0; k],
        WeightDistribution::Equiobjectives | WeightDistribution::Equicoalitions => {
            group_weights(groups)
        }
    }
}

/// `weight(g) = prod_o card(o) / card(group(g))` over the non-empty groups.
pub(crate) fn group_weights(groups: &[usize]) -> Vec<f64> {
    let n_groups = groups.iter().max().map_or(0, |m| m + 1);
    let mut sizes = vec![0usize; n_groups];
    for g in groups {
        sizes[*g] += 1;
    }
    let product: f64 = sizes.iter().filter(|s| **s > 0).map(|s| *s as f64).product();
    groups.iter().map(|g| product / sizes[*g] as f64).collect()
}

/// Objectives in `labels` order, each gathering the criteria tagged with its
/// id. Objectives without members are dropped.
pub(crate) fn collect_objectives(criteria: &[Criterion], labels: &[(String, String)]) -> Vec<Objective> {
    labels
        .iter()
        .filter_map(|(id, name)| {
            let members: Vec<&Criterion> = criteria
                .iter()
                .filter(|g| g.objective.as_deref() == Some(id.as_str()))
                .collect();
            (!members.is_empty()).then(|| Objective {
                id: id.clone(),
                name: name.clone(),
                criteria: members.iter().map(|g| g.id.clone()).collect(),
                weight: members.iter().map(|g| g.weight.abs()).sum(),
            })
        })
        .collect()
}

pub(crate) fn make_actions(prefix: &str, n: usize, label: &str, big_data: bool) -> Vec<Action> {
    let width = digits(n);
    (1..=n)
        .map(|i| {
            let mut action = Action::new(padded_id(prefix, i, width));
            if !big_data {
                action.name = format!("{label} #{i}");
            }
            action
        })
        .collect()
}

/// Rounded evaluation in the stored orientation.
pub(crate) fn finish_value(
    raw: f64,
    criterion: &Criterion,
    convention: WeightConvention,
    value_digits: u32,
) -> f64 {
    let value = match criterion.scale_type {
        ScaleType::Ordinal => raw.round(),
        ScaleType::Cardinal => round_to(raw, value_digits),
    };
    if criterion.is_negated(convention) {
        -value
    } else {
        value
    }
}

/// Draw one evaluation from `law`, recording the law on `action` unless the
/// tableau is compact.
pub(crate) fn draw_cell(
    law: Law,
    action: &mut Action,
    criterion: &Criterion,
    convention: WeightConvention,
    value_digits: u32,
    big_data: bool,
    rng: &mut NumericRng,
) -> Result<f64, RngError> {
    let raw = law.sample(rng)?;
    if !big_data {
        action.generators.insert(criterion.id.clone(), law);
    }
    Ok(finish_value(raw, criterion, convention, value_digits))
}

/// Replace each cell by a missing value with probability `p`.
///
/// One draw per cell, criterion-major, whatever `p` is.
pub(crate) fn apply_missing(evaluation: &mut [Vec<Option<f64>>], p: f64, rng: &mut NumericRng) {
    for row in evaluation.iter_mut() {
        for cell in row.iter_mut() {
            if rng.chance(p) {
                *cell = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weight_distribution_names() {
        assert_eq!(
            "EquiObjectives".parse::<WeightDistribution>().unwrap(),
            WeightDistribution::Equiobjectives
        );
        assert_eq!(
            "heavy".parse::<WeightDistribution>(),
            Err(GeneratorError::UnknownWeightDistribution("heavy".to_string()))
        );
        assert_eq!(WeightDistribution::Fixed.to_string(), "fixed");
    }

    #[test]
    fn fixed_weights_make_the_last_criterion_heavy() {
        let mut rng = NumericRng::seeded(0);
        let w = draw_weights(
            WeightDistribution::Fixed,
            WeightScale::new(1, 10),
            &[0, 0, 0, 0],
            &mut rng,
        );
        assert_eq!(w, vec![1.0, 1.0, 1.0, 10.0]);
    }

    #[test]
    fn group_weights_equalize_group_sums() {
        // two costs, one benefit
        let w = group_weights(&[0, 0, 1]);
        assert_eq!(w, vec![1.0, 1.0, 2.0]);
        let w = group_weights(&[0, 1, 2, 0, 0]);
        let sums = [w[0] + w[3] + w[4], w[1], w[2]];
        assert!(sums.iter().all(|s| (s - sums[0]).abs() < 1e-12));
        // equal group sizes reduce to equisignificant
        let w = group_weights(&[0, 1, 0, 1]);
        assert!(w.iter().all(|x| *x == w[0]));
    }

    #[test]
    fn random_weights_stay_in_scale() {
        let mut rng = NumericRng::seeded(4);
        let w = draw_weights(
            WeightDistribution::Random,
            WeightScale::new(2, 5),
            &[0; 50],
            &mut rng,
        );
        assert!(w.iter().all(|x| (2.0..=5.0).contains(x) && x.fract() == 0.0));
    }

    #[test]
    fn typed_law_moves_the_mode() {
        let scale = Scale::new(0.0, 100.0);
        let law = typed_law(&LawSpec::triangular(), ActionType::Cheap, scale).unwrap();
        assert_eq!(
            law,
            Law::Triangular {
                min: 0.0,
                max: 100.0,
                mode: 30.0,
                repartition: 0.5
            }
        );
        let law = typed_law(&LawSpec::beta(2.0, 2.0), ActionType::Good, scale).unwrap();
        assert_eq!(
            law,
            Law::Beta {
                min: 0.0,
                max: 100.0,
                alpha: 5.8661,
                beta: 2.62203
            }
        );
    }

    #[test]
    fn missing_pass_always_draws() {
        let mut a = NumericRng::seeded(8);
        let mut b = NumericRng::seeded(8);
        let mut grid = vec![vec![Some(1.0); 4]; 3];
        apply_missing(&mut grid, 0.0, &mut a);
        assert!(grid.iter().flatten().all(Option::is_some));
        for _ in 0..12 {
            b.chance(0.5);
        }
        assert_eq!(a.uniform(0.0, 1.0), b.uniform(0.0, 1.0));
    }
}
