//! Cost/benefit tableau.
//!
//! Criteria are split into a Costs objective (minimized) and a Benefits
//! objective (maximized), each criterion on a cardinal (0, 100) or ordinal
//! (0, 10) scale. Actions are cheap, neutral or advantageous, which moves
//! the mode of every evaluation. Discrimination thresholds are read from
//! the empirical distribution of pairwise performance differences.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{
    apply_missing, check_actions, check_probability, check_thresholds, collect_objectives,
    check_weight_scale, draw_cell, draw_weights, make_actions, typed_law, GeneratorError,
    TableauGenerator, WeightDistribution, WeightScale,
};
use crate::iq_agent::{IncrementalQuantileEstimator, DEFAULT_BUFFER};
use crate::law::LawSpec;
use crate::rng::{master_seed, NumericRng, Pmf, RngError, RngStream};
use crate::tableau::{
    digits, padded_id, round_to, ActionType, Criterion, GenerationProfile,
    PreferenceDirection, Scale, ScaleType, TableauKind, TableauModel, Threshold,
    ThresholdPercents, Thresholds, WeightConvention, DEFAULT_NA,
};

const MIN_ACTIONS: usize = 6;

pub const CARDINAL_SCALE: Scale = Scale {
    min: 0.0,
    max: 100.0,
};
pub const ORDINAL_SCALE: Scale = Scale { min: 0.0, max: 10.0 };

pub(crate) fn action_types() -> Result<Pmf<ActionType>, RngError> {
    Pmf::uniform(vec![
        ActionType::Cheap,
        ActionType::Neutral,
        ActionType::Advantageous,
    ])
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CostBenefitParams {
    pub number_of_actions: usize,
    pub number_of_criteria: usize,
    pub weight_distribution: WeightDistribution,
    pub weight_scale: WeightScale,
    pub common_mode: LawSpec,
    /// Percentiles (0-100) of the pairwise differences used as thresholds.
    pub common_percentiles: ThresholdPercents,
    /// Cap on the pairwise differences sampled per criterion.
    pub sampling_size: usize,
    pub value_digits: u32,
    pub missing_data_probability: f64,
    pub convention: WeightConvention,
    pub big_data: bool,
    pub na: f64,
    pub seed: Option<u64>,
}

impl Default for CostBenefitParams {
    fn default() -> Self {
        Self {
            number_of_actions: 13,
            number_of_criteria: 13,
            weight_distribution: WeightDistribution::Equiobjectives,
            weight_scale: WeightScale::default(),
            common_mode: LawSpec::triangular(),
            common_percentiles: ThresholdPercents::new(5.0, 10.0, 95.0),
            sampling_size: 100_000,
            value_digits: 2,
            missing_data_probability: 0.0,
            convention: WeightConvention::NonNegative,
            big_data: false,
            na: DEFAULT_NA,
            seed: None,
        }
    }
}

impl CostBenefitParams {
    fn check_percentiles(&self) -> Result<(), GeneratorError> {
        check_thresholds(&self.common_percentiles)?;
        let p = &self.common_percentiles;
        let mut all = vec![p.indifference.0, p.preference.0];
        all.extend(p.weak_veto.map(|t| t.0));
        all.extend(p.veto.map(|t| t.0));
        for pct in all {
            check_probability("thresholdPercentile", pct / 100.0)?;
        }
        Ok(())
    }
}

impl TableauGenerator for CostBenefitParams {
    fn kind(&self) -> TableauKind {
        TableauKind::CostBenefit
    }

    fn generate(&self) -> Result<TableauModel, GeneratorError> {
        let n = self.number_of_actions;
        let k = self.number_of_criteria;
        check_actions(n, MIN_ACTIONS)?;
        // the type moves the mode, so only the remaining parameters matter
        for scale in [CARDINAL_SCALE, ORDINAL_SCALE] {
            typed_law(&self.common_mode, ActionType::Neutral, scale)?;
        }
        self.check_percentiles()?;
        check_weight_scale(self.weight_distribution, self.weight_scale)?;
        check_probability("missingDataProbability", self.missing_data_probability)?;

        let seed = master_seed(self.seed);
        let mut criteria_rng = NumericRng::stream(seed, RngStream::Criteria);
        let mut type_rng = NumericRng::stream(seed, RngStream::ActionTypes);
        let mut weight_rng = NumericRng::stream(seed, RngStream::Weights);
        let mut eval_rng = NumericRng::stream(seed, RngStream::Evaluations);

        let directions = Pmf::new(vec![
            (PreferenceDirection::Max, 2.0 / 3.0),
            (PreferenceDirection::Min, 1.0 / 3.0),
        ])?;
        let cost_scales = Pmf::new(vec![(ScaleType::Cardinal, 0.75), (ScaleType::Ordinal, 0.25)])?;
        let benefit_scales = Pmf::new(vec![
            (ScaleType::Ordinal, 2.0 / 3.0),
            (ScaleType::Cardinal, 1.0 / 3.0),
        ])?;

        // the first two criteria are a cost and a benefit
        let mut shapes = Vec::with_capacity(k);
        for i in 0..k {
            let direction = match i {
                0 => PreferenceDirection::Min,
                1 => PreferenceDirection::Max,
                _ => *criteria_rng.categorical(&directions),
            };
            let scale_type = match direction {
                PreferenceDirection::Min => *criteria_rng.categorical(&cost_scales),
                PreferenceDirection::Max => *criteria_rng.categorical(&benefit_scales),
            };
            shapes.push((direction, scale_type));
        }
        let groups: Vec<usize> = shapes
            .iter()
            .map(|(d, _)| match d {
                PreferenceDirection::Min => 0,
                PreferenceDirection::Max => 1,
            })
            .collect();
        let weights = draw_weights(
            self.weight_distribution,
            self.weight_scale,
            &groups,
            &mut weight_rng,
        );

        let width = digits(k).max(2);
        let mut criteria: Vec<Criterion> = shapes
            .iter()
            .zip(weights)
            .enumerate()
            .map(|(i, (&(direction, scale_type), weight))| {
                let (prefix, objective, label) = match direction {
                    PreferenceDirection::Min => ("c", "C", "cost"),
                    PreferenceDirection::Max => ("b", "B", "benefit"),
                };
                let id = padded_id(prefix, i + 1, width);
                let scale = match scale_type {
                    ScaleType::Cardinal => CARDINAL_SCALE,
                    ScaleType::Ordinal => ORDINAL_SCALE,
                };
                Criterion {
                    name: format!("random {label} criterion {id}"),
                    id,
                    objective: Some(objective.to_string()),
                    preference_direction: direction,
                    scale,
                    scale_type,
                    weight,
                    thresholds: self.common_percentiles.on_scale(scale),
                    random_mode: Some(self.common_mode.clone()),
                }
            })
            .collect();

        let types = action_types()?;
        let mut actions = make_actions("a", n, "random cost/benefit action", self.big_data);
        for action in &mut actions {
            action.type_tag = Some(*type_rng.categorical(&types));
        }

        let mut evaluation = vec![vec![None; n]; k];
        for (x, action) in actions.iter_mut().enumerate() {
            let ty = action.type_tag.unwrap_or(ActionType::Neutral);
            for (g, criterion) in criteria.iter().enumerate() {
                let law = typed_law(&self.common_mode, ty, criterion.scale)?;
                let value = draw_cell(
                    law,
                    action,
                    criterion,
                    self.convention,
                    self.value_digits,
                    self.big_data,
                    &mut eval_rng,
                )?;
                evaluation[g][x] = Some(value);
            }
        }
        apply_missing(&mut evaluation, self.missing_data_probability, &mut eval_rng);

        for (criterion, row) in criteria.iter_mut().zip(&evaluation) {
            criterion.thresholds = empirical_thresholds(
                &criterion.id,
                row,
                &self.common_percentiles,
                self.sampling_size,
                self.value_digits,
                criterion.scale,
            );
        }

        let labels = [("C", "Costs"), ("B", "Benefits")]
            .map(|(id, name)| (id.to_string(), name.to_string()));
        let objectives = collect_objectives(&criteria, &labels);
        debug!(actions = n, criteria = k, "generated cost/benefit tableau");

        Ok(TableauModel {
            kind: TableauKind::CostBenefit,
            name: "randomCBPerformanceTableau".to_string(),
            actions,
            criteria,
            objectives,
            evaluation,
            na: self.na,
            convention: self.convention,
            generation: GenerationProfile {
                common_mode: self.common_mode.clone(),
                value_digits: self.value_digits,
                missing_data_probability: self.missing_data_probability,
                big_data: self.big_data,
                ordinal_scales: false,
                common_scale: None,
                seed: self.seed,
            },
            truncation_fallbacks: eval_rng.truncation_fallbacks(),
        })
    }
}

/// Thresholds at the requested percentiles of `|e(x) - e(y)|`.
///
/// Ordered pairs are visited in action order, missing values skipped, until
/// `sampling_size` differences were collected. Without any pair the
/// percent-of-span reading of `percentiles` is used instead.
fn empirical_thresholds(
    criterion: &str,
    row: &[Option<f64>],
    percentiles: &ThresholdPercents,
    sampling_size: usize,
    value_digits: u32,
    scale: Scale,
) -> Thresholds {
    let mut agent = IncrementalQuantileEstimator::with_buffer(row.len().max(DEFAULT_BUFFER));
    let mut sampled = 0usize;
    'pairs: for (x, vx) in row.iter().enumerate() {
        let Some(vx) = vx else { continue };
        for (y, vy) in row.iter().enumerate() {
            if x == y {
                continue;
            }
            let Some(vy) = vy else { continue };
            if sampled >= sampling_size {
                break 'pairs;
            }
            agent.add((vx - vy).abs());
            sampled += 1;
        }
    }
    if sampled == 0 {
        warn!(criterion, "no performance differences to sample, using percent-of-span thresholds");
        return percentiles.on_scale(scale);
    }

    let mut at = |(pct, slope): (f64, f64)| Threshold {
        constant: round_to(agent.report(pct / 100.0).unwrap_or(0.0), value_digits),
        slope,
    };
    Thresholds {
        indifference: at(percentiles.indifference),
        preference: at(percentiles.preference),
        weak_veto: percentiles.weak_veto.map(&mut at),
        veto: percentiles.veto.map(&mut at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tableau::ThresholdKind;

    fn small() -> TableauModel {
        CostBenefitParams {
            number_of_actions: 6,
            number_of_criteria: 3,
            seed: Some(2),
            ..CostBenefitParams::default()
        }
        .generate()
        .unwrap()
    }

    #[test]
    fn first_two_criteria_are_cost_then_benefit() {
        let t = small();
        assert_eq!(t.criteria[0].preference_direction, PreferenceDirection::Min);
        assert_eq!(t.criteria[1].preference_direction, PreferenceDirection::Max);
        assert!(t.criteria[0].id.starts_with('c'));
        assert!(t.criteria[1].id.starts_with('b'));
        for g in &t.criteria {
            let expected = match g.scale_type {
                ScaleType::Cardinal => CARDINAL_SCALE,
                ScaleType::Ordinal => ORDINAL_SCALE,
            };
            assert_eq!(g.scale, expected);
        }
        assert!(t.actions.iter().all(|a| a.type_tag.is_some()));
        t.check_invariants().unwrap();
    }

    #[test]
    fn objectives_carry_equal_weight() {
        let t = CostBenefitParams {
            number_of_criteria: 11,
            seed: Some(31),
            ..CostBenefitParams::default()
        }
        .generate()
        .unwrap();
        let weights = t.objective_weights();
        assert_eq!(weights.len(), 2);
        assert!((weights[0].1 - weights[1].1).abs() < 1e-9, "{weights:?}");
    }

    #[test]
    fn thresholds_come_from_pairwise_differences() {
        let t = small();
        for g in &t.criteria {
            let th = g.thresholds;
            assert!(th.is_ordered());
            let diffs = t.compute_performance_differences(&g.id).unwrap();
            let largest = diffs.iter().copied().fold(0.0, f64::max);
            let veto = th.get(ThresholdKind::Veto).unwrap().constant;
            assert!(veto <= largest + 0.01, "{veto} > {largest}");
        }
    }

    #[test]
    fn min_criteria_are_stored_negated() {
        let t = small();
        let row = &t.evaluation[0];
        assert!(row.iter().flatten().all(|v| *v <= 0.0));
    }

    #[test]
    fn needs_six_actions() {
        let params = CostBenefitParams {
            number_of_actions: 5,
            ..CostBenefitParams::default()
        };
        assert_eq!(
            params.generate(),
            Err(GeneratorError::TooFewActions { min: 6, got: 5 })
        );
    }

    #[test]
    fn empty_rows_fall_back_to_span_thresholds() {
        let th = empirical_thresholds(
            "c01",
            &[None, Some(3.0)],
            &ThresholdPercents::new(5.0, 10.0, 95.0),
            100,
            2,
            CARDINAL_SCALE,
        );
        assert_eq!(th.indifference.constant, 5.0);
        assert_eq!(th.veto.unwrap().constant, 95.0);
    }
}
