//! Economical, societal and environmental objectives.
//!
//! Every action has a weak/fair/good profile per objective; the profile
//! value on a criterion's objective decides where that evaluation's law
//! peaks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    apply_missing, check_actions, check_probability, check_scale, check_thresholds,
    check_weight_scale, collect_objectives, draw_cell, draw_weights, make_actions, typed_law,
    GeneratorError, TableauGenerator, WeightDistribution, WeightScale,
};
use crate::law::LawSpec;
use crate::rng::{master_seed, NumericRng, Pmf, RngError, RngStream};
use crate::tableau::{
    digits, padded_id, ActionType, Criterion, GenerationProfile, PreferenceDirection, Scale,
    ScaleType, TableauKind, TableauModel, ThresholdPercents, WeightConvention, DEFAULT_NA,
};

const MIN_ACTIONS: usize = 3;

/// `(objective id, name, criterion prefix)` in declaration order.
pub const OBJECTIVES: [(&str, &str, &str); 3] = [
    ("Eco", "Economical", "ec"),
    ("Soc", "Societal", "so"),
    ("Env", "Environmental", "en"),
];

/// Scale used when `ordinal_scales` is set.
pub const ORDINAL_SCALE: (f64, f64) = (0.0, 10.0);

pub(crate) fn profile_types() -> Result<Pmf<ActionType>, RngError> {
    Pmf::uniform(vec![ActionType::Weak, ActionType::Fair, ActionType::Good])
}

/// One supporting type per objective, drawn in `objectives` order.
pub(crate) fn draw_profile(
    objectives: &[String],
    types: &Pmf<ActionType>,
    rng: &mut NumericRng,
) -> BTreeMap<String, ActionType> {
    objectives
        .iter()
        .map(|o| (o.clone(), *rng.categorical(types)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThreeObjectivesParams {
    pub number_of_actions: usize,
    pub number_of_criteria: usize,
    pub weight_distribution: WeightDistribution,
    pub weight_scale: WeightScale,
    /// Cardinal scale; replaced by (0, 10) when `ordinal_scales` is set.
    pub common_scale: (f64, f64),
    pub ordinal_scales: bool,
    pub common_thresholds: ThresholdPercents,
    pub common_mode: LawSpec,
    pub value_digits: u32,
    pub missing_data_probability: f64,
    /// Probability that a criterion is to be minimized.
    pub negative_weight_probability: f64,
    pub convention: WeightConvention,
    pub big_data: bool,
    pub na: f64,
    pub seed: Option<u64>,
}

impl Default for ThreeObjectivesParams {
    fn default() -> Self {
        Self {
            number_of_actions: 20,
            number_of_criteria: 13,
            weight_distribution: WeightDistribution::Equiobjectives,
            weight_scale: WeightScale::default(),
            common_scale: (0.0, 100.0),
            ordinal_scales: false,
            common_thresholds: ThresholdPercents::new(5.0, 10.0, 60.0),
            common_mode: LawSpec::triangular(),
            value_digits: 2,
            missing_data_probability: 0.05,
            negative_weight_probability: 0.0,
            convention: WeightConvention::NonNegative,
            big_data: false,
            na: DEFAULT_NA,
            seed: None,
        }
    }
}

impl ThreeObjectivesParams {
    pub(crate) fn scale(&self) -> (Scale, ScaleType) {
        if self.ordinal_scales {
            (Scale::new(ORDINAL_SCALE.0, ORDINAL_SCALE.1), ScaleType::Ordinal)
        } else {
            (Scale::new(self.common_scale.0, self.common_scale.1), ScaleType::Cardinal)
        }
    }
}

impl TableauGenerator for ThreeObjectivesParams {
    fn kind(&self) -> TableauKind {
        TableauKind::ThreeObjectives
    }

    fn generate(&self) -> Result<TableauModel, GeneratorError> {
        let n = self.number_of_actions;
        let k = self.number_of_criteria;
        let (scale, scale_type) = self.scale();
        check_actions(n, MIN_ACTIONS)?;
        check_scale(scale)?;
        typed_law(&self.common_mode, ActionType::Fair, scale)?;
        check_thresholds(&self.common_thresholds)?;
        check_weight_scale(self.weight_distribution, self.weight_scale)?;
        check_probability("missingDataProbability", self.missing_data_probability)?;
        check_probability("negativeWeightProbability", self.negative_weight_probability)?;

        let seed = master_seed(self.seed);
        let mut criteria_rng = NumericRng::stream(seed, RngStream::Criteria);
        let mut type_rng = NumericRng::stream(seed, RngStream::ActionTypes);
        let mut weight_rng = NumericRng::stream(seed, RngStream::Weights);
        let mut eval_rng = NumericRng::stream(seed, RngStream::Evaluations);

        // the first three criteria cover one objective each
        let mut groups = Vec::with_capacity(k);
        let mut directions = Vec::with_capacity(k);
        for i in 0..k {
            let objective = if i < OBJECTIVES.len() {
                i
            } else {
                criteria_rng.index(OBJECTIVES.len())
            };
            let direction = if criteria_rng.chance(self.negative_weight_probability) {
                PreferenceDirection::Min
            } else {
                PreferenceDirection::Max
            };
            groups.push(objective);
            directions.push(direction);
        }
        let weights = draw_weights(
            self.weight_distribution,
            self.weight_scale,
            &groups,
            &mut weight_rng,
        );

        let thresholds = self.common_thresholds.on_scale(scale);
        let width = digits(k).max(2);
        let criteria: Vec<Criterion> = groups
            .iter()
            .zip(directions)
            .zip(weights)
            .enumerate()
            .map(|(i, ((&o, direction), weight))| {
                let (objective, name, prefix) = OBJECTIVES[o];
                let id = padded_id(prefix, i + 1, width);
                Criterion {
                    name: format!("{name} criterion {id}"),
                    id,
                    objective: Some(objective.to_string()),
                    preference_direction: direction,
                    scale,
                    scale_type,
                    weight,
                    thresholds,
                    random_mode: Some(self.common_mode.clone()),
                }
            })
            .collect();

        let objective_ids: Vec<String> = OBJECTIVES.iter().map(|(id, _, _)| id.to_string()).collect();
        let types = profile_types()?;
        let mut actions = make_actions("a", n, "random public policy", self.big_data);
        for action in &mut actions {
            action.profile = draw_profile(&objective_ids, &types, &mut type_rng);
        }

        let mut evaluation = vec![vec![None; n]; k];
        for (x, action) in actions.iter_mut().enumerate() {
            for (g, criterion) in criteria.iter().enumerate() {
                let ty = criterion
                    .objective
                    .as_ref()
                    .and_then(|o| action.profile.get(o))
                    .copied()
                    .unwrap_or(ActionType::Fair);
                let law = typed_law(&self.common_mode, ty, scale)?;
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

        let labels: Vec<(String, String)> = OBJECTIVES
            .iter()
            .map(|(id, name, _)| (id.to_string(), name.to_string()))
            .collect();
        let objectives = collect_objectives(&criteria, &labels);
        debug!(actions = n, criteria = k, "generated three objectives tableau");

        Ok(TableauModel {
            kind: TableauKind::ThreeObjectives,
            name: "random3ObjectivesPerformanceTableau".to_string(),
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
                ordinal_scales: self.ordinal_scales,
                common_scale: Some((scale.min, scale.max)),
                seed: self.seed,
            },
            truncation_fallbacks: eval_rng.truncation_fallbacks(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_three_criteria_cover_each_objective() {
        let t = ThreeObjectivesParams {
            number_of_actions: 5,
            number_of_criteria: 3,
            seed: Some(1),
            ..ThreeObjectivesParams::default()
        }
        .generate()
        .unwrap();
        let ids: Vec<&str> = t.criteria.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, ["ec01", "so02", "en03"]);
        for action in &t.actions {
            let keys: Vec<&str> = action.profile.keys().map(String::as_str).collect();
            assert_eq!(keys, ["Eco", "Env", "Soc"]);
            assert!(action
                .profile
                .values()
                .all(|ty| matches!(ty, ActionType::Weak | ActionType::Fair | ActionType::Good)));
        }
        assert_eq!(t.objectives.len(), 3);
        t.check_invariants().unwrap();
    }

    #[test]
    fn equal_objective_weights() {
        let t = ThreeObjectivesParams {
            seed: Some(4),
            ..ThreeObjectivesParams::default()
        }
        .generate()
        .unwrap();
        let weights = t.objective_weights();
        assert!(weights.iter().all(|(_, w)| (w - weights[0].1).abs() < 1e-9));
        assert!((t.sum_weights() - 3.0 * weights[0].1).abs() < 1e-9);
    }

    #[test]
    fn minimized_criteria_follow_the_convention() {
        let params = ThreeObjectivesParams {
            negative_weight_probability: 1.0,
            missing_data_probability: 0.0,
            seed: Some(6),
            ..ThreeObjectivesParams::default()
        };
        let plain = params.generate().unwrap();
        assert!(plain.evaluation.iter().flatten().all(|v| v.unwrap() <= 0.0));
        let signed = ThreeObjectivesParams {
            convention: WeightConvention::Signed,
            ..params
        }
        .generate()
        .unwrap();
        assert!(signed.evaluation.iter().flatten().all(|v| v.unwrap() >= 0.0));
        let record = signed.to_record().unwrap();
        assert!(record.criteria.iter().all(|g| g.weight < 0.0));
    }

    #[test]
    fn ordinal_scales_round_to_integers() {
        let t = ThreeObjectivesParams {
            ordinal_scales: true,
            seed: Some(8),
            ..ThreeObjectivesParams::default()
        }
        .generate()
        .unwrap();
        assert!(t.criteria.iter().all(|g| g.scale == Scale::new(0.0, 10.0)));
        t.check_invariants().unwrap();
    }
}
