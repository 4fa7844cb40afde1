//! Flat tableau: every criterion shares one scale, law and threshold set.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    apply_missing, check_actions, check_law, check_probability, check_scale, check_thresholds,
    check_weight_scale, draw_cell, draw_weights, make_actions, GeneratorError, TableauGenerator,
    WeightDistribution, WeightScale,
};
use crate::law::LawSpec;
use crate::rng::{master_seed, NumericRng, RngStream};
use crate::tableau::{
    digits, padded_id, Criterion, GenerationProfile, PreferenceDirection, Scale, ScaleType,
    TableauKind, TableauModel, ThresholdPercents, WeightConvention, DEFAULT_NA,
};

const MIN_ACTIONS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StandardParams {
    pub number_of_actions: usize,
    pub number_of_criteria: usize,
    pub weight_distribution: WeightDistribution,
    /// Used by the `random` and `fixed` distributions.
    pub weight_scale: WeightScale,
    /// `(min, max)` of every criterion.
    pub common_scale: (f64, f64),
    /// Thresholds in percent of the scale span.
    pub common_thresholds: ThresholdPercents,
    pub common_mode: LawSpec,
    /// Decimals kept on evaluations.
    pub value_digits: u32,
    pub missing_data_probability: f64,
    /// Compact mode: names equal ids and per-action laws are not recorded.
    pub big_data: bool,
    pub na: f64,
    pub seed: Option<u64>,
}

impl Default for StandardParams {
    fn default() -> Self {
        Self {
            number_of_actions: 13,
            number_of_criteria: 7,
            weight_distribution: WeightDistribution::Equisignificant,
            weight_scale: WeightScale::default(),
            common_scale: (0.0, 100.0),
            common_thresholds: ThresholdPercents::new(2.5, 5.0, 80.0),
            common_mode: LawSpec::Uniform,
            value_digits: 2,
            missing_data_probability: 0.0,
            big_data: false,
            na: DEFAULT_NA,
            seed: None,
        }
    }
}

impl TableauGenerator for StandardParams {
    fn kind(&self) -> TableauKind {
        TableauKind::Standard
    }

    fn generate(&self) -> Result<TableauModel, GeneratorError> {
        let n = self.number_of_actions;
        let k = self.number_of_criteria;
        let scale = Scale::new(self.common_scale.0, self.common_scale.1);
        check_actions(n, MIN_ACTIONS)?;
        check_scale(scale)?;
        check_law(&self.common_mode, scale)?;
        check_thresholds(&self.common_thresholds)?;
        check_weight_scale(self.weight_distribution, self.weight_scale)?;
        check_probability("missingDataProbability", self.missing_data_probability)?;

        let seed = master_seed(self.seed);
        let mut weight_rng = NumericRng::stream(seed, RngStream::Weights);
        let mut eval_rng = NumericRng::stream(seed, RngStream::Evaluations);
        let convention = WeightConvention::NonNegative;

        let mut actions = make_actions("a", n, "random decision action", self.big_data);
        let weights = draw_weights(
            self.weight_distribution,
            self.weight_scale,
            &vec![0; k],
            &mut weight_rng,
        );
        let thresholds = self.common_thresholds.on_scale(scale);
        let width = digits(k);
        let criteria: Vec<Criterion> = weights
            .into_iter()
            .enumerate()
            .map(|(i, weight)| {
                let id = padded_id("g", i + 1, width);
                Criterion {
                    name: format!("random criterion {id}"),
                    id,
                    objective: None,
                    preference_direction: PreferenceDirection::Max,
                    scale,
                    scale_type: ScaleType::Cardinal,
                    weight,
                    thresholds,
                    random_mode: Some(self.common_mode.clone()),
                }
            })
            .collect();

        let law = self.common_mode.resolve(scale.min, scale.max)?;
        let mut evaluation = vec![vec![None; n]; k];
        for (x, action) in actions.iter_mut().enumerate() {
            for (g, criterion) in criteria.iter().enumerate() {
                let value = draw_cell(
                    law,
                    action,
                    criterion,
                    convention,
                    self.value_digits,
                    self.big_data,
                    &mut eval_rng,
                )?;
                evaluation[g][x] = Some(value);
            }
        }
        apply_missing(&mut evaluation, self.missing_data_probability, &mut eval_rng);
        debug!(actions = n, criteria = k, law = law.name(), "generated standard tableau");

        Ok(TableauModel {
            kind: TableauKind::Standard,
            name: "randomPerformanceTableau".to_string(),
            actions,
            criteria,
            objectives: Vec::new(),
            evaluation,
            na: self.na,
            convention,
            generation: GenerationProfile {
                common_mode: self.common_mode.clone(),
                value_digits: self.value_digits,
                missing_data_probability: self.missing_data_probability,
                big_data: self.big_data,
                ordinal_scales: false,
                common_scale: Some(self.common_scale),
                seed: self.seed,
            },
            truncation_fallbacks: eval_rng.truncation_fallbacks(),
        })
    }
}
