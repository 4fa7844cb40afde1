//! Three-objectives variant where the objectives are random coalitions of
//! criteria, labelled A, B, C, ... by decreasing size.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::three_objectives::draw_profile;
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

pub(crate) fn coalition_types() -> Result<Pmf<ActionType>, RngError> {
    Pmf::uniform(vec![
        ActionType::Supporting,
        ActionType::Indifferent,
        ActionType::Opposing,
    ])
}

fn coalition_label(rank: usize) -> String {
    if rank < 26 {
        char::from(b'A' + rank as u8).to_string()
    } else {
        format!("Z{rank}")
    }
}

/// Coalition rank of each criterion: bins are assigned, empty bins dropped,
/// and the rest ranked by decreasing size (first bin first on ties).
pub(crate) fn rank_bins(assignment: &[usize], bins: usize) -> Vec<usize> {
    let mut sizes = vec![0usize; bins];
    for b in assignment {
        sizes[*b] += 1;
    }
    let mut order: Vec<usize> = (0..bins).filter(|b| sizes[*b] > 0).collect();
    order.sort_by(|a, b| sizes[*b].cmp(&sizes[*a]));
    let mut rank_of = vec![0usize; bins];
    for (rank, b) in order.iter().enumerate() {
        rank_of[*b] = rank;
    }
    assignment.iter().map(|b| rank_of[*b]).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CoalitionsParams {
    pub number_of_actions: usize,
    pub number_of_criteria: usize,
    /// Random criterion to bin assignment; round-robin otherwise.
    pub random_coalitions: bool,
    pub coalition_bins: usize,
    pub weight_distribution: WeightDistribution,
    pub weight_scale: WeightScale,
    pub common_scale: (f64, f64),
    pub common_thresholds: ThresholdPercents,
    pub common_mode: LawSpec,
    pub value_digits: u32,
    pub missing_data_probability: f64,
    pub big_data: bool,
    pub na: f64,
    pub seed: Option<u64>,
}

impl Default for CoalitionsParams {
    fn default() -> Self {
        Self {
            number_of_actions: 20,
            number_of_criteria: 13,
            random_coalitions: true,
            coalition_bins: 3,
            weight_distribution: WeightDistribution::Equicoalitions,
            weight_scale: WeightScale::default(),
            common_scale: (0.0, 100.0),
            common_thresholds: ThresholdPercents::new(5.0, 10.0, 60.0),
            common_mode: LawSpec::triangular(),
            value_digits: 2,
            missing_data_probability: 0.05,
            big_data: false,
            na: DEFAULT_NA,
            seed: None,
        }
    }
}

impl TableauGenerator for CoalitionsParams {
    fn kind(&self) -> TableauKind {
        TableauKind::Coalitions
    }

    fn generate(&self) -> Result<TableauModel, GeneratorError> {
        let n = self.number_of_actions;
        let k = self.number_of_criteria;
        let scale = Scale::new(self.common_scale.0, self.common_scale.1);
        check_actions(n, MIN_ACTIONS)?;
        if self.coalition_bins == 0 {
            return Err(GeneratorError::NoCoalitionBins);
        }
        check_scale(scale)?;
        typed_law(&self.common_mode, ActionType::Indifferent, scale)?;
        check_thresholds(&self.common_thresholds)?;
        check_weight_scale(self.weight_distribution, self.weight_scale)?;
        check_probability("missingDataProbability", self.missing_data_probability)?;

        let seed = master_seed(self.seed);
        let mut coalition_rng = NumericRng::stream(seed, RngStream::Coalitions);
        let mut type_rng = NumericRng::stream(seed, RngStream::ActionTypes);
        let mut weight_rng = NumericRng::stream(seed, RngStream::Weights);
        let mut eval_rng = NumericRng::stream(seed, RngStream::Evaluations);
        let convention = WeightConvention::NonNegative;

        let assignment: Vec<usize> = (0..k)
            .map(|i| {
                if self.random_coalitions {
                    coalition_rng.index(self.coalition_bins)
                } else {
                    i % self.coalition_bins
                }
            })
            .collect();
        let groups = rank_bins(&assignment, self.coalition_bins);
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
            .zip(weights)
            .enumerate()
            .map(|(i, (&rank, weight))| {
                let id = padded_id("g", i + 1, width);
                Criterion {
                    name: format!("random criterion {id}"),
                    id,
                    objective: Some(coalition_label(rank)),
                    preference_direction: PreferenceDirection::Max,
                    scale,
                    scale_type: ScaleType::Cardinal,
                    weight,
                    thresholds,
                    random_mode: Some(self.common_mode.clone()),
                }
            })
            .collect();

        let n_coalitions = groups.iter().max().map_or(0, |m| m + 1);
        let labels: Vec<(String, String)> = (0..n_coalitions)
            .map(|rank| {
                let label = coalition_label(rank);
                let name = format!("coalition {label}");
                (label, name)
            })
            .collect();
        let coalition_ids: Vec<String> = labels.iter().map(|(id, _)| id.clone()).collect();

        let types = coalition_types()?;
        let mut actions = make_actions("a", n, "random decision action", self.big_data);
        for action in &mut actions {
            action.profile = draw_profile(&coalition_ids, &types, &mut type_rng);
        }

        let mut evaluation = vec![vec![None; n]; k];
        for (x, action) in actions.iter_mut().enumerate() {
            for (g, criterion) in criteria.iter().enumerate() {
                let ty = criterion
                    .objective
                    .as_ref()
                    .and_then(|o| action.profile.get(o))
                    .copied()
                    .unwrap_or(ActionType::Indifferent);
                let law = typed_law(&self.common_mode, ty, scale)?;
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

        let objectives = collect_objectives(&criteria, &labels);
        debug!(
            actions = n,
            criteria = k,
            coalitions = objectives.len(),
            "generated random coalitions tableau"
        );

        Ok(TableauModel {
            kind: TableauKind::Coalitions,
            name: "randomCoalitionsPerformanceTableau".to_string(),
            actions,
            criteria,
            objectives,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bins_are_ranked_by_size() {
        // bin 2 is empty, bin 1 is the largest
        let ranks = rank_bins(&[0, 1, 1, 3, 1, 0, 3, 3, 3], 4);
        assert_eq!(ranks, vec![2, 1, 1, 0, 1, 2, 0, 0, 0]);
    }

    #[test]
    fn coalitions_are_labelled_by_decreasing_size() {
        let t = CoalitionsParams {
            seed: Some(13),
            ..CoalitionsParams::default()
        }
        .generate()
        .unwrap();
        let sizes: Vec<usize> = t.objectives.iter().map(|o| o.criteria.len()).collect();
        assert!(sizes.windows(2).all(|w| w[0] >= w[1]), "{sizes:?}");
        assert_eq!(t.objectives[0].id, "A");
        assert_eq!(sizes.iter().sum::<usize>(), 13);
        let weights = t.objective_weights();
        assert!(weights.iter().all(|(_, w)| (w - weights[0].1).abs() < 1e-9));
        for action in &t.actions {
            assert_eq!(action.profile.len(), t.objectives.len());
        }
        t.check_invariants().unwrap();
    }

    #[test]
    fn round_robin_without_random_coalitions() {
        let t = CoalitionsParams {
            random_coalitions: false,
            number_of_criteria: 6,
            seed: Some(1),
            ..CoalitionsParams::default()
        }
        .generate()
        .unwrap();
        let tags: Vec<&str> = t
            .criteria
            .iter()
            .map(|g| g.objective.as_deref().unwrap())
            .collect();
        assert_eq!(tags, ["A", "B", "C", "A", "B", "C"]);
    }

    #[test]
    fn zero_bins_is_rejected() {
        let params = CoalitionsParams {
            coalition_bins: 0,
            ..CoalitionsParams::default()
        };
        assert_eq!(params.generate(), Err(GeneratorError::NoCoalitionBins));
    }
}
