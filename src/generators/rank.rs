//! Rank tableau: each criterion ranks the actions by a random permutation.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    apply_missing, check_actions, check_probability, make_actions, GeneratorError,
    TableauGenerator,
};
use crate::law::LawSpec;
use crate::rng::{master_seed, NumericRng, RngStream};
use crate::tableau::{
    digits, padded_id, Criterion, GenerationProfile, PreferenceDirection, Scale, ScaleType,
    TableauKind, TableauModel, Threshold, Thresholds, WeightConvention, DEFAULT_NA,
};

const MIN_ACTIONS: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RankParams {
    pub number_of_actions: usize,
    pub number_of_criteria: usize,
    /// Ranks are minimized; `Signed` exports them with weight -1.
    pub convention: WeightConvention,
    pub missing_data_probability: f64,
    pub na: f64,
    pub seed: Option<u64>,
}

impl Default for RankParams {
    fn default() -> Self {
        Self {
            number_of_actions: 13,
            number_of_criteria: 7,
            convention: WeightConvention::Signed,
            missing_data_probability: 0.0,
            na: DEFAULT_NA,
            seed: None,
        }
    }
}

/// Thresholds of a rank criterion over `n` actions.
pub(crate) fn rank_thresholds(n: usize) -> Thresholds {
    Thresholds {
        indifference: Threshold::constant(0.0),
        preference: Threshold::constant(1.0),
        weak_veto: None,
        veto: Some(Threshold::constant(n as f64)),
    }
}

impl TableauGenerator for RankParams {
    fn kind(&self) -> TableauKind {
        TableauKind::Rank
    }

    /// Permutations are drawn criterion by criterion on the evaluation
    /// stream, then the missing-data pass runs on the same stream.
    fn generate(&self) -> Result<TableauModel, GeneratorError> {
        let n = self.number_of_actions;
        let k = self.number_of_criteria;
        check_actions(n, MIN_ACTIONS)?;
        check_probability("missingDataProbability", self.missing_data_probability)?;

        let seed = master_seed(self.seed);
        let mut eval_rng = NumericRng::stream(seed, RngStream::Evaluations);
        let scale = Scale::new(0.0, n as f64);
        let width = digits(k);

        let actions = make_actions("a", n, "ranked action", false);
        let criteria: Vec<Criterion> = (1..=k)
            .map(|i| {
                let id = padded_id("g", i, width);
                Criterion {
                    name: format!("ranking {id}"),
                    id,
                    objective: None,
                    preference_direction: PreferenceDirection::Min,
                    scale,
                    scale_type: ScaleType::Ordinal,
                    weight: 1.0,
                    thresholds: rank_thresholds(n),
                    random_mode: None,
                }
            })
            .collect();

        let mut evaluation = Vec::with_capacity(k);
        for criterion in &criteria {
            let mut ranks: Vec<f64> = (1..=n).map(|r| r as f64).collect();
            eval_rng.shuffle(&mut ranks);
            let sign = if criterion.is_negated(self.convention) { -1.0 } else { 1.0 };
            evaluation.push(ranks.into_iter().map(|r| Some(sign * r)).collect());
        }
        apply_missing(&mut evaluation, self.missing_data_probability, &mut eval_rng);
        debug!(actions = n, criteria = k, "generated rank tableau");

        Ok(TableauModel {
            kind: TableauKind::Rank,
            name: "randomRankPerformanceTableau".to_string(),
            actions,
            criteria,
            objectives: Vec::new(),
            evaluation,
            na: self.na,
            convention: self.convention,
            generation: GenerationProfile {
                common_mode: LawSpec::Uniform,
                value_digits: 0,
                missing_data_probability: self.missing_data_probability,
                big_data: false,
                ordinal_scales: true,
                common_scale: Some((0.0, n as f64)),
                seed: self.seed,
            },
            truncation_fallbacks: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tableau::ThresholdKind;

    #[test]
    fn columns_are_permutations() {
        let t = RankParams {
            number_of_actions: 3,
            number_of_criteria: 2,
            seed: Some(5),
            ..RankParams::default()
        }
        .generate()
        .unwrap();
        for row in &t.evaluation {
            let mut ranks: Vec<f64> = row.iter().map(|v| v.unwrap()).collect();
            ranks.sort_by(f64::total_cmp);
            assert_eq!(ranks, vec![1.0, 2.0, 3.0]);
        }
        let record = t.to_record().unwrap();
        assert!(record.criteria.iter().all(|g| g.weight == -1.0));
        let g = &t.criteria[0];
        assert_eq!(g.scale, Scale::new(0.0, 3.0));
        assert_eq!(g.thresholds.get(ThresholdKind::Preference).unwrap().constant, 1.0);
        assert_eq!(g.thresholds.get(ThresholdKind::Veto).unwrap().constant, 3.0);
        t.check_invariants().unwrap();
    }

    #[test]
    fn non_negative_convention_negates_ranks() {
        let t = RankParams {
            convention: WeightConvention::NonNegative,
            seed: Some(5),
            ..RankParams::default()
        }
        .generate()
        .unwrap();
        assert!(t.evaluation.iter().flatten().all(|v| v.unwrap() < 0.0));
        assert!(t.to_record().unwrap().criteria.iter().all(|g| g.weight == 1.0));
    }
}
