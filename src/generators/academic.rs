//! Students graded on courses.
//!
//! Each student draws a performance type from the bag weak:1, fair:2,
//! good:2, excellent:1. The type narrows the grade range the course law is
//! sampled from.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    apply_missing, check_actions, check_law, check_probability, check_scale, check_thresholds,
    check_weight_scale, draw_cell, draw_weights, make_actions, GeneratorError, TableauGenerator,
    WeightDistribution, WeightScale,
};
use crate::law::{Law, LawSpec};
use crate::rng::{master_seed, NumericRng, Pmf, RngError, RngStream};
use crate::tableau::{
    digits, padded_id, ActionType, Criterion, GenerationProfile, PreferenceDirection, Scale,
    ScaleType, TableauKind, TableauModel, ThresholdPercents, WeightConvention, DEFAULT_NA,
};

const MIN_ACTIONS: usize = 3;

/// Share of the scale span each student type is graded in.
pub fn grade_range(ty: ActionType) -> (f64, f64) {
    match ty {
        ActionType::Weak => (0.0, 0.5),
        ActionType::Fair => (0.2, 0.8),
        ActionType::Good => (0.4, 1.0),
        _ => (0.6, 1.0),
    }
}

pub(crate) fn student_types() -> Result<Pmf<ActionType>, RngError> {
    Pmf::from_bag(vec![
        (ActionType::Weak, 1),
        (ActionType::Fair, 2),
        (ActionType::Good, 2),
        (ActionType::Excellent, 1),
    ])
}

/// Course law of a student of type `ty`: the common law bound to the
/// narrowed range, its mode clamped into that range.
pub fn student_law(common: &LawSpec, ty: ActionType, scale: Scale) -> Result<Law, GeneratorError> {
    let (lo_frac, hi_frac) = grade_range(ty);
    let lo = scale.at(lo_frac);
    let hi = scale.at(hi_frac);
    let inset = 1e-3 * (hi - lo);
    let spec = match common {
        LawSpec::Uniform => LawSpec::Uniform,
        LawSpec::Triangular { mode, repartition } => LawSpec::Triangular {
            mode: mode.map(|m| m.clamp(lo, hi)),
            repartition: *repartition,
        },
        LawSpec::Normal { mu, sigma } => LawSpec::Normal {
            mu: mu.map(|m| m.clamp(lo, hi)),
            sigma: *sigma,
        },
        LawSpec::Beta { alpha, beta, mode } => LawSpec::Beta {
            alpha: *alpha,
            beta: *beta,
            mode: mode.map(|m| m.clamp(lo + inset, hi - inset)),
        },
    };
    Ok(spec.resolve(lo, hi)?)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AcademicParams {
    pub number_of_students: usize,
    pub number_of_courses: usize,
    pub weight_distribution: WeightDistribution,
    /// Course credits for the `random` and `fixed` distributions.
    pub weight_scale: WeightScale,
    /// Grade scale `(min, max)`.
    pub common_scale: (f64, f64),
    /// Integer grades when set.
    pub ordinal_scale: bool,
    pub common_thresholds: ThresholdPercents,
    pub common_mode: LawSpec,
    pub value_digits: u32,
    pub missing_data_probability: f64,
    pub big_data: bool,
    pub na: f64,
    pub seed: Option<u64>,
}

impl Default for AcademicParams {
    fn default() -> Self {
        Self {
            number_of_students: 10,
            number_of_courses: 5,
            weight_distribution: WeightDistribution::Random,
            weight_scale: WeightScale::new(1, 5),
            common_scale: (0.0, 20.0),
            ordinal_scale: true,
            common_thresholds: ThresholdPercents::new(5.0, 10.0, 60.0),
            common_mode: LawSpec::Triangular {
                mode: Some(12.0),
                repartition: Some(0.5),
            },
            value_digits: 0,
            missing_data_probability: 0.0,
            big_data: false,
            na: DEFAULT_NA,
            seed: None,
        }
    }
}

impl TableauGenerator for AcademicParams {
    fn kind(&self) -> TableauKind {
        TableauKind::Academic
    }

    fn generate(&self) -> Result<TableauModel, GeneratorError> {
        let n = self.number_of_students;
        let k = self.number_of_courses;
        let scale = Scale::new(self.common_scale.0, self.common_scale.1);
        check_actions(n, MIN_ACTIONS)?;
        check_scale(scale)?;
        check_law(&self.common_mode, scale)?;
        check_thresholds(&self.common_thresholds)?;
        check_weight_scale(self.weight_distribution, self.weight_scale)?;
        check_probability("missingDataProbability", self.missing_data_probability)?;

        let seed = master_seed(self.seed);
        let mut type_rng = NumericRng::stream(seed, RngStream::ActionTypes);
        let mut weight_rng = NumericRng::stream(seed, RngStream::Weights);
        let mut eval_rng = NumericRng::stream(seed, RngStream::Evaluations);
        let convention = WeightConvention::NonNegative;

        let bag = student_types()?;
        let mut actions = make_actions("s", n, "student", self.big_data);
        for action in &mut actions {
            action.type_tag = Some(*type_rng.categorical(&bag));
        }

        let scale_type = if self.ordinal_scale {
            ScaleType::Ordinal
        } else {
            ScaleType::Cardinal
        };
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
                let id = padded_id("c", i + 1, width);
                Criterion {
                    name: format!("course {id}"),
                    id,
                    objective: None,
                    preference_direction: PreferenceDirection::Max,
                    scale,
                    scale_type,
                    weight,
                    thresholds,
                    random_mode: Some(self.common_mode.clone()),
                }
            })
            .collect();

        let mut evaluation = vec![vec![None; n]; k];
        for (x, action) in actions.iter_mut().enumerate() {
            let ty = action.type_tag.unwrap_or(ActionType::Fair);
            let law = student_law(&self.common_mode, ty, scale)?;
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
        debug!(students = n, courses = k, "generated academic tableau");

        Ok(TableauModel {
            kind: TableauKind::Academic,
            name: "randomAcademicPerformanceTableau".to_string(),
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
                ordinal_scales: self.ordinal_scale,
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
    fn grades_stay_in_the_type_range() {
        let t = AcademicParams {
            number_of_students: 60,
            seed: Some(12),
            ..AcademicParams::default()
        }
        .generate()
        .unwrap();
        t.check_invariants().unwrap();
        for (x, action) in t.actions.iter().enumerate() {
            let (lo, hi) = grade_range(action.type_tag.unwrap());
            for row in &t.evaluation {
                let grade = row[x].unwrap();
                assert_eq!(grade.fract(), 0.0);
                // rounding to integers may step half a point out of the range
                assert!(grade >= 20.0 * lo - 0.5 && grade <= 20.0 * hi + 0.5, "{grade}");
            }
        }
    }

    #[test]
    fn all_types_appear_in_a_large_class() {
        let t = AcademicParams {
            number_of_students: 200,
            seed: Some(2),
            ..AcademicParams::default()
        }
        .generate()
        .unwrap();
        for ty in [
            ActionType::Weak,
            ActionType::Fair,
            ActionType::Good,
            ActionType::Excellent,
        ] {
            assert!(t.actions.iter().any(|a| a.type_tag == Some(ty)), "{ty}");
        }
        let ids: Vec<&str> = t.criteria.iter().map(|g| g.id.as_str()).collect();
        assert_eq!(ids, ["c1", "c2", "c3", "c4", "c5"]);
    }

    #[test]
    fn mode_is_clamped_into_the_narrowed_range() {
        let scale = Scale::new(0.0, 20.0);
        let common = LawSpec::Triangular {
            mode: Some(12.0),
            repartition: Some(0.5),
        };
        match student_law(&common, ActionType::Weak, scale).unwrap() {
            Law::Triangular { min, max, mode, .. } => {
                assert_eq!((min, max, mode), (0.0, 10.0, 10.0));
            }
            other => panic!("unexpected law {other:?}"),
        }
        match student_law(&LawSpec::triangular(), ActionType::Excellent, scale).unwrap() {
            Law::Triangular { mode, .. } => assert_eq!(mode, 16.0),
            other => panic!("unexpected law {other:?}"),
        }
    }

    #[test]
    fn random_credits_use_the_weight_scale() {
        let t = AcademicParams {
            seed: Some(9),
            ..AcademicParams::default()
        }
        .generate()
        .unwrap();
        assert!(t.criteria.iter().all(|g| (1.0..=5.0).contains(&g.weight)));
    }
}
