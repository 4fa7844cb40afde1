use std::collections::BTreeSet;

use perftab::generators::{
    CostBenefitParams, RankParams, StandardParams, TableauGenerator, ThreeObjectivesParams,
};
use perftab::tableau::{ScaleType, ThresholdKind};
use perftab::{monty_hall, ActionType, LawSpec, PreferenceDirection, TableauModel};

fn threshold(t: &TableauModel, g: usize, kind: ThresholdKind) -> Option<f64> {
    t.criteria[g].thresholds.get(kind).map(|th| th.constant)
}

#[test]
fn standard_beta_three_by_one() {
    let t = StandardParams {
        number_of_actions: 3,
        number_of_criteria: 1,
        common_mode: LawSpec::beta(2.0, 2.0),
        seed: Some(100),
        ..StandardParams::default()
    }
    .generate()
    .unwrap();

    let ids: Vec<&str> = t.actions.iter().map(|a| a.id.as_str()).collect();
    assert_eq!(ids, ["a1", "a2", "a3"]);
    assert_eq!(t.criteria.len(), 1);
    assert_eq!(t.criteria[0].id, "g1");
    assert_eq!(t.criteria[0].weight, 1.0);
    assert_eq!(threshold(&t, 0, ThresholdKind::Indifference), Some(2.5));
    assert_eq!(threshold(&t, 0, ThresholdKind::Preference), Some(5.0));
    assert_eq!(threshold(&t, 0, ThresholdKind::Veto), Some(80.0));

    let values: Vec<f64> = t.evaluation[0].iter().map(|v| v.unwrap()).collect();
    let distinct: BTreeSet<u64> = values.iter().map(|v| v.to_bits()).collect();
    assert_eq!(distinct.len(), 3, "{values:?}");
    for v in values {
        assert!((0.0..=100.0).contains(&v));
        assert!(((v * 100.0).round() - v * 100.0).abs() < 1e-6);
    }

    let again = StandardParams {
        number_of_actions: 3,
        number_of_criteria: 1,
        common_mode: LawSpec::beta(2.0, 2.0),
        seed: Some(100),
        ..StandardParams::default()
    }
    .generate()
    .unwrap();
    assert_eq!(t.fingerprint().unwrap(), again.fingerprint().unwrap());
}

#[test]
fn rank_three_by_two() {
    let t = RankParams {
        number_of_actions: 3,
        number_of_criteria: 2,
        seed: Some(1),
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
    for (g, criterion) in record.criteria.iter().enumerate() {
        assert_eq!(criterion.weight, -1.0);
        assert_eq!((criterion.scale.min, criterion.scale.max), (0.0, 3.0));
        assert_eq!(threshold(&t, g, ThresholdKind::Indifference), Some(0.0));
        assert_eq!(threshold(&t, g, ThresholdKind::Preference), Some(1.0));
        assert_eq!(threshold(&t, g, ThresholdKind::Veto), Some(3.0));
    }
}

#[test]
fn cost_benefit_six_by_three() {
    let t = CostBenefitParams {
        number_of_actions: 6,
        number_of_criteria: 3,
        seed: Some(2),
        ..CostBenefitParams::default()
    }
    .generate()
    .unwrap();
    t.check_invariants().unwrap();

    assert_eq!(t.criteria[0].preference_direction, PreferenceDirection::Min);
    assert_eq!(t.criteria[1].preference_direction, PreferenceDirection::Max);
    assert_eq!(t.objectives.len(), 2);

    for criterion in &t.criteria {
        let expected = match criterion.scale_type {
            ScaleType::Cardinal => (0.0, 100.0),
            ScaleType::Ordinal => (0.0, 10.0),
        };
        assert_eq!((criterion.scale.min, criterion.scale.max), expected);
        assert!(criterion.thresholds.is_ordered());
    }
    assert!(t.actions.iter().all(|a| matches!(
        a.type_tag,
        Some(ActionType::Cheap | ActionType::Neutral | ActionType::Advantageous)
    )));

    let weights = t.objective_weights();
    assert!(weights.iter().all(|(_, w)| (w - weights[0].1).abs() < 1e-9));
}

#[test]
fn three_objectives_five_by_three() {
    let t = ThreeObjectivesParams {
        number_of_actions: 5,
        number_of_criteria: 3,
        missing_data_probability: 0.0,
        seed: Some(1),
        ..ThreeObjectivesParams::default()
    }
    .generate()
    .unwrap();

    let ids: Vec<&str> = t.criteria.iter().map(|g| g.id.as_str()).collect();
    assert_eq!(ids, ["ec01", "so02", "en03"]);
    for action in &t.actions {
        for objective in ["Eco", "Soc", "Env"] {
            assert!(matches!(
                action.profile.get(objective),
                Some(ActionType::Weak | ActionType::Fair | ActionType::Good)
            ));
        }
    }
}

#[test]
fn three_objectives_profiles_bias_the_evaluations() {
    let t = ThreeObjectivesParams {
        number_of_actions: 300,
        number_of_criteria: 3,
        missing_data_probability: 0.0,
        seed: Some(1),
        ..ThreeObjectivesParams::default()
    }
    .generate()
    .unwrap();

    // mean evaluation per profile type on the economical criterion
    let mut sums = [(0.0, 0usize); 3];
    for (x, action) in t.actions.iter().enumerate() {
        let slot = match action.profile["Eco"] {
            ActionType::Weak => 0,
            ActionType::Fair => 1,
            _ => 2,
        };
        sums[slot].0 += t.evaluation[0][x].unwrap();
        sums[slot].1 += 1;
    }
    let means: Vec<f64> = sums.iter().map(|(s, n)| s / (*n).max(1) as f64).collect();
    assert!(means[0] < means[1] && means[1] < means[2], "{means:?}");
}

#[test]
fn monty_hall_switching_wins() {
    let outcome = monty_hall(6, 4, 1000, Some(1)).unwrap();
    assert!((outcome.switched_win_rate - 5.0 / 6.0).abs() < 0.05, "{outcome:?}");
    assert!((outcome.kept_win_rate - 1.0 / 6.0).abs() < 0.05, "{outcome:?}");
}

#[test]
fn missing_share_tracks_the_probability() {
    let t = StandardParams {
        number_of_actions: 2000,
        number_of_criteria: 2,
        missing_data_probability: 0.1,
        big_data: true,
        seed: Some(21),
        ..StandardParams::default()
    }
    .generate()
    .unwrap();
    let cells = t.evaluation.iter().flatten().count();
    let missing = t.evaluation.iter().flatten().filter(|v| v.is_none()).count();
    let share = missing as f64 / cells as f64;
    assert!((share - 0.1).abs() < 0.03, "share={share}");
    assert!((t.sum_weights() - 2.0).abs() < 1e-12);
}
