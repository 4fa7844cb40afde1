use perftab::generators::{
    CoalitionsParams, StandardParams, TableauGenerator, ThreeObjectivesParams,
};
use perftab::tableau::GenerationProfile;
use perftab::{
    Action, ActionBatch, IncrementalGenerator, LawSpec, PerformanceQuantilesStore, QuantileBins,
    StoreError, TableauKind, TableauModel, WeightConvention, DEFAULT_NA,
};
use proptest::prelude::*;
use tempfile::tempdir;

fn standard(seed: u64, actions: usize) -> TableauModel {
    StandardParams {
        number_of_actions: actions,
        number_of_criteria: 4,
        seed: Some(seed),
        ..StandardParams::default()
    }
    .generate()
    .unwrap()
}

fn assert_monotone(store: &PerformanceQuantilesStore) {
    let p = store.frequencies();
    assert_eq!(p[0], 0.0);
    assert_eq!(p[p.len() - 1], 1.0);
    assert!(p.windows(2).all(|w| w[0] < w[1]));
    for id in store.criterion_ids() {
        let q = store.limiting_quantiles(id).unwrap();
        assert!(q.windows(2).all(|w| w[0] <= w[1]), "{id}: {q:?}");
    }
}

#[test]
fn profile_endpoints_are_the_extremes() {
    let t = standard(1, 40);
    let store = t.compute_quantiles(QuantileBins::DECILES, true).unwrap();
    assert_monotone(&store);
    let low = store.quantile_profile(0.0);
    let high = store.quantile_profile(1.0);
    for g in &t.criteria {
        let values: Vec<f64> = t.evaluation[t.criterion_index(&g.id).unwrap()]
            .iter()
            .flatten()
            .copied()
            .collect();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(low[&g.id], min);
        assert_eq!(high[&g.id], max);
        assert_eq!(store.min_value(&g.id), Some(min));
        assert_eq!(store.history_size(&g.id), Some(40));
    }
}

#[test]
fn full_precision_round_trip_is_exact() {
    let t = ThreeObjectivesParams {
        seed: Some(2),
        ..ThreeObjectivesParams::default()
    }
    .generate()
    .unwrap();
    let store = t.compute_quantiles(QuantileBins::QUINTILES, false).unwrap();
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.json");
    store.save(&path, None).unwrap();
    let loaded = PerformanceQuantilesStore::load(&path).unwrap();

    assert_eq!(loaded.kind(), TableauKind::ThreeObjectives);
    assert_eq!(loaded.objectives(), store.objectives());
    assert!(!loaded.lower_closed());
    for i in 0..=40 {
        let p = i as f64 / 40.0;
        assert_eq!(loaded.quantile_profile(p), store.quantile_profile(p));
    }
    for id in store.criterion_ids() {
        assert_eq!(loaded.history_size(id), store.history_size(id));
        let x = store.quantile_profile(0.37)[id];
        assert_eq!(loaded.quantile_class(id, x).unwrap(), store.quantile_class(id, x).unwrap());
    }
}

#[test]
fn rounded_round_trip_agrees_to_storage_precision() {
    let t = standard(3, 25);
    let store = t.compute_quantiles(QuantileBins::DECILES, true).unwrap();
    let dir = tempdir().unwrap();
    let path = dir.path().join("store.json");
    store.save(&path, Some(2)).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    for key in perftab::quantiles::REQUIRED_KEYS {
        assert!(raw.get(key).is_some(), "missing {key}");
    }

    let loaded = PerformanceQuantilesStore::load(&path).unwrap();
    for i in 0..=20 {
        let p = i as f64 / 20.0;
        let a = store.quantile_profile(p);
        let b = loaded.quantile_profile(p);
        for (id, v) in &a {
            assert!((v - b[id]).abs() <= 0.005 + 1e-9, "{id} at {p}");
        }
    }
}

#[test]
fn zero_history_equals_a_fresh_store() {
    let seed = standard(4, 30);
    let mut store = seed.compute_quantiles(QuantileBins::QUARTILES, true).unwrap();
    let more = IncrementalGenerator::new(&seed, Some(5))
        .random_performance_tableau(17)
        .unwrap();

    store.update_quantiles(&more.to_batch(), Some(0)).unwrap();
    let fresh = more.compute_quantiles(QuantileBins::QUARTILES, true).unwrap();
    for id in store.criterion_ids() {
        assert_eq!(store.limiting_quantiles(id), fresh.limiting_quantiles(id));
        assert_eq!(store.history_size(id), Some(17));
    }
}

#[test]
fn updates_move_toward_the_new_data() {
    let t = standard(6, 50);
    let mut store = t.compute_quantiles(QuantileBins::DECILES, true).unwrap();
    let before = store.quantile_profile(0.5);

    // every new value sits at the top of the scale
    let n = 200;
    let batch = ActionBatch {
        actions: (0..n).map(|i| Action::new(format!("n{i}"))).collect(),
        criteria: store.criterion_ids().iter().map(|s| s.to_string()).collect(),
        evaluation: vec![vec![Some(100.0); n]; 4],
        convention: WeightConvention::NonNegative,
    };
    store.update_quantiles(&batch, None).unwrap();
    assert_monotone(&store);
    let after = store.quantile_profile(0.5);
    for (id, m) in &before {
        assert!(after[id] > *m, "{id}: {} <= {m}", after[id]);
        assert_eq!(store.history_size(id), Some(250));
        assert_eq!(store.max_value(id), Some(100.0));
    }
}

#[test]
fn missing_values_do_not_count_as_history() {
    let t = CoalitionsParams {
        missing_data_probability: 0.3,
        seed: Some(7),
        ..CoalitionsParams::default()
    }
    .generate()
    .unwrap();
    let store = t.compute_quantiles(QuantileBins::QUARTILES, true).unwrap();
    for (g, row) in t.criteria.iter().zip(&t.evaluation) {
        let present = row.iter().flatten().count();
        assert_eq!(store.history_size(&g.id), Some(present));
    }
}

#[test]
fn empty_tableau_has_an_empty_profile() {
    let t = TableauModel {
        kind: TableauKind::Standard,
        name: "empty".to_string(),
        actions: Vec::new(),
        criteria: Vec::new(),
        objectives: Vec::new(),
        evaluation: Vec::new(),
        na: DEFAULT_NA,
        convention: WeightConvention::NonNegative,
        generation: GenerationProfile {
            common_mode: LawSpec::Uniform,
            value_digits: 2,
            missing_data_probability: 0.0,
            big_data: false,
            ordinal_scales: false,
            common_scale: None,
            seed: None,
        },
        truncation_fallbacks: 0,
    };
    t.check_invariants().unwrap();
    assert_eq!(t.sum_weights(), 0.0);
    assert!(t.compute_weight_preorder().is_empty());
    let store = t.compute_quantiles(QuantileBins::DECILES, true).unwrap();
    assert!(store.quantile_profile(0.5).is_empty());
}

#[test]
fn bad_files_fail_to_load() {
    let dir = tempdir().unwrap();
    let t = standard(8, 10);
    let store = t.compute_quantiles(QuantileBins::QUARTILES, true).unwrap();
    let path = dir.path().join("store.json");
    store.save(&path, None).unwrap();
    let original: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

    let mut missing = original.clone();
    missing.as_object_mut().unwrap().remove("historySizes");
    std::fs::write(&path, missing.to_string()).unwrap();
    assert!(matches!(
        PerformanceQuantilesStore::load(&path),
        Err(StoreError::MissingKey("historySizes"))
    ));

    let mut na = original.clone();
    na["limitingQuantiles"]["g1"][0] = serde_json::json!(DEFAULT_NA);
    std::fs::write(&path, na.to_string()).unwrap();
    assert!(matches!(
        PerformanceQuantilesStore::load(&path),
        Err(StoreError::NotAllowedNa { .. })
    ));

    let mut short = original;
    short["limitingQuantiles"]["g1"] = serde_json::json!([1.0, 2.0]);
    std::fs::write(&path, short.to_string()).unwrap();
    assert!(matches!(
        PerformanceQuantilesStore::load(&path),
        Err(StoreError::LengthMismatch { .. })
    ));
}

proptest! {
    #[test]
    fn merged_quantiles_stay_monotone(
        seed in any::<u64>(),
        first in prop::collection::vec(-50.0f64..150.0, 1..60),
        second in prop::collection::vec(-50.0f64..150.0, 1..60),
        history in prop::option::of(1usize..500),
    ) {
        let t = standard(seed, 5);
        let mut store = t.compute_quantiles(QuantileBins::DECILES, true).unwrap();
        for values in [&first, &second] {
            let batch = ActionBatch {
                actions: (0..values.len()).map(|i| Action::new(format!("n{i}"))).collect(),
                criteria: vec!["g1".to_string()],
                evaluation: vec![values.iter().map(|v| Some(*v)).collect()],
                convention: WeightConvention::NonNegative,
            };
            store.update_quantiles(&batch, history).unwrap();
        }
        let q = store.limiting_quantiles("g1").unwrap();
        prop_assert!(q.windows(2).all(|w| w[0] <= w[1]));
        let lo = first.iter().chain(&second).copied().fold(f64::INFINITY, f64::min);
        let hi = first.iter().chain(&second).copied().fold(f64::NEG_INFINITY, f64::max);
        prop_assert!(q[0] <= lo);
        prop_assert!(q[q.len() - 1] >= hi);
        let mut last = f64::NEG_INFINITY;
        for i in 0..=10 {
            let x = -60.0 + 22.0 * i as f64;
            let c = store.cdf("g1", x).unwrap();
            prop_assert!((0.0..=1.0).contains(&c));
            prop_assert!(c >= last);
            last = c;
        }
    }
}
