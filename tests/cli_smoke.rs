use std::path::PathBuf;
use std::process::Command;

use perftab::{IncrementalQuantileEstimator, PerformanceQuantilesStore, TableauModel};
use tempfile::tempdir;

fn perftab(args: &[&str], paths: &[(&str, &PathBuf)]) -> std::process::Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_perftab"));
    cmd.args(args);
    for (flag, path) in paths {
        cmd.arg(flag).arg(path);
    }
    let output = cmd.output().unwrap();
    assert!(
        output.status.success(),
        "perftab {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

#[test]
fn generate_quantiles_update_pipeline() {
    let dir = tempdir().unwrap();
    let tableau_path = dir.path().join("tableau.json");
    let store_path = dir.path().join("store.json");
    let updated_path = dir.path().join("updated.json");

    perftab(
        &[
            "generate",
            "--kind",
            "three-objectives",
            "--actions",
            "12",
            "--criteria",
            "6",
            "--seed",
            "3",
        ],
        &[("--out", &tableau_path)],
    );
    let tableau = TableauModel::load_json(&tableau_path).unwrap();
    assert_eq!(tableau.actions.len(), 12);
    assert_eq!(tableau.criteria.len(), 6);

    perftab(
        &["quantiles", "--bins", "quintiles"],
        &[("--tableau", &tableau_path), ("--out", &store_path)],
    );
    let store = PerformanceQuantilesStore::load(&store_path).unwrap();
    assert_eq!(store.frequencies().len(), 6);
    assert!(store.lower_closed());

    perftab(
        &["update", "--actions", "30", "--seed", "4"],
        &[("--store", &store_path), ("--out", &updated_path)],
    );
    let updated = PerformanceQuantilesStore::load(&updated_path).unwrap();
    for id in updated.criterion_ids() {
        let before = store.history_size(id).unwrap();
        let after = updated.history_size(id).unwrap();
        assert!(after > before && after <= before + 30, "{id}: {before} -> {after}");
    }
}

#[test]
fn generate_is_deterministic_across_processes() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.json");
    let b = dir.path().join("b.json");
    for out in [&a, &b] {
        perftab(
            &["generate", "--kind", "cost-benefit", "--seed", "9", "--law", "beta"],
            &[("--out", out)],
        );
    }
    assert_eq!(
        std::fs::read_to_string(&a).unwrap(),
        std::fs::read_to_string(&b).unwrap()
    );
}

#[test]
fn unknown_law_is_rejected() {
    let dir = tempdir().unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_perftab"))
        .args(["generate", "--law", "cauchy", "--out"])
        .arg(dir.path().join("t.json"))
        .status()
        .unwrap();
    assert!(!status.success());
}

#[test]
fn iq_report_prints_requested_quantiles() {
    let dir = tempdir().unwrap();
    let state = dir.path().join("iq.txt");
    let mut agent = IncrementalQuantileEstimator::with_buffer(50);
    for i in 0..=200 {
        agent.add(i as f64);
    }
    agent.save(&state).unwrap();

    let output = perftab(&["iq-report", "--p", "0.5", "--p", "0.9"], &[("--state", &state)]);
    let stdout = String::from_utf8(output.stdout).unwrap();
    let rows: Vec<(f64, f64)> = stdout
        .lines()
        .map(|line| {
            let mut fields = line.split('\t').map(|f| f.parse::<f64>().unwrap());
            (fields.next().unwrap(), fields.next().unwrap())
        })
        .collect();
    assert_eq!(rows.len(), 2);
    assert!((rows[0].1 - 100.0).abs() < 3.0, "{rows:?}");
    assert!((rows[1].1 - 180.0).abs() < 3.0, "{rows:?}");
}

#[test]
fn monty_hall_reports_win_rates() {
    let output = perftab(&["monty-hall", "--trials", "2000", "--seed", "5"], &[]);
    let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let switched = outcome["switched_win_rate"].as_f64().unwrap();
    let kept = outcome["kept_win_rate"].as_f64().unwrap();
    assert_eq!(outcome["trials"].as_u64(), Some(2000));
    assert!((switched - 5.0 / 6.0).abs() < 0.05);
    assert!((kept - 1.0 / 6.0).abs() < 0.05);
}
