//! Per-criterion limiting quantiles with incremental batch updates.
//!
//! The store keeps, for every criterion, the values at a fixed vector of
//! cumulative frequencies (deciles, quintiles, ...) and the number of
//! observations they summarize. New batches are merged into that
//! piecewise-linear cdf without keeping any raw history.
//!
//! Values enter the store oriented so that larger is better.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::law::LawSpec;
use crate::tableau::{
    round_to, ActionBatch, ActionType, Criterion, GenerationProfile, Objective,
    PreferenceDirection, TableauKind, TableauModel, WeightConvention, DEFAULT_NA,
};

/// Keys a persisted store must carry.
pub const REQUIRED_KEYS: [&str; 10] = [
    "perfTabType",
    "OrdinalScales",
    "BigData",
    "missingDataProbability",
    "commonScale",
    "criteria",
    "quantilesFrequencies",
    "historySizes",
    "LowerClosed",
    "limitingQuantiles",
];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid quantile bins {0:?} (expected a label such as deciles or a positive integer)")]
    InvalidBins(String),
    #[error("merged cdf of criterion {criterion} decreases at {value}")]
    NonMonotone { criterion: String, value: f64 },
    #[error("persisted store is missing key {0}")]
    MissingKey(&'static str),
    #[error("NA sentinel in {field} of criterion {criterion}")]
    NotAllowedNa {
        criterion: String,
        field: &'static str,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("criterion {criterion}: {got} limiting quantiles for {expected} frequencies")]
    LengthMismatch {
        criterion: String,
        expected: usize,
        got: usize,
    },
    #[error("criterion {0} has no observations")]
    EmptyCriterion(String),
    #[error("unknown criterion {0}")]
    UnknownCriterion(String),
    #[error("quantile frequencies must increase strictly from 0 to 1")]
    InvalidFrequencies,
    #[error("limiting quantiles of criterion {0} decrease")]
    DecreasingQuantiles(String),
}

/// Number of quantile bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuantileBins(usize);

impl QuantileBins {
    pub const QUARTILES: Self = Self(4);
    pub const QUINTILES: Self = Self(5);
    pub const DECILES: Self = Self(10);

    pub fn new(count: usize) -> Result<Self, StoreError> {
        if count == 0 {
            return Err(StoreError::InvalidBins(count.to_string()));
        }
        Ok(Self(count))
    }

    pub fn count(&self) -> usize {
        self.0
    }

    /// `[0, 1/n, ..., 1]`.
    pub fn frequencies(&self) -> Vec<f64> {
        let n = self.0 as f64;
        (0..=self.0).map(|i| i as f64 / n).collect()
    }

    pub fn label(&self) -> Option<&'static str> {
        match self.0 {
            4 => Some("quartiles"),
            5 => Some("quintiles"),
            6 => Some("sextiles"),
            8 => Some("octiles"),
            10 => Some("deciles"),
            12 => Some("dodeciles"),
            20 => Some("vigintiles"),
            100 => Some("centiles"),
            _ => None,
        }
    }
}

impl FromStr for QuantileBins {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let count = match s.trim().to_ascii_lowercase().as_str() {
            "quartiles" => 4,
            "quintiles" => 5,
            "sextiles" => 6,
            "octiles" => 8,
            "deciles" => 10,
            "dodeciles" => 12,
            "vigintiles" => 20,
            "centiles" => 100,
            other => other
                .parse::<usize>()
                .map_err(|_| StoreError::InvalidBins(s.to_string()))?,
        };
        Self::new(count).map_err(|_| StoreError::InvalidBins(s.to_string()))
    }
}

impl fmt::Display for QuantileBins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.label() {
            Some(label) => f.write_str(label),
            None => write!(f, "{}", self.0),
        }
    }
}

/// Walk of the merge between the old limiting quantiles and a sorted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeStep {
    AdvanceOld,
    InsertNew,
    Equal,
    Done,
}

fn next_step(old: &[f64], i: usize, new: &[f64], j: usize) -> MergeStep {
    match (old.get(i), new.get(j)) {
        (Some(q), Some(v)) if v > q => MergeStep::AdvanceOld,
        (Some(q), Some(v)) if v < q => MergeStep::InsertNew,
        (Some(_), Some(_)) => MergeStep::Equal,
        (Some(_), None) => MergeStep::AdvanceOld,
        (None, Some(_)) => MergeStep::InsertNew,
        (None, None) => MergeStep::Done,
    }
}

/// Piecewise-linear cdf under construction, as absolute frequencies.
struct MergedCdf<'a> {
    criterion: &'a str,
    xs: Vec<f64>,
    fs: Vec<f64>,
}

impl MergedCdf<'_> {
    fn push(&mut self, x: f64, f: f64) -> Result<(), StoreError> {
        if let (Some(&last_x), Some(last_f)) = (self.xs.last(), self.fs.last_mut()) {
            if f < *last_f - 1e-9 || x < last_x {
                return Err(StoreError::NonMonotone {
                    criterion: self.criterion.to_string(),
                    value: x,
                });
            }
            if x == last_x {
                *last_f = last_f.max(f);
                return Ok(());
            }
        }
        self.xs.push(x);
        self.fs.push(f);
        Ok(())
    }
}

/// Old absolute cdf at `v`, where `old[i - 1] < v < old[i]`.
fn old_cdf_at(old: &[f64], old_freq: &[f64], i: usize, v: f64) -> f64 {
    if i == 0 {
        return 0.0;
    }
    if i >= old.len() {
        return old_freq[old_freq.len() - 1];
    }
    let (x0, x1) = (old[i - 1], old[i]);
    let (f0, f1) = (old_freq[i - 1], old_freq[i]);
    f0 + (v - x0) / (x1 - x0) * (f1 - f0)
}

/// Merge `new` (sorted) into the quantiles `old` summarizing `history`
/// observations, returning the normalized cdf points.
fn merge_batch(
    criterion: &str,
    old: &[f64],
    frequencies: &[f64],
    history: usize,
    new: &[f64],
) -> Result<(Vec<f64>, Vec<f64>), StoreError> {
    let scale = history as f64 + 1.0;
    let old_freq: Vec<f64> = frequencies.iter().map(|p| p * scale).collect();
    let mut cdf = MergedCdf {
        criterion,
        xs: Vec::with_capacity(old.len() + new.len()),
        fs: Vec::with_capacity(old.len() + new.len()),
    };
    let (mut i, mut j, mut inserted) = (0usize, 0usize, 0usize);
    loop {
        match next_step(old, i, new, j) {
            MergeStep::AdvanceOld => {
                cdf.push(old[i], old_freq[i] + inserted as f64)?;
                i += 1;
            }
            MergeStep::InsertNew => {
                inserted += 1;
                let v = new[j];
                cdf.push(v, old_cdf_at(old, &old_freq, i, v) + inserted as f64)?;
                j += 1;
            }
            MergeStep::Equal => {
                inserted += 1;
                j += 1;
            }
            MergeStep::Done => break,
        }
    }
    let MergedCdf { xs, mut fs, .. } = cdf;
    let total = fs.last().copied().unwrap_or(1.0);
    if total > 0.0 {
        for f in &mut fs {
            *f /= total;
        }
    }
    Ok((xs, fs))
}

/// Values at `frequencies` on the cdf `(xs, fs)` by inverse interpolation.
fn resample(xs: &[f64], fs: &[f64], frequencies: &[f64]) -> Vec<f64> {
    frequencies
        .iter()
        .map(|p| {
            let k = fs.partition_point(|f| f < p);
            if k == 0 {
                xs[0]
            } else if k >= xs.len() {
                xs[xs.len() - 1]
            } else {
                let (f0, f1) = (fs[k - 1], fs[k]);
                if f1 > f0 {
                    xs[k - 1] + (p - f0) / (f1 - f0) * (xs[k] - xs[k - 1])
                } else {
                    xs[k]
                }
            }
        })
        .collect()
}

/// Limiting quantiles of sorted `values`: with `r = n p` and `rq = floor(r)`,
/// `values[rq] + (r - rq) (values[rq + 1] - values[rq])`, or the last value
/// once `rq + 1` runs past the end.
fn sample_quantiles(values: &[f64], frequencies: &[f64]) -> Vec<f64> {
    let n = values.len();
    frequencies
        .iter()
        .map(|p| {
            let r = n as f64 * p;
            let rq = r.floor() as usize;
            if rq + 1 < n {
                values[rq] + (r - rq as f64) * (values[rq + 1] - values[rq])
            } else {
                values[n - 1]
            }
        })
        .collect()
}

/// Linear interpolation of `ys` over increasing `xs`, clamped at the ends.
fn interpolate(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let k = xs.partition_point(|v| *v < x);
    if k == 0 {
        return ys[0];
    }
    if k >= xs.len() {
        return ys[ys.len() - 1];
    }
    if xs[k] == x {
        return ys[k];
    }
    let (x0, x1) = (xs[k - 1], xs[k]);
    ys[k - 1] + (x - x0) / (x1 - x0) * (ys[k] - ys[k - 1])
}

fn store_sign(criterion: &Criterion, convention: WeightConvention) -> f64 {
    if convention == WeightConvention::Signed
        && criterion.preference_direction == PreferenceDirection::Min
    {
        -1.0
    } else {
        1.0
    }
}

fn oriented_sorted(
    column: &[Option<f64>],
    criterion: &Criterion,
    convention: WeightConvention,
) -> Vec<f64> {
    let sign = store_sign(criterion, convention);
    let mut values: Vec<f64> = column.iter().flatten().map(|v| sign * v).collect();
    values.sort_by(f64::total_cmp);
    values
}

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceQuantilesStore {
    kind: TableauKind,
    objectives: Vec<Objective>,
    criteria: Vec<Criterion>,
    frequencies: Vec<f64>,
    limiting_quantiles: BTreeMap<String, Vec<f64>>,
    history_sizes: BTreeMap<String, usize>,
    min_values: BTreeMap<String, f64>,
    max_values: BTreeMap<String, f64>,
    lower_closed: bool,
    convention: WeightConvention,
    generation: GenerationProfile,
    na: f64,
}

impl PerformanceQuantilesStore {
    pub fn from_tableau(
        tableau: &TableauModel,
        bins: QuantileBins,
        lower_closed: bool,
    ) -> Result<Self, StoreError> {
        let mut store = Self {
            kind: tableau.kind,
            objectives: tableau.objectives.clone(),
            criteria: tableau.criteria.clone(),
            frequencies: bins.frequencies(),
            limiting_quantiles: BTreeMap::new(),
            history_sizes: BTreeMap::new(),
            min_values: BTreeMap::new(),
            max_values: BTreeMap::new(),
            lower_closed,
            convention: tableau.convention,
            generation: tableau.generation.clone(),
            na: tableau.na,
        };
        for (criterion, row) in tableau.criteria.iter().zip(&tableau.evaluation) {
            let values = oriented_sorted(row, criterion, tableau.convention);
            store.seed_criterion(&criterion.id, &values);
        }
        debug!(
            criteria = store.criteria.len(),
            bins = bins.count(),
            "seeded performance quantiles"
        );
        Ok(store)
    }

    fn seed_criterion(&mut self, id: &str, sorted: &[f64]) {
        let quantiles = if sorted.is_empty() {
            Vec::new()
        } else {
            self.min_values.insert(id.to_string(), sorted[0]);
            self.max_values.insert(id.to_string(), sorted[sorted.len() - 1]);
            sample_quantiles(sorted, &self.frequencies)
        };
        self.limiting_quantiles.insert(id.to_string(), quantiles);
        self.history_sizes.insert(id.to_string(), sorted.len());
    }

    pub fn kind(&self) -> TableauKind {
        self.kind
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn criterion_ids(&self) -> Vec<&str> {
        self.criteria.iter().map(|g| g.id.as_str()).collect()
    }

    pub fn objectives(&self) -> &[Objective] {
        &self.objectives
    }

    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    pub fn lower_closed(&self) -> bool {
        self.lower_closed
    }

    pub fn convention(&self) -> WeightConvention {
        self.convention
    }

    pub fn generation(&self) -> &GenerationProfile {
        &self.generation
    }

    pub fn na(&self) -> f64 {
        self.na
    }

    pub fn limiting_quantiles(&self, criterion: &str) -> Option<&[f64]> {
        self.limiting_quantiles.get(criterion).map(Vec::as_slice)
    }

    pub fn history_size(&self, criterion: &str) -> Option<usize> {
        self.history_sizes.get(criterion).copied()
    }

    pub fn min_value(&self, criterion: &str) -> Option<f64> {
        self.min_values.get(criterion).copied()
    }

    pub fn max_value(&self, criterion: &str) -> Option<f64> {
        self.max_values.get(criterion).copied()
    }

    fn quantiles_of(&self, criterion: &str) -> Result<&[f64], StoreError> {
        let q = self
            .limiting_quantiles
            .get(criterion)
            .ok_or_else(|| StoreError::UnknownCriterion(criterion.to_string()))?;
        if q.is_empty() {
            return Err(StoreError::EmptyCriterion(criterion.to_string()));
        }
        Ok(q)
    }

    /// Value of every observed criterion at cumulative frequency `p`.
    pub fn quantile_profile(&self, p: f64) -> BTreeMap<String, f64> {
        let p = p.clamp(0.0, 1.0);
        self.limiting_quantiles
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(id, q)| (id.clone(), interpolate(&self.frequencies, q, p)))
            .collect()
    }

    /// Estimated cumulative frequency of `x` on `criterion`.
    pub fn cdf(&self, criterion: &str, x: f64) -> Result<f64, StoreError> {
        let q = self.quantiles_of(criterion)?;
        let f = &self.frequencies;
        if x < q[0] {
            return Ok(0.0);
        }
        if x >= q[q.len() - 1] {
            return Ok(1.0);
        }
        let k = q.partition_point(|v| *v <= x);
        let lo = k - 1;
        Ok(f[lo] + (x - q[lo]) / (q[k] - q[lo]) * (f[k] - f[lo]))
    }

    /// Bin of `x` on `criterion`, from 0 to `bins - 1`.
    ///
    /// Lower-closed bins are `[q_i, q_i+1)`, upper-closed ones `(q_i, q_i+1]`;
    /// values beyond the extremes fall in the outer bins.
    pub fn quantile_class(&self, criterion: &str, x: f64) -> Result<usize, StoreError> {
        let q = self.quantiles_of(criterion)?;
        let inner = &q[1..q.len() - 1];
        let class = if self.lower_closed {
            inner.iter().filter(|b| **b <= x).count()
        } else {
            inner.iter().filter(|b| **b < x).count()
        };
        Ok(class)
    }

    /// Merge a batch of new actions into every criterion.
    ///
    /// `history_size` overrides the weight of the current state, counted in
    /// observations; `Some(0)` re-seeds each criterion from the batch alone.
    /// Missing evaluations are skipped.
    pub fn update_quantiles(
        &mut self,
        batch: &ActionBatch,
        history_size: Option<usize>,
    ) -> Result<(), StoreError> {
        let criteria = self.criteria.clone();
        for criterion in &criteria {
            let id = criterion.id.as_str();
            let values = batch
                .column(id)
                .map(|col| oriented_sorted(col, criterion, batch.convention))
                .unwrap_or_default();
            let current = self.history_sizes.get(id).copied().unwrap_or(0);
            let history = history_size.unwrap_or(current);

            if values.is_empty() {
                self.history_sizes.insert(id.to_string(), history);
                continue;
            }
            let old = self.limiting_quantiles.get(id).cloned().unwrap_or_default();
            if history == 0 || old.is_empty() {
                self.seed_criterion(id, &values);
                continue;
            }

            let (xs, fs) = merge_batch(id, &old, &self.frequencies, history, &values)?;
            let mut quantiles = resample(&xs, &fs, &self.frequencies);
            let lowest = xs[0];
            let highest = xs[xs.len() - 1];
            if let Some(first) = quantiles.first_mut() {
                *first = lowest;
            }
            if let Some(last) = quantiles.last_mut() {
                *last = highest;
            }
            if let Some(w) = quantiles.windows(2).find(|w| w[1] < w[0]) {
                return Err(StoreError::NonMonotone {
                    criterion: id.to_string(),
                    value: w[1],
                });
            }
            self.limiting_quantiles.insert(id.to_string(), quantiles);
            self.history_sizes
                .insert(id.to_string(), history + values.len());
            self.min_values.insert(id.to_string(), lowest);
            self.max_values.insert(id.to_string(), highest);
        }
        debug!(actions = batch.len(), "updated performance quantiles");
        Ok(())
    }

    /// Persist as JSON; `digits` rounds stored values, `None` keeps full
    /// precision so that a reload reads back identical profiles.
    pub fn save(&self, path: impl AsRef<Path>, digits: Option<u32>) -> Result<(), StoreError> {
        let round = |x: f64| digits.map_or(x, |d| round_to(x, d));
        let round_map = |m: &BTreeMap<String, f64>| -> BTreeMap<String, f64> {
            m.iter().map(|(k, v)| (k.clone(), round(*v))).collect()
        };
        let record = StoreRecord {
            perf_tab_type: self.kind,
            objectives: self.objectives.clone(),
            objective_supporting_types: self.kind.supporting_types().to_vec(),
            ordinal_scales: self.generation.ordinal_scales,
            big_data: self.generation.big_data,
            missing_data_probability: self.generation.missing_data_probability,
            common_scale: self.generation.common_scale,
            criteria: self.criteria.clone(),
            quantiles_frequencies: self.frequencies.clone(),
            history_sizes: self.history_sizes.clone(),
            lower_closed: self.lower_closed,
            limiting_quantiles: self
                .limiting_quantiles
                .iter()
                .map(|(k, q)| (k.clone(), q.iter().map(|v| round(*v)).collect()))
                .collect(),
            value_digits: self.generation.value_digits,
            common_mode: self.generation.common_mode.clone(),
            min_values: round_map(&self.min_values),
            max_values: round_map(&self.max_values),
            convention: self.convention,
            na: self.na,
        };
        fs::write(path, serde_json::to_string_pretty(&record)?)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let raw = fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;
        for key in REQUIRED_KEYS {
            if value.get(key).is_none() {
                return Err(StoreError::MissingKey(key));
            }
        }
        let record: StoreRecord = serde_json::from_value(value)?;
        Self::from_record(record)
    }

    fn from_record(record: StoreRecord) -> Result<Self, StoreError> {
        let frequencies = record.quantiles_frequencies;
        let well_formed = frequencies.len() >= 2
            && frequencies[0] == 0.0
            && frequencies[frequencies.len() - 1] == 1.0
            && frequencies.windows(2).all(|w| w[0] < w[1]);
        if !well_formed {
            return Err(StoreError::InvalidFrequencies);
        }
        for id in record.limiting_quantiles.keys() {
            if !record.criteria.iter().any(|g| &g.id == id) {
                return Err(StoreError::UnknownCriterion(id.clone()));
            }
        }

        let mut limiting_quantiles = record.limiting_quantiles;
        let mut history_sizes = record.history_sizes;
        for criterion in &record.criteria {
            let id = &criterion.id;
            let q = limiting_quantiles.entry(id.clone()).or_default();
            if !q.is_empty() && q.len() != frequencies.len() {
                return Err(StoreError::LengthMismatch {
                    criterion: id.clone(),
                    expected: frequencies.len(),
                    got: q.len(),
                });
            }
            if q.iter().any(|v| *v == record.na) {
                return Err(StoreError::NotAllowedNa {
                    criterion: id.clone(),
                    field: "limitingQuantiles",
                });
            }
            if q.windows(2).any(|w| w[1] < w[0]) {
                return Err(StoreError::DecreasingQuantiles(id.clone()));
            }
            history_sizes.entry(id.clone()).or_insert(0);
        }
        for (field, values) in [("minValues", &record.min_values), ("maxValues", &record.max_values)] {
            if let Some((id, _)) = values.iter().find(|(_, v)| **v == record.na) {
                return Err(StoreError::NotAllowedNa {
                    criterion: id.clone(),
                    field,
                });
            }
        }

        Ok(Self {
            kind: record.perf_tab_type,
            objectives: record.objectives,
            criteria: record.criteria,
            frequencies,
            limiting_quantiles,
            history_sizes,
            min_values: record.min_values,
            max_values: record.max_values,
            lower_closed: record.lower_closed,
            convention: record.convention,
            generation: GenerationProfile {
                common_mode: record.common_mode,
                value_digits: record.value_digits,
                missing_data_probability: record.missing_data_probability,
                big_data: record.big_data,
                ordinal_scales: record.ordinal_scales,
                common_scale: record.common_scale,
                seed: None,
            },
            na: record.na,
        })
    }
}

fn default_value_digits() -> u32 {
    2
}

fn default_na() -> f64 {
    DEFAULT_NA
}

/// Persisted form of a [`PerformanceQuantilesStore`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreRecord {
    perf_tab_type: TableauKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    objectives: Vec<Objective>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    objective_supporting_types: Vec<ActionType>,
    #[serde(rename = "OrdinalScales")]
    ordinal_scales: bool,
    #[serde(rename = "BigData")]
    big_data: bool,
    missing_data_probability: f64,
    common_scale: Option<(f64, f64)>,
    criteria: Vec<Criterion>,
    quantiles_frequencies: Vec<f64>,
    history_sizes: BTreeMap<String, usize>,
    #[serde(rename = "LowerClosed")]
    lower_closed: bool,
    limiting_quantiles: BTreeMap<String, Vec<f64>>,
    #[serde(default = "default_value_digits")]
    value_digits: u32,
    #[serde(default)]
    common_mode: LawSpec,
    #[serde(default)]
    min_values: BTreeMap<String, f64>,
    #[serde(default)]
    max_values: BTreeMap<String, f64>,
    #[serde(default)]
    convention: WeightConvention,
    #[serde(rename = "NA", default = "default_na")]
    na: f64,
}
