//! Performance tableau data model.
//!
//! A [`TableauModel`] is created fully formed by a generator and is read-only
//! afterwards. Missing evaluations are `None` in memory; the numeric NA
//! sentinel only exists in the persisted [`TableauRecord`].

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, Median, Statistics};
use thiserror::Error;

use crate::law::{Law, LawSpec};
use crate::quantiles::{PerformanceQuantilesStore, QuantileBins, StoreError};

/// Default NA sentinel of persisted tableaux.
pub const DEFAULT_NA: f64 = -999.0;

#[derive(Debug, Error)]
pub enum TableauError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("unknown criterion {0}")]
    UnknownCriterion(String),
    #[error("criterion {criterion}: thresholds are not ordered (indifference <= preference <= weak veto <= veto)")]
    UnorderedThresholds { criterion: String },
    #[error("criterion {criterion}: ordinal evaluation {value} of action {action} is not an integer in scale")]
    OrdinalOutOfScale {
        criterion: String,
        action: String,
        value: f64,
    },
    #[error("evaluation matrix is {rows}x{cols}, expected {criteria}x{actions}")]
    ShapeMismatch {
        rows: usize,
        cols: usize,
        criteria: usize,
        actions: usize,
    },
    #[error("evaluation {value} of action {action} on {criterion} collides with the NA sentinel")]
    NaCollision {
        criterion: String,
        action: String,
        value: f64,
    },
    #[error("stored sum of weights {stored} differs from the criteria weights sum {computed}")]
    SumWeightsMismatch { stored: f64, computed: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferenceDirection {
    Max,
    Min,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleType {
    Cardinal,
    Ordinal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scale {
    pub min: f64,
    pub max: f64,
}

impl Scale {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }

    /// Point at `fraction` of the span above `min`.
    pub fn at(&self, fraction: f64) -> f64 {
        self.min + fraction * self.span()
    }
}

/// How weights and preference directions are exported.
///
/// Chosen once per tableau.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightConvention {
    /// Weights are non-negative; evaluations of `min` criteria are stored
    /// negated so that larger is always better.
    #[default]
    NonNegative,
    /// `min` criteria export a negative weight; evaluations are stored raw.
    Signed,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    pub constant: f64,
    pub slope: f64,
}

impl Threshold {
    pub fn constant(constant: f64) -> Self {
        Self {
            constant,
            slope: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ThresholdKind {
    Indifference,
    Preference,
    WeakVeto,
    Veto,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thresholds {
    pub indifference: Threshold,
    pub preference: Threshold,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weak_veto: Option<Threshold>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub veto: Option<Threshold>,
}

impl Thresholds {
    pub fn get(&self, kind: ThresholdKind) -> Option<Threshold> {
        match kind {
            ThresholdKind::Indifference => Some(self.indifference),
            ThresholdKind::Preference => Some(self.preference),
            ThresholdKind::WeakVeto => self.weak_veto,
            ThresholdKind::Veto => self.veto,
        }
    }

    /// Whether the constants are ordered ind <= pref <= weak veto <= veto.
    pub fn is_ordered(&self) -> bool {
        let mut chain = vec![self.indifference.constant, self.preference.constant];
        chain.extend(self.weak_veto.map(|t| t.constant));
        chain.extend(self.veto.map(|t| t.constant));
        chain.windows(2).all(|w| w[0] <= w[1])
    }
}

/// Thresholds given as `(percent of scale span, slope)` pairs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdPercents {
    pub indifference: (f64, f64),
    pub preference: (f64, f64),
    #[serde(default)]
    pub weak_veto: Option<(f64, f64)>,
    #[serde(default)]
    pub veto: Option<(f64, f64)>,
}

impl ThresholdPercents {
    pub fn new(indifference: f64, preference: f64, veto: f64) -> Self {
        Self {
            indifference: (indifference, 0.0),
            preference: (preference, 0.0),
            weak_veto: None,
            veto: Some((veto, 0.0)),
        }
    }

    /// Constants scaled to `scale`: `pct / 100 * span`.
    pub fn on_scale(&self, scale: Scale) -> Thresholds {
        let to = |(pct, slope): (f64, f64)| Threshold {
            constant: pct / 100.0 * scale.span(),
            slope,
        };
        Thresholds {
            indifference: to(self.indifference),
            preference: to(self.preference),
            weak_veto: self.weak_veto.map(to),
            veto: self.veto.map(to),
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.on_scale(Scale::new(0.0, 100.0)).is_ordered()
    }
}

/// Per-action tag that selects the sub-law of its evaluations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ActionType {
    #[serde(rename = "weak")]
    Weak,
    #[serde(rename = "fair")]
    Fair,
    #[serde(rename = "good")]
    Good,
    #[serde(rename = "excellent")]
    Excellent,
    #[serde(rename = "cheap")]
    Cheap,
    #[serde(rename = "neutral")]
    Neutral,
    #[serde(rename = "advantageous")]
    Advantageous,
    #[serde(rename = "+")]
    Supporting,
    #[serde(rename = "~")]
    Indifferent,
    #[serde(rename = "-")]
    Opposing,
}

impl ActionType {
    pub fn label(&self) -> &'static str {
        match self {
            ActionType::Weak => "weak",
            ActionType::Fair => "fair",
            ActionType::Good => "good",
            ActionType::Excellent => "excellent",
            ActionType::Cheap => "cheap",
            ActionType::Neutral => "neutral",
            ActionType::Advantageous => "advantageous",
            ActionType::Supporting => "+",
            ActionType::Indifferent => "~",
            ActionType::Opposing => "-",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TableauKind {
    Standard,
    Rank,
    Academic,
    CostBenefit,
    ThreeObjectives,
    Coalitions,
}

impl TableauKind {
    /// Tags an action may carry in tableaux of this kind.
    pub fn supporting_types(&self) -> &'static [ActionType] {
        match self {
            TableauKind::Standard | TableauKind::Rank => &[],
            TableauKind::Academic => &[
                ActionType::Weak,
                ActionType::Fair,
                ActionType::Good,
                ActionType::Excellent,
            ],
            TableauKind::CostBenefit => &[
                ActionType::Cheap,
                ActionType::Neutral,
                ActionType::Advantageous,
            ],
            TableauKind::ThreeObjectives => &[ActionType::Weak, ActionType::Fair, ActionType::Good],
            TableauKind::Coalitions => &[
                ActionType::Supporting,
                ActionType::Indifferent,
                ActionType::Opposing,
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Action {
    pub id: String,
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_tag: Option<ActionType>,
    /// Objective (or coalition) id to supporting type.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profile: BTreeMap<String, ActionType>,
    /// Criterion id to the law its evaluation was drawn from.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub generators: BTreeMap<String, Law>,
}

impl Action {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            type_tag: None,
            profile: BTreeMap::new(),
            generators: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Criterion {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub objective: Option<String>,
    pub preference_direction: PreferenceDirection,
    pub scale: Scale,
    pub scale_type: ScaleType,
    /// Unsigned significance; see [`Criterion::signed_weight`].
    pub weight: f64,
    pub thresholds: Thresholds,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_mode: Option<LawSpec>,
}

impl Criterion {
    /// Weight as exported under `convention`.
    pub fn signed_weight(&self, convention: WeightConvention) -> f64 {
        match (convention, self.preference_direction) {
            (WeightConvention::Signed, PreferenceDirection::Min) => -self.weight,
            _ => self.weight,
        }
    }

    /// Whether stored evaluations are the negated raw values.
    pub fn is_negated(&self, convention: WeightConvention) -> bool {
        convention == WeightConvention::NonNegative
            && self.preference_direction == PreferenceDirection::Min
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub id: String,
    pub name: String,
    pub criteria: Vec<String>,
    pub weight: f64,
}

/// How a tableau was drawn, so more actions can follow the same laws.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationProfile {
    pub common_mode: LawSpec,
    pub value_digits: u32,
    pub missing_data_probability: f64,
    #[serde(default)]
    pub big_data: bool,
    #[serde(default)]
    pub ordinal_scales: bool,
    pub common_scale: Option<(f64, f64)>,
    #[serde(default)]
    pub seed: Option<u64>,
}

/// Criteria sharing one weight.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightClass {
    pub weight: f64,
    pub criteria: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionStatistics {
    pub count: usize,
    pub missing: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

/// New actions with their evaluations, column-wise per criterion.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionBatch {
    pub actions: Vec<Action>,
    pub criteria: Vec<String>,
    /// `evaluation[c][a]` is the value of `actions[a]` on `criteria[c]`.
    pub evaluation: Vec<Vec<Option<f64>>>,
    pub convention: WeightConvention,
}

impl ActionBatch {
    pub fn column(&self, criterion: &str) -> Option<&[Option<f64>]> {
        let idx = self.criteria.iter().position(|g| g == criterion)?;
        self.evaluation.get(idx).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableauModel {
    pub kind: TableauKind,
    pub name: String,
    pub actions: Vec<Action>,
    pub criteria: Vec<Criterion>,
    pub objectives: Vec<Objective>,
    /// `evaluation[c][a]`: criterion-major, `None` when missing.
    pub evaluation: Vec<Vec<Option<f64>>>,
    pub na: f64,
    pub convention: WeightConvention,
    pub generation: GenerationProfile,
    /// Truncated-normal draws that fell back to a scale endpoint.
    pub truncation_fallbacks: usize,
}

impl TableauModel {
    pub fn criterion_index(&self, criterion: &str) -> Option<usize> {
        self.criteria.iter().position(|g| g.id == criterion)
    }

    pub fn action_index(&self, action: &str) -> Option<usize> {
        self.actions.iter().position(|x| x.id == action)
    }

    pub fn criterion(&self, criterion: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|g| g.id == criterion)
    }

    pub fn evaluation_of(&self, criterion: &str, action: &str) -> Option<f64> {
        let g = self.criterion_index(criterion)?;
        let x = self.action_index(action)?;
        self.evaluation[g][x]
    }

    /// Evaluation with missing values mapped to the NA sentinel.
    pub fn legacy_evaluation(&self, criterion: &str, action: &str) -> f64 {
        self.evaluation_of(criterion, action).unwrap_or(self.na)
    }

    pub fn sum_weights(&self) -> f64 {
        self.criteria.iter().map(|g| g.weight.abs()).sum()
    }

    /// Sum of member weights per objective, in objective order.
    pub fn objective_weights(&self) -> Vec<(String, f64)> {
        self.objectives
            .iter()
            .map(|o| {
                let w = self
                    .criteria
                    .iter()
                    .filter(|g| g.objective.as_deref() == Some(o.id.as_str()))
                    .map(|g| g.weight.abs())
                    .sum();
                (o.id.clone(), w)
            })
            .collect()
    }

    /// Criteria grouped by equal weight, lightest class first.
    pub fn compute_weight_preorder(&self) -> Vec<WeightClass> {
        let mut classes: Vec<WeightClass> = Vec::new();
        for g in &self.criteria {
            match classes.iter_mut().find(|c| c.weight == g.weight) {
                Some(class) => class.criteria.push(g.id.clone()),
                None => classes.push(WeightClass {
                    weight: g.weight,
                    criteria: vec![g.id.clone()],
                }),
            }
        }
        classes.sort_by(|a, b| a.weight.total_cmp(&b.weight));
        classes
    }

    /// Absolute evaluation differences over all unordered pairs of actions
    /// evaluated on `criterion`.
    pub fn compute_performance_differences(&self, criterion: &str) -> Option<Vec<f64>> {
        let g = self.criterion_index(criterion)?;
        let values: Vec<f64> = self.evaluation[g].iter().flatten().copied().collect();
        let mut diffs = Vec::with_capacity(values.len() * values.len().saturating_sub(1) / 2);
        for (i, x) in values.iter().enumerate() {
            for y in &values[i + 1..] {
                diffs.push((x - y).abs());
            }
        }
        Some(diffs)
    }

    /// Share of pairwise differences on `criterion` that do not exceed the
    /// constant part of the `kind` threshold.
    pub fn compute_threshold_percentile(
        &self,
        criterion: &str,
        kind: ThresholdKind,
    ) -> Option<f64> {
        let threshold = self.criterion(criterion)?.thresholds.get(kind)?;
        let diffs = self.compute_performance_differences(criterion)?;
        if diffs.is_empty() {
            return None;
        }
        let below = diffs.iter().filter(|d| **d <= threshold.constant).count();
        Some(below as f64 / diffs.len() as f64)
    }

    pub fn criterion_statistics(&self, criterion: &str) -> Option<CriterionStatistics> {
        let g = self.criterion_index(criterion)?;
        let values: Vec<f64> = self.evaluation[g].iter().flatten().copied().collect();
        if values.is_empty() {
            return None;
        }
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let std_dev = if values.len() > 1 {
            values.iter().std_dev()
        } else {
            0.0
        };
        Some(CriterionStatistics {
            count: values.len(),
            missing: self.actions.len() - values.len(),
            mean: values.iter().mean(),
            std_dev,
            median: Data::new(values.clone()).median(),
            min,
            max,
        })
    }

    /// Limiting quantiles of every criterion.
    pub fn compute_quantiles(
        &self,
        bins: QuantileBins,
        lower_closed: bool,
    ) -> Result<PerformanceQuantilesStore, StoreError> {
        PerformanceQuantilesStore::from_tableau(self, bins, lower_closed)
    }

    /// All actions and evaluations as a batch for quantile updates.
    pub fn to_batch(&self) -> ActionBatch {
        ActionBatch {
            actions: self.actions.clone(),
            criteria: self.criteria.iter().map(|g| g.id.clone()).collect(),
            evaluation: self.evaluation.clone(),
            convention: self.convention,
        }
    }

    pub fn check_invariants(&self) -> Result<(), TableauError> {
        let shape_ok = self.evaluation.len() == self.criteria.len()
            && self.evaluation.iter().all(|row| row.len() == self.actions.len());
        if !shape_ok {
            return Err(TableauError::ShapeMismatch {
                rows: self.evaluation.len(),
                cols: self.evaluation.first().map_or(0, Vec::len),
                criteria: self.criteria.len(),
                actions: self.actions.len(),
            });
        }
        for (g, row) in self.criteria.iter().zip(&self.evaluation) {
            if !g.thresholds.is_ordered() {
                return Err(TableauError::UnorderedThresholds {
                    criterion: g.id.clone(),
                });
            }
            if g.scale_type != ScaleType::Ordinal {
                continue;
            }
            let negated = g.is_negated(self.convention);
            for (x, value) in self.actions.iter().zip(row) {
                let Some(v) = *value else { continue };
                let raw = if negated { -v } else { v };
                if raw.fract() != 0.0 || raw < g.scale.min || raw > g.scale.max {
                    return Err(TableauError::OrdinalOutOfScale {
                        criterion: g.id.clone(),
                        action: x.id.clone(),
                        value: v,
                    });
                }
            }
        }
        Ok(())
    }

    /// blake3 digest of the persisted form, stable for a given seed.
    pub fn fingerprint(&self) -> Result<String, TableauError> {
        let bytes = serde_json::to_vec(&self.to_record()?)?;
        Ok(blake3::hash(&bytes).to_hex().to_string())
    }

    /// Persisted view: NA sentinel for missing values, legacy signed weights.
    pub fn to_record(&self) -> Result<TableauRecord, TableauError> {
        let mut evaluation = Vec::with_capacity(self.evaluation.len());
        for (g, row) in self.criteria.iter().zip(&self.evaluation) {
            let mut out = Vec::with_capacity(row.len());
            for (x, value) in self.actions.iter().zip(row) {
                match *value {
                    Some(v) if v == self.na => {
                        return Err(TableauError::NaCollision {
                            criterion: g.id.clone(),
                            action: x.id.clone(),
                            value: v,
                        })
                    }
                    Some(v) => out.push(v),
                    None => out.push(self.na),
                }
            }
            evaluation.push(out);
        }
        let criteria = self
            .criteria
            .iter()
            .map(|g| Criterion {
                weight: g.signed_weight(self.convention),
                ..g.clone()
            })
            .collect();
        Ok(TableauRecord {
            perf_tab_type: self.kind,
            name: self.name.clone(),
            actions: self.actions.clone(),
            criteria,
            objectives: self.objectives.clone(),
            evaluation,
            na: self.na,
            weight_convention: self.convention,
            sum_weights: self.sum_weights(),
            generation: self.generation.clone(),
            truncation_fallbacks: self.truncation_fallbacks,
        })
    }

    pub fn from_record(record: TableauRecord) -> Result<Self, TableauError> {
        let na = record.na;
        let evaluation: Vec<Vec<Option<f64>>> = record
            .evaluation
            .into_iter()
            .map(|row| {
                row.into_iter()
                    .map(|v| if v == na { None } else { Some(v) })
                    .collect()
            })
            .collect();
        let criteria: Vec<Criterion> = record
            .criteria
            .into_iter()
            .map(|g| Criterion {
                weight: g.weight.abs(),
                ..g
            })
            .collect();
        let model = Self {
            kind: record.perf_tab_type,
            name: record.name,
            actions: record.actions,
            criteria,
            objectives: record.objectives,
            evaluation,
            na,
            convention: record.weight_convention,
            generation: record.generation,
            truncation_fallbacks: record.truncation_fallbacks,
        };
        let computed = model.sum_weights();
        if (computed - record.sum_weights).abs() > 1e-9 {
            return Err(TableauError::SumWeightsMismatch {
                stored: record.sum_weights,
                computed,
            });
        }
        model.check_invariants()?;
        Ok(model)
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), TableauError> {
        let record = self.to_record()?;
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut writer, &record)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, TableauError> {
        let reader = BufReader::new(File::open(path)?);
        let record: TableauRecord = serde_json::from_reader(reader)?;
        Self::from_record(record)
    }
}

/// Declarative persisted form of a tableau.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableauRecord {
    pub perf_tab_type: TableauKind,
    pub name: String,
    pub actions: Vec<Action>,
    /// Weights carry the sign of the `weight_convention`.
    pub criteria: Vec<Criterion>,
    #[serde(default)]
    pub objectives: Vec<Objective>,
    pub evaluation: Vec<Vec<f64>>,
    #[serde(rename = "NA")]
    pub na: f64,
    pub weight_convention: WeightConvention,
    pub sum_weights: f64,
    pub generation: GenerationProfile,
    #[serde(default)]
    pub truncation_fallbacks: usize,
}

/// `"{prefix}{index}"` with `index` zero-padded to `width` digits.
pub fn padded_id(prefix: &str, index: usize, width: usize) -> String {
    format!("{prefix}{index:0width$}")
}

/// Decimal digits of `n` (at least 1).
pub fn digits(n: usize) -> usize {
    n.max(1).to_string().len()
}

/// Round half away from zero to `digits` decimals.
pub fn round_to(x: f64, digits: u32) -> f64 {
    let factor = 10f64.powi(digits as i32);
    (x * factor).round() / factor
}
