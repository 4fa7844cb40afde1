//! More actions drawn from the laws of an existing tableau.
//!
//! An [`IncrementalGenerator`] replays the per-criterion laws of a seed
//! tableau (or of the criteria kept in a quantile store), including the
//! type-dependent laws of the academic, cost/benefit, three-objectives and
//! coalition variants. Its batches feed
//! [`PerformanceQuantilesStore::update_quantiles`].

use std::collections::BTreeMap;

use tracing::debug;

use crate::generators::academic::{student_law, student_types};
use crate::generators::coalitions::coalition_types;
use crate::generators::cost_benefit::action_types;
use crate::generators::three_objectives::{draw_profile, profile_types};
use crate::generators::{draw_cell, finish_value, typed_law, GeneratorError};
use crate::law::{Law, LawSpec};
use crate::quantiles::PerformanceQuantilesStore;
use crate::rng::{master_seed, NumericRng, Pmf, RngStream};
use crate::tableau::{
    digits, padded_id, Action, ActionBatch, ActionType, Criterion, GenerationProfile, Objective,
    TableauKind, TableauModel, WeightConvention,
};

/// One new action and its evaluation on every criterion.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomAction {
    pub action: Action,
    /// Criterion id to stored value, `None` when missing.
    pub evaluation: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Clone)]
pub struct IncrementalGenerator {
    kind: TableauKind,
    name: String,
    criteria: Vec<Criterion>,
    objectives: Vec<Objective>,
    convention: WeightConvention,
    generation: GenerationProfile,
    na: f64,
    counter: usize,
    width: usize,
    prefix: String,
    instance: Option<usize>,
    rng: NumericRng,
}

fn default_prefix(kind: TableauKind) -> &'static str {
    match kind {
        TableauKind::Academic => "s",
        _ => "a",
    }
}

fn action_label(kind: TableauKind) -> &'static str {
    match kind {
        TableauKind::Academic => "student",
        TableauKind::Rank => "ranked action",
        TableauKind::CostBenefit => "random cost/benefit action",
        TableauKind::ThreeObjectives => "random public policy",
        TableauKind::Standard | TableauKind::Coalitions => "random decision action",
    }
}

fn default_name(kind: TableauKind) -> &'static str {
    match kind {
        TableauKind::Standard => "randomPerformanceTableau",
        TableauKind::Rank => "randomRankPerformanceTableau",
        TableauKind::Academic => "randomAcademicPerformanceTableau",
        TableauKind::CostBenefit => "randomCBPerformanceTableau",
        TableauKind::ThreeObjectives => "random3ObjectivesPerformanceTableau",
        TableauKind::Coalitions => "randomCoalitionsPerformanceTableau",
    }
}

impl IncrementalGenerator {
    /// Continue `model`: new keys count on from its last action.
    pub fn new(model: &TableauModel, seed: Option<u64>) -> Self {
        let count = model.actions.len();
        Self {
            kind: model.kind,
            name: model.name.clone(),
            criteria: model.criteria.clone(),
            objectives: model.objectives.clone(),
            convention: model.convention,
            generation: model.generation.clone(),
            na: model.na,
            counter: count,
            width: digits(count),
            prefix: default_prefix(model.kind).to_string(),
            instance: None,
            rng: NumericRng::stream(master_seed(seed), RngStream::Incremental),
        }
    }

    /// Continue the history of `store`; keys count on from its largest
    /// history size.
    pub fn from_store(store: &PerformanceQuantilesStore, seed: Option<u64>) -> Self {
        let count = store
            .criteria()
            .iter()
            .filter_map(|g| store.history_size(&g.id))
            .max()
            .unwrap_or(0);
        Self {
            kind: store.kind(),
            name: default_name(store.kind()).to_string(),
            criteria: store.criteria().to_vec(),
            objectives: store.objectives().to_vec(),
            convention: store.convention(),
            generation: store.generation().clone(),
            na: store.na(),
            counter: count,
            width: digits(count),
            prefix: default_prefix(store.kind()).to_string(),
            instance: None,
            rng: NumericRng::stream(master_seed(seed), RngStream::Incremental),
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Keys become `{prefix}{instance}_{n}`, keeping several generators over
    /// the same seed apart.
    pub fn with_instance_counter(mut self, instance: usize) -> Self {
        self.instance = Some(instance);
        self
    }

    /// Number of the last action emitted (or of the seed's last action).
    pub fn counter(&self) -> usize {
        self.counter
    }

    /// Widen the key padding so the next `k` keys share one width.
    fn reserve(&mut self, k: usize) {
        self.width = self.width.max(digits(self.counter + k));
    }

    fn next_key(&mut self) -> String {
        self.reserve(1);
        self.counter += 1;
        match self.instance {
            Some(i) => padded_id(&format!("{}{i}_", self.prefix), self.counter, self.width),
            None => padded_id(&self.prefix, self.counter, self.width),
        }
    }

    fn common_mode<'a>(&'a self, criterion: &'a Criterion) -> &'a LawSpec {
        criterion
            .random_mode
            .as_ref()
            .unwrap_or(&self.generation.common_mode)
    }

    /// Law of `criterion` for an action tagged like `action`.
    fn law_for(&self, criterion: &Criterion, action: &Action) -> Result<Law, GeneratorError> {
        let spec = self.common_mode(criterion);
        let scale = criterion.scale;
        match self.kind {
            TableauKind::Standard | TableauKind::Rank => Ok(spec.resolve(scale.min, scale.max)?),
            TableauKind::Academic => {
                student_law(spec, action.type_tag.unwrap_or(ActionType::Fair), scale)
            }
            TableauKind::CostBenefit => {
                typed_law(spec, action.type_tag.unwrap_or(ActionType::Neutral), scale)
            }
            TableauKind::ThreeObjectives | TableauKind::Coalitions => {
                let fallback = if self.kind == TableauKind::Coalitions {
                    ActionType::Indifferent
                } else {
                    ActionType::Fair
                };
                let ty = criterion
                    .objective
                    .as_ref()
                    .and_then(|o| action.profile.get(o))
                    .copied()
                    .unwrap_or(fallback);
                typed_law(spec, ty, scale)
            }
        }
    }

    fn tag(&mut self, action: &mut Action) -> Result<(), GeneratorError> {
        let objective_ids: Vec<String> = self.objectives.iter().map(|o| o.id.clone()).collect();
        match self.kind {
            TableauKind::Standard | TableauKind::Rank => {}
            TableauKind::Academic => {
                action.type_tag = Some(*self.rng.categorical(&student_types()?));
            }
            TableauKind::CostBenefit => {
                action.type_tag = Some(*self.rng.categorical(&action_types()?));
            }
            TableauKind::ThreeObjectives => {
                let types: Pmf<ActionType> = profile_types()?;
                action.profile = draw_profile(&objective_ids, &types, &mut self.rng);
            }
            TableauKind::Coalitions => {
                let types = coalition_types()?;
                action.profile = draw_profile(&objective_ids, &types, &mut self.rng);
            }
        }
        Ok(())
    }

    /// Draw one more action.
    pub fn random_action(&mut self) -> Result<RandomAction, GeneratorError> {
        let key = self.next_key();
        let mut action = Action::new(key);
        if !self.generation.big_data {
            action.name = format!("{} #{}", action_label(self.kind), self.counter);
        }
        self.tag(&mut action)?;

        let criteria = self.criteria.clone();
        let mut values = Vec::with_capacity(criteria.len());
        for criterion in &criteria {
            let value = if self.kind == TableauKind::Rank {
                let raw = self.rng.uniform_int(1, criterion.scale.max.max(1.0) as i64) as f64;
                finish_value(raw, criterion, self.convention, 0)
            } else {
                let law = self.law_for(criterion, &action)?;
                draw_cell(
                    law,
                    &mut action,
                    criterion,
                    self.convention,
                    self.generation.value_digits,
                    self.generation.big_data,
                    &mut self.rng,
                )?
            };
            values.push(value);
        }

        let p = self.generation.missing_data_probability;
        let evaluation = criteria
            .iter()
            .zip(values)
            .map(|(criterion, value)| {
                let cell = if self.rng.chance(p) { None } else { Some(value) };
                (criterion.id.clone(), cell)
            })
            .collect();
        Ok(RandomAction { action, evaluation })
    }

    /// `k` new actions, column-wise per criterion.
    pub fn random_actions(&mut self, k: usize) -> Result<ActionBatch, GeneratorError> {
        let mut batch = ActionBatch {
            actions: Vec::with_capacity(k),
            criteria: self.criteria.iter().map(|g| g.id.clone()).collect(),
            evaluation: vec![Vec::with_capacity(k); self.criteria.len()],
            convention: self.convention,
        };
        self.reserve(k);
        for _ in 0..k {
            let RandomAction { action, evaluation } = self.random_action()?;
            for (row, id) in batch.evaluation.iter_mut().zip(&batch.criteria) {
                row.push(evaluation.get(id).copied().flatten());
            }
            batch.actions.push(action);
        }
        debug!(
            kind = ?self.kind,
            actions = k,
            counter = self.counter,
            "drew incremental actions"
        );
        Ok(batch)
    }

    /// `k` new actions as a tableau with the seed's criteria and objectives.
    pub fn random_performance_tableau(&mut self, k: usize) -> Result<TableauModel, GeneratorError> {
        let batch = self.random_actions(k)?;
        Ok(TableauModel {
            kind: self.kind,
            name: self.name.clone(),
            actions: batch.actions,
            criteria: self.criteria.clone(),
            objectives: self.objectives.clone(),
            evaluation: batch.evaluation,
            na: self.na,
            convention: self.convention,
            generation: self.generation.clone(),
            truncation_fallbacks: self.rng.truncation_fallbacks(),
        })
    }
}
