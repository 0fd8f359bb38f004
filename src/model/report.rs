use std::collections::BTreeMap;

use serde::Serialize;

use crate::selector::best::BestChoice;
use crate::selector::decision::SwitchDecision;
use crate::selector::scoring::ScoreTable;

/// Everything one evaluation pass observed and decided, in a form the
/// operator can inspect (`--once` prints this as JSON).
#[derive(Debug, Serialize)]
pub struct PassReport {
    pub scores: ScoreTable,
    pub current: BTreeMap<String, String>,
    pub best: BTreeMap<String, BestChoice>,
    pub decisions: Vec<DecisionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionRecord {
    pub route: String,
    pub from_interface: String,
    pub to_interface: String,
    pub current_score: f64,
    pub best_score: f64,
    pub switch_cost: f64,
    pub outcome: DecisionOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Applied,
    DryRun,
    Failed,
}

impl DecisionRecord {
    pub fn from_decision(decision: &SwitchDecision, outcome: DecisionOutcome) -> Self {
        Self {
            route: decision.route.clone(),
            from_interface: decision.from_interface.clone(),
            to_interface: decision.to_interface.clone(),
            current_score: decision.current_score,
            best_score: decision.best_score,
            switch_cost: decision.switch_cost,
            outcome,
        }
    }
}
