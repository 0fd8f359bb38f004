use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::measure::ProbeResult;

/// Score contributed by a target whose probe route could not be installed.
/// Such targets were never measured, so they add no weight.
pub const UNMEASURED_PENALTY: f64 = 1000.0;

pub fn target_score(loss_mult: f64, lag_mult: f64, result: &ProbeResult) -> f64 {
    loss_mult * result.loss_fraction + lag_mult * result.latency_ms
}

/// Accumulates per-target contributions into one route score for one
/// interface: weighted mean over measured targets, with the historical
/// raw-sum fallback when no target contributed weight.
#[derive(Debug, Default, Clone, Copy)]
pub struct RouteAggregate {
    score_sum: f64,
    weight_sum: f64,
}

impl RouteAggregate {
    pub fn add_measured(&mut self, score: f64, weight: f64) {
        self.score_sum += score * weight;
        self.weight_sum += weight;
    }

    pub fn add_unmeasured(&mut self) {
        self.score_sum += UNMEASURED_PENALTY;
    }

    pub fn finish(&self) -> f64 {
        if self.weight_sum > 0.0 {
            self.score_sum / self.weight_sum
        } else {
            self.score_sum
        }
    }
}

/// Route scores keyed by interface, then by route. BTreeMap-backed so every
/// consumer iterates in one deterministic order.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ScoreTable {
    by_interface: BTreeMap<String, BTreeMap<String, f64>>,
}

impl ScoreTable {
    pub fn insert(&mut self, interface: &str, route: &str, score: f64) {
        self.by_interface
            .entry(interface.to_string())
            .or_default()
            .insert(route.to_string(), score);
    }

    pub fn get(&self, interface: &str, route: &str) -> Option<f64> {
        self.by_interface.get(interface)?.get(route).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, f64>)> {
        self.by_interface.iter()
    }
}
