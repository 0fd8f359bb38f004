use std::collections::BTreeMap;

use tracing::warn;

use crate::selector::best::BestChoice;
use crate::selector::scoring::ScoreTable;

#[derive(Debug, Clone, PartialEq)]
pub struct SwitchDecision {
    pub route: String,
    pub from_interface: String,
    pub to_interface: String,
    pub current_score: f64,
    pub best_score: f64,
    pub switch_cost: f64,
}

/// Stateless per-pass transition rule. For each configured route, emits a
/// switch decision only when the best interface beats the current one by
/// strictly more than the route's switch cost. Routes with incomplete data
/// (no live route, no candidate, or an unscored current interface) are left
/// alone with a warning.
pub fn plan_switches(
    scores: &ScoreTable,
    current: &BTreeMap<String, String>,
    best: &BTreeMap<String, BestChoice>,
    switch_costs: &BTreeMap<String, f64>,
) -> Vec<SwitchDecision> {
    let mut decisions = Vec::new();

    for (route, switch_cost) in switch_costs {
        let Some(current_interface) = current.get(route) else {
            warn!("route {route}: not present in the live routing table, keeping hands off");
            continue;
        };
        let Some(choice) = best.get(route) else {
            warn!("route {route}: no interface produced a score this pass");
            continue;
        };
        if &choice.interface == current_interface {
            continue;
        }
        let Some(current_score) = scores.get(current_interface, route) else {
            warn!(
                "route {route}: current interface {current_interface} was not scored this pass"
            );
            continue;
        };

        if choice.score + switch_cost < current_score {
            decisions.push(SwitchDecision {
                route: route.clone(),
                from_interface: current_interface.clone(),
                to_interface: choice.interface.clone(),
                current_score,
                best_score: choice.score,
                switch_cost: *switch_cost,
            });
        }
    }

    decisions
}
