use std::collections::BTreeMap;

use serde::Serialize;

use crate::selector::scoring::ScoreTable;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BestChoice {
    pub interface: String,
    pub score: f64,
}

/// Picks the lowest-scoring interface for every route present in the table.
/// Ties resolve to the lexicographically smallest interface name: the table
/// iterates interfaces in sorted order and a champion is only replaced on a
/// strictly smaller score.
pub fn best_interfaces(scores: &ScoreTable) -> BTreeMap<String, BestChoice> {
    let mut best: BTreeMap<String, BestChoice> = BTreeMap::new();
    for (interface, routes) in scores.iter() {
        for (route, score) in routes {
            let replace = match best.get(route) {
                Some(current) => *score < current.score,
                None => true,
            };
            if replace {
                best.insert(
                    route.clone(),
                    BestChoice {
                        interface: interface.clone(),
                        score: *score,
                    },
                );
            }
        }
    }
    best
}
