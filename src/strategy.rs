//! Ranking strategies for filtered placement candidates.
//!
//! The launch engine walks the ranked list and picks the first agent that
//! still holds offers, so order is the whole contract. Ties break on
//! agent id for determinism.

use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::agent::Agent;

pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    fn rank_and_sort(&self, agents: Vec<Arc<Agent>>) -> Vec<Arc<Agent>>;
}

/// Fewest running tasks first.
pub struct SpreadStrategy;

impl Strategy for SpreadStrategy {
    fn name(&self) -> &str {
        "spread"
    }

    fn rank_and_sort(&self, mut agents: Vec<Arc<Agent>>) -> Vec<Arc<Agent>> {
        agents.sort_by(|a, b| {
            a.task_count()
                .cmp(&b.task_count())
                .then_with(|| a.id().cmp(b.id()))
        });
        agents
    }
}

/// Most-utilized first: fill busy agents before touching idle ones.
pub struct BinpackStrategy;

impl Strategy for BinpackStrategy {
    fn name(&self) -> &str {
        "binpack"
    }

    fn rank_and_sort(&self, mut agents: Vec<Arc<Agent>>) -> Vec<Arc<Agent>> {
        agents.sort_by(|a, b| {
            let (a_cpus, a_mem, _, _) = a.resources();
            let (b_cpus, b_mem, _, _) = b.resources();
            // Fewer free resources ranks higher.
            (a_cpus, a_mem)
                .partial_cmp(&(b_cpus, b_mem))
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id().cmp(b.id()))
        });
        agents
    }
}

/// Uniformly random order.
pub struct RandomStrategy;

impl Strategy for RandomStrategy {
    fn name(&self) -> &str {
        "random"
    }

    fn rank_and_sort(&self, mut agents: Vec<Arc<Agent>>) -> Vec<Arc<Agent>> {
        agents.shuffle(&mut rand::thread_rng());
        agents
    }
}

/// Strategy by configured name; unknown names fall back to spread.
pub fn strategy_from_name(name: &str) -> Box<dyn Strategy> {
    match name {
        "binpack" => Box::new(BinpackStrategy),
        "random" => Box::new(RandomStrategy),
        _ => Box::new(SpreadStrategy),
    }
}
