use std::collections::BTreeMap;

use super::partition::Partition;
use crate::error::Result;
use crate::model_checking::imdp::{Imdp, ImdpBuilder, Interval};

/// Smallest state of every block.
pub fn representatives(partition: &Partition) -> Vec<usize> {
    (0..partition.num_blocks())
        .map(|b| partition.block_states(b).iter().copied().min().unwrap_or(0))
        .collect()
}

/// Collapse every block into one state whose choices are the distinct
/// choices of its representative, with intervals summed per successor
/// block.
pub fn build_quotient(graph: &Imdp, partition: &Partition) -> Result<Imdp> {
    let reps = representatives(partition);
    let mut builder = ImdpBuilder::new(partition.num_blocks());
    for (block, &rep) in reps.iter().enumerate() {
        let mut actions: Vec<Vec<(usize, Interval)>> = Vec::new();
        for choice in graph.choices(rep) {
            let mut per_block: BTreeMap<usize, Interval> = BTreeMap::new();
            for t in graph.transitions(choice) {
                let entry = per_block
                    .entry(partition.block_of(graph.successors[t]))
                    .or_insert_with(Interval::zero);
                *entry = entry.add(&graph.weights[t]);
            }
            let action: Vec<(usize, Interval)> = per_block
                .into_iter()
                .map(|(b, i)| (b, Interval::new(i.lower.min(1.0), i.upper.min(1.0))))
                .collect();
            if !actions.contains(&action) {
                actions.push(action);
            }
        }
        for action in actions {
            builder.add_choice(block)?;
            for (succ, interval) in action {
                builder.add_transition(succ, interval.lower, interval.upper)?;
            }
        }
    }
    builder.build()
}

/// Project a per-state flag onto blocks through their representatives.
pub fn project(flags: &[bool], reps: &[usize]) -> Vec<bool> {
    reps.iter().map(|&r| flags.get(r).copied().unwrap_or(false)).collect()
}
