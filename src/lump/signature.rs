use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;
use ordered_float::OrderedFloat;

use super::partition::Partition;
use crate::model_checking::imdp::{normalise_intervals, Imdp, Interval};

/// Summed interval per successor block, ordered by block.
pub type ActionSignature = Vec<(usize, OrderedFloat<f64>, OrderedFloat<f64>)>;
/// Sorted distinct action signatures of a state.
pub type StateSignature = Vec<ActionSignature>;

/// Groups the states of one block by their signature under the current
/// partition. States with equal signatures can be moved to the same part
/// without further checks.
pub struct SignatureManager<'a> {
    graph: &'a Imdp,
    normalise: bool,
    index: HashMap<StateSignature, usize>,
    groups: Vec<Vec<usize>>,
}

impl<'a> SignatureManager<'a> {
    pub fn new(graph: &'a Imdp, normalise: bool) -> SignatureManager<'a> {
        SignatureManager {
            graph,
            normalise,
            index: HashMap::new(),
            groups: Vec::new(),
        }
    }

    pub fn restart(&mut self) {
        self.index.clear();
        self.groups.clear();
    }

    fn action_signature(&self, partition: &Partition, choice: usize) -> ActionSignature {
        let mut per_block: BTreeMap<usize, Interval> = BTreeMap::new();
        for t in self.graph.transitions(choice) {
            let block = partition.block_of(self.graph.successors[t]);
            let entry = per_block.entry(block).or_insert_with(Interval::zero);
            *entry = entry.add(&self.graph.weights[t]);
        }
        let blocks: Vec<usize> = per_block.keys().copied().collect();
        let mut intervals: Vec<Interval> = per_block.values().copied().collect();
        if self.normalise {
            normalise_intervals(&mut intervals);
        }
        blocks
            .into_iter()
            .zip(intervals.into_iter())
            .map(|(b, i)| (b, OrderedFloat(i.lower), OrderedFloat(i.upper)))
            .collect()
    }

    pub fn state_signature(&self, partition: &Partition, state: usize) -> StateSignature {
        self.graph
            .choices(state)
            .map(|c| self.action_signature(partition, c))
            .sorted()
            .dedup()
            .collect()
    }

    /// Add `state` to the group of its signature. Groups are numbered in
    /// order of first appearance.
    pub fn add_state(&mut self, partition: &Partition, state: usize) {
        let signature = self.state_signature(partition, state);
        let next = self.groups.len();
        let group = *self.index.entry(signature).or_insert(next);
        if group == next {
            self.groups.push(Vec::new());
        }
        self.groups[group].push(state);
    }

    pub fn num_signatures(&self) -> usize {
        self.groups.len()
    }

    pub fn signature_size(&self, signature: usize) -> usize {
        self.groups[signature].len()
    }

    pub fn state(&self, signature: usize, i: usize) -> usize {
        self.groups[signature][i]
    }

    pub fn group(&self, signature: usize) -> &[usize] {
        &self.groups[signature]
    }
}
