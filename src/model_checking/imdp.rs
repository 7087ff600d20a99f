use std::cmp::Ordering;
use std::ops::Range;

use ordered_float::OrderedFloat;
use petgraph::{graph::NodeIndex, Graph};
use serde::Deserialize;

use crate::error::{ImdpError, Result};

/// Slack allowed when checking that the bounds of a choice can sum to one.
pub const PROB_EPS: f64 = 1e-9;

/// Admissible probability mass towards one successor.
#[derive(Debug, Clone, Copy, PartialEq, Default, Deserialize)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

impl Interval {
    pub fn new(lower: f64, upper: f64) -> Interval {
        Interval { lower, upper }
    }

    pub fn point(p: f64) -> Interval {
        Interval { lower: p, upper: p }
    }

    pub fn zero() -> Interval {
        Interval { lower: 0.0, upper: 0.0 }
    }

    pub fn add(&self, other: &Interval) -> Interval {
        Interval {
            lower: self.lower + other.lower,
            upper: self.upper + other.upper,
        }
    }

    pub fn is_point(&self) -> bool {
        self.lower == self.upper
    }

    /// Lexicographic order on `(lower, upper)`.
    pub fn total_cmp(&self, other: &Interval) -> Ordering {
        OrderedFloat(self.lower)
            .cmp(&OrderedFloat(other.lower))
            .then(OrderedFloat(self.upper).cmp(&OrderedFloat(other.upper)))
    }
}

/// Tighten every interval of a distribution against the others so that each
/// bound is attainable by some distribution summing to exactly one.
///
/// `lower' = max(lower, upper + 1 - sum(upper))`,
/// `upper' = min(upper, lower + 1 - sum(lower))`.
pub fn normalise_intervals(intervals: &mut [Interval]) {
    let (sum_lower, sum_upper) = intervals
        .iter()
        .fold((0.0, 0.0), |(l, u), i| (l + i.lower, u + i.upper));
    let lower_slack = 1.0 - sum_upper;
    let upper_slack = 1.0 - sum_lower;
    for interval in intervals.iter_mut() {
        let upper = interval.upper.min(interval.lower + upper_slack).min(1.0);
        // rounding can push the tightened lower bound just past the upper one
        let lower = interval.lower.max(interval.upper + lower_slack).min(upper).max(0.0);
        interval.lower = lower;
        interval.upper = upper;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Statistics {
    pub num_states: usize,
    pub num_choices: usize,
    pub num_transitions: usize,
}

/// Interval MDP in compressed sparse form.
///
/// Choices of state `s` are `state_bounds[s]..state_bounds[s + 1]`, the
/// transitions of choice `c` are `choice_bounds[c]..choice_bounds[c + 1]`
/// into `successors` and `weights`.
#[derive(Debug, Clone, PartialEq)]
pub struct Imdp {
    pub num_states: usize,
    pub state_bounds: Vec<usize>,
    pub choice_bounds: Vec<usize>,
    pub successors: Vec<usize>,
    pub weights: Vec<Interval>,
}

impl Imdp {
    pub fn num_choices(&self) -> usize {
        self.choice_bounds.len() - 1
    }

    pub fn num_transitions(&self) -> usize {
        self.successors.len()
    }

    pub fn choices(&self, state: usize) -> Range<usize> {
        self.state_bounds[state]..self.state_bounds[state + 1]
    }

    pub fn transitions(&self, choice: usize) -> Range<usize> {
        self.choice_bounds[choice]..self.choice_bounds[choice + 1]
    }

    pub fn statistics(&self) -> Statistics {
        Statistics {
            num_states: self.num_states,
            num_choices: self.num_choices(),
            num_transitions: self.num_transitions(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.state_bounds.len() != self.num_states + 1 {
            return Err(ImdpError::invalid_model("state bounds do not cover all states"));
        }
        if self.choice_bounds.is_empty()
            || self.state_bounds[0] != 0
            || self.state_bounds[self.num_states] != self.num_choices()
        {
            return Err(ImdpError::invalid_model("state bounds do not cover all choices"));
        }
        if self.choice_bounds[0] != 0 || self.choice_bounds[self.num_choices()] != self.num_transitions() {
            return Err(ImdpError::invalid_model("choice bounds do not cover all transitions"));
        }
        if self.weights.len() != self.successors.len() {
            return Err(ImdpError::invalid_model("one interval per transition required"));
        }
        if self.state_bounds.windows(2).any(|w| w[0] > w[1])
            || self.choice_bounds.windows(2).any(|w| w[0] > w[1])
        {
            return Err(ImdpError::invalid_model("bounds must be non-decreasing"));
        }
        if let Some(s) = self.successors.iter().find(|&&s| s >= self.num_states) {
            return Err(ImdpError::invalid_model(format!("successor {} out of range", s)));
        }
        for choice in 0..self.num_choices() {
            let range = self.transitions(choice);
            if range.is_empty() {
                return Err(ImdpError::invalid_model(format!("choice {} has no transitions", choice)));
            }
            let mut sum = Interval::zero();
            for w in &self.weights[range] {
                if !(0.0 <= w.lower && w.lower <= w.upper && w.upper <= 1.0) {
                    return Err(ImdpError::invalid_model(format!(
                        "choice {}: interval [{}, {}] is not a probability interval",
                        choice, w.lower, w.upper
                    )));
                }
                sum = sum.add(w);
            }
            if sum.lower > 1.0 + PROB_EPS || sum.upper < 1.0 - PROB_EPS {
                return Err(ImdpError::invalid_model(format!(
                    "choice {}: bounds [{}, {}] admit no distribution",
                    choice, sum.lower, sum.upper
                )));
            }
        }
        Ok(())
    }

    /// Tighten the intervals of every choice, see [`normalise_intervals`].
    pub fn normalise(&mut self) {
        for choice in 0..self.num_choices() {
            let range = self.transitions(choice);
            normalise_intervals(&mut self.weights[range]);
        }
    }

    /// Distinct predecessor states of every state.
    pub fn predecessors(&self) -> Vec<Vec<usize>> {
        let mut pred: Vec<Vec<usize>> = vec![Vec::new(); self.num_states];
        for state in 0..self.num_states {
            for choice in self.choices(state) {
                for t in self.transitions(choice) {
                    pred[self.successors[t]].push(state);
                }
            }
        }
        for p in pred.iter_mut() {
            p.sort_unstable();
            p.dedup();
        }
        pred
    }

    /// Copy of the graph in which every state flagged in `sinks`, and every
    /// state without choices, has a single `[1,1]` self loop. Returns the
    /// new graph and, per new choice, the choice of `self` it was copied
    /// from (`None` for the added loops).
    pub fn with_sinks(&self, sinks: &[bool]) -> (Imdp, Vec<Option<usize>>) {
        let mut state_bounds: Vec<usize> = Vec::with_capacity(self.num_states + 1);
        let mut choice_bounds: Vec<usize> = vec![0];
        let mut successors: Vec<usize> = Vec::with_capacity(self.num_transitions());
        let mut weights: Vec<Interval> = Vec::with_capacity(self.num_transitions());
        let mut origin: Vec<Option<usize>> = Vec::with_capacity(self.num_choices());
        state_bounds.push(0);
        for state in 0..self.num_states {
            let sink = sinks.get(state).copied().unwrap_or(false);
            if sink || self.choices(state).is_empty() {
                successors.push(state);
                weights.push(Interval::point(1.0));
                choice_bounds.push(successors.len());
                origin.push(None);
            } else {
                for choice in self.choices(state) {
                    for t in self.transitions(choice) {
                        successors.push(self.successors[t]);
                        weights.push(self.weights[t]);
                    }
                    choice_bounds.push(successors.len());
                    origin.push(Some(choice));
                }
            }
            state_bounds.push(origin.len());
        }
        let graph = Imdp {
            num_states: self.num_states,
            state_bounds,
            choice_bounds,
            successors,
            weights,
        };
        (graph, origin)
    }

    /// State/choice graph for dot export. State nodes are labelled by id,
    /// choice nodes by their index, edges by the interval.
    pub fn to_graph(&self) -> Graph<String, String> {
        let mut g: Graph<String, String> = Graph::new();
        let state_nodes: Vec<NodeIndex> = (0..self.num_states)
            .map(|s| g.add_node(format!("s{}", s)))
            .collect();
        for state in 0..self.num_states {
            for choice in self.choices(state) {
                let c = g.add_node(format!("c{}", choice));
                g.add_edge(state_nodes[state], c, String::new());
                for t in self.transitions(choice) {
                    let w = self.weights[t];
                    g.add_edge(c, state_nodes[self.successors[t]], format!("[{},{}]", w.lower, w.upper));
                }
            }
        }
        g
    }
}

/// Append-only construction of an [`Imdp`]. Choices must be added in
/// non-decreasing state order, transitions belong to the last added choice.
#[derive(Debug)]
pub struct ImdpBuilder {
    num_states: usize,
    state_bounds: Vec<usize>,
    choice_bounds: Vec<usize>,
    successors: Vec<usize>,
    weights: Vec<Interval>,
    rewards: Vec<f64>,
    current_state: usize,
}

impl ImdpBuilder {
    pub fn new(num_states: usize) -> ImdpBuilder {
        ImdpBuilder {
            num_states,
            state_bounds: vec![0],
            choice_bounds: vec![0],
            successors: Vec::new(),
            weights: Vec::new(),
            rewards: Vec::new(),
            current_state: 0,
        }
    }

    fn close_states_until(&mut self, state: usize) {
        let num_choices = self.choice_bounds.len() - 1;
        while self.current_state < state {
            self.state_bounds.push(num_choices);
            self.current_state += 1;
        }
    }

    /// Start a new choice of `state` carrying a transition reward.
    pub fn add_choice_with_reward(&mut self, state: usize, reward: f64) -> Result<usize> {
        if state >= self.num_states {
            return Err(ImdpError::invalid_model(format!("state {} out of range", state)));
        }
        if state < self.current_state {
            return Err(ImdpError::invalid_model(format!(
                "choices of state {} must be added before those of state {}",
                state, self.current_state
            )));
        }
        self.close_states_until(state);
        self.choice_bounds.push(self.successors.len());
        self.rewards.push(reward);
        Ok(self.rewards.len() - 1)
    }

    pub fn add_choice(&mut self, state: usize) -> Result<usize> {
        self.add_choice_with_reward(state, 0.0)
    }

    pub fn add_transition(&mut self, successor: usize, lower: f64, upper: f64) -> Result<()> {
        if self.rewards.is_empty() {
            return Err(ImdpError::invalid_model("transition added before any choice"));
        }
        self.successors.push(successor);
        self.weights.push(Interval::new(lower, upper));
        let last = self.choice_bounds.len() - 1;
        self.choice_bounds[last] = self.successors.len();
        Ok(())
    }

    /// Finish the graph and return it with the per-choice rewards.
    pub fn build_with_rewards(mut self) -> Result<(Imdp, Vec<f64>)> {
        let num_states = self.num_states;
        self.close_states_until(num_states);
        let imdp = Imdp {
            num_states,
            state_bounds: self.state_bounds,
            choice_bounds: self.choice_bounds,
            successors: self.successors,
            weights: self.weights,
        };
        imdp.validate()?;
        Ok((imdp, self.rewards))
    }

    pub fn build(self) -> Result<Imdp> {
        self.build_with_rewards().map(|(imdp, _)| imdp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Imdp {
        let mut b = ImdpBuilder::new(3);
        b.add_choice(0).unwrap();
        b.add_transition(1, 0.2, 0.6).unwrap();
        b.add_transition(2, 0.4, 0.8).unwrap();
        b.add_choice(0).unwrap();
        b.add_transition(0, 1.0, 1.0).unwrap();
        b.add_choice(2).unwrap();
        b.add_transition(2, 1.0, 1.0).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn builder_lays_out_sparse_arrays() {
        let g = chain();
        assert_eq!(g.state_bounds, vec![0, 2, 2, 3]);
        assert_eq!(g.choice_bounds, vec![0, 2, 3, 4]);
        assert_eq!(g.successors, vec![1, 2, 0, 2]);
        assert_eq!(g.statistics(), Statistics { num_states: 3, num_choices: 3, num_transitions: 4 });
        assert!(g.choices(1).is_empty());
    }

    #[test]
    fn builder_rejects_out_of_order_states() {
        let mut b = ImdpBuilder::new(2);
        b.add_choice(1).unwrap();
        b.add_transition(0, 1.0, 1.0).unwrap();
        assert!(b.add_choice(0).is_err());
    }

    #[test]
    fn validation_rejects_infeasible_choice() {
        let mut b = ImdpBuilder::new(2);
        b.add_choice(0).unwrap();
        b.add_transition(0, 0.1, 0.3).unwrap();
        b.add_transition(1, 0.1, 0.3).unwrap();
        assert!(matches!(b.build(), Err(ImdpError::InvalidModel { .. })));
    }

    #[test]
    fn normalise_tightens_within_original_bounds() {
        let mut g = chain();
        let before = g.weights.clone();
        g.normalise();
        for choice in 0..g.num_choices() {
            let range = g.transitions(choice);
            let lower: f64 = g.weights[range.clone()].iter().map(|w| w.lower).sum();
            let upper: f64 = g.weights[range.clone()].iter().map(|w| w.upper).sum();
            assert!(lower <= 1.0 + PROB_EPS);
            assert!(upper >= 1.0 - PROB_EPS);
            for t in range {
                assert!(g.weights[t].lower >= before[t].lower);
                assert!(g.weights[t].upper <= before[t].upper);
                assert!(g.weights[t].lower <= g.weights[t].upper);
            }
        }
    }

    #[test]
    fn normalise_intervals_example() {
        let mut w = vec![Interval::new(0.0, 1.0), Interval::new(0.5, 0.75)];
        normalise_intervals(&mut w);
        assert_eq!(w[0], Interval::new(0.25, 0.5));
        assert_eq!(w[1], Interval::new(0.5, 0.75));
    }

    #[test]
    fn sinks_become_self_loops() {
        let g = chain();
        let (sunk, origin) = g.with_sinks(&[false, false, true]);
        assert_eq!(sunk.choices(0).len(), 2);
        // state 1 had no choices and state 2 is a sink
        assert_eq!(sunk.choices(1).len(), 1);
        assert_eq!(sunk.successors[sunk.transitions(sunk.choices(1).start)], [1]);
        assert_eq!(origin, vec![Some(0), Some(1), None, None]);
    }

    #[test]
    fn predecessors_are_deduplicated() {
        let g = chain();
        let pred = g.predecessors();
        assert_eq!(pred[0], vec![0]);
        assert_eq!(pred[1], vec![0]);
        assert_eq!(pred[2], vec![0, 2]);
    }

    #[test]
    fn dot_graph_has_state_and_choice_nodes() {
        let g = chain();
        let dot = g.to_graph();
        assert_eq!(dot.node_count(), 3 + 3);
        assert_eq!(dot.edge_count(), 3 + 4);
    }
}
