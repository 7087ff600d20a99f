use ordered_float::OrderedFloat;

use super::imdp::Interval;
use crate::config::IntervalPlayer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IteratorStatistics {
    pub num_opt_steps: u64,
    pub times_sorted: u64,
}

/// Resolves the intervals of one choice to the distribution that is extremal
/// for the current value vector.
///
/// The iterator holds exclusive access to the successor and weight arrays of
/// the graph it was built from: to resolve a choice it sorts the choice's
/// transitions by successor value in place, so after a solve the transition
/// order inside each choice is a permutation of the input order.
pub struct IntervalIterator<'a> {
    choice_bounds: &'a [usize],
    successors: &'a mut [usize],
    weights: &'a mut [Interval],
    min: bool,
    scratch: Vec<(usize, Interval)>,
    stats: IteratorStatistics,
}

impl<'a> IntervalIterator<'a> {
    /// `min` is the direction of the action choice. With an antagonistic
    /// interval player the intervals are resolved the other way.
    pub fn new(
        choice_bounds: &'a [usize],
        successors: &'a mut [usize],
        weights: &'a mut [Interval],
        min: bool,
        player: IntervalPlayer,
    ) -> IntervalIterator<'a> {
        let min = match player {
            IntervalPlayer::Cooperative => min,
            IntervalPlayer::Antagonistic => !min,
        };
        IntervalIterator {
            choice_bounds,
            successors,
            weights,
            min,
            scratch: Vec::new(),
            stats: IteratorStatistics::default(),
        }
    }

    pub fn statistics(&self) -> IteratorStatistics {
        self.stats
    }

    fn in_order(&self, from: usize, to: usize, values: &[f64]) -> bool {
        let succ = &self.successors[from..to];
        if self.min {
            succ.windows(2).all(|w| values[w[0]] <= values[w[1]])
        } else {
            succ.windows(2).all(|w| values[w[0]] >= values[w[1]])
        }
    }

    fn sort(&mut self, from: usize, to: usize, values: &[f64]) {
        self.scratch.clear();
        for t in from..to {
            self.scratch.push((self.successors[t], self.weights[t]));
        }
        if self.min {
            self.scratch.sort_by_key(|(s, _)| OrderedFloat(values[*s]));
        } else {
            self.scratch.sort_by_key(|(s, _)| std::cmp::Reverse(OrderedFloat(values[*s])));
        }
        for (offset, (s, w)) in self.scratch.iter().enumerate() {
            self.successors[from + offset] = *s;
            self.weights[from + offset] = *w;
        }
        self.stats.times_sorted += 1;
    }

    /// Extremal expected value of `values` over all distributions admitted
    /// by the intervals of `choice`. The intervals must be normalised.
    pub fn nondet_step(&mut self, choice: usize, values: &[f64]) -> f64 {
        self.stats.num_opt_steps += 1;
        let from = self.choice_bounds[choice];
        let to = self.choice_bounds[choice + 1];
        let mut sum_lower: f64 = self.weights[from..to].iter().map(|w| w.lower).sum();
        if !self.in_order(from, to, values) {
            self.sort(from, to, values);
        }
        let mut result = 0.0;
        for t in from..to {
            let w = self.weights[t];
            let assigned = if 1.0 + w.lower < w.upper + sum_lower {
                let p = 1.0 + w.lower - sum_lower;
                sum_lower = 1.0;
                p
            } else {
                sum_lower += w.upper - w.lower;
                w.upper
            };
            result += assigned * values[self.successors[t]];
        }
        debug_assert!(!result.is_nan(), "choice {} resolved to NaN", choice);
        result
    }
}
