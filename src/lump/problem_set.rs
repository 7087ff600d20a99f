use std::hash::{Hash, Hasher};

use crate::model_checking::imdp::Interval;

/// Grid the hash rounds interval bounds to, so that problem sets equal up to
/// rounding noise land in the same bucket.
const HASH_GRID: f64 = 1e6;

/// One "can the defender mimic the challenger" question over a set of
/// classes. Row 0 holds the challenger's interval per class, row `a + 1` the
/// interval that defender action `a` assigns to each class.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProblemSet {
    num_classes: usize,
    num_actions: usize,
    intervals: Vec<Interval>,
}

impl ProblemSet {
    pub fn new() -> ProblemSet {
        ProblemSet::default()
    }

    /// Clear and resize to `num_classes` classes and `num_actions` defender
    /// actions, all intervals zero.
    pub fn reset(&mut self, num_classes: usize, num_actions: usize) {
        self.num_classes = num_classes;
        self.num_actions = num_actions;
        self.intervals.clear();
        self.intervals.resize(num_classes * (num_actions + 1), Interval::zero());
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    pub fn challenger(&self, class: usize) -> Interval {
        self.intervals[class]
    }

    pub fn defender(&self, action: usize, class: usize) -> Interval {
        self.intervals[(action + 1) * self.num_classes + class]
    }

    pub fn add_challenger(&mut self, class: usize, weight: Interval) {
        let entry = &mut self.intervals[class];
        *entry = entry.add(&weight);
    }

    pub fn add_defender(&mut self, action: usize, class: usize, weight: Interval) {
        let entry = &mut self.intervals[(action + 1) * self.num_classes + class];
        *entry = entry.add(&weight);
    }

    pub fn challenger_row(&self) -> &[Interval] {
        &self.intervals[..self.num_classes]
    }

    pub fn defender_row(&self, action: usize) -> &[Interval] {
        let from = (action + 1) * self.num_classes;
        &self.intervals[from..from + self.num_classes]
    }

    /// Row `0` is the challenger, row `a + 1` defender action `a`.
    pub fn row_mut(&mut self, row: usize) -> &mut [Interval] {
        let from = row * self.num_classes;
        &mut self.intervals[from..from + self.num_classes]
    }

    pub fn num_rows(&self) -> usize {
        self.num_actions + 1
    }

    pub(crate) fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub(crate) fn set_intervals(&mut self, intervals: Vec<Interval>) {
        debug_assert_eq!(intervals.len(), self.intervals.len());
        self.intervals = intervals;
    }

    /// Whether defender action `action` offers exactly the challenger row.
    pub fn action_exact(&self, action: usize) -> bool {
        self.challenger_row() == self.defender_row(action)
    }
}

// Problem sets never hold NaN bounds.
impl Eq for ProblemSet {}

impl Hash for ProblemSet {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.num_classes.hash(state);
        self.num_actions.hash(state);
        for i in self.intervals.iter() {
            ((i.lower * HASH_GRID).round() as i64).hash(state);
            ((i.upper * HASH_GRID).round() as i64).hash(state);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample() -> ProblemSet {
        let mut ps = ProblemSet::new();
        ps.reset(2, 1);
        ps.add_challenger(0, Interval::new(0.25, 0.5));
        ps.add_challenger(1, Interval::new(0.5, 0.75));
        ps.add_defender(0, 0, Interval::new(0.25, 0.5));
        ps.add_defender(0, 1, Interval::new(0.25, 0.5));
        ps.add_defender(0, 1, Interval::new(0.25, 0.25));
        ps
    }

    #[test]
    fn entries_accumulate_per_class() {
        let ps = sample();
        assert_eq!(ps.defender(0, 1), Interval::new(0.5, 0.75));
        assert!(ps.action_exact(0));
        assert_eq!(ps.num_rows(), 2);
    }

    #[test]
    fn reset_clears_entries() {
        let mut ps = sample();
        ps.reset(1, 2);
        assert_eq!(ps.intervals().len(), 3);
        assert!(ps.intervals().iter().all(|i| *i == Interval::zero()));
    }

    #[test]
    fn equal_sets_share_cache_entry() {
        let mut cache: HashMap<ProblemSet, bool> = HashMap::new();
        cache.insert(sample(), true);
        assert_eq!(cache.get(&sample()), Some(&true));
        let mut other = sample();
        other.add_challenger(0, Interval::new(0.0, 0.125));
        assert_eq!(cache.get(&other), None);
    }
}
