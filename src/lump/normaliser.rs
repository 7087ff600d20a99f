use std::cmp::Ordering;

use super::problem_set::ProblemSet;
use crate::model_checking::imdp::{normalise_intervals, Interval};

fn cmp_rows(a: &[Interval], b: &[Interval]) -> Ordering {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Bring `problem` into canonical form: tighten every row, order the
/// classes by challenger interval and the defender rows lexicographically.
pub fn normalise(problem: &mut ProblemSet) {
    let num_classes = problem.num_classes();
    let num_actions = problem.num_actions();
    for row in 0..problem.num_rows() {
        normalise_intervals(problem.row_mut(row));
    }

    let mut order: Vec<usize> = (0..num_classes).collect();
    order.sort_by(|&a, &b| problem.challenger(a).total_cmp(&problem.challenger(b)));

    let permuted = |row: &[Interval]| -> Vec<Interval> { order.iter().map(|&c| row[c]).collect() };
    let challenger = permuted(problem.challenger_row());
    let mut defenders: Vec<Vec<Interval>> = (0..num_actions).map(|a| permuted(problem.defender_row(a))).collect();
    defenders.sort_by(|a, b| cmp_rows(a, b));

    let mut intervals = challenger;
    intervals.reserve(num_classes * num_actions);
    for row in defenders {
        intervals.extend(row);
    }
    problem.set_intervals(intervals);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unordered() -> ProblemSet {
        let mut ps = ProblemSet::new();
        ps.reset(3, 2);
        ps.add_challenger(0, Interval::new(0.5, 0.5));
        ps.add_challenger(1, Interval::new(0.0, 0.5));
        ps.add_challenger(2, Interval::new(0.25, 0.5));
        ps.add_defender(0, 0, Interval::new(0.5, 0.75));
        ps.add_defender(0, 1, Interval::new(0.0, 0.25));
        ps.add_defender(0, 2, Interval::new(0.25, 0.25));
        ps.add_defender(1, 0, Interval::new(0.25, 0.5));
        ps.add_defender(1, 1, Interval::new(0.25, 0.5));
        ps.add_defender(1, 2, Interval::new(0.0, 0.5));
        ps
    }

    #[test]
    fn classes_sorted_by_challenger() {
        let mut ps = unordered();
        normalise(&mut ps);
        let c: Vec<Interval> = ps.challenger_row().to_vec();
        for w in c.windows(2) {
            assert_ne!(w[0].total_cmp(&w[1]), Ordering::Greater);
        }
        assert_eq!(c[2], Interval::point(0.5));
    }

    #[test]
    fn defender_rows_sorted() {
        let mut ps = unordered();
        normalise(&mut ps);
        assert_ne!(cmp_rows(ps.defender_row(0), ps.defender_row(1)), Ordering::Greater);
    }

    #[test]
    fn normalising_twice_changes_nothing() {
        let mut once = unordered();
        normalise(&mut once);
        let mut twice = once.clone();
        normalise(&mut twice);
        assert_eq!(once, twice);
    }

    #[test]
    fn action_order_does_not_matter() {
        let mut a = unordered();
        let mut b = ProblemSet::new();
        b.reset(3, 2);
        for c in 0..3 {
            b.add_challenger(c, a.challenger(c));
            b.add_defender(0, c, a.defender(1, c));
            b.add_defender(1, c, a.defender(0, c));
        }
        normalise(&mut a);
        normalise(&mut b);
        assert_eq!(a, b);
    }
}
