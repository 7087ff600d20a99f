use std::collections::HashMap;
use std::time::{Duration, Instant};

use super::extreme_points::ExtremePointsEnumerator;
use super::normaliser::normalise;
use super::problem_set::ProblemSet;
use crate::config::LumpOptions;
use crate::error::Result;
use crate::model_checking::lp::{Cmp, LinearProgram, LpBackend};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SolverStatistics {
    pub problem_sets_solved_by_lp: u64,
    pub lps_solved: u64,
    pub lp_time: Duration,
    pub zero_actions: u64,
    pub action_exact_before: u64,
    pub action_exact_after: u64,
    pub unsimulable_class: u64,
    pub cache_size: usize,
    pub cache_hits_before: u64,
    pub cache_hits_after: u64,
}

/// Decides problem sets, answering `true` when the defender cannot mimic
/// the challenger.
pub struct ProblemSetSolver<B: LpBackend> {
    backend: B,
    options: LumpOptions,
    cache: HashMap<ProblemSet, bool>,
    enumerator: ExtremePointsEnumerator,
    pub(crate) stats: SolverStatistics,
}

impl<B: LpBackend> ProblemSetSolver<B> {
    pub fn new(backend: B, options: &LumpOptions) -> ProblemSetSolver<B> {
        ProblemSetSolver {
            backend,
            options: options.clone(),
            cache: HashMap::new(),
            enumerator: ExtremePointsEnumerator::new(),
            stats: SolverStatistics::default(),
        }
    }

    pub fn statistics(&self) -> SolverStatistics {
        SolverStatistics { cache_size: self.cache.len(), ..self.stats }
    }

    /// Normalises `problem` in place unless a shortcut applies first.
    pub fn check(&mut self, problem: &mut ProblemSet) -> Result<bool> {
        if self.options.shortcut_unsimulable_class && unsimulable_class(problem) {
            self.stats.unsimulable_class += 1;
            return Ok(true);
        }
        if problem.num_actions() == 0 {
            return Ok(true);
        }
        let mut before = None;
        if self.options.cache_before_normalisation {
            if let Some(&cached) = self.cache.get(problem) {
                self.stats.cache_hits_before += 1;
                return Ok(cached);
            }
            before = Some(problem.clone());
        }
        normalise(problem);
        if self.options.shortcut_action_exact_after && (0..problem.num_actions()).any(|a| problem.action_exact(a)) {
            self.stats.action_exact_after += 1;
            return Ok(false);
        }
        if self.options.cache_after_normalisation {
            if let Some(&cached) = self.cache.get(problem) {
                self.stats.cache_hits_after += 1;
                return Ok(cached);
            }
        }

        let result = self.solve_by_lp(problem)?;

        if let Some(before) = before {
            self.cache.insert(before, result);
        }
        if self.options.cache_after_normalisation {
            self.cache.insert(problem.clone(), result);
        }
        Ok(result)
    }

    fn solve_by_lp(&mut self, problem: &ProblemSet) -> Result<bool> {
        let time = Instant::now();
        self.stats.problem_sets_solved_by_lp += 1;
        let backend = &mut self.backend;
        let lps = &mut self.stats.lps_solved;
        let challenger = problem.challenger_row().to_vec();
        let result = self.enumerator.enumerate(&challenger, |point| {
            *lps += 1;
            let lp = mimic_lp(problem, point);
            Ok(!backend.is_feasible(&lp)?)
        });
        self.stats.lp_time += time.elapsed();
        result
    }
}

/// Some class needs more mass from the challenger than any defender action
/// can give it.
fn unsimulable_class(problem: &ProblemSet) -> bool {
    (0..problem.num_classes()).any(|class| {
        let max_upper = (0..problem.num_actions())
            .map(|a| problem.defender(a, class).upper)
            .fold(0.0, f64::max);
        problem.challenger(class).lower > max_upper
    })
}

/// Variables `x[a][c]`: mass of class `c` the defender routes through
/// action `a`. The masses per class add up to `point`, and each action's
/// share, scaled to a distribution, stays within the action's intervals.
fn mimic_lp(problem: &ProblemSet, point: &[f64]) -> LinearProgram {
    let num_classes = problem.num_classes();
    let num_actions = problem.num_actions();
    let var = |action: usize, class: usize| action * num_classes + class;
    let mut lp = LinearProgram::new();
    for _ in 0..num_actions * num_classes {
        lp.add_var(0.0, 1.0);
    }
    for (class, &mass) in point.iter().enumerate() {
        let terms = (0..num_actions).map(|a| (var(a, class), 1.0)).collect();
        lp.add_constraint(terms, Cmp::Eq, mass);
    }
    for class in 0..num_classes {
        for action in 0..num_actions {
            let bound = problem.defender(action, class);
            let row = |b: f64| -> Vec<(usize, f64)> {
                (0..num_classes)
                    .map(|other| (var(action, other), if other == class { 1.0 - b } else { -b }))
                    .collect()
            };
            lp.add_constraint(row(bound.lower), Cmp::Ge, 0.0);
            lp.add_constraint(row(bound.upper), Cmp::Le, 0.0);
        }
    }
    lp
}
