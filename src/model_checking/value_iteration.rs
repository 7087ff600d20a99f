use std::time::Instant;

use tracing::{debug, info};

use super::helper_methods::{checked_diff, max_diff_vect};
use super::imdp::Imdp;
use super::interval_iter::{IntervalIterator, IteratorStatistics};
use crate::config::{IterationMethod, Options};
use crate::error::{ImdpError, Result};

/// The reachability solvers compare sweeps against four times the nominal
/// tolerance.
pub const TOLERANCE_FACTOR: f64 = 4.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Objective {
    BoundedReachability { target: Vec<bool>, steps: usize, min: bool },
    /// `zero` marks states known to have value zero, they are made absorbing.
    UnboundedReachability { target: Vec<bool>, zero: Vec<bool>, min: bool },
    /// `rewards` holds one transition reward per choice of the graph.
    UnboundedCumulativeReward { rewards: Vec<f64>, sinks: Vec<bool>, min: bool },
    /// Lumping only, refines the given state to block map.
    Lump { partition: Vec<usize> },
}

impl Objective {
    pub fn name(&self) -> &'static str {
        match self {
            Objective::BoundedReachability { .. } => "bounded reachability",
            Objective::UnboundedReachability { .. } => "unbounded reachability",
            Objective::UnboundedCumulativeReward { .. } => "unbounded cumulative reward",
            Objective::Lump { .. } => "lump",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// One value per state of the input graph.
    pub values: Vec<f64>,
    pub iterations: u64,
    pub iterator: IteratorStatistics,
}

/// Two owned value vectors, `current` is read and `next` written during a
/// Jacobi sweep.
#[derive(Debug, Clone)]
pub struct ValueBuffers {
    pub current: Vec<f64>,
    pub next: Vec<f64>,
}

impl ValueBuffers {
    pub fn new(initial: Vec<f64>) -> ValueBuffers {
        let next = vec![0.0; initial.len()];
        ValueBuffers { current: initial, next }
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.current, &mut self.next);
    }

    pub fn into_current(self) -> Vec<f64> {
        self.current
    }
}

struct IterationProblem {
    graph: Imdp,
    rewards: Option<Vec<f64>>,
    values: Vec<f64>,
    steps: Option<usize>,
    min: bool,
}

fn check_len<T>(v: &[T], expected: usize, what: &str) -> Result<()> {
    if v.len() != expected {
        return Err(ImdpError::invalid_model(format!(
            "{} has length {}, expected {}",
            what,
            v.len(),
            expected
        )));
    }
    Ok(())
}

fn build_problem(input: &Imdp, objective: &Objective) -> Result<IterationProblem> {
    let n = input.num_states;
    let problem = match objective {
        Objective::BoundedReachability { target, steps, min } => {
            check_len(target, n, "target")?;
            let (graph, _) = input.with_sinks(target);
            IterationProblem {
                graph,
                rewards: None,
                values: target.iter().map(|&t| if t { 1.0 } else { 0.0 }).collect(),
                steps: Some(*steps),
                min: *min,
            }
        }
        Objective::UnboundedReachability { target, zero, min } => {
            check_len(target, n, "target")?;
            if !zero.is_empty() {
                check_len(zero, n, "zero set")?;
            }
            let sinks: Vec<bool> = (0..n)
                .map(|s| target[s] || zero.get(s).copied().unwrap_or(false))
                .collect();
            let (graph, _) = input.with_sinks(&sinks);
            IterationProblem {
                graph,
                rewards: None,
                values: target.iter().map(|&t| if t { 1.0 } else { 0.0 }).collect(),
                steps: None,
                min: *min,
            }
        }
        Objective::UnboundedCumulativeReward { rewards, sinks, min } => {
            check_len(rewards, input.num_choices(), "choice rewards")?;
            check_len(sinks, n, "sinks")?;
            let (graph, origin) = input.with_sinks(sinks);
            let rewards = origin.iter().map(|c| c.map(|c| rewards[c]).unwrap_or(0.0)).collect();
            IterationProblem {
                graph,
                rewards: Some(rewards),
                values: vec![0.0; n],
                steps: None,
                min: *min,
            }
        }
        Objective::Lump { .. } => {
            return Err(ImdpError::unsupported("value iteration cannot solve a lump objective"));
        }
    };
    Ok(problem)
}

/// Compute the values of `objective` on `graph` by interval value iteration.
pub fn solve(graph: &Imdp, objective: &Objective, options: &Options) -> Result<Solution> {
    let total = Instant::now();
    info!(objective = objective.name(), "imdp graph solver started");
    let build = Instant::now();
    let mut problem = build_problem(graph, objective)?;
    problem.graph.normalise();
    let stats = problem.graph.statistics();
    info!(
        seconds = build.elapsed().as_secs_f64(),
        states = stats.num_states,
        choices = stats.num_choices,
        transitions = stats.num_transitions,
        "iteration graph built"
    );
    let solution = match problem.steps {
        Some(steps) => bounded(&mut problem, steps, options),
        None => unbounded(&mut problem, options)?,
    };
    info!(seconds = total.elapsed().as_secs_f64(), "imdp graph solver done");
    Ok(solution)
}

fn bounded(problem: &mut IterationProblem, steps: usize, options: &Options) -> Solution {
    let min = problem.min;
    let graph = &mut problem.graph;
    let state_bounds = &graph.state_bounds;
    let mut iterator = IntervalIterator::new(
        &graph.choice_bounds,
        &mut graph.successors,
        &mut graph.weights,
        min,
        options.interval_player,
    );
    let mut buffers = ValueBuffers::new(std::mem::take(&mut problem.values));
    for _ in 0..steps {
        for state in 0..graph.num_states {
            let mut state_opt = if min { f64::INFINITY } else { f64::NEG_INFINITY };
            for choice in state_bounds[state]..state_bounds[state + 1] {
                let nd_opt = iterator.nondet_step(choice, &buffers.current);
                state_opt = if min { state_opt.min(nd_opt) } else { state_opt.max(nd_opt) };
            }
            buffers.next[state] = state_opt;
        }
        buffers.swap();
    }
    Solution {
        values: buffers.into_current(),
        iterations: steps as u64,
        iterator: iterator.statistics(),
    }
}

fn unbounded(problem: &mut IterationProblem, options: &Options) -> Result<Solution> {
    let time = Instant::now();
    info!(method = ?options.iteration_method, "value iteration started");
    let solution = match options.iteration_method {
        IterationMethod::Jacobi => unbounded_jacobi(problem, options)?,
        IterationMethod::GaussSeidel => unbounded_gauss_seidel(problem, options)?,
    };
    info!(
        method = ?options.iteration_method,
        seconds = time.elapsed().as_secs_f64(),
        iterations = solution.iterations,
        opt_steps = solution.iterator.num_opt_steps,
        times_sorted = solution.iterator.times_sorted,
        "value iteration done"
    );
    Ok(solution)
}

fn unbounded_jacobi(problem: &mut IterationProblem, options: &Options) -> Result<Solution> {
    let min = problem.min;
    let precision = options.tolerance * TOLERANCE_FACTOR;
    let rewards = problem.rewards.as_deref();
    let graph = &mut problem.graph;
    let state_bounds = &graph.state_bounds;
    let mut iterator = IntervalIterator::new(
        &graph.choice_bounds,
        &mut graph.successors,
        &mut graph.weights,
        min,
        options.interval_player,
    );
    let mut buffers = ValueBuffers::new(std::mem::take(&mut problem.values));
    let mut iterations: u64 = 0;
    let mut epsilon = f64::INFINITY;
    while epsilon > precision {
        for state in 0..graph.num_states {
            let mut state_opt = if min { f64::INFINITY } else { f64::NEG_INFINITY };
            for choice in state_bounds[state]..state_bounds[state + 1] {
                let reward = rewards.map(|r| r[choice]).unwrap_or(0.0);
                let nd_opt = iterator.nondet_step(choice, &buffers.current) + reward;
                state_opt = if min { state_opt.min(nd_opt) } else { state_opt.max(nd_opt) };
            }
            buffers.next[state] = state_opt;
        }
        epsilon = max_diff_vect(&buffers.current, &buffers.next, options.stop_criterion)?;
        buffers.swap();
        iterations += 1;
        debug!(iterations, epsilon, "jacobi sweep");
    }
    Ok(Solution {
        values: buffers.into_current(),
        iterations,
        iterator: iterator.statistics(),
    })
}

fn unbounded_gauss_seidel(problem: &mut IterationProblem, options: &Options) -> Result<Solution> {
    let min = problem.min;
    let precision = options.tolerance * TOLERANCE_FACTOR;
    let rewards = problem.rewards.as_deref();
    let graph = &mut problem.graph;
    let state_bounds = &graph.state_bounds;
    let mut iterator = IntervalIterator::new(
        &graph.choice_bounds,
        &mut graph.successors,
        &mut graph.weights,
        min,
        options.interval_player,
    );
    let mut values = std::mem::take(&mut problem.values);
    let mut iterations: u64 = 0;
    let mut epsilon = f64::INFINITY;
    while epsilon > precision {
        epsilon = 0.0;
        for state in 0..graph.num_states {
            let mut state_opt = if min { f64::INFINITY } else { f64::NEG_INFINITY };
            for choice in state_bounds[state]..state_bounds[state + 1] {
                let reward = rewards.map(|r| r[choice]).unwrap_or(0.0);
                let nd_opt = iterator.nondet_step(choice, &values) + reward;
                state_opt = if min { state_opt.min(nd_opt) } else { state_opt.max(nd_opt) };
            }
            epsilon = epsilon.max(checked_diff(values[state], state_opt, options.stop_criterion, state)?);
            values[state] = state_opt;
        }
        iterations += 1;
        debug!(iterations, epsilon, "gauss-seidel sweep");
    }
    Ok(Solution {
        values,
        iterations,
        iterator: iterator.statistics(),
    })
}
