use std::time::Instant;

use tracing::{debug, info};

use super::helper_methods::{checked_diff, max_diff_vect};
use super::imdp::Imdp;
use super::interval_iter::IntervalIterator;
use super::value_iteration::ValueBuffers;
use crate::config::{IterationMethod, Options};
use crate::error::{ImdpError, Result};

/// Per-state decision of a weighted reward scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Choice(usize),
    Stop,
    Unresolved,
}

impl Decision {
    /// Integer encoding used in scheduler output files.
    pub fn code(&self) -> i64 {
        match self {
            Decision::Choice(c) => *c as i64,
            Decision::Stop => -1,
            Decision::Unresolved => -2,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightedSolution {
    pub values: Vec<f64>,
    pub decisions: Vec<Decision>,
    pub iterations: u64,
}

/// States whose value can be fixed to zero: either stopping pays nothing,
/// or a choice without reward leads only into such states. Returns the zero
/// flags and the decision that realises the zero value.
pub fn fix_negative(graph: &Imdp, trans_rewards: &[f64], stop_rewards: &[f64]) -> (Vec<bool>, Vec<Decision>) {
    let mut zero = vec![false; graph.num_states];
    let mut decisions = vec![Decision::Unresolved; graph.num_states];
    let mut changed = true;
    while changed {
        changed = false;
        for state in 0..graph.num_states {
            if zero[state] {
                continue;
            }
            if stop_rewards[state] == 0.0 {
                zero[state] = true;
                decisions[state] = Decision::Stop;
                changed = true;
                continue;
            }
            let fixed = graph.choices(state).find(|&c| {
                trans_rewards[c] == 0.0
                    && graph
                        .transitions(c)
                        .all(|t| zero[graph.successors[t]] || graph.weights[t].upper == 0.0)
            });
            if let Some(c) = fixed {
                zero[state] = true;
                decisions[state] = Decision::Choice(c);
                changed = true;
            }
        }
    }
    (zero, decisions)
}

fn check_rewards(graph: &Imdp, trans_rewards: &[f64], stop_rewards: &[f64]) -> Result<()> {
    if trans_rewards.len() != graph.num_choices() {
        return Err(ImdpError::invalid_model(format!(
            "{} transition rewards for {} choices",
            trans_rewards.len(),
            graph.num_choices()
        )));
    }
    if stop_rewards.len() != graph.num_states {
        return Err(ImdpError::invalid_model(format!(
            "{} stop rewards for {} states",
            stop_rewards.len(),
            graph.num_states
        )));
    }
    Ok(())
}

fn zero_states(graph: &Imdp, trans_rewards: &[f64], stop_rewards: &[f64]) -> (Vec<bool>, Vec<Decision>) {
    let negative = trans_rewards.iter().any(|r| *r < 0.0);
    if negative {
        let (zero, decisions) = fix_negative(graph, trans_rewards, stop_rewards);
        debug!(zero_states = zero.iter().filter(|z| **z).count(), "negative rewards fixed");
        (zero, decisions)
    } else {
        (vec![false; graph.num_states], vec![Decision::Unresolved; graph.num_states])
    }
}

/// Best option of `state` given `values`: the largest of the stop reward and
/// the transition reward plus interval-maximal successor value of each
/// choice. The recorded decision only moves to an option whose value is
/// strictly above `present`, the value the state had before this update.
#[allow(clippy::too_many_arguments)]
fn best_option(
    iterator: &mut IntervalIterator,
    state_bounds: &[usize],
    trans_rewards: &[f64],
    stop_reward: f64,
    state: usize,
    values: &[f64],
    present: f64,
    decision: &mut Decision,
) -> f64 {
    let mut best = f64::NEG_INFINITY;
    for choice in state_bounds[state]..state_bounds[state + 1] {
        let v = trans_rewards[choice] + iterator.nondet_step(choice, values);
        if v > best {
            best = v;
            if best > present {
                *decision = Decision::Choice(choice);
            }
        }
    }
    if stop_reward > best {
        best = stop_reward;
        if best > present {
            *decision = Decision::Stop;
        }
    }
    best
}

/// Maximise the weighted sum of transition rewards until the scheduler
/// stops, collecting `stop_rewards[s]` when stopping in `s`. Every state
/// that is not fixed to zero starts out stopping.
pub fn weighted(graph: &Imdp, trans_rewards: &[f64], stop_rewards: &[f64], options: &Options) -> Result<WeightedSolution> {
    check_rewards(graph, trans_rewards, stop_rewards)?;
    let time = Instant::now();
    info!(method = ?options.iteration_method, "weighted reward iteration started");
    let mut g = graph.clone();
    g.normalise();
    let (zero, fixed) = zero_states(&g, trans_rewards, stop_rewards);
    let mut decisions: Vec<Decision> = zero
        .iter()
        .zip(fixed.into_iter())
        .map(|(&z, d)| if z { d } else { Decision::Stop })
        .collect();
    let precision = options.tolerance / 2.0;
    let num_states = g.num_states;
    let state_bounds = &g.state_bounds;
    let mut iterator = IntervalIterator::new(
        &g.choice_bounds,
        &mut g.successors,
        &mut g.weights,
        false,
        options.interval_player,
    );
    let mut iterations: u64 = 0;
    let values = match options.iteration_method {
        IterationMethod::Jacobi => {
            let mut buffers = ValueBuffers::new(vec![0.0; num_states]);
            loop {
                for state in 0..num_states {
                    if zero[state] {
                        buffers.next[state] = 0.0;
                        continue;
                    }
                    buffers.next[state] = best_option(
                        &mut iterator,
                        state_bounds,
                        trans_rewards,
                        stop_rewards[state],
                        state,
                        &buffers.current,
                        buffers.current[state],
                        &mut decisions[state],
                    );
                }
                let distance = max_diff_vect(&buffers.current, &buffers.next, options.stop_criterion)?;
                buffers.swap();
                iterations += 1;
                if distance <= precision {
                    break;
                }
            }
            buffers.into_current()
        }
        IterationMethod::GaussSeidel => {
            let mut values = vec![0.0; num_states];
            loop {
                let mut distance: f64 = 0.0;
                for state in 0..num_states {
                    if zero[state] {
                        continue;
                    }
                    let present = values[state];
                    let best = best_option(
                        &mut iterator,
                        state_bounds,
                        trans_rewards,
                        stop_rewards[state],
                        state,
                        &values,
                        present,
                        &mut decisions[state],
                    );
                    distance = distance.max(checked_diff(present, best, options.stop_criterion, state)?);
                    values[state] = best;
                }
                iterations += 1;
                if distance <= precision {
                    break;
                }
            }
            values
        }
    };
    info!(seconds = time.elapsed().as_secs_f64(), iterations, "weighted reward iteration done");
    Ok(WeightedSolution { values, decisions, iterations })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledSolution {
    pub values: Vec<f64>,
    pub iterations: u64,
}

fn scheduled_value(
    iterator: &mut IntervalIterator,
    trans_rewards: &[f64],
    stop_reward: f64,
    decision: Decision,
    values: &[f64],
) -> f64 {
    match decision {
        Decision::Stop => stop_reward,
        Decision::Choice(c) => trans_rewards[c] + iterator.nondet_step(c, values),
        Decision::Unresolved => 0.0,
    }
}

/// Value of a fixed scheduler: `Stop` collects the stop reward, `Choice(c)`
/// the reward of `c` plus the interval-maximal successor value.
pub fn scheduled(
    graph: &Imdp,
    trans_rewards: &[f64],
    stop_rewards: &[f64],
    decisions: &[Decision],
    options: &Options,
) -> Result<ScheduledSolution> {
    check_rewards(graph, trans_rewards, stop_rewards)?;
    if decisions.len() != graph.num_states {
        return Err(ImdpError::invalid_model("one decision per state required"));
    }
    let (zero, _) = zero_states(graph, trans_rewards, stop_rewards);
    for (state, decision) in decisions.iter().enumerate() {
        match decision {
            Decision::Choice(c) if !graph.choices(state).contains(c) => {
                return Err(ImdpError::invalid_model(format!(
                    "choice {} does not belong to state {}",
                    c, state
                )));
            }
            Decision::Unresolved if !zero[state] => {
                return Err(ImdpError::invalid_model(format!("no decision for state {}", state)));
            }
            _ => {}
        }
    }
    let time = Instant::now();
    info!(method = ?options.iteration_method, "scheduled reward iteration started");
    let mut g = graph.clone();
    g.normalise();
    let precision = options.tolerance / 2.0;
    let num_states = g.num_states;
    let mut iterator = IntervalIterator::new(
        &g.choice_bounds,
        &mut g.successors,
        &mut g.weights,
        false,
        options.interval_player,
    );
    let mut iterations: u64 = 0;
    let values = match options.iteration_method {
        IterationMethod::Jacobi => {
            let mut buffers = ValueBuffers::new(vec![0.0; num_states]);
            loop {
                for state in 0..num_states {
                    buffers.next[state] = if zero[state] {
                        0.0
                    } else {
                        scheduled_value(
                            &mut iterator,
                            trans_rewards,
                            stop_rewards[state],
                            decisions[state],
                            &buffers.current,
                        )
                    };
                }
                let distance = max_diff_vect(&buffers.current, &buffers.next, options.stop_criterion)?;
                buffers.swap();
                iterations += 1;
                if distance <= precision {
                    break;
                }
            }
            buffers.into_current()
        }
        IterationMethod::GaussSeidel => {
            let mut values = vec![0.0; num_states];
            loop {
                let mut distance: f64 = 0.0;
                for state in 0..num_states {
                    if zero[state] {
                        continue;
                    }
                    let next =
                        scheduled_value(&mut iterator, trans_rewards, stop_rewards[state], decisions[state], &values);
                    distance = distance.max(checked_diff(values[state], next, options.stop_criterion, state)?);
                    values[state] = next;
                }
                iterations += 1;
                if distance <= precision {
                    break;
                }
            }
            values
        }
    };
    info!(seconds = time.elapsed().as_secs_f64(), iterations, "scheduled reward iteration done");
    Ok(ScheduledSolution { values, iterations })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_checking::imdp::ImdpBuilder;

    /// 0 can move to 1 paying 1, 1 can loop paying 2 or stop.
    fn walk() -> (Imdp, Vec<f64>) {
        let mut b = ImdpBuilder::new(2);
        b.add_choice_with_reward(0, 1.0).unwrap();
        b.add_transition(1, 1.0, 1.0).unwrap();
        b.add_choice_with_reward(1, -1.0).unwrap();
        b.add_transition(1, 0.5, 1.0).unwrap();
        b.add_transition(0, 0.0, 0.5).unwrap();
        b.build_with_rewards().unwrap()
    }

    fn options(method: IterationMethod) -> Options {
        Options { iteration_method: method, tolerance: 1e-9, ..Options::default() }
    }

    #[test]
    fn stop_beats_negative_loop() {
        let (g, rewards) = walk();
        let stop = vec![0.5, 3.0];
        for method in &[IterationMethod::Jacobi, IterationMethod::GaussSeidel] {
            let s = weighted(&g, &rewards, &stop, &options(*method)).unwrap();
            assert!((s.values[1] - 3.0).abs() < 1e-9);
            assert!((s.values[0] - 4.0).abs() < 1e-9);
            assert_eq!(s.decisions, vec![Decision::Choice(0), Decision::Stop]);
        }
    }

    #[test]
    fn fix_negative_marks_free_stops_and_zero_choices() {
        let mut b = ImdpBuilder::new(3);
        b.add_choice_with_reward(0, 0.0).unwrap();
        b.add_transition(1, 1.0, 1.0).unwrap();
        b.add_choice_with_reward(1, -1.0).unwrap();
        b.add_transition(1, 1.0, 1.0).unwrap();
        b.add_choice_with_reward(2, 0.0).unwrap();
        b.add_transition(0, 1.0, 1.0).unwrap();
        let (g, rewards) = b.build_with_rewards().unwrap();
        let (zero, decisions) = fix_negative(&g, &rewards, &[-1.0, 0.0, -1.0]);
        assert_eq!(zero, vec![true, true, true]);
        assert_eq!(decisions, vec![Decision::Choice(0), Decision::Stop, Decision::Choice(2)]);
    }

    #[test]
    fn scheduled_evaluates_fixed_decisions() {
        let (g, rewards) = walk();
        let stop = vec![0.5, 3.0];
        let s = scheduled(&g, &rewards, &stop, &[Decision::Stop, Decision::Stop], &options(IterationMethod::Jacobi)).unwrap();
        assert_eq!(s.values, vec![0.5, 3.0]);
        let s = scheduled(
            &g,
            &rewards,
            &stop,
            &[Decision::Choice(0), Decision::Stop],
            &options(IterationMethod::Jacobi),
        )
        .unwrap();
        assert!((s.values[0] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn free_loop_never_displaces_stop() {
        // a zero reward self loop only ever ties the stop reward
        let mut b = ImdpBuilder::new(1);
        b.add_choice_with_reward(0, 0.0).unwrap();
        b.add_transition(0, 1.0, 1.0).unwrap();
        let (g, rewards) = b.build_with_rewards().unwrap();
        let stop = vec![1.0];
        for method in &[IterationMethod::Jacobi, IterationMethod::GaussSeidel] {
            let best = weighted(&g, &rewards, &stop, &options(*method)).unwrap();
            assert_eq!(best.decisions, vec![Decision::Stop]);
            assert_eq!(best.values, vec![1.0]);
            let replay = scheduled(&g, &rewards, &stop, &best.decisions, &options(*method)).unwrap();
            assert_eq!(replay.values, best.values);
        }
    }

    #[test]
    fn recorded_decisions_reproduce_values() {
        let (g, rewards) = walk();
        for stop in &[vec![0.5, 3.0], vec![5.0, 1.0], vec![0.0, 0.0]] {
            for method in &[IterationMethod::Jacobi, IterationMethod::GaussSeidel] {
                let best = weighted(&g, &rewards, stop, &options(*method)).unwrap();
                let replay = scheduled(&g, &rewards, stop, &best.decisions, &options(*method)).unwrap();
                for (a, b) in best.values.iter().zip(replay.values.iter()) {
                    assert!((a - b).abs() < 1e-8, "{:?}: {:?} vs {:?}", stop, best.values, replay.values);
                }
            }
        }
    }

    #[test]
    fn scheduled_gauss_seidel_matches_jacobi() {
        // 1 pays 1 to reach 0, which stops for 3
        let mut b = ImdpBuilder::new(2);
        b.add_choice_with_reward(0, 0.0).unwrap();
        b.add_transition(0, 1.0, 1.0).unwrap();
        b.add_choice_with_reward(1, 1.0).unwrap();
        b.add_transition(0, 1.0, 1.0).unwrap();
        let (g, rewards) = b.build_with_rewards().unwrap();
        let stop = vec![3.0, 0.0];
        let decisions = [Decision::Stop, Decision::Choice(1)];
        let jacobi = scheduled(&g, &rewards, &stop, &decisions, &options(IterationMethod::Jacobi)).unwrap();
        let gauss_seidel = scheduled(&g, &rewards, &stop, &decisions, &options(IterationMethod::GaussSeidel)).unwrap();
        assert_eq!(jacobi.values, vec![3.0, 4.0]);
        assert_eq!(gauss_seidel.values, jacobi.values);
        assert!(gauss_seidel.iterations < jacobi.iterations);
    }

    #[test]
    fn scheduled_rejects_foreign_choice() {
        let (g, rewards) = walk();
        let r = scheduled(&g, &rewards, &[1.0, 1.0], &[Decision::Choice(1), Decision::Stop], &Options::default());
        assert!(matches!(r, Err(ImdpError::InvalidModel { .. })));
    }

    #[test]
    fn decision_codes() {
        assert_eq!(Decision::Choice(3).code(), 3);
        assert_eq!(Decision::Stop.code(), -1);
        assert_eq!(Decision::Unresolved.code(), -2);
    }
}
