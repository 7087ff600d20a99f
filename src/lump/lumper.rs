use std::collections::VecDeque;
use std::time::Instant;

use tracing::{debug, info};

use super::partition::{fill_gaps, Partition};
use super::quotient::{build_quotient, project, representatives};
use super::signature::SignatureManager;
use super::solver::SolverStatistics;
use super::violator::Violator;
use crate::config::{IntervalPlayer, LumpMethod, Options, SplitBlockMethod};
use crate::error::{ImdpError, Result};
use crate::model_checking::imdp::Imdp;
use crate::model_checking::lp::{LpBackend, MiniLp};
use crate::model_checking::value_iteration::Objective;

#[derive(Debug, Clone)]
pub struct LumpResult {
    pub quotient: Imdp,
    /// Block, and so quotient state, of every original state.
    pub state_to_block: Vec<usize>,
    /// The input objective restated over the quotient.
    pub objective: Objective,
    pub statistics: SolverStatistics,
}

impl LumpResult {
    pub fn num_blocks(&self) -> usize {
        self.quotient.num_states
    }

    /// Values of the original states given the values of the quotient.
    pub fn quotient_to_original(&self, values: &[f64]) -> Vec<f64> {
        self.state_to_block.iter().map(|&b| values[b]).collect()
    }
}

/// Objectives and settings the lumper can preserve.
pub fn can_lump(objective: &Objective, options: &Options) -> Result<()> {
    if options.interval_player == IntervalPlayer::Antagonistic {
        return Err(ImdpError::unsupported("lumping requires a cooperative interval player"));
    }
    match objective {
        Objective::UnboundedReachability { .. } | Objective::Lump { .. } => Ok(()),
        other => Err(ImdpError::unsupported(format!("cannot lump for {}", other.name()))),
    }
}

/// Initial blocks: the target and zero states each form a block that is
/// never refined, all remaining states start in one block.
fn initial_partition(graph: &Imdp, objective: &Objective) -> Result<(Partition, Vec<usize>)> {
    match objective {
        Objective::UnboundedReachability { target, zero, .. } => {
            let mut blocks: Vec<usize> = (0..graph.num_states)
                .map(|s| {
                    if target.get(s).copied().unwrap_or(false) {
                        1
                    } else if zero.get(s).copied().unwrap_or(false) {
                        2
                    } else {
                        0
                    }
                })
                .collect();
            if target.len() != graph.num_states {
                return Err(ImdpError::invalid_model("target does not cover all states"));
            }
            fill_gaps(&mut blocks);
            let mut fixed: Vec<usize> = Vec::new();
            for (s, &b) in blocks.iter().enumerate() {
                if (target[s] || zero.get(s).copied().unwrap_or(false)) && !fixed.contains(&b) {
                    fixed.push(b);
                }
            }
            Ok((Partition::new(blocks)?, fixed))
        }
        Objective::Lump { partition } => {
            if partition.len() != graph.num_states {
                return Err(ImdpError::invalid_model(format!(
                    "partition covers {} of {} states",
                    partition.len(),
                    graph.num_states
                )));
            }
            Ok((Partition::new(partition.clone())?, Vec::new()))
        }
        other => Err(ImdpError::unsupported(format!("cannot lump for {}", other.name()))),
    }
}

/// Coarsest interval bisimulation refining an initial partition.
pub struct Lumper<'a, B: LpBackend> {
    graph: &'a Imdp,
    options: &'a Options,
    partition: Partition,
    fixed_blocks: Vec<usize>,
    violator: Violator<'a, B>,
    signatures: SignatureManager<'a>,
}

impl<'a, B: LpBackend> Lumper<'a, B> {
    /// `graph` should be normalised.
    pub fn new(graph: &'a Imdp, objective: &Objective, options: &'a Options, backend: B) -> Result<Lumper<'a, B>> {
        can_lump(objective, options)?;
        let (partition, fixed_blocks) = initial_partition(graph, objective)?;
        Ok(Lumper {
            graph,
            options,
            partition,
            fixed_blocks,
            violator: Violator::new(graph, backend, &options.lump),
            signatures: SignatureManager::new(graph, options.lump.signature_normalise),
        })
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn statistics(&self) -> SolverStatistics {
        self.violator.statistics()
    }

    pub fn lump(&mut self) -> Result<()> {
        match self.options.lump.method {
            LumpMethod::PerState => self.lump_per_state(),
            LumpMethod::PerBlock => self.lump_per_block(),
        }
    }

    fn lump_per_state(&mut self) -> Result<()> {
        let mut changed = true;
        while changed {
            changed = false;
            for state in 0..self.graph.num_states {
                let block = self.partition.block_of(state);
                if self.fixed_blocks.contains(&block) {
                    continue;
                }
                changed |= self.split_block_against(block, state)?;
            }
            debug!(blocks = self.partition.num_blocks(), "per state round");
        }
        Ok(())
    }

    fn lump_per_block(&mut self) -> Result<()> {
        let predecessors = self.graph.predecessors();
        let num_states = self.graph.num_states;
        let mut todo: VecDeque<usize> = (0..self.partition.num_blocks()).collect();
        let mut in_todo = vec![false; num_states];
        for &b in todo.iter() {
            in_todo[b] = true;
        }
        while let Some(block) = todo.pop_front() {
            in_todo[block] = false;
            if self.fixed_blocks.contains(&block) {
                continue;
            }
            let (old_from, old_to) = self.partition.block_range(block);
            let old_size = self.partition.num_blocks();
            if !self.split_block(block)? {
                continue;
            }
            let mut requeue = |b: usize, todo: &mut VecDeque<usize>| {
                if !in_todo[b] {
                    in_todo[b] = true;
                    todo.push_back(b);
                }
            };
            requeue(block, &mut todo);
            for b in old_size..self.partition.num_blocks() {
                requeue(b, &mut todo);
            }
            for &state in self.partition.states_in_range(old_from, old_to) {
                for &pred in predecessors[state].iter() {
                    requeue(self.partition.block_of(pred), &mut todo);
                }
            }
        }
        Ok(())
    }

    fn split_block(&mut self, block: usize) -> Result<bool> {
        match self.options.lump.split_block {
            SplitBlockMethod::Simple => self.split_block_simple(block),
            SplitBlockMethod::Signature => self.split_block_signature(block),
            SplitBlockMethod::PseudoSignature => self.split_block_pseudo_signature(block),
        }
    }

    /// Split `block` into the states that can mimic `state` and those that
    /// cannot.
    fn split_block_against(&mut self, block: usize, state: usize) -> Result<bool> {
        let members = self.partition.block_states(block).to_vec();
        self.partition.mark_block_for_split(block);
        for cmp in members {
            let part = if self.violator.check_split_off(&self.partition, state, cmp)? { 1 } else { 0 };
            self.partition.mark_state_for_split(cmp, part);
        }
        Ok(self.partition.split())
    }

    fn split_block_simple(&mut self, block: usize) -> Result<bool> {
        let members = self.partition.block_states(block).to_vec();
        for state in members {
            if self.split_block_against(block, state)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn group_block(&mut self, block: usize) {
        self.signatures.restart();
        for &state in self.partition.block_states(block) {
            self.signatures.add_state(&self.partition, state);
        }
    }

    fn mark_group(&mut self, signature: usize, part: usize) {
        for &state in self.signatures.group(signature) {
            self.partition.mark_state_for_split(state, part);
        }
    }

    /// One part per class of mutually equal signature representatives.
    fn split_block_signature(&mut self, block: usize) -> Result<bool> {
        self.group_block(block);
        let num_signatures = self.signatures.num_signatures();
        let mut marked = vec![false; num_signatures];
        let mut part = 0;
        self.partition.mark_block_for_split(block);
        for signature in 0..num_signatures {
            if marked[signature] {
                continue;
            }
            let state = self.signatures.state(signature, 0);
            for other in signature..num_signatures {
                if marked[other] {
                    continue;
                }
                let other_state = self.signatures.state(other, 0);
                if other == signature || self.violator.equals(&self.partition, state, other_state)? {
                    marked[other] = true;
                    self.mark_group(other, part);
                }
            }
            part += 1;
        }
        Ok(self.partition.split())
    }

    /// Split off the signature groups whose representative cannot mimic the
    /// representative of some group, one group at a time.
    fn split_block_pseudo_signature(&mut self, block: usize) -> Result<bool> {
        self.group_block(block);
        let num_signatures = self.signatures.num_signatures();
        for signature in 0..num_signatures {
            let state = self.signatures.state(signature, 0);
            self.partition.mark_block_for_split(block);
            for other in 0..num_signatures {
                let part = if other == signature {
                    0
                } else if self.violator.check_split_off(&self.partition, state, self.signatures.state(other, 0))? {
                    1
                } else {
                    0
                };
                self.mark_group(other, part);
            }
            if self.partition.split() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Quotient graph and objective of the current partition.
    pub fn quotient(&self, objective: &Objective) -> Result<LumpResult> {
        let quotient = build_quotient(self.graph, &self.partition)?;
        let reps = representatives(&self.partition);
        let objective = match objective {
            Objective::UnboundedReachability { target, zero, min } => Objective::UnboundedReachability {
                target: project(target, &reps),
                zero: if zero.is_empty() { Vec::new() } else { project(zero, &reps) },
                min: *min,
            },
            _ => Objective::Lump { partition: (0..self.partition.num_blocks()).collect() },
        };
        Ok(LumpResult {
            quotient,
            state_to_block: self.partition.state_to_block().to_vec(),
            objective,
            statistics: self.statistics(),
        })
    }
}

/// Lump `graph` for `objective` with the `minilp` backend.
pub fn lump(graph: &Imdp, objective: &Objective, options: &Options) -> Result<LumpResult> {
    lump_with_backend(graph, objective, options, MiniLp)
}

pub fn lump_with_backend<B: LpBackend>(
    graph: &Imdp,
    objective: &Objective,
    options: &Options,
    backend: B,
) -> Result<LumpResult> {
    let time = Instant::now();
    info!(objective = objective.name(), method = ?options.lump.method, split = ?options.lump.split_block, "lumping started");
    let mut normalised = graph.clone();
    normalised.normalise();
    let mut lumper = Lumper::new(&normalised, objective, options, backend)?;
    lumper.lump()?;
    let result = lumper.quotient(objective)?;
    let stats = result.statistics;
    info!(
        seconds = time.elapsed().as_secs_f64(),
        states = graph.num_states,
        blocks = result.num_blocks(),
        problem_sets_by_lp = stats.problem_sets_solved_by_lp,
        lps = stats.lps_solved,
        lp_seconds = stats.lp_time.as_secs_f64(),
        zero_actions = stats.zero_actions,
        action_exact_before = stats.action_exact_before,
        action_exact_after = stats.action_exact_after,
        unsimulable_class = stats.unsimulable_class,
        cache_size = stats.cache_size,
        cache_hits_before = stats.cache_hits_before,
        cache_hits_after = stats.cache_hits_after,
        "lumping done"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LumpOptions;
    use crate::model_checking::imdp::ImdpBuilder;
    use crate::model_checking::value_iteration::solve;

    /// 1 and 2 behave alike, 3 is the target, 4 a trap.
    fn model() -> Imdp {
        let mut b = ImdpBuilder::new(5);
        b.add_choice(0).unwrap();
        b.add_transition(1, 0.3, 0.5).unwrap();
        b.add_transition(2, 0.5, 0.7).unwrap();
        b.add_choice(0).unwrap();
        b.add_transition(4, 1.0, 1.0).unwrap();
        for s in 1..3 {
            b.add_choice(s).unwrap();
            b.add_transition(3, 0.2, 0.6).unwrap();
            b.add_transition(4, 0.4, 0.8).unwrap();
        }
        b.add_choice(4).unwrap();
        b.add_transition(4, 1.0, 1.0).unwrap();
        b.build().unwrap()
    }

    fn reach(min: bool) -> Objective {
        Objective::UnboundedReachability { target: vec![false, false, false, true, false], zero: vec![], min }
    }

    fn all_strategies() -> Vec<Options> {
        let mut all = Vec::new();
        for &method in &[LumpMethod::PerState, LumpMethod::PerBlock] {
            for &split_block in &[SplitBlockMethod::Simple, SplitBlockMethod::Signature, SplitBlockMethod::PseudoSignature] {
                all.push(Options {
                    lump: LumpOptions { method, split_block, ..LumpOptions::default() },
                    ..Options::default()
                });
            }
        }
        all
    }

    #[test]
    fn bisimilar_states_share_a_block() {
        let g = model();
        for options in all_strategies() {
            let result = lump(&g, &reach(false), &options).unwrap();
            let blocks = &result.state_to_block;
            assert_eq!(result.num_blocks(), 4, "{:?}", options.lump);
            assert_eq!(blocks[1], blocks[2]);
            assert_ne!(blocks[0], blocks[4]);
            assert_ne!(blocks[0], blocks[1]);
        }
    }

    #[test]
    fn quotient_preserves_reachability() {
        let g = model();
        for &min in &[false, true] {
            let objective = reach(min);
            let direct = solve(&g, &objective, &Options::default()).unwrap().values;
            let result = lump(&g, &objective, &Options::default()).unwrap();
            let lumped = solve(&result.quotient, &result.objective, &Options::default()).unwrap().values;
            let lifted = result.quotient_to_original(&lumped);
            for (a, b) in direct.iter().zip(lifted.iter()) {
                assert!((a - b).abs() < 1e-8, "{:?} vs {:?}", direct, lifted);
            }
        }
    }

    #[test]
    fn target_block_is_never_refined() {
        let mut b = ImdpBuilder::new(3);
        b.add_choice(0).unwrap();
        b.add_transition(1, 1.0, 1.0).unwrap();
        b.add_choice(1).unwrap();
        b.add_transition(2, 1.0, 1.0).unwrap();
        let g = b.build().unwrap();
        let objective = Objective::UnboundedReachability { target: vec![false, true, true], zero: vec![], min: false };
        let result = lump(&g, &objective, &Options::default()).unwrap();
        assert_eq!(result.state_to_block[1], result.state_to_block[2]);
        assert_eq!(result.num_blocks(), 2);
    }

    #[test]
    fn user_partition_is_refined() {
        let g = model();
        let result = lump(&g, &Objective::Lump { partition: vec![0; 5] }, &Options::default()).unwrap();
        assert_eq!(result.state_to_block[1], result.state_to_block[2]);
        assert!(matches!(result.objective, Objective::Lump { .. }));
    }

    #[test]
    fn unsupported_settings_are_refused() {
        let g = model();
        let antagonistic = Options { interval_player: IntervalPlayer::Antagonistic, ..Options::default() };
        assert!(matches!(lump(&g, &reach(false), &antagonistic), Err(ImdpError::UnsupportedObjective { .. })));
        let bounded = Objective::BoundedReachability { target: vec![false; 5], steps: 3, min: false };
        assert!(matches!(lump(&g, &bounded, &Options::default()), Err(ImdpError::UnsupportedObjective { .. })));
        let gap = Objective::Lump { partition: vec![0, 0, 2, 2, 2] };
        assert!(matches!(lump(&g, &gap, &Options::default()), Err(ImdpError::InvalidModel { .. })));
    }
}
