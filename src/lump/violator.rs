use super::partition::Partition;
use super::problem_set::ProblemSet;
use super::solver::{ProblemSetSolver, SolverStatistics};
use crate::config::LumpOptions;
use crate::error::Result;
use crate::model_checking::imdp::Imdp;
use crate::model_checking::lp::LpBackend;

/// Checks whether a state can mimic the choices of another state under the
/// current partition.
pub struct Violator<'a, B: LpBackend> {
    graph: &'a Imdp,
    options: LumpOptions,
    class_of_block: Vec<Option<usize>>,
    touched: Vec<usize>,
    problem: ProblemSet,
    solver: ProblemSetSolver<B>,
}

impl<'a, B: LpBackend> Violator<'a, B> {
    pub fn new(graph: &'a Imdp, backend: B, options: &LumpOptions) -> Violator<'a, B> {
        Violator {
            graph,
            options: options.clone(),
            class_of_block: vec![None; graph.num_states],
            touched: Vec::new(),
            problem: ProblemSet::new(),
            solver: ProblemSetSolver::new(backend, options),
        }
    }

    pub fn statistics(&self) -> SolverStatistics {
        self.solver.statistics()
    }

    fn class_of(&self, partition: &Partition, state: usize) -> Option<usize> {
        self.class_of_block[partition.block_of(state)]
    }

    fn compute_class_map(&mut self, partition: &Partition, distribution: usize) -> usize {
        for t in self.graph.transitions(distribution) {
            let block = partition.block_of(self.graph.successors[t]);
            if self.class_of_block[block].is_none() {
                self.class_of_block[block] = Some(self.touched.len());
                self.touched.push(block);
            }
        }
        self.touched.len()
    }

    fn reset_class_map(&mut self) {
        for &block in self.touched.iter() {
            self.class_of_block[block] = None;
        }
        self.touched.clear();
    }

    /// An action can only take part if every successor it must reach lies
    /// in one of the challenger's classes.
    fn compatible(&self, partition: &Partition, choice: usize) -> bool {
        self.graph
            .transitions(choice)
            .all(|t| self.class_of(partition, self.graph.successors[t]).is_some() || self.graph.weights[t].lower == 0.0)
    }

    /// Whether `compare_state` fails to mimic choice `distribution`.
    pub fn violate(&mut self, partition: &Partition, distribution: usize, compare_state: usize) -> Result<bool> {
        let num_classes = self.compute_class_map(partition, distribution);
        let actions: Vec<usize> = self
            .graph
            .choices(compare_state)
            .filter(|&c| self.compatible(partition, c))
            .collect();
        if self.options.shortcut_zero_actions && actions.is_empty() {
            self.reset_class_map();
            self.solver.stats.zero_actions += 1;
            return Ok(true);
        }
        self.problem.reset(num_classes, actions.len());
        for t in self.graph.transitions(distribution) {
            if let Some(class) = self.class_of(partition, self.graph.successors[t]) {
                self.problem.add_challenger(class, self.graph.weights[t]);
            }
        }
        for (action, &choice) in actions.iter().enumerate() {
            for t in self.graph.transitions(choice) {
                if let Some(class) = self.class_of(partition, self.graph.successors[t]) {
                    self.problem.add_defender(action, class, self.graph.weights[t]);
                }
            }
            if self.options.shortcut_action_exact_before && self.problem.action_exact(action) {
                self.reset_class_map();
                self.solver.stats.action_exact_before += 1;
                return Ok(false);
            }
        }
        self.reset_class_map();
        self.solver.check(&mut self.problem)
    }

    /// Whether some choice of `state` cannot be mimicked by `compare_state`.
    pub fn check_split_off(&mut self, partition: &Partition, state: usize, compare_state: usize) -> Result<bool> {
        if self.options.no_self_compare && state == compare_state {
            return Ok(false);
        }
        for choice in self.graph.choices(state) {
            if self.violate(partition, choice, compare_state)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn equals(&mut self, partition: &Partition, a: usize, b: usize) -> Result<bool> {
        Ok(!self.check_split_off(partition, a, b)? && !self.check_split_off(partition, b, a)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_checking::imdp::ImdpBuilder;
    use crate::model_checking::lp::MiniLp;

    /// 0 and 1 move to {2, 3} with equal bounds, 4 only reaches 3.
    fn graph() -> Imdp {
        let mut b = ImdpBuilder::new(5);
        b.add_choice(0).unwrap();
        b.add_transition(2, 0.25, 0.75).unwrap();
        b.add_transition(3, 0.25, 0.75).unwrap();
        b.add_choice(1).unwrap();
        b.add_transition(3, 0.25, 0.75).unwrap();
        b.add_transition(2, 0.25, 0.75).unwrap();
        b.add_choice(4).unwrap();
        b.add_transition(3, 1.0, 1.0).unwrap();
        b.build().unwrap()
    }

    #[test]
    fn same_block_behaviour_does_not_violate() {
        let g = graph();
        let p = Partition::new(vec![0, 0, 1, 2, 0]).unwrap();
        let mut v = Violator::new(&g, MiniLp, &LumpOptions::default());
        assert!(v.equals(&p, 0, 1).unwrap());
        assert_eq!(v.statistics().action_exact_before, 2);
    }

    #[test]
    fn missing_class_is_a_zero_action_violation() {
        let g = graph();
        let p = Partition::new(vec![0, 0, 1, 2, 0]).unwrap();
        let mut v = Violator::new(&g, MiniLp, &LumpOptions::default());
        // 4 gives block 1 no mass at all
        assert!(v.check_split_off(&p, 0, 4).unwrap());
        assert_eq!(v.statistics().unsimulable_class, 1);
        // the only choice of 0 must reach block 1, outside the classes of 4
        assert!(v.check_split_off(&p, 4, 0).unwrap());
        assert_eq!(v.statistics().zero_actions, 1);
    }

    #[test]
    fn merged_blocks_make_choices_exact() {
        let g = graph();
        let p = Partition::new(vec![0, 0, 1, 1, 0]).unwrap();
        let mut v = Violator::new(&g, MiniLp, &LumpOptions::default());
        assert!(!v.check_split_off(&p, 0, 4).unwrap());
        assert!(!v.check_split_off(&p, 4, 1).unwrap());
        assert_eq!(v.statistics().action_exact_after, 2);
    }

    #[test]
    fn self_comparison_is_skipped() {
        let g = graph();
        let p = Partition::single_block(5);
        let mut v = Violator::new(&g, MiniLp, &LumpOptions::default());
        assert!(!v.check_split_off(&p, 2, 2).unwrap());
        assert_eq!(v.statistics(), SolverStatistics::default());
    }
}
