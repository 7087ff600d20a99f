use minilp::{ComparisonOp, LinearExpr, OptimizationDirection, Problem, Variable};

use crate::error::{ImdpError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cmp {
    Eq,
    Ge,
    Le,
}

/// Linear feasibility problem over bounded variables.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LinearProgram {
    pub bounds: Vec<(f64, f64)>,
    pub constraints: Vec<(Vec<(usize, f64)>, Cmp, f64)>,
}

impl LinearProgram {
    pub fn new() -> LinearProgram {
        LinearProgram::default()
    }

    pub fn add_var(&mut self, lower: f64, upper: f64) -> usize {
        self.bounds.push((lower, upper));
        self.bounds.len() - 1
    }

    pub fn add_constraint(&mut self, terms: Vec<(usize, f64)>, cmp: Cmp, rhs: f64) {
        self.constraints.push((terms, cmp, rhs));
    }
}

pub trait LpBackend {
    /// Whether some assignment satisfies every constraint of `lp`.
    fn is_feasible(&mut self, lp: &LinearProgram) -> Result<bool>;
}

/// Dense simplex solver from the `minilp` crate, solved with a zero
/// objective.
#[derive(Debug, Default)]
pub struct MiniLp;

impl LpBackend for MiniLp {
    fn is_feasible(&mut self, lp: &LinearProgram) -> Result<bool> {
        let mut problem = Problem::new(OptimizationDirection::Minimize);
        let vars: Vec<Variable> = lp
            .bounds
            .iter()
            .map(|&(lower, upper)| problem.add_var(0.0, (lower, upper)))
            .collect();
        for (terms, cmp, rhs) in lp.constraints.iter() {
            let mut expr = LinearExpr::empty();
            let mut num_terms = 0;
            for &(v, coeff) in terms.iter() {
                if coeff != 0.0 {
                    expr.add(vars[v], coeff);
                    num_terms += 1;
                }
            }
            if num_terms == 0 {
                let holds = match cmp {
                    Cmp::Eq => *rhs == 0.0,
                    Cmp::Ge => 0.0 >= *rhs,
                    Cmp::Le => 0.0 <= *rhs,
                };
                if !holds {
                    return Ok(false);
                }
                continue;
            }
            let op = match cmp {
                Cmp::Eq => ComparisonOp::Eq,
                Cmp::Ge => ComparisonOp::Ge,
                Cmp::Le => ComparisonOp::Le,
            };
            problem.add_constraint(expr, op, *rhs);
        }
        match problem.solve() {
            Ok(_) => Ok(true),
            Err(minilp::Error::Infeasible) => Ok(false),
            Err(e) => Err(ImdpError::LpSolver { reason: format!("{:?}", e) }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feasible_split() {
        let mut lp = LinearProgram::new();
        let x = lp.add_var(0.0, 1.0);
        let y = lp.add_var(0.0, 1.0);
        lp.add_constraint(vec![(x, 1.0), (y, 1.0)], Cmp::Eq, 1.0);
        lp.add_constraint(vec![(x, 1.0)], Cmp::Ge, 0.7);
        assert!(MiniLp.is_feasible(&lp).unwrap());
    }

    #[test]
    fn infeasible_split() {
        let mut lp = LinearProgram::new();
        let x = lp.add_var(0.0, 1.0);
        let y = lp.add_var(0.0, 1.0);
        lp.add_constraint(vec![(x, 1.0), (y, 1.0)], Cmp::Eq, 1.0);
        lp.add_constraint(vec![(x, 1.0)], Cmp::Le, 0.2);
        lp.add_constraint(vec![(y, 1.0)], Cmp::Le, 0.2);
        assert!(!MiniLp.is_feasible(&lp).unwrap());
    }
}
