//! Small dense linear program solver: two-phase tableau simplex with
//! Bland's anti-cycling rule. All variables are non-negative; optional
//! upper bounds become extra rows.

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    LessEqual,
    GreaterEqual,
    Equal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub coefficients: Vec<f64>,
    pub relation: Relation,
    pub rhs: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Optimal { x: Vec<f64>, value: f64 },
    Infeasible,
    Unbounded,
    IterationLimit,
}

/// Maximize `objective · x` subject to the constraints and `0 <= x <= upper`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearProgram {
    objective: Vec<f64>,
    constraints: Vec<Constraint>,
    upper_bounds: Vec<Option<f64>>,
    max_iterations: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Original,
    Slack,
    Artificial,
}

struct Tableau {
    rows: Vec<Vec<f64>>,
    basis: Vec<usize>,
    kinds: Vec<Column>,
}

enum Phase {
    Done,
    Unbounded,
    IterationLimit,
}

impl Tableau {
    fn width(&self) -> usize {
        self.kinds.len()
    }

    fn rhs(&self, row: usize) -> f64 {
        self.rows[row][self.width()]
    }

    fn pivot(&mut self, row: usize, column: usize) {
        let factor = self.rows[row][column];
        for value in self.rows[row].iter_mut() {
            *value /= factor;
        }
        let pivot_row = self.rows[row].clone();
        for (i, other) in self.rows.iter_mut().enumerate() {
            if i == row {
                continue;
            }
            let scale = other[column];
            if scale.abs() > 0.0 {
                for (value, p) in other.iter_mut().zip(&pivot_row) {
                    *value -= scale * p;
                }
            }
        }
        self.basis[row] = column;
    }

    fn reduced_cost(&self, costs: &[f64], column: usize) -> f64 {
        let basic: f64 = self
            .basis
            .iter()
            .enumerate()
            .map(|(i, b)| costs[*b] * self.rows[i][column])
            .sum();
        costs[column] - basic
    }

    fn objective(&self, costs: &[f64]) -> f64 {
        self.basis
            .iter()
            .enumerate()
            .map(|(i, b)| costs[*b] * self.rhs(i))
            .sum()
    }

    /// Runs simplex iterations maximizing `costs`, letting only columns for
    /// which `allowed` holds enter the basis.
    fn optimize(&mut self, costs: &[f64], allowed: impl Fn(Column) -> bool, limit: usize) -> Phase {
        for _ in 0..limit {
            let entering = (0..self.width())
                .filter(|j| allowed(self.kinds[*j]))
                .find(|j| self.reduced_cost(costs, *j) > EPSILON);
            let Some(column) = entering else {
                return Phase::Done;
            };
            let mut leaving: Option<(usize, f64)> = None;
            for row in 0..self.rows.len() {
                let a = self.rows[row][column];
                if a <= EPSILON {
                    continue;
                }
                let ratio = self.rhs(row) / a;
                leaving = match leaving {
                    None => Some((row, ratio)),
                    Some((best, best_ratio)) => {
                        if ratio < best_ratio - EPSILON
                            || ((ratio - best_ratio).abs() <= EPSILON && self.basis[row] < self.basis[best])
                        {
                            Some((row, ratio))
                        } else {
                            Some((best, best_ratio))
                        }
                    }
                };
            }
            match leaving {
                Some((row, _)) => self.pivot(row, column),
                None => return Phase::Unbounded,
            }
        }
        Phase::IterationLimit
    }
}

impl LinearProgram {
    pub fn maximize(objective: Vec<f64>) -> Self {
        let n = objective.len();
        Self {
            objective,
            constraints: vec![],
            upper_bounds: vec![None; n],
            max_iterations: 10_000,
        }
    }

    pub fn constrain(mut self, coefficients: Vec<f64>, relation: Relation, rhs: f64) -> Self {
        self.constraints.push(Constraint {
            coefficients,
            relation,
            rhs,
        });
        self
    }

    pub fn upper_bound(mut self, variable: usize, bound: f64) -> Self {
        if let Some(slot) = self.upper_bounds.get_mut(variable) {
            *slot = Some(bound);
        }
        self
    }

    pub fn iteration_limit(mut self, limit: usize) -> Self {
        self.max_iterations = limit;
        self
    }

    fn all_constraints(&self) -> Vec<Constraint> {
        let n = self.objective.len();
        let mut constraints = self.constraints.clone();
        for (i, bound) in self.upper_bounds.iter().enumerate() {
            if let Some(bound) = bound {
                let mut coefficients = vec![0.0; n];
                coefficients[i] = 1.0;
                constraints.push(Constraint {
                    coefficients,
                    relation: Relation::LessEqual,
                    rhs: *bound,
                });
            }
        }
        // right hand sides must be non-negative for the initial basis
        for c in constraints.iter_mut() {
            c.coefficients.resize(n, 0.0);
            if c.rhs < 0.0 {
                c.rhs = -c.rhs;
                c.coefficients.iter_mut().for_each(|a| *a = -*a);
                c.relation = match c.relation {
                    Relation::LessEqual => Relation::GreaterEqual,
                    Relation::GreaterEqual => Relation::LessEqual,
                    Relation::Equal => Relation::Equal,
                };
            }
        }
        constraints
    }

    fn tableau(&self, constraints: &[Constraint]) -> Tableau {
        let n = self.objective.len();
        let slacks = constraints
            .iter()
            .filter(|c| c.relation != Relation::Equal)
            .count();
        let artificials = constraints
            .iter()
            .filter(|c| c.relation != Relation::LessEqual)
            .count();
        let width = n + slacks + artificials;
        let mut kinds = vec![Column::Original; n];
        kinds.extend(std::iter::repeat_n(Column::Slack, slacks));
        kinds.extend(std::iter::repeat_n(Column::Artificial, artificials));

        let mut rows = Vec::with_capacity(constraints.len());
        let mut basis = Vec::with_capacity(constraints.len());
        let mut slack = n;
        let mut artificial = n + slacks;
        for c in constraints {
            let mut row = vec![0.0; width + 1];
            row[..n].copy_from_slice(&c.coefficients);
            row[width] = c.rhs;
            match c.relation {
                Relation::LessEqual => {
                    row[slack] = 1.0;
                    basis.push(slack);
                    slack += 1;
                }
                Relation::GreaterEqual => {
                    row[slack] = -1.0;
                    slack += 1;
                    row[artificial] = 1.0;
                    basis.push(artificial);
                    artificial += 1;
                }
                Relation::Equal => {
                    row[artificial] = 1.0;
                    basis.push(artificial);
                    artificial += 1;
                }
            }
            rows.push(row);
        }
        Tableau { rows, basis, kinds }
    }

    pub fn solve(&self) -> Outcome {
        let n = self.objective.len();
        let constraints = self.all_constraints();
        let mut tableau = self.tableau(&constraints);

        if tableau.kinds.contains(&Column::Artificial) {
            let costs: Vec<f64> = tableau
                .kinds
                .iter()
                .map(|k| if *k == Column::Artificial { -1.0 } else { 0.0 })
                .collect();
            match tableau.optimize(&costs, |_| true, self.max_iterations) {
                Phase::Done => {}
                Phase::IterationLimit => return Outcome::IterationLimit,
                // phase one is bounded by zero
                Phase::Unbounded => return Outcome::Infeasible,
            }
            if tableau.objective(&costs) < -1e-7 {
                return Outcome::Infeasible;
            }
            // drive zero-valued artificials out of the basis where possible
            for row in 0..tableau.rows.len() {
                if tableau.kinds[tableau.basis[row]] != Column::Artificial {
                    continue;
                }
                let replacement = (0..tableau.width()).find(|j| {
                    tableau.kinds[*j] != Column::Artificial && tableau.rows[row][*j].abs() > EPSILON
                });
                if let Some(column) = replacement {
                    tableau.pivot(row, column);
                }
            }
        }

        let mut costs = vec![0.0; tableau.width()];
        costs[..n].copy_from_slice(&self.objective);
        match tableau.optimize(&costs, |k| k != Column::Artificial, self.max_iterations) {
            Phase::Done => {}
            Phase::Unbounded => return Outcome::Unbounded,
            Phase::IterationLimit => return Outcome::IterationLimit,
        }
        let mut x = vec![0.0; n];
        for (row, column) in tableau.basis.iter().enumerate() {
            if *column < n {
                x[*column] = tableau.rhs(row).max(0.0);
            }
        }
        let value = x.iter().zip(&self.objective).map(|(a, b)| a * b).sum();
        Outcome::Optimal { x, value }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn optimal(outcome: Outcome) -> (Vec<f64>, f64) {
        match outcome {
            Outcome::Optimal { x, value } => (x, value),
            other => panic!("expected optimum, got {other:?}"),
        }
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_textbook_problem() {
        let (x, value) = optimal(
            LinearProgram::maximize(vec![1.0, 1.0])
                .constrain(vec![1.0, 2.0], Relation::LessEqual, 4.0)
                .constrain(vec![3.0, 1.0], Relation::LessEqual, 6.0)
                .solve(),
        );
        assert!(close(x[0], 1.6));
        assert!(close(x[1], 1.2));
        assert!(close(value, 2.8));
    }

    #[test]
    fn test_equality_and_bounds() {
        let (x, value) = optimal(
            LinearProgram::maximize(vec![1.0, 1.0])
                .constrain(vec![1.0, -1.0], Relation::Equal, 0.0)
                .constrain(vec![1.0, 1.0], Relation::LessEqual, 3.0)
                .upper_bound(0, 1.0)
                .solve(),
        );
        assert!(close(x[0], 1.0));
        assert!(close(x[1], 1.0));
        assert!(close(value, 2.0));
    }

    #[test]
    fn test_greater_equal_needs_phase_one() {
        // minimize x + y with x + y >= 2, x >= 0.5
        let (x, value) = optimal(
            LinearProgram::maximize(vec![-1.0, -1.0])
                .constrain(vec![1.0, 1.0], Relation::GreaterEqual, 2.0)
                .constrain(vec![1.0, 0.0], Relation::GreaterEqual, 0.5)
                .solve(),
        );
        assert!(close(value, -2.0));
        assert!(x[0] >= 0.5 - 1e-9);
        assert!(close(x[0] + x[1], 2.0));
    }

    #[test]
    fn test_negative_rhs_is_normalized() {
        // -x <= -1 means x >= 1
        let (x, _) = optimal(
            LinearProgram::maximize(vec![-1.0])
                .constrain(vec![-1.0], Relation::LessEqual, -1.0)
                .solve(),
        );
        assert!(close(x[0], 1.0));
    }

    #[test]
    fn test_infeasible() {
        let outcome = LinearProgram::maximize(vec![1.0])
            .constrain(vec![1.0], Relation::GreaterEqual, 2.0)
            .upper_bound(0, 1.0)
            .solve();
        assert_eq!(outcome, Outcome::Infeasible);
    }

    #[test]
    fn test_unbounded() {
        let outcome = LinearProgram::maximize(vec![1.0, 0.0])
            .constrain(vec![1.0, -1.0], Relation::LessEqual, 1.0)
            .solve();
        assert_eq!(outcome, Outcome::Unbounded);
    }

    #[test]
    fn test_redundant_equalities() {
        let (x, value) = optimal(
            LinearProgram::maximize(vec![2.0, 1.0])
                .constrain(vec![1.0, 1.0], Relation::Equal, 1.0)
                .constrain(vec![2.0, 2.0], Relation::Equal, 2.0)
                .solve(),
        );
        assert!(close(x[0], 1.0));
        assert!(close(value, 2.0));
    }

    #[test]
    fn test_iteration_limit() {
        let outcome = LinearProgram::maximize(vec![1.0, 1.0])
            .constrain(vec![1.0, 2.0], Relation::LessEqual, 4.0)
            .constrain(vec![3.0, 1.0], Relation::LessEqual, 6.0)
            .iteration_limit(1)
            .solve();
        assert_eq!(outcome, Outcome::IterationLimit);
    }
}
