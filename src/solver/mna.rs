//! MNA system buffers and stamping helpers.

use super::matrix::Matrix;
use crate::circuit::{NodeIndex, NodeType};

/// Per-circuit MNA buffers, allocated once when the circuit is finalized.
///
/// Every analysis works in Newton residual form: devices add `-f(x)` into a
/// right-hand side vector and `df/dx` into `g` (or `c` for charge terms).
#[derive(Debug, Clone)]
pub struct MnaSystem {
    /// Number of unknowns
    pub size: usize,
    /// Kind of each unknown
    pub node_types: Vec<NodeType>,
    /// Constant part of the conductance matrix
    pub gl: Matrix,
    /// Conductance matrix at the current Newton iterate
    pub g: Matrix,
    /// Capacitance (charge derivative) matrix
    pub c: Matrix,
    /// Augmented system matrix handed to the solver
    pub matrix: Matrix,
    /// Current solution
    pub solution: Vec<f64>,
    /// Right-hand side of the Newton step
    pub rhs: Vec<f64>,
    /// Largest magnitude seen for each unknown at convergence
    pub soln_max: Vec<f64>,
    /// Absolute tolerance for each unknown
    pub abstol: Vec<f64>,
}

impl MnaSystem {
    /// Allocate zeroed buffers for the given unknowns.
    pub fn new(node_types: Vec<NodeType>, v_abstol: f64, i_abstol: f64) -> Self {
        let size = node_types.len();
        let abstol = node_types
            .iter()
            .map(|t| if t.is_voltage() { v_abstol } else { i_abstol })
            .collect();
        Self {
            size,
            node_types,
            gl: Matrix::new(size, size),
            g: Matrix::new(size, size),
            c: Matrix::new(size, size),
            matrix: Matrix::new(size, size + 1),
            solution: vec![0.0; size],
            rhs: vec![0.0; size],
            soln_max: vec![0.0; size],
            abstol,
        }
    }

    /// Convergence threshold for unknown `i`.
    pub fn tolerance(&self, i: usize, reltol: f64) -> f64 {
        self.abstol[i] + reltol * self.soln_max[i]
    }

    /// Record solution magnitudes after a converged solve.
    pub fn update_soln_max(&mut self) {
        for (m, x) in self.soln_max.iter_mut().zip(&self.solution) {
            *m = m.max(x.abs());
        }
    }

    /// Value of an unknown, 0 for ground.
    pub fn voltage(&self, node: NodeIndex) -> f64 {
        node_value(&self.solution, node)
    }
}

/// Value of `x` at `node`, 0 for ground.
pub fn node_value(x: &[f64], node: NodeIndex) -> f64 {
    node.map_or(0.0, |i| x[i])
}

/// Voltage across two nodes.
pub fn branch_voltage(x: &[f64], n1: NodeIndex, n2: NodeIndex) -> f64 {
    node_value(x, n1) - node_value(x, n2)
}

/// Add `value` to `rhs[node]` unless the node is ground.
pub fn stamp_rhs(rhs: &mut [f64], node: NodeIndex, value: f64) {
    if let Some(i) = node {
        rhs[i] += value;
    }
}

/// Stamp a current flowing from `n_pos` through the device to `n_neg`.
pub fn stamp_current(rhs: &mut [f64], n_pos: NodeIndex, n_neg: NodeIndex, current: f64) {
    stamp_rhs(rhs, n_pos, -current);
    stamp_rhs(rhs, n_neg, current);
}

impl Matrix {
    /// Add to (row, col) when neither index is ground.
    pub fn stamp_entry(&mut self, row: NodeIndex, col: NodeIndex, value: f64) {
        if let (Some(i), Some(j)) = (row, col) {
            self.add(i, j, value);
        }
    }

    /// Stamp a conductance between two nodes.
    /// For a conductance G between nodes n1 and n2:
    ///   A[n1,n1] += G
    ///   A[n2,n2] += G
    ///   A[n1,n2] -= G
    ///   A[n2,n1] -= G
    pub fn stamp_conductance(&mut self, n1: NodeIndex, n2: NodeIndex, g: f64) {
        if let Some(i) = n1 {
            self.add(i, i, g);
        }
        if let Some(j) = n2 {
            self.add(j, j, g);
        }
        if let (Some(i), Some(j)) = (n1, n2) {
            self.add(i, j, -g);
            self.add(j, i, -g);
        }
    }

    /// Stamp the KCL/KVL coupling of a branch current unknown `br` that flows
    /// from `n_pos` to `n_neg`:
    ///   A[n+,br] += 1, A[n-,br] -= 1
    ///   A[br,n+] += 1, A[br,n-] -= 1
    pub fn stamp_branch(&mut self, n_pos: NodeIndex, n_neg: NodeIndex, br: usize) {
        if let Some(i) = n_pos {
            self.add(i, br, 1.0);
            self.add(br, i, 1.0);
        }
        if let Some(j) = n_neg {
            self.add(j, br, -1.0);
            self.add(br, j, -1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_conductance_skips_ground() {
        let mut m = Matrix::new(2, 2);
        m.stamp_conductance(Some(0), None, 2.0);
        m.stamp_conductance(Some(0), Some(1), 1.0);
        assert_eq!(m.row(0), &[3.0, -1.0]);
        assert_eq!(m.row(1), &[-1.0, 1.0]);
    }

    #[test]
    fn test_stamp_branch() {
        let mut m = Matrix::new(3, 3);
        m.stamp_branch(Some(0), Some(1), 2);
        assert_eq!(m.row(2), &[1.0, -1.0, 0.0]);
        assert_eq!(m.get(0, 2), 1.0);
        assert_eq!(m.get(1, 2), -1.0);
    }

    #[test]
    fn test_stamp_current() {
        let mut rhs = vec![0.0; 2];
        stamp_current(&mut rhs, Some(0), Some(1), 1e-3);
        stamp_current(&mut rhs, None, Some(0), 1e-3);
        assert_eq!(rhs, vec![0.0, 1e-3]);
    }

    #[test]
    fn test_system_tolerances() {
        let mut sys = MnaSystem::new(vec![NodeType::Voltage, NodeType::Current], 1e-6, 1e-12);
        assert_eq!(sys.abstol, vec![1e-6, 1e-12]);
        assert_eq!(sys.matrix.cols(), 3);
        sys.solution = vec![-2.0, 1.0];
        sys.update_soln_max();
        assert_eq!(sys.soln_max, vec![2.0, 1.0]);
        assert_eq!(sys.voltage(None), 0.0);
        assert_eq!(sys.voltage(Some(0)), -2.0);
    }
}
