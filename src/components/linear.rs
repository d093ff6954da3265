//! Linear passive components: Resistor, Capacitor, Inductor.

use super::Stamp;
use crate::circuit::NodeIndex;
use crate::solver::Matrix;

/// A resistor component.
#[derive(Debug, Clone)]
pub struct Resistor {
    pub name: String,
    pub nodes: [NodeIndex; 2],
    pub resistance: f64,
}

impl Resistor {
    /// Create a new resistor. Zero resistance is handled by the circuit
    /// assembler, which substitutes a 0 V source.
    pub fn new(name: String, nodes: [NodeIndex; 2], resistance: f64) -> Self {
        Self {
            name,
            nodes,
            resistance,
        }
    }

    pub fn conductance(&self) -> f64 {
        1.0 / self.resistance
    }
}

impl Stamp for Resistor {
    fn load_linear(&self, gl: &mut Matrix, _c: &mut Matrix) {
        gl.stamp_conductance(self.nodes[0], self.nodes[1], self.conductance());
    }
}

/// A capacitor component.
#[derive(Debug, Clone)]
pub struct Capacitor {
    pub name: String,
    pub nodes: [NodeIndex; 2],
    pub capacitance: f64,
}

impl Capacitor {
    pub fn new(name: String, nodes: [NodeIndex; 2], capacitance: f64) -> Self {
        Self {
            name,
            nodes,
            capacitance,
        }
    }
}

impl Stamp for Capacitor {
    fn load_linear(&self, _gl: &mut Matrix, c: &mut Matrix) {
        c.stamp_conductance(self.nodes[0], self.nodes[1], self.capacitance);
    }
}

/// An inductor component.
///
/// The branch current is an extra unknown so the inductor behaves as a short
/// at DC:
///   v1 - v2 = L * di/dt
#[derive(Debug, Clone)]
pub struct Inductor {
    pub name: String,
    pub nodes: [NodeIndex; 2],
    pub inductance: f64,
    /// Index of the branch current unknown
    pub branch: usize,
}

impl Inductor {
    pub fn new(name: String, nodes: [NodeIndex; 2], inductance: f64, branch: usize) -> Self {
        Self {
            name,
            nodes,
            inductance,
            branch,
        }
    }
}

impl Stamp for Inductor {
    fn load_linear(&self, gl: &mut Matrix, c: &mut Matrix) {
        let [n1, n2] = self.nodes;
        let br = Some(self.branch);
        gl.stamp_entry(n1, br, 1.0);
        gl.stamp_entry(n2, br, -1.0);
        gl.stamp_entry(br, n1, -1.0);
        gl.stamp_entry(br, n2, 1.0);
        c.add(self.branch, self.branch, self.inductance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resistor_stamp() {
        let r = Resistor::new("R1".to_string(), [Some(0), None], 1000.0);
        let mut gl = Matrix::new(1, 1);
        let mut c = Matrix::new(1, 1);
        r.load_linear(&mut gl, &mut c);
        assert_eq!(gl.get(0, 0), 1e-3);
        assert_eq!(c.get(0, 0), 0.0);
    }

    #[test]
    fn test_capacitor_stamp() {
        let cap = Capacitor::new("C1".to_string(), [Some(0), Some(1)], 1e-6);
        let mut gl = Matrix::new(2, 2);
        let mut c = Matrix::new(2, 2);
        cap.load_linear(&mut gl, &mut c);
        assert_eq!(c.row(0), &[1e-6, -1e-6]);
        assert_eq!(gl.max_abs(), 0.0);
    }

    #[test]
    fn test_inductor_stamp() {
        let l = Inductor::new("L1".to_string(), [Some(0), None], 1e-3, 1);
        let mut gl = Matrix::new(2, 2);
        let mut c = Matrix::new(2, 2);
        l.load_linear(&mut gl, &mut c);
        assert_eq!(gl.row(0), &[0.0, 1.0]);
        assert_eq!(gl.row(1), &[-1.0, 0.0]);
        assert_eq!(c.get(1, 1), 1e-3);
    }
}
