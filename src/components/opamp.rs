//! Operational Amplifier model.
//!
//! A voltage-controlled voltage source with finite open-loop gain:
//!   V(out) - V(gnd) = A * (V+ - V-)
//!
//! The output current is an extra unknown that flows from the output node
//! into the op-amp's ground reference.

use super::Stamp;
use crate::circuit::NodeIndex;
use crate::solver::Matrix;

/// An operational amplifier component.
#[derive(Debug, Clone)]
pub struct OpAmp {
    pub name: String,
    pub nodes: [NodeIndex; 4], // [non-inverting (+), inverting (-), output, ground]
    /// Open-loop gain
    pub gain: f64,
    /// Index of the output current unknown
    pub branch: usize,
}

impl OpAmp {
    pub fn new(name: String, nodes: [NodeIndex; 4], gain: f64, branch: usize) -> Self {
        Self {
            name,
            nodes,
            gain,
            branch,
        }
    }

    /// Get the non-inverting input node.
    pub fn input_pos(&self) -> NodeIndex {
        self.nodes[0]
    }

    /// Get the inverting input node.
    pub fn input_neg(&self) -> NodeIndex {
        self.nodes[1]
    }

    /// Get the output node.
    pub fn output(&self) -> NodeIndex {
        self.nodes[2]
    }

    /// Get the output reference node.
    pub fn reference(&self) -> NodeIndex {
        self.nodes[3]
    }
}

impl Stamp for OpAmp {
    fn load_linear(&self, gl: &mut Matrix, _c: &mut Matrix) {
        let br = Some(self.branch);
        let inv_gain = 1.0 / self.gain;

        // KCL: output current leaves through the output node
        gl.stamp_entry(self.output(), br, 1.0);
        gl.stamp_entry(self.reference(), br, -1.0);

        // Branch equation: (Vout - Vgnd) / A - (V+ - V-) = 0
        gl.stamp_entry(br, self.output(), inv_gain);
        gl.stamp_entry(br, self.reference(), -inv_gain);
        gl.stamp_entry(br, self.input_pos(), -1.0);
        gl.stamp_entry(br, self.input_neg(), 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opamp_stamp() {
        // np=0, nn=1, no=2, ng=ground, branch=3
        let op = OpAmp::new("O1".to_string(), [Some(0), Some(1), Some(2), None], 1e5, 3);
        let mut gl = Matrix::new(4, 4);
        let mut c = Matrix::new(4, 4);
        op.load_linear(&mut gl, &mut c);

        assert_eq!(gl.row(3), &[-1.0, 1.0, 1e-5, 0.0]);
        assert_eq!(gl.get(2, 3), 1.0);
        assert_eq!(gl.get(0, 3), 0.0);
        assert_eq!(c.max_abs(), 0.0);
    }
}
