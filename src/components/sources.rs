//! Independent voltage and current sources.

use super::Stamp;
use crate::circuit::NodeIndex;
use crate::solver::{stamp_current, Matrix};
use crate::waveform::Waveform;

/// A voltage source component.
///
/// Voltage sources require an extra row/column in the MNA matrix for the
/// branch current. The source enforces: V+ - V- = value(t)
#[derive(Debug, Clone)]
pub struct VoltageSource {
    pub name: String,
    pub nodes: [NodeIndex; 2], // [positive, negative]
    pub waveform: Waveform,
    /// Index of the branch current unknown
    pub branch: usize,
}

impl VoltageSource {
    pub fn new(name: String, nodes: [NodeIndex; 2], waveform: Waveform, branch: usize) -> Self {
        Self {
            name,
            nodes,
            waveform,
            branch,
        }
    }
}

impl Stamp for VoltageSource {
    fn load_linear(&self, gl: &mut Matrix, _c: &mut Matrix) {
        gl.stamp_branch(self.nodes[0], self.nodes[1], self.branch);
    }

    fn load_dc(&self, _g: &mut Matrix, _soln: &[f64], rhs: &mut [f64]) {
        rhs[self.branch] += self.waveform.dc;
    }

    fn load_tran(&self, _g: &mut Matrix, _soln: &[f64], rhs: &mut [f64], time: f64) {
        rhs[self.branch] += self.waveform.value(time);
    }

    fn load_ac(&self, rhs: &mut [f64]) {
        rhs[self.branch] += 1.0;
    }

    fn breakpoint(&self, time: f64) -> Option<f64> {
        self.waveform.inflection_point(time)
    }
}

/// A current source component.
///
/// Current flows from the positive node through the source to the negative
/// node. Current sources add directly to the RHS vector.
#[derive(Debug, Clone)]
pub struct CurrentSource {
    pub name: String,
    pub nodes: [NodeIndex; 2], // [positive, negative]
    pub waveform: Waveform,
}

impl CurrentSource {
    pub fn new(name: String, nodes: [NodeIndex; 2], waveform: Waveform) -> Self {
        Self {
            name,
            nodes,
            waveform,
        }
    }
}

impl Stamp for CurrentSource {
    fn load_dc(&self, _g: &mut Matrix, _soln: &[f64], rhs: &mut [f64]) {
        stamp_current(rhs, self.nodes[0], self.nodes[1], self.waveform.dc);
    }

    fn load_tran(&self, _g: &mut Matrix, _soln: &[f64], rhs: &mut [f64], time: f64) {
        stamp_current(rhs, self.nodes[0], self.nodes[1], self.waveform.value(time));
    }

    fn load_ac(&self, rhs: &mut [f64]) {
        stamp_current(rhs, self.nodes[0], self.nodes[1], 1.0);
    }

    fn breakpoint(&self, time: f64) -> Option<f64> {
        self.waveform.inflection_point(time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voltage_source_loads() {
        let v = VoltageSource::new(
            "V1".to_string(),
            [Some(0), None],
            Waveform::parse("step(1, 3, 1)").unwrap(),
            1,
        );
        let mut g = Matrix::new(2, 2);
        let mut rhs = vec![0.0; 2];
        v.load_dc(&mut g, &[0.0; 2], &mut rhs);
        assert_eq!(rhs, vec![0.0, 1.0]);

        rhs.fill(0.0);
        v.load_tran(&mut g, &[0.0; 2], &mut rhs, 5.0);
        assert_eq!(rhs, vec![0.0, 3.0]);

        rhs.fill(0.0);
        v.load_ac(&mut rhs);
        assert_eq!(rhs, vec![0.0, 1.0]);
        assert_eq!(v.breakpoint(0.0), Some(1.0));
    }

    #[test]
    fn test_current_source_direction() {
        let i = CurrentSource::new("I1".to_string(), [None, Some(0)], Waveform::constant(2e-3));
        let mut g = Matrix::new(1, 1);
        let mut rhs = vec![0.0];
        i.load_dc(&mut g, &[0.0], &mut rhs);
        assert_eq!(rhs, vec![2e-3]);
    }
}
