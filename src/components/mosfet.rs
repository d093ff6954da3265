//! Simplified MOSFET model (square law with channel-length modulation).
//!
//! ```text
//! cutoff:     Vgs - Vt <= 0            Ids = 0
//! saturation: Vgs - Vt <  Vds          Ids = beta/2 (1 + lambda Vds) (Vgs - Vt)^2
//! triode:     otherwise                Ids = beta (1 + lambda Vds) Vds (Vgs - Vt - Vds/2)
//! ```
//!
//! Drain and source are interchangeable: when `Vds < 0` the terminals swap
//! roles for that evaluation. P-channel devices flip every voltage and the
//! resulting current with a sign multiplier.

use super::Stamp;
use crate::circuit::NodeIndex;
use crate::solver::{branch_voltage, stamp_current, Matrix};

/// Threshold voltage.
pub const THRESHOLD: f64 = 0.5;

/// Process transconductance, A/V^2.
pub const KP: f64 = 20e-6;

/// Channel-length modulation, 1/V.
pub const LAMBDA: f64 = 0.05;

/// Channel polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MosfetType {
    N,
    P,
}

impl MosfetType {
    fn sign(&self) -> f64 {
        match self {
            MosfetType::N => 1.0,
            MosfetType::P => -1.0,
        }
    }
}

/// Small-signal operating point of a MOSFET.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperatingPoint {
    /// Drain current, signed by polarity
    pub ids: f64,
    /// Output conductance dIds/dVds
    pub gds: f64,
    /// Transconductance dIds/dVgs
    pub gm: f64,
    /// Whether drain and source swapped roles
    pub swapped: bool,
}

/// A MOSFET component.
#[derive(Debug, Clone)]
pub struct Mosfet {
    pub name: String,
    pub nodes: [NodeIndex; 3], // [drain, gate, source]
    pub mos_type: MosfetType,
    /// Width-to-length ratio
    pub ratio: f64,
    beta: f64,
}

impl Mosfet {
    pub fn new(name: String, nodes: [NodeIndex; 3], mos_type: MosfetType, ratio: f64) -> Self {
        Self {
            name,
            nodes,
            mos_type,
            ratio,
            beta: KP * ratio,
        }
    }

    /// Evaluate the channel at the given solution.
    pub fn operating_point(&self, soln: &[f64]) -> OperatingPoint {
        let sign = self.mos_type.sign();
        let [mut d, g, mut s] = self.nodes;

        let mut vds = sign * branch_voltage(soln, d, s);
        let swapped = vds < 0.0;
        if swapped {
            std::mem::swap(&mut d, &mut s);
            vds = -vds;
        }
        let vgst = sign * branch_voltage(soln, g, s) - THRESHOLD;

        if vgst <= 0.0 {
            return OperatingPoint {
                ids: 0.0,
                gds: 0.0,
                gm: 0.0,
                swapped,
            };
        }

        let clm = 1.0 + LAMBDA * vds;
        if vgst < vds {
            // Saturation
            let gm = self.beta * clm * vgst;
            OperatingPoint {
                ids: sign * 0.5 * gm * vgst,
                gds: 0.5 * self.beta * vgst * vgst * LAMBDA,
                gm,
                swapped,
            }
        } else {
            // Triode
            let k = self.beta * clm;
            OperatingPoint {
                ids: sign * k * vds * (vgst - 0.5 * vds),
                gds: k * (vgst - vds) + self.beta * LAMBDA * vds * (vgst - 0.5 * vds),
                gm: k * vds,
                swapped,
            }
        }
    }
}

impl Stamp for Mosfet {
    fn load_dc(&self, g: &mut Matrix, soln: &[f64], rhs: &mut [f64]) {
        let op = self.operating_point(soln);
        if op.ids == 0.0 && op.gm == 0.0 && op.gds == 0.0 {
            return;
        }

        let [mut d, gate, mut s] = self.nodes;
        if op.swapped {
            std::mem::swap(&mut d, &mut s);
        }

        stamp_current(rhs, d, s, op.ids);
        g.stamp_conductance(d, s, op.gds);
        g.stamp_entry(s, s, op.gm);
        g.stamp_entry(d, s, -op.gm);
        g.stamp_entry(d, gate, op.gm);
        g.stamp_entry(s, gate, -op.gm);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // Unknowns: 0 = drain, 1 = gate
    fn nfet() -> Mosfet {
        Mosfet::new("M1".to_string(), [Some(0), Some(1), None], MosfetType::N, 10.0)
    }

    #[test]
    fn test_cutoff() {
        let op = nfet().operating_point(&[5.0, 0.4]);
        assert_eq!(op.ids, 0.0);
        assert_eq!(op.gm, 0.0);
    }

    #[test]
    fn test_saturation() {
        let op = nfet().operating_point(&[5.0, 2.0]);
        let beta = 2e-4;
        assert_relative_eq!(op.ids, 0.5 * beta * 1.25 * 1.5 * 1.5, max_relative = 1e-12);
        assert_relative_eq!(op.gm, beta * 1.25 * 1.5, max_relative = 1e-12);
        assert!(!op.swapped);
    }

    #[test]
    fn test_triode_and_swap() {
        let m = nfet();
        let forward = m.operating_point(&[0.1, 2.0]);
        assert!(forward.ids > 0.0);

        // Drain below source: current reverses, terminals swap
        let reversed = Mosfet::new("M2".to_string(), [None, Some(1), Some(0)], MosfetType::N, 10.0)
            .operating_point(&[0.1, 2.1]);
        assert!(reversed.swapped);
        assert!(reversed.ids > 0.0);
    }

    #[test]
    fn test_pmos_sign() {
        // Source at unknown 0 = 5 V, gate at 3 V, drain grounded
        let m = Mosfet::new("M3".to_string(), [None, Some(1), Some(0)], MosfetType::P, 10.0);
        let op = m.operating_point(&[5.0, 3.0]);
        assert!(op.ids < 0.0);
        assert!(!op.swapped);
    }

    #[test]
    fn test_gm_matches_finite_difference() {
        let m = nfet();
        let op = m.operating_point(&[1.0, 1.2]);
        let h = 1e-7;
        let up = m.operating_point(&[1.0, 1.2 + h]).ids;
        let down = m.operating_point(&[1.0, 1.2 - h]).ids;
        assert_relative_eq!(op.gm, (up - down) / (2.0 * h), max_relative = 1e-5);
    }
}
