//! Diode model.
//!
//! Uses the Shockley diode equation:
//!   I = area * Is * (exp(V / Vt) - 1)
//!
//! Beyond `EXP_ARG_MAX` the exponential continues as a quadratic so Newton
//! iterates far from the solution cannot overflow. For Newton-Raphson the
//! diode contributes `-I(V)` to the RHS and `dI/dV` to the conductance matrix.

use super::Stamp;
use crate::circuit::NodeIndex;
use crate::solver::{branch_voltage, stamp_current, Matrix};
use crate::THERMAL_VOLTAGE;

/// Saturation current per unit area.
pub const SATURATION_CURRENT: f64 = 1e-14;

/// Thermal voltage of the "ideal" diode type: a nearly ideal switch.
pub const IDEAL_VT: f64 = 0.1e-3;

/// Largest exponent evaluated directly.
pub const EXP_ARG_MAX: f64 = 50.0;

/// Diode flavour selected by the `type` netlist property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiodeKind {
    #[default]
    Normal,
    Ideal,
}

impl DiodeKind {
    /// Parse a `type` property. Anything other than "normal" is ideal.
    pub fn from_name(name: &str) -> Self {
        if name.eq_ignore_ascii_case("normal") {
            DiodeKind::Normal
        } else {
            DiodeKind::Ideal
        }
    }

    pub fn thermal_voltage(&self) -> f64 {
        match self {
            DiodeKind::Normal => THERMAL_VOLTAGE,
            DiodeKind::Ideal => IDEAL_VT,
        }
    }
}

/// A diode component.
#[derive(Debug, Clone)]
pub struct Diode {
    pub name: String,
    pub nodes: [NodeIndex; 2], // [anode, cathode]
    pub area: f64,
    pub kind: DiodeKind,
    is: f64,
    vt: f64,
    exp_max: f64,
}

impl Diode {
    pub fn new(name: String, nodes: [NodeIndex; 2], area: f64, kind: DiodeKind) -> Self {
        Self {
            name,
            nodes,
            area,
            kind,
            is: area * SATURATION_CURRENT,
            vt: kind.thermal_voltage(),
            exp_max: EXP_ARG_MAX.exp(),
        }
    }

    /// Current and small-signal conductance at junction voltage `vd`.
    pub fn evaluate(&self, vd: f64) -> (f64, f64) {
        let arg = vd / self.vt;
        let abs_arg = arg.abs();
        let over = abs_arg - EXP_ARG_MAX;

        let (mut e, mut de) = if over > 0.0 {
            (
                self.exp_max * (1.0 + over + 0.5 * over * over),
                self.exp_max * (1.0 + over),
            )
        } else {
            let e = abs_arg.exp();
            (e, e)
        };

        // exp(-x) = 1/exp(x), d/dx exp(-x) = exp'(x) / exp(x)^2
        if arg < 0.0 {
            e = 1.0 / e;
            de *= e * e;
        }

        let id = self.is * (e - 1.0);
        let gd = self.is * de / self.vt;
        (id, gd)
    }
}

impl Stamp for Diode {
    fn load_dc(&self, g: &mut Matrix, soln: &[f64], rhs: &mut [f64]) {
        let [anode, cathode] = self.nodes;
        let vd = branch_voltage(soln, anode, cathode);
        let (id, gd) = self.evaluate(vd);

        stamp_current(rhs, anode, cathode, id);
        g.stamp_conductance(anode, cathode, gd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn diode(kind: DiodeKind) -> Diode {
        Diode::new("D1".to_string(), [Some(0), None], 1.0, kind)
    }

    #[test]
    fn test_forward_current() {
        let d = diode(DiodeKind::Normal);
        let (id, gd) = d.evaluate(0.6);
        let expected = 1e-14 * ((0.6 / THERMAL_VOLTAGE).exp() - 1.0);
        assert_relative_eq!(id, expected, max_relative = 1e-12);
        assert_relative_eq!(gd, (id + 1e-14) / THERMAL_VOLTAGE, max_relative = 1e-12);
    }

    #[test]
    fn test_reverse_saturates() {
        let d = diode(DiodeKind::Normal);
        let (id, gd) = d.evaluate(-5.0);
        assert_relative_eq!(id, -1e-14, max_relative = 1e-9);
        assert!(gd >= 0.0 && gd < 1e-30);
    }

    #[test]
    fn test_monotone_and_continuous() {
        for kind in [DiodeKind::Normal, DiodeKind::Ideal] {
            let d = diode(kind);
            let knee = EXP_ARG_MAX * kind.thermal_voltage();

            // Continuity across the exponential limit in both directions
            for v in [knee, -knee] {
                let (below, g_below) = d.evaluate(v * (1.0 - 1e-12));
                let (above, g_above) = d.evaluate(v * (1.0 + 1e-12));
                assert_relative_eq!(below, above, max_relative = 1e-9);
                assert_relative_eq!(g_below, g_above, max_relative = 1e-9);
            }

            let mut last = f64::NEG_INFINITY;
            for step in -400..=400 {
                let v = knee * step as f64 / 200.0;
                let (id, gd) = d.evaluate(v);
                assert!(id > last || id == -d.is, "current not monotone at {v}");
                assert!(gd >= 0.0);
                last = id;
            }
        }
    }

    #[test]
    fn test_stamp() {
        let d = diode(DiodeKind::Normal);
        let mut g = Matrix::new(1, 1);
        let mut rhs = vec![0.0];
        d.load_dc(&mut g, &[0.7], &mut rhs);
        let (id, gd) = d.evaluate(0.7);
        assert_eq!(rhs[0], -id);
        assert_eq!(g.get(0, 0), gd);
    }

    #[test]
    fn test_kind_names() {
        assert_eq!(DiodeKind::from_name("normal"), DiodeKind::Normal);
        assert_eq!(DiodeKind::from_name("ideal"), DiodeKind::Ideal);
    }
}
