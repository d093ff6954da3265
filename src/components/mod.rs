//! Device models for circuit simulation.
//!
//! This module provides models for all supported devices:
//! - Linear: Resistor, Capacitor, Inductor
//! - Sources: Voltage Source, Current Source
//! - Nonlinear: Diode, MOSFET
//! - Controlled: Op-Amp (finite-gain VCVS)
//!
//! Each device implements [`Stamp`], adding its contributions to the MNA
//! buffers in Newton residual form.

mod diode;
mod linear;
mod mosfet;
mod opamp;
mod sources;

pub use diode::{Diode, DiodeKind};
pub use linear::{Capacitor, Inductor, Resistor};
pub use mosfet::{Mosfet, MosfetType, OperatingPoint};
pub use opamp::OpAmp;
pub use sources::{CurrentSource, VoltageSource};

use crate::solver::Matrix;

/// Contributions of a device to the MNA system.
///
/// `load_linear` runs once at finalization and fills the constant
/// conductance matrix `gl` and the capacitance matrix `c`. The other loads
/// run every Newton iteration, adding `-f(x)` into `rhs` and `df/dx` into
/// `g`.
pub trait Stamp {
    fn load_linear(&self, _gl: &mut Matrix, _c: &mut Matrix) {}

    fn load_dc(&self, _g: &mut Matrix, _soln: &[f64], _rhs: &mut [f64]) {}

    /// Defaults to the DC load, which is correct for devices whose
    /// nonlinear part does not depend on time.
    fn load_tran(&self, g: &mut Matrix, soln: &[f64], rhs: &mut [f64], _time: f64) {
        self.load_dc(g, soln, rhs);
    }

    /// Small-signal excitation, only called on the swept source.
    fn load_ac(&self, _rhs: &mut [f64]) {}

    /// Next time after `time` where the device's excitation changes slope.
    fn breakpoint(&self, _time: f64) -> Option<f64> {
        None
    }
}

/// A circuit device.
#[derive(Debug, Clone)]
pub enum Device {
    Resistor(Resistor),
    Capacitor(Capacitor),
    Inductor(Inductor),
    VoltageSource(VoltageSource),
    CurrentSource(CurrentSource),
    Diode(Diode),
    OpAmp(OpAmp),
    Mosfet(Mosfet),
}

impl Device {
    fn as_stamp(&self) -> &dyn Stamp {
        match self {
            Device::Resistor(r) => r,
            Device::Capacitor(c) => c,
            Device::Inductor(l) => l,
            Device::VoltageSource(v) => v,
            Device::CurrentSource(i) => i,
            Device::Diode(d) => d,
            Device::OpAmp(o) => o,
            Device::Mosfet(m) => m,
        }
    }

    /// Get the device name.
    pub fn name(&self) -> &str {
        match self {
            Device::Resistor(r) => &r.name,
            Device::Capacitor(c) => &c.name,
            Device::Inductor(l) => &l.name,
            Device::VoltageSource(v) => &v.name,
            Device::CurrentSource(i) => &i.name,
            Device::Diode(d) => &d.name,
            Device::OpAmp(o) => &o.name,
            Device::Mosfet(m) => &m.name,
        }
    }

    /// Check if this device is nonlinear (requires Newton-Raphson iteration).
    pub fn is_nonlinear(&self) -> bool {
        matches!(self, Device::Diode(_) | Device::Mosfet(_))
    }

    /// Branch current unknown owned by the device, if any.
    pub fn branch(&self) -> Option<usize> {
        match self {
            Device::Inductor(l) => Some(l.branch),
            Device::VoltageSource(v) => Some(v.branch),
            Device::OpAmp(o) => Some(o.branch),
            _ => None,
        }
    }

    /// Period of the device's excitation, 0 when aperiodic.
    pub fn period(&self) -> f64 {
        match self {
            Device::VoltageSource(v) => v.waveform.period,
            Device::CurrentSource(i) => i.waveform.period,
            _ => 0.0,
        }
    }

    /// Largest excitation magnitude, 0 for devices that are not sources.
    pub fn source_peak(&self) -> f64 {
        match self {
            Device::VoltageSource(v) => v.waveform.peak(),
            Device::CurrentSource(i) => i.waveform.peak(),
            _ => 0.0,
        }
    }

    /// Whether the device can be swept in AC analysis.
    pub fn is_source(&self) -> bool {
        matches!(self, Device::VoltageSource(_) | Device::CurrentSource(_))
    }
}

impl Stamp for Device {
    fn load_linear(&self, gl: &mut Matrix, c: &mut Matrix) {
        self.as_stamp().load_linear(gl, c);
    }

    fn load_dc(&self, g: &mut Matrix, soln: &[f64], rhs: &mut [f64]) {
        self.as_stamp().load_dc(g, soln, rhs);
    }

    fn load_tran(&self, g: &mut Matrix, soln: &[f64], rhs: &mut [f64], time: f64) {
        self.as_stamp().load_tran(g, soln, rhs, time);
    }

    fn load_ac(&self, rhs: &mut [f64]) {
        self.as_stamp().load_ac(rhs);
    }

    fn breakpoint(&self, time: f64) -> Option<f64> {
        self.as_stamp().breakpoint(time)
    }
}
