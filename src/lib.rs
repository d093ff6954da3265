//! # Nodal Core
//!
//! An embeddable circuit simulation engine.
//!
//! This library provides:
//! - A JSON netlist format and a small language for source waveforms
//! - Modified Nodal Analysis (MNA) with a damped Newton-Raphson core
//! - Linear devices (R, C, L), independent sources, diodes, MOSFETs and a
//!   finite-gain op-amp
//! - DC operating point, adaptive transient and small-signal AC analyses
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`netlist`] - JSON netlist records
//! - [`waveform`] - Source waveform language and evaluators
//! - [`circuit`] - Node index space, device list and topology checks
//! - [`components`] - Device models and their MNA stamps
//! - [`solver`] - Matrix kernel, MNA buffers and the Newton core
//! - [`analysis`] - DC, transient and AC drivers
//!
//! ## Usage
//!
//! ### Native CLI
//!
//! ```bash
//! nodal divider.json dc
//! nodal rc.json tran --stop 5m --points 100
//! nodal rc.json ac --source V1 --start 1 --stop 100k
//! ```
//!
//! ### Library
//!
//! ```
//! use nodal_core::{Circuit, Simulator, Waveform};
//!
//! let mut circuit = Circuit::new();
//! circuit.add_ground("gnd");
//! circuit.add_voltage_source("V1", "a", "gnd", Waveform::constant(10.0));
//! circuit.add_resistor("R1", "a", "b", 1e3).unwrap();
//! circuit.add_resistor("R2", "b", "gnd", 1e3).unwrap();
//!
//! let mut sim = Simulator::new(circuit);
//! let op = sim.dc().unwrap();
//! assert!((op.get("b").unwrap() - 5.0).abs() < 1e-9);
//! ```
//!
//! ### WASM
//!
//! ```javascript
//! import { WasmCircuitSim } from 'nodal_core';
//!
//! const sim = new WasmCircuitSim(netlistJson);
//! const op = JSON.parse(sim.dc());
//! ```
//!
//! ## Circuit Simulation Method
//!
//! Every analysis solves `f(x) = 0` for node voltages and branch currents
//! by Newton iteration. DC drops the storage terms, transient analysis
//! discretizes them with the trapezoidal rule under local truncation error
//! control, and AC analysis solves the linearized complex system at each
//! frequency of a logarithmic sweep.

pub mod analysis;
pub mod circuit;
pub mod components;
pub mod error;
pub mod netlist;
pub mod solver;
pub mod waveform;

// Re-export main types for convenience
pub use analysis::{AcRequest, AcResult, DcResult, TransientRequest, TransientResult};
pub use circuit::Circuit;
pub use error::{NodalError, Result};
pub use netlist::Netlist;
pub use solver::{Simulator, SimulatorConfig};
pub use waveform::{parse_number, Waveform};

// WASM bindings
#[cfg(feature = "wasm")]
mod wasm;

#[cfg(feature = "wasm")]
pub use wasm::WasmCircuitSim;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Thermal voltage at room temperature (approximately 26mV)
pub const THERMAL_VOLTAGE: f64 = 0.0258;
