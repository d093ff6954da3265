//! MNA (Modified Nodal Analysis) solver.
//!
//! This module provides the numerical engine for circuit simulation.
//!
//! ## Modified Nodal Analysis
//!
//! The unknowns are node voltages and auxiliary branch currents. Each
//! analysis solves `f(x) = 0` by Newton iteration, with
//!
//! ```text
//! f(x) = Gl x + i(x) + d/dt (C x) - s(t)
//! ```
//!
//! where:
//! - `Gl` holds the constant conductances and source incidence
//! - `i(x)` are the nonlinear device currents (linearized into `G`)
//! - `C` holds capacitances and inductances
//! - `s(t)` are the independent sources
//!
//! Each Newton step solves `J dx = -f(x)` with the rank-revealing solver so
//! floating nodes do not stall the iteration.

mod matrix;
mod mna;
mod newton;
mod simulator;

pub use matrix::{scale_add, Matrix, Scale, EPS};
pub use mna::{branch_voltage, node_value, stamp_current, stamp_rhs, MnaSystem};
pub use newton::{NewtonOutcome, NewtonRaphson};
pub use simulator::{Simulator, SimulatorConfig};
