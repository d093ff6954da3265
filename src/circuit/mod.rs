//! Circuit representation.
//!
//! A [`Circuit`] owns the node index space, the device list and, once
//! finalized, the MNA buffers every analysis works on. Circuits are built
//! either through the `add_*` methods or from a JSON [`Netlist`](crate::netlist::Netlist).

mod graph;
mod types;
mod validate;

pub use graph::Circuit;
pub use types::*;
pub use validate::check_voltage_source_loops;
