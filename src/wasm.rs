//! WASM bindings for Nodal Core.
//!
//! This module provides JavaScript-friendly bindings for running analyses
//! in a browser. Results are returned as JSON strings in the same shape the
//! CLI prints.
//!
//! ## Usage (JavaScript)
//!
//! ```javascript
//! import init, { WasmCircuitSim } from 'nodal_core';
//!
//! await init();
//!
//! const netlist = JSON.stringify([
//!   ["g", [0, 0, 0], {}, ["gnd"]],
//!   ["v", [0, 0, 0], { name: "V1", value: "sin(0, 1, 1k)" }, ["in", "gnd"]],
//!   ["r", [0, 0, 0], { name: "R1", r: "1k" }, ["in", "out"]],
//!   ["c", [0, 0, 0], { name: "C1", c: "1u" }, ["out", "gnd"]],
//! ]);
//!
//! const sim = new WasmCircuitSim(netlist);
//! const tran = JSON.parse(sim.transient(100, 0, 5e-3, [], false));
//! const ac = JSON.parse(sim.ac(10, 1, 1e5, "V1"));
//! ```

use wasm_bindgen::prelude::*;

use crate::analysis::{AcRequest, TransientRequest};
use crate::circuit::Circuit;
use crate::error::NodalError;
use crate::netlist::Netlist;
use crate::solver::{Simulator, SimulatorConfig};

/// Initialize panic hook for better error messages in browser console.
#[wasm_bindgen(start)]
pub fn init_panic_hook() {
    console_error_panic_hook::set_once();
}

fn to_js(err: NodalError) -> JsValue {
    JsValue::from_str(&err.to_string())
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, JsValue> {
    serde_json::to_string(value).map_err(|e| {
        to_js(NodalError::WasmError {
            message: format!("could not encode result: {}", e),
        })
    })
}

/// WASM-compatible circuit simulator.
///
/// Wraps the native [`Simulator`]. The circuit keeps its state between
/// calls, so a transient run after `dc()` starts from that operating point.
#[wasm_bindgen]
pub struct WasmCircuitSim {
    simulator: Simulator,
}

#[wasm_bindgen]
impl WasmCircuitSim {
    /// Create a simulator from a JSON netlist.
    ///
    /// # Example
    /// ```javascript
    /// const sim = new WasmCircuitSim(netlistJson);
    /// ```
    #[wasm_bindgen(constructor)]
    pub fn new(netlist_json: &str) -> Result<WasmCircuitSim, JsValue> {
        let simulator = Simulator::from_json(netlist_json).map_err(to_js)?;
        Ok(WasmCircuitSim { simulator })
    }

    /// Create a simulator with custom tolerances.
    ///
    /// # Arguments
    /// * `netlist_json` - The netlist as a JSON array of records
    /// * `reltol` - Relative tolerance (default: 1e-4)
    /// * `lte_rel` - Transient LTE multiplier, at least 1 (default: 10)
    #[wasm_bindgen]
    pub fn with_config(netlist_json: &str, reltol: f64, lte_rel: f64) -> Result<WasmCircuitSim, JsValue> {
        let netlist = Netlist::from_json(netlist_json).map_err(to_js)?;
        let circuit = Circuit::from_netlist(&netlist).map_err(to_js)?;
        let config = SimulatorConfig::new().with_reltol(reltol).with_lte_rel(lte_rel);
        let simulator = Simulator::with_config(circuit, config).map_err(to_js)?;
        Ok(WasmCircuitSim { simulator })
    }

    /// DC operating point as `{ label: value }`.
    #[wasm_bindgen]
    pub fn dc(&mut self) -> Result<String, JsValue> {
        let result = self.simulator.dc().map_err(to_js)?;
        to_json(&result)
    }

    /// Transient analysis as `{ label: [values], _time_: [times] }`.
    ///
    /// # Arguments
    /// * `min_points` - Minimum number of points per source period
    /// * `t_start`, `t_stop` - Time interval in seconds
    /// * `probes` - Node names whose accuracy is always checked
    /// * `skip_initial_dc` - Start from zero instead of the DC operating point
    #[wasm_bindgen]
    pub fn transient(
        &mut self,
        min_points: usize,
        t_start: f64,
        t_stop: f64,
        probes: Vec<String>,
        skip_initial_dc: bool,
    ) -> Result<String, JsValue> {
        let request = TransientRequest::new(min_points, t_start, t_stop)
            .with_probes(probes)
            .skip_initial_dc(skip_initial_dc);
        let result = self.simulator.transient(&request).map_err(to_js)?;
        to_json(&result)
    }

    /// AC sweep as `{ node: [magnitudes], node_phase: [degrees], _frequencies_: [hz] }`.
    #[wasm_bindgen]
    pub fn ac(&mut self, points_per_decade: usize, f_start: f64, f_stop: f64, source: &str) -> Result<String, JsValue> {
        let request = AcRequest::new(points_per_decade, f_start, f_stop, source);
        let result = self.simulator.ac(&request).map_err(to_js)?;
        to_json(&result)
    }

    /// Number of unknowns in the MNA system.
    #[wasm_bindgen(getter)]
    pub fn size(&self) -> usize {
        self.simulator.circuit().size()
    }
}

/// Parse a number in engineering notation (`"10k"`, `"4.7u"`, `"0x1F"`).
///
/// Returns `undefined` when the text is not a number.
#[wasm_bindgen]
pub fn parse_number(text: &str) -> Option<f64> {
    crate::waveform::parse_number(text)
}

/// Get the library version.
#[wasm_bindgen]
pub fn version() -> String {
    crate::VERSION.to_string()
}
