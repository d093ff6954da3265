//! DC operating point analysis.
//!
//! Capacitors are open and inductors are shorts: only `Gl` and the device
//! loads take part. Newton starts from whatever solution the circuit holds,
//! zero on a freshly finalized circuit.

use super::{result_labels, DcResult};
use crate::circuit::Circuit;
use crate::components::{Device, Stamp};
use crate::error::{NodalError, Result};
use crate::solver::{MnaSystem, NewtonOutcome, NewtonRaphson, SimulatorConfig};

/// Assemble the DC Newton system at the current solution.
///
/// `rhs = -Gl x - i(x) + s`, `G = Gl + di/dx`, `matrix = G`.
pub(crate) fn load_dc(devices: &[Device], system: &mut MnaSystem) -> Result<()> {
    system.gl.mul_vec(&system.solution, &mut system.rhs, -1.0)?;
    system.gl.copy_into(&mut system.g)?;
    for device in devices {
        device.load_dc(&mut system.g, &system.solution, &mut system.rhs);
    }
    system.g.copy_into(&mut system.matrix)
}

/// Solve for the DC operating point.
///
/// On success the circuit remembers that its solution is a valid operating
/// point, which transient and AC analyses build on.
pub fn run(circuit: &mut Circuit, config: &SimulatorConfig) -> Result<DcResult> {
    let _span = tracing::info_span!("dc_analysis", unknowns = circuit.size()).entered();

    let (devices, system) = circuit.parts_mut(config)?;
    let newton = NewtonRaphson::new(config, config.dc_max_iters);
    let outcome = newton.solve(system, |s| load_dc(devices, s))?;

    match outcome {
        NewtonOutcome::Converged { iterations } => {
            tracing::debug!(iterations, "DC operating point converged");
        }
        NewtonOutcome::Diverged { problem_node } | NewtonOutcome::Exhausted { problem_node } => {
            let node = problem_node
                .map(|i| circuit.label(i).to_string())
                .unwrap_or_else(|| "?".to_string());
            tracing::debug!(%node, "DC operating point failed");
            return Err(NodalError::Convergence {
                iterations: config.dc_max_iters,
                node,
            });
        }
    }

    circuit.mark_dc_done();
    Ok(snapshot(circuit))
}

/// Current solution as a label map.
fn snapshot(circuit: &Circuit) -> DcResult {
    let solution = circuit.system().map(|s| s.solution.as_slice()).unwrap_or(&[]);
    let values = result_labels(circuit, true)
        .into_iter()
        .map(|(label, index)| {
            let value = index.and_then(|i| solution.get(i).copied()).unwrap_or(0.0);
            (label, value)
        })
        .collect();
    DcResult { values }
}
