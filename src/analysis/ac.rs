//! Small-signal AC analysis.
//!
//! The circuit is linearized at its DC operating point and driven by a unit
//! excitation on one source. For each frequency the complex system
//! `(G + jωC) x = b` is solved as the real system
//!
//! ```text
//! [ G  -ωC ] [re]   [b]
//! [ ωC   G ] [im] = [0]
//! ```

use std::collections::BTreeMap;
use std::f64::consts::{LN_10, PI};

use tracing::{debug, info};

use super::{dc, result_labels, AcRequest, AcResult};
use crate::circuit::Circuit;
use crate::components::Stamp;
use crate::error::{NodalError, Result};
use crate::solver::{Matrix, MnaSystem, SimulatorConfig};

/// Relative padding on the stop frequency so rounding keeps the last point.
const STOP_PADDING: f64 = 1.0001;

/// Phase jump between neighbouring points treated as a wrap, in degrees.
const PHASE_WRAP_THRESHOLD: f64 = 90.0;

/// Real-valued form of the complex small-signal system at `omega`.
fn build_system(system: &MnaSystem, excitation: &[f64], omega: f64, out: &mut Matrix) {
    let n = system.size;
    let last = 2 * n;
    for i in 0..n {
        out.set(i, last, excitation[i]);
        out.set(i + n, last, 0.0);
        for j in 0..n {
            let g = system.g.get(i, j);
            let wc = omega * system.c.get(i, j);
            out.set(i, j, g);
            out.set(i + n, j + n, g);
            out.set(i, j + n, -wc);
            out.set(i + n, j, wc);
        }
    }
}

/// Phase of each unknown with jumps above 90 degrees folded by 360.
#[derive(Debug)]
struct PhaseUnwrapper {
    offsets: Vec<f64>,
    last: Vec<f64>,
    seen: Vec<usize>,
}

impl PhaseUnwrapper {
    fn new(size: usize) -> Self {
        Self {
            offsets: vec![0.0; size],
            last: vec![0.0; size],
            seen: vec![0; size],
        }
    }

    /// Jumps are only tracked from the third sample on.
    fn unwrap(&mut self, i: usize, phase: f64) -> f64 {
        if self.seen[i] > 1 {
            let jump = phase + self.offsets[i] - self.last[i];
            if jump > PHASE_WRAP_THRESHOLD {
                self.offsets[i] -= 360.0;
            } else if jump < -PHASE_WRAP_THRESHOLD {
                self.offsets[i] += 360.0;
            }
        }
        let unwrapped = phase + self.offsets[i];
        self.last[i] = unwrapped;
        self.seen[i] += 1;
        unwrapped
    }
}

/// Sweep `request.source` logarithmically from `f_start` to `f_stop`.
///
/// Requires a DC operating point, which is computed first; a DC failure
/// aborts the sweep. Only node voltages are reported.
pub fn run(circuit: &mut Circuit, config: &SimulatorConfig, request: &AcRequest) -> Result<AcResult> {
    request.validate()?;
    let _span = tracing::info_span!(
        "ac_analysis",
        source = %request.source,
        f_start = request.f_start,
        f_stop = request.f_stop
    )
    .entered();

    match circuit.device(&request.source) {
        Some(device) if device.is_source() => {}
        _ => {
            return Err(NodalError::UnknownSource {
                name: request.source.clone(),
            })
        }
    }

    dc::run(circuit, config)?;

    let system = circuit
        .system()
        .ok_or_else(|| NodalError::dimension("circuit buffers missing after DC analysis"))?;
    let n = system.size;

    let mut excitation = vec![0.0; n];
    if let Some(device) = circuit.device(&request.source) {
        device.load_ac(&mut excitation);
    }

    let mut frequencies = Vec::new();
    let mut re_im: Vec<Vec<(f64, f64)>> = vec![Vec::new(); n];
    let mut matrix = Matrix::new(2 * n, 2 * n + 1);

    let delta_f = (LN_10 / request.points_per_decade as f64).exp();
    let f_stop = request.f_stop * STOP_PADDING;
    let mut f = request.f_start;
    while f <= f_stop {
        let omega = 2.0 * PI * f;
        build_system(system, &excitation, omega, &mut matrix);
        let x = matrix.solve(None)?;
        for (i, series) in re_im.iter_mut().enumerate() {
            series.push((x[i], x[i + n]));
        }
        frequencies.push(f);
        f *= delta_f;
    }
    debug!(points = frequencies.len(), "AC sweep solved");

    let mut unwrapper = PhaseUnwrapper::new(n);
    let mut magnitudes: Vec<Vec<f64>> = Vec::with_capacity(n);
    let mut phases: Vec<Vec<f64>> = Vec::with_capacity(n);
    for (i, series) in re_im.iter().enumerate() {
        magnitudes.push(series.iter().map(|&(re, im)| re.hypot(im)).collect());
        phases.push(
            series
                .iter()
                .map(|&(re, im)| unwrapper.unwrap(i, im.atan2(re).to_degrees()))
                .collect(),
        );
    }

    let points = frequencies.len();
    let mut magnitude = BTreeMap::new();
    let mut phase = BTreeMap::new();
    for (label, index) in result_labels(circuit, false) {
        let (mag, ph) = match index {
            Some(i) => (std::mem::take(&mut magnitudes[i]), std::mem::take(&mut phases[i])),
            None => (vec![0.0; points], vec![0.0; points]),
        };
        magnitude.insert(label.clone(), mag);
        phase.insert(label, ph);
    }

    info!(points, "AC analysis complete");
    Ok(AcResult {
        frequencies,
        magnitude,
        phase,
    })
}
