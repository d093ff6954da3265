//! Transient analysis.
//!
//! Integration uses the trapezoidal rule with per-unknown current weights
//! (`beta0`, `beta1`): algebraic unknowns, priming steps and very small
//! steps fall back to backward Euler. The step size is controlled by a local
//! truncation error estimate from a three-point polynomial predictor.
//!
//! Each Newton solve sees
//!
//! ```text
//! rhs    = beta0 * c + beta1 * oldc - dq/dt
//! matrix = beta0 * G + alpha0 * C
//! ```
//!
//! where `c = -Gl x - i(x) + s(t)` and `q = C x`.

use tracing::{debug, info, warn};

use super::{dc, result_labels, TransientRequest, TransientResult};
use crate::circuit::Circuit;
use crate::components::{Device, Stamp};
use crate::error::{NodalError, Result};
use crate::solver::{scale_add, MnaSystem, NewtonOutcome, NewtonRaphson, Scale, SimulatorConfig};

/// Steps shorter than this fraction of the stop time use backward Euler.
const EULER_STEP_FRACTION: f64 = 1e-4;

/// Safety factor applied when the LTE forces a smaller step.
const SHRINK_SAFETY: f64 = 0.75;

/// LTE step ratio needed before the step grows at all.
const GROWTH_THRESHOLD: f64 = 1.2;

/// Integration state carried between steps.
#[derive(Debug)]
struct History {
    time: f64,
    oldt: f64,
    old2t: f64,
    old3t: f64,
    oldsol: Vec<f64>,
    old2sol: Vec<f64>,
    old3sol: Vec<f64>,
    /// Charges `C x` at the current and previous points
    q: Vec<f64>,
    oldq: Vec<f64>,
    old2q: Vec<f64>,
    /// Device currents `-Gl x - i(x) + s` at the current and previous points
    c: Vec<f64>,
    oldc: Vec<f64>,
    alpha0: f64,
    alpha1: f64,
    alpha2: f64,
    beta0: Vec<f64>,
    beta1: Vec<f64>,
}

impl History {
    fn new(size: usize, t_start: f64, first_step: f64) -> Self {
        let oldt = t_start - first_step;
        let old2t = oldt - first_step;
        Self {
            time: t_start,
            oldt,
            old2t,
            old3t: old2t - first_step,
            oldsol: vec![0.0; size],
            old2sol: vec![0.0; size],
            old3sol: vec![0.0; size],
            q: vec![0.0; size],
            oldq: vec![0.0; size],
            old2q: vec![0.0; size],
            c: vec![0.0; size],
            oldc: vec![0.0; size],
            alpha0: 1.0,
            alpha1: 0.0,
            alpha2: 0.0,
            beta0: vec![1.0; size],
            beta1: vec![0.0; size],
        }
    }

    /// Seed every history level from the current point.
    fn seed(&mut self, solution: &[f64]) {
        for hist in [&mut self.oldsol, &mut self.old2sol, &mut self.old3sol] {
            hist.copy_from_slice(solution);
        }
        self.oldq.copy_from_slice(&self.q);
        self.old2q.copy_from_slice(&self.q);
        self.oldc.copy_from_slice(&self.c);
    }

    /// Shift the accepted point into the history.
    fn rotate(&mut self, solution: &[f64]) {
        self.oldc.copy_from_slice(&self.c);
        std::mem::swap(&mut self.old3sol, &mut self.old2sol);
        std::mem::swap(&mut self.old2sol, &mut self.oldsol);
        self.oldsol.copy_from_slice(solution);
        self.old2q.copy_from_slice(&self.oldq);
        self.oldq.copy_from_slice(&self.q);
    }

    /// Mirror the time wheel around `t_start` for a priming step.
    fn prestep(&mut self, t_start: f64) {
        self.old3t = self.old2t - (self.oldt - self.old2t);
        self.old2t = self.oldt - (t_start - self.oldt);
        self.oldt = t_start - (self.time - self.oldt);
        self.time = t_start;
    }

    fn set_weights(&mut self, algebraic: &[bool], beta0: f64, beta1: f64) {
        for ((b0, b1), &ar) in self.beta0.iter_mut().zip(&mut self.beta1).zip(algebraic) {
            let ar = if ar { 1.0 } else { 0.0 };
            *b0 = beta0 + ar * beta1;
            *b1 = (1.0 - ar) * beta1;
        }
    }
}

/// Assemble the transient Newton system at the current solution.
fn load_tran(devices: &[Device], system: &mut MnaSystem, h: &mut History) -> Result<()> {
    system.gl.mul_vec(&system.solution, &mut h.c, -1.0)?;
    system.gl.copy_into(&mut system.g)?;
    for device in devices {
        device.load_tran(&mut system.g, &system.solution, &mut h.c, h.time);
    }
    // Storage elements are linear
    system.c.mul_vec(&system.solution, &mut h.q, 1.0)?;

    for i in 0..system.size {
        let dqdt = h.alpha0 * h.q[i] + h.alpha1 * h.oldq[i] + h.alpha2 * h.old2q[i];
        system.rhs[i] = h.beta0[i] * h.c[i] + h.beta1[i] * h.oldc[i] - dqdt;
    }

    scale_add(
        &system.g,
        &system.c,
        Scale::PerRow(&h.beta0),
        Scale::Uniform(h.alpha0),
        &mut system.matrix,
    )
}

/// Lagrange coefficients for extrapolating `(t0, t1, t2)` to `t`.
fn interp_coeffs(t: f64, t0: f64, t1: f64, t2: f64) -> [f64; 3] {
    let (dtt0, dtt1, dtt2) = (t - t0, t - t1, t - t2);
    let (dt0dt1, dt0dt2, dt1dt2) = (t0 - t1, t0 - t2, t1 - t2);
    [
        (dtt1 * dtt2) / (dt0dt1 * dt0dt2),
        (dtt0 * dtt2) / (-dt0dt1 * dt1dt2),
        (dtt0 * dtt1) / (dt0dt2 * dt1dt2),
    ]
}

/// Step bounds for one run.
#[derive(Debug, Clone, Copy)]
struct StepLimits {
    min: f64,
    max: f64,
}

/// Next step size from the LTE of the point just solved.
fn pick_step(
    system: &MnaSystem,
    h: &History,
    lte_check: &[bool],
    config: &SimulatorConfig,
    limits: StepLimits,
) -> f64 {
    let p = interp_coeffs(h.time, h.oldt, h.old2t, h.old3t);
    let dt = h.time - h.oldt;
    let trapcoeff = 0.5 * dt / (h.time - h.old3t);

    let mut max_ratio = 0.0f64;
    for i in (0..system.size).filter(|&i| lte_check[i]) {
        let pred = p[0] * h.oldsol[i] + p[1] * h.old2sol[i] + p[2] * h.old3sol[i];
        let lte = (system.solution[i] - pred).abs() * trapcoeff;
        let ratio = lte / (config.lte_rel * system.tolerance(i, config.reltol));
        max_ratio = max_ratio.max(ratio);
    }

    // Cube root because the trapezoidal error is third order
    let step_ratio = 1.0 / max_ratio.cbrt();
    if step_ratio < 1.0 {
        let step_ratio = step_ratio.max(1.0 / config.lte_step_decrease_factor);
        (dt * SHRINK_SAFETY * step_ratio).max(limits.min)
    } else {
        let step_ratio = step_ratio.min(config.step_increase_factor);
        let step = if step_ratio > GROWTH_THRESHOLD {
            dt * step_ratio / GROWTH_THRESHOLD
        } else {
            dt
        };
        step.min(limits.max)
    }
}

/// Step to retry with after a rejected Newton solve.
fn shrink_after_failure(dt: f64, config: &SimulatorConfig, limits: StepLimits) -> f64 {
    (dt / config.nr_step_decrease_factor).max(limits.min)
}

/// First unknown that is not finite or lies beyond `bound`.
fn runaway_unknown(solution: &[f64], bound: f64) -> Option<usize> {
    solution.iter().position(|x| !x.is_finite() || x.abs() > bound)
}

/// Earliest source breakpoint strictly after `time`.
fn next_breakpoint(devices: &[Device], time: f64) -> Option<f64> {
    devices
        .iter()
        .filter_map(|d| d.breakpoint(time))
        .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.min(t))))
}

/// Bring the circuit to its initial condition.
fn initial_condition(circuit: &mut Circuit, config: &SimulatorConfig, request: &TransientRequest) -> Result<()> {
    if request.skip_initial_dc {
        circuit.reset();
        return circuit.finalize(config);
    }
    if circuit.did_dc() {
        return circuit.finalize(config);
    }
    match dc::run(circuit, config) {
        Ok(_) => Ok(()),
        Err(err @ NodalError::Convergence { .. }) if config.allow_dc_fallback => {
            warn!(error = %err, "DC failed, starting transient analysis from zero");
            circuit.reset();
            circuit.finalize(config)
        }
        Err(err) => Err(err),
    }
}

/// Run a transient analysis over `[t_start, t_stop]`.
///
/// Starts from the DC operating point unless the request skips it. Output
/// points are the accepted time steps, so their spacing is not uniform.
pub fn run(circuit: &mut Circuit, config: &SimulatorConfig, request: &TransientRequest) -> Result<TransientResult> {
    request.validate()?;
    let t_start = request.t_start;
    let t_stop = request.t_stop;
    let _span = tracing::info_span!("transient_analysis", t_start, t_stop).entered();

    initial_condition(circuit, config, request)?;
    // Integration moves the state off the operating point
    circuit.clear_dc_done();

    let n = circuit.size();
    let labels: Vec<String> = (0..n).map(|i| circuit.label(i).to_string()).collect();

    let interval = t_stop - t_start;
    let period = circuit
        .devices()
        .iter()
        .map(Device::period)
        .filter(|&p| p > 0.0)
        .fold(interval, f64::min);
    let periods = (interval / period).ceil().max(1.0);

    let max_step = interval / (periods * request.min_points as f64);
    let limits = StepLimits {
        min: max_step * config.min_step_ratio,
        max: max_step,
    };
    let max_steps = (periods as usize).saturating_mul(config.max_steps_per_period);
    let source_scale = circuit.devices().iter().map(Device::source_peak).fold(1.0, f64::max);
    let bound = config.solution_bound * source_scale;

    let mut probes = Vec::new();
    for name in &request.probes {
        match circuit.node_index(name) {
            Some(Some(i)) => probes.push(i),
            Some(None) => {}
            None => warn!(probe = %name, "probe names no node in the circuit"),
        }
    }

    let (devices, system) = circuit.parts_mut(config)?;
    let algebraic = system.c.algebraic_rows();
    let mut lte_check: Vec<bool> = algebraic.iter().map(|ar| !ar).collect();
    for i in probes {
        lte_check[i] = true;
    }

    debug!(periods, max_step, min_step = limits.min, max_steps, "transient setup");

    let mut new_step = max_step / 1e6;
    let mut h = History::new(n, t_start, new_step);
    load_tran(devices, system, &mut h)?;
    h.seed(&system.solution);

    let newton = NewtonRaphson::new(config, config.tran_max_iters);
    let reltol = config.reltol;
    let mut response: Vec<Vec<f64>> = vec![Vec::new(); n];
    let mut times = Vec::new();
    let mut finished = false;
    let mut rejected = 0usize;

    let first_index = -(config.prime_steps as i64) - 1;
    for step_index in first_index..max_steps as i64 {
        if step_index >= 0 {
            for (series, &x) in response.iter_mut().zip(&system.solution) {
                series.push(x);
            }
        }
        h.rotate(&system.solution);

        if step_index < 0 {
            // Priming step with backward Euler
            h.prestep(t_start);
            h.set_weights(&algebraic, 1.0, 0.0);
        } else {
            times.push(h.time);
            h.old3t = h.old2t;
            h.old2t = h.oldt;
            h.oldt = h.time;
            if h.time >= t_stop {
                finished = true;
                break;
            }

            // Come smoothly into the end of the interval
            let mut next = if h.time + new_step > t_stop {
                t_stop
            } else if h.time + 1.5 * new_step > t_stop {
                h.time + (2.0 / 3.0) * (t_stop - h.time)
            } else {
                h.time + new_step
            };
            if let Some(bp) = next_breakpoint(devices, h.oldt + limits.min) {
                next = next.min(bp);
            }
            h.time = next;
            h.set_weights(&algebraic, 0.5, 0.5);
        }

        loop {
            let dt = h.time - h.oldt;
            h.alpha0 = 1.0 / dt;
            h.alpha1 = -h.alpha0;
            h.alpha2 = 0.0;

            if dt < EULER_STEP_FRACTION * t_stop {
                h.beta0.fill(1.0);
                h.beta1.fill(0.0);
            }

            let mut outcome = newton.solve(system, |s| load_tran(devices, s, &mut h))?;
            if outcome.is_converged() {
                // A nearly singular system can converge onto garbage
                if let Some(i) = runaway_unknown(&system.solution, bound) {
                    let unknown = &labels[i];
                    debug!(time = h.time, %unknown, value = system.solution[i], "solution out of bounds");
                    outcome = NewtonOutcome::Diverged { problem_node: Some(i) };
                }
            }
            let at_floor = dt < (1.0 + reltol) * limits.min;

            match outcome {
                NewtonOutcome::Converged { .. } if step_index <= 0 || at_floor => {
                    if step_index > 0 {
                        new_step = config.step_increase_factor * limits.min;
                    }
                    break;
                }
                NewtonOutcome::Converged { .. } => {
                    new_step = pick_step(system, &h, &lte_check, config, limits);
                    if new_step < (1.0 - reltol) * dt {
                        rejected += 1;
                        h.time = h.oldt + new_step;
                    } else {
                        break;
                    }
                }
                NewtonOutcome::Diverged { problem_node } | NewtonOutcome::Exhausted { problem_node } => {
                    if at_floor {
                        let node = problem_node
                            .and_then(|i| labels.get(i).cloned())
                            .unwrap_or_else(|| "?".to_string());
                        debug!(time = h.time, %node, "newton failed at the minimum step");
                        return Err(NodalError::Convergence {
                            iterations: config.tran_max_iters,
                            node,
                        });
                    }
                    system.solution.copy_from_slice(&h.oldsol);
                    rejected += 1;
                    h.time = h.oldt + shrink_after_failure(dt, config, limits);
                }
            }
        }
    }

    if !finished {
        return Err(NodalError::StepLimitExceeded {
            time: h.time,
            message: format!("step ceiling of {} reached before t={}", max_steps, t_stop),
        });
    }

    info!(points = times.len(), rejected, "transient analysis complete");

    let series = result_labels(circuit, true)
        .into_iter()
        .map(|(label, index)| {
            let values = match index {
                Some(i) => std::mem::take(&mut response[i]),
                None => vec![0.0; times.len()],
            };
            (label, values)
        })
        .collect();

    Ok(TransientResult { time: times, series })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::DiodeKind;
    use crate::waveform::Waveform;
    use approx::assert_abs_diff_eq;

    fn rc_circuit() -> Circuit {
        let mut c = Circuit::new();
        c.add_ground("0");
        c.add_voltage_source("V1", "in", "0", Waveform::constant(5.0));
        c.add_resistor("R1", "in", "out", 1e3).unwrap();
        c.add_capacitor("C1", "out", "0", 1e-6).unwrap();
        c
    }

    /// RC branch next to a forward-biased diode, so DC needs several Newton iterations.
    fn rc_with_diode() -> Circuit {
        let mut c = rc_circuit();
        c.add_resistor("R2", "in", "a", 1e3).unwrap();
        c.add_diode("D1", "a", "0", 1.0, DiodeKind::Normal).unwrap();
        c
    }

    #[test]
    fn test_interp_coeffs_reproduce_quadratic() {
        let f = |t: f64| 3.0 * t * t - 2.0 * t + 1.0;
        let p = interp_coeffs(4.0, 3.0, 1.5, 0.5);
        let pred = p[0] * f(3.0) + p[1] * f(1.5) + p[2] * f(0.5);
        assert_abs_diff_eq!(pred, f(4.0), epsilon = 1e-9);
    }

    #[test]
    fn test_rc_charging() {
        let mut c = rc_circuit();
        let request = TransientRequest::new(100, 0.0, 5e-3).skip_initial_dc(true);
        let result = run(&mut c, &SimulatorConfig::default(), &request).unwrap();

        let out = result.get("out").unwrap();
        assert_eq!(out.len(), result.time.len());
        assert_abs_diff_eq!(result.time[0], 0.0);
        assert_abs_diff_eq!(*result.time.last().unwrap(), 5e-3, epsilon = 1e-15);

        for (&t, &v) in result.time.iter().zip(out) {
            let expected = 5.0 * (1.0 - (-t / 1e-3).exp());
            assert_abs_diff_eq!(v, expected, epsilon = 0.05);
        }
        assert!(result.time.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn test_starts_from_operating_point() {
        let mut c = rc_circuit();
        let request = TransientRequest::new(20, 0.0, 1e-3);
        let result = run(&mut c, &SimulatorConfig::default(), &request).unwrap();
        for &v in result.get("out").unwrap() {
            assert_abs_diff_eq!(v, 5.0, epsilon = 1e-6);
        }
        assert!(result.get("0").unwrap().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_lands_on_breakpoints() {
        let mut c = Circuit::new();
        c.add_ground("0");
        c.add_voltage_source("V1", "in", "0", Waveform::parse("step(0, 5, 1m, 10u)").unwrap());
        c.add_resistor("R1", "in", "out", 1e3).unwrap();
        c.add_resistor("R2", "out", "0", 1e3).unwrap();

        let request = TransientRequest::new(10, 0.0, 3e-3);
        let result = run(&mut c, &SimulatorConfig::default(), &request).unwrap();
        assert!(result.time.iter().any(|&t| (t - 1e-3).abs() < 1e-12));
        assert!(result.time.iter().any(|&t| (t - 1.01e-3).abs() < 1e-12));

        let out = result.get("out").unwrap();
        for (&t, &v) in result.time.iter().zip(out) {
            if t >= 1.01e-3 {
                assert_abs_diff_eq!(v, 2.5, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_step_ceiling() {
        let mut c = rc_circuit();
        let config = SimulatorConfig::default().with_max_steps_per_period(5);
        let request = TransientRequest::new(100, 0.0, 5e-3).skip_initial_dc(true);
        assert!(matches!(
            run(&mut c, &config, &request),
            Err(NodalError::StepLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_invalid_request() {
        let mut c = rc_circuit();
        let request = TransientRequest::new(10, 1.0, 0.5);
        assert!(matches!(
            run(&mut c, &SimulatorConfig::default(), &request),
            Err(NodalError::InvalidSimulationParam { .. })
        ));
    }

    #[test]
    fn test_repeated_run_starts_from_operating_point() {
        let mut c = Circuit::new();
        c.add_ground("0");
        c.add_voltage_source("V1", "in", "0", Waveform::parse("pulse(0, 5, 1m, 10u, 10u, 1m, 2m)").unwrap());
        c.add_resistor("R1", "in", "out", 1e3).unwrap();
        c.add_capacitor("C1", "out", "0", 1e-6).unwrap();

        let request = TransientRequest::new(20, 0.0, 2e-3);
        let config = SimulatorConfig::default();
        let first = run(&mut c, &config, &request).unwrap();
        assert!(!c.did_dc());
        let second = run(&mut c, &config, &request).unwrap();

        let (a, b) = (first.get("out").unwrap(), second.get("out").unwrap());
        assert!(a.last().unwrap().abs() > 0.1);
        assert_abs_diff_eq!(a[0], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(b[0], a[0], epsilon = 1e-9);
    }

    #[test]
    fn test_dc_failure_falls_back_to_zero() {
        let mut c = rc_with_diode();
        let config = SimulatorConfig::default().with_max_iterations(2, 1000);
        let request = TransientRequest::new(100, 0.0, 5e-3);
        let result = run(&mut c, &config, &request).unwrap();

        let out = result.get("out").unwrap();
        assert!(out[0].abs() < 1e-3);
        assert!(*out.last().unwrap() > 4.5);

        let mut c = rc_with_diode();
        let strict = config.with_dc_fallback(false);
        assert!(matches!(
            run(&mut c, &strict, &request),
            Err(NodalError::Convergence { iterations: 2, .. })
        ));
    }

    #[test]
    fn test_newton_failure_shrinks_to_minimum_step() {
        let config = SimulatorConfig::default();
        let limits = StepLimits { min: 1e-12, max: 1e-4 };
        assert_abs_diff_eq!(shrink_after_failure(1e-8, &config, limits), 2.5e-9);
        assert_abs_diff_eq!(shrink_after_failure(2e-12, &config, limits), 1e-12);

        // One Newton iteration never settles the diode from zero
        let mut c = rc_with_diode();
        let config = config.with_max_iterations(1000, 1);
        let request = TransientRequest::new(100, 0.0, 5e-3).skip_initial_dc(true);
        assert!(matches!(
            run(&mut c, &config, &request),
            Err(NodalError::Convergence { iterations: 1, .. })
        ));
    }

    #[test]
    fn test_out_of_bounds_solution_is_rejected() {
        assert_eq!(runaway_unknown(&[1.0, -2.0], 5.0), None);
        assert_eq!(runaway_unknown(&[1.0, -7.0], 5.0), Some(1));
        assert_eq!(runaway_unknown(&[f64::NAN, 0.0], 5.0), Some(0));

        // Bound of 5 mV against a 5 V source: every step is rejected
        let mut c = rc_circuit();
        let config = SimulatorConfig::default().with_solution_bound(1e-3);
        let request = TransientRequest::new(20, 0.0, 1e-3);
        assert!(matches!(
            run(&mut c, &config, &request),
            Err(NodalError::Convergence { .. })
        ));
    }

    #[test]
    fn test_probe_joins_step_control() {
        let divider = || {
            let mut c = Circuit::new();
            c.add_ground("0");
            c.add_voltage_source("V1", "in", "0", Waveform::parse("sin(0, 1, 1k)").unwrap());
            c.add_resistor("R1", "in", "out", 1e3).unwrap();
            c.add_resistor("R2", "out", "0", 1e3).unwrap();
            c
        };
        let config = SimulatorConfig::default();

        // Every unknown is algebraic, so only a probe brings in the LTE test
        let plain = TransientRequest::new(10, 0.0, 1e-3);
        let probed = plain.clone().with_probes(["out"]);
        let unchecked = run(&mut divider(), &config, &plain).unwrap();
        let checked = run(&mut divider(), &config, &probed).unwrap();
        assert!(checked.time.len() > unchecked.time.len());
    }
}
