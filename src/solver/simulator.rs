//! Main simulator interface.

use crate::analysis::{self, AcRequest, AcResult, DcResult, TransientRequest, TransientResult};
use crate::circuit::Circuit;
use crate::error::{NodalError, Result};
use crate::netlist::Netlist;

/// Configuration for the simulator.
///
/// Every tuned constant of the Newton core and the transient step control
/// lives here.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    /// Relative tolerance on solution updates.
    pub reltol: f64,
    /// Absolute tolerance for node voltages (volts).
    pub v_abstol: f64,
    /// Absolute tolerance for branch currents (amperes).
    pub i_abstol: f64,
    /// Largest voltage change per Newton iteration while limiting (volts).
    pub v_newton_limit: f64,
    /// Newton iteration budget for the DC operating point.
    pub dc_max_iters: usize,
    /// Newton iteration budget per transient step.
    pub tran_max_iters: usize,
    /// LTE tolerance multiplier; larger values accept larger errors.
    pub lte_rel: f64,
    /// Largest step growth factor after an accepted step.
    pub step_increase_factor: f64,
    /// Largest step shrink factor after an LTE rejection.
    pub lte_step_decrease_factor: f64,
    /// Step shrink factor after a Newton failure.
    pub nr_step_decrease_factor: f64,
    /// Number of backward-Euler priming steps before integration starts.
    pub prime_steps: usize,
    /// Step-count ceiling per source period.
    pub max_steps_per_period: usize,
    /// Smallest step as a fraction of the largest step.
    pub min_step_ratio: f64,
    /// Start transient analysis from zero when the DC solve fails.
    pub allow_dc_fallback: bool,
    /// Largest accepted transient solution magnitude, in units of the
    /// largest source amplitude (or 1 when that is smaller).
    pub solution_bound: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            reltol: 1e-4,
            v_abstol: 1e-6,
            i_abstol: 1e-12,
            v_newton_limit: 0.3,
            dc_max_iters: 1000,
            tran_max_iters: 20,
            lte_rel: 10.0,
            step_increase_factor: 2.0,
            lte_step_decrease_factor: 8.0,
            nr_step_decrease_factor: 4.0,
            prime_steps: 2,
            max_steps_per_period: 50_000,
            min_step_ratio: 1e-8,
            allow_dc_fallback: true,
            solution_bound: 1e9,
        }
    }
}

impl SimulatorConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the relative tolerance.
    pub fn with_reltol(mut self, reltol: f64) -> Self {
        self.reltol = reltol;
        self
    }

    /// Set the absolute voltage and current tolerances.
    pub fn with_abstol(mut self, v_abstol: f64, i_abstol: f64) -> Self {
        self.v_abstol = v_abstol;
        self.i_abstol = i_abstol;
        self
    }

    /// Set the Newton voltage-step limit (in volts).
    pub fn with_newton_limit(mut self, v_limit: f64) -> Self {
        self.v_newton_limit = v_limit;
        self
    }

    /// Set the DC and per-step transient Newton iteration budgets.
    pub fn with_max_iterations(mut self, dc: usize, transient: usize) -> Self {
        self.dc_max_iters = dc;
        self.tran_max_iters = transient;
        self
    }

    /// Set the LTE tolerance multiplier.
    ///
    /// - 10 (default): matches typical SPICE accuracy for waveform display
    /// - 1: tighter, more steps
    pub fn with_lte_rel(mut self, lte_rel: f64) -> Self {
        self.lte_rel = lte_rel;
        self
    }

    /// Set the number of priming steps.
    pub fn with_prime_steps(mut self, prime_steps: usize) -> Self {
        self.prime_steps = prime_steps;
        self
    }

    /// Set the step-count ceiling per source period.
    pub fn with_max_steps_per_period(mut self, max_steps: usize) -> Self {
        self.max_steps_per_period = max_steps;
        self
    }

    /// Enable or disable the zero-initial-condition fallback.
    pub fn with_dc_fallback(mut self, allow: bool) -> Self {
        self.allow_dc_fallback = allow;
        self
    }

    /// Set the bound on transient solution magnitudes.
    pub fn with_solution_bound(mut self, bound: f64) -> Self {
        self.solution_bound = bound;
        self
    }

    /// Check that every parameter is usable.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("reltol", self.reltol),
            ("v_abstol", self.v_abstol),
            ("i_abstol", self.i_abstol),
            ("v_newton_limit", self.v_newton_limit),
            ("min_step_ratio", self.min_step_ratio),
            ("solution_bound", self.solution_bound),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(NodalError::invalid_param(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }

        let at_least_one = [
            ("lte_rel", self.lte_rel),
            ("step_increase_factor", self.step_increase_factor),
            ("lte_step_decrease_factor", self.lte_step_decrease_factor),
            ("nr_step_decrease_factor", self.nr_step_decrease_factor),
        ];
        for (name, value) in at_least_one {
            if !(value.is_finite() && value >= 1.0) {
                return Err(NodalError::invalid_param(format!(
                    "{} must be at least 1, got {}",
                    name, value
                )));
            }
        }

        if self.min_step_ratio >= 1.0 {
            return Err(NodalError::invalid_param("min_step_ratio must be below 1"));
        }
        if self.dc_max_iters == 0 || self.tran_max_iters == 0 {
            return Err(NodalError::invalid_param("iteration budgets must be nonzero"));
        }
        if self.max_steps_per_period == 0 {
            return Err(NodalError::invalid_param("max_steps_per_period must be nonzero"));
        }
        Ok(())
    }
}

/// The main circuit simulator.
///
/// Owns a circuit and runs analyses on it. Buffers are reused between
/// analyses; a transient run after a DC run starts from the DC solution.
#[derive(Debug, Clone)]
pub struct Simulator {
    /// The circuit being simulated
    circuit: Circuit,
    config: SimulatorConfig,
}

impl Simulator {
    /// Create a new simulator for the given circuit with default configuration.
    pub fn new(circuit: Circuit) -> Self {
        Self {
            circuit,
            config: SimulatorConfig::default(),
        }
    }

    /// Create a new simulator for the given circuit with custom configuration.
    pub fn with_config(circuit: Circuit, config: SimulatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { circuit, config })
    }

    /// Build a simulator from JSON netlist text.
    pub fn from_json(text: &str) -> Result<Self> {
        let netlist = Netlist::from_json(text)?;
        Ok(Self::new(Circuit::from_netlist(&netlist)?))
    }

    /// DC operating point.
    pub fn dc(&mut self) -> Result<DcResult> {
        analysis::dc::run(&mut self.circuit, &self.config)
    }

    /// Transient analysis.
    pub fn transient(&mut self, request: &TransientRequest) -> Result<TransientResult> {
        analysis::transient::run(&mut self.circuit, &self.config, request)
    }

    /// Small-signal AC sweep.
    pub fn ac(&mut self, request: &AcRequest) -> Result<AcResult> {
        analysis::ac::run(&mut self.circuit, &self.config, request)
    }

    /// Get a reference to the circuit.
    pub fn circuit(&self) -> &Circuit {
        &self.circuit
    }

    /// Get a mutable reference to the circuit. Structural edits discard the
    /// finalized buffers.
    pub fn circuit_mut(&mut self) -> &mut Circuit {
        &mut self.circuit
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SimulatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.prime_steps, 2);
        assert_eq!(config.max_steps_per_period, 50_000);
    }

    #[test]
    fn test_invalid_config() {
        let bad = [
            SimulatorConfig::new().with_lte_rel(0.5),
            SimulatorConfig::new().with_reltol(0.0),
            SimulatorConfig::new().with_abstol(-1.0, 1e-12),
            SimulatorConfig::new().with_max_iterations(0, 20),
            SimulatorConfig::new().with_max_steps_per_period(0),
            SimulatorConfig::new().with_newton_limit(f64::NAN),
        ];
        for config in bad {
            assert!(matches!(
                Simulator::with_config(Circuit::new(), config),
                Err(NodalError::InvalidSimulationParam { .. })
            ));
        }
    }
}
