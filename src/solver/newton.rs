//! Newton-Raphson iteration shared by every analysis.

use tracing::{debug, trace};

use super::mna::MnaSystem;
use super::simulator::SimulatorConfig;
use crate::error::Result;

/// How a Newton solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewtonOutcome {
    /// Converged after the given number of iterations
    Converged { iterations: usize },
    /// The iterate stopped being finite
    Diverged { problem_node: Option<usize> },
    /// The iteration budget ran out
    Exhausted { problem_node: Option<usize> },
}

impl NewtonOutcome {
    pub fn is_converged(&self) -> bool {
        matches!(self, NewtonOutcome::Converged { .. })
    }
}

/// Newton-Raphson solver with residual tracking, rollback and voltage-step
/// limiting.
#[derive(Debug, Clone)]
pub struct NewtonRaphson {
    /// Maximum iterations
    pub max_iterations: usize,
    /// Relative tolerance on solution updates
    pub reltol: f64,
    /// Largest voltage change per iteration while limiting is on
    pub v_limit: f64,
    /// Absolute part of the residual test
    pub residual_abs: f64,
    /// Relative part of the residual test
    pub residual_rel: f64,
}

/// Consecutive improving iterations after which limiting is switched off.
const LIMIT_RELEASE_COUNT: usize = 10;

impl NewtonRaphson {
    /// Create a solver from the simulator configuration.
    pub fn new(config: &SimulatorConfig, max_iterations: usize) -> Self {
        Self {
            max_iterations,
            reltol: config.reltol,
            v_limit: config.v_newton_limit,
            residual_abs: config.i_abstol.sqrt(),
            residual_rel: config.reltol.sqrt(),
        }
    }

    /// Iterate from the current `system.solution`.
    ///
    /// `load` must fill `system.rhs` with `-f(x)` and `system.matrix` with
    /// the Jacobian at `system.solution`. Load errors are fatal and
    /// propagate; failing to converge is reported through the outcome.
    pub fn solve<F>(&self, system: &mut MnaSystem, mut load: F) -> Result<NewtonOutcome>
    where
        F: FnMut(&mut MnaSystem) -> Result<()>,
    {
        let n = system.size;
        let mut delta = vec![0.0; n];
        let mut residual_old = 0.0;
        let mut residual_worst = 0.0;
        let mut limiting = false;
        let mut down_count = 0;
        let mut problem_node = None;

        let mut iter = 0;
        while iter < self.max_iterations {
            load(system)?;

            let residual: f64 = system
                .rhs
                .iter()
                .zip(&system.node_types)
                .filter(|(_, t)| t.is_voltage())
                .map(|(r, _)| r.abs())
                .sum();

            // A worse residual without limiting: undo the last step and
            // retake it with limiting on.
            let rolled_back = iter > 0 && !limiting && residual_old < residual;
            if rolled_back {
                for (x, d) in system.solution.iter_mut().zip(&delta) {
                    *x -= d;
                }
                limiting = true;
                debug!(iter, residual, residual_old, "newton rollback, limiting on");
            } else {
                delta = system.matrix.solve_rank_revealing(Some(&system.rhs))?;
                if residual < residual_old {
                    down_count += 1;
                } else {
                    down_count = 0;
                }
                if down_count > LIMIT_RELEASE_COUNT {
                    limiting = false;
                    down_count = 0;
                    trace!(iter, "newton limiting off");
                }
                residual_old = residual;
            }

            if iter == 0 || residual > residual_worst {
                residual_worst = residual;
            }

            let mut converged = !(iter + 1 < self.max_iterations
                && residual > self.residual_abs + self.residual_rel * residual_worst);

            for i in 0..n {
                let mut d = delta[i];
                if limiting && system.node_types[i].is_voltage() {
                    d = d.clamp(-self.v_limit, self.v_limit);
                }
                system.solution[i] += d;
                let threshold = system.tolerance(i, self.reltol);
                // NaN counts as unconverged
                if !(d.abs() <= threshold) {
                    converged = false;
                    problem_node = Some(i);
                }
            }

            if system.solution.iter().any(|x| !x.is_finite()) {
                debug!(iter, ?problem_node, "newton iterate is not finite");
                return Ok(NewtonOutcome::Diverged { problem_node });
            }

            if converged {
                system.update_soln_max();
                trace!(iterations = iter + 1, residual, "newton converged");
                return Ok(NewtonOutcome::Converged {
                    iterations: iter + 1,
                });
            }

            if !rolled_back {
                iter += 1;
            }
        }

        Ok(NewtonOutcome::Exhausted { problem_node })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::NodeType;
    use approx::assert_abs_diff_eq;

    fn system(n: usize) -> MnaSystem {
        MnaSystem::new(vec![NodeType::Voltage; n], 1e-6, 1e-12)
    }

    #[test]
    fn test_linear_converges_in_two() {
        // 2x = 4 as f(x) = 2x - 4
        let config = SimulatorConfig::default();
        let newton = NewtonRaphson::new(&config, 100);
        let mut sys = system(1);
        let outcome = newton
            .solve(&mut sys, |s| {
                s.rhs[0] = -(2.0 * s.solution[0] - 4.0);
                s.matrix.set(0, 0, 2.0);
                Ok(())
            })
            .unwrap();
        assert_eq!(outcome, NewtonOutcome::Converged { iterations: 2 });
        assert_abs_diff_eq!(sys.solution[0], 2.0, epsilon = 1e-12);
        assert_abs_diff_eq!(sys.soln_max[0], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_nonlinear_converges() {
        // x^3 = 8
        let config = SimulatorConfig::default();
        let newton = NewtonRaphson::new(&config, 100);
        let mut sys = system(1);
        sys.solution[0] = 1.0;
        let outcome = newton
            .solve(&mut sys, |s| {
                let x = s.solution[0];
                s.rhs[0] = -(x * x * x - 8.0);
                s.matrix.set(0, 0, 3.0 * x * x);
                Ok(())
            })
            .unwrap();
        assert!(outcome.is_converged());
        assert_abs_diff_eq!(sys.solution[0], 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_unsolvable_exhausts() {
        // x^2 + 1 = 0 has no real root
        let config = SimulatorConfig::default();
        let newton = NewtonRaphson::new(&config, 50);
        let mut sys = system(1);
        sys.solution[0] = 0.5;
        let outcome = newton
            .solve(&mut sys, |s| {
                let x = s.solution[0];
                s.rhs[0] = -(x * x + 1.0);
                s.matrix.set(0, 0, 2.0 * x);
                Ok(())
            })
            .unwrap();
        assert_eq!(
            outcome,
            NewtonOutcome::Exhausted {
                problem_node: Some(0)
            }
        );
    }

    #[test]
    fn test_load_error_propagates() {
        let config = SimulatorConfig::default();
        let newton = NewtonRaphson::new(&config, 10);
        let mut sys = system(1);
        let result = newton.solve(&mut sys, |_| Err(crate::error::NodalError::dimension("bad")));
        assert!(result.is_err());
    }
}
