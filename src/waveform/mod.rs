//! Independent source waveforms.
//!
//! A source description such as `pulse(0, 5, 1m, 10u, 10u, 1m, 2m)` is parsed
//! once into a [`Waveform`]. Evaluation is a pure function of time.
//!
//! ## Supported functions
//!
//! | Function | Arguments (defaults) |
//! |---|---|
//! | `dc` | `v` |
//! | `impulse` | `height=1, width=1n` |
//! | `step` | `v1=0, v2=1, td=0, tr=1n` |
//! | `square` | `v1=0, v2=1, freq=1, duty=50` |
//! | `triangle` | `v1=0, v2=1, freq=1` |
//! | `pulse` | `v1=0, v2=1, td=0, tr=1n, tf=1n, pw=1G, per=1G` |
//! | `sin` | `vo=0, va=1, freq=1, td=0, phase=0` (degrees) |
//! | `pwl` | `t1, v1, t2, v2, ...` |
//! | `pwl_repeating` | `t1, v1, t2, v2, ...`, repeats after the last time |

mod lexer;
mod number;
mod parser;

pub use number::parse_number;
pub use parser::{parse, SourceCall};

use std::f64::consts::PI;

use crate::error::{NodalError, Result};

/// Floating-point modulus with the sign of the divisor.
pub fn fmod(n: f64, d: f64) -> f64 {
    n - (n / d).floor() * d
}

/// Evaluator shape behind a [`Waveform`].
#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    /// Constant value
    Constant(f64),
    /// Sinusoid, held at its starting value until `delay`
    Sine {
        offset: f64,
        amplitude: f64,
        freq: f64,
        delay: f64,
        /// Phase offset as a fraction of a cycle
        phase: f64,
    },
    /// Piecewise-linear (time, value) pairs
    PiecewiseLinear {
        points: Vec<(f64, f64)>,
        repeat: bool,
    },
}

/// A parsed source waveform.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    /// Function name the waveform was built from
    pub function: String,
    /// Arguments after defaults were applied
    pub args: Vec<f64>,
    /// Value at t = 0, used for DC analysis
    pub dc: f64,
    /// Repetition period, 0 when aperiodic
    pub period: f64,
    shape: Shape,
}

impl Waveform {
    /// Parse a source description.
    pub fn parse(text: &str) -> Result<Self> {
        let call = parser::parse(text)?;
        Self::from_call(text, call)
    }

    /// A constant waveform.
    pub fn constant(value: f64) -> Self {
        Self::build("dc", vec![value], Shape::Constant(value), 0.0)
    }

    fn build(function: &str, args: Vec<f64>, shape: Shape, period: f64) -> Self {
        let mut waveform = Self {
            function: function.to_string(),
            args,
            dc: 0.0,
            period,
            shape,
        };
        waveform.dc = waveform.value(0.0);
        waveform
    }

    fn from_call(text: &str, call: SourceCall) -> Result<Self> {
        let SourceCall { function, args } = call;
        // Fill unspecified arguments from defaults
        let arg = |i: usize, default: f64| args.get(i).copied().flatten().unwrap_or(default);

        let waveform = match function.as_str() {
            "dc" => {
                let v = arg(0, 0.0);
                Self::constant(v)
            }
            "impulse" => {
                let h = arg(0, 1.0);
                let w = arg(1, 1e-9).abs();
                Self::pwl(&function, vec![h, w], vec![0.0, 0.0, w / 2.0, h, w, 0.0], false)
            }
            "step" => {
                let v1 = arg(0, 0.0);
                let v2 = arg(1, 1.0);
                let td = arg(2, 0.0).max(0.0);
                let tr = arg(3, 1e-9).abs();
                Self::pwl(
                    &function,
                    vec![v1, v2, td, tr],
                    vec![td, v1, td + tr, v2],
                    false,
                )
            }
            "square" => {
                let v1 = arg(0, 0.0);
                let v2 = arg(1, 1.0);
                let freq = arg(2, 1.0).abs();
                let duty = arg(3, 50.0).abs().min(100.0);

                let per = if freq == 0.0 { f64::INFINITY } else { 1.0 / freq };
                let t_change = 0.01 * per;
                let t_pw = 0.01 * duty * 0.98 * per;
                Self::pwl(
                    &function,
                    vec![v1, v2, freq, duty],
                    vec![
                        0.0,
                        v1,
                        t_change,
                        v2,
                        t_change + t_pw,
                        v2,
                        t_change + t_pw + t_change,
                        v1,
                        per,
                        v1,
                    ],
                    true,
                )
            }
            "triangle" => {
                let v1 = arg(0, 0.0);
                let v2 = arg(1, 1.0);
                let freq = arg(2, 1.0).abs();

                let per = if freq == 0.0 { f64::INFINITY } else { 1.0 / freq };
                Self::pwl(
                    &function,
                    vec![v1, v2, freq],
                    vec![0.0, v1, per / 2.0, v2, per, v1],
                    true,
                )
            }
            "pulse" => {
                let v1 = arg(0, 0.0);
                let v2 = arg(1, 1.0);
                let td = arg(2, 0.0).max(0.0);
                let tr = arg(3, 1e-9).abs();
                let tf = arg(4, 1e-9).abs();
                let pw = arg(5, 1e9).abs();
                let per = arg(6, 1e9).abs();

                let t1 = td;
                let t2 = t1 + tr;
                let t3 = t2 + pw;
                let t4 = t3 + tf;
                Self::pwl(
                    &function,
                    vec![v1, v2, td, tr, tf, pw, per],
                    vec![t1, v1, t2, v2, t3, v2, t4, v1, per, v1],
                    true,
                )
            }
            "sin" => {
                let offset = arg(0, 0.0);
                let amplitude = arg(1, 1.0);
                let freq = arg(2, 1.0).abs();
                let delay = arg(3, 0.0);
                let phase_deg = arg(4, 0.0);

                let period = if freq == 0.0 { 0.0 } else { 1.0 / freq };
                Self::build(
                    &function,
                    vec![offset, amplitude, freq, delay, phase_deg],
                    Shape::Sine {
                        offset,
                        amplitude,
                        freq,
                        delay,
                        phase: phase_deg / 360.0,
                    },
                    period,
                )
            }
            "pwl" | "pwl_repeating" => {
                let values: Vec<f64> = args.iter().map(|a| a.unwrap_or(0.0)).collect();
                let repeat = function == "pwl_repeating";
                Self::pwl(&function, values.clone(), values, repeat)
            }
            other => {
                return Err(NodalError::invalid_source(
                    text,
                    format!("unknown source function '{}'", other),
                ));
            }
        };

        Ok(waveform)
    }

    /// Build a piecewise-linear waveform from a flat `t, v, t, v, ...` list.
    /// A trailing unpaired value is dropped.
    fn pwl(function: &str, args: Vec<f64>, tv: Vec<f64>, repeat: bool) -> Self {
        let points: Vec<(f64, f64)> = tv.chunks_exact(2).map(|p| (p[0], p[1])).collect();
        let period = match points.last() {
            Some(&(t, _)) if repeat && points.len() > 1 => t,
            _ => 0.0,
        };
        Self::build(
            function,
            args,
            Shape::PiecewiseLinear { points, repeat },
            period,
        )
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Value of the waveform at time `t`.
    pub fn value(&self, t: f64) -> f64 {
        match &self.shape {
            Shape::Constant(v) => *v,
            Shape::Sine {
                offset,
                amplitude,
                freq,
                delay,
                phase,
            } => {
                let t = (t - delay).max(0.0);
                offset + amplitude * (2.0 * PI * (freq * t + phase)).sin()
            }
            Shape::PiecewiseLinear { points, repeat } => pwl_value(points, *repeat, t),
        }
    }

    /// Largest magnitude the waveform reaches.
    pub fn peak(&self) -> f64 {
        match &self.shape {
            Shape::Constant(v) => v.abs(),
            Shape::Sine { offset, amplitude, .. } => offset.abs() + amplitude.abs(),
            Shape::PiecewiseLinear { points, .. } => points.iter().fold(0.0, |m, &(_, v)| m.max(v.abs())),
        }
    }

    /// Next time strictly after `t` where the waveform's slope changes, if
    /// any.
    pub fn inflection_point(&self, t: f64) -> Option<f64> {
        match &self.shape {
            Shape::Constant(_) => None,
            Shape::Sine { delay, .. } => (t < *delay).then_some(*delay),
            Shape::PiecewiseLinear { points, repeat } => {
                if points.len() < 2 {
                    return None;
                }
                let (base, local) = match wrap_period(points, *repeat) {
                    Some(period) => {
                        let local = fmod(t, period);
                        (t - local, local)
                    }
                    None => (0.0, t),
                };
                points
                    .iter()
                    .map(|&(next_t, _)| next_t)
                    .find(|&next_t| local < next_t)
                    .map(|next_t| base + next_t)
            }
        }
    }
}

/// Period used to wrap time for repeating waveforms, if it is usable.
fn wrap_period(points: &[(f64, f64)], repeat: bool) -> Option<f64> {
    if !repeat {
        return None;
    }
    let period = points.last()?.0;
    (period.is_finite() && period > 0.0).then_some(period)
}

fn pwl_value(points: &[(f64, f64)], repeat: bool, t: f64) -> f64 {
    match points {
        [] => 0.0,
        [(_, v)] => *v,
        _ => {
            let t = match wrap_period(points, repeat) {
                Some(period) => fmod(t, period),
                None => t,
            };

            let (mut last_t, mut last_v) = points[0];
            if t > last_t {
                for &(next_t, next_v) in &points[1..] {
                    // Skip pairs that go backwards in time
                    if next_t > last_t && t < next_t {
                        return last_v + (next_v - last_v) * (t - last_t) / (next_t - last_t);
                    }
                    last_t = next_t;
                    last_v = next_v;
                }
            }
            last_v
        }
    }
}
