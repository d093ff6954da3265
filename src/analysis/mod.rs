//! Analysis drivers: DC operating point, transient and AC sweep.
//!
//! Every driver works on a [`Circuit`](crate::circuit::Circuit) in place and
//! returns a fresh result keyed by node name. Branch currents of voltage
//! sources are reported as `I(<name>)`.

pub mod ac;
pub mod dc;
pub mod transient;

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::circuit::current_label;
use crate::circuit::Circuit;
use crate::error::{NodalError, Result};

/// Key of the time axis in serialized transient results.
pub const TIME_LABEL: &str = "_time_";

/// Key of the frequency axis in serialized AC results.
pub const FREQUENCY_LABEL: &str = "_frequencies_";

/// Suffix of phase series in serialized AC results.
pub const PHASE_SUFFIX: &str = "_phase";

/// DC operating point results.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(transparent)]
pub struct DcResult {
    /// Node voltages and `I(<source>)` branch currents
    pub values: BTreeMap<String, f64>,
}

impl DcResult {
    pub fn get(&self, label: &str) -> Option<f64> {
        self.values.get(label).copied()
    }
}

/// Parameters of a transient analysis.
#[derive(Debug, Clone, PartialEq)]
pub struct TransientRequest {
    /// Minimum number of time points per source period
    pub min_points: usize,
    pub t_start: f64,
    pub t_stop: f64,
    /// Node names whose accuracy is always checked, even when algebraic
    pub probes: Vec<String>,
    /// Start from zero instead of the DC operating point
    pub skip_initial_dc: bool,
}

impl TransientRequest {
    pub fn new(min_points: usize, t_start: f64, t_stop: f64) -> Self {
        Self {
            min_points,
            t_start,
            t_stop,
            probes: Vec::new(),
            skip_initial_dc: false,
        }
    }

    pub fn with_probes<I, S>(mut self, probes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.probes = probes.into_iter().map(Into::into).collect();
        self
    }

    pub fn skip_initial_dc(mut self, skip: bool) -> Self {
        self.skip_initial_dc = skip;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.min_points == 0 {
            return Err(NodalError::invalid_param("transient needs at least one point"));
        }
        if !(self.t_start.is_finite() && self.t_stop.is_finite()) {
            return Err(NodalError::invalid_param("transient times must be finite"));
        }
        if self.t_stop <= self.t_start {
            return Err(NodalError::invalid_param(format!(
                "stop time {} must be after start time {}",
                self.t_stop, self.t_start
            )));
        }
        Ok(())
    }
}

/// Transient analysis results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransientResult {
    /// Time points where output was recorded.
    pub time: Vec<f64>,
    /// Per-label waveforms, each as long as `time`.
    pub series: BTreeMap<String, Vec<f64>>,
}

impl TransientResult {
    pub fn get(&self, label: &str) -> Option<&[f64]> {
        self.series.get(label).map(Vec::as_slice)
    }
}

impl Serialize for TransientResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.series.len() + 1))?;
        for (label, values) in &self.series {
            map.serialize_entry(label, values)?;
        }
        map.serialize_entry(TIME_LABEL, &self.time)?;
        map.end()
    }
}

/// Parameters of an AC sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct AcRequest {
    pub points_per_decade: usize,
    pub f_start: f64,
    pub f_stop: f64,
    /// Name of the source driven with a unit small-signal excitation
    pub source: String,
}

impl AcRequest {
    pub fn new(points_per_decade: usize, f_start: f64, f_stop: f64, source: impl Into<String>) -> Self {
        Self {
            points_per_decade,
            f_start,
            f_stop,
            source: source.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.points_per_decade == 0 {
            return Err(NodalError::invalid_param("AC sweep needs at least one point per decade"));
        }
        if !(self.f_start.is_finite() && self.f_stop.is_finite() && self.f_start > 0.0) {
            return Err(NodalError::invalid_param("AC frequencies must be finite and positive"));
        }
        if self.f_stop < self.f_start {
            return Err(NodalError::invalid_param(format!(
                "stop frequency {} is below start frequency {}",
                self.f_stop, self.f_start
            )));
        }
        Ok(())
    }
}

/// AC sweep results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcResult {
    /// Frequency points (Hz).
    pub frequencies: Vec<f64>,
    /// Per-node magnitude at each frequency.
    pub magnitude: BTreeMap<String, Vec<f64>>,
    /// Per-node unwrapped phase in degrees at each frequency.
    pub phase: BTreeMap<String, Vec<f64>>,
}

impl Serialize for AcResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = self.magnitude.len() + self.phase.len() + 1;
        let mut map = serializer.serialize_map(Some(len))?;
        for (label, values) in &self.magnitude {
            map.serialize_entry(label, values)?;
        }
        for (label, values) in &self.phase {
            map.serialize_entry(&format!("{}{}", label, PHASE_SUFFIX), values)?;
        }
        map.serialize_entry(FREQUENCY_LABEL, &self.frequencies)?;
        map.end()
    }
}

/// Result labels with the unknown each one reads (`None` for ground).
///
/// Node names come first, then `I(<name>)` for every voltage source.
pub(crate) fn result_labels(circuit: &Circuit, with_currents: bool) -> Vec<(String, Option<usize>)> {
    let mut labels: Vec<(String, Option<usize>)> = circuit
        .nodes()
        .map(|(name, index)| (name.to_string(), index))
        .collect();
    if with_currents {
        labels.extend(
            circuit
                .voltage_source_branches()
                .into_iter()
                .map(|(name, br)| (current_label(name), Some(br))),
        );
    }
    labels
}
