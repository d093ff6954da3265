//! Error types for the Nodal circuit simulator.
//!
//! This module provides a unified error type [`NodalError`] that covers
//! all error conditions that can occur during netlist loading, source
//! parsing, circuit finalization and analysis.

use thiserror::Error;

/// Result type alias using [`NodalError`].
pub type Result<T> = std::result::Result<T, NodalError>;

/// Unified error type for all Nodal operations.
#[derive(Error, Debug)]
pub enum NodalError {
    // ============ Netlist Errors ============
    /// Malformed netlist record
    #[error("Netlist error in record {index}: {message}")]
    NetlistFormat { index: usize, message: String },

    /// A numeric property could not be interpreted
    #[error("Invalid number '{text}' for property '{param}' of '{component}'")]
    InvalidNumber {
        component: String,
        param: String,
        text: String,
    },

    /// Invalid component definition
    #[error("Invalid component '{name}': {message}")]
    InvalidComponent { name: String, message: String },

    /// Unknown component kind
    #[error("Unknown component kind '{kind}' in record {index}")]
    UnknownComponentType { kind: String, index: usize },

    /// No connection to ground anywhere in the netlist
    #[error("Circuit has no connection to ground")]
    MissingGround,

    // ============ Source Errors ============
    /// Source description could not be parsed
    #[error("Invalid source description '{text}': {message}")]
    InvalidSource { text: String, message: String },

    // ============ Analysis Errors ============
    /// Voltage source loop, or a source shorted by a wire
    #[error("Circuit has a voltage source loop or a source shorted by a wire ({sources} sources, rank {rank})")]
    Topology { sources: usize, rank: usize },

    /// Newton-Raphson iteration did not converge
    #[error("Newton method failed after {iterations} iterations (least converged unknown: {node})")]
    Convergence { iterations: usize, node: String },

    /// Matrix kernel contract violation
    #[error("Matrix dimension mismatch: {message}")]
    Dimension { message: String },

    /// AC analysis references a source absent from the circuit
    #[error("AC analysis refers to unknown source '{name}'")]
    UnknownSource { name: String },

    /// Transient integration hit its step ceiling or step floor
    #[error("Transient analysis stopped at t={time:.3e}s: {message}")]
    StepLimitExceeded { time: f64, message: String },

    /// Invalid simulation parameter
    #[error("Invalid simulation parameter: {message}")]
    InvalidSimulationParam { message: String },

    // ============ I/O Errors ============
    /// Error reading a netlist file
    #[error("Failed to read netlist file '{path}': {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ============ WASM Errors ============
    /// WASM-specific error
    #[cfg(feature = "wasm")]
    #[error("WASM error: {message}")]
    WasmError { message: String },
}

impl NodalError {
    /// Create a netlist format error
    pub fn netlist(index: usize, message: impl Into<String>) -> Self {
        Self::NetlistFormat {
            index,
            message: message.into(),
        }
    }

    /// Create an invalid component error
    pub fn invalid_component(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidComponent {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create an invalid source error
    pub fn invalid_source(text: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidSource {
            text: text.into(),
            message: message.into(),
        }
    }

    /// Create a dimension error
    pub fn dimension(message: impl Into<String>) -> Self {
        Self::Dimension {
            message: message.into(),
        }
    }

    /// Create an invalid simulation parameter error
    pub fn invalid_param(message: impl Into<String>) -> Self {
        Self::InvalidSimulationParam {
            message: message.into(),
        }
    }
}
