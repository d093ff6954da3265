//! Core types for circuit representation.

use std::fmt;

/// Index of an unknown in the MNA system. Ground is `None` and takes part in
/// no row or column.
pub type NodeIndex = Option<usize>;

/// Kind of an MNA unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeType {
    /// Node voltage
    Voltage,
    /// Auxiliary branch current (voltage sources, inductors, op-amps)
    Current,
}

impl NodeType {
    pub fn is_voltage(&self) -> bool {
        matches!(self, NodeType::Voltage)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeType::Voltage => write!(f, "V"),
            NodeType::Current => write!(f, "I"),
        }
    }
}

/// Position of a device in the circuit's device list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId(pub usize);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "D{}", self.0)
    }
}

/// Label of the branch current result for a named device.
pub fn current_label(name: &str) -> String {
    format!("I({})", name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type() {
        assert!(NodeType::Voltage.is_voltage());
        assert!(!NodeType::Current.is_voltage());
        assert_eq!(NodeType::Current.to_string(), "I");
    }

    #[test]
    fn test_current_label() {
        assert_eq!(current_label("V1"), "I(V1)");
    }
}
