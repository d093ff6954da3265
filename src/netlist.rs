//! JSON netlist records.
//!
//! A netlist is a JSON array of component records. Two record layouts are
//! accepted:
//!
//! ```text
//! [kind, [x, y, rotation], {properties}, [connections]]   schematic form
//! [kind, [connections], {properties}]                     compact form
//! ```
//!
//! Connections are node names. Property values may be JSON numbers or
//! strings; strings are read in engineering notation (`"4.7k"`).

use serde_json::{Map, Value};

use crate::error::{NodalError, Result};
use crate::waveform::parse_number;

/// Record kinds that never describe circuit elements.
const IGNORED_KINDS: &[&str] = &["view", "L"];

/// One component record.
#[derive(Debug, Clone, PartialEq)]
pub struct NetlistEntry {
    /// Position of the record in the netlist
    pub index: usize,
    /// Component kind (`r`, `c`, `v`, ...)
    pub kind: String,
    /// Connection node names, in the order the kind defines
    pub connections: Vec<String>,
    /// Named properties
    pub properties: Map<String, Value>,
}

impl NetlistEntry {
    /// Build an entry programmatically.
    pub fn new(kind: &str, connections: &[&str], properties: &[(&str, Value)]) -> Self {
        Self {
            index: 0,
            kind: kind.to_string(),
            connections: connections.iter().map(|c| c.to_string()).collect(),
            properties: properties
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    /// The `name` property, if set.
    pub fn name(&self) -> Option<String> {
        self.text("name").filter(|n| !n.is_empty())
    }

    /// A property as text. Numbers are formatted back to text.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// A numeric property. `Ok(None)` when absent.
    pub fn number(&self, component: &str, key: &str) -> Result<Option<f64>> {
        let invalid = |text: String| NodalError::InvalidNumber {
            component: component.to_string(),
            param: key.to_string(),
            text,
        };
        match self.properties.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => n.as_f64().map(Some).ok_or_else(|| invalid(n.to_string())),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => parse_number(s).map(Some).ok_or_else(|| invalid(s.clone())),
            Some(other) => Err(invalid(other.to_string())),
        }
    }

    /// A required numeric property.
    pub fn required_number(&self, component: &str, key: &str) -> Result<f64> {
        self.number(component, key)?.ok_or_else(|| {
            NodalError::invalid_component(component, format!("missing property '{}'", key))
        })
    }

    /// Connection `i`, or an error naming the component.
    pub fn connection(&self, component: &str, i: usize) -> Result<&str> {
        self.connections.get(i).map(String::as_str).ok_or_else(|| {
            NodalError::invalid_component(
                component,
                format!(
                    "kind '{}' needs at least {} connections, got {}",
                    self.kind,
                    i + 1,
                    self.connections.len()
                ),
            )
        })
    }
}

/// An ordered list of component records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Netlist {
    pub entries: Vec<NetlistEntry>,
}

impl Netlist {
    /// Parse a netlist from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    /// Read a netlist from a JSON value.
    pub fn from_value(value: &Value) -> Result<Self> {
        let records = value
            .as_array()
            .ok_or_else(|| NodalError::netlist(0, "netlist must be a JSON array of records"))?;

        let mut entries = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            if let Some(entry) = parse_record(index, record)? {
                entries.push(entry);
            }
        }
        Ok(Self { entries })
    }

    /// Append an entry, assigning its index.
    pub fn push(&mut self, mut entry: NetlistEntry) {
        entry.index = self.entries.len();
        self.entries.push(entry);
    }
}

fn parse_record(index: usize, record: &Value) -> Result<Option<NetlistEntry>> {
    let fields = record
        .as_array()
        .ok_or_else(|| NodalError::netlist(index, "record must be an array"))?;

    let kind = fields
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| NodalError::netlist(index, "record must start with a kind string"))?;

    if IGNORED_KINDS.contains(&kind) {
        return Ok(None);
    }

    let (connections, properties) = match fields.len() {
        4 => (&fields[3], &fields[2]),
        3 => (&fields[1], &fields[2]),
        n => {
            return Err(NodalError::netlist(
                index,
                format!("record of kind '{}' has {} fields, expected 3 or 4", kind, n),
            ))
        }
    };

    let properties = match properties {
        Value::Object(map) => map.clone(),
        Value::Null => Map::new(),
        _ => return Err(NodalError::netlist(index, "properties must be an object")),
    };

    let connections = connections
        .as_array()
        .ok_or_else(|| NodalError::netlist(index, "connections must be an array"))?
        .iter()
        .map(|c| match c {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            _ => Err(NodalError::netlist(index, "connection names must be strings")),
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Some(NetlistEntry {
        index,
        kind: kind.to_string(),
        connections,
        properties,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_both_record_forms() {
        let netlist = Netlist::from_json(
            r#"[
                ["view", 0, 0, 2],
                ["r", [10, 20, 0], {"name": "R1", "r": "1k"}, ["a", "b"]],
                ["c", ["b", "gnd"], {"c": 1e-6}]
            ]"#,
        )
        .unwrap();

        assert_eq!(netlist.entries.len(), 2);
        let r = &netlist.entries[0];
        assert_eq!(r.index, 1);
        assert_eq!(r.name().as_deref(), Some("R1"));
        assert_eq!(r.connections, vec!["a", "b"]);
        assert_eq!(r.number("R1", "r").unwrap(), Some(1000.0));

        let c = &netlist.entries[1];
        assert_eq!(c.index, 2);
        assert_eq!(c.name(), None);
        assert_eq!(c.number("_2", "c").unwrap(), Some(1e-6));
    }

    #[test]
    fn test_invalid_number() {
        let entry = NetlistEntry::new("r", &["a", "b"], &[("r", json!("lots"))]);
        assert!(matches!(
            entry.number("R1", "r"),
            Err(NodalError::InvalidNumber { .. })
        ));
        assert!(matches!(
            entry.required_number("R1", "x"),
            Err(NodalError::InvalidComponent { .. })
        ));
    }

    #[test]
    fn test_malformed_records() {
        assert!(Netlist::from_json(r#"{"r": 1}"#).is_err());
        assert!(matches!(
            Netlist::from_json(r#"[["r", 1]]"#),
            Err(NodalError::NetlistFormat { index: 0, .. })
        ));
        assert!(matches!(
            Netlist::from_json(r#"[["r", "a", {}]]"#),
            Err(NodalError::NetlistFormat { .. })
        ));
        assert!(matches!(Netlist::from_json("[1,"), Err(NodalError::Json(_))));
    }

    #[test]
    fn test_missing_connection() {
        let entry = NetlistEntry::new("r", &["a"], &[]);
        assert_eq!(entry.connection("R1", 0).unwrap(), "a");
        assert!(entry.connection("R1", 1).is_err());
    }
}
