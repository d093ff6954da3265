//! Circuit structure: node index space, device list and MNA buffers.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use super::types::{current_label, DeviceId, NodeIndex, NodeType};
use super::validate::check_voltage_source_loops;
use crate::components::{
    Capacitor, CurrentSource, Device, Diode, DiodeKind, Inductor, Mosfet, MosfetType, OpAmp,
    Resistor, Stamp, VoltageSource,
};
use crate::error::{NodalError, Result};
use crate::netlist::{Netlist, NetlistEntry};
use crate::solver::{MnaSystem, SimulatorConfig};
use crate::waveform::Waveform;

/// A circuit: named nodes, devices and, once finalized, the MNA buffers.
///
/// Nodes are created lazily the first time a device references them.
/// Adding a device after finalization discards the buffers; they are
/// reallocated on the next analysis.
#[derive(Debug, Clone, Default)]
pub struct Circuit {
    /// Mapping from node names to unknowns (`None` for ground)
    node_map: BTreeMap<String, NodeIndex>,
    /// Label of every unknown, for diagnostics
    labels: Vec<String>,
    /// Kind of every unknown
    node_types: Vec<NodeType>,
    devices: Vec<Device>,
    device_map: HashMap<String, DeviceId>,
    voltage_sources: Vec<DeviceId>,
    system: Option<MnaSystem>,
    did_dc: bool,
}

impl Circuit {
    /// Create an empty circuit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tie a node name to ground.
    ///
    /// Must happen before any device references the name; a name that
    /// already has its own unknown keeps it.
    pub fn add_ground(&mut self, name: &str) {
        match self.node_map.get(name) {
            Some(Some(index)) => {
                warn!(node = name, index, "ground tie after node was created, ignoring");
            }
            _ => {
                self.node_map.insert(name.to_string(), None);
            }
        }
    }

    /// Resolve a node name, creating a voltage unknown on first use.
    pub fn node(&mut self, name: &str) -> NodeIndex {
        if let Some(&index) = self.node_map.get(name) {
            return index;
        }
        let index = self.add_unknown(name.to_string(), NodeType::Voltage);
        self.node_map.insert(name.to_string(), Some(index));
        Some(index)
    }

    fn add_unknown(&mut self, label: String, node_type: NodeType) -> usize {
        self.invalidate();
        self.labels.push(label);
        self.node_types.push(node_type);
        self.labels.len() - 1
    }

    fn add_device(&mut self, device: Device) -> DeviceId {
        self.invalidate();
        let id = DeviceId(self.devices.len());
        let name = device.name().to_string();
        if matches!(device, Device::VoltageSource(_)) {
            self.voltage_sources.push(id);
        }
        self.devices.push(device);
        if let Some(previous) = self.device_map.insert(name.clone(), id) {
            warn!(device = %name, %previous, "duplicate device name, later device wins");
        }
        id
    }

    fn invalidate(&mut self) {
        self.system = None;
        self.did_dc = false;
    }

    /// Add a resistor. Zero resistance becomes a 0 V voltage source.
    pub fn add_resistor(&mut self, name: &str, n1: &str, n2: &str, resistance: f64) -> Result<DeviceId> {
        require_finite(name, "resistance", resistance)?;
        if resistance == 0.0 {
            return Ok(self.add_voltage_source(name, n1, n2, Waveform::constant(0.0)));
        }
        let nodes = [self.node(n1), self.node(n2)];
        Ok(self.add_device(Device::Resistor(Resistor::new(name.to_string(), nodes, resistance))))
    }

    /// Add a capacitor.
    pub fn add_capacitor(&mut self, name: &str, n1: &str, n2: &str, capacitance: f64) -> Result<DeviceId> {
        require_finite(name, "capacitance", capacitance)?;
        let nodes = [self.node(n1), self.node(n2)];
        Ok(self.add_device(Device::Capacitor(Capacitor::new(name.to_string(), nodes, capacitance))))
    }

    /// Add an inductor with its branch current unknown.
    pub fn add_inductor(&mut self, name: &str, n1: &str, n2: &str, inductance: f64) -> Result<DeviceId> {
        require_finite(name, "inductance", inductance)?;
        let nodes = [self.node(n1), self.node(n2)];
        let branch = self.add_unknown(current_label(name), NodeType::Current);
        Ok(self.add_device(Device::Inductor(Inductor::new(
            name.to_string(),
            nodes,
            inductance,
            branch,
        ))))
    }

    /// Add a diode. Zero-area diodes have no effect and are dropped.
    pub fn add_diode(
        &mut self,
        name: &str,
        anode: &str,
        cathode: &str,
        area: f64,
        kind: DiodeKind,
    ) -> Result<Option<DeviceId>> {
        require_finite(name, "area", area)?;
        if area == 0.0 {
            debug!(device = name, "dropping zero-area diode");
            return Ok(None);
        }
        let nodes = [self.node(anode), self.node(cathode)];
        Ok(Some(self.add_device(Device::Diode(Diode::new(
            name.to_string(),
            nodes,
            area,
            kind,
        )))))
    }

    /// Add an independent voltage source from `n_pos` to `n_neg`.
    pub fn add_voltage_source(&mut self, name: &str, n_pos: &str, n_neg: &str, waveform: Waveform) -> DeviceId {
        let nodes = [self.node(n_pos), self.node(n_neg)];
        let branch = self.add_unknown(current_label(name), NodeType::Current);
        self.add_device(Device::VoltageSource(VoltageSource::new(
            name.to_string(),
            nodes,
            waveform,
            branch,
        )))
    }

    /// Add an independent current source; current flows from `n_pos`
    /// through the source to `n_neg`.
    pub fn add_current_source(&mut self, name: &str, n_pos: &str, n_neg: &str, waveform: Waveform) -> DeviceId {
        let nodes = [self.node(n_pos), self.node(n_neg)];
        self.add_device(Device::CurrentSource(CurrentSource::new(
            name.to_string(),
            nodes,
            waveform,
        )))
    }

    /// Add a finite-gain op-amp.
    pub fn add_opamp(
        &mut self,
        name: &str,
        [np, nn, no, ng]: [&str; 4],
        gain: f64,
    ) -> Result<DeviceId> {
        require_finite(name, "gain", gain)?;
        if gain == 0.0 {
            return Err(NodalError::invalid_component(name, "op-amp gain must be nonzero"));
        }
        let nodes = [self.node(np), self.node(nn), self.node(no), self.node(ng)];
        let branch = self.add_unknown(current_label(name), NodeType::Current);
        Ok(self.add_device(Device::OpAmp(OpAmp::new(name.to_string(), nodes, gain, branch))))
    }

    /// Add a MOSFET with terminals (drain, gate, source).
    pub fn add_mosfet(
        &mut self,
        name: &str,
        [d, g, s]: [&str; 3],
        mos_type: MosfetType,
        ratio: f64,
    ) -> Result<DeviceId> {
        require_finite(name, "W/L", ratio)?;
        let nodes = [self.node(d), self.node(g), self.node(s)];
        Ok(self.add_device(Device::Mosfet(Mosfet::new(name.to_string(), nodes, mos_type, ratio))))
    }

    /// Build a circuit from netlist records.
    pub fn from_netlist(netlist: &Netlist) -> Result<Self> {
        let names = NameResolver::from_netlist(netlist);
        let mut circuit = Circuit::new();

        for name in names.grounded() {
            circuit.add_ground(&name);
        }

        let mut found_ground = false;
        for entry in &netlist.entries {
            if matches!(entry.kind.as_str(), "g" | "w" | "s") {
                continue;
            }
            for conn in &entry.connections {
                if names.is_ground(conn) {
                    found_ground = true;
                }
            }
            circuit.add_entry(entry, &names)?;
        }

        if !found_ground {
            return Err(NodalError::MissingGround);
        }

        // Wire-aliased names report the value of their group
        for (alias, canonical) in names.aliases() {
            if let Some(&index) = circuit.node_map.get(&canonical) {
                circuit.node_map.entry(alias).or_insert(index);
            }
        }

        debug!(
            unknowns = circuit.size(),
            devices = circuit.devices.len(),
            "circuit built from netlist"
        );
        Ok(circuit)
    }

    fn add_entry(&mut self, entry: &NetlistEntry, names: &NameResolver) -> Result<()> {
        let name = entry.name().unwrap_or_else(|| format!("_{}", entry.index));
        let conn = |i: usize| -> Result<String> {
            entry.connection(&name, i).map(|c| names.canonical(c))
        };

        match entry.kind.as_str() {
            "r" => {
                let r = entry.required_number(&name, "r")?;
                self.add_resistor(&name, &conn(0)?, &conn(1)?, r)?;
            }
            "c" => {
                let c = entry.required_number(&name, "c")?;
                self.add_capacitor(&name, &conn(0)?, &conn(1)?, c)?;
            }
            "l" => {
                let l = entry.required_number(&name, "l")?;
                self.add_inductor(&name, &conn(0)?, &conn(1)?, l)?;
            }
            "d" => {
                let area = entry.number(&name, "area")?.unwrap_or(1.0);
                let kind = entry
                    .text("type")
                    .map(|t| DiodeKind::from_name(&t))
                    .unwrap_or_default();
                self.add_diode(&name, &conn(0)?, &conn(1)?, area, kind)?;
            }
            "v" | "i" => {
                let text = entry.text("value").ok_or_else(|| {
                    NodalError::invalid_component(&name, "source needs a 'value' property")
                })?;
                let waveform = Waveform::parse(&text)?;
                if entry.kind == "v" {
                    self.add_voltage_source(&name, &conn(0)?, &conn(1)?, waveform);
                } else {
                    self.add_current_source(&name, &conn(0)?, &conn(1)?, waveform);
                }
            }
            "a" => {
                // Current probe: a 0 V source whose branch current is reported
                self.add_voltage_source(&name, &conn(0)?, &conn(1)?, Waveform::constant(0.0));
            }
            "o" => {
                let gain = entry.required_number(&name, "A")?;
                let nodes = [conn(0)?, conn(1)?, conn(2)?, conn(3)?];
                self.add_opamp(
                    &name,
                    [
                        nodes[0].as_str(),
                        nodes[1].as_str(),
                        nodes[2].as_str(),
                        nodes[3].as_str(),
                    ],
                    gain,
                )?;
            }
            "n" | "p" => {
                let ratio = entry.required_number(&name, "W/L")?;
                let mos_type = if entry.kind == "n" {
                    MosfetType::N
                } else {
                    MosfetType::P
                };
                let nodes = [conn(0)?, conn(1)?, conn(2)?];
                self.add_mosfet(
                    &name,
                    [nodes[0].as_str(), nodes[1].as_str(), nodes[2].as_str()],
                    mos_type,
                    ratio,
                )?;
            }
            other => {
                return Err(NodalError::UnknownComponentType {
                    kind: other.to_string(),
                    index: entry.index,
                });
            }
        }
        Ok(())
    }

    /// Allocate the MNA buffers, stamp the linear parts and check topology.
    ///
    /// Does nothing if the circuit is already finalized.
    pub fn finalize(&mut self, config: &SimulatorConfig) -> Result<()> {
        if self.system.is_some() {
            return Ok(());
        }

        let mut system = MnaSystem::new(self.node_types.clone(), config.v_abstol, config.i_abstol);
        for device in &self.devices {
            device.load_linear(&mut system.gl, &mut system.c);
        }

        let branches: Vec<usize> = self
            .voltage_sources
            .iter()
            .filter_map(|id| self.devices[id.0].branch())
            .collect();
        check_voltage_source_loops(&system.gl, &branches)?;

        debug!(
            unknowns = system.size,
            devices = self.devices.len(),
            "circuit finalized"
        );
        self.system = Some(system);
        Ok(())
    }

    /// Drop the MNA buffers so the next analysis starts from zero.
    pub fn reset(&mut self) {
        self.invalidate();
    }

    pub fn is_finalized(&self) -> bool {
        self.system.is_some()
    }

    /// Number of unknowns.
    pub fn size(&self) -> usize {
        self.node_types.len()
    }

    /// Finalized MNA buffers, if any.
    pub fn system(&self) -> Option<&MnaSystem> {
        self.system.as_ref()
    }

    /// Finalize if needed and borrow the devices next to the buffers.
    pub(crate) fn parts_mut(&mut self, config: &SimulatorConfig) -> Result<(&[Device], &mut MnaSystem)> {
        self.finalize(config)?;
        match self.system.as_mut() {
            Some(system) => Ok((&self.devices, system)),
            None => Err(NodalError::dimension("circuit buffers missing after finalize")),
        }
    }

    pub fn did_dc(&self) -> bool {
        self.did_dc
    }

    pub(crate) fn mark_dc_done(&mut self) {
        self.did_dc = true;
    }

    /// Forget the operating point once an analysis has moved the state away from it.
    pub(crate) fn clear_dc_done(&mut self) {
        self.did_dc = false;
    }

    /// Unknown index of a node name: `Some(None)` for ground, `None` when
    /// the name is not in the circuit.
    pub fn node_index(&self, name: &str) -> Option<NodeIndex> {
        self.node_map.get(name).copied()
    }

    /// All node names with their unknowns, in name order.
    pub fn nodes(&self) -> impl Iterator<Item = (&str, NodeIndex)> {
        self.node_map.iter().map(|(name, &index)| (name.as_str(), index))
    }

    /// Label of an unknown: a node name or `I(<device>)`.
    pub fn label(&self, index: usize) -> &str {
        self.labels.get(index).map(String::as_str).unwrap_or("?")
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// Look up a device by name.
    pub fn device(&self, name: &str) -> Option<&Device> {
        self.device_map.get(name).map(|id| &self.devices[id.0])
    }

    /// Names and branch unknowns of every voltage source.
    pub fn voltage_source_branches(&self) -> Vec<(&str, usize)> {
        self.voltage_sources
            .iter()
            .filter_map(|id| {
                let device = &self.devices[id.0];
                device.branch().map(|br| (device.name(), br))
            })
            .collect()
    }
}

fn require_finite(name: &str, param: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(NodalError::InvalidNumber {
            component: name.to_string(),
            param: param.to_string(),
            text: value.to_string(),
        })
    }
}

/// Node-name resolution for netlists: wires merge names into one node and
/// ground ties send a whole group to ground.
#[derive(Debug, Default)]
struct NameResolver {
    parent: HashMap<String, String>,
    grounded: Vec<String>,
}

impl NameResolver {
    fn from_netlist(netlist: &Netlist) -> Self {
        let mut names = Self::default();
        for entry in &netlist.entries {
            match entry.kind.as_str() {
                "w" => {
                    if let [a, b, ..] = entry.connections.as_slice() {
                        names.union(a, b);
                    }
                }
                "g" => names.grounded.extend(entry.connections.iter().cloned()),
                _ => {}
            }
        }
        names
    }

    fn canonical(&self, name: &str) -> String {
        let mut current = name;
        while let Some(next) = self.parent.get(current) {
            current = next;
        }
        current.to_string()
    }

    fn union(&mut self, a: &str, b: &str) {
        let ra = self.canonical(a);
        let rb = self.canonical(b);
        if ra != rb {
            self.parent.insert(rb, ra);
        }
    }

    /// Canonical names of every grounded group.
    fn grounded(&self) -> Vec<String> {
        let mut roots: Vec<String> = self.grounded.iter().map(|n| self.canonical(n)).collect();
        roots.sort();
        roots.dedup();
        roots
    }

    fn is_ground(&self, name: &str) -> bool {
        let root = self.canonical(name);
        self.grounded.iter().any(|g| self.canonical(g) == root)
    }

    /// Every non-canonical name with its canonical name.
    fn aliases(&self) -> Vec<(String, String)> {
        self.parent
            .keys()
            .map(|name| (name.clone(), self.canonical(name)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn divider_netlist() -> Netlist {
        let mut netlist = Netlist::default();
        netlist.push(NetlistEntry::new("g", &["gnd"], &[]));
        netlist.push(NetlistEntry::new(
            "v",
            &["a", "gnd"],
            &[("name", json!("V1")), ("value", json!("10"))],
        ));
        netlist.push(NetlistEntry::new("r", &["a", "b"], &[("r", json!("1k"))]));
        netlist.push(NetlistEntry::new("r", &["b", "gnd"], &[("r", json!(1000))]));
        netlist
    }

    #[test]
    fn test_from_netlist() {
        let circuit = Circuit::from_netlist(&divider_netlist()).unwrap();
        // a, V1 branch, b
        assert_eq!(circuit.size(), 3);
        assert_eq!(circuit.node_index("gnd"), Some(None));
        assert_eq!(circuit.node_index("a"), Some(Some(0)));
        assert_eq!(circuit.label(1), "I(V1)");
        assert!(circuit.device("_2").is_some());
        assert_eq!(circuit.voltage_source_branches(), vec![("V1", 1)]);
        assert!(!circuit.is_finalized());
    }

    #[test]
    fn test_missing_ground() {
        let mut netlist = Netlist::default();
        netlist.push(NetlistEntry::new("r", &["a", "b"], &[("r", json!(1))]));
        assert!(matches!(
            Circuit::from_netlist(&netlist),
            Err(NodalError::MissingGround)
        ));
    }

    #[test]
    fn test_unknown_kind() {
        let mut netlist = divider_netlist();
        netlist.push(NetlistEntry::new("q", &["a", "b", "c"], &[]));
        assert!(matches!(
            Circuit::from_netlist(&netlist),
            Err(NodalError::UnknownComponentType { index: 4, .. })
        ));
    }

    #[test]
    fn test_zero_valued_devices() {
        let mut c = Circuit::new();
        c.add_ground("0");
        c.add_resistor("R0", "a", "0", 0.0).unwrap();
        assert!(matches!(c.device("R0"), Some(Device::VoltageSource(_))));
        assert_eq!(c.add_diode("D0", "a", "0", 0.0, DiodeKind::Normal).unwrap(), None);
        assert_eq!(c.devices().len(), 1);
    }

    #[test]
    fn test_wires_merge_nodes() {
        let mut netlist = divider_netlist();
        netlist.push(NetlistEntry::new("w", &["b", "out"], &[]));
        netlist.push(NetlistEntry::new("c", &["out", "gnd"], &[("c", json!("1u"))]));
        let circuit = Circuit::from_netlist(&netlist).unwrap();
        assert_eq!(circuit.node_index("out"), circuit.node_index("b"));
        assert_eq!(circuit.size(), 3);
    }

    #[test]
    fn test_wire_to_ground_tie() {
        let mut netlist = Netlist::default();
        netlist.push(NetlistEntry::new("g", &["gnd"], &[]));
        netlist.push(NetlistEntry::new("w", &["gnd", "return"], &[]));
        netlist.push(NetlistEntry::new("r", &["a", "return"], &[("r", json!(1))]));
        let circuit = Circuit::from_netlist(&netlist).unwrap();
        assert_eq!(circuit.node_index("return"), Some(None));
    }

    #[test]
    fn test_finalize_once_and_invalidate() {
        let config = SimulatorConfig::default();
        let mut c = Circuit::from_netlist(&divider_netlist()).unwrap();
        c.finalize(&config).unwrap();
        assert!(c.is_finalized());
        assert_eq!(c.system().map(|s| s.gl.get(0, 1)), Some(1.0));

        c.add_capacitor("C1", "b", "gnd", 1e-6).unwrap();
        assert!(!c.is_finalized());
        c.finalize(&config).unwrap();
        assert_eq!(c.system().map(|s| s.c.get(2, 2)), Some(1e-6));
    }

    #[test]
    fn test_voltage_source_loop() {
        let mut c = Circuit::new();
        c.add_ground("0");
        c.add_voltage_source("V1", "a", "0", Waveform::constant(5.0));
        c.add_voltage_source("V2", "a", "0", Waveform::constant(3.0));
        let err = c.finalize(&SimulatorConfig::default()).unwrap_err();
        assert!(matches!(err, NodalError::Topology { .. }));
        assert!(!c.is_finalized());
    }
}
