// SPDX-FileCopyrightText: 2023 Linutronix GmbH
//
// SPDX-License-Identifier: GPL-3.0-or-later
//
//! Assigns requested devices and ports to topology nodes and interfaces
//!
//! Devices are assigned in declaration order (DUTs first), ports in the order
//! of their device. Candidate nodes are tried in topology order, candidate
//! interfaces in name order. The first complete assignment wins, so the
//! result is deterministic for a given testbed and topology.

use crate::binding::kne::topology::{Node, NodeType, Topology};
use crate::configuration::{port_key, Device, Testbed, Vendor};
use crate::validation::{validate_testbed, PortMap};
use anyhow::{anyhow, Result};
use log::debug;
use std::collections::{BTreeMap, HashSet};

/// Result of matching a testbed against a topology
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct Assignment {
    /// Node name by device ID
    pub device_nodes: BTreeMap<String, String>,

    /// Interface key by `<device-id>:<port-id>`
    pub port_interfaces: BTreeMap<String, String>,
}

impl Assignment {
    /// Node the device was assigned to
    ///
    /// # Errors
    ///
    /// Will return `Err` if the device was not assigned or the node is not part of the topology.
    pub fn node<'t>(&self, topology: &'t Topology, device_id: &str) -> Result<&'t Node> {
        let name = self
            .device_nodes
            .get(device_id)
            .ok_or_else(|| anyhow!("device {device_id} not assigned to any node"))?;
        topology
            .nodes
            .iter()
            .find(|node| &node.name == name)
            .ok_or_else(|| anyhow!("node {name} not found in topology {:?}", topology.name))
    }

    /// Interface key the port of the device was assigned to
    ///
    /// # Errors
    ///
    /// Will return `Err` if the port was not assigned.
    pub fn interface(&self, device_id: &str, port_id: &str) -> Result<&str> {
        let key = port_key(device_id, port_id);
        self.port_interfaces
            .get(&key)
            .map(String::as_str)
            .ok_or_else(|| anyhow!("port {key} not assigned to any interface"))
    }
}

/// Find an assignment of every testbed device to a distinct node and every port to
/// a distinct interface of that node, so that every testbed link is a topology link
///
/// # Errors
///
/// Will return `Err` if the testbed is invalid or no such assignment exists.
pub fn solve(testbed: &Testbed, topology: &Topology) -> Result<Assignment> {
    let peers = validate_testbed(testbed)?;

    let mut solver = Solver {
        devices: testbed
            .duts
            .iter()
            .map(|d| (d, false))
            .chain(testbed.ates.iter().map(|d| (d, true)))
            .collect(),
        topology,
        peers,
        links: topology_links(topology),
        device_nodes: BTreeMap::new(),
        port_interfaces: BTreeMap::new(),
        used_interfaces: HashSet::new(),
    };

    if !solver.assign_device(0) {
        return Err(anyhow!(
            "no match found for the testbed in topology {:?}",
            topology.name
        ));
    }

    let assignment = Assignment {
        device_nodes: solver
            .device_nodes
            .into_iter()
            .map(|(device, node)| (device, node.name.clone()))
            .collect(),
        port_interfaces: solver
            .port_interfaces
            .into_iter()
            .map(|(port, (_, interface))| (port, interface.to_owned()))
            .collect(),
    };
    debug!("Solved testbed for topology {}: {assignment:?}", topology.name);
    Ok(assignment)
}

type Endpoint<'a> = (&'a str, &'a str);

/// Both directions of every link, from the link list as well as from interface peers
fn topology_links(topology: &Topology) -> HashSet<(Endpoint<'_>, Endpoint<'_>)> {
    let mut links = HashSet::new();
    for link in &topology.links {
        let a = (link.a_node.as_str(), link.a_int.as_str());
        let z = (link.z_node.as_str(), link.z_int.as_str());
        links.insert((a, z));
        links.insert((z, a));
    }
    for node in &topology.nodes {
        for (key, interface) in &node.interfaces {
            if let (Some(peer_node), Some(peer_int)) =
                (&interface.peer_name, &interface.peer_int_name)
            {
                let a = (node.name.as_str(), key.as_str());
                let z = (peer_node.as_str(), peer_int.as_str());
                links.insert((a, z));
                links.insert((z, a));
            }
        }
    }
    links
}

fn compatible(device: &Device, is_ate: bool, node: &Node) -> bool {
    if is_ate != (node.node_type == NodeType::IxiaTg) {
        return false;
    }
    if device.vendor != Vendor::Unspecified && node.node_type.vendor() != Some(device.vendor) {
        return false;
    }

    let type_name = node.node_type.as_str();
    let matches_type =
        |requested: &Option<String>| requested.as_deref().unwrap_or(type_name) == type_name;
    matches_type(&device.hardware_model)
        && matches_type(&device.software_version)
        && node.interfaces.len() >= device.ports.len()
}

struct Solver<'a> {
    devices: Vec<(&'a Device, bool)>,
    topology: &'a Topology,
    peers: PortMap,
    links: HashSet<(Endpoint<'a>, Endpoint<'a>)>,
    device_nodes: BTreeMap<String, &'a Node>,
    port_interfaces: BTreeMap<String, Endpoint<'a>>,
    used_interfaces: HashSet<Endpoint<'a>>,
}

impl<'a> Solver<'a> {
    fn assign_device(&mut self, index: usize) -> bool {
        let Some(&(device, is_ate)) = self.devices.get(index) else {
            return true;
        };

        let topology = self.topology;
        for node in &topology.nodes {
            if !compatible(device, is_ate, node)
                || self.device_nodes.values().any(|used| used.name == node.name)
            {
                continue;
            }

            self.device_nodes.insert(device.id.clone(), node);
            if self.assign_port(index, node, 0) {
                return true;
            }
            self.device_nodes.remove(&device.id);
        }

        false
    }

    fn assign_port(&mut self, device_index: usize, node: &'a Node, port_index: usize) -> bool {
        let device = self.devices[device_index].0;
        let Some(port) = device.ports.get(port_index) else {
            return self.assign_device(device_index + 1);
        };
        let key = port_key(&device.id, &port.id);

        for interface in node.interfaces.keys() {
            let endpoint = (node.name.as_str(), interface.as_str());
            if self.used_interfaces.contains(&endpoint) || !self.link_satisfied(&key, endpoint) {
                continue;
            }

            self.used_interfaces.insert(endpoint);
            self.port_interfaces.insert(key.clone(), endpoint);
            if self.assign_port(device_index, node, port_index + 1) {
                return true;
            }
            self.port_interfaces.remove(&key);
            self.used_interfaces.remove(&endpoint);
        }

        false
    }

    /// A link to a port that is not assigned yet is checked once the peer is assigned
    fn link_satisfied(&self, key: &str, endpoint: Endpoint<'a>) -> bool {
        match self.peers.peer(key) {
            None | Some("") => true,
            // port looped back onto itself
            Some(peer) if peer == key => self.links.contains(&(endpoint, endpoint)),
            Some(peer) => match self.port_interfaces.get(peer) {
                Some(peer_endpoint) => self.links.contains(&(endpoint, *peer_endpoint)),
                None => true,
            },
        }
    }
}
