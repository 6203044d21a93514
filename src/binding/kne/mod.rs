// SPDX-FileCopyrightText: 2023 Linutronix GmbH
//
// SPDX-License-Identifier: GPL-3.0-or-later
//
//! Binding for devices running in a KNE cluster
//!
//! The live topology is fetched with the KNE command line tool and the
//! requested testbed is matched against it. Devices are not actually reserved,
//! so nothing has to be freed on release.

use crate::binding::{Binding, GrpcConnection, ReserveOptions};
use crate::configuration::{Device, KneConfig, Testbed};
use crate::reservation::{Ate, Dims, Dut, Reservation, ResolvedPort};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

mod solve;
pub use solve::{solve, Assignment};

mod topology;
pub use topology::{
    Interface, KneCli, Node, NodeType, Service, Topology, TopologyLink, TopologySource,
};

const GNMI_SERVICE: &str = "gnmi";

/// Resolves testbeds against a running KNE topology
pub struct KneBinding {
    config: KneConfig,
    source: Box<dyn TopologySource + Send + Sync>,
    gnmi_addresses: HashMap<String, String>,
}

impl KneBinding {
    /// Create a binding that fetches the topology with the KNE command line tool
    #[must_use]
    pub fn new(config: KneConfig) -> Self {
        Self::with_topology_source(config, Box::new(KneCli::new()))
    }

    /// Create a binding with a custom topology source
    #[must_use]
    pub fn with_topology_source(
        config: KneConfig,
        source: Box<dyn TopologySource + Send + Sync>,
    ) -> Self {
        Self {
            config,
            source,
            gnmi_addresses: HashMap::new(),
        }
    }
}

#[async_trait]
impl Binding for KneBinding {
    async fn reserve(
        &mut self,
        testbed: &Testbed,
        _options: &ReserveOptions,
    ) -> Result<Reservation> {
        let topology = self.source.fetch(&self.config).await?;
        let assignment = solve(testbed, &topology)?;

        let mut reservation = Reservation::new(&Uuid::new_v4().to_string());
        let mut gnmi_addresses = HashMap::new();

        for dut in &testbed.duts {
            let node = assignment.node(&topology, &dut.id)?;
            let dims = resolve_dims(dut, node, &assignment)?;
            gnmi_addresses.insert(dims.name.clone(), gnmi_address(node)?);
            reservation.duts.insert(dut.id.clone(), Dut::new(dims));
        }

        for ate in &testbed.ates {
            let node = assignment.node(&topology, &ate.id)?;
            let dims = resolve_dims(ate, node, &assignment)?;
            reservation.ates.insert(ate.id.clone(), Ate::new(dims));
        }

        self.gnmi_addresses = gnmi_addresses;
        info!(
            "Reserved testbed {} in KNE topology {}",
            reservation.id, topology.name
        );
        Ok(reservation)
    }

    async fn release(&mut self) -> Result<()> {
        self.gnmi_addresses.clear();
        Ok(())
    }

    async fn dial_gnmi(&self, dut: &Dut) -> Result<GrpcConnection> {
        let address = self
            .gnmi_addresses
            .get(dut.name())
            .ok_or_else(|| anyhow!("No gNMI address known for DUT {}", dut.name()))?;
        info!("Dialing gNMI dut {}@{address}", dut.name());

        let connection = GrpcConnection::dial(address).await?;
        match (&self.config.username, &self.config.password) {
            (Some(username), Some(password)) => {
                warn!(
                    "Sending credentials for DUT {} to {address} without transport security",
                    dut.name()
                );
                connection.with_credentials(username, password)
            }
            _ => Ok(connection),
        }
    }
}

fn resolve_dims(device: &Device, node: &Node, assignment: &Assignment) -> Result<Dims> {
    let vendor = node.node_type.vendor().ok_or_else(|| {
        anyhow!(
            "No known device vendor for node type: {}",
            node.node_type
        )
    })?;

    let mut ports = BTreeMap::new();
    for port in &device.ports {
        let interface = assignment.interface(&device.id, &port.id)?;
        let name = node
            .interfaces
            .get(interface)
            .and_then(|i| i.name.clone())
            .unwrap_or_else(|| interface.to_owned());
        ports.insert(
            port.id.clone(),
            ResolvedPort {
                name,
                speed: port.speed,
            },
        );
    }

    // KNE only knows the node type
    let type_name = node.node_type.as_str();
    debug!("Resolved {} to node {} ({type_name})", device.id, node.name);
    Ok(Dims {
        name: node.name.clone(),
        vendor,
        hardware_model: type_name.to_owned(),
        software_version: type_name.to_owned(),
        ports,
    })
}

fn gnmi_address(node: &Node) -> Result<String> {
    node.services
        .values()
        .find(|service| service.name == GNMI_SERVICE)
        .map(|service| format!("{}:{}", service.outside_ip, service.outside))
        .ok_or_else(|| anyhow!("No GNMI service found in node: {}", node.name))
}
