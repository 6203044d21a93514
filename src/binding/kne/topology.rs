// SPDX-FileCopyrightText: 2023 Linutronix GmbH
//
// SPDX-License-Identifier: GPL-3.0-or-later
//
//! Live KNE topology as reported by the KNE command line tool

use crate::configuration::{KneConfig, Vendor};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tokio::process::Command;

#[cfg(test)]
use mockall::automock;

/// Nodes and links of a running topology
#[derive(Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Topology {
    /// Name of the topology
    #[serde(default)]
    pub name: String,

    /// Nodes of the topology
    #[serde(default)]
    pub nodes: Vec<Node>,

    /// Links between node interfaces
    #[serde(default)]
    pub links: Vec<TopologyLink>,
}

/// A node of the topology
#[derive(Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Name of the node
    pub name: String,

    /// Type of the node
    #[serde(default, rename = "type")]
    pub node_type: NodeType,

    /// Services exposed by the node, keyed by inside port
    #[serde(default)]
    pub services: BTreeMap<u32, Service>,

    /// Interfaces of the node, keyed by their KNE interface name
    #[serde(default)]
    pub interfaces: BTreeMap<String, Interface>,
}

/// A service exposed by a node
#[derive(Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Service {
    /// Name of the service
    #[serde(default)]
    pub name: String,

    /// Port inside the cluster
    #[serde(default)]
    pub inside: u32,

    /// Port reachable from outside the cluster
    #[serde(default)]
    pub outside: u32,

    /// Address reachable from outside the cluster
    #[serde(default)]
    pub outside_ip: String,
}

/// An interface of a node
#[derive(Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Interface {
    /// Vendor specific interface name
    #[serde(default)]
    pub name: Option<String>,

    /// Node at the other end of the link
    #[serde(default)]
    pub peer_name: Option<String>,

    /// Interface at the other end of the link
    #[serde(default)]
    pub peer_int_name: Option<String>,
}

/// A link between two node interfaces
#[derive(Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct TopologyLink {
    /// Node of the first endpoint
    pub a_node: String,

    /// Interface of the first endpoint
    pub a_int: String,

    /// Node of the second endpoint
    pub z_node: String,

    /// Interface of the second endpoint
    pub z_int: String,
}

/// Type of a topology node
#[derive(Debug, Default, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    /// Type not known to this crate
    #[default]
    Unknown,
    /// Plain Linux host
    Host,
    /// Arista cEOS
    AristaCeos,
    /// Cisco CSR
    CiscoCsr,
    /// Cisco CXR
    CiscoCxr,
    /// Cisco XRd
    CiscoXrd,
    /// Juniper cEVO
    JuniperCevo,
    /// Juniper vMX
    JuniperVmx,
    /// Nokia SR Linux
    NokiaSrl,
    /// IXIA traffic generator
    IxiaTg,
    /// Fake device
    Fake,
}

impl NodeType {
    /// Name of the type as used by KNE
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match *self {
            Self::Unknown => "UNKNOWN",
            Self::Host => "HOST",
            Self::AristaCeos => "ARISTA_CEOS",
            Self::CiscoCsr => "CISCO_CSR",
            Self::CiscoCxr => "CISCO_CXR",
            Self::CiscoXrd => "CISCO_XRD",
            Self::JuniperCevo => "JUNIPER_CEVO",
            Self::JuniperVmx => "JUNIPER_VMX",
            Self::NokiaSrl => "NOKIA_SRL",
            Self::IxiaTg => "IXIA_TG",
            Self::Fake => "FAKE",
        }
    }

    /// Vendor of nodes of this type, `None` if the type has no known vendor
    #[must_use]
    pub const fn vendor(&self) -> Option<Vendor> {
        match *self {
            Self::AristaCeos => Some(Vendor::Arista),
            Self::CiscoCsr | Self::CiscoCxr => Some(Vendor::Cisco),
            Self::JuniperCevo | Self::JuniperVmx => Some(Vendor::Juniper),
            Self::IxiaTg => Some(Vendor::Ixia),
            Self::Fake => Some(Vendor::Fake),
            Self::Unknown | Self::Host | Self::CiscoXrd | Self::NokiaSrl => None,
        }
    }
}

impl From<String> for NodeType {
    fn from(name: String) -> Self {
        match name.as_str() {
            "HOST" => Self::Host,
            "ARISTA_CEOS" => Self::AristaCeos,
            "CISCO_CSR" => Self::CiscoCsr,
            "CISCO_CXR" => Self::CiscoCxr,
            "CISCO_XRD" => Self::CiscoXrd,
            "JUNIPER_CEVO" => Self::JuniperCevo,
            "JUNIPER_VMX" => Self::JuniperVmx,
            "NOKIA_SRL" => Self::NokiaSrl,
            "IXIA_TG" => Self::IxiaTg,
            "FAKE" => Self::Fake,
            _ => Self::Unknown,
        }
    }
}

impl From<NodeType> for String {
    fn from(node_type: NodeType) -> Self {
        node_type.as_str().to_owned()
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Defines how the live topology is obtained
#[cfg_attr(test, automock)]
#[async_trait]
pub trait TopologySource {
    /// Fetch the topology described by the configuration
    ///
    /// # Errors
    ///
    /// Will return `Err` if the topology could not be fetched or parsed.
    async fn fetch(&self, config: &KneConfig) -> Result<Topology>;
}

/// Fetches the topology by running `kne topology service`
#[derive(Debug, Default, Clone, Copy)]
pub struct KneCli;

impl KneCli {
    /// Create a new KNE CLI topology source
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TopologySource for KneCli {
    async fn fetch(&self, config: &KneConfig) -> Result<Topology> {
        let mut cmd = Command::new(&config.cli_path);
        cmd.args(topology_args(config)).kill_on_drop(true);
        debug!("Fetching KNE topology with {:?}", cmd.as_std());

        let output = cmd
            .output()
            .await
            .with_context(|| format!("Failed to execute command {:?}", cmd.as_std()))?;

        if !output.status.success() {
            return Err(anyhow!(
                "Command\n{:?}\nfailed with status: {}, {}",
                cmd.as_std(),
                output.status,
                String::from_utf8_lossy(&output.stderr)
            ));
        }

        let stdout = String::from_utf8(output.stdout).with_context(|| {
            format!(
                "Invalid UTF-8 sequence returned when executing\n{:?}",
                cmd.as_std()
            )
        })?;

        parse_topology(&stdout)
    }
}

fn topology_args(config: &KneConfig) -> Vec<String> {
    let mut args = vec![
        "topology".to_owned(),
        "service".to_owned(),
        config.topology.display().to_string(),
    ];
    if let Some(kubecfg) = &config.kubecfg {
        args.push(format!("--kubecfg={}", kubecfg.display()));
    }
    args
}

fn parse_topology(output: &str) -> Result<Topology> {
    serde_yaml::from_str(output).context("Error parsing KNE topology")
}
