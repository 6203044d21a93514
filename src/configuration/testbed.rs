// SPDX-FileCopyrightText: 2023 Linutronix GmbH
//
// SPDX-License-Identifier: GPL-3.0-or-later
//
//! Declarative description of the requested testbed

use serde::{Deserialize, Serialize};
use std::fmt;

/// Devices, ports and links requested for a test run
#[derive(Default, Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Testbed {
    /// Devices under test
    #[serde(default)]
    pub duts: Vec<Device>,

    /// Automated test equipment (traffic generators)
    #[serde(default)]
    pub ates: Vec<Device>,

    /// Undirected connections between two `device:port` endpoints
    #[serde(default)]
    pub links: Vec<Link>,
}

impl Testbed {
    /// All requested devices, DUTs first
    pub fn devices(&self) -> impl Iterator<Item = &Device> {
        self.duts.iter().chain(self.ates.iter())
    }
}

/// A requested DUT or ATE
#[derive(Default, Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Device {
    /// Identifier used by the test to refer to the device
    pub id: String,

    /// Requested vendor, `UNSPECIFIED` matches any vendor
    #[serde(default)]
    pub vendor: Vendor,

    /// Requested hardware model
    #[serde(default)]
    pub hardware_model: Option<String>,

    /// Requested software version
    #[serde(default)]
    pub software_version: Option<String>,

    /// Requested ports
    #[serde(default)]
    pub ports: Vec<Port>,
}

impl Device {
    /// Construct a device with the given ports and no further constraints
    #[must_use]
    pub fn new(id: &str, ports: &[&str]) -> Self {
        Self {
            id: id.to_owned(),
            ports: ports.iter().map(|p| Port::new(p)).collect(),
            ..Self::default()
        }
    }
}

/// A requested port of a device
#[derive(Default, Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Port {
    /// Identifier of the port, unique per device
    pub id: String,

    /// Requested speed
    #[serde(default)]
    pub speed: Option<PortSpeed>,
}

impl Port {
    /// Construct a port without speed requirement
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            speed: None,
        }
    }
}

/// Connection between two ports, each given as `<device-id>:<port-id>`
#[derive(Default, Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Link {
    /// First endpoint
    pub a: String,

    /// Second endpoint
    pub b: String,
}

impl Link {
    /// Construct a link between two `device:port` endpoints
    #[must_use]
    pub fn new(a: &str, b: &str) -> Self {
        Self {
            a: a.to_owned(),
            b: b.to_owned(),
        }
    }
}

/// Key of a port in the form `<device-id>:<port-id>`
#[must_use]
pub fn port_key(device_id: &str, port_id: &str) -> String {
    format!("{device_id}:{port_id}")
}

/// Device vendor
#[derive(Default, Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Vendor {
    /// No vendor requested or known
    #[default]
    Unspecified,

    /// Arista Networks
    Arista,

    /// Cisco Systems
    Cisco,

    /// Juniper Networks
    Juniper,

    /// Keysight/IXIA traffic generators
    Ixia,

    /// Nokia
    Nokia,

    /// Simulated in-process device
    Fake,
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Unspecified => write!(f, "UNSPECIFIED"),
            Self::Arista => write!(f, "ARISTA"),
            Self::Cisco => write!(f, "CISCO"),
            Self::Juniper => write!(f, "JUNIPER"),
            Self::Ixia => write!(f, "IXIA"),
            Self::Nokia => write!(f, "NOKIA"),
            Self::Fake => write!(f, "FAKE"),
        }
    }
}

/// Port speed
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
pub enum PortSpeed {
    /// 1 Gbit/s
    #[serde(rename = "S_1GB")]
    S1Gb,

    /// 5 Gbit/s
    #[serde(rename = "S_5GB")]
    S5Gb,

    /// 10 Gbit/s
    #[serde(rename = "S_10GB")]
    S10Gb,

    /// 25 Gbit/s
    #[serde(rename = "S_25GB")]
    S25Gb,

    /// 40 Gbit/s
    #[serde(rename = "S_40GB")]
    S40Gb,

    /// 50 Gbit/s
    #[serde(rename = "S_50GB")]
    S50Gb,

    /// 100 Gbit/s
    #[serde(rename = "S_100GB")]
    S100Gb,

    /// 200 Gbit/s
    #[serde(rename = "S_200GB")]
    S200Gb,

    /// 400 Gbit/s
    #[serde(rename = "S_400GB")]
    S400Gb,
}
