// SPDX-FileCopyrightText: 2023 Linutronix GmbH
//
// SPDX-License-Identifier: GPL-3.0-or-later
//
//! Testbed resolved to live or simulated devices
//!
//! ```
//! use testbedctl::reservation::{Dims, Dut, Reservation, ResolvedPort};
//!
//! let mut reservation = Reservation::new("1234");
//! let mut dims = Dims::new("router1");
//! dims.ports.insert("port1".to_owned(), ResolvedPort::new("Ethernet1"));
//! reservation.duts.insert("dut".to_owned(), Dut::new(dims));
//!
//! let dut = reservation.dut("dut")?;
//! assert_eq!(dut.name(), "router1");
//! assert_eq!(dut.dims().port("port1")?.name, "Ethernet1");
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::configuration::{PortSpeed, Vendor};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The resolved binding of a testbed to devices
#[derive(Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Reservation {
    /// Opaque reservation ID
    pub id: String,

    /// Reserved DUTs by testbed ID
    pub duts: BTreeMap<String, Dut>,

    /// Reserved ATEs by testbed ID
    pub ates: BTreeMap<String, Ate>,
}

impl Reservation {
    /// Construct an empty reservation with the given ID
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_owned(),
            ..Self::default()
        }
    }

    /// Get the DUT with the given testbed ID
    ///
    /// # Errors
    ///
    /// Will return `Err` if no such DUT was reserved.
    pub fn dut(&self, id: &str) -> Result<&Dut> {
        self.duts
            .get(id)
            .ok_or_else(|| anyhow!("DUT ID {id} not found in the reservation"))
    }

    /// Get the ATE with the given testbed ID
    ///
    /// # Errors
    ///
    /// Will return `Err` if no such ATE was reserved.
    pub fn ate(&self, id: &str) -> Result<&Ate> {
        self.ates
            .get(id)
            .ok_or_else(|| anyhow!("ATE ID {id} not found in the reservation"))
    }

    /// Get the DUT or ATE with the given testbed ID, DUTs take precedence
    ///
    /// # Errors
    ///
    /// Will return `Err` if neither a DUT nor an ATE with this ID was reserved.
    pub fn device(&self, id: &str) -> Result<ReservedDevice<'_>> {
        if let Some(dut) = self.duts.get(id) {
            return Ok(ReservedDevice::Dut(dut));
        }
        if let Some(ate) = self.ates.get(id) {
            return Ok(ReservedDevice::Ate(ate));
        }
        Err(anyhow!("device ID {id} not found in the reservation"))
    }
}

/// A reserved device under test
#[derive(Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dut {
    dims: Dims,
}

impl Dut {
    /// Construct a DUT from its resolved dimensions
    #[must_use]
    pub const fn new(dims: Dims) -> Self {
        Self { dims }
    }

    /// Resolved dimensions
    #[must_use]
    pub const fn dims(&self) -> &Dims {
        &self.dims
    }

    /// Resolved name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.dims.name
    }
}

/// A reserved traffic generator
#[derive(Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ate {
    dims: Dims,
}

impl Ate {
    /// Construct an ATE from its resolved dimensions
    #[must_use]
    pub const fn new(dims: Dims) -> Self {
        Self { dims }
    }

    /// Resolved dimensions
    #[must_use]
    pub const fn dims(&self) -> &Dims {
        &self.dims
    }

    /// Resolved name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.dims.name
    }
}

/// Either kind of reserved device
#[derive(Debug, Clone, Copy)]
pub enum ReservedDevice<'a> {
    /// A device under test
    Dut(&'a Dut),

    /// A traffic generator
    Ate(&'a Ate),
}

impl ReservedDevice<'_> {
    /// Resolved dimensions
    #[must_use]
    pub fn dims(&self) -> &Dims {
        match *self {
            Self::Dut(dut) => dut.dims(),
            Self::Ate(ate) => ate.dims(),
        }
    }
}

/// Resolved device dimensions
#[derive(Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Dims {
    /// Name of the device
    pub name: String,

    /// Vendor of the device
    pub vendor: Vendor,

    /// Hardware model of the device
    pub hardware_model: String,

    /// Software version of the device
    pub software_version: String,

    /// Resolved ports by requested port ID
    pub ports: BTreeMap<String, ResolvedPort>,
}

impl Dims {
    /// Construct dimensions with the given name and nothing else resolved
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Self::default()
        }
    }

    /// Get the resolved port for the requested port ID
    ///
    /// # Errors
    ///
    /// Will return `Err` if the port was not resolved.
    pub fn port(&self, id: &str) -> Result<&ResolvedPort> {
        self.ports
            .get(id)
            .ok_or_else(|| anyhow!("port ID {id} not found in reserved device {}", self.name))
    }
}

/// A resolved port
#[derive(Debug, Default, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct ResolvedPort {
    /// Name of the port on the device
    pub name: String,

    /// Speed of the port if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<PortSpeed>,
}

impl ResolvedPort {
    /// Construct a port with unknown speed
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            speed: None,
        }
    }
}
