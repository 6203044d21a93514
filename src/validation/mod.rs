// SPDX-FileCopyrightText: 2023 Linutronix GmbH
//
// SPDX-License-Identifier: GPL-3.0-or-later
//
//! Validates requested testbeds and the reservations resolved for them
//!
//! ```
//! use testbedctl::configuration::{Device, Link, Testbed};
//! use testbedctl::validation::validate_testbed;
//!
//! let testbed = Testbed {
//!     duts: vec![Device::new("d1", &["p1", "p2"]), Device::new("d2", &["p1"])],
//!     ates: vec![],
//!     links: vec![Link::new("d1:p1", "d2:p1")],
//! };
//! let ports = validate_testbed(&testbed)?;
//! assert_eq!(ports.peer("d1:p1"), Some("d2:p1"));
//! assert_eq!(ports.peer("d1:p2"), Some(""));
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::configuration::{port_key, Device, Testbed};
use crate::reservation::{Dims, Reservation};
use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::btree_map;
use std::collections::BTreeMap;

static ID_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[a-zA-Z][a-zA-Z0-9_]*$").expect("valid ID pattern"));

/// Registers which ports are connected to which other ports
///
/// Keys are in the form `<device-id>:<port-id>`. Ports without a link map to `""`.
/// Each pair of connected ports A and B is contained twice, A mapping to B and B mapping to A.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub struct PortMap {
    peers: BTreeMap<String, String>,
}

impl PortMap {
    /// Peer of the given port
    ///
    /// Returns `None` if the port was not declared and `Some("")` if it is not connected.
    #[must_use]
    pub fn peer(&self, port: &str) -> Option<&str> {
        self.peers.get(port).map(String::as_str)
    }

    /// Number of declared ports
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// True if no port is declared
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Iterate over all declared ports and their peers
    pub fn iter(&self) -> btree_map::Iter<'_, String, String> {
        self.peers.iter()
    }
}

/// Validate ID syntax, port uniqueness and link consistency of a testbed
///
/// # Errors
///
/// Will return `Err` on the first violation found:
/// an invalid ID, a duplicate port, a link to an undeclared port
/// or a port linked to more than one other port.
pub fn validate_testbed(testbed: &Testbed) -> Result<PortMap> {
    let mut peers = BTreeMap::new();

    for device in testbed.devices() {
        check_id(&device.id)?;
        for port in &device.ports {
            check_id(&port.id)?;
            let key = port_key(&device.id, &port.id);
            if peers.contains_key(&key) {
                return Err(anyhow!("duplicate port {key:?}"));
            }
            peers.insert(key, String::new());
        }
    }

    for link in &testbed.links {
        let dup_b = peers
            .get(&link.a)
            .ok_or_else(|| anyhow!("nonexistent linked port ID {:?}", link.a))?;
        let dup_a = peers
            .get(&link.b)
            .ok_or_else(|| anyhow!("nonexistent linked port ID {:?}", link.b))?;

        if !dup_b.is_empty() {
            return Err(anyhow!(
                "conflicting connections from {:?} to {:?} and {:?}",
                link.a,
                dup_b,
                link.b
            ));
        }
        if !dup_a.is_empty() {
            return Err(anyhow!(
                "conflicting connections from {:?} to {:?} and {:?}",
                link.b,
                dup_a,
                link.a
            ));
        }

        peers.insert(link.a.clone(), link.b.clone());
        peers.insert(link.b.clone(), link.a.clone());
    }

    Ok(PortMap { peers })
}

/// Enforce testbed IDs that look like variable names
///
/// This keeps IDs consistent and avoids accidentally using a device name as ID.
///
/// # Errors
///
/// Will return `Err` if the ID does not start with a letter
/// or contains anything else than letters, numbers or underscores.
pub fn check_id(id: &str) -> Result<()> {
    if !ID_REGEX.is_match(id) {
        return Err(anyhow!(
            "invalid testbed ID {id:?}: must start with a letter and contain only letters, numbers, or underscore"
        ));
    }
    Ok(())
}

/// Check that every requested device and port got a non-empty name in the reservation
///
/// # Errors
///
/// Will return `Err` if a requested device or port is missing in the reservation
/// or was resolved without a name.
pub fn validate_reservation(testbed: &Testbed, reservation: &Reservation) -> Result<()> {
    for dut in &testbed.duts {
        let resolved = reservation.dut(&dut.id)?;
        validate_device(dut, resolved.dims())?;
    }
    for ate in &testbed.ates {
        let resolved = reservation.ate(&ate.id)?;
        validate_device(ate, resolved.dims())?;
    }
    Ok(())
}

fn validate_device(device: &Device, dims: &Dims) -> Result<()> {
    if dims.name.is_empty() {
        return Err(anyhow!("no name for reserved device: {}", device.id));
    }
    for port in &device.ports {
        let resolved = dims.port(&port.id)?;
        if resolved.name.is_empty() {
            return Err(anyhow!("no name for reserved port: {}", port.id));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::Link;
    use crate::reservation::{Ate, Dut, ResolvedPort};

    fn testbed(duts: Vec<Device>, ates: Vec<Device>, links: Vec<Link>) -> Testbed {
        Testbed { duts, ates, links }
    }

    #[test]
    fn test_check_id() {
        for id in ["a", "dut", "Port_1", "x9_y"] {
            assert!(check_id(id).is_ok(), "{id} should be valid");
        }
        for id in ["", "1dut", "_dut", "dut-1", "dut:1", "d u t", "dut.1"] {
            assert!(check_id(id).is_err(), "{id} should be invalid");
        }
    }

    #[test]
    fn test_validate_scenario() -> Result<()> {
        let testbed = testbed(
            vec![Device::new("d1", &["p1", "p2"]), Device::new("d2", &["p1"])],
            vec![],
            vec![Link::new("d1:p1", "d2:p1")],
        );

        let ports = validate_testbed(&testbed)?;
        let expected: Vec<(&str, &str)> =
            vec![("d1:p1", "d2:p1"), ("d1:p2", ""), ("d2:p1", "d1:p1")];
        let actual: Vec<(&str, &str)> = ports
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        assert_eq!(actual, expected);
        Ok(())
    }

    #[test]
    fn test_validate_links_are_symmetric() -> Result<()> {
        let testbed = testbed(
            vec![
                Device::new("dut1", &["port1", "port2", "port3"]),
                Device::new("dut2", &["port1", "port2"]),
            ],
            vec![Device::new("ate", &["port1", "port2"])],
            vec![
                Link::new("dut1:port1", "dut2:port1"),
                Link::new("dut1:port2", "ate:port1"),
                Link::new("ate:port2", "dut2:port2"),
            ],
        );

        let ports = validate_testbed(&testbed)?;
        assert_eq!(ports.len(), 7);
        for link in &testbed.links {
            assert_eq!(ports.peer(&link.a), Some(link.b.as_str()));
            assert_eq!(ports.peer(&link.b), Some(link.a.as_str()));
        }
        for (port, peer) in ports.iter().filter(|(_, peer)| !peer.is_empty()) {
            assert_eq!(ports.peer(peer), Some(port.as_str()));
        }
        assert_eq!(ports.peer("dut1:port3"), Some(""));
        assert_eq!(ports.peer("dut1:port4"), None);
        Ok(())
    }

    #[test]
    fn test_validate_empty() -> Result<()> {
        assert!(validate_testbed(&Testbed::default())?.is_empty());
        Ok(())
    }

    #[test]
    #[should_panic(expected = "invalid testbed ID \"1dut\"")]
    fn test_validate_invalid_device_id() {
        let testbed = testbed(vec![Device::new("1dut", &["port1"])], vec![], vec![]);
        validate_testbed(&testbed).unwrap();
    }

    #[test]
    #[should_panic(expected = "invalid testbed ID \"port-1\"")]
    fn test_validate_invalid_port_id() {
        let testbed = testbed(vec![], vec![Device::new("ate", &["port-1"])], vec![]);
        validate_testbed(&testbed).unwrap();
    }

    #[test]
    #[should_panic(expected = "duplicate port \"dut:port1\"")]
    fn test_validate_duplicate_port() {
        let testbed = testbed(
            vec![Device::new("dut", &["port1", "port2", "port1"])],
            vec![],
            vec![],
        );
        validate_testbed(&testbed).unwrap();
    }

    #[test]
    #[should_panic(expected = "duplicate port \"dev:port1\"")]
    fn test_validate_duplicate_port_across_dut_and_ate() {
        let testbed = testbed(
            vec![Device::new("dev", &["port1"])],
            vec![Device::new("dev", &["port1"])],
            vec![],
        );
        validate_testbed(&testbed).unwrap();
    }

    #[test]
    #[should_panic(expected = "nonexistent linked port ID \"dut2:port1\"")]
    fn test_validate_nonexistent_port_b() {
        let testbed = testbed(
            vec![Device::new("dut1", &["port1"])],
            vec![],
            vec![Link::new("dut1:port1", "dut2:port1")],
        );
        validate_testbed(&testbed).unwrap();
    }

    #[test]
    #[should_panic(expected = "nonexistent linked port ID \"dut1:port9\"")]
    fn test_validate_nonexistent_port_a() {
        let testbed = testbed(
            vec![Device::new("dut1", &["port1"])],
            vec![],
            vec![Link::new("dut1:port9", "dut1:port1")],
        );
        validate_testbed(&testbed).unwrap();
    }

    #[test]
    #[should_panic(
        expected = "conflicting connections from \"d1:p1\" to \"d1:p1\" and \"d1:p1\""
    )]
    fn test_validate_duplicated_self_link() {
        let testbed = testbed(
            vec![Device::new("d1", &["p1"])],
            vec![],
            vec![Link::new("d1:p1", "d1:p1"), Link::new("d1:p1", "d1:p1")],
        );
        validate_testbed(&testbed).unwrap();
    }

    #[test]
    #[should_panic(
        expected = "conflicting connections from \"dut2:port1\" to \"dut1:port1\" and \"dut3:port1\""
    )]
    fn test_validate_conflicting_b() {
        let testbed = testbed(
            vec![
                Device::new("dut1", &["port1"]),
                Device::new("dut2", &["port1"]),
                Device::new("dut3", &["port1"]),
            ],
            vec![],
            vec![
                Link::new("dut1:port1", "dut2:port1"),
                Link::new("dut3:port1", "dut2:port1"),
            ],
        );
        validate_testbed(&testbed).unwrap();
    }

    fn resolved(name: &str, ports: &[(&str, &str)]) -> Dims {
        Dims {
            name: name.to_owned(),
            ports: ports
                .iter()
                .map(|(id, name)| ((*id).to_owned(), ResolvedPort::new(name)))
                .collect(),
            ..Dims::default()
        }
    }

    fn reservation(duts: Vec<(&str, Dims)>, ates: Vec<(&str, Dims)>) -> Reservation {
        Reservation {
            id: "1234".to_owned(),
            duts: duts
                .into_iter()
                .map(|(id, dims)| (id.to_owned(), Dut::new(dims)))
                .collect(),
            ates: ates
                .into_iter()
                .map(|(id, dims)| (id.to_owned(), Ate::new(dims)))
                .collect(),
        }
    }

    #[test]
    fn test_validate_reservation_happy() -> Result<()> {
        let testbed = testbed(
            vec![Device::new("dut", &["port1", "port2"])],
            vec![Device::new("ate", &["port1"])],
            vec![],
        );
        let reservation = reservation(
            vec![("dut", resolved("r1", &[("port1", "Ethernet1"), ("port2", "Ethernet2")]))],
            vec![("ate", resolved("ixia", &[("port1", "1/1")]))],
        );

        validate_reservation(&testbed, &reservation)
    }

    #[test]
    #[should_panic(expected = "DUT ID dut not found in the reservation")]
    fn test_validate_reservation_missing_dut() {
        let testbed = testbed(vec![Device::new("dut", &[])], vec![], vec![]);
        validate_reservation(&testbed, &reservation(vec![], vec![])).unwrap();
    }

    #[test]
    #[should_panic(expected = "no name for reserved device: ate")]
    fn test_validate_reservation_empty_device_name() {
        let testbed = testbed(vec![], vec![Device::new("ate", &[])], vec![]);
        let reservation = reservation(vec![], vec![("ate", resolved("", &[]))]);
        validate_reservation(&testbed, &reservation).unwrap();
    }

    #[test]
    #[should_panic(expected = "port ID port2 not found in reserved device r1")]
    fn test_validate_reservation_missing_port() {
        let testbed = testbed(vec![Device::new("dut", &["port1", "port2"])], vec![], vec![]);
        let reservation = reservation(
            vec![("dut", resolved("r1", &[("port1", "Ethernet1")]))],
            vec![],
        );
        validate_reservation(&testbed, &reservation).unwrap();
    }

    #[test]
    #[should_panic(expected = "no name for reserved port: port1")]
    fn test_validate_reservation_empty_port_name() {
        let testbed = testbed(vec![Device::new("dut", &["port1"])], vec![], vec![]);
        let reservation = reservation(vec![("dut", resolved("r1", &[("port1", "")]))], vec![]);
        validate_reservation(&testbed, &reservation).unwrap();
    }
}
