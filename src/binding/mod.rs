// SPDX-FileCopyrightText: 2023 Linutronix GmbH
//
// SPDX-License-Identifier: GPL-3.0-or-later
//
//! Bindings resolve a testbed to concrete devices and provide access to them
#![cfg_attr(not(feature = "fake"), doc = "```ignore")]
#![cfg_attr(feature = "fake", doc = "```")]
//! use testbedctl::binding::{Binding, FakeBinding, ReserveOptions};
//! use testbedctl::configuration::{Device, Testbed};
//!
//! # tokio_test::block_on(async {
//! let testbed = Testbed {
//!     duts: vec![Device::new("dut", &["port1"])],
//!     ..Testbed::default()
//! };
//! let mut binding = FakeBinding::new();
//! let reservation = binding.reserve(&testbed, &ReserveOptions::default()).await?;
//! let connection = binding.dial_gnmi(reservation.dut("dut")?).await?;
//! binding.release().await?;
//! # Ok::<(), anyhow::Error>(())
//! # });
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::configuration::Testbed;
use crate::reservation::{Dut, Reservation};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use log::debug;
use std::time::Duration;
use tonic::metadata::AsciiMetadataValue;
use tonic::transport::{Channel, Endpoint};
use tonic::Request;

#[cfg(test)]
use mockall::automock;

#[cfg(feature = "fake")]
mod fake;
#[cfg(feature = "fake")]
pub use fake::{Collector, FakeBinding, FakeTarget, LogMessage};

#[cfg(feature = "kne")]
mod kne;
#[cfg(feature = "kne")]
pub use kne::{
    solve, Assignment, Interface, KneBinding, KneCli, Node, NodeType, Service, Topology,
    TopologyLink, TopologySource,
};

/// Options passed along with a reservation request
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReserveOptions {
    /// How long the reservation is needed, zero for the binding default
    pub run_time: Duration,

    /// How long to wait for the testbed to become available, zero for the binding default
    pub wait_time: Duration,

    /// Reuse the existing reservation with this ID instead of creating a new one
    pub reservation_id: Option<String>,
}

/// Information about the test that is currently running
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TestMetadata {
    /// Name of the test
    pub test_name: String,

    /// Path of the test within the source tree
    pub test_path: Option<String>,

    /// Human readable description
    pub description: Option<String>,
}

/// Defines how a testbed is reserved and how the reserved devices are accessed
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Binding {
    /// Reserve devices matching the testbed
    ///
    /// # Errors
    ///
    /// Will return `Err` if the testbed can not be resolved,
    /// e.g. because too many devices are requested,
    /// a device can not be matched or the topology can not be fetched.
    async fn reserve(&mut self, testbed: &Testbed, options: &ReserveOptions)
        -> Result<Reservation>;

    /// Release the devices reserved by the last `reserve` call
    ///
    /// # Errors
    ///
    /// Will return `Err` if the devices could not be released.
    async fn release(&mut self) -> Result<()>;

    /// Fetch a reservation that was created outside of this process
    ///
    /// # Errors
    ///
    /// Will return `Err` if the reservation is unknown or the binding can not fetch reservations.
    async fn fetch_reservation(&mut self, id: &str) -> Result<Reservation> {
        Err(anyhow!(
            "Fetching reservation {id} is not supported by this binding"
        ))
    }

    /// Open a gNMI connection to the given DUT
    ///
    /// # Errors
    ///
    /// Will return `Err` if the DUT is not part of the reservation or can not be reached.
    async fn dial_gnmi(&self, dut: &Dut) -> Result<GrpcConnection>;

    /// Open a console connection to the given DUT
    ///
    /// # Errors
    ///
    /// Will return `Err` if the binding provides no console access or the DUT can not be reached.
    async fn dial_console(&self, dut: &Dut) -> Result<GrpcConnection> {
        Err(anyhow!(
            "Console access to {} is not supported by this binding",
            dut.name()
        ))
    }

    /// Inform the binding about the running test
    ///
    /// # Errors
    ///
    /// Will return `Err` if the binding could not record the metadata.
    fn set_test_metadata(&mut self, metadata: &TestMetadata) -> Result<()> {
        debug!("Ignoring test metadata for {}", metadata.test_name);
        Ok(())
    }
}

/// Time allowed for establishing a connection in [`GrpcConnection::dial`]
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// An established gRPC channel to a device
///
/// Wrap the channel into a generated service client (e.g. gNMI) to issue calls.
#[derive(Debug, Clone)]
pub struct GrpcConnection {
    address: String,
    channel: Channel,
    credentials: Option<(AsciiMetadataValue, AsciiMetadataValue)>,
}

impl GrpcConnection {
    /// Connect to the given `host:port` without transport security
    ///
    /// Fails immediately if the endpoint is not reachable, no retries are performed.
    /// Gives up after [`DIAL_TIMEOUT`] if the endpoint does not answer.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the address is invalid or the connection can not be established.
    pub async fn dial(address: &str) -> Result<Self> {
        Self::dial_with_timeout(address, DIAL_TIMEOUT).await
    }

    /// Like [`Self::dial`], but gives up after `timeout`
    ///
    /// # Errors
    ///
    /// Will return `Err` if the address is invalid or the connection can not be established
    /// within `timeout`.
    pub async fn dial_with_timeout(address: &str, timeout: Duration) -> Result<Self> {
        let endpoint = Endpoint::from_shared(format!("http://{address}"))
            .with_context(|| format!("Invalid gRPC address {address}"))?
            .connect_timeout(timeout);
        let channel = endpoint
            .connect()
            .await
            .with_context(|| format!("Dialing {address} failed"))?;
        debug!("Connected to {address}");

        Ok(Self {
            address: address.to_owned(),
            channel,
            credentials: None,
        })
    }

    /// Attach `username` and `password` metadata to every request built with [`Self::request`]
    ///
    /// # Errors
    ///
    /// Will return `Err` if the credentials are not valid metadata values.
    pub fn with_credentials(mut self, username: &str, password: &str) -> Result<Self> {
        let username: AsciiMetadataValue = username.parse().context("Invalid username")?;
        let password: AsciiMetadataValue = password.parse().context("Invalid password")?;
        self.credentials = Some((username, password));
        Ok(self)
    }

    /// Address the connection was established to
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The underlying channel
    #[must_use]
    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }

    /// Build a request carrying the configured credentials
    pub fn request<T>(&self, message: T) -> Request<T> {
        let mut request = Request::new(message);
        if let Some((username, password)) = &self.credentials {
            request.metadata_mut().insert("username", username.clone());
            request.metadata_mut().insert("password", password.clone());
        }
        request
    }
}
