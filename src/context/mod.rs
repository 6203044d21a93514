// SPDX-FileCopyrightText: 2023 Linutronix GmbH
//
// SPDX-License-Identifier: GPL-3.0-or-later
//
//! Holds the one reservation of a test run
//!
//! The context combines a binding with the validation of the requested testbed
//! and of the resolved reservation. At most one reservation is live at a time.
//! A reservation fetched by ID was created elsewhere and is never released by
//! the context.
#![cfg_attr(not(feature = "fake"), doc = "```ignore")]
#![cfg_attr(feature = "fake", doc = "```")]
//! use testbedctl::binding::{FakeBinding, ReserveOptions};
//! use testbedctl::configuration::{Device, Testbed};
//! use testbedctl::context::TestContext;
//!
//! # tokio_test::block_on(async {
//! let testbed = Testbed {
//!     duts: vec![Device::new("dut", &["port1"])],
//!     ..Testbed::default()
//! };
//! let context = TestContext::new(Box::new(FakeBinding::new()));
//! context.reserve(&testbed, &ReserveOptions::default()).await?;
//! assert_eq!(context.dut("dut").await?.dims().port("port1")?.name, "port1");
//! let connection = context.dial_gnmi("dut").await?;
//! context.release().await?;
//! # Ok::<(), anyhow::Error>(())
//! # });
//! # Ok::<(), anyhow::Error>(())
//! ```

use crate::binding::{Binding, GrpcConnection, ReserveOptions, TestMetadata};
use crate::configuration::Testbed;
use crate::reservation::{Ate, Dut, Reservation};
use crate::validation::{validate_reservation, validate_testbed};
use anyhow::{anyhow, ensure, Context, Result};
use log::{debug, info, warn};
use std::mem;
use std::sync::Arc;
use tokio::sync::RwLock;

enum State {
    Unreserved,
    Reserved(Arc<Reservation>),
    Fetched(Arc<Reservation>),
}

struct Inner {
    binding: Box<dyn Binding + Send + Sync>,
    state: State,
}

impl Inner {
    fn reservation(&self) -> Result<Arc<Reservation>> {
        match &self.state {
            State::Unreserved => Err(anyhow!("testbed is not reserved")),
            State::Reserved(reservation) | State::Fetched(reservation) => Ok(reservation.clone()),
        }
    }
}

/// Reservation store of a test run
pub struct TestContext {
    inner: RwLock<Inner>,
}

impl TestContext {
    /// Create a context without reservation that uses the given binding
    #[must_use]
    pub fn new(binding: Box<dyn Binding + Send + Sync>) -> Self {
        Self {
            inner: RwLock::new(Inner {
                binding,
                state: State::Unreserved,
            }),
        }
    }

    /// Validate the testbed and reserve it with the binding
    ///
    /// If `options.reservation_id` is set, the existing reservation is fetched instead.
    ///
    /// # Errors
    ///
    /// Will return `Err` if a reservation is already live, the testbed is invalid,
    /// the binding fails or the resolved reservation does not cover the testbed.
    /// A freshly created reservation that does not cover the testbed is released again.
    pub async fn reserve(
        &self,
        testbed: &Testbed,
        options: &ReserveOptions,
    ) -> Result<Arc<Reservation>> {
        let mut inner = self.inner.write().await;
        ensure!(
            matches!(inner.state, State::Unreserved),
            "testbed is already reserved"
        );

        validate_testbed(testbed)?;

        let (reservation, fetched) = match &options.reservation_id {
            Some(id) => (inner.binding.fetch_reservation(id).await?, true),
            None => (inner.binding.reserve(testbed, options).await?, false),
        };

        if let Err(e) = validate_reservation(testbed, &reservation) {
            if !fetched {
                if let Err(release_error) = inner.binding.release().await {
                    warn!(
                        "Releasing invalid reservation {} failed: {release_error:#}",
                        reservation.id
                    );
                }
            }
            return Err(e);
        }

        let reservation = Arc::new(reservation);
        inner.state = if fetched {
            info!("Fetched reservation {}", reservation.id);
            State::Fetched(reservation.clone())
        } else {
            info!("Reserved testbed as {}", reservation.id);
            State::Reserved(reservation.clone())
        };
        Ok(reservation)
    }

    /// Validate the testbed and fetch the existing reservation with the given ID
    ///
    /// # Errors
    ///
    /// See [`Self::reserve`].
    pub async fn fetch_reservation(&self, testbed: &Testbed, id: &str) -> Result<Arc<Reservation>> {
        let options = ReserveOptions {
            reservation_id: Some(id.to_owned()),
            ..ReserveOptions::default()
        };
        self.reserve(testbed, &options).await
    }

    /// Release the reservation
    ///
    /// Does nothing if there is no reservation or it was fetched.
    ///
    /// # Errors
    ///
    /// Will return `Err` if the binding fails to release the devices.
    /// The context is unreserved afterwards in any case.
    pub async fn release(&self) -> Result<()> {
        let mut inner = self.inner.write().await;
        let reservation = match mem::replace(&mut inner.state, State::Unreserved) {
            State::Unreserved => return Ok(()),
            State::Fetched(reservation) => {
                debug!("Keeping fetched reservation {}", reservation.id);
                inner.state = State::Fetched(reservation);
                return Ok(());
            }
            State::Reserved(reservation) => reservation,
        };

        inner
            .binding
            .release()
            .await
            .with_context(|| format!("Releasing reservation {} failed", reservation.id))?;
        info!("Released reservation {}", reservation.id);
        Ok(())
    }

    /// The live reservation
    ///
    /// # Errors
    ///
    /// Will return `Err` if the testbed is not reserved.
    pub async fn reservation(&self) -> Result<Arc<Reservation>> {
        self.inner.read().await.reservation()
    }

    /// ID of the live reservation
    ///
    /// # Errors
    ///
    /// Will return `Err` if the testbed is not reserved.
    pub async fn reservation_id(&self) -> Result<String> {
        Ok(self.reservation().await?.id.clone())
    }

    /// True if the live reservation was fetched instead of created
    pub async fn is_fetched(&self) -> bool {
        matches!(self.inner.read().await.state, State::Fetched(_))
    }

    /// Reserved DUT with the given testbed ID
    ///
    /// # Errors
    ///
    /// Will return `Err` if the testbed is not reserved or contains no such DUT.
    pub async fn dut(&self, id: &str) -> Result<Dut> {
        Ok(self.reservation().await?.dut(id)?.clone())
    }

    /// Reserved ATE with the given testbed ID
    ///
    /// # Errors
    ///
    /// Will return `Err` if the testbed is not reserved or contains no such ATE.
    pub async fn ate(&self, id: &str) -> Result<Ate> {
        Ok(self.reservation().await?.ate(id)?.clone())
    }

    /// Open a gNMI connection to the DUT with the given testbed ID
    ///
    /// The reservation is locked for reading while dialing, so [`Self::reserve`] and
    /// [`Self::release`] wait for a pending dial. Dials of the bundled bindings give up after
    /// [`crate::binding::DIAL_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// Will return `Err` if the DUT is not reserved or can not be dialed.
    pub async fn dial_gnmi(&self, id: &str) -> Result<GrpcConnection> {
        let inner = self.inner.read().await;
        let reservation = inner.reservation()?;
        inner.binding.dial_gnmi(reservation.dut(id)?).await
    }

    /// Open a console connection to the DUT with the given testbed ID
    ///
    /// Locks the reservation while dialing like [`Self::dial_gnmi`].
    ///
    /// # Errors
    ///
    /// Will return `Err` if the DUT is not reserved or the binding has no console access.
    pub async fn dial_console(&self, id: &str) -> Result<GrpcConnection> {
        let inner = self.inner.read().await;
        let reservation = inner.reservation()?;
        inner.binding.dial_console(reservation.dut(id)?).await
    }

    /// Pass information about the running test to the binding
    ///
    /// # Errors
    ///
    /// Will return `Err` if the binding fails to record the metadata.
    pub async fn set_test_metadata(&self, metadata: &TestMetadata) -> Result<()> {
        self.inner.write().await.binding.set_test_metadata(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::MockBinding;
    use crate::configuration::Device;
    use crate::reservation::{Dims, ResolvedPort};

    fn testbed() -> Testbed {
        Testbed {
            duts: vec![Device::new("dut", &["port1"])],
            ..Testbed::default()
        }
    }

    fn reservation(id: &str) -> Reservation {
        let mut dims = Dims::new("router1");
        dims.ports
            .insert("port1".to_owned(), ResolvedPort::new("Ethernet1"));
        let mut reservation = Reservation::new(id);
        reservation.duts.insert("dut".to_owned(), Dut::new(dims));
        reservation
    }

    #[tokio::test]
    async fn test_reserve_happy() -> Result<()> {
        let mut binding = MockBinding::new();
        binding
            .expect_reserve()
            .times(1)
            .returning(|_, _| Ok(reservation("1234")));

        let context = TestContext::new(Box::new(binding));
        context
            .reserve(&testbed(), &ReserveOptions::default())
            .await?;

        assert_eq!(context.reservation_id().await?, "1234");
        assert_eq!(context.dut("dut").await?.name(), "router1");
        assert!(!context.is_fetched().await);
        Ok(())
    }

    #[tokio::test]
    #[should_panic(expected = "testbed is already reserved")]
    async fn test_reserve_twice() {
        let mut binding = MockBinding::new();
        binding
            .expect_reserve()
            .times(1)
            .returning(|_, _| Ok(reservation("1234")));

        let context = TestContext::new(Box::new(binding));
        context
            .reserve(&testbed(), &ReserveOptions::default())
            .await
            .unwrap();
        context
            .reserve(&testbed(), &ReserveOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_reserve_after_release() -> Result<()> {
        let mut binding = MockBinding::new();
        binding
            .expect_reserve()
            .times(2)
            .returning(|_, _| Ok(reservation("1234")));
        binding.expect_release().times(1).returning(|| Ok(()));

        let context = TestContext::new(Box::new(binding));
        context
            .reserve(&testbed(), &ReserveOptions::default())
            .await?;
        context.release().await?;
        assert!(context.reservation().await.is_err_and(|e| e
            .to_string()
            .contains("testbed is not reserved")));

        context
            .reserve(&testbed(), &ReserveOptions::default())
            .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_release_without_reservation() -> Result<()> {
        let mut binding = MockBinding::new();
        binding.expect_release().never();

        TestContext::new(Box::new(binding)).release().await
    }

    #[tokio::test]
    async fn test_fetched_reservation_is_kept() -> Result<()> {
        let mut binding = MockBinding::new();
        binding.expect_reserve().never();
        binding
            .expect_fetch_reservation()
            .withf(|id| id == "abcd")
            .times(1)
            .returning(|id| Ok(reservation(id)));
        binding.expect_release().never();

        let context = TestContext::new(Box::new(binding));
        context.fetch_reservation(&testbed(), "abcd").await?;
        assert!(context.is_fetched().await);

        context.release().await?;
        assert_eq!(context.reservation_id().await?, "abcd");
        Ok(())
    }

    #[tokio::test]
    #[should_panic(expected = "duplicate port \"dut:port1\"")]
    async fn test_invalid_testbed_is_not_reserved() {
        let mut binding = MockBinding::new();
        binding.expect_reserve().never();

        let testbed = Testbed {
            duts: vec![Device::new("dut", &["port1", "port1"])],
            ..Testbed::default()
        };
        TestContext::new(Box::new(binding))
            .reserve(&testbed, &ReserveOptions::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_reservation_is_released() -> Result<()> {
        let mut binding = MockBinding::new();
        binding.expect_reserve().times(1).returning(|_, _| {
            let mut reservation = reservation("1234");
            reservation
                .duts
                .insert("dut".to_owned(), Dut::new(Dims::default()));
            Ok(reservation)
        });
        binding
            .expect_release()
            .times(1)
            .returning(|| Err(anyhow!("release failed")));

        let context = TestContext::new(Box::new(binding));
        let error = context
            .reserve(&testbed(), &ReserveOptions::default())
            .await
            .unwrap_err();

        assert_eq!(error.to_string(), "no name for reserved device: dut");
        assert!(context.reservation().await.is_err_and(|e| e
            .to_string()
            .contains("testbed is not reserved")));
        Ok(())
    }

    #[tokio::test]
    #[should_panic(expected = "no name for reserved port: port1")]
    async fn test_invalid_fetched_reservation_is_not_released() {
        let mut binding = MockBinding::new();
        binding
            .expect_fetch_reservation()
            .returning(|id| {
                let mut dims = Dims::new("router1");
                dims.ports.insert("port1".to_owned(), ResolvedPort::new(""));
                let mut reservation = Reservation::new(id);
                reservation.duts.insert("dut".to_owned(), Dut::new(dims));
                Ok(reservation)
            });
        binding.expect_release().never();

        TestContext::new(Box::new(binding))
            .fetch_reservation(&testbed(), "abcd")
            .await
            .unwrap();
    }

    #[tokio::test]
    #[should_panic(expected = "Releasing reservation 1234 failed")]
    async fn test_release_fails() {
        let mut binding = MockBinding::new();
        binding
            .expect_reserve()
            .returning(|_, _| Ok(reservation("1234")));
        binding
            .expect_release()
            .times(1)
            .returning(|| Err(anyhow!("device busy")));

        let context = TestContext::new(Box::new(binding));
        context
            .reserve(&testbed(), &ReserveOptions::default())
            .await
            .unwrap();
        context.release().await.unwrap();
    }

    #[tokio::test]
    #[should_panic(expected = "router1 unreachable")]
    async fn test_dial_gnmi_uses_reserved_dut() {
        let mut binding = MockBinding::new();
        binding
            .expect_reserve()
            .returning(|_, _| Ok(reservation("1234")));
        binding
            .expect_dial_gnmi()
            .withf(|dut| dut.name() == "router1")
            .times(1)
            .returning(|dut| Err(anyhow!("{} unreachable", dut.name())));

        let context = TestContext::new(Box::new(binding));
        context
            .reserve(&testbed(), &ReserveOptions::default())
            .await
            .unwrap();
        context.dial_gnmi("dut").await.unwrap();
    }

    #[tokio::test]
    #[should_panic(expected = "testbed is not reserved")]
    async fn test_dial_gnmi_without_reservation() {
        let mut binding = MockBinding::new();
        binding.expect_dial_gnmi().never();

        TestContext::new(Box::new(binding))
            .dial_gnmi("dut")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_set_test_metadata() -> Result<()> {
        let mut binding = MockBinding::new();
        binding
            .expect_set_test_metadata()
            .withf(|metadata| metadata.test_name == "TestBgp")
            .times(1)
            .returning(|_| Ok(()));

        TestContext::new(Box::new(binding))
            .set_test_metadata(&TestMetadata {
                test_name: "TestBgp".to_owned(),
                ..TestMetadata::default()
            })
            .await
    }

    #[cfg(feature = "fake")]
    #[tokio::test]
    async fn test_fake_binding() -> Result<()> {
        use crate::binding::FakeBinding;

        let context = TestContext::new(Box::new(FakeBinding::new()));
        let reservation = context
            .reserve(&testbed(), &ReserveOptions::default())
            .await?;
        assert_eq!(reservation.dut("dut")?.dims().port("port1")?.name, "port1");

        let connection = context.dial_gnmi("dut").await?;
        assert!(connection.address().starts_with("127.0.0.1:"));

        context.release().await?;
        Ok(())
    }
}
