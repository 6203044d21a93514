// SPDX-FileCopyrightText: 2023 Linutronix GmbH
//
// SPDX-License-Identifier: GPL-3.0-or-later
//
//! Binding for simulated in-process devices

use crate::binding::{Binding, GrpcConnection, ReserveOptions};
use crate::configuration::Testbed;
use crate::reservation::{Dims, Dut, Reservation, ResolvedPort};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use log::info;
use std::collections::HashMap;
use uuid::Uuid;

mod target;
pub use target::{Collector, FakeTarget, LogMessage};

/// Reserves a fake target per requested DUT
///
/// Only a single DUT and no ATEs are supported.
#[derive(Default)]
pub struct FakeBinding {
    targets: HashMap<String, FakeTarget>,
}

impl FakeBinding {
    /// Create a new fake binding
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Telemetry collector of the target simulating the DUT with the given name
    ///
    /// This is the only way to read the simulated values, the targets do not serve them via gNMI.
    #[must_use]
    pub fn collector(&self, dut_name: &str) -> Option<&Collector> {
        self.targets.get(dut_name).map(FakeTarget::collector)
    }
}

#[async_trait]
impl Binding for FakeBinding {
    async fn reserve(
        &mut self,
        testbed: &Testbed,
        _options: &ReserveOptions,
    ) -> Result<Reservation> {
        if testbed.duts.len() > 1 {
            // TODO support multiple fake devices by starting a target per DUT
            return Err(anyhow!("can only support a single dut for now"));
        }
        if !testbed.ates.is_empty() {
            return Err(anyhow!("ATEs currently not supported by fakebind"));
        }

        let mut reservation = Reservation::new(&Uuid::new_v4().to_string());
        for dut in &testbed.duts {
            // Ports are not backed by anything, their ID serves as name
            let ports = dut
                .ports
                .iter()
                .map(|port| {
                    (
                        port.id.clone(),
                        ResolvedPort {
                            name: port.id.clone(),
                            speed: port.speed,
                        },
                    )
                })
                .collect();

            let target = FakeTarget::start(&dut.id).await?;
            self.targets.insert(dut.id.clone(), target);

            reservation.duts.insert(
                dut.id.clone(),
                Dut::new(Dims {
                    name: dut.id.clone(),
                    ports,
                    ..Dims::default()
                }),
            );
        }

        info!("Reserved fake testbed {}", reservation.id);
        Ok(reservation)
    }

    async fn release(&mut self) -> Result<()> {
        for (name, target) in self.targets.drain() {
            target.stop();
            info!("Stopped fake target {name}");
        }
        Ok(())
    }

    async fn dial_gnmi(&self, dut: &Dut) -> Result<GrpcConnection> {
        let target = self
            .targets
            .get(dut.name())
            .ok_or_else(|| anyhow!("No fake target running for DUT {}", dut.name()))?;
        GrpcConnection::dial(&target.address().to_string()).await
    }
}
