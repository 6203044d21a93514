// SPDX-FileCopyrightText: 2023 Linutronix GmbH
// SPDX-License-Identifier: GPL-3.0-or-later

//! Main executable of testbedctl
// we do not want to panic or exit, see explanation in main()
#![cfg_attr(
    not(test),
    deny(
        clippy::panic,
        clippy::panic_in_result_fn,
        clippy::expect_used,
        clippy::exit,
        clippy::unwrap_used,
        clippy::indexing_slicing,
        clippy::modulo_arithmetic, // % 0 panics - use checked_rem
        clippy::integer_division,  // / 0 panics - use checked_div
        clippy::unreachable,
        clippy::unwrap_in_result,
    )
)]
#![allow(clippy::unnecessary_wraps)] // wraps are necessary for certain combinations of feature flags

use anyhow::{anyhow, Context, Error, Result};
use clap::{Parser, ValueEnum};
use env_logger::Env;
use futures::future::try_join_all;
use log::info;
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tokio::signal;

use testbedctl::binding::{Binding, ReserveOptions};
use testbedctl::configuration::{Configuration, Testbed, YAMLConfiguration};
use testbedctl::context::TestContext;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum BindingKind {
    /// In-process simulated devices
    Fake,
    /// Devices of a running KNE topology
    Kne,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Binding used to resolve the testbed
    #[arg(short, long, value_enum, default_value_t = BindingKind::Fake)]
    binding: BindingKind,

    /// Fetch the existing reservation with this ID instead of creating a new one
    #[arg(long, value_name = "ID")]
    reservation_id: Option<String>,

    /// How long the reservation is needed in seconds, 0 for the binding default
    #[arg(long, value_name = "SECONDS", default_value_t = 0)]
    run_time: u64,

    /// How long to wait for the testbed to become available in seconds, 0 for the binding default
    #[arg(long, value_name = "SECONDS", default_value_t = 0)]
    wait_time: u64,

    /// Dial gNMI on every reserved DUT
    #[arg(long)]
    dial: bool,

    /// Keep the reservation until Ctrl-C is pressed
    #[arg(long)]
    hold: bool,

    /// YAML configuration file with the testbed and the binding configuration
    #[arg(value_name = "FILE")]
    config: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
/// Main function of `testbedctl`
///
/// Reserves the configured testbed, prints the reservation and releases it again.
///
/// # Errors
/// Will return `Err` if the testbed can not be reserved or used.
/// If both using and releasing the testbed fail, the first error is returned
/// and the release error is printed.
///
/// # Panics
/// The only known case is when the tokio runtime can not even be started
/// before calling the actual main function.
pub async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let mut configuration = YAMLConfiguration::new();
    configuration.read(
        File::open(&cli.config)
            .with_context(|| format!("Opening {} failed", cli.config.display()))?,
    )?;
    let testbed = configuration.get_testbed()?;

    let binding = match cli.binding {
        BindingKind::Fake => new_fake_binding()?,
        BindingKind::Kne => new_kne_binding(&mut configuration)?,
    };

    let context = TestContext::new(binding);
    run(&context, &testbed, &cli, &mut io::stdout()).await
}

/// Reserve the testbed, use it as requested on the command line and release it again
async fn run<W: Write>(
    context: &TestContext,
    testbed: &Testbed,
    cli: &Cli,
    out: &mut W,
) -> Result<()> {
    let options = ReserveOptions {
        run_time: Duration::from_secs(cli.run_time),
        wait_time: Duration::from_secs(cli.wait_time),
        reservation_id: cli.reservation_id.clone(),
    };
    context.reserve(testbed, &options).await?;

    let used = use_reservation(context, cli, out).await;
    let released = context.release().await;

    match (used, released) {
        (Err(e), Err(release_error)) => {
            eprintln!("Releasing the testbed failed: {release_error:#}");
            Err(e)
        }
        (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
        (Ok(()), Ok(())) => Ok(()),
    }
}

async fn use_reservation<W: Write>(context: &TestContext, cli: &Cli, out: &mut W) -> Result<()> {
    let reservation = context.reservation().await?;
    write!(out, "{}", serde_yaml::to_string(reservation.as_ref())?)
        .context("Printing the reservation failed")?;

    if cli.dial {
        let connections =
            try_join_all(reservation.duts.keys().map(|id| context.dial_gnmi(id))).await?;
        for connection in &connections {
            info!("Connected to gNMI at {}", connection.address());
        }
    }

    if cli.hold {
        println!(
            "Holding reservation {}, press Ctrl-C to release",
            context.reservation_id().await?
        );
        signal::ctrl_c()
            .await
            .context("Listening to shutdown signal failed")?;
    }

    Ok(())
}

#[allow(dead_code)] // will not be used if ALL features are enabled
fn feature_missing_error(feature: &str, alternative: &str) -> Error {
    anyhow!("{} feature is not built in!\nYou can still use {} if appropriate for your use case or rebuild with the feature enabled!", feature, alternative)
}

#[cfg(feature = "fake")]
use testbedctl::binding::FakeBinding;
#[cfg(feature = "fake")]
fn new_fake_binding() -> Result<Box<dyn Binding + Send + Sync>> {
    Ok(Box::new(FakeBinding::new()))
}

#[cfg(not(feature = "fake"))]
fn new_fake_binding() -> Result<Box<dyn Binding + Send + Sync>> {
    Err(feature_missing_error("fake", "--binding kne"))
}

#[cfg(feature = "kne")]
use testbedctl::binding::KneBinding;
#[cfg(feature = "kne")]
fn new_kne_binding(
    configuration: &mut dyn Configuration,
) -> Result<Box<dyn Binding + Send + Sync>> {
    Ok(Box::new(KneBinding::new(configuration.get_kne_config()?)))
}

#[cfg(not(feature = "kne"))]
fn new_kne_binding(
    _configuration: &mut dyn Configuration,
) -> Result<Box<dyn Binding + Send + Sync>> {
    Err(feature_missing_error("kne", "--binding fake"))
}
