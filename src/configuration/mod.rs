// SPDX-FileCopyrightText: 2023 Linutronix GmbH
//
// SPDX-License-Identifier: GPL-3.0-or-later
//
//! Provides the requested testbed and the binding configuration
//!
//! ```
//! use testbedctl::configuration::{Configuration, YAMLConfiguration};
//! # #[path = "doctest.rs"]
//! # mod doctest;
//! # let tmpfile = doctest::generate_example_yaml();
//! # let filepath = tmpfile.path();
//! use std::fs::File;
//!
//! let mut yaml_config = YAMLConfiguration::new();
//! yaml_config.read(File::open(filepath)?)?;
//! let testbed = yaml_config.get_testbed()?;
//! assert_eq!(testbed.duts[0].id, "dut");
//! # Ok::<(), anyhow::Error>(())
//! ```
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[cfg(test)]
use mockall::automock;

mod testbed;
pub use testbed::{port_key, Device, Link, Port, PortSpeed, Testbed, Vendor};

mod yaml;
pub use yaml::YAMLConfiguration;

/// Configuration of the KNE binding
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KneConfig {
    /// Path to the KNE command line tool
    #[serde(default = "default_cli_path")]
    pub cli_path: PathBuf,

    /// Topology file the cluster was created from
    pub topology: PathBuf,

    /// Kubeconfig to use instead of the default one
    #[serde(default)]
    pub kubecfg: Option<PathBuf>,

    /// Username for device credentials
    #[serde(default)]
    pub username: Option<String>,

    /// Password for device credentials
    #[serde(default)]
    pub password: Option<String>,
}

fn default_cli_path() -> PathBuf {
    PathBuf::from("kne")
}

impl KneConfig {
    /// Construct a configuration for the given topology with defaults otherwise
    #[must_use]
    pub fn new(topology: PathBuf) -> Self {
        Self {
            cli_path: default_cli_path(),
            topology,
            kubecfg: None,
            username: None,
            password: None,
        }
    }
}

/// Defines how to request the configuration
#[cfg_attr(test, automock)]
pub trait Configuration {
    /// Get the requested testbed
    ///
    /// # Errors
    ///
    /// Will return `Err` if no testbed is configured
    /// or there is general problem reading the configuration.
    fn get_testbed(&mut self) -> Result<Testbed>;

    /// Get the configuration of the KNE binding
    ///
    /// # Errors
    ///
    /// Will return `Err` if no KNE binding is configured.
    fn get_kne_config(&mut self) -> Result<KneConfig>;
}
