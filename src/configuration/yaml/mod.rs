// SPDX-FileCopyrightText: 2023 Linutronix GmbH
//
// SPDX-License-Identifier: GPL-3.0-or-later
//
//! Provides YAML-based testbed configuration

use crate::configuration::{self, KneConfig, Testbed};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Read;

/// Reads configuration from YAML file
#[derive(Default, Debug)]
pub struct YAMLConfiguration {
    config: Config,
}

#[derive(Default, Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct Config {
    testbed: Option<Testbed>,
    kne: Option<KneConfig>,
}

impl configuration::Configuration for YAMLConfiguration {
    fn get_testbed(&mut self) -> Result<Testbed> {
        self.config
            .testbed
            .clone()
            .ok_or_else(|| anyhow!("No testbed section found in configuration!"))
    }

    fn get_kne_config(&mut self) -> Result<KneConfig> {
        self.config
            .kne
            .clone()
            .ok_or_else(|| anyhow!("No kne section found in configuration!"))
    }
}

impl YAMLConfiguration {
    /// Construct a new `YAMLConfiguration`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read YAML from a reader
    ///
    /// ```
    /// # use testbedctl::configuration::{Configuration, YAMLConfiguration};
    /// # #[path = "../doctest.rs"]
    /// # mod doctest;
    /// # let tmpfile = doctest::generate_example_yaml();
    /// # let filepath = tmpfile.path();
    /// # use std::fs::File;
    /// # let mut yaml_config = YAMLConfiguration::new();
    /// yaml_config.read(File::open(filepath)?)?;
    /// # Ok::<(), anyhow::Error>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Will return `Err` if the configuration could not be parsed.
    pub fn read<R: Read>(&mut self, reader: R) -> Result<()> {
        self.config = serde_yaml::from_reader(reader).context("Reading YAML file")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::{Configuration, Device, Link, PortSpeed, Vendor};
    use std::path::PathBuf;

    #[test]
    fn test_get_testbed_happy() -> Result<()> {
        let yaml = concat!(
            "testbed:\n",
            "  duts:\n",
            "    - id: dut1\n",
            "      vendor: ARISTA\n",
            "      ports:\n",
            "        - id: port1\n",
            "          speed: S_10GB\n",
            "        - id: port2\n",
            "    - id: dut2\n",
            "      ports:\n",
            "        - id: port1\n",
            "  ates:\n",
            "    - id: ate\n",
            "      ports:\n",
            "        - id: port1\n",
            "  links:\n",
            "    - a: dut1:port1\n",
            "      b: dut2:port1\n",
            "    - a: dut1:port2\n",
            "      b: ate:port1\n",
        );

        let mut config = YAMLConfiguration::default();
        config.read(yaml.as_bytes())?;

        let testbed = config.get_testbed()?;
        assert_eq!(testbed.duts.len(), 2);
        assert_eq!(testbed.duts[0].vendor, Vendor::Arista);
        assert_eq!(testbed.duts[0].ports[0].speed, Some(PortSpeed::S10Gb));
        assert_eq!(testbed.duts[1], Device::new("dut2", &["port1"]));
        assert_eq!(testbed.ates[0], Device::new("ate", &["port1"]));
        assert_eq!(
            testbed.links,
            vec![
                Link::new("dut1:port1", "dut2:port1"),
                Link::new("dut1:port2", "ate:port1")
            ]
        );

        Ok(())
    }

    #[test]
    fn test_get_kne_config_defaults() -> Result<()> {
        let yaml = concat!("kne:\n", "  topology: /tmp/topo.yaml\n");

        let mut config = YAMLConfiguration::default();
        config.read(yaml.as_bytes())?;

        assert_eq!(
            config.get_kne_config()?,
            KneConfig::new(PathBuf::from("/tmp/topo.yaml"))
        );

        Ok(())
    }

    #[test]
    fn test_get_kne_config_happy_with_serialization() -> Result<()> {
        let kne = KneConfig {
            cli_path: PathBuf::from("/usr/local/bin/kne"),
            topology: PathBuf::from("/tmp/topo.yaml"),
            kubecfg: Some(PathBuf::from("/root/.kube/config")),
            username: Some("admin".to_owned()),
            password: Some("admin".to_owned()),
        };

        let config = Config {
            testbed: None,
            kne: Some(kne.clone()),
        };

        let yaml = serde_yaml::to_string(&config)?;

        let mut read_config = YAMLConfiguration::default();
        read_config.read(yaml.as_bytes())?;

        assert_eq!(read_config.get_kne_config()?, kne);

        Ok(())
    }

    #[test]
    #[should_panic(expected = "No testbed section found in configuration!")]
    fn test_get_testbed_not_found() {
        let mut config = YAMLConfiguration::default();
        config.get_testbed().unwrap();
    }

    #[test]
    #[should_panic(expected = "No kne section found in configuration!")]
    fn test_get_kne_config_not_found() {
        let mut config = YAMLConfiguration::default();
        config.get_kne_config().unwrap();
    }

    #[test]
    #[should_panic(expected = "Reading YAML file")]
    fn test_read_fails() {
        let yaml = concat!(
            "testbed:\n",
            "  duts:\n",
            "    - idd: dut1\n",
            "      ports:\n",
            "        - id: port1\n",
        );

        let mut config = YAMLConfiguration::default();
        config.read(yaml.as_bytes()).unwrap();
    }
}
