use std::collections::{BTreeMap, HashMap};
use std::fs::{read_to_string, write};
use std::path::Path;

use anyhow::{Result, bail};
use serde_derive::{Deserialize, Serialize};
use toml::from_str;

use crate::core::common::{LoggingOptions, ResolverOptions};

#[derive(Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub resolver_options: ResolverOptions,
    pub logging_options: LoggingOptions,
    /// Known servers, name => IP address.
    pub servers: BTreeMap<String, String>,
}

impl Config {
    pub fn load(filename: &str) -> Result<Config> {
        let config = read_to_string(filename)?;
        let config: Config = from_str(&config)?;
        Ok(config)
    }

    pub fn generate(filename: &str, force: bool) -> Result<()> {
        if Path::new(filename).exists() && !force {
            bail!("`{filename}` already exists, use --force to overwrite it")
        }
        let config = Config::default();
        let toml_config = toml::to_string(&config)?;
        write(filename, toml_config)?;
        println!("Configuration file `{filename}` created.");
        Ok(())
    }

    /// Server names keyed by their IP address.
    pub fn servers_ip_to_name(&self) -> HashMap<String, String> {
        self.servers
            .iter()
            .map(|(name, ip)| (ip.to_owned(), name.to_owned()))
            .collect()
    }
}
