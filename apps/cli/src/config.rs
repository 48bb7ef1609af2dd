//! Layered configuration: defaults, then the TOML file, then `AECFLOW_*`.

use std::path::Path;

use aecflow_coordinator::CoordinatorConfig;
use anyhow::{Context, Result, bail};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};

/// Build the figment without extracting it.
fn figment(file: Option<&Path>) -> Result<Figment> {
    let mut figment = Figment::from(Serialized::defaults(CoordinatorConfig::default()));
    if let Some(path) = file {
        if !path.is_file() {
            bail!("config file {} does not exist", path.display());
        }
        figment = figment.merge(Toml::file(path));
    }
    Ok(figment.merge(Env::prefixed("AECFLOW_").split("__")))
}

/// Load and validate the coordinator config.
pub fn load(file: Option<&Path>) -> Result<CoordinatorConfig> {
    let config: CoordinatorConfig = figment(file)?
        .extract()
        .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}
