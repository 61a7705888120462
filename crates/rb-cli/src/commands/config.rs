//! Config command implementations

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::output::{print_error, print_info, print_success, print_warning};
use rb_core::config::{self, EndpointConfig};

/// Config file to use: the one given on the command line, or the default
pub fn resolve_config_path(config_path: Option<&PathBuf>) -> PathBuf {
    config_path
        .cloned()
        .unwrap_or_else(config::default_config_path)
}

/// Load the endpoint configuration, falling back to defaults
pub fn load_endpoint_config(config_path: Option<&PathBuf>) -> Result<EndpointConfig> {
    let path = resolve_config_path(config_path);
    config::load_or_default(&path)
        .with_context(|| format!("Failed to load config from {:?}", path))
}

/// Show the effective configuration
pub fn config_show(config_path: Option<&PathBuf>) -> Result<()> {
    let path = resolve_config_path(config_path);

    if path.exists() {
        print_info(&format!("Configuration file: {:?}", path));
    } else {
        print_warning(&format!("No configuration file found at {:?}", path));
        print_info("Showing defaults; run 'relaybus config init' to create one");
    }
    println!();

    let effective = load_endpoint_config(Some(&path))?;
    println!("{}", toml::to_string_pretty(&effective)?);
    Ok(())
}

/// Write the default configuration
pub fn config_init(config_path: Option<&PathBuf>, force: bool) -> Result<()> {
    let path = resolve_config_path(config_path);

    if path.exists() && !force {
        print_error(&format!("Config file already exists: {:?}", path));
        print_info("Use --force to overwrite");
        return Ok(());
    }

    write_default(&path)?;
    print_success(&format!("Created configuration file: {:?}", path));
    Ok(())
}

fn write_default(path: &Path) -> Result<()> {
    config::save_config(path, &EndpointConfig::default())
        .with_context(|| format!("Failed to write config file: {:?}", path))
}
