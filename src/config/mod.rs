// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-incubator project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the incubation analyzer
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings. The configuration is backed by a YAML file and
//! validated against an embedded JSON schema before deserialization.
//!
//! ## Configuration Structure
//!
//! - `serial`: Modbus-RTU link (device, line settings, slave address, timeouts)
//! - `engine`: poll interval, incubation duration and bus driver
//!
//! ## Usage
//!
//! ```no_run
//! use rust_incubator::config::Config;
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(
//!     Some("/dev/ttyUSB0".to_string()), // Serial device
//!     Some(3),                          // Slave id
//!     Some(250),                        // Poll interval
//!     false,                            // Simulated driver
//! );
//!
//! println!("Polling {} every {} ms", config.serial.device, config.engine.poll_interval_ms);
//! ```

pub mod engine;
pub mod serial;

pub use engine::{DriverKind, EngineConfig};
pub use serial::{Parity, SerialConfig};

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

const CONFIG_SCHEMA: &str = include_str!("../../resources/config.schema.json");

/// Root configuration document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub serial: SerialConfig,
    pub engine: EngineConfig,
}

impl Config {
    /// Write `<file>.sample.yaml` with default values next to a rejected file
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Validate a raw JSON document against the embedded schema
    pub fn validate_json(json_value: &serde_json::Value) -> Result<()> {
        let schema: serde_json::Value =
            serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        if let Err(error) = validator.validate(json_value) {
            anyhow::bail!("Configuration validation failed: {}", error);
        }
        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// A missing file is created with default values. A file that fails schema
    /// or rule validation is rejected and a sample file is written next to it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        // YAML to a generic value, then JSON for schema validation
        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;
        let json_value = serde_json::to_value(&yaml_value)
            .context("Failed to convert YAML to JSON for validation")?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(err) = Self::validate_json(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            return Err(err);
        }

        let config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = Self::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Apply command line overrides.
    ///
    /// # Parameters
    ///
    /// * `device` - Serial device path
    /// * `slave_id` - Modbus slave address
    /// * `poll_interval_ms` - Status poll period
    /// * `simulated` - If true, switch to the in-memory instrument
    pub fn apply_args(
        &mut self,
        device: Option<String>,
        slave_id: Option<u8>,
        poll_interval_ms: Option<u64>,
        simulated: bool,
    ) {
        if let Some(device) = device {
            self.serial.device = device;
        }
        if let Some(slave_id) = slave_id {
            self.serial.slave_id = slave_id;
        }
        if let Some(interval) = poll_interval_ms {
            self.engine.poll_interval_ms = interval;
        }
        if simulated {
            self.engine.driver = DriverKind::Simulated;
        }
    }

    /// Re-check the rules after overrides were applied
    pub fn validate(&self) -> Result<()> {
        Self::validate_specific_rules(self)
    }

    /// Rules the schema alone does not express, plus the ones command line
    /// overrides can break
    fn validate_specific_rules(config: &Config) -> Result<()> {
        debug!("Performing additional validation checks");

        if config.engine.poll_interval_ms == 0 {
            anyhow::bail!("engine.poll_interval_ms must be greater than zero");
        }
        if config.engine.incubation_seconds == 0 {
            anyhow::bail!("engine.incubation_seconds must be greater than zero");
        }
        if !(1..=247).contains(&config.serial.slave_id) {
            anyhow::bail!("Invalid Modbus slave id: {}", config.serial.slave_id);
        }
        if !(5..=8).contains(&config.serial.data_bits) {
            anyhow::bail!("Invalid data bits: {}", config.serial.data_bits);
        }
        if !(1..=2).contains(&config.serial.stop_bits) {
            anyhow::bail!("Invalid stop bits: {}", config.serial.stop_bits);
        }
        if config.engine.driver == DriverKind::Rtu && config.serial.device.trim().is_empty() {
            anyhow::bail!("serial.device is required with the rtu driver");
        }
        Ok(())
    }
}

/// Print the embedded JSON schema to stdout
pub fn output_config_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;

    println!("{}", formatted_schema);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_schema() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert!(Config::validate_json(&json).is_ok());
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_schema_rejects_bad_values() {
        let mut json = serde_json::to_value(Config::default()).unwrap();
        json["serial"]["parity"] = "mark".into();
        assert!(Config::validate_json(&json).is_err());

        let mut json = serde_json::to_value(Config::default()).unwrap();
        json["serial"]["slave_id"] = 0.into();
        assert!(Config::validate_json(&json).is_err());

        let mut json = serde_json::to_value(Config::default()).unwrap();
        json["engine"]["poll_interval_ms"] = 0.into();
        assert!(Config::validate_json(&json).is_err());
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        config.apply_args(Some("/dev/ttyUSB1".into()), Some(9), None, true);
        assert_eq!(config.serial.device, "/dev/ttyUSB1");
        assert_eq!(config.serial.slave_id, 9);
        assert_eq!(config.engine.poll_interval_ms, 500);
        assert_eq!(config.engine.driver, DriverKind::Simulated);

        config.apply_args(None, Some(0), None, false);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_yaml_uses_lowercase_enums() {
        let yaml = serde_yml::to_string(&Config::default()).unwrap();
        assert!(yaml.contains("parity: none"));
        assert!(yaml.contains("driver: rtu"));
    }
}
