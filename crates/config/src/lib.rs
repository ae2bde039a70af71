//! PacketTap Configuration
//!
//! Loads engine settings from `packettap.txt`, a plain `key = value` file.
//! Lines starting with `#` are comments, unknown keys are ignored and a value
//! that does not parse keeps its default.

use packettap_core::{Result, TapError};
use packettap_protocol::ServerVersion;
use packettap_registry::{ResolutionPolicy, ResolverKind};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;

/// Default configuration file name
pub const CONFIG_FILE: &str = "packettap.txt";

/// Engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TapConfig {
    // ========== Class resolution ==========
    /// Resolvers to try, in order (from "resolution_order")
    pub resolution_order: Vec<ResolverKind>,
    /// Validate declared and naming candidates against the expected field
    /// signature (from "require_signature")
    pub require_signature: bool,

    // ========== Listeners ==========
    /// Faults logged per listener before going quiet (from "max_fault_reports")
    pub max_fault_reports: u64,
    /// Collect per-listener timings (from "listener_timings")
    pub listener_timings: bool,

    // ========== Diagnostics ==========
    /// Verbose logging (from "debug")
    pub debug: bool,

    // ========== Host ==========
    /// Oldest server version the engine accepts (from "minimum_version")
    pub minimum_version: ServerVersion,
    /// Sandbox server version (from "server_version")
    pub server_version: ServerVersion,
    /// Sandbox listen address (from "bind_address")
    pub bind_address: SocketAddr,
}

impl Default for TapConfig {
    fn default() -> Self {
        let policy = ResolutionPolicy::default();
        Self {
            resolution_order: policy.order,
            require_signature: policy.require_signature,
            max_fault_reports: 10,
            listener_timings: false,
            debug: false,
            minimum_version: ServerVersion::new(1, 8, 0),
            server_version: ServerVersion::new(1, 20, 4),
            bind_address: SocketAddr::from(([127, 0, 0, 1], 25565)),
        }
    }
}

impl TapConfig {
    /// Load and validate the configuration at `path`
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config = Self::parse(&content);
        config.validate()?;
        Ok(config)
    }

    /// Load `packettap.txt` from the working directory, or the defaults if
    /// there is none
    pub fn load_default() -> Result<Self> {
        if Path::new(CONFIG_FILE).exists() {
            Self::load_from_file(CONFIG_FILE)
        } else {
            tracing::info!("No {} found, using defaults", CONFIG_FILE);
            Ok(Self::default())
        }
    }

    /// Parse file content; never fails, bad values keep their defaults
    pub fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();

            // Skip comments and empty lines
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                config.parse_option(key.trim(), value.trim());
            }
        }

        config
    }

    fn parse_option(&mut self, key: &str, value: &str) {
        match key {
            "resolution_order" => match ResolutionPolicy::parse_order(value) {
                Ok(order) => self.resolution_order = order,
                Err(e) => tracing::warn!("Ignoring resolution_order: {}", e),
            },
            "require_signature" => {
                self.require_signature = parse_or(key, value, self.require_signature);
            }
            "max_fault_reports" => {
                self.max_fault_reports = parse_or(key, value, self.max_fault_reports);
            }
            "listener_timings" => {
                self.listener_timings = parse_or(key, value, self.listener_timings);
            }
            "debug" => {
                self.debug = parse_or(key, value, self.debug);
            }
            "minimum_version" => {
                self.minimum_version = parse_or(key, value, self.minimum_version);
            }
            "server_version" => {
                self.server_version = parse_or(key, value, self.server_version);
            }
            "bind_address" => {
                self.bind_address = parse_or(key, value, self.bind_address);
            }
            _ => {
                tracing::debug!("Unknown config option: {} = {}", key, value);
            }
        }
    }

    /// Check settings that are valid one by one but not together
    pub fn validate(&self) -> Result<()> {
        if self.resolution_order.is_empty() {
            return Err(TapError::Config("resolution_order is empty".to_string()));
        }
        if self.server_version < self.minimum_version {
            return Err(TapError::Config(format!(
                "server_version {} is older than minimum_version {}",
                self.server_version, self.minimum_version
            )));
        }
        if !self.require_signature && !self.resolution_order.contains(&ResolverKind::Signature) {
            tracing::warn!("require_signature is off and the signature resolver is disabled; packet classes are not checked");
        }
        Ok(())
    }

    pub fn resolution_policy(&self) -> ResolutionPolicy {
        ResolutionPolicy {
            order: self.resolution_order.clone(),
            require_signature: self.require_signature,
        }
    }

    /// Default log filter for this configuration
    pub fn log_filter(&self) -> &'static str {
        if self.debug {
            "debug"
        } else {
            "info"
        }
    }

    /// Display configuration summary
    pub fn display(&self) {
        let order: Vec<&str> = self.resolution_order.iter().map(|kind| kind.as_str()).collect();
        tracing::info!("PacketTap configuration:");
        tracing::info!("    Resolution order: {}", order.join(", "));
        tracing::info!("    Require signature: {}", self.require_signature);
        tracing::info!("    Max fault reports: {}", self.max_fault_reports);
        tracing::info!("    Listener timings: {}", self.listener_timings);
        tracing::info!("    Server version: {} (minimum {})", self.server_version, self.minimum_version);
        tracing::info!("    Bind: {}", self.bind_address);
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, value: &str, default: T) -> T {
    match value.parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            tracing::warn!("Invalid value '{}' for {}, keeping the default", value, key);
            default
        }
    }
}
