//! Session-level configuration: robot host, ports, register window, and
//! the timeouts named throughout §4 and §6.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RtdeError};

fn default_rtde_port() -> u16 {
    30004
}

fn default_script_port() -> u16 {
    30002
}

fn default_dashboard_port() -> u16 {
    29999
}

fn default_setup_timeout_ms() -> u64 {
    5_000
}

fn default_command_timeout_ms() -> u64 {
    300_000
}

fn default_path_timeout_ms() -> u64 {
    600_000
}

fn default_poll_interval_ms() -> u64 {
    2
}

/// Constructing this programmatically (`RtdeConfig::new(host)` then
/// builder-style field updates) is the primary path; `from_yaml_file` exists
/// for parity with deployments that keep robot connection settings in a
/// checked-in file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RtdeConfig {
    pub host: String,

    #[serde(default = "default_rtde_port")]
    pub rtde_port: u16,
    #[serde(default = "default_script_port")]
    pub script_port: u16,
    #[serde(default = "default_dashboard_port")]
    pub dashboard_port: u16,

    /// false: base register offset 0. true: base offset 24, to avoid
    /// colliding with another program's command channel.
    #[serde(default)]
    pub use_upper_range_registers: bool,

    #[serde(default = "default_setup_timeout_ms")]
    pub setup_timeout_ms: u64,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    #[serde(default = "default_path_timeout_ms")]
    pub path_timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for RtdeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            rtde_port: default_rtde_port(),
            script_port: default_script_port(),
            dashboard_port: default_dashboard_port(),
            use_upper_range_registers: false,
            setup_timeout_ms: default_setup_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            path_timeout_ms: default_path_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl RtdeConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn register_base(&self) -> u32 {
        if self.use_upper_range_registers {
            24
        } else {
            0
        }
    }

    pub fn setup_timeout(&self) -> Duration {
        Duration::from_millis(self.setup_timeout_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn path_timeout(&self) -> Duration {
        Duration::from_millis(self.path_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|e| RtdeError::transport(format!("failed to read config file: {e}")))?;
        Self::from_yaml_str(&text)
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| RtdeError::validation(format!("invalid RTDE config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_constants() {
        let cfg = RtdeConfig::new("192.168.1.10");
        assert_eq!(cfg.rtde_port, 30004);
        assert_eq!(cfg.script_port, 30002);
        assert_eq!(cfg.dashboard_port, 29999);
        assert_eq!(cfg.register_base(), 0);
        assert_eq!(cfg.command_timeout(), Duration::from_secs(300));
        assert_eq!(cfg.path_timeout(), Duration::from_secs(600));
    }

    #[test]
    fn upper_range_flag_shifts_register_base() {
        let mut cfg = RtdeConfig::new("192.168.1.10");
        cfg.use_upper_range_registers = true;
        assert_eq!(cfg.register_base(), 24);
    }

    #[test]
    fn loads_partial_yaml_with_defaults_filled_in() {
        let cfg = RtdeConfig::from_yaml_str("host: 10.0.0.2\nuse_upper_range_registers: true\n").unwrap();
        assert_eq!(cfg.host, "10.0.0.2");
        assert_eq!(cfg.register_base(), 24);
        assert_eq!(cfg.rtde_port, 30004);
    }

    #[test]
    fn rejects_malformed_yaml() {
        let err = RtdeConfig::from_yaml_str("host: [unterminated").unwrap_err();
        assert!(matches!(err, RtdeError::Validation(_)));
    }
}
