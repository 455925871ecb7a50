//! Tool configuration.
//!
//! Values come from built-in defaults, optionally overridden by a TOML
//! file. Command-line flags and environment variables are applied on top
//! by the binary.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::{VmnetError, VmnetResult};

/// Default `ip` binary.
pub const DEFAULT_IP_BIN: &str = "ip";

/// Default `iptables` binary.
pub const DEFAULT_IPTABLES_BIN: &str = "iptables";

/// Default procfs mount point.
pub const DEFAULT_PROC_ROOT: &str = "/proc";

/// Default prefix for allocated tap devices.
pub const DEFAULT_TAP_PREFIX: &str = "tap";

/// Default `/16` that allocated taps carve their `/24` from.
pub const DEFAULT_SUBNET_BASE: Ipv4Net = Ipv4Net::new_assert(Ipv4Addr::new(172, 20, 0, 0), 16);

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VmnetConfig {
    /// Path or name of the iproute2 `ip` binary.
    pub ip_bin: PathBuf,
    /// Path or name of the `iptables` binary.
    pub iptables_bin: PathBuf,
    /// Where procfs is mounted.
    pub proc_root: PathBuf,
    /// Keep running after a failed step.
    pub keep_going: bool,
    /// Prefix used when allocating tap names.
    pub tap_prefix: String,
    /// Base network for derived tap subnets.
    pub subnet_base: Ipv4Net,
}

impl Default for VmnetConfig {
    fn default() -> Self {
        Self {
            ip_bin: PathBuf::from(DEFAULT_IP_BIN),
            iptables_bin: PathBuf::from(DEFAULT_IPTABLES_BIN),
            proc_root: PathBuf::from(DEFAULT_PROC_ROOT),
            keep_going: false,
            tap_prefix: DEFAULT_TAP_PREFIX.to_string(),
            subnet_base: DEFAULT_SUBNET_BASE,
        }
    }
}

impl VmnetConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, does not parse, or
    /// fails validation.
    pub fn load(path: &Path) -> VmnetResult<Self> {
        tracing::debug!(path = %path.display(), "Loading configuration");

        let text = std::fs::read_to_string(path).map_err(|e| VmnetError::Config {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        Self::from_toml(&text)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error on unknown keys, bad values, or failed validation.
    pub fn from_toml(text: &str) -> VmnetResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns [`VmnetError::Config`] describing the first bad value.
    pub fn validate(&self) -> VmnetResult<()> {
        if self.subnet_base.prefix_len() != 16 {
            return Err(VmnetError::Config {
                message: format!("subnet_base must be a /16, got {}", self.subnet_base),
            });
        }
        if self.tap_prefix.is_empty() || self.tap_prefix.ends_with(|c: char| c.is_ascii_digit()) {
            return Err(VmnetError::Config {
                message: format!(
                    "tap_prefix must be non-empty and not end in a digit, got {:?}",
                    self.tap_prefix
                ),
            });
        }
        if self.ip_bin.as_os_str().is_empty() || self.iptables_bin.as_os_str().is_empty() {
            return Err(VmnetError::Config {
                message: "binary paths must not be empty".to_string(),
            });
        }
        Ok(())
    }

    /// Path of the IPv4 forwarding sysctl.
    #[must_use]
    pub fn ip_forward_path(&self) -> PathBuf {
        self.proc_root.join("sys/net/ipv4/ip_forward")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = VmnetConfig::default();
        assert_eq!(config.ip_bin, PathBuf::from("ip"));
        assert_eq!(config.iptables_bin, PathBuf::from("iptables"));
        assert_eq!(config.subnet_base.to_string(), "172.20.0.0/16");
        assert_eq!(
            config.ip_forward_path(),
            PathBuf::from("/proc/sys/net/ipv4/ip_forward")
        );
        assert!(!config.keep_going);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = VmnetConfig::from_toml(
            r#"
            iptables_bin = "/usr/sbin/iptables-legacy"
            keep_going = true
            "#,
        )
        .unwrap();
        assert_eq!(config.iptables_bin, PathBuf::from("/usr/sbin/iptables-legacy"));
        assert!(config.keep_going);
        assert_eq!(config.ip_bin, PathBuf::from("ip"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = VmnetConfig::from_toml("ip_binary = \"ip\"").unwrap_err();
        assert!(matches!(err, VmnetError::Config { .. }));
    }

    #[test]
    fn subnet_base_must_be_slash_16() {
        let err = VmnetConfig::from_toml("subnet_base = \"10.0.0.0/8\"").unwrap_err();
        assert!(err.to_string().contains("/16"));
    }

    #[test]
    fn tap_prefix_must_not_end_in_digit() {
        assert!(VmnetConfig::from_toml("tap_prefix = \"vm1\"").is_err());
        assert!(VmnetConfig::from_toml("tap_prefix = \"\"").is_err());
        assert!(VmnetConfig::from_toml("tap_prefix = \"fc-tap\"").is_ok());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vmnet.toml");
        std::fs::write(&path, "proc_root = \"/tmp/fakeproc\"\n").unwrap();

        let config = VmnetConfig::load(&path).unwrap();
        assert_eq!(
            config.ip_forward_path(),
            PathBuf::from("/tmp/fakeproc/sys/net/ipv4/ip_forward")
        );
    }

    #[test]
    fn load_missing_file() {
        let err = VmnetConfig::load(Path::new("/nonexistent/vmnet.toml")).unwrap_err();
        assert!(matches!(err, VmnetError::Config { .. }));
    }
}
