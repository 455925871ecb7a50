//! Host network configuration capability.
//!
//! [`NetworkConfigurator`] is the only way the bootstrap and teardown
//! sequences touch the host. [`SystemConfigurator`] drives the real
//! `ip` and `iptables` binaries.

use std::path::PathBuf;

use async_trait::async_trait;

use vmnet_common::{TapAddress, VmnetConfig, VmnetError, VmnetResult};

use crate::command::ip;
use crate::firewall::{FirewallRule, RuleOp};
use crate::forwarding;
use crate::route::parse_default_route;

/// Mutations and queries of host network state.
#[async_trait]
pub trait NetworkConfigurator: Send + Sync {
    /// Create a tap-mode tun/tap device.
    async fn create_tap(&self, name: &str) -> VmnetResult<()>;

    /// Assign `addr` to interface `name`.
    async fn add_address(&self, name: &str, addr: &TapAddress) -> VmnetResult<()>;

    /// Administratively enable interface `name`.
    async fn set_link_up(&self, name: &str) -> VmnetResult<()>;

    /// Delete interface `name`.
    async fn delete_link(&self, name: &str) -> VmnetResult<()>;

    /// Whether interface `name` exists.
    async fn link_exists(&self, name: &str) -> VmnetResult<bool>;

    /// Whether interface `name` exists and is a tap device.
    async fn is_tap(&self, name: &str) -> VmnetResult<bool>;

    /// Turn on IPv4 forwarding.
    async fn enable_ip_forwarding(&self) -> VmnetResult<()>;

    /// Whether `rule` is present in its chain.
    async fn rule_exists(&self, rule: &FirewallRule) -> VmnetResult<bool>;

    /// Append `rule` to its chain.
    async fn append_rule(&self, rule: &FirewallRule) -> VmnetResult<()>;

    /// Delete the first match of `rule` from its chain.
    async fn delete_rule(&self, rule: &FirewallRule) -> VmnetResult<()>;

    /// Interface carrying the default route.
    async fn default_route_interface(&self) -> VmnetResult<String>;
}

/// Configurator backed by iproute2, iptables and procfs.
#[derive(Debug, Clone)]
pub struct SystemConfigurator {
    ip_bin: PathBuf,
    iptables_bin: PathBuf,
    ip_forward_path: PathBuf,
}

impl SystemConfigurator {
    /// Build from configuration.
    #[must_use]
    pub fn new(config: &VmnetConfig) -> Self {
        Self {
            ip_bin: config.ip_bin.clone(),
            iptables_bin: config.iptables_bin.clone(),
            ip_forward_path: config.ip_forward_path(),
        }
    }
}

impl Default for SystemConfigurator {
    fn default() -> Self {
        Self::new(&VmnetConfig::default())
    }
}

#[async_trait]
impl NetworkConfigurator for SystemConfigurator {
    async fn create_tap(&self, name: &str) -> VmnetResult<()> {
        ip::tuntap_add(&self.ip_bin, name).run().await?;
        Ok(())
    }

    async fn add_address(&self, name: &str, addr: &TapAddress) -> VmnetResult<()> {
        ip::addr_add(&self.ip_bin, &addr.to_string(), name)
            .run()
            .await?;
        Ok(())
    }

    async fn set_link_up(&self, name: &str) -> VmnetResult<()> {
        ip::link_up(&self.ip_bin, name).run().await?;
        Ok(())
    }

    async fn delete_link(&self, name: &str) -> VmnetResult<()> {
        ip::link_delete(&self.ip_bin, name).run().await?;
        Ok(())
    }

    async fn link_exists(&self, name: &str) -> VmnetResult<bool> {
        let output = ip::link_show(&self.ip_bin, name).output().await?;
        Ok(output.success)
    }

    async fn is_tap(&self, name: &str) -> VmnetResult<bool> {
        let output = ip::link_show_details(&self.ip_bin, name).output().await?;
        Ok(output.success && is_tap_details(&output.stdout))
    }

    async fn enable_ip_forwarding(&self) -> VmnetResult<()> {
        forwarding::enable_ip_forwarding(&self.ip_forward_path).await
    }

    async fn rule_exists(&self, rule: &FirewallRule) -> VmnetResult<bool> {
        let cmd = rule.command(&self.iptables_bin, RuleOp::Check);
        let output = cmd.output().await?;
        if output.success {
            return Ok(true);
        }

        // -C exits 1 for "no such rule"; anything else (bad chain, no
        // privileges, missing module) must not be read as "absent".
        if output.stderr.is_empty() || output.stderr.contains("does a matching rule exist") {
            Ok(false)
        } else {
            output.check(&cmd).map(|_| false)
        }
    }

    async fn append_rule(&self, rule: &FirewallRule) -> VmnetResult<()> {
        rule.command(&self.iptables_bin, RuleOp::Append)
            .run()
            .await?;
        Ok(())
    }

    async fn delete_rule(&self, rule: &FirewallRule) -> VmnetResult<()> {
        rule.command(&self.iptables_bin, RuleOp::Delete)
            .run()
            .await?;
        Ok(())
    }

    async fn default_route_interface(&self) -> VmnetResult<String> {
        let output = ip::route_default(&self.ip_bin).run().await?;
        parse_default_route(&output.stdout).ok_or(VmnetError::NoDefaultRoute)
    }
}

/// `ip -details link show` prints `tun type tap ...` for tap devices.
fn is_tap_details(details: &str) -> bool {
    details
        .split_whitespace()
        .collect::<Vec<_>>()
        .windows(3)
        .any(|w| w == ["tun", "type", "tap"])
}
