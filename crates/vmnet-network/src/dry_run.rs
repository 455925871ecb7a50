//! Configurator that records actions instead of performing them.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;

use vmnet_common::{TapAddress, VmnetConfig, VmnetError, VmnetResult};

use crate::command::{HostAction, ip};
use crate::configurator::NetworkConfigurator;
use crate::firewall::{FirewallRule, RuleOp};

/// Records the [`HostAction`]s a run would perform.
///
/// Links and rules the run has not touched yet are assumed absent (or
/// present, see [`DryRunConfigurator::assuming_present`]). A link assumed
/// present is assumed to be a tap. Once the run
/// creates or deletes one, later queries see that. The default route
/// cannot be guessed and is reported as missing.
#[derive(Debug)]
pub struct DryRunConfigurator {
    ip_bin: PathBuf,
    iptables_bin: PathBuf,
    ip_forward_path: PathBuf,
    assume_present: bool,
    state: Mutex<DryRunState>,
}

#[derive(Debug, Default)]
struct DryRunState {
    actions: Vec<HostAction>,
    present: HashMap<String, bool>,
}

impl DryRunConfigurator {
    /// Build from configuration, rendering the same argv the system
    /// configurator would run.
    #[must_use]
    pub fn new(config: &VmnetConfig) -> Self {
        Self {
            ip_bin: config.ip_bin.clone(),
            iptables_bin: config.iptables_bin.clone(),
            ip_forward_path: config.ip_forward_path(),
            assume_present: false,
            state: Mutex::new(DryRunState::default()),
        }
    }

    /// Treat untouched links and rules as present, to preview a teardown.
    #[must_use]
    pub fn assuming_present(mut self, present: bool) -> Self {
        self.assume_present = present;
        self
    }

    /// Actions recorded so far, in order.
    #[must_use]
    pub fn actions(&self) -> Vec<HostAction> {
        self.state.lock().actions.clone()
    }

    fn record(&self, action: HostAction) {
        tracing::debug!(action = %action, "Dry run");
        self.state.lock().actions.push(action);
    }

    fn mark(&self, key: String, present: bool) {
        self.state.lock().present.insert(key, present);
    }

    fn is_present(&self, key: &str) -> bool {
        self.state
            .lock()
            .present
            .get(key)
            .copied()
            .unwrap_or(self.assume_present)
    }
}

fn link_key(name: &str) -> String {
    format!("link:{name}")
}

fn rule_key(rule: &FirewallRule) -> String {
    format!("rule:{rule}")
}

#[async_trait]
impl NetworkConfigurator for DryRunConfigurator {
    async fn create_tap(&self, name: &str) -> VmnetResult<()> {
        self.record(HostAction::Run(ip::tuntap_add(&self.ip_bin, name)));
        self.mark(link_key(name), true);
        Ok(())
    }

    async fn add_address(&self, name: &str, addr: &TapAddress) -> VmnetResult<()> {
        self.record(HostAction::Run(ip::addr_add(
            &self.ip_bin,
            &addr.to_string(),
            name,
        )));
        Ok(())
    }

    async fn set_link_up(&self, name: &str) -> VmnetResult<()> {
        self.record(HostAction::Run(ip::link_up(&self.ip_bin, name)));
        Ok(())
    }

    async fn delete_link(&self, name: &str) -> VmnetResult<()> {
        self.record(HostAction::Run(ip::link_delete(&self.ip_bin, name)));
        self.mark(link_key(name), false);
        Ok(())
    }

    async fn link_exists(&self, name: &str) -> VmnetResult<bool> {
        Ok(self.is_present(&link_key(name)))
    }

    async fn is_tap(&self, name: &str) -> VmnetResult<bool> {
        self.link_exists(name).await
    }

    async fn enable_ip_forwarding(&self) -> VmnetResult<()> {
        self.record(HostAction::WriteFile {
            path: self.ip_forward_path.clone(),
            contents: "1".to_string(),
        });
        Ok(())
    }

    async fn rule_exists(&self, rule: &FirewallRule) -> VmnetResult<bool> {
        Ok(self.is_present(&rule_key(rule)))
    }

    async fn append_rule(&self, rule: &FirewallRule) -> VmnetResult<()> {
        self.record(HostAction::Run(
            rule.command(&self.iptables_bin, RuleOp::Append),
        ));
        self.mark(rule_key(rule), true);
        Ok(())
    }

    async fn delete_rule(&self, rule: &FirewallRule) -> VmnetResult<()> {
        self.record(HostAction::Run(
            rule.command(&self.iptables_bin, RuleOp::Delete),
        ));
        self.mark(rule_key(rule), false);
        Ok(())
    }

    async fn default_route_interface(&self) -> VmnetResult<String> {
        Err(VmnetError::NoDefaultRoute)
    }
}
