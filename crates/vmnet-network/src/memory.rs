//! In-memory host model for tests.
//!
//! Behaves like a Linux host as far as vmnet can observe: creating an
//! existing tap fails, assigning an address twice fails with "File
//! exists", and appending a rule twice yields two rules.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use parking_lot::Mutex;

use vmnet_common::{TapAddress, VmnetError, VmnetResult};

use crate::configurator::NetworkConfigurator;
use crate::firewall::FirewallRule;

/// Observable state of one interface.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkState {
    /// Created as a tap device.
    pub tap: bool,
    /// Administratively up.
    pub up: bool,
    /// Assigned addresses in assignment order.
    pub addresses: Vec<TapAddress>,
}

#[derive(Debug, Default)]
struct Host {
    links: BTreeMap<String, LinkState>,
    forwarding: bool,
    rules: Vec<FirewallRule>,
    default_route: Option<String>,
    calls: Vec<String>,
    failing: HashSet<&'static str>,
}

/// [`NetworkConfigurator`] over an in-memory host.
#[derive(Debug, Default)]
pub struct MemoryConfigurator {
    host: Mutex<Host>,
}

impl MemoryConfigurator {
    /// Empty host: no links, no rules, forwarding off.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pre-existing, up, non-tap interface.
    #[must_use]
    pub fn with_link(self, name: &str) -> Self {
        self.host.lock().links.insert(
            name.to_string(),
            LinkState {
                tap: false,
                up: true,
                addresses: Vec::new(),
            },
        );
        self
    }

    /// Route the default gateway through `name`.
    #[must_use]
    pub fn with_default_route(self, name: &str) -> Self {
        self.host.lock().default_route = Some(name.to_string());
        self
    }

    /// Make every call of operation `op` fail, e.g. `"set_link_up"`.
    pub fn fail_on(&self, op: &'static str) {
        self.host.lock().failing.insert(op);
    }

    /// State of interface `name`.
    #[must_use]
    pub fn link(&self, name: &str) -> Option<LinkState> {
        self.host.lock().links.get(name).cloned()
    }

    /// Names of all interfaces.
    #[must_use]
    pub fn link_names(&self) -> Vec<String> {
        self.host.lock().links.keys().cloned().collect()
    }

    /// Whether forwarding has been enabled.
    #[must_use]
    pub fn forwarding_enabled(&self) -> bool {
        self.host.lock().forwarding
    }

    /// All rules in insertion order.
    #[must_use]
    pub fn rules(&self) -> Vec<FirewallRule> {
        self.host.lock().rules.clone()
    }

    /// How many copies of `rule` are installed.
    #[must_use]
    pub fn rule_count(&self, rule: &FirewallRule) -> usize {
        self.host.lock().rules.iter().filter(|r| *r == rule).count()
    }

    /// Mutating operations performed, as `op(args)` strings.
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.host.lock().calls.clone()
    }

    fn enter(&self, op: &'static str, detail: &str) -> VmnetResult<parking_lot::MutexGuard<'_, Host>> {
        let mut host = self.host.lock();
        host.calls.push(format!("{op}({detail})"));
        if host.failing.contains(op) {
            return Err(failed(op, detail, "injected failure"));
        }
        Ok(host)
    }
}

fn failed(op: &str, detail: &str, stderr: &str) -> VmnetError {
    VmnetError::CommandFailed {
        command: format!("{op} {detail}"),
        status: "exit status: 1".to_string(),
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl NetworkConfigurator for MemoryConfigurator {
    async fn create_tap(&self, name: &str) -> VmnetResult<()> {
        let mut host = self.enter("create_tap", name)?;
        if host.links.contains_key(name) {
            return Err(failed(
                "create_tap",
                name,
                "ioctl(TUNSETIFF): Device or resource busy",
            ));
        }
        host.links.insert(
            name.to_string(),
            LinkState {
                tap: true,
                ..LinkState::default()
            },
        );
        Ok(())
    }

    async fn add_address(&self, name: &str, addr: &TapAddress) -> VmnetResult<()> {
        let detail = format!("{name}, {addr}");
        let mut host = self.enter("add_address", &detail)?;
        let link = host
            .links
            .get_mut(name)
            .ok_or_else(|| failed("add_address", &detail, "Cannot find device"))?;
        if link.addresses.contains(addr) {
            return Err(failed("add_address", &detail, "RTNETLINK answers: File exists"));
        }
        link.addresses.push(*addr);
        Ok(())
    }

    async fn set_link_up(&self, name: &str) -> VmnetResult<()> {
        let mut host = self.enter("set_link_up", name)?;
        let link = host
            .links
            .get_mut(name)
            .ok_or_else(|| failed("set_link_up", name, "Cannot find device"))?;
        link.up = true;
        Ok(())
    }

    async fn delete_link(&self, name: &str) -> VmnetResult<()> {
        let mut host = self.enter("delete_link", name)?;
        if host.links.remove(name).is_none() {
            return Err(failed("delete_link", name, "Cannot find device"));
        }
        Ok(())
    }

    async fn link_exists(&self, name: &str) -> VmnetResult<bool> {
        Ok(self.host.lock().links.contains_key(name))
    }

    async fn is_tap(&self, name: &str) -> VmnetResult<bool> {
        Ok(self.host.lock().links.get(name).is_some_and(|link| link.tap))
    }

    async fn enable_ip_forwarding(&self) -> VmnetResult<()> {
        let mut host = self.enter("enable_ip_forwarding", "")?;
        host.forwarding = true;
        Ok(())
    }

    async fn rule_exists(&self, rule: &FirewallRule) -> VmnetResult<bool> {
        Ok(self.host.lock().rules.contains(rule))
    }

    async fn append_rule(&self, rule: &FirewallRule) -> VmnetResult<()> {
        let mut host = self.enter("append_rule", &rule.to_string())?;
        host.rules.push(rule.clone());
        Ok(())
    }

    async fn delete_rule(&self, rule: &FirewallRule) -> VmnetResult<()> {
        let detail = rule.to_string();
        let mut host = self.enter("delete_rule", &detail)?;
        let idx = host
            .rules
            .iter()
            .position(|r| r == rule)
            .ok_or_else(|| failed("delete_rule", &detail, "Bad rule"))?;
        host.rules.remove(idx);
        Ok(())
    }

    async fn default_route_interface(&self) -> VmnetResult<String> {
        self.host
            .lock()
            .default_route
            .clone()
            .ok_or(VmnetError::NoDefaultRoute)
    }
}
