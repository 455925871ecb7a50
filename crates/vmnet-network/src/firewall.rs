//! iptables rules for VM traffic.
//!
//! A [`FirewallRule`] is a table, a chain and a rule specification. The
//! same value renders the check (`-C`), append (`-A`) and delete (`-D`)
//! invocations, so the check always matches what was appended.

use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::command::HostCommand;

/// iptables table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    /// The default `filter` table.
    Filter,
    /// The `nat` table.
    Nat,
}

impl Table {
    fn as_str(self) -> &'static str {
        match self {
            Self::Filter => "filter",
            Self::Nat => "nat",
        }
    }
}

/// Built-in chain a rule lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Chain {
    /// `POSTROUTING` (nat).
    Postrouting,
    /// `FORWARD` (filter).
    Forward,
}

impl Chain {
    fn as_str(self) -> &'static str {
        match self {
            Self::Postrouting => "POSTROUTING",
            Self::Forward => "FORWARD",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operation applied to a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleOp {
    /// `-C`: exit zero if the rule exists.
    Check,
    /// `-A`: append to the chain.
    Append,
    /// `-D`: delete the first matching rule.
    Delete,
}

impl RuleOp {
    fn flag(self) -> &'static str {
        match self {
            Self::Check => "-C",
            Self::Append => "-A",
            Self::Delete => "-D",
        }
    }
}

/// A single iptables rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FirewallRule {
    /// Table holding the chain.
    pub table: Table,
    /// Chain holding the rule.
    pub chain: Chain,
    /// Match and target arguments.
    pub spec: Vec<String>,
}

impl FirewallRule {
    /// Create a rule from its parts.
    pub fn new<I, S>(table: Table, chain: Chain, spec: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            table,
            chain,
            spec: spec.into_iter().map(Into::into).collect(),
        }
    }

    /// Masquerade traffic leaving through `uplink`.
    pub fn masquerade(uplink: &str) -> Self {
        Self::new(
            Table::Nat,
            Chain::Postrouting,
            ["-o", uplink, "-j", "MASQUERADE"],
        )
    }

    /// Accept forwarded packets of established or related connections.
    pub fn forward_established() -> Self {
        Self::new(
            Table::Filter,
            Chain::Forward,
            [
                "-m",
                "conntrack",
                "--ctstate",
                "RELATED,ESTABLISHED",
                "-j",
                "ACCEPT",
            ],
        )
    }

    /// Accept forwarding from `tap` out through `uplink`.
    pub fn forward_tap_to_uplink(tap: &str, uplink: &str) -> Self {
        Self::new(
            Table::Filter,
            Chain::Forward,
            ["-i", tap, "-o", uplink, "-j", "ACCEPT"],
        )
    }

    /// iptables arguments for `op` on this rule.
    ///
    /// `-t` is only emitted for non-default tables.
    pub fn args(&self, op: RuleOp) -> Vec<String> {
        let mut args = Vec::with_capacity(self.spec.len() + 4);
        if self.table != Table::Filter {
            args.push("-t".to_string());
            args.push(self.table.as_str().to_string());
        }
        args.push(op.flag().to_string());
        args.push(self.chain.as_str().to_string());
        args.extend(self.spec.iter().cloned());
        args
    }

    /// Full iptables invocation for `op` on this rule.
    pub fn command(&self, iptables: &Path, op: RuleOp) -> HostCommand {
        HostCommand::new(iptables, self.args(op))
    }
}

impl fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {}", self.table.as_str(), self.chain, self.spec.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masquerade_args() {
        let rule = FirewallRule::masquerade("eth0");
        assert_eq!(
            rule.args(RuleOp::Check),
            ["-t", "nat", "-C", "POSTROUTING", "-o", "eth0", "-j", "MASQUERADE"]
        );
        assert_eq!(
            rule.command(Path::new("iptables"), RuleOp::Append).to_string(),
            "iptables -t nat -A POSTROUTING -o eth0 -j MASQUERADE"
        );
    }

    #[test]
    fn forward_established_uses_filter_table() {
        let rule = FirewallRule::forward_established();
        assert_eq!(
            rule.command(Path::new("iptables"), RuleOp::Check).to_string(),
            "iptables -C FORWARD -m conntrack --ctstate RELATED,ESTABLISHED -j ACCEPT"
        );
    }

    #[test]
    fn forward_tap_places_interfaces() {
        let rule = FirewallRule::forward_tap_to_uplink("tap0", "eth0");
        assert_eq!(
            rule.args(RuleOp::Delete),
            ["-D", "FORWARD", "-i", "tap0", "-o", "eth0", "-j", "ACCEPT"]
        );
    }

    #[test]
    fn rule_display() {
        assert_eq!(
            FirewallRule::masquerade("eth0").to_string(),
            "nat:POSTROUTING -o eth0 -j MASQUERADE"
        );
    }
}
