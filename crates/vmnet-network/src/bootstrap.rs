//! Tap bootstrap and teardown sequences.
//!
//! A [`Bootstrap`] runs the fixed list of [`BOOTSTRAP_STEPS`] against a
//! [`NetworkConfigurator`]. Steps run strictly in order, each awaited before
//! the next. Rule steps check before they append, so repeating a bootstrap
//! never duplicates a rule.

use std::fmt;
use std::future::Future;

use serde::Serialize;

use vmnet_common::{InterfaceName, TapAddress, VmnetConfig, VmnetError, VmnetResult};

use crate::configurator::NetworkConfigurator;
use crate::firewall::FirewallRule;
use crate::tap::{next_tap_name, subnet_for_tap};

/// Upper bound on deletes of one rule during teardown.
const MAX_RULE_COPIES: usize = 64;

/// A named step of a [`Bootstrap`] or [`Teardown`].
pub trait Step: Copy + Eq + fmt::Debug + fmt::Display + Serialize {
    /// Stable kebab-case name.
    fn name(self) -> &'static str;
}

/// One host action of a [`Bootstrap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum BootstrapStep {
    /// Create the tap device.
    CreateTap,
    /// Assign the address to the tap.
    AssignAddress,
    /// Bring the tap up.
    LinkUp,
    /// Enable IPv4 forwarding.
    EnableForwarding,
    /// Masquerade on the uplink.
    Masquerade,
    /// Forward established and related traffic.
    ForwardEstablished,
    /// Forward from the tap to the uplink.
    ForwardTapToUplink,
}

impl Step for BootstrapStep {
    fn name(self) -> &'static str {
        match self {
            Self::CreateTap => "create-tap",
            Self::AssignAddress => "assign-address",
            Self::LinkUp => "link-up",
            Self::EnableForwarding => "enable-forwarding",
            Self::Masquerade => "masquerade",
            Self::ForwardEstablished => "forward-established",
            Self::ForwardTapToUplink => "forward-tap-to-uplink",
        }
    }
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One host action of a [`Teardown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeardownStep {
    /// Remove the tap to uplink forward rule.
    RemoveTapForward,
    /// Delete the tap device.
    DeleteTap,
    /// Remove the uplink masquerade rule.
    RemoveMasquerade,
    /// Remove the established and related forward rule.
    RemoveForwardEstablished,
}

impl Step for TeardownStep {
    fn name(self) -> &'static str {
        match self {
            Self::RemoveTapForward => "remove-tap-forward",
            Self::DeleteTap => "delete-tap",
            Self::RemoveMasquerade => "remove-masquerade",
            Self::RemoveForwardEstablished => "remove-forward-established",
        }
    }
}

impl fmt::Display for TeardownStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Steps of a bootstrap, in execution order.
pub const BOOTSTRAP_STEPS: [BootstrapStep; 7] = [
    BootstrapStep::CreateTap,
    BootstrapStep::AssignAddress,
    BootstrapStep::LinkUp,
    BootstrapStep::EnableForwarding,
    BootstrapStep::Masquerade,
    BootstrapStep::ForwardEstablished,
    BootstrapStep::ForwardTapToUplink,
];

/// Result of one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum StepStatus {
    /// The host was changed.
    Applied,
    /// The desired state was already in place.
    AlreadyPresent,
    /// Nothing to do.
    Skipped,
    /// The step failed.
    Failed {
        /// Error text.
        message: String,
    },
    /// An earlier step failed and the sequence stopped.
    NotRun,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Applied => f.write_str("applied"),
            Self::AlreadyPresent => f.write_str("already present"),
            Self::Skipped => f.write_str("skipped"),
            Self::Failed { message } => write!(f, "FAILED: {message}"),
            Self::NotRun => f.write_str("not run"),
        }
    }
}

/// A step paired with its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome<S> {
    /// The step.
    pub step: S,
    /// What happened.
    #[serde(flatten)]
    pub status: StepStatus,
}

/// Ordered outcomes of a sequence, one per scheduled step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Report<S> {
    /// Outcomes in execution order.
    pub steps: Vec<StepOutcome<S>>,
}

/// Outcomes of a [`Bootstrap`].
pub type BootstrapReport = Report<BootstrapStep>;

/// Outcomes of a [`Teardown`].
pub type TeardownReport = Report<TeardownStep>;

impl<S> Default for Report<S> {
    fn default() -> Self {
        Self { steps: Vec::new() }
    }
}

impl<S: Step> Report<S> {
    fn push(&mut self, step: S, status: StepStatus) {
        self.steps.push(StepOutcome { step, status });
    }

    /// Status of `step`, if it was scheduled.
    #[must_use]
    pub fn status(&self, step: S) -> Option<&StepStatus> {
        self.steps
            .iter()
            .find(|o| o.step == step)
            .map(|o| &o.status)
    }

    /// Outcomes that failed.
    pub fn failures(&self) -> impl Iterator<Item = &StepOutcome<S>> {
        self.steps
            .iter()
            .filter(|o| matches!(o.status, StepStatus::Failed { .. }))
    }

    /// Whether no step failed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    /// Whether a failure stopped the sequence before its last step.
    #[must_use]
    pub fn stopped_early(&self) -> bool {
        self.steps.iter().any(|o| o.status == StepStatus::NotRun)
    }

    /// Turn the first failure into an error.
    ///
    /// # Errors
    ///
    /// Returns [`VmnetError::StepFailed`] naming the first failed step.
    pub fn check(&self) -> VmnetResult<()> {
        match self.failures().next() {
            Some(StepOutcome {
                step,
                status: StepStatus::Failed { message },
            }) => Err(VmnetError::StepFailed {
                step: step.name().to_string(),
                message: message.clone(),
            }),
            _ => Ok(()),
        }
    }
}

impl<S: Step> fmt::Display for Report<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for outcome in &self.steps {
            writeln!(f, "{:<28}{}", outcome.step.name(), outcome.status)?;
        }
        Ok(())
    }
}

/// Runs `steps` in order. A failure is recorded in the report; unless
/// `keep_going`, the steps after it are recorded as not run.
async fn run_steps<S, F, Fut>(steps: &[S], keep_going: bool, mut apply: F) -> Report<S>
where
    S: Step,
    F: FnMut(S) -> Fut,
    Fut: Future<Output = VmnetResult<StepStatus>>,
{
    let mut report = Report::default();

    for (i, &step) in steps.iter().enumerate() {
        match apply(step).await {
            Ok(status) => {
                tracing::info!(step = %step, status = %status, "Step finished");
                report.push(step, status);
            }
            Err(err) => {
                report.push(
                    step,
                    StepStatus::Failed {
                        message: err.to_string(),
                    },
                );
                if keep_going {
                    tracing::warn!(step = %step, error = %err, "Step failed, continuing");
                } else {
                    tracing::error!(step = %step, error = %err, "Step failed, stopping");
                    for &rest in &steps[i + 1..] {
                        report.push(rest, StepStatus::NotRun);
                    }
                    break;
                }
            }
        }
    }

    report
}

/// Append `rule` unless it is already present.
async fn ensure_rule(net: &dyn NetworkConfigurator, rule: &FirewallRule) -> VmnetResult<StepStatus> {
    if net.rule_exists(rule).await? {
        tracing::debug!(rule = %rule, "Rule already present");
        return Ok(StepStatus::AlreadyPresent);
    }
    net.append_rule(rule).await?;
    Ok(StepStatus::Applied)
}

/// Delete every copy of `rule`.
async fn remove_rule(net: &dyn NetworkConfigurator, rule: &FirewallRule) -> VmnetResult<StepStatus> {
    let mut removed = 0;
    while removed < MAX_RULE_COPIES && net.rule_exists(rule).await? {
        net.delete_rule(rule).await?;
        removed += 1;
    }

    if removed > 1 {
        tracing::debug!(rule = %rule, copies = removed, "Removed duplicate rules");
    }
    Ok(if removed == 0 {
        StepStatus::Skipped
    } else {
        StepStatus::Applied
    })
}

fn is_already_exists(err: &VmnetError) -> bool {
    matches!(err, VmnetError::CommandFailed { stderr, .. } if stderr.contains("File exists"))
}

fn distinct(uplink: &InterfaceName, tap: &InterfaceName) -> VmnetResult<()> {
    if uplink == tap {
        return Err(VmnetError::InterfaceConflict {
            name: tap.to_string(),
        });
    }
    Ok(())
}

/// Host setup for one VM tap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bootstrap {
    uplink: InterfaceName,
    tap: InterfaceName,
    address: TapAddress,
    keep_going: bool,
}

impl Bootstrap {
    /// Set up `tap` with `address`, routed out through `uplink`.
    ///
    /// # Errors
    ///
    /// Returns [`VmnetError::InterfaceConflict`] if `tap` and `uplink` are
    /// the same interface.
    pub fn new(uplink: InterfaceName, tap: InterfaceName, address: TapAddress) -> VmnetResult<Self> {
        distinct(&uplink, &tap)?;
        Ok(Self {
            uplink,
            tap,
            address,
            keep_going: false,
        })
    }

    /// Validate raw arguments and build a bootstrap.
    ///
    /// # Errors
    ///
    /// Returns [`VmnetError::MissingArgument`] for an absent argument, or
    /// the validation error of the first malformed one.
    pub fn from_args(
        uplink: Option<&str>,
        tap: Option<&str>,
        cidr: Option<&str>,
    ) -> VmnetResult<Self> {
        let missing = |name: &str| VmnetError::MissingArgument {
            name: name.to_string(),
        };

        let uplink = InterfaceName::new(uplink.ok_or_else(|| missing("MAIN_INTERFACE"))?)?;
        let tap = InterfaceName::new(tap.ok_or_else(|| missing("VM_INTERFACE"))?)?;
        let address = TapAddress::parse(cidr.ok_or_else(|| missing("CIDR"))?)?;

        Self::new(uplink, tap, address)
    }

    /// Resolve missing pieces from the host.
    ///
    /// The uplink defaults to the default-route interface, the tap to the
    /// next free `<tap_prefix>N`, and the address to the tap's `/24`
    /// inside `subnet_base`.
    ///
    /// # Errors
    ///
    /// Returns [`VmnetError::NoDefaultRoute`] or [`VmnetError::NoFreeTap`]
    /// when detection fails, [`VmnetError::InvalidTapName`] when the tap
    /// has no usable index, and [`VmnetError::InterfaceConflict`] when the
    /// tap is the uplink.
    pub async fn auto(
        net: &dyn NetworkConfigurator,
        config: &VmnetConfig,
        uplink: Option<InterfaceName>,
        tap: Option<InterfaceName>,
    ) -> VmnetResult<Self> {
        let uplink = match uplink {
            Some(uplink) => uplink,
            None => {
                let detected = net.default_route_interface().await?;
                tracing::info!(uplink = %detected, "Detected uplink from default route");
                InterfaceName::new(detected)?
            }
        };

        let tap = match tap {
            Some(tap) => tap,
            None => InterfaceName::new(next_tap_name(net, &config.tap_prefix).await?)?,
        };

        let address = subnet_for_tap(tap.as_str(), config.subnet_base)?;
        Self::new(uplink, tap, address)
    }

    /// Continue past failed steps, recording them in the report.
    #[must_use]
    pub fn keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    /// Uplink interface.
    #[must_use]
    pub fn uplink(&self) -> &InterfaceName {
        &self.uplink
    }

    /// Tap interface.
    #[must_use]
    pub fn tap(&self) -> &InterfaceName {
        &self.tap
    }

    /// Address assigned to the tap.
    #[must_use]
    pub fn address(&self) -> &TapAddress {
        &self.address
    }

    /// Run the steps against `net`.
    ///
    /// Failures are recorded in the report rather than returned; see
    /// [`Report::check`].
    pub async fn run(&self, net: &dyn NetworkConfigurator) -> BootstrapReport {
        tracing::info!(
            uplink = %self.uplink,
            tap = %self.tap,
            address = %self.address,
            "Bootstrapping tap networking"
        );

        run_steps(&BOOTSTRAP_STEPS, self.keep_going, |step| self.apply(net, step)).await
    }

    async fn apply(&self, net: &dyn NetworkConfigurator, step: BootstrapStep) -> VmnetResult<StepStatus> {
        let tap = self.tap.as_str();
        let uplink = self.uplink.as_str();

        match step {
            BootstrapStep::CreateTap => match net.create_tap(tap).await {
                Ok(()) => Ok(StepStatus::Applied),
                Err(err) => {
                    if net.is_tap(tap).await? {
                        tracing::warn!(tap, "Tap device already exists, reusing it");
                        Ok(StepStatus::AlreadyPresent)
                    } else if net.link_exists(tap).await? {
                        Err(VmnetError::NotATap {
                            name: tap.to_string(),
                        })
                    } else {
                        Err(err)
                    }
                }
            },
            BootstrapStep::AssignAddress => match net.add_address(tap, &self.address).await {
                Ok(()) => Ok(StepStatus::Applied),
                Err(err) if is_already_exists(&err) => {
                    tracing::warn!(tap, address = %self.address, "Address already assigned");
                    Ok(StepStatus::AlreadyPresent)
                }
                Err(err) => Err(err),
            },
            BootstrapStep::LinkUp => {
                net.set_link_up(tap).await?;
                Ok(StepStatus::Applied)
            }
            BootstrapStep::EnableForwarding => {
                net.enable_ip_forwarding().await?;
                Ok(StepStatus::Applied)
            }
            BootstrapStep::Masquerade => ensure_rule(net, &FirewallRule::masquerade(uplink)).await,
            BootstrapStep::ForwardEstablished => {
                ensure_rule(net, &FirewallRule::forward_established()).await
            }
            BootstrapStep::ForwardTapToUplink => {
                ensure_rule(net, &FirewallRule::forward_tap_to_uplink(tap, uplink)).await
            }
        }
    }
}

/// Reverses the tap-specific part of a [`Bootstrap`].
///
/// Masquerade and the established/related rule are shared by every tap on
/// the host, so they are only removed with [`Teardown::all_rules`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Teardown {
    uplink: InterfaceName,
    tap: InterfaceName,
    all_rules: bool,
    keep_going: bool,
}

impl Teardown {
    /// Tear down `tap`, which was routed out through `uplink`.
    ///
    /// # Errors
    ///
    /// Returns [`VmnetError::InterfaceConflict`] if `tap` and `uplink` are
    /// the same interface.
    pub fn new(uplink: InterfaceName, tap: InterfaceName) -> VmnetResult<Self> {
        distinct(&uplink, &tap)?;
        Ok(Self {
            uplink,
            tap,
            all_rules: false,
            keep_going: false,
        })
    }

    /// Also remove the shared masquerade and established/related rules.
    #[must_use]
    pub fn all_rules(mut self, all_rules: bool) -> Self {
        self.all_rules = all_rules;
        self
    }

    /// Continue past failed steps, recording them in the report.
    #[must_use]
    pub fn keep_going(mut self, keep_going: bool) -> Self {
        self.keep_going = keep_going;
        self
    }

    /// Steps this teardown will run.
    #[must_use]
    pub fn steps(&self) -> Vec<TeardownStep> {
        let mut steps = vec![TeardownStep::RemoveTapForward, TeardownStep::DeleteTap];
        if self.all_rules {
            steps.extend([
                TeardownStep::RemoveMasquerade,
                TeardownStep::RemoveForwardEstablished,
            ]);
        }
        steps
    }

    /// Run the steps against `net`.
    ///
    /// Failures are recorded in the report rather than returned; see
    /// [`Report::check`].
    pub async fn run(&self, net: &dyn NetworkConfigurator) -> TeardownReport {
        tracing::info!(uplink = %self.uplink, tap = %self.tap, "Tearing down tap networking");

        run_steps(&self.steps(), self.keep_going, |step| self.apply(net, step)).await
    }

    async fn apply(&self, net: &dyn NetworkConfigurator, step: TeardownStep) -> VmnetResult<StepStatus> {
        let tap = self.tap.as_str();
        let uplink = self.uplink.as_str();

        match step {
            TeardownStep::RemoveTapForward => {
                remove_rule(net, &FirewallRule::forward_tap_to_uplink(tap, uplink)).await
            }
            TeardownStep::DeleteTap => {
                if !net.link_exists(tap).await? {
                    return Ok(StepStatus::Skipped);
                }
                if !net.is_tap(tap).await? {
                    return Err(VmnetError::NotATap {
                        name: tap.to_string(),
                    });
                }
                net.delete_link(tap).await?;
                Ok(StepStatus::Applied)
            }
            TeardownStep::RemoveMasquerade => {
                remove_rule(net, &FirewallRule::masquerade(uplink)).await
            }
            TeardownStep::RemoveForwardEstablished => {
                remove_rule(net, &FirewallRule::forward_established()).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConfigurator;

    fn bootstrap() -> Bootstrap {
        Bootstrap::from_args(Some("eth0"), Some("tap0"), Some("172.16.0.1/24")).unwrap()
    }

    fn teardown() -> Teardown {
        Teardown::new(
            InterfaceName::new("eth0").unwrap(),
            InterfaceName::new("tap0").unwrap(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn bootstrap_configures_tap_and_rules() {
        let host = MemoryConfigurator::new().with_link("eth0");
        let report = bootstrap().run(&host).await;

        assert!(report.is_success());
        let steps: Vec<BootstrapStep> = report.steps.iter().map(|o| o.step).collect();
        assert_eq!(steps, BOOTSTRAP_STEPS);
        assert!(report.steps.iter().all(|o| o.status == StepStatus::Applied));

        let tap = host.link("tap0").unwrap();
        assert!(tap.tap);
        assert!(tap.up);
        assert_eq!(tap.addresses, [TapAddress::parse("172.16.0.1/24").unwrap()]);
        assert!(host.link("eth0").unwrap().addresses.is_empty());
        assert!(host.forwarding_enabled());

        assert_eq!(
            host.rules(),
            [
                FirewallRule::masquerade("eth0"),
                FirewallRule::forward_established(),
                FirewallRule::forward_tap_to_uplink("tap0", "eth0"),
            ]
        );
    }

    #[tokio::test]
    async fn bootstrap_call_order() {
        let host = MemoryConfigurator::new().with_link("eth0");
        bootstrap().run(&host).await;

        assert_eq!(
            host.calls(),
            [
                "create_tap(tap0)",
                "add_address(tap0, 172.16.0.1/24)",
                "set_link_up(tap0)",
                "enable_ip_forwarding()",
                "append_rule(nat:POSTROUTING -o eth0 -j MASQUERADE)",
                "append_rule(filter:FORWARD -m conntrack --ctstate RELATED,ESTABLISHED -j ACCEPT)",
                "append_rule(filter:FORWARD -i tap0 -o eth0 -j ACCEPT)",
            ]
        );
    }

    #[tokio::test]
    async fn second_run_adds_no_duplicate_rules() {
        let host = MemoryConfigurator::new().with_link("eth0");
        bootstrap().run(&host).await;
        let report = bootstrap().run(&host).await;

        assert!(report.is_success());
        for step in [
            BootstrapStep::CreateTap,
            BootstrapStep::AssignAddress,
            BootstrapStep::Masquerade,
            BootstrapStep::ForwardEstablished,
            BootstrapStep::ForwardTapToUplink,
        ] {
            assert_eq!(report.status(step), Some(&StepStatus::AlreadyPresent), "{step}");
        }
        assert_eq!(host.rules().len(), 3);
        assert_eq!(host.link("tap0").unwrap().addresses.len(), 1);
    }

    #[tokio::test]
    async fn second_tap_shares_uplink_rules() {
        let host = MemoryConfigurator::new().with_link("eth0");
        bootstrap().run(&host).await;
        let report = Bootstrap::from_args(Some("eth0"), Some("tap1"), Some("172.16.1.1/24"))
            .unwrap()
            .run(&host)
            .await;

        assert!(report.is_success());
        assert_eq!(host.rule_count(&FirewallRule::masquerade("eth0")), 1);
        assert_eq!(host.rule_count(&FirewallRule::forward_established()), 1);
        assert_eq!(host.rules().len(), 4);
    }

    #[test_log::test(tokio::test)]
    async fn failure_stops_and_keeps_partial_report() {
        let host = MemoryConfigurator::new().with_link("eth0");
        host.fail_on("set_link_up");

        let report = bootstrap().run(&host).await;
        assert!(!report.is_success());
        assert!(report.stopped_early());
        assert_eq!(report.steps.len(), BOOTSTRAP_STEPS.len());
        assert_eq!(report.status(BootstrapStep::CreateTap), Some(&StepStatus::Applied));
        assert_eq!(report.status(BootstrapStep::AssignAddress), Some(&StepStatus::Applied));
        assert!(matches!(
            report.status(BootstrapStep::LinkUp),
            Some(StepStatus::Failed { message }) if message.contains("injected failure")
        ));
        for step in &BOOTSTRAP_STEPS[3..] {
            assert_eq!(report.status(*step), Some(&StepStatus::NotRun), "{step}");
        }

        match report.check() {
            Err(VmnetError::StepFailed { step, .. }) => assert_eq!(step, "link-up"),
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(!host.forwarding_enabled());
        assert!(host.rules().is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn keep_going_runs_every_step() {
        let host = MemoryConfigurator::new().with_link("eth0");
        host.fail_on("set_link_up");
        host.fail_on("enable_ip_forwarding");

        let report = bootstrap().keep_going(true).run(&host).await;
        assert_eq!(report.steps.len(), BOOTSTRAP_STEPS.len());
        assert!(!report.is_success());
        assert!(!report.stopped_early());

        let failed: Vec<BootstrapStep> = report.failures().map(|o| o.step).collect();
        assert_eq!(failed, [BootstrapStep::LinkUp, BootstrapStep::EnableForwarding]);
        assert_eq!(host.rules().len(), 3);
    }

    #[tokio::test]
    async fn create_tap_failure_without_link_is_fatal() {
        let host = MemoryConfigurator::new().with_link("eth0");
        host.fail_on("create_tap");

        let report = bootstrap().run(&host).await;
        assert!(matches!(
            report.check(),
            Err(VmnetError::StepFailed { ref step, .. }) if step == "create-tap"
        ));
        assert_eq!(host.calls(), ["create_tap(tap0)"]);
    }

    #[tokio::test]
    async fn existing_non_tap_link_is_not_reused() {
        let host = MemoryConfigurator::new()
            .with_link("eth0")
            .with_link("vnet0");

        let report = Bootstrap::from_args(Some("eth0"), Some("vnet0"), Some("172.16.0.1/24"))
            .unwrap()
            .run(&host)
            .await;

        assert!(matches!(
            report.status(BootstrapStep::CreateTap),
            Some(StepStatus::Failed { message }) if message.contains("not a tap")
        ));
        assert!(report.stopped_early());
        assert!(host.link("vnet0").unwrap().addresses.is_empty());
        assert!(host.rules().is_empty());
    }

    #[test]
    fn tap_and_uplink_must_differ() {
        assert!(matches!(
            Bootstrap::from_args(Some("eth0"), Some("eth0"), Some("172.16.0.1/24")),
            Err(VmnetError::InterfaceConflict { ref name }) if name == "eth0"
        ));

        let eth0 = InterfaceName::new("eth0").unwrap();
        assert!(matches!(
            Teardown::new(eth0.clone(), eth0),
            Err(VmnetError::InterfaceConflict { .. })
        ));
    }

    #[test]
    fn missing_arguments_are_reported() {
        let err = Bootstrap::from_args(Some("eth0"), Some("tap0"), None).unwrap_err();
        assert!(matches!(err, VmnetError::MissingArgument { ref name } if name == "CIDR"));

        let err = Bootstrap::from_args(None, None, None).unwrap_err();
        assert!(matches!(err, VmnetError::MissingArgument { ref name } if name == "MAIN_INTERFACE"));
    }

    #[test]
    fn malformed_arguments_are_reported() {
        assert!(matches!(
            Bootstrap::from_args(Some("eth0"), Some("tap/0"), Some("10.0.0.1/24")),
            Err(VmnetError::InvalidInterfaceName { .. })
        ));
        assert!(matches!(
            Bootstrap::from_args(Some("eth0"), Some("tap0"), Some("10.0.0.1")),
            Err(VmnetError::InvalidCidr { .. })
        ));
    }

    #[tokio::test]
    async fn auto_resolves_uplink_tap_and_subnet() {
        let host = MemoryConfigurator::new()
            .with_link("enp3s0")
            .with_link("tap0")
            .with_default_route("enp3s0");

        let plan = Bootstrap::auto(&host, &VmnetConfig::default(), None, None)
            .await
            .unwrap();
        assert_eq!(plan.uplink().as_str(), "enp3s0");
        assert_eq!(plan.tap().as_str(), "tap1");
        assert_eq!(plan.address().to_string(), "172.20.1.1/24");
    }

    #[tokio::test]
    async fn auto_without_default_route() {
        let host = MemoryConfigurator::new();
        let err = Bootstrap::auto(&host, &VmnetConfig::default(), None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, VmnetError::NoDefaultRoute));
    }

    #[tokio::test]
    async fn teardown_removes_tap_state_only() {
        let host = MemoryConfigurator::new().with_link("eth0");
        bootstrap().run(&host).await;

        let report = teardown().run(&host).await;

        assert!(report.is_success());
        assert_eq!(report.status(TeardownStep::RemoveTapForward), Some(&StepStatus::Applied));
        assert_eq!(report.status(TeardownStep::DeleteTap), Some(&StepStatus::Applied));
        assert!(host.link("tap0").is_none());
        assert_eq!(
            host.rules(),
            [
                FirewallRule::masquerade("eth0"),
                FirewallRule::forward_established()
            ]
        );
    }

    #[tokio::test]
    async fn teardown_all_rules_and_duplicates() {
        let host = MemoryConfigurator::new().with_link("eth0");
        let forward = FirewallRule::forward_tap_to_uplink("tap0", "eth0");
        // Left behind by earlier tools that appended without checking.
        host.append_rule(&forward).await.unwrap();
        host.append_rule(&forward).await.unwrap();
        bootstrap().run(&host).await;

        let teardown = teardown().all_rules(true);
        assert_eq!(teardown.steps().len(), 4);

        assert!(teardown.run(&host).await.is_success());
        assert!(host.rules().is_empty());
        assert_eq!(host.link_names(), ["eth0"]);
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let host = MemoryConfigurator::new().with_link("eth0");

        let report = teardown().run(&host).await;
        assert!(report.steps.iter().all(|o| o.status == StepStatus::Skipped));
        assert!(host.calls().is_empty());
    }

    #[tokio::test]
    async fn teardown_leaves_non_tap_link_alone() {
        let host = MemoryConfigurator::new()
            .with_link("eth0")
            .with_link("vnet0");
        let teardown = Teardown::new(
            InterfaceName::new("eth0").unwrap(),
            InterfaceName::new("vnet0").unwrap(),
        )
        .unwrap();

        let report = teardown.run(&host).await;
        assert!(matches!(
            report.status(TeardownStep::DeleteTap),
            Some(StepStatus::Failed { message }) if message.contains("not a tap")
        ));
        assert!(host.link("vnet0").is_some());
    }

    #[test]
    fn report_serializes_status_inline() {
        let mut report = BootstrapReport::default();
        report.push(BootstrapStep::CreateTap, StepStatus::Applied);
        report.push(
            BootstrapStep::LinkUp,
            StepStatus::Failed {
                message: "boom".to_string(),
            },
        );
        report.push(BootstrapStep::EnableForwarding, StepStatus::NotRun);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "steps": [
                    { "step": "create-tap", "status": "applied" },
                    { "step": "link-up", "status": "failed", "message": "boom" },
                    { "step": "enable-forwarding", "status": "not-run" },
                ]
            })
        );
    }

    #[test]
    fn report_text() {
        let mut report = TeardownReport::default();
        report.push(TeardownStep::RemoveMasquerade, StepStatus::AlreadyPresent);
        assert_eq!(
            report.to_string().trim_end(),
            format!("{:<28}already present", "remove-masquerade")
        );
    }
}
