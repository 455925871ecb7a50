//! # vmnet-network
//!
//! Host-side networking for virtual machine tap devices.
//!
//! The [`Bootstrap`] sequence creates a tap, addresses it, brings it up,
//! enables forwarding and installs masquerade and forward rules. All host
//! access goes through [`NetworkConfigurator`], so the sequence can run
//! against the real host, a dry run, or an in-memory model.

#![warn(missing_docs)]

pub mod bootstrap;
pub mod command;
pub mod configurator;
pub mod dry_run;
pub mod firewall;
pub mod forwarding;
pub mod memory;
pub mod route;
pub mod tap;

pub use bootstrap::{
    BOOTSTRAP_STEPS, Bootstrap, BootstrapReport, BootstrapStep, Report, Step, StepOutcome,
    StepStatus, Teardown, TeardownReport, TeardownStep,
};
pub use command::{HostAction, HostCommand};
pub use configurator::{NetworkConfigurator, SystemConfigurator};
pub use dry_run::DryRunConfigurator;
pub use firewall::{Chain, FirewallRule, RuleOp, Table};
pub use memory::MemoryConfigurator;
pub use tap::{next_tap_name, subnet_for_tap};
