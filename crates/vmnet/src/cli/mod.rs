//! CLI command definitions and handlers.

mod output;

use std::path::PathBuf;

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Result, WrapErr};

use vmnet_common::{InterfaceName, VmnetConfig};
use vmnet_network::{
    Bootstrap, DryRunConfigurator, NetworkConfigurator, Report, Step, SystemConfigurator,
    Teardown, next_tap_name, subnet_for_tap,
};

use output::Output;

/// vmnet - host networking for VM tap devices
#[derive(Parser)]
#[command(name = "vmnet")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "VMNET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print the actions instead of performing them
    #[arg(
        long,
        global = true,
        env = "VMNET_DRY_RUN",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub dry_run: bool,

    /// Run every step even if one fails
    #[arg(
        long,
        global = true,
        env = "VMNET_KEEP_GOING",
        action = ArgAction::SetTrue,
        value_parser = BoolishValueParser::new()
    )]
    pub keep_going: bool,

    /// Output format
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Path to the iproute2 `ip` binary
    #[arg(long, global = true, env = "VMNET_IP_BIN")]
    pub ip_bin: Option<PathBuf>,

    /// Path to the `iptables` binary
    #[arg(long, global = true, env = "VMNET_IPTABLES_BIN")]
    pub iptables_bin: Option<PathBuf>,

    /// Where procfs is mounted
    #[arg(long, global = true, env = "VMNET_PROC_ROOT")]
    pub proc_root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// The subcommand to execute; without one, set up a tap.
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Host uplink interface (e.g. eth0)
    #[arg(value_name = "MAIN_INTERFACE")]
    pub main_interface: Option<String>,

    /// Tap interface to create for the VM (e.g. tap0)
    #[arg(value_name = "VM_INTERFACE")]
    pub vm_interface: Option<String>,

    /// Address for the tap in CIDR notation (e.g. 172.16.0.1/24)
    #[arg(value_name = "CIDR")]
    pub cidr: Option<String>,
}

/// Report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human readable.
    Text,
    /// JSON on stdout.
    Json,
}

/// Subcommands besides the default setup.
#[derive(Subcommand)]
pub enum Commands {
    /// Remove a tap and its forward rule
    Teardown {
        /// Host uplink interface
        main_interface: String,

        /// Tap interface to remove
        vm_interface: String,

        /// Also remove the shared masquerade and established/related rules
        #[arg(long)]
        all_rules: bool,
    },

    /// Set up the next free tap with a derived subnet
    Auto {
        /// Uplink interface (default: interface of the default route)
        #[arg(long = "main")]
        main_interface: Option<String>,

        /// Tap name (default: first unused <tap_prefix>N)
        #[arg(long)]
        tap: Option<String>,
    },

    /// Print the next unused tap name and its subnet
    NextTap,
}

/// Host backend selected by `--dry-run`.
enum Backend {
    System(SystemConfigurator),
    DryRun(DryRunConfigurator),
}

impl Backend {
    fn net(&self) -> &dyn NetworkConfigurator {
        match self {
            Self::System(sys) => sys,
            Self::DryRun(dry) => dry,
        }
    }

    /// Print `report`, then fail if any step failed.
    fn finish<S: Step>(&self, output: &Output, report: &Report<S>) -> Result<()> {
        let actions = match self {
            Self::DryRun(dry) => Some(dry.actions()),
            Self::System(_) => None,
        };
        output.report(report, actions.as_deref())?;

        check_report(report)
    }
}

impl Cli {
    /// Merge the config file with flag and environment overrides.
    pub fn resolve_config(&self) -> Result<VmnetConfig> {
        let mut config = match &self.config {
            Some(path) => VmnetConfig::load(path)?,
            None => VmnetConfig::default(),
        };

        if let Some(ip_bin) = &self.ip_bin {
            config.ip_bin.clone_from(ip_bin);
        }
        if let Some(iptables_bin) = &self.iptables_bin {
            config.iptables_bin.clone_from(iptables_bin);
        }
        if let Some(proc_root) = &self.proc_root {
            config.proc_root.clone_from(proc_root);
        }
        if self.keep_going {
            config.keep_going = true;
        }

        config.validate()?;
        Ok(config)
    }

    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        let config = self.resolve_config()?;
        let output = Output::new(self.format);

        let backend = if self.dry_run {
            let preview_teardown = matches!(self.command, Some(Commands::Teardown { .. }));
            Backend::DryRun(DryRunConfigurator::new(&config).assuming_present(preview_teardown))
        } else {
            Backend::System(SystemConfigurator::new(&config))
        };
        let net = backend.net();

        match self.command {
            None => {
                let report = Bootstrap::from_args(
                    self.main_interface.as_deref(),
                    self.vm_interface.as_deref(),
                    self.cidr.as_deref(),
                )?
                .keep_going(config.keep_going)
                .run(net)
                .await;
                backend.finish(&output, &report)
            }

            Some(Commands::Teardown {
                main_interface,
                vm_interface,
                all_rules,
            }) => {
                let report = Teardown::new(
                    InterfaceName::new(main_interface)?,
                    InterfaceName::new(vm_interface)?,
                )?
                .all_rules(all_rules)
                .keep_going(config.keep_going)
                .run(net)
                .await;
                backend.finish(&output, &report)
            }

            Some(Commands::Auto {
                main_interface,
                tap,
            }) => {
                let uplink = main_interface.map(InterfaceName::new).transpose()?;
                let tap = tap.map(InterfaceName::new).transpose()?;
                let bootstrap = Bootstrap::auto(net, &config, uplink, tap)
                    .await?
                    .keep_going(config.keep_going);
                output.auto_plan(&bootstrap);
                let report = bootstrap.run(net).await;
                backend.finish(&output, &report)
            }

            Some(Commands::NextTap) => {
                let name = next_tap_name(net, &config.tap_prefix).await?;
                let address = subnet_for_tap(&name, config.subnet_base)?;
                output.next_tap(&name, &address)
            }
        }
    }
}

fn check_report<S: Step>(report: &Report<S>) -> Result<()> {
    let failed: Vec<&str> = report.failures().map(|o| o.step.name()).collect();
    report
        .check()
        .wrap_err_with(|| format!("{} step(s) failed: {}", failed.len(), failed.join(", ")))
}
