//! Rendering of reports on stdout.

use color_eyre::eyre::Result;
use serde::Serialize;

use vmnet_common::TapAddress;
use vmnet_network::{Bootstrap, HostAction, Report, Step, StepOutcome};

use super::OutputFormat;

#[derive(Serialize)]
struct ReportJson<'a, S> {
    #[serde(skip_serializing_if = "Option::is_none")]
    dry_run: Option<&'a [HostAction]>,
    steps: &'a [StepOutcome<S>],
    success: bool,
}

#[derive(Serialize)]
struct TapJson<'a> {
    tap: &'a str,
    address: String,
}

/// Writes command results in the selected format.
pub(super) struct Output {
    format: OutputFormat,
}

impl Output {
    pub(super) fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Print a step report, preceded by the recorded actions of a dry run.
    pub(super) fn report<S: Step>(
        &self,
        report: &Report<S>,
        actions: Option<&[HostAction]>,
    ) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = ReportJson {
                    dry_run: actions,
                    steps: &report.steps,
                    success: report.is_success(),
                };
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
            OutputFormat::Text => {
                if let Some(actions) = actions {
                    println!("Dry run, no changes made. Would run:");
                    for action in actions {
                        println!("  {action}");
                    }
                    println!();
                }
                print!("{report}");
            }
        }
        Ok(())
    }

    /// Print what `auto` resolved before it runs. JSON output stays a
    /// single document, so there it only goes to the log.
    pub(super) fn auto_plan(&self, bootstrap: &Bootstrap) {
        tracing::info!(
            uplink = %bootstrap.uplink(),
            tap = %bootstrap.tap(),
            address = %bootstrap.address(),
            "Resolved auto plan"
        );
        if self.format == OutputFormat::Text {
            println!(
                "Using uplink {}, tap {} with {}",
                bootstrap.uplink(),
                bootstrap.tap(),
                bootstrap.address()
            );
        }
    }

    /// Print the next free tap and the subnet it would get.
    pub(super) fn next_tap(&self, name: &str, address: &TapAddress) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = TapJson {
                    tap: name,
                    address: address.to_string(),
                };
                println!("{}", serde_json::to_string_pretty(&json)?);
            }
            OutputFormat::Text => println!("{name} {address}"),
        }
        Ok(())
    }
}
