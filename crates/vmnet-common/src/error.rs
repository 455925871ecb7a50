//! Common error types for vmnet.

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`VmnetError`].
pub type VmnetResult<T> = Result<T, VmnetError>;

/// Errors raised while validating input or configuring the host.
#[derive(Error, Diagnostic, Debug)]
pub enum VmnetError {
    /// A required positional argument was not supplied.
    #[error("Missing required argument: {name}")]
    #[diagnostic(
        code(vmnet::input::missing_argument),
        help("Usage: vmnet <MAIN_INTERFACE> <VM_INTERFACE> <CIDR>, e.g. vmnet eth0 tap0 172.16.0.1/24")
    )]
    MissingArgument {
        /// Name of the missing argument.
        name: String,
    },

    /// Interface name rejected by validation.
    #[error("Invalid interface name: {name:?}")]
    #[diagnostic(
        code(vmnet::input::invalid_interface),
        help("Interface names are 1-15 bytes with no '/', ':' or whitespace")
    )]
    InvalidInterfaceName {
        /// The rejected name.
        name: String,
    },

    /// Address could not be parsed as `address/prefix`.
    #[error("Invalid CIDR address: {value:?}")]
    #[diagnostic(
        code(vmnet::input::invalid_cidr),
        help("Use address/prefix notation, e.g. 172.16.0.1/24")
    )]
    InvalidCidr {
        /// The rejected value.
        value: String,
    },

    /// Tap name does not carry a usable numeric suffix.
    #[error("Cannot derive a subnet from tap name {name:?}")]
    #[diagnostic(
        code(vmnet::tap::invalid_name),
        help("Tap names must end in a number between 0 and 255, e.g. tap3")
    )]
    InvalidTapName {
        /// The tap name.
        name: String,
    },

    /// Every probed tap name is taken.
    #[error("No free tap device name with prefix {prefix:?} (probed {probed})")]
    #[diagnostic(code(vmnet::tap::exhausted))]
    NoFreeTap {
        /// Name prefix that was probed.
        prefix: String,
        /// Number of names probed.
        probed: u32,
    },

    /// Host has no default route to derive the uplink from.
    #[error("No default route found, the host seems to be offline")]
    #[diagnostic(
        code(vmnet::route::no_default),
        help("Pass the uplink explicitly with --main")
    )]
    NoDefaultRoute,

    /// External program could not be started.
    #[error("Failed to execute {program}: {source}")]
    #[diagnostic(
        code(vmnet::command::spawn),
        help("Make sure iproute2 and iptables are installed and on PATH")
    )]
    CommandSpawn {
        /// Program that failed to start.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// External program exited unsuccessfully.
    #[error("Command `{command}` failed ({status}): {stderr}")]
    #[diagnostic(code(vmnet::command::failed))]
    CommandFailed {
        /// Rendered command line.
        command: String,
        /// Exit status description.
        status: String,
        /// Trimmed standard error.
        stderr: String,
    },

    /// A bootstrap or teardown step failed.
    #[error("Step '{step}' failed: {message}")]
    #[diagnostic(code(vmnet::step::failed))]
    StepFailed {
        /// Step name.
        step: String,
        /// What went wrong.
        message: String,
    },

    /// The VM interface and the uplink are the same device.
    #[error("VM interface and main interface are both {name:?}")]
    #[diagnostic(
        code(vmnet::input::interface_conflict),
        help("The tap must be a new device, distinct from the uplink")
    )]
    InterfaceConflict {
        /// The shared name.
        name: String,
    },

    /// An interface with the tap's name exists but is not a tap.
    #[error("Interface {name:?} exists and is not a tap device")]
    #[diagnostic(
        code(vmnet::tap::not_a_tap),
        help("Choose an unused name for the VM interface")
    )]
    NotATap {
        /// The interface name.
        name: String,
    },

    /// Permission denied.
    #[error("Permission denied: {operation}")]
    #[diagnostic(
        code(vmnet::permission_denied),
        help("Host network configuration requires root or CAP_NET_ADMIN (try sudo)")
    )]
    PermissionDenied {
        /// The operation that was denied.
        operation: String,
    },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(vmnet::config))]
    Config {
        /// The error message.
        message: String,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(vmnet::io))]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for VmnetError {
    fn from(err: toml::de::Error) -> Self {
        VmnetError::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = VmnetError::MissingArgument {
            name: "cidr".to_string(),
        };
        assert_eq!(err.to_string(), "Missing required argument: cidr");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: VmnetError = io_err.into();
        assert!(matches!(err, VmnetError::Io(_)));
    }

    #[test]
    fn command_failed_display() {
        let err = VmnetError::CommandFailed {
            command: "ip link set tap0 up".to_string(),
            status: "exit status: 1".to_string(),
            stderr: "Cannot find device \"tap0\"".to_string(),
        };
        assert!(err.to_string().starts_with("Command `ip link set tap0 up` failed"));
    }

    #[test]
    fn step_failed_carries_message() {
        let err = VmnetError::StepFailed {
            step: "link-up".to_string(),
            message: "Cannot find device".to_string(),
        };
        assert_eq!(err.to_string(), "Step 'link-up' failed: Cannot find device");
    }
}
