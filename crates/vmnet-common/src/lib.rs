//! # vmnet-common
//!
//! Shared types for vmnet, the host-side network bootstrap for virtual
//! machines.
//!
//! - Error type and result alias
//! - Validated interface names and tap addresses
//! - Configuration loading

#![warn(missing_docs)]

pub mod addr;
pub mod config;
pub mod error;
pub mod iface;

pub use addr::TapAddress;
pub use config::VmnetConfig;
pub use error::{VmnetError, VmnetResult};
pub use iface::InterfaceName;
