//! # vmnet
//!
//! Prepares host networking for a virtual machine: a tap device with an
//! address, IPv4 forwarding, and the NAT and forward rules that let the VM
//! reach the network through the host's uplink.
//!
//! ## Usage
//!
//! ```text
//! vmnet eth0 tap0 172.16.0.1/24
//! vmnet --dry-run auto
//! vmnet teardown eth0 tap0
//! ```

#![warn(missing_docs)]

pub mod cli;
