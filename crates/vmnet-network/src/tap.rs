//! Tap device naming and subnet allocation.
//!
//! Allocated taps are numbered `tap0`, `tap1`, ... and each gets its own
//! `/24` inside the configured `/16`: the tap's number is the third octet.

use ipnet::Ipv4Net;

use vmnet_common::{TapAddress, VmnetError, VmnetResult};

use crate::configurator::NetworkConfigurator;

/// Highest index probed by [`next_tap_name`].
pub const MAX_TAP_INDEX: u32 = 4096;

/// Numeric suffix of a tap name, e.g. 12 for `tap12`.
pub fn tap_index(name: &str) -> Option<u32> {
    let digits = name.len() - name.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    if digits == 0 {
        return None;
    }
    name[name.len() - digits..].parse().ok()
}

/// Address for tap `name` inside `base`.
///
/// # Errors
///
/// Returns [`VmnetError::InvalidTapName`] when the name has no numeric
/// suffix or the suffix does not fit in an octet.
pub fn subnet_for_tap(name: &str, base: Ipv4Net) -> VmnetResult<TapAddress> {
    let index = tap_index(name)
        .and_then(|i| u8::try_from(i).ok())
        .ok_or_else(|| VmnetError::InvalidTapName {
            name: name.to_string(),
        })?;
    TapAddress::from_subnet_index(base, index)
}

/// First `<prefix><n>` with no existing interface.
///
/// # Errors
///
/// Returns [`VmnetError::NoFreeTap`] if every index up to
/// [`MAX_TAP_INDEX`] is taken, or the configurator's error if a probe
/// fails.
pub async fn next_tap_name(net: &dyn NetworkConfigurator, prefix: &str) -> VmnetResult<String> {
    for index in 0..=MAX_TAP_INDEX {
        let name = format!("{prefix}{index}");
        if !net.link_exists(&name).await? {
            tracing::debug!(name, "Found free tap name");
            return Ok(name);
        }
    }

    Err(VmnetError::NoFreeTap {
        prefix: prefix.to_string(),
        probed: MAX_TAP_INDEX + 1,
    })
}
