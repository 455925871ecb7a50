//! Validated network interface names.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{VmnetError, VmnetResult};

/// A validated Linux network interface name.
///
/// Interface names must:
/// - Be 1-15 bytes long (`IFNAMSIZ` minus the trailing NUL)
/// - Contain no `/`, `:` or whitespace
/// - Not be `.` or `..`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InterfaceName(String);

impl InterfaceName {
    /// Maximum length of an interface name in bytes.
    pub const MAX_LENGTH: usize = 15;

    /// Create a new interface name, validating the format.
    ///
    /// # Errors
    ///
    /// Returns [`VmnetError::InvalidInterfaceName`] if the name is not usable.
    pub fn new(name: impl Into<String>) -> VmnetResult<Self> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> VmnetResult<()> {
        let invalid = || VmnetError::InvalidInterfaceName {
            name: name.to_string(),
        };

        if name.is_empty() || name.len() > Self::MAX_LENGTH {
            return Err(invalid());
        }
        if name == "." || name == ".." {
            return Err(invalid());
        }
        if name
            .chars()
            .any(|c| c == '/' || c == ':' || c.is_whitespace() || c.is_control())
        {
            return Err(invalid());
        }

        Ok(())
    }
}

impl fmt::Display for InterfaceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for InterfaceName {
    type Err = VmnetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for InterfaceName {
    type Error = VmnetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<InterfaceName> for String {
    fn from(name: InterfaceName) -> Self {
        name.0
    }
}

impl AsRef<str> for InterfaceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn valid_interface_names() {
        assert!(InterfaceName::new("eth0").is_ok());
        assert!(InterfaceName::new("tap0").is_ok());
        assert!(InterfaceName::new("enp0s31f6").is_ok());
        assert!(InterfaceName::new("br-lan.100").is_ok());
        assert!(InterfaceName::new("a".repeat(15)).is_ok());
        assert!(InterfaceName::new("tap0;true").is_ok());
    }

    #[test]
    fn invalid_interface_names() {
        assert!(InterfaceName::new("").is_err());
        assert!(InterfaceName::new("a".repeat(16)).is_err());
        assert!(InterfaceName::new("eth0:1").is_err());
        assert!(InterfaceName::new("../tap").is_err());
        assert!(InterfaceName::new("tap 0").is_err());
        assert!(InterfaceName::new("..").is_err());
    }

    #[test]
    fn serde_rejects_invalid_names() {
        let parsed: Result<InterfaceName, _> = toml::Value::String("bad/name".into()).try_into();
        assert!(parsed.is_err());
    }

    proptest! {
        #[test]
        fn accepted_names_round_trip_through_display(name in "[a-z][a-z0-9_.-]{0,14}") {
            let iface = InterfaceName::new(name.clone()).unwrap();
            prop_assert_eq!(iface.to_string(), name);
        }

        #[test]
        fn names_with_slash_are_rejected(prefix in "[a-z]{0,6}", suffix in "[a-z]{0,6}") {
            let name = format!("{prefix}/{suffix}");
            prop_assert!(InterfaceName::new(name).is_err());
        }
    }
}
