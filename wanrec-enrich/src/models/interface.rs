//! WAN interface and circuit purpose identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the two uplinks of a site gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WanInterface {
    Wan1,
    Wan2,
}

impl WanInterface {
    pub const BOTH: [WanInterface; 2] = [WanInterface::Wan1, WanInterface::Wan2];

    pub fn other(self) -> Self {
        match self {
            WanInterface::Wan1 => WanInterface::Wan2,
            WanInterface::Wan2 => WanInterface::Wan1,
        }
    }

    /// Role an interface carries when no circuit or flip evidence says otherwise
    pub fn default_purpose(self) -> CircuitPurpose {
        match self {
            WanInterface::Wan1 => CircuitPurpose::Primary,
            WanInterface::Wan2 => CircuitPurpose::Secondary,
        }
    }
}

impl fmt::Display for WanInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WanInterface::Wan1 => write!(f, "WAN1"),
            WanInterface::Wan2 => write!(f, "WAN2"),
        }
    }
}

/// Contracted purpose of a circuit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CircuitPurpose {
    Primary,
    Secondary,
}

impl CircuitPurpose {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitPurpose::Primary => "Primary",
            CircuitPurpose::Secondary => "Secondary",
        }
    }
}

impl fmt::Display for CircuitPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CircuitPurpose {
    type Err = String;

    /// Feed rows label backup circuits inconsistently; "Backup" is a Secondary.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "primary" => Ok(CircuitPurpose::Primary),
            "secondary" | "backup" => Ok(CircuitPurpose::Secondary),
            other => Err(format!("unrecognized circuit purpose '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purpose_parsing_is_case_insensitive() {
        assert_eq!("PRIMARY".parse::<CircuitPurpose>(), Ok(CircuitPurpose::Primary));
        assert_eq!(" secondary ".parse::<CircuitPurpose>(), Ok(CircuitPurpose::Secondary));
        assert_eq!("Backup".parse::<CircuitPurpose>(), Ok(CircuitPurpose::Secondary));
        assert!("tertiary".parse::<CircuitPurpose>().is_err());
    }

    #[test]
    fn default_purpose_follows_interface() {
        assert_eq!(WanInterface::Wan1.default_purpose(), CircuitPurpose::Primary);
        assert_eq!(WanInterface::Wan2.default_purpose(), CircuitPurpose::Secondary);
        assert_eq!(WanInterface::Wan1.other(), WanInterface::Wan2);
    }
}
