//! Provider alias table rows

use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingType {
    Alias,
    /// Curated "do not map" marker; never used for matching
    Ignore,
}

impl MappingType {
    pub fn as_str(self) -> &'static str {
        match self {
            MappingType::Alias => "alias",
            MappingType::Ignore => "ignore",
        }
    }
}

impl FromStr for MappingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alias" => Ok(MappingType::Alias),
            "ignore" => Ok(MappingType::Ignore),
            other => Err(format!("unrecognized mapping type '{}'", other)),
        }
    }
}

/// One source → canonical provider candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMapping {
    pub source_provider: String,
    pub canonical_provider: String,
    pub mapping_type: MappingType,
    /// 0-100
    pub confidence_score: u8,
}
