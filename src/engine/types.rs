//! Engine value types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Metadata report: field name to value, sorted for stable output
pub type Metadata = BTreeMap<String, MetaValue>;

/// A single reported metadata value
///
/// Archives nest the report of each member under the member's name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Int(i64),
    Text(String),
    Nested(Metadata),
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Text(value)
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Int(value)
    }
}

/// How archive members the engine cannot classify are handled
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownMemberPolicy {
    /// Refuse to clean the archive
    #[default]
    #[serde(alias = "ABORT", alias = "Abort")]
    Abort,
    /// Copy the member unchanged (may leak metadata)
    #[serde(alias = "KEEP", alias = "Keep")]
    Keep,
    /// Drop the member from the cleaned archive
    #[serde(alias = "OMIT", alias = "Omit")]
    Omit,
}

/// Per-request parser options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningConfig {
    /// Skip the expensive deep-clean passes
    pub lightweight: bool,
    pub unknown_member_policy: UnknownMemberPolicy,
    /// Parse under strict resource ceilings
    pub sandbox: bool,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            lightweight: false,
            unknown_member_policy: UnknownMemberPolicy::Abort,
            sandbox: true,
        }
    }
}

impl CleaningConfig {
    /// Options for read-only inspection
    pub fn inspect(sandbox: bool) -> Self {
        Self {
            sandbox,
            ..Self::default()
        }
    }

    pub fn limits(&self) -> Limits {
        if self.sandbox {
            Limits::SANDBOXED
        } else {
            Limits::STANDARD
        }
    }
}

/// Resource ceilings applied while parsing untrusted containers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Members per archive
    pub max_members: usize,
    /// Decompressed bytes per member
    pub max_member_size: u64,
    /// Decompressed bytes across one archive
    pub max_total_size: u64,
    /// Archives nested inside archives
    pub max_depth: usize,
}

impl Limits {
    pub const STANDARD: Limits = Limits {
        max_members: 65_536,
        max_member_size: 4 * 1024 * 1024 * 1024,
        max_total_size: 16 * 1024 * 1024 * 1024,
        max_depth: 8,
    };

    pub const SANDBOXED: Limits = Limits {
        max_members: 4_096,
        max_member_size: 256 * 1024 * 1024,
        max_total_size: 1024 * 1024 * 1024,
        max_depth: 3,
    };
}
