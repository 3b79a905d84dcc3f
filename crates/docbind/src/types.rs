//! Shared value types: target kind, fetch mode, and path variable values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

// ============================================================================
// QueryType
// ============================================================================

/// Whether a binding targets a whole collection or a single document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryType {
    Collection,
    Doc,
}

impl QueryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryType::Collection => "collection",
            QueryType::Doc => "doc",
        }
    }
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueryType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collection" => Ok(QueryType::Collection),
            "doc" => Ok(QueryType::Doc),
            other => Err(ConfigError::UnknownQueryType(other.to_string())),
        }
    }
}

// ============================================================================
// FetchMode
// ============================================================================

/// `Watch` subscribes to ongoing changes; `Get` performs a one-shot read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchMode {
    Watch,
    Get,
}

impl FetchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchMode::Watch => "watch",
            FetchMode::Get => "get",
        }
    }
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FetchMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "watch" => Ok(FetchMode::Watch),
            "get" => Ok(FetchMode::Get),
            other => Err(ConfigError::UnknownFetchMode(other.to_string())),
        }
    }
}

// ============================================================================
// VarValue
// ============================================================================

/// The value held by a path variable: a string or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Str(String),
    Num(f64),
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarValue::Str(s) => f.write_str(s),
            // Integral numbers print without a fractional part: 42, not 42.0.
            VarValue::Num(n) if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 => {
                write!(f, "{}", *n as i64)
            }
            VarValue::Num(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for VarValue {
    fn from(s: &str) -> Self {
        VarValue::Str(s.to_string())
    }
}

impl From<String> for VarValue {
    fn from(s: String) -> Self {
        VarValue::Str(s)
    }
}

impl From<f64> for VarValue {
    fn from(n: f64) -> Self {
        VarValue::Num(n)
    }
}

impl From<i64> for VarValue {
    fn from(n: i64) -> Self {
        VarValue::Num(n as f64)
    }
}

impl From<i32> for VarValue {
    fn from(n: i32) -> Self {
        VarValue::Num(f64::from(n))
    }
}

impl From<u32> for VarValue {
    fn from(n: u32) -> Self {
        VarValue::Num(f64::from(n))
    }
}
