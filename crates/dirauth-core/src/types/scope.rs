//! Search scope

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Breadth of a directory search below its base DN
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    /// The base entry only
    Base,
    /// Immediate children of the base entry
    #[serde(alias = "onelevel")]
    One,
    /// The base entry and everything below it
    #[default]
    #[serde(alias = "sub")]
    Subtree,
}

impl SearchScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchScope::Base => "base",
            SearchScope::One => "one",
            SearchScope::Subtree => "subtree",
        }
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchScope {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "base" => Ok(SearchScope::Base),
            "one" | "onelevel" => Ok(SearchScope::One),
            "sub" | "subtree" => Ok(SearchScope::Subtree),
            other => Err(crate::Error::Configuration(format!(
                "Unknown search scope: {}",
                other
            ))),
        }
    }
}
