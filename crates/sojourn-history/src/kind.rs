//! Navigation types
//!
//! ```text
//! push      new entry after the current one, forward entries discarded
//! replace   new entry in the current slot (same key)
//! reload    current entry re-committed in place (new id)
//! traverse  cursor moves to an existing entry
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NavigationType {
    Reload,
    Push,
    Replace,
    Traverse,
}

impl NavigationType {
    /// Whether committing this type of navigation mints a new entry id
    pub fn mints_id(&self) -> bool {
        !matches!(self, NavigationType::Traverse)
    }

    /// Whether the destination is an entry that already sits in the list
    pub fn targets_existing_entry(&self) -> bool {
        matches!(self, NavigationType::Reload | NavigationType::Traverse)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NavigationType::Reload => "reload",
            NavigationType::Push => "push",
            NavigationType::Replace => "replace",
            NavigationType::Traverse => "traverse",
        }
    }
}

impl std::fmt::Display for NavigationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for NavigationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "reload" => Ok(NavigationType::Reload),
            "push" => Ok(NavigationType::Push),
            "replace" => Ok(NavigationType::Replace),
            "traverse" => Ok(NavigationType::Traverse),
            _ => Err(format!("Unknown navigation type: {}", s)),
        }
    }
}
