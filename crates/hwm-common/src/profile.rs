//! Profile quotas and state entries.
//!
//! A state file is an ordered list of `(profile, quota)` pairs:
//!
//! ```json
//! [["hw1", 3], ["hw2", "*"]]
//! ```
//!
//! which means try first to match the `hw1` profile, at most 3 more times,
//! then `hw2` any number of times.

use serde::{Deserialize, Serialize};

/// Remaining uses of a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawQuota", into = "RawQuota")]
pub enum Quota {
    /// `"*"`: no limit.
    Unlimited,
    /// A finite count; never negative.
    Remaining(u64),
}

impl Quota {
    /// A profile is a candidate for matching iff it has uses left.
    pub fn is_available(self) -> bool {
        match self {
            Quota::Unlimited => true,
            Quota::Remaining(n) => n > 0,
        }
    }

    /// Consume one use. Unlimited quotas and exhausted ones are left alone.
    pub fn decrement(self) -> Quota {
        match self {
            Quota::Unlimited => Quota::Unlimited,
            Quota::Remaining(n) => Quota::Remaining(n.saturating_sub(1)),
        }
    }

    /// Give one use back. Returns `None` for unlimited quotas.
    pub fn increment(self) -> Option<Quota> {
        match self {
            Quota::Unlimited => None,
            Quota::Remaining(n) => Some(Quota::Remaining(n.saturating_add(1))),
        }
    }
}

impl std::fmt::Display for Quota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Quota::Unlimited => write!(f, "*"),
            Quota::Remaining(n) => write!(f, "{}", n),
        }
    }
}

impl std::str::FromStr for Quota {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "*" {
            return Ok(Quota::Unlimited);
        }
        s.parse::<u64>()
            .map(Quota::Remaining)
            .map_err(|_| format!("invalid quota {:?}: expected \"*\" or a non-negative integer", s))
    }
}

/// Wire form of a quota: an integer or a string (`"*"` or digits).
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawQuota {
    Count(u64),
    Text(String),
}

impl TryFrom<RawQuota> for Quota {
    type Error = String;

    fn try_from(raw: RawQuota) -> Result<Self, Self::Error> {
        match raw {
            RawQuota::Count(n) => Ok(Quota::Remaining(n)),
            RawQuota::Text(s) => s.parse(),
        }
    }
}

impl From<Quota> for RawQuota {
    fn from(quota: Quota) -> Self {
        match quota {
            Quota::Unlimited => RawQuota::Text("*".to_string()),
            Quota::Remaining(n) => RawQuota::Count(n),
        }
    }
}

/// One entry of the ordered state list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, Quota)", into = "(String, Quota)")]
pub struct ProfileEntry {
    pub name: String,
    pub quota: Quota,
}

impl ProfileEntry {
    pub fn new(name: impl Into<String>, quota: Quota) -> Self {
        ProfileEntry {
            name: name.into(),
            quota,
        }
    }
}

impl From<(String, Quota)> for ProfileEntry {
    fn from((name, quota): (String, Quota)) -> Self {
        ProfileEntry { name, quota }
    }
}

impl From<ProfileEntry> for (String, Quota) {
    fn from(entry: ProfileEntry) -> Self {
        (entry.name, entry.quota)
    }
}
