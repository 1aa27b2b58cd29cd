use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Resolution tier, highest priority first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Project,
    User,
    Bundled,
}

impl Tier {
    /// Search order used by every cascade lookup.
    pub const ORDER: [Tier; 3] = [Tier::Project, Tier::User, Tier::Bundled];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::User => "user",
            Self::Bundled => "bundled",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Class of customizable resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Skill,
    Knowledge,
    AssertionSet,
    Template,
    Ignore,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skill => "skill",
            Self::Knowledge => "knowledge",
            Self::AssertionSet => "assertion_set",
            Self::Template => "template",
            Self::Ignore => "ignore",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named resource, optionally resolved to a file at a tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub kind: ResourceKind,
    pub name: String,
    pub path: Option<PathBuf>,
    pub tier: Option<Tier>,
}

impl ResourceRef {
    pub fn unresolved(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            path: None,
            tier: None,
        }
    }

    pub fn resolved(
        kind: ResourceKind,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        tier: Tier,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            path: Some(path.into()),
            tier: Some(tier),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.path.is_some() && self.tier.is_some()
    }
}
