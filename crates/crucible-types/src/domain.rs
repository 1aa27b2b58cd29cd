use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Code domain classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    SmartContract,
    Frontend,
    Backend,
    Infrastructure,
    #[default]
    Unknown,
}

impl Domain {
    pub const ALL: [Domain; 5] = [
        Domain::SmartContract,
        Domain::Frontend,
        Domain::Backend,
        Domain::Infrastructure,
        Domain::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SmartContract => "smart_contract",
            Self::Frontend => "frontend",
            Self::Backend => "backend",
            Self::Infrastructure => "infrastructure",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = std::convert::Infallible;

    /// Unrecognized names map to `Domain::Unknown`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Ok(Self::ALL
            .into_iter()
            .find(|d| d.as_str() == normalized)
            .unwrap_or(Self::Unknown))
    }
}

/// Classification of a unit under review; the matching key for skills and assertions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainContext {
    pub domain: Domain,
    /// Lowercase keywords, always including the domain name itself.
    pub tags: BTreeSet<String>,
}

impl DomainContext {
    pub fn new<I, S>(domain: Domain, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tags: BTreeSet<String> = tags
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        tags.insert(domain.as_str().to_string());
        Self { domain, tags }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(&tag.to_lowercase())
    }
}

impl Default for DomainContext {
    fn default() -> Self {
        Self::new(Domain::Unknown, std::iter::empty::<&str>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_always_contains_domain_tag() {
        let ctx = DomainContext::new(Domain::Backend, ["Python", " FastAPI "]);
        assert!(ctx.has_tag("backend"));
        assert!(ctx.has_tag("python"));
        assert!(ctx.has_tag("fastapi"));
        assert_eq!(ctx.tags.len(), 3);
    }

    #[test]
    fn test_domain_from_str() {
        assert_eq!("smart-contract".parse::<Domain>().unwrap(), Domain::SmartContract);
        assert_eq!("nonsense".parse::<Domain>().unwrap(), Domain::Unknown);
    }
}
