//! Crucible Types - Core types shared by every crucible crate
//!
//! This module defines the data model consumed and produced by the review core:
//! resource references, domain classification, findings and severity summaries.

pub mod domain;
pub mod finding;
pub mod resource;
pub mod severity;

pub use domain::{Domain, DomainContext};
pub use finding::{Degraded, DegradedKind, Finding, FindingOrigin, Location, SeveritySummary};
pub use resource::{ResourceKind, ResourceRef, Tier};
pub use severity::{ParseLevelError, Priority, Severity};
