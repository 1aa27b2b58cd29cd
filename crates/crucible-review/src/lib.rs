//! Crucible review pipeline
//!
//! Ties the resource layer and the enforcement engine together: decides which
//! files to look at (ignore rules, git changes), classifies each one, applies
//! the matching skills and assertions, and produces a [`ReviewReport`]. Specs
//! and design documents get a template-driven [`PrewriteReport`] instead.

#![deny(unsafe_code, unused_imports, unused_variables)]

pub mod domain;
pub mod error;
pub mod git;
pub mod hooks;
pub mod ignore_rules;
pub mod prewrite;
pub mod report;
pub mod reviewer;
pub mod settings;

pub use domain::{detect, language_for_path};
pub use error::{Result, ReviewError};
pub use git::{changed_files, file_content, parse_diff, repo_root, GitMode};
pub use hooks::{hook_status, install_hook, uninstall_hook, HookInstall, HookStatus};
pub use ignore_rules::IgnoreSpec;
pub use prewrite::{detect_template, PrewriteReport, PrewriteTemplate, TemplateLookup};
pub use report::{FileReview, ReviewReport, SemanticStats};
pub use reviewer::{FileOutcome, Reviewer};
pub use settings::{DomainSettings, ReviewSettings, SemanticSettings};
