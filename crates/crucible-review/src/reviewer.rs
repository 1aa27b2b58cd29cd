//! Review pipeline
//!
//! For every file: detect the domain, match skills and assertion sets, load
//! linked knowledge, run pattern assertions, optionally run semantic
//! assertions, then judge the result against the domain's threshold.

use crate::domain::{detect, language_for_path};
use crate::error::{Result, ReviewError};
use crate::git::{changed_files, file_content, repo_root, GitMode};
use crate::ignore_rules::IgnoreSpec;
use crate::prewrite::{detect_template, PrewriteReport, PrewriteTemplate, TemplateLookup, PREWRITE_TAG};
use crate::report::{FileReview, ReviewReport};
use crate::settings::ReviewSettings;
use crucible_enforcement::{
    applies_to_file, deduplicate, filter_to_changes, select_and_run, summarize, AssertionCatalog,
    AssertionKind, ChangedFile, ExecuteOptions, PatternEngine, ReasoningCapability, SemanticPlan,
    SemanticReport,
};
use crucible_skills::{load_knowledge, CascadeRoots, SkillsRegistry};
use crucible_types::{Degraded, DegradedKind, Domain, DomainContext, Finding};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Findings and metadata for one file, before aggregation
pub struct FileOutcome {
    pub review: FileReview,
    pub findings: Vec<Finding>,
    pub degraded: Vec<Degraded>,
    pub semantic_plan: Option<SemanticPlan>,
    pub semantic_run: usize,
}

/// Loaded resources plus settings; one instance serves many reviews
pub struct Reviewer {
    roots: CascadeRoots,
    settings: ReviewSettings,
    skills: SkillsRegistry,
    catalog: AssertionCatalog,
    ignore: IgnoreSpec,
    capability: Option<Arc<dyn ReasoningCapability>>,
    load_degraded: Vec<Degraded>,
}

impl Reviewer {
    /// Discover skills, assertion sets and ignore files through the cascade
    pub fn new(roots: CascadeRoots, settings: ReviewSettings) -> Result<Self> {
        roots.ensure_any_exists()?;

        // Initialize skills registry
        let mut skills = SkillsRegistry::new(roots.clone());
        skills.discover()?;
        info!("Skills registry initialized with {} skill(s)", skills.len());

        // Load assertion sets
        let catalog = AssertionCatalog::load(&roots)?;

        // Layer ignore files and configured excludes
        let (ignore, mut load_degraded) = IgnoreSpec::load(&roots, &settings.exclude);

        load_degraded.extend(skills.degraded().iter().cloned());
        load_degraded.extend(catalog.degraded.iter().cloned());

        Ok(Self {
            roots,
            settings,
            skills,
            catalog,
            ignore,
            capability: None,
            load_degraded,
        })
    }

    /// Enable semantic assertions through a reasoning backend
    pub fn with_capability(mut self, capability: Arc<dyn ReasoningCapability>) -> Self {
        self.capability = Some(capability);
        self
    }

    pub fn roots(&self) -> &CascadeRoots {
        &self.roots
    }

    pub fn settings(&self) -> &ReviewSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut ReviewSettings {
        &mut self.settings
    }

    pub fn skills(&self) -> &SkillsRegistry {
        &self.skills
    }

    pub fn catalog(&self) -> &AssertionCatalog {
        &self.catalog
    }

    pub fn ignore(&self) -> &IgnoreSpec {
        &self.ignore
    }

    /// Whether semantic assertions will run
    pub fn semantic_enabled(&self) -> bool {
        self.settings.semantic.enabled && self.capability.is_some()
    }

    /// Review files and directories, reporting paths relative to `base`
    pub async fn review_paths(
        &self,
        paths: &[PathBuf],
        base: &Path,
        cancel: &CancellationToken,
    ) -> Result<ReviewReport> {
        let mut degraded = Vec::new();
        let mut files = Vec::new();
        for path in paths {
            let absolute = if path.is_absolute() {
                path.clone()
            } else {
                base.join(path).components().collect()
            };
            if !absolute.exists() {
                return Err(ReviewError::MissingPath(path.clone()));
            }
            if absolute != base && self.ignore.is_ignored_path(&absolute, base) {
                debug!("Ignoring {}", absolute.display());
                continue;
            }
            let (walked, walk_degraded) = self.ignore.walk(&absolute, base);
            files.extend(walked);
            degraded.extend(walk_degraded);
        }
        files.sort();
        files.dedup();
        info!("Reviewing {} file(s)", files.len());

        let mut inputs = Vec::with_capacity(files.len());
        for file in files {
            let relative = display_path(&file, base);
            match tokio::fs::read_to_string(&file).await {
                Ok(text) => inputs.push((relative, text)),
                Err(e) => {
                    debug!("Skipping unreadable {}: {}", relative, e);
                    degraded.push(Degraded::new(DegradedKind::Io, relative, e.to_string()));
                }
            }
        }

        let mut report = self.review_inputs(inputs, None, cancel).await;
        report.degraded.extend(degraded);
        Ok(report)
    }

    /// Review the changes of a git mode, keeping only findings on added lines
    ///
    /// Reported paths are relative to the repository root containing `repo`.
    pub async fn review_git(
        &self,
        repo: &Path,
        mode: &GitMode,
        cancel: &CancellationToken,
    ) -> Result<ReviewReport> {
        let timeout = Duration::from_secs(self.settings.git_timeout_secs);
        let repo = repo_root(repo, timeout).await?;
        let repo = repo.as_path();
        let changes: Vec<ChangedFile> = changed_files(repo, mode, timeout)
            .await?
            .into_iter()
            .filter(|c| !self.ignore.is_ignored(&c.path, false))
            .collect();
        info!("Reviewing {} changed file(s) ({})", changes.len(), mode);

        let mut degraded = Vec::new();
        let mut inputs = Vec::with_capacity(changes.len());
        for change in &changes {
            match file_content(repo, mode, &change.path, timeout).await {
                Ok(text) => inputs.push((change.path.clone(), text)),
                Err(e) => degraded.push(Degraded::new(DegradedKind::Io, change.path.clone(), e.to_string())),
            }
        }

        let mut report = self.review_inputs(inputs, Some(&changes), cancel).await;
        report.degraded.extend(degraded);
        Ok(report)
    }

    /// Review in-memory text under a display path
    pub async fn review_text(&self, path: &str, text: &str, cancel: &CancellationToken) -> ReviewReport {
        self.review_inputs(vec![(path.to_string(), text.to_string())], None, cancel)
            .await
    }

    async fn review_inputs(
        &self,
        inputs: Vec<(String, String)>,
        changes: Option<&[ChangedFile]>,
        cancel: &CancellationToken,
    ) -> ReviewReport {
        let mut report = ReviewReport::new();
        report.degraded.extend(self.load_degraded.iter().cloned());

        let total = inputs.len();
        let mut remaining = self.settings.semantic.token_budget;
        for (done, (path, text)) in inputs.into_iter().enumerate() {
            if cancel.is_cancelled() {
                warn!("Review cancelled after {} of {} file(s)", done, total);
                report.degraded.push(Degraded::new(
                    DegradedKind::Cancelled,
                    "review",
                    format!("{} file(s) not reviewed", total - done),
                ));
                break;
            }

            let mut outcome = self.review_file(&path, &text, remaining, cancel).await;
            if let Some(changes) = changes {
                let findings = std::mem::take(&mut outcome.findings);
                outcome.findings = filter_to_changes(findings, changes, self.settings.margin());
                let (summary, passed) = summarize(&outcome.findings, outcome.review.threshold);
                outcome.review.summary = summary;
                outcome.review.passed = passed;
            }

            if let Some(plan) = &outcome.semantic_plan {
                remaining = remaining.saturating_sub(plan.planned_tokens);
                report.semantic.tokens_planned += plan.planned_tokens;
                report.semantic.skipped.extend(plan.skipped.iter().cloned());
            }
            report.semantic.run += outcome.semantic_run;
            report.passed &= outcome.review.passed;
            report.summary.merge(&outcome.review.summary);
            report.findings.extend(outcome.findings);
            report.degraded.extend(outcome.degraded);
            report.files.push(outcome.review);
        }

        report.degraded = unique_degraded(report.degraded);
        info!(
            "Review {}: {} active finding(s), {} suppressed, {} degraded",
            if report.passed { "passed" } else { "failed" },
            report.summary.total_active(),
            report.summary.suppressed,
            report.degraded.len()
        );
        report
    }

    /// Run every applicable analysis on one file
    ///
    /// `budget` is the semantic token budget left for this file.
    pub async fn review_file(
        &self,
        path: &str,
        text: &str,
        budget: usize,
        cancel: &CancellationToken,
    ) -> FileOutcome {
        let context = detect(path, text);
        let language = language_for_path(path).map(str::to_string);
        let mut degraded = Vec::new();

        // Skills and their linked knowledge
        let skills = self.skills.applicable(&context);
        let knowledge_names = self.skills.linked_knowledge(&skills, &[]);
        let knowledge = self.load_linked(&knowledge_names, &mut degraded);

        // Pattern assertions
        let assertion_sets = self.catalog.applicable_sets(&context);
        let (mut findings, rule_errors) = self.run_patterns(path, text, &context);
        degraded.extend(rule_errors);

        // Semantic assertions
        let mut semantic_plan = None;
        let mut semantic_run = 0;
        if self.settings.semantic.enabled {
            match self.run_semantic(path, text, &context, budget, cancel).await {
                Some((plan, run)) => {
                    findings.extend(run.findings);
                    degraded.extend(run.degraded);
                    semantic_run = run.completed;
                    semantic_plan = Some(plan);
                }
                None => degraded.push(Degraded::new(
                    DegradedKind::Capability,
                    "semantic",
                    "no reasoning backend configured",
                )),
            }
        }

        let findings = deduplicate(findings);
        let threshold = self.settings.threshold_for(context.domain);
        let (summary, passed) = summarize(&findings, threshold);
        debug!(
            "{} [{}]: {} finding(s), threshold {}, {}",
            path,
            context.domain,
            findings.len(),
            threshold,
            if passed { "pass" } else { "fail" }
        );

        FileOutcome {
            review: FileReview {
                path: path.to_string(),
                context,
                language,
                skills,
                knowledge,
                assertion_sets,
                threshold,
                summary,
                passed,
            },
            findings,
            degraded,
            semantic_plan,
            semantic_run,
        }
    }

    /// Pattern assertions from every set that applies to `context`
    pub fn run_patterns(&self, path: &str, text: &str, context: &DomainContext) -> (Vec<Finding>, Vec<Degraded>) {
        let definitions = self.catalog.applicable(context);
        let (engine, degraded) = PatternEngine::new(&definitions);
        let language = language_for_path(path).unwrap_or_default();
        (engine.evaluate(text, path, language), degraded)
    }

    /// Semantic assertions that apply to the file, planned under `budget`
    ///
    /// Returns `None` when no reasoning backend is configured.
    pub async fn run_semantic(
        &self,
        path: &str,
        text: &str,
        context: &DomainContext,
        budget: usize,
        cancel: &CancellationToken,
    ) -> Option<(SemanticPlan, SemanticReport)> {
        let capability = self.capability.as_deref()?;
        let language = language_for_path(path).unwrap_or_default();
        let semantic: Vec<_> = self
            .catalog
            .applicable(context)
            .into_iter()
            .filter(|d| d.kind == AssertionKind::Semantic && applies_to_file(d, path, language))
            .collect();

        Some(select_and_run(&semantic, path, text, budget, capability, self.execute_options(), cancel).await)
    }

    /// Review a spec or design document before any code is written
    ///
    /// `template` names the template to apply; without one it is detected from
    /// the text. Naming a template that exists at no tier is an error.
    pub async fn review_prewrite(
        &self,
        path: &str,
        text: &str,
        template: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<PrewriteReport> {
        let mut report = PrewriteReport::new(path, self.settings.fail_on);
        report.degraded.extend(self.load_degraded.iter().cloned());

        let (name, detected) = match template {
            Some(name) => (Some(name.trim().to_string()), false),
            None => (detect_template(text).map(str::to_string), true),
        };

        let mut assertion_sets = Vec::new();
        let mut requested_knowledge = Vec::new();
        if let Some(name) = name {
            match PrewriteTemplate::load(&name, &self.roots)? {
                TemplateLookup::Found(found) => {
                    report.template = Some(found.name().to_string());
                    report.detected = detected;
                    report.checklist = found.checklist;
                    assertion_sets = found.assertion_sets;
                    requested_knowledge = found.metadata.linked_knowledge;
                }
                TemplateLookup::Missing { available } if !detected => {
                    let available = if available.is_empty() {
                        "none".to_string()
                    } else {
                        available.join(", ")
                    };
                    return Err(ReviewError::UnknownTemplate { name, available });
                }
                TemplateLookup::Missing { .. } => {
                    debug!("Detected template '{}' is not installed", name);
                }
            }
        }

        // Skills opt in through the prewrite tag or the template name
        let mut tags = vec![PREWRITE_TAG.to_string()];
        tags.extend(report.template.clone());
        let context = DomainContext::new(Domain::Unknown, tags);
        report.skills = self.skills.applicable(&context);
        let knowledge_names = self.skills.linked_knowledge(&report.skills, &requested_knowledge);
        let mut degraded = Vec::new();
        report.knowledge = self.load_linked(&knowledge_names, &mut degraded);

        let definitions = self.catalog.prewrite(&assertion_sets);
        let language = language_for_path(path).unwrap_or_default();
        let (engine, rule_errors) = PatternEngine::new(&definitions);
        let mut findings = engine.evaluate(text, path, language);
        degraded.extend(rule_errors);

        if self.settings.semantic.enabled {
            match self.capability.as_deref() {
                Some(capability) => {
                    let semantic: Vec<_> = definitions
                        .into_iter()
                        .filter(|d| d.kind == AssertionKind::Semantic && applies_to_file(d, path, language))
                        .collect();
                    let budget = self.settings.semantic.token_budget;
                    let (plan, run) =
                        select_and_run(&semantic, path, text, budget, capability, self.execute_options(), cancel)
                            .await;
                    findings.extend(run.findings);
                    degraded.extend(run.degraded);
                    report.semantic.run = run.completed;
                    report.semantic.tokens_planned = plan.planned_tokens;
                    report.semantic.skipped = plan.skipped;
                }
                None => degraded.push(Degraded::new(
                    DegradedKind::Capability,
                    "semantic",
                    "no reasoning backend configured",
                )),
            }
        }

        report.findings = deduplicate(findings);
        let (summary, passed) = summarize(&report.findings, report.threshold);
        report.summary = summary;
        report.passed = passed;
        report.degraded.extend(degraded);
        report.degraded = unique_degraded(report.degraded);
        info!(
            "Pre-write review of {} {}: {} active finding(s)",
            path,
            if report.passed { "passed" } else { "failed" },
            report.summary.total_active()
        );
        Ok(report)
    }

    fn execute_options(&self) -> ExecuteOptions {
        ExecuteOptions {
            timeout: Duration::from_secs(self.settings.semantic.timeout_secs),
            concurrency: self.settings.semantic.concurrency,
        }
    }

    /// Load knowledge by name, recording what failed
    fn load_linked(&self, names: &[String], degraded: &mut Vec<Degraded>) -> Vec<String> {
        match load_knowledge(names, &self.roots) {
            Ok(bundle) => {
                for missing in &bundle.missing {
                    debug!("Linked knowledge '{}' not found", missing);
                }
                degraded.extend(bundle.degraded);
                bundle.entries.into_iter().map(|e| e.resource.name).collect()
            }
            Err(e) => {
                degraded.push(Degraded::new(DegradedKind::Io, "knowledge", e.to_string()));
                Vec::new()
            }
        }
    }
}

fn display_path(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

/// Drop repeats of the same degraded item, e.g. one bad rule seen for every file
fn unique_degraded(degraded: Vec<Degraded>) -> Vec<Degraded> {
    let mut seen = HashSet::new();
    degraded
        .into_iter()
        .filter(|d| seen.insert((d.kind, d.item.clone(), d.reason.clone())))
        .collect()
}
