//! Built-in crucible tools
//!
//! Every tool shares one [`ToolContext`]: the loaded [`Reviewer`], the project
//! directory that relative paths resolve against, and a cancellation token.

use crate::error::ToolError;
use crate::registry::{tool_definition, ReviewTool, ToolRegistry};
use async_trait::async_trait;
use crucible_enforcement::loader::ShadowedDefinition;
use crucible_enforcement::{summarize, AssertionDefinition, LoadedAssertion};
use crucible_review::{detect, language_for_path, GitMode, ReviewError, Reviewer};
use crucible_skills::load_knowledge;
use crucible_types::{Degraded, DegradedKind, Tier};
use rmcp::model::Tool;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// State shared by every tool
pub struct ToolContext {
    /// Loaded skills, assertions and settings
    pub reviewer: Arc<Reviewer>,
    /// Directory that relative file paths resolve against
    pub project_dir: PathBuf,
    /// Cancels in-flight reviews when the server shuts down
    pub cancel: CancellationToken,
}

impl ToolContext {
    /// Path relative to the project directory, with `/` separators
    fn display_path(&self, file_path: &str) -> String {
        let path = Path::new(file_path);
        path.strip_prefix(&self.project_dir)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
            .trim_start_matches("./")
            .to_string()
    }

    /// Use the given content, or read the file from disk
    async fn source(&self, tool: &str, args: &FileArgs) -> Result<(String, String), ToolError> {
        let display = self.display_path(&args.file_path);
        if let Some(content) = &args.content {
            return Ok((display, content.clone()));
        }
        let text = tokio::fs::read_to_string(self.project_dir.join(&args.file_path))
            .await
            .map_err(|e| ToolError::invalid(tool, format!("cannot read '{}': {e}", args.file_path)))?;
        Ok((display, text))
    }
}

/// Registry with every built-in tool
#[must_use]
pub fn create_default_tools(context: &Arc<ToolContext>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(FullReviewTool(Arc::clone(context))));
    registry.register(Box::new(ApplicableSkillsTool(Arc::clone(context))));
    registry.register(Box::new(KnowledgeTool(Arc::clone(context))));
    registry.register(Box::new(AssertionsTool(Arc::clone(context))));
    registry.register(Box::new(PatternAssertionsTool(Arc::clone(context))));
    registry.register(Box::new(SemanticAssertionsTool(Arc::clone(context))));
    registry.register(Box::new(DetectDomainTool(Arc::clone(context))));
    registry.register(Box::new(PrewriteReviewTool(Arc::clone(context))));
    registry
}

fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, ToolError> {
    let args = if args.is_null() { json!({}) } else { args };
    serde_json::from_value(args).map_err(|e| ToolError::invalid(tool, e))
}

fn to_json<T: Serialize>(tool: &str, value: &T) -> Result<Value, ToolError> {
    serde_json::to_value(value).map_err(|e| ToolError::failed(tool, e))
}

fn file_schema(extra: Value) -> Value {
    let mut schema = json!({
        "type": "object",
        "properties": {
            "file_path": {
                "type": "string",
                "description": "Path of the file, relative to the project directory"
            },
            "content": {
                "type": "string",
                "description": "File content; read from disk when omitted"
            }
        },
        "required": ["file_path"]
    });
    if let (Some(props), Value::Object(extra)) = (schema["properties"].as_object_mut(), extra) {
        props.extend(extra);
    }
    schema
}

#[derive(Debug, Deserialize)]
struct FileArgs {
    file_path: String,
    #[serde(default)]
    content: Option<String>,
}

// ============================================================================
// review
// ============================================================================

/// Full review of paths or git changes
pub struct FullReviewTool(Arc<ToolContext>);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ReviewMode {
    Staged,
    Unstaged,
    Branch,
    Commit,
}

#[derive(Debug, Deserialize)]
struct ReviewArgs {
    #[serde(default)]
    paths: Vec<String>,
    #[serde(default)]
    mode: Option<ReviewMode>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    format: Option<String>,
}

#[async_trait]
impl ReviewTool for FullReviewTool {
    fn definition(&self) -> Tool {
        tool_definition(
            "review",
            "Review files, directories or git changes against the applicable skills and assertions. \
             Returns the report with findings, severity summary and pass/fail.",
            &json!({
                "type": "object",
                "properties": {
                    "paths": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Files or directories to review (default: the project directory)"
                    },
                    "mode": {
                        "type": "string",
                        "enum": ["staged", "unstaged", "branch", "commit"],
                        "description": "Review git changes instead of paths"
                    },
                    "target": {
                        "type": "string",
                        "description": "Base branch for 'branch' mode, revision for 'commit' mode"
                    },
                    "format": {
                        "type": "string",
                        "enum": ["json", "markdown"],
                        "default": "json"
                    }
                }
            }),
        )
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        const NAME: &str = "review";
        let args: ReviewArgs = parse_args(NAME, args)?;
        let ctx = &self.0;

        let target = |what: &str| {
            args.target
                .clone()
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| ToolError::invalid(NAME, format!("'target' is required for {what} mode")))
        };
        let mode = match args.mode {
            None => None,
            Some(ReviewMode::Staged) => Some(GitMode::Staged),
            Some(ReviewMode::Unstaged) => Some(GitMode::Unstaged),
            Some(ReviewMode::Branch) => Some(GitMode::Branch(target("branch")?)),
            Some(ReviewMode::Commit) => Some(GitMode::Commit(target("commit")?)),
        };

        let result = match mode {
            Some(mode) => ctx.reviewer.review_git(&ctx.project_dir, &mode, &ctx.cancel).await,
            None => {
                let paths: Vec<PathBuf> = if args.paths.is_empty() {
                    vec![PathBuf::from(".")]
                } else {
                    args.paths.iter().map(PathBuf::from).collect()
                };
                ctx.reviewer
                    .review_paths(&paths, &ctx.project_dir, &ctx.cancel)
                    .await
            }
        };

        let report = result.map_err(|e| match e {
            ReviewError::MissingPath(_) => ToolError::invalid(NAME, e),
            other => ToolError::failed(NAME, other),
        })?;

        match args.format.as_deref() {
            Some("markdown") => Ok(Value::String(report.to_markdown())),
            _ => to_json(NAME, &report),
        }
    }
}

// ============================================================================
// get_applicable_skills
// ============================================================================

/// Skills and linked knowledge that apply to a file
pub struct ApplicableSkillsTool(Arc<ToolContext>);

#[async_trait]
impl ReviewTool for ApplicableSkillsTool {
    fn definition(&self) -> Tool {
        let description = format!(
            "List the skills that apply to a file, with the triggers that matched and the \
             knowledge they link.\n\nAvailable skills:\n{}",
            self.0.reviewer.skills().generate_skills_list()
        );
        tool_definition("get_applicable_skills", description, &file_schema(json!({})))
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        const NAME: &str = "get_applicable_skills";
        let args: FileArgs = parse_args(NAME, args)?;
        let (path, text) = self.0.source(NAME, &args).await?;

        let registry = self.0.reviewer.skills();
        let context = detect(&path, &text);
        let matches = registry.applicable(&context);
        let knowledge = registry.linked_knowledge(&matches, &[]);

        let skills: Vec<Value> = matches
            .iter()
            .map(|m| {
                json!({
                    "name": m.resource.name,
                    "description": registry.get(&m.resource.name).map(|s| s.description()),
                    "tier": m.resource.tier,
                    "path": m.resource.path,
                    "matched_triggers": m.matched_triggers,
                })
            })
            .collect();

        debug!("{} skill(s) apply to {}", skills.len(), path);
        Ok(json!({
            "file_path": path,
            "context": context,
            "skills": skills,
            "knowledge": knowledge,
        }))
    }
}

// ============================================================================
// get_knowledge
// ============================================================================

/// Knowledge file contents by name
pub struct KnowledgeTool(Arc<ToolContext>);

#[derive(Debug, Deserialize)]
struct KnowledgeArgs {
    names: Vec<String>,
}

#[async_trait]
impl ReviewTool for KnowledgeTool {
    fn definition(&self) -> Tool {
        tool_definition(
            "get_knowledge",
            "Load knowledge files by name (project overrides user overrides bundled). \
             Names without an extension get '.md'.",
            &json!({
                "type": "object",
                "properties": {
                    "names": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Knowledge file names, e.g. SECURITY.md"
                    }
                },
                "required": ["names"]
            }),
        )
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        const NAME: &str = "get_knowledge";
        let args: KnowledgeArgs = parse_args(NAME, args)?;
        let bundle = load_knowledge(&args.names, self.0.reviewer.roots())
            .map_err(|e| ToolError::failed(NAME, e))?;
        to_json(NAME, &bundle)
    }
}

// ============================================================================
// get_assertions
// ============================================================================

/// Merged assertion definitions with their origin and shadowed copies
pub struct AssertionsTool(Arc<ToolContext>);

#[derive(Debug, Deserialize)]
struct AssertionsArgs {
    #[serde(default)]
    id: Option<String>,
}

#[derive(Serialize)]
struct AssertionView<'a> {
    #[serde(flatten)]
    definition: &'a AssertionDefinition,
    set: &'a str,
    tier: Option<Tier>,
    source: Option<&'a Path>,
    shadowed: &'a [ShadowedDefinition],
}

impl AssertionsTool {
    fn view<'a>(&'a self, loaded: &'a LoadedAssertion) -> AssertionView<'a> {
        let set = self.0.reviewer.catalog().sets.get(loaded.set);
        AssertionView {
            definition: &loaded.definition,
            set: set.map_or("", |s| s.resource.name.as_str()),
            tier: set.and_then(|s| s.resource.tier),
            source: set.and_then(|s| s.resource.path.as_deref()),
            shadowed: &loaded.shadowed,
        }
    }
}

#[async_trait]
impl ReviewTool for AssertionsTool {
    fn definition(&self) -> Tool {
        tool_definition(
            "get_assertions",
            "List merged assertion definitions across project, user and bundled sets, \
             including which lower-tier definitions each one shadows.",
            &json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string", "description": "Return only this assertion"}
                }
            }),
        )
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        const NAME: &str = "get_assertions";
        let args: AssertionsArgs = parse_args(NAME, args)?;
        let catalog = self.0.reviewer.catalog();

        if let Some(id) = args.id {
            let loaded = catalog
                .get(&id)
                .ok_or_else(|| ToolError::invalid(NAME, format!("no assertion with id '{id}'")))?;
            return to_json(NAME, &self.view(loaded));
        }

        let assertions: Vec<AssertionView<'_>> = catalog.assertions.iter().map(|a| self.view(a)).collect();
        Ok(json!({
            "assertions": to_json(NAME, &assertions)?,
            "degraded": to_json(NAME, &catalog.degraded)?,
        }))
    }
}

// ============================================================================
// run_pattern_assertions
// ============================================================================

/// Pattern assertions against one file
pub struct PatternAssertionsTool(Arc<ToolContext>);

#[async_trait]
impl ReviewTool for PatternAssertionsTool {
    fn definition(&self) -> Tool {
        tool_definition(
            "run_pattern_assertions",
            "Run the pattern assertions that apply to a file. Inline 'crucible-ignore' \
             comments suppress findings on their line.",
            &file_schema(json!({})),
        )
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        const NAME: &str = "run_pattern_assertions";
        let args: FileArgs = parse_args(NAME, args)?;
        let (path, text) = self.0.source(NAME, &args).await?;

        let reviewer = &self.0.reviewer;
        let context = detect(&path, &text);
        let (findings, degraded) = reviewer.run_patterns(&path, &text, &context);
        let threshold = reviewer.settings().threshold_for(context.domain);
        let (summary, passed) = summarize(&findings, threshold);

        Ok(json!({
            "file_path": path,
            "context": context,
            "findings": to_json(NAME, &findings)?,
            "summary": summary,
            "threshold": threshold,
            "passed": passed,
            "degraded": to_json(NAME, &degraded)?,
        }))
    }
}

// ============================================================================
// run_semantic_assertions
// ============================================================================

/// Semantic assertions against one file under a token budget
pub struct SemanticAssertionsTool(Arc<ToolContext>);

#[derive(Debug, Deserialize)]
struct SemanticArgs {
    #[serde(flatten)]
    file: FileArgs,
    #[serde(default)]
    budget: Option<usize>,
}

#[async_trait]
impl ReviewTool for SemanticAssertionsTool {
    fn definition(&self) -> Tool {
        tool_definition(
            "run_semantic_assertions",
            "Run the semantic (LLM) assertions that apply to a file, highest priority first, \
             until the token budget is spent.",
            &file_schema(json!({
                "budget": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Estimated token budget (default from configuration)"
                }
            })),
        )
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        const NAME: &str = "run_semantic_assertions";
        let args: SemanticArgs = parse_args(NAME, args)?;
        let (path, text) = self.0.source(NAME, &args.file).await?;

        let reviewer = &self.0.reviewer;
        let budget = args
            .budget
            .unwrap_or(reviewer.settings().semantic.token_budget);
        let context = detect(&path, &text);

        match reviewer
            .run_semantic(&path, &text, &context, budget, &self.0.cancel)
            .await
        {
            Some((plan, report)) => Ok(json!({
                "file_path": path,
                "plan": to_json(NAME, &plan)?,
                "findings": to_json(NAME, &report.findings)?,
                "completed": report.completed,
                "degraded": to_json(NAME, &report.degraded)?,
            })),
            None => {
                let degraded = Degraded::new(
                    DegradedKind::Capability,
                    "semantic",
                    "no reasoning backend configured",
                );
                Ok(json!({
                    "file_path": path,
                    "plan": Value::Null,
                    "findings": [],
                    "completed": 0,
                    "degraded": [to_json(NAME, &degraded)?],
                }))
            }
        }
    }
}

// ============================================================================
// detect_domain
// ============================================================================

/// Domain classification of a file
pub struct DetectDomainTool(Arc<ToolContext>);

#[async_trait]
impl ReviewTool for DetectDomainTool {
    fn definition(&self) -> Tool {
        tool_definition(
            "detect_domain",
            "Classify a file as smart_contract, frontend, backend, infrastructure or unknown, \
             with the tags used to match skills and assertions.",
            &file_schema(json!({})),
        )
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        const NAME: &str = "detect_domain";
        let args: FileArgs = parse_args(NAME, args)?;
        // A file that does not exist yet is classified by its name alone
        let (path, text) = match self.0.source(NAME, &args).await {
            Ok(source) => source,
            Err(_) => (self.0.display_path(&args.file_path), String::new()),
        };

        let context = detect(&path, &text);
        Ok(json!({
            "file_path": path,
            "domain": context.domain,
            "tags": context.tags,
            "language": language_for_path(&path),
        }))
    }
}

// ============================================================================
// prewrite_review
// ============================================================================

/// Template-driven review of a spec or design document
pub struct PrewriteReviewTool(Arc<ToolContext>);

#[derive(Debug, Deserialize)]
struct PrewriteArgs {
    #[serde(flatten)]
    file: FileArgs,
    #[serde(default)]
    template: Option<String>,
    #[serde(default)]
    format: Option<String>,
}

#[async_trait]
impl ReviewTool for PrewriteReviewTool {
    fn definition(&self) -> Tool {
        tool_definition(
            "prewrite_review",
            "Review a spec, PRD or design document before implementation. Applies the named \
             template (or one detected from the content), runs assertions scoped 'prewrite' \
             and returns findings plus the template checklist.",
            &file_schema(json!({
                "template": {
                    "type": "string",
                    "description": "Template name, e.g. prd, tdd, rfc, adr (detected when omitted)"
                },
                "format": {
                    "type": "string",
                    "enum": ["json", "markdown"],
                    "default": "json"
                }
            })),
        )
    }

    async fn execute(&self, args: Value) -> Result<Value, ToolError> {
        const NAME: &str = "prewrite_review";
        let args: PrewriteArgs = parse_args(NAME, args)?;
        let (path, text) = self.0.source(NAME, &args.file).await?;

        let report = self
            .0
            .reviewer
            .review_prewrite(&path, &text, args.template.as_deref(), &self.0.cancel)
            .await
            .map_err(|e| match e {
                ReviewError::UnknownTemplate { .. } => ToolError::invalid(NAME, e),
                other => ToolError::failed(NAME, other),
            })?;

        match args.format.as_deref() {
            Some("markdown") => Ok(Value::String(report.to_markdown())),
            _ => to_json(NAME, &report),
        }
    }
}
