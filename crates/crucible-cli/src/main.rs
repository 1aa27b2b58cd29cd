mod config;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use config::AppConfig;
use crucible_enforcement::AssertionCatalog;
use crucible_mcp::{create_default_tools, CrucibleServer, ToolContext};
use crucible_provider::LlmReasoner;
use crucible_review::{
    hook_status, install_hook, repo_root, uninstall_hook, GitMode, HookInstall, HookStatus, ReviewError,
    ReviewReport, Reviewer,
};
use crucible_skills::cascade::{init_resource, install_resources, list_all, inspect_tiers, resolve};
use crucible_skills::CascadeRoots;
use crucible_types::{Degraded, ResourceKind, Severity};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Exit status for a review that failed its threshold or a set that failed validation
const EXIT_FAILED: u8 = 1;
/// Exit status for configuration, cascade and I/O errors
const EXIT_ERROR: u8 = 2;

#[derive(Debug, Parser)]
#[command(name = "crucible", version, about = "Cascading skills, knowledge and assertions for code review")]
struct Cli {
    /// Project directory (defaults to the current directory)
    #[arg(long, global = true, value_name = "DIR")]
    project: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Manage skills
    Skills {
        #[command(subcommand)]
        action: ResourceAction,
    },
    /// Manage knowledge files
    Knowledge {
        #[command(subcommand)]
        action: ResourceAction,
    },
    /// Manage templates
    Templates {
        #[command(subcommand)]
        action: ResourceAction,
    },
    /// Inspect and validate assertion sets
    Assertions {
        #[command(subcommand)]
        action: AssertionsAction,
    },
    /// Review files or git changes
    Review(ReviewArgs),
    /// Review a spec or design document against a template
    Prewrite(PrewriteArgs),
    /// Review staged changes; used by the installed git hook
    PreCommit {
        /// Lowest severity that blocks the commit
        #[arg(long, value_name = "SEVERITY")]
        fail_on: Option<Severity>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage the git pre-commit hook
    Hooks {
        #[command(subcommand)]
        action: HooksAction,
    },
    /// Serve the review tools over MCP on stdio
    Mcp,
    /// Show the effective configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
enum ResourceAction {
    /// List resources across all tiers
    List,
    /// Print the active copy of a resource
    Show { name: String },
    /// Copy a user or bundled resource into the project
    Init {
        name: String,
        /// Overwrite an existing project copy
        #[arg(long)]
        force: bool,
    },
    /// Copy every bundled resource into the user directory
    Install {
        /// Replace existing user copies
        #[arg(long)]
        force: bool,
    },
}

#[derive(Debug, Subcommand)]
enum HooksAction {
    /// Install the pre-commit hook
    Install {
        /// Replace a hook crucible did not write
        #[arg(long)]
        force: bool,
    },
    /// Remove the pre-commit hook
    Uninstall,
    /// Show whether the hook is installed
    Status,
}

#[derive(Debug, Subcommand)]
enum AssertionsAction {
    /// List merged assertions
    List,
    /// Show the assertions of one set (name or path)
    Show { file: String },
    /// Validate assertion sets; all tiers when no files are given
    Validate { files: Vec<PathBuf> },
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Print the merged configuration as TOML
    Show,
}

#[derive(Debug, Args)]
struct ReviewArgs {
    /// Files or directories (defaults to the project directory)
    #[arg(conflicts_with = "mode")]
    paths: Vec<PathBuf>,

    /// Review staged changes
    #[arg(long, group = "mode")]
    staged: bool,

    /// Review unstaged changes
    #[arg(long, group = "mode")]
    unstaged: bool,

    /// Review changes on HEAD since it diverged from BASE
    #[arg(long, group = "mode", value_name = "BASE")]
    branch: Option<String>,

    /// Review a single commit
    #[arg(long, group = "mode", value_name = "REV")]
    commit: Option<String>,

    /// Lowest severity that fails the review, for every domain
    #[arg(long, value_name = "SEVERITY")]
    fail_on: Option<Severity>,

    /// Run semantic assertions through the configured provider
    #[arg(long)]
    semantic: bool,

    /// Token budget for semantic assertions, shared by every reviewed file
    #[arg(long, value_name = "TOKENS")]
    budget: Option<usize>,

    /// Keep findings near changed lines, not only on them
    #[arg(long)]
    include_context: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct PrewriteArgs {
    /// Document to review
    file: PathBuf,

    /// Template name (detected from the document when omitted)
    #[arg(long)]
    template: Option<String>,

    /// Lowest severity that fails the review
    #[arg(long, value_name = "SEVERITY")]
    fail_on: Option<Severity>,

    /// Run semantic assertions through the configured provider
    #[arg(long)]
    semantic: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

/// Command-line adjustments to the configured review settings
#[derive(Debug, Default)]
struct Overrides {
    fail_on: Option<Severity>,
    semantic: bool,
    budget: Option<usize>,
    include_context: bool,
}

impl ReviewArgs {
    fn overrides(&self) -> Overrides {
        Overrides {
            fail_on: self.fail_on,
            semantic: self.semantic,
            budget: self.budget,
            include_context: self.include_context,
        }
    }

    fn git_mode(&self) -> Option<GitMode> {
        if self.staged {
            Some(GitMode::Staged)
        } else if self.unstaged {
            Some(GitMode::Unstaged)
        } else if let Some(base) = &self.branch {
            Some(GitMode::Branch(base.clone()))
        } else {
            self.commit.clone().map(GitMode::Commit)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let project_dir = match cli.project {
        Some(dir) => dir,
        None => std::env::current_dir().context("Could not read current directory")?,
    };

    // Load configuration
    let config = AppConfig::load(&project_dir)?;
    crucible_logging::init_logging(&config.logging.level, config.logging.json)?;
    let roots = config.roots(&project_dir);
    info!(
        "Cascade roots: project={}, user={}, bundled={}",
        roots.project.display(),
        roots.user.display(),
        roots.bundled.display()
    );

    match cli.command {
        Command::Skills { action } => resource_command(ResourceKind::Skill, action, &roots),
        Command::Knowledge { action } => resource_command(ResourceKind::Knowledge, action, &roots),
        Command::Templates { action } => resource_command(ResourceKind::Template, action, &roots),
        Command::Assertions { action } => assertions_command(action, &roots, &project_dir),
        Command::Review(args) => review_command(args, &config, roots, &project_dir).await,
        Command::Prewrite(args) => prewrite_command(args, &config, roots, &project_dir).await,
        Command::PreCommit { fail_on, json } => {
            let overrides = Overrides {
                fail_on,
                ..Overrides::default()
            };
            let reviewer = build_reviewer(&config, roots, Some(overrides))?;
            let report = reviewer
                .review_git(&project_dir, &GitMode::Staged, &cancel_on_interrupt())
                .await?;
            print_report(&report, json)
        }
        Command::Hooks { action } => hooks_command(action, &config, &project_dir).await,
        Command::Mcp => mcp_command(&config, roots, project_dir).await,
        Command::Config {
            action: ConfigAction::Show,
        } => {
            print!("{}", toml::to_string_pretty(&config.redacted())?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn resource_command(kind: ResourceKind, action: ResourceAction, roots: &CascadeRoots) -> Result<ExitCode> {
    match action {
        ResourceAction::List => {
            let entries = list_all(kind, roots)?;
            if entries.is_empty() {
                eprintln!("No {kind} resources found");
            }
            for entry in entries {
                let tier = entry.resource.tier.map(|t| t.as_str()).unwrap_or("-");
                let overrides: Vec<&str> = entry.shadowed.iter().map(|s| s.tier.as_str()).collect();
                if overrides.is_empty() {
                    println!("{:<32} {}", entry.resource.name, tier);
                } else {
                    println!(
                        "{:<32} {} (overrides {})",
                        entry.resource.name,
                        tier,
                        overrides.join(", ")
                    );
                }
            }
        }
        ResourceAction::Show { name } => {
            let Some(resource) = resolve(kind, &name, roots)? else {
                bail!("{kind} '{name}' not found in any tier");
            };
            for tier in inspect_tiers(kind, &name, roots)? {
                let state = match (tier.exists, tier.active) {
                    (true, true) => "active",
                    (true, false) => "shadowed",
                    _ => "absent",
                };
                eprintln!("{:<8} {:<9} {}", tier.tier.as_str(), state, tier.path.display());
            }
            let path = resource
                .path
                .with_context(|| format!("{kind} '{name}' has no path"))?;
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            print!("{content}");
        }
        ResourceAction::Install { force } => {
            let outcomes = install_resources(kind, roots, force)?;
            if outcomes.is_empty() {
                eprintln!("No bundled {kind} resources to install");
            }
            for outcome in outcomes {
                let state = if outcome.installed { "installed" } else { "exists" };
                println!("{:<32} {:<9} {}", outcome.name, state, outcome.destination.display());
            }
        }
        ResourceAction::Init { name, force } => {
            let outcome = init_resource(kind, &name, roots, force)?;
            println!(
                "Copied {} {} -> {}",
                outcome.source_tier,
                outcome.source.display(),
                outcome.destination.display()
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn assertions_command(action: AssertionsAction, roots: &CascadeRoots, project_dir: &Path) -> Result<ExitCode> {
    match action {
        AssertionsAction::List => {
            let catalog = AssertionCatalog::load(roots)?;
            print_assertions(&catalog);
            print_degraded(&catalog.degraded);
            Ok(ExitCode::SUCCESS)
        }
        AssertionsAction::Show { file } => {
            let path = assertion_file(&file, roots, project_dir)?;
            let catalog = AssertionCatalog::load_files(&[path])?;
            print_assertions(&catalog);
            print_degraded(&catalog.degraded);
            Ok(ExitCode::SUCCESS)
        }
        AssertionsAction::Validate { files } => {
            let catalog = if files.is_empty() {
                AssertionCatalog::load(roots)?
            } else {
                let files: Vec<PathBuf> = files.iter().map(|f| project_dir.join(f)).collect();
                AssertionCatalog::load_files(&files)?
            };

            if catalog.degraded.is_empty() {
                println!(
                    "OK: {} assertion(s) in {} set(s)",
                    catalog.assertions.len(),
                    catalog.sets.len()
                );
                Ok(ExitCode::SUCCESS)
            } else {
                for degraded in &catalog.degraded {
                    println!("ERROR {}: {}", degraded.item, degraded.reason);
                }
                Ok(ExitCode::from(EXIT_FAILED))
            }
        }
    }
}

/// An existing path, or an assertion-set name resolved through the cascade
fn assertion_file(file: &str, roots: &CascadeRoots, project_dir: &Path) -> Result<PathBuf> {
    let direct = project_dir.join(file);
    if direct.is_file() {
        return Ok(direct);
    }
    resolve(ResourceKind::AssertionSet, file, roots)?
        .and_then(|resource| resource.path)
        .with_context(|| format!("Assertion set '{file}' not found"))
}

fn print_assertions(catalog: &AssertionCatalog) {
    for loaded in &catalog.assertions {
        let definition = &loaded.definition;
        let source = catalog
            .sets
            .get(loaded.set)
            .map(|set| match set.resource.tier {
                Some(tier) => format!("{} [{}]", set.resource.name, tier),
                None => set.resource.name.clone(),
            })
            .unwrap_or_default();
        println!(
            "{:<28} {:<8} {:<8} {:<8} {}",
            definition.id,
            definition.kind.to_string(),
            definition.severity.as_str(),
            definition.priority.as_str(),
            source
        );
        if !definition.message.is_empty() {
            println!("    {}", definition.message);
        }
    }
}

fn print_degraded(degraded: &[Degraded]) {
    for d in degraded {
        eprintln!("warning: {}: {}", d.item, d.reason);
    }
}

/// Build a reviewer, attaching the LLM backend when it can be configured
///
/// `None` keeps the configured settings and always tries the backend.
fn build_reviewer(config: &AppConfig, roots: CascadeRoots, overrides: Option<Overrides>) -> Result<Reviewer> {
    let mut settings = config.review_settings();
    let explicit = overrides.is_some();
    if let Some(args) = overrides {
        if let Some(threshold) = args.fail_on {
            settings.override_threshold(threshold);
        }
        settings.include_context |= args.include_context;
        settings.semantic.enabled |= args.semantic;
        if let Some(budget) = args.budget {
            settings.semantic.token_budget = budget;
        }
    }
    let want_backend = !explicit || settings.semantic.enabled;

    let reviewer = Reviewer::new(roots, settings)?;
    if !want_backend {
        return Ok(reviewer);
    }

    match LlmReasoner::new(config.provider.clone()) {
        Ok(reasoner) => Ok(reviewer.with_capability(Arc::new(reasoner))),
        Err(e) => {
            warn!("Semantic assertions unavailable: {}", e);
            Ok(reviewer)
        }
    }
}

/// Cancel the token on Ctrl-C
fn cancel_on_interrupt() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing in-flight work");
            token.cancel();
        }
    });
    cancel
}

async fn review_command(
    args: ReviewArgs,
    config: &AppConfig,
    roots: CascadeRoots,
    project_dir: &Path,
) -> Result<ExitCode> {
    let reviewer = build_reviewer(config, roots, Some(args.overrides()))?;
    let cancel = cancel_on_interrupt();

    let report: ReviewReport = match args.git_mode() {
        Some(mode) => reviewer.review_git(project_dir, &mode, &cancel).await?,
        None => {
            let paths = if args.paths.is_empty() {
                vec![project_dir.to_path_buf()]
            } else {
                args.paths.clone()
            };
            reviewer.review_paths(&paths, project_dir, &cancel).await?
        }
    };

    print_report(&report, args.json)
}

fn print_report(report: &ReviewReport, json: bool) -> Result<ExitCode> {
    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.to_markdown());
    }
    Ok(verdict(report.passed))
}

fn verdict(passed: bool) -> ExitCode {
    if passed {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILED)
    }
}

async fn prewrite_command(
    args: PrewriteArgs,
    config: &AppConfig,
    roots: CascadeRoots,
    project_dir: &Path,
) -> Result<ExitCode> {
    let path = project_dir.join(&args.file);
    let text = std::fs::read_to_string(&path).with_context(|| format!("Failed to read {}", path.display()))?;

    let overrides = Overrides {
        fail_on: args.fail_on,
        semantic: args.semantic,
        ..Overrides::default()
    };
    let reviewer = build_reviewer(config, roots, Some(overrides))?;
    let display = args.file.to_string_lossy();
    let report = reviewer
        .review_prewrite(&display, &text, args.template.as_deref(), &cancel_on_interrupt())
        .await?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.to_markdown());
    }
    Ok(verdict(report.passed))
}

async fn hooks_command(action: HooksAction, config: &AppConfig, project_dir: &Path) -> Result<ExitCode> {
    let timeout = Duration::from_secs(config.review_settings().git_timeout_secs);
    let repo = repo_root(project_dir, timeout)
        .await
        .context("Hooks need a git repository")?;

    match action {
        HooksAction::Install { force } => match install_hook(&repo, force) {
            Ok(HookInstall::Written) => println!("Installed pre-commit hook in {}", repo.display()),
            Ok(HookInstall::AlreadyInstalled) => println!("Pre-commit hook already installed"),
            Err(e @ ReviewError::ForeignHook(_)) => {
                eprintln!("error: {e}");
                return Ok(ExitCode::from(EXIT_FAILED));
            }
            Err(e) => return Err(e.into()),
        },
        HooksAction::Uninstall => {
            if uninstall_hook(&repo)? {
                println!("Removed pre-commit hook");
            } else {
                println!("No pre-commit hook installed");
            }
        }
        HooksAction::Status => {
            let state = match hook_status(&repo)? {
                HookStatus::Installed => "installed",
                HookStatus::Foreign => "exists (not crucible)",
                HookStatus::Absent => "not installed",
            };
            println!("pre-commit: {state}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

async fn mcp_command(config: &AppConfig, roots: CascadeRoots, project_dir: PathBuf) -> Result<ExitCode> {
    let reviewer = build_reviewer(config, roots, None)?;
    let context = Arc::new(ToolContext {
        reviewer: Arc::new(reviewer),
        project_dir,
        cancel: cancel_on_interrupt(),
    });

    CrucibleServer::new(create_default_tools(&context))
        .serve_stdio()
        .await?;
    Ok(ExitCode::SUCCESS)
}
