use crucible_provider::ProviderSettings;
use crucible_review::{DomainSettings, ReviewSettings, SemanticSettings};
use crucible_skills::CascadeRoots;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

/// Built-in defaults, the lowest configuration layer
const DEFAULT_CONFIG: &str = r#"
[paths]
project = ".crucible"
user = "~/.claude/crucible"
bundled = ""  # Empty: $CRUCIBLE_BUNDLED_DIR, else <data dir>/crucible

[review]
fail_on = "high"  # critical, high, medium, low, info
include_context = false
context_lines = 3
exclude = []
git_timeout_secs = 30

[semantic]
enabled = false
token_budget = 50000
timeout_secs = 60
concurrency = 4

[provider]
default = "openai"  # or "ollama"

[provider.openai]
api_key = ""  # Set via OPENAI_API_KEY env var
model = "gpt-4o-mini"

[provider.ollama]
base_url = "http://localhost:11434"
model = "llama3"

[logging]
level = "warn"  # trace, debug, info, warn, error
json = false
"#;

/// File name of the configuration file at the user and project layers
const CONFIG_FILE: &str = "crucible.toml";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PathsConfig {
    pub project: String,
    pub user: String,
    pub bundled: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub review: ReviewSettings,
    #[serde(default)]
    pub domains: BTreeMap<String, DomainSettings>,
    pub semantic: SemanticSettings,
    pub provider: ProviderSettings,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Get the global config path: ~/.claude/crucible/crucible.toml
    fn global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(".claude").join("crucible").join(CONFIG_FILE))
    }

    /// Load configuration with layered approach:
    /// 1. Built-in defaults
    /// 2. Global config: ~/.claude/crucible/crucible.toml (optional)
    /// 3. Project config: <project>/.crucible/crucible.toml (optional)
    /// 4. Environment variables with CRUCIBLE__ prefix
    /// 5. Convenience variables (highest priority)
    pub fn load(project_dir: &Path) -> anyhow::Result<Self> {
        // Load .env file from the project directory
        dotenvy::from_path(project_dir.join(".env")).ok();

        Self::from_layers(project_dir, Self::global_config_path(), true)
    }

    fn from_layers(
        project_dir: &Path,
        global_config_path: Option<PathBuf>,
        read_env: bool,
    ) -> anyhow::Result<Self> {
        // Later sources override earlier ones
        let mut config_builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml));

        if let Some(path) = global_config_path {
            config_builder = config_builder.add_source(config::File::from(path).required(false));
        }

        config_builder = config_builder.add_source(
            config::File::from(project_dir.join(".crucible").join(CONFIG_FILE)).required(false),
        );

        if read_env {
            config_builder = config_builder.add_source(
                config::Environment::with_prefix("CRUCIBLE")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("review.exclude"),
            );

            if let Ok(key) = env::var("OPENAI_API_KEY") {
                config_builder = config_builder.set_override("provider.openai.api_key", key)?;
            }

            if let Ok(url) = env::var("OPENAI_BASE_URL") {
                config_builder = config_builder.set_override("provider.openai.base_url", url)?;
            }

            if let Ok(url) = env::var("OLLAMA_BASE_URL") {
                config_builder = config_builder.set_override("provider.ollama.base_url", url)?;
            }

            if let Ok(dir) = env::var("CRUCIBLE_BUNDLED_DIR") {
                config_builder = config_builder.set_override("paths.bundled", dir)?;
            }
        }

        let config: Self = config_builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Cascade roots, with relative paths taken from `project_dir`
    pub fn roots(&self, project_dir: &Path) -> CascadeRoots {
        let anchor = |path: PathBuf| {
            if path.is_absolute() {
                path
            } else {
                project_dir.join(path)
            }
        };

        let bundled = match self.paths.bundled.trim() {
            "" => dirs::data_dir()
                .unwrap_or_else(|| project_dir.to_path_buf())
                .join("crucible"),
            dir => anchor(expand_home(dir)),
        };

        CascadeRoots::new(
            anchor(expand_home(&self.paths.project)),
            anchor(expand_home(&self.paths.user)),
            bundled,
        )
    }

    /// Review settings with the domain and semantic sections folded in
    pub fn review_settings(&self) -> ReviewSettings {
        let mut settings = self.review.clone();
        settings.domains = self.domains.clone();
        settings.semantic = self.semantic.clone();
        settings
    }

    /// Copy safe to print: API keys are masked
    pub fn redacted(&self) -> Self {
        let mut config = self.clone();
        if !config.provider.openai.api_key.is_empty() {
            config.provider.openai.api_key = "********".to_string();
        }
        config
    }
}

/// Expand a leading `~` to the home directory
fn expand_home(path: &str) -> PathBuf {
    let home = dirs::home_dir();
    match (path.strip_prefix('~'), home) {
        (Some(""), Some(home)) => home,
        (Some(rest), Some(home)) if rest.starts_with('/') => home.join(&rest[1..]),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crucible_provider::ProviderKind;
    use crucible_types::{Domain, Severity};
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::from_layers(dir.path(), None, false).unwrap();

        assert_eq!(config.review.fail_on, Severity::High);
        assert_eq!(config.review.context_lines, 3);
        assert!(!config.semantic.enabled);
        assert_eq!(config.semantic.token_budget, 50000);
        assert_eq!(config.provider.default, ProviderKind::OpenAI);
        assert_eq!(config.provider.default_model(), "gpt-4o-mini");

        let roots = config.roots(dir.path());
        assert_eq!(roots.project, dir.path().join(".crucible"));
        assert!(roots.bundled.ends_with("crucible"));
    }

    #[test]
    fn test_project_layer_overrides_global() {
        let dir = TempDir::new().unwrap();
        let global = dir.path().join("global.toml");
        fs::write(&global, "[review]\nfail_on = \"low\"\ncontext_lines = 9\n").unwrap();

        fs::create_dir_all(dir.path().join(".crucible")).unwrap();
        fs::write(
            dir.path().join(".crucible/crucible.toml"),
            "[review]\nfail_on = \"critical\"\n\n[domains.smart_contract]\nfail_on = \"medium\"\n\n[paths]\nbundled = \"vendor/crucible\"\n",
        )
        .unwrap();

        let config = AppConfig::from_layers(dir.path(), Some(global), false).unwrap();
        assert_eq!(config.review.fail_on, Severity::Critical);
        assert_eq!(config.review.context_lines, 9);

        let settings = config.review_settings();
        assert_eq!(settings.threshold_for(Domain::SmartContract), Severity::Medium);
        assert_eq!(settings.threshold_for(Domain::Backend), Severity::Critical);

        let roots = config.roots(dir.path());
        assert_eq!(roots.bundled, dir.path().join("vendor/crucible"));
    }

    #[test]
    fn test_redacted_masks_key() {
        let dir = TempDir::new().unwrap();
        let mut config = AppConfig::from_layers(dir.path(), None, false).unwrap();
        config.provider.openai.api_key = "sk-secret".into();

        let shown = toml::to_string_pretty(&config.redacted()).unwrap();
        assert!(!shown.contains("sk-secret"));
        assert!(shown.contains("********"));
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_home("rel"), PathBuf::from("rel"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/.claude"), home.join(".claude"));
            assert_eq!(expand_home("~"), home);
        }
    }
}
