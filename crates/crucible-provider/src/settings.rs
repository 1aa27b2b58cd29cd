use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which backend answers compliance questions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAI,
    Ollama,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAISettings {
    pub api_key: String,
    pub model: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaSettings {
    pub base_url: String,
    pub model: String,
}

/// `[provider]` configuration section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    pub default: ProviderKind,
    pub openai: OpenAISettings,
    pub ollama: OllamaSettings,
    /// Assertion model hints (e.g. `opus`, `fast`) mapped to concrete model names
    pub models: BTreeMap<String, String>,
}

impl ProviderSettings {
    /// Model configured for the active provider
    pub fn default_model(&self) -> &str {
        match self.default {
            ProviderKind::OpenAI => &self.openai.model,
            ProviderKind::Ollama => &self.ollama.model,
        }
    }

    /// Model for an assertion hint, falling back to the provider default
    pub fn model_for(&self, hint: Option<&str>) -> &str {
        hint.map(|h| h.trim().to_lowercase())
            .and_then(|h| self.models.get(&h))
            .map(String::as_str)
            .unwrap_or_else(|| self.default_model())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_for_hint() {
        let mut settings = ProviderSettings {
            openai: OpenAISettings {
                model: "gpt-4o-mini".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        settings.models.insert("opus".into(), "gpt-4o".into());

        assert_eq!(settings.model_for(Some("Opus")), "gpt-4o");
        assert_eq!(settings.model_for(Some("haiku")), "gpt-4o-mini");
        assert_eq!(settings.model_for(None), "gpt-4o-mini");
    }
}
