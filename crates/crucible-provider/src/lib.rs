//! LLM reasoning capability for semantic assertions
//!
//! Sends one compliance question per request to an OpenAI-compatible chat API
//! (OpenAI itself or a local Ollama server) and reads back a JSON verdict.

mod settings;

pub use settings::{OllamaSettings, OpenAISettings, ProviderKind, ProviderSettings};

use async_openai::types::chat::{
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use crucible_enforcement::{
    parse_verdict, CapabilityError, ComplianceRequest, ReasoningCapability, Verdict,
};
use tracing::{debug, info, warn};

const SYSTEM_PROMPT: &str = "You are a code compliance checker. \
You receive a file and one compliance requirement. Decide whether the file violates the requirement. \
Respond with a single JSON object and nothing else: \
{\"violated\": true|false, \"explanation\": \"<one or two sentences>\", \"line\": <line number or null>}";

/// Default Ollama endpoint (OpenAI-compatible API)
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Reasoning capability backed by a chat-completion API
pub struct LlmReasoner {
    client: Client<OpenAIConfig>,
    settings: ProviderSettings,
}

impl LlmReasoner {
    /// Create a reasoner for the configured default provider
    pub fn new(settings: ProviderSettings) -> Result<Self, CapabilityError> {
        let config = match settings.default {
            ProviderKind::OpenAI => {
                if settings.openai.api_key.trim().is_empty() {
                    return Err(CapabilityError::Unavailable(
                        "OpenAI API key not set (OPENAI_API_KEY)".to_string(),
                    ));
                }
                let mut config = OpenAIConfig::new().with_api_key(settings.openai.api_key.clone());
                if let Some(base) = settings.openai.base_url.as_deref().filter(|b| !b.is_empty()) {
                    config = config.with_api_base(base);
                }
                config
            }
            ProviderKind::Ollama => {
                let base = match settings.ollama.base_url.trim() {
                    "" => DEFAULT_OLLAMA_URL,
                    url => url,
                };
                OpenAIConfig::new()
                    .with_api_base(ollama_api_base(base))
                    .with_api_key("ollama")
            }
        };

        if settings.default_model().is_empty() {
            return Err(CapabilityError::Unavailable(format!(
                "no model configured for provider {:?}",
                settings.default
            )));
        }

        info!(
            "LLM reasoner initialized with {:?} ({})",
            settings.default,
            settings.default_model()
        );
        Ok(Self {
            client: Client::with_config(config),
            settings,
        })
    }

    async fn complete(&self, model: &str, user_prompt: String) -> Result<String, CapabilityError> {
        let request_err = |e: async_openai::error::OpenAIError| CapabilityError::Request(e.to_string());

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(SYSTEM_PROMPT)
                .build()
                .map_err(request_err)?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_prompt)
                .build()
                .map_err(request_err)?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .build()
            .map_err(request_err)?;

        let response = self.client.chat().create(request).await.map_err(request_err)?;

        match response.choices.first() {
            Some(choice) => Ok(choice.message.content.clone().unwrap_or_default()),
            None => {
                warn!("{:?} returned no choices", self.settings.default);
                Err(CapabilityError::Malformed("response had no choices".to_string()))
            }
        }
    }
}

#[async_trait]
impl ReasoningCapability for LlmReasoner {
    async fn submit(&self, request: &ComplianceRequest) -> Result<Verdict, CapabilityError> {
        let model = self.settings.model_for(request.model_hint.as_deref()).to_string();
        debug!(
            "Checking '{}' on {} with {}",
            request.assertion_id, request.file_path, model
        );
        let raw = self.complete(&model, build_user_prompt(request)).await?;
        parse_verdict(&raw)
    }
}

/// User message for one compliance check, with line numbers on the code
pub fn build_user_prompt(request: &ComplianceRequest) -> String {
    let numbered: String = request
        .text
        .lines()
        .enumerate()
        .map(|(i, line)| format!("{:>5} | {}\n", i + 1, line))
        .collect();
    format!(
        "Requirement ({}):\n{}\n\nFile: {}\n```\n{}```",
        request.assertion_id,
        request.prompt.trim(),
        request.file_path,
        numbered
    )
}

/// Ollama serves the OpenAI-compatible API under `/v1`
fn ollama_api_base(base: &str) -> String {
    let base = base.trim_end_matches('/');
    if base.ends_with("/v1") {
        base.to_string()
    } else {
        format!("{base}/v1")
    }
}
