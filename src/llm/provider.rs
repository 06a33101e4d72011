use std::sync::Arc;

use async_trait::async_trait;

use crate::config::LLMConfig;
use crate::llm::openai::OpenAICompatibleAdapter;
use crate::types::{AppError, AppResult, LLMMessage, LLMRequest, LLMResponse};

#[async_trait]
pub trait LLMAdapter: Send + Sync {
    async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse>;
}

/// Answer generator shared by the retrieval service and the summary pipeline
#[derive(Clone)]
pub struct LLM {
    adapter: Arc<dyn LLMAdapter>,
    provider_name: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl LLM {
    /// Build the configured provider. Returns `None` when no API key is set.
    pub fn from_config(config: &LLMConfig) -> AppResult<Option<Self>> {
        let Some(api_key) = config.active_api_key() else {
            return Ok(None);
        };

        let api_base = match (&config.api_base, config.provider.api_base()) {
            (Some(base), _) => base.clone(),
            (None, Some(base)) => base.to_string(),
            (None, None) => {
                return Err(AppError::InvalidRequest(format!(
                    "LLM provider '{}' requires LLM_API_BASE",
                    config.provider
                )))
            }
        };

        let adapter = OpenAICompatibleAdapter::new(&api_key, &api_base);
        Ok(Some(Self {
            adapter: Arc::new(adapter),
            provider_name: config.provider.to_string(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }))
    }

    pub fn with_adapter(adapter: Arc<dyn LLMAdapter>, model: impl Into<String>) -> Self {
        Self {
            adapter,
            provider_name: "custom".to_string(),
            model: model.into(),
            temperature: 0.3,
            max_tokens: 2500,
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    pub async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
        self.adapter.create_chat_completion(request).await
    }

    /// Single-turn completion with the configured model and sampling settings
    pub async fn complete(&self, system_prompt: &str, user_prompt: &str) -> AppResult<String> {
        self.complete_with_limit(system_prompt, user_prompt, self.max_tokens).await
    }

    pub async fn complete_with_limit(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> AppResult<String> {
        let request = LLMRequest {
            model: self.model.clone(),
            messages: vec![LLMMessage::user(user_prompt)],
            max_tokens: Some(max_tokens),
            temperature: Some(self.temperature),
            system_instruction: Some(system_prompt.to_string()),
        };

        let response = self.create_chat_completion(&request).await?;
        tracing::debug!(
            provider = %self.provider_name,
            model = %self.model,
            total_tokens = response.usage.total_tokens,
            finish_reason = %response.finish_reason,
            "LLM completion finished"
        );
        Ok(response.content)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::types::TokenUsage;

    /// Scripted adapter: replies in order, repeating the last reply once exhausted
    pub struct ScriptedAdapter {
        replies: Vec<AppResult<String>>,
        pub calls: AtomicUsize,
        pub requests: Mutex<Vec<LLMRequest>>,
    }

    impl ScriptedAdapter {
        pub fn new(replies: Vec<AppResult<String>>) -> Self {
            Self {
                replies,
                calls: AtomicUsize::new(0),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn replying(text: &str) -> Self {
            Self::new(vec![Ok(text.to_string())])
        }

        pub fn failing(message: &str) -> Self {
            Self::new(vec![Err(AppError::LLMApi(message.to_string()))])
        }
    }

    #[async_trait]
    impl LLMAdapter for ScriptedAdapter {
        async fn create_chat_completion(&self, request: &LLMRequest) -> AppResult<LLMResponse> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request.clone());
            let reply = &self.replies[call.min(self.replies.len() - 1)];
            match reply {
                Ok(content) => Ok(LLMResponse {
                    content: content.clone(),
                    finish_reason: "stop".to_string(),
                    usage: TokenUsage::default(),
                }),
                Err(e) => Err(AppError::LLMApi(e.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptedAdapter;
    use super::*;
    use crate::types::LLMProvider;

    fn llm_config(provider: LLMProvider, key: &str, base: Option<&str>) -> LLMConfig {
        LLMConfig {
            provider,
            api_key: key.to_string(),
            api_base: base.map(str::to_string),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            max_tokens: 2500,
        }
    }

    #[test]
    fn test_from_config_without_key_is_none() {
        let config = llm_config(LLMProvider::OpenAI, "", None);
        assert!(LLM::from_config(&config).unwrap().is_none());
    }

    #[test]
    fn test_custom_provider_needs_base() {
        let config = llm_config(LLMProvider::Custom, "key", None);
        assert!(LLM::from_config(&config).is_err());

        let config = llm_config(LLMProvider::Custom, "key", Some("http://localhost:8000/v1"));
        let llm = LLM::from_config(&config).unwrap().unwrap();
        assert_eq!(llm.provider_name(), "custom");
    }

    #[tokio::test]
    async fn test_complete_sends_system_instruction() {
        let adapter = Arc::new(ScriptedAdapter::replying("summary"));
        let llm = LLM::with_adapter(adapter.clone(), "test-model");

        let text = llm.complete("be careful", "summarize").await.unwrap();
        assert_eq!(text, "summary");

        let requests = adapter.requests.lock().unwrap();
        assert_eq!(requests[0].model, "test-model");
        assert_eq!(requests[0].system_instruction.as_deref(), Some("be careful"));
        assert_eq!(requests[0].messages, vec![LLMMessage::user("summarize")]);
    }
}
