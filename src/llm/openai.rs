//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；OpenAI、DeepSeek、Groq 及自建代理共用，
//! Azure OpenAI 走 AzureConfig（deployment + api-version）。
//! 每次请求外包 tokio 超时；结构化输出沿用 trait 默认实现（格式说明写入 prompt + 提取 JSON）。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::{AzureConfig, Config, OpenAIConfig};
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::{LlmClient, LlmError, Message, Role};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// 采样参数与超时
#[derive(Debug, Clone)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub timeout: Duration,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: None,
            timeout: Duration::from_secs(60),
        }
    }
}

/// OpenAI 兼容客户端：持有 Client、model 名与采样参数，complete 时转 Message 为 API 格式并取首条 content
pub struct OpenAiClient<C: Config = OpenAIConfig> {
    client: Client<C>,
    model: String,
    params: GenerationParams,
    pub usage: TokenUsage,
}

impl OpenAiClient<OpenAIConfig> {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str, params: GenerationParams) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(url) = base_url {
            config = config.with_api_base(url);
        }
        Self::with_config(config, model, params)
    }
}

impl OpenAiClient<AzureConfig> {
    /// Azure OpenAI：endpoint 形如 `https://<resource>.openai.azure.com`，model 即 deployment 名
    pub fn azure(
        endpoint: &str,
        deployment: &str,
        api_version: &str,
        api_key: &str,
        params: GenerationParams,
    ) -> Self {
        let config = AzureConfig::new()
            .with_api_base(endpoint)
            .with_deployment_id(deployment)
            .with_api_version(api_version)
            .with_api_key(api_key);
        Self::with_config(config, deployment, params)
    }
}

impl<C: Config> OpenAiClient<C> {
    pub fn with_config(config: C, model: &str, params: GenerationParams) -> Self {
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            params,
            usage: TokenUsage::default(),
        }
    }

    fn to_openai_messages(
        &self,
        messages: &[Message],
    ) -> Result<Vec<ChatCompletionRequestMessage>, LlmError> {
        let build_err = |e: async_openai::error::OpenAIError| LlmError::Request(e.to_string());
        messages
            .iter()
            .map(|m| {
                Ok(match m.role {
                    Role::System => ChatCompletionRequestMessage::System(
                        ChatCompletionRequestSystemMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(build_err)?,
                    ),
                    Role::User => ChatCompletionRequestMessage::User(
                        ChatCompletionRequestUserMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(build_err)?,
                    ),
                    Role::Assistant => ChatCompletionRequestMessage::Assistant(
                        ChatCompletionRequestAssistantMessageArgs::default()
                            .content(m.content.clone())
                            .build()
                            .map_err(build_err)?,
                    ),
                })
            })
            .collect()
    }
}

#[async_trait]
impl<C: Config> LlmClient for OpenAiClient<C> {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model)
            .messages(self.to_openai_messages(messages)?)
            .temperature(self.params.temperature);
        if let Some(max_tokens) = self.params.max_tokens {
            args.max_completion_tokens(max_tokens);
        }
        let request = args.build().map_err(|e| LlmError::Request(e.to_string()))?;

        let timeout = self.params.timeout;
        let response = tokio::time::timeout(timeout, self.client.chat().create(request))
            .await
            .map_err(|_| LlmError::Timeout(timeout.as_secs()))?
            .map_err(|e| LlmError::Request(e.to_string()))?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let content = response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(content)
    }
}
