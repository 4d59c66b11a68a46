//! 后端选择：按配置创建唯一的 LLM 客户端（启动时调用一次，之后以 Arc 注入各组件）
//!
//! 支持的 provider 均走 OpenAI 兼容协议：
//! - openai:   https://api.openai.com/v1（async_openai 默认端点）
//! - deepseek: https://api.deepseek.com
//! - groq:     https://api.groq.com/openai/v1
//! - azure:    base_url 填资源 endpoint，model 填 deployment，api_version 可配
//! - mock:     不发网络请求，用于本地演示
//!
//! API Key 从环境变量 `<PROVIDER>_API_KEY` 读取，缺失时回退 `OPENAI_API_KEY`；都没有则退回 Mock。

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmSection;
use crate::llm::{
    GenerationParams, LlmClient, LlmError, MockLlmClient, OpenAiClient, RetryConfig,
    RetryingLlmClient,
};

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    DeepSeek,
    Groq,
    Azure,
    Mock,
}

impl FromStr for Provider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(Provider::OpenAi),
            "deepseek" => Ok(Provider::DeepSeek),
            "groq" => Ok(Provider::Groq),
            "azure" => Ok(Provider::Azure),
            "mock" => Ok(Provider::Mock),
            other => Err(LlmError::Config(format!("unknown LLM provider: {}", other))),
        }
    }
}

impl Provider {
    /// 该 provider 的默认端点（None 表示用 async_openai 默认的 OpenAI 端点）
    pub fn default_base_url(self) -> Option<&'static str> {
        match self {
            Provider::DeepSeek => Some(DEEPSEEK_BASE_URL),
            Provider::Groq => Some(GROQ_BASE_URL),
            Provider::OpenAi | Provider::Azure | Provider::Mock => None,
        }
    }

    /// API Key 环境变量名
    pub fn api_key_var(self) -> &'static str {
        match self {
            Provider::OpenAi => "OPENAI_API_KEY",
            Provider::DeepSeek => "DEEPSEEK_API_KEY",
            Provider::Groq => "GROQ_API_KEY",
            Provider::Azure => "AZURE_API_KEY",
            Provider::Mock => "",
        }
    }

    /// 通过 lookup 查找 API Key：先查本 provider 的变量，再回退 OPENAI_API_KEY
    pub fn resolve_api_key<F>(self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self == Provider::Mock {
            return None;
        }
        lookup(self.api_key_var())
            .or_else(|| lookup("OPENAI_API_KEY"))
            .filter(|k| !k.trim().is_empty())
    }
}

/// 根据配置与环境变量创建 LLM 客户端
///
/// provider 名非法时返回 Config 错误；缺少 API Key 时打 warn 并退回 Mock（与本地开发体验一致）。
pub fn create_llm_from_config(cfg: &LlmSection) -> Result<Arc<dyn LlmClient>, LlmError> {
    let provider: Provider = cfg.provider.parse()?;

    if provider == Provider::Mock {
        tracing::info!("Using Mock LLM");
        return Ok(Arc::new(MockLlmClient::echo()));
    }

    let base_url = cfg.base_url.as_deref().or(provider.default_base_url());
    if provider == Provider::Azure && base_url.is_none() {
        return Err(LlmError::Config(
            "azure provider requires llm.base_url (resource endpoint)".to_string(),
        ));
    }

    let Some(api_key) = provider.resolve_api_key(|name| std::env::var(name).ok()) else {
        tracing::warn!(
            "No API key found in {} or OPENAI_API_KEY, using Mock LLM",
            provider.api_key_var()
        );
        return Ok(Arc::new(MockLlmClient::echo()));
    };

    let params = GenerationParams {
        temperature: cfg.temperature,
        max_tokens: cfg.max_tokens,
        timeout: Duration::from_secs(cfg.timeouts.request),
    };
    tracing::info!(
        provider = ?provider,
        model = %cfg.model,
        max_retries = cfg.max_retries,
        "Using OpenAI-compatible LLM"
    );

    match (provider, base_url) {
        (Provider::Azure, Some(endpoint)) => Ok(with_retries(
            OpenAiClient::azure(endpoint, &cfg.model, &cfg.api_version, &api_key, params),
            cfg.max_retries,
        )),
        _ => Ok(with_retries(
            OpenAiClient::new(base_url, &cfg.model, &api_key, params),
            cfg.max_retries,
        )),
    }
}

fn with_retries<C: LlmClient + 'static>(client: C, max_retries: u32) -> Arc<dyn LlmClient> {
    if max_retries == 0 {
        Arc::new(client)
    } else {
        Arc::new(RetryingLlmClient::new(
            client,
            RetryConfig {
                max_retries,
                ..RetryConfig::default()
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider() {
        assert_eq!("OpenAI".parse::<Provider>().unwrap(), Provider::OpenAi);
        assert_eq!(" groq ".parse::<Provider>().unwrap(), Provider::Groq);
        assert_eq!("deepseek".parse::<Provider>().unwrap(), Provider::DeepSeek);
        assert_eq!("Azure".parse::<Provider>().unwrap(), Provider::Azure);
        assert!(matches!(
            "anthropic".parse::<Provider>(),
            Err(LlmError::Config(_))
        ));
    }

    #[test]
    fn test_resolve_api_key_fallback() {
        let only_openai = |name: &str| (name == "OPENAI_API_KEY").then(|| "sk-openai".to_string());
        assert_eq!(
            Provider::Groq.resolve_api_key(only_openai).as_deref(),
            Some("sk-openai")
        );

        let both = |name: &str| match name {
            "GROQ_API_KEY" => Some("gsk-groq".to_string()),
            "OPENAI_API_KEY" => Some("sk-openai".to_string()),
            _ => None,
        };
        assert_eq!(Provider::Groq.resolve_api_key(both).as_deref(), Some("gsk-groq"));

        let blank = |_: &str| Some("  ".to_string());
        assert!(Provider::DeepSeek.resolve_api_key(blank).is_none());
        assert!(Provider::Mock.resolve_api_key(both).is_none());
    }

    #[test]
    fn test_default_base_url() {
        assert_eq!(Provider::Groq.default_base_url(), Some(GROQ_BASE_URL));
        assert_eq!(Provider::OpenAi.default_base_url(), None);
    }

    #[test]
    fn test_mock_provider_needs_no_key() {
        let cfg = LlmSection {
            provider: "mock".to_string(),
            ..LlmSection::default()
        };
        assert!(create_llm_from_config(&cfg).is_ok());
    }

    #[test]
    fn test_azure_requires_endpoint() {
        let cfg = LlmSection {
            provider: "azure".to_string(),
            model: "gpt-4o-deployment".to_string(),
            ..LlmSection::default()
        };
        assert!(matches!(
            create_llm_from_config(&cfg),
            Err(LlmError::Config(_))
        ));
        assert_eq!(Provider::Azure.api_key_var(), "AZURE_API_KEY");
        assert_eq!(Provider::Azure.default_base_url(), None);
    }

    #[test]
    fn test_azure_client_builds_with_endpoint() {
        let client = OpenAiClient::azure(
            "https://shop.openai.azure.com",
            "gpt-4o-deployment",
            "2024-10-21",
            "test-key",
            GenerationParams::default(),
        );
        let llm = with_retries(client, 1);
        assert_eq!(llm.token_usage(), (0, 0, 0));
    }

    #[test]
    fn test_unknown_provider_is_config_error() {
        let cfg = LlmSection {
            provider: "aws".to_string(),
            ..LlmSection::default()
        };
        assert!(matches!(
            create_llm_from_config(&cfg),
            Err(LlmError::Config(_))
        ));
    }
}
