//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：complete（自由文本）、complete_structured（按 JSON Schema 约束输出）。

use std::time::Duration;

use async_trait::async_trait;
use schemars::{schema_for, JsonSchema};
use thiserror::Error;

use crate::llm::Message;

/// LLM 调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("LLM configuration error: {0}")]
    Config(String),
}

impl LlmError {
    /// 超时与请求失败视为可重试；响应格式错误与配置错误重试无意义
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Timeout(_) | LlmError::Request(_))
    }
}

/// 结构化输出约束：名字 + 描述 + JSON Schema
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: String,
    pub description: Option<String>,
    pub schema: serde_json::Value,
}

impl OutputSchema {
    /// 由 schemars 为类型 T 生成 Schema
    pub fn for_type<T: JsonSchema>(name: impl Into<String>) -> Self {
        let root = schema_for!(T);
        let description = root
            .schema
            .metadata
            .as_ref()
            .and_then(|m| m.description.clone());
        Self {
            name: name.into(),
            description,
            schema: serde_json::to_value(&root).unwrap_or(serde_json::Value::Null),
        }
    }

    /// 拼入 prompt 的格式说明，供不支持原生结构化输出的后端使用
    pub fn format_instructions(&self) -> String {
        let schema = serde_json::to_string_pretty(&self.schema).unwrap_or_default();
        format!(
            "The output must be a single JSON object that conforms to the JSON schema below. \
             Output only the JSON object, without explanations or Markdown.\n```json\n{}\n```",
            schema
        )
    }
}

/// 从模型文本中提取 JSON 对象（```json ... ``` 代码块或首个 `{` 到最后一个 `}`）
pub fn extract_json_object(output: &str) -> Result<serde_json::Value, LlmError> {
    let trimmed = output.trim();

    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start <= end {
            &trimmed[start..=end]
        } else {
            trimmed
        }
    } else {
        return Err(LlmError::InvalidResponse(format!(
            "no JSON object found in: {}",
            trimmed
        )));
    };

    let value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| LlmError::InvalidResponse(format!("{}: {}", e, json_str)))?;
    if value.is_object() {
        Ok(value)
    } else {
        Err(LlmError::InvalidResponse(format!(
            "expected a JSON object, got: {}",
            json_str
        )))
    }
}

/// LLM 客户端 trait：自由文本完成与结构化完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 自由文本完成
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError>;

    /// 结构化完成：返回符合 schema 的 JSON 对象
    ///
    /// 默认实现走 complete 并从文本中提取 JSON；支持原生 JSON Schema 输出的后端应覆盖。
    /// 返回值只保证是 JSON 对象，字段是否合法由调用方反序列化时校验。
    async fn complete_structured(
        &self,
        messages: &[Message],
        _schema: &OutputSchema,
    ) -> Result<serde_json::Value, LlmError> {
        let raw = self.complete(messages).await?;
        extract_json_object(&raw)
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 重试策略：最大重试次数与指数退避基准间隔
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
        }
    }
}

impl RetryConfig {
    /// 第 attempt 次重试前的等待时间（attempt 从 0 开始）
    fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }
}

/// 在任意 LlmClient 外包一层重试（仅对 is_retryable 的错误重试）
pub struct RetryingLlmClient<C> {
    inner: C,
    config: RetryConfig,
}

impl<C: LlmClient> RetryingLlmClient<C> {
    pub fn new(inner: C, config: RetryConfig) -> Self {
        Self { inner, config }
    }

    async fn backoff(&self, attempt: u32, err: &LlmError) -> bool {
        if attempt >= self.config.max_retries || !err.is_retryable() {
            return false;
        }
        let delay = self.config.delay_for(attempt);
        tracing::warn!(
            attempt = attempt + 1,
            max_retries = self.config.max_retries,
            delay_ms = delay.as_millis() as u64,
            "LLM call failed ({}), retrying",
            err
        );
        tokio::time::sleep(delay).await;
        true
    }
}

#[async_trait]
impl<C: LlmClient> LlmClient for RetryingLlmClient<C> {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete(messages).await {
                Ok(out) => return Ok(out),
                Err(e) => {
                    if !self.backoff(attempt, &e).await {
                        return Err(e);
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn complete_structured(
        &self,
        messages: &[Message],
        schema: &OutputSchema,
    ) -> Result<serde_json::Value, LlmError> {
        let mut attempt = 0;
        loop {
            match self.inner.complete_structured(messages, schema).await {
                Ok(out) => return Ok(out),
                Err(e) => {
                    if !self.backoff(attempt, &e).await {
                        return Err(e);
                    }
                    attempt += 1;
                }
            }
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    #[derive(JsonSchema)]
    #[allow(dead_code)]
    struct Probe {
        /// 探针字段
        kind: String,
    }

    #[test]
    fn test_extract_json_fenced() {
        let out = "Sure!\n```json\n{\"message_type\": \"faq\"}\n```";
        let v = extract_json_object(out).unwrap();
        assert_eq!(v["message_type"], "faq");
    }

    #[test]
    fn test_extract_json_bare() {
        let v = extract_json_object("result: {\"a\": 1} done").unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn test_extract_json_rejects_garbage() {
        assert!(matches!(
            extract_json_object("no json here"),
            Err(LlmError::InvalidResponse(_))
        ));
        assert!(extract_json_object("} {").is_err());
    }

    #[test]
    fn test_output_schema_mentions_fields() {
        let schema = OutputSchema::for_type::<Probe>("probe");
        assert_eq!(schema.name, "probe");
        assert!(schema.schema["properties"]["kind"].is_object());
        assert!(schema.format_instructions().contains("\"kind\""));
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let mock = MockLlmClient::new()
            .with_text_error(LlmError::Timeout(1))
            .with_text("recovered");
        let client = RetryingLlmClient::new(
            mock,
            RetryConfig {
                max_retries: 2,
                base_delay: Duration::from_millis(1),
            },
        );
        let out = client.complete(&[Message::user("hi")]).await.unwrap();
        assert_eq!(out, "recovered");
    }

    #[tokio::test]
    async fn test_no_retry_on_invalid_response() {
        let mock = MockLlmClient::new()
            .with_text_error(LlmError::InvalidResponse("bad".into()))
            .with_text("never reached");
        let client = RetryingLlmClient::new(
            mock,
            RetryConfig {
                max_retries: 3,
                base_delay: Duration::from_millis(1),
            },
        );
        let err = client.complete(&[Message::user("hi")]).await.unwrap_err();
        assert_eq!(err, LlmError::InvalidResponse("bad".into()));
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let mock = MockLlmClient::new()
            .with_text_error(LlmError::Request("503".into()))
            .with_text_error(LlmError::Request("503".into()));
        let client = RetryingLlmClient::new(
            mock,
            RetryConfig {
                max_retries: 1,
                base_delay: Duration::from_millis(1),
            },
        );
        assert!(client.complete(&[Message::user("hi")]).await.is_err());
    }
}
