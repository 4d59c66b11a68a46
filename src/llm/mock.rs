//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! 可预置自由文本与结构化两条回复队列；队列为空时：
//! - complete 回显最后一条 User 消息
//! - complete_structured 返回 `{"message_type": "faq"}`
//!
//! `new()` 记录每次调用供测试断言；运行时兜底用 `echo()`，不记录。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{last_user_content, LlmClient, LlmError, Message, OutputSchema};

/// Mock 客户端：按顺序吐出预置回复，并记录每次调用收到的消息
#[derive(Debug, Default)]
pub struct MockLlmClient {
    text: Mutex<VecDeque<Result<String, LlmError>>>,
    structured: Mutex<VecDeque<Result<serde_json::Value, LlmError>>>,
    calls: Mutex<Vec<Vec<Message>>>,
    record_calls: bool,
}

impl MockLlmClient {
    /// 记录调用的 Mock（测试用）
    pub fn new() -> Self {
        Self {
            record_calls: true,
            ..Self::default()
        }
    }

    /// 只回显、不记录调用（无 API Key 时的运行时兜底）
    pub fn echo() -> Self {
        Self::default()
    }

    /// 追加一条自由文本回复
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.push_text(Ok(text.into()));
        self
    }

    /// 追加一次自由文本调用失败
    pub fn with_text_error(self, err: LlmError) -> Self {
        self.push_text(Err(err));
        self
    }

    /// 追加一条结构化回复
    pub fn with_structured(self, value: serde_json::Value) -> Self {
        self.push_structured(Ok(value));
        self
    }

    /// 追加一次结构化调用失败
    pub fn with_structured_error(self, err: LlmError) -> Self {
        self.push_structured(Err(err));
        self
    }

    pub fn push_text(&self, reply: Result<String, LlmError>) {
        lock(&self.text).push_back(reply);
    }

    pub fn push_structured(&self, reply: Result<serde_json::Value, LlmError>) {
        lock(&self.structured).push_back(reply);
    }

    /// 已记录的调用（每次调用的完整消息列表）
    pub fn calls(&self) -> Vec<Vec<Message>> {
        lock(&self.calls).clone()
    }

    fn record(&self, messages: &[Message]) {
        if self.record_calls {
            lock(&self.calls).push(messages.to_vec());
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, LlmError> {
        self.record(messages);
        if let Some(reply) = lock(&self.text).pop_front() {
            return reply;
        }
        let last_user = last_user_content(messages).unwrap_or("(no input)");
        Ok(format!("Echo from Mock: {}", last_user))
    }

    async fn complete_structured(
        &self,
        messages: &[Message],
        _schema: &OutputSchema,
    ) -> Result<serde_json::Value, LlmError> {
        self.record(messages);
        if let Some(reply) = lock(&self.structured).pop_front() {
            return reply;
        }
        Ok(serde_json::json!({ "message_type": "faq" }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replies_then_echo() {
        let mock = MockLlmClient::new()
            .with_text("first")
            .with_text_error(LlmError::Timeout(5));
        let msgs = [Message::system("sys"), Message::user("ping")];

        assert_eq!(mock.complete(&msgs).await.unwrap(), "first");
        assert_eq!(mock.complete(&msgs).await, Err(LlmError::Timeout(5)));
        assert_eq!(mock.complete(&msgs).await.unwrap(), "Echo from Mock: ping");
        assert_eq!(mock.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_echo_client_keeps_no_history() {
        let mock = MockLlmClient::echo();
        for i in 0..3 {
            let reply = mock.complete(&[Message::user(format!("q{i}"))]).await.unwrap();
            assert_eq!(reply, format!("Echo from Mock: q{i}"));
        }
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn test_structured_defaults_to_faq() {
        let mock = MockLlmClient::new();
        let schema = OutputSchema {
            name: "t".to_string(),
            description: None,
            schema: serde_json::json!({}),
        };
        let v = mock
            .complete_structured(&[Message::user("x")], &schema)
            .await
            .unwrap();
        assert_eq!(v["message_type"], "faq");
    }
}
