//! 意图分类
//!
//! 把最新一条用户消息分成 products / faq 两类。LLM 以结构化模式输出 `{"message_type": ...}`；
//! 调用失败、超时或返回值不在两类之中时一律降级为 Faq（FAQ 回复不依赖商品数据），只记 warn 不报错。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use schemars::JsonSchema;
use serde::Deserialize;

use crate::chat::prompts::{PromptError, PromptStore, CLASSIFY_MESSAGE};
use crate::chat::state::Intent;
use crate::llm::{LlmClient, Message, OutputSchema};

// 分类器要求 LLM 输出的结构；doc 注释会进入 JSON Schema，这里只写英文
#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(description = "Classify if the message requires a FAQ or product-related response.")]
struct MessageClassification {
    /// products: questions about catalog products; faq: everything else
    message_type: Intent,
}

/// 分类失败时的兜底意图
pub const FALLBACK_INTENT: Intent = Intent::Faq;

pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
    schema: OutputSchema,
    fallbacks: AtomicU64,
}

impl IntentClassifier {
    /// 启动时渲染一次 system prompt（格式说明由 schema 生成）
    pub fn new(llm: Arc<dyn LlmClient>, prompts: &PromptStore) -> Result<Self, PromptError> {
        let schema = OutputSchema::for_type::<MessageClassification>("message_classification");
        let format_instruction = schema.format_instructions();
        let system_prompt =
            prompts.render(CLASSIFY_MESSAGE, &[("format_instruction", format_instruction.as_str())])?;
        Ok(Self {
            llm,
            system_prompt,
            schema,
            fallbacks: AtomicU64::new(0),
        })
    }

    /// 分类最新一条用户消息；永不失败
    #[tracing::instrument(name = "classify", skip_all)]
    pub async fn classify(&self, latest_user_text: &str) -> Intent {
        let started = Instant::now();
        match self.try_classify(latest_user_text).await {
            Ok(intent) => {
                tracing::debug!(
                    intent = %intent,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Message classified"
                );
                intent
            }
            Err(reason) => {
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    fallback = %FALLBACK_INTENT,
                    "Failed to classify message: {}. Defaulting to '{}'",
                    reason,
                    FALLBACK_INTENT
                );
                FALLBACK_INTENT
            }
        }
    }

    async fn try_classify(&self, latest_user_text: &str) -> Result<Intent, String> {
        let messages = [
            Message::system(self.system_prompt.clone()),
            Message::user(latest_user_text),
        ];
        let value = self
            .llm
            .complete_structured(&messages, &self.schema)
            .await
            .map_err(|e| e.to_string())?;
        let parsed: MessageClassification = serde_json::from_value(value.clone())
            .map_err(|e| format!("unexpected classifier output {}: {}", value, e))?;
        Ok(parsed.message_type)
    }

    /// 累计降级次数
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, MockLlmClient, Role};
    use serde_json::json;

    fn classifier(mock: MockLlmClient) -> (IntentClassifier, Arc<MockLlmClient>) {
        let mock = Arc::new(mock);
        let c = IntentClassifier::new(mock.clone(), &PromptStore::builtin()).unwrap();
        (c, mock)
    }

    #[tokio::test]
    async fn test_classify_products() {
        let (c, mock) = classifier(MockLlmClient::new().with_structured(json!({"message_type": "products"})));
        assert_eq!(c.classify("do you sell lamps?").await, Intent::Products);
        assert_eq!(c.fallback_count(), 0);

        let calls = mock.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0][0].role, Role::System);
        assert!(calls[0][0].content.contains("message_type"));
        assert_eq!(calls[0][1].content, "do you sell lamps?");
    }

    #[tokio::test]
    async fn test_out_of_enum_label_falls_back() {
        let (c, _) = classifier(MockLlmClient::new().with_structured(json!({"message_type": "shipping"})));
        assert_eq!(c.classify("where is my parcel").await, Intent::Faq);
        assert_eq!(c.fallback_count(), 1);
    }

    #[tokio::test]
    async fn test_garbage_outputs_always_yield_a_label() {
        let garbage = [
            json!({}),
            json!({"message_type": null}),
            json!({"message_type": 42}),
            json!({"message_type": "PRODUCTS"}),
            json!({"type": "products"}),
        ];
        let mock = MockLlmClient::new();
        for g in &garbage {
            mock.push_structured(Ok(g.clone()));
        }
        let (c, _) = classifier(mock);
        for _ in &garbage {
            let intent = c.classify("anything").await;
            assert!(matches!(intent, Intent::Products | Intent::Faq));
            assert_eq!(intent, Intent::Faq);
        }
        assert_eq!(c.fallback_count(), garbage.len() as u64);
    }

    #[tokio::test]
    async fn test_timeout_falls_back() {
        let (c, _) = classifier(MockLlmClient::new().with_structured_error(LlmError::Timeout(30)));
        assert_eq!(c.classify("what are your hours").await, Intent::Faq);
        assert_eq!(c.fallback_count(), 1);
    }

    #[test]
    fn test_schema_limits_message_type() {
        let schema = OutputSchema::for_type::<MessageClassification>("message_classification");
        let text = serde_json::to_string(&schema.schema).unwrap();
        assert!(text.contains("\"products\""));
        assert!(text.contains("\"faq\""));
        assert_eq!(
            schema.description.as_deref(),
            Some("Classify if the message requires a FAQ or product-related response.")
        );
    }
}
