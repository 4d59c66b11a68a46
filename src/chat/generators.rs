//! 回复生成器：商品回复 / FAQ 回复
//!
//! 两者都实现 ResponseGenerator。LLM 或商品目录出错直接上抛，由路由器决定整轮失败。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;

use crate::catalog::{CatalogProvider, Product};
use crate::chat::prompts::{PromptStore, FAQ_SYSTEM_MESSAGE, PRODUCTS_SYSTEM_MESSAGE};
use crate::core::ChatError;
use crate::llm::{LlmClient, Message};

/// 一次生成的结果：回复文本 + 本轮附带的临时数据
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generated {
    pub text: String,
    pub product_info: Vec<Product>,
    pub faq_info: BTreeMap<String, String>,
}

#[async_trait]
pub trait ResponseGenerator: Send + Sync {
    async fn generate(&self, user_text: &str) -> Result<Generated, ChatError>;
}

/// 商品回复：每次调用都重新读取商品快照并嵌入 prompt
pub struct ProductResponder {
    llm: Arc<dyn LlmClient>,
    catalog: Arc<dyn CatalogProvider>,
    prompts: Arc<PromptStore>,
}

impl ProductResponder {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        catalog: Arc<dyn CatalogProvider>,
        prompts: Arc<PromptStore>,
    ) -> Self {
        Self {
            llm,
            catalog,
            prompts,
        }
    }
}

#[async_trait]
impl ResponseGenerator for ProductResponder {
    #[tracing::instrument(name = "product_responder", skip_all)]
    async fn generate(&self, user_text: &str) -> Result<Generated, ChatError> {
        let started = Instant::now();
        let products = self.catalog.fetch_all_products().await?;
        let products_info = serde_json::to_string_pretty(&products)?;
        let system = self.prompts.render(
            PRODUCTS_SYSTEM_MESSAGE,
            &[("products_info", products_info.as_str()), ("user_message", user_text)],
        )?;

        let messages = [Message::system(system), Message::user(user_text)];
        let text = self.llm.complete(&messages).await?.trim().to_string();

        tracing::debug!(
            products = products.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Product response generated"
        );
        Ok(Generated {
            text,
            product_info: products,
            faq_info: BTreeMap::new(),
        })
    }
}

/// FAQ 回复：只依赖用户消息；模型返回空内容时回复为空串而不是错误
pub struct FaqResponder {
    llm: Arc<dyn LlmClient>,
    prompts: Arc<PromptStore>,
}

impl FaqResponder {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptStore>) -> Self {
        Self { llm, prompts }
    }
}

#[async_trait]
impl ResponseGenerator for FaqResponder {
    #[tracing::instrument(name = "faq_responder", skip_all)]
    async fn generate(&self, user_text: &str) -> Result<Generated, ChatError> {
        let started = Instant::now();
        let system = self
            .prompts
            .render(FAQ_SYSTEM_MESSAGE, &[("user_message", user_text)])?;

        let messages = [Message::system(system), Message::user(user_text)];
        let text = self.llm.complete(&messages).await?.trim().to_string();

        tracing::debug!(
            empty = text.is_empty(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "FAQ response generated"
        );
        Ok(Generated {
            text,
            ..Generated::default()
        })
    }
}
