//! 组件装配：统一的初始化逻辑
//!
//! LLM 客户端只创建一次，以 Arc 注入分类器与两个生成器；商品目录、Prompt 模板同理。
//! 测试与嵌入方可用 with_* 注入自己的实现，其余按配置构建。

use std::sync::Arc;

use crate::catalog::{CatalogProvider, SqliteCatalog};
use crate::chat::{
    ConversationRouter, FaqResponder, IntentClassifier, ProductResponder, PromptStore,
    SessionManager,
};
use crate::config::AppConfig;
use crate::core::ChatError;
use crate::llm::{create_llm_from_config, LlmClient};

pub struct ChatBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    catalog: Option<Arc<dyn CatalogProvider>>,
    prompts: Option<PromptStore>,
}

impl ChatBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            catalog: None,
            prompts: None,
        }
    }

    /// 注入 LLM 客户端（不再按配置创建）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 注入商品目录
    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogProvider>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_prompts(mut self, prompts: PromptStore) -> Self {
        self.prompts = Some(prompts);
        self
    }

    pub fn build_llm(&self) -> Result<Arc<dyn LlmClient>, ChatError> {
        match &self.llm {
            Some(llm) => Ok(llm.clone()),
            None => Ok(create_llm_from_config(&self.config.llm)?),
        }
    }

    /// 配置的 SQLite 文件不存在时建一个空库，商品类回复照常工作（只是目录为空）
    pub fn build_catalog(&self) -> Result<Arc<dyn CatalogProvider>, ChatError> {
        if let Some(catalog) = &self.catalog {
            return Ok(catalog.clone());
        }
        let catalog = SqliteCatalog::new(&self.config.catalog.database);
        if !catalog.path().exists() {
            tracing::warn!(
                path = %catalog.path().display(),
                "Catalog database not found, creating an empty one"
            );
            catalog.ensure_schema()?;
        }
        Ok(Arc::new(catalog))
    }

    pub fn build_prompts(&self) -> Result<PromptStore, ChatError> {
        match &self.prompts {
            Some(prompts) => Ok(prompts.clone()),
            None => Ok(PromptStore::discover(self.config.prompts.path.as_deref())?),
        }
    }

    pub fn build_router(&self) -> Result<ConversationRouter, ChatError> {
        let llm = self.build_llm()?;
        let catalog = self.build_catalog()?;
        let prompts = Arc::new(self.build_prompts()?);

        let classifier = Arc::new(IntentClassifier::new(llm.clone(), &prompts)?);
        let products = Arc::new(ProductResponder::new(llm.clone(), catalog, prompts.clone()));
        let faq = Arc::new(FaqResponder::new(llm, prompts));
        Ok(ConversationRouter::new(classifier, products, faq))
    }

    pub fn build(self) -> Result<SessionManager, ChatError> {
        let router = self.build_router()?;
        tracing::info!(app = %self.config.app.name, "Chat components ready");
        Ok(SessionManager::new(router))
    }
}
