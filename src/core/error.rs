//! 对话层错误类型
//!
//! 分类失败不会出现在这里（分类器本地降级为 FAQ）；能到达调用方的只有整轮失败。

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::chat::prompts::PromptError;
use crate::llm::LlmError;

/// 一轮对话失败的原因
#[derive(Error, Debug)]
pub enum ChatError {
    /// 回复生成时 LLM 调用失败
    #[error("response generation failed: {0}")]
    Llm(#[from] LlmError),

    /// 商品快照读取失败
    #[error("catalog snapshot unavailable: {0}")]
    Catalog(#[from] CatalogError),

    #[error("prompt error: {0}")]
    Prompt(#[from] PromptError),

    /// 回合上下文序列化失败
    #[error("turn context serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
