//! Storebot - 商品目录对话助手
//!
//! 模块划分：
//! - **catalog**: 商品目录只读快照（SQLite / 内存）
//! - **chat**: 意图分类、商品/FAQ 回复生成、单轮路由状态机、会话管理、Prompt 模板
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型与组件装配
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **observability**: 日志初始化

pub mod catalog;
pub mod chat;
pub mod config;
pub mod core;
pub mod llm;
pub mod observability;

pub use crate::chat::{Intent, SessionManager, TurnContext, TurnOutcome};
pub use crate::core::{ChatBuilder, ChatError};
