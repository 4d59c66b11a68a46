//! LLM 层：消息类型、客户端抽象、OpenAI 兼容实现、Mock 与后端选择

pub mod message;
pub mod mock;
pub mod openai;
pub mod provider;
pub mod traits;

pub use message::{last_user_content, Message, Role};
pub use mock::MockLlmClient;
pub use openai::{GenerationParams, OpenAiClient, TokenUsage};
pub use provider::{create_llm_from_config, Provider};
pub use traits::{
    extract_json_object, LlmClient, LlmError, OutputSchema, RetryConfig, RetryingLlmClient,
};
