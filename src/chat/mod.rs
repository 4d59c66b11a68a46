//! 对话层：意图分类、回复生成、单轮路由与会话管理

pub mod classifier;
pub mod generators;
pub mod prompts;
pub mod router;
pub mod session;
pub mod state;

pub use classifier::{IntentClassifier, FALLBACK_INTENT};
pub use generators::{FaqResponder, Generated, ProductResponder, ResponseGenerator};
pub use prompts::{PromptError, PromptStore};
pub use router::{ConversationRouter, TurnOutcome, TurnPhase};
pub use session::{Session, SessionHandle, SessionId, SessionManager};
pub use state::{ConversationState, Intent, Turn, TurnContext, TurnRole};
