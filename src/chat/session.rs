//! 会话管理
//!
//! 每个 SessionManager 只持有一个活跃会话（单用户部署），所有调用方共享同一段对话。
//! 同一会话上的 process 通过 tokio Mutex 串行执行，避免并发回合交错写坏 history。

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use crate::chat::router::{ConversationRouter, TurnOutcome};
use crate::chat::state::ConversationState;
use crate::core::ChatError;

/// 会话 ID
pub type SessionId = String;

/// 单个会话：标识、创建时间与对话状态
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub created_at: DateTime<Utc>,
    state: Mutex<ConversationState>,
}

impl Session {
    fn new() -> Self {
        Self {
            id: format!("session_{}", Uuid::new_v4()),
            created_at: Utc::now(),
            state: Mutex::new(ConversationState::new()),
        }
    }

    /// 当前状态的副本（会等待进行中的回合结束）
    pub async fn snapshot(&self) -> ConversationState {
        self.state.lock().await.clone()
    }
}

/// 会话句柄，可在多处持有
pub type SessionHandle = Arc<Session>;

pub struct SessionManager {
    router: ConversationRouter,
    current: RwLock<Option<SessionHandle>>,
}

impl SessionManager {
    pub fn new(router: ConversationRouter) -> Self {
        Self {
            router,
            current: RwLock::new(None),
        }
    }

    pub fn router(&self) -> &ConversationRouter {
        &self.router
    }

    /// 获取当前会话，不存在则新建
    pub fn get_or_create_session(&self) -> SessionHandle {
        if let Some(session) = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
        {
            return session.clone();
        }

        let mut current = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        current
            .get_or_insert_with(|| {
                let session = Arc::new(Session::new());
                tracing::info!(session_id = %session.id, "Session created");
                session
            })
            .clone()
    }

    /// 丢弃当前会话，回到初始状态；重复调用结果相同
    ///
    /// 进行中的回合会在旧会话上跑完，结果不会带进新会话。
    pub fn reset(&self) {
        let session = Arc::new(Session::new());
        let old = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(session.clone());
        tracing::info!(
            session_id = %session.id,
            discarded = old.as_ref().map(|s| s.id.as_str()).unwrap_or("-"),
            "Session reset"
        );
    }

    /// 在当前会话上处理一条用户消息
    pub async fn process(&self, user_text: &str) -> Result<TurnOutcome, ChatError> {
        let session = self.get_or_create_session();
        let mut state = session.state.lock().await;
        let span = tracing::info_span!("session", session_id = %session.id);
        self.router
            .process(&mut state, user_text)
            .instrument(span)
            .await
    }

    /// 当前会话状态的副本
    pub async fn snapshot(&self) -> ConversationState {
        self.get_or_create_session().snapshot().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::chat::classifier::IntentClassifier;
    use crate::chat::generators::{FaqResponder, ProductResponder};
    use crate::chat::prompts::PromptStore;
    use crate::llm::MockLlmClient;

    fn manager() -> SessionManager {
        let llm = Arc::new(MockLlmClient::new());
        let prompts = Arc::new(PromptStore::builtin());
        let classifier = Arc::new(IntentClassifier::new(llm.clone(), &prompts).unwrap());
        let products = Arc::new(ProductResponder::new(
            llm.clone(),
            Arc::new(InMemoryCatalog::default()),
            prompts.clone(),
        ));
        let faq = Arc::new(FaqResponder::new(llm, prompts));
        SessionManager::new(ConversationRouter::new(classifier, products, faq))
    }

    #[test]
    fn test_get_or_create_returns_same_session() {
        let manager = manager();
        let a = manager.get_or_create_session();
        let b = manager.get_or_create_session();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_reset_discards_state() {
        let manager = manager();
        manager.process("hello").await.unwrap();
        let old = manager.get_or_create_session();
        assert_eq!(old.snapshot().await.history().len(), 2);

        manager.reset();
        let new = manager.get_or_create_session();
        assert_ne!(old.id, new.id);
        assert!(new.snapshot().await.is_pristine());
    }

    #[tokio::test]
    async fn test_reset_twice_is_same_as_once() {
        let manager = manager();
        manager.process("hello").await.unwrap();
        manager.reset();
        let once = manager.snapshot().await;
        manager.reset();
        let twice = manager.snapshot().await;
        assert_eq!(once, twice);
        assert!(twice.is_pristine());
    }

    #[tokio::test]
    async fn test_concurrent_turns_are_serialized() {
        let manager = Arc::new(manager());
        let mut tasks = Vec::new();
        for i in 0..8 {
            let manager = manager.clone();
            tasks.push(tokio::spawn(async move {
                manager.process(&format!("message {i}")).await.unwrap();
            }));
        }
        for t in tasks {
            t.await.unwrap();
        }

        let state = manager.snapshot().await;
        assert_eq!(state.history().len(), 16);
        // 每条 user 发言后紧跟它自己的回复
        for pair in state.history().chunks(2) {
            assert_eq!(pair[1].text, format!("Echo from Mock: {}", pair[0].text));
        }
    }
}
