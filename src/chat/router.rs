//! 对话路由：单轮状态机
//!
//! Classifying → ProductDispatch | FaqDispatch → Done，每次 process 同步跑完整个流程：
//! 1. 追加 user 发言
//! 2. 分类并写入 category
//! 3. 按意图分派到对应生成器（两分支穷尽匹配）
//! 4. 挂上本轮临时数据
//! 5. 生成返回给调用方的上下文快照
//! 6. 追加 assistant 发言，清空临时数据，再把状态留给下一轮
//!
//! 生成或快照失败时回滚到本轮开始前（撤销 user 发言、category 与临时数据），错误原样上抛，会话可继续使用。

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::chat::classifier::IntentClassifier;
use crate::chat::generators::ResponseGenerator;
use crate::chat::state::{ConversationState, Intent, TurnContext};
use crate::core::ChatError;

/// 单轮处理阶段（用于日志）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnPhase {
    Classifying,
    ProductDispatch,
    FaqDispatch,
    Done,
}

impl TurnPhase {
    fn dispatch_for(intent: Intent) -> Self {
        match intent {
            Intent::Products => TurnPhase::ProductDispatch,
            Intent::Faq => TurnPhase::FaqDispatch,
        }
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TurnPhase::Classifying => "classifying",
            TurnPhase::ProductDispatch => "product_dispatch",
            TurnPhase::FaqDispatch => "faq_dispatch",
            TurnPhase::Done => "done",
        };
        f.write_str(s)
    }
}

/// 一轮成功处理的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    pub response: String,
    pub context: TurnContext,
}

pub struct ConversationRouter {
    classifier: Arc<IntentClassifier>,
    products: Arc<dyn ResponseGenerator>,
    faq: Arc<dyn ResponseGenerator>,
}

impl ConversationRouter {
    pub fn new(
        classifier: Arc<IntentClassifier>,
        products: Arc<dyn ResponseGenerator>,
        faq: Arc<dyn ResponseGenerator>,
    ) -> Self {
        Self {
            classifier,
            products,
            faq,
        }
    }

    pub fn classifier(&self) -> &IntentClassifier {
        &self.classifier
    }

    /// 处理一条用户消息；state 由调用方独占持有
    #[tracing::instrument(name = "turn", skip_all, fields(turn = state.history().len() / 2 + 1))]
    pub async fn process(
        &self,
        state: &mut ConversationState,
        user_text: &str,
    ) -> Result<TurnOutcome, ChatError> {
        let started = Instant::now();
        let checkpoint = state.checkpoint();
        state.push_user(user_text);

        tracing::debug!(phase = %TurnPhase::Classifying, "Turn started");
        let intent = self.classifier.classify(user_text).await;
        state.set_category(intent);

        let phase = TurnPhase::dispatch_for(intent);
        tracing::debug!(phase = %phase, intent = %intent, "Dispatching");
        let generator = match intent {
            Intent::Products => &self.products,
            Intent::Faq => &self.faq,
        };

        let generated = match generator.generate(user_text).await {
            Ok(generated) => generated,
            Err(e) => {
                state.rollback(checkpoint);
                tracing::error!(phase = %phase, "Turn failed, state rolled back: {}", e);
                return Err(e);
            }
        };

        match intent {
            Intent::Products => state.attach(generated.product_info, Default::default()),
            Intent::Faq => state.attach(Vec::new(), generated.faq_info),
        }
        let context = match state.context_snapshot(intent) {
            Ok(context) => context,
            Err(e) => {
                state.rollback(checkpoint);
                tracing::error!(phase = %phase, "Turn context unavailable, state rolled back: {}", e);
                return Err(e.into());
            }
        };

        state.record_response(&generated.text);
        state.clear_transient();

        tracing::info!(
            phase = %TurnPhase::Done,
            intent = %intent,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Turn completed"
        );
        Ok(TurnOutcome {
            response: generated.text,
            context,
        })
    }
}
