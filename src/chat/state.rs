//! 会话状态：对话历史、当前意图、最近回复与单轮临时数据
//!
//! - history 只追加（失败回滚除外），保留完整对话
//! - product_info / faq_info 只在产生它们的那一轮有效，回合结束即清空

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::catalog::Product;

/// Intent of a user message: `products` for catalog questions, `faq` for everything else.
// 分类器只会输出这两种；doc 注释会进入分类用的 JSON Schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Products,
    Faq,
}

impl Intent {
    pub fn as_str(self) -> &'static str {
        match self {
            Intent::Products => "products",
            Intent::Faq => "faq",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnRole {
    User,
    Assistant,
}

/// 历史中的一条发言
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    pub at: DateTime<Utc>,
}

impl Turn {
    fn new(role: TurnRole, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            at: Utc::now(),
        }
    }
}

/// 回合返回给调用方的上下文快照（product_info / faq_info 为 JSON 文本）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnContext {
    pub category: Intent,
    pub product_info: String,
    pub faq_info: String,
}

/// 回合开始前的状态位置，失败时据此回滚
#[derive(Debug, Clone)]
pub(crate) struct Checkpoint {
    history_len: usize,
    category: Option<Intent>,
    response: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConversationState {
    history: Vec<Turn>,
    /// None 表示尚未分类
    category: Option<Intent>,
    response: String,
    product_info: Vec<Product>,
    faq_info: BTreeMap<String, String>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn category(&self) -> Option<Intent> {
        self.category
    }

    /// 以字符串形式返回意图，未分类时为空串
    pub fn category_label(&self) -> &'static str {
        self.category.map(Intent::as_str).unwrap_or("")
    }

    pub fn response(&self) -> &str {
        &self.response
    }

    pub fn product_info(&self) -> &[Product] {
        &self.product_info
    }

    pub fn faq_info(&self) -> &BTreeMap<String, String> {
        &self.faq_info
    }

    /// 新建或 reset 后的初始状态
    pub fn is_pristine(&self) -> bool {
        *self == Self::default()
    }

    pub(crate) fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            history_len: self.history.len(),
            category: self.category,
            response: self.response.clone(),
        }
    }

    /// 撤销 checkpoint 之后的全部改动
    pub(crate) fn rollback(&mut self, checkpoint: Checkpoint) {
        self.history.truncate(checkpoint.history_len);
        self.category = checkpoint.category;
        self.response = checkpoint.response;
        self.clear_transient();
    }

    pub(crate) fn push_user(&mut self, text: &str) {
        self.history.push(Turn::new(TurnRole::User, text));
    }

    pub(crate) fn set_category(&mut self, intent: Intent) {
        self.category = Some(intent);
    }

    pub(crate) fn record_response(&mut self, text: &str) {
        self.history.push(Turn::new(TurnRole::Assistant, text));
        self.response = text.to_string();
    }

    pub(crate) fn attach(&mut self, product_info: Vec<Product>, faq_info: BTreeMap<String, String>) {
        self.product_info = product_info;
        self.faq_info = faq_info;
    }

    /// 读取本轮上下文；必须在 clear_transient 之前调用
    pub(crate) fn context_snapshot(&self, category: Intent) -> Result<TurnContext, serde_json::Error> {
        Ok(TurnContext {
            category,
            product_info: serde_json::to_string(&self.product_info)?,
            faq_info: serde_json::to_string(&self.faq_info)?,
        })
    }

    pub(crate) fn clear_transient(&mut self) {
        self.product_info.clear();
        self.faq_info.clear();
    }
}
