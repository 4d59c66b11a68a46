//! Prompt 模板存储
//!
//! 启动时加载一次的「模板名 → 模板文本」映射（TOML，每个键一个模板）。
//! 占位符写作 `{name}`，渲染时只替换调用方提供的变量，其余花括号原样保留（模板里可以直接写 JSON 示例）。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub const CLASSIFY_MESSAGE: &str = "classify_message";
pub const PRODUCTS_SYSTEM_MESSAGE: &str = "products_system_message";
pub const FAQ_SYSTEM_MESSAGE: &str = "faq_system_message";

/// 对话层必须存在的模板
pub const REQUIRED_TEMPLATES: [&str; 3] =
    [CLASSIFY_MESSAGE, PRODUCTS_SYSTEM_MESSAGE, FAQ_SYSTEM_MESSAGE];

const DEFAULT_CLASSIFY_MESSAGE: &str = "\
You are the message router of an online shop assistant.
Classify the latest user message into exactly one category:
- \"products\": the user asks about products in the catalog (availability, prices, tags, categories, descriptions, recommendations).
- \"faq\": anything else (greetings, opening hours, shipping, returns, payments, general questions about the shop).

{format_instruction}";

const DEFAULT_PRODUCTS_SYSTEM_MESSAGE: &str = "\
You are a helpful shop assistant. Answer the customer using only the product catalog below.
If the catalog does not contain what the customer is looking for, say so plainly and do not invent products.
Keep the answer short and mention names and prices when relevant.

Product catalog (JSON):
{products_info}";

const DEFAULT_FAQ_SYSTEM_MESSAGE: &str = "\
You are a friendly customer support assistant for an online shop.
Answer general questions briefly and politely.
If you do not know the answer, say so and suggest contacting the shop's support team.";

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("failed to read prompt file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid prompt file: {0}")]
    Parse(String),

    #[error("missing prompt template: {0}")]
    MissingTemplate(String),
}

#[derive(Debug, Clone)]
pub struct PromptStore {
    templates: HashMap<String, String>,
}

impl PromptStore {
    /// 内置模板（未找到模板文件时使用）
    pub fn builtin() -> Self {
        let templates = [
            (CLASSIFY_MESSAGE, DEFAULT_CLASSIFY_MESSAGE),
            (PRODUCTS_SYSTEM_MESSAGE, DEFAULT_PRODUCTS_SYSTEM_MESSAGE),
            (FAQ_SYSTEM_MESSAGE, DEFAULT_FAQ_SYSTEM_MESSAGE),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        Self { templates }
    }

    /// 解析 TOML 文本；缺少任一必需模板即报错
    pub fn from_toml_str(content: &str) -> Result<Self, PromptError> {
        let templates: HashMap<String, String> =
            toml::from_str(content).map_err(|e| PromptError::Parse(e.to_string()))?;
        for name in REQUIRED_TEMPLATES {
            if !templates.contains_key(name) {
                return Err(PromptError::MissingTemplate(name.to_string()));
            }
        }
        Ok(Self { templates })
    }

    pub fn load(path: &Path) -> Result<Self, PromptError> {
        let content = std::fs::read_to_string(path).map_err(|source| PromptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// 显式路径必须可读；否则依次查找 config/prompts.toml、../config/prompts.toml，都没有则用内置模板
    pub fn discover(explicit: Option<&Path>) -> Result<Self, PromptError> {
        if let Some(path) = explicit {
            let store = Self::load(path)?;
            tracing::info!(path = %path.display(), "Prompt templates loaded");
            return Ok(store);
        }

        for candidate in ["config/prompts.toml", "../config/prompts.toml"] {
            let path = Path::new(candidate);
            if path.exists() {
                let store = Self::load(path)?;
                tracing::info!(path = %path.display(), "Prompt templates loaded");
                return Ok(store);
            }
        }

        tracing::info!("No prompt file found, using built-in templates");
        Ok(Self::builtin())
    }

    pub fn get(&self, name: &str) -> Result<&str, PromptError> {
        self.templates
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| PromptError::MissingTemplate(name.to_string()))
    }

    /// 取模板并替换 `{key}` 占位符
    pub fn render(&self, name: &str, vars: &[(&str, &str)]) -> Result<String, PromptError> {
        Ok(render_template(self.get(name)?, vars))
    }
}

/// 单遍替换：已插入的值不会被再次展开
fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(pos) = rest.find('{') {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + 1..];
        let hit = vars
            .iter()
            .find(|(key, _)| tail.starts_with(key) && tail[key.len()..].starts_with('}'));
        match hit {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len() + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}
