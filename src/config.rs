//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `STOREBOT__*` 覆盖（双下划线表示嵌套，如 `STOREBOT__LLM__PROVIDER=groq`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub llm: LlmSection,
    #[serde(default)]
    pub catalog: CatalogSection,
    #[serde(default)]
    pub prompts: PromptsSection,
    #[serde(default)]
    pub log: LogSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_app_name")]
    pub name: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: default_app_name(),
        }
    }
}

fn default_app_name() -> String {
    "storebot".to_string()
}

/// [llm] 段：后端、模型、采样参数、重试与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// 后端：openai / deepseek / groq / azure / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// 覆盖 provider 的默认端点（自建代理等）；azure 必填（资源 endpoint）
    pub base_url: Option<String>,
    /// 仅 azure 使用
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    /// 失败后最多再试几次（0 表示不重试）
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_version: default_api_version(),
            temperature: 0.0,
            max_tokens: None,
            max_retries: 0,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_version() -> String {
    "2024-10-21".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒）
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    60
}

/// [catalog] 段：商品库 SQLite 文件
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogSection {
    #[serde(default = "default_catalog_database")]
    pub database: PathBuf,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            database: default_catalog_database(),
        }
    }
}

fn default_catalog_database() -> PathBuf {
    PathBuf::from("data/catalog.db")
}

/// [prompts] 段：模板文件路径，未设置时按默认位置查找，找不到用内置模板
#[derive(Debug, Clone, Deserialize, Default)]
pub struct PromptsSection {
    pub path: Option<PathBuf>,
}

/// [log] 段：日志级别与可选的日志文件（按周期切分，保留最近 max_files 个）
#[derive(Debug, Clone, Deserialize)]
pub struct LogSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    pub file: Option<PathBuf>,
    /// daily / hourly / minutely / never
    #[serde(default = "default_log_rotation")]
    pub rotation: String,
    #[serde(default = "default_log_max_files")]
    pub max_files: usize,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
            rotation: default_log_rotation(),
            max_files: default_log_max_files(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_rotation() -> String {
    "daily".to_string()
}

fn default_log_max_files() -> usize {
    7
}

/// 从 config 目录加载配置，环境变量 STOREBOT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 STOREBOT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("STOREBOT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
