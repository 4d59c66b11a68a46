//! Storebot - 商品目录对话助手
//!
//! 入口：加载配置、初始化日志、装配会话管理器，然后逐行读取 stdin 作为用户消息。
//! `/reset` 重置会话，`/quit` 退出。

use std::path::PathBuf;

use anyhow::Context;
use storebot::config::load_config;
use storebot::{observability, ChatBuilder};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// 解析 `--config <PATH>`
fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    None
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = config_path_from_args();
    let cfg = load_config(config_path.clone())
        .with_context(|| format!("Failed to load config ({:?})", config_path))?;

    observability::init(&cfg.log).context("Failed to initialize logging")?;

    let sessions = ChatBuilder::new(cfg)
        .build()
        .context("Failed to build chat components")?;

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    stdout
        .write_all(b"Type a message, /reset to start over, /quit to exit.\n> ")
        .await?;
    stdout.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        match input {
            "" => {}
            "/quit" | "/exit" => break,
            "/reset" => {
                sessions.reset();
                stdout.write_all(b"Conversation reset.\n").await?;
            }
            message => match sessions.process(message).await {
                Ok(outcome) => {
                    tracing::debug!(
                        category = %outcome.context.category,
                        product_info = %outcome.context.product_info,
                        faq_info = %outcome.context.faq_info,
                        "Turn context"
                    );
                    stdout.write_all(outcome.response.as_bytes()).await?;
                    stdout.write_all(b"\n").await?;
                }
                Err(e) => {
                    tracing::error!("Turn failed: {}", e);
                    stdout
                        .write_all(format!("Sorry, something went wrong: {}\n", e).as_bytes())
                        .await?;
                }
            },
        }
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
    }

    Ok(())
}
