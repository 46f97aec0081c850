//! Arxiv Agent - 科研论文助手
//!
//! 入口：初始化文件日志、按配置创建会话与编排器，并运行 TUI 主循环。

use std::path::{Path, PathBuf};

use anyhow::Context;
use arxiv_agent::{core::create_agent, observability, ui::run_app};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // TUI 占用终端，日志写到 logs/arxiv-agent.log
    observability::init_file(Path::new("logs")).context("Failed to open log file")?;

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let (cmd_tx, state_rx) = create_agent(config_path)
        .await
        .context("Failed to create agent (run arxiv-agent-index first to build the local index)")?;

    run_app(state_rx, cmd_tx).await.context("App run failed")?;

    Ok(())
}
