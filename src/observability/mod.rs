//! 可观测性：tracing 订阅器初始化
//!
//! TUI 占用终端时日志写入文件（init_file），命令行工具直接输出到 stderr（init）。
//! 默认级别 info，可通过 RUST_LOG 覆盖。

use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 日志文件名（位于 log_dir 下）
pub const LOG_FILE_NAME: &str = "arxiv-agent.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// 输出到 stderr
pub fn init() {
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

/// 输出到 log_dir/arxiv-agent.log（追加写），避免干扰 TUI 画面
pub fn init_file(log_dir: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(log_dir)?;
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join(LOG_FILE_NAME))?;
    let _ = tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        .try_init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_file_creates_log() {
        let dir = tempfile::TempDir::new().unwrap();
        let log_dir = dir.path().join("logs");
        init_file(&log_dir).unwrap();
        assert!(log_dir.join(LOG_FILE_NAME).exists());
    }
}
