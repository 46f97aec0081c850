//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 RetryWithPrompt / Abort。
//! 错误作用域最多为一轮对话，任何错误都不会让整个进程退出。

use thiserror::Error;

use crate::arxiv::ArxivError;
use crate::store::StoreError;

/// 单轮对话中可能出现的错误（模型调用、解析、工具、配置、索引）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Hallucinated tool: {0}")]
    HallucinatedTool(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Cancelled by user")]
    Cancelled,

    #[error("Config error: {0}")]
    ConfigError(String),

    /// 检索前索引必须已存在（前置条件）
    #[error("Index missing: {0}")]
    IndexMissing(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Paper source error: {0}")]
    Source(#[from] ArxivError),
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone)]
pub enum RecoveryAction {
    /// 将提示注入下一轮，让 LLM 重试（如 JSON 格式错误）
    RetryWithPrompt(String),
    /// 终止当前轮
    Abort,
}
