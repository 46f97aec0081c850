//! 错误恢复引擎
//!
//! 根据 AgentError 类型返回 RecoveryAction，供 ReAct 循环决定是带提示重试还是终止本轮。
//! 工具层错误由 ToolExecutor 折叠为观察回灌给模型，不经过这里。

use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：将错误映射为可执行动作
#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &AgentError) -> RecoveryAction {
        match err {
            AgentError::JsonParseError(raw) => RecoveryAction::RetryWithPrompt(format!(
                "Your previous output was not valid JSON: {raw}. \
                When calling a tool you must output exactly one JSON object and nothing else, \
                shaped as {{\"tool\": \"<tool name>\", \"args\": {{...}}}}. \
                Example: {{\"tool\": \"research_paper_query_tool\", \"args\": {{\"query\": \"diffusion models\"}}}}. \
                If you are answering the user, answer in plain text without any JSON."
            )),
            AgentError::LlmError(_)
            | AgentError::ToolExecutionFailed(_)
            | AgentError::ToolTimeout(_)
            | AgentError::HallucinatedTool(_)
            | AgentError::Cancelled
            | AgentError::ConfigError(_)
            | AgentError::IndexMissing(_)
            | AgentError::Store(_)
            | AgentError::Source(_) => RecoveryAction::Abort,
        }
    }
}
