//! 状态定义：UiState 投影
//!
//! UI 只持有轻量的 UiState（阶段、滚动历史、锁、错误、状态提示）；完整会话状态由编排器维护并投影到 UiState。

use serde::Serialize;

use crate::memory::Message;

/// UI 看到的「投影」状态，轻量且易于渲染
#[derive(Clone, Debug, Serialize)]
pub struct UiState {
    pub phase: AgentPhase,
    /// UI 滚动历史（与对话记忆独立：记忆会按 token 预算淘汰，滚动历史保留到 Reset）
    pub history: Vec<Message>,
    pub active_tool: Option<String>,
    pub input_locked: bool,
    pub error_message: Option<String>,
    /// 一行状态提示（上传结果、步数等）
    pub status: Option<String>,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            phase: AgentPhase::Idle,
            history: Vec::new(),
            active_tool: None,
            input_locked: false,
            error_message: None,
            status: None,
        }
    }
}

/// Agent 阶段（UI 投影用），与轮内状态机 Idle → Routing → ToolCall* → Synthesizing 对应
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub enum AgentPhase {
    Idle,
    Routing,
    ToolExecuting,
    Synthesizing,
    Ingesting,
    Error,
}
