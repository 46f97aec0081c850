//! ReAct 过程事件：供 TUI 展示思考、工具调用、路由干预、观察与回复

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactEvent {
    /// 步数更新（当前第几步）
    StepUpdate { step: usize, max_steps: usize },
    /// 正在调用 LLM
    Thinking,
    /// LLM 原始输出预览
    ThinkingContent { text: String },
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览）
    Observation { tool: String, preview: String },
    /// 工具执行失败（错误已作为观察回灌给模型）
    ToolFailure { tool: String, reason: String },
    /// 路由策略拒绝了一次工具调用，或由编排器自动补发了一次调用
    RoutingIntervention { tool: String, detail: String },
    /// 错误恢复动作（RetryWithPrompt / Abort）
    Recovery { action: String, detail: String },
    /// 最终回复的一小段
    MessageChunk { text: String },
    /// 最终回复结束
    MessageDone,
    /// 达到步数上限，返回尽力而为的回复
    StepLimitReached { max_steps: usize },
    /// Token 使用统计（本轮增量）
    TokenUsage {
        prompt_tokens: u64,
        completion_tokens: u64,
        total_tokens: u64,
    },
    Error { text: String },
}

impl ReactEvent {
    /// 状态栏上展示的一行文字；不需要展示的事件返回 None
    pub fn status_line(&self) -> Option<String> {
        match self {
            ReactEvent::StepUpdate { step, max_steps } => Some(format!("Step {}/{}", step + 1, max_steps)),
            ReactEvent::Thinking => Some("Thinking...".to_string()),
            ReactEvent::ToolCall { tool, .. } => Some(format!("Calling {}", tool)),
            ReactEvent::ToolFailure { tool, reason } => Some(format!("{} failed: {}", tool, reason)),
            ReactEvent::RoutingIntervention { tool, detail } => Some(format!("{}: {}", tool, detail)),
            ReactEvent::StepLimitReached { max_steps } => {
                Some(format!("Step limit ({}) reached", max_steps))
            }
            ReactEvent::Error { text } => Some(text.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let ev = ReactEvent::RoutingIntervention {
            tool: "download_pdf_file_tool".to_string(),
            detail: "refused".to_string(),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(v["type"], "routing_intervention");
        assert_eq!(v["tool"], "download_pdf_file_tool");
    }

    #[test]
    fn test_status_line() {
        assert_eq!(
            ReactEvent::StepUpdate { step: 0, max_steps: 10 }.status_line().as_deref(),
            Some("Step 1/10")
        );
        assert!(ReactEvent::MessageDone.status_line().is_none());
    }
}
