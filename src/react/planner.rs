//! Planner：调用 LLM 与 Tool Call 解析
//!
//! 调用 LLM 得到回复或 JSON Tool Call；parse_llm_output 从文本中提取 JSON 并解析为 ToolCall 或直接回复。

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;

/// LLM 返回的 Tool Call（简化 JSON：{"tool": "fetch_from_arxiv", "args": {"topic": "..."}}）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

impl ToolCall {
    pub fn new(tool: impl Into<String>, args: serde_json::Value) -> Self {
        Self {
            tool: tool.into(),
            args,
        }
    }
}

/// Planner 输出
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerOutput {
    /// 直接回复用户
    Response(String),
    /// 需要执行工具
    ToolCall(ToolCall),
}

/// 解析 LLM 输出：若含有效 JSON 且 tool 非空则为 ToolCall，否则为 Response。
/// 文本里有花括号但既不是合法 JSON、也没有 "tool" 字段时按普通回复处理。
pub fn parse_llm_output(output: &str) -> Result<PlannerOutput, AgentError> {
    let trimmed = output.trim();

    // 尝试提取 JSON 块（```json ... ``` 或纯 JSON）
    let json_str = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```")
            .map(|end| rest[..end].trim())
            .unwrap_or(rest.trim())
    } else if let Some(start) = trimmed.find('{') {
        match trimmed.rfind('}') {
            Some(end) if end > start => &trimmed[start..=end],
            _ => return Ok(PlannerOutput::Response(trimmed.to_string())),
        }
    } else {
        return Ok(PlannerOutput::Response(trimmed.to_string()));
    };

    let parsed: ToolCall = match serde_json::from_str(json_str) {
        Ok(tc) => tc,
        Err(_) if !json_str.contains("\"tool\"") => {
            return Ok(PlannerOutput::Response(trimmed.to_string()));
        }
        Err(e) => return Err(AgentError::JsonParseError(format!("{}: {}", e, json_str))),
    };

    if parsed.tool.trim().is_empty() {
        Ok(PlannerOutput::Response(trimmed.to_string()))
    } else {
        Ok(PlannerOutput::ToolCall(parsed))
    }
}

/// Planner：持有 LLM 与 system prompt，每次调用时把 system 放在消息最前
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    system_prompt: String,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            llm,
            system_prompt: system_prompt.into(),
        }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    pub async fn plan(&self, messages: &[Message]) -> Result<String, AgentError> {
        let mut full_messages = Vec::with_capacity(messages.len() + 1);
        full_messages.push(Message::system(self.system_prompt.clone()));
        full_messages.extend_from_slice(messages);
        self.llm
            .complete(&full_messages)
            .await
            .map_err(AgentError::LlmError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_response() {
        let out = parse_llm_output("Diffusion models denoise data step by step.").unwrap();
        assert_eq!(
            out,
            PlannerOutput::Response("Diffusion models denoise data step by step.".to_string())
        );
    }

    #[test]
    fn test_parse_fenced_tool_call() {
        let raw = "I will search.\n```json\n{\"tool\": \"fetch_from_arxiv\", \"args\": {\"topic\": \"diffusion models\"}}\n```";
        match parse_llm_output(raw).unwrap() {
            PlannerOutput::ToolCall(tc) => {
                assert_eq!(tc.tool, "fetch_from_arxiv");
                assert_eq!(tc.args["topic"], "diffusion models");
            }
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_bare_json_without_args() {
        match parse_llm_output("{\"tool\": \"research_paper_query_tool\"}").unwrap() {
            PlannerOutput::ToolCall(tc) => assert!(tc.args.is_null()),
            other => panic!("expected tool call, got {other:?}"),
        }
    }

    #[test]
    fn test_braces_in_prose_are_a_response() {
        let out = parse_llm_output("The set {x | x > 0} is open.").unwrap();
        assert!(matches!(out, PlannerOutput::Response(_)));
    }

    #[test]
    fn test_broken_tool_json_is_parse_error() {
        let err = parse_llm_output("{\"tool\": \"fetch_from_arxiv\", \"args\": {\"topic\": }}").unwrap_err();
        assert!(matches!(err, AgentError::JsonParseError(_)));
    }
}
