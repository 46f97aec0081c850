//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，每次调用产出一条 [`ToolInvocation`]：
//! 成功时带结果，失败/超时/未知工具时带错误文本，绝不向编排层抛出错误。每次调用输出结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::memory::preview;
use crate::tools::{Tool, ToolRegistry};

/// 一次工具调用的记录；只存在于本轮的草稿记录中
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub arguments: Value,
    pub result: Option<String>,
    pub error: Option<String>,
}

impl ToolInvocation {
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }

    /// 回灌给模型的观察文本
    pub fn observation(&self) -> String {
        match (&self.result, &self.error) {
            (_, Some(err)) => format!("Error: {}", err),
            (Some(out), None) => out.clone(),
            (None, None) => String::new(),
        }
    }
}

/// 工具执行器：对每次调用施加超时
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 原始执行：超时返回 ToolTimeout，工具返回 Err 则转为 ToolExecutionFailed，未知工具为 HallucinatedTool
    pub async fn try_execute(&self, tool_name: &str, args: Value) -> Result<String, AgentError> {
        if !self.registry.contains(tool_name) {
            audit(tool_name, false, "unknown_tool", 0, &args);
            return Err(AgentError::HallucinatedTool(tool_name.to_string()));
        }
        let start = Instant::now();
        let args_for_log = args.clone();
        let result = timeout(self.timeout, self.registry.execute(tool_name, args)).await;

        let (ok, outcome): (bool, &str) = match &result {
            Ok(Ok(_)) => (true, "ok"),
            Ok(Err(_)) => (false, "error"),
            Err(_) => (false, "timeout"),
        };
        audit(
            tool_name,
            ok,
            outcome,
            start.elapsed().as_millis() as u64,
            &args_for_log,
        );

        match result {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailed(e)),
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        }
    }

    /// 执行并记录为 ToolInvocation；错误折叠进 error 字段
    pub async fn execute(&self, tool_name: &str, args: Value) -> ToolInvocation {
        let result = self.try_execute(tool_name, args.clone()).await;
        let (result, error) = match result {
            Ok(out) => (Some(out), None),
            Err(AgentError::ToolExecutionFailed(msg)) => (None, Some(msg)),
            Err(AgentError::ToolTimeout(tool)) => (
                None,
                Some(format!(
                    "tool {} timed out after {}s",
                    tool,
                    self.timeout.as_secs()
                )),
            ),
            Err(AgentError::HallucinatedTool(tool)) => (
                None,
                Some(format!(
                    "tool '{}' does not exist; available tools: {}",
                    tool,
                    self.registry.tool_names().join(", ")
                )),
            ),
            Err(other) => (None, Some(other.to_string())),
        };
        ToolInvocation {
            tool_name: tool_name.to_string(),
            arguments: args,
            result,
            error,
        }
    }

    pub fn get_tool(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.registry.get(name)
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn audit(tool_name: &str, ok: bool, outcome: &str, duration_ms: u64, args: &Value) {
    let audit = serde_json::json!({
        "event": "tool_audit",
        "tool": tool_name,
        "ok": ok,
        "outcome": outcome,
        "duration_ms": duration_ms,
        "args_preview": preview(&args.to_string(), 200),
    });
    tracing::info!(audit = %audit.to_string(), "tool");
}
