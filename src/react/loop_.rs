//! ReAct 主循环（单轮）
//!
//! Plan -> 路由检查 -> Act (Tool) -> Observe -> 下一轮 Plan，直到模型给出回复或达到步数上限。
//! 工具调用与观察只写入本轮草稿，不进对话记忆；是否提交由调用方根据返回结果决定。
//! 每次推理迭代（一次模型调用及其引出的工具调用 / 拒绝 / 重试提示）和编排器补发的检索或抓取各计一步。

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, RecoveryAction, RecoveryEngine};
use crate::memory::{preview, Message};
use crate::react::{parse_llm_output, Planner, PlannerOutput, ReactEvent, RoutingPolicy, ToolCall, TurnState, Verdict};
use crate::tools::{ToolExecutor, ToolInvocation, ARXIV_TOOL};

/// 流式回复时每段字符数
const CHUNK_CHARS: usize = 24;
/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;
/// 思考内容展示最大字符数
const THINKING_PREVIEW_CHARS: usize = 800;
/// 步数耗尽时从最后一次观察中保留的字符数
const PARTIAL_ANSWER_CHARS: usize = 2000;

/// 一轮的结果
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub response: String,
    /// 本轮实际执行过的工具调用（按顺序）
    pub invocations: Vec<ToolInvocation>,
    pub steps: usize,
    pub hit_step_limit: bool,
}

impl TurnOutcome {
    pub fn tools_called(&self) -> Vec<&str> {
        self.invocations.iter().map(|i| i.tool_name.as_str()).collect()
    }
}

/// 单轮运行所需的依赖；编排器本身无状态，每轮重新组装
pub struct ReactSession<'a> {
    pub planner: &'a Planner,
    pub executor: &'a ToolExecutor,
    pub recovery: &'a RecoveryEngine,
    pub policy: &'a RoutingPolicy,
    pub max_steps: usize,
    pub cancel_token: CancellationToken,
    pub event_tx: Option<&'a UnboundedSender<ReactEvent>>,
}

impl<'a> ReactSession<'a> {
    pub fn new(
        planner: &'a Planner,
        executor: &'a ToolExecutor,
        recovery: &'a RecoveryEngine,
        policy: &'a RoutingPolicy,
        max_steps: usize,
    ) -> Self {
        Self {
            planner,
            executor,
            recovery,
            policy,
            max_steps: max_steps.max(1),
            cancel_token: CancellationToken::new(),
            event_tx: None,
        }
    }

    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<ReactEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn emit(&self, ev: ReactEvent) {
        if let Some(tx) = self.event_tx {
            let _ = tx.send(ev);
        }
    }

    async fn plan(&self, scratch: &[Message]) -> Result<String, AgentError> {
        tokio::select! {
            _ = self.cancel_token.cancelled() => Err(AgentError::Cancelled),
            out = self.planner.plan(scratch) => out,
        }
    }

    async fn act(&self, call: &ToolCall) -> Result<ToolInvocation, AgentError> {
        self.emit(ReactEvent::ToolCall {
            tool: call.tool.clone(),
            args: call.args.clone(),
        });
        let invocation = tokio::select! {
            _ = self.cancel_token.cancelled() => return Err(AgentError::Cancelled),
            inv = self.executor.execute(&call.tool, call.args.clone()) => inv,
        };
        let observation = invocation.observation();
        if let Some(reason) = &invocation.error {
            self.emit(ReactEvent::ToolFailure {
                tool: call.tool.clone(),
                reason: reason.clone(),
            });
        }
        self.emit(ReactEvent::Observation {
            tool: call.tool.clone(),
            preview: preview(&observation, OBSERVATION_PREVIEW_CHARS),
        });
        Ok(invocation)
    }

    fn finish(&self, response: &str) {
        let chars: Vec<char> = response.chars().collect();
        for chunk in chars.chunks(CHUNK_CHARS) {
            self.emit(ReactEvent::MessageChunk {
                text: chunk.iter().collect(),
            });
        }
        self.emit(ReactEvent::MessageDone);
    }
}

fn observation_message(tool: &str, observation: &str) -> Message {
    Message::user(format!("Observation from {}: {}", tool, observation))
}

/// 编排器补发调用时展示给用户的说明
fn forced_detail(tool: &str) -> &'static str {
    if tool == ARXIV_TOOL {
        "no local match; fetching recent papers before answering"
    } else {
        "checking the local knowledge base before answering"
    }
}

/// 补发调用的观察后附给模型的指示
fn forced_note(tool: &str) -> &'static str {
    if tool == ARXIV_TOOL {
        "The local knowledge base had no matching documents, so recent papers were fetched from arXiv. \
         Answer from these results and cite each paper's Title, Authors and Summary."
    } else {
        "The local knowledge base was searched for the user's question before answering. \
         Answer from these results when they are relevant."
    }
}

/// 步数耗尽时的尽力回复；总是非空
fn partial_answer(max_steps: usize, last: Option<&(String, String)>) -> String {
    match last {
        Some((tool, observation)) => format!(
            "I reached the limit of {} reasoning steps before finishing. \
             The last result I obtained (from {}) was:\n\n{}",
            max_steps,
            tool,
            preview(observation, PARTIAL_ANSWER_CHARS)
        ),
        None => format!(
            "I reached the limit of {} reasoning steps without finding an answer. \
             Please try rephrasing or narrowing the question.",
            max_steps
        ),
    }
}

/// 跑一轮：history 是对话记忆快照（只含 user/assistant），utterance 是本轮用户输入。
///
/// 返回 Err 表示本轮失败（模型调用失败、取消、无法恢复的解析错误），调用方不得提交到记忆。
pub async fn run_turn(
    session: &ReactSession<'_>,
    history: &[Message],
    utterance: &str,
) -> Result<TurnOutcome, AgentError> {
    let mut scratch: Vec<Message> = history.to_vec();
    scratch.push(Message::user(utterance.to_string()));

    let (init_prompt, init_completion, _) = session.planner.token_usage();
    let mut state = TurnState::default();
    let mut invocations: Vec<ToolInvocation> = Vec::new();
    let mut last_observation: Option<(String, String)> = None;
    let mut step = 0;

    loop {
        if session.cancel_token.is_cancelled() {
            session.emit(ReactEvent::Error {
                text: "Cancelled by user".to_string(),
            });
            return Err(AgentError::Cancelled);
        }

        if step >= session.max_steps {
            tracing::warn!(max_steps = session.max_steps, "step limit reached");
            session.emit(ReactEvent::StepLimitReached {
                max_steps: session.max_steps,
            });
            let response = partial_answer(session.max_steps, last_observation.as_ref());
            session.finish(&response);
            return Ok(TurnOutcome {
                response,
                invocations,
                steps: step,
                hit_step_limit: true,
            });
        }

        session.emit(ReactEvent::StepUpdate {
            step,
            max_steps: session.max_steps,
        });
        session.emit(ReactEvent::Thinking);
        let output = match session.plan(&scratch).await {
            Ok(o) => o,
            Err(e) => {
                if let RecoveryAction::Abort = session.recovery.handle(&e) {
                    session.emit(ReactEvent::Recovery {
                        action: "Abort".to_string(),
                        detail: e.to_string(),
                    });
                }
                session.emit(ReactEvent::Error { text: e.to_string() });
                tracing::error!(error = %e, "turn aborted");
                return Err(e);
            }
        };
        step += 1;
        session.emit(ReactEvent::ThinkingContent {
            text: preview(&output, THINKING_PREVIEW_CHARS),
        });

        match parse_llm_output(&output) {
            Ok(PlannerOutput::Response(text)) => {
                if let Some(forced) = session.policy.before_answer(utterance, &state) {
                    tracing::info!(tool = %forced.tool, args = %forced.args, "running routing call before answering");
                    session.emit(ReactEvent::RoutingIntervention {
                        tool: forced.tool.clone(),
                        detail: forced_detail(&forced.tool).to_string(),
                    });
                    if step >= session.max_steps {
                        continue;
                    }
                    step += 1;
                    let inv = session.act(&forced).await?;
                    state.record(&inv);
                    let observation = inv.observation();
                    scratch.push(Message::assistant(format!(
                        "Tool call: {} {}",
                        forced.tool, forced.args
                    )));
                    scratch.push(Message::user(format!(
                        "Observation from {}: {}\n\n{}",
                        forced.tool,
                        observation,
                        forced_note(&forced.tool)
                    )));
                    last_observation = Some((forced.tool.clone(), observation));
                    invocations.push(inv);
                    continue;
                }

                let response = if text.trim().is_empty() {
                    partial_answer(session.max_steps, last_observation.as_ref())
                } else {
                    text
                };
                session.finish(&response);
                let (cur_prompt, cur_completion, _) = session.planner.token_usage();
                let prompt_tokens = cur_prompt.saturating_sub(init_prompt);
                let completion_tokens = cur_completion.saturating_sub(init_completion);
                session.emit(ReactEvent::TokenUsage {
                    prompt_tokens,
                    completion_tokens,
                    total_tokens: prompt_tokens + completion_tokens,
                });
                return Ok(TurnOutcome {
                    response,
                    invocations,
                    steps: step,
                    hit_step_limit: false,
                });
            }
            Ok(PlannerOutput::ToolCall(tc)) => {
                scratch.push(Message::assistant(output.clone()));
                match session.policy.vet(utterance, &state, &tc) {
                    Verdict::Refuse(reason) => {
                        tracing::info!(tool = %tc.tool, "tool call refused by routing policy");
                        session.emit(ReactEvent::RoutingIntervention {
                            tool: tc.tool.clone(),
                            detail: reason.clone(),
                        });
                        scratch.push(observation_message(&tc.tool, &format!("Refused: {}", reason)));
                    }
                    Verdict::Allow => {
                        let inv = session.act(&tc).await?;
                        state.record(&inv);
                        let observation = inv.observation();
                        scratch.push(observation_message(&tc.tool, &observation));
                        last_observation = Some((tc.tool.clone(), observation));
                        invocations.push(inv);
                    }
                }
            }
            Err(e) => match session.recovery.handle(&e) {
                RecoveryAction::RetryWithPrompt(prompt) => {
                    session.emit(ReactEvent::Recovery {
                        action: "RetryWithPrompt".to_string(),
                        detail: prompt.clone(),
                    });
                    scratch.push(Message::assistant(output.clone()));
                    scratch.push(Message::user(prompt));
                }
                _ => {
                    session.emit(ReactEvent::Error { text: e.to_string() });
                    return Err(e);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use crate::tools::{Tool, ToolRegistry, ARXIV_TOOL, DOWNLOAD_TOOL, KNOWLEDGE_TOOL, NO_LOCAL_MATCHES};
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::Arc;

    /// 固定输出的假工具
    struct Canned {
        name: &'static str,
        output: Result<String, String>,
    }

    #[async_trait]
    impl Tool for Canned {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "canned"
        }
        async fn execute(&self, _args: Value) -> Result<String, String> {
            self.output.clone()
        }
    }

    fn executor(local: Result<&str, &str>, remote: Result<&str, &str>) -> ToolExecutor {
        let mut reg = ToolRegistry::new();
        reg.register(Canned {
            name: KNOWLEDGE_TOOL,
            output: local.map(String::from).map_err(String::from),
        });
        reg.register(Canned {
            name: ARXIV_TOOL,
            output: remote.map(String::from).map_err(String::from),
        });
        reg.register(Canned {
            name: DOWNLOAD_TOOL,
            output: Ok("PDF downloaded successfully and saved as: papers/x.pdf".to_string()),
        });
        ToolExecutor::new(reg, 5)
    }

    fn call(tool: &str, args: Value) -> String {
        serde_json::json!({"tool": tool, "args": args}).to_string()
    }

    async fn run(
        llm: Arc<ScriptedLlmClient>,
        exec: &ToolExecutor,
        max_steps: usize,
        utterance: &str,
    ) -> Result<TurnOutcome, AgentError> {
        let planner = Planner::new(llm, "system");
        let recovery = RecoveryEngine::new();
        let policy = RoutingPolicy::new().unwrap();
        let session = ReactSession::new(&planner, exec, &recovery, &policy, max_steps);
        run_turn(&session, &[], utterance).await
    }

    #[tokio::test]
    async fn test_local_hit_answers_directly() {
        let llm = Arc::new(ScriptedLlmClient::new([
            call(KNOWLEDGE_TOOL, serde_json::json!({"query": "transformers"})),
            "Transformers use attention.".to_string(),
        ]));
        let exec = executor(Ok("Top 1 local result(s) ... score=0.812"), Ok("unused"));
        let out = run(llm.clone(), &exec, 10, "tell me about transformers").await.unwrap();
        assert_eq!(out.response, "Transformers use attention.");
        assert_eq!(out.tools_called(), vec![KNOWLEDGE_TOOL]);
        // 模型在第二次调用时看到了带分数的观察
        let second = &llm.calls()[1];
        assert!(second.last().unwrap().content.contains("score=0.812"));
    }

    #[tokio::test]
    async fn test_empty_local_forces_remote_fetch() {
        let empty = format!("{} for \"diffusion models\".", NO_LOCAL_MATCHES);
        let llm = Arc::new(ScriptedLlmClient::new([
            call(KNOWLEDGE_TOOL, serde_json::json!({"query": "diffusion models"})),
            "I have no information about that.".to_string(),
            "Recent work: Paper A by Ada.".to_string(),
        ]));
        let exec = executor(Ok(&empty), Ok("Fetched 1 recent paper(s)\n[1] Title: Paper A\nAuthors: Ada"));
        let out = run(llm.clone(), &exec, 10, "diffusion models").await.unwrap();
        assert_eq!(out.tools_called(), vec![KNOWLEDGE_TOOL, ARXIV_TOOL]);
        assert_eq!(out.invocations[1].arguments["topic"], "diffusion models");
        assert_eq!(out.response, "Recent work: Paper A by Ada.");
    }

    #[tokio::test]
    async fn test_download_refused_without_directive() {
        let llm = Arc::new(ScriptedLlmClient::new([
            call(DOWNLOAD_TOOL, serde_json::json!({"url": "http://arxiv.org/pdf/1", "output_file_name": "t.pdf"})),
            "Transformers are sequence models.".to_string(),
            "Transformers are attention-based sequence models.".to_string(),
        ]));
        let exec = executor(Ok("hit"), Ok("unused"));
        let out = run(llm.clone(), &exec, 10, "tell me about transformers").await.unwrap();
        assert!(llm.calls()[1].last().unwrap().content.contains("Refused"));
        // 拒绝后直接作答，编排器先补查本地
        assert_eq!(out.tools_called(), vec![KNOWLEDGE_TOOL]);
        assert_eq!(out.response, "Transformers are attention-based sequence models.");
    }

    #[tokio::test]
    async fn test_direct_answer_runs_local_query_then_remote_fetch() {
        let empty = format!("{} for \"diffusion models\".", NO_LOCAL_MATCHES);
        let llm = Arc::new(ScriptedLlmClient::new([
            "I have no information about diffusion models.".to_string(),
            "Still nothing on that.".to_string(),
            "Recent work: Paper A by Ada.".to_string(),
        ]));
        let exec = executor(Ok(&empty), Ok("Fetched 1 recent paper(s)\n[1] Title: Paper A\nAuthors: Ada"));
        let out = run(llm.clone(), &exec, 10, "diffusion models").await.unwrap();
        assert_eq!(out.tools_called(), vec![KNOWLEDGE_TOOL, ARXIV_TOOL]);
        assert_eq!(out.invocations[0].arguments["query"], "diffusion models");
        assert_eq!(out.invocations[1].arguments["topic"], "diffusion models");
        assert_eq!(out.response, "Recent work: Paper A by Ada.");
        // 三次模型调用加两次补发调用
        assert_eq!(out.steps, 5);
        assert!(llm.calls()[1].last().unwrap().content.starts_with(&format!("Observation from {}", KNOWLEDGE_TOOL)));
    }

    #[tokio::test]
    async fn test_greeting_is_answered_without_tools() {
        let llm = Arc::new(ScriptedLlmClient::new(["Hello! Ask me about papers."]));
        let exec = executor(Ok("hit"), Ok("unused"));
        let out = run(llm.clone(), &exec, 10, "hello there").await.unwrap();
        assert!(out.invocations.is_empty());
        assert_eq!(out.steps, 1);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_forced_query_respects_step_limit() {
        let llm = Arc::new(ScriptedLlmClient::new(["Diffusion models denoise images."]));
        let exec = executor(Ok("hit"), Ok("unused"));
        let out = run(llm.clone(), &exec, 1, "diffusion models").await.unwrap();
        assert!(out.hit_step_limit);
        assert_eq!(out.steps, 1);
        assert!(out.invocations.is_empty());
        assert!(!out.response.trim().is_empty());
    }

    #[tokio::test]
    async fn test_failing_tools_terminate_within_step_limit() {
        let llm = Arc::new(ScriptedLlmClient::new(
            std::iter::repeat(call(KNOWLEDGE_TOOL, serde_json::json!({"query": "gnn"}))).take(20),
        ));
        let exec = executor(Err("vector store unavailable"), Err("HTTP 503"));
        let out = run(llm.clone(), &exec, 4, "graph neural networks").await.unwrap();
        assert!(out.hit_step_limit);
        assert!(out.steps <= 4);
        assert!(!out.response.trim().is_empty());
        assert!(llm.call_count() <= 4);
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let llm = Arc::new(ScriptedLlmClient::new(Vec::<String>::new()));
        llm.push_error("503 Service Unavailable");
        let exec = executor(Ok("hit"), Ok("unused"));
        let err = run(llm, &exec, 10, "anything").await.unwrap_err();
        assert!(matches!(err, AgentError::LlmError(_)));
    }

    #[tokio::test]
    async fn test_malformed_json_is_retried() {
        let llm = Arc::new(ScriptedLlmClient::new([
            "{\"tool\": \"research_paper_query_tool\", \"args\": {\"query\": }}".to_string(),
            call(KNOWLEDGE_TOOL, serde_json::json!({"query": "rag"})),
            "Plain answer.".to_string(),
        ]));
        let exec = executor(Ok("hit"), Ok("unused"));
        let out = run(llm.clone(), &exec, 10, "explain rag").await.unwrap();
        assert_eq!(out.response, "Plain answer.");
        assert!(llm.calls()[1].last().unwrap().content.contains("not valid JSON"));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_reported_back_to_the_model() {
        let llm = Arc::new(ScriptedLlmClient::new([
            call("search_google", serde_json::json!({"q": "rag"})),
            call(KNOWLEDGE_TOOL, serde_json::json!({"query": "rag"})),
            "RAG retrieves before generating.".to_string(),
        ]));
        let exec = executor(Ok("hit"), Ok("unused"));
        let out = run(llm.clone(), &exec, 10, "explain rag").await.unwrap();
        assert_eq!(out.tools_called(), vec!["search_google", KNOWLEDGE_TOOL]);
        assert!(!out.invocations[0].ok());
        let binding = llm.calls();
        let observed = &binding[1].last().unwrap().content;
        assert!(observed.contains("does not exist"));
        assert!(observed.contains(KNOWLEDGE_TOOL));
        assert_eq!(out.response, "RAG retrieves before generating.");
    }

    #[tokio::test]
    async fn test_cancelled_turn_returns_error() {
        let llm = Arc::new(ScriptedLlmClient::new(["never used"]));
        let exec = executor(Ok("hit"), Ok("unused"));
        let planner = Planner::new(llm, "system");
        let recovery = RecoveryEngine::new();
        let policy = RoutingPolicy::new().unwrap();
        let token = CancellationToken::new();
        token.cancel();
        let session = ReactSession::new(&planner, &exec, &recovery, &policy, 10).with_cancel_token(token);
        assert!(matches!(run_turn(&session, &[], "x").await, Err(AgentError::Cancelled)));
    }
}
