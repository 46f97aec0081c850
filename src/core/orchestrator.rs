//! 主控循环：UI 命令 -> 会话
//!
//! 建立 cmd / state 两条通道，后台任务消费用户命令（Submit / Cancel / Reset / Upload / Quit）。
//! 每轮对话与上传在独立任务中执行，主循环保持可响应以便随时取消；同一时刻最多一个进行中的任务。
//! UI 的滚动历史由这里维护，与对话记忆独立（记忆会按预算淘汰，滚动历史保留到 Reset）。

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::agent::{handle_turn, AgentSession, TurnOptions};
use crate::config::load_config_or_default;
use crate::core::{AgentError, AgentPhase, SessionSupervisor, UiState};
use crate::memory::Message;
use crate::react::{ReactEvent, TurnOutcome};

/// 从 UI 发往编排器的用户命令
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// 提交用户输入，跑一轮
    Submit(String),
    /// 取消当前轮
    Cancel,
    /// 清空滚动历史与对话记忆
    Reset,
    /// 导入本地文件到文档库
    Upload(Vec<PathBuf>),
    /// 退出应用
    Quit,
}

/// 后台任务完成后回报给主循环
enum Finished {
    Turn {
        generation: u64,
        result: Result<TurnOutcome, AgentError>,
    },
    Upload {
        generation: u64,
        ok: bool,
        message: String,
    },
}

/// 按配置创建会话并启动主控循环
pub async fn create_agent(
    config_path: Option<PathBuf>,
) -> anyhow::Result<(mpsc::UnboundedSender<Command>, watch::Receiver<UiState>)> {
    let cfg = load_config_or_default(config_path);
    let session = AgentSession::from_config(cfg).await?;
    Ok(spawn_orchestrator(Arc::new(session)))
}

/// 启动主控循环；返回命令发送端与 UI 状态接收端
pub fn spawn_orchestrator(
    session: Arc<AgentSession>,
) -> (mpsc::UnboundedSender<Command>, watch::Receiver<UiState>) {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (state_tx, state_rx) = watch::channel(UiState::default());
    let state_tx = Arc::new(state_tx);
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Finished>();
    let supervisor = Arc::new(SessionSupervisor::new());

    tokio::spawn(async move {
        let mut scrollback: Vec<Message> = Vec::new();
        // Reset 后递增，丢弃 Reset 之前发起的任务结果
        let mut generation: u64 = 0;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break };
                    match cmd {
                        Command::Submit(input) => {
                            if supervisor.is_busy() {
                                state_tx.send_modify(|s| s.status = Some("Busy, press Ctrl+C to cancel".to_string()));
                                continue;
                            }
                            scrollback.push(Message::user(input.clone()));
                            let history = scrollback.clone();
                            state_tx.send_modify(|s| {
                                s.phase = AgentPhase::Routing;
                                s.history = history;
                                s.input_locked = true;
                                s.error_message = None;
                                s.status = None;
                            });

                            let token = supervisor.begin_turn();
                            let (event_tx, event_rx) = mpsc::unbounded_channel::<ReactEvent>();
                            tokio::spawn(project_events(event_rx, Arc::clone(&state_tx)));

                            let session = Arc::clone(&session);
                            let done_tx = done_tx.clone();
                            let gen = generation;
                            tokio::spawn(async move {
                                let options = TurnOptions { cancel_token: token, event_tx: Some(event_tx) };
                                let result = handle_turn(&session, &input, options).await;
                                let _ = done_tx.send(Finished::Turn { generation: gen, result });
                            });
                        }
                        Command::Cancel => {
                            if supervisor.cancel() {
                                tracing::info!("cancel requested");
                            }
                        }
                        Command::Reset => {
                            supervisor.cancel();
                            generation += 1;
                            scrollback.clear();
                            // 被取消的轮释放记忆锁后才清空；之后的命令排在清空之后
                            session.reset().await;
                            supervisor.end_turn();
                            state_tx.send_replace(UiState::default());
                        }
                        Command::Upload(files) => {
                            if supervisor.is_busy() {
                                state_tx.send_modify(|s| s.status = Some("Busy, try the upload again later".to_string()));
                                continue;
                            }
                            let _ = supervisor.begin_turn();
                            state_tx.send_modify(|s| {
                                s.phase = AgentPhase::Ingesting;
                                s.input_locked = true;
                                s.status = Some(format!("Ingesting {} file(s)...", files.len()));
                            });
                            let session = Arc::clone(&session);
                            let done_tx = done_tx.clone();
                            let gen = generation;
                            tokio::spawn(async move {
                                let (ok, message) = session.upload(&files).await;
                                let _ = done_tx.send(Finished::Upload { generation: gen, ok, message });
                            });
                        }
                        Command::Quit => break,
                    }
                }
                Some(finished) = done_rx.recv() => {
                    let (Finished::Turn { generation: gen, .. } | Finished::Upload { generation: gen, .. }) = &finished;
                    if *gen != generation {
                        tracing::debug!(generation = *gen, "dropping result from before reset");
                        continue;
                    }
                    supervisor.end_turn();
                    match finished {
                        Finished::Turn { result: Ok(outcome), .. } => {
                            scrollback.push(Message::assistant(outcome.response));
                            let history = scrollback.clone();
                            state_tx.send_modify(|s| {
                                s.phase = AgentPhase::Idle;
                                s.history = history;
                                s.active_tool = None;
                                s.input_locked = false;
                                s.status = outcome
                                    .hit_step_limit
                                    .then(|| format!("Stopped after {} steps", outcome.steps));
                            });
                        }
                        Finished::Turn { result: Err(e), .. } => {
                            tracing::warn!(error = %e, "turn failed");
                            let cancelled = matches!(e, AgentError::Cancelled);
                            state_tx.send_modify(|s| {
                                s.phase = if cancelled { AgentPhase::Idle } else { AgentPhase::Error };
                                s.active_tool = None;
                                s.input_locked = false;
                                s.error_message = (!cancelled).then(|| e.to_string());
                                s.status = cancelled.then(|| "Cancelled".to_string());
                            });
                        }
                        Finished::Upload { ok, message, .. } => {
                            state_tx.send_modify(|s| {
                                s.phase = if ok { AgentPhase::Idle } else { AgentPhase::Error };
                                s.input_locked = false;
                                if ok {
                                    s.status = Some(message);
                                } else {
                                    s.error_message = Some(message);
                                }
                            });
                        }
                    }
                }
            }
        }
        supervisor.cancel();
    });

    (cmd_tx, state_rx)
}

/// 把过程事件投影到 UI 状态（阶段、当前工具、状态行）
async fn project_events(
    mut event_rx: mpsc::UnboundedReceiver<ReactEvent>,
    state_tx: Arc<watch::Sender<UiState>>,
) {
    while let Some(ev) = event_rx.recv().await {
        let status = ev.status_line();
        state_tx.send_modify(|s| {
            match &ev {
                ReactEvent::Thinking => {
                    s.phase = AgentPhase::Routing;
                    s.active_tool = None;
                }
                ReactEvent::ToolCall { tool, .. } => {
                    s.phase = AgentPhase::ToolExecuting;
                    s.active_tool = Some(tool.clone());
                }
                ReactEvent::MessageChunk { .. } => s.phase = AgentPhase::Synthesizing,
                _ => {}
            }
            if let Some(line) = status {
                s.status = Some(line);
            }
        });
    }
}
