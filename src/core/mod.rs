//! 核心编排层：错误与恢复、状态投影、会话监管、主控循环

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod session_supervisor;
pub mod state;

pub use error::{AgentError, RecoveryAction};
pub use orchestrator::{create_agent, spawn_orchestrator, Command};
pub use recovery::RecoveryEngine;
pub use session_supervisor::SessionSupervisor;
pub use state::{AgentPhase, UiState};
