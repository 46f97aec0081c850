//! 推理层：Planner、路由策略、单轮 ReAct 循环与过程事件

pub mod events;
pub mod loop_;
pub mod planner;
pub mod policy;

pub use events::ReactEvent;
pub use loop_::{run_turn, ReactSession, TurnOutcome};
pub use planner::{parse_llm_output, Planner, PlannerOutput, ToolCall};
pub use policy::{RoutingPolicy, TurnState, Verdict};
