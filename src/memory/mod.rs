//! 记忆层：会话内共享的对话记忆与 token 预算

pub mod conversation;
pub mod token_budget;

pub use conversation::{ConversationMemory, Message, Role, SharedMemory};
pub use token_budget::{preview, TokenBudget, TokenEstimator};
