//! 对话记忆：跨轮次的有序消息日志
//!
//! 只追加、不重排；累计 token 超出预算时从最旧的消息开始淘汰。
//! 编排器每轮重建、无状态，跨轮连续性完全依赖会话持有的这一个 ConversationMemory（经 SharedMemory 共享）。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::memory::{TokenBudget, TokenEstimator};

/// 消息角色（与 LLM API 一致）；对话记忆中只出现 User / Assistant，System 仅用于拼 prompt
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    fn tokens(&self) -> usize {
        TokenEstimator::estimate(&self.content)
    }
}

/// 有 token 上限的对话记忆
#[derive(Clone, Debug)]
pub struct ConversationMemory {
    messages: Vec<Message>,
    budget: TokenBudget,
    used_tokens: usize,
}

/// 会话内共享的记忆句柄；一轮对话期间持锁，保证同一时刻只有一个写者
pub type SharedMemory = Arc<Mutex<ConversationMemory>>;

impl ConversationMemory {
    pub fn new(token_limit: usize) -> Self {
        Self {
            messages: Vec::new(),
            budget: TokenBudget::new(token_limit),
            used_tokens: 0,
        }
    }

    pub fn shared(token_limit: usize) -> SharedMemory {
        Arc::new(Mutex::new(Self::new(token_limit)))
    }

    /// 追加一条消息，随后淘汰最旧消息直到不超预算
    pub fn append(&mut self, msg: Message) {
        self.used_tokens += msg.tokens();
        self.messages.push(msg);
        self.evict();
    }

    /// 当前消息的有序快照
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn reset(&mut self) {
        self.messages.clear();
        self.used_tokens = 0;
    }

    pub fn used_tokens(&self) -> usize {
        self.used_tokens
    }

    pub fn token_limit(&self) -> usize {
        self.budget.limit()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn evict(&mut self) {
        let mut drop_count = 0;
        let mut used = self.used_tokens;
        while self.budget.exceeded_by(used) && drop_count < self.messages.len() {
            used -= self.messages[drop_count].tokens();
            drop_count += 1;
        }
        if drop_count > 0 {
            self.messages.drain(..drop_count);
            self.used_tokens = used;
            tracing::debug!(
                evicted = drop_count,
                used_tokens = used,
                limit = self.budget.limit(),
                "conversation memory evicted oldest turns"
            );
        }
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(TokenBudget::default().limit())
    }
}
