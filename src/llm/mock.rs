//! Mock / Scripted LLM 客户端与确定性嵌入器（无需 API）
//!
//! - MockLlmClient：未配置 API Key 时的离线后备，先查本地知识库，再把观察结果原样作为回复。
//! - ScriptedLlmClient：按队列回放预设输出并记录每次收到的消息，供测试驱动 ReAct 流程。
//! - HashEmbedder：词袋哈希向量，相同词汇得到相近向量，供测试与离线索引使用。

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{EmbeddingProvider, LlmClient};
use crate::memory::{Message, Role};
use crate::tools::KNOWLEDGE_TOOL;

const OBSERVATION_PREFIX: &str = "Observation from ";

/// 离线客户端：没有可用模型时仍能走通「本地检索 → 回复」
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        if let Some(rest) = last_user.strip_prefix(OBSERVATION_PREFIX) {
            return Ok(format!(
                "(offline mode, no language model configured)\n{}",
                rest
            ));
        }

        Ok(serde_json::json!({
            "tool": KNOWLEDGE_TOOL,
            "args": { "query": last_user }
        })
        .to_string())
    }
}

/// 按顺序回放预设输出；队列耗尽后返回固定的收尾回复
#[derive(Debug, Default)]
pub struct ScriptedLlmClient {
    outputs: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedLlmClient {
    pub fn new<I, S>(outputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            outputs: Mutex::new(outputs.into_iter().map(|s| Ok(s.into())).collect()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// 追加一次失败的模型调用
    pub fn push_error(&self, err: impl Into<String>) {
        if let Ok(mut q) = self.outputs.lock() {
            q.push_back(Err(err.into()));
        }
    }

    pub fn push_output(&self, out: impl Into<String>) {
        if let Ok(mut q) = self.outputs.lock() {
            q.push_back(Ok(out.into()));
        }
    }

    /// 每次 complete 收到的完整消息列表
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(messages.to_vec());
        }
        let next = self
            .outputs
            .lock()
            .map_err(|e| e.to_string())?
            .pop_front();
        next.unwrap_or_else(|| Ok("No further steps scripted.".to_string()))
    }
}

/// 词袋哈希嵌入：每个小写词哈希到固定维度的桶，结果做 L2 归一化
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn bucket(&self, word: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        word.hash(&mut hasher);
        (hasher.finish() % self.dimensions as u64) as usize
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
        let mut v = vec![0.0f32; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 2)
        {
            v[self.bucket(&word.to_lowercase())] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Err("text has no embeddable words".to_string());
        }
        Ok(v.into_iter().map(|x| x / norm).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_queries_knowledge_base_first() {
        let out = MockLlmClient
            .complete(&[Message::user("diffusion models")])
            .await
            .unwrap();
        let v: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(v["tool"], KNOWLEDGE_TOOL);
        assert_eq!(v["args"]["query"], "diffusion models");
    }

    #[tokio::test]
    async fn test_mock_answers_from_observation() {
        let out = MockLlmClient
            .complete(&[
                Message::user("diffusion models"),
                Message::user("Observation from research_paper_query_tool: [1] Title: X"),
            ])
            .await
            .unwrap();
        assert!(out.contains("Title: X"));
    }

    #[tokio::test]
    async fn test_scripted_replays_in_order_and_records_calls() {
        let llm = ScriptedLlmClient::new(["one", "two"]);
        llm.push_error("boom");
        assert_eq!(llm.complete(&[Message::user("a")]).await.unwrap(), "one");
        assert_eq!(llm.complete(&[Message::user("b")]).await.unwrap(), "two");
        assert_eq!(llm.complete(&[Message::user("c")]).await.unwrap_err(), "boom");
        assert_eq!(llm.call_count(), 3);
        assert_eq!(llm.calls()[1][0].content, "b");
    }

    #[tokio::test]
    async fn test_hash_embedder_similarity() {
        let e = HashEmbedder::default();
        let a = e.embed("diffusion models for image generation").await.unwrap();
        let b = e.embed("image generation with diffusion").await.unwrap();
        let c = e.embed("protein folding kinetics").await.unwrap();
        let dot = |x: &[f32], y: &[f32]| x.iter().zip(y).map(|(p, q)| p * q).sum::<f32>();
        assert!(dot(&a, &b) > dot(&a, &c));
        assert!(e.embed("a b").await.is_err());
    }
}
