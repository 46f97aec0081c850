//! LLM 层：对话补全与嵌入客户端抽象及实现（OpenAI 兼容 / Mock / Scripted）

pub mod embedding;
pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use embedding::{EmbeddingProvider, OpenAiEmbedder};
pub use mock::{HashEmbedder, MockLlmClient, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::LlmClient;

use crate::config::AppConfig;

/// 读取模型提供方 API Key：GOOGLE_API_KEY 优先，其次 OPENAI_API_KEY
pub fn provider_api_key() -> Option<String> {
    ["GOOGLE_API_KEY", "OPENAI_API_KEY"]
        .into_iter()
        .filter_map(|k| std::env::var(k).ok())
        .find(|v| !v.trim().is_empty())
}

/// 根据配置与环境变量创建 LLM；缺少 API Key 时告警并退回离线 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    match provider_api_key() {
        Some(key) => {
            tracing::info!(model = %cfg.llm.model, "Using OpenAI-compatible LLM");
            Arc::new(OpenAiClient::new(
                Some(cfg.llm.base_url.as_str()),
                &cfg.llm.model,
                &key,
                cfg.llm.max_tokens,
                cfg.llm.request_timeout_secs,
            ))
        }
        None => {
            tracing::warn!("GOOGLE_API_KEY / OPENAI_API_KEY not set, using offline Mock LLM");
            Arc::new(MockLlmClient)
        }
    }
}

/// 根据配置创建嵌入提供方；缺少 API Key 时告警并退回 HashEmbedder（仅适合离线试用）
pub fn create_embedder_from_config(cfg: &AppConfig) -> Arc<dyn EmbeddingProvider> {
    match provider_api_key() {
        Some(key) => {
            let base = cfg
                .embedding
                .base_url
                .as_deref()
                .unwrap_or(cfg.llm.base_url.as_str());
            Arc::new(OpenAiEmbedder::new(Some(base), &cfg.embedding.model, &key))
        }
        None => {
            tracing::warn!(
                "no embedding API key, using local hash embedder; \
                 an index built with API embeddings will refuse to open until the key is set"
            );
            Arc::new(HashEmbedder::default())
        }
    }
}
