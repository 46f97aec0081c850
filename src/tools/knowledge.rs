//! 本地知识库查询工具（research_paper_query_tool）
//!
//! 对文档库做 top-k 检索，把每条命中的相关度分数一并交给模型，由模型判断是否足以回答。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::memory::preview;
use crate::store::{DocumentStore, ScoredDocument};
use crate::tools::{Tool, KNOWLEDGE_TOOL};

/// 本地无命中时的观察文本前缀（路由策略据此判断本地为空）
pub const NO_LOCAL_MATCHES: &str = "No matching documents in the local knowledge base";

const MAX_HIT_CHARS: usize = 1500;

pub struct KnowledgeQueryTool {
    store: Arc<DocumentStore>,
    top_k: usize,
    min_relevance: Option<f32>,
}

impl KnowledgeQueryTool {
    pub fn new(store: Arc<DocumentStore>, top_k: usize, min_relevance: Option<f32>) -> Self {
        Self {
            store,
            top_k,
            min_relevance,
        }
    }
}

/// 从参数中取查询文本；兼容 query / input 两种键
pub(crate) fn query_arg(args: &Value) -> Option<String> {
    ["query", "input"]
        .iter()
        .find_map(|k| args.get(*k).and_then(|v| v.as_str()))
        .or_else(|| args.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn format_hits(query: &str, hits: &[ScoredDocument]) -> String {
    let mut out = format!(
        "Top {} local result(s) for \"{}\" (relevance score in [0, 1], higher is closer):\n",
        hits.len(),
        query
    );
    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&format!(
            "\n[{}] score={:.3} source={}\n{}\n",
            i + 1,
            hit.score,
            hit.label(),
            preview(&hit.text, MAX_HIT_CHARS)
        ));
    }
    out
}

#[async_trait]
impl Tool for KnowledgeQueryTool {
    fn name(&self) -> &str {
        KNOWLEDGE_TOOL
    }

    fn description(&self) -> &str {
        "A RAG engine with recent research papers. Query the local knowledge base first for any research topic. Args: {\"query\": \"<question or topic>\"}. Returns the top matching passages with relevance scores."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Question or topic to look up" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let query = query_arg(&args).ok_or_else(|| "Missing query".to_string())?;
        let mut hits = self
            .store
            .retrieve_top_k(&query, self.top_k)
            .await
            .map_err(|e| e.to_string())?;
        if let Some(min) = self.min_relevance {
            hits.retain(|h| h.score >= min);
        }
        tracing::debug!(query = %query, hits = hits.len(), "knowledge query");
        if hits.is_empty() {
            return Ok(format!("{} for \"{}\".", NO_LOCAL_MATCHES, query));
        }
        Ok(format_hits(&query, &hits))
    }
}
