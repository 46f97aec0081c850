//! 远程论文抓取工具（fetch_from_arxiv）
//!
//! 按主题查询最近的论文，返回每篇的标题、作者、摘要与链接；可选地把结果追加进文档库。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::arxiv::{ArxivClient, PaperRecord};
use crate::store::{DocumentStore, IndexedDocument};
use crate::tools::{Tool, ARXIV_TOOL};

pub struct ArxivFetchTool {
    client: ArxivClient,
    default_max_results: usize,
    /// 设置后抓取结果会追加入库
    ingest_into: Option<Arc<DocumentStore>>,
}

impl ArxivFetchTool {
    pub fn new(client: ArxivClient, default_max_results: usize) -> Self {
        Self {
            client,
            default_max_results: default_max_results.max(1),
            ingest_into: None,
        }
    }

    pub fn with_ingestion(mut self, store: Arc<DocumentStore>) -> Self {
        self.ingest_into = Some(store);
        self
    }

    fn max_results_arg(&self, args: &Value) -> Result<usize, String> {
        let raw = match args.get("max_results") {
            None | Some(Value::Null) => return Ok(self.default_max_results),
            Some(v) => v,
        };
        let n = raw
            .as_u64()
            .or_else(|| raw.as_str().and_then(|s| s.trim().parse::<u64>().ok()))
            .ok_or_else(|| format!("max_results must be a positive integer, got {}", raw))?;
        if n == 0 {
            return Err("max_results must be greater than 0".to_string());
        }
        Ok(n as usize)
    }
}

fn format_papers(topic: &str, papers: &[PaperRecord]) -> String {
    let mut out = format!("Fetched {} recent paper(s) from arXiv for \"{}\":\n", papers.len(), topic);
    for (i, p) in papers.iter().enumerate() {
        out.push_str(&format!("\n[{}] {}", i + 1, p.to_document_text()));
    }
    out
}

#[async_trait]
impl Tool for ArxivFetchTool {
    fn name(&self) -> &str {
        ARXIV_TOOL
    }

    fn description(&self) -> &str {
        "Download the {max_results} most recent papers regarding the {topic} from arXiv. Use it when the local knowledge base has nothing relevant or the user asks for new or current papers. Args: {\"topic\": \"<topic>\", \"max_results\": <integer, optional>}."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "topic": { "type": "string", "description": "Research topic to search for" },
                "max_results": { "type": "integer", "minimum": 1, "default": self.default_max_results }
            },
            "required": ["topic"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let topic = args
            .get("topic")
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| "Missing topic".to_string())?
            .to_string();
        let max_results = self.max_results_arg(&args)?;

        let papers = self
            .client
            .search(&topic, max_results)
            .await
            .map_err(|e| e.to_string())?;
        if papers.is_empty() {
            return Ok(format!("arXiv returned no papers for \"{}\".", topic));
        }

        let mut out = format_papers(&topic, &papers);
        if let Some(store) = &self.ingest_into {
            let docs = papers.iter().map(IndexedDocument::from_paper).collect();
            match store.ingest(docs).await {
                Ok(report) => out.push_str(&format!("\n({})\n", report.message)),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to ingest fetched papers");
                    out.push_str(&format!("\n(papers were not added to the knowledge base: {})\n", e));
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool() -> ArxivFetchTool {
        ArxivFetchTool::new(ArxivClient::new("http://127.0.0.1:9/api/query", 1), 3)
    }

    #[test]
    fn test_max_results_parsing() {
        let t = tool();
        assert_eq!(t.max_results_arg(&serde_json::json!({})).unwrap(), 3);
        assert_eq!(t.max_results_arg(&serde_json::json!({"max_results": 5})).unwrap(), 5);
        assert_eq!(t.max_results_arg(&serde_json::json!({"max_results": "7"})).unwrap(), 7);
        assert!(t.max_results_arg(&serde_json::json!({"max_results": 0})).is_err());
        assert!(t.max_results_arg(&serde_json::json!({"max_results": "many"})).is_err());
    }

    #[tokio::test]
    async fn test_missing_topic_is_error() {
        let err = tool().execute(serde_json::json!({"max_results": 2})).await.unwrap_err();
        assert_eq!(err, "Missing topic");
    }

    #[tokio::test]
    async fn test_network_failure_is_error_text() {
        let err = tool()
            .execute(serde_json::json!({"topic": "diffusion models"}))
            .await
            .unwrap_err();
        assert!(err.contains("arXiv request failed"));
    }
}
