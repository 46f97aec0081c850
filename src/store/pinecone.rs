//! Pinecone 远程向量库后端（REST 数据面）
//!
//! upsert：`POST {host}/vectors/upsert`；query：`POST {host}/query`，均带 `Api-Key` 头。
//! 块文本与来源元数据写在向量 metadata 中，检索时原样还原为文档。向量 ID 每次新生成，重复导入不会覆盖。

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::EmbeddingProvider;
use crate::store::{Chunk, ScoredDocument, StoreError};

const API_VERSION: &str = "2024-07";
const UPSERT_BATCH: usize = 100;
const TEXT_KEY: &str = "text";

/// Pinecone 连接参数
#[derive(Debug, Clone)]
pub struct PineconeConfig {
    pub api_key: String,
    /// 数据面 host，如 https://arxiv-research-abc123.svc.us-east-1-aws.pinecone.io
    pub host: String,
    pub index_name: String,
    pub namespace: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize)]
struct UpsertVector {
    id: String,
    values: Vec<f32>,
    metadata: BTreeMap<String, String>,
}

#[derive(Debug, Serialize)]
struct UpsertRequest<'a> {
    vectors: Vec<UpsertVector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueryRequest<'a> {
    vector: Vec<f32>,
    top_k: usize,
    include_metadata: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Debug, Deserialize)]
struct QueryMatch {
    id: String,
    #[serde(default)]
    score: f32,
    #[serde(default)]
    metadata: Option<BTreeMap<String, Value>>,
}

/// Pinecone 索引句柄
pub struct PineconeIndex {
    client: Client,
    config: PineconeConfig,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl PineconeIndex {
    pub fn new(config: PineconeConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self, StoreError> {
        if config.api_key.trim().is_empty() {
            return Err(StoreError::Config("PINECONE_API_KEY is not set".to_string()));
        }
        if !config.host.starts_with("http") {
            return Err(StoreError::Config(format!(
                "Pinecone host must be an http(s) URL, got '{}'",
                config.host
            )));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Remote(e.to_string()))?;
        tracing::info!(index = %config.index_name, host = %config.host, "pinecone backend initialized");
        Ok(Self {
            client,
            config,
            embedder,
        })
    }

    pub fn index_name(&self) -> &str {
        &self.config.index_name
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.host.trim_end_matches('/'), path)
    }

    async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<reqwest::Response, StoreError> {
        let resp = self
            .client
            .post(self.endpoint(path))
            .header("Api-Key", &self.config.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| StoreError::Remote(e.to_string()))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(StoreError::Remote(format!("Pinecone {} {}: {}", path, status, body)));
        }
        Ok(resp)
    }

    pub async fn add_chunks(&self, chunks: Vec<Chunk>) -> Result<usize, StoreError> {
        let mut added = 0;
        for batch in chunks.chunks(UPSERT_BATCH) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = self
                .embedder
                .embed_batch(&texts)
                .await
                .map_err(StoreError::Embedding)?;
            let vectors = batch
                .iter()
                .zip(embeddings)
                .map(|(c, values)| to_upsert_vector(c, values))
                .collect();
            let request = UpsertRequest {
                vectors,
                namespace: self.config.namespace.as_deref(),
            };
            self.post("vectors/upsert", &request).await?;
            added += batch.len();
        }
        Ok(added)
    }

    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>, StoreError> {
        let vector = self
            .embedder
            .embed(query)
            .await
            .map_err(StoreError::Embedding)?;
        let request = QueryRequest {
            vector,
            top_k: k,
            include_metadata: true,
            namespace: self.config.namespace.as_deref(),
        };
        let resp: QueryResponse = self
            .post("query", &request)
            .await?
            .json()
            .await
            .map_err(|e| StoreError::Remote(e.to_string()))?;
        Ok(from_query_response(resp))
    }
}

fn to_upsert_vector(chunk: &Chunk, values: Vec<f32>) -> UpsertVector {
    let mut metadata = chunk.metadata.clone();
    metadata.insert(TEXT_KEY.to_string(), chunk.text.clone());
    metadata.insert("source_id".to_string(), chunk.source_id.clone());
    UpsertVector {
        id: uuid::Uuid::new_v4().to_string(),
        values,
        metadata,
    }
}

fn from_query_response(resp: QueryResponse) -> Vec<ScoredDocument> {
    let mut docs: Vec<ScoredDocument> = resp
        .matches
        .into_iter()
        .filter_map(|m| {
            let mut metadata: BTreeMap<String, String> = m
                .metadata?
                .into_iter()
                .map(|(k, v)| match v {
                    Value::String(s) => (k, s),
                    other => (k, other.to_string()),
                })
                .collect();
            let text = metadata.remove(TEXT_KEY)?;
            Some(ScoredDocument::new(m.id, text, metadata, m.score))
        })
        .collect();
    docs.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    docs
}
