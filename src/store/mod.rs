//! 文档库 / 检索器
//!
//! - [`DocumentStore`]：本地持久化索引与远程 Pinecone 索引两种后端，检索契约一致
//! - [`Chunker`]：入库前按全局窗口/重叠切分
//! - [`loader`]：本地 PDF / 文本文件读取为 [`IndexedDocument`]

pub mod chunker;
pub mod loader;
pub mod local;
pub mod pinecone;

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

pub use chunker::{Chunk, Chunker, ChunkingConfig};
pub use local::LocalIndex;
pub use pinecone::{PineconeConfig, PineconeIndex};

use crate::arxiv::PaperRecord;
use crate::config::{AppConfig, StoreBackend};
use crate::llm::EmbeddingProvider;

/// 文档库错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Remote vector store error: {0}")]
    Remote(String),

    #[error("Index not found at {0}; build it first with arxiv-agent-index")]
    IndexMissing(String),

    #[error("Store configuration error: {0}")]
    Config(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFile(String),

    #[error("Failed to parse file: {0}")]
    Parse(String),
}

/// 待入库的文档：正文 + 来源元数据
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    pub text: String,
    pub metadata: BTreeMap<String, String>,
}

impl IndexedDocument {
    pub fn new(text: impl Into<String>, metadata: BTreeMap<String, String>) -> Self {
        Self {
            text: text.into(),
            metadata,
        }
    }

    /// 每篇论文拍平成一篇文档
    pub fn from_paper(paper: &PaperRecord) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), "arxiv".to_string());
        metadata.insert("title".to_string(), paper.title.clone());
        metadata.insert("authors".to_string(), paper.authors.join(", "));
        metadata.insert("arxiv_url".to_string(), paper.arxiv_url.clone());
        metadata.insert("pdf_url".to_string(), paper.pdf_url.clone());
        Self::new(paper.to_document_text(), metadata)
    }
}

/// 检索结果：块文本、来源元数据与相关度
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredDocument {
    pub id: String,
    pub text: String,
    pub metadata: BTreeMap<String, String>,
    pub score: f32,
}

impl ScoredDocument {
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        metadata: BTreeMap<String, String>,
        score: f32,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata,
            score,
        }
    }

    /// 展示用标签：标题或文件名（含页码）
    pub fn label(&self) -> String {
        if let Some(title) = self.metadata.get("title") {
            return title.clone();
        }
        match (self.metadata.get("file_name"), self.metadata.get("page_label")) {
            (Some(name), Some(page)) => format!("{} (page {})", name, page),
            (Some(name), None) => name.clone(),
            _ => self.id.clone(),
        }
    }
}

/// 一次入库的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    pub message: String,
}

impl IngestReport {
    pub fn is_empty(&self) -> bool {
        self.documents == 0
    }
}

enum Backend {
    Local(LocalIndex),
    Pinecone(PineconeIndex),
}

/// 文档库：两种后端在构造时选定，对外契约一致
pub struct DocumentStore {
    backend: Backend,
    chunker: Chunker,
}

impl DocumentStore {
    /// 从本地持久化目录恢复；索引不存在时报 IndexMissing
    pub async fn from_persisted(
        persist_dir: impl AsRef<std::path::Path>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunking: ChunkingConfig,
    ) -> Result<Self, StoreError> {
        let index = LocalIndex::from_persisted(persist_dir, embedder).await?;
        Ok(Self {
            backend: Backend::Local(index),
            chunker: Chunker::new(chunking),
        })
    }

    /// 新建空的本地索引（索引构建器使用）
    pub fn create_local(
        persist_dir: impl AsRef<std::path::Path>,
        embedder: Arc<dyn EmbeddingProvider>,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            backend: Backend::Local(LocalIndex::create(persist_dir, embedder)),
            chunker: Chunker::new(chunking),
        }
    }

    pub fn from_remote(index: PineconeIndex, chunking: ChunkingConfig) -> Self {
        Self {
            backend: Backend::Pinecone(index),
            chunker: Chunker::new(chunking),
        }
    }

    /// 按配置打开文档库；Pinecone 后端需要 PINECONE_API_KEY 与 host
    pub async fn from_config(
        cfg: &AppConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, StoreError> {
        let chunking = ChunkingConfig::new(cfg.store.chunk_size, cfg.store.chunk_overlap);
        match cfg.store.backend {
            StoreBackend::Local => Self::from_persisted(&cfg.store.persist_dir, embedder, chunking).await,
            StoreBackend::Pinecone => {
                let api_key = std::env::var("PINECONE_API_KEY").unwrap_or_default();
                let host = cfg.store.pinecone.host.clone().ok_or_else(|| {
                    StoreError::Config("store.pinecone.host is not configured".to_string())
                })?;
                let index = PineconeIndex::new(
                    PineconeConfig {
                        api_key,
                        host,
                        index_name: cfg.store.pinecone.index_name.clone(),
                        namespace: cfg.store.pinecone.namespace.clone(),
                        timeout_secs: cfg.store.pinecone.timeout_secs,
                    },
                    embedder,
                )?;
                Ok(Self::from_remote(index, chunking))
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Local(_) => "local",
            Backend::Pinecone(_) => "pinecone",
        }
    }

    /// 追加入库；零篇文档不报错，返回 "nothing to ingest"
    pub async fn ingest(&self, documents: Vec<IndexedDocument>) -> Result<IngestReport, StoreError> {
        if documents.is_empty() {
            return Ok(IngestReport {
                documents: 0,
                chunks: 0,
                message: "nothing to ingest".to_string(),
            });
        }

        let batch = uuid::Uuid::new_v4().simple().to_string();
        let chunks: Vec<Chunk> = documents
            .iter()
            .enumerate()
            .flat_map(|(i, doc)| {
                let doc_id = format!("{}-{}", &batch[..8], i);
                self.chunker.chunk(&doc_id, &doc.text, &doc.metadata)
            })
            .collect();

        let added = match &self.backend {
            Backend::Local(index) => index.add_chunks(chunks).await?,
            Backend::Pinecone(index) => index.add_chunks(chunks).await?,
        };
        tracing::info!(
            backend = self.backend_name(),
            documents = documents.len(),
            chunks = added,
            "documents ingested"
        );
        Ok(IngestReport {
            documents: documents.len(),
            chunks: added,
            message: format!("Ingested {} document(s) as {} chunk(s)", documents.len(), added),
        })
    }

    /// 相似度 top-k，按相关度降序
    pub async fn retrieve_top_k(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        match &self.backend {
            Backend::Local(index) => index.retrieve(query, k).await,
            Backend::Pinecone(index) => index.retrieve(query, k).await,
        }
    }
}
