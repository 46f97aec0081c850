//! 本地持久化索引
//!
//! 所有块与其向量保存在内存，并以单个 JSON 文件（`<persist_dir>/docstore.json`）落盘；
//! 检索时对查询向量与全部块做余弦相似度并取 top-k。只追加，不去重。
//! 文件记录向量维度；换了嵌入模型后打开旧索引会直接报错，而不是让每次检索都静默落空。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::llm::EmbeddingProvider;
use crate::store::{Chunk, ScoredDocument, StoreError};

const DOCSTORE_FILE: &str = "docstore.json";
/// 单次嵌入请求的最大文本数
pub(crate) const EMBED_BATCH: usize = 100;
const DIMENSION_CHECK_TEXT: &str = "embedding dimension check";

/// 落盘的单条记录
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
    id: String,
    source_id: String,
    text: String,
    metadata: std::collections::BTreeMap<String, String>,
    embedding: Vec<f32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DocStoreFile {
    #[serde(default)]
    dimensions: Option<usize>,
    entries: Vec<StoredChunk>,
}

impl DocStoreFile {
    /// 旧文件没有记录维度时取第一条向量的长度
    fn dimensions(&self) -> Option<usize> {
        self.dimensions
            .or_else(|| self.entries.first().map(|e| e.embedding.len()))
    }
}

/// 本地索引
pub struct LocalIndex {
    persist_dir: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    entries: RwLock<Vec<StoredChunk>>,
}

impl LocalIndex {
    /// 新建空索引（不落盘，首次 ingest 时写入）
    pub fn create(persist_dir: impl AsRef<Path>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            persist_dir: persist_dir.as_ref().to_path_buf(),
            embedder,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// 从磁盘恢复索引；目录或文件不存在视为前置条件不满足
    pub async fn from_persisted(
        persist_dir: impl AsRef<Path>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, StoreError> {
        let dir = persist_dir.as_ref().to_path_buf();
        let path = dir.join(DOCSTORE_FILE);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StoreError::IndexMissing(path.display().to_string()));
        }
        let data = tokio::fs::read_to_string(&path).await?;
        let file: DocStoreFile = serde_json::from_str(&data)?;
        if let Some(expected) = file.dimensions() {
            let actual = embedder
                .embed(DIMENSION_CHECK_TEXT)
                .await
                .map_err(StoreError::Embedding)?
                .len();
            check_dimensions(expected, actual)?;
        }
        tracing::info!(path = %path.display(), chunks = file.entries.len(), "local index loaded");
        Ok(Self {
            persist_dir: dir,
            embedder,
            entries: RwLock::new(file.entries),
        })
    }

    pub fn persist_dir(&self) -> &Path {
        &self.persist_dir
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// 分批嵌入并追加块；整体落盘成功后才更新内存中的索引
    pub async fn add_chunks(&self, chunks: Vec<Chunk>) -> Result<usize, StoreError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(EMBED_BATCH) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self
                .embedder
                .embed_batch(&texts)
                .await
                .map_err(StoreError::Embedding)?;
            if vectors.len() != texts.len() {
                return Err(StoreError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    texts.len(),
                    vectors.len()
                )));
            }
            embeddings.extend(vectors);
        }

        let mut entries = self.entries.write().await;
        let expected = entries
            .first()
            .map(|e| e.embedding.len())
            .or_else(|| embeddings.first().map(Vec::len));
        if let Some(expected) = expected {
            for v in &embeddings {
                check_dimensions(expected, v.len())?;
            }
        }

        let added = chunks.len();
        let mut updated = entries.clone();
        updated.extend(chunks.into_iter().zip(embeddings).map(|(c, embedding)| StoredChunk {
            id: c.id,
            source_id: c.source_id,
            text: c.text,
            metadata: c.metadata,
            embedding,
        }));
        self.save(&updated).await?;
        *entries = updated;
        Ok(added)
    }

    async fn save(&self, entries: &[StoredChunk]) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.persist_dir).await?;
        let file = DocStoreFileRef {
            dimensions: entries.first().map(|e| e.embedding.len()),
            entries,
        };
        let data = serde_json::to_string(&file)?;
        tokio::fs::write(self.persist_dir.join(DOCSTORE_FILE), data).await?;
        Ok(())
    }

    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredDocument>, StoreError> {
        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(StoreError::Embedding)?;

        let entries = self.entries.read().await;
        let mut scored: Vec<(f32, &StoredChunk)> = entries
            .iter()
            .map(|e| (cosine_similarity(&query_embedding, &e.embedding), e))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, e)| ScoredDocument::new(e.id.clone(), e.text.clone(), e.metadata.clone(), score))
            .collect())
    }
}

#[derive(Serialize)]
struct DocStoreFileRef<'a> {
    dimensions: Option<usize>,
    entries: &'a [StoredChunk],
}

fn check_dimensions(expected: usize, actual: usize) -> Result<(), StoreError> {
    if expected == actual {
        Ok(())
    } else {
        Err(StoreError::Config(format!(
            "embedding dimension mismatch: index has {}-dimensional vectors but the embedder produces {}; \
             use the embedding model the index was built with or rebuild the index",
            expected, actual
        )))
    }
}

/// 余弦相似度；维度不一致或零向量时为 0
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::HashEmbedder;
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// 记录每次 embed_batch 的批大小
    #[derive(Default)]
    struct RecordingEmbedder {
        inner: HashEmbedder,
        batches: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl EmbeddingProvider for RecordingEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, String> {
            self.inner.embed(text).await
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, String> {
            self.batches.lock().unwrap().push(texts.len());
            self.inner.embed_batch(texts).await
        }
    }

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            id: id.to_string(),
            text: text.to_string(),
            source_id: id.to_string(),
            offset: 0,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&a, &[0.0, 1.0, 0.0]).abs() < 0.001);
        assert_eq!(cosine_similarity(&a, &[1.0, 0.0]), 0.0);
    }

    #[tokio::test]
    async fn test_missing_index_is_an_error() {
        let dir = TempDir::new().unwrap();
        let res = LocalIndex::from_persisted(dir.path().join("nope"), Arc::new(HashEmbedder::default())).await;
        assert!(matches!(res, Err(StoreError::IndexMissing(_))));
    }

    #[tokio::test]
    async fn test_persist_and_reload_roundtrip() {
        let dir = TempDir::new().unwrap();
        let embedder = Arc::new(HashEmbedder::default());
        let index = LocalIndex::create(dir.path(), embedder.clone());
        index
            .add_chunks(vec![
                chunk("a", "Diffusion models generate images by denoising"),
                chunk("b", "Protein folding prediction with neural networks"),
            ])
            .await
            .unwrap();

        let reloaded = LocalIndex::from_persisted(dir.path(), embedder).await.unwrap();
        assert_eq!(reloaded.len().await, 2);
        let hits = reloaded.retrieve("denoising diffusion images", 5).await.unwrap();
        assert_eq!(hits[0].id, "a");
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[tokio::test]
    async fn test_large_ingest_is_embedded_in_batches() {
        let dir = TempDir::new().unwrap();
        let embedder = Arc::new(RecordingEmbedder::default());
        let index = LocalIndex::create(dir.path(), embedder.clone());
        let chunks: Vec<Chunk> = (0..250)
            .map(|i| chunk(&format!("page-{i}"), &format!("page {i} of a long survey")))
            .collect();

        assert_eq!(index.add_chunks(chunks).await.unwrap(), 250);
        let batches = embedder.batches.lock().unwrap().clone();
        assert_eq!(batches, vec![100, 100, 50]);
        assert!(batches.iter().all(|&n| n <= EMBED_BATCH));
        assert_eq!(index.len().await, 250);
    }

    #[tokio::test]
    async fn test_reopening_with_different_embedding_size_is_refused() {
        let dir = TempDir::new().unwrap();
        let index = LocalIndex::create(dir.path(), Arc::new(HashEmbedder::new(64)));
        index
            .add_chunks(vec![chunk("a", "Diffusion models generate images by denoising")])
            .await
            .unwrap();

        let res = LocalIndex::from_persisted(dir.path(), Arc::new(HashEmbedder::default())).await;
        match res {
            Err(StoreError::Config(msg)) => assert!(msg.contains("64"), "{msg}"),
            Err(other) => panic!("expected dimension mismatch, got {other}"),
            Ok(_) => panic!("expected dimension mismatch"),
        }
        let reopened = LocalIndex::from_persisted(dir.path(), Arc::new(HashEmbedder::new(64)))
            .await
            .unwrap();
        assert_eq!(reopened.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_save_leaves_index_unchanged() {
        let dir = TempDir::new().unwrap();
        let persist = dir.path().join("index");
        let index = LocalIndex::create(&persist, Arc::new(HashEmbedder::default()));
        index.add_chunks(vec![chunk("a", "first page")]).await.unwrap();

        // 索引目录被同名文件占据，写盘必然失败
        std::fs::remove_dir_all(&persist).unwrap();
        std::fs::write(&persist, "not a directory").unwrap();
        assert!(index.add_chunks(vec![chunk("b", "second page")]).await.is_err());
        assert_eq!(index.len().await, 1);
        let hits = index.retrieve("second page", 5).await.unwrap();
        assert!(hits.iter().all(|h| h.id != "b"));
    }
}
