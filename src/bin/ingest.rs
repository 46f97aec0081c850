//! 本地 PDF 导入：把 papers/ 下所有 PDF（每页一篇文档）导入配置的文档库后端
//!
//! 运行方式：
//! ```bash
//! ARXIV_AGENT__STORE__BACKEND=pinecone cargo run --bin arxiv-agent-ingest
//! ```

use std::sync::Arc;

use anyhow::Context;
use arxiv_agent::agent::{ingest_directory, DirectoryIngest};
use arxiv_agent::config::{load_config_or_default, StoreBackend};
use arxiv_agent::llm::create_embedder_from_config;
use arxiv_agent::observability;
use arxiv_agent::store::{ChunkingConfig, DocumentStore, StoreError};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config_or_default(None);
    let embedder = create_embedder_from_config(&cfg);

    let store = match DocumentStore::from_config(&cfg, Arc::clone(&embedder)).await {
        Ok(store) => store,
        // 本地后端首次导入时索引尚不存在
        Err(StoreError::IndexMissing(_)) if cfg.store.backend == StoreBackend::Local => {
            DocumentStore::create_local(
                &cfg.store.persist_dir,
                embedder,
                ChunkingConfig::new(cfg.store.chunk_size, cfg.store.chunk_overlap),
            )
        }
        Err(e) => return Err(e).context("Failed to open document store"),
    };
    tracing::info!(backend = store.backend_name(), "document store ready");

    let dir = &cfg.app.papers_dir;
    match ingest_directory(&store, dir).await.context("Ingestion failed")? {
        DirectoryIngest::CreatedEmptyDir(path) => {
            println!(
                "Created {}. Put the PDF files you want to ingest there and run again.",
                path.display()
            );
        }
        DirectoryIngest::NoPdfs(path) => {
            println!("No PDF files found in {}.", path.display());
        }
        DirectoryIngest::Ingested { files, report } => {
            println!("Found {} PDF file(s) in {}.", files, dir.display());
            println!("{}", report.message);
        }
    }
    Ok(())
}
