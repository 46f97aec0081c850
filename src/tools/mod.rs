//! 工具层：注册表、执行器与三个研究工具
//!
//! - research_paper_query_tool：本地知识库 top-k 检索
//! - fetch_from_arxiv：按主题抓取最新论文
//! - download_pdf_file_tool：下载 PDF 到 papers 目录（仅在用户明确要求时调用）

pub mod arxiv_fetch;
pub mod download;
pub mod executor;
pub mod knowledge;
pub mod registry;
pub mod schema;

use std::sync::Arc;

pub use arxiv_fetch::ArxivFetchTool;
pub use download::{DownloadPdfTool, FetchOutcome, FileFetcher};
pub use executor::{ToolExecutor, ToolInvocation};
pub use knowledge::{KnowledgeQueryTool, NO_LOCAL_MATCHES};
pub use registry::{Tool, ToolRegistry};
pub use schema::tool_call_schema_json;

use crate::arxiv::ArxivClient;
use crate::config::AppConfig;
use crate::store::DocumentStore;

pub const KNOWLEDGE_TOOL: &str = "research_paper_query_tool";
pub const ARXIV_TOOL: &str = "fetch_from_arxiv";
pub const DOWNLOAD_TOOL: &str = "download_pdf_file_tool";

/// 按配置组装固定的三个工具
pub fn build_registry(cfg: &AppConfig, store: Arc<DocumentStore>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(KnowledgeQueryTool::new(
        Arc::clone(&store),
        cfg.store.similarity_top_k,
        cfg.store.min_relevance,
    ));

    let arxiv_cfg = &cfg.tools.arxiv;
    let mut arxiv = ArxivFetchTool::new(
        ArxivClient::new(arxiv_cfg.api_url.clone(), arxiv_cfg.timeout_secs),
        arxiv_cfg.default_max_results,
    );
    if arxiv_cfg.ingest_results {
        arxiv = arxiv.with_ingestion(store);
    }
    registry.register(arxiv);

    registry.register(DownloadPdfTool::new(FileFetcher::new(
        cfg.app.papers_dir.clone(),
        cfg.tools.download.timeout_secs,
    )));
    registry
}
