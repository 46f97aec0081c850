//! 会话与单轮处理
//!
//! [`AgentSession`] 绑定文档库、LLM 与对话记忆；编排器（Planner + 工具执行器 + 路由策略）
//! 在 [`handle_turn`] 里每轮重新组装，跨轮连续性只来自会话持有的 [`SharedMemory`]。
//! 另提供索引构建、目录导入与上传导入，供三个二进制共用。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::arxiv::{ArxivClient, PaperRecord};
use crate::config::AppConfig;
use crate::core::{AgentError, RecoveryEngine};
use crate::llm::{EmbeddingProvider, LlmClient};
use crate::memory::{ConversationMemory, Message, SharedMemory};
use crate::react::{run_turn, Planner, ReactEvent, ReactSession, RoutingPolicy, TurnOutcome};
use crate::store::{loader, ChunkingConfig, DocumentStore, IndexedDocument, IngestReport, StoreError};
use crate::tools::{build_registry, tool_call_schema_json, ToolExecutor, ToolRegistry};

const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a research assistant that answers questions about scientific papers.

Routing rules, in priority order:
1. For any question about a research topic, first call research_paper_query_tool.
2. If the retrieved passages are relevant enough to answer (look at their relevance scores), answer from them. \
When presenting a paper always give its Title, a short Summary of the abstract, and its Authors.
3. If the local results are insufficient, or the user explicitly asks for new or current papers, call fetch_from_arxiv \
and answer from the fetched papers.
4. Call download_pdf_file_tool only when the user explicitly asks to download or save a paper.

To call a tool, reply with exactly one JSON object and nothing else: {\"tool\": \"<name>\", \"args\": {...}}.
To answer the user, reply in plain text without JSON.";

/// 读取 system prompt：config/prompts/system.txt 优先，否则用内置默认
pub fn load_system_prompt() -> String {
    ["config/prompts/system.txt", "../config/prompts/system.txt"]
        .into_iter()
        .find_map(|p| std::fs::read_to_string(p).ok())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string())
}

/// 拼接工具清单与调用格式
fn compose_system_prompt(base: &str, registry: &ToolRegistry) -> String {
    format!(
        "{}\n\nAvailable tools:\n{}\n\nTool call JSON Schema:\n{}",
        base.trim_end(),
        registry.to_schema_json(),
        tool_call_schema_json()
    )
}

/// 单轮的可选参数
#[derive(Default)]
pub struct TurnOptions {
    pub cancel_token: CancellationToken,
    pub event_tx: Option<UnboundedSender<ReactEvent>>,
}

/// 一个用户会话：文档库 + LLM + 对话记忆 + 固定工具集
pub struct AgentSession {
    config: AppConfig,
    llm: Arc<dyn LlmClient>,
    store: Arc<DocumentStore>,
    memory: SharedMemory,
    system_prompt: String,
    recovery: RecoveryEngine,
    policy: RoutingPolicy,
}

impl AgentSession {
    pub fn new(
        config: AppConfig,
        llm: Arc<dyn LlmClient>,
        store: Arc<DocumentStore>,
    ) -> Result<Self, AgentError> {
        let memory = ConversationMemory::shared(config.memory.token_limit);
        Ok(Self {
            config,
            llm,
            store,
            memory,
            system_prompt: load_system_prompt(),
            recovery: RecoveryEngine::new(),
            policy: RoutingPolicy::new()?,
        })
    }

    /// 按配置创建 LLM、嵌入与文档库；索引不存在时返回 IndexMissing
    pub async fn from_config(config: AppConfig) -> Result<Self, AgentError> {
        let llm = crate::llm::create_llm_from_config(&config);
        let embedder = crate::llm::create_embedder_from_config(&config);
        let store = DocumentStore::from_config(&config, embedder)
            .await
            .map_err(|e| match e {
                StoreError::IndexMissing(path) => AgentError::IndexMissing(path),
                StoreError::Config(msg) => AgentError::ConfigError(msg),
                other => AgentError::Store(other),
            })?;
        tracing::info!(backend = store.backend_name(), "document store ready");
        Self::new(config, llm, Arc::new(store))
    }

    /// 使用外部持有的记忆（多个会话对象共享同一份记忆时）
    pub fn with_memory(mut self, memory: SharedMemory) -> Self {
        self.memory = memory;
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn memory(&self) -> SharedMemory {
        Arc::clone(&self.memory)
    }

    pub fn store(&self) -> Arc<DocumentStore> {
        Arc::clone(&self.store)
    }

    pub async fn history(&self) -> Vec<Message> {
        self.memory.lock().await.snapshot()
    }

    /// 清空对话记忆
    pub async fn reset(&self) {
        self.memory.lock().await.reset();
        tracing::info!("conversation memory reset");
    }

    /// 上传导入：复制到临时上传目录，读取、入库，最后删除临时副本
    pub async fn upload(&self, files: &[PathBuf]) -> (bool, String) {
        let scratch = self
            .config
            .app
            .upload_dir
            .join(uuid::Uuid::new_v4().simple().to_string());
        let result = ingest_uploaded(&self.store, files, &scratch).await;
        if let Err(e) = tokio::fs::remove_dir_all(&scratch).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(dir = %scratch.display(), error = %e, "failed to remove upload scratch dir");
            }
        }
        match result {
            Ok(msg) => (true, msg),
            Err(e) => {
                tracing::warn!(error = %e, "upload ingestion failed");
                (false, format!("Upload failed: {}", e))
            }
        }
    }
}

async fn ingest_uploaded(
    store: &DocumentStore,
    files: &[PathBuf],
    scratch: &Path,
) -> Result<String, StoreError> {
    tokio::fs::create_dir_all(scratch).await?;
    let mut copies = Vec::with_capacity(files.len());
    for file in files {
        let name = file
            .file_name()
            .ok_or_else(|| StoreError::UnsupportedFile(file.display().to_string()))?;
        let dest = scratch.join(name);
        tokio::fs::copy(file, &dest).await?;
        copies.push(dest);
    }
    let documents = loader::load_files(&copies).await?;
    let pages = documents.len();
    let report = store.ingest(documents).await?;
    if report.is_empty() {
        return Ok(report.message);
    }
    Ok(format!(
        "Ingested {} file(s) with {} page(s)",
        copies.len(),
        pages
    ))
}

/// 处理一轮用户输入。
///
/// 整轮持有记忆锁（同一会话同一时刻只有一个写者）；编排器每轮重新组装。
/// 成功（含步数耗尽的尽力回复）时提交 user + assistant 两条；失败或取消时记忆不变。
pub async fn handle_turn(
    session: &AgentSession,
    utterance: &str,
    options: TurnOptions,
) -> Result<TurnOutcome, AgentError> {
    let mut memory = session.memory.lock().await;
    let history = memory.snapshot();

    let registry = build_registry(&session.config, session.store());
    let system_prompt = compose_system_prompt(&session.system_prompt, &registry);
    let executor = ToolExecutor::new(registry, session.config.tools.tool_timeout_secs);
    let planner = Planner::new(Arc::clone(&session.llm), system_prompt);

    let mut react = ReactSession::new(
        &planner,
        &executor,
        &session.recovery,
        &session.policy,
        session.config.agent.max_steps,
    )
    .with_cancel_token(options.cancel_token);
    if let Some(tx) = options.event_tx.as_ref() {
        react = react.with_event_tx(tx);
    }

    let outcome = run_turn(&react, &history, utterance).await?;
    memory.append(Message::user(utterance.to_string()));
    memory.append(Message::assistant(outcome.response.clone()));
    tracing::info!(
        steps = outcome.steps,
        tools = ?outcome.tools_called(),
        memory_tokens = memory.used_tokens(),
        "turn committed"
    );
    Ok(outcome)
}

/// 便捷接口：跑一轮并只返回回复文本
pub async fn ask(session: &AgentSession, utterance: &str) -> Result<String, AgentError> {
    handle_turn(session, utterance, TurnOptions::default())
        .await
        .map(|o| o.response)
}

/// 索引构建：抓取 topic 下最近 count 篇论文，每篇拍平为一篇文档，写入新的本地索引
pub async fn build_index(
    cfg: &AppConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    topic: &str,
    count: usize,
) -> Result<(Vec<PaperRecord>, IngestReport), AgentError> {
    let client = ArxivClient::new(cfg.tools.arxiv.api_url.clone(), cfg.tools.arxiv.timeout_secs);
    let papers = client.search(topic, count).await?;
    let store = DocumentStore::create_local(
        &cfg.store.persist_dir,
        embedder,
        ChunkingConfig::new(cfg.store.chunk_size, cfg.store.chunk_overlap),
    );
    let documents = papers.iter().map(IndexedDocument::from_paper).collect();
    let report = store.ingest(documents).await?;
    Ok((papers, report))
}

/// 目录导入结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryIngest {
    /// 目录不存在，已创建
    CreatedEmptyDir(PathBuf),
    /// 目录里没有 PDF
    NoPdfs(PathBuf),
    Ingested { files: usize, report: IngestReport },
}

/// 把目录下所有 PDF（每页一篇文档）导入文档库
pub async fn ingest_directory(store: &DocumentStore, dir: &Path) -> Result<DirectoryIngest, AgentError> {
    if !dir.exists() {
        tokio::fs::create_dir_all(dir).await.map_err(StoreError::from)?;
        return Ok(DirectoryIngest::CreatedEmptyDir(dir.to_path_buf()));
    }
    let pdfs = loader::list_pdfs(dir);
    if pdfs.is_empty() {
        return Ok(DirectoryIngest::NoPdfs(dir.to_path_buf()));
    }
    tracing::info!(dir = %dir.display(), files = pdfs.len(), "ingesting pdfs");
    let documents = loader::load_files(&pdfs).await?;
    let report = store.ingest(documents).await?;
    Ok(DirectoryIngest::Ingested {
        files: pdfs.len(),
        report,
    })
}
