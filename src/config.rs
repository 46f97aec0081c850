//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ARXIV_AGENT__*` 覆盖（双下划线表示嵌套，如 `ARXIV_AGENT__STORE__BACKEND=pinecone`）。
//! 密钥不进配置文件：GOOGLE_API_KEY / OPENAI_API_KEY / PINECONE_API_KEY 直接从环境读取。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub embedding: EmbeddingSection,
    pub store: StoreSection,
    pub tools: ToolsSection,
    pub memory: MemorySection,
    pub agent: AgentSection,
}

/// [app] 段：应用名与本地目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 下载与本地待导入 PDF 所在目录
    pub papers_dir: PathBuf,
    /// 上传文件的临时目录（导入后删除）
    pub upload_dir: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            papers_dir: PathBuf::from("papers"),
            upload_dir: PathBuf::from("uploads"),
        }
    }
}

/// [llm] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub model: String,
    pub base_url: String,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
}

pub const GEMINI_OPENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            base_url: GEMINI_OPENAI_BASE_URL.to_string(),
            max_tokens: 8192,
            request_timeout_secs: 60,
        }
    }
}

/// [embedding] 段：base_url 缺省时沿用 [llm].base_url
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    pub model: String,
    pub base_url: Option<String>,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            model: "gemini-embedding-001".to_string(),
            base_url: None,
        }
    }
}

/// 文档库后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// 本地磁盘持久化索引
    #[default]
    Local,
    /// 远程 Pinecone 向量库
    Pinecone,
}

/// [store] 段：后端选择、分块与检索参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    pub backend: StoreBackend,
    pub persist_dir: PathBuf,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub similarity_top_k: usize,
    /// 可选的相关度下限；低于该分数的检索结果不交给模型（默认关闭）
    pub min_relevance: Option<f32>,
    pub pinecone: PineconeSection,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Local,
            persist_dir: PathBuf::from("index"),
            chunk_size: 1024,
            chunk_overlap: 50,
            similarity_top_k: 5,
            min_relevance: None,
            pinecone: PineconeSection::default(),
        }
    }
}

/// [store.pinecone] 段：索引名与数据面 host（形如 https://arxiv-research-xxxx.svc.<region>.pinecone.io）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PineconeSection {
    pub index_name: String,
    pub host: Option<String>,
    pub namespace: Option<String>,
    pub timeout_secs: u64,
}

impl Default for PineconeSection {
    fn default() -> Self {
        Self {
            index_name: "arxiv-research".to_string(),
            host: None,
            namespace: None,
            timeout_secs: 30,
        }
    }
}

/// [tools] 段：单次工具调用超时与各工具参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub tool_timeout_secs: u64,
    pub arxiv: ArxivSection,
    pub download: DownloadSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            arxiv: ArxivSection::default(),
            download: DownloadSection::default(),
        }
    }
}

/// [tools.arxiv] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArxivSection {
    pub api_url: String,
    pub default_max_results: usize,
    pub timeout_secs: u64,
    /// 是否把远程抓取到的论文追加进文档库
    pub ingest_results: bool,
}

impl Default for ArxivSection {
    fn default() -> Self {
        Self {
            api_url: "https://export.arxiv.org/api/query".to_string(),
            default_max_results: 3,
            timeout_secs: 20,
            ingest_results: false,
        }
    }
}

/// [tools.download] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DownloadSection {
    pub timeout_secs: u64,
}

impl Default for DownloadSection {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

/// [memory] 段：对话记忆 token 上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MemorySection {
    pub token_limit: usize,
}

impl Default for MemorySection {
    fn default() -> Self {
        Self {
            token_limit: 20_000,
        }
    }
}

/// [agent] 段：单轮最大工具步数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub max_steps: usize,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self { max_steps: 10 }
    }
}

/// 从 config 目录加载配置，环境变量 ARXIV_AGENT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ARXIV_AGENT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ARXIV_AGENT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 加载配置，失败时告警并使用默认值（配置错误不阻断启动）
pub fn load_config_or_default(config_path: Option<PathBuf>) -> AppConfig {
    load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    })
}
