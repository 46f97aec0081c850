//! Arxiv Agent - 本地知识库优先的科研论文助手
//!
//! 模块划分：
//! - **agent**: 会话运行时（对话记忆 + 单轮编排 + 上传导入 + 建库）
//! - **arxiv**: arXiv Atom 接口客户端与论文记录
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误与恢复、状态投影、会话监管、主控循环
//! - **llm**: LLM 与 embedding 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 按 token 预算淘汰的对话记忆
//! - **observability**: 日志初始化
//! - **react**: Planner、路由策略、ReAct 主循环
//! - **store**: 文档库（分块、本地索引、Pinecone）
//! - **tools**: 工具箱（知识库检索、arXiv 抓取、PDF 下载）与执行器
//! - **ui**: Ratatui TUI 界面

pub mod agent;
pub mod arxiv;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod store;
pub mod tools;
pub mod ui;
