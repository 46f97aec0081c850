//! 索引构建：抓取某主题下最近的 N 篇论文，写入本地持久化索引
//!
//! 运行方式：
//! ```bash
//! cargo run --bin arxiv-agent-index -- "diffusion models" 10
//! ```

use anyhow::{bail, Context};
use arxiv_agent::agent::build_index;
use arxiv_agent::config::load_config_or_default;
use arxiv_agent::llm::create_embedder_from_config;
use arxiv_agent::observability;

const DEFAULT_COUNT: usize = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let mut args = std::env::args().skip(1);
    let Some(topic) = args.next().filter(|t| !t.trim().is_empty()) else {
        bail!("usage: arxiv-agent-index <topic> [count]");
    };
    let count = match args.next() {
        Some(raw) => raw
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .with_context(|| format!("count must be a positive integer, got '{}'", raw))?,
        None => DEFAULT_COUNT,
    };

    let cfg = load_config_or_default(None);
    let embedder = create_embedder_from_config(&cfg);

    tracing::info!(topic = %topic, count, "building index");
    let (papers, report) = build_index(&cfg, embedder, &topic, count)
        .await
        .context("Index build failed")?;

    println!("Fetched {} paper(s) for \"{}\":", papers.len(), topic);
    for (i, paper) in papers.iter().enumerate() {
        println!("  {}. {}", i + 1, paper.title);
    }
    println!("{}", report.message);
    println!("Index persisted to {}", cfg.store.persist_dir.display());
    Ok(())
}
