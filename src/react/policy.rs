//! 路由策略：在执行模型提出的工具调用前做确定性检查
//!
//! 1. 下载工具只在用户话语里有明确的下载/保存指令时放行
//! 2. 本轮还没查过本地知识库时，远程抓取只在用户明确要新论文时放行
//! 3. 模型没查任何来源就要作答时（寒暄除外），由编排器先用用户原话补查一次本地知识库
//! 4. 本地检索为空且未尝试远程抓取就要作答时，由编排器补发一次 fetch_from_arxiv
//!
//! 「本地结果是否足够」交给模型判断（它能看到每条命中的相关度），这里不设分数阈值。

use regex::Regex;

use crate::core::AgentError;
use crate::react::ToolCall;
use crate::tools::{ToolInvocation, ARXIV_TOOL, DOWNLOAD_TOOL, KNOWLEDGE_TOOL, NO_LOCAL_MATCHES};

const DOWNLOAD_DIRECTIVE: &str =
    r"(?i)\b(?:download(?:ing)?|save|store\b.*\blocally|fetch\s+the\s+pdf|get\s+the\s+pdf)\b|tải|\blưu\b";
const FRESH_REQUEST: &str =
    r"(?i)\b(?:new|newest|latest|recent|recently|current|up[- ]to[- ]date|this\s+(?:week|month|year))\b|mới nhất|gần đây";
/// 整句只是问候、致谢或告别
const SMALL_TALK: &str = r"(?i)^\s*(?:hi|hello|hey|yo|thanks|thank\s+you|thx|ok|okay|bye|goodbye|good\s+(?:morning|afternoon|evening|night)|xin\s+chào|chào(?:\s+bạn)?|cảm\s+ơn(?:\s+bạn)?|tạm\s+biệt)(?:\s+(?:there|you|a\s+lot|so\s+much|again|all))?[\s!.,?]*$";

/// 本轮内的路由状态
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TurnState {
    pub local_queries: usize,
    pub last_local_query: Option<String>,
    /// 最近一次本地检索没有可用结果（无命中或检索失败）
    pub local_empty: bool,
    pub remote_fetches: usize,
    pub downloads: usize,
}

impl TurnState {
    /// 根据一次已执行的工具调用更新状态
    pub fn record(&mut self, invocation: &ToolInvocation) {
        match invocation.tool_name.as_str() {
            KNOWLEDGE_TOOL => {
                self.local_queries += 1;
                self.last_local_query = crate::tools::knowledge::query_arg(&invocation.arguments);
                self.local_empty = !invocation.ok()
                    || invocation
                        .result
                        .as_deref()
                        .map_or(true, |r| r.starts_with(NO_LOCAL_MATCHES));
            }
            ARXIV_TOOL => self.remote_fetches += 1,
            DOWNLOAD_TOOL => self.downloads += 1,
            _ => {}
        }
    }
}

/// 对一次工具调用的裁决
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    /// 拒绝，附带回灌给模型的说明
    Refuse(String),
}

/// 路由策略
#[derive(Debug, Clone)]
pub struct RoutingPolicy {
    download_directive: Regex,
    fresh_request: Regex,
    small_talk: Regex,
}

impl RoutingPolicy {
    pub fn new() -> Result<Self, AgentError> {
        Ok(Self {
            download_directive: Regex::new(DOWNLOAD_DIRECTIVE)
                .map_err(|e| AgentError::ConfigError(e.to_string()))?,
            fresh_request: Regex::new(FRESH_REQUEST)
                .map_err(|e| AgentError::ConfigError(e.to_string()))?,
            small_talk: Regex::new(SMALL_TALK).map_err(|e| AgentError::ConfigError(e.to_string()))?,
        })
    }

    /// 用户话语是否包含明确的下载/保存指令
    pub fn wants_download(&self, utterance: &str) -> bool {
        self.download_directive.is_match(utterance)
    }

    /// 用户是否明确要求新的/最近的论文
    pub fn wants_fresh_papers(&self, utterance: &str) -> bool {
        self.fresh_request.is_match(utterance)
    }

    /// 整句只是寒暄，无需检索
    pub fn is_small_talk(&self, utterance: &str) -> bool {
        self.small_talk.is_match(utterance)
    }

    pub fn vet(&self, utterance: &str, state: &TurnState, call: &ToolCall) -> Verdict {
        match call.tool.as_str() {
            DOWNLOAD_TOOL if !self.wants_download(utterance) => Verdict::Refuse(format!(
                "{} may only be used when the user explicitly asks to download or save a paper, \
                 and this request does not. Do not download anything; answer the question instead.",
                DOWNLOAD_TOOL
            )),
            ARXIV_TOOL if state.local_queries == 0 && !self.wants_fresh_papers(utterance) => {
                Verdict::Refuse(format!(
                    "Query the local knowledge base with {} first. Use {} only when the local \
                     results are insufficient or the user asks for new papers.",
                    KNOWLEDGE_TOOL, ARXIV_TOOL
                ))
            }
            _ => Verdict::Allow,
        }
    }

    /// 模型准备作答前的检查，返回应由编排器补发的调用：
    /// 本轮没查过任何来源时先查本地；本地为空且还没抓过远程时抓取 arXiv
    pub fn before_answer(&self, utterance: &str, state: &TurnState) -> Option<ToolCall> {
        let consulted = state.local_queries + state.remote_fetches + state.downloads;
        if consulted == 0 {
            let query = utterance.trim();
            if query.is_empty() || self.is_small_talk(query) {
                return None;
            }
            return Some(ToolCall::new(
                KNOWLEDGE_TOOL,
                serde_json::json!({ "query": query }),
            ));
        }
        if state.local_queries == 0 || !state.local_empty || state.remote_fetches > 0 {
            return None;
        }
        let topic = state.last_local_query.clone()?;
        Some(ToolCall::new(
            ARXIV_TOOL,
            serde_json::json!({ "topic": topic }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RoutingPolicy {
        RoutingPolicy::new().unwrap()
    }

    fn invocation(tool: &str, args: serde_json::Value, result: Result<&str, &str>) -> ToolInvocation {
        ToolInvocation {
            tool_name: tool.to_string(),
            arguments: args,
            result: result.ok().map(String::from),
            error: result.err().map(String::from),
        }
    }

    #[test]
    fn test_download_directive_detection() {
        let p = policy();
        assert!(!p.wants_download("tell me about transformers"));
        assert!(p.wants_download("download this paper as transformer.pdf"));
        assert!(p.wants_download("Please save the first paper"));
        assert!(p.wants_download("store it locally please"));
        assert!(p.wants_download("tải bài báo này"));
        assert!(!p.wants_download("which papers saved the most compute?"));
    }

    #[test]
    fn test_fresh_request_detection() {
        let p = policy();
        assert!(p.wants_fresh_papers("what are the latest papers on RAG"));
        assert!(p.wants_fresh_papers("any recent work on diffusion?"));
        assert!(!p.wants_fresh_papers("explain diffusion models"));
    }

    #[test]
    fn test_download_refused_without_directive() {
        let call = ToolCall::new(DOWNLOAD_TOOL, serde_json::json!({"url": "http://x/y.pdf"}));
        let p = policy();
        assert!(matches!(
            p.vet("tell me about transformers", &TurnState::default(), &call),
            Verdict::Refuse(_)
        ));
        assert_eq!(
            p.vet("download this paper as transformer.pdf", &TurnState::default(), &call),
            Verdict::Allow
        );
    }

    #[test]
    fn test_remote_fetch_requires_local_first() {
        let call = ToolCall::new(ARXIV_TOOL, serde_json::json!({"topic": "rag"}));
        let p = policy();
        assert!(matches!(p.vet("explain rag", &TurnState::default(), &call), Verdict::Refuse(_)));
        assert_eq!(p.vet("latest papers on rag", &TurnState::default(), &call), Verdict::Allow);

        let mut state = TurnState::default();
        state.record(&invocation(KNOWLEDGE_TOOL, serde_json::json!({"query": "rag"}), Ok("Top 1 local result(s)")));
        assert_eq!(p.vet("explain rag", &state, &call), Verdict::Allow);
    }

    #[test]
    fn test_before_answer_forces_remote_fetch_when_local_empty() {
        let p = policy();
        let mut state = TurnState::default();
        let empty = format!("{} for \"diffusion models\".", NO_LOCAL_MATCHES);
        state.record(&invocation(
            KNOWLEDGE_TOOL,
            serde_json::json!({"query": "diffusion models"}),
            Ok(empty.as_str()),
        ));
        let forced = p.before_answer("diffusion models", &state).unwrap();
        assert_eq!(forced.tool, ARXIV_TOOL);
        assert_eq!(forced.args["topic"], "diffusion models");

        state.record(&invocation(ARXIV_TOOL, serde_json::json!({"topic": "diffusion models"}), Err("HTTP 503")));
        assert!(p.before_answer("diffusion models", &state).is_none());
    }

    #[test]
    fn test_failed_local_query_counts_as_empty() {
        let mut state = TurnState::default();
        state.record(&invocation(KNOWLEDGE_TOOL, serde_json::json!({"query": "gnn"}), Err("embedding failed")));
        assert!(state.local_empty);
        assert!(policy().before_answer("graph neural networks", &state).is_some());
    }

    #[test]
    fn test_before_answer_queries_local_when_nothing_consulted() {
        let p = policy();
        let forced = p.before_answer(" diffusion models ", &TurnState::default()).unwrap();
        assert_eq!(forced.tool, KNOWLEDGE_TOOL);
        assert_eq!(forced.args["query"], "diffusion models");

        let mut hit = TurnState::default();
        hit.record(&invocation(KNOWLEDGE_TOOL, serde_json::json!({"query": "rag"}), Ok("Top 1 local result(s)")));
        assert!(p.before_answer("explain rag", &hit).is_none());

        let mut downloaded = TurnState::default();
        downloaded.record(&invocation(DOWNLOAD_TOOL, serde_json::json!({"url": "http://x/1.pdf"}), Ok("saved")));
        assert!(p.before_answer("download the paper", &downloaded).is_none());
    }

    #[test]
    fn test_small_talk_is_not_searched() {
        let p = policy();
        for greeting in ["hi", "Hello there!", "thanks a lot", "ok", "xin chào", "cảm ơn bạn"] {
            assert!(p.is_small_talk(greeting), "{greeting}");
            assert!(p.before_answer(greeting, &TurnState::default()).is_none());
        }
        assert!(!p.is_small_talk("hi, what is retrieval augmented generation?"));
        assert!(!p.is_small_talk("diffusion models"));
    }
}
