//! 论文来源客户端：arXiv Atom API
//!
//! search(topic, max_results) 按提交时间倒序查询 `all:"<topic>"`，把 Atom feed 解析为 PaperRecord。
//! 不做缓存、不做额外重试：每次调用都重新请求远端；网络/接口错误以 ArxivError 返回，由工具层转为观察文本。

use std::collections::HashSet;
use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 论文来源客户端的错误
#[derive(Debug, Error)]
pub enum ArxivError {
    #[error("max_results must be greater than 0")]
    InvalidMaxResults,

    #[error("topic must not be empty")]
    EmptyTopic,

    #[error("arXiv request failed: {0}")]
    Network(String),

    #[error("arXiv returned HTTP {0}")]
    Status(u16),

    #[error("arXiv API error: {0}")]
    Api(String),
}

/// 一篇论文的元数据；抓取后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
    pub journal_ref: Option<String>,
    pub primary_category: String,
    pub doi: Option<String>,
    pub pdf_url: String,
    /// entry id，同一批结果内唯一
    pub arxiv_url: String,
}

impl PaperRecord {
    /// 拍平成单段文本，供文档库嵌入
    pub fn to_document_text(&self) -> String {
        format!(
            "Title: {}\nAuthors: {}\nAbstract: {}\nURL: {}\nDOI: {}\nPrimary Category: {}\narXiv URL: {}\n",
            self.title,
            self.authors.join(", "),
            self.summary,
            if self.pdf_url.is_empty() { "N/A" } else { &self.pdf_url },
            self.doi.as_deref().unwrap_or("N/A"),
            self.primary_category,
            self.arxiv_url,
        )
    }
}

/// arXiv 查询客户端
#[derive(Debug, Clone)]
pub struct ArxivClient {
    client: Client,
    api_url: String,
}

impl ArxivClient {
    pub fn new(api_url: impl Into<String>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("arxiv-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_url: api_url.into(),
        }
    }

    /// 构造查询 URL：`all:"topic"`，按提交时间倒序
    pub fn query_url(&self, topic: &str, max_results: usize) -> String {
        let search_query = format!("all:\"{}\"", topic.trim());
        format!(
            "{}?search_query={}&start=0&max_results={}&sortBy=submittedDate&sortOrder=descending",
            self.api_url,
            urlencoding::encode(&search_query),
            max_results
        )
    }

    pub async fn search(
        &self,
        topic: &str,
        max_results: usize,
    ) -> Result<Vec<PaperRecord>, ArxivError> {
        if max_results == 0 {
            return Err(ArxivError::InvalidMaxResults);
        }
        if topic.trim().is_empty() {
            return Err(ArxivError::EmptyTopic);
        }
        let url = self.query_url(topic, max_results);
        tracing::info!(topic = %topic, max_results, "arxiv search");
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ArxivError::Network(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(ArxivError::Status(resp.status().as_u16()));
        }
        let body = resp
            .text()
            .await
            .map_err(|e| ArxivError::Network(e.to_string()))?;
        let mut papers = parse_atom_feed(&body)?;
        papers.truncate(max_results);
        Ok(papers)
    }
}

/// 解析 arXiv Atom feed；同一批内按 arxiv_url 去重
pub fn parse_atom_feed(xml: &str) -> Result<Vec<PaperRecord>, ArxivError> {
    let mut papers = Vec::new();
    let mut seen = HashSet::new();

    for raw in xml.split("<entry>").skip(1) {
        let entry = raw.split("</entry>").next().unwrap_or(raw);
        let id = extract_tag(entry, "id").unwrap_or_default();

        // 查询语法错误时 arXiv 返回一条 id 指向 /api/errors 的条目
        if id.contains("/api/errors") {
            let msg = extract_tag(entry, "summary").unwrap_or_else(|| "unknown error".to_string());
            return Err(ArxivError::Api(msg));
        }

        let title = extract_tag(entry, "title").unwrap_or_default();
        if title.is_empty() || id.is_empty() || !seen.insert(id.clone()) {
            continue;
        }

        let authors = entry
            .split("<author>")
            .skip(1)
            .filter_map(|a| extract_tag(a, "name"))
            .collect();

        let primary_category = extract_attr(entry, "arxiv:primary_category", "term")
            .or_else(|| extract_attr(entry, "category", "term"))
            .unwrap_or_default();

        let pdf_url = find_pdf_link(entry).unwrap_or_else(|| id.replacen("/abs/", "/pdf/", 1));

        papers.push(PaperRecord {
            title,
            authors,
            summary: extract_tag(entry, "summary").unwrap_or_default(),
            journal_ref: extract_tag(entry, "arxiv:journal_ref"),
            primary_category,
            doi: extract_tag(entry, "arxiv:doi"),
            pdf_url,
            arxiv_url: id,
        });
    }

    Ok(papers)
}

/// 取第一个 `<tag ...>content</tag>` 的内容，折叠空白并反转义；空内容视为 None
fn extract_tag(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);
    let mut search_from = 0;
    // 跳过前缀相同的其它标签（如 <id 与 <identifier）
    let start = loop {
        let pos = xml[search_from..].find(&open)? + search_from;
        let next = xml[pos + open.len()..].chars().next()?;
        if next == '>' || next.is_whitespace() {
            break pos;
        }
        search_from = pos + open.len();
    };
    let content_start = xml[start..].find('>')? + start + 1;
    let end = xml[content_start..].find(&close)? + content_start;
    let text = collapse_whitespace(&unescape_xml(&xml[content_start..end]));
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/// 取第一个 `<tag ... attr="value">` 的属性值
fn extract_attr(xml: &str, tag: &str, attr: &str) -> Option<String> {
    let open = format!("<{} ", tag);
    let start = xml.find(&open)?;
    let end = xml[start..].find('>')? + start;
    attr_value(&xml[start..end], attr)
}

fn attr_value(element: &str, attr: &str) -> Option<String> {
    let needle = format!("{}=\"", attr);
    let pos = element
        .match_indices(&needle)
        .find(|(i, _)| *i == 0 || element[..*i].ends_with(char::is_whitespace))?
        .0;
    let value_start = pos + needle.len();
    let value_end = element[value_start..].find('"')? + value_start;
    Some(unescape_xml(&element[value_start..value_end]))
}

fn find_pdf_link(entry: &str) -> Option<String> {
    entry.split("<link ").skip(1).find_map(|rest| {
        let element = rest.split('>').next()?;
        let is_pdf = attr_value(element, "title").as_deref() == Some("pdf")
            || attr_value(element, "type").as_deref() == Some("application/pdf");
        if is_pdf {
            attr_value(element, "href")
        } else {
            None
        }
    })
}

fn unescape_xml(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title type="html">ArXiv Query: search_query=all:"diffusion models"</title>
  <id>http://arxiv.org/api/abc</id>
  <entry>
    <id>http://arxiv.org/abs/2401.00001v1</id>
    <published>2024-01-01T00:00:00Z</published>
    <title>Fast Diffusion
      Models &amp; Friends</title>
    <summary>  We study diffusion
    models.  </summary>
    <author><name>Alice Smith</name></author>
    <author><name>Bob Lee</name><arxiv:affiliation>MIT</arxiv:affiliation></author>
    <arxiv:doi xmlns:arxiv="http://arxiv.org/schemas/atom">10.1000/xyz</arxiv:doi>
    <link title="doi" href="http://dx.doi.org/10.1000/xyz" rel="related"/>
    <link href="http://arxiv.org/abs/2401.00001v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2401.00001v1" rel="related" type="application/pdf"/>
    <arxiv:journal_ref xmlns:arxiv="http://arxiv.org/schemas/atom">NeurIPS 2024</arxiv:journal_ref>
    <arxiv:primary_category xmlns:arxiv="http://arxiv.org/schemas/atom" term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2401.00002v2</id>
    <title>Second Paper</title>
    <summary>Abstract two.</summary>
    <author><name>Carol</name></author>
    <arxiv:primary_category xmlns:arxiv="http://arxiv.org/schemas/atom" term="cs.CV" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2401.00002v2</id>
    <title>Second Paper (duplicate)</title>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_full_entry() {
        let papers = parse_atom_feed(FEED).unwrap();
        assert_eq!(papers.len(), 2);
        let p = &papers[0];
        assert_eq!(p.title, "Fast Diffusion Models & Friends");
        assert_eq!(p.summary, "We study diffusion models.");
        assert_eq!(p.authors, vec!["Alice Smith", "Bob Lee"]);
        assert_eq!(p.doi.as_deref(), Some("10.1000/xyz"));
        assert_eq!(p.journal_ref.as_deref(), Some("NeurIPS 2024"));
        assert_eq!(p.primary_category, "cs.LG");
        assert_eq!(p.pdf_url, "http://arxiv.org/pdf/2401.00001v1");
        assert_eq!(p.arxiv_url, "http://arxiv.org/abs/2401.00001v1");
    }

    #[test]
    fn test_missing_optional_fields_and_pdf_fallback() {
        let papers = parse_atom_feed(FEED).unwrap();
        let p = &papers[1];
        assert!(p.doi.is_none());
        assert!(p.journal_ref.is_none());
        assert_eq!(p.pdf_url, "http://arxiv.org/pdf/2401.00002v2");
    }

    #[test]
    fn test_api_error_entry() {
        let xml = r#"<feed><entry><id>http://arxiv.org/api/errors#incorrect_id_format</id>
            <title>Error</title><summary>incorrect id format</summary></entry></feed>"#;
        match parse_atom_feed(xml) {
            Err(ArxivError::Api(msg)) => assert_eq!(msg, "incorrect id format"),
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn test_document_text_layout() {
        let papers = parse_atom_feed(FEED).unwrap();
        let text = papers[1].to_document_text();
        assert!(text.starts_with("Title: Second Paper\nAuthors: Carol\n"));
        assert!(text.contains("DOI: N/A\n"));
        assert!(text.contains("Primary Category: cs.CV\n"));
        assert!(text.ends_with("arXiv URL: http://arxiv.org/abs/2401.00002v2\n"));
    }

    #[test]
    fn test_query_url_sorted_by_submission_date() {
        let client = ArxivClient::new("https://export.arxiv.org/api/query", 5);
        let url = client.query_url("diffusion models", 3);
        assert!(url.contains("search_query=all%3A%22diffusion%20models%22"));
        assert!(url.contains("max_results=3"));
        assert!(url.contains("sortBy=submittedDate"));
        assert!(url.contains("sortOrder=descending"));
    }

    #[tokio::test]
    async fn test_search_rejects_zero_results() {
        let client = ArxivClient::new("http://127.0.0.1:9", 1);
        assert!(matches!(
            client.search("x", 0).await,
            Err(ArxivError::InvalidMaxResults)
        ));
        assert!(matches!(client.search("  ", 3).await, Err(ArxivError::EmptyTopic)));
    }
}
