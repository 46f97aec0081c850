//! PDF 下载工具（download_pdf_file_tool）
//!
//! 读取完整响应体后一次写入 papers 目录（目录不存在则创建）。
//! 传输错误、非 2xx、本地 IO 错误都折叠为 `FetchOutcome { ok: false, message }`，不向上抛出。

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;

use crate::tools::{Tool, DOWNLOAD_TOOL};

/// 下载结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    pub ok: bool,
    pub message: String,
}

impl FetchOutcome {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// 文件抓取器：固定目标目录
#[derive(Debug, Clone)]
pub struct FileFetcher {
    client: Client,
    dest_dir: PathBuf,
}

impl FileFetcher {
    pub fn new(dest_dir: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("arxiv-agent/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            client,
            dest_dir: dest_dir.into(),
        }
    }

    pub fn dest_dir(&self) -> &Path {
        &self.dest_dir
    }

    pub async fn fetch(&self, url: &str, destination_name: &str) -> FetchOutcome {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return FetchOutcome::failed(format!("Invalid URL: '{}'", url));
        }
        let file_name = match resolve_file_name(destination_name) {
            Ok(name) => name,
            Err(e) => return FetchOutcome::failed(e),
        };

        let resp = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return FetchOutcome::failed(format!("Failed to download PDF: {}", e)),
        };
        if !resp.status().is_success() {
            return FetchOutcome::failed(format!(
                "Failed to download PDF: HTTP {} from {}",
                resp.status(),
                url
            ));
        }
        let bytes = match resp.bytes().await {
            Ok(b) => b,
            Err(e) => return FetchOutcome::failed(format!("Failed to read response body: {}", e)),
        };

        if let Err(e) = tokio::fs::create_dir_all(&self.dest_dir).await {
            return FetchOutcome::failed(format!(
                "Could not create directory {}: {}",
                self.dest_dir.display(),
                e
            ));
        }
        let path = self.dest_dir.join(&file_name);
        if let Err(e) = tokio::fs::write(&path, &bytes).await {
            return FetchOutcome::failed(format!("Could not write {}: {}", path.display(), e));
        }
        tracing::info!(url = %url, path = %path.display(), bytes = bytes.len(), "pdf downloaded");
        FetchOutcome {
            ok: true,
            message: format!("PDF downloaded successfully and saved as: {}", path.display()),
        }
    }
}

/// 目标文件名：为空时生成 `paper-<timestamp>.pdf`；不允许路径分隔符与 `..`；无扩展名时补 .pdf
fn resolve_file_name(name: &str) -> Result<String, String> {
    let name = name.trim();
    if name.is_empty() {
        return Ok(format!(
            "paper-{}.pdf",
            chrono::Local::now().format("%Y%m%d-%H%M%S")
        ));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(format!(
            "Invalid output file name '{}': use a plain file name without directories",
            name
        ));
    }
    if Path::new(name).extension().is_none() {
        return Ok(format!("{}.pdf", name));
    }
    Ok(name.to_string())
}

pub struct DownloadPdfTool {
    fetcher: FileFetcher,
}

impl DownloadPdfTool {
    pub fn new(fetcher: FileFetcher) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Tool for DownloadPdfTool {
    fn name(&self) -> &str {
        DOWNLOAD_TOOL
    }

    fn description(&self) -> &str {
        "Downloads a PDF file by link and saves it locally. Only use it when the user explicitly asks to download or save a paper. Args: {\"url\": \"<pdf url>\", \"output_file_name\": \"<name.pdf>\"}."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "Direct link to the PDF" },
                "output_file_name": { "type": "string", "description": "File name to save as, without directories" }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let url = args
            .get("url")
            .or_else(|| args.get("pdf_url"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        if url.trim().is_empty() {
            return Err("Missing url".to_string());
        }
        let name = args
            .get("output_file_name")
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let outcome = self.fetcher.fetch(url, name).await;
        if outcome.ok {
            Ok(outcome.message)
        } else {
            Err(outcome.message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// 一次性 HTTP 服务：对第一个连接回复给定状态与响应体
    async fn serve_once(status: &'static str, body: &'static [u8]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            if let Ok((mut sock, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = sock.read(&mut buf).await;
                let head = format!(
                    "HTTP/1.1 {}\r\nContent-Type: application/pdf\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                    status,
                    body.len()
                );
                let _ = sock.write_all(head.as_bytes()).await;
                let _ = sock.write_all(body).await;
                let _ = sock.shutdown().await;
            }
        });
        format!("http://{}/pdf/2401.00001", addr)
    }

    #[test]
    fn test_resolve_file_name() {
        assert_eq!(resolve_file_name("transformer.pdf").unwrap(), "transformer.pdf");
        assert_eq!(resolve_file_name("transformer").unwrap(), "transformer.pdf");
        assert!(resolve_file_name("").unwrap().starts_with("paper-"));
        assert!(resolve_file_name("../etc/passwd").is_err());
        assert!(resolve_file_name("a\\b.pdf").is_err());
    }

    #[tokio::test]
    async fn test_download_creates_directory_and_writes_file() {
        let dir = TempDir::new().unwrap();
        let dest = dir.path().join("papers");
        let url = serve_once("200 OK", b"%PDF-1.4 fake").await;
        let outcome = FileFetcher::new(&dest, 5).fetch(&url, "transformer.pdf").await;
        assert!(outcome.ok, "{}", outcome.message);
        assert!(outcome.message.starts_with("PDF downloaded successfully and saved as: "));
        assert_eq!(std::fs::read(dest.join("transformer.pdf")).unwrap(), b"%PDF-1.4 fake");
    }

    #[tokio::test]
    async fn test_non_success_status_is_reported() {
        let dir = TempDir::new().unwrap();
        let url = serve_once("404 Not Found", b"missing").await;
        let outcome = FileFetcher::new(dir.path(), 5).fetch(&url, "x.pdf").await;
        assert!(!outcome.ok);
        assert!(outcome.message.contains("404"));
        assert!(!dir.path().join("x.pdf").exists());
    }

    #[tokio::test]
    async fn test_invalid_url_and_missing_args() {
        let dir = TempDir::new().unwrap();
        let tool = DownloadPdfTool::new(FileFetcher::new(dir.path(), 5));
        assert_eq!(tool.execute(serde_json::json!({})).await.unwrap_err(), "Missing url");
        let err = tool
            .execute(serde_json::json!({"url": "ftp://host/file.pdf"}))
            .await
            .unwrap_err();
        assert!(err.contains("Invalid URL"));
    }
}
