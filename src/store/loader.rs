//! 本地文件读取
//!
//! 把本地文件转为 IndexedDocument：PDF 每页一篇（交给外部 `pdftotext` 解析，按换页符拆页），
//! 纯文本 / Markdown 每个文件一篇。PDF 解析本身不在本 crate 内实现。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tokio::process::Command;
use walkdir::WalkDir;

use crate::store::{IndexedDocument, StoreError};

const TEXT_EXTENSIONS: &[&str] = &["txt", "md"];

/// 列出目录下（递归）所有 .pdf 文件，按路径排序
pub fn list_pdfs(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| extension(p).as_deref() == Some("pdf"))
        .collect();
    files.sort();
    files
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// 读取一组文件；不支持的扩展名直接报错，单个文件读失败则整体失败
pub async fn load_files(paths: &[PathBuf]) -> Result<Vec<IndexedDocument>, StoreError> {
    let mut documents = Vec::new();
    for path in paths {
        let docs = match extension(path).as_deref() {
            Some("pdf") => load_pdf(path).await?,
            Some(ext) if TEXT_EXTENSIONS.contains(&ext) => load_text(path).await?,
            _ => {
                return Err(StoreError::UnsupportedFile(path.display().to_string()));
            }
        };
        tracing::debug!(file = %path.display(), documents = docs.len(), "loaded file");
        documents.extend(docs);
    }
    Ok(documents)
}

fn file_metadata(path: &Path) -> BTreeMap<String, String> {
    let mut meta = BTreeMap::new();
    meta.insert("source".to_string(), "file".to_string());
    meta.insert("file_path".to_string(), path.display().to_string());
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        meta.insert("file_name".to_string(), name.to_string());
    }
    meta
}

async fn load_text(path: &Path) -> Result<Vec<IndexedDocument>, StoreError> {
    let text = tokio::fs::read_to_string(path).await?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![IndexedDocument::new(text, file_metadata(path))])
}

async fn load_pdf(path: &Path) -> Result<Vec<IndexedDocument>, StoreError> {
    let output = Command::new("pdftotext")
        .arg("-layout")
        .arg("-enc")
        .arg("UTF-8")
        .arg(path)
        .arg("-")
        .output()
        .await
        .map_err(|e| StoreError::Parse(format!("pdftotext unavailable: {}", e)))?;
    if !output.status.success() {
        return Err(StoreError::Parse(format!(
            "pdftotext failed on {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    let text = String::from_utf8_lossy(&output.stdout);
    Ok(split_pages(&text, &file_metadata(path)))
}

/// 按换页符拆页，空页跳过；page_label 从 1 开始
pub fn split_pages(text: &str, base: &BTreeMap<String, String>) -> Vec<IndexedDocument> {
    text.split('\u{000C}')
        .enumerate()
        .filter(|(_, page)| !page.trim().is_empty())
        .map(|(i, page)| {
            let mut meta = base.clone();
            meta.insert("page_label".to_string(), (i + 1).to_string());
            IndexedDocument::new(page.trim().to_string(), meta)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_split_pages_skips_blank_pages() {
        let docs = split_pages("page one\u{000C}  \u{000C}page three\u{000C}", &BTreeMap::new());
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].text, "page one");
        assert_eq!(docs[1].metadata.get("page_label").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_list_pdfs_filters_by_extension() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("a.PDF"), b"x").unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        let pdfs = list_pdfs(dir.path());
        assert_eq!(pdfs.len(), 2);
    }

    #[tokio::test]
    async fn test_load_text_files() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Notes\nTransformers are attention models.").unwrap();
        let empty = dir.path().join("empty.txt");
        std::fs::write(&empty, "   ").unwrap();
        let docs = load_files(&[path.clone(), empty]).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].text.contains("attention"));
        assert_eq!(docs[0].metadata.get("file_name").map(String::as_str), Some("notes.md"));
    }

    #[tokio::test]
    async fn test_unsupported_extension_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("image.png");
        std::fs::write(&path, b"\x89PNG").unwrap();
        assert!(matches!(
            load_files(&[path]).await,
            Err(StoreError::UnsupportedFile(_))
        ));
    }
}
