//! 文档分块
//!
//! 固定窗口 + 重叠的切分，窗口与重叠由全局配置决定（非逐次调用参数）；优先在段落/句子边界断开，UTF-8 安全。

use std::collections::BTreeMap;

/// 文档块
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// 块 ID（来源文档 ID + 序号）
    pub id: String,
    pub text: String,
    pub source_id: String,
    /// 在原文档中的位置（字节偏移）
    pub offset: usize,
    pub metadata: BTreeMap<String, String>,
}

/// 分块策略；chunk_size / chunk_overlap 以字符计
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// 分隔符优先级（从高到低）
    pub separators: Vec<String>,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            chunk_overlap,
            ..Default::default()
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024,
            chunk_overlap: 50,
            separators: ["\n\n", "\n", ". ", "? ", "! ", " "]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// 文档分块器
#[derive(Debug, Clone, Default)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ChunkingConfig {
        &self.config
    }

    /// 将文档切分为块，每块继承文档元数据
    pub fn chunk(
        &self,
        doc_id: &str,
        text: &str,
        metadata: &BTreeMap<String, String>,
    ) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();
        let mut current_idx = 0;

        while current_idx < total_chars {
            let target_end = (current_idx + self.config.chunk_size).min(total_chars);
            let mut actual_end = target_end;

            // 不是文档末尾时，尽量在窗口后半段的分隔符处断开
            if target_end < total_chars {
                let slice: String = chars[current_idx..target_end].iter().collect();
                let min_chars = (target_end - current_idx) / 2;
                for sep in &self.config.separators {
                    if let Some(pos) = slice.rfind(sep.as_str()) {
                        let chars_to_sep = slice[..pos].chars().count() + sep.chars().count();
                        if chars_to_sep > min_chars {
                            actual_end = current_idx + chars_to_sep;
                            break;
                        }
                    }
                }
            }

            let chunk_text: String = chars[current_idx..actual_end].iter().collect();
            let trimmed = chunk_text.trim();
            if !trimmed.is_empty() {
                let byte_offset: usize = chars[..current_idx].iter().map(|c| c.len_utf8()).sum();
                chunks.push(Chunk {
                    id: format!("{}_{}", doc_id, chunks.len()),
                    text: trimmed.to_string(),
                    source_id: doc_id.to_string(),
                    offset: byte_offset,
                    metadata: metadata.clone(),
                });
            }

            if actual_end >= total_chars {
                break;
            }
            let overlap = self.config.chunk_overlap.min(actual_end - current_idx);
            let next_start = actual_end.saturating_sub(overlap);
            current_idx = if next_start > current_idx {
                next_start
            } else {
                actual_end
            };
        }

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> BTreeMap<String, String> {
        BTreeMap::from([("title".to_string(), "T".to_string())])
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let chunker = Chunker::default();
        let chunks = chunker.chunk("doc1", "Title: A\nAbstract: short.", &meta());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "doc1_0");
        assert_eq!(chunks[0].metadata.get("title").map(String::as_str), Some("T"));
    }

    #[test]
    fn test_windows_respect_size_and_overlap() {
        let chunker = Chunker::new(ChunkingConfig::new(100, 20));
        let text = "Sentence number one is here. ".repeat(40);
        let chunks = chunker.chunk("doc", &text, &BTreeMap::new());
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.text.chars().count() <= 100);
            assert_eq!(c.source_id, "doc");
        }
        // 相邻块有重叠内容
        let first_tail: String = chunks[0].text.chars().rev().take(10).collect::<Vec<_>>().into_iter().rev().collect();
        assert!(chunks[1].text.contains(first_tail.trim()));
    }

    #[test]
    fn test_empty_and_whitespace_text() {
        let chunker = Chunker::default();
        assert!(chunker.chunk("d", "", &BTreeMap::new()).is_empty());
        assert!(chunker.chunk("d", "   \n\n  ", &BTreeMap::new()).is_empty());
    }

    #[test]
    fn test_utf8_text() {
        let chunker = Chunker::new(ChunkingConfig::new(10, 3));
        let chunks = chunker.chunk("vi", "Mô hình khuếch tán cho ảnh", &BTreeMap::new());
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.text.chars().count() <= 10));
    }
}
