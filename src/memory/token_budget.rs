//! Token 预算
//!
//! 对话记忆按语言模型 token 单位计量；这里用字符启发式估算，不依赖具体模型的分词器。

/// Token 估算器（简单的字符计数近似）
pub struct TokenEstimator;

impl TokenEstimator {
    /// 估算文本的 token 数量
    /// 使用简单的启发式规则：ASCII 约 4 字符/token，非 ASCII（越南语声调字母、中文等）约 1.5 字符/token
    pub fn estimate(text: &str) -> usize {
        let mut ascii_chars = 0;
        let mut non_ascii_chars = 0;

        for c in text.chars() {
            if c.is_ascii() {
                ascii_chars += 1;
            } else {
                non_ascii_chars += 1;
            }
        }

        let tokens = ascii_chars / 4 + (non_ascii_chars as f64 / 1.5).ceil() as usize;
        tokens.max(1)
    }
}

/// 对话记忆的 token 上限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBudget {
    limit: usize,
}

impl TokenBudget {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn exceeded_by(&self, used: usize) -> bool {
        used > self.limit
    }
}

impl Default for TokenBudget {
    fn default() -> Self {
        Self::new(20_000)
    }
}

/// 将文本截断到指定字符数（按字符，UTF-8 安全），超出时追加 "..."
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let head: String = text.chars().take(max_chars).collect();
    format!("{}...", head)
}
