//! 会话监管：当前轮的取消管理
//!
//! 每轮开始时签发一个新的 CancellationToken；用户 Ctrl+C 只取消当前轮，下一轮不受影响。

use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
pub struct SessionSupervisor {
    current: Mutex<Option<CancellationToken>>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始新一轮，返回该轮的取消令牌
    pub fn begin_turn(&self) -> CancellationToken {
        let token = CancellationToken::new();
        if let Ok(mut cur) = self.current.lock() {
            *cur = Some(token.clone());
        }
        token
    }

    pub fn end_turn(&self) {
        if let Ok(mut cur) = self.current.lock() {
            *cur = None;
        }
    }

    /// 取消当前轮；没有进行中的轮时返回 false
    pub fn cancel(&self) -> bool {
        match self.current.lock() {
            Ok(cur) => match cur.as_ref() {
                Some(token) => {
                    token.cancel();
                    true
                }
                None => false,
            },
            Err(_) => false,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.current.lock().map(|c| c.is_some()).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_only_affects_current_turn() {
        let sup = SessionSupervisor::new();
        assert!(!sup.cancel());
        let first = sup.begin_turn();
        assert!(sup.is_busy());
        assert!(sup.cancel());
        assert!(first.is_cancelled());
        sup.end_turn();
        let second = sup.begin_turn();
        assert!(!second.is_cancelled());
    }
}
