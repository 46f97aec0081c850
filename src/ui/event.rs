//! 事件处理
//!
//! 轮询 crossterm 键盘事件，将 Ctrl+C / Ctrl+L / Ctrl+Q 转为 Command（Cancel / Reset / Quit），
//! 其余按键交给 run_app 拼 input_buffer；Enter 时 submit_line 解析 `/upload` 或作为问题提交。

use std::path::PathBuf;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;

use crate::core::Command;

/// 应用事件：来自快捷键的 Command 或原始 KeyEvent
#[derive(Debug, Clone)]
pub enum AppEvent {
    Command(Command),
    Key(KeyEvent),
}

/// 把一行输入解析为命令：`/upload a.pdf "my notes.md"`、`/reset`、`/quit`，其余为提问
pub fn parse_input_line(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let (head, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    match head.to_lowercase().as_str() {
        "/upload" => {
            let files: Vec<PathBuf> = split_args(rest).into_iter().map(PathBuf::from).collect();
            if files.is_empty() {
                None
            } else {
                Some(Command::Upload(files))
            }
        }
        "/reset" | "/clear" => Some(Command::Reset),
        "/quit" | "/exit" => Some(Command::Quit),
        _ => Some(Command::Submit(line.to_string())),
    }
}

/// 按空白切分参数；单引号或双引号包住的部分保留空格
fn split_args(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_arg = false;
    for c in input.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_arg = true;
            }
            None if c.is_whitespace() => {
                if in_arg {
                    args.push(std::mem::take(&mut current));
                    in_arg = false;
                }
            }
            None => {
                current.push(c);
                in_arg = true;
            }
        }
    }
    if in_arg {
        args.push(current);
    }
    args.retain(|a| !a.is_empty());
    args
}

/// 事件处理器：持有 cmd_tx，poll 时读键盘并返回 AppEvent
pub struct EventHandler {
    cmd_tx: mpsc::UnboundedSender<Command>,
}

impl EventHandler {
    pub fn new(cmd_tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { cmd_tx }
    }

    pub fn poll(&self) -> anyhow::Result<Option<AppEvent>> {
        if event::poll(std::time::Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(Some(self.handle_key(key)));
                }
            }
        }
        Ok(None)
    }

    fn handle_key(&self, key: KeyEvent) -> AppEvent {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if ctrl => {
                let _ = self.cmd_tx.send(Command::Cancel);
                AppEvent::Command(Command::Cancel)
            }
            KeyCode::Char('l') if ctrl => {
                let _ = self.cmd_tx.send(Command::Reset);
                AppEvent::Command(Command::Reset)
            }
            KeyCode::Char('q') if ctrl => {
                let _ = self.cmd_tx.send(Command::Quit);
                AppEvent::Command(Command::Quit)
            }
            _ => AppEvent::Key(key),
        }
    }

    /// 提交一行输入；返回 true 表示用户要求退出
    pub fn submit_line(&self, line: &str) -> bool {
        match parse_input_line(line) {
            Some(Command::Quit) => {
                let _ = self.cmd_tx.send(Command::Quit);
                true
            }
            Some(cmd) => {
                let _ = self.cmd_tx.send(cmd);
                false
            }
            None => false,
        }
    }
}
