//! 界面渲染
//!
//! 标题栏显示阶段与当前工具，主体为滚动历史（按角色着色、按宽度换行），
//! 底部一行状态提示，再下面是输入框与快捷键提示。

use ratatui::{
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap},
    Frame,
};

use crate::core::{AgentPhase, UiState};
use crate::memory::{preview, Role};

/// 单条消息在 UI 中显示的最大字符数
const MAX_DISPLAY_CHARS: usize = 4000;

/// 将内容按宽度换行，支持 UTF-8（按字符数，避免在 UTF-8 中间截断）
fn wrap_text(s: &str, width: usize) -> Vec<String> {
    if width == 0 {
        return vec![s.to_string()];
    }
    let mut lines = Vec::new();
    for para in s.split('\n') {
        let mut line = String::new();
        for ch in para.chars() {
            if line.chars().count() >= width {
                lines.push(std::mem::take(&mut line));
            }
            line.push(ch);
        }
        lines.push(line);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

fn phase_label(state: &UiState) -> String {
    match &state.phase {
        AgentPhase::Idle => "idle".to_string(),
        AgentPhase::Routing => "thinking".to_string(),
        AgentPhase::ToolExecuting => state
            .active_tool
            .as_deref()
            .map(|t| format!("running {}", t))
            .unwrap_or_else(|| "running tool".to_string()),
        AgentPhase::Synthesizing => "answering".to_string(),
        AgentPhase::Ingesting => "ingesting".to_string(),
        AgentPhase::Error => "error".to_string(),
    }
}

/// 绘制一帧；将 (总行数, 可视高度) 写入 out 供外部 clamp 滚动
pub fn draw(
    f: &mut Frame,
    state: &UiState,
    input_buffer: &str,
    conversation_scroll: usize,
    out: &mut (usize, usize),
) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(5),
            Constraint::Length(1),
            Constraint::Length(4),
        ])
        .split(f.area());

    let conv_area = chunks[0];
    let content_width = conv_area.width.saturating_sub(3) as usize; // 边框 + 滚动条

    let block = Block::default()
        .title(format!(" Arxiv Agent │ {} ", phase_label(state)))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Yellow));

    let mut text_lines: Vec<Line> = Vec::new();
    for (idx, m) in state.history.iter().enumerate() {
        if idx > 0 {
            text_lines.push(Line::from(Span::raw("")));
        }
        let (prefix, color) = match m.role {
            Role::User => ("You   ", Color::Cyan),
            Role::Assistant => ("Agent ", Color::Green),
            Role::System => ("Sys   ", Color::Gray),
        };
        let display_text = preview(&m.content, MAX_DISPLAY_CHARS);
        for (i, line) in wrap_text(&display_text, content_width.max(20).saturating_sub(6))
            .into_iter()
            .enumerate()
        {
            let pref = if i == 0 { prefix } else { "      " };
            text_lines.push(Line::from(vec![
                Span::styled(pref, Style::default().fg(color).add_modifier(Modifier::BOLD)),
                Span::raw(line),
            ]));
        }
    }

    let content_height = conv_area.height.saturating_sub(2) as usize;
    let total_lines = text_lines.len();
    let max_scroll = total_lines.saturating_sub(content_height);
    let scroll_offset = conversation_scroll.min(max_scroll);

    let paragraph = Paragraph::new(Text::from(text_lines))
        .block(block)
        .scroll((scroll_offset as u16, 0));
    f.render_widget(paragraph, conv_area);

    if total_lines > content_height {
        let mut scrollbar_state = ScrollbarState::new(total_lines)
            .position(scroll_offset)
            .viewport_content_length(content_height);
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .thumb_symbol("█")
            .track_symbol(Some("░"));
        f.render_stateful_widget(scrollbar, conv_area, &mut scrollbar_state);
    }

    let status = state.status.as_deref().unwrap_or("");
    f.render_widget(
        Paragraph::new(Span::styled(status, Style::default().fg(Color::DarkGray))),
        chunks[1],
    );

    let input_prompt = if let Some(err) = &state.error_message {
        format!(" Error: {} ", preview(err, 60))
    } else if state.input_locked {
        " Working... ".to_string()
    } else {
        " Ask about papers ".to_string()
    };
    let border_color = if state.error_message.is_some() {
        Color::Red
    } else {
        Color::Blue
    };

    let hint = " Enter send │ /upload <file>... │ Ctrl+L reset │ Ctrl+C cancel │ Ctrl+Q quit ";
    let input_block = Block::default()
        .title(input_prompt)
        .title_bottom(Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray))))
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color));

    let input = Paragraph::new(input_buffer)
        .block(input_block)
        .wrap(Wrap { trim: false })
        .style(if state.input_locked {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        });
    f.render_widget(input, chunks[2]);

    out.0 = total_lines;
    out.1 = content_height;
}
