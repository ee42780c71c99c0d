//! Operator console: captured tracing output shown in a toggleable pane.
//!
//! In TUI mode tracing-subscriber writes into a [`LogBuffer`] instead of
//! stderr, which would corrupt the alternate screen. The console drains that
//! buffer every frame.

use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Widget},
};
use tracing_subscriber::fmt::MakeWriter;

/// Lines held by the shared buffer between drains.
const BUFFER_CAPACITY: usize = 500;

/// Lines kept by the console for scrollback.
const MAX_CONSOLE_LINES: usize = 1000;

/// Height of the console pane when visible, borders included.
pub const CONSOLE_HEIGHT: u16 = 10;

/// Shared, bounded queue of log lines. Oldest lines fall off when full.
#[derive(Clone, Default)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: String) {
        // A poisoned lock still holds usable lines.
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        if lines.len() >= BUFFER_CAPACITY {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Take everything queued so far, oldest first.
    pub fn drain(&self) -> Vec<String> {
        let mut lines = self.lines.lock().unwrap_or_else(|e| e.into_inner());
        lines.drain(..).collect()
    }
}

/// Line-splitting writer handed out to tracing-subscriber.
pub struct LineWriter {
    buffer: LogBuffer,
    partial: Vec<u8>,
}

impl LineWriter {
    fn emit_complete_lines(&mut self) {
        while let Some(pos) = self.partial.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.partial.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
            self.buffer.push(text);
        }
    }
}

impl Write for LineWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.partial.extend_from_slice(buf);
        self.emit_complete_lines();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        if !self.partial.is_empty() {
            let text = String::from_utf8_lossy(&self.partial).into_owned();
            self.buffer.push(text);
            self.partial.clear();
        }
        Ok(())
    }
}

impl Drop for LineWriter {
    fn drop(&mut self) {
        let _ = Write::flush(self);
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LineWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LineWriter {
            buffer: self.clone(),
            partial: Vec::new(),
        }
    }
}

/// Console pane state.
pub struct ConsoleState {
    buffer: LogBuffer,
    lines: Vec<String>,
    pub visible: bool,
    /// Lines scrolled back from the newest (0 = follow tail).
    scroll_offset: usize,
}

impl ConsoleState {
    pub fn new(buffer: LogBuffer) -> Self {
        Self {
            buffer,
            lines: Vec::new(),
            visible: false,
            scroll_offset: 0,
        }
    }

    /// Pull new lines from the shared buffer. Call once per frame.
    pub fn refresh(&mut self) {
        let new_lines = self.buffer.drain();
        if new_lines.is_empty() {
            return;
        }
        self.lines.extend(new_lines);
        if self.lines.len() > MAX_CONSOLE_LINES {
            let excess = self.lines.len() - MAX_CONSOLE_LINES;
            self.lines.drain(..excess);
            self.scroll_offset = self.scroll_offset.saturating_sub(excess);
        }
    }

    pub fn toggle(&mut self) {
        self.visible = !self.visible;
        if self.visible {
            self.scroll_offset = 0;
        }
    }

    pub fn scroll_up(&mut self, n: usize) {
        let max_offset = self.lines.len().saturating_sub(1);
        self.scroll_offset = self.scroll_offset.saturating_add(n).min(max_offset);
    }

    pub fn scroll_down(&mut self, n: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(n);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Lines that fit in `height` rows at the current scroll position.
    fn window(&self, height: usize) -> &[String] {
        let end = self.lines.len().saturating_sub(self.scroll_offset);
        let start = end.saturating_sub(height);
        &self.lines[start..end]
    }
}

/// Render the console pane.
pub fn render(area: Rect, buf: &mut Buffer, state: &ConsoleState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(Line::from(vec![
            Span::styled(
                " Console ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::styled(
                format!("({} lines, PgUp/PgDn) ", state.lines().len()),
                Style::default().fg(Color::Gray),
            ),
        ]));

    let inner = block.inner(area);
    block.render(area, buf);

    if inner.height == 0 || inner.width == 0 {
        return;
    }

    let lines: Vec<Line> = state
        .window(inner.height as usize)
        .iter()
        .map(|line| level_colored(line))
        .collect();

    Paragraph::new(lines).render(inner, buf);
}

/// Color a formatted tracing line by its level.
fn level_colored(line: &str) -> Line<'static> {
    let color = if line.contains("ERROR") {
        Color::Red
    } else if line.contains(" WARN ") {
        Color::Yellow
    } else if line.contains(" INFO ") {
        Color::Green
    } else {
        Color::DarkGray
    };

    Line::from(Span::styled(line.to_owned(), Style::default().fg(color)))
}
