//! Message input box.

use ratatui::{
    layout::Rect,
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthChar;

use crate::chat::Draft;

/// Height of the input box: border + input line + border.
pub const COMPOSE_HEIGHT: u16 = 3;

pub const PLACEHOLDER: &str = "Ask something about your work orders...";

/// Render the input box. The terminal cursor is placed only while enabled.
pub fn render(area: Rect, frame: &mut Frame, draft: &Draft, enabled: bool) {
    let (border_style, border_type) = if enabled {
        (Style::default().fg(Color::Yellow), BorderType::Rounded)
    } else {
        (Style::default().fg(Color::DarkGray), BorderType::Plain)
    };

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(border_type)
        .border_style(border_style)
        .title_bottom(Line::from(Span::styled(" Enter: Send ", border_style)).right_aligned());

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height == 0 || inner.width == 0 {
        return;
    }
    let input_area = Rect::new(inner.x, inner.y, inner.width, 1);

    if draft.is_empty() {
        let style = Style::default().fg(Color::DarkGray);
        let placeholder: String = format!(" {}", PLACEHOLDER)
            .chars()
            .take(input_area.width as usize)
            .collect();
        frame.render_widget(Paragraph::new(Span::styled(placeholder, style)), input_area);
        if enabled {
            frame.set_cursor_position((input_area.x + 1, input_area.y));
        }
        return;
    }

    let view = visible_window(draft.as_str(), draft.cursor_pos(), input_area.width as usize);
    let text_style = if enabled {
        Style::default().fg(Color::White)
    } else {
        Style::default().fg(Color::Gray)
    };
    frame.render_widget(
        Paragraph::new(Span::styled(format!(" {}", view.visible), text_style)),
        input_area,
    );
    if enabled {
        frame.set_cursor_position((input_area.x + 1 + view.cursor_col as u16, input_area.y));
    }
}

/// The slice of the draft that fits the box, and the cursor column within it.
#[derive(Debug, PartialEq, Eq)]
struct Window {
    visible: String,
    cursor_col: usize,
}

/// Scroll horizontally so the cursor stays inside `width` columns.
/// The leading space and the end-of-line cursor cell take one column each.
fn visible_window(input: &str, cursor_pos: usize, width: usize) -> Window {
    let avail = width.saturating_sub(2);
    if avail == 0 {
        return Window {
            visible: String::new(),
            cursor_col: 0,
        };
    }

    let chars: Vec<(char, usize)> = input
        .chars()
        .map(|c| (c, c.width().unwrap_or(0)))
        .collect();
    let cursor_pos = cursor_pos.min(chars.len());

    // Walk left from the cursor until the columns are used up.
    let mut start = cursor_pos;
    let mut used = 0;
    while start > 0 && used + chars[start - 1].1 <= avail {
        start -= 1;
        used += chars[start].1;
    }
    let cursor_col = used;

    // Then fill the rest of the row to the right.
    let mut end = cursor_pos;
    while end < chars.len() && used + chars[end].1 <= avail {
        used += chars[end].1;
        end += 1;
    }

    Window {
        visible: chars[start..end].iter().map(|(c, _)| c).collect(),
        cursor_col,
    }
}
