//! UI rendering for the TUI

use ratatui::{
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, Paragraph, Widget, Wrap},
    Frame,
};

use super::app::App;
use super::compose;
use super::console;
use crate::chat::{Screen, FAILURE_TEXT};

const TITLE: &str = " Field Service Copilot";

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

/// Device code popup dimensions.
const POPUP_WIDTH: u16 = 60;
const POPUP_HEIGHT: u16 = 9;

/// Main render function
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();

    let console_height = if app.console.visible {
        console::CONSOLE_HEIGHT
    } else {
        0
    };

    let [header_area, main_area, console_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Fill(1),
        Constraint::Length(console_height),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(header_area, frame.buffer_mut(), app);

    match app.view.screen() {
        Screen::SignIn => render_sign_in(main_area, frame.buffer_mut(), app),
        Screen::Chat => render_chat(main_area, frame, app),
    }

    if app.console.visible {
        console::render(console_area, frame.buffer_mut(), &app.console);
    }

    render_status(status_area, frame.buffer_mut(), app);

    if app.device_code.is_some() {
        render_device_code_popup(frame, app);
    }
}

/// Render the header bar
fn render_header(area: Rect, buf: &mut Buffer, app: &App) {
    let title = Span::styled(
        TITLE,
        Style::default()
            .fg(Color::White)
            .add_modifier(Modifier::BOLD),
    );

    let who = if !app.view.has_identity() {
        "anonymous".to_string()
    } else {
        match app.view.account() {
            Some(account) => account.display_name().to_string(),
            None => "not signed in".to_string(),
        }
    };
    let right = format!(" {} ", who);

    let padding_width = area
        .width
        .saturating_sub((TITLE.len() + right.chars().count()) as u16) as usize;

    let header_line = Line::from(vec![
        title,
        Span::raw(" ".repeat(padding_width)),
        Span::styled(right, Style::default().fg(Color::Cyan)),
    ]);

    Paragraph::new(header_line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

/// Sign-in card shown while nobody is signed in.
fn render_sign_in(area: Rect, buf: &mut Buffer, app: &App) {
    let card = centered_rect(
        POPUP_WIDTH.min(area.width.saturating_sub(2)),
        7.min(area.height),
        area,
    );

    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(Color::Cyan));

    let action = if app.signing_in {
        Line::from(Span::styled(
            "Signing in...",
            Style::default().fg(Color::Yellow),
        ))
    } else {
        Line::from(vec![
            Span::raw("Press "),
            Span::styled(
                "s",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" or "),
            Span::styled(
                "Enter",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw(" to sign in"),
        ])
    };

    let lines = vec![
        Line::from(""),
        Line::from("Please sign in to use the Copilot."),
        Line::from(""),
        action,
    ];

    Paragraph::new(lines)
        .block(block)
        .alignment(Alignment::Center)
        .render(card, buf);
}

/// Input box, spinner line and reply card.
fn render_chat(area: Rect, frame: &mut Frame, app: &App) {
    let [compose_area, spinner_area, reply_area] = Layout::vertical([
        Constraint::Length(compose::COMPOSE_HEIGHT),
        Constraint::Length(1),
        Constraint::Fill(1),
    ])
    .areas(area);

    compose::render(
        compose_area,
        frame,
        app.view.draft(),
        !app.view.is_loading(),
    );

    if app.view.is_loading() {
        let frame_char = SPINNER[app.spinner_step() % SPINNER.len()];
        let spinner = Line::from(Span::styled(
            format!(" {} Thinking...", frame_char),
            Style::default().fg(Color::Yellow),
        ));
        frame.render_widget(Paragraph::new(spinner), spinner_area);
        return;
    }

    let reply = app.view.reply();
    if reply.is_empty() {
        return;
    }

    let (title, color) = if reply == FAILURE_TEXT {
        (" Error ", Color::Red)
    } else {
        (" Copilot ", Color::Green)
    };
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(color))
        .title(Span::styled(
            title,
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));

    frame.render_widget(
        Paragraph::new(reply)
            .block(block)
            .wrap(Wrap { trim: false }),
        reply_area,
    );
}

/// Render the status bar
fn render_status(area: Rect, buf: &mut Buffer, app: &App) {
    if let Some(ref msg) = app.status_message {
        let style = if app.status_is_error {
            Style::default().fg(Color::Red).bg(Color::DarkGray)
        } else {
            Style::default().fg(Color::Green).bg(Color::DarkGray)
        };
        Paragraph::new(Line::from(Span::styled(format!(" {} ", msg), style)))
            .style(Style::default().bg(Color::DarkGray))
            .render(area, buf);
        return;
    }

    let sep_style = Style::default().fg(Color::DarkGray);
    let hint_style = Style::default().fg(Color::Gray);

    let status_line = Line::from(vec![
        Span::styled(
            format!(" {} ", app.backend_url),
            Style::default().fg(Color::Yellow),
        ),
        Span::styled(" | ", sep_style),
        Span::styled("F12: console", hint_style),
        Span::styled(" | ", sep_style),
        Span::styled("Esc: quit", hint_style),
    ]);

    Paragraph::new(status_line)
        .style(Style::default().bg(Color::DarkGray))
        .render(area, buf);
}

/// Overlay with the verification URL and user code.
fn render_device_code_popup(frame: &mut Frame, app: &App) {
    let Some(prompt) = &app.device_code else {
        return;
    };
    let area = frame.area();
    let popup_area = centered_rect(
        POPUP_WIDTH.min(area.width.saturating_sub(2)),
        POPUP_HEIGHT.min(area.height.saturating_sub(2)),
        area,
    );

    frame.render_widget(Clear, popup_area);

    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Cyan))
        .title(Span::styled(
            " SIGN IN ",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ))
        .title_bottom(Line::from(Span::styled(
            format!(" Code expires in {} min ", prompt.expires_in / 60),
            Style::default().fg(Color::Gray),
        )));

    let lines = vec![
        Line::from(""),
        Line::from("Open this page in a browser:"),
        Line::from(Span::styled(
            prompt.verification_uri.clone(),
            Style::default()
                .fg(Color::Blue)
                .add_modifier(Modifier::UNDERLINED),
        )),
        Line::from(""),
        Line::from("and enter the code:"),
        Line::from(Span::styled(
            prompt.user_code.clone(),
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )),
    ];

    frame.render_widget(
        Paragraph::new(lines)
            .block(block)
            .alignment(Alignment::Center),
        popup_area,
    );
}

/// Compute a centered rect of the given size within `area`.
fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    Rect::new(x, y, width.min(area.width), height.min(area.height))
}
