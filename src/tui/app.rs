//! TUI application state and main event loop

use std::time::Duration;

use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use ratatui::DefaultTerminal;
use tokio::sync::mpsc;

use super::backend::{self, Backend, BackendCommand, BackendResponse};
use super::console::{ConsoleState, LogBuffer};
use super::ui;
use crate::auth::DeviceCodePrompt;
use crate::chat::{self, ChatView, Screen};
use crate::config::Config;

/// Target frame rate for UI updates (~30 fps)
const FRAME_DURATION_MS: u64 = 33;

/// Frames per spinner step.
const SPINNER_DIVISOR: usize = 3;

/// Application state
pub struct App {
    /// Whether the app should exit
    pub should_exit: bool,
    pub view: ChatView,
    pub console: ConsoleState,
    /// Backend base URL (for the status bar)
    pub backend_url: String,
    /// Device code details while an interactive sign-in is waiting
    pub device_code: Option<DeviceCodePrompt>,
    pub signing_in: bool,
    /// Transient status bar message
    pub status_message: Option<String>,
    pub status_is_error: bool,
    frame: usize,
}

impl App {
    pub fn new(view: ChatView, console: ConsoleState, backend_url: String) -> Self {
        Self {
            should_exit: false,
            view,
            console,
            backend_url,
            device_code: None,
            signing_in: false,
            status_message: None,
            status_is_error: false,
            frame: 0,
        }
    }

    /// Current spinner step.
    pub fn spinner_step(&self) -> usize {
        self.frame / SPINNER_DIVISOR
    }

    fn set_status(&mut self, message: impl Into<String>, is_error: bool) {
        self.status_message = Some(message.into());
        self.status_is_error = is_error;
    }

    /// Handle a key press. Returns work for the backend, if any.
    pub fn handle_key(&mut self, key: KeyEvent) -> Option<BackendCommand> {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

        match key.code {
            KeyCode::Esc => {
                self.should_exit = true;
                return None;
            }
            KeyCode::Char('c') if ctrl => {
                self.should_exit = true;
                return None;
            }
            KeyCode::F(12) => {
                self.console.toggle();
                return None;
            }
            KeyCode::PageUp if self.console.visible => {
                self.console.scroll_up(5);
                return None;
            }
            KeyCode::PageDown if self.console.visible => {
                self.console.scroll_down(5);
                return None;
            }
            _ => {}
        }

        self.status_message = None;

        match self.view.screen() {
            Screen::SignIn => self.handle_sign_in_key(key),
            Screen::Chat => self.handle_chat_key(key, ctrl),
        }
    }

    fn handle_sign_in_key(&mut self, key: KeyEvent) -> Option<BackendCommand> {
        match key.code {
            KeyCode::Enter | KeyCode::Char('s') if !self.signing_in => {
                let sign_in = self.view.sign_in()?;
                self.signing_in = true;
                Some(BackendCommand::SignIn(sign_in))
            }
            _ => None,
        }
    }

    fn handle_chat_key(&mut self, key: KeyEvent, ctrl: bool) -> Option<BackendCommand> {
        if key.code == KeyCode::Enter {
            return self.view.begin_send().map(BackendCommand::Send);
        }

        // Input is disabled while a request is in flight.
        let draft = self.view.draft_mut()?;
        match key.code {
            KeyCode::Char('u') if ctrl => draft.clear(),
            KeyCode::Char(c) if !ctrl => draft.insert_char(c),
            KeyCode::Backspace => draft.backspace(),
            KeyCode::Delete => draft.delete(),
            KeyCode::Left => draft.move_left(),
            KeyCode::Right => draft.move_right(),
            KeyCode::Home => draft.move_home(),
            KeyCode::End => draft.move_end(),
            _ => {}
        }
        None
    }

    /// Apply a backend response.
    pub fn handle_response(&mut self, response: BackendResponse) {
        match response {
            BackendResponse::SendSettled(outcome) => {
                // A send may have prompted for a device code on the way.
                self.device_code = None;
                self.view.finish_send(outcome);
            }
            BackendResponse::DeviceCode(prompt) => self.device_code = Some(prompt),
            BackendResponse::SignedIn(result) => {
                self.signing_in = false;
                self.device_code = None;
                match result {
                    Ok(account) => {
                        self.set_status(format!("Signed in as {}", account.display_name()), false)
                    }
                    Err(_) => self.set_status("Sign-in failed (F12 shows details)", true),
                }
            }
        }
    }

    pub fn on_tick(&mut self) {
        self.frame = self.frame.wrapping_add(1);
    }
}

/// Run the TUI application.
///
/// `ratatui::init` installs a panic hook that restores the terminal.
pub async fn run(config: &Config, anonymous: bool, logs: LogBuffer) -> Result<()> {
    let (resp_tx, resp_rx) = mpsc::unbounded_channel();
    let view = chat::build_view(config, anonymous, backend::prompt_sink(resp_tx.clone()))?;
    let backend = Backend::start(resp_tx, resp_rx);
    let mut app = App::new(view, ConsoleState::new(logs), config.api.base_url.clone());

    tracing::info!("Chat backend: {}", config.api.base_url);

    let mut terminal = ratatui::init();
    let result = run_app(&mut terminal, &mut app, backend).await;
    ratatui::restore();
    result
}

async fn run_app(terminal: &mut DefaultTerminal, app: &mut App, mut backend: Backend) -> Result<()> {
    let mut events = EventStream::new();
    let mut ticker = tokio::time::interval(Duration::from_millis(FRAME_DURATION_MS));

    while !app.should_exit {
        app.console.refresh();
        terminal.draw(|frame| ui::render(frame, app))?;

        tokio::select! {
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    if let Some(cmd) = app.handle_key(key) {
                        backend.send(cmd);
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => app.should_exit = true,
            },
            Some(response) = backend.recv() => app.handle_response(response),
            _ = ticker.tick() => app.on_tick(),
        }
    }

    Ok(())
}
