//! Async backend: runs token and network work off the TUI event loop.
//!
//! Uses an mpsc channel pair. The TUI sends `BackendCommand` values, and a
//! background tokio task executes them and sends `BackendResponse` values back.
//! Device code prompts raised mid-flow arrive on the same response channel.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::auth::{Account, AuthError, DeviceCodePrompt, PromptSink};
use crate::chat::{PendingSend, SendOutcome, SignIn};

/// Commands sent from the TUI event loop to the async backend.
pub enum BackendCommand {
    Send(PendingSend),
    SignIn(SignIn),
}

/// Responses from the async backend to the TUI.
pub enum BackendResponse {
    SendSettled(SendOutcome),
    SignedIn(Result<Account, AuthError>),
    DeviceCode(DeviceCodePrompt),
}

/// Prompt sink that forwards device code details to the TUI.
pub fn prompt_sink(resp_tx: mpsc::UnboundedSender<BackendResponse>) -> PromptSink {
    Arc::new(move |prompt: DeviceCodePrompt| {
        if resp_tx.send(BackendResponse::DeviceCode(prompt)).is_err() {
            tracing::warn!("TUI gone -- device code prompt dropped");
        }
    })
}

/// Handle for interacting with the backend from the TUI side.
pub struct Backend {
    cmd_tx: mpsc::UnboundedSender<BackendCommand>,
    resp_rx: mpsc::UnboundedReceiver<BackendResponse>,
}

impl Backend {
    /// Start the backend on an existing response channel.
    ///
    /// The caller keeps a sender clone for [`prompt_sink`].
    pub fn start(
        resp_tx: mpsc::UnboundedSender<BackendResponse>,
        resp_rx: mpsc::UnboundedReceiver<BackendResponse>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        tokio::spawn(backend_loop(cmd_rx, resp_tx));

        Self { cmd_tx, resp_rx }
    }

    /// Send a command to the backend (non-blocking).
    pub fn send(&self, cmd: BackendCommand) {
        if self.cmd_tx.send(cmd).is_err() {
            tracing::error!("Backend channel closed -- command dropped");
        }
    }

    /// Receive a response from the backend.
    ///
    /// Returns `None` only when the backend channel is permanently closed.
    /// Designed to be used inside `tokio::select!`.
    pub async fn recv(&mut self) -> Option<BackendResponse> {
        self.resp_rx.recv().await
    }
}

/// Background loop that processes commands.
async fn backend_loop(
    mut cmd_rx: mpsc::UnboundedReceiver<BackendCommand>,
    resp_tx: mpsc::UnboundedSender<BackendResponse>,
) {
    while let Some(cmd) = cmd_rx.recv().await {
        let resp_tx = resp_tx.clone();

        // Spawn each command as a separate task so we don't block the loop.
        tokio::spawn(async move {
            let response = match cmd {
                BackendCommand::Send(pending) => {
                    tracing::debug!("Sending message ({} chars)", pending.message().chars().count());
                    BackendResponse::SendSettled(pending.run().await)
                }
                BackendCommand::SignIn(sign_in) => BackendResponse::SignedIn(sign_in.run().await),
            };
            let _ = resp_tx.send(response);
        });
    }
}
