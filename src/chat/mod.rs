//! Chat view component
//!
//! UI-independent state for the copilot chat: the draft being typed, the last
//! reply, the loading flag, and the authentication-gated send flow.

mod draft;
mod view;

use std::sync::Arc;

use anyhow::{bail, Result};

pub use draft::Draft;
pub use view::{
    acquire_token, ChatView, PendingSend, Screen, SendOutcome, SignIn, FAILURE_TEXT,
};

use crate::api::HttpChatClient;
use crate::auth::{DeviceCodeProvider, PromptSink};
use crate::config::Config;

/// Build the chat view for `config`.
///
/// With `anonymous` set the view has no identity provider and sends
/// unauthenticated requests.
pub fn build_view(config: &Config, anonymous: bool, prompt: PromptSink) -> Result<ChatView> {
    let api = Arc::new(HttpChatClient::new(&config.api.base_url));
    if anonymous {
        return Ok(ChatView::new(api));
    }

    let provider = DeviceCodeProvider::new(&config.identity, prompt)?;
    Ok(ChatView::with_identity(
        api,
        Arc::new(provider),
        config.identity.login_scopes.clone(),
        config.identity.api_scopes.clone(),
    ))
}

/// Ask one question and print the reply.
pub async fn ask(config: &Config, anonymous: bool, message: &str) -> Result<()> {
    let mut view = build_view(config, anonymous, crate::auth::stdout_prompt())?;

    if let Some(draft) = view.draft_mut() {
        draft.set(message);
    }
    if view.draft().is_blank() {
        bail!("Message is empty");
    }

    if view.screen() == Screen::SignIn {
        if let Some(sign_in) = view.sign_in() {
            sign_in.run().await?;
        }
    }

    view.send_message().await;
    println!("{}", view.reply());
    Ok(())
}
