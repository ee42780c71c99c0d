//! Copilot backend API

pub mod client;

use anyhow::{Context, Result};

pub use client::{ApiError, ChatApi, HttpChatClient};

use crate::config::Config;

/// Check that the backend is reachable
pub async fn ping(config: &Config) -> Result<()> {
    let client = HttpChatClient::new(&config.api.base_url);
    let health = client
        .health()
        .await
        .with_context(|| format!("Backend at {} is not responding", config.api.base_url))?;
    println!("{}", health.message);
    Ok(())
}
