//! Sign-in commands for the command line

use anyhow::{Context, Result};

use super::tokens::StoredToken;
use super::{stdout_prompt, DeviceCodeProvider, IdentityProvider, TokenRequest};
use crate::chat::acquire_token;
use crate::config::{CacheLocation, Config};

fn provider(config: &Config) -> Result<DeviceCodeProvider> {
    DeviceCodeProvider::new(&config.identity, stdout_prompt())
}

fn warn_if_session_cache(config: &Config) {
    if config.identity.cache_location == CacheLocation::Session {
        eprintln!(
            "Note: cache_location is \"session\", so this sign-in ends with the process. \
             Set cache_location = \"local\" to keep it."
        );
    }
}

/// Sign in with the device code flow unless a usable session already exists.
pub async fn login(config: &Config, force: bool) -> Result<()> {
    let provider = provider(config)?;
    let request = TokenRequest::new(&config.identity.login_scopes, provider.current_account());

    if !force {
        if let Some(account) = provider.current_account() {
            match provider.acquire_token_silent(&request).await {
                Ok(_) => {
                    println!(
                        "Already signed in as {}. Use --force to re-authenticate.",
                        account.username
                    );
                    return Ok(());
                }
                Err(e) => {
                    tracing::info!("Cached session unusable, signing in again: {}", e);
                }
            }
        }
    }

    warn_if_session_cache(config);
    let result = provider
        .login_interactive(&request)
        .await
        .context("Sign-in failed")?;

    // Prime the API token so the first question does not prompt again.
    let api_request = TokenRequest::new(&config.identity.api_scopes, Some(result.account.clone()));
    if let Err(e) = acquire_token(&provider, &api_request).await {
        tracing::warn!("Could not acquire backend API token: {}", e);
        eprintln!("Warning: backend API token not acquired; the first question will retry.");
    }

    println!("Signed in as {}.", result.account.display_name());
    Ok(())
}

/// Clear stored credentials
pub async fn logout(config: &Config) -> Result<()> {
    provider(config)?.logout()?;
    println!("Logged out.");
    Ok(())
}

fn describe_token(token: &StoredToken) -> String {
    let state = if token.is_expired() { "expired" } else { "valid" };
    match token
        .expires_at
        .and_then(|exp| chrono::DateTime::from_timestamp(exp as i64, 0))
    {
        Some(at) => format!(
            "{} (expires {})",
            state,
            at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S")
        ),
        None => state.to_string(),
    }
}

/// Display current auth status
pub async fn status(config: &Config) -> Result<()> {
    let cache = provider(config)?.cache_snapshot();

    println!("Authority:   {}", config.identity.authority);
    println!("Cache:       {:?}", config.identity.cache_location);

    match &cache.account {
        Some(account) => println!("Account:     {}", account.username),
        None => println!("Account:     none"),
    }

    match cache.refresh_token {
        Some(_) => println!("Refresh tok: present"),
        None => println!("Refresh tok: none"),
    }

    if cache.access_tokens.is_empty() {
        println!("Tokens:      none");
    }
    for (scopes, token) in &cache.access_tokens {
        println!("Token:       {}", scopes);
        println!("  {}", describe_token(token));
    }

    if cache.account.is_none() {
        println!("\nRun 'fs-copilot login' to authenticate.");
    }

    Ok(())
}

/// Show the signed-in account
pub async fn whoami(config: &Config) -> Result<()> {
    let provider = provider(config)?;
    let Some(account) = provider.current_account() else {
        println!("Not signed in. Run 'fs-copilot login'.");
        return Ok(());
    };

    println!();
    println!("Display Name: {}", account.name.as_deref().unwrap_or("(none)"));
    println!("Username:     {}", account.username);
    println!(
        "Tenant:       {}",
        account.tenant_id.as_deref().unwrap_or("(none)")
    );
    println!("Account ID:   {}", account.home_account_id);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_token() {
        let token = StoredToken::new("t".to_string(), Some(3600));
        assert!(describe_token(&token).starts_with("valid (expires "));

        let stale = StoredToken {
            token: "t".to_string(),
            expires_at: Some(1),
        };
        assert!(describe_token(&stale).starts_with("expired (expires 19"));

        let open = StoredToken {
            token: "t".to_string(),
            expires_at: None,
        };
        assert_eq!(describe_token(&open), "valid");
    }
}
