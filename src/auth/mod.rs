//! Identity layer for Entra ID (Azure AD)
//!
//! The chat view only sees the [`IdentityProvider`] trait. The production
//! implementation runs the OAuth2 device code flow and keeps a token cache,
//! refreshing access tokens silently with the cached refresh token.

pub mod claims;
mod cli;
pub mod oauth;
pub mod tokens;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use cli::{login, logout, status, whoami};
pub use oauth::DeviceCodeProvider;

/// Scopes the identity layer adds to every request.
pub const DEFAULT_SCOPES: [&str; 3] = ["openid", "profile", "offline_access"];

/// A signed-in account, derived from id_token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// `<oid>.<tid>` when both claims are present, otherwise `sub`
    pub home_account_id: String,
    /// `preferred_username` (usually the UPN)
    pub username: String,
    pub name: Option<String>,
    pub tenant_id: Option<String>,
}

impl Account {
    /// Name to show in the UI.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.username)
    }
}

/// Parameters for a token request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRequest {
    pub scopes: Vec<String>,
    /// Account to act for; silent requests need one.
    pub account: Option<Account>,
}

impl TokenRequest {
    pub fn new(scopes: &[String], account: Option<Account>) -> Self {
        Self {
            scopes: scopes.to_vec(),
            account,
        }
    }
}

/// Successful token acquisition.
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub access_token: String,
    pub account: Account,
    /// Unix seconds
    pub expires_at: Option<u64>,
    pub scopes: Vec<String>,
}

/// Identity failures.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The session needs the user to sign in (or consent) again.
    #[error("interaction required: {0}")]
    InteractionRequired(String),

    /// The token endpoint answered with an OAuth2 error.
    #[error("token endpoint error: {0}")]
    Server(String),

    /// Transport or protocol failure talking to the identity provider.
    #[error("identity request failed: {0}")]
    Request(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AuthError {
    pub fn is_interaction_required(&self) -> bool {
        matches!(self, AuthError::InteractionRequired(_))
    }
}

/// Verification details shown to the user during device code sign-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCodePrompt {
    pub verification_uri: String,
    pub user_code: String,
    /// Seconds until the code expires
    pub expires_in: u64,
}

/// Where device code prompts are delivered.
pub type PromptSink = Arc<dyn Fn(DeviceCodePrompt) + Send + Sync>;

/// Prompt sink for plain terminal use.
pub fn stdout_prompt() -> PromptSink {
    Arc::new(|prompt: DeviceCodePrompt| {
        println!();
        println!("To sign in, visit: {}", prompt.verification_uri);
        println!("Enter code:        {}", prompt.user_code);
        println!();
    })
}

/// Authentication capability consumed by the chat view.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The first signed-in account, if any.
    fn current_account(&self) -> Option<Account>;

    /// Acquire a token from the cache or with the refresh token.
    ///
    /// Fails with [`AuthError::InteractionRequired`] when only an interactive
    /// flow can satisfy the request.
    async fn acquire_token_silent(&self, request: &TokenRequest) -> Result<AuthResult, AuthError>;

    /// Acquire a token by prompting the user.
    async fn acquire_token_interactive(
        &self,
        request: &TokenRequest,
    ) -> Result<AuthResult, AuthError>;

    /// Sign the user in interactively.
    async fn login_interactive(&self, request: &TokenRequest) -> Result<AuthResult, AuthError>;
}

/// Append [`DEFAULT_SCOPES`] to `scopes`, keeping order and dropping duplicates.
pub fn with_default_scopes(scopes: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(scopes.len() + DEFAULT_SCOPES.len());
    for scope in scopes
        .iter()
        .map(String::as_str)
        .chain(DEFAULT_SCOPES.iter().copied())
    {
        if !out.iter().any(|s| s.eq_ignore_ascii_case(scope)) {
            out.push(scope.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_default_scopes() {
        let scopes = with_default_scopes(&["User.Read".to_string(), "openid".to_string()]);
        assert_eq!(scopes, vec!["User.Read", "openid", "profile", "offline_access"]);
    }

    #[test]
    fn test_display_name_falls_back_to_username() {
        let mut account = Account {
            home_account_id: "oid.tid".to_string(),
            username: "tech@contoso.com".to_string(),
            name: None,
            tenant_id: None,
        };
        assert_eq!(account.display_name(), "tech@contoso.com");
        account.name = Some("Field Tech".to_string());
        assert_eq!(account.display_name(), "Field Tech");
    }

    #[test]
    fn test_interaction_required_predicate() {
        assert!(AuthError::InteractionRequired("x".into()).is_interaction_required());
        assert!(!AuthError::Request("x".into()).is_interaction_required());
    }
}
