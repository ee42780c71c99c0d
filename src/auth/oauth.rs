//! OAuth2 device code flow for Entra ID, with silent refresh

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use oauth2::basic::{
    BasicErrorResponse, BasicErrorResponseType, BasicRevocationErrorResponse,
    BasicTokenIntrospectionResponse, BasicTokenType,
};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, Client, ClientId, DeviceAuthorizationUrl, ExtraTokenFields, RedirectUrl,
    RefreshToken, RequestTokenError, Scope, StandardDeviceAuthorizationResponse,
    StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};

use super::claims::account_from_id_token;
use super::tokens::{FileStore, MemoryStore, StoredToken, TokenCache, TokenStore};
use super::{
    with_default_scopes, Account, AuthError, AuthResult, DeviceCodePrompt, IdentityProvider,
    PromptSink, TokenRequest,
};
use crate::config::{CacheLocation, Config, IdentityConfig};

/// Token endpoint responses also carry the id_token when `openid` is requested.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdTokenFields {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl ExtraTokenFields for IdTokenFields {}

type AadTokenResponse = StandardTokenResponse<IdTokenFields, BasicTokenType>;

type AadClient = Client<
    BasicErrorResponse,
    AadTokenResponse,
    BasicTokenType,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
>;

/// Build the OAuth2 client from the identity configuration
fn build_client(identity: &IdentityConfig) -> Result<AadClient> {
    let authority = identity.authority.trim_end_matches('/');
    let auth_url = AuthUrl::new(format!("{}/oauth2/v2.0/authorize", authority))?;
    let token_url = TokenUrl::new(format!("{}/oauth2/v2.0/token", authority))?;
    let device_url = DeviceAuthorizationUrl::new(format!("{}/oauth2/v2.0/devicecode", authority))?;

    let client = AadClient::new(
        ClientId::new(identity.client_id.clone()),
        None,
        auth_url,
        Some(token_url),
    )
    .set_device_authorization_url(device_url);

    // Device code sign-in never redirects; the URI is only registered for parity.
    match RedirectUrl::new(identity.redirect_uri.clone()) {
        Ok(redirect) => Ok(client.set_redirect_uri(redirect)),
        Err(e) => {
            tracing::debug!("Ignoring redirect_uri {:?}: {}", identity.redirect_uri, e);
            Ok(client)
        }
    }
}

/// Pick the token store for the configured cache location.
fn build_store(location: CacheLocation) -> Result<Box<dyn TokenStore>> {
    match location {
        CacheLocation::Session => Ok(Box::new(MemoryStore)),
        CacheLocation::Local => {
            let store = FileStore::new(Config::data_dir()?.join("token_cache.toml"));
            tracing::debug!("Token cache at {}", store.path().display());
            Ok(Box::new(store))
        }
    }
}

fn requires_interaction(kind: &BasicErrorResponseType) -> bool {
    match kind {
        BasicErrorResponseType::InvalidGrant => true,
        BasicErrorResponseType::Extension(code) => matches!(
            code.as_str(),
            "interaction_required" | "consent_required" | "login_required"
        ),
        _ => false,
    }
}

/// Map a refresh-token failure onto the identity error taxonomy.
fn classify_refresh_error<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> AuthError
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(resp) => {
            if requires_interaction(resp.error()) {
                AuthError::InteractionRequired(resp.to_string())
            } else {
                AuthError::Server(resp.to_string())
            }
        }
        other => AuthError::Request(other.to_string()),
    }
}

/// Device code identity provider with a session or file-backed token cache.
pub struct DeviceCodeProvider {
    client: AadClient,
    store: Box<dyn TokenStore>,
    cache: Mutex<TokenCache>,
    prompt: PromptSink,
}

impl DeviceCodeProvider {
    /// Build a provider and load any persisted cache.
    pub fn new(identity: &IdentityConfig, prompt: PromptSink) -> Result<Self> {
        if identity.store_auth_state_in_cookie {
            tracing::debug!("store_auth_state_in_cookie has no effect in a terminal client");
        }
        let store = build_store(identity.cache_location)?;
        Self::with_store(identity, store, prompt)
    }

    pub fn with_store(
        identity: &IdentityConfig,
        store: Box<dyn TokenStore>,
        prompt: PromptSink,
    ) -> Result<Self> {
        let client = build_client(identity).context("Invalid identity authority")?;
        let cache = match store.load() {
            Ok(cache) => cache,
            Err(e) => {
                tracing::warn!("Ignoring unreadable token cache: {:#}", e);
                TokenCache::default()
            }
        };

        Ok(Self {
            client,
            store,
            cache: Mutex::new(cache),
            prompt,
        })
    }

    fn lock_cache(&self) -> MutexGuard<'_, TokenCache> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of the cache, for status display.
    pub fn cache_snapshot(&self) -> TokenCache {
        self.lock_cache().clone()
    }

    /// Forget the account and all tokens.
    pub fn logout(&self) -> Result<()> {
        self.lock_cache().clear();
        self.store.clear()
    }

    /// Record a token response in the cache and build the result.
    fn store_response(
        &self,
        requested: &[String],
        response: &AadTokenResponse,
        fallback_account: Option<Account>,
    ) -> Result<AuthResult, AuthError> {
        let account = match response.extra_fields().id_token.as_deref() {
            Some(id_token) => Some(account_from_id_token(id_token)?),
            None => fallback_account,
        }
        .ok_or_else(|| AuthError::Request("token response carried no id_token".to_string()))?;

        let access_token = response.access_token().secret().to_string();
        let stored = StoredToken::new(
            access_token.clone(),
            response.expires_in().map(|d| d.as_secs()),
        );

        let mut cache = self.lock_cache();
        cache.account = Some(account.clone());
        if let Some(rt) = response.refresh_token() {
            cache.refresh_token = Some(rt.secret().to_string());
        }
        cache.insert_access_token(requested, stored.clone());
        if let Err(e) = self.store.save(&cache) {
            tracing::warn!("Failed to persist token cache: {:#}", e);
        }

        Ok(AuthResult {
            access_token,
            account,
            expires_at: stored.expires_at,
            scopes: requested.to_vec(),
        })
    }

    async fn device_code_flow(&self, request: &TokenRequest) -> Result<AuthResult, AuthError> {
        let scopes = with_default_scopes(&request.scopes);

        tracing::info!("Initiating device code flow...");

        let details: StandardDeviceAuthorizationResponse = self
            .client
            .exchange_device_code()
            .map_err(|e| AuthError::Request(e.to_string()))?
            .add_scopes(scopes.into_iter().map(Scope::new))
            .request_async(async_http_client)
            .await
            .map_err(|e| AuthError::Request(format!("Failed to request device code: {}", e)))?;

        (self.prompt)(DeviceCodePrompt {
            verification_uri: details.verification_uri().as_str().to_string(),
            user_code: details.user_code().secret().to_string(),
            expires_in: details.expires_in().as_secs(),
        });

        tracing::info!("Waiting for authentication...");

        let response = self
            .client
            .exchange_device_access_token(&details)
            .request_async(async_http_client, tokio::time::sleep, None)
            .await
            .map_err(|e| {
                AuthError::Request(format!("Failed to exchange device code for token: {}", e))
            })?;

        self.store_response(&request.scopes, &response, request.account.clone())
    }
}

#[async_trait]
impl IdentityProvider for DeviceCodeProvider {
    fn current_account(&self) -> Option<Account> {
        self.lock_cache().account.clone()
    }

    async fn acquire_token_silent(&self, request: &TokenRequest) -> Result<AuthResult, AuthError> {
        let (account, refresh_token) = {
            let cache = self.lock_cache();
            let account = match request.account.clone().or_else(|| cache.account.clone()) {
                Some(account) => account,
                None => {
                    return Err(AuthError::InteractionRequired(
                        "no signed-in account".to_string(),
                    ))
                }
            };

            if let Some(token) = cache.access_token_for(&request.scopes) {
                tracing::debug!("Using cached access token");
                return Ok(AuthResult {
                    access_token: token.token.clone(),
                    account,
                    expires_at: token.expires_at,
                    scopes: request.scopes.clone(),
                });
            }

            (account, cache.refresh_token.clone())
        };

        let refresh_token = RefreshToken::new(refresh_token.ok_or_else(|| {
            AuthError::InteractionRequired("no refresh token cached".to_string())
        })?);

        tracing::info!("Refreshing access token...");

        let response = self
            .client
            .exchange_refresh_token(&refresh_token)
            .add_scopes(with_default_scopes(&request.scopes).into_iter().map(Scope::new))
            .request_async(async_http_client)
            .await
            .map_err(classify_refresh_error)?;

        self.store_response(&request.scopes, &response, Some(account))
    }

    async fn acquire_token_interactive(
        &self,
        request: &TokenRequest,
    ) -> Result<AuthResult, AuthError> {
        self.device_code_flow(request).await
    }

    async fn login_interactive(&self, request: &TokenRequest) -> Result<AuthResult, AuthError> {
        let result = self.device_code_flow(request).await?;
        tracing::info!("Signed in as {}", result.account.username);
        tracing::debug!(
            "Token for [{}] expires at {:?}",
            result.scopes.join(" "),
            result.expires_at
        );
        Ok(result)
    }
}
