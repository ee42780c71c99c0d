//! Chat view state and the send-message flow

use std::sync::Arc;

use crate::api::{ApiError, ChatApi};
use crate::auth::{Account, AuthError, AuthResult, IdentityProvider, TokenRequest};
use crate::models::ChatRequest;

use super::draft::Draft;

/// Shown in place of a reply when anything in the send flow fails.
pub const FAILURE_TEXT: &str = "Failed to get a response from the server.";

/// `user_token` sent when the view runs without an identity provider.
pub const PLACEHOLDER_TOKEN: &str = "placeholder-jwt-token";

/// What the view should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Identity is configured but nobody is signed in.
    SignIn,
    /// Message input, spinner and reply.
    Chat,
}

/// Failure inside the send flow. Only logged; the user sees [`FAILURE_TEXT`].
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("token acquisition failed: {0}")]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Result of the asynchronous part of a send: the reply text or an error.
pub type SendOutcome = Result<String, SendError>;

#[derive(Clone)]
struct Identity {
    provider: Arc<dyn IdentityProvider>,
    login_scopes: Vec<String>,
    api_scopes: Vec<String>,
}

/// The chat view component.
///
/// Holds draft, reply and loading state. Authentication is optional: without
/// an identity provider every send goes out unauthenticated.
pub struct ChatView {
    api: Arc<dyn ChatApi>,
    identity: Option<Identity>,
    draft: Draft,
    reply: String,
    loading: bool,
}

impl ChatView {
    /// View without authentication.
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        Self {
            api,
            identity: None,
            draft: Draft::default(),
            reply: String::new(),
            loading: false,
        }
    }

    /// View gated on an identity provider.
    pub fn with_identity(
        api: Arc<dyn ChatApi>,
        provider: Arc<dyn IdentityProvider>,
        login_scopes: Vec<String>,
        api_scopes: Vec<String>,
    ) -> Self {
        Self {
            identity: Some(Identity {
                provider,
                login_scopes,
                api_scopes,
            }),
            ..Self::new(api)
        }
    }

    pub fn draft(&self) -> &Draft {
        &self.draft
    }

    /// Editable draft, or `None` while a request is in flight.
    pub fn draft_mut(&mut self) -> Option<&mut Draft> {
        if self.loading {
            None
        } else {
            Some(&mut self.draft)
        }
    }

    pub fn reply(&self) -> &str {
        &self.reply
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn has_identity(&self) -> bool {
        self.identity.is_some()
    }

    /// First signed-in account, if an identity provider is configured.
    pub fn account(&self) -> Option<Account> {
        self.identity
            .as_ref()
            .and_then(|i| i.provider.current_account())
    }

    pub fn screen(&self) -> Screen {
        match &self.identity {
            Some(identity) if identity.provider.current_account().is_none() => Screen::SignIn,
            _ => Screen::Chat,
        }
    }

    /// Start a send: mark loading and clear the previous reply.
    ///
    /// Returns `None` without touching any state when a send is already in
    /// flight, the draft is blank, or an identity provider is configured but
    /// nobody is signed in.
    pub fn begin_send(&mut self) -> Option<PendingSend> {
        if self.loading || self.draft.is_blank() {
            return None;
        }

        let (identity, account) = match &self.identity {
            Some(identity) => {
                let account = identity.provider.current_account()?;
                (Some(identity.clone()), Some(account))
            }
            None => (None, None),
        };

        self.loading = true;
        self.reply.clear();

        Some(PendingSend {
            message: self.draft.as_str().to_string(),
            account,
            identity,
            api: Arc::clone(&self.api),
        })
    }

    /// Settle a send: show the reply or the failure text, reset the input.
    pub fn finish_send(&mut self, outcome: SendOutcome) {
        match outcome {
            Ok(reply) => self.reply = reply,
            Err(e) => {
                tracing::error!("Failed to send message: {}", e);
                self.reply = FAILURE_TEXT.to_string();
            }
        }
        self.loading = false;
        self.draft.clear();
    }

    /// Run a whole send cycle in place.
    pub async fn send_message(&mut self) {
        if let Some(pending) = self.begin_send() {
            let outcome = pending.run().await;
            self.finish_send(outcome);
        }
    }

    /// Interactive sign-in, or `None` when no identity provider is configured.
    pub fn sign_in(&self) -> Option<SignIn> {
        self.identity.as_ref().map(|identity| SignIn {
            provider: Arc::clone(&identity.provider),
            request: TokenRequest::new(&identity.login_scopes, None),
        })
    }
}

/// The asynchronous part of a send, detached from the view so it can run on
/// another task while the view keeps rendering.
pub struct PendingSend {
    message: String,
    account: Option<Account>,
    identity: Option<Identity>,
    api: Arc<dyn ChatApi>,
}

impl PendingSend {
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Acquire a token (if authenticated) and call the chat endpoint.
    pub async fn run(self) -> SendOutcome {
        let token = match &self.identity {
            Some(identity) => {
                let request = TokenRequest::new(&identity.api_scopes, self.account.clone());
                Some(acquire_token(identity.provider.as_ref(), &request).await?.access_token)
            }
            None => None,
        };

        let request = ChatRequest {
            message: self.message,
            user_token: token
                .clone()
                .unwrap_or_else(|| PLACEHOLDER_TOKEN.to_string()),
        };

        let reply = self.api.post_chat(&request, token.as_deref()).await?;
        Ok(reply.reply)
    }
}

/// Silent acquisition first; prompt only when the provider says it must.
pub async fn acquire_token(
    provider: &dyn IdentityProvider,
    request: &TokenRequest,
) -> Result<AuthResult, AuthError> {
    match provider.acquire_token_silent(request).await {
        Err(e) if e.is_interaction_required() => {
            tracing::info!("Silent token acquisition needs interaction ({}), prompting", e);
            provider.acquire_token_interactive(request).await
        }
        other => other,
    }
}

/// A pending interactive sign-in.
pub struct SignIn {
    provider: Arc<dyn IdentityProvider>,
    request: TokenRequest,
}

impl SignIn {
    /// Run the login flow. Failures are logged and returned.
    pub async fn run(self) -> Result<Account, AuthError> {
        match self.provider.login_interactive(&self.request).await {
            Ok(result) => Ok(result.account),
            Err(e) => {
                tracing::error!("Sign-in failed: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChatReply;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::Notify;
    use tokio_test::{assert_pending, assert_ready, task};

    const API_SCOPE: &str = "api://backend/user_impersonation";

    fn account() -> Account {
        Account {
            home_account_id: "oid.tid".to_string(),
            username: "tech@contoso.com".to_string(),
            name: Some("Field Tech".to_string()),
            tenant_id: Some("tid".to_string()),
        }
    }

    fn auth_result(token: &str) -> AuthResult {
        AuthResult {
            access_token: token.to_string(),
            account: account(),
            expires_at: None,
            scopes: vec![API_SCOPE.to_string()],
        }
    }

    /// Identity substitute: scripted silent results, always-succeeding prompts.
    #[derive(Default)]
    struct FakeIdentity {
        account: Mutex<Option<Account>>,
        silent: Mutex<VecDeque<Result<AuthResult, AuthError>>>,
        interactive_fails: bool,
        calls: Mutex<Vec<(&'static str, TokenRequest)>>,
    }

    impl FakeIdentity {
        fn signed_in() -> Self {
            Self {
                account: Mutex::new(Some(account())),
                ..Default::default()
            }
        }

        fn push_silent(&self, result: Result<AuthResult, AuthError>) {
            self.silent.lock().unwrap().push_back(result);
        }

        fn calls(&self) -> Vec<(&'static str, TokenRequest)> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, kind: &'static str, request: &TokenRequest) {
            self.calls.lock().unwrap().push((kind, request.clone()));
        }
    }

    #[async_trait]
    impl IdentityProvider for FakeIdentity {
        fn current_account(&self) -> Option<Account> {
            self.account.lock().unwrap().clone()
        }

        async fn acquire_token_silent(
            &self,
            request: &TokenRequest,
        ) -> Result<AuthResult, AuthError> {
            self.record("silent", request);
            self.silent
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(auth_result("silent-token")))
        }

        async fn acquire_token_interactive(
            &self,
            request: &TokenRequest,
        ) -> Result<AuthResult, AuthError> {
            self.record("interactive", request);
            if self.interactive_fails {
                Err(AuthError::Request("user cancelled".to_string()))
            } else {
                Ok(auth_result("interactive-token"))
            }
        }

        async fn login_interactive(
            &self,
            request: &TokenRequest,
        ) -> Result<AuthResult, AuthError> {
            self.record("login", request);
            if self.interactive_fails {
                return Err(AuthError::Request("device code expired".to_string()));
            }
            *self.account.lock().unwrap() = Some(account());
            Ok(auth_result("login-token"))
        }
    }

    /// Chat API substitute: records calls, optionally waits on a gate.
    #[derive(Default)]
    struct FakeApi {
        replies: Mutex<VecDeque<Result<ChatReply, ApiError>>>,
        calls: Mutex<Vec<(ChatRequest, Option<String>)>>,
        gate: Option<Arc<Notify>>,
    }

    impl FakeApi {
        fn replying(reply: &str) -> Self {
            let api = Self::default();
            api.push(Ok(ChatReply {
                reply: reply.to_string(),
            }));
            api
        }

        fn push(&self, reply: Result<ChatReply, ApiError>) {
            self.replies.lock().unwrap().push_back(reply);
        }

        fn calls(&self) -> Vec<(ChatRequest, Option<String>)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatApi for FakeApi {
        async fn post_chat(
            &self,
            request: &ChatRequest,
            bearer: Option<&str>,
        ) -> Result<ChatReply, ApiError> {
            self.calls
                .lock()
                .unwrap()
                .push((request.clone(), bearer.map(str::to_string)));
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
                Ok(ChatReply {
                    reply: String::new(),
                })
            })
        }
    }

    fn status_error(status: u16) -> ApiError {
        ApiError::Status {
            url: "http://localhost:8000/api/chat".to_string(),
            status,
            body: "{\"detail\":\"boom\"}".to_string(),
        }
    }

    fn view(api: &Arc<FakeApi>, identity: &Arc<FakeIdentity>) -> ChatView {
        ChatView::with_identity(
            api.clone(),
            identity.clone(),
            vec!["User.Read".to_string()],
            vec![API_SCOPE.to_string()],
        )
    }

    #[tokio::test]
    async fn test_whitespace_draft_is_noop() {
        for draft in ["", " ", "   ", "\t\n "] {
            let api = Arc::new(FakeApi::default());
            let identity = Arc::new(FakeIdentity::signed_in());
            let mut view = view(&api, &identity);
            view.draft_mut().unwrap().set(draft);

            view.send_message().await;

            assert_eq!(view.draft().as_str(), draft);
            assert!(!view.is_loading());
            assert_eq!(view.reply(), "");
            assert!(api.calls().is_empty());
            assert!(identity.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn test_unauthenticated_send_is_noop() {
        let api = Arc::new(FakeApi::default());
        let identity = Arc::new(FakeIdentity::default());
        let mut view = view(&api, &identity);
        view.draft_mut().unwrap().set("Hello");

        assert_eq!(view.screen(), Screen::SignIn);
        view.send_message().await;

        assert_eq!(view.draft().as_str(), "Hello");
        assert!(!view.is_loading());
        assert_eq!(view.reply(), "");
        assert!(api.calls().is_empty());
        assert!(identity.calls().is_empty());
        assert_eq!(view.screen(), Screen::SignIn);
    }

    #[tokio::test]
    async fn test_begin_send_marks_loading_and_clears_reply() {
        let api = Arc::new(FakeApi::default());
        let identity = Arc::new(FakeIdentity::signed_in());
        let mut view = view(&api, &identity);
        view.finish_send(Ok("previous answer".to_string()));
        view.draft_mut().unwrap().set("Next question");

        let pending = view.begin_send().expect("send should start");

        assert!(view.is_loading());
        assert_eq!(view.reply(), "");
        assert_eq!(pending.message(), "Next question");
        assert!(view.draft_mut().is_none());
        assert!(api.calls().is_empty());
        assert!(identity.calls().is_empty());
    }

    #[tokio::test]
    async fn test_second_send_while_loading_is_refused() {
        let api = Arc::new(FakeApi::replying("first"));
        let identity = Arc::new(FakeIdentity::signed_in());
        let mut view = view(&api, &identity);
        view.draft_mut().unwrap().set("Hello");

        let pending = view.begin_send().expect("send should start");
        assert!(view.begin_send().is_none());
        assert!(view.is_loading());

        let outcome = pending.run().await;
        assert_eq!(api.calls().len(), 1);
        assert_eq!(identity.calls().len(), 1);

        view.finish_send(outcome);
        assert!(!view.is_loading());
        assert_eq!(view.reply(), "first");

        view.draft_mut().unwrap().set("Again");
        assert!(view.begin_send().is_some());
    }

    #[test]
    fn test_view_stays_loading_until_request_settles() {
        let gate = Arc::new(Notify::new());
        let api = Arc::new(FakeApi {
            gate: Some(gate.clone()),
            ..FakeApi::replying("done")
        });
        let identity = Arc::new(FakeIdentity::signed_in());
        let mut view = view(&api, &identity);
        view.draft_mut().unwrap().set("Hello");

        let pending = view.begin_send().unwrap();
        let mut run = task::spawn(pending.run());
        assert_pending!(run.poll());
        assert!(view.is_loading());
        assert_eq!(api.calls().len(), 1);

        gate.notify_one();
        let outcome = assert_ready!(run.poll());
        view.finish_send(outcome);

        assert!(!view.is_loading());
        assert_eq!(view.reply(), "done");
    }

    #[tokio::test]
    async fn test_work_order_scenario() {
        let api = Arc::new(FakeApi::replying("You have 3 open work orders."));
        let identity = Arc::new(FakeIdentity::signed_in());
        let mut view = view(&api, &identity);
        view.draft_mut().unwrap().set("What is my next work order?");

        view.send_message().await;

        assert_eq!(view.reply(), "You have 3 open work orders.");
        assert!(!view.is_loading());
        assert!(view.draft().is_empty());

        let calls = api.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].0,
            ChatRequest {
                message: "What is my next work order?".to_string(),
                user_token: "silent-token".to_string(),
            }
        );
        assert_eq!(calls[0].1.as_deref(), Some("silent-token"));

        let identity_calls = identity.calls();
        assert_eq!(identity_calls.len(), 1);
        assert_eq!(identity_calls[0].0, "silent");
        assert_eq!(identity_calls[0].1.scopes, vec![API_SCOPE]);
        assert_eq!(identity_calls[0].1.account, Some(account()));
    }

    #[tokio::test]
    async fn test_message_sent_untrimmed() {
        let api = Arc::new(FakeApi::replying("ok"));
        let identity = Arc::new(FakeIdentity::signed_in());
        let mut view = view(&api, &identity);
        view.draft_mut().unwrap().set("  padded  ");

        view.send_message().await;

        assert_eq!(api.calls()[0].0.message, "  padded  ");
    }

    #[tokio::test]
    async fn test_http_error_shows_failure_text() {
        for status in [400, 401, 500, 503] {
            let api = Arc::new(FakeApi::default());
            api.push(Err(status_error(status)));
            let identity = Arc::new(FakeIdentity::signed_in());
            let mut view = view(&api, &identity);
            view.draft_mut().unwrap().set("Hello");

            view.send_message().await;

            assert_eq!(view.reply(), FAILURE_TEXT);
            assert!(!view.is_loading());
            assert!(view.draft().is_empty());
        }
    }

    #[tokio::test]
    async fn test_token_failure_shows_failure_text_without_calling_api() {
        let api = Arc::new(FakeApi::default());
        let identity = Arc::new(FakeIdentity::signed_in());
        identity.push_silent(Err(AuthError::Request("network down".to_string())));
        let mut view = view(&api, &identity);
        view.draft_mut().unwrap().set("Hello");

        view.send_message().await;

        assert_eq!(view.reply(), FAILURE_TEXT);
        assert!(!view.is_loading());
        assert!(view.draft().is_empty());
        assert!(api.calls().is_empty());
        // Not an interaction-required error, so no prompt.
        assert_eq!(identity.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_interaction_required_falls_back_to_interactive() {
        let api = Arc::new(FakeApi::replying("ok"));
        let identity = Arc::new(FakeIdentity::signed_in());
        identity.push_silent(Err(AuthError::InteractionRequired(
            "consent needed".to_string(),
        )));
        let mut view = view(&api, &identity);
        view.draft_mut().unwrap().set("Hello");

        view.send_message().await;

        let calls = identity.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "silent");
        assert_eq!(calls[1].0, "interactive");
        assert_eq!(calls[0].1, calls[1].1);

        assert_eq!(api.calls()[0].1.as_deref(), Some("interactive-token"));
        assert_eq!(view.reply(), "ok");
    }

    #[tokio::test]
    async fn test_interactive_fallback_failure_is_terminal() {
        let api = Arc::new(FakeApi::default());
        let identity = Arc::new(FakeIdentity {
            interactive_fails: true,
            ..FakeIdentity::signed_in()
        });
        identity.push_silent(Err(AuthError::InteractionRequired("expired".to_string())));
        let mut view = view(&api, &identity);
        view.draft_mut().unwrap().set("Hello");

        view.send_message().await;

        assert_eq!(view.reply(), FAILURE_TEXT);
        assert!(api.calls().is_empty());
        assert_eq!(identity.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_new_send_replaces_previous_failure() {
        let api = Arc::new(FakeApi::default());
        api.push(Err(status_error(500)));
        api.push(Ok(ChatReply {
            reply: "second".to_string(),
        }));
        let identity = Arc::new(FakeIdentity::signed_in());
        let mut view = view(&api, &identity);

        view.draft_mut().unwrap().set("first");
        view.send_message().await;
        assert_eq!(view.reply(), FAILURE_TEXT);

        view.draft_mut().unwrap().set("again");
        view.send_message().await;
        assert_eq!(view.reply(), "second");
    }

    #[tokio::test]
    async fn test_anonymous_view_sends_placeholder_without_bearer() {
        let api = Arc::new(FakeApi::replying("You said: 'Hello'"));
        let mut view = ChatView::new(api.clone());
        assert_eq!(view.screen(), Screen::Chat);
        assert!(view.sign_in().is_none());
        view.draft_mut().unwrap().set("Hello");

        view.send_message().await;

        let calls = api.calls();
        assert_eq!(calls[0].0.user_token, PLACEHOLDER_TOKEN);
        assert_eq!(calls[0].1, None);
        assert_eq!(view.reply(), "You said: 'Hello'");
    }

    #[tokio::test]
    async fn test_sign_in_uses_login_scopes() {
        let api = Arc::new(FakeApi::default());
        let identity = Arc::new(FakeIdentity::default());
        let view = view(&api, &identity);
        assert_eq!(view.screen(), Screen::SignIn);

        let signed_in = view.sign_in().unwrap().run().await.unwrap();

        assert_eq!(signed_in, account());
        assert_eq!(view.screen(), Screen::Chat);
        let calls = identity.calls();
        assert_eq!(calls[0].0, "login");
        assert_eq!(calls[0].1.scopes, vec!["User.Read"]);
    }

    #[tokio::test]
    async fn test_sign_in_failure_leaves_prompt() {
        let api = Arc::new(FakeApi::default());
        let identity = Arc::new(FakeIdentity {
            interactive_fails: true,
            ..Default::default()
        });
        let view = view(&api, &identity);

        assert!(view.sign_in().unwrap().run().await.is_err());
        assert_eq!(view.screen(), Screen::SignIn);
    }
}
