//! Authorized request gateway.
//!
//! Every authorized call walks `Attempt -> Refreshing -> Retry -> Done`. There
//! is no edge back into `Refreshing`, so a call refreshes at most once.
//!
//! Calls failing authorization at the same time each run their own refresh.
//! The backend treats refresh as idempotent, so this only costs requests.

use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiError;

use super::token_store::TokenStore;
use super::transport::{HttpRequest, HttpResponse, HttpTransport};

const REFRESH_PATH: &str = "/refresh-token";

/// Where an authorized call is in its lifecycle.
#[derive(Debug)]
enum AuthStep {
    Attempt,
    Refreshing,
    Retry,
    Done(HttpResponse),
}

#[derive(Deserialize)]
struct RefreshBody {
    access_token: Option<String>,
}

/// Injects the stored credential and recovers once from a rejected one.
pub struct Gateway {
    transport: Arc<dyn HttpTransport>,
    tokens: Arc<TokenStore>,
}

impl Gateway {
    pub fn new(transport: Arc<dyn HttpTransport>, tokens: Arc<TokenStore>) -> Self {
        Self { transport, tokens }
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Send with the stored credential, refreshing once on 401/403.
    ///
    /// The caller sees the retried response, never the rejected one. If the
    /// refresh fails the token store is cleared and
    /// [`ApiError::Unauthenticated`] is returned.
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut step = AuthStep::Attempt;
        loop {
            step = match step {
                AuthStep::Attempt => {
                    let response = self.issue_authorized(&request).await?;
                    if response.is_auth_failure() {
                        tracing::debug!(
                            "{} {} rejected with {}, refreshing credential",
                            request.method,
                            request.path,
                            response.status
                        );
                        AuthStep::Refreshing
                    } else {
                        AuthStep::Done(response)
                    }
                }
                AuthStep::Refreshing => match self.refresh().await {
                    Ok(_) => AuthStep::Retry,
                    Err(e) => {
                        tracing::info!("Credential refresh failed: {}", e);
                        return Err(ApiError::Unauthenticated);
                    }
                },
                AuthStep::Retry => AuthStep::Done(self.issue_authorized(&request).await?),
                AuthStep::Done(response) => return Ok(response),
            };
        }
    }

    /// Send without touching the credential.
    pub async fn send_anonymous(&self, request: HttpRequest) -> Result<HttpResponse, ApiError> {
        self.transport.execute(&request).await
    }

    /// Exchange the session cookie for a new credential.
    ///
    /// On success the new credential is stored; on any failure the store is
    /// cleared.
    pub async fn refresh(&self) -> Result<String, ApiError> {
        match self.request_new_token().await {
            Ok(token) => {
                self.tokens.set(&token);
                tracing::debug!("Credential refreshed");
                Ok(token)
            }
            Err(e) => {
                self.tokens.clear();
                Err(e)
            }
        }
    }

    async fn request_new_token(&self) -> Result<String, ApiError> {
        let response = self
            .transport
            .execute(&HttpRequest::post(REFRESH_PATH))
            .await?;
        if !response.is_success() {
            return Err(response.into_error());
        }

        response
            .parse::<RefreshBody>()?
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::EmptyResponse("refresh returned no access token".to_string()))
    }

    async fn issue_authorized(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let mut request = request.clone();
        request.bearer = self.tokens.get();
        self.transport.execute(&request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::transport::testing::FakeTransport;

    fn gateway_with(fake: &Arc<FakeTransport>, token: Option<&str>) -> Gateway {
        let tokens = Arc::new(TokenStore::in_memory());
        if let Some(token) = token {
            tokens.set(token);
        }
        Gateway::new(fake.clone(), tokens)
    }

    #[tokio::test]
    async fn test_attaches_stored_credential() {
        let fake = Arc::new(FakeTransport::new());
        fake.push("/user-info", 200, "{}");
        let gateway = gateway_with(&fake, Some("tok"));

        let response = gateway.send(HttpRequest::get("/user-info")).await.unwrap();

        assert_eq!(response.status, 200);
        let sent = fake.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].bearer.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_refreshes_and_retries_once_on_403() {
        let fake = Arc::new(FakeTransport::new());
        fake.push("/user-info", 403, r#"{"error": "Token expired"}"#);
        fake.push("/refresh-token", 200, r#"{"access_token": "fresh"}"#);
        fake.push("/user-info", 200, r#"{"user": {"email": "a@b.c"}}"#);
        let gateway = gateway_with(&fake, Some("stale"));

        let response = gateway.send(HttpRequest::get("/user-info")).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(gateway.tokens().get().as_deref(), Some("fresh"));
        let calls = fake.requests_to("/user-info");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].bearer.as_deref(), Some("stale"));
        assert_eq!(calls[1].bearer.as_deref(), Some("fresh"));
        let refresh = fake.requests_to("/refresh-token");
        assert_eq!(refresh.len(), 1);
        assert_eq!(refresh[0].bearer, None);
    }

    #[tokio::test]
    async fn test_401_is_treated_like_403() {
        let fake = Arc::new(FakeTransport::new());
        fake.push("/get-sessions", 401, "");
        fake.push("/refresh-token", 200, r#"{"access_token": "fresh"}"#);
        fake.push("/get-sessions", 200, r#"{"sessions": []}"#);
        let gateway = gateway_with(&fake, None);

        let response = gateway.send(HttpRequest::get("/get-sessions")).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(fake.requests_to("/get-sessions")[0].bearer, None);
    }

    #[tokio::test]
    async fn test_failed_refresh_clears_store_without_retry() {
        let fake = Arc::new(FakeTransport::new());
        fake.push("/user-info", 403, "");
        fake.push("/refresh-token", 401, r#"{"error": "Refresh token expired"}"#);
        let gateway = gateway_with(&fake, Some("stale"));

        let err = gateway.send(HttpRequest::get("/user-info")).await.unwrap_err();

        assert!(err.is_unauthenticated());
        assert_eq!(gateway.tokens().get(), None);
        assert_eq!(fake.requests_to("/user-info").len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_transport_error_is_unauthenticated() {
        let fake = Arc::new(FakeTransport::new());
        fake.push("/user-info", 403, "");
        fake.push_transport_error("/refresh-token");
        let gateway = gateway_with(&fake, Some("stale"));

        let err = gateway.send(HttpRequest::get("/user-info")).await.unwrap_err();

        assert!(err.is_unauthenticated());
        assert_eq!(gateway.tokens().get(), None);
        assert_eq!(fake.requests_to("/user-info").len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_without_token_in_body_fails() {
        let fake = Arc::new(FakeTransport::new());
        fake.push("/user-info", 401, "");
        fake.push("/refresh-token", 200, "{}");
        let gateway = gateway_with(&fake, Some("stale"));

        let err = gateway.send(HttpRequest::get("/user-info")).await.unwrap_err();

        assert!(err.is_unauthenticated());
        assert_eq!(gateway.tokens().get(), None);
    }

    #[tokio::test]
    async fn test_second_rejection_is_returned_not_retried() {
        let fake = Arc::new(FakeTransport::new());
        fake.push("/user-info", 403, "");
        fake.push("/refresh-token", 200, r#"{"access_token": "fresh"}"#);
        fake.push("/user-info", 403, r#"{"error": "Invalid token"}"#);
        let gateway = gateway_with(&fake, Some("stale"));

        let response = gateway.send(HttpRequest::get("/user-info")).await.unwrap();

        assert_eq!(response.status, 403);
        assert_eq!(response.into_error().to_string(), "Invalid token");
        assert_eq!(fake.requests_to("/user-info").len(), 2);
        assert_eq!(fake.requests_to("/refresh-token").len(), 1);
        assert_eq!(gateway.tokens().get().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_transport_error_is_not_an_auth_failure() {
        let fake = Arc::new(FakeTransport::new());
        fake.push_transport_error("/query");
        let gateway = gateway_with(&fake, Some("tok"));

        let err = gateway.send(HttpRequest::post("/query")).await.unwrap_err();

        assert!(matches!(err, ApiError::Transport(_)));
        assert!(fake.requests_to("/refresh-token").is_empty());
        assert_eq!(gateway.tokens().get().as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_non_auth_errors_pass_through() {
        let fake = Arc::new(FakeTransport::new());
        fake.push("/query", 500, r#"{"error": "Failed to query LLM"}"#);
        let gateway = gateway_with(&fake, Some("tok"));

        let response = gateway.send(HttpRequest::post("/query")).await.unwrap();

        assert_eq!(response.status, 500);
        assert!(fake.requests_to("/refresh-token").is_empty());
    }
}
