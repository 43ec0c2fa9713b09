//! Typed operations against the assistant backend.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::session::opt_string_or_number;
use crate::models::{HistoryRecord, Session, User};

use super::gateway::Gateway;
use super::token_store::TokenStore;
use super::transport::{HttpRequest, HttpResponse, HttpTransport};

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub credential: String,
    pub user: Option<User>,
}

/// The backend's answer to a query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryReply {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub session_id: Option<String>,
}

impl QueryReply {
    /// Answer text, if there is any.
    pub fn text(&self) -> Option<&str> {
        self.response.as_deref().filter(|t| !t.trim().is_empty())
    }
}

#[derive(Deserialize)]
struct LoginBody {
    access_token: Option<String>,
    #[serde(default)]
    user: Option<User>,
}

#[derive(Deserialize)]
struct UserBody {
    user: User,
}

#[derive(Deserialize)]
struct SessionsBody {
    #[serde(default)]
    sessions: Vec<Session>,
}

#[derive(Deserialize)]
struct SessionBody {
    session: Session,
}

/// Client for the backend's REST API.
pub struct ApiClient {
    gateway: Gateway,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn HttpTransport>, tokens: Arc<TokenStore>) -> Self {
        Self {
            gateway: Gateway::new(transport, tokens),
        }
    }

    /// Whether a credential is currently stored.
    pub fn has_credential(&self) -> bool {
        self.gateway.tokens().get().is_some()
    }

    /// Exchange an identity-provider token for an access token.
    pub async fn login(&self, id_token: &str) -> Result<LoginOutcome, ApiError> {
        let response = self
            .gateway
            .send_anonymous(HttpRequest::post("/login").bearer(id_token))
            .await?;
        let body: LoginBody = decode(response)?;
        let credential = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::EmptyResponse("Login failed".to_string()))?;

        self.gateway.tokens().set(&credential);
        tracing::info!("Logged in");
        Ok(LoginOutcome {
            credential,
            user: body.user,
        })
    }

    /// Drop the stored credential.
    pub fn logout(&self) {
        self.gateway.tokens().clear();
        tracing::info!("Logged out");
    }

    pub async fn refresh(&self) -> Result<String, ApiError> {
        self.gateway.refresh().await
    }

    pub async fn user_info(&self) -> Result<User, ApiError> {
        let body: UserBody = self.authorized(HttpRequest::get("/user-info")).await?;
        Ok(body.user)
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>, ApiError> {
        let body: SessionsBody = self.authorized(HttpRequest::get("/get-sessions")).await?;
        Ok(body.sessions)
    }

    pub async fn create_session(&self) -> Result<Session, ApiError> {
        let body: SessionBody = self.authorized(HttpRequest::post("/add-session")).await?;
        Ok(body.session)
    }

    pub async fn session_history(&self, session_id: &str) -> Result<Vec<HistoryRecord>, ApiError> {
        self.authorized(HttpRequest::get(format!("/sessions/{}/messages", session_id)))
            .await
    }

    pub async fn send_query(&self, text: &str, session_id: Option<&str>) -> Result<QueryReply, ApiError> {
        let mut body = json!({ "input_query": text });
        if let Some(id) = session_id {
            body["session_id"] = json!(id);
        }
        self.authorized(HttpRequest::post("/query").json(body)).await
    }

    async fn authorized<T: DeserializeOwned>(&self, request: HttpRequest) -> Result<T, ApiError> {
        decode(self.gateway.send(request).await?)
    }
}

fn decode<T: DeserializeOwned>(response: HttpResponse) -> Result<T, ApiError> {
    if !response.is_success() {
        return Err(response.into_error());
    }
    response.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::transport::testing::FakeTransport;

    fn client() -> (Arc<FakeTransport>, Arc<TokenStore>, ApiClient) {
        let fake = Arc::new(FakeTransport::new());
        let tokens = Arc::new(TokenStore::in_memory());
        let client = ApiClient::new(fake.clone(), tokens.clone());
        (fake, tokens, client)
    }

    #[tokio::test]
    async fn test_login_then_user_info() {
        let (fake, tokens, client) = client();
        fake.push("/login", 200, r#"{"message": "ok", "access_token": "acc"}"#);
        fake.push("/user-info", 200, r#"{"user": {"email": "me@example.com", "profile_url": null}}"#);

        let outcome = client.login("google-id-token").await.unwrap();
        assert_eq!(outcome.credential, "acc");
        assert_eq!(tokens.get().as_deref(), Some("acc"));
        assert_eq!(fake.requests_to("/login")[0].bearer.as_deref(), Some("google-id-token"));

        let user = client.user_info().await.unwrap();
        assert_eq!(user.email, "me@example.com");
        assert_eq!(fake.requests_to("/user-info")[0].bearer.as_deref(), Some("acc"));
    }

    #[tokio::test]
    async fn test_login_error_message() {
        let (fake, tokens, client) = client();
        fake.push("/login", 401, r#"{"error": "Invalid ID token"}"#);

        let err = client.login("bad").await.unwrap_err();

        assert_eq!(err.to_string(), "Invalid ID token");
        assert_eq!(tokens.get(), None);
        assert!(fake.requests_to("/refresh-token").is_empty());
    }

    #[tokio::test]
    async fn test_expired_credential_is_refreshed_transparently() {
        let (fake, tokens, client) = client();
        tokens.set("expired");
        fake.push("/user-info", 403, r#"{"error": "Token expired"}"#);
        fake.push("/refresh-token", 200, r#"{"access_token": "renewed"}"#);
        fake.push("/user-info", 200, r#"{"user": {"email": "me@example.com"}}"#);

        let user = client.user_info().await.unwrap();

        assert_eq!(user.email, "me@example.com");
        assert_eq!(tokens.get().as_deref(), Some("renewed"));
    }

    #[tokio::test]
    async fn test_sessions_and_history() {
        let (fake, tokens, client) = client();
        tokens.set("acc");
        fake.push(
            "/get-sessions",
            200,
            r#"{"sessions": [{"id": "s2", "created_at": "2026-10-02T10:00:00"}, {"id": 1, "created_at": null}]}"#,
        );
        fake.push("/add-session", 200, r#"{"session": {"id": "s3", "created_at": "Wed, 14 Oct 2026 08:00:00 GMT"}}"#);
        fake.push(
            "/sessions/s2/messages",
            200,
            r#"[{"role": "user", "content": "hi"}, {"role": "model", "content": "hello"}]"#,
        );

        let sessions = client.list_sessions().await.unwrap();
        assert_eq!(sessions.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), vec!["s2", "1"]);

        let created = client.create_session().await.unwrap();
        assert_eq!(created.id, "s3");

        let history = client.session_history("s2").await.unwrap();
        assert_eq!(history, vec![HistoryRecord::new("user", "hi"), HistoryRecord::new("model", "hello")]);
    }

    #[tokio::test]
    async fn test_send_query_body() {
        let (fake, tokens, client) = client();
        tokens.set("acc");
        fake.push("/query", 200, r#"{"response": "Hi", "session_id": "s1"}"#);
        fake.push("/query", 200, r#"{"response": "Again"}"#);

        let reply = client.send_query("Hello", None).await.unwrap();
        assert_eq!(reply.text(), Some("Hi"));
        assert_eq!(reply.session_id.as_deref(), Some("s1"));

        let reply = client.send_query("More", Some("s1")).await.unwrap();
        assert_eq!(reply.session_id, None);

        let bodies: Vec<_> = fake.requests_to("/query").into_iter().map(|r| r.body.unwrap()).collect();
        assert_eq!(bodies[0], json!({ "input_query": "Hello" }));
        assert_eq!(bodies[1], json!({ "input_query": "More", "session_id": "s1" }));
    }

    #[tokio::test]
    async fn test_malformed_success_body() {
        let (fake, tokens, client) = client();
        tokens.set("acc");
        fake.push("/user-info", 200, "not json");

        let err = client.user_info().await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    #[tokio::test]
    async fn test_logout_clears_credential() {
        let (_fake, tokens, client) = client();
        tokens.set("acc");
        assert!(client.has_credential());

        client.logout();
        assert!(!client.has_credential());
    }
}
