//! HTTP transport to the assistant backend.

use async_trait::async_trait;
use reqwest::{header, Client, Method};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::ApiError;

/// An outbound API call, relative to the backend base URL.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    /// Bearer token for the `Authorization` header
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            bearer: None,
            body: None,
        }
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Some(token.into());
        self
    }
}

/// A received response with its body buffered.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 401 and 403 both mean the credential was rejected.
    pub fn is_auth_failure(&self) -> bool {
        self.status == 401 || self.status == 403
    }

    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Convert a non-2xx response into an application error, preferring the
    /// body's `error` field.
    pub fn into_error(self) -> ApiError {
        #[derive(serde::Deserialize)]
        struct ErrorBody {
            error: Option<String>,
        }

        let message = serde_json::from_str::<ErrorBody>(&self.body)
            .ok()
            .and_then(|b| b.error)
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| format!("HTTP {}", self.status));

        ApiError::Application {
            status: self.status,
            message,
        }
    }
}

/// Something that can carry an [`HttpRequest`] to the backend.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError>;
}

/// Transport over `reqwest`. Holds the cookie jar, so the backend's session
/// cookie accompanies every request, refresh included.
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, timeout: Option<Duration>) -> Result<Self, ApiError> {
        let mut builder = Client::builder().cookie_store(true);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
        let url = self.url(&request.path);
        tracing::debug!("{} {}", request.method, url);

        let mut builder = self.client.request(request.method.clone(), &url);
        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        } else {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        tracing::debug!("{} {} -> {}", request.method, url, status);

        Ok(HttpResponse::new(status, body))
    }
}

#[cfg(test)]
pub mod testing {
    //! Scripted transport for exercising the client without a network.

    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeTransport {
        scripts: Mutex<HashMap<String, VecDeque<Result<HttpResponse, ApiError>>>>,
        log: Mutex<Vec<HttpRequest>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue a response for the next request to `path`.
        pub fn push(&self, path: &str, status: u16, body: &str) {
            self.push_result(path, Ok(HttpResponse::new(status, body)));
        }

        pub fn push_transport_error(&self, path: &str) {
            self.push_result(path, Err(ApiError::Transport("connection refused".to_string())));
        }

        fn push_result(&self, path: &str, result: Result<HttpResponse, ApiError>) {
            self.scripts
                .lock()
                .unwrap()
                .entry(path.to_string())
                .or_default()
                .push_back(result);
        }

        /// Every request issued so far, in order.
        pub fn requests(&self) -> Vec<HttpRequest> {
            self.log.lock().unwrap().clone()
        }

        pub fn requests_to(&self, path: &str) -> Vec<HttpRequest> {
            self.requests().into_iter().filter(|r| r.path == path).collect()
        }
    }

    #[async_trait]
    impl HttpTransport for FakeTransport {
        async fn execute(&self, request: &HttpRequest) -> Result<HttpResponse, ApiError> {
            self.log.lock().unwrap().push(request.clone());
            self.scripts
                .lock()
                .unwrap()
                .get_mut(&request.path)
                .and_then(|q| q.pop_front())
                .unwrap_or_else(|| Err(ApiError::Transport(format!("nothing scripted for {}", request.path))))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_body_message() {
        let err = HttpResponse::new(500, r#"{"error": "Failed to query LLM"}"#).into_error();
        assert_eq!(err.to_string(), "Failed to query LLM");
        assert!(matches!(err, ApiError::Application { status: 500, .. }));
    }

    #[test]
    fn test_error_without_body_falls_back_to_status() {
        assert_eq!(HttpResponse::new(502, "").into_error().to_string(), "HTTP 502");
        assert_eq!(
            HttpResponse::new(404, "<html>not found</html>").into_error().to_string(),
            "HTTP 404"
        );
        assert_eq!(HttpResponse::new(400, r#"{"detail": "x"}"#).into_error().to_string(), "HTTP 400");
    }

    #[test]
    fn test_auth_failure_statuses() {
        assert!(HttpResponse::new(401, "").is_auth_failure());
        assert!(HttpResponse::new(403, "").is_auth_failure());
        assert!(!HttpResponse::new(404, "").is_auth_failure());
        assert!(!HttpResponse::new(200, "").is_auth_failure());
    }

    #[test]
    fn test_url_joining() {
        let transport = ReqwestTransport::new("http://localhost:5000/", None).unwrap();
        assert_eq!(transport.url("/query"), "http://localhost:5000/query");
    }
}
