//! HTTP calls against the account endpoints.

use std::fmt;

use serde::Deserialize;

/// Failure surface of the account API.
#[derive(Debug)]
pub enum ApiError {
    /// The server answered with an error status.
    Rejected { status: u16, message: String },
    /// The request never completed.
    Transport(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Rejected { status, message } => write!(f, "{message} (status {status})"),
            ApiError::Transport(reason) => write!(f, "request failed: {reason}"),
        }
    }
}

impl std::error::Error for ApiError {}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Thin client for the register and login endpoints.
pub struct AuthApi {
    base_url: String,
    http: reqwest::Client,
}

impl AuthApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http: reqwest::Client::new(),
        }
    }

    /// Create an account and return its session token.
    pub async fn register(&self, username: &str, password: &str) -> Result<String, ApiError> {
        self.request_token("/api/register", username, password).await
    }

    /// Exchange credentials for a session token.
    pub async fn login(&self, username: &str, password: &str) -> Result<String, ApiError> {
        self.request_token("/api/login", username, password).await
    }

    async fn request_token(
        &self,
        path: &str,
        username: &str,
        password: &str,
    ) -> Result<String, ApiError> {
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            let body: TokenResponse = resp
                .json()
                .await
                .map_err(|e| ApiError::Transport(e.to_string()))?;
            Ok(body.token)
        } else {
            let message = resp
                .json::<ErrorBody>()
                .await
                .map(|body| body.error.message)
                .unwrap_or_else(|_| format!("request failed with status {status}"));
            Err(ApiError::Rejected {
                status: status.as_u16(),
                message,
            })
        }
    }
}

/// Derive the gateway endpoint from the server's base URL.
pub fn ws_url(server_url: &str) -> String {
    let base = server_url.trim_end_matches('/');
    let swapped = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base.to_string()
    };
    format!("{swapped}/ws")
}
