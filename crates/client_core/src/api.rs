//! Typed client for the REST collaborators: authentication, leaderboard and
//! aggregate stats. The game itself runs over the websocket connection; these
//! calls are plain request/response and are awaited independently of it.

use reqwest::Client;
use shared::{
    domain::{Identity, LeaderboardEntry, ServerStats},
    error::{ApiError, ErrorCode},
    protocol::{ApiFailure, AuthResponse, LoginRequest, SignupRequest},
};
use url::Url;

use crate::error::ClientError;

#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(server_url: impl Into<String>) -> Result<Self, ClientError> {
        let server_url = server_url.into();
        let parsed =
            Url::parse(&server_url).map_err(|_| ClientError::InvalidServerUrl(server_url.clone()))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(ClientError::InvalidServerUrl(server_url));
        }
        Ok(Self {
            http: Client::new(),
            base_url: server_url.trim_end_matches('/').to_string(),
        })
    }

    /// Authenticates an existing account. Fails closed: any non-success
    /// response surfaces the server's message and leaves the user logged out.
    pub async fn login(&self, username: &str, password: &str) -> Result<Identity, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/login", self.base_url))
            .json(&LoginRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        Self::parse_auth_response(response).await
    }

    pub async fn signup(&self, username: &str, password: &str) -> Result<Identity, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/signup", self.base_url))
            .json(&SignupRequest {
                username: username.to_string(),
                password: password.to_string(),
            })
            .send()
            .await?;
        Self::parse_auth_response(response).await
    }

    pub async fn leaderboard(&self) -> Result<Vec<LeaderboardEntry>, ClientError> {
        let entries = self
            .http
            .get(format!("{}/api/leaderboard", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(entries)
    }

    pub async fn stats(&self) -> Result<ServerStats, ClientError> {
        let stats = self
            .http
            .get(format!("{}/api/stats", self.base_url))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(stats)
    }

    async fn parse_auth_response(response: reqwest::Response) -> Result<Identity, ClientError> {
        let status = response.status();
        if status.is_success() {
            let body: AuthResponse = response.json().await?;
            return Ok(body.user);
        }
        // The backend reports failures as `{"detail": "..."}`; fall back to
        // the bare status when the body is not in that shape.
        let message = match response.json::<ApiFailure>().await {
            Ok(failure) => failure.detail,
            Err(_) => format!("request failed with status {status}"),
        };
        Err(ApiError::new(ErrorCode::from_status(status.as_u16()), message).into())
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
