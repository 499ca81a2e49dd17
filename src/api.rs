//src/api.rs
//! Client for the coaching backend. Entities travel as the JSON shapes in `model`.
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::auth::{
    AuthTokens, LoginRequest, PasswordResetRequest, RefreshRequest, RegisterRequest,
};
use crate::model::{Paginated, Program, Week, Workout};

const DEVICE_ID_HEADER: &str = "X-Device-Id";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Server returned {status} for {url}: {body}")]
    Status {
        url: String,
        status: StatusCode,
        body: String,
    },
    #[error("Could not decode response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("Cannot update a {0} that has not been created yet")]
    MissingId(&'static str),
}

impl ApiError {
    /// Response body of a non-success status, if that is what this is.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::Status { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Pulls `message` (or `error`) out of a JSON error body; other bodies pass through.
fn error_text(raw: &str) -> String {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|value| {
            ["message", "error"]
                .iter()
                .find_map(|key| value.get(key).and_then(|v| v.as_str()).map(String::from))
        })
        .unwrap_or_else(|| raw.trim().to_string())
}

pub struct ApiClient {
    http_client: Client,
    base_url: String,
    access_token: Option<String>,
    device_id: Option<String>,
}

impl ApiClient {
    /// # Errors
    /// Returns `ApiError::Client` if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ApiError::Client)?;
        Ok(Self {
            http_client,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            access_token: None,
            device_id: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_access_token(&mut self, token: Option<String>) {
        self.access_token = token;
    }

    pub fn set_device_id(&mut self, device_id: Option<String>) {
        self.device_id = device_id;
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let mut builder = self.http_client.request(method, url);
        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token);
        }
        if let Some(device_id) = &self.device_id {
            builder = builder.header(DEVICE_ID_HEADER, device_id);
        }
        builder
    }

    async fn send(&self, builder: RequestBuilder, url: &str) -> Result<reqwest::Response, ApiError> {
        let response = builder.send().await.map_err(|source| {
            error!(%url, error = %source, "request failed to send");
            ApiError::Transport {
                url: url.to_string(),
                source,
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .map_or_else(|_| "Could not read error body".to_string(), |raw| error_text(&raw));
            error!(%url, %status, %body, "request returned an error status");
            return Err(ApiError::Status {
                url: url.to_string(),
                status,
                body,
            });
        }
        Ok(response)
    }

    async fn call<B, T>(&self, method: Method, path: &str, body: Option<&B>) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        debug!(%method, %url, "sending request");
        let mut builder = self.request(method, &url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let response = self.send(builder, &url).await?;
        response.json().await.map_err(|source| ApiError::Decode { url, source })
    }

    async fn call_no_content<B>(&self, method: Method, path: &str, body: Option<&B>) -> Result<(), ApiError>
    where
        B: Serialize + ?Sized,
    {
        let url = self.url(path);
        debug!(%method, %url, "sending request");
        let mut builder = self.request(method, &url);
        if let Some(body) = body {
            builder = builder.json(body);
        }
        self.send(builder, &url).await.map(|_| ())
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.call::<(), T>(Method::GET, path, None).await
    }

    // --- Auth ---

    pub async fn register(&self, request: &RegisterRequest<'_>) -> Result<AuthTokens, ApiError> {
        info!(email = request.email, "registering account");
        self.call(Method::POST, "auth/register", Some(request)).await
    }

    pub async fn login(&self, request: &LoginRequest<'_>) -> Result<AuthTokens, ApiError> {
        info!(email = request.email, "logging in");
        self.call(Method::POST, "auth/login", Some(request)).await
    }

    pub async fn refresh(&self, request: &RefreshRequest<'_>) -> Result<AuthTokens, ApiError> {
        self.call(Method::POST, "auth/refresh", Some(request)).await
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        self.call_no_content::<()>(Method::POST, "auth/logout", None).await
    }

    pub async fn request_password_reset(&self, request: &PasswordResetRequest<'_>) -> Result<(), ApiError> {
        self.call_no_content(Method::POST, "auth/password-reset", Some(request))
            .await
    }

    // --- Programs ---

    pub async fn list_programs(&self, cursor: Option<&str>) -> Result<Paginated<Program>, ApiError> {
        let url = self.url("programs");
        debug!(%url, ?cursor, "listing programs");
        let mut builder = self.request(Method::GET, &url);
        if let Some(cursor) = cursor {
            builder = builder.query(&[("cursor", cursor)]);
        }
        let page: Paginated<Program> = self
            .send(builder, &url)
            .await?
            .json()
            .await
            .map_err(|source| ApiError::Decode { url, source })?;
        info!(
            count = page.data.len(),
            has_next_page = page.pagination.has_next_page,
            "fetched programs"
        );
        Ok(page)
    }

    pub async fn get_program(&self, id: &str) -> Result<Program, ApiError> {
        self.get(&format!("programs/{id}")).await
    }

    pub async fn create_program(&self, program: &Program) -> Result<Program, ApiError> {
        self.call(Method::POST, "programs", Some(program)).await
    }

    pub async fn update_program(&self, program: &Program) -> Result<Program, ApiError> {
        let id = program.id.as_deref().ok_or(ApiError::MissingId("program"))?;
        self.call(Method::PUT, &format!("programs/{id}"), Some(program))
            .await
    }

    // --- Weeks ---

    pub async fn get_week(&self, program_id: &str, week_id: &str) -> Result<Week, ApiError> {
        self.get(&format!("programs/{program_id}/weeks/{week_id}"))
            .await
    }

    pub async fn update_week(&self, program_id: &str, week: &Week) -> Result<Week, ApiError> {
        let id = week.id.as_deref().ok_or(ApiError::MissingId("week"))?;
        self.call(
            Method::PUT,
            &format!("programs/{program_id}/weeks/{id}"),
            Some(week),
        )
        .await
    }

    // --- Workouts ---

    pub async fn get_workout(&self, id: &str) -> Result<Workout, ApiError> {
        self.get(&format!("workouts/{id}")).await
    }

    pub async fn create_workout(&self, workout: &Workout) -> Result<Workout, ApiError> {
        self.call(Method::POST, "workouts", Some(workout)).await
    }

    pub async fn update_workout(&self, workout: &Workout) -> Result<Workout, ApiError> {
        let id = workout.id.as_deref().ok_or(ApiError::MissingId("workout"))?;
        self.call(Method::PUT, &format!("workouts/{id}"), Some(workout))
            .await
    }

    pub async fn delete_workout(&self, id: &str) -> Result<(), ApiError> {
        info!(%id, "deleting workout");
        self.call_no_content::<()>(Method::DELETE, &format!("workouts/{id}"), None)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_join_without_doubled_slashes() {
        let client = ApiClient::new("https://api.example.com/v1/ ", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "https://api.example.com/v1");
        assert_eq!(client.url("/programs/42"), "https://api.example.com/v1/programs/42");
        assert_eq!(client.url("auth/login"), "https://api.example.com/v1/auth/login");
    }

    #[test]
    fn json_error_bodies_are_reduced_to_their_message() {
        assert_eq!(error_text(r#"{"message":"Email already in use"}"#), "Email already in use");
        assert_eq!(error_text(r#"{"error":"User not found","code":404}"#), "User not found");
        assert_eq!(error_text(" Bad Gateway \n"), "Bad Gateway");
        assert_eq!(error_text(r#"{"status":500}"#), r#"{"status":500}"#);
    }

    #[tokio::test]
    async fn updating_an_unsaved_entity_fails_before_any_request() {
        let client = ApiClient::new("http://127.0.0.1:9", Duration::from_secs(1)).unwrap();
        let err = client.update_workout(&Workout::default()).await.unwrap_err();
        assert!(matches!(err, ApiError::MissingId("workout")));
        assert!(err.server_message().is_none());
    }
}
