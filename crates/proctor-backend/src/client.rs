//! REST client for the exam service.
//!
//! This module provides [`HttpBackend`], the [`AttemptBackend`] used in
//! production. Every request carries the bearer token (when configured) and
//! is bounded by the configured request timeout.

use std::time::Duration;

use async_trait::async_trait;
use proctor_session::{
    AnswerValue, Attempt, AttemptBackend, BackendErrorKind, Config, Exam, ProctorError, Result,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::routes;

/// Longest response body excerpt kept in error messages.
const MAX_ERROR_BODY: usize = 200;

/// Response of the can-start check.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CanStartResponse {
    /// Whether a new attempt may be started.
    pub can_start: bool,
}

/// Body of a persist-answer request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistAnswerRequest {
    /// The answer value.
    pub answer: AnswerValue,
}

/// HTTP implementation of [`AttemptBackend`].
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use proctor_backend::HttpBackend;
///
/// # fn example() -> proctor_session::Result<()> {
/// let backend = HttpBackend::new("http://localhost:8000/api", Duration::from_secs(30))?
///     .with_token("secret");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpBackend {
    /// Creates a client for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProctorError::Backend`] if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build().map_err(|e| {
            ProctorError::backend("build HTTP client", BackendErrorKind::Other, e.to_string())
        })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Creates a client from the loaded configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = Self::new(&config.backend_url, config.request_timeout())?;
        Ok(match &config.auth_token {
            Some(token) => backend.with_token(token),
            None => backend,
        })
    }

    /// Sends `token` as a bearer token on every request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Base URL without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends a request and returns the successful response.
    async fn send(&self, operation: &str, request: RequestBuilder) -> Result<reqwest::Response> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| transport_error(operation, &e))?;

        let status = response.status();
        if status.is_success() {
            debug!(operation, status = status.as_u16(), "Request succeeded");
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        warn!(operation, status = status.as_u16(), "Request rejected");
        Err(status_error(operation, status, &body))
    }

    /// Sends a request and decodes its JSON body.
    async fn send_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<T> {
        self.send(operation, request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| transport_error(operation, &e))
    }
}

/// Maps a non-success status onto a backend error.
fn status_error(operation: &str, status: StatusCode, body: &str) -> ProctorError {
    let mut detail: String = body.trim().chars().take(MAX_ERROR_BODY).collect();
    if detail.is_empty() {
        detail = status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string();
    }
    ProctorError::backend(
        operation,
        BackendErrorKind::from_status(status.as_u16()),
        format!("HTTP {}: {detail}", status.as_u16()),
    )
}

/// Maps a transport or decoding failure onto a backend error.
fn transport_error(operation: &str, error: &reqwest::Error) -> ProctorError {
    let kind = if error.is_decode() {
        BackendErrorKind::Decode
    } else if error.is_timeout() || error.is_connect() || error.is_request() {
        BackendErrorKind::Network
    } else if let Some(status) = error.status() {
        BackendErrorKind::from_status(status.as_u16())
    } else {
        BackendErrorKind::Other
    };
    ProctorError::backend(operation, kind, error.to_string())
}

#[async_trait]
impl AttemptBackend for HttpBackend {
    #[instrument(skip(self))]
    async fn get_exam(&self, exam_id: &str) -> Result<Exam> {
        let request = self.client.get(self.url(&routes::exam(exam_id)));
        self.send_json("get exam", request).await
    }

    #[instrument(skip(self))]
    async fn check_can_start_attempt(&self, user_id: &str, exam_id: &str) -> Result<bool> {
        let request = self
            .client
            .get(self.url(&routes::can_start(exam_id)))
            .query(&[("user_id", user_id)]);
        let response: CanStartResponse = self.send_json("check attempt eligibility", request).await?;
        Ok(response.can_start)
    }

    #[instrument(skip(self))]
    async fn start_attempt(&self, exam_id: &str) -> Result<Attempt> {
        let request = self.client.post(self.url(&routes::attempts(exam_id)));
        self.send_json("start attempt", request).await
    }

    #[instrument(skip(self))]
    async fn get_in_progress_attempt(&self, exam_id: &str) -> Result<Option<Attempt>> {
        let request = self.client.get(self.url(&routes::in_progress(exam_id)));
        match self.send_json::<Option<Attempt>>("get in-progress attempt", request).await {
            Err(ProctorError::Backend {
                kind: BackendErrorKind::NotFound,
                ..
            }) => Ok(None),
            other => other,
        }
    }

    #[instrument(skip(self, answer))]
    async fn persist_answer(
        &self,
        attempt_id: &str,
        question_id: &str,
        answer: &AnswerValue,
    ) -> Result<()> {
        let body = PersistAnswerRequest {
            answer: answer.clone(),
        };
        let request = self
            .client
            .put(self.url(&routes::answer(attempt_id, question_id)))
            .json(&body);
        self.send("persist answer", request).await.map(|_| ())
    }

    #[instrument(skip(self))]
    async fn submit_attempt(&self, attempt_id: &str) -> Result<Attempt> {
        let request = self.client.post(self.url(&routes::submit(attempt_id)));
        self.send_json("submit attempt", request).await
    }

    #[instrument(skip(self))]
    async fn grade_attempt(&self, attempt_id: &str) -> Result<Attempt> {
        let request = self.client.post(self.url(&routes::grade(attempt_id)));
        self.send_json("grade attempt", request).await
    }
}
