use crate::domain::models::{Session, SessionStats, SessionWithTask, TaskDetails};
use crate::infrastructure::command_log::CommandLog;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

/// Remote counterpart of the session recorder, as served under
/// `{base}/sessions`. The bearer token identifies the user.
#[async_trait]
pub trait SessionApiClient: Send + Sync {
    async fn log_session(&self, task_id: &str, duration_seconds: u32)
        -> Result<Session, InfraError>;
    async fn list_sessions(&self) -> Result<Vec<SessionWithTask>, InfraError>;
    async fn get_stats(&self) -> Result<SessionStats, InfraError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestSessionApiClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogSessionRequest<'a> {
    task_id: &'a str,
    duration: u32,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    message: Option<String>,
    data: Option<T>,
    stats: Option<SessionStats>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TaskField {
    Populated {
        #[serde(rename = "_id")]
        id: String,
        title: String,
        description: Option<String>,
    },
    Id(String),
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionPayload {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    user_id: String,
    task_id: Option<TaskField>,
    duration: u32,
    #[serde(default)]
    is_completed: bool,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl SessionPayload {
    fn into_session_with_task(self) -> SessionWithTask {
        let (task_id, task) = match self.task_id {
            Some(TaskField::Populated {
                id,
                title,
                description,
            }) => (id, Some(TaskDetails { title, description })),
            Some(TaskField::Id(id)) => (id, None),
            None => (String::new(), None),
        };
        SessionWithTask {
            session: Session {
                id: self.id,
                user_id: self.user_id,
                task_id,
                duration_minutes: self.duration,
                is_completed: self.is_completed,
                completed_at: self.completed_at,
                created_at: self.created_at,
            },
            task,
        }
    }
}

impl ReqwestSessionApiClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, InfraError> {
        let base_url = Url::parse(base_url.trim()).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid session api base url: {error}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(InfraError::InvalidConfig(
                "session api base url cannot be a base".to_string(),
            ));
        }
        Ok(Self {
            client: Client::new(),
            base_url,
            token: token
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
        })
    }

    fn endpoint(&self, path: &[&str]) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                InfraError::InvalidConfig("session api base url cannot be a base".to_string())
            })?;
            segments.pop_if_empty();
            segments.extend(path);
        }
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.as_deref() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read_body(
        response: reqwest::Response,
        action: &str,
    ) -> Result<(StatusCode, String), InfraError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| {
                InfraError::Http(format!("failed reading {action} response: {error}"))
            })?;
        Ok((status, body))
    }
}

fn http_error(status: StatusCode, body: &str) -> InfraError {
    let message = serde_json::from_str::<Envelope<serde_json::Value>>(body)
        .ok()
        .and_then(|envelope| envelope.message);
    match message {
        Some(message) => InfraError::Http(format!(
            "session api error: http {}; {message}",
            status.as_u16()
        )),
        None if body.trim().is_empty() => {
            InfraError::Http(format!("session api error: http {}", status.as_u16()))
        }
        None => InfraError::Http(format!(
            "session api error: http {}; body={body}",
            status.as_u16()
        )),
    }
}

fn decode_envelope<T>(
    status: StatusCode,
    body: &str,
    action: &str,
) -> Result<Envelope<T>, InfraError>
where
    T: for<'de> Deserialize<'de>,
{
    if !status.is_success() {
        return Err(http_error(status, body));
    }
    let envelope: Envelope<T> = serde_json::from_str(body).map_err(|error| {
        InfraError::Http(format!("invalid {action} payload: {error}; body={body}"))
    })?;
    if !envelope.success {
        return Err(InfraError::Http(format!(
            "{action} rejected: {}",
            envelope.message.as_deref().unwrap_or("no message")
        )));
    }
    Ok(envelope)
}

fn decode_logged_session(status: StatusCode, body: &str) -> Result<Session, InfraError> {
    decode_envelope::<SessionPayload>(status, body, "log session")?
        .data
        .map(|payload| payload.into_session_with_task().session)
        .ok_or_else(|| InfraError::Http("log session response did not include data".to_string()))
}

fn decode_session_list(
    status: StatusCode,
    body: &str,
) -> Result<Vec<SessionWithTask>, InfraError> {
    Ok(decode_envelope::<Vec<SessionPayload>>(status, body, "list sessions")?
        .data
        .unwrap_or_default()
        .into_iter()
        .map(SessionPayload::into_session_with_task)
        .collect())
}

fn decode_stats(status: StatusCode, body: &str) -> Result<SessionStats, InfraError> {
    Ok(decode_envelope::<serde_json::Value>(status, body, "session stats")?
        .stats
        .unwrap_or_default())
}

#[async_trait]
impl SessionApiClient for ReqwestSessionApiClient {
    async fn log_session(
        &self,
        task_id: &str,
        duration_seconds: u32,
    ) -> Result<Session, InfraError> {
        if task_id.trim().is_empty() {
            return Err(InfraError::Validation("task_id must not be empty".to_string()));
        }
        if duration_seconds == 0 {
            return Err(InfraError::Validation("duration must be greater than zero".to_string()));
        }

        let endpoint = self.endpoint(&["sessions"])?;
        let request = LogSessionRequest {
            task_id: task_id.trim(),
            duration: duration_seconds,
        };
        let response = self
            .authorize(self.client.post(endpoint).json(&request))
            .send()
            .await
            .map_err(|error| {
                InfraError::Http(format!("network error while logging session: {error}"))
            })?;
        let (status, body) = Self::read_body(response, "log session").await?;
        decode_logged_session(status, &body)
    }

    async fn list_sessions(&self) -> Result<Vec<SessionWithTask>, InfraError> {
        let endpoint = self.endpoint(&["sessions"])?;
        let response = self
            .authorize(self.client.get(endpoint))
            .send()
            .await
            .map_err(|error| {
                InfraError::Http(format!("network error while listing sessions: {error}"))
            })?;
        let (status, body) = Self::read_body(response, "list sessions").await?;
        decode_session_list(status, &body)
    }

    async fn get_stats(&self) -> Result<SessionStats, InfraError> {
        let endpoint = self.endpoint(&["sessions", "stats"])?;
        let response = self
            .authorize(self.client.get(endpoint))
            .send()
            .await
            .map_err(|error| {
                InfraError::Http(format!("network error while fetching stats: {error}"))
            })?;
        let (status, body) = Self::read_body(response, "session stats").await?;
        decode_stats(status, &body)
    }
}

/// A failed stats fetch is shown as an empty period rather than an error.
pub fn stats_or_zero(result: Result<SessionStats, InfraError>, log: &CommandLog) -> SessionStats {
    match result {
        Ok(stats) => stats,
        Err(error) => {
            log.warn("get_stats", &format!("falling back to empty stats: {error}"));
            SessionStats::default()
        }
    }
}

/// A failed session fetch is shown as an empty history rather than an error.
pub fn sessions_or_empty(
    result: Result<Vec<SessionWithTask>, InfraError>,
    log: &CommandLog,
) -> Vec<SessionWithTask> {
    match result {
        Ok(sessions) => sessions,
        Err(error) => {
            log.warn("list_sessions", &format!("falling back to empty session list: {error}"));
            Vec::new()
        }
    }
}
