//! Generation backend client.
//!
//! Two endpoints, both JSON: a POST that enqueues a generation job and
//! returns a task id, and a GET that reports the job's status (plus result
//! tracks once a success-class status is reached). Non-2xx responses and
//! transport failures surface as distinct [`ApiError`] variants so the
//! orchestrator can report them separately.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::track::Track;

pub const GENERATE_PATH: &str = "/webhook/music-generate";
pub const STATUS_PATH: &str = "/webhook/music-status";

// ── Wire types ────────────────────────────────────────────────────────────────

/// Generation model selector. The catalogue is fixed; `V5` is the current
/// flagship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Model {
    #[default]
    V5,
    #[serde(rename = "V4.5+")]
    V45Plus,
    #[serde(rename = "V4.5")]
    V45,
    V4,
}

impl Model {
    pub const ALL: [Model; 4] = [Model::V5, Model::V45Plus, Model::V45, Model::V4];

    pub fn label(self) -> &'static str {
        match self {
            Self::V5 => "V5",
            Self::V45Plus => "V4.5+",
            Self::V45 => "V4.5",
            Self::V4 => "V4",
        }
    }

    /// Badge shown next to the label in the model selector, if any.
    pub fn badge(self) -> Option<&'static str> {
        match self {
            Self::V5 => Some("Latest"),
            _ => None,
        }
    }

    pub fn next(self) -> Self {
        match self {
            Self::V5 => Self::V45Plus,
            Self::V45Plus => Self::V45,
            Self::V45 => Self::V4,
            Self::V4 => Self::V5,
        }
    }
}

/// Vocal gender hint, meaningful only in custom mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VocalGender {
    #[serde(rename = "f")]
    #[default]
    Female,
    #[serde(rename = "m")]
    Male,
}

impl VocalGender {
    pub fn label(self) -> &'static str {
        match self {
            Self::Female => "Female",
            Self::Male => "Male",
        }
    }

    pub fn toggle(self) -> Self {
        match self {
            Self::Female => Self::Male,
            Self::Male => Self::Female,
        }
    }
}

/// Body of the generation POST. Style, title, and vocal gender are only sent
/// in custom mode; negative tags may accompany any request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub prompt: String,
    pub custom_mode: bool,
    pub instrumental: bool,
    pub model: Model,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vocal_gender: Option<VocalGender>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_tags: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    /// Absent when the backend accepted the request but produced no job —
    /// the orchestrator treats that as a submission failure.
    #[serde(default)]
    pub task_id: Option<String>,
}

/// Backend task status. `FIRST_SUCCESS` means the first of possibly several
/// artifacts is ready. Unknown values are treated as still pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Success,
    FirstSuccess,
    Error,
    Failed,
    #[serde(other)]
    Pending,
}

impl TaskStatus {
    /// Full or first-stage success.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success | Self::FirstSuccess)
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Self::Error | Self::Failed)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusResponse {
    pub status: TaskStatus,
    #[serde(default)]
    pub tracks: Vec<Track>,
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned HTTP {0}")]
    Status(reqwest::StatusCode),
}

// ── Client ────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Enqueue a generation job. A non-2xx response is a submission failure.
    pub async fn submit(&self, request: &GenerateRequest) -> Result<SubmitResponse, ApiError> {
        let url = format!("{}{}", self.base_url, GENERATE_PATH);
        let response = self.http.post(&url).json(request).send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }
        Ok(response.json().await?)
    }

    /// One status check for `task_id`. A non-2xx response is a poll failure.
    pub async fn check_status(&self, task_id: &str) -> Result<StatusResponse, ApiError> {
        let url = format!("{}{}", self.base_url, STATUS_PATH);
        let response = self
            .http
            .get(&url)
            .query(&[("taskId", task_id)])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status()));
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_omits_custom_fields_when_unset() {
        let req = GenerateRequest {
            prompt: "lofi beats".into(),
            custom_mode: false,
            instrumental: true,
            model: Model::V5,
            style: None,
            title: None,
            vocal_gender: None,
            negative_tags: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["prompt"], "lofi beats");
        assert_eq!(json["customMode"], false);
        assert_eq!(json["model"], "V5");
        assert!(json.get("style").is_none());
        assert!(json.get("title").is_none());
        assert!(json.get("vocalGender").is_none());
    }

    #[test]
    fn test_request_custom_mode_fields() {
        let req = GenerateRequest {
            prompt: "a song".into(),
            custom_mode: true,
            instrumental: false,
            model: Model::V45Plus,
            style: Some("Jazz".into()),
            title: Some("Blue Hour".into()),
            vocal_gender: Some(VocalGender::Male),
            negative_tags: Some("metal".into()),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "V4.5+");
        assert_eq!(json["style"], "Jazz");
        assert_eq!(json["vocalGender"], "m");
        assert_eq!(json["negativeTags"], "metal");
    }

    #[test]
    fn test_status_parsing() {
        let ok: StatusResponse =
            serde_json::from_str(r#"{"status": "SUCCESS", "tracks": [{"id": "t1"}]}"#).unwrap();
        assert_eq!(ok.status, TaskStatus::Success);
        assert_eq!(ok.tracks.len(), 1);

        let first: StatusResponse =
            serde_json::from_str(r#"{"status": "FIRST_SUCCESS", "tracks": []}"#).unwrap();
        assert!(first.status.is_success());

        let failed: StatusResponse = serde_json::from_str(r#"{"status": "FAILED"}"#).unwrap();
        assert!(failed.status.is_failure());
        assert!(failed.tracks.is_empty());
    }

    #[test]
    fn test_unknown_status_is_pending() {
        let r: StatusResponse = serde_json::from_str(r#"{"status": "PENDING"}"#).unwrap();
        assert_eq!(r.status, TaskStatus::Pending);
        let r: StatusResponse = serde_json::from_str(r#"{"status": "QUEUED_WEIRDLY"}"#).unwrap();
        assert_eq!(r.status, TaskStatus::Pending);
        assert!(!r.status.is_success());
        assert!(!r.status.is_failure());
    }

    #[test]
    fn test_submit_response_task_id_optional() {
        let ok: SubmitResponse = serde_json::from_str(r#"{"taskId": "job-7"}"#).unwrap();
        assert_eq!(ok.task_id.as_deref(), Some("job-7"));
        let missing: SubmitResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert!(missing.task_id.is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = ApiClient::new("http://127.0.0.1:5678/");
        assert_eq!(client.base_url(), "http://127.0.0.1:5678");
    }
}
