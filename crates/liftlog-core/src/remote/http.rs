//! HTTP implementation of the remote store client.

use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::RemoteConfig;
use crate::error::{Error, Result};
use crate::models::{normalize_session_id, PersonalRecord, WorkoutSession};
use crate::util::compact_text;

use super::{session_payload, RecordRow, RemoteClient, SessionRow};

/// Authenticated `reqwest` client for the LiftLog collection API.
#[derive(Clone)]
pub struct HttpRemoteClient {
    config: RemoteConfig,
    client: reqwest::Client,
}

impl HttpRemoteClient {
    /// Build a client from a validated configuration.
    pub fn new(config: RemoteConfig) -> Result<Self> {
        Ok(Self {
            config,
            client: reqwest::Client::builder().build()?,
        })
    }

    fn url(&self, account_id: &str, path: &str) -> String {
        format!(
            "{}/v1/accounts/{account_id}/{path}",
            self.config.base_url
        )
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(Error::Remote(parse_api_error(status, &body)))
    }
}

impl RemoteClient for HttpRemoteClient {
    async fn fetch_sessions(&self, account_id: &str) -> Result<Vec<WorkoutSession>> {
        let response = self
            .client
            .get(self.url(account_id, "sessions"))
            .bearer_auth(&self.config.api_token)
            .header("Accept", "application/json")
            .send()
            .await?;
        let rows = Self::check(response).await?.json::<Vec<SessionRow>>().await?;
        Ok(rows.into_iter().filter_map(SessionRow::normalize).collect())
    }

    async fn upsert_session(&self, account_id: &str, session: &WorkoutSession) -> Result<()> {
        let response = self
            .client
            .put(self.url(
                account_id,
                &format!("sessions/{}", session.canonical_id()),
            ))
            .bearer_auth(&self.config.api_token)
            .json(&session_payload(session))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_session(&self, account_id: &str, session_id: &str) -> Result<()> {
        let canonical = normalize_session_id(session_id);
        let response = self
            .client
            .delete(self.url(account_id, &format!("sessions/{canonical}")))
            .bearer_auth(&self.config.api_token)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn fetch_records(&self, account_id: &str) -> Result<Vec<PersonalRecord>> {
        let response = self
            .client
            .get(self.url(account_id, "records"))
            .bearer_auth(&self.config.api_token)
            .header("Accept", "application/json")
            .send()
            .await?;
        let rows = Self::check(response).await?.json::<Vec<RecordRow>>().await?;
        Ok(rows
            .into_iter()
            .filter_map(|row| row.normalize(account_id))
            .collect())
    }

    async fn upsert_record(&self, account_id: &str, record: &PersonalRecord) -> Result<()> {
        let response = self
            .client
            .put(self.url(
                account_id,
                &format!("records/{}/{}", record.exercise_id, record.metric),
            ))
            .bearer_auth(&self.config.api_token)
            .json(record)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_api_error_prefers_structured_message() {
        let body = r#"{"message": "token expired"}"#;
        assert_eq!(
            parse_api_error(StatusCode::UNAUTHORIZED, body),
            "token expired (401)"
        );
    }

    #[test]
    fn parse_api_error_falls_back_to_body_then_status() {
        assert_eq!(
            parse_api_error(StatusCode::BAD_GATEWAY, "upstream down"),
            "upstream down (502)"
        );
        assert_eq!(parse_api_error(StatusCode::BAD_GATEWAY, "  "), "HTTP 502");
    }

    #[test]
    fn urls_are_account_scoped() {
        let config = RemoteConfig::new("https://api.example.com", "token").unwrap();
        let client = HttpRemoteClient::new(config).unwrap();
        assert_eq!(
            client.url("acct-1", "sessions"),
            "https://api.example.com/v1/accounts/acct-1/sessions"
        );
    }
}
