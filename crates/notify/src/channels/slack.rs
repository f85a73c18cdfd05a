//! Slack webhook notification channel.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::ChannelError;
use crate::events::NotifyEvent;
use crate::NotifyChannel;

/// Environment variable for Slack webhook URL.
pub const ENV_SLACK_WEBHOOK_URL: &str = "SLACK_WEBHOOK_URL";

/// Fallback wait when Slack rate limits without a `Retry-After` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 30;

/// Slack webhook notification channel.
pub struct SlackChannel {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl SlackChannel {
    /// Create a new Slack channel from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let webhook_url = std::env::var(ENV_SLACK_WEBHOOK_URL)
            .ok()
            .filter(|url| !url.trim().is_empty());

        if webhook_url.is_some() {
            debug!("Slack notifications enabled");
        } else {
            debug!("Slack notifications disabled (SLACK_WEBHOOK_URL not set)");
        }

        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    /// Create a Slack channel with a specific webhook URL.
    #[must_use]
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: Some(webhook_url.into()),
            client: reqwest::Client::new(),
        }
    }

    /// Format an event as a Slack webhook payload.
    fn format_payload(event: &NotifyEvent) -> SlackPayload {
        let severity = event.severity();
        let fields = Self::format_fields(event)
            .into_iter()
            .map(|(title, value)| SlackField {
                title,
                value,
                short: true,
            })
            .collect();

        let attachment = SlackAttachment {
            fallback: event.title(),
            color: severity.color().to_string(),
            author_name: Some("Alert Manager".to_string()),
            title: event.title(),
            text: Self::format_description(event),
            fields,
            footer: Some(format!(
                "{} | {}",
                severity.as_str(),
                event.timestamp().format("%Y-%m-%d %H:%M:%S UTC")
            )),
            ts: Some(event.timestamp().timestamp()),
        };

        SlackPayload {
            attachments: vec![attachment],
        }
    }

    fn format_description(event: &NotifyEvent) -> String {
        match event {
            NotifyEvent::PolicyViolation {
                summary,
                evidence_count,
                ..
            } => {
                if *evidence_count > 1 {
                    format!("{summary}\n_{evidence_count} pieces of evidence_")
                } else {
                    summary.clone()
                }
            }
            NotifyEvent::Test { message, .. } => message.clone(),
        }
    }

    fn format_fields(event: &NotifyEvent) -> Vec<(String, String)> {
        match event {
            NotifyEvent::PolicyViolation {
                alert_id,
                policy_name,
                severity,
                entity_kind,
                entity_name,
                namespace,
                cluster_id,
                lifecycle_stage,
                ..
            } => {
                let mut fields = vec![
                    ("Policy".to_string(), policy_name.clone()),
                    ("Severity".to_string(), severity.as_str().to_string()),
                    (entity_kind.clone(), entity_name.clone()),
                    ("Stage".to_string(), lifecycle_stage.clone()),
                ];
                if let Some(namespace) = namespace {
                    fields.push(("Namespace".to_string(), namespace.clone()));
                }
                if let Some(cluster_id) = cluster_id {
                    fields.push(("Cluster".to_string(), cluster_id.clone()));
                }
                fields.push(("Alert ID".to_string(), alert_id.clone()));
                fields
            }
            NotifyEvent::Test { .. } => vec![],
        }
    }
}

#[async_trait]
impl NotifyChannel for SlackChannel {
    fn name(&self) -> &'static str {
        "slack"
    }

    fn enabled(&self) -> bool {
        self.webhook_url.is_some()
    }

    async fn send(&self, event: &NotifyEvent) -> Result<(), ChannelError> {
        let webhook_url = self
            .webhook_url
            .as_ref()
            .ok_or_else(|| ChannelError::NotConfigured(ENV_SLACK_WEBHOOK_URL.to_string()))?;

        let payload = Self::format_payload(event);

        debug!(channel = "slack", event_type = ?event.title(), "Sending notification");

        let response = self.client.post(webhook_url).json(&payload).send().await?;
        let status = response.status();

        if status.is_success() {
            debug!(channel = "slack", "Notification sent successfully");
            return Ok(());
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            warn!(channel = "slack", retry_after_secs, "Slack webhook rate limited");
            return Err(ChannelError::RateLimited { retry_after_secs });
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            channel = "slack",
            status = %status,
            body = %body,
            "Slack webhook request failed"
        );

        Err(ChannelError::Rejected {
            channel: "slack",
            status: status.as_u16(),
            body,
        })
    }
}

// =============================================================================
// Slack API types
// =============================================================================

#[derive(Debug, Serialize)]
struct SlackPayload {
    attachments: Vec<SlackAttachment>,
}

#[derive(Debug, Serialize)]
struct SlackAttachment {
    fallback: String,
    color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    author_name: Option<String>,
    title: String,
    text: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<SlackField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    footer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ts: Option<i64>,
}

#[derive(Debug, Serialize)]
struct SlackField {
    title: String,
    value: String,
    short: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Severity;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn violation() -> NotifyEvent {
        NotifyEvent::PolicyViolation {
            alert_id: "a-1".to_string(),
            policy_id: "p-1".to_string(),
            policy_name: "Shell Spawned".to_string(),
            severity: Severity::High,
            entity_kind: "Deployment".to_string(),
            entity_name: "api".to_string(),
            namespace: Some("prod".to_string()),
            cluster_id: None,
            lifecycle_stage: "RUNTIME".to_string(),
            summary: "Binary '/bin/sh' executed".to_string(),
            evidence_count: 3,
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_payload_for_policy_violation() {
        let payload = serde_json::to_value(SlackChannel::format_payload(&violation())).unwrap();
        let attachment = &payload["attachments"][0];

        assert_eq!(attachment["title"], "Policy Violation: Shell Spawned on Deployment api");
        assert_eq!(attachment["color"], "#f39c12");
        assert_eq!(
            attachment["text"],
            "Binary '/bin/sh' executed\n_3 pieces of evidence_"
        );
        assert_eq!(attachment["footer"], "High | 2024-06-01 09:00:00 UTC");

        let titles: Vec<&str> = attachment["fields"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["title"].as_str().unwrap())
            .collect();
        assert_eq!(
            titles,
            ["Policy", "Severity", "Deployment", "Stage", "Namespace", "Alert ID"]
        );
    }

    #[test]
    fn test_unconfigured_channel_is_disabled() {
        let channel = SlackChannel {
            webhook_url: None,
            client: reqwest::Client::new(),
        };
        assert!(!channel.enabled());
    }

    #[tokio::test]
    async fn test_send_posts_to_webhook() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(json!({
                "attachments": [{ "author_name": "Alert Manager" }]
            })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let channel = SlackChannel::new(format!("{}/hook", server.uri()));
        channel.send(&violation()).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_reports_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "12"))
            .mount(&server)
            .await;

        let channel = SlackChannel::new(server.uri());
        let err = channel.send(&violation()).await.unwrap_err();
        assert!(matches!(
            err,
            ChannelError::RateLimited {
                retry_after_secs: 12
            }
        ));
    }

    #[tokio::test]
    async fn test_send_reports_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no_service"))
            .mount(&server)
            .await;

        let channel = SlackChannel::new(server.uri());
        let err = channel.send(&violation()).await.unwrap_err();
        assert_eq!(err.to_string(), "slack returned 404: no_service");
    }
}
