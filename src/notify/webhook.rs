use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;

use super::{Categorized, Notifier};
use crate::api::ApiError;
use crate::api::client::error_for_status;
use crate::backlog::WorkItem;
use crate::error::DrillError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WebhookPayload<'a> {
    sent_at: DateTime<Utc>,
    batch: &'a [WorkItem],
    unfinished: &'a [WorkItem],
    fresh: &'a [WorkItem],
}

/// Posts the batch as JSON to a configured URL.
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String, request_timeout: Duration) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self { client, url })
    }
}

impl Notifier for WebhookNotifier {
    async fn send(&self, batch: &[WorkItem], categorized: &Categorized) -> Result<(), DrillError> {
        let payload = WebhookPayload {
            sent_at: Utc::now(),
            batch,
            unfinished: &categorized.unfinished,
            fresh: &categorized.fresh,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(ApiError::from)?;
        error_for_status(response).await?;
        tracing::info!(items = batch.len(), "batch delivered to webhook");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlog::Difficulty;
    use crate::error::ErrorKind;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn item(slug: &str) -> WorkItem {
        WorkItem {
            slug: slug.into(),
            display_name: slug.to_uppercase(),
            difficulty: Difficulty::Hard,
            group_id: "graphs".into(),
        }
    }

    #[tokio::test]
    async fn posts_batch_as_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_partial_json(serde_json::json!({
                "batch": [{"slug": "word-ladder", "difficulty": "Hard"}],
                "fresh": [{"slug": "word-ladder"}],
                "unfinished": []
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier =
            WebhookNotifier::new(format!("{}/hook", server.uri()), Duration::from_secs(5)).unwrap();
        let batch = vec![item("word-ladder")];
        let categorized = Categorized {
            unfinished: vec![],
            fresh: batch.clone(),
        };
        notifier.send(&batch, &categorized).await.unwrap();
    }

    #[tokio::test]
    async fn rejected_delivery_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("mailer down"))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri(), Duration::from_secs(5)).unwrap();
        let err = notifier
            .send(&[item("a")], &Categorized::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TransientNetwork);
        assert!(err.to_string().contains("mailer down"));
    }
}
