use std::time::Duration;

use reqwest::{Client, Response};

use super::error::ApiError;
use super::types::{Profile, RawSubmissionPage, SubmissionPage};

pub const DEFAULT_API_URL: &str = "https://alfa-leetcode-api.onrender.com";

/// Operations the orchestrator needs from the submission service.
#[allow(async_fn_in_trait)]
pub trait SubmissionApi {
    async fn recent_submissions(&self, user: &str, limit: u32) -> Result<SubmissionPage, ApiError>;

    async fn profile(&self, user: &str) -> Result<Profile, ApiError>;

    /// Cheapest request that proves the service is awake.
    async fn probe(&self) -> Result<(), ApiError>;
}

pub struct SubmissionClient {
    client: Client,
    base_url: String,
}

impl SubmissionClient {
    pub fn new(
        base_url: String,
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(base_url: String) -> Result<Self, ApiError> {
        Self::new(base_url, Duration::from_secs(10), Duration::from_secs(60))
    }
}

impl SubmissionApi for SubmissionClient {
    async fn recent_submissions(&self, user: &str, limit: u32) -> Result<SubmissionPage, ApiError> {
        let url = format!("{}/{user}/acSubmission", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("limit", limit)])
            .send()
            .await?;
        let raw = error_for_status(response)
            .await?
            .json::<RawSubmissionPage>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))?;
        Ok(raw.into())
    }

    async fn profile(&self, user: &str) -> Result<Profile, ApiError> {
        let url = format!("{}/{user}", self.base_url);
        let response = self.client.get(&url).send().await?;
        error_for_status(response)
            .await?
            .json::<Profile>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn probe(&self) -> Result<(), ApiError> {
        let response = self.client.get(format!("{}/", self.base_url)).send().await?;
        error_for_status(response).await?;
        Ok(())
    }
}

/// Maps non-success responses to [`ApiError`], reading `retry-after` on 429.
pub(crate) async fn error_for_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| secs.saturating_mul(1000))
            .unwrap_or(1000);
        return Err(ApiError::RateLimited {
            retry_after_ms: retry_after,
        });
    }

    if !status.is_success() {
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unknown error".to_string());
        return Err(ApiError::Status {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_recent_submissions() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ada/acSubmission"))
            .and(query_param("limit", "20"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "count": 1,
                "submission": [{"titleSlug": "two-sum", "timestamp": "1700000000", "statusDisplay": "Accepted"}]
            })))
            .mount(&server)
            .await;

        let client = SubmissionClient::with_base_url(server.uri()).unwrap();
        let page = client.recent_submissions("ada", 20).await.unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.items[0].slug, "two-sum");
    }

    #[tokio::test]
    async fn rate_limit_reads_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ada"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
            .mount(&server)
            .await;

        let client = SubmissionClient::with_base_url(server.uri()).unwrap();
        let err = client.profile("ada").await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited { retry_after_ms: 3000 }));
    }

    #[tokio::test]
    async fn huge_retry_after_saturates() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ada"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "18446744073709552"))
            .mount(&server)
            .await;

        let client = SubmissionClient::with_base_url(server.uri()).unwrap();
        let err = client.profile("ada").await.unwrap_err();
        assert!(matches!(err, ApiError::RateLimited { retry_after_ms: u64::MAX }));
    }

    #[tokio::test]
    async fn service_unavailable_keeps_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(503).set_body_string("spinning up"))
            .mount(&server)
            .await;

        let client = SubmissionClient::with_base_url(format!("{}/", server.uri())).unwrap();
        let err = client.probe().await.unwrap_err();
        match err {
            ApiError::Status { status, message } => {
                assert_eq!(status, 503);
                assert_eq!(message, "spinning up");
            }
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn html_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/ada"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>waking</html>"))
            .mount(&server)
            .await;

        let client = SubmissionClient::with_base_url(server.uri()).unwrap();
        let err = client.profile("ada").await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }
}
