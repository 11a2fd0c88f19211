//! HTTP path for triggering dataset acceleration refreshes.

use serde::Serialize;
use tracing::info;
use url::Url;

use crate::config::USER_AGENT_HEADER;
use crate::error::{ClientError, Result};

/// How the runtime should rebuild the accelerated dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    Full,
    Append,
    Changes,
}

/// Optional parameters for a dataset refresh.
///
/// Absent fields are omitted from the JSON body so the runtime falls back to
/// the dataset's configured acceleration settings.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_sql: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_mode: Option<RefreshMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    refresh_jitter_max: Option<String>,
}

impl RefreshOptions {
    /// Overrides the SQL used to load data into the accelerated dataset.
    pub fn with_refresh_sql(mut self, refresh_sql: impl Into<String>) -> Self {
        self.refresh_sql = Some(refresh_sql.into());
        self
    }

    pub fn with_refresh_mode(mut self, refresh_mode: RefreshMode) -> Self {
        self.refresh_mode = Some(refresh_mode);
        self
    }

    /// Maximum jitter for the refresh schedule, e.g. `"10m"`.
    pub fn with_refresh_jitter_max(mut self, refresh_jitter_max: impl Into<String>) -> Self {
        self.refresh_jitter_max = Some(refresh_jitter_max.into());
        self
    }
}

/// Triggers server-side dataset refreshes over the runtime's HTTP endpoint.
pub(crate) struct RefreshClient {
    http: reqwest::Client,
    base: Url,
    user_agent: String,
}

impl RefreshClient {
    pub fn new(base: Url, user_agent: String) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base,
            user_agent,
        })
    }

    /// Triggers a refresh; `options`, when present, become the JSON body.
    ///
    /// Passing no options sends an empty body; passing options always sends a
    /// JSON body, even when every field is absent. Success is exactly HTTP
    /// 201; any other status surfaces with the raw response body attached.
    pub async fn refresh(&self, dataset: &str, options: Option<&RefreshOptions>) -> Result<()> {
        if dataset.is_empty() {
            return Err(ClientError::invalid_argument("no dataset name provided"));
        }

        let url = format!(
            "{}/v1/datasets/{dataset}/acceleration/refresh",
            self.base.as_str().trim_end_matches('/')
        );
        info!(dataset = %dataset, "triggering dataset refresh");

        let mut request = self
            .http
            .post(&url)
            .header(USER_AGENT_HEADER, &self.user_agent);
        if let Some(options) = options {
            request = request
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .json(options);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_connect() {
                ClientError::ServiceUnavailable {
                    endpoint: self.base.to_string(),
                    source: e,
                }
            } else {
                ClientError::Http(e)
            }
        })?;

        let status = response.status();
        if status != reqwest::StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::RefreshFailed { status, body });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn client_for(server: &MockServer) -> RefreshClient {
        let base = Url::parse(&server.uri()).unwrap();
        RefreshClient::new(base, "strake-client/0.1.0 (Linux/6.8 x86_64)".to_string()).unwrap()
    }

    #[tokio::test]
    async fn test_refresh_without_options_sends_no_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/datasets/taxi_trips/acceleration/refresh"))
            .and(header(USER_AGENT_HEADER, "strake-client/0.1.0 (Linux/6.8 x86_64)"))
            .and(body_string(""))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.refresh("taxi_trips", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_with_options_sends_only_present_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/datasets/taxi_trips/acceleration/refresh"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({
                "refresh_sql": "SELECT * FROM taxi_trips LIMIT 10",
                "refresh_mode": "full"
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let options = RefreshOptions::default()
            .with_refresh_sql("SELECT * FROM taxi_trips LIMIT 10")
            .with_refresh_mode(RefreshMode::Full);

        let client = client_for(&server).await;
        client.refresh("taxi_trips", Some(&options)).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_options_send_an_empty_object() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/datasets/ds/acceleration/refresh"))
            .and(body_json(serde_json::json!({})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client
            .refresh("ds", Some(&RefreshOptions::default()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_non_201_carries_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/datasets/missing/acceleration/refresh"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_string(r#"{"message":"dataset 'missing' not found"}"#),
            )
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.refresh("missing", None).await.unwrap_err();
        match err {
            ClientError::RefreshFailed { status, body } => {
                assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
                assert!(body.contains("\"message\":"));
            }
            other => panic!("expected RefreshFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_200_is_not_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.refresh("ds", None).await.unwrap_err();
        assert!(matches!(err, ClientError::RefreshFailed { status, .. } if status == 200));
    }

    #[tokio::test]
    async fn test_unreachable_runtime_names_the_endpoint() {
        // a port nothing listens on
        let base = Url::parse("http://127.0.0.1:1").unwrap();
        let client = RefreshClient::new(base, "ua".to_string()).unwrap();

        let err = client.refresh("ds", None).await.unwrap_err();
        match err {
            ClientError::ServiceUnavailable { endpoint, .. } => {
                assert!(endpoint.contains("127.0.0.1:1"));
            }
            other => panic!("expected ServiceUnavailable, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_dataset_rejected() {
        let base = Url::parse("http://localhost:8080").unwrap();
        let client = RefreshClient::new(base, "ua".to_string()).unwrap();
        let result = futures::executor::block_on(client.refresh("", None));
        assert!(matches!(result, Err(ClientError::InvalidArgument(_))));
    }
}
