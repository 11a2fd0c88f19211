//! Client construction and the public operation surface.

use std::sync::Arc;

use arrow_flight::flight_service_client::FlightServiceClient;
use tracing::info;
use url::Url;

use crate::config::{
    default_user_agent, flight_channel_endpoint, normalize_flight_address, EndpointDefaults,
};
use crate::error::{ClientError, Result};
use crate::flight::{handshake, FlightQueryExecutor, QueryResultStream};
use crate::middleware::{BearerTokenStage, CallStage, UserAgentStage};
use crate::refresh::{RefreshClient, RefreshOptions};
use crate::retry::RetryPolicy;

const DEFAULT_MAX_RETRIES: u32 = 3;

/// Client for executing SQL against a Strake runtime and triggering dataset
/// acceleration refreshes.
///
/// One instance owns one gRPC channel and, when an API key is configured, one
/// bearer credential obtained by a single handshake at construction time. The
/// instance is not designed for concurrent calls; dropping it releases the
/// channel and invalidates outstanding result streams.
pub struct Client {
    executor: FlightQueryExecutor,
    refresh: RefreshClient,
}

impl Client {
    /// Returns a new builder with local defaults.
    pub fn builder() -> Result<ClientBuilder> {
        ClientBuilder::new()
    }

    /// Executes a SQL query, returning a forward-only stream of result
    /// batches.
    ///
    /// Dispatch is wrapped in the configured retry policy: transient
    /// transport statuses are retried with Fibonacci backoff, everything else
    /// aborts immediately.
    pub async fn query(&self, sql: &str) -> Result<QueryResultStream> {
        self.executor.execute(sql).await
    }

    /// Refreshes an accelerated dataset using its configured acceleration
    /// settings.
    pub async fn refresh_dataset(&self, dataset: &str) -> Result<()> {
        self.refresh.refresh(dataset, None).await
    }

    /// Refreshes an accelerated dataset, overriding acceleration settings
    /// with the supplied options.
    pub async fn refresh_dataset_with_options(
        &self,
        dataset: &str,
        options: &RefreshOptions,
    ) -> Result<()> {
        self.refresh.refresh(dataset, Some(options)).await
    }
}

/// Builder for [`Client`].
///
/// All construction-time validation happens here; the constructed client
/// trusts its configuration.
pub struct ClientBuilder {
    app_id: Option<String>,
    api_key: Option<String>,
    user_agent: String,
    flight_address: Url,
    http_address: Url,
    max_retries: u32,
    defaults: EndpointDefaults,
}

impl ClientBuilder {
    fn new() -> Result<Self> {
        let defaults = EndpointDefaults::resolve()?;
        Ok(Self {
            app_id: None,
            api_key: None,
            user_agent: default_user_agent(),
            flight_address: defaults.local_flight.clone(),
            http_address: defaults.local_http.clone(),
            max_retries: DEFAULT_MAX_RETRIES,
            defaults,
        })
    }

    /// Sets the flight address the client queries.
    pub fn with_flight_address(mut self, flight_address: Url) -> Self {
        self.flight_address = flight_address;
        self
    }

    /// Sets the HTTP address used for dataset refreshes.
    pub fn with_http_address(mut self, http_address: Url) -> Self {
        self.http_address = http_address;
        self
    }

    /// Sets the API key, format `"<appId>|<secret>"`.
    ///
    /// The application id is derived from the part before the separator.
    pub fn with_api_key(mut self, api_key: &str) -> Result<Self> {
        if api_key.is_empty() {
            return Err(ClientError::invalid_argument("api key can't be empty"));
        }
        match api_key.split('|').collect::<Vec<_>>()[..] {
            [app_id, secret] if !app_id.is_empty() && !secret.is_empty() => {
                self.app_id = Some(app_id.to_string());
                self.api_key = Some(api_key.to_string());
                Ok(self)
            }
            _ => Err(ClientError::invalid_argument(
                "api key is invalid, expected '<appId>|<secret>'",
            )),
        }
    }

    /// Overrides the user-agent string attached to every outbound call.
    pub fn with_user_agent(mut self, user_agent: &str) -> Result<Self> {
        if user_agent.is_empty() {
            return Err(ClientError::invalid_argument("user agent can't be empty"));
        }
        self.user_agent = user_agent.to_string();
        Ok(self)
    }

    /// Points both addresses at the managed Strake cloud service.
    pub fn with_cloud(mut self) -> Self {
        self.flight_address = self.defaults.cloud_flight.clone();
        self.http_address = self.defaults.cloud_http.clone();
        self
    }

    /// Sets the number of retries on top of the first query attempt.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Connects the channel and, when an API key is configured, performs the
    /// credential handshake.
    pub async fn build(self) -> Result<Client> {
        let address = normalize_flight_address(&self.flight_address)?;
        info!(address = %address, "connecting flight channel");
        let channel = flight_channel_endpoint(&address)?.connect().await?;
        let mut flight = FlightServiceClient::new(channel);

        let mut stages: Vec<Arc<dyn CallStage>> =
            vec![Arc::new(UserAgentStage::new(&self.user_agent)?)];

        if let (Some(app_id), Some(api_key)) = (&self.app_id, &self.api_key) {
            let token = handshake(&mut flight, app_id, api_key, &stages).await?;
            stages.push(Arc::new(BearerTokenStage::new(&token)?));
        }

        let executor = FlightQueryExecutor::new(
            flight,
            Arc::new(stages),
            RetryPolicy::new(self.max_retries),
        );
        let refresh = RefreshClient::new(self.http_address, self.user_agent)?;

        Ok(Client { executor, refresh })
    }
}
