//! Flight SQL transport: credential handshake and retry-governed query dispatch.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use arrow_flight::decode::FlightRecordBatchStream;
use arrow_flight::error::FlightError;
use arrow_flight::flight_service_client::FlightServiceClient;
use arrow_flight::sql::{CommandStatementQuery, ProstMessageExt};
use arrow_flight::{FlightDescriptor, HandshakeRequest};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use prost::Message;
use tonic::metadata::{AsciiMetadataValue, MetadataMap};
use tonic::transport::Channel;
use tonic::{Request, Status};
use tracing::info;

use crate::error::{ClientError, Result};
use crate::middleware::CallStage;
use crate::retry::{retry_with_backoff, RetryPolicy};

fn apply_before(stages: &[Arc<dyn CallStage>], metadata: &mut MetadataMap) {
    for stage in stages {
        stage.before_send(metadata);
    }
}

fn apply_after(stages: &[Arc<dyn CallStage>], metadata: &MetadataMap) {
    for stage in stages {
        stage.after_receive(metadata);
    }
}

/// Performs the one-time basic-credential exchange, returning the bearer
/// token the server hands back in the `authorization` response header.
///
/// Any failure here is fatal to client construction; the retry policy covers
/// the query path only.
pub(crate) async fn handshake(
    client: &mut FlightServiceClient<Channel>,
    app_id: &str,
    api_key: &str,
    stages: &[Arc<dyn CallStage>],
) -> Result<String> {
    let requests = futures::stream::iter(vec![HandshakeRequest {
        protocol_version: 0,
        payload: Bytes::new(),
    }]);

    let mut request = Request::new(requests);
    let basic = BASE64.encode(format!("{app_id}:{api_key}"));
    let credential = AsciiMetadataValue::try_from(format!("Basic {basic}")).map_err(|_| {
        ClientError::AuthenticationFailed("credential is not a valid header value".to_string())
    })?;
    request.metadata_mut().insert("authorization", credential);
    apply_before(stages, request.metadata_mut());

    let response = client
        .handshake(request)
        .await
        .map_err(|status| ClientError::AuthenticationFailed(format!("handshake rejected: {status}")))?;

    let (metadata, mut body, _extensions) = response.into_parts();
    apply_after(stages, &metadata);

    // drain the single-message response stream so late errors surface here
    while let Some(_message) = body.message().await.map_err(|status| {
        ClientError::AuthenticationFailed(format!("handshake stream failed: {status}"))
    })? {}

    let value = metadata.get("authorization").ok_or_else(|| {
        ClientError::AuthenticationFailed(
            "handshake response carried no bearer credential".to_string(),
        )
    })?;
    let value = value.to_str().map_err(|_| {
        ClientError::AuthenticationFailed("bearer credential is not valid ASCII".to_string())
    })?;
    let token = value.strip_prefix("Bearer ").ok_or_else(|| {
        ClientError::AuthenticationFailed(format!(
            "unexpected credential scheme in handshake response: '{value}'"
        ))
    })?;

    info!("credential handshake complete");
    Ok(token.to_string())
}

/// Dispatches statements and redeems result tickets under the retry policy.
pub(crate) struct FlightQueryExecutor {
    client: FlightServiceClient<Channel>,
    stages: Arc<Vec<Arc<dyn CallStage>>>,
    policy: RetryPolicy,
}

impl FlightQueryExecutor {
    pub fn new(
        client: FlightServiceClient<Channel>,
        stages: Arc<Vec<Arc<dyn CallStage>>>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            client,
            stages,
            policy,
        }
    }

    /// Executes a SQL statement and returns the decoded result stream.
    pub async fn execute(&self, sql: &str) -> Result<QueryResultStream> {
        if sql.is_empty() {
            return Err(ClientError::invalid_argument("no SQL query provided"));
        }

        info!(sql = %sql, "executing query");

        let stream = retry_with_backoff(&self.policy, "execute query", || {
            // a fresh handle per attempt; nothing carries over from a failed try
            let mut client = self.client.clone();
            let stages = Arc::clone(&self.stages);
            let sql = sql.to_string();
            async move { Self::attempt(&mut client, &stages, &sql).await }
        })
        .await?;

        Ok(QueryResultStream { inner: stream })
    }

    /// One attempt: obtain the flight info for the statement, then redeem the
    /// first endpoint's ticket for the data stream.
    async fn attempt(
        client: &mut FlightServiceClient<Channel>,
        stages: &[Arc<dyn CallStage>],
        sql: &str,
    ) -> std::result::Result<FlightRecordBatchStream, Status> {
        let command = CommandStatementQuery {
            query: sql.to_string(),
            transaction_id: None,
        };
        let descriptor = FlightDescriptor::new_cmd(command.as_any().encode_to_vec());

        let mut request = Request::new(descriptor);
        apply_before(stages, request.metadata_mut());
        let response = client.get_flight_info(request).await?;
        apply_after(stages, response.metadata());
        let info = response.into_inner();

        let ticket = info
            .endpoint
            .into_iter()
            .next()
            .and_then(|endpoint| endpoint.ticket)
            .ok_or_else(|| {
                Status::failed_precondition("query response contained no redeemable ticket")
            })?;

        let mut request = Request::new(ticket);
        apply_before(stages, request.metadata_mut());
        let response = client.do_get(request).await?;
        apply_after(stages, response.metadata());

        let data = response
            .into_inner()
            .map_err(|status| FlightError::Tonic(Box::new(status)));
        Ok(FlightRecordBatchStream::new_from_flight_data(data))
    }
}

/// Lazy, forward-only stream of result batches for a single query.
///
/// The stream is finite and not restartable; re-issue the query to read the
/// results again. The schema is available once the server has delivered it,
/// which is guaranteed after the stream ends.
pub struct QueryResultStream {
    inner: FlightRecordBatchStream,
}

impl QueryResultStream {
    /// Schema of the result set, if the stream has delivered it yet.
    pub fn schema(&self) -> Option<&SchemaRef> {
        self.inner.schema()
    }
}

impl std::fmt::Debug for QueryResultStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResultStream")
            .field("schema", &self.inner.schema())
            .finish_non_exhaustive()
    }
}

impl Stream for QueryResultStream {
    type Item = Result<RecordBatch>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(batch))) => Poll::Ready(Some(Ok(batch))),
            Poll::Ready(Some(Err(err))) => Poll::Ready(Some(Err(stream_error(err)))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

fn stream_error(err: FlightError) -> ClientError {
    match err {
        FlightError::Tonic(status) => ClientError::Status(status),
        FlightError::Arrow(e) => ClientError::Arrow(e),
        other => ClientError::Arrow(arrow::error::ArrowError::ExternalError(Box::new(other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::flight_channel_endpoint;

    fn lazy_executor(max_retries: u32) -> FlightQueryExecutor {
        let channel = flight_channel_endpoint("grpc+tcp://localhost:50051")
            .unwrap()
            .connect_lazy();
        FlightQueryExecutor::new(
            FlightServiceClient::new(channel),
            Arc::new(Vec::new()),
            RetryPolicy::new(max_retries),
        )
    }

    #[tokio::test]
    async fn test_empty_sql_rejected_before_any_network_activity() {
        let executor = lazy_executor(3);
        let result = executor.execute("").await;
        assert!(matches!(result, Err(ClientError::InvalidArgument(_))));
    }
}
