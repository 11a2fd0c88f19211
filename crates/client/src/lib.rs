//! # strake-client
//!
//! Rust client SDK for Strake. Executes SQL queries over Arrow Flight SQL and
//! triggers dataset acceleration refreshes over the runtime's HTTP endpoint.
//!
//! A client is assembled from a validated builder, authenticates once at
//! construction time when an API key is configured, and reuses the resulting
//! bearer credential on every call. Query dispatch is wrapped in a retry
//! policy that classifies transport failures and waits on a Fibonacci
//! schedule between attempts.
//!
//! ```no_run
//! use futures::StreamExt;
//! use strake_client::Client;
//!
//! # async fn run() -> strake_client::Result<()> {
//! let client = Client::builder()?
//!     .with_api_key("my-app|my-secret")?
//!     .with_cloud()
//!     .build()
//!     .await?;
//!
//! let mut results = client.query("SELECT * FROM taxi_trips LIMIT 10").await?;
//! while let Some(batch) = results.next().await {
//!     println!("{} rows", batch?.num_rows());
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod error;
mod flight;
mod middleware;
mod refresh;
mod retry;

pub use client::{Client, ClientBuilder};
pub use config::{
    default_user_agent, normalize_flight_address, CLOUD_FLIGHT_ADDRESS, CLOUD_HTTP_ADDRESS,
    FLIGHT_URL_ENV, HTTP_URL_ENV, LOCAL_FLIGHT_ADDRESS, LOCAL_HTTP_ADDRESS,
};
pub use error::{ClientError, Result};
pub use flight::QueryResultStream;
pub use refresh::{RefreshMode, RefreshOptions};
pub use retry::{classify, FibonacciBackoff, RetryClass, RetryPolicy};
