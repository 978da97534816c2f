//! GTSDB Client Library
//!
//! Async client for the GTSDB line protocol: a newline-delimited text protocol
//! over a single TCP connection, carrying writes, range queries and push
//! subscriptions.
//!
//! ## Overview
//!
//! - **Wire codec**: encoding of requests and decoding of response/push lines
//! - **Connection management**: connect/close lifecycle and the read loop
//! - **Response routing**: telling query responses from push notifications
//! - **Queries**: latest value, windowed average, downsampled history
//!
//! ## Usage
//!
//! ```no_run
//! use gtsdb_client::{ClientConfig, TsdbClient};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = TsdbClient::new(ClientConfig::default());
//!     client.connect("localhost", 5555).await?;
//!
//!     client.record_measurement("sensor1", 25.5).await?;
//!
//!     let latest = client.get_latest_measurement("sensor1").await?;
//!     println!("Latest: {} at {:?}", latest.value, latest.time());
//!
//!     let avg = client
//!         .get_average_measurement("sensor1", Duration::from_secs(3600))
//!         .await?;
//!     println!("Average over the last hour: {:.2}", avg);
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Push notifications
//!
//! The protocol has no correlation ids, so a line that arrives while a query is
//! in flight is taken as that query's response. Avoid issuing queries on a
//! connection that is receiving pushes, or install a [`FramingStrategy`] that
//! can tell the two apart.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod framing;
pub mod protocol;
pub mod router;

// Re-export main types for convenience
pub use client::{SubscriptionCallback, TsdbClient};
pub use config::ClientConfig;
pub use connection::{read_line, Connection, ConnectionState};
pub use error::{ClientError, ClientResult, ParseError};
pub use framing::{Frame, FramingStrategy, LegacyFraming};
pub use protocol::{
    decode_push_line, decode_query_response, encode_query, encode_subscribe, encode_unsubscribe,
    encode_write, parse_query_response, DataPoint, QueryRequest, QueryResponse,
};
pub use router::{PushEvent, ResponseRouter, RouteOutcome};
