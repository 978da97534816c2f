//! GTSDB client
//!
//! [`TsdbClient`] is the public face of the crate: raw reads and writes,
//! derived queries (latest, average, history) and push subscriptions.
//!
//! Queries take turns: a new query is only written once the previous one has
//! been answered or abandoned. Push notifications are decoded by the read loop
//! and handed to a dispatcher task, which calls the registered callbacks in
//! delivery order.

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionState};
use crate::error::{ClientError, ClientResult};
use crate::framing::{FramingStrategy, LegacyFraming};
use crate::protocol::{
    encode_subscribe, encode_unsubscribe, encode_write, parse_query_response, DataPoint,
    QueryRequest, QueryResponse,
};
use crate::router::{PushEvent, ResponseRouter};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;

/// Callback invoked once per push notification
pub type SubscriptionCallback = Arc<dyn Fn(&PushEvent) + Send + Sync>;

/// Async client for a GTSDB server
pub struct TsdbClient {
    config: ClientConfig,
    connection: Connection,
    router: Arc<ResponseRouter>,
    push_rx: Mutex<Option<mpsc::Receiver<PushEvent>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    callbacks: Arc<RwLock<Vec<SubscriptionCallback>>>,
    subscriptions: Mutex<HashSet<String>>,
    query_turn: Mutex<()>,
}

impl TsdbClient {
    /// Create a disconnected client using [`LegacyFraming`]
    pub fn new(config: ClientConfig) -> Self {
        Self::with_framing(config, LegacyFraming)
    }

    /// Create a disconnected client with a custom inbound framing strategy
    ///
    /// The strategy is fixed for the lifetime of the client.
    pub fn with_framing(config: ClientConfig, framing: impl FramingStrategy) -> Self {
        let (push_tx, push_rx) = mpsc::channel(config.push_queue_capacity.max(1));
        let router = Arc::new(ResponseRouter::new(Box::new(framing), push_tx));

        Self {
            config,
            connection: Connection::new(),
            router,
            push_rx: Mutex::new(Some(push_rx)),
            dispatcher: Mutex::new(None),
            callbacks: Arc::new(RwLock::new(Vec::new())),
            subscriptions: Mutex::new(HashSet::new()),
            query_turn: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connect to a GTSDB server over TCP
    pub async fn connect(&self, host: &str, port: u16) -> ClientResult<()> {
        self.connection
            .connect(host, port, self.config.connect_timeout, self.router.clone())
            .await?;
        self.on_connected().await;
        Ok(())
    }

    /// Connect over an already-established transport
    pub async fn connect_stream<S>(&self, label: impl Into<String>, stream: S) -> ClientResult<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.connection
            .connect_stream(label, stream, self.router.clone())
            .await?;
        self.on_connected().await;
        Ok(())
    }

    async fn on_connected(&self) {
        self.subscriptions.lock().await.clear();

        if let Some(push_rx) = self.push_rx.lock().await.take() {
            let handle = tokio::spawn(run_push_dispatcher(push_rx, self.callbacks.clone()));
            *self.dispatcher.lock().await = Some(handle);
        }
    }

    /// Close the connection. Closing a closed client is a no-op.
    pub async fn close(&self) -> ClientResult<()> {
        self.subscriptions.lock().await.clear();
        self.connection.close().await
    }

    pub async fn state(&self) -> ConnectionState {
        self.connection.state().await
    }

    pub async fn is_connected(&self) -> bool {
        self.state().await == ConnectionState::Connected
    }

    /// Address of the server, if connected
    pub async fn addr(&self) -> Option<String> {
        self.connection.addr().await
    }

    /// Write one data point. No acknowledgment is awaited.
    ///
    /// NaN and infinite values have no decimal form on the wire and are
    /// rejected before anything is sent.
    pub async fn write_data(&self, key: &str, timestamp: i64, value: f64) -> ClientResult<()> {
        if !value.is_finite() {
            return Err(ClientError::NonFiniteValue {
                key: key.to_string(),
                value,
            });
        }
        self.connection
            .write(&encode_write(key, timestamp, value))
            .await
    }

    /// Record a measurement stamped with the current time
    pub async fn record_measurement(&self, sensor_id: &str, value: f64) -> ClientResult<()> {
        self.write_data(sensor_id, Utc::now().timestamp(), value)
            .await
    }

    /// Run a range query and wait for its response line
    pub async fn read_data(
        &self,
        key: &str,
        start: i64,
        end: i64,
        downsampling: u64,
    ) -> ClientResult<QueryResponse> {
        self.query(&QueryRequest::new(key, start, end, downsampling))
            .await
    }

    async fn query(&self, request: &QueryRequest) -> ClientResult<QueryResponse> {
        let _turn = self.query_turn.lock().await;

        // Register before writing so a fast response is not taken for a push
        let response_rx = self.router.begin_query().await;
        if let Err(e) = self.connection.write(&request.encode()).await {
            self.router.cancel_query().await;
            return Err(e);
        }

        let line = match tokio::time::timeout(self.config.query_timeout, response_rx).await {
            Ok(Ok(result)) => result?,
            Ok(Err(_)) => return Err(ClientError::ConnectionClosed),
            Err(_) => {
                debug!(
                    "Query for {} timed out, its response will be discarded",
                    request.key
                );
                return Err(ClientError::Timeout {
                    operation: "query",
                    after: self.config.query_timeout,
                });
            }
        };

        Ok(parse_query_response(&line))
    }

    /// Most recent measurement within the lookback window
    pub async fn get_latest_measurement(&self, sensor_id: &str) -> ClientResult<DataPoint> {
        let end = Utc::now().timestamp();
        let start = window_start(end, self.config.latest_lookback);

        let mut response = self.read_data(sensor_id, start, end, 0).await?;
        response
            .points
            .pop()
            .ok_or_else(|| ClientError::no_data(sensor_id))
    }

    /// Mean of the raw measurements over the last `duration`
    pub async fn get_average_measurement(
        &self,
        sensor_id: &str,
        duration: Duration,
    ) -> ClientResult<f64> {
        let end = Utc::now().timestamp();
        let start = window_start(end, duration);

        let response = self.read_data(sensor_id, start, end, 0).await?;
        if response.is_empty() {
            return Err(ClientError::no_data(sensor_id));
        }

        response
            .mean()
            .ok_or_else(|| ClientError::NoValidMeasurements {
                key: sensor_id.to_string(),
                skipped: response.skipped,
            })
    }

    /// Downsampled measurements between `start` and `end`
    ///
    /// The interval is rounded down to whole seconds and never goes below one.
    pub async fn get_measurement_history(
        &self,
        sensor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        interval: Duration,
    ) -> ClientResult<Vec<DataPoint>> {
        let downsampling = interval.as_secs().max(1);
        let response = self
            .read_data(sensor_id, start.timestamp(), end.timestamp(), downsampling)
            .await?;
        Ok(response.points)
    }

    /// Ask the server to push updates for `key`
    pub async fn subscribe(&self, key: &str) -> ClientResult<()> {
        let mut subscriptions = self.subscriptions.lock().await;
        if subscriptions.contains(key) {
            return Ok(());
        }

        self.connection.write(&encode_subscribe(key)).await?;
        subscriptions.insert(key.to_string());
        debug!("Subscribed to {}", key);
        Ok(())
    }

    /// Stop push updates for `key`. Unsubscribing an unknown key is a no-op.
    pub async fn unsubscribe(&self, key: &str) -> ClientResult<()> {
        let mut subscriptions = self.subscriptions.lock().await;
        if !subscriptions.contains(key) {
            return Ok(());
        }

        self.connection.write(&encode_unsubscribe(key)).await?;
        subscriptions.remove(key);
        debug!("Unsubscribed from {}", key);
        Ok(())
    }

    /// Keys currently subscribed on this connection
    pub async fn subscriptions(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.subscriptions.lock().await.iter().cloned().collect();
        keys.sort();
        keys
    }

    /// Register a callback for push notifications
    ///
    /// Callbacks run on the dispatcher task, not the read loop. Issuing a query
    /// while pushes are arriving may misattribute a push as the response.
    pub async fn on_subscription_data<F>(&self, callback: F)
    where
        F: Fn(&PushEvent) + Send + Sync + 'static,
    {
        self.callbacks.write().await.push(Arc::new(callback));
    }
}

impl Default for TsdbClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl Drop for TsdbClient {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatcher.get_mut().take() {
            handle.abort();
        }
    }
}

/// Start of a window of `length` ending at `end`, clamped to `i64::MIN`
fn window_start(end: i64, length: Duration) -> i64 {
    let secs = i64::try_from(length.as_secs()).unwrap_or(i64::MAX);
    end.saturating_sub(secs)
}

async fn run_push_dispatcher(
    mut push_rx: mpsc::Receiver<PushEvent>,
    callbacks: Arc<RwLock<Vec<SubscriptionCallback>>>,
) {
    while let Some(event) = push_rx.recv().await {
        let callbacks = callbacks.read().await;
        if callbacks.is_empty() {
            debug!("No subscription callback registered, push dropped");
            continue;
        }
        for callback in callbacks.iter() {
            callback(&event);
        }
    }

    debug!("Push dispatcher stopped");
}
