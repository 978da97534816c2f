//! Response routing
//!
//! The read loop hands every inbound line to [`ResponseRouter::route_line`].
//! At most one query is in flight at a time; its response is delivered through
//! a oneshot channel, and anything classified as a push is decoded and queued
//! for the push dispatcher.
//!
//! A query whose caller stops waiting (timeout or dropped future) still has a
//! response coming. When the next query starts, the abandoned slot becomes an
//! orphan and the next response line is discarded instead of being handed to
//! the new caller.

use crate::error::{ClientError, ClientResult, ParseError};
use crate::framing::{Frame, FramingStrategy};
use crate::protocol::{decode_push_line, DataPoint};
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, warn};

/// A decoded push notification, or the reason it could not be decoded
pub type PushEvent = Result<DataPoint, ParseError>;

/// What happened to a routed line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Handed to the waiting query
    Delivered,
    /// Late response of an abandoned query
    Discarded,
    /// Queued for the push dispatcher
    Pushed,
    /// Nobody wanted it
    Dropped,
}

struct RouterState {
    pending: Option<oneshot::Sender<ClientResult<String>>>,
    orphans: usize,
    framing: Box<dyn FramingStrategy>,
}

impl RouterState {
    fn in_flight(&self) -> bool {
        self.orphans > 0 || self.pending.is_some()
    }
}

/// Routes inbound lines to the in-flight query or the push queue
pub struct ResponseRouter {
    state: Mutex<RouterState>,
    push_tx: mpsc::Sender<PushEvent>,
}

impl ResponseRouter {
    pub fn new(framing: Box<dyn FramingStrategy>, push_tx: mpsc::Sender<PushEvent>) -> Self {
        Self {
            state: Mutex::new(RouterState {
                pending: None,
                orphans: 0,
                framing,
            }),
            push_tx,
        }
    }

    /// Register a new in-flight query. Must be called before the request is written.
    pub async fn begin_query(&self) -> oneshot::Receiver<ClientResult<String>> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock().await;

        if state.pending.take().is_some() {
            state.orphans += 1;
            debug!(
                "Previous query abandoned, discarding its response ({} outstanding)",
                state.orphans
            );
        }

        state.pending = Some(tx);
        rx
    }

    /// Withdraw the in-flight query when its request never reached the wire.
    pub async fn cancel_query(&self) {
        self.state.lock().await.pending = None;
    }

    /// True while a response is still expected
    pub async fn is_in_flight(&self) -> bool {
        self.state.lock().await.in_flight()
    }

    /// Route one inbound line
    pub async fn route_line(&self, line: String) -> RouteOutcome {
        let mut state = self.state.lock().await;
        let in_flight = state.in_flight();

        match state.framing.classify(line, in_flight) {
            Frame::Response(line) => {
                if state.orphans > 0 {
                    state.orphans -= 1;
                    debug!("Discarded late response: {:?}", line);
                    return RouteOutcome::Discarded;
                }

                match state.pending.take() {
                    Some(tx) => {
                        if tx.send(Ok(line)).is_err() {
                            debug!("Query caller gone, response dropped");
                            return RouteOutcome::Discarded;
                        }
                        RouteOutcome::Delivered
                    }
                    None => {
                        warn!("Response with no query in flight dropped: {:?}", line);
                        RouteOutcome::Dropped
                    }
                }
            }
            Frame::Push(line) => {
                drop(state);

                let event = decode_push_line(&line);
                if let Err(e) = &event {
                    warn!("Malformed push line {:?}: {}", line, e);
                }

                // Bounded queue: waits for the dispatcher rather than dropping
                if self.push_tx.send(event).await.is_err() {
                    debug!("Push dispatcher gone, notification dropped");
                    return RouteOutcome::Dropped;
                }
                RouteOutcome::Pushed
            }
        }
    }

    /// Fail the in-flight query and forget abandoned ones. Used when the stream ends.
    pub async fn fail_pending(&self, error: ClientError) {
        let mut state = self.state.lock().await;
        state.orphans = 0;
        if let Some(tx) = state.pending.take() {
            let _ = tx.send(Err(error));
        }
    }
}
