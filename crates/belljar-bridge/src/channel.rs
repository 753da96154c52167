//! The call/response channel over a port.
//!
//! `Channel` gives one endpoint of a port link `call(method, params)`
//! semantics with correlation-id bookkeeping, and serves inbound requests
//! through a caller-supplied handler. Closing the channel is the disposal
//! primitive: it stops all traffic, forces every pending outbound call to a
//! terminal [`ChannelError::Closed`], and silently discards any response
//! that arrives afterwards.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::port::{Port, RelayMessage};
use crate::protocol::{CallResult, Frame, WireFault};

/// Errors surfaced by channel calls.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel was closed, locally or by the peer, before the call
    /// completed. Pending calls are forced here on close.
    #[error("channel closed")]
    Closed,

    /// The remote side answered with a fault.
    #[error("remote fault: {0}")]
    Fault(WireFault),

    /// A frame could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Handler for requests arriving from the peer.
pub trait RequestHandler: Send + Sync + 'static {
    /// Serve one inbound request. The returned value (or fault) is sent back
    /// as the response for the request's correlation id.
    fn handle(
        &self,
        method: String,
        params: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<serde_json::Value, WireFault>> + Send>>;
}

struct ChannelInner {
    tx: Mutex<Option<UnboundedSender<RelayMessage>>>,
    pending: DashMap<u64, oneshot::Sender<Result<serde_json::Value, ChannelError>>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl ChannelInner {
    fn send_frame(&self, frame: &Frame) -> Result<(), ChannelError> {
        let body = frame.encode()?;
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or(ChannelError::Closed)?;
        tx.send(RelayMessage::Payload { body })
            .map_err(|_| ChannelError::Closed)
    }

    /// Force every pending call to the closed error.
    fn fail_pending(&self) {
        let ids: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some((_, sender)) = self.pending.remove(&id) {
                let _ = sender.send(Err(ChannelError::Closed));
            }
        }
    }
}

/// One endpoint of the request/response bridge.
///
/// Cheap to clone; all clones share the same pending-call state, so closing
/// any clone closes them all.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
    driver: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl Channel {
    /// Wrap a port, serving inbound requests with `handler`.
    ///
    /// Must be called from within a tokio runtime; the receive loop runs as
    /// a spawned task until the channel is closed or the peer goes away.
    pub fn new(port: Port, handler: Arc<dyn RequestHandler>) -> Self {
        let (tx, rx) = port.split();
        let inner = Arc::new(ChannelInner {
            tx: Mutex::new(Some(tx)),
            pending: DashMap::new(),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });

        let driver = tokio::spawn(drive(rx, Arc::clone(&inner), handler));

        Self {
            inner,
            driver: Arc::new(Mutex::new(Some(driver))),
        }
    }

    /// Issue a call and await its response.
    pub async fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ChannelError> {
        if self.inner.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::Closed);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = oneshot::channel();
        self.inner.pending.insert(id, sender);

        trace!(id, method, "Issuing call");
        if let Err(err) = self.inner.send_frame(&Frame::request(id, method, params)) {
            self.inner.pending.remove(&id);
            return Err(err);
        }

        match receiver.await {
            Ok(result) => result,
            Err(_) => Err(ChannelError::Closed),
        }
    }

    /// Close the channel.
    ///
    /// Idempotent. Stops inbound processing, prevents further sends, and
    /// rejects every pending call with [`ChannelError::Closed`]. Responses
    /// arriving after this point are discarded, not delivered.
    pub fn close(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Closing channel");
        self.inner.tx.lock().take();
        if let Some(driver) = self.driver.lock().take() {
            driver.abort();
        }
        self.inner.fail_pending();
    }

    /// Check whether the channel has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("closed", &self.is_closed())
            .field("pending", &self.inner.pending.len())
            .finish()
    }
}

async fn drive(
    mut rx: UnboundedReceiver<RelayMessage>,
    inner: Arc<ChannelInner>,
    handler: Arc<dyn RequestHandler>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            RelayMessage::Init { name, .. } => {
                warn!(name, "Unexpected init envelope on established channel");
            }
            RelayMessage::Payload { body } => match Frame::decode(&body) {
                Ok(Frame::Response { id, result }) => {
                    match inner.pending.remove(&id) {
                        Some((_, sender)) => {
                            let outcome = match result {
                                CallResult::Ok { value } => Ok(value),
                                CallResult::Err { fault } => Err(ChannelError::Fault(fault)),
                            };
                            let _ = sender.send(outcome);
                        }
                        // Response for a call nobody is waiting on.
                        None => trace!(id, "Discarding stray response"),
                    }
                }
                Ok(Frame::Request { id, method, params }) => {
                    let inner = Arc::clone(&inner);
                    let handler = Arc::clone(&handler);
                    // Each inbound request gets its own task so slow or
                    // asynchronous handlers interleave freely.
                    tokio::spawn(async move {
                        let frame = match handler.handle(method, params).await {
                            Ok(value) => Frame::ok(id, value),
                            Err(fault) => Frame::fault(id, fault),
                        };
                        if inner.send_frame(&frame).is_err() {
                            trace!(id, "Dropping response for closed channel");
                        }
                    });
                }
                Err(err) => warn!(error = %err, "Discarding undecodable payload"),
            },
        }
    }
    // Peer gone: everything still pending terminates now.
    inner.fail_pending();
}
