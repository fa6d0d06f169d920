//! Generic call/cast messaging seam.
//!
//! The orchestration service talks to its worker (and the worker talks
//! to guest agents) through a reliable message primitive: a **call**
//! blocks for a result, a **cast** is fire-and-forget. The broker
//! behind that primitive is deliberately out of scope; everything here
//! is expressed against the [`Transport`] trait.
//!
//! [`InProcTransport`] is the in-tree implementation: a routing-key
//! table of [`tokio::sync::mpsc`] queues with [`oneshot`] reply
//! channels, suitable for tests and single-process deployments.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::context::RequestContext;

/// Default patience for a call before the submitter gives up.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Queue depth per bound routing key.
const QUEUE_CAPACITY: usize = 64;

/// Wire form of one dispatched operation: a method name plus its
/// keyword arguments as a JSON object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    /// Operation name, e.g. `"create_volume"`.
    pub method: String,
    /// Operation arguments.
    pub args: serde_json::Value,
}

/// An error produced by the remote side of a call, forwarded to the
/// submitter unchanged.
///
/// `kind` is a stable machine-readable tag (e.g. `"NotFound"`,
/// `"NoSuchOperation"`); `message` is human-readable detail.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: String,
    pub message: String,
}

/// Failures of the messaging layer itself.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// No consumer is bound to the routing key.
    #[error("no consumer bound to routing key '{0}'")]
    Unroutable(String),

    /// The consumer did not reply within the call timeout.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The consumer dropped the request before replying.
    #[error("consumer dropped the request before replying")]
    Dropped,

    /// The remote handler ran and failed; its error is forwarded as-is.
    #[error(transparent)]
    Remote(#[from] RemoteError),
}

/// One message as seen by a consumer.
///
/// Calls carry a `reply` channel; casts do not.
#[derive(Debug)]
pub struct Delivery {
    pub context: RequestContext,
    pub envelope: TaskEnvelope,
    pub reply: Option<oneshot::Sender<Result<serde_json::Value, RemoteError>>>,
}

/// Reliable call/cast primitive.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Synchronous dispatch: block until the consumer replies or the
    /// transport gives up.
    async fn call(
        &self,
        ctx: &RequestContext,
        routing_key: &str,
        envelope: TaskEnvelope,
    ) -> Result<serde_json::Value, TransportError>;

    /// Asynchronous dispatch: returns as soon as the message is
    /// handed off.
    async fn cast(
        &self,
        ctx: &RequestContext,
        routing_key: &str,
        envelope: TaskEnvelope,
    ) -> Result<(), TransportError>;
}

/// In-process transport: one bounded queue per bound routing key.
pub struct InProcTransport {
    queues: Mutex<HashMap<String, mpsc::Sender<Delivery>>>,
    call_timeout: Duration,
}

impl InProcTransport {
    pub fn new() -> Self {
        Self::with_call_timeout(DEFAULT_CALL_TIMEOUT)
    }

    /// Create a transport with a specific call timeout.
    pub fn with_call_timeout(call_timeout: Duration) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            call_timeout,
        }
    }

    /// Bind a consumer to a routing key, returning its inbox.
    ///
    /// Rebinding a key replaces the previous consumer; messages already
    /// queued stay with the old receiver.
    pub fn bind(&self, routing_key: &str) -> mpsc::Receiver<Delivery> {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        self.queues
            .lock()
            .expect("transport routing table poisoned")
            .insert(routing_key.to_string(), tx);
        rx
    }

    fn sender_for(&self, routing_key: &str) -> Result<mpsc::Sender<Delivery>, TransportError> {
        self.queues
            .lock()
            .expect("transport routing table poisoned")
            .get(routing_key)
            .cloned()
            .ok_or_else(|| TransportError::Unroutable(routing_key.to_string()))
    }
}

impl Default for InProcTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InProcTransport {
    async fn call(
        &self,
        ctx: &RequestContext,
        routing_key: &str,
        envelope: TaskEnvelope,
    ) -> Result<serde_json::Value, TransportError> {
        let sender = self.sender_for(routing_key)?;
        let (reply_tx, reply_rx) = oneshot::channel();

        sender
            .send(Delivery {
                context: ctx.clone(),
                envelope,
                reply: Some(reply_tx),
            })
            .await
            .map_err(|_| TransportError::Unroutable(routing_key.to_string()))?;

        match tokio::time::timeout(self.call_timeout, reply_rx).await {
            Err(_) => Err(TransportError::Timeout(self.call_timeout)),
            Ok(Err(_)) => Err(TransportError::Dropped),
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(remote))) => Err(TransportError::Remote(remote)),
        }
    }

    async fn cast(
        &self,
        ctx: &RequestContext,
        routing_key: &str,
        envelope: TaskEnvelope,
    ) -> Result<(), TransportError> {
        let sender = self.sender_for(routing_key)?;
        sender
            .send(Delivery {
                context: ctx.clone(),
                envelope,
                reply: None,
            })
            .await
            .map_err(|_| TransportError::Unroutable(routing_key.to_string()))
    }
}
