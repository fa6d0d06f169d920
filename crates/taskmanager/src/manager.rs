//! The task dispatcher.
//!
//! One [`TaskManager`] per worker process. It consumes envelopes from
//! the transport, decodes them against the operation catalog, tracks
//! the invocation in an in-flight table keyed by request id, and
//! delegates to the workflow engine. The table exists for diagnostics
//! only (the heartbeat reports its size); correctness never depends on
//! it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use burrow_core::transport::{Delivery, RemoteError, TaskEnvelope};
use burrow_core::RequestContext;

use crate::ops::TaskCall;
use crate::tasks::{InstanceTasks, TaskError};

/// Errors from dispatching one envelope.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// The envelope named an operation this manager does not have.
    #[error("no such task operation: {0}")]
    NoSuchOperation(String),

    /// The operation exists but its arguments did not decode.
    #[error("invalid arguments for {method}: {message}")]
    InvalidArguments { method: String, message: String },

    /// The operation ran but its result would not serialize.
    #[error("failed to encode result of {method}: {message}")]
    ResultEncoding { method: String, message: String },

    /// The workflow itself failed; forwarded to callers unchanged.
    #[error(transparent)]
    Task(#[from] TaskError),
}

impl DispatchError {
    /// Stable machine-readable tag carried over the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoSuchOperation(_) => "NoSuchOperation",
            Self::InvalidArguments { .. } => "InvalidArguments",
            Self::ResultEncoding { .. } => "InternalError",
            Self::Task(error) => error.kind(),
        }
    }
}

impl From<DispatchError> for RemoteError {
    fn from(error: DispatchError) -> Self {
        RemoteError {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Bookkeeping for one currently-executing dispatch.
#[derive(Debug, Clone)]
struct InFlightTask {
    method: String,
    started_at: Instant,
}

/// The long-running dispatch worker.
pub struct TaskManager {
    tasks: InstanceTasks,
    in_flight: Mutex<HashMap<Uuid, InFlightTask>>,
    heartbeat_interval: Duration,
}

/// Scoped entry in the in-flight table; removal happens on drop, so
/// every dispatch exit path clears its entry.
struct InFlightGuard<'a> {
    manager: &'a TaskManager,
    request_id: Uuid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.manager
            .in_flight
            .lock()
            .expect("in-flight table poisoned")
            .remove(&self.request_id);
    }
}

impl TaskManager {
    pub fn new(tasks: InstanceTasks, heartbeat_interval: Duration) -> Self {
        Self {
            tasks,
            in_flight: Mutex::new(HashMap::new()),
            heartbeat_interval,
        }
    }

    /// Number of dispatches currently executing.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight
            .lock()
            .expect("in-flight table poisoned")
            .len()
    }

    /// Decode and run one envelope.
    ///
    /// Unknown operations and malformed arguments fail before any
    /// workflow code runs or the invocation is tracked. Engine errors
    /// propagate unchanged.
    pub async fn dispatch(
        &self,
        ctx: &RequestContext,
        envelope: TaskEnvelope,
    ) -> Result<serde_json::Value, DispatchError> {
        let call = TaskCall::decode(&envelope)?;
        let method = call.method();

        let _guard = self.track(ctx, method);
        tracing::debug!(request_id = %ctx.request_id, method, "dispatching task");

        match call {
            TaskCall::CreateInstance(args) => {
                self.tasks.create_instance(ctx, args).await?;
                Ok(serde_json::Value::Null)
            }
            TaskCall::CreateVolume(args) => {
                let info = self
                    .tasks
                    .create_volume(ctx, args.instance_id, args.volume_size)
                    .await?;
                serde_json::to_value(info).map_err(|e| DispatchError::ResultEncoding {
                    method: method.to_string(),
                    message: e.to_string(),
                })
            }
            TaskCall::CreateDnsEntry(args) => {
                self.tasks
                    .create_dns_entry(ctx, args.instance_id, &args.server_id)
                    .await?;
                Ok(serde_json::Value::Null)
            }
            TaskCall::ResizeVolume(args) => {
                self.tasks
                    .resize_volume(ctx, args.instance_id, args.new_size)
                    .await?;
                Ok(serde_json::Value::Null)
            }
        }
    }

    /// Consume deliveries until the token is cancelled or the
    /// transport closes. Each delivery runs as its own task, so slow
    /// workflows never block the intake loop.
    pub async fn serve(self: Arc<Self>, mut inbox: mpsc::Receiver<Delivery>, cancel: CancellationToken) {
        tracing::info!("task manager started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("task manager shutting down");
                    break;
                }
                delivery = inbox.recv() => {
                    let Some(delivery) = delivery else {
                        tracing::info!("transport closed; task manager stopping");
                        break;
                    };
                    let manager = Arc::clone(&self);
                    tokio::spawn(async move { manager.handle(delivery).await });
                }
            }
        }
    }

    /// Periodic diagnostic tick, independent of any workflow.
    pub async fn run_heartbeat(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let (count, oldest) = self.in_flight_stats();
                    match oldest {
                        Some((method, age)) => tracing::debug!(
                            in_flight = count,
                            oldest_method = %method,
                            oldest_age_ms = age.as_millis() as u64,
                            "task manager heartbeat",
                        ),
                        None => tracing::debug!(in_flight = count, "task manager heartbeat"),
                    }
                }
            }
        }
    }

    // ---- private helpers ----

    async fn handle(&self, delivery: Delivery) {
        let Delivery {
            context,
            envelope,
            reply,
        } = delivery;
        let method = envelope.method.clone();
        let result = self.dispatch(&context, envelope).await;

        match reply {
            Some(reply) => {
                // Ignore the send error — the submitter may have timed
                // out and gone.
                let _ = reply.send(result.map_err(RemoteError::from));
            }
            None => {
                if let Err(error) = result {
                    tracing::error!(
                        request_id = %context.request_id,
                        method = %method,
                        error = %error,
                        "cast task failed",
                    );
                }
            }
        }
    }

    fn in_flight_stats(&self) -> (usize, Option<(String, Duration)>) {
        let table = self.in_flight.lock().expect("in-flight table poisoned");
        let oldest = table
            .values()
            .max_by_key(|task| task.started_at.elapsed())
            .map(|task| (task.method.clone(), task.started_at.elapsed()));
        (table.len(), oldest)
    }

    fn track(&self, ctx: &RequestContext, method: &str) -> InFlightGuard<'_> {
        self.in_flight
            .lock()
            .expect("in-flight table poisoned")
            .insert(
                ctx.request_id,
                InFlightTask {
                    method: method.to_string(),
                    started_at: Instant::now(),
                },
            );
        InFlightGuard {
            manager: self,
            request_id: ctx.request_id,
        }
    }
}
