//! Shared primitives for the Burrow provisioning service.
//!
//! This crate holds the pieces every other crate builds on:
//!
//! - [`types`] — id and timestamp aliases.
//! - [`context`] — the per-request correlation object threaded through
//!   every dispatch.
//! - [`poll`] — the bounded poll-until primitive that converts
//!   asynchronous provider completion into sequential workflow code.
//! - [`transport`] — the generic call/cast messaging seam and an
//!   in-process implementation of it.

pub mod context;
pub mod poll;
pub mod transport;
pub mod types;

pub use context::RequestContext;
pub use poll::{poll_until, PollError};
pub use transport::{
    Delivery, InProcTransport, RemoteError, TaskEnvelope, Transport, TransportError,
};
