//! Clients for the remote services Burrow orchestrates.
//!
//! Each provider is reached through a narrow capability trait so the
//! workflow engine never depends on a concrete wire protocol:
//!
//! - [`compute`] — server provisioning and lookup.
//! - [`volume`] — block-storage create/get/resize.
//! - [`dns`] — hostname assignment and address registration.
//! - [`guest`] — the in-guest configuration agent, reached over the
//!   message transport rather than HTTP.
//!
//! The HTTP implementations share one [`ProviderError`] and the
//! response helpers in [`http`].

pub mod compute;
pub mod dns;
pub mod error;
pub mod guest;
mod http;
pub mod volume;

pub use compute::{ComputeProvider, CreateServerRequest, HttpComputeProvider, Server, ServerStatus};
pub use dns::{DnsProvider, HttpDnsProvider};
pub use error::ProviderError;
pub use guest::{DatabaseSpec, GuestClient, GuestPrepare, RpcGuestClient};
pub use volume::{HttpVolumeProvider, Volume, VolumeAttachment, VolumeProvider, VolumeStatus};
