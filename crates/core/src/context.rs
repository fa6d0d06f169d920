//! Per-request execution context.
//!
//! A [`RequestContext`] is created by the caller and rides along with
//! every call and cast, through the dispatcher and into the workflow
//! engine. It identifies one workflow invocation; nothing persists it.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Caller-supplied correlation and identity for one dispatch.
///
/// The `request_id` keys the dispatcher's in-flight task table and tags
/// every log line emitted on behalf of the invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// Unique id for this invocation.
    pub request_id: Uuid,
    /// Tenant on whose behalf the work runs, when known.
    pub tenant_id: Option<String>,
    /// User that triggered the work, when known.
    pub user_id: Option<String>,
}

impl RequestContext {
    /// Create an anonymous context with a fresh request id.
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            tenant_id: None,
            user_id: None,
        }
    }

    /// Attach a tenant to the context.
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Attach the acting user to the context.
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}
