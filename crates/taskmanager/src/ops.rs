//! The operation catalog: every task the manager can be asked to run.
//!
//! Operations travel as a [`TaskEnvelope`] (method name + JSON args).
//! Decoding maps the method name onto [`TaskCall`] through a fixed
//! match, so an unknown name fails with
//! [`DispatchError::NoSuchOperation`] before anything executes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use burrow_core::transport::TaskEnvelope;
use burrow_core::types::DbId;
use burrow_providers::guest::DatabaseSpec;

use crate::manager::DispatchError;

/// Arguments for a full instance provisioning run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateInstanceArgs {
    pub instance_id: DbId,
    pub name: String,
    pub flavor_ref: String,
    pub image_id: String,
    /// Schemas the guest should create on first boot.
    #[serde(default)]
    pub databases: Vec<DatabaseSpec>,
    pub service_type: String,
    /// Data volume size in gigabytes.
    pub volume_size: i64,
}

/// Arguments for standalone volume creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateVolumeArgs {
    pub instance_id: DbId,
    pub volume_size: i64,
}

/// Arguments for DNS registration of an existing server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateDnsEntryArgs {
    pub server_id: String,
    pub instance_id: DbId,
}

/// Arguments for growing an instance's data volume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResizeVolumeArgs {
    pub instance_id: DbId,
    pub new_size: i64,
}

/// One decoded task invocation.
#[derive(Debug, Clone)]
pub enum TaskCall {
    CreateInstance(CreateInstanceArgs),
    CreateVolume(CreateVolumeArgs),
    CreateDnsEntry(CreateDnsEntryArgs),
    ResizeVolume(ResizeVolumeArgs),
}

impl TaskCall {
    /// Wire-level method name.
    pub fn method(&self) -> &'static str {
        match self {
            Self::CreateInstance(_) => "create_instance",
            Self::CreateVolume(_) => "create_volume",
            Self::CreateDnsEntry(_) => "create_dns_entry",
            Self::ResizeVolume(_) => "resize_volume",
        }
    }

    /// Serialize into the wire envelope.
    pub fn into_envelope(self) -> Result<TaskEnvelope, serde_json::Error> {
        let method = self.method().to_string();
        let args = match self {
            Self::CreateInstance(args) => serde_json::to_value(args)?,
            Self::CreateVolume(args) => serde_json::to_value(args)?,
            Self::CreateDnsEntry(args) => serde_json::to_value(args)?,
            Self::ResizeVolume(args) => serde_json::to_value(args)?,
        };
        Ok(TaskEnvelope { method, args })
    }

    /// Decode an inbound envelope.
    ///
    /// Unknown method names and malformed arguments both fail here,
    /// before any workflow code runs.
    pub fn decode(envelope: &TaskEnvelope) -> Result<Self, DispatchError> {
        match envelope.method.as_str() {
            "create_instance" => Ok(Self::CreateInstance(decode_args(envelope)?)),
            "create_volume" => Ok(Self::CreateVolume(decode_args(envelope)?)),
            "create_dns_entry" => Ok(Self::CreateDnsEntry(decode_args(envelope)?)),
            "resize_volume" => Ok(Self::ResizeVolume(decode_args(envelope)?)),
            other => Err(DispatchError::NoSuchOperation(other.to_string())),
        }
    }
}

fn decode_args<T: DeserializeOwned>(envelope: &TaskEnvelope) -> Result<T, DispatchError> {
    serde_json::from_value(envelope.args.clone()).map_err(|e| DispatchError::InvalidArguments {
        method: envelope.method.clone(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn decodes_create_volume() {
        let envelope = TaskEnvelope {
            method: "create_volume".to_string(),
            args: serde_json::json!({"instance_id": 7, "volume_size": 2}),
        };
        let call = TaskCall::decode(&envelope).expect("well-formed envelope");
        assert_matches!(call, TaskCall::CreateVolume(args) => {
            assert_eq!(args.instance_id, 7);
            assert_eq!(args.volume_size, 2);
        });
    }

    #[test]
    fn unknown_method_is_no_such_operation() {
        let envelope = TaskEnvelope {
            method: "detonate_instance".to_string(),
            args: serde_json::json!({}),
        };
        let result = TaskCall::decode(&envelope);
        assert_matches!(
            result,
            Err(DispatchError::NoSuchOperation(method)) if method == "detonate_instance"
        );
    }

    #[test]
    fn malformed_args_are_rejected() {
        let envelope = TaskEnvelope {
            method: "resize_volume".to_string(),
            args: serde_json::json!({"instance_id": "not-a-number"}),
        };
        let result = TaskCall::decode(&envelope);
        assert_matches!(
            result,
            Err(DispatchError::InvalidArguments { method, .. }) if method == "resize_volume"
        );
    }

    #[test]
    fn envelope_round_trips_create_instance() {
        let call = TaskCall::CreateInstance(CreateInstanceArgs {
            instance_id: 7,
            name: "prod-db".to_string(),
            flavor_ref: "m1.large".to_string(),
            image_id: "img-mysql-57".to_string(),
            databases: vec![DatabaseSpec {
                name: "orders".to_string(),
                character_set: Some("utf8".to_string()),
                collate: None,
            }],
            service_type: "mysql".to_string(),
            volume_size: 10,
        });

        let envelope = call.into_envelope().expect("serializable args");
        assert_eq!(envelope.method, "create_instance");

        let decoded = TaskCall::decode(&envelope).expect("decodes its own envelope");
        assert_matches!(decoded, TaskCall::CreateInstance(args) => {
            assert_eq!(args.name, "prod-db");
            assert_eq!(args.databases.len(), 1);
            assert_eq!(args.databases[0].character_set.as_deref(), Some("utf8"));
        });
    }
}
