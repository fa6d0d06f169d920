//! Instance records and their status lookup enums.
//!
//! Each status enum's discriminant matches the seed order (1-based) of
//! the corresponding `*_statuses` lookup table on the Postgres side.

use burrow_core::types::{DbId, Timestamp};

/// Status ID type matching SMALLINT/SMALLSERIAL in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:expr ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Map a stored status ID back onto the enum.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some(Self::$variant), )+
                    _ => None,
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Instance lifecycle status. Driven by the compute provider;
    /// the workflow engine observes it but never sets it directly.
    InstanceStatus {
        Build = 1,
        Active = 2,
        Error = 3,
        Shutdown = 4,
    }
}

define_status_enum! {
    /// Marker for an operation currently in flight against the
    /// instance. Must return to `None` on every workflow exit path,
    /// including failures.
    InstanceTaskStatus {
        None = 1,
        Building = 2,
        Resizing = 3,
    }
}

define_status_enum! {
    /// Health of the database service inside the guest. The engine
    /// only ever writes `New`; everything after that arrives out of
    /// band from the guest agent.
    ServiceStatusKind {
        New = 1,
        Building = 2,
        Running = 3,
        Shutdown = 4,
        Failed = 5,
        Unknown = 6,
    }
}

/// A managed database instance as persisted.
///
/// `volume_id` and `compute_instance_id` are recorded the moment the
/// respective provider acknowledges creation, before the resource is
/// usable, so a crash mid-provisioning leaves a recoverable trail.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: DbId,
    pub name: String,
    /// DNS hostname, assigned once a DNS entry is registered.
    pub hostname: Option<String>,
    pub status: InstanceStatus,
    pub task_status: InstanceTaskStatus,
    /// Id of the provisioned compute server, once known.
    pub compute_instance_id: Option<String>,
    /// Id of the attached block-storage volume, once known.
    pub volume_id: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Instance {
    /// A freshly requested instance: lifecycle `Build`, no task in
    /// flight, no resources attached yet.
    pub fn new(id: DbId, name: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            name: name.into(),
            hostname: None,
            status: InstanceStatus::Build,
            task_status: InstanceTaskStatus::None,
            compute_instance_id: None,
            volume_id: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Per-instance guest service health record, 1:1 with [`Instance`]
/// once provisioning has progressed past server creation.
#[derive(Debug, Clone)]
pub struct ServiceStatus {
    pub instance_id: DbId,
    pub status: ServiceStatusKind,
    pub updated_at: Timestamp,
}

impl ServiceStatus {
    /// The record the engine creates when a server id is first known.
    pub fn new(instance_id: DbId) -> Self {
        Self {
            instance_id,
            status: ServiceStatusKind::New,
            updated_at: chrono::Utc::now(),
        }
    }
}
