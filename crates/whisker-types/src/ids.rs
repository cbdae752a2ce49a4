//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Every record in the economy has a strongly-typed ID so a user id can
//! never be passed where an ownership id is expected. All IDs use UUID v7
//! (time-ordered) for efficient database indexing.
//!
//! `UserId` is the exception in practice: chat adapters map their own
//! numeric user handles onto it with [`UserId::from_external`].

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Unique identifier for a user account.
    UserId
}

define_id! {
    /// Unique identifier for a catalog entry (cat template).
    CatalogEntryId
}

define_id! {
    /// Unique identifier for an ownership record (a cat owned by a user).
    OwnershipId
}

define_id! {
    /// Unique identifier for an item (modifier) in the item catalog.
    ItemId
}

define_id! {
    /// Unique identifier for an audit log entry.
    AuditEntryId
}

impl UserId {
    /// Derive a stable user id from a chat platform's numeric user handle.
    ///
    /// The handle is packed into the low 64 bits of a UUID so the same
    /// handle always maps to the same account.
    pub const fn from_external(handle: i64) -> Self {
        Self(Uuid::from_u64_pair(0, u64::from_be_bytes(handle.to_be_bytes())))
    }
}
