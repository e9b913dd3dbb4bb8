//! Strongly-typed identifiers.
//!
//! Every aggregate gets its own UUID newtype so a document id can never be
//! passed where a session id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Create a new random identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Borrow the underlying UUID.
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

uuid_id!(
    /// Top-level tenant identifier.
    OrgId
);
uuid_id!(
    /// User account identifier.
    UserId
);
uuid_id!(
    /// Knowledge-partition identifier inside one org.
    DomainId
);
uuid_id!(
    /// Source document identifier.
    DocumentId
);
uuid_id!(
    /// Chunk identifier.
    ChunkId
);
uuid_id!(
    /// Chat session identifier.
    ChatSessionId
);
uuid_id!(
    /// Connector identifier.
    ConnectorId
);
uuid_id!(
    /// Sync-job identifier.
    SyncJobId
);
uuid_id!(
    /// Auth-session identifier.
    AuthSessionId
);
uuid_id!(
    /// Correlation identifier threaded through a request and its audit rows.
    CorrelationId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_round_trip() {
        let a = DocumentId::new();
        let b = DocumentId::new();
        assert_ne!(a, b);

        let parsed: DocumentId = a.to_string().parse().unwrap();
        assert_eq!(a, parsed);
    }

    #[test]
    fn test_serde_round_trip() {
        let id = OrgId::new();
        let json = serde_json::to_string(&id).unwrap();
        let back: OrgId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, back);
    }
}
