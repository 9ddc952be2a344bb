use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Shared surface of every string id: raw construction, borrowing, display,
/// parsing and serde as a bare string.
macro_rules! string_id {
    ($name:ident) => {
        #[derive(Clone, Debug, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn from_raw(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = std::convert::Infallible;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_owned()))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

/// Ids minted by this engine: prefix + time-ordered UUIDv7.
macro_rules! branded_id {
    ($name:ident, $prefix:expr) => {
        string_id!($name);

        impl $name {
            pub fn new() -> Self {
                Self(format!("{}_{}", $prefix, Uuid::now_v7()))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }
    };
}

branded_id!(SessionId, "sess");
branded_id!(SnapshotId, "snap");
branded_id!(HistoryId, "hist");
branded_id!(AggregateId, "agg");

// Ids owned by upstream systems; never generated here.
string_id!(UserId);
string_id!(CharacterId);
string_id!(ActivityId);
string_id!(MembershipId);
