//! Identifier types for the access rule engine
//!
//! Users, devices, areas, doors and rules are identified by the numeric keys the
//! rule catalog and device-communication collaborators hand us. Each gets its own
//! newtype so an area id can never be passed where a door id is expected.
//! Linkage executions are created by the engine itself and use UUIDs.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Declares a numeric identifier with a display prefix.
///
/// The serialized form is the prefixed string (`"DEV_12"`); deserialization
/// accepts either the prefixed string or a bare integer, since the catalog
/// collaborator emits raw numeric keys.
macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u64);

        impl $name {
            /// Display prefix used in logs, keys and serialized form
            pub const PREFIX: &'static str = $prefix;

            /// Get the raw numeric value
            pub fn value(&self) -> u64 {
                self.0
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let digits = s.strip_prefix($prefix).unwrap_or(s);
                digits
                    .parse::<u64>()
                    .map($name)
                    .map_err(|_| format!("Invalid {}: {}", stringify!($name), s))
            }
        }

        impl Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                struct IdVisitor;

                impl<'de> Visitor<'de> for IdVisitor {
                    type Value = $name;

                    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        write!(f, "an integer or a string like \"{}42\"", $prefix)
                    }

                    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                        Ok($name(v))
                    }

                    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                        u64::try_from(v).map($name).map_err(E::custom)
                    }

                    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                        v.parse().map_err(E::custom)
                    }
                }

                deserializer.deserialize_any(IdVisitor)
            }
        }
    };
}

numeric_id!(
    /// Identifier of a badge holder
    UserId,
    "USER_"
);

numeric_id!(
    /// Identifier of a door controller or other addressable device
    DeviceId,
    "DEV_"
);

numeric_id!(
    /// Identifier of a physical area (zone) of the facility
    AreaId,
    "AREA_"
);

numeric_id!(
    /// Identifier of a single door
    DoorId,
    "DOOR_"
);

numeric_id!(
    /// Identifier of an interlock or linkage rule row in the catalog
    RuleId,
    "RULE_"
);

/// Unique identifier for a linkage execution log row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExecutionId(pub Uuid);

impl ExecutionId {
    /// Create a new random execution ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ExecutionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EXEC_{}", self.0.simple())
    }
}

impl Serialize for ExecutionId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("EXEC_{}", self.0.simple()))
    }
}

impl<'de> Deserialize<'de> for ExecutionId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let raw = s.strip_prefix("EXEC_").unwrap_or(&s);
        let uuid = Uuid::parse_str(raw).map_err(serde::de::Error::custom)?;
        Ok(ExecutionId(uuid))
    }
}
