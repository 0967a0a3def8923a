//! Opaque identifiers for store-backed records.
//!
//! Ids normally arrive from the backing store and are treated as opaque
//! strings. Locally created records generate an id from a timestamp plus a
//! process-local counter hashed with blake3, so creations within the same
//! nanosecond stay unique.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

fn generate_hex_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;

    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);

    let hash = blake3::hash(&[&timestamp.to_le_bytes()[..], &counter.to_le_bytes()[..]].concat());
    hex::encode(&hash.as_bytes()[..16])
}

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display,
        )]
        #[serde(transparent)]
        #[display("{_0}")]
        pub struct $name(pub String);

        impl $name {
            /// Generate a fresh id for a locally created record.
            pub fn generate() -> Self {
                Self(generate_hex_id())
            }

            /// The id as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

id_type! {
    /// Unique identifier for a quest instance.
    QuestId
}

id_type! {
    /// Unique identifier for a recurring quest template.
    TemplateId
}

id_type! {
    /// Unique identifier for a family scope.
    FamilyId
}

id_type! {
    /// Unique identifier for a family member.
    MemberId
}

id_type! {
    /// Unique identifier for a playable character.
    CharacterId
}

id_type! {
    /// Unique identifier for a reward definition.
    RewardId
}

id_type! {
    /// Unique identifier for a reward redemption.
    RedemptionId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = QuestId::generate();
        let b = QuestId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn test_serde_transparent() {
        let id = MemberId::from("abc123");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc123\"");
        let back: MemberId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
