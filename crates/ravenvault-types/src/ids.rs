//! Type-safe identifier wrappers around [`Uuid`].
//!
//! Every entity kind has a strongly-typed ID so identifiers of different
//! kinds cannot be mixed up at compile time. Foreign keys are stored as these
//! wrappers; the store and the query builder work on the inner [`Uuid`].
//! New IDs use UUID v7 (time-ordered) for efficient database indexing.

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
        #[serde(transparent)]
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

        impl From<$name> for $crate::schema::SqlValue {
            fn from(id: $name) -> Self {
                Self::Uuid(id.0)
            }
        }
    };
}

define_id! {
    /// Unique identifier for a user account.
    UserId
}

define_id! {
    /// Unique identifier for a player character.
    CharacterId
}

define_id! {
    /// Unique identifier for a character's skill record.
    SkillsId
}

define_id! {
    /// Unique identifier for a character's resource wallet.
    ResourcesId
}

define_id! {
    /// Unique identifier for a character's statistics record.
    StatisticsId
}

define_id! {
    /// Unique identifier for a character's appearance record.
    AppearanceId
}

define_id! {
    /// Unique identifier for an item definition in the catalog.
    ItemId
}

define_id! {
    /// Unique identifier for a stack of items owned by a character.
    InventoryItemId
}

define_id! {
    /// Unique identifier for a marketplace listing.
    MarketItemId
}

define_id! {
    /// Unique identifier for a game session hosted by a streamer.
    GameSessionId
}

define_id! {
    /// Unique identifier for an event queued for a game session.
    GameEventId
}

define_id! {
    /// Unique identifier for a released game client build.
    GameClientId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let user = UserId::new();
        let character = CharacterId::new();
        // Different types -- the compiler enforces no mixing.
        assert_ne!(user.into_inner(), Uuid::nil());
        assert_ne!(character.into_inner(), Uuid::nil());
    }

    #[test]
    fn id_serializes_as_bare_uuid() {
        let id = CharacterId::new();
        let json = serde_json::to_string(&id).ok();
        assert_eq!(json, Some(format!("\"{}\"", id.into_inner())));
    }

    #[test]
    fn id_display_matches_uuid() {
        let id = ItemId::new();
        assert_eq!(id.to_string(), id.into_inner().to_string());
    }
}
