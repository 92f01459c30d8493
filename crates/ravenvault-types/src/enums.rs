//! Enumeration types stored on entity records.
//!
//! Every enumeration carries explicit discriminants; the query builder
//! writes the underlying integer, never the variant name.

use serde::{Deserialize, Serialize};

use crate::schema::SqlValue;

/// Implements `From<$name> for SqlValue` using the `repr(i32)` discriminant.
macro_rules! sql_enum {
    ($($name:ident),* $(,)?) => {
        $(
            impl From<$name> for SqlValue {
                fn from(value: $name) -> Self {
                    Self::Enum(i64::from(value as i32))
                }
            }
        )*
    };
}

/// Character body type used by the appearance record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum Gender {
    /// Male body type.
    Male = 0,
    /// Female body type.
    Female = 1,
}

/// Broad classification of an item definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ItemCategory {
    /// Melee, ranged, or magic weapon.
    Weapon = 0,
    /// Wearable armor piece.
    Armor = 1,
    /// Ring slot.
    Ring = 2,
    /// Amulet slot.
    Amulet = 3,
    /// Consumable food.
    Food = 4,
    /// Consumable potion.
    Potion = 5,
    /// Companion pet.
    Pet = 6,
    /// Crafting material.
    Resource = 7,
    /// Cosmetic only.
    Cosmetic = 8,
    /// Scroll with a one-shot effect.
    Scroll = 9,
}

/// Equipment slot or usage type of an item definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ItemType {
    /// Not equippable.
    None = 0,
    /// Two-handed sword.
    TwoHandedSword = 1,
    /// One-handed sword.
    OneHandedSword = 2,
    /// Bow.
    TwoHandedBow = 3,
    /// Staff.
    TwoHandedStaff = 4,
    /// Helmet.
    Helmet = 5,
    /// Chest armor.
    Chest = 6,
    /// Gloves.
    Gloves = 7,
    /// Leg armor.
    Leggings = 8,
    /// Boots.
    Boots = 9,
    /// Shield.
    Shield = 10,
    /// Ring.
    Ring = 11,
    /// Amulet.
    Amulet = 12,
    /// Pet.
    Pet = 13,
}

/// Lifecycle state of a game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum SessionStatus {
    /// The session is live.
    Active = 0,
    /// The session ended normally.
    Inactive = 1,
    /// The session was terminated by the server.
    Terminated = 2,
}

/// Kind of event pushed to a running game session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum GameEventType {
    /// A player joined the session.
    PlayerAdd = 0,
    /// A player was removed from the session.
    PlayerRemove = 1,
    /// Items were added to a player's inventory.
    ItemAdd = 2,
    /// Items were removed from a player's inventory.
    ItemRemove = 3,
    /// A marketplace listing was bought.
    ItemBuy = 4,
    /// A marketplace listing was sold.
    ItemSell = 5,
    /// A player's appearance changed.
    PlayerAppearance = 6,
    /// A server-wide message.
    ServerMessage = 7,
    /// A village or town update.
    VillageInfo = 8,
}

sql_enum!(Gender, ItemCategory, ItemType, SessionStatus, GameEventType);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_convert_to_discriminant() {
        assert_eq!(SqlValue::from(Gender::Female), SqlValue::Enum(1));
        assert_eq!(SqlValue::from(ItemCategory::Resource), SqlValue::Enum(7));
        assert_eq!(SqlValue::from(GameEventType::ServerMessage), SqlValue::Enum(7));
    }
}
