//! Shared type definitions for the `RavenVault` persistence core.
//!
//! This crate is the single source of truth for the persisted record kinds
//! and the column schema every other crate in the workspace works from.
//!
//! # Modules
//!
//! - [`ids`] -- Type-safe UUID wrappers for all entity identifiers
//! - [`enums`] -- Enumeration types stored on records
//! - [`schema`] -- The [`Entity`] trait, SQL values, rows, and kind descriptors
//! - [`entities`] -- The game's entity kinds

pub mod entities;
pub mod enums;
pub mod ids;
pub mod schema;

// Re-export all public types at crate root for convenience.
pub use entities::{
    Appearance, Character, GameClient, GameEvent, GameSession, InventoryItem, Item, MarketItem,
    Resources, Skills, Statistics, User, find_kind, game_kinds,
};
pub use enums::{GameEventType, Gender, ItemCategory, ItemType, SessionStatus};
pub use ids::{
    AppearanceId, CharacterId, GameClientId, GameEventId, GameSessionId, InventoryItemId, ItemId,
    MarketItemId, ResourcesId, SkillsId, StatisticsId, UserId,
};
pub use schema::{Entity, EntityKind, KEY_COLUMN, LookupGroup, Operation, Row, SqlValue};
