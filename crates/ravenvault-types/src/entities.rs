//! Entity kinds persisted by the store.
//!
//! Every kind is a plain field bag: relationships are expressed only through
//! typed foreign keys, never through embedded references. Each kind implements
//! [`Entity`] with its table name, column list, and lookup groups. Snapshot
//! JSON uses `PascalCase` property names, matching the column names.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::enums::{GameEventType, Gender, ItemCategory, ItemType, SessionStatus};
use crate::ids::{
    AppearanceId, CharacterId, GameClientId, GameEventId, GameSessionId, InventoryItemId, ItemId,
    MarketItemId, ResourcesId, SkillsId, StatisticsId, UserId,
};
use crate::schema::{Entity, EntityKind, LookupGroup, SqlValue};

/// Prefix of every kind's fully-qualified name.
pub const QUALIFIED_PREFIX: &str = "ravenvault.entities";

/// Lookup group keyed by the owning user.
pub const GROUP_USER: &str = "User";
/// Lookup group keyed by the owning character.
pub const GROUP_CHARACTER: &str = "Character";
/// Lookup group keyed by the referenced item definition.
pub const GROUP_ITEM: &str = "Item";
/// Lookup group keyed by the game session.
pub const GROUP_SESSION: &str = "Session";

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A user account, usually linked to a streaming platform identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct User {
    /// Primary key.
    pub id: UserId,
    /// Platform account identifier (a numeric string for Twitch accounts).
    pub user_id: String,
    /// Login name.
    pub user_name: String,
    /// Display name shown in game.
    pub display_name: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Password hash for website logins.
    pub password_hash: Option<String>,
    /// Administrator flag.
    pub is_admin: Option<bool>,
    /// Moderator flag.
    pub is_moderator: Option<bool>,
    /// Supporter tier, if any.
    pub patreon_tier: Option<i32>,
    /// Account creation time.
    pub created: DateTime<Utc>,
    /// Last time the account record was modified.
    pub last_modified: Option<DateTime<Utc>>,
}

impl Entity for User {
    const KIND: &'static str = "User";
    const QUALIFIED_NAME: &'static str = "ravenvault.entities.User";
    const COLUMNS: &'static [&'static str] = &[
        "Id",
        "UserId",
        "UserName",
        "DisplayName",
        "Email",
        "PasswordHash",
        "IsAdmin",
        "IsModerator",
        "PatreonTier",
        "Created",
        "LastModified",
    ];

    fn key(&self) -> Uuid {
        self.id.into_inner()
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.user_id.as_str().into(),
            self.user_name.as_str().into(),
            SqlValue::nullable(self.display_name.as_deref()),
            SqlValue::nullable(self.email.as_deref()),
            SqlValue::nullable(self.password_hash.as_deref()),
            SqlValue::OptionalBool(self.is_admin),
            SqlValue::OptionalBool(self.is_moderator),
            SqlValue::nullable(self.patreon_tier),
            self.created.into(),
            SqlValue::nullable(self.last_modified),
        ]
    }
}

// ---------------------------------------------------------------------------
// Character
// ---------------------------------------------------------------------------

/// A player character. Skills, resources, statistics and appearance live in
/// separate records referenced by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Character {
    /// Primary key.
    pub id: CharacterId,
    /// Owning user.
    pub user_id: UserId,
    /// Character name. Legacy rows may carry a bare numeric platform id here.
    pub name: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Slot identifier chosen by the player (`"0"`, `"1"`, ...).
    pub identifier: Option<String>,
    /// Skill record.
    pub skills_id: SkillsId,
    /// Resource wallet.
    pub resources_id: ResourcesId,
    /// Statistics record.
    pub statistics_id: StatisticsId,
    /// Appearance record.
    pub appearance_id: AppearanceId,
    /// Game session currently holding this character, if any.
    pub session_id: Option<GameSessionId>,
    /// Last time the character joined a session.
    pub last_used: Option<DateTime<Utc>>,
    /// Whether the character was created by a local (offline) client.
    pub local: bool,
    /// Monotonic revision bumped by the game server.
    pub revision: i32,
    /// Creation time.
    pub created: DateTime<Utc>,
}

impl Entity for Character {
    const KIND: &'static str = "Character";
    const QUALIFIED_NAME: &'static str = "ravenvault.entities.Character";
    const COLUMNS: &'static [&'static str] = &[
        "Id",
        "UserId",
        "Name",
        "Description",
        "Identifier",
        "SkillsId",
        "ResourcesId",
        "StatisticsId",
        "AppearanceId",
        "SessionId",
        "LastUsed",
        "Local",
        "Revision",
        "Created",
    ];
    const LOOKUP_GROUPS: &'static [LookupGroup<Self>] = &[
        LookupGroup::new(GROUP_USER, |c: &Self| Some(c.user_id.into_inner())),
        LookupGroup::new(GROUP_SESSION, |c: &Self| {
            c.session_id.map(GameSessionId::into_inner)
        }),
    ];

    fn key(&self) -> Uuid {
        self.id.into_inner()
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.user_id.into(),
            self.name.as_str().into(),
            SqlValue::nullable(self.description.as_deref()),
            SqlValue::nullable(self.identifier.as_deref()),
            self.skills_id.into(),
            self.resources_id.into(),
            self.statistics_id.into(),
            self.appearance_id.into(),
            SqlValue::nullable(self.session_id),
            SqlValue::nullable(self.last_used),
            self.local.into(),
            self.revision.into(),
            self.created.into(),
        ]
    }
}

// ---------------------------------------------------------------------------
// Skills
// ---------------------------------------------------------------------------

/// Accumulated experience per skill for one character. A new character
/// starts from [`Default`]: zero experience everywhere.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Skills {
    /// Primary key.
    pub id: SkillsId,
    /// Attack experience.
    pub attack: f64,
    /// Defense experience.
    pub defense: f64,
    /// Strength experience.
    pub strength: f64,
    /// Health experience.
    pub health: f64,
    /// Magic experience.
    pub magic: f64,
    /// Ranged experience.
    pub ranged: f64,
    /// Woodcutting experience.
    pub woodcutting: f64,
    /// Fishing experience.
    pub fishing: f64,
    /// Mining experience.
    pub mining: f64,
    /// Crafting experience.
    pub crafting: f64,
    /// Cooking experience.
    pub cooking: f64,
    /// Farming experience.
    pub farming: f64,
    /// Slayer experience.
    pub slayer: f64,
    /// Sailing experience.
    pub sailing: f64,
    /// Healing experience.
    pub healing: f64,
}

impl Entity for Skills {
    const KIND: &'static str = "Skills";
    const QUALIFIED_NAME: &'static str = "ravenvault.entities.Skills";
    const COLUMNS: &'static [&'static str] = &[
        "Id",
        "Attack",
        "Defense",
        "Strength",
        "Health",
        "Magic",
        "Ranged",
        "Woodcutting",
        "Fishing",
        "Mining",
        "Crafting",
        "Cooking",
        "Farming",
        "Slayer",
        "Sailing",
        "Healing",
    ];

    fn key(&self) -> Uuid {
        self.id.into_inner()
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.attack.into(),
            self.defense.into(),
            self.strength.into(),
            self.health.into(),
            self.magic.into(),
            self.ranged.into(),
            self.woodcutting.into(),
            self.fishing.into(),
            self.mining.into(),
            self.crafting.into(),
            self.cooking.into(),
            self.farming.into(),
            self.slayer.into(),
            self.sailing.into(),
            self.healing.into(),
        ]
    }
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// Village resources and coins owned by one character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resources {
    /// Primary key.
    pub id: ResourcesId,
    /// Wood.
    pub wood: f64,
    /// Fish.
    pub fish: f64,
    /// Ore.
    pub ore: f64,
    /// Wheat.
    pub wheat: f64,
    /// Magic essence.
    pub magic: f64,
    /// Arrows.
    pub arrows: f64,
    /// Coins.
    pub coins: f64,
}

impl Entity for Resources {
    const KIND: &'static str = "Resources";
    const QUALIFIED_NAME: &'static str = "ravenvault.entities.Resources";
    const COLUMNS: &'static [&'static str] =
        &["Id", "Wood", "Fish", "Ore", "Wheat", "Magic", "Arrows", "Coins"];

    fn key(&self) -> Uuid {
        self.id.into_inner()
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.wood.into(),
            self.fish.into(),
            self.ore.into(),
            self.wheat.into(),
            self.magic.into(),
            self.arrows.into(),
            self.coins.into(),
        ]
    }
}

// ---------------------------------------------------------------------------
// Statistics
// ---------------------------------------------------------------------------

/// Lifetime combat and activity counters for one character.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statistics {
    /// Primary key.
    pub id: StatisticsId,
    /// Raids won.
    pub raids_won: i32,
    /// Raids joined.
    pub raids_joined: i32,
    /// Dungeons won.
    pub dungeons_won: i32,
    /// Duels won.
    pub duels_won: i32,
    /// Duels lost.
    pub duels_lost: i32,
    /// Total damage dealt.
    pub total_damage_dealt: f64,
    /// Total damage taken.
    pub total_damage_taken: f64,
    /// Enemies killed.
    pub enemies_killed: i64,
    /// Deaths.
    pub deaths: i32,
}

impl Entity for Statistics {
    const KIND: &'static str = "Statistics";
    const QUALIFIED_NAME: &'static str = "ravenvault.entities.Statistics";
    const COLUMNS: &'static [&'static str] = &[
        "Id",
        "RaidsWon",
        "RaidsJoined",
        "DungeonsWon",
        "DuelsWon",
        "DuelsLost",
        "TotalDamageDealt",
        "TotalDamageTaken",
        "EnemiesKilled",
        "Deaths",
    ];

    fn key(&self) -> Uuid {
        self.id.into_inner()
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.raids_won.into(),
            self.raids_joined.into(),
            self.dungeons_won.into(),
            self.duels_won.into(),
            self.duels_lost.into(),
            self.total_damage_dealt.into(),
            self.total_damage_taken.into(),
            self.enemies_killed.into(),
            self.deaths.into(),
        ]
    }
}

// ---------------------------------------------------------------------------
// Appearance
// ---------------------------------------------------------------------------

/// Visual customization of one character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Appearance {
    /// Primary key.
    pub id: AppearanceId,
    /// Body type.
    pub gender: Gender,
    /// Skin color as a hex string.
    pub skin_color: String,
    /// Hair color as a hex string.
    pub hair_color: String,
    /// Beard color as a hex string.
    pub beard_color: String,
    /// Eye color as a hex string.
    pub eye_color: String,
    /// Hair style index.
    pub hair: i32,
    /// Beard style index.
    pub beard: i32,
    /// Eyebrow style index.
    pub eyebrows: i32,
    /// Whether the equipped helmet is rendered.
    pub helmet_visible: bool,
}

impl Entity for Appearance {
    const KIND: &'static str = "Appearance";
    const QUALIFIED_NAME: &'static str = "ravenvault.entities.Appearance";
    const COLUMNS: &'static [&'static str] = &[
        "Id",
        "Gender",
        "SkinColor",
        "HairColor",
        "BeardColor",
        "EyeColor",
        "Hair",
        "Beard",
        "Eyebrows",
        "HelmetVisible",
    ];

    fn key(&self) -> Uuid {
        self.id.into_inner()
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.gender.into(),
            self.skin_color.as_str().into(),
            self.hair_color.as_str().into(),
            self.beard_color.as_str().into(),
            self.eye_color.as_str().into(),
            self.hair.into(),
            self.beard.into(),
            self.eyebrows.into(),
            self.helmet_visible.into(),
        ]
    }
}

// ---------------------------------------------------------------------------
// Item
// ---------------------------------------------------------------------------

/// An item definition in the shared catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Item {
    /// Primary key.
    pub id: ItemId,
    /// Display name.
    pub name: String,
    /// Broad category.
    pub category: ItemCategory,
    /// Slot or usage type.
    pub item_type: ItemType,
    /// Required level.
    pub level: i32,
    /// Weapon accuracy bonus.
    pub weapon_aim: i32,
    /// Weapon power bonus.
    pub weapon_power: i32,
    /// Armor bonus.
    pub armor_power: i32,
    /// Price when bought from the shop.
    pub shop_buy_price: i64,
    /// Price when sold to the shop.
    pub shop_sell_price: i64,
    /// Whether players can craft the item.
    pub craftable: Option<bool>,
    /// Prefab used by the client to render the item.
    pub generic_prefab: Option<String>,
}

impl Entity for Item {
    const KIND: &'static str = "Item";
    const QUALIFIED_NAME: &'static str = "ravenvault.entities.Item";
    const COLUMNS: &'static [&'static str] = &[
        "Id",
        "Name",
        "Category",
        "ItemType",
        "Level",
        "WeaponAim",
        "WeaponPower",
        "ArmorPower",
        "ShopBuyPrice",
        "ShopSellPrice",
        "Craftable",
        "GenericPrefab",
    ];

    fn key(&self) -> Uuid {
        self.id.into_inner()
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.name.as_str().into(),
            self.category.into(),
            self.item_type.into(),
            self.level.into(),
            self.weapon_aim.into(),
            self.weapon_power.into(),
            self.armor_power.into(),
            self.shop_buy_price.into(),
            self.shop_sell_price.into(),
            SqlValue::OptionalBool(self.craftable),
            SqlValue::nullable(self.generic_prefab.as_deref()),
        ]
    }
}

// ---------------------------------------------------------------------------
// InventoryItem
// ---------------------------------------------------------------------------

/// A stack of one item owned by a character.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InventoryItem {
    /// Primary key.
    pub id: InventoryItemId,
    /// Owning character.
    pub character_id: CharacterId,
    /// Item definition.
    pub item_id: ItemId,
    /// Stack size.
    pub amount: i64,
    /// Whether this instance is currently equipped.
    pub equipped: bool,
    /// Free-form tag (enchantment, owner note).
    pub tag: Option<String>,
    /// Whether the stack can leave the character.
    pub soulbound: Option<bool>,
}

impl Entity for InventoryItem {
    const KIND: &'static str = "InventoryItem";
    const QUALIFIED_NAME: &'static str = "ravenvault.entities.InventoryItem";
    const COLUMNS: &'static [&'static str] = &[
        "Id",
        "CharacterId",
        "ItemId",
        "Amount",
        "Equipped",
        "Tag",
        "Soulbound",
    ];
    const LOOKUP_GROUPS: &'static [LookupGroup<Self>] = &[
        LookupGroup::new(GROUP_CHARACTER, |i: &Self| Some(i.character_id.into_inner())),
        LookupGroup::new(GROUP_ITEM, |i: &Self| Some(i.item_id.into_inner())),
    ];

    fn key(&self) -> Uuid {
        self.id.into_inner()
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.character_id.into(),
            self.item_id.into(),
            self.amount.into(),
            self.equipped.into(),
            SqlValue::nullable(self.tag.as_deref()),
            SqlValue::OptionalBool(self.soulbound),
        ]
    }
}

// ---------------------------------------------------------------------------
// MarketItem
// ---------------------------------------------------------------------------

/// A marketplace listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MarketItem {
    /// Primary key.
    pub id: MarketItemId,
    /// Character selling the stack.
    pub seller_character_id: CharacterId,
    /// Item definition.
    pub item_id: ItemId,
    /// Units listed.
    pub amount: i64,
    /// Asking price per unit.
    pub price_per_item: Decimal,
    /// Listing time.
    pub created: DateTime<Utc>,
    /// Expiry time, if the listing expires.
    pub expires: Option<DateTime<Utc>>,
    /// Tag carried over from the inventory stack.
    pub tag: Option<String>,
}

impl Entity for MarketItem {
    const KIND: &'static str = "MarketItem";
    const QUALIFIED_NAME: &'static str = "ravenvault.entities.MarketItem";
    const COLUMNS: &'static [&'static str] = &[
        "Id",
        "SellerCharacterId",
        "ItemId",
        "Amount",
        "PricePerItem",
        "Created",
        "Expires",
        "Tag",
    ];
    const LOOKUP_GROUPS: &'static [LookupGroup<Self>] = &[
        LookupGroup::new(GROUP_CHARACTER, |m: &Self| {
            Some(m.seller_character_id.into_inner())
        }),
        LookupGroup::new(GROUP_ITEM, |m: &Self| Some(m.item_id.into_inner())),
    ];

    fn key(&self) -> Uuid {
        self.id.into_inner()
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.seller_character_id.into(),
            self.item_id.into(),
            self.amount.into(),
            self.price_per_item.into(),
            self.created.into(),
            SqlValue::nullable(self.expires),
            SqlValue::nullable(self.tag.as_deref()),
        ]
    }
}

// ---------------------------------------------------------------------------
// GameSession
// ---------------------------------------------------------------------------

/// A game session hosted by a streamer's client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameSession {
    /// Primary key.
    pub id: GameSessionId,
    /// Hosting user.
    pub user_id: UserId,
    /// Lifecycle state.
    pub status: SessionStatus,
    /// Event revision counter.
    pub revision: i32,
    /// Start time.
    pub started: DateTime<Utc>,
    /// Stop time, once ended.
    pub stopped: Option<DateTime<Utc>>,
    /// Whether the session runs against a local server.
    pub local: bool,
}

impl Entity for GameSession {
    const KIND: &'static str = "GameSession";
    const QUALIFIED_NAME: &'static str = "ravenvault.entities.GameSession";
    const COLUMNS: &'static [&'static str] =
        &["Id", "UserId", "Status", "Revision", "Started", "Stopped", "Local"];
    const LOOKUP_GROUPS: &'static [LookupGroup<Self>] = &[LookupGroup::new(
        GROUP_USER,
        |s: &Self| Some(s.user_id.into_inner()),
    )];

    fn key(&self) -> Uuid {
        self.id.into_inner()
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.user_id.into(),
            self.status.into(),
            self.revision.into(),
            self.started.into(),
            SqlValue::nullable(self.stopped),
            self.local.into(),
        ]
    }
}

// ---------------------------------------------------------------------------
// GameEvent
// ---------------------------------------------------------------------------

/// An event queued for delivery to a game session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameEvent {
    /// Primary key.
    pub id: GameEventId,
    /// Target session.
    pub game_session_id: GameSessionId,
    /// Hosting user of the target session.
    pub user_id: UserId,
    /// Event kind.
    pub event_type: GameEventType,
    /// Session revision at which the event was raised.
    pub revision: i32,
    /// JSON payload.
    pub data: String,
}

impl Entity for GameEvent {
    const KIND: &'static str = "GameEvent";
    const QUALIFIED_NAME: &'static str = "ravenvault.entities.GameEvent";
    const COLUMNS: &'static [&'static str] =
        &["Id", "GameSessionId", "UserId", "EventType", "Revision", "Data"];
    const LOOKUP_GROUPS: &'static [LookupGroup<Self>] = &[
        LookupGroup::new(GROUP_SESSION, |e: &Self| Some(e.game_session_id.into_inner())),
        LookupGroup::new(GROUP_USER, |e: &Self| Some(e.user_id.into_inner())),
    ];

    fn key(&self) -> Uuid {
        self.id.into_inner()
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.game_session_id.into(),
            self.user_id.into(),
            self.event_type.into(),
            self.revision.into(),
            self.data.as_str().into(),
        ]
    }
}

// ---------------------------------------------------------------------------
// GameClient
// ---------------------------------------------------------------------------

/// A released game client build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GameClient {
    /// Primary key.
    pub id: GameClientId,
    /// Semantic version string.
    pub client_version: String,
    /// Key the client presents when opening a session.
    pub access_key: String,
    /// Download URL.
    pub download_link: Option<String>,
    /// Release time.
    pub released: DateTime<Utc>,
}

impl Entity for GameClient {
    const KIND: &'static str = "GameClient";
    const QUALIFIED_NAME: &'static str = "ravenvault.entities.GameClient";
    const COLUMNS: &'static [&'static str] =
        &["Id", "ClientVersion", "AccessKey", "DownloadLink", "Released"];

    fn key(&self) -> Uuid {
        self.id.into_inner()
    }

    fn values(&self) -> Vec<SqlValue> {
        vec![
            self.id.into(),
            self.client_version.as_str().into(),
            self.access_key.as_str().into(),
            SqlValue::nullable(self.download_link.as_deref()),
            self.released.into(),
        ]
    }
}

/// Every game kind, ordered so referenced kinds come before referencing ones.
pub fn game_kinds() -> Vec<EntityKind> {
    vec![
        EntityKind::of::<User>(),
        EntityKind::of::<Item>(),
        EntityKind::of::<GameClient>(),
        EntityKind::of::<Skills>(),
        EntityKind::of::<Resources>(),
        EntityKind::of::<Statistics>(),
        EntityKind::of::<Appearance>(),
        EntityKind::of::<Character>(),
        EntityKind::of::<InventoryItem>(),
        EntityKind::of::<MarketItem>(),
        EntityKind::of::<GameSession>(),
        EntityKind::of::<GameEvent>(),
    ]
}

/// Look up a game kind by table name or fully-qualified name.
pub fn find_kind(name: &str) -> Option<EntityKind> {
    game_kinds()
        .into_iter()
        .find(|kind| kind.name() == name || kind.qualified_name() == name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    fn sample_character() -> Character {
        Character {
            id: CharacterId::new(),
            user_id: UserId::new(),
            name: "Zerratar".to_owned(),
            description: None,
            identifier: Some("0".to_owned()),
            skills_id: SkillsId::new(),
            resources_id: ResourcesId::new(),
            statistics_id: StatisticsId::new(),
            appearance_id: AppearanceId::new(),
            session_id: None,
            last_used: None,
            local: false,
            revision: 3,
            created: Utc::now(),
        }
    }

    #[test]
    fn column_and_value_counts_match() {
        let c = sample_character();
        assert_eq!(Character::COLUMNS.len(), c.values().len());

        let inv = InventoryItem {
            id: InventoryItemId::new(),
            character_id: c.id,
            item_id: ItemId::new(),
            amount: 4,
            equipped: false,
            tag: None,
            soulbound: None,
        };
        assert_eq!(InventoryItem::COLUMNS.len(), inv.values().len());

        let skills = Skills {
            id: c.skills_id,
            attack: 1.0,
            defense: 1.0,
            strength: 1.0,
            health: 1.0,
            magic: 0.0,
            ranged: 0.0,
            woodcutting: 0.0,
            fishing: 0.0,
            mining: 0.0,
            crafting: 0.0,
            cooking: 0.0,
            farming: 0.0,
            slayer: 0.0,
            sailing: 0.0,
            healing: 0.0,
        };
        assert_eq!(Skills::COLUMNS.len(), skills.values().len());
    }

    #[test]
    fn every_kind_starts_with_key_column() {
        for kind in game_kinds() {
            assert_eq!(kind.columns().first().copied(), Some(crate::schema::KEY_COLUMN));
            assert!(kind.qualified_name().starts_with(QUALIFIED_PREFIX));
        }
    }

    #[test]
    fn json_uses_pascal_case_columns() {
        let c = sample_character();
        let json = serde_json::to_value(&c).unwrap();
        for column in Character::COLUMNS {
            assert!(json.get(column).is_some(), "missing property {column}");
        }
    }

    #[test]
    fn kind_decodes_json_array_into_rows() {
        let c = sample_character();
        let json = serde_json::to_value(vec![c.clone()]).unwrap();
        let rows = EntityKind::of::<Character>().rows(&json).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].key, c.id.into_inner());
        assert_eq!(rows[0].table, "Character");
    }

    #[test]
    fn lookup_groups_extract_foreign_keys() {
        let mut c = sample_character();
        let groups = Character::LOOKUP_GROUPS;
        assert_eq!(groups[0].key_of(&c), Some(c.user_id.into_inner()));
        assert_eq!(groups[1].key_of(&c), None);

        let session = GameSessionId::new();
        c.session_id = Some(session);
        assert_eq!(groups[1].key_of(&c), Some(session.into_inner()));
    }

    #[test]
    fn find_kind_accepts_both_names() {
        assert!(find_kind("MarketItem").is_some());
        assert!(find_kind("ravenvault.entities.MarketItem").is_some());
        assert!(find_kind("Clan").is_none());
    }
}
