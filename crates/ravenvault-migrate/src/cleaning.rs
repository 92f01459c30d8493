//! Data-cleaning rules applied by the character migration.
//!
//! Legacy data carries duplicated inventory rows, runaway market listings,
//! and "ghost" characters named after a bare numeric Twitch id. Each rule
//! here is a pure function over typed records that counts what it changed
//! in a [`CleaningReport`].

use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};

use ravenvault_backup::{BackupError, Snapshot};
use ravenvault_types::{
    Appearance, Character, CharacterId, Entity, InventoryItem, InventoryItemId, ItemId,
    MarketItem, Resources, Skills, Statistics, UserId,
};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

/// Merged stacks above this many units are clamped.
pub const MAX_STACK_AMOUNT: i64 = 10_000;

/// Amount an oversized stack is clamped to.
pub const CLAMPED_STACK_AMOUNT: i64 = 10;

/// Cap on a market listing's amount and price per unit.
pub const MAX_MARKET_VALUE: i64 = 10_000_000;

/// What the cleaning rules changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleaningReport {
    /// Inventory rows dropped because another row had the same id.
    pub duplicates_dropped: usize,
    /// Inventory rows folded into another stack of the same item.
    pub stacks_merged: usize,
    /// Equipped instances forced to amount 1.
    pub equipped_split: usize,
    /// Stacks clamped to [`CLAMPED_STACK_AMOUNT`].
    pub stacks_clamped: usize,
    /// Market listings whose amount or price was capped.
    pub listings_capped: usize,
    /// Ghost characters skipped.
    pub ghosts_skipped: usize,
    /// Child rows dropped with a skipped ghost.
    pub children_dropped: usize,
}

/// Whether a character name is a bare numeric id.
pub fn is_ghost_name(name: &str) -> bool {
    !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit())
}

/// Split characters into kept and skipped ghosts.
///
/// A character is a ghost when its name is a bare numeric id and the same
/// user owns another character whose name is not.
pub fn filter_ghost_characters(
    characters: Vec<Character>,
    report: &mut CleaningReport,
) -> (Vec<Character>, Vec<Character>) {
    let real_owners: HashSet<UserId> = characters
        .iter()
        .filter(|c| !is_ghost_name(&c.name))
        .map(|c| c.user_id)
        .collect();

    let (skipped, kept): (Vec<Character>, Vec<Character>) = characters
        .into_iter()
        .partition(|c| is_ghost_name(&c.name) && real_owners.contains(&c.user_id));
    for ghost in &skipped {
        tracing::debug!(character = %ghost.id, user = %ghost.user_id, "ghost character skipped");
    }
    report.ghosts_skipped = report.ghosts_skipped.saturating_add(skipped.len());
    (kept, skipped)
}

/// Deduplicate and merge inventory rows, per character.
///
/// Rows sharing an id keep the larger stack. Rows of the same item are
/// then merged into one stack; an equipped instance keeps amount 1 and the
/// rest goes to the unequipped stack. A stack above [`MAX_STACK_AMOUNT`]
/// is clamped to [`CLAMPED_STACK_AMOUNT`].
///
/// A resulting stack keeps its own `tag` and `soulbound` values. Where one
/// is null it takes the first non-null value among the merged rows, in id
/// order; other differing values are discarded.
pub fn merge_inventory(
    items: Vec<InventoryItem>,
    report: &mut CleaningReport,
) -> Vec<InventoryItem> {
    let mut by_character: BTreeMap<CharacterId, Vec<InventoryItem>> = BTreeMap::new();
    for item in items {
        by_character.entry(item.character_id).or_default().push(item);
    }
    by_character
        .into_values()
        .flat_map(|rows| merge_character(rows, report))
        .collect()
}

fn merge_character(rows: Vec<InventoryItem>, report: &mut CleaningReport) -> Vec<InventoryItem> {
    let mut unique: HashMap<InventoryItemId, InventoryItem> = HashMap::new();
    for row in rows {
        match unique.entry(row.id) {
            Entry::Occupied(mut existing) => {
                report.duplicates_dropped = report.duplicates_dropped.saturating_add(1);
                if row.amount > existing.get().amount {
                    existing.insert(row);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(row);
            }
        }
    }

    let mut by_item: BTreeMap<ItemId, Vec<InventoryItem>> = BTreeMap::new();
    for row in unique.into_values() {
        by_item.entry(row.item_id).or_default().push(row);
    }

    let mut merged = Vec::new();
    for mut group in by_item.into_values() {
        group.sort_by_key(|r| r.id);
        merged.extend(merge_group(group, report));
    }
    merged
}

fn merge_group(group: Vec<InventoryItem>, report: &mut CleaningReport) -> Vec<InventoryItem> {
    let Some(first) = group.first() else {
        return Vec::new();
    };
    let (character_id, item_id) = (first.character_id, first.item_id);
    report.stacks_merged = report
        .stacks_merged
        .saturating_add(group.len().saturating_sub(1));
    let total = group
        .iter()
        .map(|r| r.amount.max(0))
        .fold(0_i64, i64::saturating_add);
    let tag = group.iter().find_map(|r| r.tag.clone());
    let soulbound = group.iter().find_map(|r| r.soulbound);
    let conflicting = group.iter().any(|r| {
        (r.tag.is_some() && r.tag != tag) || (r.soulbound.is_some() && r.soulbound != soulbound)
    });
    if conflicting {
        tracing::debug!(
            character = %character_id,
            item = %item_id,
            "merged stacks disagree on tag or soulbound; first value kept"
        );
    }

    let (equipped, unequipped): (Vec<InventoryItem>, Vec<InventoryItem>) =
        group.into_iter().partition(|r| r.equipped);

    let mut out = Vec::with_capacity(2);
    let remainder = match equipped.into_iter().next() {
        Some(mut worn) => {
            if worn.amount != 1 {
                report.equipped_split = report.equipped_split.saturating_add(1);
            }
            worn.amount = 1;
            out.push(worn);
            total.saturating_sub(1)
        }
        None => total,
    };

    if remainder > 0 {
        let mut stack = unequipped.into_iter().next().unwrap_or_else(|| InventoryItem {
            id: InventoryItemId::new(),
            character_id,
            item_id,
            amount: 0,
            equipped: false,
            tag: None,
            soulbound: None,
        });
        stack.amount = remainder;
        if stack.amount > MAX_STACK_AMOUNT {
            tracing::debug!(
                character = %character_id,
                item = %item_id,
                amount = stack.amount,
                "oversized stack clamped"
            );
            stack.amount = CLAMPED_STACK_AMOUNT;
            report.stacks_clamped = report.stacks_clamped.saturating_add(1);
        }
        out.push(stack);
    }
    for row in &mut out {
        if row.tag.is_none() {
            row.tag.clone_from(&tag);
        }
        row.soulbound = row.soulbound.or(soulbound);
    }
    out
}

/// Cap each listing's amount and price per unit at [`MAX_MARKET_VALUE`].
pub fn cap_market_listings(
    listings: Vec<MarketItem>,
    report: &mut CleaningReport,
) -> Vec<MarketItem> {
    let max_price = Decimal::from(MAX_MARKET_VALUE);
    listings
        .into_iter()
        .map(|mut listing| {
            let mut capped = false;
            if listing.amount > MAX_MARKET_VALUE {
                listing.amount = MAX_MARKET_VALUE;
                capped = true;
            }
            if listing.price_per_item > max_price {
                listing.price_per_item = max_price;
                capped = true;
            }
            if capped {
                report.listings_capped = report.listings_capped.saturating_add(1);
            }
            listing
        })
        .collect()
}

/// Apply every rule to a snapshot.
///
/// Ghost characters are skipped together with their skills, resources,
/// statistics, appearance, inventory, and market listings. Only kinds
/// present in `snapshot` are replaced; other kinds pass through unchanged.
pub fn clean_snapshot(snapshot: &Snapshot) -> Result<(Snapshot, CleaningReport), BackupError> {
    let mut report = CleaningReport::default();
    let mut cleaned = snapshot.clone();

    let (characters, ghosts) = filter_ghost_characters(snapshot.entities::<Character>()?, &mut report);
    let ghost_ids: HashSet<CharacterId> = ghosts.iter().map(|g| g.id).collect();
    let ghost_children: HashSet<Uuid> = ghosts
        .iter()
        .flat_map(|g| {
            [
                g.skills_id.into_inner(),
                g.resources_id.into_inner(),
                g.statistics_id.into_inner(),
                g.appearance_id.into_inner(),
            ]
        })
        .collect();
    replace_if_present(&mut cleaned, characters)?;

    let skills = drop_keys(snapshot.entities::<Skills>()?, &ghost_children, &mut report);
    replace_if_present(&mut cleaned, skills)?;
    let resources = drop_keys(snapshot.entities::<Resources>()?, &ghost_children, &mut report);
    replace_if_present(&mut cleaned, resources)?;
    let statistics = drop_keys(snapshot.entities::<Statistics>()?, &ghost_children, &mut report);
    replace_if_present(&mut cleaned, statistics)?;
    let appearance = drop_keys(snapshot.entities::<Appearance>()?, &ghost_children, &mut report);
    replace_if_present(&mut cleaned, appearance)?;

    let inventory = drop_where(
        snapshot.entities::<InventoryItem>()?,
        |i| ghost_ids.contains(&i.character_id),
        &mut report,
    );
    replace_if_present(&mut cleaned, merge_inventory(inventory, &mut report))?;

    let listings = drop_where(
        snapshot.entities::<MarketItem>()?,
        |m| ghost_ids.contains(&m.seller_character_id),
        &mut report,
    );
    replace_if_present(&mut cleaned, cap_market_listings(listings, &mut report))?;

    Ok((cleaned, report))
}

fn drop_keys<E: Entity>(rows: Vec<E>, keys: &HashSet<Uuid>, report: &mut CleaningReport) -> Vec<E> {
    drop_where(rows, |row| keys.contains(&row.key()), report)
}

fn drop_where<E>(
    rows: Vec<E>,
    dropped: impl Fn(&E) -> bool,
    report: &mut CleaningReport,
) -> Vec<E> {
    let before = rows.len();
    let kept: Vec<E> = rows.into_iter().filter(|row| !dropped(row)).collect();
    report.children_dropped = report
        .children_dropped
        .saturating_add(before.saturating_sub(kept.len()));
    kept
}

fn replace_if_present<E: Entity>(snapshot: &mut Snapshot, rows: Vec<E>) -> Result<(), BackupError> {
    if snapshot.contains(E::QUALIFIED_NAME) {
        snapshot.insert(&rows)?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use chrono::Utc;
    use ravenvault_types::{AppearanceId, ResourcesId, SkillsId, StatisticsId};

    use super::*;

    fn slot(character: CharacterId, item: ItemId, amount: i64, equipped: bool) -> InventoryItem {
        InventoryItem {
            id: InventoryItemId::new(),
            character_id: character,
            item_id: item,
            amount,
            equipped,
            tag: None,
            soulbound: None,
        }
    }

    fn character(user: UserId, name: &str) -> Character {
        Character {
            id: CharacterId::new(),
            user_id: user,
            name: name.to_owned(),
            description: None,
            identifier: None,
            skills_id: SkillsId::new(),
            resources_id: ResourcesId::new(),
            statistics_id: StatisticsId::new(),
            appearance_id: AppearanceId::new(),
            session_id: None,
            last_used: None,
            local: false,
            revision: 0,
            created: Utc::now(),
        }
    }

    fn listing(amount: i64, price: Decimal) -> MarketItem {
        MarketItem {
            id: ravenvault_types::MarketItemId::new(),
            seller_character_id: CharacterId::new(),
            item_id: ItemId::new(),
            amount,
            price_per_item: price,
            created: Utc::now(),
            expires: None,
            tag: None,
        }
    }

    #[test]
    fn equipped_instance_keeps_one_and_oversized_rest_is_clamped() {
        let owner = CharacterId::new();
        let sword = ItemId::new();
        let mut report = CleaningReport::default();
        let merged = merge_inventory(
            vec![slot(owner, sword, 1, true), slot(owner, sword, 15_000, false)],
            &mut report,
        );

        assert_eq!(merged.len(), 2);
        let worn = merged.iter().find(|i| i.equipped).unwrap();
        let bag = merged.iter().find(|i| !i.equipped).unwrap();
        assert_eq!(worn.amount, 1);
        assert_eq!(bag.amount, 10);
        assert_eq!(report.stacks_merged, 1);
        assert_eq!(report.stacks_clamped, 1);
    }

    #[test]
    fn duplicate_ids_keep_the_larger_stack() {
        let owner = CharacterId::new();
        let ore = ItemId::new();
        let small = slot(owner, ore, 3, false);
        let mut large = small.clone();
        large.amount = 40;

        let mut report = CleaningReport::default();
        let merged = merge_inventory(vec![small, large], &mut report);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].amount, 40);
        assert_eq!(report.duplicates_dropped, 1);
        assert_eq!(report.stacks_merged, 0);
    }

    #[test]
    fn stacks_of_one_item_merge_per_character() {
        let (alice, bob) = (CharacterId::new(), CharacterId::new());
        let ore = ItemId::new();
        let mut report = CleaningReport::default();
        let merged = merge_inventory(
            vec![
                slot(alice, ore, 5, false),
                slot(alice, ore, 7, false),
                slot(bob, ore, 2, false),
            ],
            &mut report,
        );

        let alice_total: i64 = merged
            .iter()
            .filter(|i| i.character_id == alice)
            .map(|i| i.amount)
            .sum();
        assert_eq!(merged.len(), 2);
        assert_eq!(alice_total, 12);
    }

    #[test]
    fn lone_equipped_stack_is_split() {
        let owner = CharacterId::new();
        let bow = ItemId::new();
        let mut report = CleaningReport::default();
        let merged = merge_inventory(vec![slot(owner, bow, 4, true)], &mut report);

        assert_eq!(merged.len(), 2);
        assert_eq!(merged.iter().find(|i| i.equipped).unwrap().amount, 1);
        let bag = merged.iter().find(|i| !i.equipped).unwrap();
        assert_eq!(bag.amount, 3);
        assert_eq!(bag.item_id, bow);
        assert_eq!(report.equipped_split, 1);
    }

    #[test]
    fn merged_stack_fills_tag_and_soulbound_from_the_first_row_that_has_them() {
        let owner = CharacterId::new();
        let gem = ItemId::new();
        let with = |n: u128, amount: i64, equipped: bool, tag: Option<&str>, soulbound: Option<bool>| {
            InventoryItem {
                id: InventoryItemId::from(Uuid::from_u128(n)),
                tag: tag.map(str::to_owned),
                soulbound,
                ..slot(owner, gem, amount, equipped)
            }
        };
        let mut report = CleaningReport::default();
        let merged = merge_inventory(
            vec![
                with(3, 4, false, Some("Cursed"), Some(false)),
                with(1, 2, false, None, None),
                with(4, 1, true, Some("Worn"), None),
                with(2, 3, false, Some("Blessed"), Some(true)),
            ],
            &mut report,
        );

        assert_eq!(merged.len(), 2);
        let bag = merged.iter().find(|i| !i.equipped).unwrap();
        assert_eq!(bag.id, InventoryItemId::from(Uuid::from_u128(1)));
        assert_eq!(bag.amount, 9);
        assert_eq!(bag.tag.as_deref(), Some("Blessed"));
        assert_eq!(bag.soulbound, Some(true));
        let worn = merged.iter().find(|i| i.equipped).unwrap();
        assert_eq!(worn.tag.as_deref(), Some("Worn"));
        assert_eq!(worn.soulbound, Some(true));
    }

    #[test]
    fn market_listings_are_capped() {
        let mut report = CleaningReport::default();
        let capped = cap_market_listings(
            vec![
                listing(50_000_000, Decimal::from(3)),
                listing(2, Decimal::from(99_999_999_i64)),
                listing(2, Decimal::new(1_050, 2)),
            ],
            &mut report,
        );

        assert_eq!(capped[0].amount, MAX_MARKET_VALUE);
        assert_eq!(capped[1].price_per_item, Decimal::from(MAX_MARKET_VALUE));
        assert_eq!(capped[2].price_per_item, Decimal::new(1_050, 2));
        assert_eq!(report.listings_capped, 2);
    }

    #[test]
    fn ghost_is_skipped_only_beside_a_real_character() {
        let (owner, lonely) = (UserId::new(), UserId::new());
        let mut report = CleaningReport::default();
        let (kept, skipped) = filter_ghost_characters(
            vec![
                character(owner, "Raven"),
                character(owner, "123456789"),
                character(lonely, "987654321"),
            ],
            &mut report,
        );

        assert_eq!(kept.len(), 2);
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].name, "123456789");
        assert_eq!(report.ghosts_skipped, 1);
    }

    #[test]
    fn ghost_name_detection() {
        assert!(is_ghost_name("40211873"));
        assert!(!is_ghost_name("Raven42"));
        assert!(!is_ghost_name(""));
    }

    #[test]
    fn cleaning_a_snapshot_drops_ghost_children() {
        let owner = UserId::new();
        let real = character(owner, "Raven");
        let ghost = character(owner, "31337");
        let ore = ItemId::new();

        let mut snapshot = Snapshot::new();
        snapshot.insert(&[real.clone(), ghost.clone()]).unwrap();
        snapshot
            .insert(&[slot(real.id, ore, 5, false), slot(ghost.id, ore, 9, false)])
            .unwrap();

        let (cleaned, report) = clean_snapshot(&snapshot).unwrap();
        let characters = cleaned.entities::<Character>().unwrap();
        assert_eq!(characters, vec![real.clone()]);
        let inventory = cleaned.entities::<InventoryItem>().unwrap();
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory[0].character_id, real.id);
        assert_eq!(report.ghosts_skipped, 1);
        assert_eq!(report.children_dropped, 1);
        // Kinds absent from the input stay absent.
        assert!(!cleaned.contains(Skills::QUALIFIED_NAME));
    }
}
