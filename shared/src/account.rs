//! Persisted account layout.
//!
//! The account file is one JSON object keyed by account id; each value is an
//! [`Account`]. Field names follow the on-disk camelCase layout.

use crate::Rarity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: String,
    /// Milliseconds since the unix epoch.
    pub last_seen: u64,
    #[serde(rename = "totalXP")]
    pub total_xp: u64,
    pub highest_wave: u32,
    #[serde(default)]
    pub inventory: Inventory,
    #[serde(default)]
    pub stats: AccountStats,
}

impl Account {
    pub fn new(id: &str, now_ms: u64) -> Self {
        Self {
            id: id.to_string(),
            last_seen: now_ms,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStats {
    #[serde(default)]
    pub total_kills: u64,
    #[serde(default)]
    pub deaths: u64,
    #[serde(default)]
    pub sessions: u64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inventory {
    #[serde(default)]
    pub petals: Vec<PetalRecord>,
    #[serde(default)]
    pub collected_items: Vec<CollectedItem>,
}

/// Stack of petals of one base type, counted per rarity.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetalRecord {
    pub base_type: String,
    pub rarities: BTreeMap<Rarity, u32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CollectedItem {
    #[serde(rename = "type")]
    pub item_type: String,
    pub amount: u32,
}

impl Inventory {
    pub fn petal_count(&self, base_type: &str, rarity: Rarity) -> u32 {
        self.petals
            .iter()
            .find(|p| p.base_type == base_type)
            .and_then(|p| p.rarities.get(&rarity).copied())
            .unwrap_or(0)
    }

    pub fn add_petal(&mut self, base_type: &str, rarity: Rarity, count: u32) {
        let index = match self.petals.iter().position(|p| p.base_type == base_type) {
            Some(index) => index,
            None => {
                self.petals.push(PetalRecord {
                    base_type: base_type.to_string(),
                    rarities: BTreeMap::new(),
                });
                self.petals.len() - 1
            }
        };
        *self.petals[index].rarities.entry(rarity).or_insert(0) += count;
    }

    /// Removes `count` petals. On shortage nothing changes and the held
    /// amount is returned as the error.
    pub fn remove_petal(&mut self, base_type: &str, rarity: Rarity, count: u32) -> Result<(), u32> {
        let have = self.petal_count(base_type, rarity);
        if have < count {
            return Err(have);
        }

        if let Some(record) = self.petals.iter_mut().find(|p| p.base_type == base_type) {
            if have == count {
                record.rarities.remove(&rarity);
            } else {
                record.rarities.insert(rarity, have - count);
            }
        }
        self.petals.retain(|p| !p.rarities.is_empty());
        Ok(())
    }

    pub fn record_item(&mut self, item_type: &str, amount: u32) {
        match self
            .collected_items
            .iter_mut()
            .find(|c| c.item_type == item_type)
        {
            Some(entry) => entry.amount += amount,
            None => self.collected_items.push(CollectedItem {
                item_type: item_type.to_string(),
                amount,
            }),
        }
    }
}
