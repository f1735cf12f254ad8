//! Rarity tiers, the per-type enemy table and stat resolution.
//!
//! Every enemy type is described by one [`EnemyTraits`] entry: its unscaled
//! [`BaseStats`], movement speeds and the [`Behavior`] the AI runs for it.
//! Adding a type means adding a variant and a table row, nothing else.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Returned when a console or wire name does not match any known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseNameError {
    pub kind: &'static str,
    pub value: String,
}

/// Ordered quality tier. Comparison follows declaration order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Epic,
    Legendary,
}

impl Rarity {
    pub const ALL: [Rarity; 5] = [
        Rarity::Common,
        Rarity::Uncommon,
        Rarity::Rare,
        Rarity::Epic,
        Rarity::Legendary,
    ];

    pub fn multiplier(self) -> f32 {
        match self {
            Rarity::Common => 1.0,
            Rarity::Uncommon => 1.5,
            Rarity::Rare => 2.25,
            Rarity::Epic => 3.375,
            Rarity::Legendary => 5.0,
        }
    }

    /// The tier directly above this one, if any.
    pub fn next(self) -> Option<Rarity> {
        match self {
            Rarity::Common => Some(Rarity::Uncommon),
            Rarity::Uncommon => Some(Rarity::Rare),
            Rarity::Rare => Some(Rarity::Epic),
            Rarity::Epic => Some(Rarity::Legendary),
            Rarity::Legendary => None,
        }
    }

    /// Lowest rarity allowed to spawn in `wave`.
    pub fn minimum_for_wave(wave: u32) -> Rarity {
        match wave {
            w if w >= 40 => Rarity::Legendary,
            w if w >= 30 => Rarity::Epic,
            w if w >= 20 => Rarity::Rare,
            w if w >= 10 => Rarity::Uncommon,
            _ => Rarity::Common,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Rarity::Common => "common",
            Rarity::Uncommon => "uncommon",
            Rarity::Rare => "rare",
            Rarity::Epic => "epic",
            Rarity::Legendary => "legendary",
        }
    }
}

impl fmt::Display for Rarity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rarity {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Rarity::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ParseNameError {
                kind: "rarity",
                value: s.to_string(),
            })
    }
}

/// Unscaled stats of an enemy type before the rarity multiplier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaseStats {
    pub health: f32,
    pub damage: f32,
    pub xp: f32,
    pub size: f32,
}

/// Stats after applying a rarity multiplier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectiveStats {
    pub health: f32,
    pub damage: f32,
    pub xp: u32,
    pub size: f32,
}

/// Scales `base` by the multiplier of `rarity`. Size grows at half strength.
pub fn effective_stats(base: &BaseStats, rarity: Rarity) -> EffectiveStats {
    let mult = rarity.multiplier();
    EffectiveStats {
        health: (base.health * mult).round(),
        damage: (base.damage * mult).round(),
        xp: (base.xp * mult).round() as u32,
        size: base.size * (1.0 + (mult - 1.0) * 0.5),
    }
}

/// Movement routine the AI runs for a passive enemy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Locks onto the nearest player as soon as one exists.
    Seeker,
    /// Centipede head: straight wander with a sinusoidal wiggle.
    Serpent,
    /// Centipede body: trails the entity it follows.
    Segment,
    /// Random wander with periodic direction changes.
    Wanderer,
    /// Wanderer that also bobs up and down in the air.
    Hoverer,
}

/// One row of the enemy table.
#[derive(Debug, Clone, Copy)]
pub struct EnemyTraits {
    pub base: BaseStats,
    /// World units per tick while chasing a target.
    pub speed: f32,
    /// World units per tick while wandering.
    pub passive_speed: f32,
    pub spawns_aggressive: bool,
    /// Turns on its attacker after the first hit.
    pub retaliates: bool,
    pub behavior: Behavior,
}

const LADYBUG: EnemyTraits = EnemyTraits {
    base: BaseStats {
        health: 50.0,
        damage: 10.0,
        xp: 10.0,
        size: 0.5,
    },
    speed: 0.05,
    passive_speed: 0.02,
    spawns_aggressive: false,
    retaliates: true,
    behavior: Behavior::Wanderer,
};

const BEE: EnemyTraits = EnemyTraits {
    base: BaseStats {
        health: 40.0,
        damage: 15.0,
        xp: 15.0,
        size: 0.4,
    },
    speed: 0.07,
    passive_speed: 0.03,
    spawns_aggressive: false,
    retaliates: false,
    behavior: Behavior::Hoverer,
};

const CENTIPEDE: EnemyTraits = EnemyTraits {
    base: BaseStats {
        health: 100.0,
        damage: 10.0,
        xp: 25.0,
        size: 0.6,
    },
    speed: 0.04,
    passive_speed: 0.025,
    spawns_aggressive: false,
    retaliates: false,
    behavior: Behavior::Serpent,
};

const CENTIPEDE_SEGMENT: EnemyTraits = EnemyTraits {
    base: BaseStats {
        health: 30.0,
        damage: 10.0,
        xp: 5.0,
        size: 0.5,
    },
    speed: 0.04,
    passive_speed: 0.025,
    spawns_aggressive: false,
    retaliates: false,
    behavior: Behavior::Segment,
};

const SPIDER: EnemyTraits = EnemyTraits {
    base: BaseStats {
        health: 80.0,
        damage: 20.0,
        xp: 30.0,
        size: 0.6,
    },
    speed: 0.08,
    passive_speed: 0.03,
    spawns_aggressive: true,
    retaliates: false,
    behavior: Behavior::Seeker,
};

const SOLDIER_ANT: EnemyTraits = EnemyTraits {
    base: BaseStats {
        health: 120.0,
        damage: 25.0,
        xp: 35.0,
        size: 0.55,
    },
    speed: 0.06,
    passive_speed: 0.025,
    spawns_aggressive: true,
    retaliates: false,
    behavior: Behavior::Seeker,
};

const WORKER_ANT: EnemyTraits = EnemyTraits {
    base: BaseStats {
        health: 60.0,
        damage: 8.0,
        xp: 15.0,
        size: 0.5,
    },
    speed: 0.04,
    passive_speed: 0.02,
    spawns_aggressive: false,
    retaliates: false,
    behavior: Behavior::Wanderer,
};

const BABY_ANT: EnemyTraits = EnemyTraits {
    base: BaseStats {
        health: 25.0,
        damage: 5.0,
        xp: 5.0,
        size: 0.35,
    },
    speed: 0.05,
    passive_speed: 0.03,
    spawns_aggressive: false,
    retaliates: false,
    behavior: Behavior::Wanderer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnemyKind {
    Ladybug,
    Bee,
    Centipede,
    CentipedeSegment,
    Spider,
    SoldierAnt,
    WorkerAnt,
    BabyAnt,
}

impl EnemyKind {
    pub const ALL: [EnemyKind; 8] = [
        EnemyKind::Ladybug,
        EnemyKind::Bee,
        EnemyKind::Centipede,
        EnemyKind::CentipedeSegment,
        EnemyKind::Spider,
        EnemyKind::SoldierAnt,
        EnemyKind::WorkerAnt,
        EnemyKind::BabyAnt,
    ];

    pub fn traits(self) -> &'static EnemyTraits {
        match self {
            EnemyKind::Ladybug => &LADYBUG,
            EnemyKind::Bee => &BEE,
            EnemyKind::Centipede => &CENTIPEDE,
            EnemyKind::CentipedeSegment => &CENTIPEDE_SEGMENT,
            EnemyKind::Spider => &SPIDER,
            EnemyKind::SoldierAnt => &SOLDIER_ANT,
            EnemyKind::WorkerAnt => &WORKER_ANT,
            EnemyKind::BabyAnt => &BABY_ANT,
        }
    }

    pub fn stats(self, rarity: Rarity) -> EffectiveStats {
        effective_stats(&self.traits().base, rarity)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EnemyKind::Ladybug => "ladybug",
            EnemyKind::Bee => "bee",
            EnemyKind::Centipede => "centipede",
            EnemyKind::CentipedeSegment => "centipede_segment",
            EnemyKind::Spider => "spider",
            EnemyKind::SoldierAnt => "soldier_ant",
            EnemyKind::WorkerAnt => "worker_ant",
            EnemyKind::BabyAnt => "baby_ant",
        }
    }
}

impl fmt::Display for EnemyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EnemyKind {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EnemyKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ParseNameError {
                kind: "enemy type",
                value: s.to_string(),
            })
    }
}

/// Collectible dropped by enemies; also the base type of a petal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Tetrahedron,
    Cube,
    Leaf,
}

impl ItemKind {
    pub const ALL: [ItemKind; 3] = [ItemKind::Tetrahedron, ItemKind::Cube, ItemKind::Leaf];

    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Tetrahedron => "tetrahedron",
            ItemKind::Cube => "cube",
            ItemKind::Leaf => "leaf",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ItemKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ParseNameError {
                kind: "item type",
                value: s.to_string(),
            })
    }
}
