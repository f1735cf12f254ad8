//! Types shared between the simulation server and its clients: world
//! constants, ground-plane vectors, the enemy/rarity stat tables, the JSON
//! wire protocol and the account record layout.

pub mod account;
pub mod protocol;
pub mod stats;

use serde::{Deserialize, Serialize};

pub use account::{Account, AccountStats, CollectedItem, Inventory, PetalRecord};
pub use protocol::{
    ClientMessage, DeathSummary, EnemyView, InventoryAction, ItemView, PlayerView, ServerMessage,
};
pub use stats::{
    effective_stats, BaseStats, Behavior, EffectiveStats, EnemyKind, EnemyTraits, ItemKind,
    ParseNameError, Rarity,
};

/// Half the edge length of the square arena. Playable x and z span
/// `-MAP_HALF_SIZE..=MAP_HALF_SIZE`.
pub const MAP_HALF_SIZE: f32 = 15.0;
pub const PLAYER_MAX_HEALTH: f32 = 100.0;
pub const PLAYER_SPAWN: Vec3 = Vec3 {
    x: 0.0,
    y: 0.5,
    z: 0.0,
};
/// Resting height of ground enemies and dropped items.
pub const GROUND_Y: f32 = 0.0;
pub const ENEMIES_PER_WAVE: u32 = 20;
pub const SPAWN_INTERVAL_MS: u64 = 1000;
pub const DEATH_REVEAL_DELAY_MS: u64 = 1000;
pub const DEATH_SCREEN_MS: u64 = 5000;

/// A point in world space. `y` is up; the simulation plane is x/z.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Projection onto the ground plane.
    pub fn ground(&self) -> Vec2 {
        Vec2 {
            x: self.x,
            z: self.z,
        }
    }

    /// False if any component is NaN or infinite.
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Euclidean distance ignoring height.
    pub fn ground_distance(&self, other: &Vec3) -> f32 {
        let dx = other.x - self.x;
        let dz = other.z - self.z;
        (dx * dx + dz * dz).sqrt()
    }
}

/// A vector on the x/z ground plane, used for velocities and steering.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub z: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, z: 0.0 };

    pub fn new(x: f32, z: f32) -> Self {
        Self { x, z }
    }

    /// Unit vector pointing along `angle` radians (0 = +x, counter-clockwise toward +z).
    pub fn from_angle(angle: f32) -> Self {
        Self {
            x: angle.cos(),
            z: angle.sin(),
        }
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.z * self.z).sqrt()
    }

    /// Returns the unit vector, or zero for a zero-length input.
    pub fn normalize(&self) -> Vec2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vec2::ZERO
        } else {
            Vec2 {
                x: self.x / mag,
                z: self.z / mag,
            }
        }
    }

    pub fn scale(&self, scalar: f32) -> Vec2 {
        Vec2 {
            x: self.x * scalar,
            z: self.z * scalar,
        }
    }

    pub fn add(&self, other: &Vec2) -> Vec2 {
        Vec2 {
            x: self.x + other.x,
            z: self.z + other.z,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.z == 0.0
    }
}
