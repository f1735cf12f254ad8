//! Entity registry: players, enemies and dropped items.
//!
//! All three live in ordered maps keyed by small integer ids. Enemies are
//! iterated in id order, which puts every centipede segment after the
//! entity it follows, so one pass over the map moves leaders first.

use log::debug;
use shared::{
    EffectiveStats, EnemyKind, EnemyView, ItemKind, ItemView, PlayerView, Rarity, Vec2, Vec3,
    PLAYER_MAX_HEALTH, PLAYER_SPAWN,
};
use std::collections::BTreeMap;
use std::time::Instant;

pub type PlayerId = u32;
pub type EnemyId = u32;
pub type ItemId = u32;

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub position: Vec3,
    pub health: f32,
    pub xp: u64,
    pub kills: u32,
    pub joined_at: Instant,
    /// Account bound through `authenticate`, if any.
    pub account_id: Option<String>,
    /// Set while the death sequence plays; a dying player is frozen.
    pub dying: bool,
}

impl Player {
    pub fn new(id: PlayerId, now: Instant) -> Self {
        Self {
            id,
            position: PLAYER_SPAWN,
            health: PLAYER_MAX_HEALTH,
            xp: 0,
            kills: 0,
            joined_at: now,
            account_id: None,
            dying: false,
        }
    }

    /// Alive and not in the middle of the death sequence.
    pub fn is_active(&self) -> bool {
        !self.dying && self.health > 0.0
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            id: self.id,
            position: self.position,
            health: self.health,
            max_health: PLAYER_MAX_HEALTH,
            xp: self.xp,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Enemy {
    pub id: EnemyId,
    pub kind: EnemyKind,
    pub rarity: Rarity,
    pub position: Vec3,
    /// Yaw in radians, 0 faces +z.
    pub rotation: f32,
    pub health: f32,
    pub is_aggressive: bool,
    pub target: Option<PlayerId>,
    /// Knockback velocity in world units per tick.
    pub velocity: Vec2,
    /// Wander heading in radians, 0 points along +x.
    pub wander_angle: f32,
    /// Simulation time (seconds) at which the wander heading is re-rolled.
    pub wander_until: f32,
    /// Ordered body of a centipede head, nearest segment first.
    pub segments: Vec<EnemyId>,
    /// Entity a segment trails behind.
    pub follows_id: Option<EnemyId>,
    /// Head of the chain a segment belongs to.
    pub centipede_id: Option<EnemyId>,
}

impl Enemy {
    pub fn new(id: EnemyId, kind: EnemyKind, rarity: Rarity, position: Vec3) -> Self {
        let stats = kind.stats(rarity);
        Self {
            id,
            kind,
            rarity,
            position,
            rotation: 0.0,
            health: stats.health,
            is_aggressive: kind.traits().spawns_aggressive,
            target: None,
            velocity: Vec2::ZERO,
            wander_angle: 0.0,
            wander_until: 0.0,
            segments: Vec::new(),
            follows_id: None,
            centipede_id: None,
        }
    }

    pub fn stats(&self) -> EffectiveStats {
        self.kind.stats(self.rarity)
    }

    pub fn max_health(&self) -> f32 {
        self.stats().health
    }

    /// True if `other` belongs to the same centipede chain as this enemy.
    pub fn same_chain(&self, other: &Enemy) -> bool {
        let head = self.centipede_id.unwrap_or(self.id);
        let other_head = other.centipede_id.unwrap_or(other.id);
        head == other_head && (self.centipede_id.is_some() || other.centipede_id.is_some())
    }

    pub fn view(&self) -> EnemyView {
        let stats = self.stats();
        EnemyView {
            id: self.id,
            enemy_type: self.kind,
            rarity: self.rarity,
            position: self.position,
            rotation: self.rotation,
            health: self.health.max(0.0),
            max_health: stats.health,
            size: stats.size,
            is_aggressive: self.is_aggressive,
            follows_id: self.follows_id,
            centipede_id: self.centipede_id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Item {
    pub id: ItemId,
    pub kind: ItemKind,
    pub rarity: Rarity,
    pub position: Vec3,
}

impl Item {
    pub fn view(&self) -> ItemView {
        ItemView {
            id: self.id,
            item_type: self.kind,
            rarity: self.rarity,
            position: self.position,
        }
    }
}

/// Result of removing an enemy from the registry.
#[derive(Debug)]
pub struct Removal {
    pub enemy: Enemy,
    /// Segment promoted to lead the orphaned remainder of the chain.
    pub promoted: Option<EnemyId>,
}

#[derive(Debug, Default)]
pub struct WorldState {
    players: BTreeMap<PlayerId, Player>,
    enemies: BTreeMap<EnemyId, Enemy>,
    items: BTreeMap<ItemId, Item>,
    next_enemy_id: EnemyId,
    next_item_id: ItemId,
}

impl WorldState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_player(&mut self, id: PlayerId, now: Instant) -> &Player {
        debug!("Created player {}", id);
        self.players.insert(id, Player::new(id, now));
        &self.players[&id]
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        self.players.remove(&id)
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn player_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.players.get_mut(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn players_mut(&mut self) -> impl Iterator<Item = &mut Player> {
        self.players.values_mut()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    /// Nearest player that can still be targeted, by ground distance.
    pub fn nearest_active_player(&self, position: Vec3) -> Option<PlayerId> {
        self.players
            .values()
            .filter(|p| p.is_active())
            .map(|p| (p.id, position.ground_distance(&p.position)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(id, _)| id)
    }

    pub fn create_enemy(&mut self, kind: EnemyKind, rarity: Rarity, position: Vec3) -> &mut Enemy {
        let id = self.next_enemy_id;
        self.next_enemy_id += 1;
        self.enemies
            .entry(id)
            .or_insert_with(|| Enemy::new(id, kind, rarity, position))
    }

    pub fn enemy(&self, id: EnemyId) -> Option<&Enemy> {
        self.enemies.get(&id)
    }

    pub fn enemy_mut(&mut self, id: EnemyId) -> Option<&mut Enemy> {
        self.enemies.get_mut(&id)
    }

    pub fn enemies(&self) -> impl Iterator<Item = &Enemy> {
        self.enemies.values()
    }

    pub fn enemy_ids(&self) -> Vec<EnemyId> {
        self.enemies.keys().copied().collect()
    }

    pub fn enemy_count(&self) -> usize {
        self.enemies.len()
    }

    /// Writes back an enemy taken out with [`WorldState::enemy`] and cloned.
    /// Ignored if the enemy has been removed meanwhile.
    pub fn replace_enemy(&mut self, enemy: Enemy) {
        if let Some(slot) = self.enemies.get_mut(&enemy.id) {
            *slot = enemy;
        }
    }

    /// Removes an enemy and repairs the centipede chain it belonged to.
    ///
    /// A chain never keeps a dangling link: when a head or a middle segment
    /// dies, the segment right behind it becomes the head of everything that
    /// trailed it, and the old head keeps only the part in front of the gap.
    pub fn remove_enemy(&mut self, id: EnemyId) -> Option<Removal> {
        let enemy = self.enemies.remove(&id)?;

        let orphans: Vec<EnemyId> = if !enemy.segments.is_empty() {
            enemy.segments.clone()
        } else if let Some(head_id) = enemy.centipede_id {
            match self.enemies.get_mut(&head_id) {
                Some(head) => match head.segments.iter().position(|s| *s == id) {
                    Some(index) => head.segments.split_off(index).into_iter().skip(1).collect(),
                    None => Vec::new(),
                },
                None => Vec::new(),
            }
        } else {
            Vec::new()
        };

        let promoted = self.promote_chain(orphans, enemy.position);
        Some(Removal { enemy, promoted })
    }

    /// Turns the first of `chain` into a centipede head leading the rest.
    fn promote_chain(&mut self, chain: Vec<EnemyId>, lost_leader_at: Vec3) -> Option<EnemyId> {
        let (&new_head, rest) = chain.split_first()?;

        let head = self.enemies.get_mut(&new_head)?;
        head.kind = EnemyKind::Centipede;
        head.follows_id = None;
        head.centipede_id = None;
        head.segments = rest.to_vec();
        head.wander_angle = (lost_leader_at.z - head.position.z).atan2(lost_leader_at.x - head.position.x);
        head.health = head.health.min(head.max_health());

        for segment_id in rest {
            if let Some(segment) = self.enemies.get_mut(segment_id) {
                segment.centipede_id = Some(new_head);
            }
        }
        debug!("Promoted segment {} to head of {} segments", new_head, rest.len());
        Some(new_head)
    }

    /// Removes every enemy, returning them in id order.
    pub fn clear_enemies(&mut self) -> Vec<Enemy> {
        std::mem::take(&mut self.enemies).into_values().collect()
    }

    pub fn create_item(&mut self, kind: ItemKind, rarity: Rarity, position: Vec3) -> &Item {
        let id = self.next_item_id;
        self.next_item_id += 1;
        self.items.entry(id).or_insert(Item {
            id,
            kind,
            rarity,
            position,
        })
    }

    pub fn remove_item(&mut self, id: ItemId) -> Option<Item> {
        self.items.remove(&id)
    }

    pub fn items(&self) -> impl Iterator<Item = &Item> {
        self.items.values()
    }
}
