//! Enemy creation, including centipede bodies.

use crate::ai::{SEGMENT_SPACING, WANDER_MAX_SECS, WANDER_MIN_SECS};
use crate::math::{clamp_to_bounds, heading};
use crate::wave::centipede_tail_length;
use crate::world::{EnemyId, WorldState};
use log::debug;
use rand::Rng;
use shared::{Behavior, EnemyKind, Rarity, Vec2, Vec3};
use std::f32::consts::PI;

/// Spawns one enemy at `position` and returns the ids of every entity
/// created, head first. A centipede brings a random tail with it.
pub fn spawn_enemy<R: Rng>(
    world: &mut WorldState,
    kind: EnemyKind,
    rarity: Rarity,
    position: Vec3,
    time: f32,
    rng: &mut R,
) -> Vec<EnemyId> {
    let tail = if kind == EnemyKind::Centipede {
        centipede_tail_length(rng)
    } else {
        0
    };
    spawn_with_tail(world, kind, rarity, position, tail, time, rng)
}

/// Same as [`spawn_enemy`] with an explicit centipede tail length.
pub fn spawn_with_tail<R: Rng>(
    world: &mut WorldState,
    kind: EnemyKind,
    rarity: Rarity,
    position: Vec3,
    tail: usize,
    time: f32,
    rng: &mut R,
) -> Vec<EnemyId> {
    let target = if kind.traits().behavior == Behavior::Seeker {
        world.nearest_active_player(position)
    } else {
        None
    };

    let wander_angle = rng.gen_range(0.0..2.0 * PI);
    let forward = Vec2::from_angle(wander_angle);

    let head = world.create_enemy(kind, rarity, position);
    head.wander_angle = wander_angle;
    head.wander_until = time + rng.gen_range(WANDER_MIN_SECS..WANDER_MAX_SECS);
    head.rotation = heading(forward);
    head.target = target;
    let head_id = head.id;

    let mut ids = vec![head_id];
    if kind != EnemyKind::Centipede {
        return ids;
    }

    let mut leader = head_id;
    for i in 1..=tail {
        let mut at = Vec3::new(
            position.x - forward.x * SEGMENT_SPACING * i as f32,
            position.y,
            position.z - forward.z * SEGMENT_SPACING * i as f32,
        );
        clamp_to_bounds(&mut at);

        let segment = world.create_enemy(EnemyKind::CentipedeSegment, rarity, at);
        segment.follows_id = Some(leader);
        segment.centipede_id = Some(head_id);
        segment.rotation = heading(forward);
        leader = segment.id;
        ids.push(segment.id);
    }

    if let Some(head) = world.enemy_mut(head_id) {
        head.segments = ids[1..].to_vec();
    }
    debug!("Spawned centipede {} with {} segments", head_id, tail);
    ids
}
