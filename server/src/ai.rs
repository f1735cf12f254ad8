//! Per-tick enemy decision making and movement.
//!
//! Every enemy runs the same pipeline each tick, in id order:
//! contact damage, aggression (chase or passive behaviour), centipede
//! follow, knockback integration. Players are only touched through the
//! contact step, whose effects are collected into the [`TickReport`].

use crate::math::{
    angle_difference, boundary_avoidance, clamp_to_bounds, facing, heading, in_bounds,
    move_with_reflection, neighbour_avoidance,
};
use crate::world::{Enemy, EnemyId, PlayerId, WorldState};
use rand::Rng;
use shared::{Behavior, Vec2, Vec3};
use std::f32::consts::PI;

pub const CONTACT_RADIUS: f32 = 1.0;
pub const CONTACT_DAMAGE: f32 = 10.0;
/// Knockback speed imparted on an enemy that touches a player.
pub const CONTACT_KNOCKBACK: f32 = 0.8;
/// A chasing enemy stops this close to its target.
pub const CHASE_STOP_DISTANCE: f32 = 0.5;
pub const SEGMENT_SPACING: f32 = 0.6;
/// Allowed relative deviation from [`SEGMENT_SPACING`] before a segment re-snaps.
pub const SEGMENT_TOLERANCE: f32 = 0.1;
/// Fraction of knockback velocity kept after each tick.
pub const KNOCKBACK_RETAIN: f32 = 0.3;
pub const KNOCKBACK_EPSILON: f32 = 0.01;
pub const WANDER_MIN_SECS: f32 = 2.0;
pub const WANDER_MAX_SECS: f32 = 4.0;
/// Share of the avoidance heading blended into the wander heading per tick.
pub const STEER_BLEND: f32 = 0.1;
pub const STEER_THRESHOLD: f32 = 0.001;
pub const HOVER_HEIGHT: f32 = 1.0;
pub const HOVER_AMPLITUDE: f32 = 0.2;
pub const WIGGLE_AMPLITUDE: f32 = 0.02;
pub const WIGGLE_FREQUENCY: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerHit {
    pub player_id: PlayerId,
    pub enemy_id: EnemyId,
    pub health: f32,
}

#[derive(Debug, Default)]
pub struct TickReport {
    /// Enemies whose position or rotation changed, in processing order.
    pub moved: Vec<EnemyId>,
    pub player_hits: Vec<PlayerHit>,
}

/// Advances every enemy by one tick. `time` is simulation time in seconds.
pub fn advance_enemies<R: Rng>(world: &mut WorldState, time: f32, rng: &mut R) -> TickReport {
    let mut report = TickReport::default();

    for id in world.enemy_ids() {
        let Some(mut enemy) = world.enemy(id).cloned() else {
            continue;
        };
        let before = (enemy.position, enemy.rotation);

        let touched = contact_players(world, &mut enemy);
        if enemy.is_aggressive {
            chase(world, &mut enemy);
        } else {
            passive(world, &mut enemy, time, rng);
        }
        follow_leader(world, &mut enemy);
        integrate_knockback(&mut enemy);

        if (enemy.position, enemy.rotation) != before {
            report.moved.push(id);
        }
        world.replace_enemy(enemy);

        for player_id in touched {
            if let Some(player) = world.player_mut(player_id) {
                if player.health <= 0.0 {
                    continue;
                }
                player.health = (player.health - CONTACT_DAMAGE).max(0.0);
                report.player_hits.push(PlayerHit {
                    player_id,
                    enemy_id: id,
                    health: player.health,
                });
            }
        }
    }

    report
}

/// Finds players overlapping `enemy` and knocks the enemy away from them.
/// Returns the ids of the players that take contact damage.
pub fn contact_players(world: &WorldState, enemy: &mut Enemy) -> Vec<PlayerId> {
    let mut touched = Vec::new();
    for player in world.players().filter(|p| p.is_active()) {
        if enemy.position.ground_distance(&player.position) >= CONTACT_RADIUS {
            continue;
        }
        let away = Vec2::new(
            enemy.position.x - player.position.x,
            enemy.position.z - player.position.z,
        );
        let direction = if away.is_zero() {
            Vec2::from_angle(enemy.wander_angle)
        } else {
            away.normalize()
        };
        enemy.velocity = direction.scale(CONTACT_KNOCKBACK);
        touched.push(player.id);
    }
    touched
}

fn steering_bias(world: &WorldState, enemy: &Enemy) -> Vec2 {
    let neighbours = world
        .enemies()
        .filter(|other| other.id != enemy.id && !enemy.same_chain(other))
        .map(|other| other.position);
    neighbour_avoidance(enemy.position, neighbours).add(&boundary_avoidance(enemy.position))
}

fn chase(world: &WorldState, enemy: &mut Enemy) {
    let target = enemy
        .target
        .and_then(|id| world.player(id))
        .filter(|p| p.is_active())
        .map(|p| p.position);

    let Some(target) = target else {
        enemy.is_aggressive = false;
        enemy.target = None;
        return;
    };
    if !target.is_finite() {
        return;
    }

    enemy.rotation = facing(enemy.position, target);
    let distance = enemy.position.ground_distance(&target);
    if distance <= CHASE_STOP_DISTANCE {
        return;
    }

    let direction = Vec2::new(target.x - enemy.position.x, target.z - enemy.position.z).normalize();
    let step = direction
        .scale(enemy.kind.traits().speed)
        .add(&steering_bias(world, enemy));
    enemy.position.x += step.x;
    enemy.position.z += step.z;
    clamp_to_bounds(&mut enemy.position);
}

fn passive<R: Rng>(world: &WorldState, enemy: &mut Enemy, time: f32, rng: &mut R) {
    let traits = enemy.kind.traits();
    match traits.behavior {
        Behavior::Seeker => {
            if let Some(player_id) = world.nearest_active_player(enemy.position) {
                enemy.is_aggressive = true;
                enemy.target = Some(player_id);
            }
        }
        Behavior::Segment => {}
        Behavior::Serpent => {
            let forward = Vec2::from_angle(enemy.wander_angle);
            let lateral = Vec2::new(-forward.z, forward.x)
                .scale((time * WIGGLE_FREQUENCY).sin() * WIGGLE_AMPLITUDE);
            let step = forward
                .scale(traits.passive_speed)
                .add(&lateral)
                .add(&steering_bias(world, enemy));

            enemy.position = move_with_reflection(enemy.position, step, &mut enemy.wander_angle);
            if !step.is_zero() {
                enemy.rotation = heading(step);
            }
        }
        Behavior::Wanderer | Behavior::Hoverer => {
            if time >= enemy.wander_until {
                enemy.wander_angle = rng.gen_range(0.0..2.0 * PI);
                enemy.wander_until = time + rng.gen_range(WANDER_MIN_SECS..WANDER_MAX_SECS);
            }

            let avoid = steering_bias(world, enemy);
            let step = Vec2::from_angle(enemy.wander_angle)
                .scale(traits.passive_speed)
                .add(&avoid);
            enemy.position = move_with_reflection(enemy.position, step, &mut enemy.wander_angle);

            if avoid.magnitude() > STEER_THRESHOLD {
                let desired = avoid.z.atan2(avoid.x);
                enemy.wander_angle += angle_difference(enemy.wander_angle, desired) * STEER_BLEND;
            }
            if traits.behavior == Behavior::Hoverer {
                enemy.position.y = HOVER_HEIGHT + time.sin() * HOVER_AMPLITUDE;
            }
            if !step.is_zero() {
                enemy.rotation = heading(step);
            }
        }
    }
}

/// Keeps a segment [`SEGMENT_SPACING`] behind its leader, re-snapping only
/// when the gap drifts outside the tolerance band.
pub fn follow_leader(world: &WorldState, enemy: &mut Enemy) {
    if enemy.kind.traits().behavior != Behavior::Segment {
        return;
    }
    let Some(leader) = enemy.follows_id.and_then(|id| world.enemy(id)) else {
        return;
    };

    let leader_pos = leader.position;
    let distance = enemy.position.ground_distance(&leader_pos);
    if (distance - SEGMENT_SPACING).abs() > SEGMENT_SPACING * SEGMENT_TOLERANCE {
        let back = if distance > f32::EPSILON {
            Vec2::new(
                enemy.position.x - leader_pos.x,
                enemy.position.z - leader_pos.z,
            )
            .scale(1.0 / distance)
        } else {
            // Stacked on the leader: drop in behind the way it faces.
            let forward = Vec2::new(leader.rotation.sin(), leader.rotation.cos());
            forward.scale(-1.0)
        };
        enemy.position.x = leader_pos.x + back.x * SEGMENT_SPACING;
        enemy.position.z = leader_pos.z + back.z * SEGMENT_SPACING;
        clamp_to_bounds(&mut enemy.position);
    }

    if enemy.position.ground_distance(&leader_pos) > f32::EPSILON {
        enemy.rotation = facing(enemy.position, leader_pos);
    }
}

/// Applies and decays knockback velocity. Velocity that would carry the
/// enemy out of the arena is cancelled instead of clamping the position.
pub fn integrate_knockback(enemy: &mut Enemy) {
    if enemy.velocity.is_zero() {
        return;
    }

    let next = Vec3::new(
        enemy.position.x + enemy.velocity.x,
        enemy.position.y,
        enemy.position.z + enemy.velocity.z,
    );
    if !in_bounds(next.x, next.z) {
        enemy.velocity = Vec2::ZERO;
        return;
    }
    enemy.position = next;

    enemy.velocity = enemy.velocity.scale(KNOCKBACK_RETAIN);
    if enemy.velocity.magnitude() < KNOCKBACK_EPSILON {
        enemy.velocity = Vec2::ZERO;
    }
}
