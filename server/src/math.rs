//! Ground-plane helpers: boundary handling, steering and facing angles.

use shared::{Vec2, Vec3, MAP_HALF_SIZE};
use std::f32::consts::PI;

/// Neighbours closer than this push each other apart.
pub const AVOID_RADIUS: f32 = 1.5;
pub const AVOID_STRENGTH: f32 = 0.02;
/// Distance from a wall at which wall repulsion starts.
pub const BOUNDARY_MARGIN: f32 = 2.0;
pub const BOUNDARY_STRENGTH: f32 = 0.03;

pub fn in_bounds(x: f32, z: f32) -> bool {
    (-MAP_HALF_SIZE..=MAP_HALF_SIZE).contains(&x) && (-MAP_HALF_SIZE..=MAP_HALF_SIZE).contains(&z)
}

/// Clamps x/z into the arena. Returns true if the position had to move.
pub fn clamp_to_bounds(position: &mut Vec3) -> bool {
    let x = position.x.clamp(-MAP_HALF_SIZE, MAP_HALF_SIZE);
    let z = position.z.clamp(-MAP_HALF_SIZE, MAP_HALF_SIZE);
    let clamped = x != position.x || z != position.z;
    position.x = x;
    position.z = z;
    clamped
}

/// Moves `position` by `delta`, bouncing `angle` off any wall it crosses.
///
/// The returned position is always inside the arena. Hitting a vertical wall
/// mirrors the heading horizontally (`PI - angle`), hitting a horizontal wall
/// mirrors it vertically (`-angle`).
pub fn move_with_reflection(position: Vec3, delta: Vec2, angle: &mut f32) -> Vec3 {
    let mut next = Vec3::new(position.x + delta.x, position.y, position.z + delta.z);

    if next.x.abs() > MAP_HALF_SIZE {
        *angle = PI - *angle;
        next.x = next.x.clamp(-MAP_HALF_SIZE, MAP_HALF_SIZE);
    }
    if next.z.abs() > MAP_HALF_SIZE {
        *angle = -*angle;
        next.z = next.z.clamp(-MAP_HALF_SIZE, MAP_HALF_SIZE);
    }
    next
}

/// Repulsion away from neighbours inside [`AVOID_RADIUS`].
///
/// Each neighbour contributes `offset * (radius - d) / d * strength`, so the
/// push grows as the gap closes. Coincident neighbours are skipped.
pub fn neighbour_avoidance(position: Vec3, neighbours: impl IntoIterator<Item = Vec3>) -> Vec2 {
    let mut push = Vec2::ZERO;
    for other in neighbours {
        let dx = position.x - other.x;
        let dz = position.z - other.z;
        let distance = (dx * dx + dz * dz).sqrt();
        if distance > 0.0 && distance < AVOID_RADIUS {
            let force = (AVOID_RADIUS - distance) / distance;
            push.x += dx * force * AVOID_STRENGTH;
            push.z += dz * force * AVOID_STRENGTH;
        }
    }
    push
}

/// Linear push away from each wall closer than [`BOUNDARY_MARGIN`].
pub fn boundary_avoidance(position: Vec3) -> Vec2 {
    let mut push = Vec2::ZERO;

    let left = position.x + MAP_HALF_SIZE;
    let right = MAP_HALF_SIZE - position.x;
    let near = position.z + MAP_HALF_SIZE;
    let far = MAP_HALF_SIZE - position.z;

    if left < BOUNDARY_MARGIN {
        push.x += (BOUNDARY_MARGIN - left) / BOUNDARY_MARGIN * BOUNDARY_STRENGTH;
    }
    if right < BOUNDARY_MARGIN {
        push.x -= (BOUNDARY_MARGIN - right) / BOUNDARY_MARGIN * BOUNDARY_STRENGTH;
    }
    if near < BOUNDARY_MARGIN {
        push.z += (BOUNDARY_MARGIN - near) / BOUNDARY_MARGIN * BOUNDARY_STRENGTH;
    }
    if far < BOUNDARY_MARGIN {
        push.z -= (BOUNDARY_MARGIN - far) / BOUNDARY_MARGIN * BOUNDARY_STRENGTH;
    }
    push
}

/// Yaw that makes a model look along `direction` (0 faces +z).
pub fn heading(direction: Vec2) -> f32 {
    direction.x.atan2(direction.z)
}

/// Yaw from `from` toward `to`.
pub fn facing(from: Vec3, to: Vec3) -> f32 {
    heading(Vec2::new(to.x - from.x, to.z - from.z))
}

/// Signed shortest turn from `from` to `to`, in `[-PI, PI]`.
pub fn angle_difference(from: f32, to: f32) -> f32 {
    let mut diff = (to - from) % (2.0 * PI);
    if diff > PI {
        diff -= 2.0 * PI;
    } else if diff < -PI {
        diff += 2.0 * PI;
    }
    diff
}
