//! Wave progression: counters, the spawn timer and the random rolls that
//! decide what gets spawned where.

use log::info;
use rand::Rng;
use shared::{EnemyKind, Rarity, Vec3, ENEMIES_PER_WAVE, GROUND_Y, MAP_HALF_SIZE, SPAWN_INTERVAL_MS};
use std::time::{Duration, Instant};

/// Chance of rolling the wave's minimum rarity instead of the tier above.
pub const MIN_RARITY_CHANCE: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WavePhase {
    /// No wave has started since the server came up.
    Idle,
    Active,
}

#[derive(Debug)]
pub struct WaveController {
    pub current_wave: u32,
    pub enemies_killed: u32,
    pub total_xp: u64,
    pub enemies_spawned: u32,
    phase: WavePhase,
    next_spawn: Option<Instant>,
}

impl Default for WaveController {
    fn default() -> Self {
        Self::new()
    }
}

impl WaveController {
    pub fn new() -> Self {
        Self {
            current_wave: 0,
            enemies_killed: 0,
            total_xp: 0,
            enemies_spawned: 0,
            phase: WavePhase::Idle,
            next_spawn: None,
        }
    }

    pub fn phase(&self) -> WavePhase {
        self.phase
    }

    pub fn min_rarity(&self) -> Rarity {
        Rarity::minimum_for_wave(self.current_wave)
    }

    /// Advances to the next wave and restarts the spawn timer. Any pending
    /// timer is replaced, so there is never more than one.
    pub fn begin_next_wave(&mut self, now: Instant) -> u32 {
        self.current_wave += 1;
        self.enemies_killed = 0;
        self.total_xp = 0;
        self.enemies_spawned = 0;
        self.phase = WavePhase::Active;
        self.next_spawn = Some(now + spawn_interval());
        info!(
            "Wave {} started (min rarity {})",
            self.current_wave,
            self.min_rarity()
        );
        self.current_wave
    }

    /// Forces the controller back to wave 1.
    pub fn reset_to_first(&mut self, now: Instant) -> u32 {
        self.cancel_spawner();
        self.current_wave = 0;
        self.begin_next_wave(now)
    }

    pub fn cancel_spawner(&mut self) {
        self.next_spawn = None;
    }

    pub fn spawner_active(&self) -> bool {
        self.next_spawn.is_some()
    }

    /// Returns true when a wave spawn is due at `now`, counting it against
    /// the wave. At most one spawn is released per call; the timer stops for
    /// good once [`ENEMIES_PER_WAVE`] have been released.
    pub fn poll_spawn(&mut self, now: Instant) -> bool {
        let Some(due) = self.next_spawn else {
            return false;
        };
        if now < due {
            return false;
        }

        self.enemies_spawned += 1;
        self.next_spawn = if self.enemies_spawned >= ENEMIES_PER_WAVE {
            None
        } else {
            Some(due + spawn_interval())
        };
        true
    }

    /// Counts a kill worth `xp`. Returns true when the wave is complete.
    pub fn record_kill(&mut self, xp: u64) -> bool {
        self.enemies_killed += 1;
        self.total_xp += xp;
        self.enemies_killed >= ENEMIES_PER_WAVE
    }
}

fn spawn_interval() -> Duration {
    Duration::from_millis(SPAWN_INTERVAL_MS)
}

/// Rolls a spawn rarity: the wave minimum 70% of the time, otherwise one
/// tier higher (or the minimum again at the top of the scale).
pub fn determine_rarity<R: Rng>(wave: u32, rng: &mut R) -> Rarity {
    let min = Rarity::minimum_for_wave(wave);
    if rng.gen::<f64>() < MIN_RARITY_CHANCE {
        min
    } else {
        min.next().unwrap_or(min)
    }
}

/// Weighted enemy type roll. The table widens at wave 5.
pub fn pick_enemy_kind<R: Rng>(wave: u32, rng: &mut R) -> EnemyKind {
    let roll: f64 = rng.gen();
    if wave < 5 {
        match roll {
            r if r < 0.35 => EnemyKind::Ladybug,
            r if r < 0.60 => EnemyKind::Bee,
            r if r < 0.85 => EnemyKind::Centipede,
            _ => EnemyKind::BabyAnt,
        }
    } else {
        match roll {
            r if r < 0.25 => EnemyKind::Ladybug,
            r if r < 0.45 => EnemyKind::Bee,
            r if r < 0.60 => EnemyKind::Centipede,
            r if r < 0.75 => EnemyKind::Spider,
            r if r < 0.85 => EnemyKind::SoldierAnt,
            r if r < 0.95 => EnemyKind::WorkerAnt,
            _ => EnemyKind::BabyAnt,
        }
    }
}

/// Uniform point on one of the four arena edges.
pub fn random_edge_position<R: Rng>(rng: &mut R) -> Vec3 {
    let along = rng.gen_range(-MAP_HALF_SIZE..=MAP_HALF_SIZE);
    match rng.gen_range(0..4) {
        0 => Vec3::new(along, GROUND_Y, -MAP_HALF_SIZE),
        1 => Vec3::new(MAP_HALF_SIZE, GROUND_Y, along),
        2 => Vec3::new(along, GROUND_Y, MAP_HALF_SIZE),
        _ => Vec3::new(-MAP_HALF_SIZE, GROUND_Y, along),
    }
}

/// Uniform point strictly inside the arena, used for console item drops.
pub fn random_interior_position<R: Rng>(rng: &mut R) -> Vec3 {
    let inner = MAP_HALF_SIZE - 1.0;
    Vec3::new(
        rng.gen_range(-inner..=inner),
        GROUND_Y,
        rng.gen_range(-inner..=inner),
    )
}

/// Number of body segments behind a freshly spawned centipede head.
pub fn centipede_tail_length<R: Rng>(rng: &mut R) -> usize {
    let roll: f64 = rng.gen();
    if roll < 0.7 {
        rng.gen_range(5..=9)
    } else if roll < 0.9 {
        rng.gen_range(10..=20)
    } else {
        rng.gen_range(21..=40)
    }
}
