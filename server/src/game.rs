//! The authoritative simulation.
//!
//! [`Game`] owns the world, the wave controller and the deferred task
//! queue. The network loop feeds it connects, disconnects, decoded client
//! messages, console commands and ticks, strictly one at a time; every
//! outbound event leaves through the injected [`Broadcaster`].

use crate::account::{AccountStore, SessionRecord};
use crate::ai::advance_enemies;
use crate::broadcast::Broadcaster;
use crate::config::{GameSettings, WorldConfig};
use crate::console::{ConsoleCommand, USAGE};
use crate::math::clamp_to_bounds;
use crate::scheduler::{Scheduler, Task};
use crate::spawn::spawn_enemy;
use crate::wave::{
    determine_rarity, pick_enemy_kind, random_edge_position, random_interior_position,
    WaveController, WavePhase,
};
use crate::world::{EnemyId, PlayerId, WorldState};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    ClientMessage, DeathSummary, EnemyKind, InventoryAction, Inventory, ItemKind, Rarity,
    ServerMessage, Vec2, Vec3, DEATH_REVEAL_DELAY_MS, DEATH_SCREEN_MS, GROUND_Y,
    PLAYER_MAX_HEALTH,
};
use std::time::{Duration, Instant};

/// Chance that a non-worker enemy drops anything at all.
pub const DROP_CHANCE: f64 = 0.5;
/// Given a drop, chance that it is a tetrahedron rather than a cube.
pub const TETRAHEDRON_CHANCE: f64 = 0.7;

pub struct Game<B: Broadcaster> {
    world: WorldState,
    waves: WaveController,
    scheduler: Scheduler,
    broadcaster: B,
    accounts: Box<dyn AccountStore + Send>,
    world_config: WorldConfig,
    settings: GameSettings,
    rng: StdRng,
    started_at: Instant,
    tick: u64,
}

impl<B: Broadcaster> Game<B> {
    pub fn new(
        broadcaster: B,
        accounts: Box<dyn AccountStore + Send>,
        world_config: WorldConfig,
        settings: GameSettings,
        now: Instant,
    ) -> Self {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            world: WorldState::new(),
            waves: WaveController::new(),
            scheduler: Scheduler::new(),
            broadcaster,
            accounts,
            world_config,
            settings,
            rng,
            started_at: now,
            tick: 0,
        }
    }

    pub fn world(&self) -> &WorldState {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut WorldState {
        &mut self.world
    }

    pub fn waves(&self) -> &WaveController {
        &self.waves
    }

    pub fn broadcaster(&self) -> &B {
        &self.broadcaster
    }

    pub fn broadcaster_mut(&mut self) -> &mut B {
        &mut self.broadcaster
    }

    pub fn accounts(&self) -> &dyn AccountStore {
        self.accounts.as_ref()
    }

    pub fn pending_tasks(&self) -> usize {
        self.scheduler.len()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    fn sim_time(&self, now: Instant) -> f32 {
        now.saturating_duration_since(self.started_at).as_secs_f32()
    }

    pub fn handle_connect(&mut self, player_id: PlayerId, now: Instant) {
        // The first connect starts wave 1 before the snapshot is taken.
        let starting = self.waves.phase() == WavePhase::Idle;
        if starting {
            self.clear_enemies();
            self.waves.reset_to_first(now);
        }

        let view = self.world.create_player(player_id, now).view();
        info!("Player {} joined", player_id);

        let snapshot = ServerMessage::WorldSnapshot {
            self_id: player_id,
            players: self
                .world
                .players()
                .filter(|p| p.id != player_id)
                .map(|p| p.view())
                .collect(),
            enemies: self.world.enemies().map(|e| e.view()).collect(),
            items: self.world.items().map(|i| i.view()).collect(),
            wave: self.waves.current_wave,
            min_rarity: self.waves.min_rarity(),
        };
        self.broadcaster.send_to(player_id, snapshot);
        self.broadcaster.send_to(
            player_id,
            ServerMessage::ConfigUpdate(self.world_config.blob().clone()),
        );
        self.broadcaster
            .broadcast_except(player_id, ServerMessage::PlayerJoined(view));

        if starting {
            self.announce_wave(self.waves.current_wave);
        }
    }

    pub fn handle_disconnect(&mut self, player_id: PlayerId, now: Instant) {
        if self.world.player(player_id).is_none() {
            return;
        }
        self.remove_player(player_id, false, now);
    }

    fn remove_player(&mut self, player_id: PlayerId, died: bool, now: Instant) {
        let Some(player) = self.world.remove_player(player_id) else {
            return;
        };
        self.scheduler.cancel_player(player_id);
        info!(
            "Player {} left ({} xp, {} kills)",
            player_id, player.xp, player.kills
        );
        self.broadcaster
            .broadcast(ServerMessage::PlayerLeft { player_id });

        if let Some(account_id) = &player.account_id {
            let session = SessionRecord {
                xp: player.xp,
                wave: self.waves.current_wave,
                kills: player.kills,
                died,
            };
            if let Err(e) = self.accounts.record_session(account_id, session) {
                error!("Failed to record session for {}: {}", account_id, e);
            }
        }

        self.check_idle(now);
    }

    /// Restarts at wave 1 once the last player is gone.
    fn check_idle(&mut self, now: Instant) {
        if self.world.player_count() == 0 {
            info!("No players left, resetting to wave 1");
            self.reset_waves(now);
        }
    }

    pub fn handle_message(&mut self, player_id: PlayerId, message: ClientMessage, now: Instant) {
        if self.world.player(player_id).is_none() {
            debug!("Dropping message from unknown player {}", player_id);
            return;
        }

        match message {
            ClientMessage::Authenticate { account_id } => self.authenticate(player_id, account_id),
            ClientMessage::Move(position) => self.move_player(player_id, position),
            ClientMessage::EnemyDamaged {
                enemy_id,
                damage,
                knockback,
            } => self.damage_enemy(player_id, enemy_id, damage, knockback, now),
            ClientMessage::PlayerDamaged { damage } => self.damage_player(player_id, damage, now),
            ClientMessage::RequestHealthSync => {
                if let Some(player) = self.world.player(player_id) {
                    let health = player.health;
                    self.broadcaster.send_to(
                        player_id,
                        ServerMessage::HealthSync {
                            health,
                            max_health: PLAYER_MAX_HEALTH,
                        },
                    );
                }
            }
            ClientMessage::RequestLightingConfig => {
                self.broadcaster.send_to(
                    player_id,
                    ServerMessage::LightingConfig(self.world_config.lighting()),
                );
            }
            ClientMessage::RequestInventory => {
                let inventory = self.inventory_of(player_id);
                self.broadcaster
                    .send_to(player_id, ServerMessage::InventorySync(inventory));
            }
            ClientMessage::CollectItem { item_id } => self.collect_item(player_id, item_id),
            ClientMessage::UpdateInventory {
                action,
                base_type,
                rarity,
                count,
            } => self.update_inventory(player_id, action, &base_type, rarity, count),
        }
    }

    fn account_of(&self, player_id: PlayerId) -> Option<String> {
        self.world
            .player(player_id)
            .and_then(|p| p.account_id.clone())
    }

    fn inventory_of(&self, player_id: PlayerId) -> Inventory {
        self.account_of(player_id)
            .and_then(|id| self.accounts.account(&id).ok())
            .map(|account| account.inventory)
            .unwrap_or_default()
    }

    fn authenticate(&mut self, player_id: PlayerId, account_id: String) {
        let account_id = account_id.trim().to_string();
        if account_id.is_empty() {
            warn!("Player {} sent an empty account id", player_id);
            return;
        }

        match self.accounts.load_or_create(&account_id) {
            Ok(account) => {
                info!("Player {} authenticated as {}", player_id, account_id);
                if let Some(player) = self.world.player_mut(player_id) {
                    player.account_id = Some(account_id);
                }
                let inventory = account.inventory.clone();
                self.broadcaster
                    .send_to(player_id, ServerMessage::AccountSync(account));
                self.broadcaster
                    .send_to(player_id, ServerMessage::InventorySync(inventory));
            }
            Err(e) => error!("Failed to load account {}: {}", account_id, e),
        }
    }

    fn move_player(&mut self, player_id: PlayerId, mut position: Vec3) {
        let validate = self.settings.validate_moves;
        let Some(player) = self.world.player_mut(player_id) else {
            return;
        };
        if player.dying {
            return;
        }
        if !position.is_finite() {
            warn!("Ignoring non-finite move from player {}", player_id);
            return;
        }
        if validate && clamp_to_bounds(&mut position) {
            debug!("Clamped move from player {}", player_id);
        }
        player.position = position;
        self.broadcaster.broadcast_except(
            player_id,
            ServerMessage::PlayerMoved {
                player_id,
                position,
            },
        );
    }

    fn damage_enemy(
        &mut self,
        player_id: PlayerId,
        enemy_id: EnemyId,
        damage: f32,
        knockback: Vec2,
        now: Instant,
    ) {
        if !damage.is_finite() {
            return;
        }
        let Some(enemy) = self.world.enemy_mut(enemy_id) else {
            return;
        };

        enemy.health -= damage.max(0.0);
        if knockback.x.is_finite() && knockback.z.is_finite() {
            enemy.velocity = knockback;
        }
        if enemy.kind.traits().retaliates && !enemy.is_aggressive {
            enemy.is_aggressive = true;
            enemy.target = Some(player_id);
        }

        let health = enemy.health.max(0.0);
        let max_health = enemy.max_health();
        let dead = enemy.health <= 0.0;
        self.broadcaster.broadcast(ServerMessage::EnemyDamaged {
            enemy_id,
            health,
            max_health,
        });

        if dead {
            self.kill_enemy(enemy_id, Some(player_id), now);
        }
    }

    /// Death pipeline: remove, roll a drop, announce, pay out XP and move
    /// the wave along.
    fn kill_enemy(&mut self, enemy_id: EnemyId, killer: Option<PlayerId>, now: Instant) {
        let Some(removal) = self.world.remove_enemy(enemy_id) else {
            return;
        };
        let enemy = removal.enemy;
        debug!("Enemy {} ({}) died", enemy_id, enemy.kind);

        let drop = roll_drop(enemy.kind, &mut self.rng).map(|kind| {
            let at = Vec3::new(enemy.position.x, GROUND_Y, enemy.position.z);
            self.world.create_item(kind, enemy.rarity, at).view()
        });
        self.broadcaster.broadcast(ServerMessage::EnemyDied {
            enemy_id,
            drop: drop.clone(),
        });
        if let Some(item) = drop {
            self.broadcaster.broadcast(ServerMessage::ItemSpawned(item));
        }

        if let Some(new_head) = removal.promoted.and_then(|id| self.world.enemy(id)) {
            self.broadcaster
                .broadcast(ServerMessage::EnemySpawned(new_head.view()));
        }

        if let Some(player) = killer.and_then(|id| self.world.player_mut(id)) {
            player.kills += 1;
        }

        let xp = u64::from(enemy.stats().xp);
        self.award_xp(xp);
        if self.waves.record_kill(xp) {
            self.start_wave(now);
        }
    }

    /// Splits `amount` evenly (rounded down) between every connected player.
    fn award_xp(&mut self, amount: u64) {
        let count = self.world.player_count() as u64;
        if count == 0 {
            return;
        }
        let share = amount / count;

        let mut awarded = Vec::new();
        for player in self.world.players_mut() {
            player.xp += share;
            awarded.push((player.id, player.xp));
        }
        for (player_id, total_xp) in awarded {
            self.broadcaster.broadcast(ServerMessage::PlayerXp {
                player_id,
                amount: share,
                total_xp,
            });
        }
    }

    fn damage_player(&mut self, player_id: PlayerId, damage: f32, now: Instant) {
        if !damage.is_finite() {
            return;
        }
        let Some(player) = self.world.player_mut(player_id) else {
            return;
        };
        if !player.is_active() {
            return;
        }

        player.health -= damage.clamp(0.0, player.health);
        let health = player.health;
        self.broadcaster
            .broadcast(ServerMessage::PlayerDamaged { player_id, health });

        if health <= 0.0 {
            self.begin_death(player_id, now);
        }
    }

    fn begin_death(&mut self, player_id: PlayerId, now: Instant) {
        let wave = self.waves.current_wave;
        let Some(player) = self.world.player_mut(player_id) else {
            return;
        };
        if player.dying {
            return;
        }
        player.dying = true;
        player.health = 0.0;

        let summary = DeathSummary {
            wave,
            xp: player.xp,
            kills: player.kills,
            survived_secs: now.saturating_duration_since(player.joined_at).as_secs(),
        };
        info!(
            "Player {} died on wave {} after {}s",
            player_id, wave, summary.survived_secs
        );

        self.broadcaster
            .broadcast(ServerMessage::PlayerDeathSequence { player_id });

        let reveal_at = now + Duration::from_millis(DEATH_REVEAL_DELAY_MS);
        self.scheduler
            .schedule(reveal_at, Task::RevealDeath { player_id, summary });
        self.scheduler.schedule(
            reveal_at + Duration::from_millis(DEATH_SCREEN_MS),
            Task::FinishDeath { player_id },
        );
    }

    fn run_task(&mut self, task: Task, now: Instant) {
        match task {
            Task::RevealDeath { player_id, summary } => {
                if self.world.player(player_id).is_none() {
                    return;
                }
                self.broadcaster
                    .send_to(player_id, ServerMessage::PlayerDied(summary.clone()));
                self.broadcaster
                    .send_to(player_id, ServerMessage::ShowDeathScreen(summary));
            }
            Task::FinishDeath { player_id } => {
                if self.world.player(player_id).is_none() {
                    return;
                }
                self.broadcaster
                    .send_to(player_id, ServerMessage::DeathScreenComplete);
                self.broadcaster.disconnect(player_id);
                self.remove_player(player_id, true, now);
            }
        }
    }

    fn collect_item(&mut self, player_id: PlayerId, item_id: u32) {
        let Some(item) = self.world.remove_item(item_id) else {
            return;
        };
        self.broadcaster
            .broadcast(ServerMessage::ItemCollectionConfirmed {
                item_id,
                player_id,
                item_type: item.kind,
                rarity: item.rarity,
            });

        let Some(account_id) = self.account_of(player_id) else {
            return;
        };
        let name = item.kind.as_str();
        let result = self
            .accounts
            .add_petal(&account_id, name, item.rarity, 1)
            .and_then(|_| self.accounts.record_item(&account_id, name, 1));
        match result {
            Ok(inventory) => self
                .broadcaster
                .send_to(player_id, ServerMessage::InventorySync(inventory)),
            Err(e) => error!("Failed to store item for {}: {}", account_id, e),
        }
    }

    fn update_inventory(
        &mut self,
        player_id: PlayerId,
        action: InventoryAction,
        base_type: &str,
        rarity: Rarity,
        count: u32,
    ) {
        let Some(account_id) = self.account_of(player_id) else {
            self.broadcaster.send_to(
                player_id,
                ServerMessage::InventoryUpdateConfirmed {
                    success: false,
                    inventory: Inventory::default(),
                    message: Some("not authenticated".to_string()),
                },
            );
            return;
        };

        let result = match action {
            InventoryAction::Add => self.accounts.add_petal(&account_id, base_type, rarity, count),
            InventoryAction::Remove => {
                self.accounts
                    .remove_petal(&account_id, base_type, rarity, count)
            }
        };
        let reply = match result {
            Ok(inventory) => ServerMessage::InventoryUpdateConfirmed {
                success: true,
                inventory,
                message: None,
            },
            Err(e) => {
                warn!("Inventory update for {} failed: {}", account_id, e);
                ServerMessage::InventoryUpdateConfirmed {
                    success: false,
                    inventory: self.inventory_of(player_id),
                    message: Some(e.to_string()),
                }
            }
        };
        self.broadcaster.send_to(player_id, reply);
    }

    fn clear_enemies(&mut self) {
        for enemy in self.world.clear_enemies() {
            self.broadcaster.broadcast(ServerMessage::EnemyDied {
                enemy_id: enemy.id,
                drop: None,
            });
        }
    }

    fn start_wave(&mut self, now: Instant) {
        self.clear_enemies();
        let wave = self.waves.begin_next_wave(now);
        self.announce_wave(wave);
    }

    fn reset_waves(&mut self, now: Instant) {
        self.clear_enemies();
        let wave = self.waves.reset_to_first(now);
        self.announce_wave(wave);
    }

    fn announce_wave(&mut self, wave: u32) {
        self.broadcaster.broadcast(ServerMessage::WaveStart {
            wave,
            min_rarity: self.waves.min_rarity(),
        });
    }

    fn spawn_and_announce(&mut self, kind: EnemyKind, rarity: Rarity, now: Instant) -> usize {
        let position = random_edge_position(&mut self.rng);
        let time = self.sim_time(now);
        let ids = spawn_enemy(&mut self.world, kind, rarity, position, time, &mut self.rng);
        for id in &ids {
            if let Some(enemy) = self.world.enemy(*id) {
                self.broadcaster
                    .broadcast(ServerMessage::EnemySpawned(enemy.view()));
            }
        }
        ids.len()
    }

    /// One simulation step: deferred tasks, the wave spawner, then AI.
    pub fn tick(&mut self, now: Instant) {
        self.tick += 1;

        for (_, task) in self.scheduler.take_due(now) {
            self.run_task(task, now);
        }

        if self.waves.poll_spawn(now) {
            let wave = self.waves.current_wave;
            let kind = pick_enemy_kind(wave, &mut self.rng);
            let rarity = determine_rarity(wave, &mut self.rng);
            let created = self.spawn_and_announce(kind, rarity, now);
            debug!(
                "Wave {} spawn {}: {} {} ({} entities)",
                wave, self.waves.enemies_spawned, rarity, kind, created
            );
        }

        let time = self.sim_time(now);
        let report = advance_enemies(&mut self.world, time, &mut self.rng);

        for enemy_id in report.moved {
            if let Some(enemy) = self.world.enemy(enemy_id) {
                let message = ServerMessage::EnemyMoved {
                    enemy_id,
                    position: enemy.position,
                    rotation: enemy.rotation,
                };
                self.broadcaster.broadcast(message);
            }
        }
        for hit in report.player_hits {
            self.broadcaster.broadcast(ServerMessage::PlayerDamaged {
                player_id: hit.player_id,
                health: hit.health,
            });
            if hit.health <= 0.0 {
                self.begin_death(hit.player_id, now);
            }
        }
    }

    /// Runs an operator command and returns the text to show the operator.
    pub fn run_console(&mut self, command: ConsoleCommand, now: Instant) -> String {
        match command {
            ConsoleCommand::Help => USAGE.to_string(),
            ConsoleCommand::Spawn {
                kind,
                count,
                rarity,
            } => {
                let mut created = 0;
                for _ in 0..count {
                    let rarity = rarity.unwrap_or_else(|| {
                        determine_rarity(self.waves.current_wave, &mut self.rng)
                    });
                    created += self.spawn_and_announce(kind, rarity, now);
                }
                info!("Console spawned {} x {}", count, kind);
                format!("Spawned {} {} ({} entities)", count, kind, created)
            }
            ConsoleCommand::SpawnItem { kind, count } => {
                for _ in 0..count {
                    let position = random_interior_position(&mut self.rng);
                    let rarity = determine_rarity(self.waves.current_wave, &mut self.rng);
                    let item = self.world.create_item(kind, rarity, position).view();
                    self.broadcaster.broadcast(ServerMessage::ItemSpawned(item));
                }
                info!("Console dropped {} x {}", count, kind);
                format!("Dropped {} {}", count, kind)
            }
        }
    }
}

/// Worker ants always leave a leaf; everything else drops half the time.
pub fn roll_drop<R: Rng>(kind: EnemyKind, rng: &mut R) -> Option<ItemKind> {
    if kind == EnemyKind::WorkerAnt {
        return Some(ItemKind::Leaf);
    }
    if !rng.gen_bool(DROP_CHANCE) {
        return None;
    }
    if rng.gen_bool(TETRAHEDRON_CHANCE) {
        Some(ItemKind::Tetrahedron)
    } else {
        Some(ItemKind::Cube)
    }
}
