//! Integration tests for the simulation and its collaborators
//!
//! These tests drive whole scenarios through the public `Game` API with a
//! recording broadcaster standing in for the network.

use assert_approx_eq::assert_approx_eq;
use server::account::MemoryStore;
use server::broadcast::RecordingBroadcaster;
use server::config::{GameSettings, WorldConfig};
use server::console::ConsoleCommand;
use server::game::Game;
use shared::{
    ClientMessage, EnemyKind, ItemKind, Rarity, ServerMessage, Vec2, Vec3, ENEMIES_PER_WAVE,
};
use std::time::{Duration, Instant};

fn new_game(now: Instant) -> Game<RecordingBroadcaster> {
    Game::new(
        RecordingBroadcaster::new(),
        Box::new(MemoryStore::new()),
        WorldConfig::default(),
        GameSettings {
            validate_moves: false,
            seed: Some(2024),
        },
        now,
    )
}

fn ms(start: Instant, millis: u64) -> Instant {
    start + Duration::from_millis(millis)
}

fn kill(game: &mut Game<RecordingBroadcaster>, player_id: u32, enemy_id: u32, now: Instant) {
    game.handle_message(
        player_id,
        ClientMessage::EnemyDamaged {
            enemy_id,
            damage: 1_000_000.0,
            knockback: Vec2::ZERO,
        },
        now,
    );
}

/// CONTACT AND DAMAGE TESTS
mod contact_tests {
    use super::*;

    /// An enemy half a unit from a player hurts them and bounces away
    #[test]
    fn contact_damage_and_outward_knockback() {
        let start = Instant::now();
        let mut game = new_game(start);
        game.handle_connect(1, start);
        game.handle_message(1, ClientMessage::Move(Vec3::new(0.5, 0.0, 0.0)), start);

        let id = game
            .world_mut()
            .create_enemy(EnemyKind::Ladybug, Rarity::Common, Vec3::new(0.0, 0.0, 0.0))
            .id;
        game.broadcaster_mut().clear();
        game.tick(start);

        assert_eq!(game.world().player(1).unwrap().health, 90.0);
        assert!(game
            .broadcaster()
            .messages()
            .iter()
            .any(|m| matches!(m, ServerMessage::PlayerDamaged { player_id: 1, health } if *health == 90.0)));

        // Knocked 0.8 toward -x, then decayed to 30% for the next tick.
        let enemy = game.world().enemy(id).unwrap();
        assert!(enemy.position.x < -0.75);
        assert_approx_eq!(enemy.velocity.magnitude(), 0.8 * 0.3, 1e-4);
        assert!(enemy.velocity.x < 0.0);
    }

    /// Knockback shrinks every tick and ends at exactly zero
    #[test]
    fn knockback_decays_monotonically() {
        let start = Instant::now();
        let mut game = new_game(start);
        let id = game
            .world_mut()
            .create_enemy(EnemyKind::BabyAnt, Rarity::Common, Vec3::default())
            .id;
        game.world_mut().enemy_mut(id).unwrap().velocity = Vec2::new(0.0, 0.8);

        let mut last = 0.8;
        for tick in 1..30 {
            game.tick(ms(start, tick * 16));
            let magnitude = game.world().enemy(id).unwrap().velocity.magnitude();
            assert!(magnitude >= 0.0);
            if last > 0.0 {
                assert!(magnitude < last);
            } else {
                assert_eq!(magnitude, 0.0);
            }
            last = magnitude;
        }
        assert_eq!(last, 0.0);
    }

    /// Damage reports for enemies that no longer exist change nothing
    #[test]
    fn stale_enemy_reference_is_ignored() {
        let start = Instant::now();
        let mut game = new_game(start);
        game.handle_connect(1, start);
        let id = game
            .world_mut()
            .create_enemy(EnemyKind::Bee, Rarity::Common, Vec3::default())
            .id;
        kill(&mut game, 1, id, start);
        game.broadcaster_mut().clear();

        kill(&mut game, 1, id, start);
        assert!(game.broadcaster().sent.is_empty());
    }
}

/// DEATH SEQUENCE TESTS
mod death_tests {
    use super::*;

    /// playerDied arrives at +1s with the current wave, disconnect at +6s
    #[test]
    fn death_sequence_timing() {
        let start = Instant::now();
        let mut game = new_game(start);
        game.handle_connect(1, start);
        game.handle_connect(2, start);
        game.handle_message(1, ClientMessage::PlayerDamaged { damage: 100.0 }, start);

        assert!(game
            .broadcaster()
            .messages_to(2)
            .iter()
            .any(|m| matches!(m, ServerMessage::PlayerDeathSequence { player_id: 1 })));

        game.tick(ms(start, 999));
        assert!(!game
            .broadcaster()
            .messages_to(1)
            .iter()
            .any(|m| matches!(m, ServerMessage::PlayerDied(_))));

        game.tick(ms(start, 1000));
        let died: Vec<_> = game
            .broadcaster()
            .messages_to(1)
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::PlayerDied(summary) => Some(summary.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(died.len(), 1);
        assert_eq!(died[0].wave, game.waves().current_wave);
        assert!(!game
            .broadcaster()
            .messages_to(2)
            .iter()
            .any(|m| matches!(m, ServerMessage::PlayerDied(_))));

        game.tick(ms(start, 5999));
        assert!(game.broadcaster().disconnected().is_empty());
        assert!(game.world().player(1).is_some());

        game.tick(ms(start, 6000));
        assert_eq!(game.broadcaster().disconnected(), vec![1]);
        assert!(game.world().player(1).is_none());
        assert!(game
            .broadcaster()
            .messages_to(2)
            .iter()
            .any(|m| matches!(m, ServerMessage::PlayerLeft { player_id: 1 })));
    }

    /// A dying player cannot move or take more damage
    #[test]
    fn dying_player_is_frozen() {
        let start = Instant::now();
        let mut game = new_game(start);
        game.handle_connect(1, start);
        game.handle_message(1, ClientMessage::PlayerDamaged { damage: 100.0 }, start);
        let frozen_at = game.world().player(1).unwrap().position;
        game.broadcaster_mut().clear();

        game.handle_message(1, ClientMessage::Move(Vec3::new(3.0, 0.5, 3.0)), start);
        game.handle_message(1, ClientMessage::PlayerDamaged { damage: 5.0 }, start);

        assert_eq!(game.world().player(1).unwrap().position, frozen_at);
        assert!(game.broadcaster().sent.is_empty());
    }

    /// Leaving before the scheduled steps fire turns them into no-ops
    #[test]
    fn disconnect_during_death_sequence() {
        let start = Instant::now();
        let mut game = new_game(start);
        game.handle_connect(1, start);
        game.handle_connect(2, start);
        game.handle_message(1, ClientMessage::PlayerDamaged { damage: 100.0 }, start);
        game.handle_disconnect(1, ms(start, 500));
        game.broadcaster_mut().clear();

        game.tick(ms(start, 1000));
        game.tick(ms(start, 6000));
        assert!(game.broadcaster().disconnected().is_empty());
        assert!(!game
            .broadcaster()
            .messages()
            .iter()
            .any(|m| matches!(m, ServerMessage::PlayerDied(_) | ServerMessage::DeathScreenComplete)));
    }

    /// Death is recorded against the account once the sequence completes
    #[test]
    fn death_records_session() {
        let start = Instant::now();
        let mut game = new_game(start);
        game.handle_connect(1, start);
        game.handle_message(
            1,
            ClientMessage::Authenticate {
                account_id: "grace".to_string(),
            },
            start,
        );
        let id = game
            .world_mut()
            .create_enemy(EnemyKind::Ladybug, Rarity::Common, Vec3::new(5.0, 0.0, 5.0))
            .id;
        kill(&mut game, 1, id, start);
        game.handle_message(1, ClientMessage::PlayerDamaged { damage: 150.0 }, start);
        game.tick(ms(start, 6000));

        let account = game.accounts().account("grace").unwrap();
        assert_eq!(account.stats.deaths, 1);
        assert_eq!(account.stats.total_kills, 1);
        assert_eq!(account.total_xp, 10);
        assert_eq!(account.highest_wave, 1);
    }
}

/// WAVE PROGRESSION TESTS
mod wave_tests {
    use super::*;

    /// Wave 1 spawns exactly twenty early-game enemies, one per second
    #[test]
    fn wave_one_spawner() {
        let start = Instant::now();
        let mut game = new_game(start);
        game.handle_connect(1, start);
        game.broadcaster_mut().clear();

        for second in 1..=25 {
            game.tick(ms(start, second * 1000));
        }

        let spawned: Vec<_> = game
            .broadcaster()
            .messages()
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::EnemySpawned(view) => Some(view.clone()),
                _ => None,
            })
            .filter(|view| view.enemy_type != EnemyKind::CentipedeSegment)
            .collect();

        assert_eq!(spawned.len(), ENEMIES_PER_WAVE as usize);
        assert_eq!(game.waves().enemies_spawned, ENEMIES_PER_WAVE);
        assert!(!game.waves().spawner_active());
        for view in spawned {
            assert!(matches!(
                view.enemy_type,
                EnemyKind::Ladybug | EnemyKind::Bee | EnemyKind::Centipede | EnemyKind::BabyAnt
            ));
            assert!(matches!(view.rarity, Rarity::Common | Rarity::Uncommon));
        }
    }

    /// Twenty kills start the next wave and clear leftovers without drops
    #[test]
    fn twenty_kills_advance_the_wave() {
        let start = Instant::now();
        let mut game = new_game(start);
        game.handle_connect(1, start);

        let ids: Vec<u32> = (0..ENEMIES_PER_WAVE + 3)
            .map(|i| {
                game.world_mut()
                    .create_enemy(EnemyKind::Bee, Rarity::Common, Vec3::new(i as f32 * 0.1, 0.0, 3.0))
                    .id
            })
            .collect();
        for id in &ids[..ENEMIES_PER_WAVE as usize - 1] {
            kill(&mut game, 1, *id, start);
        }
        assert_eq!(game.waves().current_wave, 1);
        assert_eq!(game.waves().enemies_killed, ENEMIES_PER_WAVE - 1);
        game.broadcaster_mut().clear();

        kill(&mut game, 1, ids[ENEMIES_PER_WAVE as usize - 1], start);
        assert_eq!(game.waves().current_wave, 2);
        assert_eq!(game.waves().enemies_killed, 0);
        assert_eq!(game.waves().enemies_spawned, 0);
        assert_eq!(game.world().enemy_count(), 0);

        let cleared = game
            .broadcaster()
            .messages()
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::EnemyDied { enemy_id, drop: None } if *enemy_id > ids[19]))
            .count();
        assert_eq!(cleared, 3);
        assert!(game
            .broadcaster()
            .messages()
            .iter()
            .any(|m| matches!(m, ServerMessage::WaveStart { wave: 2, min_rarity: Rarity::Common })));
    }

    /// Losing the last player mid wave 20 resets to wave 1 and clears enemies
    #[test]
    fn idle_reset_from_wave_twenty() {
        let start = Instant::now();
        let mut game = new_game(start);
        game.handle_connect(1, start);

        while game.waves().current_wave < 20 {
            let ids: Vec<u32> = (0..ENEMIES_PER_WAVE)
                .map(|_| {
                    game.world_mut()
                        .create_enemy(EnemyKind::BabyAnt, Rarity::Common, Vec3::new(4.0, 0.0, 4.0))
                        .id
                })
                .collect();
            for id in ids {
                kill(&mut game, 1, id, start);
            }
        }
        assert_eq!(game.waves().min_rarity(), Rarity::Rare);

        game.run_console(
            ConsoleCommand::Spawn {
                kind: EnemyKind::Spider,
                count: 5,
                rarity: None,
            },
            start,
        );
        assert!(game.world().enemy_count() >= 5);

        game.handle_disconnect(1, start);
        assert_eq!(game.waves().current_wave, 1);
        assert_eq!(game.waves().min_rarity(), Rarity::Common);
        assert_eq!(game.world().enemy_count(), 0);
    }

    /// XP is split evenly, rounded down, and the wave keeps the full amount
    #[test]
    fn xp_split_between_players() {
        let start = Instant::now();
        let mut game = new_game(start);
        for id in 1..=3 {
            game.handle_connect(id, start);
        }
        let enemy = game
            .world_mut()
            .create_enemy(EnemyKind::Ladybug, Rarity::Common, Vec3::new(6.0, 0.0, 6.0))
            .id;
        game.broadcaster_mut().clear();

        kill(&mut game, 2, enemy, start);

        for id in 1..=3 {
            assert_eq!(game.world().player(id).unwrap().xp, 3);
        }
        assert_eq!(game.world().player(2).unwrap().kills, 1);
        assert_eq!(game.waves().total_xp, 10);
        let awards = game
            .broadcaster()
            .messages()
            .into_iter()
            .filter(|m| matches!(m, ServerMessage::PlayerXp { amount: 3, .. }))
            .count();
        assert_eq!(awards, 3);
    }

    /// Rarity scales the XP payout
    #[test]
    fn rare_kill_pays_more() {
        let start = Instant::now();
        let mut game = new_game(start);
        game.handle_connect(1, start);
        let enemy = game
            .world_mut()
            .create_enemy(EnemyKind::Spider, Rarity::Legendary, Vec3::new(6.0, 0.0, 6.0))
            .id;
        kill(&mut game, 1, enemy, start);
        assert_eq!(game.world().player(1).unwrap().xp, 150);
    }
}

/// CENTIPEDE TESTS
mod centipede_tests {
    use super::*;

    /// A console-spawned centipede arrives as one head plus a linked tail
    #[test]
    fn centipede_spawn_events_form_a_chain() {
        let start = Instant::now();
        let mut game = new_game(start);
        game.run_console(
            ConsoleCommand::Spawn {
                kind: EnemyKind::Centipede,
                count: 1,
                rarity: Some(Rarity::Uncommon),
            },
            start,
        );

        let views: Vec<_> = game
            .broadcaster()
            .messages()
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::EnemySpawned(view) => Some(view.clone()),
                _ => None,
            })
            .collect();
        assert!(views.len() >= 6);
        assert_eq!(views[0].enemy_type, EnemyKind::Centipede);
        for pair in views.windows(2) {
            assert_eq!(pair[1].enemy_type, EnemyKind::CentipedeSegment);
            assert_eq!(pair[1].follows_id, Some(pair[0].id));
            assert_eq!(pair[1].centipede_id, Some(views[0].id));
            assert_eq!(pair[1].rarity, Rarity::Uncommon);
        }
    }

    /// Killing the head promotes the first segment and keeps the tail linked
    #[test]
    fn head_death_promotes_next_segment() {
        let start = Instant::now();
        let mut game = new_game(start);
        game.handle_connect(1, start);
        game.run_console(
            ConsoleCommand::Spawn {
                kind: EnemyKind::Centipede,
                count: 1,
                rarity: Some(Rarity::Common),
            },
            start,
        );
        let head = game
            .world()
            .enemies()
            .find(|e| e.kind == EnemyKind::Centipede)
            .unwrap()
            .clone();
        let first = head.segments[0];
        game.broadcaster_mut().clear();

        kill(&mut game, 1, head.id, start);

        let promoted = game.world().enemy(first).unwrap();
        assert_eq!(promoted.kind, EnemyKind::Centipede);
        assert_eq!(promoted.follows_id, None);
        assert_eq!(promoted.segments, head.segments[1..].to_vec());
        assert!(game
            .broadcaster()
            .messages()
            .iter()
            .any(|m| matches!(m, ServerMessage::EnemySpawned(view) if view.id == first)));

        for _ in 0..120 {
            game.tick(start);
        }
        for id in &head.segments[1..] {
            let segment = game.world().enemy(*id).unwrap();
            let leader = game.world().enemy(segment.follows_id.unwrap()).unwrap();
            let gap = segment.position.ground_distance(&leader.position);
            assert!(gap <= 0.6 * 1.1 + 1e-3, "gap {gap} too wide");
        }
    }
}

/// ACCOUNT AND ITEM TESTS
mod account_tests {
    use super::*;

    /// Authenticating pushes the account and inventory to that client only
    #[test]
    fn authenticate_syncs_account() {
        let start = Instant::now();
        let mut game = new_game(start);
        game.handle_connect(1, start);
        game.handle_connect(2, start);
        game.handle_message(
            1,
            ClientMessage::Authenticate {
                account_id: "heidi".to_string(),
            },
            start,
        );

        assert!(game
            .broadcaster()
            .messages_to(1)
            .iter()
            .any(|m| matches!(m, ServerMessage::AccountSync(account) if account.id == "heidi")));
        assert!(!game
            .broadcaster()
            .messages_to(2)
            .iter()
            .any(|m| matches!(m, ServerMessage::AccountSync(_))));
    }

    /// Worker ants leave a leaf that goes into the collector's account
    #[test]
    fn worker_ant_leaf_is_collected() {
        let start = Instant::now();
        let mut game = new_game(start);
        game.handle_connect(1, start);
        game.handle_message(
            1,
            ClientMessage::Authenticate {
                account_id: "ivan".to_string(),
            },
            start,
        );
        let ant = game
            .world_mut()
            .create_enemy(EnemyKind::WorkerAnt, Rarity::Epic, Vec3::new(2.0, 0.0, 2.0))
            .id;
        kill(&mut game, 1, ant, start);

        let item = game.world().items().next().unwrap().clone();
        assert_eq!(item.kind, ItemKind::Leaf);
        assert_eq!(item.rarity, Rarity::Epic);

        game.handle_message(1, ClientMessage::CollectItem { item_id: item.id }, start);
        assert_eq!(game.world().items().count(), 0);
        let account = game.accounts().account("ivan").unwrap();
        assert_eq!(account.inventory.petal_count("leaf", Rarity::Epic), 1);
    }

    /// Leaving records XP, kills and best wave
    #[test]
    fn disconnect_records_session() {
        let start = Instant::now();
        let mut game = new_game(start);
        game.handle_connect(1, start);
        game.handle_message(
            1,
            ClientMessage::Authenticate {
                account_id: "judy".to_string(),
            },
            start,
        );
        let bee = game
            .world_mut()
            .create_enemy(EnemyKind::Bee, Rarity::Common, Vec3::new(2.0, 0.0, 2.0))
            .id;
        kill(&mut game, 1, bee, start);
        game.handle_disconnect(1, start);

        let account = game.accounts().account("judy").unwrap();
        assert_eq!(account.total_xp, 15);
        assert_eq!(account.stats.total_kills, 1);
        assert_eq!(account.stats.deaths, 0);
        assert_eq!(account.stats.sessions, 1);
    }
}

/// GATEWAY TESTS
mod gateway_tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use server::network::Server;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message;

    async fn next_matching<S, F>(read: &mut S, mut wanted: F) -> ServerMessage
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>>
            + Unpin,
        F: FnMut(&ServerMessage) -> bool,
    {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), read.next())
                .await
                .expect("timed out waiting for a frame")
                .expect("stream ended")
                .expect("websocket error");
            if let Message::Text(text) = frame {
                let message: ServerMessage = serde_json::from_str(&text).unwrap();
                if wanted(&message) {
                    return message;
                }
            }
        }
    }

    /// Movement from one client reaches the other over real sockets
    #[tokio::test]
    async fn test_movement_relayed_between_clients() {
        let mut server = Server::new(
            "127.0.0.1:0",
            Duration::from_millis(16),
            8,
            Box::new(MemoryStore::new()),
            WorldConfig::default(),
            GameSettings::default(),
        )
        .await
        .unwrap();
        let url = format!("ws://{}", server.local_addr());
        tokio::spawn(async move {
            let _ = server.run().await;
        });

        let (a, _) = connect_async(url.as_str()).await.unwrap();
        let (mut a_write, mut a_read) = a.split();
        next_matching(&mut a_read, |m| matches!(m, ServerMessage::WorldSnapshot { .. })).await;

        let (b, _) = connect_async(url.as_str()).await.unwrap();
        let (_b_write, mut b_read) = b.split();
        let a_id = match next_matching(&mut b_read, |m| {
            matches!(m, ServerMessage::WorldSnapshot { .. })
        })
        .await
        {
            ServerMessage::WorldSnapshot { players, .. } => players[0].id,
            _ => unreachable!(),
        };

        let target = Vec3::new(2.0, 0.5, -3.0);
        let frame = serde_json::to_string(&ClientMessage::Move(target)).unwrap();
        a_write.send(Message::Text(frame)).await.unwrap();

        match next_matching(&mut b_read, |m| matches!(m, ServerMessage::PlayerMoved { .. })).await {
            ServerMessage::PlayerMoved {
                player_id,
                position,
            } => {
                assert_eq!(player_id, a_id);
                assert_eq!(position, target);
            }
            _ => unreachable!(),
        }
    }
}
