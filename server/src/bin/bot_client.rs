use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info, warn};
use shared::{ClientMessage, ServerMessage, Vec2, Vec3, MAP_HALF_SIZE, PLAYER_SPAWN};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::{interval, Instant};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Headless client that wanders around and swats the nearest enemy
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Server WebSocket URL
    #[clap(short, long, default_value = "ws://127.0.0.1:8080")]
    url: String,
    /// Account to authenticate as
    #[clap(short, long)]
    account: Option<String>,
    /// Seconds to stay connected
    #[clap(short, long, default_value = "30")]
    duration: u64,
    /// Damage dealt per swing
    #[clap(long, default_value = "15")]
    damage: f32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Tip: set RUST_LOG=info (or debug) to see bot activity");
    }
    env_logger::init();
    let args = Args::parse();

    let (ws, _) = connect_async(args.url.as_str()).await?;
    info!("Connected to {}", args.url);
    let (mut write, mut read) = ws.split();

    if let Some(account_id) = &args.account {
        let auth = ClientMessage::Authenticate {
            account_id: account_id.clone(),
        };
        write.send(Message::Text(serde_json::to_string(&auth)?)).await?;
    }

    let mut enemies: HashMap<u32, Vec3> = HashMap::new();
    let mut position = PLAYER_SPAWN;
    let mut angle: f32 = 0.0;
    let mut events = 0u64;
    let mut kills_seen = 0u64;

    let mut step = interval(Duration::from_millis(100));
    let mut swing = interval(Duration::from_secs(1));
    let deadline = Instant::now() + Duration::from_secs(args.duration);

    loop {
        tokio::select! {
            frame = read.next() => {
                let Some(frame) = frame else {
                    info!("Server closed the connection");
                    break;
                };
                match frame? {
                    Message::Text(text) => {
                        events += 1;
                        match serde_json::from_str::<ServerMessage>(&text) {
                            Ok(message) => {
                                if let ServerMessage::EnemyDied { .. } = message {
                                    kills_seen += 1;
                                }
                                track(&mut enemies, &message);
                                log_event(&message);
                                if matches!(message, ServerMessage::DeathScreenComplete) {
                                    info!("Died, leaving");
                                    break;
                                }
                            }
                            Err(e) => warn!("Unrecognised event: {}", e),
                        }
                    }
                    Message::Close(_) => {
                        info!("Server closed the connection");
                        break;
                    }
                    _ => {}
                }
            }
            _ = step.tick() => {
                angle += 0.05;
                let radius = MAP_HALF_SIZE * 0.5;
                position = Vec3::new(angle.cos() * radius, PLAYER_SPAWN.y, angle.sin() * radius);
                write.send(Message::Text(serde_json::to_string(&ClientMessage::Move(position))?)).await?;
            }
            _ = swing.tick() => {
                if let Some((enemy_id, at)) = nearest(&enemies, position) {
                    let knockback = Vec2::new(at.x - position.x, at.z - position.z).normalize().scale(0.5);
                    let hit = ClientMessage::EnemyDamaged { enemy_id, damage: args.damage, knockback };
                    write.send(Message::Text(serde_json::to_string(&hit)?)).await?;
                }
            }
            _ = tokio::time::sleep_until(deadline) => {
                info!("Run time elapsed");
                break;
            }
        }
    }

    let _ = write.send(Message::Close(None)).await;
    info!(
        "Bot finished: {} events received, {} enemy deaths seen",
        events, kills_seen
    );
    Ok(())
}

fn track(enemies: &mut HashMap<u32, Vec3>, message: &ServerMessage) {
    match message {
        ServerMessage::WorldSnapshot { enemies: all, .. } => {
            enemies.clear();
            enemies.extend(all.iter().map(|e| (e.id, e.position)));
        }
        ServerMessage::EnemySpawned(view) => {
            enemies.insert(view.id, view.position);
        }
        ServerMessage::EnemyMoved {
            enemy_id, position, ..
        } => {
            enemies.insert(*enemy_id, *position);
        }
        ServerMessage::EnemyDied { enemy_id, .. } => {
            enemies.remove(enemy_id);
        }
        _ => {}
    }
}

fn nearest(enemies: &HashMap<u32, Vec3>, from: Vec3) -> Option<(u32, Vec3)> {
    enemies
        .iter()
        .map(|(id, at)| (*id, *at, from.ground_distance(at)))
        .min_by(|a, b| a.2.total_cmp(&b.2))
        .map(|(id, at, _)| (id, at))
}

fn log_event(message: &ServerMessage) {
    match message {
        ServerMessage::EnemyMoved { .. } => {}
        ServerMessage::WaveStart { wave, min_rarity } => {
            info!("Wave {} started (min rarity {})", wave, min_rarity)
        }
        ServerMessage::PlayerXp {
            amount, total_xp, ..
        } => debug!("+{} xp ({} total)", amount, total_xp),
        other => debug!("{:?}", other),
    }
}
