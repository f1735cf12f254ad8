//! WebSocket gateway and the loop that drives the simulation

use crate::account::AccountStore;
use crate::broadcast::{ChannelBroadcaster, Outbound};
use crate::client_manager::ClientManager;
use crate::config::{GameSettings, WorldConfig};
use crate::console::{CommandError, ConsoleCommand, USAGE};
use crate::game::Game;
use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::ClientMessage;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

/// Keep-alive ping period for idle connections
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Messages sent from network tasks to the main server loop
#[derive(Debug)]
pub enum NetworkEvent {
    ClientConnected { client_id: u32 },
    ClientDisconnected { client_id: u32 },
    MessageReceived {
        client_id: u32,
        message: ClientMessage,
    },
    Console(ConsoleCommand),
}

/// Main server coordinating networking and game simulation
pub struct Server {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    clients: Arc<RwLock<ClientManager>>,
    game: Game<ChannelBroadcaster>,
    tick_duration: Duration,
    console: bool,

    // Communication channels
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
    event_rx: mpsc::UnboundedReceiver<NetworkEvent>,
    outbound_rx: Option<mpsc::UnboundedReceiver<Outbound>>,
}

impl Server {
    pub async fn new(
        addr: &str,
        tick_duration: Duration,
        max_clients: usize,
        accounts: Box<dyn AccountStore + Send>,
        world_config: WorldConfig,
        settings: GameSettings,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on ws://{}", local_addr);

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let game = Game::new(
            ChannelBroadcaster::new(outbound_tx),
            accounts,
            world_config,
            settings,
            Instant::now(),
        );

        Ok(Server {
            listener: Some(listener),
            local_addr,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            game,
            tick_duration,
            console: false,
            event_tx,
            event_rx,
            outbound_rx: Some(outbound_rx),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Read operator commands from stdin while running.
    pub fn enable_console(&mut self) {
        self.console = true;
    }

    /// Spawns the task accepting new TCP connections
    fn spawn_acceptor(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let clients = Arc::clone(&self.clients);
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        tokio::spawn(handle_connection(
                            stream,
                            addr,
                            Arc::clone(&clients),
                            event_tx.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that serializes outbound events and routes them to
    /// the per-connection queues
    fn spawn_network_sender(&mut self) {
        let Some(mut outbound_rx) = self.outbound_rx.take() else {
            return;
        };
        let clients = Arc::clone(&self.clients);

        tokio::spawn(async move {
            while let Some(outbound) = outbound_rx.recv().await {
                match outbound {
                    Outbound::SendTo { player_id, message } => {
                        match serde_json::to_string(&message) {
                            Ok(text) => {
                                clients.write().await.send_to(player_id, &text);
                            }
                            Err(e) => error!("Failed to serialize message: {}", e),
                        }
                    }
                    Outbound::Broadcast { message, exclude } => {
                        match serde_json::to_string(&message) {
                            Ok(text) => {
                                clients.read().await.broadcast(&text, exclude);
                            }
                            Err(e) => error!("Failed to serialize broadcast: {}", e),
                        }
                    }
                    Outbound::Disconnect { player_id } => {
                        clients.read().await.close(player_id);
                    }
                }
            }
        });
    }

    /// Spawns task reading operator commands from stdin
    fn spawn_console_reader(&self) {
        let event_tx = self.event_tx.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => match line.parse::<ConsoleCommand>() {
                        Ok(command) => {
                            if event_tx.send(NetworkEvent::Console(command)).is_err() {
                                break;
                            }
                        }
                        Err(CommandError::Empty) => {}
                        Err(e) => println!("{}\n{}", e, USAGE),
                    },
                    Ok(None) => {
                        debug!("Console input closed");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read console input: {}", e);
                        break;
                    }
                }
            }
        });
    }

    fn handle_event(&mut self, event: NetworkEvent) {
        let now = Instant::now();
        match event {
            NetworkEvent::ClientConnected { client_id } => {
                self.game.handle_connect(client_id, now);
            }
            NetworkEvent::ClientDisconnected { client_id } => {
                self.game.handle_disconnect(client_id, now);
            }
            NetworkEvent::MessageReceived { client_id, message } => {
                self.game.handle_message(client_id, message, now);
            }
            NetworkEvent::Console(command) => {
                let output = self.game.run_console(command, now);
                println!("{}", output);
            }
        }
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_acceptor();
        self.spawn_network_sender();
        if self.console {
            self.spawn_console_reader();
        }

        let mut tick_interval = interval(self.tick_duration);
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut last_tick = Instant::now();

        info!("Server started successfully");

        loop {
            tokio::select! {
                // Handle network events
                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event),
                        None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // Handle server tick events
                _ = tick_interval.tick() => {
                    let now = Instant::now();
                    let dt = now.duration_since(last_tick).as_secs_f32();
                    last_tick = now;

                    self.game.tick(now);

                    // Periodic performance monitoring
                    if self.game.tick_count() % 60 == 0 {
                        let client_count = self.clients.read().await.len();
                        if client_count > 0 {
                            debug!(
                                "Tick {}: {} clients, {:.1}Hz, {} enemies, wave {}",
                                self.game.tick_count(),
                                client_count,
                                1.0 / dt.max(f32::EPSILON),
                                self.game.world().enemy_count(),
                                self.game.waves().current_wave
                            );
                        }
                    }
                },
            }
        }

        Ok(())
    }
}

/// Runs one WebSocket session: registers it, pumps frames both ways and
/// reports the disconnect when either direction ends
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    clients: Arc<RwLock<ClientManager>>,
    event_tx: mpsc::UnboundedSender<NetworkEvent>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    let (mut write, mut read) = ws_stream.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let client_id = {
        let mut clients = clients.write().await;
        clients.add_client(addr, tx)
    };
    let Some(client_id) = client_id else {
        warn!("Rejecting {}: server full", addr);
        let _ = write.send(Message::Close(None)).await;
        return;
    };

    if event_tx
        .send(NetworkEvent::ClientConnected { client_id })
        .is_err()
    {
        clients.write().await.remove_client(&client_id);
        return;
    }

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        loop {
            tokio::select! {
                frame = rx.recv() => {
                    match frame {
                        Some(Message::Close(reason)) => {
                            let _ = write.send(Message::Close(reason)).await;
                            break;
                        }
                        Some(frame) => {
                            if write.send(frame).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = heartbeat.tick() => {
                    if write.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    let recv_tx = event_tx.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(frame) = read.next().await {
            match frame {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(message) => {
                        let event = NetworkEvent::MessageReceived { client_id, message };
                        if recv_tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Malformed message from client {}: {}", client_id, e),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!("Connection error from client {}: {}", client_id, e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    };

    clients.write().await.remove_client(&client_id);
    if let Err(e) = event_tx.send(NetworkEvent::ClientDisconnected { client_id }) {
        error!("Failed to report disconnect of client {}: {}", client_id, e);
    }
}
