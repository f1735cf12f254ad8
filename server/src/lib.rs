//! # Wave Survival Server Library
//!
//! This library provides the authoritative server for a real-time
//! multiplayer wave-survival game. Players share one arena and fight waves
//! of enemies; the server owns every player, enemy, item and wave counter,
//! advances the simulation at a fixed tick rate and pushes deltas to clients
//! over WebSocket.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! Enemy AI, contact damage, knockback, centipede chains, XP and wave
//! progression are decided here. Clients report intents (movement, hits
//! they landed, damage they took) and mirror the events the server emits.
//!
//! ### Client Management
//! Handles the lifecycle of client connections:
//! - Connection establishment and player id assignment
//! - Per-connection outbound queues so one slow socket never stalls others
//! - Disconnect handling and the death-sequence forced disconnect
//!
//! ### State Broadcasting
//! Every state change is announced as a discrete JSON event. Delivery is
//! best-effort; the next tick supersedes anything that was lost.
//!
//! ## Architecture Design
//!
//! ### Single Simulation Timeline
//! Network tasks only decode frames and forward them over a channel. One
//! loop owns the [`game::Game`] and processes events and ticks strictly one
//! after another, so no simulation state is ever shared between tasks.
//!
//! ### Injected Delivery
//! The simulation talks to a [`broadcast::Broadcaster`]. The running server
//! plugs in a channel to the network sender task; tests plug in a recorder.
//!
//! ### Deferred Work
//! Wave spawning and the two-stage death sequence are driven by deadlines
//! checked against the monotonic clock on each tick rather than by timers,
//! which keeps them cancellable and deterministic under test.
//!
//! ## Module Organization
//!
//! ### World (`world`, `math`)
//! Entity registry for players, enemies and items, centipede chain repair
//! on removal, and the ground-plane geometry helpers.
//!
//! ### Simulation (`ai`, `spawn`, `wave`, `scheduler`, `game`)
//! Per-tick enemy pipeline, enemy creation, wave counters and random rolls,
//! the deferred task queue, and the event handlers tying them together.
//!
//! ### Collaborators (`account`, `config`, `console`)
//! Account persistence behind a trait, runtime settings and the opaque
//! world configuration, and the operator command parser.
//!
//! ### Network (`client_manager`, `network`, `broadcast`)
//! WebSocket sessions, the gateway loop and the delivery seam.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::account::MemoryStore;
//! use server::config::{GameSettings, WorldConfig};
//! use server::network::Server;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(16), // ~60Hz
//!         32,
//!         Box::new(MemoryStore::new()),
//!         WorldConfig::default(),
//!         GameSettings::default(),
//!     )
//!     .await?;
//!
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod account;
pub mod ai;
pub mod broadcast;
pub mod client_manager;
pub mod config;
pub mod console;
pub mod game;
pub mod math;
pub mod network;
pub mod scheduler;
pub mod spawn;
pub mod wave;
pub mod world;
