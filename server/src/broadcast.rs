//! Outbound delivery seam between the simulation and the network.
//!
//! The simulation only ever talks to a [`Broadcaster`]. In the running
//! server that is a [`ChannelBroadcaster`] feeding the network sender task;
//! tests use a [`RecordingBroadcaster`] and inspect what would have gone out.

use crate::world::PlayerId;
use log::error;
use shared::ServerMessage;
use tokio::sync::mpsc;

/// Fire-and-forget delivery of server events. Implementations must not
/// block; failures are logged, never returned.
pub trait Broadcaster {
    fn send_to(&mut self, player_id: PlayerId, message: ServerMessage);
    fn broadcast(&mut self, message: ServerMessage);
    fn broadcast_except(&mut self, exclude: PlayerId, message: ServerMessage);
    /// Closes the connection belonging to `player_id`.
    fn disconnect(&mut self, player_id: PlayerId);
}

/// Work item for the network sender task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    SendTo {
        player_id: PlayerId,
        message: ServerMessage,
    },
    Broadcast {
        message: ServerMessage,
        exclude: Option<PlayerId>,
    },
    Disconnect {
        player_id: PlayerId,
    },
}

pub struct ChannelBroadcaster {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl ChannelBroadcaster {
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }

    fn queue(&self, outbound: Outbound) {
        if let Err(e) = self.tx.send(outbound) {
            error!("Failed to queue outbound message: {}", e);
        }
    }
}

impl Broadcaster for ChannelBroadcaster {
    fn send_to(&mut self, player_id: PlayerId, message: ServerMessage) {
        self.queue(Outbound::SendTo { player_id, message });
    }

    fn broadcast(&mut self, message: ServerMessage) {
        self.queue(Outbound::Broadcast {
            message,
            exclude: None,
        });
    }

    fn broadcast_except(&mut self, exclude: PlayerId, message: ServerMessage) {
        self.queue(Outbound::Broadcast {
            message,
            exclude: Some(exclude),
        });
    }

    fn disconnect(&mut self, player_id: PlayerId) {
        self.queue(Outbound::Disconnect { player_id });
    }
}

/// Keeps every outbound event in order instead of sending it.
#[derive(Debug, Default)]
pub struct RecordingBroadcaster {
    pub sent: Vec<Outbound>,
}

impl RecordingBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages that would have reached `player_id`, in send order.
    pub fn messages_to(&self, player_id: PlayerId) -> Vec<&ServerMessage> {
        self.sent
            .iter()
            .filter_map(|outbound| match outbound {
                Outbound::SendTo {
                    player_id: id,
                    message,
                } if *id == player_id => Some(message),
                Outbound::Broadcast { message, exclude } if *exclude != Some(player_id) => {
                    Some(message)
                }
                _ => None,
            })
            .collect()
    }

    /// Every message regardless of recipient.
    pub fn messages(&self) -> Vec<&ServerMessage> {
        self.sent
            .iter()
            .filter_map(|outbound| match outbound {
                Outbound::SendTo { message, .. } | Outbound::Broadcast { message, .. } => {
                    Some(message)
                }
                Outbound::Disconnect { .. } => None,
            })
            .collect()
    }

    pub fn disconnected(&self) -> Vec<PlayerId> {
        self.sent
            .iter()
            .filter_map(|outbound| match outbound {
                Outbound::Disconnect { player_id } => Some(*player_id),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.sent.clear();
    }
}

impl Broadcaster for RecordingBroadcaster {
    fn send_to(&mut self, player_id: PlayerId, message: ServerMessage) {
        self.sent.push(Outbound::SendTo { player_id, message });
    }

    fn broadcast(&mut self, message: ServerMessage) {
        self.sent.push(Outbound::Broadcast {
            message,
            exclude: None,
        });
    }

    fn broadcast_except(&mut self, exclude: PlayerId, message: ServerMessage) {
        self.sent.push(Outbound::Broadcast {
            message,
            exclude: Some(exclude),
        });
    }

    fn disconnect(&mut self, player_id: PlayerId) {
        self.sent.push(Outbound::Disconnect { player_id });
    }
}
