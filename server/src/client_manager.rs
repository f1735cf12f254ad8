//! Connected WebSocket sessions and their outbound queues
//!
//! This module tracks every live connection the server has accepted:
//! - Player id assignment and the capacity limit
//! - The per-connection outbound queue drained by that socket's writer task
//! - Targeted, broadcast and close delivery on behalf of the simulation
//!
//! A new connection is left out of broadcasts until its first targeted
//! frame (the world snapshot) has been queued, so nothing the client cannot
//! place yet ever reaches it ahead of the snapshot.
//!
//! The manager never touches a socket directly. Each connection owns its
//! sink; the manager only holds the sending half of the queue feeding it, so
//! a slow or dead client can never stall delivery to anyone else.

use log::{debug, info};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

/// A connected client and the queue feeding its socket
#[derive(Debug)]
pub struct Client {
    /// Player id assigned by the server, shared with the simulation
    pub id: u32,
    /// Remote address, used for logging
    pub addr: SocketAddr,
    pub connected_at: Instant,
    /// Frames waiting to be written by this connection's writer task
    pub sender: mpsc::UnboundedSender<Message>,
    /// Set once a targeted frame has been queued; broadcasts skip the
    /// client until then
    pub ready: bool,
}

impl Client {
    /// Creates a client record for a freshly accepted connection
    pub fn new(id: u32, addr: SocketAddr, sender: mpsc::UnboundedSender<Message>) -> Self {
        Self {
            id,
            addr,
            connected_at: Instant::now(),
            sender,
            ready: false,
        }
    }

    /// Queues a frame. Returns false if the writer task is gone, which
    /// means the connection is already closing.
    pub fn send(&self, message: Message) -> bool {
        self.sender.send(message).is_ok()
    }
}

/// Registry of live connections
///
/// Ids start at 1 and are never reused within one server run, so a late
/// message from a dropped connection can never be attributed to a newer
/// player. Iteration is in id order, which keeps broadcast order stable.
pub struct ClientManager {
    clients: BTreeMap<u32, Client>,
    next_client_id: u32,
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty manager that accepts at most `max_clients`
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: BTreeMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Registers a connection and returns its player id, or `None` when the
    /// server is full.
    pub fn add_client(
        &mut self,
        addr: SocketAddr,
        sender: mpsc::UnboundedSender<Message>,
    ) -> Option<u32> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients
            .insert(client_id, Client::new(client_id, addr, sender));
        Some(client_id)
    }

    /// Forgets a connection. Returns true if it was known.
    pub fn remove_client(&mut self, client_id: &u32) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!(
                "Client {} disconnected after {:.1}s",
                client.id,
                client.connected_at.elapsed().as_secs_f32()
            );
            true
        } else {
            false
        }
    }

    /// Queues a text frame for one client and opens it up to broadcasts.
    /// Unknown ids are ignored.
    pub fn send_to(&mut self, client_id: u32, text: &str) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.ready = true;
                client.send(Message::Text(text.to_string()))
            }
            None => {
                debug!("Dropping message for unknown client {}", client_id);
                false
            }
        }
    }

    /// Queues a text frame for every ready client except `exclude`. Returns
    /// the number of queues that accepted it.
    pub fn broadcast(&self, text: &str, exclude: Option<u32>) -> usize {
        self.clients
            .values()
            .filter(|client| client.ready && Some(client.id) != exclude)
            .filter(|client| client.send(Message::Text(text.to_string())))
            .count()
    }

    /// Asks the connection's writer to send a close frame and stop.
    pub fn close(&self, client_id: u32) -> bool {
        self.clients
            .get(&client_id)
            .map(|client| client.send(Message::Close(None)))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

/// Tests for connection bookkeeping and delivery routing
#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    fn queue() -> (
        mpsc::UnboundedSender<Message>,
        mpsc::UnboundedReceiver<Message>,
    ) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn test_client_creation() {
        let (tx, _rx) = queue();
        let client = Client::new(1, test_addr(), tx);

        assert_eq!(client.id, 1);
        assert_eq!(client.addr, test_addr());
        assert!(!client.ready);
    }

    #[test]
    fn test_client_send_after_receiver_dropped() {
        let (tx, rx) = queue();
        let client = Client::new(1, test_addr(), tx);
        assert!(client.send(Message::Text("a".into())));
        drop(rx);
        assert!(!client.send(Message::Text("b".into())));
    }

    #[test]
    fn test_client_manager_creation() {
        let manager = ClientManager::new(5);
        assert_eq!(manager.max_clients, 5);
        assert!(manager.is_empty());
        assert_eq!(manager.len(), 0);
    }

    #[test]
    fn test_add_multiple_clients() {
        let mut manager = ClientManager::new(3);
        let (tx1, _rx1) = queue();
        let (tx2, _rx2) = queue();

        assert_eq!(manager.add_client(test_addr(), tx1), Some(1));
        assert_eq!(manager.add_client(test_addr2(), tx2), Some(2));
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);
        let (tx1, _rx1) = queue();
        let (tx2, _rx2) = queue();

        assert!(manager.add_client(test_addr(), tx1).is_some());
        assert!(manager.add_client(test_addr2(), tx2).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut manager = ClientManager::new(2);
        let (tx1, _rx1) = queue();
        let (tx2, _rx2) = queue();

        let first = manager.add_client(test_addr(), tx1).unwrap();
        assert!(manager.remove_client(&first));
        let second = manager.add_client(test_addr(), tx2).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_remove_nonexistent_client() {
        let mut manager = ClientManager::new(2);
        assert!(!manager.remove_client(&999));
    }

    #[test]
    fn test_broadcast_waits_for_first_targeted_frame() {
        let mut manager = ClientManager::new(2);
        let (tx, mut rx) = queue();
        let id = manager.add_client(test_addr(), tx).unwrap();

        assert_eq!(manager.broadcast("enemy-moved", None), 0);
        assert!(rx.try_recv().is_err());

        assert!(manager.send_to(id, "snapshot"));
        assert_eq!(manager.broadcast("enemy-moved", None), 1);
        assert_eq!(rx.try_recv().unwrap(), Message::Text("snapshot".into()));
        assert_eq!(rx.try_recv().unwrap(), Message::Text("enemy-moved".into()));
    }

    #[test]
    fn test_send_to_and_broadcast_routing() {
        let mut manager = ClientManager::new(3);
        let (tx1, mut rx1) = queue();
        let (tx2, mut rx2) = queue();
        let id1 = manager.add_client(test_addr(), tx1).unwrap();
        let id2 = manager.add_client(test_addr2(), tx2).unwrap();

        assert!(manager.send_to(id1, "only-one"));
        assert!(manager.send_to(id2, "only-two"));
        assert!(!manager.send_to(99, "nobody"));
        assert_eq!(manager.broadcast("everyone-else", Some(id1)), 1);
        assert_eq!(manager.broadcast("everyone", None), 2);

        assert_eq!(rx1.try_recv().unwrap(), Message::Text("only-one".into()));
        assert_eq!(rx1.try_recv().unwrap(), Message::Text("everyone".into()));
        assert!(rx1.try_recv().is_err());

        assert_eq!(rx2.try_recv().unwrap(), Message::Text("only-two".into()));
        assert_eq!(rx2.try_recv().unwrap(), Message::Text("everyone-else".into()));
        assert_eq!(rx2.try_recv().unwrap(), Message::Text("everyone".into()));
    }

    #[test]
    fn test_close_queues_close_frame() {
        let mut manager = ClientManager::new(1);
        let (tx, mut rx) = queue();
        let id = manager.add_client(test_addr(), tx).unwrap();

        assert!(manager.close(id));
        assert_eq!(rx.try_recv().unwrap(), Message::Close(None));
        assert!(!manager.close(id + 1));
    }
}
