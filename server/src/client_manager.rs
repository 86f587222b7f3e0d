//! Connection bookkeeping for the UDP transport
//!
//! This module tracks which network addresses are currently playing:
//! - Connection lifecycle (connect, disconnect, timeout)
//! - Capacity limits and player id assignment
//! - Address lookup in both directions for routing inbound packets and
//!   addressing outbound events
//!
//! It knows nothing about ships or the world; the simulation is told about
//! joins and leaves by the network layer.

use log::info;
use shared::PlayerId;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// Silence after which a connection is considered gone.
pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A connected player's transport state
#[derive(Debug)]
pub struct Client {
    /// Player id assigned by the server
    pub id: PlayerId,
    /// Where events for this player are sent
    pub addr: SocketAddr,
    /// Last time any packet arrived from this client
    pub last_seen: Instant,
    /// Actions from this client that were rejected
    pub rejected: u32,
}

impl Client {
    pub fn new(id: PlayerId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_seen: Instant::now(),
            rejected: 0,
        }
    }

    /// Marks the client as alive
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Returns true if nothing has been heard from the client within
    /// `timeout`, which usually means it went away without saying so.
    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Manages every connected client
///
/// Enforces the server's capacity, hands out increasing player ids and maps
/// between ids and addresses. Ids are never reused within a process.
pub struct ClientManager {
    /// Connected clients indexed by player id
    clients: HashMap<PlayerId, Client>,
    /// Next id to hand out
    next_client_id: PlayerId,
    /// Maximum number of concurrent clients allowed
    max_clients: usize,
}

impl ClientManager {
    /// Creates an empty roster that accepts up to `max_clients` connections.
    /// Player ids start at 1.
    pub fn new(max_clients: usize) -> Self {
        Self {
            clients: HashMap::new(),
            next_client_id: 1,
            max_clients,
        }
    }

    /// Attempts to register a new connection
    ///
    /// Returns the new player id, or None if the server is full.
    pub fn add_client(&mut self, addr: SocketAddr) -> Option<PlayerId> {
        if self.clients.len() >= self.max_clients {
            return None;
        }

        let client_id = self.next_client_id;
        self.next_client_id += 1;

        info!("Client {} connected from {}", client_id, addr);
        self.clients.insert(client_id, Client::new(client_id, addr));

        Some(client_id)
    }

    /// Removes a client. Returns false if it was already gone, so explicit
    /// disconnects racing a timeout are harmless.
    pub fn remove_client(&mut self, client_id: &PlayerId) -> bool {
        if let Some(client) = self.clients.remove(client_id) {
            info!("Client {} disconnected", client.id);
            true
        } else {
            false
        }
    }

    /// Finds the player id behind a network address
    pub fn find_client_by_addr(&self, addr: SocketAddr) -> Option<PlayerId> {
        self.clients
            .iter()
            .find(|(_, client)| client.addr == addr)
            .map(|(id, _)| *id)
    }

    pub fn client_addr(&self, client_id: PlayerId) -> Option<SocketAddr> {
        self.clients.get(&client_id).map(|client| client.addr)
    }

    /// Refreshes a client's activity timestamp. Returns false for unknown ids.
    pub fn touch(&mut self, client_id: PlayerId) -> bool {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.touch();
                true
            }
            None => false,
        }
    }

    /// Counts a rejected action against a client
    pub fn note_rejection(&mut self, client_id: PlayerId) -> u32 {
        match self.clients.get_mut(&client_id) {
            Some(client) => {
                client.rejected += 1;
                client.rejected
            }
            None => 0,
        }
    }

    /// Removes clients that have been silent longer than [`CLIENT_TIMEOUT`]
    ///
    /// Returns the removed ids so the simulation can drop their ships.
    pub fn check_timeouts(&mut self) -> Vec<PlayerId> {
        self.check_timeouts_after(CLIENT_TIMEOUT)
    }

    pub fn check_timeouts_after(&mut self, timeout: Duration) -> Vec<PlayerId> {
        let mut timed_out: Vec<PlayerId> = self
            .clients
            .iter()
            .filter(|(_, client)| client.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();
        timed_out.sort_unstable();

        for client_id in &timed_out {
            self.remove_client(client_id);
        }

        timed_out
    }

    /// Resolves a recipient list to addresses, skipping players that have
    /// disconnected since the event was produced.
    pub fn addrs_for(&self, recipients: &[PlayerId]) -> Vec<(PlayerId, SocketAddr)> {
        recipients
            .iter()
            .filter_map(|id| self.clients.get(id).map(|client| (*id, client.addr)))
            .collect()
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_addr() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }

    fn test_addr2() -> SocketAddr {
        "127.0.0.1:8081".parse().unwrap()
    }

    #[test]
    fn test_client_creation() {
        let addr = test_addr();
        let client = Client::new(1, addr);

        assert_eq!(client.id, 1);
        assert_eq!(client.addr, addr);
        assert_eq!(client.rejected, 0);
    }

    #[test]
    fn test_client_timeout() {
        let mut client = Client::new(1, test_addr());
        assert!(!client.is_timed_out(Duration::from_secs(1)));

        client.last_seen = Instant::now() - Duration::from_secs(2);
        assert!(client.is_timed_out(Duration::from_secs(1)));

        client.touch();
        assert!(!client.is_timed_out(Duration::from_secs(1)));
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

        let client_id1 = manager.add_client(test_addr()).unwrap();
        let client_id2 = manager.add_client(test_addr2()).unwrap();

        assert_eq!(client_id1, 1);
        assert_eq!(client_id2, 2);
        assert_eq!(manager.len(), 2);
    }

    #[test]
    fn test_add_client_max_capacity() {
        let mut manager = ClientManager::new(1);

        assert!(manager.add_client(test_addr()).is_some());
        assert!(manager.add_client(test_addr2()).is_none());
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_remove_client_twice() {
        let mut manager = ClientManager::new(2);
        let client_id = manager.add_client(test_addr()).unwrap();

        assert!(manager.remove_client(&client_id));
        assert!(!manager.remove_client(&client_id));
        assert!(manager.is_empty());
    }

    #[test]
    fn test_address_lookups() {
        let mut manager = ClientManager::new(2);
        let client_id1 = manager.add_client(test_addr()).unwrap();
        let client_id2 = manager.add_client(test_addr2()).unwrap();

        assert_eq!(manager.find_client_by_addr(test_addr()), Some(client_id1));
        assert_eq!(manager.client_addr(client_id2), Some(test_addr2()));

        let unknown_addr: SocketAddr = "192.168.1.1:9999".parse().unwrap();
        assert_eq!(manager.find_client_by_addr(unknown_addr), None);
    }

    #[test]
    fn test_addrs_for_skips_departed() {
        let mut manager = ClientManager::new(3);
        let a = manager.add_client(test_addr()).unwrap();
        let b = manager.add_client(test_addr2()).unwrap();
        manager.remove_client(&b);

        let addrs = manager.addrs_for(&[a, b, 77]);
        assert_eq!(addrs, vec![(a, test_addr())]);
    }

    #[test]
    fn test_timeouts_remove_silent_clients() {
        let mut manager = ClientManager::new(3);
        let quiet = manager.add_client(test_addr()).unwrap();
        let chatty = manager.add_client(test_addr2()).unwrap();
        if let Some(client) = manager.clients.get_mut(&quiet) {
            client.last_seen = Instant::now() - Duration::from_secs(10);
        }
        assert!(manager.touch(chatty));

        assert_eq!(manager.check_timeouts(), vec![quiet]);
        assert_eq!(manager.len(), 1);
        assert!(!manager.touch(quiet));
    }

    #[test]
    fn test_rejection_counter() {
        let mut manager = ClientManager::new(1);
        let id = manager.add_client(test_addr()).unwrap();
        assert_eq!(manager.note_rejection(id), 1);
        assert_eq!(manager.note_rejection(id), 2);
        assert_eq!(manager.note_rejection(99), 0);
    }
}
