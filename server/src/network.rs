//! Server network layer handling UDP communications and tick coordination

use crate::actions::ActionError;
use crate::broadcast::{EventSink, Outbound};
use crate::client_manager::ClientManager;
use crate::config::SimConfig;
use crate::persistence::ShipStore;
use crate::scheduler::TickScheduler;
use crate::simulation::Simulation;
use crate::world::WorldSource;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PlayerId, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

pub type NetResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived { packet: Packet, addr: SocketAddr },
    ClientTimeout { client_id: PlayerId },
    Shutdown,
}

/// Messages sent from the server loop to the sender task
#[derive(Debug)]
pub enum GameMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
    Deliver { tick: u64, outbound: Vec<Outbound> },
}

impl EventSink for mpsc::UnboundedSender<GameMessage> {
    fn deliver(&mut self, tick: u64, outbound: Vec<Outbound>) {
        if outbound.is_empty() {
            return;
        }
        if let Err(e) = self.send(GameMessage::Deliver { tick, outbound }) {
            error!("Failed to queue events for tick {}: {}", tick, e);
        }
    }
}

/// Applies one player action packet to the simulation.
///
/// Packets that are not player actions are ignored here; connection
/// management happens in the server loop.
pub fn apply_action(
    simulation: &mut Simulation,
    player: PlayerId,
    packet: Packet,
    now: f64,
) -> Result<(), ActionError> {
    match packet {
        Packet::Move {
            position,
            velocity,
            rotation,
        } => simulation.player_move(player, position, velocity, rotation, now),
        Packet::Fire { direction } => {
            if let Some(target) = simulation.player_fire(player, direction, now)? {
                debug!("Player {} hit {:?}", player, target);
            }
            Ok(())
        }
        Packet::StartMining { object_id } => simulation.start_mining(player, &object_id, now),
        Packet::StartCollect { wreckage_id } => {
            simulation.start_collect(player, wreckage_id, now)
        }
        Packet::CancelCollect { wreckage_id } => {
            if !simulation.cancel_collect(player, wreckage_id) {
                debug!(
                    "Player {} cancelled wreckage {} without holding it",
                    player, wreckage_id
                );
            }
            Ok(())
        }
        other => {
            debug!("Ignoring non-action packet {:?} from player {}", other, player);
            Ok(())
        }
    }
}

/// Main server coordinating networking and the simulation
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    simulation: Simulation,
    scheduler: TickScheduler,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    game_tx: mpsc::UnboundedSender<GameMessage>,
    game_rx: mpsc::UnboundedReceiver<GameMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        config: SimConfig,
        store: Arc<dyn ShipStore>,
        world: Arc<dyn WorldSource>,
        max_clients: usize,
    ) -> NetResult<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (game_tx, game_rx) = mpsc::unbounded_channel();
        let scheduler = TickScheduler::new(config.tick_interval());

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            simulation: Simulation::new(config, store, world),
            scheduler,
            server_tx,
            server_rx,
            game_tx,
            game_rx,
        })
    }

    pub fn local_addr(&self) -> NetResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Channel for injecting messages into the loop, e.g. [`ServerMessage::Shutdown`].
    pub fn handle(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// Spawns task that continuously listens for incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 2048];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        if let Ok(packet) = deserialize::<Packet>(&buffer[0..len]) {
                            if let Err(e) =
                                server_tx.send(ServerMessage::PacketReceived { packet, addr })
                            {
                                error!("Failed to send packet to main loop: {}", e);
                                break;
                            }
                        } else {
                            warn!("Failed to deserialize packet from {}", addr);
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that serializes and sends queued packets and events
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let clients = Arc::clone(&self.clients);
        let mut game_rx = std::mem::replace(&mut self.game_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = game_rx.recv().await {
                match message {
                    GameMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                    GameMessage::Deliver { tick, outbound } => {
                        for Outbound { recipients, event } in outbound {
                            let addrs = {
                                let clients_guard = clients.read().await;
                                clients_guard.addrs_for(&recipients)
                            };
                            if addrs.is_empty() {
                                continue;
                            }

                            let name = event.name();
                            let data = match serialize(&Packet::Event { tick, event }) {
                                Ok(data) => data,
                                Err(e) => {
                                    error!("Failed to encode {} event: {}", name, e);
                                    continue;
                                }
                            };
                            for (client_id, addr) in addrs {
                                if let Err(e) = socket.send_to(&data, addr).await {
                                    error!("Failed to send {} to client {}: {}", name, client_id, e);
                                }
                            }
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts()
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    async fn send_packet_impl(socket: &UdpSocket, packet: &Packet, addr: SocketAddr) -> NetResult<()> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self.game_tx.send(GameMessage::SendPacket { packet, addr }) {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    /// Sends whatever the simulation queued outside of a step
    fn flush_outbound(&mut self) {
        let outbound = self.simulation.drain_outbound();
        let tick = self.simulation.tick();
        self.game_tx.deliver(tick, outbound);
    }

    async fn drop_client(&mut self, client_id: PlayerId) {
        {
            let mut clients = self.clients.write().await;
            clients.remove_client(&client_id);
        }
        self.simulation.remove_player(client_id);
        self.flush_outbound();
    }

    /// Processes one incoming packet
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        let client_id = {
            let mut clients = self.clients.write().await;
            let id = clients.find_client_by_addr(addr);
            if let Some(id) = id {
                clients.touch(id);
            }
            id
        };

        match packet {
            Packet::Connect { client_version } => {
                info!(
                    "Client connecting from {} (version: {})",
                    addr, client_version
                );
                if client_version != PROTOCOL_VERSION {
                    self.send_packet(
                        Packet::Disconnected {
                            reason: "Protocol version mismatch".to_string(),
                        },
                        addr,
                    );
                    return;
                }

                // Reconnecting from the same address replaces the old session
                if let Some(existing_id) = client_id {
                    info!("Removing existing client {} from {}", existing_id, addr);
                    self.drop_client(existing_id).await;
                }

                let new_id = {
                    let mut clients = self.clients.write().await;
                    clients.add_client(addr)
                };

                match new_id {
                    Some(new_id) => {
                        self.simulation.add_player(new_id);
                        self.send_packet(Packet::Connected { client_id: new_id }, addr);
                    }
                    None => {
                        self.send_packet(
                            Packet::Disconnected {
                                reason: "Server full".to_string(),
                            },
                            addr,
                        );
                    }
                }
            }

            Packet::Disconnect => {
                if let Some(client_id) = client_id {
                    self.drop_client(client_id).await;
                }
            }

            Packet::Move { .. }
            | Packet::Fire { .. }
            | Packet::StartMining { .. }
            | Packet::StartCollect { .. }
            | Packet::CancelCollect { .. } => {
                let Some(client_id) = client_id else {
                    warn!("Action from unknown address {}", addr);
                    return;
                };
                let now = self.scheduler.now();
                if let Err(e) = apply_action(&mut self.simulation, client_id, packet, now) {
                    let count = {
                        let mut clients = self.clients.write().await;
                        clients.note_rejection(client_id)
                    };
                    warn!(
                        "Rejected action from client {} ({} so far): {}",
                        client_id, count, e
                    );
                    self.send_packet(
                        Packet::Rejected {
                            reason: e.to_string(),
                        },
                        addr,
                    );
                }
                self.flush_outbound();
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    /// Runs one simulation step and hands its events to the sender
    fn tick(&mut self) {
        let began = std::time::Instant::now();
        let outbound = self.simulation.step(self.scheduler.now());
        let tick = self.simulation.tick();
        self.game_tx.deliver(tick, outbound);
        self.scheduler.finish_step(began.elapsed());
    }

    /// Main server loop coordinating all operations
    pub async fn run(&mut self) -> NetResult<()> {
        // Initialize concurrent tasks
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        self.scheduler.start();

        info!("Server started successfully");

        loop {
            let deadline = tokio::time::Instant::from_std(self.scheduler.next_deadline());
            tokio::select! {
                // Handle network events
                message = self.server_rx.recv() => {
                    match message {
                        Some(ServerMessage::PacketReceived { packet, addr }) => {
                            self.handle_packet(packet, addr).await;
                        },
                        Some(ServerMessage::ClientTimeout { client_id }) => {
                            info!("Client {} timed out", client_id);
                            self.simulation.remove_player(client_id);
                            self.flush_outbound();
                        },
                        Some(ServerMessage::Shutdown) | None => {
                            info!("Server shutting down");
                            break;
                        }
                    }
                },

                // The deadline only moves once the previous step finished
                _ = tokio::time::sleep_until(deadline) => self.tick(),
            }
        }

        self.scheduler.stop();
        self.simulation.stop();
        Ok(())
    }
}
