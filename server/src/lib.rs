//! # Voidline Server Library
//!
//! Authoritative simulation for a persistent multiplayer space-combat and
//! mining world. A fixed-rate tick loop advances NPC behavior, resolves
//! combat, generates and distributes loot and pushes world events to the
//! players close enough to care about them.
//!
//! ## Architecture
//!
//! ### Single-Threaded Simulation
//! All world state lives in one [`simulation::Simulation`] owned by the
//! server loop. Player actions and tick steps are applied strictly one after
//! another, so no entity is ever observed half-updated and double-kill or
//! double-collect races cannot happen.
//!
//! ### Self-Correcting Tick
//! [`scheduler::TickScheduler`] times each step and sleeps only for what is
//! left of the interval. A slow step delays the next one instead of
//! stacking up missed ticks.
//!
//! ### Proximity Broadcast
//! Events carry a position and a range class. [`broadcast::Broadcaster`]
//! resolves them to recipients through a cell-keyed spatial index of
//! connected players; nothing is sent world-wide.
//!
//! ## Module Organization
//!
//! - `spatial`: uniform-grid index with cell-change detection
//! - `archetype`, `entity`, `registry`: NPC stat table, live entities, and
//!   the registry owning NPCs, bases and wreckage
//! - `behavior`: per-faction strategies producing intents
//! - `combat`, `debuff`: damage application, NPC accuracy and player debuffs
//! - `loot`: rarity rolls, faction tables and team distribution
//! - `player`, `persistence`, `world`: ship state, the storage seam and the
//!   sector generator seam
//! - `mining`, `actions`: player-initiated work and its validation
//! - `simulation`, `scheduler`: the per-tick update and its timing
//! - `client_manager`, `network`: UDP transport
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::SimConfig;
//! use server::network::Server;
//! use server::persistence::MemoryStore;
//! use server::world::ProceduralWorld;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = SimConfig::from_env()?;
//!     let world = Arc::new(ProceduralWorld::new(config.seed, config.cell_size));
//!     let store = Arc::new(MemoryStore::new());
//!
//!     let mut server = Server::new("127.0.0.1:8080", config, store, world, 32).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod actions;
pub mod archetype;
pub mod behavior;
pub mod broadcast;
pub mod client_manager;
pub mod combat;
pub mod config;
pub mod debuff;
pub mod entity;
pub mod loot;
pub mod mining;
pub mod network;
pub mod persistence;
pub mod player;
pub mod registry;
pub mod scheduler;
pub mod simulation;
pub mod spatial;
pub mod world;
