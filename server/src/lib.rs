//! # Bomber Arena Simulation Core
//!
//! Server-side simulation for a real-time multi-player arena game: players
//! join a shared lobby, a deterministic turn loop tracks positions, bombs
//! and explosions across a tile grid, and every participant receives
//! low-latency state updates.
//!
//! The crate builds three kinds of entities on the `runtime` crate's
//! virtual-actor substrate, so concurrent player actions against the same
//! lobby are serialized without explicit locks:
//!
//! - [`Player`](player::Player) — a session's identity: display name plus
//!   the character it currently controls.
//! - [`PlayerCharacter`](character::PlayerCharacter) — the in-game avatar:
//!   health, position, bomb power, cooldown and win count.
//! - [`GameLobby`](lobby::GameLobby) — one match: the tile map, the roster,
//!   armed bombs, the Waiting → InProgress → CompletionScreen phase machine,
//!   win detection and the outbound state feed.
//!
//! Bomb fuses, explosion clearing and the win-screen delay are activation
//! timers; their callbacks run on the owning actor's mailbox, serialized
//! with everything else, and re-check their target before acting so a stale
//! firing is harmless.
//!
//! The [`Gateway`](gateway::Gateway) is the boundary handed to the transport
//! layer: register/join/start/bomb/position/leave entry points keyed by
//! session token, a per-lobby subscription feed for state snapshots, and a
//! point-in-time board read for high-frequency rendering. Everything
//! network-facing (connections, marshalling, polling cadence) lives outside
//! this crate.

pub mod character;
pub mod error;
pub mod gateway;
pub mod lobby;
pub mod player;

pub use character::{CharacterOp, CharacterRef, PlayerCharacter};
pub use error::GameError;
pub use gateway::{Gateway, RegisteredPlayer};
pub use lobby::{GameLobby, LobbyOp, LobbyRef};
pub use player::{Player, PlayerOp, PlayerRef};
