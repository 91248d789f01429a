//! Types and constants crossing the boundary between the simulation core
//! and whatever transport fronts it: the phase machine, tile kinds, the
//! fixed map template and the snapshot/board structures pushed to clients.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const MAP_WIDTH: i32 = 5;
pub const MAP_HEIGHT: i32 = 5;
pub const MAX_LOBBY_PLAYERS: usize = 4;
pub const STARTING_HEALTH: i32 = 3;
pub const STARTING_POWER: i32 = 1;
pub const BOMB_FUSE: Duration = Duration::from_millis(1500);
pub const BOMB_COOLDOWN: Duration = Duration::from_millis(1500);
pub const EXPLOSION_LINGER: Duration = Duration::from_millis(200);
pub const WIN_SCREEN_DELAY: Duration = Duration::from_secs(4);

/// Palette a character's color is drawn from at creation.
pub const CHARACTER_COLORS: [&str; 14] = [
    "#F44336", "#E91E63", "#9C27B0", "#673AB7", "#3F51B5", "#2196F3", "#03A9F4",
    "#00BCD4", "#009688", "#4CAF50", "#8BC34A", "#FFEB3B", "#FF9800", "#FF5722",
];

/// Where a lobby is in its match cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    Waiting,
    InProgress,
    CompletionScreen,
}

/// One cell of the lobby's grid map. `Explosion` is transient: it marks a
/// blast for a fraction of a second before the tile reverts to `Clear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TileKind {
    Clear,
    Wall,
    Unbreakable,
    Explosion,
}

impl TileKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TileKind::Clear => "Clear",
            TileKind::Wall => "Wall",
            TileKind::Unbreakable => "Unbreakable",
            TileKind::Explosion => "Explosion",
        }
    }
}

/// Tile grid with the outer index being x. Empty until a game is started.
pub type TileGrid = Vec<Vec<TileKind>>;

/// The fixed 5x5 map template every round is played on.
pub fn default_map() -> TileGrid {
    use TileKind::{Clear as C, Unbreakable as U, Wall as W};
    vec![
        vec![C, C, W, C, C],
        vec![C, U, W, U, C],
        vec![W, W, W, W, W],
        vec![C, U, W, U, C],
        vec![C, C, W, C, C],
    ]
}

/// Snapshot of one character as seen by observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerListing {
    pub character_id: String,
    pub name: String,
    pub color: String,
    pub is_alive: bool,
    pub health: i32,
    pub x: f64,
    pub y: f64,
    pub wins: u32,
}

/// Item pushed on a lobby's state feed whenever membership, phase or winner
/// change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LobbyUpdate {
    pub phase: GamePhase,
    pub players: Vec<PlayerListing>,
}

/// An armed bomb's tile, as exposed on the board read path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BombListing {
    pub x: i32,
    pub y: i32,
}

/// Point-in-time view of the live board, sampled at high frequency by the
/// transport layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardView {
    pub winner: Option<PlayerListing>,
    pub map: TileGrid,
    pub bombs: Vec<BombListing>,
    pub players: Vec<PlayerListing>,
}

/// Outcome of a join attempt. A full or already-running lobby is an expected
/// negative outcome, not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinResponse {
    pub joined: bool,
    pub reason: Option<String>,
    pub character_id: Option<String>,
    pub join_code: Option<String>,
    pub players: Option<Vec<PlayerListing>>,
    pub max_players: usize,
}

impl JoinResponse {
    pub fn rejected(reason: &str) -> Self {
        JoinResponse {
            joined: false,
            reason: Some(reason.to_string()),
            character_id: None,
            join_code: None,
            players: None,
            max_players: MAX_LOBBY_PLAYERS,
        }
    }
}
