//! Transport-facing facade over the simulation: everything a connection
//! handler needs, keyed by session token. Serialization, session state and
//! connection lifecycle stay on the transport's side of this boundary.

use log::info;
use runtime::Runtime;
use shared::{BoardView, GamePhase, JoinResponse, LobbyUpdate, MAX_LOBBY_PLAYERS};
use tokio::sync::mpsc;

use crate::character::CharacterRef;
use crate::error::GameError;
use crate::lobby::LobbyRef;
use crate::player::PlayerRef;

const SESSION_TOKEN_LEN: usize = 64;
const CHARACTER_ID_LEN: usize = 32;

/// Result of registering a session.
#[derive(Debug, Clone)]
pub struct RegisteredPlayer {
    pub token: String,
    pub name: String,
}

pub struct Gateway {
    runtime: Runtime,
}

impl Gateway {
    pub fn new(runtime: Runtime) -> Self {
        Gateway { runtime }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Creates a player identity for a new session and applies an optional
    /// rename. Blank names keep the generated default.
    pub async fn register_player(&self, name: Option<&str>) -> RegisteredPlayer {
        let token = self.runtime.generate_key(SESSION_TOKEN_LEN);
        let player = PlayerRef::new(&self.runtime, &token);

        if let Some(name) = name {
            let trimmed = name.trim();
            if !trimmed.is_empty() {
                player.set_name(trimmed).await;
            }
        }

        let name = player.name().await;
        info!("registered player `{}`", name);
        RegisteredPlayer { token, name }
    }

    /// Seats the session's player in the lobby behind `join_code`. A full or
    /// already-running lobby is a structured rejection, not an error.
    pub async fn join_lobby(
        &self,
        token: &str,
        join_code: &str,
    ) -> Result<JoinResponse, GameError> {
        if join_code.trim().is_empty() {
            return Err(GameError::BlankJoinCode);
        }

        let player = PlayerRef::new(&self.runtime, token);
        let lobby = LobbyRef::new(&self.runtime, join_code);

        if lobby.phase().await != GamePhase::Waiting {
            return Ok(JoinResponse::rejected("Game is not waiting for players."));
        }
        if lobby.players().await?.len() >= MAX_LOBBY_PLAYERS {
            return Ok(JoinResponse::rejected("Game is full."));
        }

        let character =
            CharacterRef::new(&self.runtime, &self.runtime.generate_key(CHARACTER_ID_LEN));
        player.set_character(Some(character.clone())).await;
        character.add_to_lobby(&lobby).await?;
        lobby.add_player(&character).await?;

        let players = lobby.players().await?;
        Ok(JoinResponse {
            joined: true,
            reason: None,
            character_id: Some(character.id().to_string()),
            join_code: Some(join_code.to_string()),
            players: Some(players),
            max_players: MAX_LOBBY_PLAYERS,
        })
    }

    pub async fn start_game(&self, token: &str) -> Result<(), GameError> {
        let (_, _, lobby) = self.resolve_chain(token).await?;
        lobby.start_game().await
    }

    pub async fn drop_bomb(&self, token: &str) -> Result<(), GameError> {
        let (_, character, lobby) = self.resolve_chain(token).await?;
        lobby.drop_bomb(&character).await;
        Ok(())
    }

    pub async fn play_again(&self, token: &str) -> Result<(), GameError> {
        let (_, _, lobby) = self.resolve_chain(token).await?;
        lobby.play_again().await
    }

    pub async fn set_position(&self, token: &str, x: f64, y: f64) -> Result<(), GameError> {
        let (_, character, _lobby) = self.resolve_chain(token).await?;
        character.set_position(x, y).await;
        Ok(())
    }

    /// Opens a subscription on the session's lobby feed. The transport is
    /// expected to drop the receiver when the session ends.
    pub async fn subscribe_lobby_state(
        &self,
        token: &str,
    ) -> Result<mpsc::UnboundedReceiver<LobbyUpdate>, GameError> {
        let (_, _, lobby) = self.resolve_chain(token).await?;
        Ok(lobby.subscribe().await)
    }

    /// Point-in-time read of the live board, meant to be sampled at high
    /// frequency for rendering.
    pub async fn poll_board(&self, token: &str) -> Result<BoardView, GameError> {
        let (_, _, lobby) = self.resolve_chain(token).await?;

        let map = lobby.map().await;
        let bombs = lobby.bombs().await;
        let players = lobby.players().await?;
        let winner = lobby.winner().await;

        Ok(BoardView {
            winner,
            map,
            bombs,
            players,
        })
    }

    /// Disconnect hook: must be called when a session ends.
    pub async fn handle_leave(&self, token: &str) -> Result<(), GameError> {
        PlayerRef::new(&self.runtime, token).handle_leave().await
    }

    /// Follows token -> player -> character -> lobby, failing with the typed
    /// missing-link error at the first unset hop.
    async fn resolve_chain(
        &self,
        token: &str,
    ) -> Result<(PlayerRef, CharacterRef, LobbyRef), GameError> {
        let player = PlayerRef::new(&self.runtime, token);
        let character = player.character().await.ok_or(GameError::NoCharacter)?;
        let lobby = character.lobby().await?;
        Ok((player, character, lobby))
    }
}
