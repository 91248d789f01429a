use thiserror::Error;

/// Precondition failures surfaced across the simulation boundary. Each
/// leaves the target actor's state untouched; the transport layer maps them
/// to explicit error signals for the client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("game is not waiting for players")]
    NotWaiting,
    #[error("game is not finished")]
    NotFinished,
    #[error("join code must not be blank")]
    BlankJoinCode,
    #[error("character has no lobby")]
    NoLobby,
    #[error("character has no owning player")]
    NoPlayer,
    #[error("player has no character")]
    NoCharacter,
    #[error("character is not in this game")]
    UnknownCharacter,
    #[error("tile ({0}, {1}) is outside the map")]
    OutOfBounds(i32, i32),
}
