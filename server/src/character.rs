//! The in-game avatar: health, position, bomb power, cooldown and the links
//! tying it to its owning player and current lobby.

use async_trait::async_trait;
use rand::Rng;
use runtime::{Actor, ActorRef, Context, Reply, Runtime};
use shared::{GamePhase, BOMB_COOLDOWN, CHARACTER_COLORS, STARTING_HEALTH, STARTING_POWER};
use tokio::time::Instant;

use crate::error::GameError;
use crate::lobby::LobbyRef;
use crate::player::PlayerRef;

pub struct PlayerCharacter {
    lobby: Option<LobbyRef>,
    player: Option<PlayerRef>,
    health: i32,
    color: String,
    x: f64,
    y: f64,
    power: i32,
    bomb_cooldown_until: Option<Instant>,
    wins: u32,
}

pub enum CharacterOp {
    ResetStats { reply: Reply<()> },
    AddToLobby { lobby: LobbyRef, reply: Reply<Result<(), GameError>> },
    RemoveLobby { reply: Reply<()> },
    GetLobby { reply: Reply<Result<LobbyRef, GameError>> },
    SetPlayer { player: PlayerRef, reply: Reply<()> },
    RemovePlayer { reply: Reply<()> },
    GetPlayer { reply: Reply<Result<PlayerRef, GameError>> },
    SetHealth { health: i32, reply: Reply<()> },
    GetHealth { reply: Reply<i32> },
    SetColor { color: String, reply: Reply<()> },
    GetColor { reply: Reply<String> },
    SetPosition { x: f64, y: f64, reply: Reply<()> },
    GetPosition { reply: Reply<(f64, f64)> },
    GetTilePosition { reply: Reply<(i32, i32)> },
    IncreasePower { reply: Reply<()> },
    GetPower { reply: Reply<i32> },
    SetBombCooldown { reply: Reply<Result<(), GameError>> },
    CanDropBomb { reply: Reply<bool> },
    AddWin { reply: Reply<()> },
    GetWins { reply: Reply<u32> },
}

#[async_trait]
impl Actor for PlayerCharacter {
    const KIND: &'static str = "character";
    type Op = CharacterOp;

    fn activate(ctx: &mut Context<Self>) -> Self {
        let color = CHARACTER_COLORS[ctx.rng().gen_range(0..CHARACTER_COLORS.len())];
        PlayerCharacter {
            lobby: None,
            player: None,
            health: STARTING_HEALTH,
            color: color.to_string(),
            x: 0.0,
            y: 0.0,
            power: STARTING_POWER,
            bomb_cooldown_until: None,
            wins: 0,
        }
    }

    async fn handle(&mut self, op: CharacterOp, ctx: &mut Context<Self>) {
        match op {
            CharacterOp::ResetStats { reply } => {
                self.power = STARTING_POWER;
                self.bomb_cooldown_until = None;
                self.health = STARTING_HEALTH;
                self.x = 0.0;
                self.y = 0.0;
                let _ = reply.send(());
            }
            CharacterOp::AddToLobby { lobby, reply } => {
                let outcome = self.add_to_lobby(lobby).await;
                if outcome.is_ok() {
                    ctx.cancel_deactivation();
                }
                let _ = reply.send(outcome);
            }
            CharacterOp::RemoveLobby { reply } => {
                self.lobby = None;
                self.retire_if_detached(ctx);
                let _ = reply.send(());
            }
            CharacterOp::GetLobby { reply } => {
                let _ = reply.send(self.lobby.clone().ok_or(GameError::NoLobby));
            }
            CharacterOp::SetPlayer { player, reply } => {
                self.player = Some(player);
                ctx.cancel_deactivation();
                let _ = reply.send(());
            }
            CharacterOp::RemovePlayer { reply } => {
                self.player = None;
                self.retire_if_detached(ctx);
                let _ = reply.send(());
            }
            CharacterOp::GetPlayer { reply } => {
                let _ = reply.send(self.player.clone().ok_or(GameError::NoPlayer));
            }
            CharacterOp::SetHealth { health, reply } => {
                self.health = health;
                let _ = reply.send(());
            }
            CharacterOp::GetHealth { reply } => {
                let _ = reply.send(self.health);
            }
            CharacterOp::SetColor { color, reply } => {
                self.color = color;
                let _ = reply.send(());
            }
            CharacterOp::GetColor { reply } => {
                let _ = reply.send(self.color.clone());
            }
            CharacterOp::SetPosition { x, y, reply } => {
                self.x = x;
                self.y = y;
                let _ = reply.send(());
            }
            CharacterOp::GetPosition { reply } => {
                let _ = reply.send((self.x, self.y));
            }
            CharacterOp::GetTilePosition { reply } => {
                let _ = reply.send(self.tile_position());
            }
            CharacterOp::IncreasePower { reply } => {
                self.power += 1;
                let _ = reply.send(());
            }
            CharacterOp::GetPower { reply } => {
                let _ = reply.send(self.power);
            }
            CharacterOp::SetBombCooldown { reply } => {
                let _ = reply.send(self.set_bomb_cooldown());
            }
            CharacterOp::CanDropBomb { reply } => {
                let _ = reply.send(self.can_drop_bomb());
            }
            CharacterOp::AddWin { reply } => {
                self.wins += 1;
                let _ = reply.send(());
            }
            CharacterOp::GetWins { reply } => {
                let _ = reply.send(self.wins);
            }
        }
    }
}

impl PlayerCharacter {
    async fn add_to_lobby(&mut self, lobby: LobbyRef) -> Result<(), GameError> {
        if lobby.phase().await != GamePhase::Waiting {
            return Err(GameError::NotWaiting);
        }
        self.lobby = Some(lobby);
        Ok(())
    }

    fn set_bomb_cooldown(&mut self) -> Result<(), GameError> {
        if self.lobby.is_none() {
            return Err(GameError::NoLobby);
        }
        self.bomb_cooldown_until = Some(Instant::now() + BOMB_COOLDOWN);
        Ok(())
    }

    fn can_drop_bomb(&self) -> bool {
        match self.bomb_cooldown_until {
            None => true,
            Some(until) => until <= Instant::now(),
        }
    }

    fn tile_position(&self) -> (i32, i32) {
        // +0.4 centers the lookup on the character's footprint.
        ((self.x + 0.4).floor() as i32, (self.y + 0.4).floor() as i32)
    }

    /// A character with neither an owning player nor a lobby has no way to
    /// be reached again; let the runtime collect it.
    fn retire_if_detached(&self, ctx: &mut Context<Self>) {
        if self.lobby.is_none() && self.player.is_none() {
            ctx.deactivate_when_idle();
        }
    }
}

/// Location-transparent handle to a character.
#[derive(Clone)]
pub struct CharacterRef {
    actor: ActorRef<PlayerCharacter>,
}

impl CharacterRef {
    pub fn new(runtime: &Runtime, id: &str) -> Self {
        CharacterRef {
            actor: runtime.resolve(id),
        }
    }

    pub fn id(&self) -> &str {
        self.actor.key()
    }

    pub async fn reset_stats(&self) {
        self.actor.call(|reply| CharacterOp::ResetStats { reply }).await
    }

    /// Records the lobby reference after checking it is still accepting
    /// players. Does not notify the lobby; the caller coordinates both sides.
    pub async fn add_to_lobby(&self, lobby: &LobbyRef) -> Result<(), GameError> {
        self.actor
            .call(|reply| CharacterOp::AddToLobby { lobby: lobby.clone(), reply })
            .await
    }

    pub async fn remove_lobby(&self) {
        self.actor.call(|reply| CharacterOp::RemoveLobby { reply }).await
    }

    pub async fn lobby(&self) -> Result<LobbyRef, GameError> {
        self.actor.call(|reply| CharacterOp::GetLobby { reply }).await
    }

    pub async fn set_player(&self, player: &PlayerRef) {
        self.actor
            .call(|reply| CharacterOp::SetPlayer { player: player.clone(), reply })
            .await
    }

    pub async fn remove_player(&self) {
        self.actor.call(|reply| CharacterOp::RemovePlayer { reply }).await
    }

    pub async fn player(&self) -> Result<PlayerRef, GameError> {
        self.actor.call(|reply| CharacterOp::GetPlayer { reply }).await
    }

    pub async fn set_health(&self, health: i32) {
        self.actor
            .call(|reply| CharacterOp::SetHealth { health, reply })
            .await
    }

    pub async fn health(&self) -> i32 {
        self.actor.call(|reply| CharacterOp::GetHealth { reply }).await
    }

    pub async fn set_color(&self, color: &str) {
        self.actor
            .call(|reply| CharacterOp::SetColor { color: color.to_string(), reply })
            .await
    }

    pub async fn color(&self) -> String {
        self.actor.call(|reply| CharacterOp::GetColor { reply }).await
    }

    pub async fn set_position(&self, x: f64, y: f64) {
        self.actor
            .call(|reply| CharacterOp::SetPosition { x, y, reply })
            .await
    }

    pub async fn position(&self) -> (f64, f64) {
        self.actor.call(|reply| CharacterOp::GetPosition { reply }).await
    }

    pub async fn tile_position(&self) -> (i32, i32) {
        self.actor.call(|reply| CharacterOp::GetTilePosition { reply }).await
    }

    pub async fn increase_power(&self) {
        self.actor.call(|reply| CharacterOp::IncreasePower { reply }).await
    }

    pub async fn power(&self) -> i32 {
        self.actor.call(|reply| CharacterOp::GetPower { reply }).await
    }

    pub async fn set_bomb_cooldown(&self) -> Result<(), GameError> {
        self.actor.call(|reply| CharacterOp::SetBombCooldown { reply }).await
    }

    pub async fn can_drop_bomb(&self) -> bool {
        self.actor.call(|reply| CharacterOp::CanDropBomb { reply }).await
    }

    pub async fn add_win(&self) {
        self.actor.call(|reply| CharacterOp::AddWin { reply }).await
    }

    pub async fn wins(&self) -> u32 {
        self.actor.call(|reply| CharacterOp::GetWins { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lobby::LobbyRef;
    use std::time::Duration;
    use tokio::time::sleep;

    fn test_runtime() -> Runtime {
        Runtime::with_seed(7)
    }

    #[tokio::test]
    async fn test_fresh_character_defaults() {
        let runtime = test_runtime();
        let character = CharacterRef::new(&runtime, "c1");

        assert_eq!(character.health().await, STARTING_HEALTH);
        assert_eq!(character.power().await, STARTING_POWER);
        assert_eq!(character.position().await, (0.0, 0.0));
        assert_eq!(character.wins().await, 0);
        assert!(character.can_drop_bomb().await);
        assert!(CHARACTER_COLORS.contains(&character.color().await.as_str()));
    }

    #[tokio::test]
    async fn test_tile_position_centers_on_footprint() {
        let runtime = test_runtime();
        let character = CharacterRef::new(&runtime, "c1");

        character.set_position(0.1, 0.1).await;
        assert_eq!(character.tile_position().await, (0, 0));

        character.set_position(0.7, 1.2).await;
        assert_eq!(character.tile_position().await, (1, 1));

        character.set_position(4.1, 3.7).await;
        assert_eq!(character.tile_position().await, (4, 4));
    }

    #[tokio::test]
    async fn test_color_can_be_overridden() {
        let runtime = test_runtime();
        let character = CharacterRef::new(&runtime, "c1");

        character.set_color("#123456").await;
        assert_eq!(character.color().await, "#123456");
    }

    #[tokio::test]
    async fn test_add_to_lobby_requires_waiting_lobby() {
        let runtime = test_runtime();
        let lobby = LobbyRef::new(&runtime, "room");
        let player = PlayerRef::new(&runtime, "p1");
        let seated = CharacterRef::new(&runtime, "c1");
        player.set_character(Some(seated.clone())).await;
        seated.add_to_lobby(&lobby).await.unwrap();
        lobby.add_player(&seated).await.unwrap();
        lobby.start_game().await.unwrap();

        let late = CharacterRef::new(&runtime, "c2");
        assert_eq!(late.add_to_lobby(&lobby).await, Err(GameError::NotWaiting));
        assert_eq!(late.lobby().await.err(), Some(GameError::NoLobby));
    }

    #[tokio::test]
    async fn test_set_bomb_cooldown_requires_lobby() {
        let runtime = test_runtime();
        let character = CharacterRef::new(&runtime, "c1");

        assert_eq!(character.set_bomb_cooldown().await, Err(GameError::NoLobby));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bomb_cooldown_elapses() {
        let runtime = test_runtime();
        let lobby = LobbyRef::new(&runtime, "room");
        let character = CharacterRef::new(&runtime, "c1");
        character.add_to_lobby(&lobby).await.unwrap();

        character.set_bomb_cooldown().await.unwrap();
        assert!(!character.can_drop_bomb().await);

        sleep(BOMB_COOLDOWN + Duration::from_millis(10)).await;
        assert!(character.can_drop_bomb().await);
    }

    #[tokio::test]
    async fn test_reset_stats_preserves_wins() {
        let runtime = test_runtime();
        let character = CharacterRef::new(&runtime, "c1");

        character.add_win().await;
        character.add_win().await;
        character.set_health(1).await;
        character.increase_power().await;
        character.set_position(3.0, 2.0).await;

        character.reset_stats().await;

        assert_eq!(character.health().await, STARTING_HEALTH);
        assert_eq!(character.power().await, STARTING_POWER);
        assert_eq!(character.position().await, (0.0, 0.0));
        assert_eq!(character.wins().await, 2);
    }

    #[tokio::test]
    async fn test_detaching_both_links_retires_the_character() {
        let runtime = test_runtime();
        let lobby = LobbyRef::new(&runtime, "room");
        let player = PlayerRef::new(&runtime, "p1");
        let character = CharacterRef::new(&runtime, "c1");

        player.set_character(Some(character.clone())).await;
        character.add_to_lobby(&lobby).await.unwrap();
        character.set_health(1).await;

        character.remove_lobby().await;
        character.remove_player().await;
        sleep(Duration::from_millis(20)).await;

        // A fresh activation answers with default state.
        assert_eq!(character.health().await, STARTING_HEALTH);
    }
}
