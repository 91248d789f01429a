//! One match: the tile map, the roster of characters, armed bombs, the
//! phase machine, win detection and the outbound state feed.

use async_trait::async_trait;
use log::{debug, info, warn};
use runtime::{Actor, ActorRef, Context, Reply, Runtime};
use shared::{
    default_map, BombListing, GamePhase, LobbyUpdate, PlayerListing, TileGrid, TileKind,
    BOMB_FUSE, EXPLOSION_LINGER, MAP_HEIGHT, MAP_WIDTH, WIN_SCREEN_DELAY,
};
use tokio::sync::mpsc;

use crate::character::CharacterRef;
use crate::error::GameError;

/// A bomb that has been placed but has not gone off yet.
struct ActiveBomb {
    id: u64,
    x: i32,
    y: i32,
    power: i32,
    #[allow(dead_code)]
    owner: CharacterRef,
}

pub struct GameLobby {
    phase: GamePhase,
    map: TileGrid,
    roster: Vec<CharacterRef>,
    bombs: Vec<ActiveBomb>,
    next_bomb_id: u64,
    winner: Option<PlayerListing>,
    subscribers: Vec<mpsc::UnboundedSender<LobbyUpdate>>,
}

pub enum LobbyOp {
    StartGame { reply: Reply<Result<(), GameError>> },
    PlayAgain { reply: Reply<Result<(), GameError>> },
    GetPhase { reply: Reply<GamePhase> },
    AddPlayer { character: CharacterRef, reply: Reply<Result<(), GameError>> },
    RemovePlayer { character: CharacterRef, reply: Reply<Result<(), GameError>> },
    GetPlayers { reply: Reply<Result<Vec<PlayerListing>, GameError>> },
    SetTile { x: i32, y: i32, kind: TileKind, reply: Reply<Result<(), GameError>> },
    GetTile { x: i32, y: i32, reply: Reply<Result<TileKind, GameError>> },
    GetMap { reply: Reply<TileGrid> },
    ExplodeTile { x: i32, y: i32, reply: Reply<Result<bool, GameError>> },
    ExplodeFromTile { x: i32, y: i32, power: i32, reply: Reply<Result<(), GameError>> },
    DropBomb { character: CharacterRef, reply: Reply<()> },
    GetBombs { reply: Reply<Vec<BombListing>> },
    CheckWinner { reply: Reply<Result<(), GameError>> },
    GetWinner { reply: Reply<Option<PlayerListing>> },
    Subscribe { reply: Reply<mpsc::UnboundedReceiver<LobbyUpdate>> },
    // Timer-delivered ops.
    FuseElapsed { bomb_id: u64 },
    ClearExplosion { x: i32, y: i32 },
    FinishGame,
}

#[async_trait]
impl Actor for GameLobby {
    const KIND: &'static str = "lobby";
    type Op = LobbyOp;

    fn activate(_ctx: &mut Context<Self>) -> Self {
        GameLobby {
            phase: GamePhase::Waiting,
            map: TileGrid::new(),
            roster: Vec::new(),
            bombs: Vec::new(),
            next_bomb_id: 0,
            winner: None,
            subscribers: Vec::new(),
        }
    }

    async fn handle(&mut self, op: LobbyOp, ctx: &mut Context<Self>) {
        match op {
            LobbyOp::StartGame { reply } => {
                let _ = reply.send(self.start_game(ctx).await);
            }
            LobbyOp::PlayAgain { reply } => {
                let _ = reply.send(self.play_again(ctx).await);
            }
            LobbyOp::GetPhase { reply } => {
                let _ = reply.send(self.phase);
            }
            LobbyOp::AddPlayer { character, reply } => {
                let _ = reply.send(self.add_player(character, ctx).await);
            }
            LobbyOp::RemovePlayer { character, reply } => {
                let _ = reply.send(self.remove_player(character, ctx).await);
            }
            LobbyOp::GetPlayers { reply } => {
                let _ = reply.send(self.player_listings().await);
            }
            LobbyOp::SetTile { x, y, kind, reply } => {
                let _ = reply.send(self.set_tile(x, y, kind));
            }
            LobbyOp::GetTile { x, y, reply } => {
                let _ = reply.send(self.tile(x, y));
            }
            LobbyOp::GetMap { reply } => {
                let _ = reply.send(self.map.clone());
            }
            LobbyOp::ExplodeTile { x, y, reply } => {
                let _ = reply.send(self.explode_tile(x, y, ctx).await);
            }
            LobbyOp::ExplodeFromTile { x, y, power, reply } => {
                let _ = reply.send(self.explode_from_tile(x, y, power, ctx).await);
            }
            LobbyOp::DropBomb { character, reply } => {
                self.drop_bomb(character, ctx).await;
                let _ = reply.send(());
            }
            LobbyOp::GetBombs { reply } => {
                let bombs = self
                    .bombs
                    .iter()
                    .map(|bomb| BombListing { x: bomb.x, y: bomb.y })
                    .collect();
                let _ = reply.send(bombs);
            }
            LobbyOp::CheckWinner { reply } => {
                let _ = reply.send(self.check_winner(ctx).await);
            }
            LobbyOp::GetWinner { reply } => {
                let _ = reply.send(self.winner.clone());
            }
            LobbyOp::Subscribe { reply } => {
                let (feed, updates) = mpsc::unbounded_channel();
                self.subscribers.push(feed);
                let _ = reply.send(updates);
            }
            LobbyOp::FuseElapsed { bomb_id } => {
                self.fuse_elapsed(bomb_id, ctx).await;
            }
            LobbyOp::ClearExplosion { x, y } => {
                // The map may have been torn down by a reset in the meantime.
                if self.set_tile(x, y, TileKind::Clear).is_err() {
                    debug!("lobby `{}`: stale explosion clear at ({}, {})", ctx.key(), x, y);
                }
            }
            LobbyOp::FinishGame => {
                self.phase = GamePhase::CompletionScreen;
                info!("lobby `{}`: round complete", ctx.key());
                self.publish(ctx).await;
            }
        }
    }
}

/// True iff the tile coordinate lies inside the fixed map bounds.
pub fn is_in_map(x: i32, y: i32) -> bool {
    x >= 0 && x < MAP_WIDTH && y >= 0 && y < MAP_HEIGHT
}

/// Up to four spawn positions, assigned to characters in join order.
fn spawn_corners() -> [(f64, f64); 4] {
    let right = MAP_WIDTH as f64 - 0.9;
    let bottom = MAP_HEIGHT as f64 - 0.9;
    [(0.1, 0.1), (right, 0.1), (0.1, bottom), (right, bottom)]
}

impl GameLobby {
    async fn start_game(&mut self, ctx: &mut Context<Self>) -> Result<(), GameError> {
        if self.phase != GamePhase::Waiting {
            return Err(GameError::NotWaiting);
        }

        self.map = default_map();
        for (character, (x, y)) in self.roster.iter().zip(spawn_corners()) {
            character.set_position(x, y).await;
        }

        self.phase = GamePhase::InProgress;
        info!(
            "lobby `{}`: game started with {} players",
            ctx.key(),
            self.roster.len()
        );
        self.publish(ctx).await;
        Ok(())
    }

    async fn play_again(&mut self, ctx: &mut Context<Self>) -> Result<(), GameError> {
        if self.phase != GamePhase::CompletionScreen {
            return Err(GameError::NotFinished);
        }

        for character in &self.roster {
            character.reset_stats().await;
        }
        self.map = TileGrid::new();
        self.phase = GamePhase::Waiting;
        self.winner = None;
        self.bombs.clear();
        info!("lobby `{}`: back to waiting", ctx.key());
        self.publish(ctx).await;
        Ok(())
    }

    /// Appends a character to the roster. The character records its side of
    /// the link in `AddToLobby` before the caller invokes this.
    async fn add_player(
        &mut self,
        character: CharacterRef,
        ctx: &mut Context<Self>,
    ) -> Result<(), GameError> {
        if self.phase != GamePhase::Waiting {
            return Err(GameError::NotWaiting);
        }

        info!("lobby `{}`: character `{}` joined", ctx.key(), character.id());
        self.roster.push(character);
        ctx.cancel_deactivation();
        self.publish(ctx).await;
        Ok(())
    }

    async fn remove_player(
        &mut self,
        character: CharacterRef,
        ctx: &mut Context<Self>,
    ) -> Result<(), GameError> {
        let index = self
            .roster
            .iter()
            .position(|member| member.id() == character.id())
            .ok_or(GameError::UnknownCharacter)?;
        self.roster.remove(index);
        character.remove_lobby().await;

        info!("lobby `{}`: character `{}` left", ctx.key(), character.id());
        if self.roster.is_empty() {
            ctx.deactivate_when_idle();
        }
        self.publish(ctx).await;
        Ok(())
    }

    async fn player_listings(&self) -> Result<Vec<PlayerListing>, GameError> {
        let mut players = Vec::with_capacity(self.roster.len());
        for character in &self.roster {
            let player = character.player().await?;
            let name = player.name().await;
            let color = character.color().await;
            let health = character.health().await;
            let (x, y) = character.position().await;
            let wins = character.wins().await;
            players.push(PlayerListing {
                character_id: character.id().to_string(),
                name,
                color,
                is_alive: health > 0,
                health,
                x,
                y,
                wins,
            });
        }
        Ok(players)
    }

    /// Pushes a fresh snapshot to every live subscriber and prunes the gone
    /// ones. A subscriber that stopped reading never blocks the rest.
    async fn publish(&mut self, ctx: &Context<Self>) {
        match self.player_listings().await {
            Ok(players) => {
                let update = LobbyUpdate {
                    phase: self.phase,
                    players,
                };
                self.subscribers.retain(|feed| feed.send(update.clone()).is_ok());
            }
            Err(e) => warn!("lobby `{}`: state update skipped: {}", ctx.key(), e),
        }
    }

    fn tile(&self, x: i32, y: i32) -> Result<TileKind, GameError> {
        self.map
            .get(x as usize)
            .and_then(|column| column.get(y as usize))
            .copied()
            .ok_or(GameError::OutOfBounds(x, y))
    }

    fn set_tile(&mut self, x: i32, y: i32, kind: TileKind) -> Result<(), GameError> {
        match self
            .map
            .get_mut(x as usize)
            .and_then(|column| column.get_mut(y as usize))
        {
            Some(tile) => {
                *tile = kind;
                Ok(())
            }
            None => Err(GameError::OutOfBounds(x, y)),
        }
    }

    /// Detonates a single tile. Returns whether the blast may continue past
    /// it: walls crumble but still absorb the blast, unbreakable tiles
    /// absorb it untouched.
    async fn explode_tile(
        &mut self,
        x: i32,
        y: i32,
        ctx: &mut Context<Self>,
    ) -> Result<bool, GameError> {
        let tile = self.tile(x, y)?;
        if tile == TileKind::Wall {
            self.set_tile(x, y, TileKind::Clear)?;
        }

        if tile != TileKind::Unbreakable {
            self.set_tile(x, y, TileKind::Explosion)?;
            ctx.schedule_timer(EXPLOSION_LINGER, EXPLOSION_LINGER, false, move || {
                LobbyOp::ClearExplosion { x, y }
            });
        }

        for character in &self.roster {
            let (px, py) = character.position().await;
            let left = px.floor() as i32;
            let top = py.floor() as i32;
            // +0.8 catches both corners of the hitbox.
            let right = (px + 0.8).floor() as i32;
            let bottom = (py + 0.8).floor() as i32;

            if (x == left || x == right) && (y == top || y == bottom) {
                let health = character.health().await;
                character.set_health(health - 1).await;
            }
        }

        self.check_winner(ctx).await?;

        Ok(tile == TileKind::Clear)
    }

    /// Detonates the origin tile, then walks each cardinal direction
    /// independently up to `power` steps, stopping a direction at the map
    /// edge or at the first tile that absorbs the blast.
    async fn explode_from_tile(
        &mut self,
        x: i32,
        y: i32,
        power: i32,
        ctx: &mut Context<Self>,
    ) -> Result<(), GameError> {
        self.explode_tile(x, y, ctx).await?;

        let mut north = true;
        let mut south = true;
        let mut east = true;
        let mut west = true;

        for step in 1..=power {
            if north && is_in_map(x, y - step) {
                north = self.explode_tile(x, y - step, ctx).await?;
            }
            if south && is_in_map(x, y + step) {
                south = self.explode_tile(x, y + step, ctx).await?;
            }
            if east && is_in_map(x + step, y) {
                east = self.explode_tile(x + step, y, ctx).await?;
            }
            if west && is_in_map(x - step, y) {
                west = self.explode_tile(x - step, y, ctx).await?;
            }
        }
        Ok(())
    }

    /// Places a bomb at the character's tile if the game is running and the
    /// character's cooldown has elapsed. Silently does nothing otherwise.
    async fn drop_bomb(&mut self, character: CharacterRef, ctx: &mut Context<Self>) {
        if self.phase != GamePhase::InProgress {
            return;
        }
        if !character.can_drop_bomb().await {
            return;
        }

        let power = character.power().await;
        let (x, y) = character.tile_position().await;
        if let Err(e) = character.set_bomb_cooldown().await {
            warn!("lobby `{}`: bomb refused: {}", ctx.key(), e);
            return;
        }

        let id = self.next_bomb_id;
        self.next_bomb_id += 1;
        self.bombs.push(ActiveBomb {
            id,
            x,
            y,
            power,
            owner: character,
        });
        debug!("lobby `{}`: bomb {} armed at ({}, {})", ctx.key(), id, x, y);
        ctx.schedule_timer(BOMB_FUSE, BOMB_FUSE, false, move || LobbyOp::FuseElapsed {
            bomb_id: id,
        });
    }

    async fn fuse_elapsed(&mut self, bomb_id: u64, ctx: &mut Context<Self>) {
        // The record may already be gone; a spent fuse then fizzles.
        let (x, y, power) = match self.bombs.iter().find(|bomb| bomb.id == bomb_id) {
            Some(bomb) => (bomb.x, bomb.y, bomb.power),
            None => return,
        };

        if let Err(e) = self.explode_from_tile(x, y, power, ctx).await {
            warn!("lobby `{}`: bomb {} detonation failed: {}", ctx.key(), bomb_id, e);
        }
        self.bombs.retain(|bomb| bomb.id != bomb_id);
    }

    /// Records the winner once a single character is left standing and
    /// schedules the switch to the completion screen. Does nothing while
    /// more than one character is alive — and nothing when none is: a
    /// no-survivor round stays unresolved.
    async fn check_winner(&mut self, ctx: &mut Context<Self>) -> Result<(), GameError> {
        if self.phase != GamePhase::InProgress || self.winner.is_some() {
            return Ok(());
        }

        let mut living = 0;
        let mut survivor = None;
        for character in &self.roster {
            if character.health().await > 0 {
                living += 1;
                survivor = Some(character.clone());
            }
        }
        let survivor = match (living, survivor) {
            (1, Some(survivor)) => survivor,
            _ => return Ok(()),
        };

        survivor.add_win().await;
        let player = survivor.player().await?;
        let name = player.name().await;
        let color = survivor.color().await;
        let health = survivor.health().await;
        let wins = survivor.wins().await;

        info!("lobby `{}`: `{}` won the round", ctx.key(), name);
        // Position is no longer meaningful once the round is decided.
        self.winner = Some(PlayerListing {
            character_id: survivor.id().to_string(),
            name,
            color,
            is_alive: true,
            health,
            x: 0.0,
            y: 0.0,
            wins,
        });
        ctx.schedule_timer(WIN_SCREEN_DELAY, WIN_SCREEN_DELAY, false, || {
            LobbyOp::FinishGame
        });
        Ok(())
    }
}

/// Location-transparent handle to a lobby, keyed by join code.
#[derive(Clone)]
pub struct LobbyRef {
    actor: ActorRef<GameLobby>,
}

impl LobbyRef {
    pub fn new(runtime: &Runtime, join_code: &str) -> Self {
        LobbyRef {
            actor: runtime.resolve(join_code),
        }
    }

    pub fn join_code(&self) -> &str {
        self.actor.key()
    }

    pub async fn start_game(&self) -> Result<(), GameError> {
        self.actor.call(|reply| LobbyOp::StartGame { reply }).await
    }

    pub async fn play_again(&self) -> Result<(), GameError> {
        self.actor.call(|reply| LobbyOp::PlayAgain { reply }).await
    }

    pub async fn phase(&self) -> GamePhase {
        self.actor.call(|reply| LobbyOp::GetPhase { reply }).await
    }

    pub async fn add_player(&self, character: &CharacterRef) -> Result<(), GameError> {
        self.actor
            .call(|reply| LobbyOp::AddPlayer { character: character.clone(), reply })
            .await
    }

    pub async fn remove_player(&self, character: &CharacterRef) -> Result<(), GameError> {
        self.actor
            .call(|reply| LobbyOp::RemovePlayer { character: character.clone(), reply })
            .await
    }

    pub async fn players(&self) -> Result<Vec<PlayerListing>, GameError> {
        self.actor.call(|reply| LobbyOp::GetPlayers { reply }).await
    }

    pub async fn set_tile(&self, x: i32, y: i32, kind: TileKind) -> Result<(), GameError> {
        self.actor
            .call(|reply| LobbyOp::SetTile { x, y, kind, reply })
            .await
    }

    pub async fn get_tile(&self, x: i32, y: i32) -> Result<TileKind, GameError> {
        self.actor.call(|reply| LobbyOp::GetTile { x, y, reply }).await
    }

    pub async fn map(&self) -> TileGrid {
        self.actor.call(|reply| LobbyOp::GetMap { reply }).await
    }

    pub async fn explode_tile(&self, x: i32, y: i32) -> Result<bool, GameError> {
        self.actor
            .call(|reply| LobbyOp::ExplodeTile { x, y, reply })
            .await
    }

    pub async fn explode_from_tile(&self, x: i32, y: i32, power: i32) -> Result<(), GameError> {
        self.actor
            .call(|reply| LobbyOp::ExplodeFromTile { x, y, power, reply })
            .await
    }

    pub async fn drop_bomb(&self, character: &CharacterRef) {
        self.actor
            .call(|reply| LobbyOp::DropBomb { character: character.clone(), reply })
            .await
    }

    pub async fn bombs(&self) -> Vec<BombListing> {
        self.actor.call(|reply| LobbyOp::GetBombs { reply }).await
    }

    pub async fn check_winner(&self) -> Result<(), GameError> {
        self.actor.call(|reply| LobbyOp::CheckWinner { reply }).await
    }

    pub async fn winner(&self) -> Option<PlayerListing> {
        self.actor.call(|reply| LobbyOp::GetWinner { reply }).await
    }

    /// Opens a subscription on the lobby's state feed. Dropping the receiver
    /// tears the subscription down on the next publish.
    pub async fn subscribe(&self) -> mpsc::UnboundedReceiver<LobbyUpdate> {
        self.actor.call(|reply| LobbyOp::Subscribe { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::PlayerRef;
    use assert_approx_eq::assert_approx_eq;
    use shared::{BOMB_COOLDOWN, STARTING_HEALTH, STARTING_POWER};
    use std::time::Duration;
    use tokio::time::sleep;

    /// Builds a waiting lobby with `count` seated characters, each owned by
    /// its own player identity.
    async fn lobby_with_characters(count: usize) -> (Runtime, LobbyRef, Vec<CharacterRef>) {
        let runtime = Runtime::with_seed(42);
        let lobby = LobbyRef::new(&runtime, "test-room");
        let mut characters = Vec::new();
        for index in 0..count {
            let player = PlayerRef::new(&runtime, &format!("token-{}", index));
            player.set_name(&format!("player-{}", index)).await;
            let character = CharacterRef::new(&runtime, &format!("character-{}", index));
            player.set_character(Some(character.clone())).await;
            character.add_to_lobby(&lobby).await.unwrap();
            lobby.add_player(&character).await.unwrap();
            characters.push(character);
        }
        (runtime, lobby, characters)
    }

    /// Rewrites the whole map to `Clear` so blast-shape tests start from a
    /// known board.
    async fn clear_map(lobby: &LobbyRef) {
        for x in 0..MAP_WIDTH {
            for y in 0..MAP_HEIGHT {
                lobby.set_tile(x, y, TileKind::Clear).await.unwrap();
            }
        }
    }

    #[test]
    fn test_is_in_map_bounds() {
        assert!(is_in_map(0, 0));
        assert!(is_in_map(4, 4));
        assert!(!is_in_map(-1, 0));
        assert!(!is_in_map(0, -1));
        assert!(!is_in_map(5, 0));
        assert!(!is_in_map(0, 5));
    }

    #[tokio::test]
    async fn test_players_listed_in_join_order() {
        let (_runtime, lobby, characters) = lobby_with_characters(3).await;

        assert_eq!(lobby.join_code(), "test-room");
        let players = lobby.players().await.unwrap();
        assert_eq!(players.len(), 3);
        for (listing, character) in players.iter().zip(&characters) {
            assert_eq!(listing.character_id, character.id());
        }
    }

    #[tokio::test]
    async fn test_start_game_assigns_spawn_corners_in_join_order() {
        let (_runtime, lobby, characters) = lobby_with_characters(4).await;

        lobby.start_game().await.unwrap();
        assert_eq!(lobby.phase().await, GamePhase::InProgress);

        let expected = [(0.1, 0.1), (4.1, 0.1), (0.1, 4.1), (4.1, 4.1)];
        for (character, (x, y)) in characters.iter().zip(expected) {
            let (px, py) = character.position().await;
            assert_approx_eq!(px, x, 1e-9);
            assert_approx_eq!(py, y, 1e-9);
        }
    }

    #[tokio::test]
    async fn test_start_game_requires_waiting() {
        let (_runtime, lobby, _characters) = lobby_with_characters(2).await;

        lobby.start_game().await.unwrap();
        assert_eq!(lobby.start_game().await, Err(GameError::NotWaiting));
        assert_eq!(lobby.phase().await, GamePhase::InProgress);
    }

    #[tokio::test]
    async fn test_add_player_rejected_after_start() {
        let (runtime, lobby, _characters) = lobby_with_characters(2).await;
        lobby.start_game().await.unwrap();

        let late = CharacterRef::new(&runtime, "latecomer");
        assert_eq!(lobby.add_player(&late).await, Err(GameError::NotWaiting));
        assert_eq!(lobby.players().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_remove_unknown_character_fails() {
        let (runtime, lobby, _characters) = lobby_with_characters(1).await;

        let stranger = CharacterRef::new(&runtime, "stranger");
        assert_eq!(
            lobby.remove_player(&stranger).await,
            Err(GameError::UnknownCharacter)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_explode_tile_on_wall_crumbles_and_stops_blast() {
        let (_runtime, lobby, _characters) = lobby_with_characters(2).await;
        lobby.start_game().await.unwrap();

        assert_eq!(lobby.get_tile(2, 0).await.unwrap(), TileKind::Wall);
        let continues = lobby.explode_tile(2, 0).await.unwrap();
        assert!(!continues);
        assert_eq!(lobby.get_tile(2, 0).await.unwrap(), TileKind::Explosion);

        sleep(EXPLOSION_LINGER + Duration::from_millis(50)).await;
        assert_eq!(lobby.get_tile(2, 0).await.unwrap(), TileKind::Clear);
    }

    #[tokio::test]
    async fn test_explode_tile_on_unbreakable_is_absorbed() {
        let (_runtime, lobby, _characters) = lobby_with_characters(2).await;
        lobby.start_game().await.unwrap();

        let continues = lobby.explode_tile(1, 1).await.unwrap();
        assert!(!continues);
        assert_eq!(lobby.get_tile(1, 1).await.unwrap(), TileKind::Unbreakable);
    }

    #[tokio::test(start_paused = true)]
    async fn test_explode_tile_on_clear_continues() {
        let (_runtime, lobby, _characters) = lobby_with_characters(2).await;
        lobby.start_game().await.unwrap();

        let continues = lobby.explode_tile(0, 2).await.unwrap();
        assert!(continues);
        assert_eq!(lobby.get_tile(0, 2).await.unwrap(), TileKind::Explosion);

        sleep(EXPLOSION_LINGER + Duration::from_millis(50)).await;
        assert_eq!(lobby.get_tile(0, 2).await.unwrap(), TileKind::Clear);
    }

    #[tokio::test]
    async fn test_blast_walks_each_direction_independently() {
        let (_runtime, lobby, characters) = lobby_with_characters(2).await;
        lobby.start_game().await.unwrap();
        // Park the characters outside the blast zone.
        characters[0].set_position(0.1, 0.1).await;
        characters[1].set_position(0.1, 4.1).await;

        clear_map(&lobby).await;
        lobby.set_tile(2, 1, TileKind::Wall).await.unwrap();

        lobby.explode_from_tile(2, 2, 2).await.unwrap();

        // North hit the wall at (2, 1) and stopped there.
        assert_eq!(lobby.get_tile(2, 1).await.unwrap(), TileKind::Explosion);
        assert_eq!(lobby.get_tile(2, 0).await.unwrap(), TileKind::Clear);
        // The other three directions ran the full two steps.
        for (x, y) in [(2, 2), (2, 3), (2, 4), (3, 2), (4, 2), (1, 2)] {
            assert_eq!(lobby.get_tile(x, y).await.unwrap(), TileKind::Explosion);
        }
        // (0, 2) is west step two.
        assert_eq!(lobby.get_tile(0, 2).await.unwrap(), TileKind::Explosion);
    }

    #[tokio::test]
    async fn test_blast_truncated_by_power() {
        let (_runtime, lobby, characters) = lobby_with_characters(2).await;
        lobby.start_game().await.unwrap();
        characters[0].set_position(0.1, 0.1).await;
        characters[1].set_position(0.1, 4.1).await;

        clear_map(&lobby).await;
        lobby.explode_from_tile(2, 2, 1).await.unwrap();

        assert_eq!(lobby.get_tile(2, 4).await.unwrap(), TileKind::Clear);
        assert_eq!(lobby.get_tile(4, 2).await.unwrap(), TileKind::Clear);
        assert_eq!(lobby.get_tile(2, 3).await.unwrap(), TileKind::Explosion);
    }

    #[tokio::test]
    async fn test_blast_stops_at_map_edge() {
        let (_runtime, lobby, characters) = lobby_with_characters(2).await;
        lobby.start_game().await.unwrap();
        characters[0].set_position(2.1, 2.1).await;
        characters[1].set_position(2.1, 4.1).await;

        clear_map(&lobby).await;
        // A blast from the corner with power beyond the map must not fail.
        lobby.explode_from_tile(0, 0, 3).await.unwrap();

        assert_eq!(lobby.get_tile(0, 0).await.unwrap(), TileKind::Explosion);
        assert_eq!(lobby.get_tile(3, 0).await.unwrap(), TileKind::Explosion);
        assert_eq!(lobby.get_tile(4, 0).await.unwrap(), TileKind::Clear);
    }

    #[tokio::test]
    async fn test_explosion_damages_characters_on_tile() {
        let (_runtime, lobby, characters) = lobby_with_characters(2).await;
        lobby.start_game().await.unwrap();
        clear_map(&lobby).await;

        characters[0].set_position(2.1, 2.1).await;
        characters[1].set_position(0.1, 0.1).await;

        lobby.explode_tile(2, 2).await.unwrap();
        assert_eq!(characters[0].health().await, STARTING_HEALTH - 1);
        assert_eq!(characters[1].health().await, STARTING_HEALTH);
    }

    #[tokio::test]
    async fn test_hitbox_covers_both_corners() {
        let (_runtime, lobby, characters) = lobby_with_characters(2).await;
        lobby.start_game().await.unwrap();
        clear_map(&lobby).await;

        // Straddling the (1, 1)/(2, 2) boundary: floor(1.5) = 1 and
        // floor(2.3) = 2, so all four tiles under the hitbox count.
        characters[0].set_position(1.5, 1.5).await;
        characters[1].set_position(0.1, 4.1).await;

        lobby.explode_tile(2, 2).await.unwrap();
        assert_eq!(characters[0].health().await, STARTING_HEALTH - 1);
        lobby.explode_tile(1, 1).await.unwrap();
        assert_eq!(characters[0].health().await, STARTING_HEALTH - 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_three_hits_kill_and_crown_the_survivor() {
        let (_runtime, lobby, characters) = lobby_with_characters(2).await;
        lobby.start_game().await.unwrap();
        clear_map(&lobby).await;

        characters[0].set_position(2.1, 2.1).await;
        characters[1].set_position(0.1, 4.1).await;

        for expected in [2, 1, 0] {
            lobby.explode_tile(2, 2).await.unwrap();
            assert_eq!(characters[0].health().await, expected);
        }

        let players = lobby.players().await.unwrap();
        assert!(!players[0].is_alive);
        assert!(players[1].is_alive);

        let winner = lobby.winner().await.expect("winner should be recorded");
        assert_eq!(winner.character_id, characters[1].id());
        assert_eq!(winner.name, "player-1");
        assert_eq!(winner.wins, 1);
        assert_eq!(winner.x, 0.0);
        assert_eq!(winner.y, 0.0);

        // Re-running win detection before the delay changes nothing.
        lobby.check_winner().await.unwrap();
        assert_eq!(characters[1].wins().await, 1);
        assert_eq!(lobby.phase().await, GamePhase::InProgress);

        sleep(WIN_SCREEN_DELAY + Duration::from_millis(100)).await;
        assert_eq!(lobby.phase().await, GamePhase::CompletionScreen);
        let winner = lobby.winner().await.expect("winner survives the delay");
        assert_eq!(winner.character_id, characters[1].id());
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_survivor_round_stays_unresolved() {
        let (_runtime, lobby, characters) = lobby_with_characters(2).await;
        lobby.start_game().await.unwrap();
        clear_map(&lobby).await;

        // Both characters share a tile and die to the same blasts.
        characters[0].set_position(2.1, 2.1).await;
        characters[1].set_position(2.1, 2.1).await;
        characters[0].set_health(1).await;
        characters[1].set_health(1).await;

        lobby.explode_tile(2, 2).await.unwrap();

        assert!(lobby.winner().await.is_none());
        sleep(WIN_SCREEN_DELAY + Duration::from_secs(1)).await;
        assert_eq!(lobby.phase().await, GamePhase::InProgress);
        assert!(lobby.winner().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_bomb_requires_running_game_and_cooldown() {
        let (_runtime, lobby, characters) = lobby_with_characters(2).await;

        // Waiting: nothing happens.
        lobby.drop_bomb(&characters[0]).await;
        assert!(lobby.bombs().await.is_empty());

        lobby.start_game().await.unwrap();
        lobby.drop_bomb(&characters[0]).await;
        assert_eq!(lobby.bombs().await.len(), 1);

        // Cooldown blocks an immediate second bomb.
        lobby.drop_bomb(&characters[0]).await;
        assert_eq!(lobby.bombs().await.len(), 1);

        sleep(BOMB_COOLDOWN + Duration::from_millis(100)).await;
        lobby.drop_bomb(&characters[0]).await;
        assert_eq!(lobby.bombs().await.len(), 1);
        // The first bomb has gone off by now; only the second remains.
        let bombs = lobby.bombs().await;
        assert_eq!(bombs[0], BombListing { x: 0, y: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_bomb_detonates_after_fuse() {
        let (_runtime, lobby, characters) = lobby_with_characters(2).await;
        lobby.start_game().await.unwrap();
        clear_map(&lobby).await;

        // Bomber stands next to the victim and retreats before the fuse.
        characters[1].set_position(2.1, 2.1).await;
        characters[0].set_position(2.1, 3.1).await;
        lobby.drop_bomb(&characters[0]).await;
        characters[0].set_position(0.1, 0.1).await;

        sleep(BOMB_FUSE + Duration::from_millis(100)).await;

        assert!(lobby.bombs().await.is_empty());
        assert_eq!(characters[1].health().await, STARTING_HEALTH - 1);
        assert_eq!(characters[0].health().await, STARTING_HEALTH);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_again_resets_round_but_keeps_wins() {
        let (_runtime, lobby, characters) = lobby_with_characters(2).await;
        lobby.start_game().await.unwrap();
        clear_map(&lobby).await;

        characters[0].set_position(2.1, 2.1).await;
        characters[1].set_position(0.1, 4.1).await;
        for _ in 0..3 {
            lobby.explode_tile(2, 2).await.unwrap();
        }
        sleep(WIN_SCREEN_DELAY + Duration::from_millis(100)).await;
        assert_eq!(lobby.phase().await, GamePhase::CompletionScreen);

        lobby.play_again().await.unwrap();

        assert_eq!(lobby.phase().await, GamePhase::Waiting);
        assert!(lobby.winner().await.is_none());
        assert!(lobby.bombs().await.is_empty());
        assert!(lobby.map().await.is_empty());
        for character in &characters {
            assert_eq!(character.health().await, STARTING_HEALTH);
            assert_eq!(character.power().await, STARTING_POWER);
            assert_eq!(character.position().await, (0.0, 0.0));
            assert!(character.can_drop_bomb().await);
        }
        assert_eq!(characters[1].wins().await, 1);
    }

    #[tokio::test]
    async fn test_play_again_requires_completion_screen() {
        let (_runtime, lobby, _characters) = lobby_with_characters(2).await;

        assert_eq!(lobby.play_again().await, Err(GameError::NotFinished));
        lobby.start_game().await.unwrap();
        assert_eq!(lobby.play_again().await, Err(GameError::NotFinished));
    }

    #[tokio::test]
    async fn test_removing_last_character_retires_the_lobby() {
        let (_runtime, lobby, characters) = lobby_with_characters(1).await;
        lobby.start_game().await.unwrap();

        lobby.remove_player(&characters[0]).await.unwrap();
        sleep(Duration::from_millis(20)).await;

        // A fresh activation answers: back to an empty waiting lobby.
        assert_eq!(lobby.phase().await, GamePhase::Waiting);
        assert!(lobby.players().await.unwrap().is_empty());
        assert!(lobby.map().await.is_empty());
    }

    #[tokio::test]
    async fn test_subscribers_receive_roster_and_phase_updates() {
        let (runtime, lobby, characters) = lobby_with_characters(1).await;
        let mut updates = lobby.subscribe().await;

        let player = PlayerRef::new(&runtime, "token-extra");
        let character = CharacterRef::new(&runtime, "character-extra");
        player.set_character(Some(character.clone())).await;
        character.add_to_lobby(&lobby).await.unwrap();
        lobby.add_player(&character).await.unwrap();

        let update = updates.recv().await.unwrap();
        assert_eq!(update.phase, GamePhase::Waiting);
        assert_eq!(update.players.len(), 2);

        lobby.start_game().await.unwrap();
        let update = updates.recv().await.unwrap();
        assert_eq!(update.phase, GamePhase::InProgress);

        // A dropped subscriber must not break later publishes.
        drop(updates);
        lobby.remove_player(&character).await.unwrap();
        assert_eq!(lobby.players().await.unwrap().len(), 1);
        assert_eq!(lobby.players().await.unwrap()[0].character_id, characters[0].id());
    }

    #[tokio::test]
    async fn test_tile_access_out_of_bounds_is_typed() {
        let (_runtime, lobby, _characters) = lobby_with_characters(1).await;
        lobby.start_game().await.unwrap();

        assert_eq!(lobby.get_tile(9, 0).await, Err(GameError::OutOfBounds(9, 0)));
        assert_eq!(
            lobby.set_tile(0, -1, TileKind::Clear).await,
            Err(GameError::OutOfBounds(0, -1))
        );
    }
}
