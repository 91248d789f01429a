//! A connected participant's session identity: display name and the
//! character it currently controls.

use async_trait::async_trait;
use log::info;
use rand::Rng;
use runtime::{Actor, ActorRef, Context, Reply, Runtime};

use crate::character::CharacterRef;
use crate::error::GameError;

pub struct Player {
    name: String,
    character: Option<CharacterRef>,
}

pub enum PlayerOp {
    SetCharacter { character: Option<CharacterRef>, reply: Reply<()> },
    GetCharacter { reply: Reply<Option<CharacterRef>> },
    SetName { name: String, reply: Reply<()> },
    GetName { reply: Reply<String> },
    HandleLeave { reply: Reply<Result<(), GameError>> },
}

#[async_trait]
impl Actor for Player {
    const KIND: &'static str = "player";
    type Op = PlayerOp;

    fn activate(ctx: &mut Context<Self>) -> Self {
        Player {
            name: generated_name(ctx),
            character: None,
        }
    }

    async fn handle(&mut self, op: PlayerOp, ctx: &mut Context<Self>) {
        match op {
            PlayerOp::SetCharacter { character, reply } => {
                self.set_character(character, ctx).await;
                let _ = reply.send(());
            }
            PlayerOp::GetCharacter { reply } => {
                let _ = reply.send(self.character.clone());
            }
            PlayerOp::SetName { name, reply } => {
                self.name = name;
                let _ = reply.send(());
            }
            PlayerOp::GetName { reply } => {
                let _ = reply.send(self.name.clone());
            }
            PlayerOp::HandleLeave { reply } => {
                let _ = reply.send(self.handle_leave(ctx).await);
            }
        }
    }
}

impl Player {
    /// Rebinds the controlled character, detaching the previous one first.
    async fn set_character(&mut self, character: Option<CharacterRef>, ctx: &mut Context<Self>) {
        if let Some(previous) = self.character.take() {
            previous.remove_player().await;
        }
        self.character = character;
        if let Some(current) = &self.character {
            ctx.cancel_deactivation();
            let own_ref = PlayerRef::new(ctx.runtime(), ctx.key());
            current.set_player(&own_ref).await;
        }
    }

    /// Disconnect path: pull the character out of its lobby (if it still has
    /// one), detach it, and let this identity be collected.
    async fn handle_leave(&mut self, ctx: &mut Context<Self>) -> Result<(), GameError> {
        if let Some(character) = self.character.take() {
            if let Ok(lobby) = character.lobby().await {
                lobby.remove_player(&character).await?;
            }
            character.remove_player().await;
            info!("player `{}` left the game", self.name);
        }
        ctx.deactivate_when_idle();
        Ok(())
    }
}

fn generated_name(ctx: &mut Context<Player>) -> String {
    const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let mut name = String::from("New-Player-");
    for _ in 0..7 {
        name.push(ALPHABET[ctx.rng().gen_range(0..ALPHABET.len())] as char);
    }
    name
}

/// Location-transparent handle to a player identity, keyed by session token.
#[derive(Clone)]
pub struct PlayerRef {
    actor: ActorRef<Player>,
}

impl PlayerRef {
    pub fn new(runtime: &Runtime, token: &str) -> Self {
        PlayerRef {
            actor: runtime.resolve(token),
        }
    }

    pub fn token(&self) -> &str {
        self.actor.key()
    }

    pub async fn set_character(&self, character: Option<CharacterRef>) {
        self.actor
            .call(|reply| PlayerOp::SetCharacter { character: character.clone(), reply })
            .await
    }

    pub async fn character(&self) -> Option<CharacterRef> {
        self.actor.call(|reply| PlayerOp::GetCharacter { reply }).await
    }

    pub async fn set_name(&self, name: &str) {
        self.actor
            .call(|reply| PlayerOp::SetName { name: name.to_string(), reply })
            .await
    }

    pub async fn name(&self) -> String {
        self.actor.call(|reply| PlayerOp::GetName { reply }).await
    }

    pub async fn handle_leave(&self) -> Result<(), GameError> {
        self.actor.call(|reply| PlayerOp::HandleLeave { reply }).await
    }
}
