//! Scripted demo match: registers a handful of bots through the gateway,
//! plays one round to completion and prints the final board as JSON. Useful
//! for exercising the full simulation without a transport in front of it.

use clap::Parser;
use log::info;
use runtime::Runtime;
use server::Gateway;
use shared::{GamePhase, BOMB_FUSE, MAP_HEIGHT, MAP_WIDTH, MAX_LOBBY_PLAYERS, WIN_SCREEN_DELAY};
use std::time::Duration;
use tokio::time::sleep;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Join code for the demo lobby
    #[clap(short, long, default_value = "demo")]
    join_code: String,
    /// Number of scripted players (2-4)
    #[clap(short, long, default_value = "2")]
    bots: usize,
    /// Master seed for deterministic names, colors and tokens
    #[clap(short, long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();
    let bots = args.bots.clamp(2, MAX_LOBBY_PLAYERS);

    let runtime = match args.seed {
        Some(seed) => Runtime::with_seed(seed),
        None => Runtime::new(),
    };
    let gateway = Gateway::new(runtime);

    // Seat the bots.
    let mut tokens = Vec::new();
    for index in 0..bots {
        let registered = gateway
            .register_player(Some(&format!("Bot-{}", index)))
            .await;
        let response = gateway.join_lobby(&registered.token, &args.join_code).await?;
        if !response.joined {
            return Err(format!(
                "bot {} could not join: {}",
                index,
                response.reason.unwrap_or_default()
            )
            .into());
        }
        tokens.push(registered.token);
    }

    let attacker = tokens[0].clone();
    let attacker_board = gateway.poll_board(&attacker).await?;
    let attacker_id = attacker_board.players[0].character_id.clone();

    // Follow the lobby feed until the round is decided.
    let mut updates = gateway.subscribe_lobby_state(&attacker).await?;
    let feed = tokio::spawn(async move {
        while let Some(update) = updates.recv().await {
            info!(
                "lobby update: {:?} with {} players",
                update.phase,
                update.players.len()
            );
            if update.phase == GamePhase::CompletionScreen {
                break;
            }
        }
    });

    gateway.start_game(&attacker).await?;

    // Bot 0 walks up to each living victim, drops a bomb on their tile and
    // retreats to the far corner before the fuse runs out.
    loop {
        let board = gateway.poll_board(&attacker).await?;
        if board.winner.is_some() {
            break;
        }
        let victim = board
            .players
            .iter()
            .find(|p| p.is_alive && p.character_id != attacker_id)
            .cloned();
        let victim = match victim {
            Some(victim) => victim,
            // Everyone else is already down; a draw ends the script.
            None => break,
        };

        gateway.set_position(&attacker, victim.x, victim.y).await?;
        gateway.drop_bomb(&attacker).await?;
        let (x, y) = retreat_corner(victim.x, victim.y);
        gateway.set_position(&attacker, x, y).await?;

        sleep(BOMB_FUSE + Duration::from_millis(200)).await;
    }

    let board = gateway.poll_board(&attacker).await?;
    match &board.winner {
        Some(winner) => info!("winner: `{}` with {} wins", winner.name, winner.wins),
        None => info!("round ended with no survivor"),
    }

    // Give the completion screen time to land on the feed before exiting.
    let _ = tokio::time::timeout(WIN_SCREEN_DELAY + Duration::from_secs(1), feed).await;

    println!("{}", serde_json::to_string_pretty(&board)?);
    Ok(())
}

/// The corner farthest from the given position, outside any power-1 blast.
fn retreat_corner(x: f64, y: f64) -> (f64, f64) {
    let horizontal = if x < MAP_WIDTH as f64 / 2.0 {
        MAP_WIDTH as f64 - 0.9
    } else {
        0.1
    };
    let vertical = if y < MAP_HEIGHT as f64 / 2.0 {
        MAP_HEIGHT as f64 - 0.9
    } else {
        0.1
    };
    (horizontal, vertical)
}
