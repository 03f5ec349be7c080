//! Minimal library usage: render frames for a game and report the rate the
//! encoder would run at.
//!
//! Run with: cargo run --example simple_reel

use anyhow::Result;
use chessreel::{playback_rate, ReelGenerator};
use std::path::Path;

fn main() -> Result<()> {
    let generator = ReelGenerator::new();

    let game = generator.load_game(Path::new("game.pgn"))?;
    println!("Loaded {} positions", game.positions.len());

    let renderer = generator.board_painter(480)?;
    let frames = generator.prepare_frames(
        &renderer,
        &game.positions,
        Path::new("game_frames"),
        false,
        |progress| println!("{}", progress.message),
    )?;

    let rate = playback_rate(frames.len(), 30.0)?;
    println!("{} frames ready, {} fps for a 30 second reel", frames.len(), rate);

    Ok(())
}
