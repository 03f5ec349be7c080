use anyhow::{Context, Result};
use pgn_reader::{RawTag, Reader, SanPlus, Skip, Visitor};
use shakmaty::fen::Fen;
use shakmaty::{Chess, EnPassantMode, Position};
use std::ops::ControlFlow;

use crate::ReelError;

/// One board state reached during the game, together with the half-move that
/// produced it. Frames are rendered from these, one per half-move, in play
/// order; the starting position is not part of the sequence.
#[derive(Debug, Clone)]
pub struct BoardPosition {
    /// 1-based half-move number.
    pub ply: usize,
    /// SAN of the move that led to this position.
    pub san: String,
    position: Chess,
}

impl BoardPosition {
    /// Piece placement for rendering.
    pub fn board(&self) -> &shakmaty::Board {
        self.position.board()
    }

    /// Full FEN of this position (placement, side to move, castling and
    /// en-passant rights, move counters).
    pub fn fen(&self) -> String {
        Fen::from_position(&self.position, EnPassantMode::Legal).to_string()
    }
}

/// Headers worth echoing back to the operator.
#[derive(Debug, Clone, Default)]
pub struct GameSummary {
    pub event: Option<String>,
    pub white: Option<String>,
    pub black: Option<String>,
    pub result: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ParsedGame {
    pub summary: GameSummary,
    pub positions: Vec<BoardPosition>,
}

/// Streaming PGN visitor (pgn-reader). Collects the mainline SAN moves and a
/// handful of summary headers; variations are skipped entirely.
#[derive(Default)]
struct MainlineVisitor {
    moves: Vec<SanPlus>,
    summary: GameSummary,
}

impl Visitor for MainlineVisitor {
    type Tags = ();
    type Movetext = ();
    type Output = ();

    fn begin_tags(&mut self) -> ControlFlow<Self::Output, Self::Tags> {
        ControlFlow::Continue(())
    }

    fn tag(
        &mut self,
        _: &mut Self::Tags,
        key: &[u8],
        value: RawTag<'_>,
    ) -> ControlFlow<Self::Output> {
        let slot = match key {
            b"Event" => &mut self.summary.event,
            b"White" => &mut self.summary.white,
            b"Black" => &mut self.summary.black,
            b"Result" => &mut self.summary.result,
            _ => return ControlFlow::Continue(()),
        };

        // First occurrence wins, as in the rest of the PGN ecosystem.
        if slot.is_none() {
            let bytes = value.as_bytes();
            if !bytes.is_empty() {
                *slot = Some(String::from_utf8_lossy(bytes).into_owned());
            }
        }
        ControlFlow::Continue(())
    }

    fn begin_movetext(&mut self, _: Self::Tags) -> ControlFlow<Self::Output, Self::Movetext> {
        ControlFlow::Continue(())
    }

    fn begin_variation(&mut self, _: &mut Self::Movetext) -> ControlFlow<Self::Output, Skip> {
        ControlFlow::Continue(Skip(true))
    }

    fn san(&mut self, _: &mut Self::Movetext, san: SanPlus) -> ControlFlow<Self::Output> {
        self.moves.push(san);
        ControlFlow::Continue(())
    }

    fn end_game(&mut self, _: Self::Movetext) -> Self::Output {}
}

/// Parse one game's PGN text into the ordered sequence of positions.
///
/// The move list is replayed from the standard starting position; every
/// half-move yields exactly one `BoardPosition`, in play order. A move that
/// cannot be played in its position fails the whole parse with a diagnostic
/// naming the ply and the SAN.
pub fn parse_game(pgn: &str) -> Result<ParsedGame> {
    let mut reader = Reader::new(pgn.as_bytes());
    let mut visitor = MainlineVisitor::default();
    reader.read_game(&mut visitor).context("reading PGN input")?;

    let mut position = Chess::default();
    let mut positions = Vec::with_capacity(visitor.moves.len());
    for (i, san_plus) in visitor.moves.iter().enumerate() {
        let ply = i + 1;
        let m = san_plus.san.to_move(&position).map_err(|_| {
            ReelError::InvalidPgn(format!(
                "move {ply} ({san_plus}) is not playable in its position"
            ))
        })?;
        position.play_unchecked(m);
        positions.push(BoardPosition {
            ply,
            san: san_plus.to_string(),
            position: position.clone(),
        });
    }

    Ok(ParsedGame {
        summary: visitor.summary,
        positions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mainline_into_one_position_per_half_move() {
        let pgn = r#"[Event "Test Game"]
[White "Alice"]
[Black "Bob"]

1. e4 e5 2. Nf3"#;

        let game = parse_game(pgn).unwrap();
        assert_eq!(game.positions.len(), 3);
        assert_eq!(
            game.positions.iter().map(|p| p.san.as_str()).collect::<Vec<_>>(),
            vec!["e4", "e5", "Nf3"]
        );
        assert_eq!(
            game.positions.iter().map(|p| p.ply).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(game.summary.event.as_deref(), Some("Test Game"));
        assert_eq!(game.summary.white.as_deref(), Some("Alice"));
        assert_eq!(game.summary.black.as_deref(), Some("Bob"));
    }

    #[test]
    fn fens_track_the_replayed_positions() {
        let game = parse_game("1. e4 e5").unwrap();

        let first = game.positions[0].fen();
        assert!(first.starts_with("rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR"));
        assert!(first.contains(" b "), "black to move after 1. e4: {first}");
        assert!(game.positions[1].fen().contains(" w "));
    }

    #[test]
    fn unplayable_move_fails_with_ply_and_san() {
        let err = parse_game("1. e4 e5 2. Ke3").unwrap_err();
        let reel = err.downcast_ref::<ReelError>().expect("typed error");
        match reel {
            ReelError::InvalidPgn(msg) => {
                assert!(msg.contains("move 3"), "missing ply: {msg}");
                assert!(msg.contains("Ke3"), "missing san: {msg}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn variations_are_skipped() {
        let game = parse_game("1. e4 (1. d4 d5 2. c4) e5").unwrap();
        assert_eq!(game.positions.len(), 2);
        assert_eq!(game.positions[1].san, "e5");
    }

    #[test]
    fn result_marker_is_not_a_move() {
        let game = parse_game(r#"[Result "1-0"]

1. e4 e5 1-0"#)
        .unwrap();
        assert_eq!(game.positions.len(), 2);
        assert_eq!(game.summary.result.as_deref(), Some("1-0"));
    }

    #[test]
    fn empty_movetext_parses_to_empty_sequence() {
        let game = parse_game(r#"[Event "Empty"]
[Result "*"]

*"#)
        .unwrap();
        assert!(game.positions.is_empty());
    }
}
