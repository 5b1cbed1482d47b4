//! Move application on `GameState`.
//!
//! Moves are validated by lookup only: the origin must hold a piece of the
//! side to move and the destination must not hold one of its own pieces.
//! Castling, en passant and promotion are recognised from the board and the
//! state flags, so a plain four-character move text is enough to drive them.
//! King safety is not checked here.

use crate::errors::EngineError;
use crate::game_state::chess_types::*;
use crate::game_state::undo_state::MoveKind;
use crate::moves::move_codec::Move;

/// Apply `mv` for the side to move and push an undo record.
pub fn apply_move(game: &mut GameState, mv: Move) -> Result<(), EngineError> {
    let from = mv
        .from_square()
        .ok_or_else(|| EngineError::IllegalMove(format!("origin is off the board: {mv:?}")))?;
    let to = mv
        .to_square()
        .ok_or_else(|| EngineError::IllegalMove(format!("destination is off the board: {mv:?}")))?;
    if from == to {
        return Err(EngineError::IllegalMove(format!("null move {from}{to}")));
    }

    let moved = game.board.get(from);
    let mover = moved
        .color()
        .ok_or_else(|| EngineError::IllegalMove(format!("no piece on {from}")))?;
    if mover != game.side_to_move {
        return Err(EngineError::IllegalMove(format!(
            "piece on {from} does not belong to the side to move"
        )));
    }
    let target = game.board.get(to);
    if target.color() == Some(mover) {
        return Err(EngineError::IllegalMove(format!(
            "{to} is occupied by a piece of the side to move"
        )));
    }

    let kind = classify_move(game, from, to, moved, mv)?;
    let mut captured = target;

    match kind {
        MoveKind::Quiet | MoveKind::Capture | MoveKind::DoublePawnPush => {
            game.board.set(to, moved);
        }
        MoveKind::Promotion(promoted) => {
            game.board.set(to, Piece::new(promoted, mover));
        }
        MoveKind::EnPassant { captured_square } => {
            captured = game.board.get(captured_square);
            game.board.set(captured_square, Piece::EMPTY);
            game.board.set(to, moved);
        }
        MoveKind::Castle { rook_from, rook_to } => {
            let rook = game.board.get(rook_from);
            game.board.set(rook_from, Piece::EMPTY);
            game.board.set(rook_to, rook);
            game.board.set(to, moved);
        }
    }
    game.board.set(from, Piece::EMPTY);

    let promotion = match kind {
        MoveKind::Promotion(promoted) => Some(promoted),
        _ => None,
    };
    let normalized = Move::new(from, to, captured, promotion);

    game.undo_stack.push(UndoState {
        mv: normalized,
        kind,
        moved_piece: moved,
        captured_piece: captured,
        prev_castling_rights: game.castling_rights,
        prev_en_passant_square: game.en_passant_square,
        prev_halfmove_clock: game.halfmove_clock,
        prev_last_move: game.last_move,
    });

    game.castling_rights &= !rights_lost(moved, from, to);
    game.en_passant_square = match kind {
        MoveKind::DoublePawnPush => from.offset(0, mover.pawn_direction()),
        _ => None,
    };
    game.halfmove_clock = if moved.kind() == Some(PieceKind::Pawn) || !captured.is_empty() {
        0
    } else {
        game.halfmove_clock.saturating_add(1)
    };
    if mover == Color::Dark {
        game.fullmove_number = game.fullmove_number.saturating_add(1);
    }
    game.side_to_move = mover.opposite();
    game.ply = game.ply.saturating_add(1);
    game.last_move = normalized;

    Ok(())
}

/// Reverse the most recent `apply_move`. Returns the popped record.
pub fn undo_move(game: &mut GameState) -> Option<UndoState> {
    let undo = game.undo_stack.pop()?;
    let from = undo.mv.from_square()?;
    let to = undo.mv.to_square()?;
    let mover = undo.moved_piece.color()?;

    game.board.set(from, undo.moved_piece);
    match undo.kind {
        MoveKind::EnPassant { captured_square } => {
            game.board.set(to, Piece::EMPTY);
            game.board.set(captured_square, undo.captured_piece);
        }
        MoveKind::Castle { rook_from, rook_to } => {
            let rook = game.board.get(rook_to);
            game.board.set(rook_to, Piece::EMPTY);
            game.board.set(rook_from, rook);
            game.board.set(to, Piece::EMPTY);
        }
        _ => game.board.set(to, undo.captured_piece),
    }

    game.castling_rights = undo.prev_castling_rights;
    game.en_passant_square = undo.prev_en_passant_square;
    game.halfmove_clock = undo.prev_halfmove_clock;
    game.last_move = undo.prev_last_move;
    if mover == Color::Dark {
        game.fullmove_number = game.fullmove_number.saturating_sub(1).max(1);
    }
    game.side_to_move = mover;
    game.ply = game.ply.saturating_sub(1);

    Some(undo)
}

fn classify_move(
    game: &GameState,
    from: Square,
    to: Square,
    moved: Piece,
    mv: Move,
) -> Result<MoveKind, EngineError> {
    let target = game.board.get(to);
    let plain = if target.is_empty() {
        MoveKind::Quiet
    } else {
        MoveKind::Capture
    };
    let Some(mover) = moved.color() else {
        return Err(EngineError::IllegalMove(format!("no piece on {from}")));
    };

    match moved.kind() {
        Some(PieceKind::King) if from.rank() == to.rank() && from.file().abs_diff(to.file()) == 2 => {
            classify_castle(game, from, to, mover)
        }
        Some(PieceKind::Pawn) => {
            let file_delta = from.file().abs_diff(to.file());
            let rank_delta = to.rank() as i8 - from.rank() as i8;
            let direction = mover.pawn_direction();

            if file_delta == 1 && rank_delta == direction && target.is_empty() {
                if game.en_passant_square != Some(to) {
                    return Err(EngineError::IllegalMove(format!(
                        "pawn capture {from}{to} onto an empty square"
                    )));
                }
                let captured_square = Square::from_file_rank(to.file(), from.rank())
                    .ok_or_else(|| EngineError::IllegalMove(format!("bad en passant {from}{to}")))?;
                return Ok(MoveKind::EnPassant { captured_square });
            }
            if to.rank() == mover.promotion_rank() {
                let promoted = mv.promotion_kind().unwrap_or(PieceKind::Queen);
                if !promoted.is_promotion_target() {
                    return Err(EngineError::IllegalMove(format!(
                        "cannot promote to {promoted:?}"
                    )));
                }
                return Ok(MoveKind::Promotion(promoted));
            }
            if file_delta == 0 && rank_delta == 2 * direction {
                return Ok(MoveKind::DoublePawnPush);
            }
            Ok(plain)
        }
        _ => Ok(plain),
    }
}

fn classify_castle(
    game: &GameState,
    from: Square,
    to: Square,
    mover: Color,
) -> Result<MoveKind, EngineError> {
    let home_rank = match mover {
        Color::Light => 0,
        Color::Dark => 7,
    };
    let refuse = || EngineError::IllegalMove(format!("castling {from}{to} is not permitted"));
    if from != Square::from_file_rank(4, home_rank).ok_or_else(refuse)? {
        return Err(refuse());
    }

    let (right, rook_file, rook_to_file, between): (CastlingRights, u8, u8, &[u8]) =
        match (mover, to.file()) {
            (Color::Light, 6) => (CASTLE_LIGHT_KINGSIDE, 7, 5, &[5, 6][..]),
            (Color::Light, 2) => (CASTLE_LIGHT_QUEENSIDE, 0, 3, &[1, 2, 3][..]),
            (Color::Dark, 6) => (CASTLE_DARK_KINGSIDE, 7, 5, &[5, 6][..]),
            (Color::Dark, 2) => (CASTLE_DARK_QUEENSIDE, 0, 3, &[1, 2, 3][..]),
            _ => return Err(refuse()),
        };
    if game.castling_rights & right == 0 {
        return Err(refuse());
    }

    let rook_from = Square::from_file_rank(rook_file, home_rank).ok_or_else(refuse)?;
    let rook_to = Square::from_file_rank(rook_to_file, home_rank).ok_or_else(refuse)?;
    if !game.board.get(rook_from).is(PieceKind::Rook, mover) {
        return Err(refuse());
    }
    for &file in between {
        let square = Square::from_file_rank(file, home_rank).ok_or_else(refuse)?;
        if !game.board.get(square).is_empty() {
            return Err(refuse());
        }
    }

    Ok(MoveKind::Castle { rook_from, rook_to })
}

fn rights_lost(moved: Piece, from: Square, to: Square) -> CastlingRights {
    let mut lost = 0;
    match moved.color() {
        Some(Color::Light) if moved.kind() == Some(PieceKind::King) => {
            lost |= CASTLE_LIGHT_KINGSIDE | CASTLE_LIGHT_QUEENSIDE;
        }
        Some(Color::Dark) if moved.kind() == Some(PieceKind::King) => {
            lost |= CASTLE_DARK_KINGSIDE | CASTLE_DARK_QUEENSIDE;
        }
        _ => {}
    }
    for square in [from, to] {
        lost |= match (square.file(), square.rank()) {
            (0, 0) => CASTLE_LIGHT_QUEENSIDE,
            (7, 0) => CASTLE_LIGHT_KINGSIDE,
            (0, 7) => CASTLE_DARK_QUEENSIDE,
            (7, 7) => CASTLE_DARK_KINGSIDE,
            _ => 0,
        };
    }
    lost
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::algebraic::algebraic_to_square;
    use crate::utils::long_algebraic::parse_user_move;

    fn sq(text: &str) -> Square {
        algebraic_to_square(text).expect("test square should parse")
    }

    fn play(game: &mut GameState, text: &str) {
        let mv = parse_user_move(text, &game.board, game.side_to_move).expect("move text should parse");
        apply_move(game, mv).expect("move should apply");
    }

    #[test]
    fn double_push_sets_en_passant_target_and_flips_side() {
        let mut game = GameState::new_game();
        play(&mut game, "e2e4");

        assert_eq!(game.en_passant_square, Some(sq("e3")));
        assert_eq!(game.side_to_move, Color::Dark);
        assert_eq!(game.ply, 1);
        assert_eq!(game.get_fen(), "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1");
    }

    #[test]
    fn en_passant_removes_the_passed_pawn_and_undoes() {
        let mut game = GameState::from_fen("4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 2")
            .expect("fen should parse");
        let before = game.clone();

        play(&mut game, "e5d6");
        assert!(game.board.get(sq("d5")).is_empty());
        assert_eq!(game.board.get(sq("d6")), Piece::new(PieceKind::Pawn, Color::Light));
        assert_eq!(game.last_move.captured_piece(), Piece::new(PieceKind::Pawn, Color::Dark));

        undo_move(&mut game).expect("undo should pop a record");
        assert_eq!(game.board, before.board);
        assert_eq!(game.get_fen(), before.get_fen());
    }

    #[test]
    fn castling_moves_the_rook_and_clears_rights() {
        let mut game = GameState::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1")
            .expect("fen should parse");
        play(&mut game, "e1g1");
        assert!(game.board.get(sq("g1")).is(PieceKind::King, Color::Light));
        assert!(game.board.get(sq("f1")).is(PieceKind::Rook, Color::Light));
        assert!(game.board.get(sq("h1")).is_empty());
        assert_eq!(game.castling_rights, CASTLE_DARK_KINGSIDE | CASTLE_DARK_QUEENSIDE);

        play(&mut game, "e8c8");
        assert!(game.board.get(sq("c8")).is(PieceKind::King, Color::Dark));
        assert!(game.board.get(sq("d8")).is(PieceKind::Rook, Color::Dark));
        assert_eq!(game.castling_rights, 0);

        undo_move(&mut game).expect("undo dark castle");
        undo_move(&mut game).expect("undo light castle");
        assert_eq!(game.get_fen(), "r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1");
    }

    #[test]
    fn castling_without_the_right_is_rejected() {
        let mut game = GameState::from_fen("r3k2r/8/8/8/8/8/8/R3K2R w Qkq - 0 1")
            .expect("fen should parse");
        let mv = parse_user_move("e1g1", &game.board, Color::Light).expect("text should parse");
        let err = apply_move(&mut game, mv).expect_err("kingside right is gone");
        assert!(matches!(err, EngineError::IllegalMove(_)));
        assert_eq!(game.ply, 0);
    }

    #[test]
    fn promotion_defaults_to_queen_and_honours_underpromotion() {
        let mut game = GameState::from_fen("8/4P3/8/8/8/8/8/k6K w - - 0 1").expect("fen should parse");
        play(&mut game, "e7e8");
        assert!(game.board.get(sq("e8")).is(PieceKind::Queen, Color::Light));
        undo_move(&mut game).expect("undo promotion");
        assert!(game.board.get(sq("e7")).is(PieceKind::Pawn, Color::Light));

        play(&mut game, "e7e8n");
        assert!(game.board.get(sq("e8")).is(PieceKind::Knight, Color::Light));
    }

    #[test]
    fn lookup_validation_rejects_empty_origin_and_wrong_side() {
        let mut game = GameState::new_game();
        let empty = Move::new(sq("e4"), sq("e5"), Piece::EMPTY, None);
        assert!(matches!(apply_move(&mut game, empty), Err(EngineError::IllegalMove(_))));

        let wrong_side = Move::new(sq("e7"), sq("e5"), Piece::EMPTY, None);
        assert!(matches!(apply_move(&mut game, wrong_side), Err(EngineError::IllegalMove(_))));

        let own_capture = Move::new(sq("a1"), sq("a2"), Piece::EMPTY, None);
        assert!(matches!(apply_move(&mut game, own_capture), Err(EngineError::IllegalMove(_))));
        assert!(game.undo_stack.is_empty());
    }

    #[test]
    fn undo_stack_unwinds_a_whole_game_fragment() {
        let mut game = GameState::new_game();
        for text in ["e2e4", "d7d5", "e4d5", "d8d5", "b1c3", "d5a5"] {
            play(&mut game, text);
        }
        assert_eq!(game.ply, 6);
        while undo_move(&mut game).is_some() {}
        assert_eq!(game.get_fen(), GameState::new_game().get_fen());
        assert_eq!(game.last_move, Move::NULL);
    }
}
