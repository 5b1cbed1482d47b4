//! Coordinate move text (`e2e4`, `e7e8q`) to and from packed moves.

use crate::errors::EngineError;
use crate::game_state::chess_types::*;
use crate::moves::move_codec::Move;
use crate::utils::algebraic::square_from_bytes;

/// Parse a user move: four mandatory coordinate characters plus an optional
/// promotion letter. The captured piece is read from `board`; no rule check
/// is made. A fifth character other than `q/n/b/r` means no promotion.
pub fn parse_user_move(text: &str, board: &Board, side_to_move: Color) -> Result<Move, EngineError> {
    let text = text.trim();
    let bytes = text.as_bytes();
    if bytes.len() < 4 || bytes.len() > 5 {
        return Err(EngineError::MalformedMoveText(text.to_owned()));
    }

    let from = square_from_bytes(bytes[0], bytes[1])
        .ok_or_else(|| EngineError::MalformedMoveText(text.to_owned()))?;
    let to = square_from_bytes(bytes[2], bytes[3])
        .ok_or_else(|| EngineError::MalformedMoveText(text.to_owned()))?;

    let promotion = bytes
        .get(4)
        .and_then(|&ch| PieceKind::from_promotion_char(char::from(ch)));

    let mut captured = board.get(to);
    let pawn_slides_diagonally = board.get(from).is(PieceKind::Pawn, side_to_move)
        && from.file().abs_diff(to.file()) == 1
        && to.rank() as i8 - from.rank() as i8 == side_to_move.pawn_direction();
    if captured.is_empty() && pawn_slides_diagonally {
        captured = Piece::new(PieceKind::Pawn, side_to_move.opposite());
    }

    Ok(Move::new(from, to, captured, promotion))
}

/// Render a move as coordinate text for `move ...` replies.
pub fn move_to_text(mv: Move) -> Result<String, EngineError> {
    let (Some(from), Some(to)) = (mv.from_square(), mv.to_square()) else {
        return Err(EngineError::IllegalMove(format!("move leaves the board: {mv:?}")));
    };

    let mut out = format!("{from}{to}");
    if let Some(kind) = mv.promotion_kind() {
        out.push(kind.to_char());
    }
    Ok(out)
}
