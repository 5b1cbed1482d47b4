use crate::game_state::chess_types::*;
use crate::moves::move_codec::Move;

/// How `apply_move` interpreted a move; drives the matching undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveKind {
    Quiet,
    Capture,
    DoublePawnPush,
    EnPassant { captured_square: Square },
    Castle { rook_from: Square, rook_to: Square },
    Promotion(PieceKind),
}

/// Single undo record for `apply_move` / `undo_move`.
#[derive(Debug, Clone)]
pub struct UndoState {
    pub mv: Move,
    pub kind: MoveKind,
    pub moved_piece: Piece,
    pub captured_piece: Piece,

    pub prev_castling_rights: CastlingRights,
    pub prev_en_passant_square: Option<Square>,
    pub prev_halfmove_clock: u16,
    pub prev_last_move: Move,
}
