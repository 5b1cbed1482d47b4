//! Padded mailbox board.
//!
//! 128 logical cells plus one sentinel, indexed by the 0x88 square index.
//! Cells failing the 0x88 test are never written because every accessor
//! takes a [`Square`], which cannot be constructed off-board.

use crate::game_state::chess_types::*;
use crate::moves::move_codec::Move;

pub const BOARD_CELLS: usize = 129;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    cells: [Piece; BOARD_CELLS],
}

impl Default for Board {
    fn default() -> Self {
        Self::empty()
    }
}

impl Board {
    #[inline]
    pub const fn empty() -> Self {
        Self {
            cells: [Piece::EMPTY; BOARD_CELLS],
        }
    }

    #[inline]
    pub fn get(&self, square: Square) -> Piece {
        self.cells[square.index()]
    }

    #[inline]
    pub fn set(&mut self, square: Square, piece: Piece) {
        self.cells[square.index()] = piece;
    }

    /// Raw cell view, sentinel included. Used for the device snapshot.
    #[inline]
    pub fn cells(&self) -> &[Piece; BOARD_CELLS] {
        &self.cells
    }

    /// Occupied squares in packed order.
    pub fn occupied(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        Square::all()
            .map(|square| (square, self.get(square)))
            .filter(|(_, piece)| !piece.is_empty())
    }

    pub fn occupancy(&self, color: Color) -> Bitboard {
        self.occupied()
            .filter(|(_, piece)| piece.color() == Some(color))
            .fold(0, |acc, (square, _)| acc | square.bitboard())
    }

    /// Primitive make: the destination takes the moved (or promoted) piece and
    /// the origin is emptied. Special moves are handled by `apply_move`.
    /// Returns false when either square of the move is off-board.
    pub fn apply_raw(&mut self, mv: Move) -> bool {
        let (Some(from), Some(to)) = (mv.from_square(), mv.to_square()) else {
            return false;
        };
        let moved = self.get(from);
        let placed = match (mv.promotion_kind(), moved.color()) {
            (Some(kind), Some(color)) => Piece::new(kind, color),
            _ => moved,
        };
        self.set(to, placed);
        self.set(from, Piece::EMPTY);
        true
    }

    /// Primitive unmake, the exact inverse of [`Board::apply_raw`]: the origin
    /// gets the piece back (a pawn when the move promoted) and the destination
    /// gets the captured code stored in the move.
    pub fn revert_raw(&mut self, mv: Move) -> bool {
        let (Some(from), Some(to)) = (mv.from_square(), mv.to_square()) else {
            return false;
        };
        let placed = self.get(to);
        let restored = match (mv.promotion_kind(), placed.color()) {
            (Some(_), Some(color)) => Piece::new(PieceKind::Pawn, color),
            _ => placed,
        };
        self.set(from, restored);
        self.set(to, mv.captured_piece());
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::algebraic::algebraic_to_square;
    use crate::utils::fen_parser::parse_placement;

    fn sq(text: &str) -> Square {
        algebraic_to_square(text).expect("test square should parse")
    }

    #[test]
    fn raw_apply_then_revert_restores_board() {
        let start = parse_placement("rnbqkbnr/pppppppp/8/8/4p3/8/PPPPPPPP/RNBQKBNR")
            .expect("placement should parse");
        let mut board = start.clone();

        let mv = Move::new(sq("d2"), sq("e4"), board.get(sq("e4")), None);
        assert!(board.apply_raw(mv));
        assert_eq!(board.get(sq("e4")), Piece::new(PieceKind::Pawn, Color::Light));
        assert!(board.get(sq("d2")).is_empty());

        assert!(board.revert_raw(mv));
        assert_eq!(board, start);
    }

    #[test]
    fn raw_promotion_reverts_to_pawn() {
        let start = parse_placement("3r4/4P3/8/8/8/8/8/8").expect("placement should parse");
        let mut board = start.clone();
        let mv = Move::new(sq("e7"), sq("d8"), board.get(sq("d8")), Some(PieceKind::Queen));

        assert!(board.apply_raw(mv));
        assert_eq!(board.get(sq("d8")), Piece::new(PieceKind::Queen, Color::Light));
        assert!(board.revert_raw(mv));
        assert_eq!(board, start);
    }

    #[test]
    fn occupancy_by_color() {
        let board = parse_placement("4k3/8/8/8/8/8/8/4K2R").expect("placement should parse");
        assert_eq!(board.occupancy(Color::Dark), sq("e8").bitboard());
        assert_eq!(
            board.occupancy(Color::Light),
            sq("e1").bitboard() | sq("h1").bitboard()
        );
        assert_eq!(board.occupied().count(), 3);
    }
}
