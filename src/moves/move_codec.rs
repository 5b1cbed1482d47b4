//! Packed move encoding shared with the compute kernel.
//!
//! Layout of the `u32`: bits 0-7 origin (padded square), 8-15 destination,
//! 16-19 captured piece code, 20-23 promotion piece code. Encoding performs
//! no legality checks; callers validate squares where it matters.

use std::fmt;

use crate::game_state::chess_types::{Piece, PieceKind, Square};

const FROM_SHIFT: u32 = 0;
const TO_SHIFT: u32 = 8;
const CAPTURED_SHIFT: u32 = 16;
const PROMOTION_SHIFT: u32 = 20;

const SQUARE_MASK: u32 = 0xFF;
const PIECE_MASK: u32 = 0xF;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Move(u32);

impl Move {
    /// The all-zero move; reported by the kernel when it has nothing to play.
    pub const NULL: Move = Move(0);

    /// Pack raw field values. Values wider than their field are truncated.
    #[inline]
    pub const fn encode(from: u8, to: u8, captured: u8, promotion: u8) -> Self {
        Move(
            ((from as u32 & SQUARE_MASK) << FROM_SHIFT)
                | ((to as u32 & SQUARE_MASK) << TO_SHIFT)
                | ((captured as u32 & PIECE_MASK) << CAPTURED_SHIFT)
                | ((promotion as u32 & PIECE_MASK) << PROMOTION_SHIFT),
        )
    }

    /// Unpack to `(from, to, captured, promotion)`.
    #[inline]
    pub const fn decode(self) -> (u8, u8, u8, u8) {
        (
            ((self.0 >> FROM_SHIFT) & SQUARE_MASK) as u8,
            ((self.0 >> TO_SHIFT) & SQUARE_MASK) as u8,
            ((self.0 >> CAPTURED_SHIFT) & PIECE_MASK) as u8,
            ((self.0 >> PROMOTION_SHIFT) & PIECE_MASK) as u8,
        )
    }

    #[inline]
    pub fn new(from: Square, to: Square, captured: Piece, promotion: Option<PieceKind>) -> Self {
        Move::encode(
            from.padded(),
            to.padded(),
            captured.code(),
            promotion.map_or(0, PieceKind::code),
        )
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Move(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub fn from_square(self) -> Option<Square> {
        Square::from_padded(self.decode().0)
    }

    #[inline]
    pub fn to_square(self) -> Option<Square> {
        Square::from_padded(self.decode().1)
    }

    /// Captured piece; codes that name no piece read as empty.
    #[inline]
    pub fn captured_piece(self) -> Piece {
        Piece::from_code(self.decode().2).unwrap_or(Piece::EMPTY)
    }

    #[inline]
    pub fn is_capture(self) -> bool {
        !self.captured_piece().is_empty()
    }

    #[inline]
    pub fn promotion_kind(self) -> Option<PieceKind> {
        PieceKind::from_code(self.decode().3)
    }
}

impl fmt::Debug for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (from, to, captured, promotion) = self.decode();
        f.debug_struct("Move")
            .field("from", &from)
            .field("to", &to)
            .field("captured", &captured)
            .field("promotion", &promotion)
            .finish()
    }
}
