//! Core value types shared between the host and the compute kernel.
//!
//! Squares live on a padded 0x88 mailbox so that off-board detection is a
//! single bit test; bitboards use the packed 8x8 index. Piece codes keep the
//! type in the low three bits and the color in bit 3, which is also the
//! layout the kernel reads from the board snapshot.

use std::fmt;

pub use crate::game_state::board::Board;
pub use crate::game_state::game_state::GameState;
pub use crate::game_state::undo_state::UndoState;

/// 64-bit set over packed squares (`0 == a1`, `63 == h8`).
pub type Bitboard = u64;

/// Side to move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    Light,
    Dark,
}

impl Color {
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Color::Light => 0,
            Color::Dark => 1,
        }
    }

    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Color::Light => Color::Dark,
            Color::Dark => Color::Light,
        }
    }

    /// Rank a pawn of this color promotes on.
    #[inline]
    pub const fn promotion_rank(self) -> u8 {
        match self {
            Color::Light => 7,
            Color::Dark => 0,
        }
    }

    #[inline]
    pub const fn pawn_direction(self) -> i8 {
        match self {
            Color::Light => 1,
            Color::Dark => -1,
        }
    }
}

/// Piece type. Discriminants are the kernel-visible type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PieceKind {
    Pawn = 1,
    Knight = 3,
    King = 4,
    Bishop = 5,
    Rook = 6,
    Queen = 7,
}

impl PieceKind {
    #[inline]
    pub const fn code(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(PieceKind::Pawn),
            3 => Some(PieceKind::Knight),
            4 => Some(PieceKind::King),
            5 => Some(PieceKind::Bishop),
            6 => Some(PieceKind::Rook),
            7 => Some(PieceKind::Queen),
            _ => None,
        }
    }

    /// Lowercase FEN letter.
    pub const fn to_char(self) -> char {
        match self {
            PieceKind::Pawn => 'p',
            PieceKind::Knight => 'n',
            PieceKind::King => 'k',
            PieceKind::Bishop => 'b',
            PieceKind::Rook => 'r',
            PieceKind::Queen => 'q',
        }
    }

    pub fn from_char(ch: char) -> Option<Self> {
        match ch.to_ascii_lowercase() {
            'p' => Some(PieceKind::Pawn),
            'n' => Some(PieceKind::Knight),
            'k' => Some(PieceKind::King),
            'b' => Some(PieceKind::Bishop),
            'r' => Some(PieceKind::Rook),
            'q' => Some(PieceKind::Queen),
            _ => None,
        }
    }

    /// Promotion letters are limited to `q/n/b/r`, case-insensitive.
    pub fn from_promotion_char(ch: char) -> Option<Self> {
        match ch.to_ascii_lowercase() {
            'q' => Some(PieceKind::Queen),
            'n' => Some(PieceKind::Knight),
            'b' => Some(PieceKind::Bishop),
            'r' => Some(PieceKind::Rook),
            _ => None,
        }
    }

    #[inline]
    pub const fn is_promotion_target(self) -> bool {
        matches!(
            self,
            PieceKind::Knight | PieceKind::Bishop | PieceKind::Rook | PieceKind::Queen
        )
    }
}

/// A 4-bit piece code, or the empty code `0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Piece(u8);

impl Piece {
    pub const EMPTY: Piece = Piece(0);
    pub const COLOR_BIT: u8 = 0x8;
    const KIND_MASK: u8 = 0x7;

    #[inline]
    pub const fn new(kind: PieceKind, color: Color) -> Self {
        match color {
            Color::Light => Piece(kind.code()),
            Color::Dark => Piece(kind.code() | Self::COLOR_BIT),
        }
    }

    /// Accepts only the empty code and the twelve real piece codes.
    #[inline]
    pub const fn from_code(code: u8) -> Option<Self> {
        if code == 0 {
            return Some(Piece::EMPTY);
        }
        if code > 0xF {
            return None;
        }
        match PieceKind::from_code(code & Self::KIND_MASK) {
            Some(_) => Some(Piece(code)),
            None => None,
        }
    }

    #[inline]
    pub const fn code(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn kind(self) -> Option<PieceKind> {
        PieceKind::from_code(self.0 & Self::KIND_MASK)
    }

    #[inline]
    pub const fn color(self) -> Option<Color> {
        if self.is_empty() {
            None
        } else if self.0 & Self::COLOR_BIT != 0 {
            Some(Color::Dark)
        } else {
            Some(Color::Light)
        }
    }

    #[inline]
    pub fn is(self, kind: PieceKind, color: Color) -> bool {
        self == Piece::new(kind, color)
    }

    /// FEN letter; uppercase for Light.
    pub fn to_fen_char(self) -> Option<char> {
        let kind = self.kind()?;
        let ch = kind.to_char();
        match self.color()? {
            Color::Light => Some(ch.to_ascii_uppercase()),
            Color::Dark => Some(ch),
        }
    }

    pub fn from_fen_char(ch: char) -> Option<Self> {
        let kind = PieceKind::from_char(ch)?;
        if ch.is_ascii_uppercase() {
            Some(Piece::new(kind, Color::Light))
        } else {
            Some(Piece::new(kind, Color::Dark))
        }
    }
}

/// A valid square on the padded 0x88 mailbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Square(u8);

impl Square {
    pub const OFF_BOARD_MASK: u8 = 0x88;

    #[inline]
    pub const fn from_file_rank(file: u8, rank: u8) -> Option<Self> {
        if file > 7 || rank > 7 {
            return None;
        }
        Some(Square(rank * 16 + file))
    }

    /// Rejects indices failing the 0x88 test.
    #[inline]
    pub const fn from_padded(index: u8) -> Option<Self> {
        if index & Self::OFF_BOARD_MASK != 0 {
            None
        } else {
            Some(Square(index))
        }
    }

    /// `padded = (packed / 8) * 16 + packed % 8`.
    #[inline]
    pub const fn from_packed(packed: u8) -> Option<Self> {
        if packed > 63 {
            return None;
        }
        Some(Square((packed / 8) * 16 + packed % 8))
    }

    /// `packed = (index / 16) * 8 + index % 16`.
    #[inline]
    pub const fn to_packed(self) -> u8 {
        (self.0 / 16) * 8 + self.0 % 16
    }

    #[inline]
    pub const fn padded(self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn file(self) -> u8 {
        self.0 & 7
    }

    #[inline]
    pub const fn rank(self) -> u8 {
        self.0 >> 4
    }

    #[inline]
    pub const fn bitboard(self) -> Bitboard {
        1u64 << self.to_packed()
    }

    /// Step by file/rank deltas; `None` when the result leaves the board.
    #[inline]
    pub const fn offset(self, file_delta: i8, rank_delta: i8) -> Option<Self> {
        let target = self.0 as i16 + rank_delta as i16 * 16 + file_delta as i16;
        if target < 0 || target > 0x77 {
            return None;
        }
        Square::from_padded(target as u8)
    }

    /// All 64 squares in packed order (a1, b1, ..., h8).
    pub fn all() -> impl Iterator<Item = Square> {
        (0u8..64).filter_map(Square::from_packed)
    }
}

impl fmt::Display for Square {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            char::from(b'a' + self.file()),
            char::from(b'1' + self.rank())
        )
    }
}

pub const CASTLE_LIGHT_KINGSIDE: CastlingRights = 1 << 0;
pub const CASTLE_LIGHT_QUEENSIDE: CastlingRights = 1 << 1;
pub const CASTLE_DARK_KINGSIDE: CastlingRights = 1 << 2;
pub const CASTLE_DARK_QUEENSIDE: CastlingRights = 1 << 3;
pub type CastlingRights = u8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_and_padded_indices_are_inverse_on_every_square() {
        for index in 0u8..128 {
            let Some(square) = Square::from_padded(index) else {
                assert_ne!(index & 0x88, 0);
                continue;
            };
            let packed = square.to_packed();
            assert!(packed < 64);
            assert_eq!(Square::from_packed(packed), Some(square));
        }
        assert_eq!(Square::all().count(), 64);
    }

    #[test]
    fn off_board_indices_are_rejected() {
        assert_eq!(Square::from_padded(0x08), None);
        assert_eq!(Square::from_padded(0x80), None);
        assert_eq!(Square::from_packed(64), None);
        assert_eq!(Square::from_file_rank(8, 0), None);
        let h1 = Square::from_file_rank(7, 0).expect("h1 is on board");
        assert_eq!(h1.offset(1, 0), None);
        assert_eq!(h1.offset(0, -1), None);
    }

    #[test]
    fn square_file_rank_and_display_agree() {
        let e4 = Square::from_file_rank(4, 3).expect("e4 is on board");
        assert_eq!(e4.padded(), 0x34);
        assert_eq!(e4.to_packed(), 28);
        assert_eq!(e4.file(), 4);
        assert_eq!(e4.rank(), 3);
        assert_eq!(e4.to_string(), "e4");
    }

    #[test]
    fn piece_codes_split_kind_and_color() {
        let black_queen = Piece::new(PieceKind::Queen, Color::Dark);
        assert_eq!(black_queen.code(), 0xF);
        assert_eq!(black_queen.kind(), Some(PieceKind::Queen));
        assert_eq!(black_queen.color(), Some(Color::Dark));
        assert_eq!(black_queen.to_fen_char(), Some('q'));

        assert_eq!(Piece::EMPTY.kind(), None);
        assert_eq!(Piece::EMPTY.color(), None);
        assert_eq!(Piece::from_code(2), None);
        assert_eq!(Piece::from_code(0x10), None);
        assert_eq!(Piece::from_fen_char('N'), Some(Piece::new(PieceKind::Knight, Color::Light)));
    }
}
