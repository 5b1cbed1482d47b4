//! Square conversions for algebraic coordinates (`e4` and friends).

use crate::errors::EngineError;
use crate::game_state::chess_types::Square;

/// Convert a two-character coordinate such as `"e4"` to a padded square.
#[inline]
pub fn algebraic_to_square(square: &str) -> Result<Square, EngineError> {
    let bytes = square.as_bytes();
    if bytes.len() != 2 {
        return Err(EngineError::MalformedMoveText(format!(
            "invalid algebraic square: {square}"
        )));
    }
    square_from_bytes(bytes[0], bytes[1]).ok_or_else(|| {
        EngineError::MalformedMoveText(format!("invalid algebraic square: {square}"))
    })
}

/// File byte `a..=h` and rank byte `1..=8`; anything else is `None`.
#[inline]
pub fn square_from_bytes(file: u8, rank: u8) -> Option<Square> {
    if !(b'a'..=b'h').contains(&file) || !(b'1'..=b'8').contains(&rank) {
        return None;
    }
    Square::from_file_rank(file - b'a', rank - b'1')
}

#[inline]
pub fn square_to_algebraic(square: Square) -> String {
    square.to_string()
}
