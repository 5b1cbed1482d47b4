//! FEN-to-GameState parser.
//!
//! Builds the padded mailbox board and the state flags from the
//! space-separated position fields used by `setboard`.

use crate::errors::EngineError;
use crate::game_state::chess_types::*;
use crate::utils::algebraic::algebraic_to_square;

fn malformed(message: impl Into<String>) -> EngineError {
    EngineError::MalformedPosition(message.into())
}

/// Parse a full FEN. Side, castling and en-passant default to `w - -` and
/// the clocks to `0 1` when the trailing fields are absent.
pub fn parse_fen(fen: &str) -> Result<GameState, EngineError> {
    let mut parts = fen.split_whitespace();

    let placement = parts.next().ok_or_else(|| malformed("missing board layout"))?;
    let side = parts.next().unwrap_or("w");
    let castling = parts.next().unwrap_or("-");
    let en_passant = parts.next().unwrap_or("-");

    let mut game_state = parse_position(placement, side, castling, en_passant)?;

    if let Some(halfmove) = parts.next() {
        game_state.halfmove_clock = halfmove
            .parse::<u16>()
            .map_err(|_| malformed(format!("invalid halfmove clock: {halfmove}")))?;
    }
    if let Some(fullmove) = parts.next() {
        game_state.fullmove_number = fullmove
            .parse::<u16>()
            .map_err(|_| malformed(format!("invalid fullmove number: {fullmove}")))?
            .max(1);
    }
    if parts.next().is_some() {
        return Err(malformed("FEN has extra trailing fields"));
    }

    Ok(game_state)
}

/// Parse the four position fields into a fresh game state.
pub fn parse_position(
    placement: &str,
    side_to_move: &str,
    castling: &str,
    en_passant: &str,
) -> Result<GameState, EngineError> {
    let mut game_state = GameState::new_empty();
    game_state.board = parse_placement(placement)?;
    game_state.side_to_move = parse_side_to_move(side_to_move)?;
    game_state.castling_rights = parse_castling_rights(castling)?;
    game_state.en_passant_square = parse_en_passant_square(en_passant)?;
    Ok(game_state)
}

/// Parse the placement field. Every valid square not named by the string is
/// left empty.
pub fn parse_placement(placement: &str) -> Result<Board, EngineError> {
    let ranks: Vec<&str> = placement.split('/').collect();
    if ranks.len() != 8 {
        return Err(malformed(format!(
            "board layout must contain 8 ranks, found {}",
            ranks.len()
        )));
    }

    let mut board = Board::empty();
    for (fen_rank_idx, rank_str) in ranks.iter().enumerate() {
        let rank = 7 - fen_rank_idx as u8;
        let mut file = 0u8;

        for ch in rank_str.chars() {
            if let Some(run) = ch.to_digit(10) {
                if !(1..=8).contains(&run) {
                    return Err(malformed(format!("invalid empty-square count '{ch}'")));
                }
                file += run as u8;
                if file > 8 {
                    return Err(malformed(format!("rank {} has too many files", rank + 1)));
                }
                continue;
            }

            let piece = Piece::from_fen_char(ch)
                .ok_or_else(|| malformed(format!("invalid piece character '{ch}'")))?;
            let square = Square::from_file_rank(file, rank)
                .ok_or_else(|| malformed(format!("rank {} has too many files", rank + 1)))?;
            board.set(square, piece);
            file += 1;
        }

        if file != 8 {
            return Err(malformed(format!("rank {} does not sum to 8 files", rank + 1)));
        }
    }

    Ok(board)
}

fn parse_side_to_move(side: &str) -> Result<Color, EngineError> {
    match side {
        "w" => Ok(Color::Light),
        "b" => Ok(Color::Dark),
        _ => Err(malformed(format!("invalid side-to-move field: {side}"))),
    }
}

fn parse_castling_rights(castling: &str) -> Result<CastlingRights, EngineError> {
    if castling == "-" {
        return Ok(0);
    }

    let mut rights: CastlingRights = 0;
    for ch in castling.chars() {
        rights |= match ch {
            'K' => CASTLE_LIGHT_KINGSIDE,
            'Q' => CASTLE_LIGHT_QUEENSIDE,
            'k' => CASTLE_DARK_KINGSIDE,
            'q' => CASTLE_DARK_QUEENSIDE,
            _ => return Err(malformed(format!("invalid castling rights character: {ch}"))),
        };
    }
    Ok(rights)
}

fn parse_en_passant_square(en_passant: &str) -> Result<Option<Square>, EngineError> {
    if en_passant == "-" {
        return Ok(None);
    }
    algebraic_to_square(en_passant)
        .map(Some)
        .map_err(|_| malformed(format!("invalid en-passant square: {en_passant}")))
}
