//! Text board diagram printed after setup and after opponent moves.
//!
//! Every line starts with `#` so protocol front-ends treat it as a comment.

use crate::game_state::chess_types::*;

pub fn render_board(board: &Board) -> String {
    let mut out = String::from("###ABCDEFGH###\n");

    for rank in (0..8u8).rev() {
        out.push('#');
        out.push(char::from(b'1' + rank));
        out.push(' ');

        for file in 0..8u8 {
            let ch = Square::from_file_rank(file, rank)
                .and_then(|square| board.get(square).to_fen_char())
                .unwrap_or('-');
            out.push(ch);
        }
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::render_board;
    use crate::game_state::chess_types::GameState;

    #[test]
    fn starting_position_diagram() {
        let rendered = render_board(&GameState::new_game().board);
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines.len(), 9);
        assert_eq!(lines[0], "###ABCDEFGH###");
        assert_eq!(lines[1], "#8 rnbqkbnr");
        assert_eq!(lines[4], "#5 --------");
        assert_eq!(lines[8], "#1 RNBQKBNR");
    }
}
