//! Reference search kernel executed on the host.
//!
//! Reads the same table buffer, board snapshot and parameters a device kernel
//! receives. Pseudo-legal material alpha-beta: capturing the king wins, pawns
//! promote to queens only, castling and en passant are not generated.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::compute::kernel_abi::{SearchParams, TableView};
use crate::game_state::chess_rules::material_value;
use crate::game_state::chess_types::*;
use crate::moves::move_codec::Move;

pub const MAX_HOST_DEPTH: u32 = 4;
const KING_CAPTURE_SCORE: i32 = 100_000;
const COLOR_BIT: u8 = Piece::COLOR_BIT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KernelOutput {
    pub best_move: Move,
    pub nodes: u64,
    pub moves: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct HostMove {
    from: u8,
    to: u8,
    captured: u8,
    promotion: u8,
}

impl HostMove {
    fn to_move(self) -> Move {
        let padded = |packed: u8| Square::from_packed(packed).map_or(0, Square::padded);
        Move::encode(padded(self.from), padded(self.to), self.captured, self.promotion)
    }

    fn captures_king(self) -> bool {
        self.captured & 0x7 == PieceKind::King.code()
    }

    fn capture_value(self) -> i32 {
        PieceKind::from_code(self.captured & 0x7).map_or(0, material_value)
    }
}

struct HostSearch<'a> {
    tables: TableView<'a>,
    cells: [u8; 64],
    nodes: u64,
    moves: u64,
}

pub fn run_search<R: Rng + ?Sized>(
    tables: TableView<'_>,
    board: &[u32],
    params: &SearchParams,
    rng: &mut R,
) -> KernelOutput {
    let mut cells = [0u8; 64];
    for square in Square::all() {
        let code = board.get(square.index()).copied().unwrap_or(0);
        cells[square.to_packed() as usize] = (code & 0xF) as u8;
    }

    let mut search = HostSearch {
        tables,
        cells,
        nodes: 0,
        moves: 0,
    };
    let depth = params.max_depth.clamp(1, MAX_HOST_DEPTH);
    let best_move = search.root(params.side(), depth, rng);

    KernelOutput {
        best_move,
        nodes: search.nodes,
        moves: search.moves,
    }
}

impl HostSearch<'_> {
    fn root<R: Rng + ?Sized>(&mut self, side: Color, depth: u32, rng: &mut R) -> Move {
        self.nodes += 1;
        let mut candidates = self.generate(side);
        self.moves += candidates.len() as u64;
        candidates.shuffle(rng);
        candidates.sort_by_key(|mv| -mv.capture_value());

        if let Some(mv) = candidates.iter().find(|mv| mv.captures_king()) {
            return mv.to_move();
        }

        let mut best = None;
        let mut alpha = -KING_CAPTURE_SCORE - 1;
        let beta = KING_CAPTURE_SCORE + 1;
        for mv in candidates {
            self.make(mv, side);
            let score = -self.negamax(side.opposite(), depth - 1, -beta, -alpha);
            self.unmake(mv);
            if best.is_none() || score > alpha {
                alpha = score;
                best = Some(mv);
            }
        }

        best.map_or(Move::NULL, HostMove::to_move)
    }

    fn negamax(&mut self, side: Color, depth: u32, mut alpha: i32, beta: i32) -> i32 {
        self.nodes += 1;
        if depth == 0 {
            return self.evaluate(side);
        }

        let mut candidates = self.generate(side);
        self.moves += candidates.len() as u64;
        if candidates.is_empty() {
            return 0;
        }
        if candidates.iter().any(|mv| mv.captures_king()) {
            return KING_CAPTURE_SCORE + depth as i32;
        }
        candidates.sort_by_key(|mv| -mv.capture_value());

        for mv in candidates {
            self.make(mv, side);
            let score = -self.negamax(side.opposite(), depth - 1, -beta, -alpha);
            self.unmake(mv);
            if score >= beta {
                return score;
            }
            alpha = alpha.max(score);
        }
        alpha
    }

    fn evaluate(&self, side: Color) -> i32 {
        self.cells
            .iter()
            .filter_map(|&code| Piece::from_code(code))
            .filter_map(|piece| Some((piece.kind()?, piece.color()?)))
            .map(|(kind, color)| {
                let value = material_value(kind);
                if color == side {
                    value
                } else {
                    -value
                }
            })
            .sum()
    }

    fn occupancy(&self, side: Color) -> Bitboard {
        let mut bb = 0;
        for (packed, &code) in self.cells.iter().enumerate() {
            if code != 0 && color_of(code) == side {
                bb |= self.tables.set_mask(packed);
            }
        }
        bb
    }

    fn generate(&self, side: Color) -> Vec<HostMove> {
        let own = self.occupancy(side);
        let theirs = self.occupancy(side.opposite());
        let all = own | theirs;
        let mut out = Vec::with_capacity(48);

        let mut pieces = own;
        while pieces != 0 {
            let from = self.tables.bit_scan_forward(pieces);
            pieces &= pieces - 1;
            let code = self.cells[from] & 0x7;

            let targets = match PieceKind::from_code(code) {
                Some(PieceKind::Pawn) => {
                    self.push_pawn_moves(side, from, all, theirs, &mut out);
                    continue;
                }
                Some(PieceKind::Knight) | Some(PieceKind::King) => self.tables.attacks(code, from),
                Some(PieceKind::Bishop) => self.tables.bishop_attacks(from, all),
                Some(PieceKind::Rook) => self.tables.rook_attacks(from, all),
                Some(PieceKind::Queen) => self.tables.rook_attacks(from, all) | self.tables.bishop_attacks(from, all),
                None => 0,
            };
            self.push_targets(from, targets & !own, 0, &mut out);
        }
        out
    }

    fn push_pawn_moves(&self, side: Color, from: usize, all: Bitboard, theirs: Bitboard, out: &mut Vec<HostMove>) {
        let promotion_rank = self.tables.rank_mask(side.promotion_rank() as usize);
        let start_rank = match side {
            Color::Light => 1,
            Color::Dark => 6,
        };
        let step = |packed: usize| -> Option<usize> {
            match side {
                Color::Light => (packed + 8 < 64).then_some(packed + 8),
                Color::Dark => packed.checked_sub(8),
            }
        };

        let mut targets = self.tables.pawn_attacks(side, from) & theirs;
        if let Some(single) = step(from).filter(|&to| all & self.tables.set_mask(to) == 0) {
            targets |= self.tables.set_mask(single);
            if from / 8 == start_rank {
                if let Some(double) = step(single).filter(|&to| all & self.tables.set_mask(to) == 0) {
                    targets |= self.tables.set_mask(double);
                }
            }
        }

        self.push_targets(from, targets & !promotion_rank, 0, out);
        self.push_targets(from, targets & promotion_rank, PieceKind::Queen.code(), out);
    }

    fn push_targets(&self, from: usize, mut targets: Bitboard, promotion: u8, out: &mut Vec<HostMove>) {
        while targets != 0 {
            let to = self.tables.bit_scan_forward(targets);
            targets &= self.tables.clear_mask(to);
            out.push(HostMove {
                from: from as u8,
                to: to as u8,
                captured: self.cells[to],
                promotion,
            });
        }
    }

    fn make(&mut self, mv: HostMove, side: Color) {
        let moved = self.cells[mv.from as usize];
        self.cells[mv.to as usize] = if mv.promotion != 0 {
            match side {
                Color::Light => mv.promotion,
                Color::Dark => mv.promotion | COLOR_BIT,
            }
        } else {
            moved
        };
        self.cells[mv.from as usize] = 0;
    }

    fn unmake(&mut self, mv: HostMove) {
        let placed = self.cells[mv.to as usize];
        self.cells[mv.from as usize] = if mv.promotion != 0 {
            (placed & COLOR_BIT) | PieceKind::Pawn.code()
        } else {
            placed
        };
        self.cells[mv.to as usize] = mv.captured;
    }
}

#[inline]
fn color_of(code: u8) -> Color {
    if code & COLOR_BIT != 0 {
        Color::Dark
    } else {
        Color::Light
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::kernel_abi::{board_snapshot, pack_tables, PackedTables};
    use crate::tables::attack_tables::StaticTables;
    use crate::utils::long_algebraic::move_to_text;
    use rand::{rngs::StdRng, SeedableRng};

    fn packed() -> PackedTables {
        pack_tables(StaticTables::get())
    }

    fn search(fen: &str, depth: u32, seed: u64) -> KernelOutput {
        let game = GameState::from_fen(fen).expect("fen should parse");
        let tables = packed();
        let params = SearchParams {
            side_to_move: game.side_to_move.index() as u32,
            max_depth: depth,
            ..SearchParams::default()
        };
        let mut rng = StdRng::seed_from_u64(seed);
        run_search(tables.view(), &board_snapshot(&game.board), &params, &mut rng)
    }

    #[test]
    fn starting_position_has_twenty_root_moves() {
        let output = search("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1", 1, 7);
        assert_eq!(output.moves, 20);
        assert_eq!(output.nodes, 21);
        assert!(!output.best_move.is_null());
    }

    #[test]
    fn hanging_queen_is_taken() {
        let output = search("4k3/8/8/3q4/8/8/8/3RK3 w - - 0 1", 2, 1);
        assert_eq!(move_to_text(output.best_move).expect("text"), "d1d5");
        assert_eq!(
            output.best_move.captured_piece(),
            Piece::new(PieceKind::Queen, Color::Dark)
        );
    }

    #[test]
    fn black_also_finds_captures() {
        let output = search("3rk3/8/8/3Q4/8/8/8/4K3 b - - 0 1", 2, 3);
        assert_eq!(move_to_text(output.best_move).expect("text"), "d8d5");
    }

    #[test]
    fn pawn_on_seventh_promotes_to_queen() {
        let output = search("7k/P7/8/8/8/8/8/7K w - - 0 1", 1, 5);
        assert_eq!(move_to_text(output.best_move).expect("text"), "a7a8q");
    }

    #[test]
    fn king_capture_is_played_immediately() {
        let output = search("4k3/8/8/8/8/8/8/R3K3 b - - 0 1", 3, 9);
        assert!(!output.best_move.is_null());

        let exposed = search("4k3/8/8/8/8/8/8/4RK2 w - - 0 1", 3, 9);
        assert_eq!(move_to_text(exposed.best_move).expect("text"), "e1e8");
    }

    #[test]
    fn side_without_pieces_returns_null_move() {
        let output = search("8/8/8/8/8/8/8/4K3 b - - 0 1", 2, 0);
        assert!(output.best_move.is_null());
        assert_eq!(output.moves, 0);
    }

    #[test]
    fn same_seed_gives_same_move() {
        let fen = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";
        assert_eq!(search(fen, 2, 42), search(fen, 2, 42));
    }
}
