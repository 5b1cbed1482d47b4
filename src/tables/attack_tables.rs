//! Static bitboard tables mirrored into device memory.
//!
//! Built once per process on first use and immutable afterwards. Indices are
//! packed squares (`0 == a1`); per-piece tables are indexed by the piece type
//! code so the kernel can use the low three bits of a board cell directly.

use std::sync::OnceLock;

use crate::game_state::chess_types::{Bitboard, Color, PieceKind, Square};
use crate::tables::sliding_tables::{ray_attacks, SlidingTable, BISHOP_DIRECTIONS, ROOK_DIRECTIONS};

pub const PIECE_CODE_SLOTS: usize = 8;
pub const ROOK_ATTACK_ENTRIES: usize = 0x19000;
pub const BISHOP_ATTACK_ENTRIES: usize = 0x1480;

/// Multiplier for the De Bruijn bit scan behind `bit_table`.
pub const DE_BRUIJN_64: u64 = 0x03f7_9d71_b4cb_0a89;

/// Kogge-Stone shift per direction: NE, E, SE, S, SW, W, NW, N.
pub const DIRECTION_SHIFTS: [i32; 8] = [9, 1, -7, -8, -9, -1, 7, 8];

/// Bits that remain valid after a one-step shift in the matching direction.
pub const AVOID_WRAP: [Bitboard; 8] = [
    0xfefe_fefe_fefe_fe00,
    0xfefe_fefe_fefe_fefe,
    0x00fe_fefe_fefe_fefe,
    0x00ff_ffff_ffff_ffff,
    0x007f_7f7f_7f7f_7f7f,
    0x7f7f_7f7f_7f7f_7f7f,
    0x7f7f_7f7f_7f7f_7f00,
    0xffff_ffff_ffff_ff00,
];

const KNIGHT_STEPS: [(i8, i8); 8] = [
    (1, 2),
    (2, 1),
    (2, -1),
    (1, -2),
    (-1, -2),
    (-2, -1),
    (-2, 1),
    (-1, 2),
];

const KING_STEPS: [(i8, i8); 8] = [
    (0, 1),
    (1, 1),
    (1, 0),
    (1, -1),
    (0, -1),
    (-1, -1),
    (-1, 0),
    (-1, 1),
];

#[derive(Debug, Clone)]
pub struct StaticTables {
    pub set_mask: [Bitboard; 64],
    pub clear_mask: [Bitboard; 64],
    /// `[piece type code][square]`; sliders hold their empty-board attacks.
    pub attack_tables: [[Bitboard; 64]; PIECE_CODE_SLOTS],
    /// `[color index][square]`.
    pub pawn_attacks: [[Bitboard; 64]; 2],
    pub file_masks: [Bitboard; 8],
    pub rank_masks: [Bitboard; 8],
    pub avoid_wrap: [Bitboard; 8],
    pub shift: [i32; 8],
    pub bit_table: [u32; 64],
    pub rook: SlidingTable,
    pub bishop: SlidingTable,
}

static TABLES: OnceLock<StaticTables> = OnceLock::new();

impl StaticTables {
    /// Process-wide instance.
    pub fn get() -> &'static StaticTables {
        TABLES.get_or_init(StaticTables::build)
    }

    pub fn build() -> Self {
        let mut set_mask = [0u64; 64];
        let mut clear_mask = [0u64; 64];
        let mut attack_tables = [[0u64; 64]; PIECE_CODE_SLOTS];
        let mut pawn_attacks = [[0u64; 64]; 2];
        let mut bit_table = [0u32; 64];

        for square in Square::all() {
            let packed = square.to_packed() as usize;
            set_mask[packed] = 1u64 << packed;
            clear_mask[packed] = !(1u64 << packed);

            attack_tables[PieceKind::Knight.code() as usize][packed] = leaper_attacks(square, &KNIGHT_STEPS);
            attack_tables[PieceKind::King.code() as usize][packed] = leaper_attacks(square, &KING_STEPS);
            let bishop = ray_attacks(square, &BISHOP_DIRECTIONS, 0);
            let rook = ray_attacks(square, &ROOK_DIRECTIONS, 0);
            attack_tables[PieceKind::Bishop.code() as usize][packed] = bishop;
            attack_tables[PieceKind::Rook.code() as usize][packed] = rook;
            attack_tables[PieceKind::Queen.code() as usize][packed] = bishop | rook;

            for color in [Color::Light, Color::Dark] {
                let forward = color.pawn_direction();
                pawn_attacks[color.index()][packed] = leaper_attacks(square, &[(-1, forward), (1, forward)]);
            }

            let isolated = 1u64 << packed;
            bit_table[(isolated.wrapping_mul(DE_BRUIJN_64) >> 58) as usize] = packed as u32;
        }

        let mut file_masks = [0u64; 8];
        let mut rank_masks = [0u64; 8];
        for i in 0..8 {
            file_masks[i] = 0x0101_0101_0101_0101u64 << i;
            rank_masks[i] = 0xFFu64 << (8 * i);
        }

        Self {
            set_mask,
            clear_mask,
            attack_tables,
            pawn_attacks,
            file_masks,
            rank_masks,
            avoid_wrap: AVOID_WRAP,
            shift: DIRECTION_SHIFTS,
            bit_table,
            rook: SlidingTable::build(&ROOK_DIRECTIONS),
            bishop: SlidingTable::build(&BISHOP_DIRECTIONS),
        }
    }

    #[inline]
    pub fn rook_attacks(&self, packed: u8, occupancy: Bitboard) -> Bitboard {
        self.rook.lookup(packed, occupancy)
    }

    #[inline]
    pub fn bishop_attacks(&self, packed: u8, occupancy: Bitboard) -> Bitboard {
        self.bishop.lookup(packed, occupancy)
    }

    /// Index of the lowest set bit; `bb` must be non-zero.
    #[inline]
    pub fn bit_scan_forward(&self, bb: Bitboard) -> u32 {
        let isolated = bb & bb.wrapping_neg();
        self.bit_table[(isolated.wrapping_mul(DE_BRUIJN_64) >> 58) as usize]
    }
}

fn leaper_attacks(square: Square, steps: &[(i8, i8)]) -> Bitboard {
    steps
        .iter()
        .filter_map(|&(file_delta, rank_delta)| square.offset(file_delta, rank_delta))
        .fold(0, |acc, target| acc | target.bitboard())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packed(file: u8, rank: u8) -> usize {
        Square::from_file_rank(file, rank).expect("square").to_packed() as usize
    }

    #[test]
    fn sliding_tables_have_the_expected_sizes() {
        let tables = StaticTables::get();
        assert_eq!(tables.rook.attacks.len(), ROOK_ATTACK_ENTRIES);
        assert_eq!(tables.bishop.attacks.len(), BISHOP_ATTACK_ENTRIES);
    }

    #[test]
    fn leaper_tables_know_the_corners() {
        let tables = StaticTables::get();
        let knight = PieceKind::Knight.code() as usize;
        let king = PieceKind::King.code() as usize;
        assert_eq!(tables.attack_tables[knight][packed(0, 0)].count_ones(), 2);
        assert_eq!(tables.attack_tables[knight][packed(3, 3)].count_ones(), 8);
        assert_eq!(tables.attack_tables[king][packed(7, 7)].count_ones(), 3);
        assert_eq!(tables.attack_tables[0], [0u64; 64]);
    }

    #[test]
    fn pawn_attacks_point_forward_for_each_color() {
        let tables = StaticTables::get();
        let e4 = packed(4, 3);
        let expected_light = (1u64 << packed(3, 4)) | (1u64 << packed(5, 4));
        let expected_dark = (1u64 << packed(3, 2)) | (1u64 << packed(5, 2));
        assert_eq!(tables.pawn_attacks[Color::Light.index()][e4], expected_light);
        assert_eq!(tables.pawn_attacks[Color::Dark.index()][e4], expected_dark);
        assert_eq!(tables.pawn_attacks[Color::Light.index()][packed(0, 7)], 0);
    }

    #[test]
    fn rook_on_a1_sees_file_and_rank() {
        let tables = StaticTables::get();
        let attacks = tables.rook_attacks(0, 0);
        assert_eq!(attacks, (tables.file_masks[0] | tables.rank_masks[0]) & tables.clear_mask[0]);

        let blocker = 1u64 << packed(0, 3);
        let blocked = tables.rook_attacks(0, blocker);
        assert_eq!(blocked & tables.file_masks[0], (1 << 8) | (1 << 16) | blocker);
    }

    #[test]
    fn bit_table_agrees_with_trailing_zeros() {
        let tables = StaticTables::get();
        for i in 0..64u32 {
            let bb = (1u64 << i) | (1u64 << 63);
            assert_eq!(tables.bit_scan_forward(bb), i);
        }
    }

    // Mirrors the kernel's one-step generalized shift.
    fn shift_one(tables: &StaticTables, bb: Bitboard, dir: usize) -> Bitboard {
        bb.rotate_left(tables.shift[dir].rem_euclid(64) as u32) & tables.avoid_wrap[dir]
    }

    #[test]
    fn generalized_shift_matches_square_steps() {
        let tables = StaticTables::get();
        let deltas: [(i8, i8); 8] = [(1, 1), (1, 0), (1, -1), (0, -1), (-1, -1), (-1, 0), (-1, 1), (0, 1)];
        for (dir, &(file_delta, rank_delta)) in deltas.iter().enumerate() {
            for square in Square::all() {
                let expected = square.offset(file_delta, rank_delta).map_or(0, Square::bitboard);
                assert_eq!(shift_one(tables, square.bitboard(), dir), expected, "dir {dir} from {square}");
            }
        }
    }
}
