//! Host/kernel data layout.
//!
//! These structs must match the kernel's storage declarations exactly.
//! All tables are widened to 64-bit words and concatenated into one buffer;
//! `TableLayout` tells the kernel where each table starts.

use std::sync::OnceLock;

use bytemuck::{Pod, Zeroable};

use crate::errors::EngineError;
use crate::game_state::board::BOARD_CELLS;
use crate::game_state::chess_types::*;
use crate::moves::move_codec::Move;
use crate::tables::attack_tables::{StaticTables, PIECE_CODE_SLOTS};

pub const RESULT_MOVE_BYTES: usize = std::mem::size_of::<u32>();
pub const RESULT_COUNTER_BYTES: usize = std::mem::size_of::<u64>();
pub const BOARD_SNAPSHOT_BYTES: usize = BOARD_CELLS * std::mem::size_of::<u32>();

/// Per-dispatch parameters.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, Default, PartialEq, Eq)]
pub struct SearchParams {
    /// 0 = White, 1 = Black.
    pub side_to_move: u32,
    pub last_move: u32,
    pub max_depth: u32,
    pub max_memory_mb: u32,
    pub max_cores: u32,
    pub castling_rights: u32,
    pub ply: u32,
    pub _pad: u32,
}

impl SearchParams {
    pub fn side(&self) -> Color {
        if self.side_to_move == 0 {
            Color::Light
        } else {
            Color::Dark
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum TableId {
    SetMask = 0,
    ClearMask,
    AttackTables,
    PawnAttacks,
    FileMasks,
    RankMasks,
    AvoidWrap,
    Shift,
    BitTable,
    RookAttackIndex,
    RookMask,
    RookAttacks,
    BishopAttackIndex,
    BishopMask,
    BishopAttacks,
}

impl TableId {
    pub const COUNT: usize = 15;

    pub const ALL: [TableId; TableId::COUNT] = [
        TableId::SetMask,
        TableId::ClearMask,
        TableId::AttackTables,
        TableId::PawnAttacks,
        TableId::FileMasks,
        TableId::RankMasks,
        TableId::AvoidWrap,
        TableId::Shift,
        TableId::BitTable,
        TableId::RookAttackIndex,
        TableId::RookMask,
        TableId::RookAttacks,
        TableId::BishopAttackIndex,
        TableId::BishopMask,
        TableId::BishopAttacks,
    ];
}

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, Default, PartialEq, Eq)]
pub struct TableSection {
    /// Offset in 64-bit words from the start of the table buffer.
    pub offset: u32,
    pub len: u32,
}

/// Directory of the packed table buffer. The last entry is padding.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, Debug, Default, PartialEq, Eq)]
pub struct TableLayout {
    pub sections: [TableSection; 16],
}

impl TableLayout {
    #[inline]
    pub fn section(&self, id: TableId) -> TableSection {
        self.sections[id as usize]
    }

    pub fn total_words(&self) -> usize {
        self.sections
            .iter()
            .map(|section| section.offset as usize + section.len as usize)
            .max()
            .unwrap_or(0)
    }
}

/// Static tables flattened for upload.
#[derive(Debug, Clone)]
pub struct PackedTables {
    pub words: Vec<u64>,
    pub layout: TableLayout,
}

impl PackedTables {
    pub fn size_bytes(&self) -> u64 {
        (self.words.len() * std::mem::size_of::<u64>()) as u64
    }

    pub fn view(&self) -> TableView<'_> {
        TableView::new(&self.words, &self.layout)
    }
}

static PACKED: OnceLock<PackedTables> = OnceLock::new();

/// Process-wide packed copy of [`StaticTables::get`].
pub fn packed_tables() -> &'static PackedTables {
    PACKED.get_or_init(|| pack_tables(StaticTables::get()))
}

pub fn pack_tables(tables: &StaticTables) -> PackedTables {
    let mut words = Vec::new();
    let mut layout = TableLayout::default();

    let mut push = |id: TableId, values: &mut dyn Iterator<Item = u64>| {
        let offset = words.len();
        words.extend(values);
        layout.sections[id as usize] = TableSection {
            offset: offset as u32,
            len: (words.len() - offset) as u32,
        };
    };

    push(TableId::SetMask, &mut tables.set_mask.iter().copied());
    push(TableId::ClearMask, &mut tables.clear_mask.iter().copied());
    push(TableId::AttackTables, &mut tables.attack_tables.iter().flatten().copied());
    push(TableId::PawnAttacks, &mut tables.pawn_attacks.iter().flatten().copied());
    push(TableId::FileMasks, &mut tables.file_masks.iter().copied());
    push(TableId::RankMasks, &mut tables.rank_masks.iter().copied());
    push(TableId::AvoidWrap, &mut tables.avoid_wrap.iter().copied());
    push(TableId::Shift, &mut tables.shift.iter().map(|&s| s as i64 as u64));
    push(TableId::BitTable, &mut tables.bit_table.iter().map(|&b| u64::from(b)));
    push(TableId::RookAttackIndex, &mut tables.rook.attack_index.iter().map(|&i| u64::from(i)));
    push(TableId::RookMask, &mut tables.rook.mask.iter().copied());
    push(TableId::RookAttacks, &mut tables.rook.attacks.iter().copied());
    push(TableId::BishopAttackIndex, &mut tables.bishop.attack_index.iter().map(|&i| u64::from(i)));
    push(TableId::BishopMask, &mut tables.bishop.mask.iter().copied());
    push(TableId::BishopAttacks, &mut tables.bishop.attacks.iter().copied());

    PackedTables { words, layout }
}

/// Read access to an uploaded table buffer, the way the kernel addresses it.
#[derive(Debug, Clone, Copy)]
pub struct TableView<'a> {
    words: &'a [u64],
    layout: &'a TableLayout,
}

impl<'a> TableView<'a> {
    pub fn new(words: &'a [u64], layout: &'a TableLayout) -> Self {
        Self { words, layout }
    }

    /// Checks every section lies inside the word buffer.
    pub fn validate(&self) -> Result<(), String> {
        for id in TableId::ALL {
            let section = self.layout.section(id);
            let end = section.offset as usize + section.len as usize;
            if end > self.words.len() {
                return Err(format!("table {id:?} ends at word {end}, buffer holds {}", self.words.len()));
            }
        }
        Ok(())
    }

    #[inline]
    fn word(&self, id: TableId, index: usize) -> u64 {
        let section = self.layout.section(id);
        self.words[section.offset as usize + index]
    }

    #[inline]
    pub fn set_mask(&self, packed: usize) -> Bitboard {
        self.word(TableId::SetMask, packed)
    }

    #[inline]
    pub fn clear_mask(&self, packed: usize) -> Bitboard {
        self.word(TableId::ClearMask, packed)
    }

    /// Empty-board attacks by piece type code.
    #[inline]
    pub fn attacks(&self, code: u8, packed: usize) -> Bitboard {
        self.word(TableId::AttackTables, (code as usize % PIECE_CODE_SLOTS) * 64 + packed)
    }

    #[inline]
    pub fn pawn_attacks(&self, color: Color, packed: usize) -> Bitboard {
        self.word(TableId::PawnAttacks, color.index() * 64 + packed)
    }

    #[inline]
    pub fn rank_mask(&self, rank: usize) -> Bitboard {
        self.word(TableId::RankMasks, rank)
    }

    pub fn rook_attacks(&self, packed: usize, occupancy: Bitboard) -> Bitboard {
        self.sliding(TableId::RookAttackIndex, TableId::RookMask, TableId::RookAttacks, packed, occupancy)
    }

    pub fn bishop_attacks(&self, packed: usize, occupancy: Bitboard) -> Bitboard {
        self.sliding(
            TableId::BishopAttackIndex,
            TableId::BishopMask,
            TableId::BishopAttacks,
            packed,
            occupancy,
        )
    }

    fn sliding(&self, index: TableId, mask: TableId, attacks: TableId, packed: usize, occupancy: Bitboard) -> Bitboard {
        let offset = self.word(index, packed) as usize;
        let mask = self.word(mask, packed);
        self.word(attacks, offset + crate::tables::sliding_tables::pext(occupancy, mask) as usize)
    }

    /// De Bruijn scan through the uploaded table; `bb` must be non-zero.
    #[inline]
    pub fn bit_scan_forward(&self, bb: Bitboard) -> usize {
        let isolated = bb & bb.wrapping_neg();
        let slot = isolated.wrapping_mul(crate::tables::attack_tables::DE_BRUIJN_64) >> 58;
        self.word(TableId::BitTable, slot as usize) as usize
    }
}

/// Board snapshot as the kernel reads it: one piece code per padded cell.
pub fn board_snapshot(board: &Board) -> [u32; BOARD_CELLS] {
    let mut snapshot = [0u32; BOARD_CELLS];
    for (cell, piece) in snapshot.iter_mut().zip(board.cells().iter()) {
        *cell = u32::from(piece.code());
    }
    snapshot
}

/// Result slots read back after a launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KernelResults {
    pub best_move: Move,
    pub nodes: u64,
    pub moves: u64,
}

impl KernelResults {
    pub fn decode(best_move: &[u8], nodes: &[u8], moves: &[u8]) -> Result<Self, EngineError> {
        let read_u32 = |bytes: &[u8]| {
            bytemuck::try_pod_read_unaligned::<u32>(bytes)
                .map_err(|err| EngineError::DispatchFailure(format!("best move slot: {err}")))
        };
        let read_u64 = |bytes: &[u8], slot: &str| {
            bytemuck::try_pod_read_unaligned::<u64>(bytes)
                .map_err(|err| EngineError::DispatchFailure(format!("{slot} slot: {err}")))
        };

        Ok(Self {
            best_move: Move::from_bits(read_u32(best_move)?),
            nodes: read_u64(nodes, "node count")?,
            moves: read_u64(moves, "move count")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::attack_tables::{BISHOP_ATTACK_ENTRIES, ROOK_ATTACK_ENTRIES};

    #[test]
    fn layout_sections_are_contiguous() {
        let packed = pack_tables(StaticTables::get());
        let mut expected_offset = 0;
        for id in TableId::ALL {
            let section = packed.layout.section(id);
            assert_eq!(section.offset, expected_offset, "{id:?}");
            expected_offset += section.len;
        }
        assert_eq!(packed.layout.total_words(), packed.words.len());
        assert_eq!(packed.layout.section(TableId::RookAttacks).len as usize, ROOK_ATTACK_ENTRIES);
        assert_eq!(packed.layout.section(TableId::BishopAttacks).len as usize, BISHOP_ATTACK_ENTRIES);
        assert_eq!(packed.layout.section(TableId::AttackTables).len, 8 * 64);
        assert_eq!(std::mem::size_of::<TableLayout>(), 128);
    }

    #[test]
    fn table_view_reads_what_was_packed() {
        let tables = StaticTables::get();
        let packed = pack_tables(tables);
        let view = packed.view();
        view.validate().expect("layout should fit the buffer");

        let occupancy = 0x0000_1800_2400_0081u64;
        for square in Square::all() {
            let p = square.to_packed() as usize;
            assert_eq!(view.set_mask(p), tables.set_mask[p]);
            assert_eq!(view.rook_attacks(p, occupancy), tables.rook_attacks(p as u8, occupancy));
            assert_eq!(view.bishop_attacks(p, occupancy), tables.bishop_attacks(p as u8, occupancy));
            assert_eq!(view.pawn_attacks(Color::Dark, p), tables.pawn_attacks[1][p]);
            assert_eq!(view.bit_scan_forward(square.bitboard()), p);
        }
        assert_eq!(view.word(TableId::Shift, 2) as i64, -7);
    }

    #[test]
    fn truncated_buffer_fails_validation() {
        let packed = pack_tables(StaticTables::get());
        let short = &packed.words[..packed.words.len() - 1];
        assert!(TableView::new(short, &packed.layout).validate().is_err());
    }

    #[test]
    fn snapshot_uses_padded_cells_and_piece_codes() {
        let game = GameState::new_game();
        let snapshot = board_snapshot(&game.board);
        assert_eq!(snapshot[0x00], 6);
        assert_eq!(snapshot[0x04], 4);
        assert_eq!(snapshot[0x74], 0xC);
        assert_eq!(snapshot[0x08], 0);
        assert_eq!(snapshot[BOARD_CELLS - 1], 0);
        assert_eq!(bytemuck::cast_slice::<u32, u8>(&snapshot).len(), BOARD_SNAPSHOT_BYTES);
    }

    #[test]
    fn results_decode_from_little_endian_slots() {
        let mv = Move::encode(0x14, 0x34, 0, 0);
        let results = KernelResults::decode(
            &mv.bits().to_le_bytes(),
            &1000u64.to_le_bytes(),
            &20u64.to_le_bytes(),
        )
        .expect("slots should decode");
        assert_eq!(results.best_move, mv);
        assert_eq!(results.nodes, 1000);
        assert_eq!(results.moves, 20);

        let err = KernelResults::decode(&[0u8; 2], &[0u8; 8], &[0u8; 8]).expect_err("short slot");
        assert!(matches!(err, EngineError::DispatchFailure(_)));
    }

    #[test]
    fn params_are_eight_words() {
        assert_eq!(std::mem::size_of::<SearchParams>(), 32);
        let params = SearchParams {
            side_to_move: 1,
            ..SearchParams::default()
        };
        assert_eq!(params.side(), Color::Dark);
    }
}
