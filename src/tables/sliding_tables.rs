//! Indexed sliding-piece attack tables.
//!
//! Each square owns a relevant-occupancy mask (its rays without the edge
//! squares) and an offset into one flat attack array. The attack set for an
//! occupancy is `attacks[offset + pext(occupancy & mask, mask)]`, so the
//! kernel needs no ray casting and no magic multipliers.

use crate::game_state::chess_types::{Bitboard, Square};

pub const ROOK_DIRECTIONS: [(i8, i8); 4] = [(0, 1), (1, 0), (0, -1), (-1, 0)];
pub const BISHOP_DIRECTIONS: [(i8, i8); 4] = [(1, 1), (1, -1), (-1, -1), (-1, 1)];

#[derive(Debug, Clone)]
pub struct SlidingTable {
    pub attack_index: [u32; 64],
    pub mask: [Bitboard; 64],
    pub attacks: Vec<Bitboard>,
}

impl SlidingTable {
    pub fn build(directions: &[(i8, i8)]) -> Self {
        let mut attack_index = [0u32; 64];
        let mut mask = [0u64; 64];
        let mut attacks = Vec::new();

        for square in Square::all() {
            let packed = square.to_packed() as usize;
            let relevant = relevant_mask(square, directions);
            let offset = attacks.len();
            attack_index[packed] = offset as u32;
            mask[packed] = relevant;
            attacks.resize(offset + (1usize << relevant.count_ones()), 0);

            // Carry-rippler walk over every subset of the relevant mask.
            let mut subset: Bitboard = 0;
            loop {
                attacks[offset + pext(subset, relevant) as usize] =
                    ray_attacks(square, directions, subset);
                subset = subset.wrapping_sub(relevant) & relevant;
                if subset == 0 {
                    break;
                }
            }
        }

        Self {
            attack_index,
            mask,
            attacks,
        }
    }

    #[inline]
    pub fn lookup(&self, packed: u8, occupancy: Bitboard) -> Bitboard {
        let packed = packed as usize & 63;
        let index = self.attack_index[packed] as usize + pext(occupancy, self.mask[packed]) as usize;
        self.attacks[index]
    }
}

/// Squares whose occupancy can change the attack set from `square`.
pub fn relevant_mask(square: Square, directions: &[(i8, i8)]) -> Bitboard {
    let mut mask = 0;
    for &(file_delta, rank_delta) in directions {
        let mut current = square;
        while let Some(next) = current.offset(file_delta, rank_delta) {
            if next.offset(file_delta, rank_delta).is_none() {
                break;
            }
            mask |= next.bitboard();
            current = next;
        }
    }
    mask
}

/// Attacks along `directions`, stopping at (and including) the first blocker.
pub fn ray_attacks(square: Square, directions: &[(i8, i8)], occupancy: Bitboard) -> Bitboard {
    let mut attacks = 0;
    for &(file_delta, rank_delta) in directions {
        let mut current = square;
        while let Some(next) = current.offset(file_delta, rank_delta) {
            attacks |= next.bitboard();
            if occupancy & next.bitboard() != 0 {
                break;
            }
            current = next;
        }
    }
    attacks
}

/// Software parallel bit extract.
#[inline]
pub fn pext(value: Bitboard, mask: Bitboard) -> u64 {
    let mut result = 0u64;
    let mut bit = 1u64;
    let mut remaining = mask;
    while remaining != 0 {
        let lowest = remaining & remaining.wrapping_neg();
        if value & lowest != 0 {
            result |= bit;
        }
        bit <<= 1;
        remaining &= remaining - 1;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    #[test]
    fn pext_packs_masked_bits_low() {
        assert_eq!(pext(0b1010_0000, 0b1110_0000), 0b101);
        assert_eq!(pext(u64::MAX, 0xF0F0), 0xFF);
        assert_eq!(pext(0, u64::MAX), 0);
    }

    #[test]
    fn rook_corner_mask_excludes_edges() {
        let a1 = Square::from_file_rank(0, 0).expect("a1");
        let mask = relevant_mask(a1, &ROOK_DIRECTIONS);
        assert_eq!(mask.count_ones(), 12);
        assert_eq!(mask & (1 << 7), 0);
        assert_eq!(mask & (1 << 56), 0);
    }

    #[test]
    fn table_lookup_matches_ray_casting_for_random_occupancies() {
        let rook = SlidingTable::build(&ROOK_DIRECTIONS);
        let bishop = SlidingTable::build(&BISHOP_DIRECTIONS);
        let mut rng = StdRng::seed_from_u64(0x5EED);

        for _ in 0..2_000 {
            let occupancy: Bitboard = rng.random::<u64>() & rng.random::<u64>();
            let square = Square::from_packed(rng.random_range(0..64u8)).expect("packed square");
            let packed = square.to_packed();
            assert_eq!(
                rook.lookup(packed, occupancy),
                ray_attacks(square, &ROOK_DIRECTIONS, occupancy)
            );
            assert_eq!(
                bishop.lookup(packed, occupancy),
                ray_attacks(square, &BISHOP_DIRECTIONS, occupancy)
            );
        }
    }
}
