use super::common::*;
use super::est_bits::*;

const GROUP_IDX: [u32; 32] = [
    0, 1, 2, 3, 4, 4, 5, 5, 6, 6, 6, 6, 7, 7, 7, 7, 8, 8, 8, 8, 8, 8, 8, 8, 9, 9, 9, 9, 9, 9, 9, 9,
];

const CTX_IND_MAP_4X4: [usize; 16] = [0, 1, 4, 5, 2, 3, 4, 5, 6, 6, 8, 8, 7, 7, 8, 8];

// [pattern][x in group][y in group]
const SIG_CTX_CNT: [[[usize; 4]; 4]; 4] = [
    [[2, 1, 1, 0], [1, 1, 0, 0], [1, 0, 0, 0], [0, 0, 0, 0]],
    [[2, 1, 0, 0], [2, 1, 0, 0], [2, 1, 0, 0], [2, 1, 0, 0]],
    [[2, 2, 2, 2], [1, 1, 1, 1], [0, 0, 0, 0], [0, 0, 0, 0]],
    [[2, 2, 2, 2], [2, 2, 2, 2], [2, 2, 2, 2], [2, 2, 2, 2]],
];

#[inline(always)]
fn neighbour_groups(sig_cg_flags: u64, cg_pos_x: usize, cg_pos_y: usize, log2_tr_size_cg: usize) -> (bool, bool) {
    let tr_size_cg = 1 << log2_tr_size_cg;
    let cg_blk_pos = (cg_pos_y << log2_tr_size_cg) + cg_pos_x;
    let right = cg_pos_x + 1 < tr_size_cg && (sig_cg_flags >> (cg_blk_pos + 1)) & 1 != 0;
    let lower = cg_pos_y + 1 < tr_size_cg && (sig_cg_flags >> (cg_blk_pos + tr_size_cg)) & 1 != 0;
    (right, lower)
}

/// Classifies a coding group by the significance of its right (1) and
/// lower (2) neighbours. Groups outside the block count as insignificant.
pub fn calc_pattern_sig_ctx(
    sig_cg_flags: u64,
    cg_pos_x: usize,
    cg_pos_y: usize,
    log2_tr_size_cg: usize,
) -> usize {
    if log2_tr_size_cg == 0 {
        return 0;
    }
    debug_assert!(log2_tr_size_cg <= 3);
    let (right, lower) = neighbour_groups(sig_cg_flags, cg_pos_x, cg_pos_y, log2_tr_size_cg);
    right as usize + 2 * lower as usize
}

/// Context increment of the significant coefficient flag at `blk_pos`.
pub fn get_sig_ctx_inc(
    pattern_sig_ctx: usize,
    log2_tr_size: usize,
    blk_pos: usize,
    is_luma: bool,
    first_significance_map_context: usize,
) -> usize {
    if blk_pos == 0 {
        return 0;
    }
    if log2_tr_size == 2 {
        return CTX_IND_MAP_4X4[blk_pos];
    }
    let pos_y = blk_pos >> log2_tr_size;
    let pos_x = blk_pos & ((1 << log2_tr_size) - 1);
    let cnt = SIG_CTX_CNT[pattern_sig_ctx][pos_x & 3][pos_y & 3];
    let offset = first_significance_map_context + cnt;
    if is_luma && (pos_x | pos_y) >= 4 {
        3 + offset
    } else {
        offset
    }
}

/// Context increment of the coded sub-block flag.
pub fn get_sig_coeff_group_ctx_inc(
    sig_cg_flags: u64,
    cg_pos_x: usize,
    cg_pos_y: usize,
    log2_tr_size_cg: usize,
) -> usize {
    let (right, lower) = neighbour_groups(sig_cg_flags, cg_pos_x, cg_pos_y, log2_tr_size_cg);
    (right || lower) as usize
}

#[inline(always)]
pub fn get_group_idx(pos: usize) -> u32 {
    GROUP_IDX[pos]
}

/// Cost of signalling (`pos_x`, `pos_y`) as the last significant coefficient:
/// the context coded prefixes plus the bypass coded suffixes.
pub fn get_rate_last(est_bits: &EstBits, pos_x: usize, pos_y: usize) -> u32 {
    let ctx_x = get_group_idx(pos_x);
    let ctx_y = get_group_idx(pos_y);
    let mut cost =
        (est_bits.last_x_bits[ctx_x as usize] + est_bits.last_y_bits[ctx_y as usize]) as u32;
    if pos_x > 2 {
        cost += IEP_RATE as u32 * ((ctx_x - 2) >> 1);
    }
    if pos_y > 2 {
        cost += IEP_RATE as u32 * ((ctx_y - 2) >> 1);
    }
    cost
}
