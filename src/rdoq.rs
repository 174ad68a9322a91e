use super::coeff_context::*;
use super::common::*;
use super::est_bits::*;
use super::forward_quant::*;
use super::scaling_list::INV_QUANT_SCALES;
use super::scan::*;
use super::sign_hiding::*;
use debug_print::debug_eprintln;

const GO_RICE_RANGE: [u32; 5] = [7, 14, 26, 46, 78];

/// Bins of the context coded prefix before the escape code takes over.
const MAX_PREFIX_BINS: u32 = 8;

#[inline(always)]
fn floor_log2(v: u32) -> u32 {
    debug_assert!(v != 0);
    31 - v.leading_zeros()
}

/// Rate of coding `abs_level` given the level already implied by the
/// greater-than-one/two flags (`diff_level = abs_level - base_level`).
/// Used for the level decision, where the escape code is approximated.
pub fn get_ic_rate_cost(
    abs_level: u32,
    diff_level: i32,
    greater_one_bits: &[i32; 2],
    level_abs_bits: &[i32; 2],
    abs_go_rice: u32,
    c1c2_idx: u32,
) -> u32 {
    debug_assert!(abs_level != 0);
    if diff_level < 0 {
        debug_assert!(abs_level == 1 || abs_level == 2);
        let mut rate = greater_one_bits[(abs_level == 2) as usize] as u32;
        if abs_level == 2 {
            rate += level_abs_bits[0] as u32;
        }
        return rate;
    }
    let symbol = diff_level as u32;
    let mut rate = if (symbol >> abs_go_rice) < COEF_REMAIN_BIN_REDUCTION {
        let length = symbol >> abs_go_rice;
        (length + 1 + abs_go_rice) << 15
    } else {
        let symbol = (symbol >> abs_go_rice) - COEF_REMAIN_BIN_REDUCTION;
        let length = if symbol != 0 { floor_log2(symbol + 1) } else { 0 };
        (COEF_REMAIN_BIN_REDUCTION + length + abs_go_rice + 1 + length) << 15
    };
    if c1c2_idx & 1 != 0 {
        rate += greater_one_bits[1] as u32;
    }
    if c1c2_idx == 3 {
        rate += level_abs_bits[1] as u32;
    }
    rate
}

/// Exact rate of coding `abs_level`, used for the sign hiding rate deltas.
pub fn get_ic_rate(
    abs_level: u32,
    diff_level: i32,
    greater_one_bits: &[i32; 2],
    level_abs_bits: &[i32; 2],
    abs_go_rice: u32,
    c1c2_idx: u32,
) -> i32 {
    debug_assert!(c1c2_idx <= 3);
    debug_assert!(abs_go_rice <= 4);
    if abs_level == 0 {
        debug_assert!(diff_level < 0);
        return 0;
    }
    let mut rate = 0;
    if diff_level < 0 {
        debug_assert!(abs_level <= 2);
        rate += greater_one_bits[(abs_level == 2) as usize];
        if abs_level == 2 {
            rate += level_abs_bits[0];
        }
        return rate;
    }
    let mut symbol = diff_level as u32;
    let max_vlc = GO_RICE_RANGE[abs_go_rice as usize];
    if symbol > max_vlc {
        let egs = floor_log2(symbol - max_vlc) * 2 + 1;
        rate += (egs << 15) as i32;
        symbol = max_vlc + 1;
    }
    let pref_len = (symbol >> abs_go_rice) + 1;
    let num_bins = (pref_len + abs_go_rice).min(MAX_PREFIX_BINS);
    rate += (num_bins << 15) as i32;
    if c1c2_idx & 1 != 0 {
        rate += greater_one_bits[1];
    }
    if c1c2_idx == 3 {
        rate += level_abs_bits[1];
    }
    rate
}

/// Mirror of the entropy coder's greater-than-one/two context selection and
/// Rice parameter adaptation, walked backwards over one block.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LevelContextState {
    pub ctx_set: usize,
    pub c1: usize,
    pub c2: usize,
    pub go_rice_param: u32,
    pub c1_idx: usize,
    pub c2_idx: usize,
}

impl Default for LevelContextState {
    fn default() -> Self {
        LevelContextState {
            ctx_set: 0,
            c1: 1,
            c2: 0,
            go_rice_param: 0,
            c1_idx: 0,
            c2_idx: 0,
        }
    }
}

impl LevelContextState {
    /// Context set of the group holding the last significant coefficient.
    pub fn start_at_last(&mut self, scan_pos: usize, is_luma: bool) {
        self.ctx_set = if scan_pos < SCAN_SET_SIZE || !is_luma { 0 } else { 2 };
    }

    #[inline(always)]
    pub fn c1c2_idx(&self) -> u32 {
        (self.c1_idx < C1FLAG_NUMBER) as u32 + 2 * (self.c2_idx == 0) as u32
    }

    /// Smallest level that still needs a remainder: 1 once all greater-than
    /// flags are spent, otherwise 2 or 3.
    #[inline(always)]
    pub fn base_level(&self) -> u32 {
        [1, 2, 1, 3][self.c1c2_idx() as usize]
    }

    #[inline(always)]
    pub fn one_ctx(&self) -> usize {
        4 * self.ctx_set + self.c1
    }

    #[inline(always)]
    pub fn abs_ctx(&self) -> usize {
        self.ctx_set + self.c2
    }

    pub fn update(&mut self, level: u32) {
        if level >= self.base_level() && self.go_rice_param < 4 && level > (3 << self.go_rice_param) {
            self.go_rice_param += 1;
        }
        if level > 0 {
            self.c1_idx += 1;
        }
        if level > 1 {
            self.c1 = 0;
            self.c2 = (self.c2 + 1).min(2);
            self.c2_idx += 1;
        } else if self.c1 > 0 && self.c1 < 3 && level > 0 {
            self.c1 += 1;
        }
    }

    /// Called on leaving the group that starts at `scan_pos`.
    pub fn next_set(&mut self, scan_pos: usize, is_luma: bool) {
        self.c2 = 0;
        self.go_rice_param = 0;
        self.c1_idx = 0;
        self.c2_idx = 0;
        self.ctx_set = if scan_pos == SCAN_SET_SIZE || !is_luma { 0 } else { 2 };
        if self.c1 == 0 {
            self.ctx_set += 1;
        }
        self.c1 = 1;
    }
}

#[derive(Clone, Copy, Default, Debug)]
struct CoeffGroupRdStats {
    nnz_before_pos0: usize,
    coded_level_and_dist: f64,
    uncoded_dist: f64,
    sig_cost: f64,
    sig_cost0: f64,
}

/// Working arrays of one RDO call. Owned by a single quantizer so that
/// concurrent blocks never share them.
pub struct RdoqScratch {
    cost_coeff: Vec<f64>,
    cost_uncoded: Vec<f64>,
    cost_sig: Vec<f64>,
    rate_inc_up: Vec<i32>,
    rate_inc_down: Vec<i32>,
    sig_rate_delta: Vec<i32>,
    delta_u: Vec<i32>,
    scaled_coeff: Vec<i64>,
    cost_coeff_group_sig: [f64; MLS_GRP_NUM],
    /// Coded sub-block flags after the group decisions of the last call.
    pub(crate) sig_coeff_group_flags: u64,
}

impl RdoqScratch {
    pub fn new() -> RdoqScratch {
        RdoqScratch {
            cost_coeff: vec![0.0; MAX_TR_COEFFS],
            cost_uncoded: vec![0.0; MAX_TR_COEFFS],
            cost_sig: vec![0.0; MAX_TR_COEFFS],
            rate_inc_up: vec![0; MAX_TR_COEFFS],
            rate_inc_down: vec![0; MAX_TR_COEFFS],
            sig_rate_delta: vec![0; MAX_TR_COEFFS],
            delta_u: vec![0; MAX_TR_COEFFS],
            scaled_coeff: vec![0; MAX_TR_COEFFS],
            cost_coeff_group_sig: [0.0; MLS_GRP_NUM],
            sig_coeff_group_flags: 0,
        }
    }
}

impl Default for RdoqScratch {
    fn default() -> Self {
        RdoqScratch::new()
    }
}

pub struct RdoqParams<'a> {
    pub tu: &'a TransformUnit,
    pub coding: &'a TuCodingParams,
    pub qp: QpParam,
    pub bit_depth: usize,
    pub lambda: f64,
    pub quant_coef: &'a [i32],
    pub unquant_scale: &'a [i32],
    pub est_bits: &'a EstBits,
    /// Psy-rdoq strength with 8 fractional bits, 0 when disabled.
    pub psy_scale: u64,
}

/// Psychovisual bias of a coefficient, in the same units as the distortion.
#[inline(always)]
fn psy_cost(psy_scale: u64, coef: i64, scale_bits: i32) -> f64 {
    ((((psy_scale as i64) * coef) << scale_bits) >> 8) as i32 as f64
}

/// Rate-distortion optimized quantization of `resi_dct` into `dst`.
///
/// `fenc_dct` holds the transform of the source block and is only read when
/// psy-rdoq applies (luma, no transform skip, non-zero strength). Returns the
/// number of non-zero levels.
pub fn rdo_quant(
    p: &RdoqParams,
    resi_dct: &[Coeff],
    fenc_dct: &[Coeff],
    dst: &mut [Coeff],
    s: &mut RdoqScratch,
) -> u32 {
    let tu = p.tu;
    let coding = p.coding;
    let est = p.est_bits;
    let log2_tr_size = tu.log2_tr_size;
    let num_coeff = tu.num_coeff();
    let transform_shift = transform_shift(p.bit_depth, log2_tr_size);
    let per = p.qp.per;
    let qbits = QUANT_SHIFT + per + transform_shift;
    let add = 1i64 << (qbits - 1);

    s.sig_coeff_group_flags = 0;
    let num_sig = nquant(
        &resi_dct[..num_coeff],
        p.quant_coef,
        &mut s.scaled_coeff[..num_coeff],
        &mut dst[..num_coeff],
        qbits,
        add,
    );
    debug_assert_eq!(num_sig, count_nonzero(&dst[..num_coeff]));
    if num_sig == 0 {
        return 0;
    }

    // dequant coefficients carry a 1 << 4 scale, which can exceed the qp
    // shift; pre-shift the level in that case
    let mut unquant_shift = QUANT_IQUANT_SHIFT - QUANT_SHIFT - transform_shift + 4;
    let (unquant_round, unquant_preshift) = if unquant_shift > per {
        (1i64 << (unquant_shift - per - 1), 0)
    } else {
        unquant_shift += 4;
        (0, 4)
    };
    let scale_bits = SCALE_BITS - 2 * transform_shift;
    let lambda2 = p.lambda;
    let is_luma = tu.ttype.is_luma();
    let use_psy = p.psy_scale != 0 && is_luma && !tu.transform_skip;

    let mut total_uncoded_cost = 0.0;
    let mut total_rd_cost = 0.0;
    let mut sig_cg_flags = 0u64;
    let mut ctx = LevelContextState::default();
    let mut cg_last_scan_pos = None;
    let mut last_scan_pos = None;

    for cg_scan_pos in (0..coding.num_cg()).rev() {
        let cg_blk_pos = coding.scan_cg[cg_scan_pos] as usize;
        let cg_pos_y = cg_blk_pos >> coding.log2_tr_size_cg;
        let cg_pos_x = cg_blk_pos - (cg_pos_y << coding.log2_tr_size_cg);
        let cg_blk_pos_mask = 1u64 << cg_blk_pos;
        let mut stats = CoeffGroupRdStats::default();

        let pattern_sig_ctx =
            calc_pattern_sig_ctx(sig_cg_flags, cg_pos_x, cg_pos_y, coding.log2_tr_size_cg);

        for scan_pos_in_cg in (0..SCAN_SET_SIZE).rev() {
            let scan_pos = (cg_scan_pos << LOG2_SCAN_SET_SIZE) + scan_pos_in_cg;
            let blk_pos = coding.scan[scan_pos] as usize;
            let max_abs_level = dst[blk_pos] as u32;
            let sign_coef = resi_dct[blk_pos];
            let predicted_coef = if use_psy {
                fenc_dct[blk_pos] - sign_coef
            } else {
                0
            };

            // distortion is in the FIX15 scale of the bit costs, less the
            // forward transform scale
            s.cost_uncoded[scan_pos] =
                (((sign_coef as i64 * sign_coef as i64) as u64) << scale_bits) as f64;
            if use_psy && blk_pos != 0 {
                // nothing coded: the reconstruction is the prediction
                s.cost_uncoded[scan_pos] -= psy_cost(p.psy_scale, predicted_coef as i64, scale_bits);
            }
            total_uncoded_cost += s.cost_uncoded[scan_pos];

            if max_abs_level != 0 && last_scan_pos.is_none() {
                last_scan_pos = Some(scan_pos);
                ctx.start_at_last(scan_pos, is_luma);
                cg_last_scan_pos = Some(cg_scan_pos);
            }

            match last_scan_pos {
                None => {
                    // zeros past the last position cost only their distortion
                    s.cost_coeff[scan_pos] = 0.0;
                    total_rd_cost += s.cost_uncoded[scan_pos];
                    s.cost_sig[scan_pos] = 0.0;
                }
                Some(last) => {
                    let c1c2_idx = ctx.c1c2_idx();
                    let base_level = ctx.base_level();
                    let greater_one_bits = &est.greater_one_bits[ctx.one_ctx()];
                    let level_abs_bits = &est.level_abs_bits[ctx.abs_ctx()];

                    let mut level = 0u32;
                    let mut sig_coef_bits = 0;
                    s.cost_coeff[scan_pos] = f64::MAX;

                    if scan_pos == last {
                        s.sig_rate_delta[blk_pos] = 0;
                    } else {
                        let ctx_sig = get_sig_ctx_inc(
                            pattern_sig_ctx,
                            log2_tr_size,
                            blk_pos,
                            is_luma,
                            coding.first_significance_map_context,
                        );
                        debug_assert!(ctx_sig < NUM_SIG_FLAG_CTX);
                        let sig_bits = &est.significant_bits[ctx_sig];
                        if max_abs_level < 3 {
                            s.cost_sig[scan_pos] = lambda2 * sig_bits[0] as f64;
                            s.cost_coeff[scan_pos] = s.cost_uncoded[scan_pos] + s.cost_sig[scan_pos];
                        }
                        s.sig_rate_delta[blk_pos] = sig_bits[1] - sig_bits[0];
                        sig_coef_bits = sig_bits[1];
                    }

                    if max_abs_level != 0 {
                        let min_abs_level = (max_abs_level - 1).max(1);
                        for lvl in (min_abs_level..=max_abs_level).rev() {
                            let level_bits = get_ic_rate_cost(
                                lvl,
                                lvl as i32 - base_level as i32,
                                greater_one_bits,
                                level_abs_bits,
                                ctx.go_rice_param,
                                c1c2_idx,
                            ) + IEP_RATE as u32;
                            let unquant_abs_level = (((lvl as i64) << unquant_preshift)
                                * ((p.unquant_scale[blk_pos] as i64) << per)
                                + unquant_round)
                                >> unquant_shift;
                            let d = unquant_abs_level - sign_coef.abs() as i64;
                            let distortion = ((d * d) as u64) << scale_bits;
                            let mut cur_cost = distortion as f64
                                + lambda2 * (sig_coef_bits as f64 + level_bits as f64);

                            // favour reconstructions that keep AC energy
                            if use_psy && blk_pos != 0 {
                                let signed_pred = if sign_coef < 0 {
                                    -predicted_coef
                                } else {
                                    predicted_coef
                                };
                                let recon_coef = (unquant_abs_level + signed_pred as i64).abs();
                                cur_cost -= psy_cost(p.psy_scale, recon_coef, scale_bits);
                            }

                            if cur_cost < s.cost_coeff[scan_pos] {
                                level = lvl;
                                s.cost_coeff[scan_pos] = cur_cost;
                                s.cost_sig[scan_pos] = lambda2 * sig_coef_bits as f64;
                            }
                        }
                    }

                    s.delta_u[blk_pos] =
                        ((s.scaled_coeff[blk_pos] - ((level as i64) << qbits)) >> (qbits - 8)) as i32;
                    dst[blk_pos] = level as Coeff;
                    total_rd_cost += s.cost_coeff[scan_pos];

                    if level != 0 {
                        let rate = |l: u32| {
                            get_ic_rate(
                                l,
                                l as i32 - base_level as i32,
                                greater_one_bits,
                                level_abs_bits,
                                ctx.go_rice_param,
                                c1c2_idx,
                            )
                        };
                        let rate_now = rate(level);
                        s.rate_inc_up[blk_pos] = rate(level + 1) - rate_now;
                        s.rate_inc_down[blk_pos] = rate(level - 1) - rate_now;
                    } else {
                        s.rate_inc_up[blk_pos] = greater_one_bits[0];
                        s.rate_inc_down[blk_pos] = 0;
                    }

                    ctx.update(level);
                    if scan_pos % SCAN_SET_SIZE == 0 && scan_pos != 0 {
                        ctx.next_set(scan_pos, is_luma);
                    }
                }
            }

            stats.sig_cost += s.cost_sig[scan_pos];
            if scan_pos_in_cg == 0 {
                stats.sig_cost0 = s.cost_sig[scan_pos];
            }
            if dst[blk_pos] != 0 {
                sig_cg_flags |= cg_blk_pos_mask;
                stats.coded_level_and_dist += s.cost_coeff[scan_pos] - s.cost_sig[scan_pos];
                stats.uncoded_dist += s.cost_uncoded[scan_pos];
                stats.nnz_before_pos0 += scan_pos_in_cg;
            }
        }

        let cg_last = match cg_last_scan_pos {
            Some(cg_last) => cg_last,
            None => continue,
        };
        s.cost_coeff_group_sig[cg_scan_pos] = 0.0;
        if cg_scan_pos == 0 {
            // the DC group is always coded
            sig_cg_flags |= cg_blk_pos_mask;
        } else if sig_cg_flags & cg_blk_pos_mask == 0 {
            let ctx_sig =
                get_sig_coeff_group_ctx_inc(sig_cg_flags, cg_pos_x, cg_pos_y, coding.log2_tr_size_cg);
            s.cost_coeff_group_sig[cg_scan_pos] =
                lambda2 * est.significant_coeff_group_bits[ctx_sig][0] as f64;
            total_rd_cost += s.cost_coeff_group_sig[cg_scan_pos];
            total_rd_cost -= stats.sig_cost;
        } else if cg_scan_pos < cg_last {
            // the group of the last coefficient is settled by the last position search
            let sig_ctx =
                get_sig_coeff_group_ctx_inc(sig_cg_flags, cg_pos_x, cg_pos_y, coding.log2_tr_size_cg);
            let cg_sig_bits = &est.significant_coeff_group_bits[sig_ctx];

            if stats.nnz_before_pos0 == 0 {
                // only the first coefficient is coded: its flag is implied
                total_rd_cost -= stats.sig_cost0;
                stats.sig_cost -= stats.sig_cost0;
            }

            let mut cost_zero_cg = total_rd_cost + lambda2 * cg_sig_bits[0] as f64;
            cost_zero_cg += stats.uncoded_dist;
            cost_zero_cg -= stats.coded_level_and_dist;
            cost_zero_cg -= stats.sig_cost;

            s.cost_coeff_group_sig[cg_scan_pos] = lambda2 * cg_sig_bits[1] as f64;
            total_rd_cost += s.cost_coeff_group_sig[cg_scan_pos];

            if cost_zero_cg < total_rd_cost {
                debug_eprintln!(
                    "rdoq: zero group {} ({} < {})",
                    cg_blk_pos,
                    cost_zero_cg,
                    total_rd_cost
                );
                sig_cg_flags &= !cg_blk_pos_mask;
                total_rd_cost = cost_zero_cg;
                s.cost_coeff_group_sig[cg_scan_pos] = lambda2 * cg_sig_bits[0] as f64;
                for scan_pos_in_cg in (0..SCAN_SET_SIZE).rev() {
                    let scan_pos = (cg_scan_pos << LOG2_SCAN_SET_SIZE) + scan_pos_in_cg;
                    let blk_pos = coding.scan[scan_pos] as usize;
                    if dst[blk_pos] != 0 {
                        s.cost_coeff[scan_pos] = s.cost_uncoded[scan_pos];
                        s.cost_sig[scan_pos] = 0.0;
                    }
                    dst[blk_pos] = 0;
                }
            }
        }
    }
    s.sig_coeff_group_flags = sig_cg_flags;

    let (last_scan_pos, cg_last_scan_pos) = match (last_scan_pos, cg_last_scan_pos) {
        (Some(last), Some(cg_last)) => (last, cg_last),
        _ => return 0,
    };

    // cost of signalling the whole block as not coded
    let mut best_cost = if tu.uses_root_cbf() {
        total_rd_cost += lambda2 * est.block_root_cbp_bits[1] as f64;
        total_uncoded_cost + lambda2 * est.block_root_cbp_bits[0] as f64
    } else {
        let ctx = tu.cbf_ctx();
        debug_assert!(ctx < NUM_QT_CBF_CTX);
        total_rd_cost += lambda2 * est.block_cbp_bits[ctx][1] as f64;
        total_uncoded_cost + lambda2 * est.block_cbp_bits[ctx][0] as f64
    };

    let mut best_last_idx = 0;
    'search: for cg_scan_pos in (0..=cg_last_scan_pos).rev() {
        let cg_blk_pos = coding.scan_cg[cg_scan_pos] as usize;
        total_rd_cost -= s.cost_coeff_group_sig[cg_scan_pos];
        if sig_cg_flags & (1u64 << cg_blk_pos) == 0 {
            continue;
        }
        for scan_pos_in_cg in (0..SCAN_SET_SIZE).rev() {
            let scan_pos = (cg_scan_pos << LOG2_SCAN_SET_SIZE) + scan_pos_in_cg;
            if scan_pos > last_scan_pos {
                continue;
            }
            let blk_pos = coding.scan[scan_pos] as usize;
            if dst[blk_pos] != 0 {
                let pos_y = blk_pos >> log2_tr_size;
                let pos_x = blk_pos - (pos_y << log2_tr_size);
                let bits_last = if coding.scan_type == ScanType::Ver {
                    get_rate_last(est, pos_y, pos_x)
                } else {
                    get_rate_last(est, pos_x, pos_y)
                };
                let rd_cost_last = total_rd_cost + lambda2 * bits_last as f64 - s.cost_sig[scan_pos];
                if rd_cost_last < best_cost {
                    best_last_idx = scan_pos + 1;
                    best_cost = rd_cost_last;
                }
                if dst[blk_pos] > 1 {
                    break 'search;
                }
                total_rd_cost -= s.cost_coeff[scan_pos];
                total_rd_cost += s.cost_uncoded[scan_pos];
            } else {
                total_rd_cost -= s.cost_sig[scan_pos];
            }
        }
    }
    debug_eprintln!("rdoq: last {} -> {}", last_scan_pos + 1, best_last_idx);

    let mut num_sig = 0;
    for &blk_pos in &coding.scan[..best_last_idx] {
        let blk_pos = blk_pos as usize;
        if dst[blk_pos] != 0 {
            num_sig += 1;
        }
        if resi_dct[blk_pos] < 0 {
            dst[blk_pos] = -dst[blk_pos];
        }
    }
    for &blk_pos in &coding.scan[best_last_idx..=last_scan_pos] {
        dst[blk_pos as usize] = 0;
    }

    if tu.sign_hide && num_sig >= 2 {
        let inv_quant = (INV_QUANT_SCALES[p.qp.rem] as i64) << per;
        let rd_factor = ((inv_quant * inv_quant) as f64 / (lambda2 * 16.0) + 0.5) as i64;
        let costs = RdoSignCosts {
            delta_u: &s.delta_u,
            rate_inc_up: &s.rate_inc_up,
            rate_inc_down: &s.rate_inc_down,
            sig_rate_delta: &s.sig_rate_delta,
            rd_factor,
        };
        num_sig = sign_bit_hiding_rdo(dst, resi_dct, num_sig, coding, cg_last_scan_pos, &costs);
    }
    num_sig
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaling_list::*;
    use rand::{prelude::StdRng, Rng, SeedableRng};

    struct Setup {
        tu: TransformUnit,
        coding: TuCodingParams,
        qp: QpParam,
        est: EstBits,
        sl: ScalingList,
    }

    impl Setup {
        fn new(log2_tr_size: usize, qp: i32) -> Setup {
            let mut tu = TransformUnit::new(log2_tr_size, TextType::Luma);
            tu.sign_hide = false;
            Setup {
                coding: TuCodingParams::new(log2_tr_size, tu.scan_type, true),
                tu,
                qp: QpParam::new(qp),
                est: EstBits::uniform(),
                sl: ScalingList::flat(),
            }
        }

        fn run(&self, lambda: f64, resi: &[Coeff], dst: &mut [Coeff], s: &mut RdoqScratch) -> u32 {
            let list = self.tu.scaling_list_type();
            let log2 = self.tu.log2_tr_size;
            let p = RdoqParams {
                tu: &self.tu,
                coding: &self.coding,
                qp: self.qp,
                bit_depth: 8,
                lambda,
                quant_coef: self.sl.quant_coef(log2, list, self.qp.rem),
                unquant_scale: self.sl.dequant_coef(log2, list, self.qp.rem),
                est_bits: &self.est,
                psy_scale: 0,
            };
            rdo_quant(&p, resi, resi, dst, s)
        }
    }

    fn random_block(rng: &mut StdRng, num_coeff: usize, range: i32) -> Vec<Coeff> {
        (0..num_coeff)
            .map(|i| {
                // energy concentrated at low frequencies
                let r = range / (1 + (i as i32 & 31) + (i as i32 >> 5));
                rng.gen_range(-r..=r)
            })
            .collect()
    }

    #[test]
    fn rate_of_small_levels() {
        let g = [1000, 2000];
        let l = [300, 400];
        assert_eq!(get_ic_rate_cost(1, -2, &g, &l, 0, 3), 1000);
        assert_eq!(get_ic_rate_cost(2, -1, &g, &l, 0, 3), 2000 + 300);
        assert_eq!(get_ic_rate(1, -2, &g, &l, 0, 3), 1000);
        assert_eq!(get_ic_rate(2, -1, &g, &l, 0, 3), 2000 + 300);
        assert_eq!(get_ic_rate(0, -3, &g, &l, 0, 3), 0);
    }

    #[test]
    fn rate_of_remainders() {
        let g = [1000, 2000];
        let l = [300, 400];
        // prefix 5 with no rice bits: escape after 3 bins, one extra bit pair
        assert_eq!(get_ic_rate_cost(8, 5, &g, &l, 0, 3), (6 << 15) + 2000 + 400);
        assert_eq!(get_ic_rate(8, 5, &g, &l, 0, 3), (6 << 15) + 2000 + 400);
        // short unary prefix with rice parameter 1
        assert_eq!(get_ic_rate_cost(4, 3, &g, &l, 1, 0), 3 << 15);
        // exp-golomb escape: 7 suffix bins plus the 8 bin prefix
        assert_eq!(get_ic_rate(20, 17, &g, &l, 0, 0), 15 << 15);
        assert_eq!(get_ic_rate(20, 17, &g, &l, 0, 1), (15 << 15) + 2000);
    }

    #[test]
    fn context_state_follows_levels() {
        let mut ctx = LevelContextState::default();
        ctx.start_at_last(48, true);
        assert_eq!(ctx.ctx_set, 2);
        assert_eq!(ctx.c1c2_idx(), 3);
        assert_eq!(ctx.base_level(), 3);
        assert_eq!(ctx.one_ctx(), 9);
        ctx.update(8);
        assert_eq!(ctx.go_rice_param, 1);
        assert_eq!((ctx.c1, ctx.c2, ctx.c1_idx, ctx.c2_idx), (0, 1, 1, 1));
        assert_eq!(ctx.base_level(), 2);
        ctx.next_set(48, true);
        assert_eq!(ctx.ctx_set, 3);
        assert_eq!(ctx.c1, 1);
        assert_eq!(ctx.go_rice_param, 0);

        ctx.update(1);
        ctx.update(1);
        assert_eq!(ctx.c1, 3);
        ctx.update(1);
        assert_eq!(ctx.c1, 3);
        ctx.next_set(16, true);
        assert_eq!(ctx.ctx_set, 0);

        let mut chroma = LevelContextState::default();
        chroma.start_at_last(40, false);
        assert_eq!(chroma.ctx_set, 0);
        for _ in 0..C1FLAG_NUMBER {
            chroma.update(1);
        }
        assert_eq!(chroma.c1c2_idx(), 2);
        assert_eq!(chroma.base_level(), 1);
    }

    #[test]
    fn all_zero_block() {
        let setup = Setup::new(2, 30);
        let resi = vec![0; 16];
        let mut dst = vec![5; 16];
        let mut s = RdoqScratch::new();
        assert_eq!(setup.run(10.0, &resi, &mut dst, &mut s), 0);
        assert!(dst.iter().all(|&c| c == 0));
    }

    #[test]
    fn expensive_middle_group_is_zeroed() {
        // 8x8 at qp 22: the coding groups are scanned as blk 0, 2, 1, 3
        let setup = Setup::new(3, 22);
        let mut resi = vec![0; 64];
        resi[0] = 1000;
        resi[36] = 1000;
        resi[41] = 70;
        let mut dst = vec![0; 64];
        let mut s = RdoqScratch::new();
        let num_sig = setup.run(1.0, &resi, &mut dst, &mut s);
        assert_eq!(num_sig, 2);
        assert_eq!(dst[0], 8);
        assert_eq!(dst[36], 8);
        assert_eq!(dst[41], 0);
        assert_eq!(s.sig_coeff_group_flags & (1 << 2), 0);
        assert_ne!(s.sig_coeff_group_flags & (1 << 3), 0);
        assert_ne!(s.sig_coeff_group_flags & 1, 0);
    }

    #[test]
    fn strong_middle_group_is_kept() {
        let setup = Setup::new(3, 22);
        let mut resi = vec![0; 64];
        resi[0] = 1000;
        resi[36] = 1000;
        resi[41] = -1000;
        let mut dst = vec![0; 64];
        let mut s = RdoqScratch::new();
        assert_eq!(setup.run(1.0, &resi, &mut dst, &mut s), 3);
        assert_eq!(dst[41], -8);
        assert_ne!(s.sig_coeff_group_flags & (1 << 2), 0);
    }

    #[test]
    fn deterministic_and_never_above_plain_levels() {
        let mut rng: StdRng = SeedableRng::seed_from_u64(2);
        let mut s = RdoqScratch::new();
        for log2 in 2..=5 {
            for qp in [12, 27, 37] {
                let setup = Setup::new(log2, qp);
                let n = 1 << (2 * log2);
                let resi = random_block(&mut rng, n, 4000);
                let lambda = 0.57 * 2f64.powf((qp - 12) as f64 / 3.0);

                let list = setup.tu.scaling_list_type();
                let qbits = QUANT_SHIFT + setup.qp.per + transform_shift(8, log2);
                let mut plain = vec![0; n];
                let mut scaled = vec![0; n];
                let plain_sig = nquant(
                    &resi,
                    setup.sl.quant_coef(log2, list, setup.qp.rem),
                    &mut scaled,
                    &mut plain,
                    qbits,
                    1 << (qbits - 1),
                );

                let mut a = vec![0; n];
                let mut b = vec![0; n];
                let na = setup.run(lambda, &resi, &mut a, &mut s);
                let nb = setup.run(lambda, &resi, &mut b, &mut s);
                assert_eq!(a, b);
                assert_eq!(na, nb);
                assert_eq!(na, count_nonzero(&a));
                assert!(na <= plain_sig);
                for i in 0..n {
                    assert!(a[i].abs() <= plain[i]);
                    assert!((COEFF_MIN..=COEFF_MAX).contains(&a[i]));
                    if a[i] != 0 {
                        assert_eq!(a[i].signum(), resi[i].signum());
                    }
                }
            }
        }
    }

    #[test]
    fn huge_coefficients_stay_in_range() {
        let setup = Setup::new(5, 0);
        let resi: Vec<Coeff> = (0..1024)
            .map(|i| if i % 2 == 0 { COEFF_MAX } else { COEFF_MIN })
            .collect();
        let mut dst = vec![0; 1024];
        let mut s = RdoqScratch::new();
        setup.run(1.0, &resi, &mut dst, &mut s);
        assert!(dst.iter().all(|c| (COEFF_MIN..=COEFF_MAX).contains(c)));
    }

    #[test]
    fn sign_hiding_keeps_parity() {
        let mut rng: StdRng = SeedableRng::seed_from_u64(2);
        let mut setup = Setup::new(4, 22);
        setup.tu.sign_hide = true;
        let resi = random_block(&mut rng, 256, 3000);
        let mut dst = vec![0; 256];
        let mut s = RdoqScratch::new();
        let num_sig = setup.run(4.0, &resi, &mut dst, &mut s);
        assert_eq!(num_sig, count_nonzero(&dst));
        let scan = setup.coding.scan;
        for cg in 0..setup.coding.num_cg() {
            let group: Vec<Coeff> = (0..SCAN_SET_SIZE)
                .map(|n| dst[scan[(cg << LOG2_SCAN_SET_SIZE) + n] as usize])
                .collect();
            let first = group.iter().position(|&c| c != 0);
            let last = group.iter().rposition(|&c| c != 0);
            if let (Some(first), Some(last)) = (first, last) {
                if last - first >= SBH_THRESHOLD {
                    let sum: u32 = group.iter().map(|c| c.unsigned_abs()).sum();
                    assert_eq!(group[first] < 0, sum & 1 == 1, "group {}", cg);
                }
            }
        }
    }

    #[test]
    fn psy_rdoq_is_deterministic() {
        let mut rng: StdRng = SeedableRng::seed_from_u64(2);
        let setup = Setup::new(3, 27);
        let resi = random_block(&mut rng, 64, 3000);
        let fenc: Vec<Coeff> = resi.iter().map(|&c| c + rng.gen_range(-200..200)).collect();
        let list = setup.tu.scaling_list_type();
        let p = RdoqParams {
            tu: &setup.tu,
            coding: &setup.coding,
            qp: setup.qp,
            bit_depth: 8,
            lambda: 20.0,
            quant_coef: setup.sl.quant_coef(3, list, setup.qp.rem),
            unquant_scale: setup.sl.dequant_coef(3, list, setup.qp.rem),
            est_bits: &setup.est,
            psy_scale: 256,
        };
        let mut s = RdoqScratch::new();
        let mut a = vec![0; 64];
        let mut b = vec![0; 64];
        let na = rdo_quant(&p, &resi, &fenc, &mut a, &mut s);
        let nb = rdo_quant(&p, &resi, &fenc, &mut b, &mut s);
        assert_eq!(a, b);
        assert_eq!(na, nb);
        for i in 0..64 {
            if a[i] != 0 {
                assert_eq!(a[i].signum(), resi[i].signum());
            }
        }
    }

    #[test]
    fn trailing_ones_are_dropped() {
        let setup = Setup::new(2, 22);
        let mut resi = vec![0; 16];
        resi[0] = 2000;
        resi[11] = 150;
        resi[15] = 150;
        let mut dst = vec![0; 16];
        let mut s = RdoqScratch::new();
        assert_eq!(setup.run(200.0, &resi, &mut dst, &mut s), 1);
        assert_eq!(dst[0], 8);
        assert!(dst[1..].iter().all(|&c| c == 0));
    }

    #[test]
    fn last_search_stops_at_a_level_above_one() {
        // blk 5 is scan position 4: its level settles at 2, and dropping it
        // would be cheaper than keeping it at this lambda
        let setup = Setup::new(2, 22);
        let mut resi = vec![0; 16];
        resi[0] = 6000;
        resi[5] = -680;
        resi[15] = 150;
        let mut dst = vec![0; 16];
        let mut s = RdoqScratch::new();
        let num_sig = setup.run(200.0, &resi, &mut dst, &mut s);
        assert_eq!(num_sig, 2);
        assert_eq!(dst[5], -2);
        assert_eq!(dst[15], 0);
        assert!(dst[0] > 20);
    }

    #[test]
    fn tiny_block_is_not_coded() {
        let setup = Setup::new(2, 22);
        let mut resi = vec![0; 16];
        resi[0] = 300;
        let mut dst = vec![0; 16];
        let mut s = RdoqScratch::new();
        assert_eq!(setup.run(1000.0, &resi, &mut dst, &mut s), 0);
        assert!(dst.iter().all(|&c| c == 0));
    }

    #[test]
    fn root_cbf_prices_inter_luma_at_depth_zero() {
        let mut setup = Setup::new(2, 22);
        // not coding the root is made prohibitively expensive
        setup.est.block_root_cbp_bits = [1 << 24, 0];
        let mut resi = vec![0; 16];
        resi[0] = 300;
        let mut dst = vec![0; 16];
        let mut s = RdoqScratch::new();
        assert!(setup.tu.uses_root_cbf());
        assert_eq!(setup.run(1000.0, &resi, &mut dst, &mut s), 1);
        assert_eq!(dst[0], 1);

        setup.tu.is_intra = true;
        assert!(!setup.tu.uses_root_cbf());
        assert_eq!(setup.run(1000.0, &resi, &mut dst, &mut s), 0);
        assert_eq!(dst[0], 0);

        setup.tu.is_intra = false;
        setup.tu.tr_depth = 1;
        assert_eq!(setup.run(1000.0, &resi, &mut dst, &mut s), 0);
    }
}
