use super::common::*;
use super::scan::*;
use debug_print::debug_eprintln;

/// Per-position costs gathered by the RDO search, used to pick which level
/// to move when the hidden sign does not match the parity of a group.
pub struct RdoSignCosts<'a> {
    pub delta_u: &'a [i32],
    pub rate_inc_up: &'a [i32],
    pub rate_inc_down: &'a [i32],
    pub sig_rate_delta: &'a [i32],
    pub rd_factor: i64,
}

/// First and last non-zero scan positions inside the group starting at
/// `cg_start_pos`.
#[inline(always)]
fn nz_span(coeff: &[Coeff], scan: &[u16], cg_start_pos: usize) -> Option<(usize, usize)> {
    let group = &scan[cg_start_pos..cg_start_pos + SCAN_SET_SIZE];
    let last = group.iter().rposition(|&p| coeff[p as usize] != 0)?;
    let first = group.iter().position(|&p| coeff[p as usize] != 0)?;
    Some((first, last))
}

#[inline(always)]
fn parity_mismatch(coeff: &[Coeff], scan: &[u16], cg_start_pos: usize, first: usize, last: usize) -> Option<bool> {
    let sign_bit = coeff[scan[cg_start_pos + first] as usize] < 0;
    let abs_sum: u32 = (first..=last)
        .map(|n| coeff[scan[cg_start_pos + n] as usize].unsigned_abs())
        .sum();
    if sign_bit != (abs_sum & 1 == 1) {
        Some(sign_bit)
    } else {
        None
    }
}

/// Moves the level at `pos` one step away from zero (`change == 1`) or
/// towards zero (`change == -1`), keeping the sign of the residual.
#[inline(always)]
fn apply_change(coeff: &mut [Coeff], resi: &[Coeff], pos: usize, mut change: Coeff, num_sig: &mut u32) {
    if coeff[pos] == COEFF_MAX || coeff[pos] == COEFF_MIN {
        change = -1;
    }
    if coeff[pos] == 0 {
        *num_sig += 1;
    } else if change == -1 && coeff[pos].abs() == 1 {
        *num_sig -= 1;
    }
    if resi[pos] >= 0 {
        coeff[pos] += change;
    } else {
        coeff[pos] -= change;
    }
}

/// Sign data hiding for the plain quantizer. The cheapest change is the one
/// with the smallest quantization error in the direction of the step.
pub fn sign_bit_hiding_hdq(
    coeff: &mut [Coeff],
    resi: &[Coeff],
    delta_u: &[i32],
    mut num_sig: u32,
    params: &TuCodingParams,
) -> u32 {
    let scan = params.scan;
    let mut last_cg = true;
    for cg in (0..params.num_cg()).rev() {
        let cg_start_pos = cg << LOG2_SCAN_SET_SIZE;
        let (first_nz, last_nz) = match nz_span(coeff, scan, cg_start_pos) {
            Some(span) => span,
            None => continue,
        };
        if last_nz - first_nz >= SBH_THRESHOLD {
            if let Some(sign_bit) = parity_mismatch(coeff, scan, cg_start_pos, first_nz, last_nz) {
                let mut min_cost_inc = i64::MAX;
                let mut min_pos = None;
                let mut final_change = 0;
                let start = if last_cg { last_nz } else { SCAN_SET_SIZE - 1 };
                for n in (0..=start).rev() {
                    let blk_pos = scan[n + cg_start_pos] as usize;
                    let du = delta_u[blk_pos] as i64;
                    let (cur_cost, cur_change) = if coeff[blk_pos] != 0 {
                        if du > 0 {
                            (-du, 1)
                        } else if n == first_nz && coeff[blk_pos].abs() == 1 {
                            (i64::MAX, 0)
                        } else {
                            (du, -1)
                        }
                    } else if n < first_nz && (resi[blk_pos] < 0) != sign_bit {
                        (i64::MAX, 0)
                    } else {
                        (-du, 1)
                    };
                    if cur_cost < min_cost_inc {
                        min_cost_inc = cur_cost;
                        final_change = cur_change;
                        min_pos = Some(blk_pos);
                    }
                }
                if let Some(pos) = min_pos {
                    apply_change(coeff, resi, pos, final_change, &mut num_sig);
                }
            }
        }
        last_cg = false;
    }
    num_sig
}

/// Sign data hiding after RDO. Candidates are ranked by the change in
/// distortion, scaled by `rd_factor`, plus the estimated change in rate.
pub fn sign_bit_hiding_rdo(
    coeff: &mut [Coeff],
    resi: &[Coeff],
    mut num_sig: u32,
    params: &TuCodingParams,
    cg_last_scan_pos: usize,
    costs: &RdoSignCosts,
) -> u32 {
    let scan = params.scan;
    let one_bit = IEP_RATE as i64;
    let mut last_cg = true;
    for sub_set in (0..=cg_last_scan_pos).rev() {
        let sub_pos = sub_set << LOG2_SCAN_SET_SIZE;
        let (first_nz, last_nz) = match nz_span(coeff, scan, sub_pos) {
            Some(span) => span,
            None => continue,
        };
        if last_nz - first_nz >= SBH_THRESHOLD {
            if let Some(sign_bit) = parity_mismatch(coeff, scan, sub_pos, first_nz, last_nz) {
                let mut min_cost_inc = i64::MAX;
                let mut min_pos = None;
                let mut final_change = 0;
                let start = if last_cg { last_nz } else { SCAN_SET_SIZE - 1 };
                for n in (0..=start).rev() {
                    let blk_pos = scan[n + sub_pos] as usize;
                    let du = costs.delta_u[blk_pos] as i64;
                    let rate_up = costs.rate_inc_up[blk_pos] as i64;
                    let sig_delta = costs.sig_rate_delta[blk_pos] as i64;
                    let (cur_cost, cur_change) = if coeff[blk_pos] != 0 {
                        let cost_up = costs.rd_factor * -du + rate_up;
                        let is_one = coeff[blk_pos].abs() == 1;
                        // dropping a one also drops its significance flag
                        let mut cost_down = costs.rd_factor * du + costs.rate_inc_down[blk_pos] as i64
                            - if is_one { one_bit + sig_delta } else { 0 };
                        if last_cg && last_nz == n && is_one {
                            cost_down -= 4 * one_bit;
                        }
                        if cost_up < cost_down {
                            (cost_up, 1)
                        } else if n == first_nz && is_one {
                            (i64::MAX, -1)
                        } else {
                            (cost_down, -1)
                        }
                    } else {
                        let cost = costs.rd_factor * -du.abs() + one_bit + rate_up + sig_delta;
                        if n < first_nz && (resi[blk_pos] < 0) != sign_bit {
                            (i64::MAX, 1)
                        } else {
                            (cost, 1)
                        }
                    };
                    if cur_cost < min_cost_inc {
                        min_cost_inc = cur_cost;
                        final_change = cur_change;
                        min_pos = Some(blk_pos);
                    }
                }
                if let Some(pos) = min_pos {
                    debug_eprintln!("sbh: group {} pos {} change {}", sub_set, pos, final_change);
                    apply_change(coeff, resi, pos, final_change, &mut num_sig);
                }
            }
        }
        last_cg = false;
    }
    num_sig
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group_with_span_of_four() -> (Vec<Coeff>, Vec<Coeff>, Vec<i32>) {
        // diagonal 4x4: blk 0 is scan position 0, blk 5 is scan position 4
        let mut coeff = vec![0; 16];
        coeff[0] = 2;
        coeff[5] = 1;
        let resi: Vec<Coeff> = (0..16).map(|i| 40 + i).collect();
        let mut delta_u = vec![0; 16];
        delta_u[0] = -20;
        delta_u[5] = 50;
        delta_u[8] = 10;
        (coeff, resi, delta_u)
    }

    #[test]
    fn hdq_adjusts_one_level_and_is_idempotent() {
        let params = TuCodingParams::new(2, ScanType::Diag, true);
        let (mut coeff, resi, delta_u) = group_with_span_of_four();
        let before = coeff.clone();
        let num_sig = sign_bit_hiding_hdq(&mut coeff, &resi, &delta_u, 2, &params);
        let changed: Vec<usize> = (0..16).filter(|&i| coeff[i] != before[i]).collect();
        assert_eq!(changed, vec![5]);
        assert_eq!(coeff[5], 2);
        assert_eq!(num_sig, 2);

        let again = coeff.clone();
        let num_sig = sign_bit_hiding_hdq(&mut coeff, &resi, &delta_u, num_sig, &params);
        assert_eq!(coeff, again);
        assert_eq!(num_sig, 2);
    }

    #[test]
    fn hdq_never_crosses_the_clamp() {
        let params = TuCodingParams::new(2, ScanType::Diag, true);
        let (mut coeff, resi, delta_u) = group_with_span_of_four();
        coeff[5] = COEFF_MAX;
        let num_sig = sign_bit_hiding_hdq(&mut coeff, &resi, &delta_u, 2, &params);
        assert_eq!(coeff[5], COEFF_MAX - 1);
        assert_eq!(coeff[0], 2);
        assert_eq!(num_sig, 2);
    }

    #[test]
    fn short_span_is_left_alone() {
        let params = TuCodingParams::new(2, ScanType::Diag, true);
        let mut coeff = vec![0; 16];
        coeff[0] = 2;
        // blk 8 sits at scan position 3
        coeff[8] = 1;
        let resi = vec![1; 16];
        let delta_u = vec![100; 16];
        let before = coeff.clone();
        assert_eq!(sign_bit_hiding_hdq(&mut coeff, &resi, &delta_u, 2, &params), 2);
        assert_eq!(coeff, before);
    }

    #[test]
    fn rdo_drops_a_trailing_one() {
        let params = TuCodingParams::new(2, ScanType::Diag, true);
        let (mut coeff, resi, delta_u) = group_with_span_of_four();
        let zeros = vec![0; 16];
        let costs = RdoSignCosts {
            delta_u: &delta_u,
            rate_inc_up: &zeros,
            rate_inc_down: &zeros,
            sig_rate_delta: &zeros,
            rd_factor: 1,
        };
        let num_sig = sign_bit_hiding_rdo(&mut coeff, &resi, 2, &params, 0, &costs);
        assert_eq!(coeff[5], 0);
        assert_eq!(coeff[0], 2);
        assert_eq!(num_sig, 1);

        let again = coeff.clone();
        assert_eq!(sign_bit_hiding_rdo(&mut coeff, &resi, 1, &params, 0, &costs), 1);
        assert_eq!(coeff, again);
    }

    #[test]
    fn negative_levels_move_with_the_residual_sign() {
        let params = TuCodingParams::new(2, ScanType::Diag, true);
        let (mut coeff, mut resi, delta_u) = group_with_span_of_four();
        coeff[0] = -2;
        coeff[5] = -2;
        resi.iter_mut().for_each(|r| *r = -*r);
        let num_sig = sign_bit_hiding_hdq(&mut coeff, &resi, &delta_u, 2, &params);
        assert_eq!(coeff[5], -3);
        assert_eq!(coeff[0], -2);
        assert_eq!(num_sig, 2);
    }
}
