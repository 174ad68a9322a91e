use super::common::*;

/// Uniform quantization with a fixed rounding bias.
///
/// Writes signed levels to `q_coef` and, for every position, the remainder of
/// the division scaled down to 8 fractional bits into `delta_u`. A positive
/// remainder means the level was rounded down. Returns the number of non-zero
/// levels.
pub fn quant(
    coef: &[Coeff],
    quant_coeff: &[i32],
    delta_u: &mut [i32],
    q_coef: &mut [Coeff],
    qbits: i32,
    add: i64,
) -> u32 {
    debug_assert!(qbits >= 8);
    debug_assert!(quant_coeff.len() >= coef.len());
    let qbits8 = qbits - 8;
    let mut num_sig = 0;
    for (blk_pos, &c) in coef.iter().enumerate() {
        let tmp = c.unsigned_abs() as i64 * quant_coeff[blk_pos] as i64;
        let level = (tmp + add) >> qbits;
        delta_u[blk_pos] = ((tmp - (level << qbits)) >> qbits8) as i32;
        if level != 0 {
            num_sig += 1;
        }
        let level = if c < 0 { -level } else { level };
        q_coef[blk_pos] = level.clamp(COEFF_MIN as i64, COEFF_MAX as i64) as Coeff;
    }
    num_sig
}

/// Quantization feeding the RDO search: keeps the unrounded scaled magnitude
/// of every coefficient and writes absolute levels.
pub fn nquant(
    coef: &[Coeff],
    quant_coeff: &[i32],
    scaled_coeff: &mut [i64],
    q_coef: &mut [Coeff],
    qbits: i32,
    add: i64,
) -> u32 {
    let mut num_sig = 0;
    for (blk_pos, &c) in coef.iter().enumerate() {
        let tmp = c.unsigned_abs() as i64 * quant_coeff[blk_pos] as i64;
        scaled_coeff[blk_pos] = tmp;
        let level = (tmp + add) >> qbits;
        if level != 0 {
            num_sig += 1;
        }
        q_coef[blk_pos] = level.min(COEFF_MAX as i64) as Coeff;
    }
    num_sig
}

pub fn dequant_normal(quant_coef: &[Coeff], coef: &mut [Coeff], scale: i32, shift: i32) {
    debug_assert!(shift > 0);
    let add = 1i64 << (shift - 1);
    for (dst, &q) in coef.iter_mut().zip(quant_coef) {
        let v = (q as i64 * scale as i64 + add) >> shift;
        *dst = v.clamp(COEFF_MIN as i64, COEFF_MAX as i64) as Coeff;
    }
}

/// Dequantization with a per-position scale. `dequant_coef` carries the
/// matrix weight, which adds 4 bits of scale on top of `shift`.
pub fn dequant_scaling(
    quant_coef: &[Coeff],
    dequant_coef: &[i32],
    coef: &mut [Coeff],
    per: i32,
    shift: i32,
) {
    let shift = shift + 4;
    let clip = |v: i64| v.clamp(COEFF_MIN as i64, COEFF_MAX as i64);
    if shift > per {
        let add = 1i64 << (shift - per - 1);
        for ((dst, &q), &dq) in coef.iter_mut().zip(quant_coef).zip(dequant_coef) {
            *dst = clip((q as i64 * dq as i64 + add) >> (shift - per)) as Coeff;
        }
    } else {
        for ((dst, &q), &dq) in coef.iter_mut().zip(quant_coef).zip(dequant_coef) {
            *dst = clip(clip(q as i64 * dq as i64) << (per - shift)) as Coeff;
        }
    }
}

#[inline(always)]
pub fn count_nonzero(coef: &[Coeff]) -> u32 {
    coef.iter().filter(|&&c| c != 0).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scaling_list::*;
    use rand::{prelude::StdRng, Rng, SeedableRng};

    #[test]
    fn dc_only_block_is_rounded_with_inter_bias() {
        // 4x4, 8-bit, qp 4: per 0, rem 4, transform shift 5 -> qbits 19
        let qbits = QUANT_SHIFT + transform_shift(8, 2);
        assert_eq!(qbits, 19);
        let add = 85i64 << (qbits - 9);
        let mut coef = vec![0; 16];
        coef[0] = 100;
        let q = vec![QUANT_SCALES[4]; 16];
        let mut delta_u = vec![0; 16];
        let mut level = vec![0; 16];
        let num_sig = quant(&coef, &q, &mut delta_u, &mut level, qbits, add);
        assert_eq!(num_sig, 1);
        assert_eq!(level[0], ((100 * 16384 + add) >> qbits) as Coeff);
        assert_eq!(level[0], 3);
        assert!(level[1..].iter().all(|&l| l == 0));
        // 100 * 16384 - 3 << 19 = 65536 -> 65536 >> 11
        assert_eq!(delta_u[0], 32);
    }

    #[test]
    fn all_zero_block_stays_zero() {
        let coef = vec![0; 64];
        let q = vec![QUANT_SCALES[0]; 64];
        let mut delta_u = vec![0; 64];
        let mut level = vec![7; 64];
        assert_eq!(quant(&coef, &q, &mut delta_u, &mut level, 20, 1 << 19), 0);
        assert!(level.iter().all(|&l| l == 0));
        let mut out = vec![1; 64];
        dequant_normal(&level, &mut out, 40 << 2, 3);
        assert!(out.iter().all(|&c| c == 0));
    }

    #[test]
    fn levels_are_clamped() {
        let coef = vec![i32::from(i16::MAX), i32::from(i16::MIN), 1 << 20, -(1 << 20)];
        let q = vec![QUANT_SCALES[0] << 4; 4];
        let mut delta_u = vec![0; 4];
        let mut level = vec![0; 4];
        let num_sig = quant(&coef, &q, &mut delta_u, &mut level, 14, 1 << 13);
        assert_eq!(num_sig, 4);
        assert_eq!(level, vec![COEFF_MAX, COEFF_MIN, COEFF_MAX, COEFF_MIN]);

        let mut scaled = vec![0; 4];
        nquant(&coef, &q, &mut scaled, &mut level, 14, 1 << 13);
        assert!(level.iter().all(|&l| l == COEFF_MAX));

        let mut out = vec![0; 4];
        dequant_normal(&[COEFF_MAX, COEFF_MIN, 1, -1], &mut out, 72 << 5, 1);
        assert_eq!(&out[0..2], &[COEFF_MAX, COEFF_MIN]);
        assert_eq!(&out[2..4], &[1152, -1152]);
    }

    #[test]
    fn nquant_matches_quant_magnitudes() {
        let mut rng: StdRng = SeedableRng::seed_from_u64(2);
        let mut coef: Vec<i16> = vec![0; 256];
        rng.fill(&mut coef[..]);
        let coef: Vec<Coeff> = coef.iter().map(|&c| c as Coeff >> 4).collect();
        let q = vec![QUANT_SCALES[3]; 256];
        let qbits = 18;
        let add = 1i64 << (qbits - 1);
        let mut delta_u = vec![0; 256];
        let mut level = vec![0; 256];
        let mut scaled = vec![0; 256];
        let mut abs_level = vec![0; 256];
        let n0 = quant(&coef, &q, &mut delta_u, &mut level, qbits, add);
        let n1 = nquant(&coef, &q, &mut scaled, &mut abs_level, qbits, add);
        assert_eq!(n0, n1);
        assert_eq!(n0, count_nonzero(&level));
        for i in 0..256 {
            assert_eq!(level[i].abs(), abs_level[i]);
            assert_eq!(scaled[i], coef[i].unsigned_abs() as i64 * q[i] as i64);
            if level[i] != 0 {
                assert_eq!(level[i].signum(), coef[i].signum());
            }
        }
    }

    #[test]
    fn flat_scaling_matches_normal_dequant() {
        let mut rng: StdRng = SeedableRng::seed_from_u64(2);
        let sl = ScalingList::flat();
        let mut level: Vec<Coeff> = (0..64).map(|_| rng.gen_range(-300..300)).collect();
        level[5] = 0;
        for per in 0..8 {
            for rem in 0..NUM_REM {
                // 8x8 at 8-bit: shift = 20 - 14 - 4
                let shift = 2;
                let mut a = vec![0; 64];
                let mut b = vec![0; 64];
                dequant_normal(&level, &mut a, INV_QUANT_SCALES[rem] << per, shift);
                dequant_scaling(&level, sl.dequant_coef(3, 0, rem), &mut b, per, shift);
                assert_eq!(a, b, "per {} rem {}", per, rem);
            }
        }
    }
}
