use super::common::*;

/// Transform sizes for luma and chroma.
pub const NUM_CATEGORIES: usize = 8;

const MAX_BLOCKS_PER_TR_SIZE: [u32; 4] = [1 << 18, 1 << 16, 1 << 14, 1 << 12];

/// Running coefficient statistics and the per-frequency offsets subtracted
/// from inter residual coefficients before quantization.
///
/// One instance per encoder thread. The quantizer accumulates into it while
/// blocks are coded; `update_offsets` is run between frames.
#[derive(Clone, Debug)]
pub struct NoiseReduction {
    residual_sum: Vec<Vec<u32>>,
    offset_denoise: Vec<Vec<u16>>,
    count: [u32; NUM_CATEGORIES],
}

impl NoiseReduction {
    pub fn new() -> NoiseReduction {
        NoiseReduction {
            residual_sum: vec![vec![0; MAX_TR_COEFFS]; NUM_CATEGORIES],
            offset_denoise: vec![vec![0; MAX_TR_COEFFS]; NUM_CATEGORIES],
            count: [0; NUM_CATEGORIES],
        }
    }

    #[inline(always)]
    pub fn category(log2_tr_size: usize, is_luma: bool) -> usize {
        log2_tr_size - 2 + if is_luma { 0 } else { 4 }
    }

    /// Soft-thresholds `coeffs` towards zero by the category offsets and
    /// accumulates their magnitudes.
    pub fn denoise(&mut self, cat: usize, coeffs: &mut [Coeff]) {
        let res_sum = &mut self.residual_sum[cat];
        let offset = &self.offset_denoise[cat];
        for (i, c) in coeffs.iter_mut().enumerate() {
            let level = c.abs();
            res_sum[i] = res_sum[i].wrapping_add(level as u32);
            let level = level - offset[i] as Coeff;
            *c = if level < 0 {
                0
            } else if *c < 0 {
                -level
            } else {
                level
            };
        }
        self.count[cat] += 1;
    }

    /// Recomputes the offsets from the gathered statistics. Older statistics
    /// are halved once a category has seen enough blocks.
    pub fn update_offsets(&mut self, strength: u32) {
        for cat in 0..NUM_CATEGORIES {
            let size_idx = cat & 3;
            let coef_count = 1 << ((size_idx + 2) * 2);
            if self.count[cat] > MAX_BLOCKS_PER_TR_SIZE[size_idx] {
                self.residual_sum[cat][..coef_count]
                    .iter_mut()
                    .for_each(|s| *s >>= 1);
                self.count[cat] >>= 1;
            }
            let scaled_count = strength as u64 * self.count[cat] as u64;
            for i in 0..coef_count {
                let sum = self.residual_sum[cat][i] as u64;
                let value = (scaled_count + sum / 2) / (sum + 1);
                self.offset_denoise[cat][i] = value.min(u16::MAX as u64) as u16;
            }
            // DC is never denoised
            self.offset_denoise[cat][0] = 0;
        }
    }

    pub fn count(&self, cat: usize) -> u32 {
        self.count[cat]
    }

    pub fn offsets(&self, cat: usize) -> &[u16] {
        &self.offset_denoise[cat]
    }

    pub fn residual_sum(&self, cat: usize) -> &[u32] {
        &self.residual_sum[cat]
    }
}

impl Default for NoiseReduction {
    fn default() -> Self {
        NoiseReduction::new()
    }
}
