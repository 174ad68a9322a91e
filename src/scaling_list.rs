pub const NUM_SIZES: usize = 4;
pub const NUM_LISTS: usize = 6;
pub const NUM_REM: usize = 6;
const MAX_MATRIX_SIZE: usize = 8;

pub const QUANT_SCALES: [i32; NUM_REM] = [26214, 23302, 20560, 18396, 16384, 14564];
pub const INV_QUANT_SCALES: [i32; NUM_REM] = [40, 45, 51, 57, 64, 72];

#[rustfmt::skip]
const QUANT_INTRA_DEFAULT_8X8: [i32; 64] = [
    16, 16, 16, 16, 17, 18, 21, 24,
    16, 16, 16, 16, 17, 19, 22, 25,
    16, 16, 17, 18, 20, 22, 25, 29,
    16, 16, 18, 21, 24, 27, 31, 36,
    17, 17, 20, 24, 30, 35, 41, 47,
    18, 19, 22, 27, 35, 44, 54, 65,
    21, 22, 25, 31, 41, 54, 70, 88,
    24, 25, 29, 36, 47, 65, 88, 115,
];

#[rustfmt::skip]
const QUANT_INTER_DEFAULT_8X8: [i32; 64] = [
    16, 16, 16, 16, 17, 18, 20, 24,
    16, 16, 16, 17, 18, 20, 24, 25,
    16, 16, 17, 18, 20, 24, 25, 28,
    16, 17, 18, 20, 24, 25, 28, 33,
    17, 18, 20, 24, 25, 28, 33, 41,
    18, 20, 24, 25, 28, 33, 41, 54,
    20, 24, 25, 28, 33, 41, 54, 71,
    24, 25, 28, 33, 41, 54, 71, 91,
];

/// Quantization and dequantization scale tables, built once per encoder
/// configuration and shared read-only by every quantizer.
///
/// Tables are indexed by `[log2 size - 2][scaling list type][qp % 6]` and hold
/// one entry per raster position of the block. The flat dequant entries carry
/// the same `<< 4` as a matrix entry of 16, so both paths share one shift.
#[derive(Clone, Debug)]
pub struct ScalingList {
    pub enabled: bool,
    quant_coef: Vec<Vec<Vec<Vec<i32>>>>,
    dequant_coef: Vec<Vec<Vec<Vec<i32>>>>,
}

impl ScalingList {
    pub fn flat() -> ScalingList {
        let mut quant_coef = vec![];
        let mut dequant_coef = vec![];
        for size_idx in 0..NUM_SIZES {
            let count = 1 << ((size_idx + 2) * 2);
            let mut q_lists: Vec<Vec<Vec<i32>>> = vec![];
            let mut dq_lists: Vec<Vec<Vec<i32>>> = vec![];
            for _list in 0..NUM_LISTS {
                q_lists.push((0..NUM_REM).map(|rem| vec![QUANT_SCALES[rem]; count]).collect());
                dq_lists.push(
                    (0..NUM_REM)
                        .map(|rem| vec![INV_QUANT_SCALES[rem] << 4; count])
                        .collect(),
                );
            }
            quant_coef.push(q_lists);
            dequant_coef.push(dq_lists);
        }
        ScalingList {
            enabled: false,
            quant_coef,
            dequant_coef,
        }
    }

    /// The default matrices: flat 4x4, and the intra/inter 8x8 matrices
    /// upsampled for larger blocks with a DC weight of 16.
    pub fn default_lists() -> ScalingList {
        let mut matrices = vec![];
        let mut dc = vec![];
        for size_idx in 0..NUM_SIZES {
            let mut lists = vec![];
            for list in 0..NUM_LISTS {
                lists.push(if size_idx == 0 {
                    vec![16; 16]
                } else if list < 3 {
                    QUANT_INTRA_DEFAULT_8X8.to_vec()
                } else {
                    QUANT_INTER_DEFAULT_8X8.to_vec()
                });
            }
            matrices.push(lists);
            dc.push(vec![16; NUM_LISTS]);
        }
        ScalingList::from_matrices(&matrices, &dc)
    }

    /// Builds the tables from explicit weight matrices given in raster order:
    /// 16 entries for 4x4 blocks and 64 entries for every larger size.
    /// `dc` overrides the DC weight of the upsampled 16x16 and 32x32 matrices.
    pub fn from_matrices(matrices: &[Vec<Vec<i32>>], dc: &[Vec<i32>]) -> ScalingList {
        debug_assert_eq!(matrices.len(), NUM_SIZES);
        let mut quant_coef = vec![];
        let mut dequant_coef = vec![];
        for size_idx in 0..NUM_SIZES {
            let width = 1 << (size_idx + 2);
            let stride = width.min(MAX_MATRIX_SIZE);
            let ratio = width / stride;
            let mut q_lists = vec![];
            let mut dq_lists = vec![];
            for list in 0..NUM_LISTS {
                let m = &matrices[size_idx][list];
                debug_assert_eq!(m.len(), stride * stride);
                debug_assert!(m.iter().all(|&w| w > 0));
                let mut q_rems = vec![];
                let mut dq_rems = vec![];
                for rem in 0..NUM_REM {
                    let mut q = vec![0; width * width];
                    let mut dq = vec![0; width * width];
                    let quant_scale = QUANT_SCALES[rem] << 4;
                    for j in 0..width {
                        for i in 0..width {
                            let w = m[stride * (j / ratio) + i / ratio];
                            q[j * width + i] = quant_scale / w;
                            dq[j * width + i] = INV_QUANT_SCALES[rem] * w;
                        }
                    }
                    if ratio > 1 {
                        q[0] = quant_scale / dc[size_idx][list];
                        dq[0] = INV_QUANT_SCALES[rem] * dc[size_idx][list];
                    }
                    q_rems.push(q);
                    dq_rems.push(dq);
                }
                q_lists.push(q_rems);
                dq_lists.push(dq_rems);
            }
            quant_coef.push(q_lists);
            dequant_coef.push(dq_lists);
        }
        ScalingList {
            enabled: true,
            quant_coef,
            dequant_coef,
        }
    }

    #[inline(always)]
    pub fn quant_coef(&self, log2_tr_size: usize, list: usize, rem: usize) -> &[i32] {
        &self.quant_coef[log2_tr_size - 2][list][rem]
    }

    #[inline(always)]
    pub fn dequant_coef(&self, log2_tr_size: usize, list: usize, rem: usize) -> &[i32] {
        &self.dequant_coef[log2_tr_size - 2][list][rem]
    }
}
