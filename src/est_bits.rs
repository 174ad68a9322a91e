use super::common::*;

pub const NUM_SIG_CG_FLAG_CTX: usize = 2;
pub const NUM_SIG_FLAG_CTX: usize = 27;
pub const NUM_ONE_FLAG_CTX: usize = 16;
pub const NUM_ABS_FLAG_CTX: usize = 6;
pub const NUM_QT_CBF_CTX: usize = 5;
pub const NUM_CTX_LAST_FLAG_XY: usize = 10;

/// Snapshot of the estimated cost of coding each bin value, taken from the
/// live CABAC contexts of one channel before a coding unit is analysed.
///
/// Every entry is a fractional bit count scaled by 2^15, `[ctx][bin]`.
#[derive(Clone, Debug)]
pub struct EstBits {
    pub significant_coeff_group_bits: [[i32; 2]; NUM_SIG_CG_FLAG_CTX],
    pub significant_bits: [[i32; 2]; NUM_SIG_FLAG_CTX],
    pub last_x_bits: [i32; NUM_CTX_LAST_FLAG_XY],
    pub last_y_bits: [i32; NUM_CTX_LAST_FLAG_XY],
    pub greater_one_bits: [[i32; 2]; NUM_ONE_FLAG_CTX],
    pub level_abs_bits: [[i32; 2]; NUM_ABS_FLAG_CTX],
    pub block_cbp_bits: [[i32; 2]; NUM_QT_CBF_CTX],
    pub block_root_cbp_bits: [i32; 2],
}

impl EstBits {
    /// Every bin costs exactly one bit, as for contexts at equal probability.
    pub fn uniform() -> EstBits {
        let bit = IEP_RATE;
        EstBits {
            significant_coeff_group_bits: [[bit; 2]; NUM_SIG_CG_FLAG_CTX],
            significant_bits: [[bit; 2]; NUM_SIG_FLAG_CTX],
            // a truncated unary prefix of n + 1 bins
            last_x_bits: core::array::from_fn(|i| bit * (i as i32 + 1)),
            last_y_bits: core::array::from_fn(|i| bit * (i as i32 + 1)),
            greater_one_bits: [[bit; 2]; NUM_ONE_FLAG_CTX],
            level_abs_bits: [[bit; 2]; NUM_ABS_FLAG_CTX],
            block_cbp_bits: [[bit; 2]; NUM_QT_CBF_CTX],
            block_root_cbp_bits: [bit; 2],
        }
    }
}

impl Default for EstBits {
    fn default() -> Self {
        EstBits::uniform()
    }
}
