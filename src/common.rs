#![allow(non_camel_case_types)]

use num::Integer;

pub type Coeff = i32;
pub type Pixel = u16;

pub const MAX_TR_SIZE: usize = 32;
pub const MAX_TR_COEFFS: usize = MAX_TR_SIZE * MAX_TR_SIZE;
pub const MIN_LOG2_TR_SIZE: usize = 2;
pub const MAX_LOG2_TR_SIZE: usize = 5;
/// Deepest transform tree level with its own chroma cbf context.
pub const MAX_TR_DEPTH: usize = 4;

pub const QUANT_SHIFT: i32 = 14;
pub const QUANT_IQUANT_SHIFT: i32 = 20;
pub const MAX_TR_DYNAMIC_RANGE: i32 = 15;
pub const SCALE_BITS: i32 = 15;

/// Cost of one equiprobable (bypass) bin in the FIX15 scale of `EstBits`.
pub const IEP_RATE: i32 = 32768;

pub const LOG2_SCAN_SET_SIZE: usize = 4;
pub const SCAN_SET_SIZE: usize = 1 << LOG2_SCAN_SET_SIZE;
pub const MLS_GRP_NUM: usize = 64;
pub const SBH_THRESHOLD: usize = 4;
pub const C1FLAG_NUMBER: usize = 8;
pub const COEF_REMAIN_BIN_REDUCTION: u32 = 3;

pub const COEFF_MIN: Coeff = i16::MIN as Coeff;
pub const COEFF_MAX: Coeff = i16::MAX as Coeff;

#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive)]
pub enum TextType {
    Luma = 0,
    ChromaU = 1,
    ChromaV = 2,
}

impl TextType {
    #[inline(always)]
    pub fn is_luma(&self) -> bool {
        *self == TextType::Luma
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive)]
pub enum ChromaFormat {
    Monochrome = 0,
    YCbCr420 = 1,
    YCbCr422 = 2,
    YCbCr444 = 3,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[allow(clippy::upper_case_acronyms)]
pub enum SliceType {
    B_SLICE = 0,
    P_SLICE = 1,
    I_SLICE = 2,
}

/// Scale of the forward transform output relative to the residual.
#[inline(always)]
pub fn transform_shift(bit_depth: usize, log2_tr_size: usize) -> i32 {
    MAX_TR_DYNAMIC_RANGE - bit_depth as i32 - log2_tr_size as i32
}

#[inline(always)]
pub fn qp_bd_offset(bit_depth: usize) -> i32 {
    6 * (bit_depth as i32 - 8)
}

/// QP split into the scale table index and the power-of-two shift.
#[derive(Clone, Copy, Default, PartialEq, Eq, Debug)]
pub struct QpParam {
    pub qp: i32,
    pub per: i32,
    pub rem: usize,
}

impl QpParam {
    /// `qp_scaled` includes the bit depth offset and is never negative.
    pub fn new(qp_scaled: i32) -> QpParam {
        debug_assert!(qp_scaled >= 0);
        let (per, rem) = qp_scaled.div_rem(&6);
        QpParam {
            qp: qp_scaled,
            per,
            rem: rem as usize,
        }
    }
}

/// Per-block parameters handed in by the mode decision for one transform block.
#[derive(Clone, Copy, Debug)]
pub struct TransformUnit {
    pub log2_tr_size: usize,
    pub ttype: TextType,
    pub is_intra: bool,
    pub slice_type: SliceType,
    pub transquant_bypass: bool,
    pub transform_skip: bool,
    pub tr_depth: usize,
    pub scan_type: crate::scan::ScanType,
    pub sign_hide: bool,
}

impl TransformUnit {
    pub fn new(log2_tr_size: usize, ttype: TextType) -> TransformUnit {
        debug_assert!((MIN_LOG2_TR_SIZE..=MAX_LOG2_TR_SIZE).contains(&log2_tr_size));
        TransformUnit {
            log2_tr_size,
            ttype,
            is_intra: false,
            slice_type: SliceType::B_SLICE,
            transquant_bypass: false,
            transform_skip: false,
            tr_depth: 0,
            scan_type: crate::scan::ScanType::Diag,
            sign_hide: true,
        }
    }

    #[inline(always)]
    pub fn num_coeff(&self) -> usize {
        1 << (self.log2_tr_size * 2)
    }

    #[inline(always)]
    pub fn tr_size(&self) -> usize {
        1 << self.log2_tr_size
    }

    /// Index into the scaling list tables: intra luma/cb/cr are 0..3, inter 3..6.
    #[inline(always)]
    pub fn scaling_list_type(&self) -> usize {
        (if self.is_intra { 0 } else { 3 }) + self.ttype as usize
    }

    /// The 4x4 luma intra block uses the DST instead of the DCT.
    #[inline(always)]
    pub fn uses_dst(&self) -> bool {
        self.log2_tr_size == 2 && self.ttype.is_luma() && self.is_intra
    }

    /// Context for the coded block flag of this block.
    #[inline(always)]
    pub fn cbf_ctx(&self) -> usize {
        debug_assert!(self.tr_depth <= MAX_TR_DEPTH);
        if self.ttype.is_luma() {
            (self.tr_depth == 0) as usize
        } else {
            self.tr_depth
        }
    }

    /// Inter luma blocks at depth 0 are signalled by the root cbf instead.
    #[inline(always)]
    pub fn uses_root_cbf(&self) -> bool {
        !self.is_intra && self.ttype.is_luma() && self.tr_depth == 0
    }
}
