use super::common::*;
use lazy_static::lazy_static;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TransformKind {
    Dst4,
    Dct4,
    Dct8,
    Dct16,
    Dct32,
}

impl TransformKind {
    pub fn select(log2_tr_size: usize, use_dst: bool) -> TransformKind {
        match log2_tr_size {
            2 if use_dst => TransformKind::Dst4,
            2 => TransformKind::Dct4,
            3 => TransformKind::Dct8,
            4 => TransformKind::Dct16,
            5 => TransformKind::Dct32,
            _ => panic!("unsupported transform size 1 << {}", log2_tr_size),
        }
    }

    pub fn log2_size(&self) -> usize {
        match self {
            TransformKind::Dst4 | TransformKind::Dct4 => 2,
            TransformKind::Dct8 => 3,
            TransformKind::Dct16 => 4,
            TransformKind::Dct32 => 5,
        }
    }
}

/// Forward and inverse 2-D transform kernels.
///
/// `forward` reads a square residual block with row stride `stride` and
/// writes coefficients in raster order; `inverse` is the opposite.
pub trait Transformer {
    fn forward(&self, kind: TransformKind, bit_depth: usize, src: &[i16], stride: usize, dst: &mut [Coeff]);
    fn inverse(&self, kind: TransformKind, bit_depth: usize, src: &[Coeff], dst: &mut [i16], stride: usize);
}

// |cos(j * pi / 64)| scaled to the integer basis, j = 0..=32
const COS_TABLE: [i32; 33] = [
    90, 90, 90, 90, 89, 88, 87, 85, 83, 82, 80, 78, 75, 73, 70, 67, 64, 61, 57, 54, 50, 46, 43, 38,
    36, 31, 25, 22, 18, 13, 9, 4, 0,
];

const DST_MATRIX: [[i32; 4]; 4] = [
    [29, 55, 74, 84],
    [74, 74, 0, -74],
    [84, -29, -74, 55],
    [55, -84, 74, -29],
];

lazy_static! {
    /// 32-point integer DCT basis; smaller sizes take every (32 / N)-th row.
    static ref DCT_MATRIX: Vec<[i32; MAX_TR_SIZE]> = {
        let mut m = vec![[0; MAX_TR_SIZE]; MAX_TR_SIZE];
        for (k, row) in m.iter_mut().enumerate() {
            for (n, v) in row.iter_mut().enumerate() {
                if k == 0 {
                    *v = 64;
                    continue;
                }
                let mut j = ((2 * n + 1) * k) % 128;
                if j > 64 {
                    j = 128 - j;
                }
                *v = if j > 32 { -COS_TABLE[64 - j] } else { COS_TABLE[j] };
            }
        }
        m
    };
}

#[inline(always)]
fn basis(kind: TransformKind, k: usize, n: usize) -> i32 {
    match kind {
        TransformKind::Dst4 => DST_MATRIX[k][n],
        _ => DCT_MATRIX[k << (MAX_LOG2_TR_SIZE - kind.log2_size())][n],
    }
}

#[inline(always)]
fn clip16(v: i64) -> i32 {
    v.clamp(i16::MIN as i64, i16::MAX as i64) as i32
}

/// Separable integer transform by plain matrix products.
pub struct MatrixTransformer {}

impl Transformer for MatrixTransformer {
    fn forward(&self, kind: TransformKind, bit_depth: usize, src: &[i16], stride: usize, dst: &mut [Coeff]) {
        let log2_size = kind.log2_size();
        let size = 1 << log2_size;
        let shift1 = log2_size as i32 - 1 + bit_depth as i32 - 8;
        let shift2 = log2_size as i32 + 6;
        let round = |v: i64, shift: i32| if shift > 0 { (v + (1 << (shift - 1))) >> shift } else { v };

        // rows, stored transposed
        let mut tmp = vec![0i64; size * size];
        for y in 0..size {
            let row = &src[y * stride..y * stride + size];
            for u in 0..size {
                let sum: i64 = (0..size).map(|x| basis(kind, u, x) as i64 * row[x] as i64).sum();
                tmp[u * size + y] = round(sum, shift1);
            }
        }
        for u in 0..size {
            let col = &tmp[u * size..(u + 1) * size];
            for v in 0..size {
                let sum: i64 = (0..size).map(|y| basis(kind, v, y) as i64 * col[y]).sum();
                dst[v * size + u] = clip16(round(sum, shift2));
            }
        }
    }

    fn inverse(&self, kind: TransformKind, bit_depth: usize, src: &[Coeff], dst: &mut [i16], stride: usize) {
        let log2_size = kind.log2_size();
        let size = 1 << log2_size;
        let shift1 = 7;
        let shift2 = 12 - (bit_depth as i32 - 8);

        let mut tmp = vec![0i64; size * size];
        for u in 0..size {
            for y in 0..size {
                let sum: i64 = (0..size)
                    .map(|v| basis(kind, v, y) as i64 * src[v * size + u] as i64)
                    .sum();
                tmp[y * size + u] = clip16((sum + (1 << (shift1 - 1))) >> shift1) as i64;
            }
        }
        for y in 0..size {
            let row = &tmp[y * size..(y + 1) * size];
            for x in 0..size {
                let sum: i64 = (0..size).map(|u| basis(kind, u, x) as i64 * row[u]).sum();
                dst[y * stride + x] = clip16((sum + (1 << (shift2 - 1))) >> shift2) as i16;
            }
        }
    }
}

/// Transform skip: the residual scaled up to the transform output range.
pub fn transform_skip_forward(residual: &[i16], stride: usize, coeff: &mut [Coeff], shift: i32, tr_size: usize) {
    debug_assert!(shift >= 0);
    for y in 0..tr_size {
        for x in 0..tr_size {
            coeff[y * tr_size + x] = (residual[y * stride + x] as Coeff) << shift;
        }
    }
}

pub fn transform_skip_inverse(coeff: &[Coeff], residual: &mut [i16], stride: usize, shift: i32, tr_size: usize) {
    debug_assert!(shift >= 0);
    for y in 0..tr_size {
        for x in 0..tr_size {
            let c = coeff[y * tr_size + x];
            let v = if shift > 0 {
                (c + (1 << (shift - 1))) >> shift
            } else {
                c
            };
            residual[y * stride + x] = v as i16;
        }
    }
}

/// Lossless copy of the residual, returning the number of non-zero values.
pub fn bypass_forward(residual: &[i16], stride: usize, coeff: &mut [Coeff], tr_size: usize) -> u32 {
    let mut num_sig = 0;
    for y in 0..tr_size {
        for x in 0..tr_size {
            let v = residual[y * stride + x] as Coeff;
            coeff[y * tr_size + x] = v;
            if v != 0 {
                num_sig += 1;
            }
        }
    }
    num_sig
}

pub fn bypass_inverse(coeff: &[Coeff], residual: &mut [i16], stride: usize, tr_size: usize) {
    for y in 0..tr_size {
        for x in 0..tr_size {
            residual[y * stride + x] = coeff[y * tr_size + x] as i16;
        }
    }
}

/// Inverse transform of a block whose only coefficient is DC.
pub fn dc_only_value(dc: Coeff, bit_depth: usize) -> i16 {
    let shift1 = 7;
    let shift2 = 12 - (bit_depth as i32 - 8);
    let v = ((dc as i64 * 64 + (1 << (shift1 - 1))) >> shift1) * 64 + (1 << (shift2 - 1));
    (v >> shift2) as i16
}

pub fn fill_block(residual: &mut [i16], stride: usize, tr_size: usize, value: i16) {
    for y in 0..tr_size {
        residual[y * stride..y * stride + tr_size].fill(value);
    }
}

/// Copies source pixels of a square block into a packed signed buffer.
pub fn copy_pixels(fenc: &[Pixel], fenc_stride: usize, dst: &mut [i16], tr_size: usize) {
    for y in 0..tr_size {
        for x in 0..tr_size {
            dst[y * tr_size + x] = fenc[y * fenc_stride + x] as i16;
        }
    }
}
