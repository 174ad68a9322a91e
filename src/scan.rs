use super::common::*;
use lazy_static::lazy_static;

#[derive(Clone, Copy, PartialEq, Eq, Debug, FromPrimitive)]
pub enum ScanType {
    Diag = 0,
    Hor = 1,
    Ver = 2,
}

const NUM_SCAN_TYPES: usize = 3;
const HOR_IDX: isize = 10;
const VER_IDX: isize = 26;

fn raster_scan(scan_type: ScanType, log2_size: usize) -> Vec<u16> {
    let size = 1 << log2_size;
    let mut order = Vec::with_capacity(size * size);
    match scan_type {
        ScanType::Diag => {
            // up-right diagonal: each anti-diagonal from bottom-left to top-right
            for d in 0..(2 * size - 1) {
                let mut y = d.min(size - 1) as isize;
                let mut x = d - y as usize;
                while y >= 0 && x < size {
                    order.push((y as usize * size + x) as u16);
                    y -= 1;
                    x += 1;
                }
            }
        }
        ScanType::Hor => {
            for y in 0..size {
                for x in 0..size {
                    order.push((y * size + x) as u16);
                }
            }
        }
        ScanType::Ver => {
            for x in 0..size {
                for y in 0..size {
                    order.push((y * size + x) as u16);
                }
            }
        }
    }
    order
}

lazy_static! {
    /// Coding group orders, indexed by [scan type][log2 size in groups].
    pub static ref SCAN_ORDER_CG: Vec<Vec<Vec<u16>>> = {
        let mut tables = vec![];
        for scan_type in [ScanType::Diag, ScanType::Hor, ScanType::Ver] {
            let mut by_size = vec![];
            for log2_size_cg in 0..=(MAX_LOG2_TR_SIZE - 2) {
                by_size.push(raster_scan(scan_type, log2_size_cg));
            }
            tables.push(by_size);
        }
        tables
    };

    /// Coefficient orders grouped by 4x4 coding group, indexed by
    /// [scan type][log2 block size - 2]. Values are raster positions in the block.
    pub static ref SCAN_ORDER: Vec<Vec<Vec<u16>>> = {
        let mut tables = vec![];
        for scan_type in [ScanType::Diag, ScanType::Hor, ScanType::Ver] {
            let in_group = raster_scan(scan_type, 2);
            let mut by_size = vec![];
            for log2_size in MIN_LOG2_TR_SIZE..=MAX_LOG2_TR_SIZE {
                let log2_size_cg = log2_size - 2;
                let size = 1 << log2_size;
                let mut order = Vec::with_capacity(size * size);
                for &cg in &SCAN_ORDER_CG[scan_type as usize][log2_size_cg] {
                    let cg_x = (cg as usize) & ((1 << log2_size_cg) - 1);
                    let cg_y = (cg as usize) >> log2_size_cg;
                    for &p in &in_group {
                        let x = (cg_x << 2) + (p as usize & 3);
                        let y = (cg_y << 2) + (p as usize >> 2);
                        order.push((y * size + x) as u16);
                    }
                }
                by_size.push(order);
            }
            tables.push(by_size);
        }
        debug_assert_eq!(tables.len(), NUM_SCAN_TYPES);
        tables
    };
}

impl ScanType {
    /// Mode dependent coefficient scan of intra blocks.
    pub fn for_intra(
        dir_mode: usize,
        log2_tr_size: usize,
        is_luma: bool,
        chroma_format: ChromaFormat,
    ) -> ScanType {
        let applies = if is_luma {
            log2_tr_size == 2 || log2_tr_size == 3
        } else {
            log2_tr_size == 2 || (log2_tr_size == 3 && chroma_format == ChromaFormat::YCbCr444)
        };
        if !applies {
            return ScanType::Diag;
        }
        let mode = dir_mode as isize;
        if (mode - VER_IDX).abs() <= 4 {
            ScanType::Hor
        } else if (mode - HOR_IDX).abs() <= 4 {
            ScanType::Ver
        } else {
            ScanType::Diag
        }
    }
}

/// Scan metadata of one transform block for significance map coding.
#[derive(Clone, Copy, Debug)]
pub struct TuCodingParams {
    pub scan: &'static [u16],
    pub scan_cg: &'static [u16],
    pub scan_type: ScanType,
    pub log2_tr_size_cg: usize,
    pub first_significance_map_context: usize,
}

impl TuCodingParams {
    pub fn new(log2_tr_size: usize, scan_type: ScanType, is_luma: bool) -> TuCodingParams {
        debug_assert!((MIN_LOG2_TR_SIZE..=MAX_LOG2_TR_SIZE).contains(&log2_tr_size));
        let log2_tr_size_cg = log2_tr_size - 2;
        let first_significance_map_context = if log2_tr_size == 2 {
            0
        } else if log2_tr_size == 3 {
            if scan_type != ScanType::Diag && is_luma {
                15
            } else {
                9
            }
        } else if is_luma {
            21
        } else {
            12
        };
        TuCodingParams {
            scan: &SCAN_ORDER[scan_type as usize][log2_tr_size - 2],
            scan_cg: &SCAN_ORDER_CG[scan_type as usize][log2_tr_size_cg],
            scan_type,
            log2_tr_size_cg,
            first_significance_map_context,
        }
    }

    #[inline(always)]
    pub fn num_cg(&self) -> usize {
        1 << (self.log2_tr_size_cg * 2)
    }
}
