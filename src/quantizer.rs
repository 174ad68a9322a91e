use super::common::*;
use super::config::*;
use super::est_bits::*;
use super::forward_quant::*;
use super::noise_reduction::*;
use super::rdoq::*;
use super::scaling_list::*;
use super::scan::*;
use super::sign_hiding::*;
use super::transformer::*;
use debug_print::debug_eprintln;
use std::sync::Arc;

const MAX_CHROMA_QP: i32 = 57;
const MAX_QP: i32 = 51;

// qPi 30..=43, above that the mapping is qPi - 6
const CHROMA_QP_TABLE_420: [i32; 14] = [29, 30, 31, 32, 33, 33, 34, 34, 35, 35, 36, 36, 37, 37];

/// Chroma QP for `qp` (luma QP plus the chroma offset), before the bit depth
/// offset is added. Out of range values are clipped.
pub fn chroma_qp(qp: i32, bit_depth: usize, chroma_format: ChromaFormat) -> i32 {
    let qp = qp.clamp(-qp_bd_offset(bit_depth), MAX_CHROMA_QP);
    if qp < 30 {
        qp
    } else if chroma_format == ChromaFormat::YCbCr420 {
        if qp > 43 {
            qp - 6
        } else {
            CHROMA_QP_TABLE_420[(qp - 30) as usize]
        }
    } else {
        qp.min(MAX_QP)
    }
}

/// Quantization engine of one encoder thread.
///
/// Holds the QP and lambda of every colour component for the current coding
/// unit and the scratch buffers of the forward and inverse paths. The scaling
/// list is shared between threads.
pub struct Quantizer {
    scaling_list: Arc<ScalingList>,
    qp_param: [QpParam; 3],
    lambdas: [f64; 3],
    psy_rdoq_scale: u64,
    use_rdoq: bool,
    bit_depth: usize,
    // residual coefficients, then the source coefficients for psy-rdoq
    dct_buf: Vec<Coeff>,
    fenc_short_buf: Vec<i16>,
    delta_u: Vec<i32>,
    rdoq: RdoqScratch,
}

impl Quantizer {
    pub fn new(cfg: &QuantConfig, scaling_list: Arc<ScalingList>) -> Quantizer {
        debug_assert!((8..=10).contains(&cfg.bit_depth));
        let mut quantizer = Quantizer {
            scaling_list,
            qp_param: [QpParam::default(); 3],
            lambdas: [0.0; 3],
            psy_rdoq_scale: cfg.psy_rdoq_scale(),
            use_rdoq: cfg.use_rdoq,
            bit_depth: cfg.bit_depth,
            dct_buf: vec![0; MAX_TR_COEFFS * 2],
            fenc_short_buf: vec![0; MAX_TR_COEFFS],
            delta_u: vec![0; MAX_TR_COEFFS],
            rdoq: RdoqScratch::new(),
        };
        quantizer.set_qp_for_quant(0, 0, 0, ChromaFormat::YCbCr420);
        quantizer
    }

    pub fn set_lambdas(&mut self, luma: f64, cb: f64, cr: f64) {
        self.lambdas = [luma, cb, cr];
    }

    /// Derives the QP of all three components from the luma QP and the
    /// chroma offsets.
    pub fn set_qp_for_quant(&mut self, qpy: i32, cb_offset: i32, cr_offset: i32, chroma_format: ChromaFormat) {
        let qp_bd_offset = qp_bd_offset(self.bit_depth);
        let qpy = qpy.clamp(-qp_bd_offset, MAX_QP);
        self.qp_param[TextType::Luma as usize] = QpParam::new(qpy + qp_bd_offset);
        self.set_chroma_qp(qpy + cb_offset, TextType::ChromaU, chroma_format);
        self.set_chroma_qp(qpy + cr_offset, TextType::ChromaV, chroma_format);
    }

    pub fn set_chroma_qp(&mut self, qp: i32, ttype: TextType, chroma_format: ChromaFormat) {
        debug_assert!(!ttype.is_luma());
        let qp = chroma_qp(qp, self.bit_depth, chroma_format);
        self.qp_param[ttype as usize] = QpParam::new(qp + qp_bd_offset(self.bit_depth));
    }

    #[inline(always)]
    pub fn qp_param(&self, ttype: TextType) -> QpParam {
        self.qp_param[ttype as usize]
    }

    #[inline(always)]
    pub fn lambda(&self, ttype: TextType) -> f64 {
        self.lambdas[ttype as usize]
    }

    pub fn scaling_list(&self) -> &ScalingList {
        &self.scaling_list
    }

    /// Transforms and quantizes one residual block into `coeff`, returning
    /// the number of non-zero levels.
    ///
    /// `fenc` is the source block, read only for psy-rdoq. When `nr` is given
    /// the coefficients of inter blocks are denoised first.
    pub fn transform_nxn(
        &mut self,
        tu: &TransformUnit,
        fenc: &[Pixel],
        fenc_stride: usize,
        residual: &[i16],
        resi_stride: usize,
        coeff: &mut [Coeff],
        est_bits: &EstBits,
        nr: Option<&mut NoiseReduction>,
        transformer: &dyn Transformer,
    ) -> u32 {
        let tr_size = tu.tr_size();
        let num_coeff = tu.num_coeff();
        if tu.transquant_bypass {
            return bypass_forward(residual, resi_stride, coeff, tr_size);
        }

        let (resi_dct, fenc_dct) = self.dct_buf.split_at_mut(MAX_TR_COEFFS);
        let resi_dct = &mut resi_dct[..num_coeff];
        if tu.transform_skip {
            let shift = transform_shift(self.bit_depth, tu.log2_tr_size);
            transform_skip_forward(residual, resi_stride, resi_dct, shift, tr_size);
        } else {
            let kind = TransformKind::select(tu.log2_tr_size, tu.uses_dst());
            transformer.forward(kind, self.bit_depth, residual, resi_stride, resi_dct);

            if self.psy_rdoq_scale != 0 && tu.ttype.is_luma() {
                let fenc_short = &mut self.fenc_short_buf[..num_coeff];
                copy_pixels(fenc, fenc_stride, fenc_short, tr_size);
                transformer.forward(kind, self.bit_depth, fenc_short, tr_size, &mut fenc_dct[..num_coeff]);
            }

            if let Some(nr) = nr {
                if !tu.is_intra {
                    let cat = NoiseReduction::category(tu.log2_tr_size, tu.ttype.is_luma());
                    nr.denoise(cat, resi_dct);
                }
            }
        }

        self.quant_dct_buf(tu, coeff, est_bits, true)
    }

    /// Quantizes already transformed coefficients. `fenc_dct` is the
    /// transform of the source block; without it psy-rdoq is skipped.
    pub fn quantize_block(
        &mut self,
        tu: &TransformUnit,
        coeffs: &[Coeff],
        fenc_dct: Option<&[Coeff]>,
        dst: &mut [Coeff],
        est_bits: &EstBits,
    ) -> u32 {
        let num_coeff = tu.num_coeff();
        let (resi_dct, fenc_buf) = self.dct_buf.split_at_mut(MAX_TR_COEFFS);
        resi_dct[..num_coeff].copy_from_slice(&coeffs[..num_coeff]);
        if let Some(fenc_dct) = fenc_dct {
            fenc_buf[..num_coeff].copy_from_slice(&fenc_dct[..num_coeff]);
        }
        self.quant_dct_buf(tu, dst, est_bits, fenc_dct.is_some())
    }

    /// Psy-rdoq is only applied when `has_fenc_dct` says the second half of
    /// `dct_buf` holds the source transform.
    fn quant_dct_buf(
        &mut self,
        tu: &TransformUnit,
        dst: &mut [Coeff],
        est_bits: &EstBits,
        has_fenc_dct: bool,
    ) -> u32 {
        let num_coeff = tu.num_coeff();
        let ttype = tu.ttype as usize;
        let qp = self.qp_param[ttype];
        let list = tu.scaling_list_type();
        let quant_coef = self.scaling_list.quant_coef(tu.log2_tr_size, list, qp.rem);
        let coding = TuCodingParams::new(tu.log2_tr_size, tu.scan_type, tu.ttype.is_luma());
        let (resi_dct, fenc_dct) = self.dct_buf.split_at(MAX_TR_COEFFS);
        let resi_dct = &resi_dct[..num_coeff];

        if self.use_rdoq {
            let params = RdoqParams {
                tu,
                coding: &coding,
                qp,
                bit_depth: self.bit_depth,
                lambda: self.lambdas[ttype],
                quant_coef,
                unquant_scale: self.scaling_list.dequant_coef(tu.log2_tr_size, list, qp.rem),
                est_bits,
                psy_scale: if has_fenc_dct { self.psy_rdoq_scale } else { 0 },
            };
            return rdo_quant(&params, resi_dct, &fenc_dct[..num_coeff], dst, &mut self.rdoq);
        }

        let qbits = QUANT_SHIFT + qp.per + transform_shift(self.bit_depth, tu.log2_tr_size);
        let bias: i64 = if tu.slice_type == SliceType::I_SLICE { 171 } else { 85 };
        let add = bias << (qbits - 9);
        let delta_u = &mut self.delta_u[..num_coeff];
        let num_sig = quant(resi_dct, quant_coef, delta_u, &mut dst[..num_coeff], qbits, add);
        if num_sig >= 2 && tu.sign_hide {
            let num_sig = sign_bit_hiding_hdq(&mut dst[..num_coeff], resi_dct, delta_u, num_sig, &coding);
            debug_eprintln!("quant: {} levels after sign hiding", num_sig);
            num_sig
        } else {
            num_sig
        }
    }

    fn dequant_into(
        scaling_list: &ScalingList,
        qp: QpParam,
        bit_depth: usize,
        tu: &TransformUnit,
        coeff: &[Coeff],
        out: &mut [Coeff],
    ) {
        let num_coeff = tu.num_coeff();
        let shift = QUANT_IQUANT_SHIFT - QUANT_SHIFT - transform_shift(bit_depth, tu.log2_tr_size);
        if scaling_list.enabled {
            let dequant_coef = scaling_list.dequant_coef(tu.log2_tr_size, tu.scaling_list_type(), qp.rem);
            dequant_scaling(&coeff[..num_coeff], dequant_coef, &mut out[..num_coeff], qp.per, shift);
        } else {
            let scale = INV_QUANT_SCALES[qp.rem] << qp.per;
            dequant_normal(&coeff[..num_coeff], &mut out[..num_coeff], scale, shift);
        }
    }

    /// Scales levels back to transform coefficients.
    pub fn dequantize(&self, tu: &TransformUnit, coeff: &[Coeff], out: &mut [Coeff]) {
        Self::dequant_into(
            &self.scaling_list,
            self.qp_param[tu.ttype as usize],
            self.bit_depth,
            tu,
            coeff,
            out,
        );
    }

    /// Reconstructs the residual of a block from its levels.
    pub fn inv_transform_nxn(
        &mut self,
        tu: &TransformUnit,
        residual: &mut [i16],
        resi_stride: usize,
        coeff: &[Coeff],
        num_sig: u32,
        transformer: &dyn Transformer,
    ) {
        let tr_size = tu.tr_size();
        if tu.transquant_bypass {
            bypass_inverse(coeff, residual, resi_stride, tr_size);
            return;
        }
        debug_assert_eq!(num_sig, count_nonzero(&coeff[..tu.num_coeff()]));
        if num_sig == 0 {
            fill_block(residual, resi_stride, tr_size, 0);
            return;
        }

        let num_coeff = tu.num_coeff();
        let qp = self.qp_param[tu.ttype as usize];
        let resi_dct = &mut self.dct_buf[..num_coeff];
        Self::dequant_into(&self.scaling_list, qp, self.bit_depth, tu, coeff, resi_dct);

        if tu.transform_skip {
            let shift = transform_shift(self.bit_depth, tu.log2_tr_size);
            transform_skip_inverse(resi_dct, residual, resi_stride, shift, tr_size);
        } else if num_sig == 1 && coeff[0] != 0 && !tu.uses_dst() {
            let dc = dc_only_value(resi_dct[0], self.bit_depth);
            fill_block(residual, resi_stride, tr_size, dc);
        } else {
            let kind = TransformKind::select(tu.log2_tr_size, tu.uses_dst());
            transformer.inverse(kind, self.bit_depth, resi_dct, residual, resi_stride);
        }
    }
}
