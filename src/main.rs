use clap::Parser;
use colored::*;
use debug_print::*;
use num_traits::FromPrimitive;
use std::io;
use std::process;
use std::sync::Arc;
use wrquant::block_io::*;
use wrquant::common::*;
use wrquant::config::*;
use wrquant::est_bits::*;
use wrquant::noise_reduction::*;
use wrquant::quantizer::*;
use wrquant::scan::*;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to input coefficients, whitespace separated in raster order ("-" for stdin)
    #[clap(short, long)]
    input: String,
    /// Path to output ("-" for stdout)
    #[clap(short, long, default_value = "-")]
    output: String,
    /// Log2 of the block size (2..5)
    #[clap(long)]
    log2_size: usize,
    /// Luma quantization parameter
    #[clap(long)]
    qp: i32,
    /// Colour component (0: luma, 1: cb, 2: cr)
    #[clap(long, default_value_t = 0)]
    chroma: usize,
    /// Blocks are intra predicted
    #[clap(long)]
    intra: bool,
    /// Blocks belong to an I slice
    #[clap(long)]
    i_slice: bool,
    /// Coefficient scan (0: diagonal, 1: horizontal, 2: vertical)
    #[clap(long, default_value_t = 0)]
    scan: usize,
    /// Lagrange multiplier for RDOQ (default derived from qp)
    #[clap(long)]
    lambda: Option<f64>,
    /// Transform tree depth of the blocks
    #[clap(long, default_value_t = 0)]
    tr_depth: usize,
    /// Extra parameters (PARAM1=VAL1[,PARAM2=VAL2,...])
    #[clap(long)]
    extra_params: Option<String>,
}

fn default_lambda(qp: i32) -> f64 {
    0.57 * 2.0f64.powf((qp - 12) as f64 / 3.0)
}

fn write_result(
    writer: &mut BlockWriter,
    block_index: usize,
    levels: &[Coeff],
    num_sig: u32,
    dequant: &[Coeff],
    width: usize,
) -> io::Result<()> {
    writer.write_value("block", block_index)?;
    writer.write_block("levels", levels, width)?;
    writer.write_value("num_sig", num_sig)?;
    writer.write_block("dequant", dequant, width)
}

/// Range checks the clap can not express. Returns the component and scan.
fn check_args(args: &Args) -> Result<(TextType, ScanType), String> {
    if !(MIN_LOG2_TR_SIZE..=MAX_LOG2_TR_SIZE).contains(&args.log2_size) {
        return Err(format!("invalid log2-size: {}", args.log2_size));
    }
    if args.tr_depth > MAX_TR_DEPTH {
        return Err(format!("invalid tr-depth: {}", args.tr_depth));
    }
    let ttype = TextType::from_usize(args.chroma).ok_or(format!("invalid chroma: {}", args.chroma))?;
    let scan_type = ScanType::from_usize(args.scan).ok_or(format!("invalid scan: {}", args.scan))?;
    Ok((ttype, scan_type))
}

fn main() {
    let args = Args::parse();

    let (ttype, scan_type) = match check_args(&args) {
        Ok(v) => v,
        Err(e) => {
            eprintln!("{}: {}", "error".red(), e);
            process::exit(1);
        }
    };

    let mut cfg = QuantConfig::default();
    if let Some(extra_params) = &args.extra_params {
        if let Err(e) = cfg.apply_extra_params(extra_params) {
            eprintln!("{}: invalid extra-params: {}", "error".red(), e);
            process::exit(1);
        }
    }
    debug_eprintln!("{:?}", cfg);

    // initialize block reader
    let stdin = io::stdin();
    let mut reader = if args.input == *"-" {
        BlockReader::standard(&stdin)
    } else {
        match BlockReader::file(&args.input) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("{}: failed to open input file: {}", "error".red(), e);
                process::exit(1);
            }
        }
    };

    // initialize block writer
    let stdout = io::stdout();
    let mut writer = if args.output == *"-" {
        BlockWriter::standard(&stdout)
    } else {
        match BlockWriter::file(&args.output) {
            Ok(f) => f,
            Err(e) => {
                eprintln!("{}: failed to open output file: {}", "error".red(), e);
                process::exit(1);
            }
        }
    };

    let scaling_list = Arc::new(cfg.scaling_list.build());
    let mut quantizer = Quantizer::new(&cfg, scaling_list);
    quantizer.set_qp_for_quant(args.qp, 0, 0, ChromaFormat::YCbCr420);
    let lambda = args.lambda.unwrap_or_else(|| default_lambda(args.qp));
    quantizer.set_lambdas(lambda, lambda, lambda);
    let est_bits = EstBits::uniform();
    let mut nr = if cfg.noise_reduction > 0 {
        Some(NoiseReduction::new())
    } else {
        None
    };

    let mut tu = TransformUnit::new(args.log2_size, ttype);
    tu.is_intra = args.intra;
    tu.slice_type = if args.i_slice {
        SliceType::I_SLICE
    } else {
        SliceType::B_SLICE
    };
    tu.tr_depth = args.tr_depth;
    tu.scan_type = scan_type;
    tu.sign_hide = cfg.sign_hide;

    let num_coeff = tu.num_coeff();
    let mut levels = vec![0; num_coeff];
    let mut dequant = vec![0; num_coeff];
    let mut block_index = 0;
    loop {
        let mut block = match reader.read_block(num_coeff) {
            Ok(Some(block)) => block,
            Ok(None) => break,
            Err(e) => {
                eprintln!("{}: failed to read block {}: {}", "error".red(), block_index, e);
                process::exit(1);
            }
        };
        if let Some(nr) = nr.as_mut() {
            if !tu.is_intra {
                nr.denoise(NoiseReduction::category(tu.log2_tr_size, ttype.is_luma()), &mut block);
                nr.update_offsets(cfg.noise_reduction);
            }
        }
        let num_sig = quantizer.quantize_block(&tu, &block, None, &mut levels, &est_bits);
        quantizer.dequantize(&tu, &levels, &mut dequant);
        debug_eprintln!("block {}: {} levels", block_index, num_sig);

        if let Err(e) = write_result(&mut writer, block_index, &levels, num_sig, &dequant, tu.tr_size()) {
            eprintln!("{}: failed to write output: {}", "error".red(), e);
            process::exit(1);
        }
        block_index += 1;
    }
    if let Err(e) = writer.flush() {
        eprintln!("{}: failed to write output: {}", "error".red(), e);
        process::exit(1);
    }
}
