#![allow(clippy::comparison_chain)]
#![allow(clippy::too_many_arguments)]
extern crate num;
#[macro_use]
extern crate num_derive;

pub mod block_io;
pub mod coeff_context;
pub mod common;
pub mod config;
pub mod est_bits;
pub mod forward_quant;
pub mod noise_reduction;
pub mod quantizer;
pub mod rdoq;
pub mod scaling_list;
pub mod scan;
pub mod sign_hiding;
pub mod transformer;
