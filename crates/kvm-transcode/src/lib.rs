//! Hardware-accelerated MJPEG decode / H.264 encode transcoding pipeline
//! for embedded remote-KVM boards, built on Rockchip's Media Process
//! Platform (`librockchip_mpp`).
//!
//! [`Transcoder`] is the single public entry point: it accepts one capture
//! frame per call (MJPEG, JPEG, NV12, NV16, RGB24, BGR24, YUYV, or YUV420)
//! and returns one H.264 frame, routing MJPEG/JPEG through the hardware
//! [`JpegDecoder`] stage, converting everything else that isn't already
//! NV12 on the CPU, and always finishing at the hardware [`H264Encoder`]
//! stage.

#![cfg_attr(docsrs, feature(doc_cfg))]

mod backend;
mod config;
mod convert;
mod decoder;
mod encoder;
mod ffi;
mod frame_size;
mod stats;
mod transcoder;

pub use config::{RcMode, TranscoderConfig, TranscoderConfigBuilder};
pub use decoder::JpegDecoder;
pub use encoder::H264Encoder;
pub use frame_size::frame_size;
pub use stats::Stats;
pub use transcoder::Transcoder;

pub use kvm_core::{Error, Frame, PixelFormat, Result};
