//! Raw bindings to Rockchip's Media Process Platform (`librockchip_mpp`).
//!
//! This mirrors the subset of `rk_mpi.h` / `mpp_frame.h` / `mpp_packet.h` /
//! `mpp_meta.h` the decoder and encoder backends need. It is intentionally
//! narrow: no bindgen-generated surface, just the handful of opaque handles,
//! function-pointer table entries, and control-command ordinals this crate
//! actually calls, named to match the vendor headers so the real backend
//! code in [`crate::backend`] reads the same as the upstream C call sites it
//! is grounded on.
#![allow(non_camel_case_types)]

use std::os::raw::{c_int, c_void};

pub type MppCtx = *mut c_void;
pub type MppFrame = *mut c_void;
pub type MppPacket = *mut c_void;
pub type MppBuffer = *mut c_void;
pub type MppBufferGroup = *mut c_void;
pub type MppMeta = *mut c_void;
pub type MppEncCfg = *mut c_void;
pub type MppDecCfg = *mut c_void;
pub type MppRet = c_int;

pub const MPP_OK: MppRet = 0;

/// `MppCtxType`.
pub const MPP_CTX_DEC: c_int = 0;
pub const MPP_CTX_ENC: c_int = 1;

/// `MppCodingType`.
pub const MPP_VIDEO_CODING_MJPEG: c_int = 0x8;
pub const MPP_VIDEO_CODING_AVC: c_int = 0x7;

/// `MppFrameFormat`. NV12 is `YUV420SP` in MPP's naming.
pub const MPP_FMT_YUV420SP: c_int = 0x0;

/// `MppFrameColorRange`.
pub const MPP_FRAME_RANGE_JPEG: c_int = 1;

/// Buffer-group type/flag bits (`MppBufferType` / `mpp_buffer_type.h`).
pub const MPP_BUFFER_TYPE_DRM: u32 = 0x4;
pub const MPP_BUFFER_FLAGS_CACHABLE: u32 = 0x0 << 16;
pub const MPP_BUFFER_FLAGS_DMA: u32 = 0x1 << 16;

/// `MpiCmd` control ordinals used by this crate.
pub const MPP_SET_OUTPUT_TIMEOUT: c_int = 0x0100;
pub const MPP_DEC_SET_OUTPUT_FORMAT: c_int = 0x0308;
pub const MPP_DEC_GET_CFG: c_int = 0x030a;
pub const MPP_DEC_SET_CFG: c_int = 0x030b;
pub const MPP_DEC_SET_EXT_BUF_GROUP: c_int = 0x0305;
pub const MPP_DEC_SET_INFO_CHANGE_READY: c_int = 0x0306;
pub const MPP_ENC_GET_CFG: c_int = 0x0408;
pub const MPP_ENC_SET_CFG: c_int = 0x0409;

/// `MppMeta` key ordinals (`mpp_meta.h`).
pub const KEY_OUTPUT_FRAME: u32 = 0x0001_0007;
pub const KEY_OUTPUT_PACKET: u32 = 0x0001_0008;
pub const KEY_MOTION_INFO: u32 = 0x0001_0009;
pub const KEY_OUTPUT_INTRA: u32 = 0x0001_000a;

/// MPP packet flag bit indicating a keyframe/IDR packet (`mpp_packet_impl.h`).
pub const MPP_PACKET_FLAG_INTRA: u32 = 0x0000_0010;

/// Poll/timeout mode: a fixed millisecond timeout rather than block-forever
/// or non-blocking-poll.
pub type MppPollType = c_int;

/// Function-pointer table returned by `mpp_create`, mirroring `MppApi` in
/// `rk_mpi.h`. Only the entry points this crate calls are declared; the real
/// struct carries more, but as a function-pointer table its layout is
/// append-only from the front, so a prefix-matching `#[repr(C)]` struct is
/// ABI-compatible as long as we never read past what we declare.
#[repr(C)]
pub struct MppApi {
    pub decode: unsafe extern "C" fn(ctx: MppCtx, packet: MppPacket, frame: *mut MppFrame) -> MppRet,
    pub decode_put_packet: unsafe extern "C" fn(ctx: MppCtx, packet: MppPacket) -> MppRet,
    pub decode_get_frame: unsafe extern "C" fn(ctx: MppCtx, frame: *mut MppFrame) -> MppRet,
    pub encode_put_frame: unsafe extern "C" fn(ctx: MppCtx, frame: MppFrame) -> MppRet,
    pub encode_get_packet: unsafe extern "C" fn(ctx: MppCtx, packet: *mut MppPacket) -> MppRet,
    pub reset: unsafe extern "C" fn(ctx: MppCtx) -> MppRet,
    pub control: unsafe extern "C" fn(ctx: MppCtx, cmd: c_int, param: *mut c_void) -> MppRet,
}

extern "C" {
    pub fn mpp_create(ctx: *mut MppCtx, mpi: *mut *mut MppApi) -> MppRet;
    pub fn mpp_init(ctx: MppCtx, ctx_type: c_int, coding: c_int) -> MppRet;
    pub fn mpp_destroy(ctx: MppCtx) -> MppRet;

    pub fn mpp_buffer_group_get_external(group: *mut MppBufferGroup, flags: u32) -> MppRet;
    pub fn mpp_buffer_group_get_internal(group: *mut MppBufferGroup, flags: u32) -> MppRet;
    pub fn mpp_buffer_group_put(group: MppBufferGroup) -> MppRet;
    pub fn mpp_buffer_get(group: MppBufferGroup, buffer: *mut MppBuffer, size: usize) -> MppRet;
    pub fn mpp_buffer_put(buffer: MppBuffer) -> MppRet;
    pub fn mpp_buffer_get_ptr(buffer: MppBuffer) -> *mut c_void;
    pub fn mpp_buffer_get_size(buffer: MppBuffer) -> usize;

    pub fn mpp_frame_init(frame: *mut MppFrame) -> MppRet;
    pub fn mpp_frame_deinit(frame: *mut MppFrame) -> MppRet;
    pub fn mpp_frame_get_info_change(frame: MppFrame) -> c_int;
    pub fn mpp_frame_get_eos(frame: MppFrame) -> c_int;
    pub fn mpp_frame_get_errinfo(frame: MppFrame) -> c_int;
    pub fn mpp_frame_get_discard(frame: MppFrame) -> c_int;
    pub fn mpp_frame_get_width(frame: MppFrame) -> u32;
    pub fn mpp_frame_get_height(frame: MppFrame) -> u32;
    pub fn mpp_frame_get_hor_stride(frame: MppFrame) -> u32;
    pub fn mpp_frame_get_ver_stride(frame: MppFrame) -> u32;
    pub fn mpp_frame_get_buf_size(frame: MppFrame) -> u32;
    pub fn mpp_frame_get_buffer(frame: MppFrame) -> MppBuffer;
    pub fn mpp_frame_get_meta(frame: MppFrame) -> MppMeta;
    pub fn mpp_frame_set_width(frame: MppFrame, width: u32);
    pub fn mpp_frame_set_height(frame: MppFrame, height: u32);
    pub fn mpp_frame_set_hor_stride(frame: MppFrame, stride: u32);
    pub fn mpp_frame_set_ver_stride(frame: MppFrame, stride: u32);
    pub fn mpp_frame_set_fmt(frame: MppFrame, fmt: c_int);
    pub fn mpp_frame_set_eos(frame: MppFrame, eos: u32);
    pub fn mpp_frame_set_buffer(frame: MppFrame, buffer: MppBuffer);

    pub fn mpp_packet_init_with_buffer(packet: *mut MppPacket, buffer: MppBuffer) -> MppRet;
    pub fn mpp_packet_init(packet: *mut MppPacket, data: *mut c_void, size: usize) -> MppRet;
    pub fn mpp_packet_deinit(packet: *mut MppPacket) -> MppRet;
    pub fn mpp_packet_get_data(packet: MppPacket) -> *mut c_void;
    pub fn mpp_packet_get_length(packet: MppPacket) -> usize;
    pub fn mpp_packet_set_length(packet: MppPacket, length: usize);
    pub fn mpp_packet_get_pos(packet: MppPacket) -> *mut c_void;
    pub fn mpp_packet_get_flag(packet: MppPacket) -> u32;
    pub fn mpp_packet_get_meta(packet: MppPacket) -> MppMeta;

    pub fn mpp_meta_set_packet(meta: MppMeta, key: u32, packet: MppPacket) -> MppRet;
    pub fn mpp_meta_set_buffer(meta: MppMeta, key: u32, buffer: MppBuffer) -> MppRet;
    pub fn mpp_meta_set_s32(meta: MppMeta, key: u32, value: i32) -> MppRet;
    pub fn mpp_meta_get_s32(meta: MppMeta, key: u32, value: *mut i32) -> MppRet;

    pub fn mpp_dec_cfg_init(cfg: *mut MppDecCfg) -> MppRet;
    pub fn mpp_dec_cfg_deinit(cfg: MppDecCfg) -> MppRet;
    pub fn mpp_dec_cfg_set_u32(cfg: MppDecCfg, name: *const std::os::raw::c_char, value: u32) -> MppRet;

    pub fn mpp_enc_cfg_init(cfg: *mut MppEncCfg) -> MppRet;
    pub fn mpp_enc_cfg_deinit(cfg: MppEncCfg) -> MppRet;
    pub fn mpp_enc_cfg_set_s32(cfg: MppEncCfg, name: *const std::os::raw::c_char, value: i32) -> MppRet;
    pub fn mpp_enc_cfg_set_u32(cfg: MppEncCfg, name: *const std::os::raw::c_char, value: u32) -> MppRet;
}

/// `errno`-free translation of an `MppRet` into our error taxonomy, used by
/// every FFI call site in [`crate::backend`].
pub fn check(ret: MppRet, context: &str) -> kvm_core::Result<()> {
    if ret == MPP_OK {
        Ok(())
    } else {
        Err(kvm_core::Error::HardwareFailure(format!("{context} failed: mpp returned {ret}")))
    }
}
