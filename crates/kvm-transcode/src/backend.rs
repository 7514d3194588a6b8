//! The narrow seam between the decoder/encoder stage logic and the real
//! Rockchip MPP hardware context.
//!
//! Mirrors `kvm_display::device`'s `DrmBackend`/`KmsBackend` split: a trait
//! captures exactly the MPP operations [`JpegDecoder`](crate::JpegDecoder)
//! and [`H264Encoder`](crate::H264Encoder) need, a real implementation wraps
//! the FFI layer in `crate::ffi`, and a `#[cfg(test)]` fake lets the stage
//! logic (info-change handling, the encoder retrieval loop, keyframe
//! bookkeeping) be exercised with no hardware present.

use std::ptr;

use kvm_core::{Error, Result};

use crate::config::TranscoderConfig;
use crate::ffi::{self, MppApi, MppBufferGroup, MppCtx, MppFrame, MppPacket};

/// A frame decoded by the hardware, still carrying MPP's info-change /
/// discard / error sentinels for the decoder stage to interpret.
#[derive(Debug, Clone, Default)]
pub struct RawDecodedFrame {
    pub info_change: bool,
    pub eos: bool,
    pub error: bool,
    pub discard: bool,
    pub width: u32,
    pub height: u32,
    pub hor_stride: u32,
    pub ver_stride: u32,
    /// NV12 bytes (`hor_stride * ver_stride * 3 / 2`), empty when
    /// `info_change`/`error`/`discard` is set.
    pub data: Vec<u8>,
}

/// A packet emitted by the hardware H.264 encoder.
#[derive(Debug, Clone, Default)]
pub struct RawEncodedPacket {
    pub data: Vec<u8>,
    pub is_keyframe: bool,
}

/// MJPEG decode operations needed by [`JpegDecoder`](crate::JpegDecoder).
pub trait DecoderBackend: Send {
    fn put_packet(&mut self, jpeg: &[u8]) -> Result<()>;
    fn get_frame(&mut self) -> Result<RawDecodedFrame>;
    /// Provision the external output-buffer group once the hardware has
    /// reported its first info-change event.
    fn attach_output_group(&mut self, slot_size: usize, slot_count: u32) -> Result<()>;
    /// Acknowledge a pending info-change so the hardware resumes decoding.
    fn acknowledge_info_change(&mut self) -> Result<()>;
    fn reset(&mut self) -> Result<()>;
}

/// H.264 encode operations needed by [`H264Encoder`](crate::H264Encoder).
pub trait EncoderBackend: Send {
    fn apply_config(&mut self, cfg: &TranscoderConfig) -> Result<()>;
    fn put_frame(&mut self, nv12: &[u8], width: u32, height: u32, hor_stride: u32, ver_stride: u32, force_key: bool) -> Result<()>;
    /// One retrieval attempt. `Ok(None)` is MPP's timeout-as-no-packet-yet
    /// result; the encoder stage retries this, it is not a failure.
    fn try_get_packet(&mut self) -> Result<Option<RawEncodedPacket>>;
    fn reset(&mut self) -> Result<()>;
}

/// Borrow an `MppApi` function pointer and call it, translating a non-OK
/// `MppRet` into our error taxonomy. `$ctx` must be a live `MppCtx`.
macro_rules! mpi_call {
    ($mpi:expr, $ctx:expr, $method:ident, $context:literal $(, $arg:expr)*) => {{
        // SAFETY: `$mpi` points at a live `MppApi` table for the lifetime of
        // the owning backend, and `$ctx` is that same backend's context.
        let ret = unsafe { ((*$mpi).$method)($ctx, $($arg),*) };
        ffi::check(ret, $context)
    }};
}

fn cstr(name: &str) -> std::ffi::CString {
    std::ffi::CString::new(name).expect("config key has no interior NUL")
}

/// A real MPP MJPEG decoder context.
pub struct MppDecoderBackend {
    ctx: MppCtx,
    mpi: *mut MppApi,
    frm_grp: MppBufferGroup,
    /// Internal cacheable group input packets are drawn from, per packet.
    pkt_grp: MppBufferGroup,
}

// SAFETY: the MPP context is used exclusively through `&mut self` methods;
// no two threads ever hold a live call into the same context concurrently.
unsafe impl Send for MppDecoderBackend {}

impl MppDecoderBackend {
    pub fn new() -> Result<Self> {
        let mut ctx: MppCtx = ptr::null_mut();
        let mut mpi: *mut MppApi = ptr::null_mut();
        // SAFETY: out-params are valid, non-aliased pointers to stack locals.
        let ret = unsafe { ffi::mpp_create(&mut ctx, &mut mpi) };
        ffi::check(ret, "mpp_create")?;

        // SAFETY: `ctx` was just created by `mpp_create`.
        let ret = unsafe { ffi::mpp_init(ctx, ffi::MPP_CTX_DEC, ffi::MPP_VIDEO_CODING_MJPEG) };
        ffi::check(ret, "mpp_init(MJPEG decoder)")?;

        let mut pkt_grp: MppBufferGroup = ptr::null_mut();
        // SAFETY: out-param is a valid pointer to a stack local.
        let ret = unsafe { ffi::mpp_buffer_group_get_internal(&mut pkt_grp, ffi::MPP_BUFFER_FLAGS_CACHABLE) };
        ffi::check(ret, "mpp_buffer_group_get_internal(input packets)")?;

        let mut backend = Self {
            ctx,
            mpi,
            frm_grp: ptr::null_mut(),
            pkt_grp,
        };
        backend.configure()?;
        Ok(backend)
    }

    fn configure(&mut self) -> Result<()> {
        let mut timeout: ffi::MppPollType = 100;
        mpi_call!(self.mpi, self.ctx, control, "set output timeout", ffi::MPP_SET_OUTPUT_TIMEOUT, (&mut timeout as *mut _).cast())?;

        let mut fmt = ffi::MPP_FMT_YUV420SP;
        mpi_call!(self.mpi, self.ctx, control, "set output format", ffi::MPP_DEC_SET_OUTPUT_FORMAT, (&mut fmt as *mut _).cast())?;

        let mut dec_cfg: ffi::MppDecCfg = ptr::null_mut();
        // SAFETY: out-param is a valid pointer to a stack local.
        if unsafe { ffi::mpp_dec_cfg_init(&mut dec_cfg) } == ffi::MPP_OK {
            mpi_call!(self.mpi, self.ctx, control, "get decoder cfg", ffi::MPP_DEC_GET_CFG, dec_cfg.cast())?;
            let key = cstr("base:split_parse");
            // SAFETY: `dec_cfg` was just populated above; `key` is a valid
            // NUL-terminated C string for the duration of this call.
            unsafe { ffi::mpp_dec_cfg_set_u32(dec_cfg, key.as_ptr(), 1) };
            mpi_call!(self.mpi, self.ctx, control, "set decoder cfg", ffi::MPP_DEC_SET_CFG, dec_cfg.cast())?;
            // SAFETY: `dec_cfg` is a valid handle obtained above.
            unsafe { ffi::mpp_dec_cfg_deinit(dec_cfg) };
        }

        Ok(())
    }
}

impl DecoderBackend for MppDecoderBackend {
    fn put_packet(&mut self, jpeg: &[u8]) -> Result<()> {
        // Draw a fresh input buffer from the internal group, sized to this
        // packet, and copy the JPEG payload into it rather than wrapping the
        // caller's slice directly.
        let mut buffer: ffi::MppBuffer = ptr::null_mut();
        // SAFETY: `self.pkt_grp` was created in `new` and outlives this call.
        ffi::check(unsafe { ffi::mpp_buffer_get(self.pkt_grp, &mut buffer, jpeg.len().max(1)) }, "mpp_buffer_get(input packet)")?;
        // SAFETY: `buffer` was just allocated with at least `jpeg.len()` bytes.
        let ptr = unsafe { ffi::mpp_buffer_get_ptr(buffer) };
        if !ptr.is_null() && !jpeg.is_empty() {
            // SAFETY: `ptr` is valid for `jpeg.len()` bytes.
            unsafe { std::ptr::copy_nonoverlapping(jpeg.as_ptr(), ptr.cast::<u8>(), jpeg.len()) };
        }

        let mut packet: MppPacket = ptr::null_mut();
        // SAFETY: `buffer` is a live handle sized above.
        let ret = unsafe { ffi::mpp_packet_init_with_buffer(&mut packet, buffer) };
        if ret != ffi::MPP_OK {
            // SAFETY: `buffer` was allocated above and is otherwise unused.
            unsafe { ffi::mpp_buffer_put(buffer) };
            return Err(Error::HardwareFailure(format!("mpp_packet_init_with_buffer failed: mpp returned {ret}")));
        }
        // SAFETY: `packet` was just initialized against `buffer`.
        unsafe { ffi::mpp_packet_set_length(packet, jpeg.len()) };

        let result = mpi_call!(self.mpi, self.ctx, decode_put_packet, "decode_put_packet", packet);
        // SAFETY: `packet` wraps `buffer`; deinit releases the packet
        // wrapper, and `buffer` is returned to the group once the hardware
        // no longer references it.
        unsafe {
            ffi::mpp_packet_deinit(&mut packet);
            ffi::mpp_buffer_put(buffer);
        }
        result
    }

    fn get_frame(&mut self) -> Result<RawDecodedFrame> {
        let mut frame: MppFrame = ptr::null_mut();
        // SAFETY: `&mut frame` is a valid out-param pointer.
        let ret = unsafe { (*self.mpi).decode_get_frame }(self.ctx, &mut frame);
        if ret != ffi::MPP_OK {
            return Err(Error::Timeout);
        }
        if frame.is_null() {
            return Err(Error::Timeout);
        }

        // SAFETY: `frame` is a live handle the hardware just returned.
        let info_change = unsafe { ffi::mpp_frame_get_info_change(frame) } != 0;
        let eos = unsafe { ffi::mpp_frame_get_eos(frame) } != 0;
        let error = unsafe { ffi::mpp_frame_get_errinfo(frame) } != 0;
        let discard = unsafe { ffi::mpp_frame_get_discard(frame) } != 0;
        let width = unsafe { ffi::mpp_frame_get_width(frame) };
        let height = unsafe { ffi::mpp_frame_get_height(frame) };
        let hor_stride = unsafe { ffi::mpp_frame_get_hor_stride(frame) };
        let ver_stride = unsafe { ffi::mpp_frame_get_ver_stride(frame) };

        let data = if info_change || error || discard {
            Vec::new()
        } else {
            // SAFETY: `frame` carries a live buffer whenever none of the
            // above sentinels are set.
            let buffer = unsafe { ffi::mpp_frame_get_buffer(frame) };
            if buffer.is_null() {
                Vec::new()
            } else {
                // SAFETY: `buffer` is owned by `frame`, valid until `frame`
                // is released below.
                let ptr = unsafe { ffi::mpp_buffer_get_ptr(buffer) };
                let size = unsafe { ffi::mpp_buffer_get_size(buffer) };
                if ptr.is_null() || size == 0 {
                    Vec::new()
                } else {
                    // SAFETY: `ptr` is valid for `size` bytes for as long as
                    // `buffer`/`frame` are alive, which covers this copy.
                    unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), size) }.to_vec()
                }
            }
        };

        // SAFETY: `frame` was allocated by `decode_get_frame`; MPP frames
        // are released through `mpp_frame_deinit`.
        unsafe { ffi::mpp_frame_deinit(&mut frame) };

        Ok(RawDecodedFrame {
            info_change,
            eos,
            error,
            discard,
            width,
            height,
            hor_stride,
            ver_stride,
            data,
        })
    }

    fn attach_output_group(&mut self, slot_size: usize, slot_count: u32) -> Result<()> {
        if self.frm_grp.is_null() {
            // SAFETY: out-param is a valid pointer to `self.frm_grp`.
            let ret = unsafe {
                ffi::mpp_buffer_group_get_external(&mut self.frm_grp, ffi::MPP_BUFFER_TYPE_DRM | ffi::MPP_BUFFER_FLAGS_CACHABLE)
            };
            ffi::check(ret, "mpp_buffer_group_get_external")?;

            for _ in 0..slot_count {
                let mut buffer = ptr::null_mut();
                // SAFETY: `self.frm_grp` was just created above.
                let ret = unsafe { ffi::mpp_buffer_get(self.frm_grp, &mut buffer, slot_size) };
                if ret != ffi::MPP_OK {
                    break;
                }
                // SAFETY: `buffer` was just allocated into the group; we
                // drop our reference immediately and let the group own it.
                unsafe { ffi::mpp_buffer_put(buffer) };
            }
        }

        mpi_call!(self.mpi, self.ctx, control, "set ext buf group", ffi::MPP_DEC_SET_EXT_BUF_GROUP, self.frm_grp.cast())
    }

    fn acknowledge_info_change(&mut self) -> Result<()> {
        mpi_call!(self.mpi, self.ctx, control, "set info change ready", ffi::MPP_DEC_SET_INFO_CHANGE_READY, ptr::null_mut())
    }

    fn reset(&mut self) -> Result<()> {
        mpi_call!(self.mpi, self.ctx, reset, "decoder reset")
    }
}

impl Drop for MppDecoderBackend {
    fn drop(&mut self) {
        if !self.frm_grp.is_null() {
            // SAFETY: `self.frm_grp` is a live group owned by this backend.
            unsafe { ffi::mpp_buffer_group_put(self.frm_grp) };
        }
        if !self.pkt_grp.is_null() {
            // SAFETY: `self.pkt_grp` is a live group owned by this backend.
            unsafe { ffi::mpp_buffer_group_put(self.pkt_grp) };
        }
        if !self.ctx.is_null() {
            // SAFETY: `self.ctx` is a live context owned by this backend.
            unsafe { ffi::mpp_destroy(self.ctx) };
        }
    }
}

/// A real MPP H.264 encoder context.
pub struct MppEncoderBackend {
    ctx: MppCtx,
    mpi: *mut MppApi,
    enc_cfg: ffi::MppEncCfg,
    pkt_grp: MppBufferGroup,
    /// Pre-allocated input frame buffer, reused by every `put_frame` call.
    frm_buf: ffi::MppBuffer,
    frm_buf_size: usize,
    /// Pre-allocated output packet buffer, reused by every `put_frame` call.
    pkt_buf: ffi::MppBuffer,
}

// SAFETY: see `MppDecoderBackend`.
unsafe impl Send for MppEncoderBackend {}

impl MppEncoderBackend {
    pub fn new(max_width: u32, max_height: u32) -> Result<Self> {
        let mut ctx: MppCtx = ptr::null_mut();
        let mut mpi: *mut MppApi = ptr::null_mut();
        // SAFETY: out-params are valid pointers to stack locals.
        let ret = unsafe { ffi::mpp_create(&mut ctx, &mut mpi) };
        ffi::check(ret, "mpp_create")?;

        // SAFETY: `ctx` was just created.
        let ret = unsafe { ffi::mpp_init(ctx, ffi::MPP_CTX_ENC, ffi::MPP_VIDEO_CODING_AVC) };
        ffi::check(ret, "mpp_init(H264 encoder)")?;

        let mut timeout: ffi::MppPollType = 100;
        // SAFETY: `mpi`/`ctx` are live.
        let ret = unsafe { ((*mpi).control)(ctx, ffi::MPP_SET_OUTPUT_TIMEOUT, (&mut timeout as *mut _).cast()) };
        ffi::check(ret, "set output timeout")?;

        let mut enc_cfg: ffi::MppEncCfg = ptr::null_mut();
        // SAFETY: out-param is a valid pointer to a stack local.
        let ret = unsafe { ffi::mpp_enc_cfg_init(&mut enc_cfg) };
        ffi::check(ret, "mpp_enc_cfg_init")?;

        let mut pkt_grp: MppBufferGroup = ptr::null_mut();
        // SAFETY: out-param is a valid pointer to a stack local.
        let ret = unsafe { ffi::mpp_buffer_group_get_internal(&mut pkt_grp, ffi::MPP_BUFFER_FLAGS_CACHABLE) };
        ffi::check(ret, "mpp_buffer_group_get_internal")?;

        let slot_size = crate::frame_size::frame_size(max_width, max_height, kvm_core::PixelFormat::Nv12) as usize;

        let mut frm_buf: ffi::MppBuffer = ptr::null_mut();
        // SAFETY: `pkt_grp` was just created.
        let ret = unsafe { ffi::mpp_buffer_get(pkt_grp, &mut frm_buf, slot_size) };
        ffi::check(ret, "mpp_buffer_get(frm_buf)")?;

        let mut pkt_buf: ffi::MppBuffer = ptr::null_mut();
        // SAFETY: `pkt_grp` was just created.
        let ret = unsafe { ffi::mpp_buffer_get(pkt_grp, &mut pkt_buf, slot_size) };
        ffi::check(ret, "mpp_buffer_get(pkt_buf)")?;

        Ok(Self {
            ctx,
            mpi,
            enc_cfg,
            pkt_grp,
            frm_buf,
            frm_buf_size: slot_size,
            pkt_buf,
        })
    }
}

impl EncoderBackend for MppEncoderBackend {
    fn apply_config(&mut self, cfg: &TranscoderConfig) -> Result<()> {
        let set_s32 = |name: &str, value: i32| -> Result<()> {
            let key = cstr(name);
            // SAFETY: `self.enc_cfg` is a live handle; `key` outlives the call.
            let ret = unsafe { ffi::mpp_enc_cfg_set_s32(self.enc_cfg, key.as_ptr(), value) };
            ffi::check(ret, name)
        };
        let set_u32 = |name: &str, value: u32| -> Result<()> {
            let key = cstr(name);
            // SAFETY: see above.
            let ret = unsafe { ffi::mpp_enc_cfg_set_u32(self.enc_cfg, key.as_ptr(), value) };
            ffi::check(ret, name)
        };

        set_s32("prep:width", cfg.max_width as i32)?;
        set_s32("prep:height", cfg.max_height as i32)?;
        set_s32("prep:hor_stride", kvm_core::align16(cfg.max_width) as i32)?;
        set_s32("prep:ver_stride", kvm_core::align16(cfg.max_height) as i32)?;
        set_s32("prep:format", ffi::MPP_FMT_YUV420SP)?;
        set_s32("prep:range", ffi::MPP_FRAME_RANGE_JPEG)?;

        set_u32("rc:mode", cfg.rc_mode.as_u32())?;
        set_s32("rc:bps_target", cfg.bitrate_bps() as i32)?;
        set_s32("rc:bps_max", cfg.bps_max() as i32)?;
        set_s32("rc:bps_min", cfg.bps_min() as i32)?;
        set_s32("rc:fps_in_flex", 0)?;
        set_s32("rc:fps_in_num", cfg.fps_num as i32)?;
        set_s32("rc:fps_in_denom", cfg.fps_den as i32)?;
        set_s32("rc:fps_out_flex", 0)?;
        set_s32("rc:fps_out_num", cfg.fps_num as i32)?;
        set_s32("rc:fps_out_denom", cfg.fps_den as i32)?;
        set_s32("rc:gop", cfg.gop_size as i32)?;

        set_s32("h264:profile", cfg.profile as i32)?;
        set_s32("h264:level", cfg.level as i32)?;
        set_s32("h264:cabac_en", 1)?;
        set_s32("h264:cabac_idc", 0)?;
        set_s32("h264:trans8x8", 1)?;
        set_s32("h264:qp_init", cfg.qp_init as i32)?;
        set_s32("h264:qp_max", cfg.qp_max as i32)?;
        set_s32("h264:qp_min", cfg.qp_min as i32)?;

        mpi_call!(self.mpi, self.ctx, control, "apply encoder cfg", ffi::MPP_ENC_SET_CFG, self.enc_cfg.cast())
    }

    fn put_frame(&mut self, nv12: &[u8], width: u32, height: u32, hor_stride: u32, ver_stride: u32, force_key: bool) -> Result<()> {
        let mut frame: MppFrame = ptr::null_mut();
        // SAFETY: out-param is a valid pointer to a stack local.
        ffi::check(unsafe { ffi::mpp_frame_init(&mut frame) }, "mpp_frame_init")?;

        // SAFETY: `self.frm_buf` was pre-allocated in `new` and is reused
        // across calls; it is sized to `self.frm_buf_size`.
        let ptr = unsafe { ffi::mpp_buffer_get_ptr(self.frm_buf) };
        if !ptr.is_null() {
            let len = nv12.len().min(self.frm_buf_size);
            // SAFETY: `ptr` is valid for `self.frm_buf_size` bytes; `len` is
            // clamped to that bound.
            unsafe { std::ptr::copy_nonoverlapping(nv12.as_ptr(), ptr.cast::<u8>(), len) };
        }

        // SAFETY: `frame` was just initialized.
        unsafe {
            ffi::mpp_frame_set_width(frame, width);
            ffi::mpp_frame_set_height(frame, height);
            ffi::mpp_frame_set_hor_stride(frame, hor_stride);
            ffi::mpp_frame_set_ver_stride(frame, ver_stride);
            ffi::mpp_frame_set_fmt(frame, ffi::MPP_FMT_YUV420SP);
            ffi::mpp_frame_set_eos(frame, 0);
            ffi::mpp_frame_set_buffer(frame, self.frm_buf);
        }

        // SAFETY: `frame` carries a valid meta handle once initialized.
        let meta = unsafe { ffi::mpp_frame_get_meta(frame) };

        let mut out_packet: MppPacket = ptr::null_mut();
        // SAFETY: `self.pkt_buf` was allocated in `new` and is large enough
        // for one compressed frame.
        ffi::check(unsafe { ffi::mpp_packet_init_with_buffer(&mut out_packet, self.pkt_buf) }, "mpp_packet_init_with_buffer")?;
        // SAFETY: `out_packet` was just initialized.
        unsafe { ffi::mpp_packet_set_length(out_packet, 0) };

        // SAFETY: `meta` belongs to the frame we are about to submit.
        unsafe {
            ffi::mpp_meta_set_packet(meta, ffi::KEY_OUTPUT_PACKET, out_packet);
            ffi::mpp_meta_set_buffer(meta, ffi::KEY_MOTION_INFO, ptr::null_mut());
            if force_key {
                ffi::mpp_meta_set_s32(meta, ffi::KEY_OUTPUT_INTRA, 1);
            }
        }

        let result = mpi_call!(self.mpi, self.ctx, encode_put_frame, "encode_put_frame", frame);

        // SAFETY: `frame` wraps `self.frm_buf`, which this backend owns
        // across calls; deinit releases only the frame wrapper.
        unsafe { ffi::mpp_frame_deinit(&mut frame) };

        result
    }

    fn try_get_packet(&mut self) -> Result<Option<RawEncodedPacket>> {
        let mut packet: MppPacket = ptr::null_mut();
        // SAFETY: `&mut packet` is a valid out-param.
        let ret = unsafe { (*self.mpi).encode_get_packet }(self.ctx, &mut packet);
        if ret != ffi::MPP_OK || packet.is_null() {
            // MPP's output-timeout mechanism surfaces "nothing yet" the
            // same way as a hardware timeout; the encoder stage's retry
            // loop is what turns repeated `None`s into a real timeout.
            return Ok(None);
        }

        // SAFETY: `packet` is a live handle the hardware just returned.
        let data = unsafe { ffi::mpp_packet_get_data(packet) };
        let length = unsafe { ffi::mpp_packet_get_length(packet) };
        let is_keyframe = if length > 0 && !data.is_null() {
            let meta = unsafe { ffi::mpp_packet_get_meta(packet) };
            let mut is_intra: i32 = 0;
            if !meta.is_null() {
                unsafe { ffi::mpp_meta_get_s32(meta, ffi::KEY_OUTPUT_INTRA, &mut is_intra) };
            }
            is_intra != 0
        } else {
            false
        };

        let bytes = if length > 0 && !data.is_null() {
            // SAFETY: `data` is valid for `length` bytes for the lifetime
            // of `packet`.
            unsafe { std::slice::from_raw_parts(data.cast::<u8>(), length) }.to_vec()
        } else {
            Vec::new()
        };

        // SAFETY: `packet` wraps `self.pkt_buf`, which this backend owns
        // across calls; deinit releases the packet wrapper, not the buffer.
        unsafe { ffi::mpp_packet_deinit(&mut packet) };

        if bytes.is_empty() {
            return Err(Error::Encode("encoder produced an empty packet".into()));
        }

        Ok(Some(RawEncodedPacket {
            data: bytes,
            is_keyframe,
        }))
    }

    fn reset(&mut self) -> Result<()> {
        mpi_call!(self.mpi, self.ctx, reset, "encoder reset")
    }
}

impl Drop for MppEncoderBackend {
    fn drop(&mut self) {
        if !self.frm_buf.is_null() {
            // SAFETY: owned by this backend since `new`.
            unsafe { ffi::mpp_buffer_put(self.frm_buf) };
        }
        if !self.pkt_buf.is_null() {
            // SAFETY: owned by this backend since `new`.
            unsafe { ffi::mpp_buffer_put(self.pkt_buf) };
        }
        if !self.pkt_grp.is_null() {
            // SAFETY: owned by this backend since `new`.
            unsafe { ffi::mpp_buffer_group_put(self.pkt_grp) };
        }
        if !self.enc_cfg.is_null() {
            // SAFETY: owned by this backend since `new`.
            unsafe { ffi::mpp_enc_cfg_deinit(self.enc_cfg) };
        }
        if !self.ctx.is_null() {
            // SAFETY: owned by this backend since `new`.
            unsafe { ffi::mpp_destroy(self.ctx) };
        }
    }
}

/// Scripted, introspectable fakes implementing [`DecoderBackend`] and
/// [`EncoderBackend`] for unit tests that exercise decoder/encoder stage
/// logic with no MPP hardware present.
#[cfg(test)]
pub(crate) mod fake {
    use std::collections::VecDeque;

    use super::{DecoderBackend, EncoderBackend, RawDecodedFrame, RawEncodedPacket};
    use crate::config::TranscoderConfig;
    use kvm_core::{Error, Result};

    #[derive(Default)]
    pub struct FakeDecoderBackend {
        pub put_packets: Vec<Vec<u8>>,
        /// Frames returned by successive `get_frame` calls, in order.
        pub scripted_frames: VecDeque<Result<RawDecodedFrame>>,
        pub output_group_attached: Option<(usize, u32)>,
        pub info_change_acknowledged: bool,
        pub reset_calls: u32,
    }

    impl DecoderBackend for FakeDecoderBackend {
        fn put_packet(&mut self, jpeg: &[u8]) -> Result<()> {
            self.put_packets.push(jpeg.to_vec());
            Ok(())
        }

        fn get_frame(&mut self) -> Result<RawDecodedFrame> {
            self.scripted_frames.pop_front().unwrap_or(Err(Error::Timeout))
        }

        fn attach_output_group(&mut self, slot_size: usize, slot_count: u32) -> Result<()> {
            self.output_group_attached = Some((slot_size, slot_count));
            Ok(())
        }

        fn acknowledge_info_change(&mut self) -> Result<()> {
            self.info_change_acknowledged = true;
            Ok(())
        }

        fn reset(&mut self) -> Result<()> {
            self.reset_calls += 1;
            Ok(())
        }
    }

    #[derive(Default)]
    pub struct FakeEncoderBackend {
        pub applied_configs: Vec<TranscoderConfig>,
        pub put_frames: Vec<(usize, bool)>,
        /// Results returned by successive `try_get_packet` calls, in order.
        /// Exhausting this queue yields `Ok(None)` (MPP timeout-as-absence).
        pub scripted_packets: VecDeque<Result<Option<RawEncodedPacket>>>,
        pub reset_calls: u32,
    }

    impl EncoderBackend for FakeEncoderBackend {
        fn apply_config(&mut self, cfg: &TranscoderConfig) -> Result<()> {
            self.applied_configs.push(cfg.clone());
            Ok(())
        }

        fn put_frame(&mut self, nv12: &[u8], _width: u32, _height: u32, _hor_stride: u32, _ver_stride: u32, force_key: bool) -> Result<()> {
            self.put_frames.push((nv12.len(), force_key));
            Ok(())
        }

        fn try_get_packet(&mut self) -> Result<Option<RawEncodedPacket>> {
            self.scripted_packets.pop_front().unwrap_or(Ok(None))
        }

        fn reset(&mut self) -> Result<()> {
            self.reset_calls += 1;
            Ok(())
        }
    }
}
