//! Two-stage decode/convert/encode orchestration (spec §4.2.4-§4.2.6).
//!
//! [`Transcoder`] is the single public entry point: `process` accepts one
//! input [`Frame`] in any of the accepted capture formats and returns one
//! H.264 frame. All mutable state lives behind a [`parking_lot::Mutex`] so a
//! supervisor thread can call `get_stats`/`set_rc_mode`/`reset` safely
//! against the thread driving `process`, mirroring the control-plane
//! mutex the teacher stack uses around its bitrate/stream state.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use kvm_core::{Error, Frame, PixelFormat, Result};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::config::{RcMode, TranscoderConfig};
use crate::convert;
use crate::decoder::JpegDecoder;
use crate::encoder::H264Encoder;
use crate::stats::Stats;

struct State {
    config: TranscoderConfig,
    decoder: Option<JpegDecoder>,
    encoder: H264Encoder,
    current_format: Option<PixelFormat>,
    needs_conversion: bool,
    conversion_buffer: Vec<u8>,
    stats: Stats,
    stopped: bool,
}

/// Decodes (if needed), converts (if needed), and hardware-encodes frames
/// to H.264.
///
/// One `Transcoder` owns exactly one encoder hardware context, and lazily
/// one decoder hardware context created the first time an MJPEG/JPEG frame
/// is submitted (spec §4.2.4: "created lazily on first such frame").
pub struct Transcoder {
    state: Mutex<State>,
}

impl Transcoder {
    /// Create a transcoder. The H.264 encoder stage is provisioned
    /// immediately; the JPEG decoder stage is not, since not every input
    /// stream needs one.
    pub fn new(config: TranscoderConfig) -> Result<Self> {
        let encoder = H264Encoder::new(config.clone())?;
        Ok(Self {
            state: Mutex::new(State {
                config,
                decoder: None,
                encoder,
                current_format: None,
                needs_conversion: false,
                conversion_buffer: Vec::new(),
                stats: Stats::new(),
                stopped: false,
            }),
        })
    }

    /// Decode (if JPEG family), convert (if needed), and encode `input`.
    ///
    /// Returns [`Error::InfoChange`] unchanged when the decoder stage
    /// reports a format change; the caller is expected to reissue the same
    /// `input` frame on its next call.
    pub fn process(&self, input: &Frame, force_key: bool) -> Result<Frame> {
        let mut state = self.state.lock();

        if state.stopped {
            return Err(Error::NotInitialized);
        }

        if !input.pixel_format.is_transcoder_input() {
            return Err(Error::FormatUnsupported(format!("{:?} is not accepted by the transcoder", input.pixel_format)));
        }

        if state.current_format != Some(input.pixel_format) {
            state.needs_conversion = needs_cpu_conversion(input.pixel_format);
            state.current_format = Some(input.pixel_format);
            debug!(format = ?input.pixel_format, needs_conversion = state.needs_conversion, "input format changed");
        }

        let start = Instant::now();
        let outcome = run_stages(&mut state, input, force_key);
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;
        let now = now_ms();

        match &outcome {
            Ok(out) => state.stats.record_success(input.payload_used as u64, out.payload_used as u64, elapsed_ms, now),
            Err(err) => {
                if !err.is_info_change() {
                    state.stats.record_error(now);
                }
            }
        }

        outcome
    }

    /// Override the H.264 profile on the running encoder.
    pub fn set_profile(&self, profile: u32) -> Result<()> {
        let mut state = self.state.lock();
        state.config.profile = profile;
        state.encoder.set_profile(profile)
    }

    /// Override the rate-control mode on the running encoder.
    pub fn set_rc_mode(&self, mode: RcMode) -> Result<()> {
        let mut state = self.state.lock();
        state.config.rc_mode = mode;
        state.encoder.set_rc_mode(mode)
    }

    /// Override the QP range on the running encoder.
    pub fn set_qp_range(&self, min: u32, init: u32, max: u32) -> Result<()> {
        let mut state = self.state.lock();
        state.config.qp_min = min;
        state.config.qp_init = init;
        state.config.qp_max = max;
        state.encoder.set_qp_range(min, init, max)
    }

    /// Snapshot of cumulative processing statistics.
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.state.lock().stats
    }

    /// Reset both hardware contexts and zero statistics.
    pub fn reset(&self) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(decoder) = state.decoder.as_mut() {
            decoder.reset()?;
        }
        state.encoder.reset()?;
        state.stats = Stats::new();
        Ok(())
    }

    /// Stop accepting new `process` calls. Further calls fail fast with
    /// [`Error::NotInitialized`]; hardware contexts are released when this
    /// value is dropped.
    pub fn destroy(&self) {
        let mut state = self.state.lock();
        if state.stopped {
            return;
        }
        state.stopped = true;
        if let Err(err) = state.encoder.reset() {
            warn!(?err, "encoder reset during destroy failed, continuing teardown");
        }
        if let Some(decoder) = state.decoder.as_mut() {
            if let Err(err) = decoder.reset() {
                warn!(?err, "decoder reset during destroy failed, continuing teardown");
            }
        }
        // The decoder and encoder backends release their buffer groups and
        // hardware contexts in their own `Drop` impls when `Transcoder`
        // itself is dropped; `stopped` just gates further `process` calls.
    }
}

/// True if `format` needs CPU conversion to NV12 before encode (neither
/// already NV12 nor routed through the hardware JPEG decoder).
fn needs_cpu_conversion(format: PixelFormat) -> bool {
    !format.is_jpeg_family() && format != PixelFormat::Nv12
}

fn run_stages(state: &mut State, input: &Frame, force_key: bool) -> Result<Frame> {
    let nv12 = if input.pixel_format.is_jpeg_family() {
        if state.decoder.is_none() {
            state.decoder = Some(JpegDecoder::new(state.config.max_width, state.config.max_height)?);
        }
        let decoder = state.decoder.as_mut().expect("decoder provisioned above");
        match decoder.decode(input.payload()) {
            Ok(frame) => {
                state.stats.record_decode(true);
                frame
            }
            Err(err) => {
                if !err.is_info_change() {
                    state.stats.record_decode(false);
                }
                return Err(err);
            }
        }
    } else if input.pixel_format == PixelFormat::Nv12 {
        input.clone()
    } else {
        convert::convert_to_nv12(input.payload(), input.pixel_format, input.width, input.height, &mut state.conversion_buffer)?;
        let len = convert::nv12_buffer_size(input.width, input.height);
        let mut frame = Frame::with_capacity(input.width, input.height, input.width, PixelFormat::Nv12, len);
        frame.data[..len].copy_from_slice(&state.conversion_buffer[..len]);
        frame.payload_used = len;
        frame
    };

    let encoded = state.encoder.encode(&nv12, force_key);
    match &encoded {
        Ok(_) => state.stats.record_encode(true, state.encoder.last_keyframe()),
        Err(_) => state.stats.record_encode(false, false),
    }
    encoded
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::fake::{FakeDecoderBackend, FakeEncoderBackend};
    use crate::backend::{RawDecodedFrame, RawEncodedPacket};

    fn nv12_frame(width: u32, height: u32) -> Frame {
        let size = convert::nv12_buffer_size(width, height);
        let mut f = Frame::with_capacity(width, height, width, PixelFormat::Nv12, size);
        f.payload_used = size;
        f
    }

    fn rgb_frame(width: u32, height: u32) -> Frame {
        let size = width as usize * height as usize * 3;
        let mut f = Frame::with_capacity(width, height, width * 3, PixelFormat::Rgb24, size);
        f.payload_used = size;
        f
    }

    /// Build a `Transcoder` around a fake encoder backend, bypassing
    /// `H264Encoder::new`'s real-hardware construction.
    fn transcoder_with_fake_encoder(packets: Vec<Result<Option<RawEncodedPacket>>>) -> Transcoder {
        let mut fake = FakeEncoderBackend::default();
        fake.scripted_packets.extend(packets);
        let encoder = H264Encoder::from_backend(Box::new(fake), TranscoderConfig::default()).unwrap();
        Transcoder {
            state: Mutex::new(State {
                config: TranscoderConfig::default(),
                decoder: None,
                encoder,
                current_format: None,
                needs_conversion: false,
                conversion_buffer: Vec::new(),
                stats: Stats::new(),
                stopped: false,
            }),
        }
    }

    fn transcoder_with_fake_decoder_and_encoder(
        decoded_frames: Vec<Result<RawDecodedFrame>>,
        packets: Vec<Result<Option<RawEncodedPacket>>>,
    ) -> Transcoder {
        let mut fake_enc = FakeEncoderBackend::default();
        fake_enc.scripted_packets.extend(packets);
        let encoder = H264Encoder::from_backend(Box::new(fake_enc), TranscoderConfig::default()).unwrap();

        let mut fake_dec = FakeDecoderBackend::default();
        fake_dec.scripted_frames.extend(decoded_frames);
        let decoder = JpegDecoder::from_backend(Box::new(fake_dec), 640, 480).unwrap();

        Transcoder {
            state: Mutex::new(State {
                config: TranscoderConfig::default(),
                decoder: Some(decoder),
                encoder,
                current_format: None,
                needs_conversion: false,
                conversion_buffer: Vec::new(),
                stats: Stats::new(),
                stopped: false,
            }),
        }
    }

    #[test]
    fn nv12_input_passes_through_without_conversion() {
        let t = transcoder_with_fake_encoder(vec![Ok(Some(RawEncodedPacket {
            data: vec![1, 2, 3],
            is_keyframe: false,
        }))]);
        let out = t.process(&nv12_frame(16, 16), false).unwrap();
        assert_eq!(out.payload(), &[1, 2, 3]);
        assert_eq!(t.stats().frames_encoded, 1);
    }

    #[test]
    fn rgb_input_is_cpu_converted_then_encoded() {
        let t = transcoder_with_fake_encoder(vec![Ok(Some(RawEncodedPacket {
            data: vec![9],
            is_keyframe: true,
        }))]);
        let out = t.process(&rgb_frame(4, 4), false).unwrap();
        assert_eq!(out.payload(), &[9]);
        assert_eq!(t.stats().keyframes_generated, 1);
    }

    #[test]
    fn unsupported_format_is_rejected() {
        let t = transcoder_with_fake_encoder(vec![]);
        let mut h264 = Frame::with_capacity(4, 4, 0, PixelFormat::H264, 4);
        h264.payload_used = 4;
        let err = t.process(&h264, false).unwrap_err();
        assert!(matches!(err, Error::FormatUnsupported(_)));
    }

    #[test]
    fn mjpeg_info_change_propagates_as_sentinel_without_counting_as_error() {
        let t = transcoder_with_fake_decoder_and_encoder(
            vec![Ok(RawDecodedFrame {
                info_change: true,
                width: 640,
                height: 480,
                hor_stride: 640,
                ver_stride: 480,
                ..Default::default()
            })],
            vec![],
        );
        let mut mjpeg = Frame::with_capacity(640, 480, 0, PixelFormat::Mjpeg, 4);
        mjpeg.data = vec![0xFF, 0xD8, 0x00, 0x00];
        mjpeg.payload_used = 4;
        let err = t.process(&mjpeg, false).unwrap_err();
        assert!(matches!(err, Error::InfoChange));
        assert_eq!(t.stats().processing_errors, 0);
        assert_eq!(t.stats().decode_errors, 0);
    }

    #[test]
    fn mjpeg_decode_then_encode_succeeds_after_retry() {
        let hor_stride = 640u32;
        let ver_stride = 480u32;
        let y_size = hor_stride as usize * ver_stride as usize;
        let total = y_size + y_size / 2;
        let t = transcoder_with_fake_decoder_and_encoder(
            vec![Ok(RawDecodedFrame {
                width: 640,
                height: 480,
                hor_stride,
                ver_stride,
                data: vec![7u8; total],
                ..Default::default()
            })],
            vec![Ok(Some(RawEncodedPacket {
                data: vec![5],
                is_keyframe: false,
            }))],
        );
        let mut mjpeg = Frame::with_capacity(640, 480, 0, PixelFormat::Mjpeg, 4);
        mjpeg.data = vec![0xFF, 0xD8, 0x00, 0x00];
        mjpeg.payload_used = 4;
        let out = t.process(&mjpeg, false).unwrap();
        assert_eq!(out.payload(), &[5]);
        assert_eq!(t.stats().frames_decoded, 1);
        assert_eq!(t.stats().frames_encoded, 1);
    }

    #[test]
    fn reset_clears_stats() {
        let t = transcoder_with_fake_encoder(vec![Ok(Some(RawEncodedPacket {
            data: vec![1],
            is_keyframe: false,
        }))]);
        t.process(&nv12_frame(4, 4), false).unwrap();
        assert_eq!(t.stats().frames_processed, 1);
        t.reset().unwrap();
        assert_eq!(t.stats().frames_processed, 0);
    }

    #[test]
    fn destroy_is_idempotent_and_fails_fast_afterward() {
        let t = transcoder_with_fake_encoder(vec![]);
        t.destroy();
        t.destroy();
        let err = t.process(&nv12_frame(4, 4), false).unwrap_err();
        assert!(matches!(err, Error::NotInitialized));
    }

    #[test]
    fn runtime_setters_affect_running_encoder() {
        let t = transcoder_with_fake_encoder(vec![]);
        t.set_rc_mode(RcMode::Cbr).unwrap();
        t.set_profile(66).unwrap();
        t.set_qp_range(10, 20, 30).unwrap();
    }
}
