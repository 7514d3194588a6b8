//! Hardware H.264 encode stage (spec §4.2.3, grounded on
//! `_us_mpp_h264_setup_encoder` / `_us_mpp_h264_configure_encoder` /
//! `_us_mpp_h264_setup_input_frame` / `_us_mpp_h264_extract_output_packet`
//! in `mpp_h264_encoder.c`).

use std::thread;
use std::time::Duration;

use kvm_core::{align16, Error, Frame, PixelFormat, Result};
use tracing::debug;

use crate::backend::{EncoderBackend, MppEncoderBackend};
use crate::config::{RcMode, TranscoderConfig};

/// Maximum attempts the retrieval loop makes to pull a packet out after one
/// `put_frame`, each separated by a 1 ms sleep on a timeout.
const MAX_RETRIES: u32 = 30;
const RETRY_SLEEP: Duration = Duration::from_millis(1);

/// Encodes NV12 frames to H.264 using the Rockchip MPP hardware encoder.
pub struct H264Encoder {
    backend: Box<dyn EncoderBackend>,
    config: TranscoderConfig,
    hor_stride: u32,
    ver_stride: u32,
    /// Whether the most recently returned packet carried the
    /// `OUTPUT_INTRA` metadata flag, for the caller to fold into its stats.
    last_keyframe: bool,
}

impl H264Encoder {
    /// Create and configure an encoder from `config`. `config.max_width`/
    /// `max_height` size the pre-allocated input/output buffers.
    pub fn new(config: TranscoderConfig) -> Result<Self> {
        let mut backend: Box<dyn EncoderBackend> = Box::new(MppEncoderBackend::new(config.max_width, config.max_height)?);
        backend.apply_config(&config)?;
        Ok(Self {
            backend,
            hor_stride: align16(config.max_width),
            ver_stride: align16(config.max_height),
            last_keyframe: false,
            config,
        })
    }

    #[cfg(test)]
    pub(crate) fn from_backend(backend: Box<dyn EncoderBackend>, config: TranscoderConfig) -> Result<Self> {
        let mut backend = backend;
        backend.apply_config(&config)?;
        Ok(Self {
            backend,
            hor_stride: align16(config.max_width),
            ver_stride: align16(config.max_height),
            last_keyframe: false,
            config,
        })
    }

    /// Encode one NV12 frame. `force_key` sets `OUTPUT_INTRA` so the
    /// hardware emits an IDR packet regardless of GOP position.
    pub fn encode(&mut self, nv12: &Frame, force_key: bool) -> Result<Frame> {
        self.backend
            .put_frame(nv12.payload(), nv12.width, nv12.height, self.hor_stride, self.ver_stride, force_key)?;

        for attempt in 0..MAX_RETRIES {
            match self.backend.try_get_packet() {
                Ok(Some(packet)) => {
                    let used = packet.data.len();
                    let mut out = Frame::with_capacity(nv12.width, nv12.height, 0, PixelFormat::H264, used);
                    out.data[..used].copy_from_slice(&packet.data);
                    out.payload_used = used;
                    self.last_keyframe = packet.is_keyframe;
                    debug!(bytes = used, keyframe = packet.is_keyframe, attempt, "encoded packet");
                    return Ok(out);
                }
                Ok(None) => {
                    // A timeout return here means "no more packets for this
                    // frame yet" - not a failure. Sleep briefly and retry.
                    thread::sleep(RETRY_SLEEP);
                }
                Err(err) => return Err(err),
            }
        }

        Err(Error::Timeout)
    }

    /// Override the H.264 profile and re-apply the config under the
    /// caller's synchronization (see [`crate::Transcoder`]'s mutex).
    pub fn set_profile(&mut self, profile: u32) -> Result<()> {
        self.config.profile = profile;
        self.backend.apply_config(&self.config)
    }

    /// Override the rate-control mode and re-apply the config.
    pub fn set_rc_mode(&mut self, mode: RcMode) -> Result<()> {
        self.config.rc_mode = mode;
        self.backend.apply_config(&self.config)
    }

    /// Override the QP range and re-apply the config.
    pub fn set_qp_range(&mut self, min: u32, init: u32, max: u32) -> Result<()> {
        self.config.qp_min = min;
        self.config.qp_init = init;
        self.config.qp_max = max;
        self.backend.apply_config(&self.config)
    }

    pub fn reset(&mut self) -> Result<()> {
        self.backend.reset()
    }

    #[must_use]
    pub fn config(&self) -> &TranscoderConfig {
        &self.config
    }

    /// Whether the last packet [`H264Encoder::encode`] returned was a
    /// keyframe (IDR), for the caller's keyframe statistics.
    #[must_use]
    pub fn last_keyframe(&self) -> bool {
        self.last_keyframe
    }
}
