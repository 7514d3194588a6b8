//! Hardware JPEG/MJPEG decode stage (spec §4.2.2, grounded on
//! `_us_mpp_mjpeg_setup_decoder` / `_us_mpp_mjpeg_process_info_change` /
//! `_us_mpp_mjpeg_copy_frame_data` in `mpp_mjpeg_decoder.c`).

use kvm_core::{align16, Error, Frame, PixelFormat, Result};
use tracing::{debug, warn};

use crate::backend::{DecoderBackend, MppDecoderBackend};

/// Output-buffer-group slot count (`mpp_mjpeg_decoder.c` allocates a fixed
/// 24-slot external group the first time it processes an info-change).
const OUTPUT_SLOT_COUNT: u32 = 24;

/// Per-slot multiplier over `align16(w) * align16(h)`: large enough for a
/// 4:2:2 JPEG as well as a 4:2:0 one.
const OUTPUT_SLOT_MULTIPLIER: usize = 4;

/// Decodes MJPEG/JPEG frames into NV12 using the Rockchip MPP hardware
/// decoder.
///
/// The 24-slot output buffer group is created eagerly at construction
/// rather than lazily on the hardware's first info-change event, so the
/// stage is fully `Ready` the moment it exists (see `SPEC_FULL.md`'s note on
/// this timing).
pub struct JpegDecoder {
    backend: Box<dyn DecoderBackend>,
    max_width: u32,
    max_height: u32,
    /// Strides reported by the most recent info-change or decoded frame.
    hor_stride: u32,
    ver_stride: u32,
}

impl JpegDecoder {
    /// Create a decoder sized for JPEGs no larger than `max_width` x
    /// `max_height`.
    pub fn new(max_width: u32, max_height: u32) -> Result<Self> {
        let mut backend: Box<dyn DecoderBackend> = Box::new(MppDecoderBackend::new()?);
        Self::attach_group(backend.as_mut(), max_width, max_height)?;
        Ok(Self {
            backend,
            max_width,
            max_height,
            hor_stride: align16(max_width),
            ver_stride: align16(max_height),
        })
    }

    #[cfg(test)]
    pub(crate) fn from_backend(backend: Box<dyn DecoderBackend>, max_width: u32, max_height: u32) -> Result<Self> {
        let mut backend = backend;
        Self::attach_group(backend.as_mut(), max_width, max_height)?;
        Ok(Self {
            backend,
            max_width,
            max_height,
            hor_stride: align16(max_width),
            ver_stride: align16(max_height),
        })
    }

    fn attach_group(backend: &mut dyn DecoderBackend, max_width: u32, max_height: u32) -> Result<()> {
        let slot_size = align16(max_width) as usize * align16(max_height) as usize * OUTPUT_SLOT_MULTIPLIER;
        backend.attach_output_group(slot_size, OUTPUT_SLOT_COUNT)
    }

    /// Decode one JPEG/MJPEG payload into an NV12 [`Frame`].
    ///
    /// Returns [`Error::InfoChange`] when the hardware reports a format
    /// change mid-stream; the caller is expected to reissue the same
    /// `jpeg` bytes on the next call.
    pub fn decode(&mut self, jpeg: &[u8]) -> Result<Frame> {
        if jpeg.len() < 2 || jpeg[0] != 0xFF || jpeg[1] != 0xD8 {
            return Err(Error::InvalidParam("input does not start with a JPEG SOI marker".into()));
        }

        self.backend.put_packet(jpeg)?;
        let raw = self.backend.get_frame()?;

        if raw.info_change {
            debug!(width = raw.width, height = raw.height, "decoder info-change, acknowledging");
            self.hor_stride = if raw.hor_stride > 0 { raw.hor_stride } else { align16(raw.width) };
            self.ver_stride = if raw.ver_stride > 0 { raw.ver_stride } else { align16(raw.height) };
            self.backend.acknowledge_info_change()?;
            return Err(Error::InfoChange);
        }

        if raw.error || raw.discard {
            warn!(error = raw.error, discard = raw.discard, "decoder rejected frame");
            return Err(Error::Decode("hardware reported an error or discard flag".into()));
        }

        let y_size = raw.hor_stride as usize * raw.ver_stride as usize;
        let expected = y_size + y_size / 2;
        if raw.data.len() < expected {
            return Err(Error::Decode(format!(
                "decoded frame too small: got {} bytes, expected {expected}",
                raw.data.len()
            )));
        }

        let mut frame = Frame::with_capacity(raw.width, raw.height, raw.hor_stride, PixelFormat::Nv12, expected);
        frame.data[..expected].copy_from_slice(&raw.data[..expected]);
        frame.payload_used = expected;
        Ok(frame)
    }

    /// Issue a hardware context reset, clearing any pending info-change or
    /// partially-submitted packet state.
    pub fn reset(&mut self) -> Result<()> {
        self.backend.reset()
    }

    #[must_use]
    pub fn max_width(&self) -> u32 {
        self.max_width
    }

    #[must_use]
    pub fn max_height(&self) -> u32 {
        self.max_height
    }
}
