//! The in-memory `Frame` value type passed between capture, display, and
//! transcode.

use crate::pixfmt::PixelFormat;

/// A single video frame, owning its pixel bytes exclusively.
///
/// For frames backed by externally imported memory (DMA-BUF from the
/// capture device) an optional `dma_handle` is carried; ownership of the
/// underlying memory remains with the capture layer, which is responsible
/// for releasing it once the sink is done importing it as a framebuffer.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes per row. Zero for compressed payloads (MJPEG/JPEG/H264), where
    /// row pitch is not meaningful.
    pub stride: u32,
    /// Tag identifying how `data` is laid out.
    pub pixel_format: PixelFormat,
    /// Bytes of `data` that hold valid frame content.
    pub payload_used: usize,
    /// Total bytes allocated in `data`.
    pub payload_capacity: usize,
    /// Frame bytes. Always `payload_capacity` bytes long;
    /// `data[..payload_used]` is the valid region.
    pub data: Vec<u8>,
    /// Monotonic timestamp, in microseconds, recorded by the capture layer
    /// at grab time.
    pub grab_timestamp: u64,
    /// DMA-BUF file descriptor backing this frame, when the capture layer
    /// exported one. `None` for frames that only exist as CPU-mapped bytes.
    pub dma_handle: Option<i32>,
    /// Index of the capture buffer this frame was delivered in, used by
    /// [`DisplaySink`](crate) to pick the matching imported scan-out slot
    /// for zero-copy presentation.
    pub buffer_index: u32,
}

impl Frame {
    /// Construct a frame that owns a zeroed buffer of `capacity` bytes,
    /// with `payload_used` initially zero.
    #[must_use]
    pub fn with_capacity(
        width: u32,
        height: u32,
        stride: u32,
        pixel_format: PixelFormat,
        capacity: usize,
    ) -> Self {
        Self {
            width,
            height,
            stride,
            pixel_format,
            payload_used: 0,
            payload_capacity: capacity,
            data: vec![0u8; capacity],
            grab_timestamp: 0,
            dma_handle: None,
            buffer_index: 0,
        }
    }

    /// The valid prefix of `data`.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.payload_used.min(self.data.len())]
    }

    /// Mutable access to the valid prefix of `data`.
    pub fn payload_mut(&mut self) -> &mut [u8] {
        let used = self.payload_used.min(self.data.len());
        &mut self.data[..used]
    }

    /// True if this frame carries a DMA-BUF handle the sink can import for
    /// zero-copy scan-out.
    #[must_use]
    pub const fn has_dma_handle(&self) -> bool {
        self.dma_handle.is_some()
    }
}
