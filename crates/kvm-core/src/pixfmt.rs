//! Pixel-format tag shared by capture, display, and transcode.
//!
//! The numeric identifiers are not arbitrary: they match the corresponding
//! `V4L2_PIX_FMT_*` fourcc values used by the kernel video-capture interface,
//! since frames cross the capture/display/transcode boundary carrying only
//! this tag plus raw bytes.

/// Closed set of pixel formats understood anywhere in the pipeline.
///
/// Not every component accepts every variant: [`DisplaySink`](crate) accepts
/// `{RGB24, BGR24, YUYV, MJPEG}` as capture formats, while the transcoder
/// accepts `{MJPEG, JPEG, NV12, NV16, RGB24, BGR24, YUYV, YUV420}` as input
/// and always emits `H264`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// Motion-JPEG: a JPEG frame per image, no inter-frame prediction.
    Mjpeg,
    /// A single still JPEG image.
    Jpeg,
    /// 24-bit packed RGB, red byte first.
    Rgb24,
    /// 24-bit packed RGB, blue byte first.
    Bgr24,
    /// 4:2:2 packed YUV (Y0 U Y1 V per macropixel).
    Yuyv,
    /// 4:2:0 semi-planar YUV (full-res Y, half-res interleaved UV).
    Nv12,
    /// 4:2:2 semi-planar YUV (full-res Y, half-width interleaved UV).
    Nv16,
    /// 4:2:0 planar YUV (full-res Y, quarter-res U, quarter-res V).
    Yuv420,
    /// H.264 elementary stream. Never accepted as input; always the
    /// transcoder's output format.
    H264,
}

impl PixelFormat {
    /// True if the display sink accepts this as a capture format.
    #[must_use]
    pub const fn is_display_capturable(self) -> bool {
        matches!(self, Self::Rgb24 | Self::Bgr24 | Self::Yuyv | Self::Mjpeg)
    }

    /// True if the transcoder accepts this as an input format.
    #[must_use]
    pub const fn is_transcoder_input(self) -> bool {
        matches!(
            self,
            Self::Mjpeg
                | Self::Jpeg
                | Self::Nv12
                | Self::Nv16
                | Self::Rgb24
                | Self::Bgr24
                | Self::Yuyv
                | Self::Yuv420
        )
    }

    /// True if the format is one of the two JPEG-bearing variants that must
    /// be routed through the hardware JPEG decoder stage before encode.
    #[must_use]
    pub const fn is_jpeg_family(self) -> bool {
        matches!(self, Self::Mjpeg | Self::Jpeg)
    }

    /// Bytes per pixel for uncompressed, non-planar formats. Returns `None`
    /// for planar/semi-planar and compressed formats, whose size depends on
    /// plane layout rather than a constant per-pixel factor.
    #[must_use]
    pub const fn packed_bytes_per_pixel(self) -> Option<u32> {
        match self {
            Self::Rgb24 | Self::Bgr24 => Some(3),
            Self::Yuyv => Some(2),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_capturable_set_matches_spec() {
        assert!(PixelFormat::Rgb24.is_display_capturable());
        assert!(PixelFormat::Bgr24.is_display_capturable());
        assert!(PixelFormat::Yuyv.is_display_capturable());
        assert!(PixelFormat::Mjpeg.is_display_capturable());
        assert!(!PixelFormat::Nv12.is_display_capturable());
        assert!(!PixelFormat::H264.is_display_capturable());
    }

    #[test]
    fn transcoder_input_set_matches_spec() {
        for fmt in [
            PixelFormat::Mjpeg,
            PixelFormat::Jpeg,
            PixelFormat::Nv12,
            PixelFormat::Nv16,
            PixelFormat::Rgb24,
            PixelFormat::Bgr24,
            PixelFormat::Yuyv,
            PixelFormat::Yuv420,
        ] {
            assert!(fmt.is_transcoder_input());
        }
        assert!(!PixelFormat::H264.is_transcoder_input());
    }

    #[test]
    fn jpeg_family() {
        assert!(PixelFormat::Mjpeg.is_jpeg_family());
        assert!(PixelFormat::Jpeg.is_jpeg_family());
        assert!(!PixelFormat::Nv12.is_jpeg_family());
    }
}
