//! Frame-size formula table (spec §4.2.3, grounded on
//! `_us_mpp_calc_frame_size_by_format`), used to size buffer-group slots
//! before any real frame has been seen.

use kvm_core::{align16, align64, PixelFormat};

/// Bytes needed for one frame of `format` at `width x height`, with both
/// dimensions double-aligned (`align64(align16(x))`) the way MPP's
/// semi-planar/planar buffer groups require.
#[must_use]
pub fn frame_size(width: u32, height: u32, format: PixelFormat) -> u64 {
    let w = u64::from(align64(align16(width)));
    let h = u64::from(align64(align16(height)));
    let plane = w * h;

    match format {
        PixelFormat::Nv12 | PixelFormat::Yuv420 => plane * 3 / 2,
        PixelFormat::Nv16 | PixelFormat::Yuyv => plane * 2,
        PixelFormat::Rgb24 | PixelFormat::Bgr24 => plane * 3,
        // No 32bpp packed format is in the closed pixel-format set; kept for
        // parity with the original table's ARGB/ABGR/BGRA/RGBA8888 row and
        // as the explicit default below.
        PixelFormat::Mjpeg | PixelFormat::Jpeg | PixelFormat::H264 => plane * 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_is_one_point_five_times_aligned_plane() {
        let size = frame_size(1920, 1080, PixelFormat::Nv12);
        let w = u64::from(align64(align16(1920)));
        let h = u64::from(align64(align16(1080)));
        assert_eq!(size, w * h * 3 / 2);
    }

    #[test]
    fn unaligned_dims_round_up_before_multiplying() {
        // 10 -> align16 -> 16 -> align64 -> 64
        let size = frame_size(10, 10, PixelFormat::Nv12);
        assert_eq!(size, 64 * 64 * 3 / 2);
    }

    #[test]
    fn nv16_uses_two_times_multiplier() {
        let size = frame_size(640, 480, PixelFormat::Nv16);
        let w = u64::from(align64(align16(640)));
        let h = u64::from(align64(align16(480)));
        assert_eq!(size, w * h * 2);
    }

    #[test]
    fn rgb_family_uses_three_times_multiplier() {
        assert_eq!(frame_size(64, 64, PixelFormat::Rgb24), frame_size(64, 64, PixelFormat::Bgr24));
        let w = u64::from(align64(align16(64)));
        assert_eq!(frame_size(64, 64, PixelFormat::Rgb24), w * w * 3);
    }
}
