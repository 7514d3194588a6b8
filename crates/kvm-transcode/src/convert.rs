//! CPU pre-encode format conversion to NV12 (spec §4.2.4, grounded on
//! `mpp_format_converter.c`).
//!
//! The hardware encoder only ever accepts NV12 (YUV420SP). Capture sources
//! that aren't already NV12 are converted here before being handed to
//! [`H264Encoder`](crate::H264Encoder). MJPEG/JPEG never reach this module -
//! they go through [`JpegDecoder`](crate::JpegDecoder), whose hardware
//! output is NV12 already.

use kvm_core::{Error, PixelFormat, Result};

/// Size, in bytes, of an NV12 frame with the given dimensions.
#[must_use]
pub fn nv12_buffer_size(width: u32, height: u32) -> usize {
    (width as usize * height as usize * 3) / 2
}

/// Convert `input` (in `format`) into `output`, writing NV12.
///
/// `output` is resized to exactly [`nv12_buffer_size`] bytes if it isn't
/// already large enough. Returns [`Error::FormatUnsupported`] for any
/// format this module doesn't know how to convert (the caller is expected
/// to have already checked [`PixelFormat::is_transcoder_input`]).
pub fn convert_to_nv12(input: &[u8], format: PixelFormat, width: u32, height: u32, output: &mut Vec<u8>) -> Result<()> {
    let needed = nv12_buffer_size(width, height);
    if output.len() < needed {
        output.resize(needed, 0);
    }

    match format {
        PixelFormat::Nv12 => copy_nv12(input, width, height, output),
        PixelFormat::Rgb24 => rgb_to_nv12(input, width, height, false, output),
        PixelFormat::Bgr24 => rgb_to_nv12(input, width, height, true, output),
        PixelFormat::Yuyv => yuyv_to_nv12(input, width, height, output),
        PixelFormat::Yuv420 => yuv420_to_nv12(input, width, height, output),
        PixelFormat::Nv16 => nv16_to_nv12(input, width, height, output),
        PixelFormat::Mjpeg | PixelFormat::Jpeg | PixelFormat::H264 => Err(Error::FormatUnsupported(format!("{format:?} is not a transcoder CPU-conversion source"))),
    }
}

fn copy_nv12(input: &[u8], width: u32, height: u32, output: &mut [u8]) -> Result<()> {
    let size = nv12_buffer_size(width, height);
    let src = input.get(..size).ok_or(Error::InvalidParam("input buffer too small for declared dimensions".into()))?;
    output[..size].copy_from_slice(src);
    Ok(())
}

/// RGB24/BGR24 -> NV12 via BT.601 coefficients, with 2x2 block-averaged
/// chroma. `is_bgr` swaps the byte order read out of each 3-byte pixel.
fn rgb_to_nv12(input: &[u8], width: u32, height: u32, is_bgr: bool, output: &mut [u8]) -> Result<()> {
    let (width, height) = (width as usize, height as usize);
    let rgb_size = width * height * 3;
    let rgb = input.get(..rgb_size).ok_or(Error::InvalidParam("input buffer too small for declared dimensions".into()))?;

    let (y_plane, uv_plane) = output.split_at_mut(width * height);

    let pixel = |idx: usize| -> (i32, i32, i32) {
        let base = idx * 3;
        if is_bgr {
            (rgb[base + 2] as i32, rgb[base + 1] as i32, rgb[base] as i32)
        } else {
            (rgb[base] as i32, rgb[base + 1] as i32, rgb[base + 2] as i32)
        }
    };

    for y in 0..height {
        for x in 0..width {
            let (r, g, b) = pixel(y * width + x);
            let y_val = (299 * r + 587 * g + 114 * b) / 1000;
            y_plane[y * width + x] = y_val.clamp(0, 255) as u8;
        }
    }

    let uv_width = width / 2;
    for y in (0..height).step_by(2) {
        for x in (0..width).step_by(2) {
            let mut u_sum = 0i32;
            let mut v_sum = 0i32;
            let mut count = 0i32;
            for dy in 0..2 {
                if y + dy >= height {
                    continue;
                }
                for dx in 0..2 {
                    if x + dx >= width {
                        continue;
                    }
                    let (r, g, b) = pixel((y + dy) * width + (x + dx));
                    u_sum += (-147 * r - 289 * g + 436 * b) / 1000 + 128;
                    v_sum += (615 * r - 515 * g - 100 * b) / 1000 + 128;
                    count += 1;
                }
            }
            let uv_idx = (y / 2) * uv_width + (x / 2);
            uv_plane[uv_idx * 2] = (u_sum / count.max(1)).clamp(0, 255) as u8;
            uv_plane[uv_idx * 2 + 1] = (v_sum / count.max(1)).clamp(0, 255) as u8;
        }
    }

    Ok(())
}

/// YUYV (packed 4:2:2) -> NV12. Modeled on the library routine the original
/// pipeline calls out to (`YUY2ToNV12`): Y is read straight through, and
/// each YUYV macropixel's U/V sample is written out once per 2x1 luma pair
/// without the block averaging the RGB path uses.
fn yuyv_to_nv12(input: &[u8], width: u32, height: u32, output: &mut [u8]) -> Result<()> {
    let (width, height) = (width as usize, height as usize);
    let yuyv_size = width * height * 2;
    let yuyv = input.get(..yuyv_size).ok_or(Error::InvalidParam("input buffer too small for declared dimensions".into()))?;

    let (y_plane, uv_plane) = output.split_at_mut(width * height);
    let uv_width = width / 2;

    for y in 0..height {
        let row = &yuyv[y * width * 2..(y + 1) * width * 2];
        for x in 0..width {
            y_plane[y * width + x] = row[x * 2];
        }
        if y % 2 == 0 {
            for pair in 0..uv_width {
                let base = pair * 4;
                let u = row[base + 1];
                let v = row[base + 3];
                let uv_idx = (y / 2) * uv_width + pair;
                uv_plane[uv_idx * 2] = u;
                uv_plane[uv_idx * 2 + 1] = v;
            }
        }
    }

    Ok(())
}

/// Planar YUV420 (I420: separate U/V planes) -> NV12 (interleaved UV).
/// Modeled on the library routine the original calls (`I420ToNV12`): pure
/// plane interleaving, no resampling since both are already 4:2:0.
fn yuv420_to_nv12(input: &[u8], width: u32, height: u32, output: &mut [u8]) -> Result<()> {
    let (width, height) = (width as usize, height as usize);
    let y_size = width * height;
    let c_size = y_size / 4;
    let total = y_size + 2 * c_size;
    let src = input.get(..total).ok_or(Error::InvalidParam("input buffer too small for declared dimensions".into()))?;

    let (y_src, rest) = src.split_at(y_size);
    let (u_src, v_src) = rest.split_at(c_size);

    let (y_plane, uv_plane) = output.split_at_mut(y_size);
    y_plane.copy_from_slice(y_src);

    for i in 0..c_size {
        uv_plane[i * 2] = u_src[i];
        uv_plane[i * 2 + 1] = v_src[i];
    }

    Ok(())
}

/// NV16 (4:2:2 semi-planar) -> NV12 (4:2:0 semi-planar) via vertical row
/// decimation: every other chroma row is dropped outright rather than
/// averaged, matching the original converter's row-selection approach.
fn nv16_to_nv12(input: &[u8], width: u32, height: u32, output: &mut [u8]) -> Result<()> {
    let (width, height) = (width as usize, height as usize);
    let y_size = width * height;
    let nv16_uv_size = width * height;
    let total = y_size + nv16_uv_size;
    let src = input.get(..total).ok_or(Error::InvalidParam("input buffer too small for declared dimensions".into()))?;

    let (y_src, nv16_uv) = src.split_at(y_size);
    let (y_plane, uv_plane) = output.split_at_mut(y_size);
    y_plane.copy_from_slice(y_src);

    let uv_width = width / 2;
    for y in (0..height).step_by(2) {
        for x in (0..width).step_by(2) {
            let nv16_idx = y * width + x;
            let nv12_idx = (y / 2) * uv_width + (x / 2);
            uv_plane[nv12_idx * 2] = nv16_uv[nv16_idx * 2];
            uv_plane[nv12_idx * 2 + 1] = nv16_uv[nv16_idx * 2 + 1];
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_buffer_size_is_one_point_five_bytes_per_pixel() {
        assert_eq!(nv12_buffer_size(4, 4), 24);
        assert_eq!(nv12_buffer_size(1920, 1080), 1920 * 1080 * 3 / 2);
    }

    #[test]
    fn pure_white_rgb_converts_to_luma_255() {
        let mut out = Vec::new();
        let rgb = vec![255u8; 4 * 4 * 3];
        convert_to_nv12(&rgb, PixelFormat::Rgb24, 4, 4, &mut out).unwrap();
        assert!(out[..16].iter().all(|&y| y == 255));
    }

    #[test]
    fn pure_black_rgb_converts_to_luma_zero() {
        let mut out = Vec::new();
        let rgb = vec![0u8; 4 * 4 * 3];
        convert_to_nv12(&rgb, PixelFormat::Rgb24, 4, 4, &mut out).unwrap();
        assert!(out[..16].iter().all(|&y| y == 0));
    }

    #[test]
    fn bgr_and_rgb_of_same_color_produce_same_luma() {
        let width = 2;
        let height = 2;
        let mut rgb = vec![0u8; width * height * 3];
        let mut bgr = vec![0u8; width * height * 3];
        for i in 0..(width * height) {
            rgb[i * 3] = 10;
            rgb[i * 3 + 1] = 200;
            rgb[i * 3 + 2] = 90;
            bgr[i * 3] = 90;
            bgr[i * 3 + 1] = 200;
            bgr[i * 3 + 2] = 10;
        }
        let mut out_rgb = Vec::new();
        let mut out_bgr = Vec::new();
        convert_to_nv12(&rgb, PixelFormat::Rgb24, width as u32, height as u32, &mut out_rgb).unwrap();
        convert_to_nv12(&bgr, PixelFormat::Bgr24, width as u32, height as u32, &mut out_bgr).unwrap();
        assert_eq!(out_rgb, out_bgr);
    }

    #[test]
    fn nv12_passthrough_copies_bytes_unchanged() {
        let mut src = vec![0u8; nv12_buffer_size(4, 4)];
        for (i, b) in src.iter_mut().enumerate() {
            *b = i as u8;
        }
        let mut out = Vec::new();
        convert_to_nv12(&src, PixelFormat::Nv12, 4, 4, &mut out).unwrap();
        assert_eq!(out, src);
    }

    #[test]
    fn yuyv_luma_passes_through_unchanged() {
        let width = 4;
        let height = 2;
        let mut yuyv = vec![0u8; width * height * 2];
        for (i, b) in yuyv.iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        let mut out = Vec::new();
        convert_to_nv12(&yuyv, PixelFormat::Yuyv, width as u32, height as u32, &mut out).unwrap();
        for x in 0..width {
            assert_eq!(out[x], yuyv[x * 2]);
        }
    }

    #[test]
    fn nv16_to_nv12_drops_alternating_chroma_rows_not_averages() {
        let width = 2;
        let height = 2;
        let y = vec![0u8; width * height];
        // Row 0 chroma = (10, 20); row 1 chroma = (200, 210). Decimation
        // keeps row 0's values verbatim rather than averaging with row 1.
        let mut nv16 = y.clone();
        nv16.extend_from_slice(&[10, 20, 200, 210]);
        let mut out = Vec::new();
        convert_to_nv12(&nv16, PixelFormat::Nv16, width as u32, height as u32, &mut out).unwrap();
        let uv_plane = &out[width * height..];
        assert_eq!(uv_plane, &[10, 20]);
    }

    #[test]
    fn yuv420_interleaves_planar_uv() {
        let width = 4;
        let height = 2;
        let mut i420 = vec![5u8; width * height];
        i420.extend(vec![1u8; (width * height) / 4]);
        i420.extend(vec![2u8; (width * height) / 4]);
        let mut out = Vec::new();
        convert_to_nv12(&i420, PixelFormat::Yuv420, width as u32, height as u32, &mut out).unwrap();
        let uv_plane = &out[width * height..];
        assert_eq!(uv_plane[0], 1);
        assert_eq!(uv_plane[1], 2);
    }

    #[test]
    fn short_input_buffer_is_rejected() {
        let mut out = Vec::new();
        let result = convert_to_nv12(&[0u8; 2], PixelFormat::Rgb24, 4, 4, &mut out);
        assert!(result.is_err());
    }

    #[test]
    fn jpeg_family_is_not_a_cpu_conversion_target() {
        let mut out = Vec::new();
        let result = convert_to_nv12(&[], PixelFormat::Mjpeg, 4, 4, &mut out);
        assert!(matches!(result, Err(Error::FormatUnsupported(_))));
    }
}
