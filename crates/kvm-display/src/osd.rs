//! On-screen-display text engine.
//!
//! Renders the small set of fixed status strings (spec §4.1.5) into an
//! XRGB8888 scan-out buffer. The rasterizer itself — an 8x8 bitmapped font
//! unpacked row-by-row into a pixel buffer — follows the same shape as
//! `m4vga`'s `text_10x16` cell rasterizer, scaled down to a single-color,
//! fixed-string status display instead of a full character-cell terminal.

/// Glyph cell width, in pixels.
pub const GLYPH_W: usize = 8;
/// Glyph cell height, in pixels.
pub const GLYPH_H: usize = 8;

/// Foreground color for OSD text, as 0xAARRGGBB.
pub const FG_COLOR: u32 = 0xFF_FF_FF_FF;
/// Background color for OSD text.
pub const BG_COLOR: u32 = 0xFF_00_00_00;

/// The fixed status messages the sink ever renders, per spec §4.1.5.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubKind {
    NoLiveVideo,
    UnsupportedCaptureFormat,
    UnsupportedResolution,
    OnlineIsActive,
}

impl StubKind {
    /// Render this stub's message text, substituting `detail` into the
    /// `UnsupportedResolution` variant's `<WxHp@Hz>` placeholder.
    #[must_use]
    pub fn message(self, detail: Option<&str>) -> String {
        match self {
            Self::NoLiveVideo => "NO LIVE VIDEO".to_string(),
            Self::UnsupportedCaptureFormat => "UNSUPPORTED CAPTURE FORMAT".to_string(),
            Self::UnsupportedResolution => format!("UNSUPPORTED RESOLUTION {}", detail.unwrap_or("")),
            Self::OnlineIsActive => "ONLINE IS ACTIVE".to_string(),
        }
    }
}

/// Look up the 8x8 bitmap for `c`, one bit per pixel, MSB first, one byte
/// per row. Characters outside the supported subset (uppercase letters,
/// digits, and the punctuation used by status strings) render as a blank
/// cell.
#[must_use]
fn glyph_bits(c: u8) -> [u8; GLYPH_H] {
    match c {
        b'A' => [0x18, 0x24, 0x42, 0x42, 0x7E, 0x42, 0x42, 0x00],
        b'B' => [0x7C, 0x42, 0x42, 0x7C, 0x42, 0x42, 0x7C, 0x00],
        b'C' => [0x3C, 0x42, 0x40, 0x40, 0x40, 0x42, 0x3C, 0x00],
        b'D' => [0x78, 0x44, 0x42, 0x42, 0x42, 0x44, 0x78, 0x00],
        b'E' => [0x7E, 0x40, 0x40, 0x7C, 0x40, 0x40, 0x7E, 0x00],
        b'F' => [0x7E, 0x40, 0x40, 0x7C, 0x40, 0x40, 0x40, 0x00],
        b'G' => [0x3C, 0x42, 0x40, 0x4E, 0x42, 0x42, 0x3C, 0x00],
        b'H' => [0x42, 0x42, 0x42, 0x7E, 0x42, 0x42, 0x42, 0x00],
        b'I' => [0x3E, 0x08, 0x08, 0x08, 0x08, 0x08, 0x3E, 0x00],
        b'L' => [0x40, 0x40, 0x40, 0x40, 0x40, 0x40, 0x7E, 0x00],
        b'M' => [0x42, 0x66, 0x5A, 0x42, 0x42, 0x42, 0x42, 0x00],
        b'N' => [0x42, 0x62, 0x52, 0x4A, 0x46, 0x42, 0x42, 0x00],
        b'O' => [0x3C, 0x42, 0x42, 0x42, 0x42, 0x42, 0x3C, 0x00],
        b'P' => [0x7C, 0x42, 0x42, 0x7C, 0x40, 0x40, 0x40, 0x00],
        b'R' => [0x7C, 0x42, 0x42, 0x7C, 0x48, 0x44, 0x42, 0x00],
        b'S' => [0x3C, 0x42, 0x40, 0x3C, 0x02, 0x42, 0x3C, 0x00],
        b'T' => [0x7F, 0x08, 0x08, 0x08, 0x08, 0x08, 0x08, 0x00],
        b'U' => [0x42, 0x42, 0x42, 0x42, 0x42, 0x42, 0x3C, 0x00],
        b'V' => [0x42, 0x42, 0x42, 0x42, 0x42, 0x24, 0x18, 0x00],
        b'X' => [0x42, 0x42, 0x24, 0x18, 0x24, 0x42, 0x42, 0x00],
        b'0' => [0x3C, 0x46, 0x4A, 0x52, 0x62, 0x42, 0x3C, 0x00],
        b'1' => [0x08, 0x18, 0x08, 0x08, 0x08, 0x08, 0x1C, 0x00],
        b'2' => [0x3C, 0x42, 0x02, 0x1C, 0x20, 0x40, 0x7E, 0x00],
        b'3' => [0x3C, 0x42, 0x02, 0x1C, 0x02, 0x42, 0x3C, 0x00],
        b'4' => [0x04, 0x0C, 0x14, 0x24, 0x7E, 0x04, 0x04, 0x00],
        b'5' => [0x7E, 0x40, 0x7C, 0x02, 0x02, 0x42, 0x3C, 0x00],
        b'6' => [0x1C, 0x20, 0x40, 0x7C, 0x42, 0x42, 0x3C, 0x00],
        b'7' => [0x7E, 0x02, 0x04, 0x08, 0x10, 0x10, 0x10, 0x00],
        b'8' => [0x3C, 0x42, 0x42, 0x3C, 0x42, 0x42, 0x3C, 0x00],
        b'9' => [0x3C, 0x42, 0x42, 0x3E, 0x02, 0x04, 0x38, 0x00],
        b' ' => [0; GLYPH_H],
        b'x' => [0x00, 0x00, 0x42, 0x24, 0x18, 0x24, 0x42, 0x00],
        b'@' => [0x3C, 0x42, 0x5A, 0x56, 0x5C, 0x40, 0x3C, 0x00],
        b'<' => [0x04, 0x08, 0x10, 0x20, 0x10, 0x08, 0x04, 0x00],
        b'>' => [0x20, 0x10, 0x08, 0x04, 0x08, 0x10, 0x20, 0x00],
        b'.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x18, 0x18, 0x00],
        _ => [0; GLYPH_H],
    }
}

/// Draw `text` (uppercase; lowercase is folded) as white-on-black 8x8 cells
/// into an XRGB8888 `dst` buffer of `dst_width x dst_height` pixels with
/// row pitch `dst_pitch` bytes, starting at pixel `(x0, y0)`.
///
/// Pixels outside `dst`'s bounds are silently clipped, the same way the
/// stub renderer tolerates a destination shorter than the requested text.
pub fn draw_text(dst: &mut [u8], dst_pitch: u32, dst_height: u32, x0: i32, y0: i32, text: &str) {
    for (col, raw) in text.bytes().enumerate() {
        let c = raw.to_ascii_uppercase();
        let bits = glyph_bits(c);
        let cell_x = x0 + (col * GLYPH_W) as i32;

        for (row, byte) in bits.iter().enumerate() {
            let py = y0 + row as i32;
            if py < 0 || py as u32 >= dst_height {
                continue;
            }
            for bit in 0..GLYPH_W {
                let px = cell_x + bit as i32;
                if px < 0 {
                    continue;
                }
                let set = (byte >> (7 - bit)) & 1 == 1;
                let color = if set { FG_COLOR } else { BG_COLOR };
                write_pixel(dst, dst_pitch, px as u32, py as u32, color);
            }
        }
    }
}

/// Draw possibly-multi-line `text` (lines separated by `\n`), each line
/// `GLYPH_H` pixels below the previous, centered horizontally on
/// `dst_width`.
pub fn draw_centered_multiline(dst: &mut [u8], dst_pitch: u32, dst_width: u32, dst_height: u32, text: &str) {
    let lines: Vec<&str> = text.lines().collect();
    let total_h = (lines.len() * GLYPH_H) as i32;
    let y0 = (dst_height as i32 - total_h) / 2;

    for (i, line) in lines.iter().enumerate() {
        let line_w = (line.len() * GLYPH_W) as i32;
        let x0 = (dst_width as i32 - line_w) / 2;
        draw_text(dst, dst_pitch, dst_height, x0, y0 + (i * GLYPH_H) as i32, line);
    }
}

fn write_pixel(dst: &mut [u8], pitch: u32, x: u32, y: u32, color: u32) {
    let offset = (y * pitch + x * 4) as usize;
    if offset + 4 > dst.len() {
        return;
    }
    dst[offset..offset + 4].copy_from_slice(&color.to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draw_text_sets_foreground_pixels() {
        let mut buf = vec![0u8; 64 * 8 * 4];
        draw_text(&mut buf, 64 * 4, 8, 0, 0, "A");
        // Top-left pixel of 'A' is background (row 0 of the glyph is the
        // narrow peak, not the full width), but some pixel in the cell
        // must be foreground.
        let any_fg = buf.chunks(4).any(|px| px == FG_COLOR.to_le_bytes());
        assert!(any_fg);
    }

    #[test]
    fn draw_text_clips_out_of_bounds() {
        let mut buf = vec![0u8; 8 * 8 * 4];
        // Should not panic even though this runs off the right/bottom edge.
        draw_text(&mut buf, 8 * 4, 8, 4, 4, "HELLO WORLD");
    }

    #[test]
    fn stub_messages_match_spec_strings() {
        assert_eq!(StubKind::NoLiveVideo.message(None), "NO LIVE VIDEO");
        assert_eq!(StubKind::UnsupportedCaptureFormat.message(None), "UNSUPPORTED CAPTURE FORMAT");
        assert_eq!(
            StubKind::UnsupportedResolution.message(Some("1920X1080P@60HZ")),
            "UNSUPPORTED RESOLUTION 1920X1080P@60HZ"
        );
        assert_eq!(StubKind::OnlineIsActive.message(None), "ONLINE IS ACTIVE");
    }

    #[test]
    fn draw_centered_multiline_does_not_panic_on_small_buffer() {
        let mut buf = vec![0u8; 16 * 16 * 4];
        draw_centered_multiline(&mut buf, 16 * 4, 16, 16, "NO LIVE VIDEO");
    }
}
