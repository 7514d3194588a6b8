//! Scan-out buffer provisioning (spec §4.1.4) and the [`ScanoutBuffer`]
//! value type (spec §3).

use kvm_core::{align16, Error, Result};
use tracing::{debug, warn};

use crate::device::{DrmBackend, DumbHandle, FbFormat, FbId, MappedDumbBuffer};
use crate::platform::Platform;

/// How a [`ScanoutBuffer`]'s memory is backed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferKind {
    /// A CPU-mapped buffer allocated by the display driver.
    Dumb,
    /// Memory imported from the capture device via a DMA-BUF handle. Never
    /// has a CPU mapping; the sink only ever writes into it by handing the
    /// imported handle straight to `SetCRTC`/page-flip.
    Imported,
}

/// A single provisioned scan-out buffer.
///
/// Invariant: valid iff `fb_id` is set and either `handle` is a created
/// dumb-buffer handle (`kind == Dumb`) or the handle came from a DMA
/// import (`kind == Imported`). `Imported` buffers never carry a CPU
/// mapping; `Dumb` buffers always do. Each sub-resource
/// (mapping/framebuffer/handle) is its own `Option` rather than a trio of
/// booleans, so `release` can only unwind resources that actually exist,
/// in the mandated order: unmap, then remove framebuffer, then destroy the
/// handle.
pub struct ScanoutBuffer {
    kind: BufferKind,
    fb_id: Option<FbId>,
    handle: Option<DumbHandle>,
    mapped: Option<MappedDumbBuffer>,
    pub width: u32,
    pub height: u32,
    pub pitch: u32,
    pub capacity: usize,
}

impl ScanoutBuffer {
    /// Allocate and map a dumb buffer of `width x height` at `format`,
    /// and register it as a framebuffer.
    pub fn new_dumb(backend: &dyn DrmBackend, width: u32, height: u32, format: FbFormat) -> Result<Self> {
        let (handle, pitch) = backend.create_dumb(width, height, format.bpp())?;
        let capacity = (pitch as usize) * (height as usize);

        let mapped = match backend.map_dumb(handle, capacity as u32) {
            Ok(m) => m,
            Err(e) => {
                let _ = backend.destroy_dumb(handle);
                return Err(e);
            }
        };

        let fb_id = match backend.add_fb(width, height, pitch, format, handle) {
            Ok(fb) => fb,
            Err(e) => {
                drop(mapped);
                let _ = backend.destroy_dumb(handle);
                return Err(e);
            }
        };

        Ok(Self {
            kind: BufferKind::Dumb,
            fb_id: Some(fb_id),
            handle: Some(handle),
            mapped: Some(mapped),
            width,
            height,
            pitch,
            capacity,
        })
    }

    /// Import a DMA-BUF file descriptor from the capture device and
    /// register it as a framebuffer. Never CPU-mapped: the sink presents
    /// it by handle alone.
    pub fn new_imported(
        backend: &dyn DrmBackend,
        dma_fd: i32,
        width: u32,
        height: u32,
        pitch: u32,
        format: FbFormat,
    ) -> Result<Self> {
        let handle = backend.prime_fd_to_handle(dma_fd)?;
        let fb_id = match backend.add_fb(width, height, pitch, format, handle) {
            Ok(fb) => fb,
            Err(e) => {
                let _ = backend.destroy_dumb(handle);
                return Err(e);
            }
        };

        Ok(Self {
            kind: BufferKind::Imported,
            fb_id: Some(fb_id),
            handle: Some(handle),
            mapped: None,
            width,
            height,
            pitch,
            capacity: (pitch as usize) * (height as usize),
        })
    }

    #[must_use]
    pub const fn kind(&self) -> BufferKind {
        self.kind
    }

    #[must_use]
    pub fn fb_id(&self) -> Option<FbId> {
        self.fb_id
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.fb_id.is_some() && self.handle.is_some()
    }

    /// CPU-visible bytes of a `Dumb` buffer. `None` for `Imported` buffers.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.mapped.as_ref().map(MappedDumbBuffer::as_slice)
    }

    /// Mutable CPU-visible bytes of a `Dumb` buffer.
    pub fn bytes_mut(&mut self) -> Option<&mut [u8]> {
        self.mapped.as_mut().map(MappedDumbBuffer::as_mut_slice)
    }

    /// Release this buffer's resources against `backend`, strictly in
    /// reverse-acquisition order: unmap, remove framebuffer, destroy
    /// handle. Idempotent: calling twice is a no-op the second time since
    /// each sub-resource is consumed as it's released.
    pub fn release(&mut self, backend: &dyn DrmBackend) {
        if self.mapped.take().is_some() {
            debug!("unmapped scan-out buffer");
        }
        if let Some(fb_id) = self.fb_id.take() {
            if let Err(e) = backend.rm_fb(fb_id) {
                warn!(error = %e, fb_id, "failed to remove framebuffer during release");
            }
        }
        if let Some(handle) = self.handle.take() {
            // Imported handles are owned by the capture layer; we only
            // release the display driver's import reference (the GEM
            // handle), never the underlying DMA memory.
            if let Err(e) = backend.destroy_dumb(handle) {
                warn!(error = %e, handle, "failed to destroy buffer handle during release");
            }
        }
    }
}

/// `n_bufs` for the given mode, per spec §4.1.4: 4 for stub/OSD mode, equal
/// to the capture's buffer count for live mode.
#[must_use]
pub const fn buffer_count_for(is_live: bool, capture_buffer_count: u32) -> u32 {
    if is_live {
        capture_buffer_count
    } else {
        4
    }
}

/// Bpp candidates tried in order for the stub-path dumb-buffer fallback
/// (spec §4.1.4): RGB888 (24) first, then XRGB8888 (32), then RGB565 (16).
pub const STUB_BPP_FALLBACK_ORDER: [u32; 3] = [24, 32, 16];

fn fb_format_for_bpp(bpp: u32) -> FbFormat {
    match bpp {
        32 => FbFormat::Xrgb8888,
        16 => FbFormat::Rgb565,
        _ => FbFormat::Rgb888,
    }
}

/// Allocate `n_bufs` stub/OSD buffers, trying each bpp in
/// [`STUB_BPP_FALLBACK_ORDER`] in turn. Per the spec's Open Question
/// resolution: a failure on the first candidate (RGB888) destroys nothing
/// (there is nothing yet to destroy) and simply tries the next candidate;
/// only the first successful bpp is used for all `n_bufs` buffers, and it
/// is recorded as the runtime's detected bpp.
pub fn provision_stub_buffers(
    backend: &dyn DrmBackend,
    n_bufs: u32,
    width: u32,
    height: u32,
) -> Result<(Vec<ScanoutBuffer>, u32)> {
    let mut last_err = None;
    for &bpp in &STUB_BPP_FALLBACK_ORDER {
        let format = fb_format_for_bpp(bpp);
        match ScanoutBuffer::new_dumb(backend, width, height, format) {
            Ok(first) => {
                let mut buffers = vec![first];
                let mut failed = false;
                for _ in 1..n_bufs {
                    match ScanoutBuffer::new_dumb(backend, width, height, format) {
                        Ok(b) => buffers.push(b),
                        Err(e) => {
                            last_err = Some(e);
                            failed = true;
                            break;
                        }
                    }
                }
                if failed {
                    for mut b in buffers {
                        b.release(backend);
                    }
                    continue;
                }
                debug!(bpp, n_bufs, "provisioned stub buffers");
                return Ok((buffers, bpp));
            }
            Err(e) => {
                last_err = Some(e);
                continue;
            }
        }
    }
    Err(last_err.unwrap_or_else(|| Error::Memory("no stub bpp candidate succeeded".into())))
}

/// Per-platform provisioning strategy for the live (capture-attached)
/// path, per spec §4.1.4.
pub enum LiveBufferPlan {
    /// Amlogic: always a single dumb XRGB8888 buffer sized to the mode,
    /// never DMA import.
    AmlogicDumb { width: u32, height: u32 },
    /// RPi/Generic: one DMA-import attempt per capture buffer, falling
    /// back to a dumb buffer sized to the mode on import failure.
    TryImportThenDumb {
        capture_buffer_count: u32,
        mode_width: u32,
        mode_height: u32,
    },
}

#[must_use]
pub fn live_buffer_plan(platform: Platform, capture_buffer_count: u32, mode_width: u32, mode_height: u32) -> LiveBufferPlan {
    match platform {
        Platform::Amlogic => LiveBufferPlan::AmlogicDumb {
            width: mode_width,
            height: mode_height,
        },
        _ => LiveBufferPlan::TryImportThenDumb {
            capture_buffer_count,
            mode_width,
            mode_height,
        },
    }
}

/// Stride (row pitch) in bytes for a dumb XRGB8888 buffer of `width`
/// pixels, 16-aligned on the column count before multiplying by 4 bytes
/// per pixel, matching the alignment used throughout the hardware stages.
#[must_use]
pub const fn xrgb8888_pitch(width: u32) -> u32 {
    align16(width) * 4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fake::FakeBackend;

    #[test]
    fn buffer_count_for_matches_spec() {
        assert_eq!(buffer_count_for(false, 7), 4);
        assert_eq!(buffer_count_for(true, 3), 3);
    }

    #[test]
    fn new_dumb_buffer_is_valid_and_mapped() {
        let backend = FakeBackend::default();
        let buf = ScanoutBuffer::new_dumb(&backend, 640, 480, FbFormat::Xrgb8888).expect("dumb buffer");
        assert!(buf.is_valid());
        assert_eq!(buf.kind(), BufferKind::Dumb);
        assert!(buf.bytes().is_some());
    }

    #[test]
    fn imported_buffer_has_no_mapping() {
        let backend = FakeBackend::default();
        let buf =
            ScanoutBuffer::new_imported(&backend, 42, 640, 480, 640 * 2, FbFormat::PassThrough(kvm_core::PixelFormat::Yuyv))
                .expect("imported buffer");
        assert_eq!(buf.kind(), BufferKind::Imported);
        assert!(buf.bytes().is_none());
        assert!(buf.is_valid());
    }

    #[test]
    fn release_is_idempotent() {
        let backend = FakeBackend::default();
        let mut buf = ScanoutBuffer::new_dumb(&backend, 320, 240, FbFormat::Rgb888).expect("dumb buffer");
        buf.release(&backend);
        assert!(!buf.is_valid());
        // Second release must not panic or double-free.
        buf.release(&backend);
        assert!(!buf.is_valid());
    }

    #[test]
    fn provision_stub_buffers_uses_first_successful_bpp() {
        let backend = FakeBackend::default();
        let (buffers, bpp) = provision_stub_buffers(&backend, 4, 1920, 1080).expect("stub buffers");
        assert_eq!(buffers.len(), 4);
        assert_eq!(bpp, 24);
    }

    #[test]
    fn xrgb8888_pitch_is_16_aligned_times_4() {
        assert_eq!(xrgb8888_pitch(1920), 1920 * 4);
        assert_eq!(xrgb8888_pitch(1921), 1936 * 4);
    }
}
