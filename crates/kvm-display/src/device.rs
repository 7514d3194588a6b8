//! `DrmBackend`: the narrow seam between `DisplaySink`'s control-flow logic
//! and the real `libdrm`/KMS ioctls.
//!
//! The real C source talks to `libdrm` directly through global calls, which
//! is untestable without physical display hardware. This trait is the cut
//! point: [`KmsBackend`] implements it against the `drm` crate for
//! production use; `#[cfg(test)]` code in `sink.rs` implements it against an
//! in-memory fake. Everything above this trait (mode selection math,
//! buffer-provisioning strategy, the blank-after-timeout state machine) is
//! exercised without a real device node.

use std::collections::HashMap;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};
use std::path::Path;
use std::sync::Mutex;

use drm::control::{connector, crtc, Device as ControlDevice};
use drm::{Device as BaseDevice, DriverCapability};
use kvm_core::{Error, Result};

use crate::mode::{DisplayMode, ModeFlags};

/// Opaque connector identifier.
pub type ConnectorId = u32;
/// Opaque CRTC identifier.
pub type CrtcId = u32;
/// Opaque encoder identifier.
pub type EncoderId = u32;
/// Opaque framebuffer identifier.
pub type FbId = u32;
/// Opaque dumb-buffer handle.
pub type DumbHandle = u32;

/// Device capability bits relevant to buffer provisioning.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub dumb_buffer: bool,
    pub prime_import: bool,
}

/// Connector state as reported by the KMS device.
#[derive(Debug, Clone)]
pub struct ConnectorInfo {
    pub id: ConnectorId,
    pub name: String,
    pub connected: bool,
    pub encoders: Vec<EncoderId>,
    pub modes: Vec<DisplayMode>,
    pub dpms_property_id: u32,
}

/// Encoder state: which CRTCs it can drive.
#[derive(Debug, Clone)]
pub struct EncoderInfo {
    pub id: EncoderId,
    pub possible_crtcs: u32,
}

/// Pixel format used when registering a framebuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FbFormat {
    Xrgb8888,
    Rgb888,
    Rgb565,
    /// Mirrors the capture format directly (RGB24/BGR24/YUYV) for
    /// zero-copy DMA-import framebuffers.
    PassThrough(kvm_core::PixelFormat),
}

impl FbFormat {
    #[must_use]
    pub const fn bpp(self) -> u32 {
        match self {
            Self::Xrgb8888 => 32,
            Self::Rgb888 => 24,
            Self::Rgb565 => 16,
            Self::PassThrough(_) => 32,
        }
    }

    #[must_use]
    pub const fn depth(self) -> u32 {
        match self {
            Self::Xrgb8888 => 24,
            Self::Rgb888 => 24,
            Self::Rgb565 => 16,
            Self::PassThrough(_) => 24,
        }
    }
}

/// A CPU-mapped dumb buffer.
///
/// Owns its mapping and unmaps on drop, so a [`ScanoutBuffer`](crate::buffer::ScanoutBuffer)
/// can hold one without worrying about the unmap ordering itself; the
/// struct's own `Drop` handles it.
pub struct MappedDumbBuffer {
    ptr: *mut libc::c_void,
    len: usize,
}

// SAFETY: the mapping is exclusively owned by this handle and the backing
// memory is either device memory (real backend) or an anonymous mapping
// (fake backend), neither of which is thread-affine.
unsafe impl Send for MappedDumbBuffer {}

impl MappedDumbBuffer {
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: `ptr` is valid for `len` bytes for the lifetime of this
        // mapping, established at construction time.
        unsafe { std::slice::from_raw_parts(self.ptr.cast(), self.len) }
    }

    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: see `as_slice`; exclusive access is guaranteed by `&mut self`.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.cast(), self.len) }
    }
}

impl Drop for MappedDumbBuffer {
    fn drop(&mut self) {
        // SAFETY: `ptr`/`len` describe exactly the region `mmap` returned.
        unsafe {
            let _ = libc::munmap(self.ptr, self.len);
        }
    }
}

#[repr(C)]
struct DrmModeMapDumb {
    handle: u32,
    pad: u32,
    offset: u64,
}

nix::ioctl_readwrite!(drm_ioctl_mode_map_dumb, b'd', 0xB3, DrmModeMapDumb);

/// The narrow set of KMS operations `DisplaySink` needs.
///
/// Method names intentionally mirror the underlying ioctl names
/// (`set_crtc`, `page_flip`, `create_dumb`, `add_fb`, `prime_fd_to_handle`,
/// ...) rather than abstracting further, since spec §6.2 states the
/// protocol's shape directly.
pub trait DrmBackend: Send {
    fn driver_name(&self) -> Result<String>;
    fn capabilities(&self) -> Result<Capabilities>;
    fn acquire_master(&self) -> Result<()>;
    fn release_master(&self) -> Result<()>;
    fn connectors(&self) -> Result<Vec<ConnectorInfo>>;
    fn encoders(&self) -> Result<Vec<EncoderInfo>>;
    fn crtc_ids(&self) -> Result<Vec<CrtcId>>;
    fn current_crtc(&self, crtc: CrtcId) -> Result<Option<(FbId, DisplayMode)>>;

    fn create_dumb(&self, width: u32, height: u32, bpp: u32) -> Result<(DumbHandle, u32)>;
    fn map_dumb(&self, handle: DumbHandle, size: u32) -> Result<MappedDumbBuffer>;
    fn destroy_dumb(&self, handle: DumbHandle) -> Result<()>;

    fn add_fb(&self, width: u32, height: u32, pitch: u32, format: FbFormat, handle: DumbHandle) -> Result<FbId>;
    fn rm_fb(&self, fb: FbId) -> Result<()>;

    fn prime_fd_to_handle(&self, dma_fd: i32) -> Result<DumbHandle>;

    fn set_crtc(&self, crtc: CrtcId, fb: FbId, connector: ConnectorId, mode: &DisplayMode) -> Result<()>;
    fn page_flip(&self, crtc: CrtcId, fb: FbId) -> Result<()>;
    fn wait_for_event(&self, timeout_secs: u32) -> Result<bool>;
    fn drain_one_event(&self) -> Result<()>;

    /// Set the connector's DPMS property (spec §4.1.6). `property_id` is
    /// the value from [`ConnectorInfo::dpms_property_id`]; callers must not
    /// invoke this with a zero id (no DPMS property on this connector).
    fn set_dpms(&self, connector: ConnectorId, property_id: u32, on: bool) -> Result<()>;
}

/// `DRM_MODE_DPMS_ON`, per the kernel's mode-object property values.
const DRM_MODE_DPMS_ON: u64 = 0;
/// `DRM_MODE_DPMS_OFF`, per the kernel's mode-object property values.
const DRM_MODE_DPMS_OFF: u64 = 3;
/// Sub-bit of `DRM_CAP_PRIME` indicating the driver can import (as opposed
/// to only export) PRIME/DMA-BUF handles.
const DRM_PRIME_CAP_IMPORT: u64 = 0x1;

/// Key identifying a mode uniquely enough to round-trip it back to the raw
/// `drm::control::Mode` the kernel reported, since `DisplayMode` (our
/// trait-level value type) drops the raw `drm_mode_modeinfo` the `set_crtc`
/// ioctl actually needs.
type ModeKey = (u32, u32, u32, u32, u32, u32);

fn mode_key(mode: &DisplayMode) -> ModeKey {
    (
        mode.hdisplay,
        mode.vdisplay,
        mode.clock_khz,
        mode.htotal,
        mode.vtotal,
        mode.vscan,
    )
}

/// A real `/dev/dri/cardN` node, wired through the `drm` crate.
pub struct KmsBackend {
    fd: OwnedFd,
    /// Raw modes seen via `connectors()`, keyed so `set_crtc` can recover
    /// the exact `drm::control::Mode` the kernel needs rather than
    /// reconstructing one from our flattened `DisplayMode`.
    mode_cache: Mutex<HashMap<ModeKey, drm::control::Mode>>,
}

impl AsFd for KmsBackend {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }
}

impl BaseDevice for KmsBackend {}
impl ControlDevice for KmsBackend {}

impl KmsBackend {
    /// Open `path` read/write, close-on-exec, non-blocking, per spec §4.1.2.
    pub fn open(path: &Path) -> Result<Self> {
        use nix::fcntl::{self, OFlag};
        use nix::sys::stat::Mode;

        let fd = fcntl::open(
            path,
            OFlag::O_RDWR | OFlag::O_CLOEXEC | OFlag::O_NONBLOCK,
            Mode::empty(),
        )
        .map_err(|e| Error::DeviceNotFound(format!("{}: {e}", path.display())))?;

        Ok(Self {
            fd,
            mode_cache: Mutex::new(HashMap::new()),
        })
    }
}

impl DrmBackend for KmsBackend {
    fn driver_name(&self) -> Result<String> {
        let version = BaseDevice::get_driver(self).map_err(|e| Error::HardwareFailure(e.to_string()))?;
        Ok(version.name().to_string_lossy().into_owned())
    }

    fn capabilities(&self) -> Result<Capabilities> {
        // drm-rs exposes capability queries through `get_driver_capability`;
        // `DumbBuffer` maps to `DRM_CAP_DUMB_BUFFER` and `Prime` to
        // `DRM_CAP_PRIME`, whose value is a bitmask with the
        // `DRM_PRIME_CAP_IMPORT` bit set when the driver supports importing
        // (as opposed to only exporting) PRIME/DMA-BUF handles.
        let dumb_buffer = BaseDevice::get_driver_capability(self, DriverCapability::DumbBuffer)
            .map(|v| v != 0)
            .unwrap_or(false);
        let prime_mask = BaseDevice::get_driver_capability(self, DriverCapability::Prime).unwrap_or(0);
        let prime_import = prime_mask & DRM_PRIME_CAP_IMPORT != 0;

        Ok(Capabilities {
            dumb_buffer,
            prime_import,
        })
    }

    fn acquire_master(&self) -> Result<()> {
        ControlDevice::acquire_master_lock(self).map_err(|e| {
            Error::DeviceBusy(format!("failed to acquire display master (another process holds the display): {e}"))
        })
    }

    fn release_master(&self) -> Result<()> {
        ControlDevice::release_master_lock(self).map_err(|e| Error::HardwareFailure(e.to_string()))
    }

    fn connectors(&self) -> Result<Vec<ConnectorInfo>> {
        let resources =
            ControlDevice::resource_handles(self).map_err(|e| Error::HardwareFailure(e.to_string()))?;
        let mut out = Vec::new();
        for handle in resources.connectors() {
            let info =
                ControlDevice::get_connector(self, *handle, true).map_err(|e| Error::HardwareFailure(e.to_string()))?;
            let modes: Vec<DisplayMode> = info.modes().iter().map(drm_mode_to_display_mode).collect();
            {
                let mut cache = self.mode_cache.lock().expect("mode cache mutex poisoned");
                for (raw, parsed) in info.modes().iter().zip(modes.iter()) {
                    cache.insert(mode_key(parsed), *raw);
                }
            }
            let dpms_property_id = dpms_property_id(self, *handle);
            out.push(ConnectorInfo {
                id: Into::<u32>::into(*handle),
                name: format!("{:?}-{}", info.interface(), info.interface_id()),
                connected: info.state() == connector::State::Connected,
                encoders: info.encoders().iter().map(|e| Into::<u32>::into(*e)).collect(),
                modes,
                dpms_property_id,
            });
        }
        Ok(out)
    }

    fn encoders(&self) -> Result<Vec<EncoderInfo>> {
        let resources =
            ControlDevice::resource_handles(self).map_err(|e| Error::HardwareFailure(e.to_string()))?;
        let mut out = Vec::new();
        for handle in resources.encoders() {
            let info = ControlDevice::get_encoder(self, *handle).map_err(|e| Error::HardwareFailure(e.to_string()))?;
            out.push(EncoderInfo {
                id: Into::<u32>::into(*handle),
                possible_crtcs: info.possible_crtcs().bits(),
            });
        }
        Ok(out)
    }

    fn crtc_ids(&self) -> Result<Vec<CrtcId>> {
        let resources =
            ControlDevice::resource_handles(self).map_err(|e| Error::HardwareFailure(e.to_string()))?;
        Ok(resources.crtcs().iter().map(|c| Into::<u32>::into(*c)).collect())
    }

    fn current_crtc(&self, crtc_id: CrtcId) -> Result<Option<(FbId, DisplayMode)>> {
        let handle = crtc::Handle::from(crtc_id);
        let info = ControlDevice::get_crtc(self, handle).map_err(|e| Error::HardwareFailure(e.to_string()))?;
        match (info.framebuffer(), info.mode()) {
            (Some(fb), Some(mode)) => Ok(Some((Into::<u32>::into(fb), drm_mode_to_display_mode(&mode)))),
            _ => Ok(None),
        }
    }

    fn create_dumb(&self, width: u32, height: u32, bpp: u32) -> Result<(DumbHandle, u32)> {
        let buffer = ControlDevice::create_dumb_buffer(self, (width, height), drm::buffer::DrmFourcc::Xrgb8888, bpp)
            .map_err(|e| Error::Memory(e.to_string()))?;
        Ok((Into::<u32>::into(buffer.handle()), buffer.pitch()))
    }

    fn map_dumb(&self, handle: DumbHandle, size: u32) -> Result<MappedDumbBuffer> {
        use std::os::fd::AsRawFd;

        let mut req = DrmModeMapDumb {
            handle,
            pad: 0,
            offset: 0,
        };
        // SAFETY: `req` is a valid `drm_mode_map_dumb` struct; the kernel
        // fills in `offset` on success.
        unsafe { drm_ioctl_mode_map_dumb(self.fd.as_raw_fd(), &mut req) }
            .map_err(|e| Error::Memory(format!("DRM_IOCTL_MODE_MAP_DUMB: {e}")))?;

        let len = size as usize;
        if len == 0 {
            return Err(Error::InvalidParam("map_dumb called with size=0".into()));
        }

        // SAFETY: `offset` is the kernel-assigned mmap offset for `handle`
        // on this device fd; mapping it PROT_READ|PROT_WRITE/MAP_SHARED is
        // exactly what `libdrm`'s `drmMap` does.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                self.fd.as_raw_fd(),
                req.offset as libc::off_t,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(Error::Memory("mmap of dumb buffer failed".into()));
        }

        Ok(MappedDumbBuffer { ptr, len })
    }

    fn destroy_dumb(&self, handle: DumbHandle) -> Result<()> {
        ControlDevice::destroy_dumb_buffer(self, drm::buffer::Handle::from(handle))
            .map_err(|e| Error::HardwareFailure(e.to_string()))
    }

    fn add_fb(&self, width: u32, height: u32, pitch: u32, format: FbFormat, handle: DumbHandle) -> Result<FbId> {
        let fb = ControlDevice::add_framebuffer_with_params(
            self,
            &drm::control::framebuffer::Info::new(
                width,
                height,
                pitch,
                format.depth(),
                format.bpp(),
                drm::buffer::Handle::from(handle),
            ),
        )
        .map_err(|e| Error::HardwareFailure(e.to_string()))?;
        Ok(Into::<u32>::into(fb))
    }

    fn rm_fb(&self, fb: FbId) -> Result<()> {
        ControlDevice::destroy_framebuffer(self, drm::control::framebuffer::Handle::from(fb))
            .map_err(|e| Error::HardwareFailure(e.to_string()))
    }

    fn prime_fd_to_handle(&self, dma_fd: i32) -> Result<DumbHandle> {
        // SAFETY: `dma_fd` is owned by the capture layer and remains valid
        // for the duration of this call; we only borrow it to perform the
        // import ioctl, we never close it.
        let borrowed = unsafe { BorrowedFd::borrow_raw(dma_fd) };
        let handle = BaseDevice::prime_fd_to_handle(self, borrowed).map_err(|e| Error::Memory(e.to_string()))?;
        Ok(Into::<u32>::into(handle))
    }

    fn set_crtc(&self, crtc_id: CrtcId, fb: FbId, connector_id: ConnectorId, mode: &DisplayMode) -> Result<()> {
        let crtc = crtc::Handle::from(crtc_id);
        let connector = connector::Handle::from(connector_id);
        let fb_handle = drm::control::framebuffer::Handle::from(fb);
        let drm_mode = self
            .mode_cache
            .lock()
            .expect("mode cache mutex poisoned")
            .get(&mode_key(mode))
            .copied()
            .ok_or_else(|| Error::InvalidParam("set_crtc called with a mode never seen via connectors()".into()))?;
        ControlDevice::set_crtc(self, crtc, Some(fb_handle), (0, 0), &[connector], Some(drm_mode)).map_err(|e| {
            if is_permission_error(&e) {
                Error::PermissionDenied
            } else {
                Error::HardwareFailure(e.to_string())
            }
        })
    }

    fn page_flip(&self, crtc_id: CrtcId, fb: FbId) -> Result<()> {
        let crtc = crtc::Handle::from(crtc_id);
        let fb_handle = drm::control::framebuffer::Handle::from(fb);
        ControlDevice::page_flip(
            self,
            crtc,
            fb_handle,
            &[drm::control::PageFlipFlags::PageFlipEvent],
            None,
        )
        .map_err(|e| {
            if is_permission_error(&e) {
                Error::PermissionDenied
            } else {
                Error::HardwareFailure(e.to_string())
            }
        })
    }

    fn wait_for_event(&self, timeout_secs: u32) -> Result<bool> {
        use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

        let mut fds = [PollFd::new(self.fd.as_fd(), PollFlags::POLLIN)];
        let timeout = PollTimeout::try_from(timeout_secs * 1000).unwrap_or(PollTimeout::MAX);
        let n = poll(&mut fds, timeout).map_err(|e| Error::HardwareFailure(e.to_string()))?;
        Ok(n > 0)
    }

    fn drain_one_event(&self) -> Result<()> {
        let mut events = ControlDevice::receive_events(self).map_err(|e| Error::HardwareFailure(e.to_string()))?;
        let _ = events.next();
        Ok(())
    }

    fn set_dpms(&self, connector_id: ConnectorId, property_id: u32, on: bool) -> Result<()> {
        let connector = connector::Handle::from(connector_id);
        let property = drm::control::property::Handle::from(property_id);
        let value = if on { DRM_MODE_DPMS_ON } else { DRM_MODE_DPMS_OFF };
        ControlDevice::set_property(self, connector, property, value).map_err(|e| {
            if is_permission_error(&e) {
                Error::PermissionDenied
            } else {
                Error::HardwareFailure(e.to_string())
            }
        })
    }
}

/// Find the connector's `DPMS` property handle, if it has one. Returns 0
/// when absent (some connector types, e.g. eDP/DSI panels, expose no DPMS
/// property at all), matching spec §4.1.2's "DPMS property id (0 if
/// absent)".
fn dpms_property_id(device: &KmsBackend, connector: connector::Handle) -> u32 {
    let Ok(props) = ControlDevice::get_properties(device, connector) else {
        return 0;
    };
    let Ok(map) = props.as_hashmap(device) else {
        return 0;
    };
    map.iter()
        .find(|(_, info)| info.name().to_string_lossy() == "DPMS")
        .map(|(handle, _)| Into::<u32>::into(*handle))
        .unwrap_or(0)
}

fn is_permission_error(err: &drm::SystemError) -> bool {
    matches!(err, drm::SystemError::PermissionDenied)
}

/// In-memory fake implementing [`DrmBackend`] for unit tests that exercise
/// `DisplaySink`'s control flow without a real device node.
#[cfg(test)]
pub(crate) mod fake {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::{Capabilities, ConnectorInfo, CrtcId, DrmBackend, DumbHandle, EncoderInfo, FbFormat, FbId, MappedDumbBuffer};
    use crate::mode::DisplayMode;
    use kvm_core::{Error, Result};

    /// Scripted, introspectable fake DRM backend.
    pub struct FakeBackend {
        pub driver_name: String,
        pub capabilities: Capabilities,
        pub connectors: Vec<ConnectorInfo>,
        pub encoders: Vec<EncoderInfo>,
        pub crtcs: Vec<CrtcId>,
        pub master_held: Mutex<bool>,
        next_handle: AtomicU32,
        pub set_crtc_calls: Mutex<Vec<(CrtcId, FbId)>>,
        pub page_flip_calls: Mutex<Vec<(CrtcId, FbId)>>,
        pub fail_set_crtc_with_permission: bool,
        pub fail_page_flip_with_permission: bool,
        pub events_pending: Mutex<u32>,
        pub dpms_calls: Mutex<Vec<(super::ConnectorId, bool)>>,
    }

    impl Default for FakeBackend {
        fn default() -> Self {
            Self {
                driver_name: String::from("vc4"),
                capabilities: Capabilities {
                    dumb_buffer: true,
                    prime_import: true,
                },
                connectors: Vec::new(),
                encoders: Vec::new(),
                crtcs: vec![1],
                master_held: Mutex::new(false),
                next_handle: AtomicU32::new(1),
                set_crtc_calls: Mutex::new(Vec::new()),
                page_flip_calls: Mutex::new(Vec::new()),
                fail_set_crtc_with_permission: false,
                fail_page_flip_with_permission: false,
                events_pending: Mutex::new(0),
                dpms_calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl DrmBackend for FakeBackend {
        fn driver_name(&self) -> Result<String> {
            Ok(self.driver_name.clone())
        }

        fn capabilities(&self) -> Result<Capabilities> {
            Ok(self.capabilities)
        }

        fn acquire_master(&self) -> Result<()> {
            *self.master_held.lock().expect("mutex") = true;
            Ok(())
        }

        fn release_master(&self) -> Result<()> {
            *self.master_held.lock().expect("mutex") = false;
            Ok(())
        }

        fn connectors(&self) -> Result<Vec<ConnectorInfo>> {
            Ok(self.connectors.clone())
        }

        fn encoders(&self) -> Result<Vec<EncoderInfo>> {
            Ok(self.encoders.clone())
        }

        fn crtc_ids(&self) -> Result<Vec<CrtcId>> {
            Ok(self.crtcs.clone())
        }

        fn current_crtc(&self, _crtc: CrtcId) -> Result<Option<(FbId, DisplayMode)>> {
            Ok(None)
        }

        fn create_dumb(&self, width: u32, _height: u32, bpp: u32) -> Result<(DumbHandle, u32)> {
            let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
            let pitch = width * (bpp / 8);
            Ok((handle, pitch))
        }

        fn map_dumb(&self, _handle: DumbHandle, size: u32) -> Result<MappedDumbBuffer> {
            let len = size as usize;
            // SAFETY: anonymous, private mapping with no backing fd; valid
            // for any `len > 0` on a real kernel.
            let ptr = unsafe {
                libc::mmap(
                    std::ptr::null_mut(),
                    len.max(1),
                    libc::PROT_READ | libc::PROT_WRITE,
                    libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                    -1,
                    0,
                )
            };
            if ptr == libc::MAP_FAILED {
                return Err(Error::Memory("anonymous mmap failed".into()));
            }
            Ok(MappedDumbBuffer { ptr, len: len.max(1) })
        }

        fn destroy_dumb(&self, _handle: DumbHandle) -> Result<()> {
            Ok(())
        }

        fn add_fb(&self, _width: u32, _height: u32, _pitch: u32, _format: FbFormat, handle: DumbHandle) -> Result<FbId> {
            Ok(handle + 1000)
        }

        fn rm_fb(&self, _fb: FbId) -> Result<()> {
            Ok(())
        }

        fn prime_fd_to_handle(&self, _dma_fd: i32) -> Result<DumbHandle> {
            Ok(self.next_handle.fetch_add(1, Ordering::SeqCst))
        }

        fn set_crtc(&self, crtc: CrtcId, fb: FbId, _connector: super::ConnectorId, _mode: &DisplayMode) -> Result<()> {
            if self.fail_set_crtc_with_permission {
                return Err(Error::PermissionDenied);
            }
            self.set_crtc_calls.lock().expect("mutex").push((crtc, fb));
            Ok(())
        }

        fn page_flip(&self, crtc: CrtcId, fb: FbId) -> Result<()> {
            if self.fail_page_flip_with_permission {
                return Err(Error::PermissionDenied);
            }
            self.page_flip_calls.lock().expect("mutex").push((crtc, fb));
            *self.events_pending.lock().expect("mutex") += 1;
            Ok(())
        }

        fn wait_for_event(&self, _timeout_secs: u32) -> Result<bool> {
            let mut pending = self.events_pending.lock().expect("mutex");
            Ok(*pending > 0)
        }

        fn drain_one_event(&self) -> Result<()> {
            let mut pending = self.events_pending.lock().expect("mutex");
            *pending = pending.saturating_sub(1);
            Ok(())
        }

        fn set_dpms(&self, connector: super::ConnectorId, _property_id: u32, on: bool) -> Result<()> {
            self.dpms_calls.lock().expect("mutex").push((connector, on));
            Ok(())
        }
    }
}

fn drm_mode_to_display_mode(mode: &drm::control::Mode) -> DisplayMode {
    let (hdisplay, vdisplay) = mode.size();
    // `Mode::hsync()`/`vsync()` return the sync-pulse `(start, end)` pair,
    // not the blanking totals the refresh-rate formula needs; those only
    // live on the raw `drm_mode_modeinfo` the crate converts back to.
    let raw: drm::ffi::drm_mode_modeinfo = (*mode).into();
    DisplayMode {
        hdisplay: u32::from(hdisplay),
        vdisplay: u32::from(vdisplay),
        clock_khz: mode.clock(),
        htotal: u32::from(raw.htotal),
        vtotal: u32::from(raw.vtotal),
        vscan: u32::from(mode.vscan()),
        preferred: mode.mode_type().contains(drm::control::ModeTypeFlags::PREFERRED),
        flags: ModeFlags {
            interlace: mode.mode_flags().contains(drm::control::ModeFlags::INTERLACE),
            dblscan: mode.mode_flags().contains(drm::control::ModeFlags::DBLSCAN),
        },
    }
}
