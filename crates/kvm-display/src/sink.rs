//! [`DisplaySink`]: DRM/KMS mode selection, scan-out buffer provisioning,
//! and presentation lifecycle (spec §4.1).

use std::sync::Arc;
use std::time::{Duration, Instant};

use kvm_core::{CenteringGeometry, Error, Frame, PixelFormat, Result};
use tracing::{debug, info, warn};

use crate::buffer::{buffer_count_for, live_buffer_plan, provision_stub_buffers, LiveBufferPlan, ScanoutBuffer};
use crate::config::SinkConfig;
use crate::device::{
    ConnectorId, CrtcId, DisplayMode as KmsDisplayMode, DrmBackend, EncoderInfo, FbFormat, FbId, KmsBackend,
};
use crate::mode::select_mode;
use crate::osd::{draw_centered_multiline, StubKind};
use crate::platform::Platform;
use crate::status::ConnectorStatus;

/// Describes the upstream capture feed, if any, that a call to
/// [`DisplaySink::open`] should attempt to display live.
#[derive(Debug, Clone)]
pub struct CaptureInfo {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub refresh_hz: f64,
    /// Number of capture buffers in the upstream pool; also the number of
    /// DMA-BUF file descriptors in `dma_fds`, one per buffer slot.
    pub buffer_count: u32,
    /// DMA-BUF file descriptors for each capture buffer, imported once at
    /// open time. A slot with no corresponding fd (or an import that fails)
    /// falls back to a dumb buffer sized to the mode.
    pub dma_fds: Vec<i32>,
}

/// Why [`DisplaySink::open`] or a presentation call fell back to (or
/// stayed on) the OSD stub path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubReason {
    /// No capture was offered at all.
    NoCapture,
    /// The capture's pixel format isn't one the display path can show.
    BadFormat,
    /// The capture's resolution doesn't fit the selected mode.
    BadResolution,
}

/// Outcome of [`DisplaySink::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenResult {
    /// The connector is attached and the capture feed can be displayed
    /// directly via [`DisplaySink::present_dma`] or
    /// [`DisplaySink::present_centered`].
    Live,
    /// The connector is attached but only the OSD stub path is available.
    Stub(StubReason),
    /// No display is attached to the configured connector.
    Unplugged,
}

/// Outcome of a presentation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentResult {
    Presented,
    Stub(StubReason),
    Unplugged,
}

struct RuntimeState {
    backend: Arc<dyn DrmBackend>,
    platform: Platform,
    connector_id: ConnectorId,
    crtc_id: CrtcId,
    mode: KmsDisplayMode,
    advertised_vdisplay: u32,
    status: ConnectorStatus,
    buffers: Vec<ScanoutBuffer>,
    /// Index of the live/centered presentation target; always `buffers[0]`
    /// once provisioned.
    primary: usize,
    /// Rotating index into `buffers` used by `present_stub`, so the
    /// previous frame stays on screen while the next one is drawn.
    osd_index: usize,
    saved_crtc: Option<(FbId, KmsDisplayMode)>,
    has_vsync: bool,
    exposing_dma_handle: Option<i32>,
    blank_at: Option<Instant>,
    dpms_property_id: u32,
    /// Last DPMS state this sink itself drove, so `ensure_power` only issues
    /// a property-set ioctl on a genuine transition (spec §4.1.6: "enabling
    /// DPMS on first presentation and off on the blank deadline"). `None`
    /// until the first `ensure_power` call.
    dpms_on: Option<bool>,
}

/// DRM/KMS display sink: owns a connector/CRTC pair on a single device node
/// and presents either a live capture feed or a fixed-string OSD stub.
///
/// [`DisplaySink::init`] only stores configuration; no device node is
/// touched until [`DisplaySink::open`]. Dropping (or calling
/// [`DisplaySink::close`] on) an unopened sink is always a no-op.
pub struct DisplaySink {
    config: SinkConfig,
    state: Option<RuntimeState>,
}

impl DisplaySink {
    /// Store `config` for a later [`DisplaySink::open`].
    #[must_use]
    pub fn init(config: SinkConfig) -> Self {
        Self { config, state: None }
    }

    /// Open the configured DRM device, select a connector and mode, and
    /// provision scan-out buffers, per spec §4.1.1-§4.1.4.
    ///
    /// `capture` describes the upstream feed to attempt to show live; pass
    /// `None` to open directly into the OSD stub path (e.g. when no
    /// capture device is attached at all).
    pub fn open(&mut self, capture: Option<CaptureInfo>) -> Result<OpenResult> {
        if self.state.is_some() {
            return Err(Error::Init("DisplaySink::open called while already open".into()));
        }

        let backend: Arc<dyn DrmBackend> = Arc::new(KmsBackend::open(&self.config.path)?);
        self.open_with_backend(backend, capture)
    }

    fn open_with_backend(&mut self, backend: Arc<dyn DrmBackend>, capture: Option<CaptureInfo>) -> Result<OpenResult> {
        // Another process (the desktop compositor, typically) may already
        // hold the master lease; drop it first so our own acquire is the
        // one that sticks, per spec §4.1.2.
        let _ = backend.release_master();
        backend.acquire_master()?;

        let caps = backend.capabilities()?;
        if !caps.dumb_buffer {
            return Err(Error::Init("display device does not support dumb buffers".into()));
        }
        if capture.is_some() && !caps.prime_import {
            return Err(Error::Init("display device does not support DMA-BUF import".into()));
        }

        let driver = backend.driver_name()?;
        let platform = Platform::detect(&driver);
        info!(driver = %driver, platform = ?platform, "display device opened");

        let connectors = backend.connectors()?;
        let chosen = select_connector(&connectors, self.config.port.as_deref())?;
        let connector_id = chosen.id;
        let connector_name = chosen.name.clone();
        let connector_connected = chosen.connected;
        let connector_encoders = chosen.encoders.clone();
        let connector_modes = chosen.modes.clone();
        let dpms_property_id = chosen.dpms_property_id;

        let mut status = ConnectorStatus::new(&self.config.path, &connector_name);
        if !connector_connected || !status.is_connected()? {
            let _ = backend.release_master();
            return Ok(OpenResult::Unplugged);
        }

        let (req_w, req_h, req_refresh) = capture
            .as_ref()
            .map_or((0, 0, 0.0), |c| (c.width, c.height, c.refresh_hz));
        let selection = select_mode(&connector_modes, req_w, req_h, req_refresh)
            .ok_or_else(|| Error::Init(format!("connector {connector_name} advertises no usable mode")))?;

        let open_result = classify_open_result(&capture, &selection.mode, selection.advertised_vdisplay);

        let encoders = backend.encoders()?;
        let crtc_ids = backend.crtc_ids()?;
        let crtc_id = choose_crtc(&crtc_ids, &encoders, &connector_encoders)
            .ok_or_else(|| Error::Init(format!("no usable CRTC for connector {connector_name}")))?;

        let is_live = matches!(open_result, OpenResult::Live);
        let mut buffers = provision_buffers(backend.as_ref(), platform, is_live, capture.as_ref(), &selection.mode)?;

        let saved_crtc = backend.current_crtc(crtc_id).unwrap_or(None);

        if let Some(first) = buffers.first().and_then(ScanoutBuffer::fb_id) {
            match backend.set_crtc(crtc_id, first, connector_id, &selection.mode) {
                Ok(()) => {}
                Err(Error::PermissionDenied) => {
                    debug!("set_crtc denied: another process owns the display master");
                }
                Err(e) => {
                    for b in &mut buffers {
                        b.release(backend.as_ref());
                    }
                    let _ = backend.release_master();
                    return Err(e);
                }
            }
        }

        self.state = Some(RuntimeState {
            backend,
            platform,
            connector_id,
            crtc_id,
            mode: selection.mode,
            advertised_vdisplay: selection.advertised_vdisplay,
            status,
            buffers,
            primary: 0,
            osd_index: 0,
            saved_crtc,
            has_vsync: false,
            exposing_dma_handle: None,
            blank_at: None,
            dpms_property_id,
            dpms_on: None,
        });

        Ok(open_result)
    }

    /// Present a DMA-imported capture frame via asynchronous page-flip
    /// (spec §4.1.5, Raspberry Pi/Generic path).
    pub fn present_dma(&mut self, frame: &Frame) -> Result<PresentResult> {
        let state = self.require_state_mut()?;

        if !state.status.is_connected()? {
            return Ok(PresentResult::Unplugged);
        }

        ensure_power(state, true)?;

        let index = frame.buffer_index as usize;
        let fb_id = state
            .buffers
            .get(index)
            .and_then(ScanoutBuffer::fb_id)
            .ok_or_else(|| Error::InvalidParam(format!("frame buffer_index {index} out of range")))?;

        match state.backend.page_flip(state.crtc_id, fb_id) {
            Ok(()) => {
                state.has_vsync = false;
                state.exposing_dma_handle = frame.dma_handle;
            }
            Err(Error::PermissionDenied) => {
                debug!("page-flip denied: another process owns the display master");
            }
            Err(e) => return Err(e),
        }
        state.blank_at = None;
        Ok(PresentResult::Presented)
    }

    /// Present a frame via synchronous `SetCRTC` into the primary scan-out
    /// buffer, after centering it per [`CenteringGeometry`] (spec §4.1.5,
    /// Amlogic path).
    pub fn present_centered(&mut self, frame: &Frame) -> Result<PresentResult> {
        let state = self.require_state_mut()?;

        if !state.status.is_connected()? {
            return Ok(PresentResult::Unplugged);
        }

        let geometry = CenteringGeometry::compute(frame.width, frame.height, state.mode.hdisplay, state.advertised_vdisplay);
        if !geometry.needs_center {
            return Ok(PresentResult::Stub(StubReason::BadResolution));
        }

        let primary = state.primary;
        let pitch;
        let fb_id;
        {
            let dst = state
                .buffers
                .get_mut(primary)
                .ok_or_else(|| Error::Init("no primary scan-out buffer provisioned".into()))?;
            pitch = dst.pitch;
            fb_id = dst.fb_id().ok_or_else(|| Error::Init("primary buffer has no framebuffer".into()))?;
            let bytes = dst.bytes_mut().ok_or_else(|| Error::Init("primary buffer is not CPU-mapped".into()))?;
            blit_centered(bytes, pitch, &geometry, frame);
        }

        match state.backend.set_crtc(state.crtc_id, fb_id, state.connector_id, &state.mode) {
            Ok(()) => {}
            Err(Error::PermissionDenied) => {
                debug!("set_crtc denied: another process owns the display master");
            }
            Err(e) => return Err(e),
        }
        state.blank_at = None;
        Ok(PresentResult::Presented)
    }

    /// Render one of the fixed OSD strings into the next rotating stub
    /// buffer and present it (spec §4.1.5).
    pub fn present_stub(&mut self, kind: StubKind, capture: Option<&CaptureInfo>) -> Result<PresentResult> {
        let state = self.require_state_mut()?;

        if !state.status.is_connected()? {
            return Ok(PresentResult::Unplugged);
        }

        ensure_power(state, true)?;

        if state.buffers.is_empty() {
            return Err(Error::Init("no OSD buffers provisioned".into()));
        }

        let index = state.osd_index;
        state.osd_index = (state.osd_index + 1) % state.buffers.len();

        let detail = capture.map(|c| format!("{}X{}P@{}HZ", c.width, c.height, c.refresh_hz.round() as i64));
        let message = kind.message(detail.as_deref());

        let fb_id = {
            let buf = &mut state.buffers[index];
            let fb_id = buf.fb_id().ok_or_else(|| Error::Init("OSD buffer has no framebuffer".into()))?;
            let width = buf.width;
            let height = buf.height;
            let pitch = buf.pitch;
            let bytes = buf.bytes_mut().ok_or_else(|| Error::Init("OSD buffer is not CPU-mapped".into()))?;
            bytes.fill(0);
            draw_centered_multiline(bytes, pitch, width, height, &message);
            fb_id
        };

        match state.backend.page_flip(state.crtc_id, fb_id) {
            Ok(()) => {
                state.has_vsync = false;
                state.exposing_dma_handle = None;
            }
            Err(Error::PermissionDenied) => {
                debug!("page-flip denied: another process owns the display master");
            }
            Err(e) => return Err(e),
        }
        state.blank_at = None;

        let reason = match kind {
            StubKind::NoLiveVideo | StubKind::OnlineIsActive => StubReason::NoCapture,
            StubKind::UnsupportedCaptureFormat => StubReason::BadFormat,
            StubKind::UnsupportedResolution => StubReason::BadResolution,
        };
        Ok(PresentResult::Stub(reason))
    }

    /// Drive the no-signal timeout state machine (spec §4.1.6): keeps the
    /// "no live video" stub on screen until `blank_after_secs` has elapsed
    /// with no successful presentation, at which point the display is
    /// powered off.
    pub fn ensure_no_signal(&mut self) -> Result<()> {
        let blank_after = Duration::from_secs(u64::from(self.config.blank_after_secs));
        let now = Instant::now();

        let deadline = {
            let state = self.require_state_mut()?;
            *state.blank_at.get_or_insert(now + blank_after)
        };

        if now >= deadline {
            return self.power_off();
        }

        self.present_stub(StubKind::NoLiveVideo, None).map(|_| ())
    }

    /// Power the display down via DPMS. Idempotent; a no-op once the
    /// display is already considered off.
    pub fn power_off(&mut self) -> Result<()> {
        let state = self.require_state_mut()?;
        debug!("powering off display (no-signal timeout elapsed)");
        ensure_power(state, false)
    }

    /// Block until the next vsync event, or until `timeout_secs` elapses.
    pub fn wait_for_vsync(&mut self) -> Result<()> {
        let timeout_secs = self.config.timeout_secs;
        let state = self.require_state_mut()?;
        ensure_power(state, true)?;

        if state.platform == Platform::Amlogic {
            state.has_vsync = true;
            return Ok(());
        }

        if state.has_vsync {
            return Ok(());
        }

        if !state.backend.wait_for_event(timeout_secs)? {
            return Err(Error::Timeout);
        }
        state.backend.drain_one_event()?;
        state.has_vsync = true;
        state.exposing_dma_handle = None;
        state.blank_at = None;
        Ok(())
    }

    /// Tear down the sink: restore the display's prior `CRTC` state,
    /// release every scan-out buffer, and release the display master.
    /// Idempotent; safe to call on a sink that was never opened.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut state) = self.state.take() else {
            return Ok(());
        };

        if state.exposing_dma_handle.is_some() {
            let _ = wait_for_vsync_raw(&state);
        }

        if let Some((fb_id, mode)) = state.saved_crtc.take() {
            if let Err(e) = state.backend.set_crtc(state.crtc_id, fb_id, state.connector_id, &mode) {
                warn!(error = %e, "failed to restore prior CRTC state on close");
            }
        }

        for mut buffer in state.buffers.drain(..).rev() {
            buffer.release(state.backend.as_ref());
        }

        if let Err(e) = state.backend.release_master() {
            warn!(error = %e, "failed to release display master on close");
        }

        Ok(())
    }

    /// Whether the caller should drive live frames through
    /// [`DisplaySink::present_centered`] rather than
    /// [`DisplaySink::present_dma`] for the remainder of this open session:
    /// true on Amlogic (which cannot rely on page-flip completion events)
    /// or whenever [`SinkConfig::center_mode`] was requested, per spec
    /// §4.1.5 and §9's platform-dispatch note.
    pub fn should_present_centered(&self) -> Result<bool> {
        let state = self.state.as_ref().ok_or(Error::NotInitialized)?;
        Ok(state.platform.requires_centered_present(self.config.center_mode))
    }

    fn require_state_mut(&mut self) -> Result<&mut RuntimeState> {
        self.state.as_mut().ok_or(Error::NotInitialized)
    }
}

impl Drop for DisplaySink {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Drive the connector's DPMS property to `on`, per spec §4.1.6. A no-op
/// when the connector exposes no DPMS property (`dpms_property_id == 0`)
/// or when this sink already believes the display is in that state.
fn ensure_power(state: &mut RuntimeState, on: bool) -> Result<()> {
    if state.dpms_on == Some(on) {
        return Ok(());
    }
    if state.dpms_property_id != 0 {
        match state.backend.set_dpms(state.connector_id, state.dpms_property_id, on) {
            Ok(()) => {}
            Err(Error::PermissionDenied) => {
                debug!("set_dpms denied: another process owns the display master");
            }
            Err(e) => return Err(e),
        }
    }
    state.dpms_on = Some(on);
    Ok(())
}

fn wait_for_vsync_raw(state: &RuntimeState) -> Result<()> {
    if state.backend.wait_for_event(1)? {
        state.backend.drain_one_event()?;
    }
    Ok(())
}

fn classify_open_result(capture: &Option<CaptureInfo>, mode: &KmsDisplayMode, advertised_vdisplay: u32) -> OpenResult {
    match capture {
        None => OpenResult::Stub(StubReason::NoCapture),
        Some(cap) if !cap.pixel_format.is_display_capturable() => OpenResult::Stub(StubReason::BadFormat),
        Some(cap) if cap.width != mode.hdisplay || cap.height > advertised_vdisplay => {
            OpenResult::Stub(StubReason::BadResolution)
        }
        Some(_) => OpenResult::Live,
    }
}

fn select_connector<'a>(
    connectors: &'a [crate::device::ConnectorInfo],
    port: Option<&str>,
) -> Result<&'a crate::device::ConnectorInfo> {
    match port {
        Some(name) => connectors
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| Error::DeviceNotFound(format!("no connector named {name}"))),
        None => connectors
            .iter()
            .find(|c| c.connected)
            .or_else(|| connectors.first())
            .ok_or_else(|| Error::DeviceNotFound("display device has no connectors".into())),
    }
}

/// Pick the first CRTC (by DRM resource-list position) any of
/// `connector_encoders` can drive, per the `possible_crtcs` bitmask
/// convention: bit `i` of an encoder's mask refers to `crtc_ids[i]`, not to
/// CRTC id `i`.
fn choose_crtc(crtc_ids: &[CrtcId], encoders: &[EncoderInfo], connector_encoders: &[u32]) -> Option<CrtcId> {
    for enc_id in connector_encoders {
        let Some(encoder) = encoders.iter().find(|e| e.id == *enc_id) else {
            continue;
        };
        for (i, crtc_id) in crtc_ids.iter().enumerate() {
            if encoder.possible_crtcs & (1 << i) != 0 {
                return Some(*crtc_id);
            }
        }
    }
    None
}

fn provision_buffers(
    backend: &dyn DrmBackend,
    platform: Platform,
    is_live: bool,
    capture: Option<&CaptureInfo>,
    mode: &KmsDisplayMode,
) -> Result<Vec<ScanoutBuffer>> {
    if !is_live {
        let n_bufs = buffer_count_for(false, 0);
        let (buffers, _bpp) = provision_stub_buffers(backend, n_bufs, mode.hdisplay, mode.vdisplay)?;
        return Ok(buffers);
    }

    let capture = capture.expect("is_live implies a capture was classified Live");
    match live_buffer_plan(platform, capture.buffer_count, mode.hdisplay, mode.vdisplay) {
        LiveBufferPlan::AmlogicDumb { width, height } => {
            // Spec §4.1.4: Amlogic always allocates dumb buffers in
            // XRGB8888 (32 bpp), never the stub path's RGB888-first
            // fallback order - the centered blit always writes 4
            // bytes/pixel and would overrun a narrower format.
            let n_bufs = buffer_count_for(false, 0);
            let mut buffers = Vec::with_capacity(n_bufs as usize);
            for _ in 0..n_bufs {
                match ScanoutBuffer::new_dumb(backend, width, height, FbFormat::Xrgb8888) {
                    Ok(b) => buffers.push(b),
                    Err(e) => {
                        for mut b in buffers {
                            b.release(backend);
                        }
                        return Err(e);
                    }
                }
            }
            Ok(buffers)
        }
        LiveBufferPlan::TryImportThenDumb {
            capture_buffer_count,
            mode_width,
            mode_height,
        } => {
            let fb_format = if capture.pixel_format.is_jpeg_family() {
                FbFormat::Xrgb8888
            } else {
                FbFormat::PassThrough(capture.pixel_format)
            };
            let bytes_per_pixel = capture.pixel_format.packed_bytes_per_pixel().unwrap_or(4);
            let pitch = capture.width * bytes_per_pixel;

            let mut buffers = Vec::with_capacity(capture_buffer_count as usize);
            for i in 0..capture_buffer_count {
                let dma_fd = capture.dma_fds.get(i as usize).copied();
                let imported = dma_fd.and_then(|fd| {
                    ScanoutBuffer::new_imported(backend, fd, capture.width, capture.height, pitch, fb_format).ok()
                });
                let buffer = match imported {
                    Some(b) => b,
                    None => {
                        debug!(slot = i, "DMA import unavailable, falling back to dumb buffer");
                        ScanoutBuffer::new_dumb(backend, mode_width, mode_height, FbFormat::Xrgb8888)?
                    }
                };
                buffers.push(buffer);
            }
            Ok(buffers)
        }
    }
}

/// Copy `frame`'s pixels into `dst` (an XRGB8888 buffer of pitch
/// `dst_pitch`) at the offset computed by `geometry`. Non-RGB formats
/// (YUYV, NV12, ...) are out of scope for the centered path per spec
/// §4.1.5: Amlogic's capture-independent dumb path always receives
/// RGB24/BGR24/XRGB8888 frames from the transcoder's passthrough stage.
fn blit_centered(dst: &mut [u8], dst_pitch: u32, geometry: &CenteringGeometry, frame: &Frame) {
    let src = frame.payload();
    let bpp = frame.pixel_format.packed_bytes_per_pixel().unwrap_or(4) as usize;
    let row_bytes = frame.width as usize * bpp;

    for row in 0..frame.height as usize {
        let src_start = row * frame.stride as usize;
        let src_end = src_start + row_bytes;
        if src_end > src.len() {
            break;
        }
        let dst_y = geometry.offset_y as usize + row;
        let dst_row_start = dst_y * dst_pitch as usize + geometry.offset_x as usize * 4;

        if bpp == 4 {
            let dst_end = dst_row_start + row_bytes;
            if dst_end > dst.len() {
                break;
            }
            dst[dst_row_start..dst_end].copy_from_slice(&src[src_start..src_end]);
        } else {
            for col in 0..frame.width as usize {
                let s = src_start + col * bpp;
                let d = dst_row_start + col * 4;
                if s + 3 >= src.len() || d + 4 > dst.len() {
                    break;
                }
                dst[d] = src[s];
                dst[d + 1] = src[s + 1];
                dst[d + 2] = src[s + 2];
                dst[d + 3] = 0xFF;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::fake::FakeBackend;
    use crate::device::{ConnectorInfo, EncoderInfo};
    use crate::mode::ModeFlags;

    fn test_mode() -> KmsDisplayMode {
        KmsDisplayMode {
            hdisplay: 1920,
            vdisplay: 1080,
            clock_khz: 148_500,
            htotal: 2200,
            vtotal: 1125,
            vscan: 1,
            preferred: true,
            flags: ModeFlags::default(),
        }
    }

    fn backend_with_connector(connected: bool) -> FakeBackend {
        let mut backend = FakeBackend::default();
        backend.connectors = vec![ConnectorInfo {
            id: 10,
            name: "HDMI-A-1".into(),
            connected,
            encoders: vec![20],
            modes: vec![test_mode()],
            dpms_property_id: 99,
        }];
        backend.encoders = vec![EncoderInfo {
            id: 20,
            possible_crtcs: 0b1,
        }];
        backend.crtcs = vec![1];
        backend
    }

    fn open_sink(backend: FakeBackend, capture: Option<CaptureInfo>) -> (DisplaySink, OpenResult) {
        let mut sink = DisplaySink::init(SinkConfig::default());
        let result = sink.open_with_backend(Arc::new(backend), capture).expect("open succeeds");
        (sink, result)
    }

    #[test]
    fn open_with_no_capture_is_stub() {
        let (_sink, result) = open_sink(backend_with_connector(true), None);
        assert_eq!(result, OpenResult::Stub(StubReason::NoCapture));
    }

    #[test]
    fn open_with_unplugged_connector_reports_unplugged() {
        let (_sink, result) = open_sink(backend_with_connector(false), None);
        assert_eq!(result, OpenResult::Unplugged);
    }

    #[test]
    fn open_with_matching_live_capture_is_live() {
        let capture = CaptureInfo {
            width: 1920,
            height: 1080,
            pixel_format: PixelFormat::Yuyv,
            refresh_hz: 60.0,
            buffer_count: 2,
            dma_fds: vec![],
        };
        let (_sink, result) = open_sink(backend_with_connector(true), Some(capture));
        assert_eq!(result, OpenResult::Live);
    }

    #[test]
    fn open_with_unsupported_format_is_stub() {
        let capture = CaptureInfo {
            width: 1920,
            height: 1080,
            pixel_format: PixelFormat::H264,
            refresh_hz: 60.0,
            buffer_count: 2,
            dma_fds: vec![],
        };
        let (_sink, result) = open_sink(backend_with_connector(true), Some(capture));
        assert_eq!(result, OpenResult::Stub(StubReason::BadFormat));
    }

    #[test]
    fn open_with_oversized_capture_is_stub_bad_resolution() {
        let capture = CaptureInfo {
            width: 1920,
            height: 2000,
            pixel_format: PixelFormat::Yuyv,
            refresh_hz: 60.0,
            buffer_count: 2,
            dma_fds: vec![],
        };
        let (_sink, result) = open_sink(backend_with_connector(true), Some(capture));
        assert_eq!(result, OpenResult::Stub(StubReason::BadResolution));
    }

    #[test]
    fn present_stub_cycles_through_rotation_buffers() {
        let (mut sink, _) = open_sink(backend_with_connector(true), None);
        let r1 = sink.present_stub(StubKind::NoLiveVideo, None).expect("present");
        let r2 = sink.present_stub(StubKind::NoLiveVideo, None).expect("present");
        assert_eq!(r1, PresentResult::Stub(StubReason::NoCapture));
        assert_eq!(r2, PresentResult::Stub(StubReason::NoCapture));
        let idx = sink.state.as_ref().unwrap().osd_index;
        assert_eq!(idx, 2 % 4);
    }

    #[test]
    fn wait_for_vsync_on_amlogic_always_latches_true() {
        let mut backend = backend_with_connector(true);
        backend.driver_name = "meson".into();
        let (mut sink, _) = open_sink(backend, None);
        sink.wait_for_vsync().expect("latched immediately");
        assert!(sink.state.as_ref().unwrap().has_vsync);
    }

    #[test]
    fn wait_for_vsync_times_out_with_no_pending_event() {
        let (mut sink, _) = open_sink(backend_with_connector(true), None);
        let err = sink.wait_for_vsync().expect_err("no event pending");
        assert!(matches!(err, Error::Timeout));
    }

    #[test]
    fn wait_for_vsync_succeeds_after_a_page_flip() {
        let (mut sink, _) = open_sink(backend_with_connector(true), None);
        sink.present_stub(StubKind::NoLiveVideo, None).expect("present");
        sink.wait_for_vsync().expect("event was queued by the page flip");
    }

    #[test]
    fn ensure_no_signal_blanks_after_timeout() {
        let mut backend = backend_with_connector(true);
        backend.driver_name = "vc4".into();
        let mut sink = DisplaySink::init(SinkConfig::builder().blank_after_secs(0).build());
        sink.open_with_backend(Arc::new(backend), None).expect("open");
        // With blank_after_secs = 0 the very first call is already past
        // the deadline and should power off rather than present a stub.
        std::thread::sleep(Duration::from_millis(5));
        sink.ensure_no_signal().expect("power off path does not error");
    }

    #[test]
    fn close_is_idempotent_and_safe_before_open() {
        let mut sink = DisplaySink::init(SinkConfig::default());
        sink.close().expect("closing before open is a no-op");
        let (mut sink, _) = open_sink(backend_with_connector(true), None);
        sink.close().expect("first close");
        sink.close().expect("second close is a no-op");
    }

    #[test]
    fn should_present_centered_follows_platform_and_config() {
        let (sink, _) = open_sink(backend_with_connector(true), None);
        assert!(!sink.should_present_centered().expect("vc4 defaults to page-flip"));

        let mut backend = backend_with_connector(true);
        backend.driver_name = "meson".into();
        let (sink, _) = open_sink(backend, None);
        assert!(sink.should_present_centered().expect("meson always centers"));
    }

    #[test]
    fn presenting_turns_dpms_on_and_power_off_turns_it_off() {
        let backend = Arc::new(backend_with_connector(true));
        let mut sink = DisplaySink::init(SinkConfig::default());
        sink.open_with_backend(backend.clone() as Arc<dyn DrmBackend>, None)
            .expect("open succeeds");

        sink.present_stub(StubKind::NoLiveVideo, None).expect("present");
        assert_eq!(*backend.dpms_calls.lock().expect("mutex"), vec![(10, true)]);

        // A second presentation while DPMS is already on must not re-issue
        // the property set.
        sink.present_stub(StubKind::NoLiveVideo, None).expect("present");
        assert_eq!(backend.dpms_calls.lock().expect("mutex").len(), 1);

        sink.power_off().expect("power off");
        assert_eq!(*backend.dpms_calls.lock().expect("mutex"), vec![(10, true), (10, false)]);
    }

    #[test]
    fn present_dma_rejects_out_of_range_buffer_index() {
        let capture = CaptureInfo {
            width: 1920,
            height: 1080,
            pixel_format: PixelFormat::Yuyv,
            refresh_hz: 60.0,
            buffer_count: 2,
            dma_fds: vec![],
        };
        let (mut sink, result) = open_sink(backend_with_connector(true), Some(capture));
        assert_eq!(result, OpenResult::Live);
        let mut bad_frame = Frame::with_capacity(1920, 1080, 1920 * 2, PixelFormat::Yuyv, 64);
        bad_frame.buffer_index = 99;
        let err = sink.present_dma(&bad_frame).expect_err("index out of range");
        assert!(matches!(err, Error::InvalidParam(_)));
    }
}
