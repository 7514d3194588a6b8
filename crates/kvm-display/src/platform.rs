//! Per-platform display presentation strategy.
//!
//! The three targeted SBC families differ enough in DRM driver quirks
//! (whether page-flip events reliably fire, whether DMA import is safe)
//! that the sink dispatches on a small tagged variant rather than hiding the
//! difference behind a trait object: see `SPEC_FULL.md`'s note that a
//! shared "virtual" base would hide more than it exposes here.

/// Display hardware family, detected from the DRM driver name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Driver name unrecognized; treated like [`Platform::Generic`].
    Unknown,
    /// Broadcom VideoCore (`vc4`), found on Raspberry Pi boards. Supports
    /// DMA import and asynchronous page-flip with a reliable completion
    /// event.
    RaspberryPi,
    /// Amlogic `meson` SoCs. Page-flip events are not reliable; the sink
    /// always uses synchronous `SetCRTC` and always allocates dumb buffers.
    Amlogic,
    /// Any other DRM driver. Attempts DMA import with a dumb-buffer
    /// fallback, same as Raspberry Pi.
    Generic,
}

impl Platform {
    /// Detect platform family from a DRM driver name, per spec §4.1.2:
    /// substring `vc4` selects Raspberry Pi, substring `meson` selects
    /// Amlogic, anything else is Generic.
    #[must_use]
    pub fn detect(driver_name: &str) -> Self {
        if driver_name.contains("vc4") {
            Self::RaspberryPi
        } else if driver_name.contains("meson") {
            Self::Amlogic
        } else {
            Self::Generic
        }
    }

    /// True if this platform must use the centered/`SetCRTC` presentation
    /// path rather than asynchronous page-flip, either because the
    /// hardware requires it (Amlogic) or because the caller requested it
    /// via `SinkConfig::center_mode`.
    #[must_use]
    pub const fn requires_centered_present(self, center_mode: bool) -> bool {
        matches!(self, Self::Amlogic) || center_mode
    }
}
