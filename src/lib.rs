//! # kvm-transcode-drm
//!
//! DRM/KMS display passthrough and hardware MJPEG/H.264 transcoding for
//! embedded remote-KVM boards.
//!
//! This crate provides a unified interface to the underlying hardware
//! crates:
//!
//! - **[`display`]** - DRM/KMS scan-out, mode selection, and on-screen
//!   display status text
//! - **[`transcode`]** - Hardware MJPEG decode and H.264 encode via
//!   Rockchip's Media Process Platform
//!
//! # Features
//!
//! Both are enabled by default. Select only what the board needs:
//!
//! ```toml
//! # Use everything (default)
//! kvm-transcode-drm = "0.1"
//!
//! # Display only
//! kvm-transcode-drm = { version = "0.1", default-features = false, features = ["display"] }
//!
//! # Transcode only
//! kvm-transcode-drm = { version = "0.1", default-features = false, features = ["transcode"] }
//! ```
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `display` | Yes | DRM/KMS display sink |
//! | `transcode` | Yes | Hardware MJPEG/H.264 transcoder |
//! | `full` | No | Alias for `display` + `transcode` |
//!
//! # Quick Start
//!
//! ## Display a live capture feed
//!
//! ```rust,ignore
//! use kvm_transcode_drm::display::{DisplaySink, SinkConfig, CaptureInfo};
//! use kvm_transcode_drm::kvm_core::PixelFormat;
//!
//! let mut sink = DisplaySink::init(SinkConfig::builder().port("HDMI-A-1".into()).build());
//! let capture = CaptureInfo {
//!     width: 1920, height: 1080, pixel_format: PixelFormat::Yuyv,
//!     refresh_hz: 60.0, buffer_count: 4, dma_fds: vec![],
//! };
//! sink.open(Some(capture))?;
//! ```
//!
//! ## Transcode MJPEG to H.264
//!
//! ```rust,ignore
//! use kvm_transcode_drm::transcode::{Transcoder, TranscoderConfig};
//!
//! let transcoder = Transcoder::new(TranscoderConfig::builder().bitrate_kbps(4000).build())?;
//! let h264_frame = transcoder.process(&mjpeg_frame, false)?;
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      kvm-transcode-drm                       │
//! ├───────────────────────────┬────────────────────────────────  │
//! │        kvm-display        │         kvm-transcode            │
//! │                           │                                  │
//! │  DisplaySink              │  Transcoder                      │
//! │  SinkConfig                │  JpegDecoder / H264Encoder       │
//! │  ConnectorStatus / Mode   │  TranscoderConfig                │
//! └─────────────┬─────────────┴────────────────┬─────────────────┘
//!               │                              │
//!               ▼                              ▼
//!         /dev/dri/card*              librockchip_mpp (MPP)
//! ```
//!
//! Both hardware crates share one vocabulary (`Frame`, `PixelFormat`,
//! `Error`) from [`kvm_core`], re-exported here unconditionally since
//! either feature needs it.
//!
//! # Platform Support
//!
//! Linux only. `display` requires a DRM/KMS device node
//! (`/dev/dri/card*`); `transcode` requires `librockchip_mpp` on the
//! target's library search path (see `kvm-transcode`'s `build.rs`).
//!
//! # Related Crates
//!
//! The individual hardware crates can be used directly:
//!
//! - [`kvm-core`](https://crates.io/crates/kvm-core) - shared value types
//! - [`kvm-display`](https://crates.io/crates/kvm-display) - display only
//! - [`kvm-transcode`](https://crates.io/crates/kvm-transcode) - transcode only

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// RE-EXPORTS
// =============================================================================

/// Shared value types used by both hardware crates: `Frame`, `PixelFormat`,
/// `CenteringGeometry`, and the `Error`/`Result` taxonomy.
///
/// See [`kvm_core`] documentation for details.
pub use kvm_core;

/// DRM/KMS display sink: mode selection, scan-out buffer provisioning, and
/// on-screen display for embedded remote-KVM boards.
///
/// See [`kvm_display`] documentation for details.
#[cfg(feature = "display")]
#[cfg_attr(docsrs, doc(cfg(feature = "display")))]
pub use kvm_display as display;

/// Hardware-accelerated MJPEG decode / H.264 encode transcoding pipeline.
///
/// See [`kvm_transcode`] documentation for details.
#[cfg(feature = "transcode")]
#[cfg_attr(docsrs, doc(cfg(feature = "transcode")))]
pub use kvm_transcode as transcode;

// =============================================================================
// PRELUDE - Common types for convenience
// =============================================================================

/// Prelude module with commonly used types.
///
/// ```rust
/// use kvm_transcode_drm::prelude::*;
/// ```
pub mod prelude {
    pub use kvm_core::{CenteringGeometry, Error, Frame, PixelFormat, Result};

    #[cfg(feature = "display")]
    pub use kvm_display::{CaptureInfo, DisplaySink, OpenResult, PresentResult, SinkConfig, SinkConfigBuilder, StubReason};

    #[cfg(feature = "transcode")]
    pub use kvm_transcode::{H264Encoder, JpegDecoder, RcMode, Stats, Transcoder, TranscoderConfig, TranscoderConfigBuilder};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    #[cfg(feature = "display")]
    fn test_display_reexport() {
        let _ = display::SinkConfig::default();
    }

    #[test]
    #[cfg(feature = "transcode")]
    fn test_transcode_reexport() {
        let _ = transcode::TranscoderConfig::default();
    }
}
