//! DRM/KMS display sink: mode selection, scan-out buffer provisioning, and
//! on-screen-display for embedded remote-KVM boards.
//!
//! [`DisplaySink`] is the single public entry point. It owns one DRM device
//! node and one connector, and presents either a live capture feed
//! (imported zero-copy via DMA-BUF where the platform allows it) or a fixed
//! set of OSD status strings when no usable feed is available.

#![cfg_attr(docsrs, feature(doc_cfg))]

mod buffer;
mod config;
mod device;
mod mode;
mod osd;
mod platform;
mod sink;
mod status;

pub use buffer::{BufferKind, ScanoutBuffer};
pub use config::{SinkConfig, SinkConfigBuilder};
pub use device::{
    Capabilities, ConnectorId, ConnectorInfo, CrtcId, DrmBackend, DumbHandle, EncoderId, EncoderInfo, FbFormat, FbId,
    KmsBackend, MappedDumbBuffer,
};
pub use mode::{DisplayMode, ModeFlags, ModeSelection};
pub use osd::StubKind;
pub use platform::Platform;
pub use sink::{CaptureInfo, DisplaySink, OpenResult, PresentResult, StubReason};

pub use kvm_core::{Error, Result};
