//! Shared value types for the display sink and transcoder: the frame
//! format, the pixel-format tag, centering geometry, and the error taxonomy
//! both hardware crates return.
//!
//! This crate is pure Rust with no unsafe code and no I/O: it exists so
//! [`kvm-display`](https://docs.rs/kvm-display) and
//! [`kvm-transcode`](https://docs.rs/kvm-transcode) can share one vocabulary
//! without either depending on the other.

#![cfg_attr(docsrs, feature(doc_cfg))]

mod error;
mod frame;
mod geometry;
mod pixfmt;

pub use error::{Error, Result};
pub use frame::Frame;
pub use geometry::{align16, align64, CenteringGeometry};
pub use pixfmt::PixelFormat;
