//! Error taxonomy shared by the display sink and the transcoder.
//!
//! Both hardware-facing crates return `Result<T, Error>` so callers can
//! match on a single closed set of failure modes regardless of which
//! component raised them.
//!
//! # Examples
//!
//! ```
//! # use kvm_core::Error;
//! fn classify(err: &Error) -> &'static str {
//!     match err {
//!         Error::InfoChange => "retry with the same input",
//!         Error::Unplugged => "connector disconnected",
//!         Error::PermissionDenied => "another display owner is active",
//!         _ => "propagate",
//!     }
//! }
//! ```

use thiserror::Error;

/// Errors produced by the display sink and the transcoder.
///
/// `InfoChange` is not a failure in the usual sense: it is a retryable
/// sentinel the JPEG decoder returns when the hardware reports a format
/// change mid-stream. Callers are expected to reissue the same input frame.
/// `PermissionDenied` on `set_crtc`/page-flip is likewise expected during
/// normal operation when a cooperating desktop owner holds the console; the
/// sink logs it at debug and continues rather than surfacing it as fatal.
#[derive(Error, Debug)]
pub enum Error {
    /// A caller-supplied argument is outside the range the hardware accepts.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Allocation of a buffer, buffer group, or mapped region failed.
    #[error("memory allocation failed: {0}")]
    Memory(String),

    /// Device or hardware-context initialization failed.
    #[error("initialization failed: {0}")]
    Init(String),

    /// H.264 encode failed.
    #[error("encode failed: {0}")]
    Encode(String),

    /// JPEG decode failed.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The pixel format is not supported at this call site.
    #[error("unsupported pixel format: {0}")]
    FormatUnsupported(String),

    /// No matching device node or connector was found.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// The device is held by another owner.
    #[error("device busy: {0}")]
    DeviceBusy(String),

    /// The hardware reported a failure outside the other categories.
    #[error("hardware failure: {0}")]
    HardwareFailure(String),

    /// An operation was attempted before `open`/`new` or after `close`/`destroy`.
    #[error("component not initialized")]
    NotInitialized,

    /// A fixed-size buffer was too small for the data being written into it.
    #[error("buffer overflow: {0}")]
    BufferOverflow(String),

    /// A hardware call exceeded its configured timeout.
    #[error("operation timed out")]
    Timeout,

    /// Retryable sentinel: the decoder observed an info-change event and
    /// needs the same input reissued.
    #[error("decoder info changed, retry with the same frame")]
    InfoChange,

    /// The stream ended (end-of-stream flag observed on a decoded frame).
    #[error("end of stream")]
    EndOfStream,

    /// The display connector is disconnected.
    #[error("display connector unplugged")]
    Unplugged,

    /// A privileged KMS call (set-crtc, page-flip) was rejected because
    /// another process holds display ownership. Not propagated by the sink;
    /// exposed here so callers constructing their own flows can match it.
    #[error("permission denied (another display owner is active)")]
    PermissionDenied,

    /// Underlying OS I/O failure (device open, ioctl, mmap).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type used throughout the pipeline.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True if this error is the decoder's retryable info-change sentinel.
    #[must_use]
    pub const fn is_info_change(&self) -> bool {
        matches!(self, Self::InfoChange)
    }

    /// True if the caller should treat this as "no failure, keep going"
    /// per the propagation policy (permission-denied on KMS calls,
    /// an unplugged connector).
    #[must_use]
    pub const fn is_tolerated(&self) -> bool {
        matches!(self, Self::PermissionDenied | Self::Unplugged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_change_is_recognized() {
        assert!(Error::InfoChange.is_info_change());
        assert!(!Error::Timeout.is_info_change());
    }

    #[test]
    fn tolerated_errors() {
        assert!(Error::PermissionDenied.is_tolerated());
        assert!(Error::Unplugged.is_tolerated());
        assert!(!Error::HardwareFailure("x".into()).is_tolerated());
    }

    #[test]
    fn display_messages_are_stable() {
        assert_eq!(Error::NotInitialized.to_string(), "component not initialized");
        assert_eq!(Error::Timeout.to_string(), "operation timed out");
    }
}
