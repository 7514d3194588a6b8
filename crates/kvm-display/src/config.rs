//! Display sink configuration (spec §6.3).

use std::path::{Path, PathBuf};

/// Configuration for [`DisplaySink`](crate::DisplaySink).
///
/// Use [`SinkConfig::builder()`] for fluent construction, or struct literal
/// syntax with [`Default::default()`]. There is no fallible `build()`:
/// every field has a sensible default, and the combinations that can be
/// invalid (an unreachable `port`, a zero `timeout_secs`) can only be
/// detected once a real device is opened, so validation happens in
/// [`DisplaySink::open`](crate::DisplaySink::open) rather than here.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// DRM device node path (default `/dev/dri/card0`).
    pub path: PathBuf,
    /// Connector name to use (e.g. `HDMI-A-1`). `None` auto-detects the
    /// first connected connector.
    pub port: Option<String>,
    /// Seconds to wait for vsync before `wait_for_vsync` returns a timeout.
    pub timeout_secs: u32,
    /// Seconds of no-signal presentation before the display is powered
    /// down via DPMS.
    pub blank_after_secs: u32,
    /// Force the centered/`SetCRTC` presentation path even on platforms
    /// that would otherwise page-flip (default off).
    pub center_mode: bool,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/dev/dri/card0"),
            port: None,
            timeout_secs: 3,
            blank_after_secs: 15,
            center_mode: false,
        }
    }
}

impl SinkConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> SinkConfigBuilder {
        SinkConfigBuilder::default()
    }
}

/// Builder for [`SinkConfig`].
#[derive(Debug, Clone, Default)]
pub struct SinkConfigBuilder {
    path: Option<PathBuf>,
    port: Option<String>,
    timeout_secs: Option<u32>,
    blank_after_secs: Option<u32>,
    center_mode: Option<bool>,
}

impl SinkConfigBuilder {
    /// Set the DRM device node path.
    #[must_use]
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the connector name (e.g. `HDMI-A-1`).
    #[must_use]
    pub fn port(mut self, port: impl Into<String>) -> Self {
        self.port = Some(port.into());
        self
    }

    /// Set the vsync wait timeout, in seconds.
    #[must_use]
    pub fn timeout_secs(mut self, secs: u32) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Set the no-signal blank-after timeout, in seconds.
    #[must_use]
    pub fn blank_after_secs(mut self, secs: u32) -> Self {
        self.blank_after_secs = Some(secs);
        self
    }

    /// Force the centered presentation path regardless of platform.
    #[must_use]
    pub fn center_mode(mut self, enable: bool) -> Self {
        self.center_mode = Some(enable);
        self
    }

    /// Build the configuration, merging set fields over [`SinkConfig::default`].
    #[must_use]
    pub fn build(self) -> SinkConfig {
        let defaults = SinkConfig::default();
        SinkConfig {
            path: self.path.unwrap_or(defaults.path),
            port: self.port.or(defaults.port),
            timeout_secs: self.timeout_secs.unwrap_or(defaults.timeout_secs),
            blank_after_secs: self.blank_after_secs.unwrap_or(defaults.blank_after_secs),
            center_mode: self.center_mode.unwrap_or(defaults.center_mode),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = SinkConfig::default();
        assert_eq!(cfg.path, PathBuf::from("/dev/dri/card0"));
        assert!(cfg.port.is_none());
        assert_eq!(cfg.timeout_secs, 3);
        assert_eq!(cfg.blank_after_secs, 15);
        assert!(!cfg.center_mode);
    }

    #[test]
    fn builder_overrides_only_set_fields() {
        let cfg = SinkConfig::builder().port("HDMI-A-1").timeout_secs(5).build();
        assert_eq!(cfg.port.as_deref(), Some("HDMI-A-1"));
        assert_eq!(cfg.timeout_secs, 5);
        assert_eq!(cfg.blank_after_secs, 15);
    }
}
