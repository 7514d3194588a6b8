//! Transcoder configuration (spec §6.4, grounded on `us_mpp_processor_s`'s
//! encoder-parameter fields in `mpp_encoder.h`).

/// Rate-control mode for the H.264 encoder.
///
/// Numeric values match the `rc:mode` values MPP expects directly, so a
/// [`RcMode`] can be written straight into an encoder config key without
/// translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RcMode {
    /// Variable bitrate: the encoder is free to spend fewer bits on simple
    /// scenes. Default - KVM framebuffer content is often mostly static.
    #[default]
    Vbr = 0,
    /// Constant bitrate: output size is held close to the target
    /// regardless of scene complexity.
    Cbr = 1,
}

impl RcMode {
    #[must_use]
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// Configuration for a [`Transcoder`](crate::Transcoder).
///
/// Use [`TranscoderConfig::builder()`] for fluent construction, or struct
/// literal syntax with [`Default::default()`].
#[derive(Debug, Clone, PartialEq)]
pub struct TranscoderConfig {
    /// Largest width the transcoder will be asked to decode/encode. Drives
    /// buffer-group sizing at the Ready transition.
    pub max_width: u32,
    /// Largest height the transcoder will be asked to decode/encode.
    pub max_height: u32,
    /// Target H.264 bitrate, in kbps.
    pub bitrate_kbps: u32,
    /// Group-of-pictures size (distance between forced/periodic keyframes).
    pub gop_size: u32,
    /// Output frame rate numerator.
    pub fps_num: u32,
    /// Output frame rate denominator.
    pub fps_den: u32,
    /// H.264 profile ordinal (100 = High).
    pub profile: u32,
    /// H.264 level ordinal (40 = 4.0).
    pub level: u32,
    /// Bitrate control strategy.
    pub rc_mode: RcMode,
    /// Initial quantization parameter.
    pub qp_init: u32,
    /// Minimum quantization parameter (lowest compression, highest quality).
    pub qp_min: u32,
    /// Maximum quantization parameter (highest compression, lowest quality).
    pub qp_max: u32,
}

impl Default for TranscoderConfig {
    fn default() -> Self {
        Self {
            max_width: 1920,
            max_height: 1080,
            bitrate_kbps: 4000,
            gop_size: 30,
            fps_num: 30,
            fps_den: 1,
            profile: 100,
            level: 40,
            rc_mode: RcMode::Vbr,
            qp_init: 24,
            qp_min: 16,
            qp_max: 40,
        }
    }
}

impl TranscoderConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> TranscoderConfigBuilder {
        TranscoderConfigBuilder::default()
    }

    /// Target bitrate in bits per second, as MPP's `rc:bps_target` expects.
    #[must_use]
    pub fn bitrate_bps(&self) -> u32 {
        self.bitrate_kbps.saturating_mul(1000)
    }

    /// `rc:bps_max`: 20% overshoot allowance above the target.
    #[must_use]
    pub fn bps_max(&self) -> u32 {
        (f64::from(self.bitrate_bps()) * 1.2) as u32
    }

    /// `rc:bps_min`: 20% undershoot allowance below the target.
    #[must_use]
    pub fn bps_min(&self) -> u32 {
        (f64::from(self.bitrate_bps()) * 0.8) as u32
    }
}

/// Builder for [`TranscoderConfig`].
#[derive(Debug, Clone, Default)]
pub struct TranscoderConfigBuilder {
    max_width: Option<u32>,
    max_height: Option<u32>,
    bitrate_kbps: Option<u32>,
    gop_size: Option<u32>,
    fps_num: Option<u32>,
    fps_den: Option<u32>,
    profile: Option<u32>,
    level: Option<u32>,
    rc_mode: Option<RcMode>,
    qp_init: Option<u32>,
    qp_min: Option<u32>,
    qp_max: Option<u32>,
}

impl TranscoderConfigBuilder {
    #[must_use]
    pub fn max_width(mut self, width: u32) -> Self {
        self.max_width = Some(width);
        self
    }

    #[must_use]
    pub fn max_height(mut self, height: u32) -> Self {
        self.max_height = Some(height);
        self
    }

    #[must_use]
    pub fn bitrate_kbps(mut self, kbps: u32) -> Self {
        self.bitrate_kbps = Some(kbps);
        self
    }

    #[must_use]
    pub fn gop_size(mut self, size: u32) -> Self {
        self.gop_size = Some(size);
        self
    }

    #[must_use]
    pub fn fps(mut self, num: u32, den: u32) -> Self {
        self.fps_num = Some(num);
        self.fps_den = Some(den);
        self
    }

    #[must_use]
    pub fn profile(mut self, profile: u32) -> Self {
        self.profile = Some(profile);
        self
    }

    #[must_use]
    pub fn level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    #[must_use]
    pub fn rc_mode(mut self, mode: RcMode) -> Self {
        self.rc_mode = Some(mode);
        self
    }

    #[must_use]
    pub fn qp_range(mut self, min: u32, init: u32, max: u32) -> Self {
        self.qp_min = Some(min);
        self.qp_init = Some(init);
        self.qp_max = Some(max);
        self
    }

    /// Build the configuration, merging set fields over
    /// [`TranscoderConfig::default`].
    #[must_use]
    pub fn build(self) -> TranscoderConfig {
        let defaults = TranscoderConfig::default();
        TranscoderConfig {
            max_width: self.max_width.unwrap_or(defaults.max_width),
            max_height: self.max_height.unwrap_or(defaults.max_height),
            bitrate_kbps: self.bitrate_kbps.unwrap_or(defaults.bitrate_kbps),
            gop_size: self.gop_size.unwrap_or(defaults.gop_size),
            fps_num: self.fps_num.unwrap_or(defaults.fps_num),
            fps_den: self.fps_den.unwrap_or(defaults.fps_den),
            profile: self.profile.unwrap_or(defaults.profile),
            level: self.level.unwrap_or(defaults.level),
            rc_mode: self.rc_mode.unwrap_or(defaults.rc_mode),
            qp_init: self.qp_init.unwrap_or(defaults.qp_init),
            qp_min: self.qp_min.unwrap_or(defaults.qp_min),
            qp_max: self.qp_max.unwrap_or(defaults.qp_max),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = TranscoderConfig::default();
        assert_eq!(cfg.max_width, 1920);
        assert_eq!(cfg.max_height, 1080);
        assert_eq!(cfg.bitrate_kbps, 4000);
        assert_eq!(cfg.rc_mode, RcMode::Vbr);
        assert_eq!(cfg.profile, 100);
        assert_eq!(cfg.level, 40);
    }

    #[test]
    fn builder_overrides_only_set_fields() {
        let cfg = TranscoderConfig::builder().bitrate_kbps(8000).rc_mode(RcMode::Cbr).build();
        assert_eq!(cfg.bitrate_kbps, 8000);
        assert_eq!(cfg.rc_mode, RcMode::Cbr);
        assert_eq!(cfg.gop_size, 30);
    }

    #[test]
    fn bitrate_derivations_apply_twenty_percent_band() {
        let cfg = TranscoderConfig::builder().bitrate_kbps(1000).build();
        assert_eq!(cfg.bitrate_bps(), 1_000_000);
        assert_eq!(cfg.bps_max(), 1_200_000);
        assert_eq!(cfg.bps_min(), 800_000);
    }
}
