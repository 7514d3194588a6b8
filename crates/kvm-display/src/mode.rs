//! Display mode representation, refresh-rate computation, and mode
//! selection (spec §4.1.3).

/// Mode flags relevant to selection, mirroring the subset of DRM mode flags
/// the sink cares about (`DRM_MODE_FLAG_*`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModeFlags {
    /// `DRM_MODE_FLAG_INTERLACE`.
    pub interlace: bool,
    /// `DRM_MODE_FLAG_DBLSCAN`.
    pub dblscan: bool,
}

/// A single display mode as reported by the monitor (EDID) or the
/// connector's mode list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayMode {
    /// Horizontal visible resolution, in pixels.
    pub hdisplay: u32,
    /// Vertical visible resolution, in pixels.
    pub vdisplay: u32,
    /// Pixel clock, in kHz.
    pub clock_khz: u32,
    /// Horizontal total (visible + blanking), in pixels.
    pub htotal: u32,
    /// Vertical total (visible + blanking), in lines.
    pub vtotal: u32,
    /// Vertical scan multiplier; 0 or 1 means "no multiplier".
    pub vscan: u32,
    /// This connector's `PREFERRED` flag, used as selection priority 4.
    pub preferred: bool,
    pub flags: ModeFlags,
}

impl DisplayMode {
    /// Computed refresh rate in Hz, per spec §3:
    /// `clock*1e6 / (htotal * vtotal)`, halved on `DBLSCAN`, divided by
    /// `vscan` when `vscan > 1`, doubled for interlaced modes.
    ///
    /// This is computed unconditionally, even for interlaced modes which
    /// selection always discards: a caller inspecting the raw mode list
    /// still needs a correct number.
    #[must_use]
    pub fn refresh_hz(&self) -> f64 {
        if self.htotal == 0 || self.vtotal == 0 {
            return 0.0;
        }

        let mut refresh = f64::from(self.clock_khz) * 1000.0 / f64::from(self.htotal * self.vtotal);

        if self.flags.dblscan {
            refresh /= 2.0;
        }
        if self.vscan > 1 {
            refresh /= f64::from(self.vscan);
        }
        if self.flags.interlace {
            refresh *= 2.0;
        }

        refresh
    }
}

/// Outcome of [`select_mode`]: the chosen mode, plus an optional override of
/// the reported `vdisplay` for the legacy 640x416 letterbox case (spec
/// §4.1.3: "advertise `vdisplay = 416`" while the underlying mode is
/// 640x480).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeSelection {
    pub mode: DisplayMode,
    pub advertised_vdisplay: u32,
}

/// Select a display mode from `modes` for a requested `(width, height,
/// refresh_hz)`, per spec §4.1.3's priority order. Interlaced modes are
/// discarded before any other rule is applied.
///
/// Priority:
/// 1. Exact match on width, height, and refresh.
/// 2. Any mode matching width and height (any refresh).
/// 3. A mode with matching width and `vdisplay < requested_height`
///    (letterboxable).
/// 4. The `PREFERRED` mode.
/// 5. The first mode in the list.
///
/// Special case: requested exactly 640x416, if a 640x480 mode exists with
/// refresh less than the requested refresh, that mode is selected and its
/// `advertised_vdisplay` is 416 rather than 480.
#[must_use]
pub fn select_mode(
    modes: &[DisplayMode],
    requested_width: u32,
    requested_height: u32,
    requested_refresh_hz: f64,
) -> Option<ModeSelection> {
    let progressive: Vec<DisplayMode> = modes.iter().copied().filter(|m| !m.flags.interlace).collect();
    if progressive.is_empty() {
        return None;
    }

    if requested_width == 640 && requested_height == 416 {
        if let Some(m) = progressive
            .iter()
            .find(|m| m.hdisplay == 640 && m.vdisplay == 480 && m.refresh_hz() < requested_refresh_hz)
        {
            return Some(ModeSelection {
                mode: *m,
                advertised_vdisplay: 416,
            });
        }
    }

    // Priority 1: exact width/height/refresh.
    if let Some(m) = progressive.iter().find(|m| {
        m.hdisplay == requested_width
            && m.vdisplay == requested_height
            && (m.refresh_hz() - requested_refresh_hz).abs() < 0.5
    }) {
        return Some(plain(*m));
    }

    // Priority 2: matching width/height, any refresh.
    if let Some(m) = progressive
        .iter()
        .find(|m| m.hdisplay == requested_width && m.vdisplay == requested_height)
    {
        return Some(plain(*m));
    }

    // Priority 3: matching width, shorter height (letterboxable).
    if let Some(m) = progressive
        .iter()
        .find(|m| m.hdisplay == requested_width && m.vdisplay < requested_height)
    {
        return Some(plain(*m));
    }

    // Priority 4: the connector's preferred mode.
    if let Some(m) = progressive.iter().find(|m| m.preferred) {
        return Some(plain(*m));
    }

    // Priority 5: first mode in the list.
    progressive.first().copied().map(plain)
}

const fn plain(mode: DisplayMode) -> ModeSelection {
    ModeSelection {
        mode,
        advertised_vdisplay: mode.vdisplay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode(w: u32, h: u32, clock_khz: u32, htotal: u32, vtotal: u32, preferred: bool) -> DisplayMode {
        DisplayMode {
            hdisplay: w,
            vdisplay: h,
            clock_khz,
            htotal,
            vtotal,
            vscan: 1,
            preferred,
            flags: ModeFlags::default(),
        }
    }

    #[test]
    fn refresh_hz_basic_1080p60() {
        // 1920x1080@60 CVT-ish timings.
        let m = mode(1920, 1080, 148_500, 2200, 1125, false);
        assert!((m.refresh_hz() - 60.0).abs() < 0.1);
    }

    #[test]
    fn refresh_hz_dblscan_halves() {
        let mut m = mode(640, 480, 25_175, 800, 525, false);
        let base = m.refresh_hz();
        m.flags.dblscan = true;
        assert!((m.refresh_hz() - base / 2.0).abs() < 1e-6);
    }

    #[test]
    fn refresh_hz_interlace_doubles() {
        let mut m = mode(1920, 1080, 74_250, 2200, 1125, false);
        let base = m.refresh_hz();
        m.flags.interlace = true;
        assert!((m.refresh_hz() - base * 2.0).abs() < 1e-6);
    }

    #[test]
    fn interlaced_modes_are_never_selected() {
        let mut interlaced = mode(1920, 1080, 74_250, 2200, 1125, true);
        interlaced.flags.interlace = true;
        let modes = [interlaced];
        assert!(select_mode(&modes, 1920, 1080, 60.0).is_none());
    }

    #[test]
    fn exact_match_wins_over_letterbox_candidate() {
        let exact = mode(1920, 1080, 148_500, 2200, 1125, false);
        let letterbox = mode(1920, 720, 74_250, 2200, 750, false);
        let modes = [letterbox, exact];
        let sel = select_mode(&modes, 1920, 1080, 60.0).expect("mode selected");
        assert_eq!(sel.mode, exact);
        assert_eq!(sel.advertised_vdisplay, 1080);
    }

    #[test]
    fn letterbox_candidate_used_when_no_exact_height() {
        let letterbox = mode(1920, 720, 74_250, 2200, 750, false);
        let unrelated = mode(1280, 720, 74_250, 1650, 750, true);
        let modes = [unrelated, letterbox];
        let sel = select_mode(&modes, 1920, 1080, 60.0).expect("mode selected");
        assert_eq!(sel.mode, letterbox);
    }

    #[test]
    fn falls_back_to_preferred_then_first() {
        let a = mode(800, 600, 40_000, 1056, 628, false);
        let b = mode(1024, 768, 65_000, 1344, 806, true);
        let modes = [a, b];
        let sel = select_mode(&modes, 3840, 2160, 60.0).expect("mode selected");
        assert_eq!(sel.mode, b);

        let modes_no_preferred = [a, mode(1024, 768, 65_000, 1344, 806, false)];
        let sel = select_mode(&modes_no_preferred, 3840, 2160, 60.0).expect("mode selected");
        assert_eq!(sel.mode, a);
    }

    #[test]
    fn legacy_640x416_letterbox_case() {
        let base_480 = mode(640, 480, 25_175, 800, 525, false); // ~59.9Hz
        let modes = [base_480];
        let sel = select_mode(&modes, 640, 416, 60.0).expect("mode selected");
        assert_eq!(sel.mode, base_480);
        assert_eq!(sel.advertised_vdisplay, 416);
    }

    #[test]
    fn legacy_640x416_does_not_apply_when_refresh_not_lower() {
        let base_480 = mode(640, 480, 25_175, 800, 525, false); // ~59.9Hz
        let modes = [base_480];
        // Requested refresh lower than the mode's own refresh: special case
        // does not trigger, falls through to exact-match-on-dims-only logic,
        // which also won't match 416, so priority 3 (letterboxable) applies.
        let sel = select_mode(&modes, 640, 416, 10.0).expect("mode selected");
        assert_eq!(sel.advertised_vdisplay, 480);
    }
}
