//! Cumulative processing statistics for a [`Transcoder`](crate::Transcoder).

/// Running counters and timing averages for a transcoder's lifetime.
///
/// Updated after every [`Transcoder::process`](crate::Transcoder::process)
/// call; never reset except by [`Transcoder::reset`](crate::Transcoder::reset).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Stats {
    pub frames_processed: u64,
    pub bytes_input: u64,
    pub bytes_output: u64,
    pub processing_errors: u64,
    pub avg_processing_time_ms: f64,
    pub total_processing_time_ms: f64,
    pub current_fps: f64,
    pub last_stats_update: u64,

    pub frames_decoded: u64,
    pub decode_errors: u64,

    pub frames_encoded: u64,
    pub encode_errors: u64,
    pub keyframes_generated: u32,
}

impl Stats {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful pipeline pass: `process_time_ms` folds into the
    /// running average and `current_fps` is derived from it.
    pub fn record_success(&mut self, bytes_in: u64, bytes_out: u64, process_time_ms: f64, now_ms: u64) {
        self.frames_processed += 1;
        self.bytes_input += bytes_in;
        self.bytes_output += bytes_out;
        self.total_processing_time_ms += process_time_ms;
        self.avg_processing_time_ms = self.total_processing_time_ms / self.frames_processed as f64;
        if process_time_ms > 0.0 {
            self.current_fps = 1000.0 / process_time_ms;
        }
        self.last_stats_update = now_ms;
    }

    pub fn record_error(&mut self, now_ms: u64) {
        self.processing_errors += 1;
        self.last_stats_update = now_ms;
    }

    pub fn record_decode(&mut self, ok: bool) {
        if ok {
            self.frames_decoded += 1;
        } else {
            self.decode_errors += 1;
        }
    }

    pub fn record_encode(&mut self, ok: bool, is_keyframe: bool) {
        if ok {
            self.frames_encoded += 1;
            if is_keyframe {
                self.keyframes_generated += 1;
            }
        } else {
            self.encode_errors += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_stats_are_zeroed() {
        let stats = Stats::new();
        assert_eq!(stats.frames_processed, 0);
        assert_eq!(stats.current_fps, 0.0);
    }

    #[test]
    fn record_success_updates_running_average() {
        let mut stats = Stats::new();
        stats.record_success(100, 50, 10.0, 1);
        stats.record_success(100, 50, 20.0, 2);
        assert_eq!(stats.frames_processed, 2);
        assert_eq!(stats.bytes_input, 200);
        assert_eq!(stats.total_processing_time_ms, 30.0);
        assert_eq!(stats.avg_processing_time_ms, 15.0);
        assert_eq!(stats.current_fps, 1000.0 / 20.0);
    }

    #[test]
    fn record_encode_tracks_keyframes_independently_of_frame_count() {
        let mut stats = Stats::new();
        stats.record_encode(true, true);
        stats.record_encode(true, false);
        stats.record_encode(false, false);
        assert_eq!(stats.frames_encoded, 2);
        assert_eq!(stats.keyframes_generated, 1);
        assert_eq!(stats.encode_errors, 1);
    }
}
