//! Encoder progress as reported by `ffmpeg -progress`.

/// Latest values seen on the progress stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FfmpegProgress {
    pub frame: u64,
    /// Output position in milliseconds
    pub out_time_ms: i64,
    /// Multiple of realtime
    pub speed: f64,
    /// Set once the encoder reports `progress=end`
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Percentage of `expected_ms` written so far, capped at 100.
    pub fn percentage(&self, expected_ms: i64) -> f64 {
        if expected_ms <= 0 {
            return 0.0;
        }
        (self.out_time_ms as f64 * 100.0 / expected_ms as f64).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_of_chunk() {
        let p = FfmpegProgress {
            out_time_ms: 7_500,
            ..Default::default()
        };
        assert!((p.percentage(30_000) - 25.0).abs() < 1e-9);
        assert_eq!(p.percentage(6_000), 100.0);
        assert_eq!(p.percentage(0), 0.0);
    }
}
