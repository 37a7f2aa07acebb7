/// Discrete rhythmic position. Row 0 is the first beat of the chart.
pub type Row = i32;

/// Row resolution: every beat is split into this many rows.
pub const ROWS_PER_BEAT: Row = 48;

/// Rows in a 4/4 measure.
pub const ROWS_PER_MEASURE: Row = ROWS_PER_BEAT * 4;

/// Fallback tempo held by the row-0 BPM segment of a fresh tempo.
pub const DEFAULT_BPM: f64 = 120.0;

pub fn row_to_beat(row: f64) -> f64 {
    row / ROWS_PER_BEAT as f64
}

pub fn beat_to_row(beat: f64) -> Row {
    (beat * ROWS_PER_BEAT as f64).round() as Row
}

/// Seconds covered by one row at the given tempo. Zero for non-positive BPM.
pub fn seconds_per_row(bpm: f64) -> f64 {
    if bpm <= 0.0 || !bpm.is_finite() {
        return 0.0;
    }
    60.0 / (bpm * ROWS_PER_BEAT as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beat_row_conversion() {
        assert_eq!(beat_to_row(1.0), 48);
        assert_eq!(beat_to_row(0.25), 12);
        assert!((row_to_beat(96.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn seconds_per_row_at_120_bpm() {
        // 120 BPM = 0.5s per beat, 48 rows per beat
        assert!((seconds_per_row(120.0) - 0.5 / 48.0).abs() < 1e-12);
        assert_eq!(seconds_per_row(0.0), 0.0);
        assert_eq!(seconds_per_row(-10.0), 0.0);
    }
}
