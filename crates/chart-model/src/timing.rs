use std::collections::BTreeSet;

use log::debug;

use crate::group::SegmentGroup;
use crate::row::{DEFAULT_BPM, Row, seconds_per_row};

/// One breakpoint of the row→time step function.
///
/// The row is reached at `arrive`; a delay pushes the moment its notes are
/// hit to `time`; a stop holds the chart until `resume`. From `resume` on,
/// time advances by `spr` seconds per row (zero inside a warp).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingEvent {
    pub row: Row,
    pub arrive: f64,
    pub time: f64,
    pub resume: f64,
    pub spr: f64,
    pub bpm: f64,
}

/// Row↔time mapping derived from the BPM, stop, delay and warp tracks of a
/// segment group. Immutable once built; rebuild it when those tracks change.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingData {
    offset: f64,
    events: Vec<TimingEvent>,
    warps: Vec<(Row, Row)>,
    initial_spr: f64,
}

impl Default for TimingData {
    fn default() -> Self {
        Self::new(0.0, &SegmentGroup::default())
    }
}

// Overlapping or touching warps collapse into one [start, end) span.
fn merge_warps(group: &SegmentGroup) -> Vec<(Row, Row)> {
    let mut merged: Vec<(Row, Row)> = Vec::new();
    for (row, warp) in group.warps().iter() {
        if warp.num_rows <= 0 {
            continue;
        }
        let end = row.saturating_add(warp.num_rows);
        match merged.last_mut() {
            Some(last) if row <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((row, end)),
        }
    }
    merged
}

fn span_index(warps: &[(Row, Row)], row: Row) -> Option<usize> {
    let idx = warps.partition_point(|(start, _)| *start <= row);
    idx.checked_sub(1).filter(|&i| row < warps[i].1)
}

impl TimingData {
    /// Builds the step function. Row 0 is at `-offset` seconds.
    pub fn new(offset: f64, group: &SegmentGroup) -> Self {
        let warps = merge_warps(group);

        let mut rows: BTreeSet<Row> = BTreeSet::new();
        rows.insert(0);
        rows.extend(group.bpms().iter().map(|(r, _)| r));
        rows.extend(group.stops().iter().map(|(r, _)| r));
        rows.extend(group.delays().iter().map(|(r, _)| r));
        for (start, end) in &warps {
            rows.insert(*start);
            rows.insert(*end);
        }

        let initial_bpm = group.bpms().get(0).bpm;
        let initial_spr = seconds_per_row(initial_bpm);
        let mut events: Vec<TimingEvent> = Vec::with_capacity(rows.len());
        for row in rows.into_iter().filter(|r| *r >= 0) {
            let arrive = match events.last() {
                Some(prev) => prev.resume + (row - prev.row) as f64 * prev.spr,
                None => -offset,
            };
            let span = span_index(&warps, row);
            let skipped = span.is_some_and(|i| row > warps[i].0);
            let (delay, stop) = if skipped {
                (0.0, 0.0)
            } else {
                (
                    group.delays().get(row).seconds,
                    group.stops().get(row).seconds,
                )
            };
            let bpm = group.bpms().get(row).bpm;
            let spr = if span.is_some() {
                0.0
            } else {
                seconds_per_row(bpm)
            };
            let time = arrive + delay;
            events.push(TimingEvent {
                row,
                arrive,
                time,
                resume: time + stop,
                spr,
                bpm,
            });
        }

        debug!(
            "built timing data: {} events, {} warp spans, offset {offset}",
            events.len(),
            warps.len()
        );
        Self {
            offset,
            events,
            warps,
            initial_spr,
        }
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn events(&self) -> &[TimingEvent] {
        &self.events
    }

    /// Merged warp spans as `[start, end)` rows.
    pub fn warp_spans(&self) -> &[(Row, Row)] {
        &self.warps
    }

    // Number of events at or before `row`.
    fn seek(&self, row: f64) -> usize {
        self.events.partition_point(|e| e.row as f64 <= row)
    }

    fn time_from(&self, count: usize, row: f64) -> f64 {
        let Some(e) = count.checked_sub(1).and_then(|i| self.events.get(i)) else {
            let arrive = self.events.first().map_or(-self.offset, |e| e.arrive);
            return arrive + row * self.initial_spr;
        };
        if row == e.row as f64 {
            e.time
        } else {
            e.resume + (row - e.row as f64) * e.spr
        }
    }

    /// Seconds at which `row` is hit. Rows before 0 extrapolate with the
    /// first BPM.
    pub fn row_to_time(&self, row: f64) -> f64 {
        self.time_from(self.seek(row), row)
    }

    /// The greatest row whose time is at or before `time`. Inside a stop or
    /// delay this is the paused row; at the start time of a warp it is the
    /// warp's end row.
    pub fn time_to_row(&self, time: f64) -> f64 {
        let count = self.events.partition_point(|e| e.arrive <= time);
        let Some(e) = count.checked_sub(1).and_then(|i| self.events.get(i)) else {
            let arrive = self.events.first().map_or(-self.offset, |e| e.arrive);
            if self.initial_spr > 0.0 {
                return (time - arrive) / self.initial_spr;
            }
            return 0.0;
        };
        if time < e.resume || e.spr <= 0.0 {
            return e.row as f64;
        }
        let row = e.row as f64 + (time - e.resume) / e.spr;
        match self.events.get(count) {
            Some(next) => row.min(next.row as f64),
            None => row,
        }
    }

    /// Tempo in effect at `row`.
    pub fn bpm_at(&self, row: Row) -> f64 {
        let count = self.seek(row as f64);
        count
            .checked_sub(1)
            .and_then(|i| self.events.get(i))
            .or_else(|| self.events.first())
            .map_or(DEFAULT_BPM, |e| e.bpm)
    }

    /// Whether `row` lies strictly inside a warp and is skipped.
    pub fn is_warped(&self, row: Row) -> bool {
        span_index(&self.warps, row).is_some_and(|i| row > self.warps[i].0)
    }

    pub fn tracker(&self) -> TimeTracker<'_> {
        TimeTracker::new(self)
    }
}

/// Cursor for row→time queries in non-decreasing row order: each step only
/// walks forward over the events it passes. A query behind the cursor
/// re-seeks with a binary search.
#[derive(Debug, Clone)]
pub struct TimeTracker<'a> {
    timing: &'a TimingData,
    count: usize,
    last_row: f64,
}

impl<'a> TimeTracker<'a> {
    pub fn new(timing: &'a TimingData) -> Self {
        Self {
            timing,
            count: 0,
            last_row: f64::NEG_INFINITY,
        }
    }

    pub fn advance(&mut self, row: f64) -> f64 {
        let events = &self.timing.events;
        if row < self.last_row {
            self.count = self.timing.seek(row);
        } else {
            while self.count < events.len() && events[self.count].row as f64 <= row {
                self.count += 1;
            }
        }
        self.last_row = row;
        self.timing.time_from(self.count, row)
    }

    pub fn reset(&mut self) {
        self.count = 0;
        self.last_row = f64::NEG_INFINITY;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::group::SegmentSet;
    use crate::segment::{BpmChange, Delay, Stop, Warp};

    const EPS: f64 = 1e-9;

    fn timing(set: SegmentSet) -> TimingData {
        TimingData::new(0.0, &SegmentGroup::from_set(&set, "test"))
    }

    #[test]
    fn constant_tempo() {
        let t = TimingData::default();
        assert!((t.row_to_time(48.0) - 0.5).abs() < EPS);
        assert!((t.time_to_row(0.5) - 48.0).abs() < EPS);
        assert!((t.row_to_time(-48.0) + 0.5).abs() < EPS);
        assert!((t.time_to_row(-0.5) + 48.0).abs() < EPS);
        assert_eq!(t.bpm_at(1000), 120.0);
    }

    #[test]
    fn offset_moves_row_zero() {
        let t = TimingData::new(0.1, &SegmentGroup::default());
        assert!((t.row_to_time(0.0) + 0.1).abs() < EPS);
        assert!((t.time_to_row(-0.1)).abs() < EPS);
    }

    #[test]
    fn bpm_change() {
        let t = timing(
            SegmentSet::new()
                .with(0, BpmChange::new(120.0))
                .with(96, BpmChange::new(240.0)),
        );
        assert!((t.row_to_time(192.0) - 1.5).abs() < EPS);
        assert!((t.time_to_row(1.5) - 192.0).abs() < EPS);
        assert_eq!(t.bpm_at(95), 120.0);
        assert_eq!(t.bpm_at(96), 240.0);
    }

    #[test]
    fn stop_is_a_vertical_jump() {
        let t = timing(SegmentSet::new().with(100, Stop::new(1.0)));
        let at_stop = 100.0 * 0.5 / 48.0;
        assert!((t.row_to_time(100.0) - at_stop).abs() < EPS);
        let eps = 0.25;
        let expected = at_stop + 1.0 + eps * 0.5 / 48.0;
        assert!((t.row_to_time(100.0 + eps) - expected).abs() < EPS);
        assert!((t.time_to_row(at_stop + 0.5) - 100.0).abs() < EPS);
        assert!((t.time_to_row(at_stop + 1.0) - 100.0).abs() < EPS);
    }

    #[test]
    fn delay_pushes_its_own_row() {
        let t = timing(SegmentSet::new().with(48, Delay::new(0.5)));
        assert!((t.row_to_time(47.0) - 47.0 * 0.5 / 48.0).abs() < EPS);
        assert!((t.row_to_time(48.0) - 1.0).abs() < EPS);
        assert!((t.row_to_time(96.0) - 1.5).abs() < EPS);
        assert!((t.time_to_row(0.75) - 48.0).abs() < EPS);
    }

    #[test]
    fn warp_skips_rows() {
        let t = timing(SegmentSet::new().with(48, Warp::new(48)));
        assert!((t.row_to_time(72.0) - 0.5).abs() < EPS);
        assert!((t.row_to_time(96.0) - 0.5).abs() < EPS);
        assert!((t.row_to_time(144.0) - 1.0).abs() < EPS);
        assert!((t.time_to_row(0.5) - 96.0).abs() < EPS);
        assert!(t.is_warped(72));
        assert!(!t.is_warped(48));
        assert!(!t.is_warped(96));
    }

    #[test]
    fn overlapping_warps_merge_and_swallow_stops() {
        let t = timing(
            SegmentSet::new()
                .with(48, Warp::new(48))
                .with(72, Warp::new(48))
                .with(100, Stop::new(3.0)),
        );
        assert_eq!(t.warp_spans(), &[(48, 120)]);
        assert!((t.row_to_time(120.0) - 0.5).abs() < EPS);
        assert!((t.row_to_time(168.0) - 1.0).abs() < EPS);
    }

    #[test]
    fn tracker_matches_random_access() {
        let t = timing(
            SegmentSet::new()
                .with(96, BpmChange::new(180.0))
                .with(100, Stop::new(0.5))
                .with(200, Warp::new(24))
                .with(300, Delay::new(0.25)),
        );
        let mut tracker = t.tracker();
        for row in (0..400).step_by(5) {
            let row = row as f64;
            assert!((tracker.advance(row) - t.row_to_time(row)).abs() < EPS);
        }
        assert!((tracker.advance(10.0) - t.row_to_time(10.0)).abs() < EPS);
        tracker.reset();
        assert!((tracker.advance(-12.0) - t.row_to_time(-12.0)).abs() < EPS);
    }

    #[test]
    fn time_to_row_inverts_row_to_time() {
        let t = timing(
            SegmentSet::new()
                .with(96, BpmChange::new(90.0))
                .with(144, Stop::new(0.3)),
        );
        for row in [0.0, 12.0, 96.0, 150.0, 500.0] {
            let time = t.row_to_time(row);
            assert!((t.time_to_row(time) - row).abs() < 1e-6, "row {row}");
        }
    }
}
