use std::cell::OnceCell;

use chart_model::{
    ChangeSet, EditError, Row, SegmentChange, SegmentEdit, SegmentEditResult, SegmentGroup,
    SegmentKind, SegmentValue, TimingData,
};

/// Segments plus song offset, with the timing data derived from them.
///
/// The timing data is built on first use and dropped whenever a BPM, stop,
/// delay or warp segment or the offset changes, so it is never stale.
#[derive(Debug, Clone, Default)]
pub struct Tempo {
    offset: f64,
    segments: SegmentGroup,
    timing: OnceCell<TimingData>,
}

impl PartialEq for Tempo {
    fn eq(&self, other: &Self) -> bool {
        self.offset == other.offset && self.segments == other.segments
    }
}

impl Tempo {
    pub fn new(offset: f64, segments: SegmentGroup) -> Self {
        Self {
            offset,
            segments,
            timing: OnceCell::new(),
        }
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn segments(&self) -> &SegmentGroup {
        &self.segments
    }

    pub fn timing(&self) -> &TimingData {
        self.timing
            .get_or_init(|| TimingData::new(self.offset, &self.segments))
    }

    pub fn is_timing_built(&self) -> bool {
        self.timing.get().is_some()
    }

    fn invalidate(&mut self) {
        self.timing.take();
    }

    pub fn set_offset(&mut self, offset: f64) {
        if offset != self.offset {
            self.offset = offset;
            self.invalidate();
        }
    }

    pub fn prepare_edit(&self, edit: &SegmentEdit, clear_region: bool) -> SegmentEditResult {
        self.segments.prepare_edit(edit, clear_region)
    }

    pub fn apply_segments(&mut self, result: &SegmentEditResult) -> Result<(), EditError> {
        self.segments.apply(result)?;
        if result.touches_timing() {
            self.invalidate();
        }
        Ok(())
    }

    pub fn modify<T: SegmentKind>(
        &mut self,
        edits: impl IntoIterator<Item = (Row, Option<T>)>,
    ) -> ChangeSet<SegmentValue> {
        let changes = self.segments.modify(edits);
        if !changes.is_empty() && T::TYPE.affects_timing() {
            self.invalidate();
        }
        changes
    }

    pub fn undo_changes(&mut self, changes: &[SegmentChange<SegmentValue>]) -> Result<(), EditError> {
        self.segments.undo(changes)?;
        self.invalidate_for(changes);
        Ok(())
    }

    pub fn reapply_changes(
        &mut self,
        changes: &[SegmentChange<SegmentValue>],
    ) -> Result<(), EditError> {
        self.segments.reapply(changes)?;
        self.invalidate_for(changes);
        Ok(())
    }

    fn invalidate_for(&mut self, changes: &[SegmentChange<SegmentValue>]) {
        if changes
            .iter()
            .any(|c| c.before.value.segment_type().affects_timing())
        {
            self.invalidate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chart_model::{Label, SegmentSet, Stop};

    #[test]
    fn timing_is_built_lazily() {
        let tempo = Tempo::default();
        assert!(!tempo.is_timing_built());
        assert!((tempo.timing().row_to_time(48.0) - 0.5).abs() < 1e-9);
        assert!(tempo.is_timing_built());
    }

    #[test]
    fn timing_changes_invalidate() {
        let mut tempo = Tempo::default();
        tempo.timing();
        let edit = SegmentEdit {
            add: SegmentSet::new().with(48, Stop::new(1.0)),
            remove: SegmentSet::new(),
        };
        let result = tempo.prepare_edit(&edit, false);
        tempo.apply_segments(&result).unwrap();
        assert!(!tempo.is_timing_built());
        assert!((tempo.timing().row_to_time(96.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn label_changes_keep_timing() {
        let mut tempo = Tempo::default();
        tempo.timing();
        let changes = tempo.modify([(96, Some(Label::new("verse")))]);
        assert_eq!(changes.len(), 1);
        assert!(tempo.is_timing_built());
    }

    #[test]
    fn offset_change_invalidates() {
        let mut tempo = Tempo::default();
        tempo.timing();
        tempo.set_offset(0.0);
        assert!(tempo.is_timing_built());
        tempo.set_offset(0.25);
        assert!(!tempo.is_timing_built());
        assert!((tempo.timing().row_to_time(0.0) + 0.25).abs() < 1e-9);
    }
}
