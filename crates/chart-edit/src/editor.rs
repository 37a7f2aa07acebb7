use chart_model::{
    NoteEdit, NoteEditResult, NoteSet, Reader, Row, RowMode, SegmentEdit, SegmentEditResult,
    SegmentKind, SegmentSet, Writer,
};
use log::debug;

use crate::action::EditAction;
use crate::chart::Chart;
use crate::error::ApplyError;
use crate::history::History;
use crate::simfile::{ChartId, Simfile, TempoTarget};

/// A simfile together with its undo history. Every mutation goes through
/// here so that it is recorded.
#[derive(Debug)]
pub struct Editor {
    simfile: Simfile,
    history: History<EditAction>,
}

impl Editor {
    pub fn new(simfile: Simfile, history_limit: usize) -> Self {
        Self {
            simfile,
            history: History::new(history_limit),
        }
    }

    pub fn simfile(&self) -> &Simfile {
        &self.simfile
    }

    pub fn history(&self) -> &History<EditAction> {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History<EditAction> {
        &mut self.history
    }

    /// Adds a chart. Not recorded in the history.
    pub fn add_chart(&mut self, chart: Chart) -> ChartId {
        self.simfile.add_chart(chart)
    }

    pub fn edit_segments(
        &mut self,
        target: TempoTarget,
        edit: &SegmentEdit,
        clear_region: bool,
    ) -> Result<SegmentEditResult, ApplyError> {
        let target = self.simfile.resolve(target)?;
        let tempo = self.simfile.target_tempo_mut(target)?;
        let result = tempo.prepare_edit(edit, clear_region);
        if result.is_empty() {
            return Ok(result);
        }
        tempo.apply_segments(&result)?;
        debug!(
            "{}: {}",
            self.simfile.owner_name(target),
            result.description()
        );
        self.history.add_entry(EditAction::Segments {
            target,
            result: result.clone(),
        });
        Ok(result)
    }

    /// Sets or clears segments of one type row by row. Returns the number of
    /// rows whose stored state changed.
    pub fn modify_segments<T: SegmentKind>(
        &mut self,
        target: TempoTarget,
        edits: impl IntoIterator<Item = (Row, Option<T>)>,
    ) -> Result<usize, ApplyError> {
        let target = self.simfile.resolve(target)?;
        let changes = self.simfile.target_tempo_mut(target)?.modify(edits);
        let count = changes.len();
        if count > 0 {
            self.history
                .add_entry(EditAction::Modify { target, changes });
        }
        Ok(count)
    }

    pub fn edit_notes(
        &mut self,
        chart: ChartId,
        edit: &NoteEdit,
        clear_region: bool,
    ) -> Result<NoteEditResult, ApplyError> {
        let target = self.simfile.chart_mut(chart)?;
        let result = target.notes().prepare_edit(edit, clear_region);
        if result.is_empty() {
            return Ok(result);
        }
        target.apply_notes(&result)?;
        debug!("{}: {}", target.description, result.description());
        self.history.add_entry(EditAction::Notes {
            chart,
            result: result.clone(),
        });
        Ok(result)
    }

    /// Returns whether the offset changed.
    pub fn set_offset(&mut self, target: TempoTarget, seconds: f64) -> Result<bool, ApplyError> {
        let target = self.simfile.resolve(target)?;
        let tempo = self.simfile.target_tempo_mut(target)?;
        let before = tempo.offset();
        if before == seconds {
            return Ok(false);
        }
        tempo.set_offset(seconds);
        self.history.add_entry(EditAction::Offset {
            target,
            before,
            after: seconds,
        });
        Ok(true)
    }

    fn row_mode(&self, chart: ChartId, base: Row, time_based: bool) -> Result<RowMode<'_>, ApplyError> {
        if !time_based {
            return Ok(RowMode::Rows { base });
        }
        let tempo = self
            .simfile
            .tempo_for(chart)
            .ok_or(ApplyError::UnknownChart(chart))?;
        Ok(RowMode::Time {
            timing: tempo.timing(),
            base,
        })
    }

    /// Encodes the notes starting in `[begin, end)` relative to `begin`.
    /// Time-based data pastes at the same offsets in seconds, which keeps
    /// the rhythm when the destination tempo differs.
    pub fn copy_notes(
        &self,
        chart: ChartId,
        begin: Row,
        end: Row,
        time_based: bool,
    ) -> Result<Vec<u8>, ApplyError> {
        let source = self
            .simfile
            .chart(chart)
            .ok_or(ApplyError::UnknownChart(chart))?;
        let set: NoteSet = source.notes().range(begin, end).iter().copied().collect();
        let mode = self.row_mode(chart, begin, time_based)?;
        let mut writer = Writer::new();
        set.encode(&mut writer, &mode);
        Ok(writer.into_bytes())
    }

    /// Decodes clipboard data at `at_row` and adds it as one edit. Malformed
    /// data pastes nothing.
    pub fn paste_notes(
        &mut self,
        chart: ChartId,
        data: &[u8],
        at_row: Row,
        time_based: bool,
        clear_region: bool,
    ) -> Result<NoteEditResult, ApplyError> {
        let add = {
            let mode = self.row_mode(chart, at_row, time_based)?;
            let mut reader = Reader::new(data);
            NoteSet::decode(&mut reader, &mode).into_result()?
        };
        let edit = NoteEdit {
            add,
            remove: NoteSet::new(),
        };
        self.edit_notes(chart, &edit, clear_region)
    }

    /// Encodes the segments in `[begin, end)` of a tempo relative to `begin`.
    pub fn copy_segments(
        &self,
        target: TempoTarget,
        begin: Row,
        end: Row,
    ) -> Result<Vec<u8>, ApplyError> {
        let tempo = self.simfile.target_tempo(target)?;
        let set = tempo.segments().collect_range(begin, end);
        let mut writer = Writer::new();
        set.encode(&mut writer, &RowMode::Rows { base: begin });
        Ok(writer.into_bytes())
    }

    pub fn paste_segments(
        &mut self,
        target: TempoTarget,
        data: &[u8],
        at_row: Row,
        clear_region: bool,
    ) -> Result<SegmentEditResult, ApplyError> {
        let mut reader = Reader::new(data);
        let add = SegmentSet::decode(&mut reader, &RowMode::Rows { base: at_row }).into_result()?;
        let edit = SegmentEdit {
            add,
            remove: SegmentSet::new(),
        };
        self.edit_segments(target, &edit, clear_region)
    }

    pub fn start_chain(&mut self) {
        self.history.start_chain();
    }

    pub fn finish_chain(&mut self, name: impl Into<String>) {
        self.history.finish_chain(name);
    }

    pub fn undo(&mut self) -> Option<String> {
        self.history.undo(&mut self.simfile)
    }

    pub fn redo(&mut self) -> Option<String> {
        self.history.redo(&mut self.simfile)
    }
}
